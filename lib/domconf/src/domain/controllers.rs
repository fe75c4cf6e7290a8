// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Controllers implied by the devices that reference them.

use domconf_types::CcidAddress;

use super::DomainDef;
use crate::address::DeviceAddress;
use crate::device::ControllerDef;
use crate::enums::{ControllerType, DiskBus};

impl DomainDef {
    fn has_controller(&self, kind: ControllerType, idx: u32) -> bool {
        self.controllers.iter().any(|c| c.kind == kind && c.idx == idx)
    }

    fn ensure_controller(&mut self, kind: ControllerType, idx: u32) {
        if !self.has_controller(kind, idx) {
            self.insert_controller(ControllerDef::new(kind, idx));
        }
    }

    fn add_disk_controllers(&mut self, bus: DiskBus, kind: ControllerType) {
        let max = self
            .disks
            .iter()
            .filter(|d| d.bus == bus)
            .filter_map(|d| match d.info.addr {
                DeviceAddress::Drive(a) => Some(a.controller),
                _ => None,
            })
            .max();
        if let Some(max) = max {
            for idx in 0..=max {
                self.ensure_controller(kind, idx);
            }
        }
    }

    fn add_virtio_serial_controllers(&mut self) {
        let wanted: Vec<u32> = self
            .channels
            .iter()
            .filter(|c| c.is_virtio_channel())
            .filter_map(|c| match c.info.addr {
                DeviceAddress::VirtioSerial(a) => Some(a.controller),
                _ => None,
            })
            .collect();
        for idx in wanted {
            self.ensure_controller(ControllerType::VirtioSerial, idx);
        }
    }

    /// Gives unaddressed smartcards the next free slot on CCID controller
    /// 0, then makes sure every referenced CCID controller exists.
    fn add_smartcard_controllers(&mut self) {
        for i in 0..self.smartcards.len() {
            let idx = match self.smartcards[i].info.addr {
                DeviceAddress::Ccid(a) => a.controller,
                DeviceAddress::None => {
                    let next = self
                        .smartcards
                        .iter()
                        .filter_map(|s| match s.info.addr {
                            DeviceAddress::Ccid(a) if a.controller == 0 => {
                                Some(a.slot + 1)
                            }
                            _ => None,
                        })
                        .max()
                        .unwrap_or(0);
                    self.smartcards[i].info.addr =
                        DeviceAddress::Ccid(CcidAddress {
                            controller: 0,
                            slot: next,
                        });
                    0
                }
                _ => 0,
            };
            self.ensure_controller(ControllerType::Ccid, idx);
        }
    }

    /// Adds the controllers that disks, virtio channels and smartcards refer
    /// to but that the document does not declare. Running it twice has no
    /// further effect.
    pub fn add_implicit_controllers(&mut self) {
        self.add_disk_controllers(DiskBus::Scsi, ControllerType::Scsi);
        self.add_disk_controllers(DiskBus::Fdc, ControllerType::Fdc);
        self.add_disk_controllers(DiskBus::Ide, ControllerType::Ide);
        self.add_virtio_serial_controllers();
        self.add_smartcard_controllers();
    }
}
