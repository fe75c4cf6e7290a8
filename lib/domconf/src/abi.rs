// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Checks whether two definitions describe the same guest-visible machine,
//! as required before a running domain moves from one definition to the
//! other (migration, snapshot revert, live update).
//!
//! Only what the guest can observe is compared. Host-side details such as
//! the tap device or bridge behind a NIC, or the image path behind a disk,
//! may differ freely. Device lists are compared position by position.

use thiserror::Error;
use uuid::Uuid;

use crate::address::{DeviceAddress, DeviceInfo};
use crate::cpu::{CpuDef, CpuTopology};
use crate::device::{
    ChrDef, ChrTarget, ControllerDef, DiskDef, FsDef, HostdevDef, InputDef,
    MemballoonDef, NetDef, SmartcardDef, SoundDef, VideoDef, WatchdogDef,
};
use crate::domain::{DomainDef, DomainFeatures, TimerDef};
use crate::enums::{
    ChrDeviceType, ControllerType, CpuMode, DiskBus, DiskDevice,
    HostdevSubsysType, InputBus, InputType, MemballoonModel, SmartcardMode,
    SmbiosMode, SoundModel, TimerMode, TimerName, VideoType, VirtType,
    WatchdogModel,
};
use crate::sysinfo::SysinfoDef;

pub trait CompatCheck {
    type Error;

    fn is_compatible_with(&self, other: &Self) -> Result<(), Self::Error>;
}

#[derive(Debug, Error)]
pub enum AbiIncompatibility {
    #[error(transparent)]
    Domain(#[from] DomainIncompatibility),

    #[error(transparent)]
    Timer(#[from] TimerIncompatibility),

    #[error(transparent)]
    Cpu(#[from] CpuIncompatibility),

    #[error(transparent)]
    Sysinfo(#[from] SysinfoIncompatibility),

    #[error("collection {0} incompatible")]
    Collection(&'static str, #[source] CollectionIncompatibility),

    #[error("{what} presence differs (self: {this}, other: {other})")]
    Presence { what: &'static str, this: bool, other: bool },

    #[error("{0} incompatible")]
    Device(&'static str, #[source] DeviceIncompatibility),
}

#[derive(Debug, Error)]
pub enum DomainIncompatibility {
    #[error("domains have different types (self: {this}, other: {other})")]
    VirtType { this: VirtType, other: VirtType },

    #[error("domains have different UUIDs (self: {this}, other: {other})")]
    Uuid { this: Uuid, other: Uuid },

    #[error(
        "domains have different maximum memory (self: {this} KiB, other: \
         {other} KiB)"
    )]
    MaxMemory { this: u64, other: u64 },

    #[error(
        "domains have different current memory (self: {this} KiB, other: \
         {other} KiB)"
    )]
    CurrentMemory { this: u64, other: u64 },

    #[error(
        "domains have different huge page backing (self: {this}, other: \
         {other})"
    )]
    HugepageBacking { this: bool, other: bool },

    #[error(
        "domains have different vCPU counts (self: {this}, other: {other})"
    )]
    Vcpus { this: u32, other: u32 },

    #[error(
        "domains have different maximum vCPU counts (self: {this}, other: \
         {other})"
    )]
    MaxVcpus { this: u32, other: u32 },

    #[error("domains have different OS types (self: {this}, other: {other})")]
    OsType { this: String, other: String },

    #[error(
        "domains have different architectures (self: {this}, other: {other})"
    )]
    Arch { this: String, other: String },

    #[error(
        "domains have different machine types (self: {this:?}, other: \
         {other:?})"
    )]
    Machine { this: Option<String>, other: Option<String> },

    #[error(
        "domains have different SMBIOS modes (self: {this:?}, other: {other:?})"
    )]
    SmbiosMode { this: Option<SmbiosMode>, other: Option<SmbiosMode> },

    #[error(
        "domains have different features (self: {this:?}, other: {other:?})"
    )]
    Features { this: DomainFeatures, other: DomainFeatures },

    #[error(
        "domains have different timer counts (self: {this}, other: {other})"
    )]
    TimerCount { this: usize, other: usize },
}

#[derive(Debug, Error)]
pub enum TimerIncompatibility {
    #[error("timers have different names (self: {this}, other: {other})")]
    Name { this: TimerName, other: TimerName },

    #[error(
        "{name} timers have different presence (self: {this:?}, other: \
         {other:?})"
    )]
    Present { name: TimerName, this: Option<bool>, other: Option<bool> },

    #[error(
        "TSC timers have different frequencies (self: {this:?}, other: \
         {other:?})"
    )]
    Frequency { this: Option<u64>, other: Option<u64> },

    #[error(
        "TSC timers have different modes (self: {this:?}, other: {other:?})"
    )]
    Mode { this: Option<TimerMode>, other: Option<TimerMode> },
}

#[derive(Debug, Error)]
pub enum CpuIncompatibility {
    #[error("CPU definition presence differs (self: {this}, other: {other})")]
    Presence { this: bool, other: bool },

    #[error("CPUs have different modes (self: {this}, other: {other})")]
    Mode { this: CpuMode, other: CpuMode },

    #[error(
        "CPUs have different architectures (self: {this:?}, other: {other:?})"
    )]
    Arch { this: Option<String>, other: Option<String> },

    #[error("CPUs have different models (self: {this:?}, other: {other:?})")]
    Model { this: Option<String>, other: Option<String> },

    #[error("CPUs have different vendors (self: {this:?}, other: {other:?})")]
    Vendor { this: Option<String>, other: Option<String> },

    #[error(
        "CPUs have different topologies (self: {this:?}, other: {other:?})"
    )]
    Topology { this: Option<CpuTopology>, other: Option<CpuTopology> },

    #[error(
        "CPUs have different feature counts (self: {this}, other: {other})"
    )]
    FeatureCount { this: usize, other: usize },

    #[error("CPU features differ (self: {this}, other: {other})")]
    Feature { this: String, other: String },
}

#[derive(Debug, Error)]
pub enum SysinfoIncompatibility {
    #[error("sysinfo presence differs (self: {this}, other: {other})")]
    Presence { this: bool, other: bool },

    #[error(
        "sysinfo {section} entry '{name}' differs (self: {this:?}, other: \
         {other:?})"
    )]
    Entry {
        section: &'static str,
        name: String,
        this: Option<String>,
        other: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum AddressIncompatibility {
    #[error(
        "devices have different address types (self: {this}, other: {other})"
    )]
    Type { this: &'static str, other: &'static str },

    #[error("devices have different addresses (self: {this}, other: {other})")]
    Address { this: DeviceAddress, other: DeviceAddress },
}

#[derive(Debug, Error)]
pub enum DiskIncompatibility {
    #[error("disks have different device types (self: {this}, other: {other})")]
    Device { this: DiskDevice, other: DiskDevice },

    #[error("disks have different buses (self: {this}, other: {other})")]
    Bus { this: DiskBus, other: DiskBus },

    #[error("disks have different targets (self: {this}, other: {other})")]
    Target { this: String, other: String },

    #[error("disks have different serials (self: {this:?}, other: {other:?})")]
    Serial { this: Option<String>, other: Option<String> },

    #[error(
        "disks have different read-only settings (self: {this}, other: {other})"
    )]
    ReadOnly { this: bool, other: bool },
}

#[derive(Debug, Error)]
pub enum ControllerIncompatibility {
    #[error("controllers have different types (self: {this}, other: {other})")]
    Type { this: ControllerType, other: ControllerType },

    #[error(
        "controllers have different indices (self: {this}, other: {other})"
    )]
    Index { this: u32, other: u32 },

    #[error(
        "controllers have different models (self: {this:?}, other: {other:?})"
    )]
    Model { this: String, other: String },

    #[error(
        "virtio-serial controllers have different port counts (self: {this:?}, \
         other: {other:?})"
    )]
    Ports { this: Option<u32>, other: Option<u32> },

    #[error(
        "virtio-serial controllers have different vector counts (self: \
         {this:?}, other: {other:?})"
    )]
    Vectors { this: Option<u32>, other: Option<u32> },
}

#[derive(Debug, Error)]
pub enum FsIncompatibility {
    #[error(
        "filesystems have different targets (self: {this}, other: {other})"
    )]
    Target { this: String, other: String },

    #[error(
        "filesystems have different read-only settings (self: {this}, other: \
         {other})"
    )]
    ReadOnly { this: bool, other: bool },
}

#[derive(Debug, Error)]
pub enum NicIncompatibility {
    #[error("NICs have different MAC addresses (self: {this}, other: {other})")]
    Mac { this: String, other: String },

    #[error("NICs have different models (self: {this:?}, other: {other:?})")]
    Model { this: Option<String>, other: Option<String> },
}

#[derive(Debug, Error)]
pub enum InputIncompatibility {
    #[error("inputs have different types (self: {this}, other: {other})")]
    Type { this: InputType, other: InputType },

    #[error("inputs have different buses (self: {this}, other: {other})")]
    Bus { this: InputBus, other: InputBus },
}

#[derive(Debug, Error)]
pub enum VideoIncompatibility {
    #[error("videos have different models (self: {this}, other: {other})")]
    Type { this: VideoType, other: VideoType },

    #[error("videos have different VRAM sizes (self: {this}, other: {other})")]
    Vram { this: u32, other: u32 },

    #[error("videos have different head counts (self: {this}, other: {other})")]
    Heads { this: u32, other: u32 },

    #[error(
        "videos have different acceleration settings (self: {this}, other: \
         {other})"
    )]
    Accel { this: String, other: String },
}

#[derive(Debug, Error)]
pub enum ChrIncompatibility {
    #[error(
        "character devices have different device types (self: {this}, other: \
         {other})"
    )]
    DeviceType { this: ChrDeviceType, other: ChrDeviceType },

    #[error(
        "character devices have different targets (self: {this}, other: \
         {other})"
    )]
    Target { this: String, other: String },
}

#[derive(Debug, Error)]
pub enum DeviceIncompatibility {
    #[error(transparent)]
    Address(#[from] AddressIncompatibility),

    #[error(transparent)]
    Disk(#[from] DiskIncompatibility),

    #[error(transparent)]
    Controller(#[from] ControllerIncompatibility),

    #[error(transparent)]
    Fs(#[from] FsIncompatibility),

    #[error(transparent)]
    Nic(#[from] NicIncompatibility),

    #[error(transparent)]
    Input(#[from] InputIncompatibility),

    #[error(transparent)]
    Video(#[from] VideoIncompatibility),

    #[error(transparent)]
    Chr(#[from] ChrIncompatibility),

    #[error("sound cards have different models (self: {this}, other: {other})")]
    SoundModel { this: SoundModel, other: SoundModel },

    #[error(
        "host devices have different subsystem types (self: {this}, other: \
         {other})"
    )]
    HostdevType { this: HostdevSubsysType, other: HostdevSubsysType },

    #[error("smartcards have different modes (self: {this}, other: {other})")]
    SmartcardMode { this: SmartcardMode, other: SmartcardMode },

    #[error("watchdogs have different models (self: {this}, other: {other})")]
    WatchdogModel { this: WatchdogModel, other: WatchdogModel },

    #[error(
        "memory balloons have different models (self: {this}, other: {other})"
    )]
    MemballoonModel { this: MemballoonModel, other: MemballoonModel },
}

#[derive(Debug, Error)]
pub enum CollectionIncompatibility {
    #[error(
        "collections have different lengths (self: {this}, other: {other})"
    )]
    Length { this: usize, other: usize },

    #[error("component {0} incompatible")]
    Component(usize, #[source] DeviceIncompatibility),
}

impl<T: CompatCheck<Error = DeviceIncompatibility>> CompatCheck for [T] {
    type Error = CollectionIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), CollectionIncompatibility> {
        if self.len() != other.len() {
            return Err(CollectionIncompatibility::Length {
                this: self.len(),
                other: other.len(),
            });
        }

        for (idx, (this_val, other_val)) in self.iter().zip(other).enumerate() {
            this_val
                .is_compatible_with(other_val)
                .map_err(|e| CollectionIncompatibility::Component(idx, e))?;
        }

        Ok(())
    }
}

impl CompatCheck for DeviceInfo {
    type Error = AddressIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), AddressIncompatibility> {
        let same = match (self.addr, other.addr) {
            (DeviceAddress::None, DeviceAddress::None) => true,
            (
                DeviceAddress::Pci { addr: this, .. },
                DeviceAddress::Pci { addr: other, .. },
            ) => this == other,
            (DeviceAddress::Drive(this), DeviceAddress::Drive(other)) => {
                this == other
            }
            (
                DeviceAddress::VirtioSerial(this),
                DeviceAddress::VirtioSerial(other),
            ) => this == other,
            (DeviceAddress::Ccid(this), DeviceAddress::Ccid(other)) => {
                this == other
            }
            (this, other) => {
                return Err(AddressIncompatibility::Type {
                    this: this.type_name(),
                    other: other.type_name(),
                })
            }
        };
        if same {
            Ok(())
        } else {
            Err(AddressIncompatibility::Address {
                this: self.addr,
                other: other.addr,
            })
        }
    }
}

impl CompatCheck for DiskDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        if self.device != other.device {
            Err(DiskIncompatibility::Device {
                this: self.device,
                other: other.device,
            }
            .into())
        } else if self.bus != other.bus {
            Err(DiskIncompatibility::Bus { this: self.bus, other: other.bus }
                .into())
        } else if self.dst != other.dst {
            Err(DiskIncompatibility::Target {
                this: self.dst.clone(),
                other: other.dst.clone(),
            }
            .into())
        } else if self.serial != other.serial {
            Err(DiskIncompatibility::Serial {
                this: self.serial.clone(),
                other: other.serial.clone(),
            }
            .into())
        } else if self.readonly != other.readonly {
            Err(DiskIncompatibility::ReadOnly {
                this: self.readonly,
                other: other.readonly,
            }
            .into())
        } else {
            Ok(self.info.is_compatible_with(&other.info)?)
        }
    }
}

impl CompatCheck for ControllerDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        if self.kind != other.kind {
            return Err(ControllerIncompatibility::Type {
                this: self.kind,
                other: other.kind,
            }
            .into());
        }
        if self.idx != other.idx {
            return Err(ControllerIncompatibility::Index {
                this: self.idx,
                other: other.idx,
            }
            .into());
        }
        if self.model != other.model {
            let name = |m: &ControllerDef| {
                m.model.map_or_else(|| "default".to_string(), |m| m.to_string())
            };
            return Err(ControllerIncompatibility::Model {
                this: name(self),
                other: name(other),
            }
            .into());
        }
        if self.kind == ControllerType::VirtioSerial {
            if self.ports != other.ports {
                return Err(ControllerIncompatibility::Ports {
                    this: self.ports,
                    other: other.ports,
                }
                .into());
            }
            if self.vectors != other.vectors {
                return Err(ControllerIncompatibility::Vectors {
                    this: self.vectors,
                    other: other.vectors,
                }
                .into());
            }
        }
        Ok(self.info.is_compatible_with(&other.info)?)
    }
}

impl CompatCheck for FsDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        if self.dst != other.dst {
            Err(FsIncompatibility::Target {
                this: self.dst.clone(),
                other: other.dst.clone(),
            }
            .into())
        } else if self.readonly != other.readonly {
            Err(FsIncompatibility::ReadOnly {
                this: self.readonly,
                other: other.readonly,
            }
            .into())
        } else {
            Ok(self.info.is_compatible_with(&other.info)?)
        }
    }
}

impl CompatCheck for NetDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        if self.mac != other.mac {
            Err(NicIncompatibility::Mac {
                this: self.mac.to_string(),
                other: other.mac.to_string(),
            }
            .into())
        } else if self.model != other.model {
            Err(NicIncompatibility::Model {
                this: self.model.clone(),
                other: other.model.clone(),
            }
            .into())
        } else {
            Ok(self.info.is_compatible_with(&other.info)?)
        }
    }
}

impl CompatCheck for InputDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        if self.kind != other.kind {
            Err(InputIncompatibility::Type {
                this: self.kind,
                other: other.kind,
            }
            .into())
        } else if self.bus != other.bus {
            Err(InputIncompatibility::Bus { this: self.bus, other: other.bus }
                .into())
        } else {
            Ok(self.info.is_compatible_with(&other.info)?)
        }
    }
}

impl CompatCheck for SoundDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        if self.model != other.model {
            return Err(DeviceIncompatibility::SoundModel {
                this: self.model,
                other: other.model,
            });
        }
        Ok(self.info.is_compatible_with(&other.info)?)
    }
}

impl CompatCheck for VideoDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        let accel = |v: &VideoDef| match v.accel {
            None => "none".to_string(),
            Some(a) => format!("3d={} 2d={}", a.accel3d, a.accel2d),
        };
        if self.kind != other.kind {
            Err(VideoIncompatibility::Type {
                this: self.kind,
                other: other.kind,
            }
            .into())
        } else if self.vram != other.vram {
            Err(VideoIncompatibility::Vram {
                this: self.vram,
                other: other.vram,
            }
            .into())
        } else if self.heads != other.heads {
            Err(VideoIncompatibility::Heads {
                this: self.heads,
                other: other.heads,
            }
            .into())
        } else if self.accel != other.accel {
            Err(VideoIncompatibility::Accel {
                this: accel(self),
                other: accel(other),
            }
            .into())
        } else {
            Ok(self.info.is_compatible_with(&other.info)?)
        }
    }
}

impl CompatCheck for HostdevDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        let (this, that) =
            (self.source.subsys_type(), other.source.subsys_type());
        if this != that {
            return Err(DeviceIncompatibility::HostdevType {
                this,
                other: that,
            });
        }
        Ok(self.info.is_compatible_with(&other.info)?)
    }
}

impl CompatCheck for SmartcardDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        if self.mode() != other.mode() {
            return Err(DeviceIncompatibility::SmartcardMode {
                this: self.mode(),
                other: other.mode(),
            });
        }
        Ok(self.info.is_compatible_with(&other.info)?)
    }
}

fn describe_target(target: &ChrTarget) -> String {
    match target {
        ChrTarget::Port(port) => format!("port {}", port),
        ChrTarget::Console { kind, port } => {
            format!("{} console port {}", kind, port)
        }
        ChrTarget::Guestfwd { addr, port } => {
            format!("guestfwd {}:{}", addr, port)
        }
        ChrTarget::Virtio { name } => {
            format!("virtio {}", name.as_deref().unwrap_or("(unnamed)"))
        }
    }
}

impl CompatCheck for ChrDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        if self.device_type != other.device_type {
            Err(ChrIncompatibility::DeviceType {
                this: self.device_type,
                other: other.device_type,
            }
            .into())
        } else if self.target != other.target {
            Err(ChrIncompatibility::Target {
                this: describe_target(&self.target),
                other: describe_target(&other.target),
            }
            .into())
        } else {
            Ok(self.info.is_compatible_with(&other.info)?)
        }
    }
}

impl CompatCheck for WatchdogDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        if self.model != other.model {
            return Err(DeviceIncompatibility::WatchdogModel {
                this: self.model,
                other: other.model,
            });
        }
        Ok(self.info.is_compatible_with(&other.info)?)
    }
}

impl CompatCheck for MemballoonDef {
    type Error = DeviceIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), DeviceIncompatibility> {
        if self.model != other.model {
            return Err(DeviceIncompatibility::MemballoonModel {
                this: self.model,
                other: other.model,
            });
        }
        Ok(self.info.is_compatible_with(&other.info)?)
    }
}

impl CompatCheck for TimerDef {
    type Error = TimerIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), TimerIncompatibility> {
        if self.name != other.name {
            return Err(TimerIncompatibility::Name {
                this: self.name,
                other: other.name,
            });
        }
        if self.present != other.present {
            return Err(TimerIncompatibility::Present {
                name: self.name,
                this: self.present,
                other: other.present,
            });
        }
        if self.name == TimerName::Tsc {
            if self.frequency != other.frequency {
                return Err(TimerIncompatibility::Frequency {
                    this: self.frequency,
                    other: other.frequency,
                });
            }
            if self.mode != other.mode {
                return Err(TimerIncompatibility::Mode {
                    this: self.mode,
                    other: other.mode,
                });
            }
        }
        Ok(())
    }
}

impl CompatCheck for CpuDef {
    type Error = CpuIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), CpuIncompatibility> {
        if self.mode != other.mode {
            return Err(CpuIncompatibility::Mode {
                this: self.mode,
                other: other.mode,
            });
        }
        if self.arch != other.arch {
            return Err(CpuIncompatibility::Arch {
                this: self.arch.clone(),
                other: other.arch.clone(),
            });
        }
        if self.model != other.model {
            return Err(CpuIncompatibility::Model {
                this: self.model.clone(),
                other: other.model.clone(),
            });
        }
        if self.vendor != other.vendor {
            return Err(CpuIncompatibility::Vendor {
                this: self.vendor.clone(),
                other: other.vendor.clone(),
            });
        }
        if self.topology != other.topology {
            return Err(CpuIncompatibility::Topology {
                this: self.topology,
                other: other.topology,
            });
        }
        if self.features.len() != other.features.len() {
            return Err(CpuIncompatibility::FeatureCount {
                this: self.features.len(),
                other: other.features.len(),
            });
        }
        for (this, that) in self.features.iter().zip(&other.features) {
            if this != that {
                let describe = |f: &crate::cpu::CpuFeature| match f.policy {
                    Some(p) => format!("{} ({})", f.name, p),
                    None => f.name.clone(),
                };
                return Err(CpuIncompatibility::Feature {
                    this: describe(this),
                    other: describe(that),
                });
            }
        }
        Ok(())
    }
}

fn check_entries(
    section: &'static str,
    this: &[(String, String)],
    other: &[(String, String)],
) -> Result<(), SysinfoIncompatibility> {
    let lookup = |list: &[(String, String)], name: &str| {
        list.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    };
    for (name, _) in this.iter().chain(other) {
        let (a, b) = (lookup(this, name), lookup(other, name));
        if a != b {
            return Err(SysinfoIncompatibility::Entry {
                section,
                name: name.clone(),
                this: a,
                other: b,
            });
        }
    }
    Ok(())
}

impl CompatCheck for SysinfoDef {
    type Error = SysinfoIncompatibility;

    fn is_compatible_with(
        &self,
        other: &Self,
    ) -> Result<(), SysinfoIncompatibility> {
        check_entries("bios", &self.bios, &other.bios)?;
        check_entries("system", &self.system, &other.system)
    }
}

fn check_optional<T>(
    what: &'static str,
    this: Option<&T>,
    other: Option<&T>,
) -> Result<(), AbiIncompatibility>
where
    T: CompatCheck<Error = DeviceIncompatibility>,
{
    match (this, other) {
        (None, None) => Ok(()),
        (Some(this), Some(other)) => this
            .is_compatible_with(other)
            .map_err(|e| AbiIncompatibility::Device(what, e)),
        (this, other) => Err(AbiIncompatibility::Presence {
            what,
            this: this.is_some(),
            other: other.is_some(),
        }),
    }
}

impl DomainDef {
    fn is_machine_compatible(
        &self,
        other: &Self,
    ) -> Result<(), DomainIncompatibility> {
        use DomainIncompatibility as E;

        if self.virt_type != other.virt_type {
            return Err(E::VirtType {
                this: self.virt_type,
                other: other.virt_type,
            });
        }
        if self.uuid != other.uuid {
            return Err(E::Uuid { this: self.uuid, other: other.uuid });
        }
        if self.mem.max_balloon != other.mem.max_balloon {
            return Err(E::MaxMemory {
                this: self.mem.max_balloon,
                other: other.mem.max_balloon,
            });
        }
        if self.mem.cur_balloon != other.mem.cur_balloon {
            return Err(E::CurrentMemory {
                this: self.mem.cur_balloon,
                other: other.mem.cur_balloon,
            });
        }
        if self.mem.hugepage_backed != other.mem.hugepage_backed {
            return Err(E::HugepageBacking {
                this: self.mem.hugepage_backed,
                other: other.mem.hugepage_backed,
            });
        }
        if self.vcpu.current != other.vcpu.current {
            return Err(E::Vcpus {
                this: self.vcpu.current,
                other: other.vcpu.current,
            });
        }
        if self.vcpu.max != other.vcpu.max {
            return Err(E::MaxVcpus {
                this: self.vcpu.max,
                other: other.vcpu.max,
            });
        }
        if self.os.os_type != other.os.os_type {
            return Err(E::OsType {
                this: self.os.os_type.clone(),
                other: other.os.os_type.clone(),
            });
        }
        if self.os.arch != other.os.arch {
            return Err(E::Arch {
                this: self.os.arch.clone(),
                other: other.os.arch.clone(),
            });
        }
        if self.os.machine != other.os.machine {
            return Err(E::Machine {
                this: self.os.machine.clone(),
                other: other.os.machine.clone(),
            });
        }
        if self.os.smbios_mode != other.os.smbios_mode {
            return Err(E::SmbiosMode {
                this: self.os.smbios_mode,
                other: other.os.smbios_mode,
            });
        }
        if self.features != other.features {
            return Err(E::Features {
                this: self.features,
                other: other.features,
            });
        }
        if self.clock.timers.len() != other.clock.timers.len() {
            return Err(E::TimerCount {
                this: self.clock.timers.len(),
                other: other.clock.timers.len(),
            });
        }
        Ok(())
    }

    /// Returns the first guest-visible difference between `self` (the
    /// source) and `other` (the destination), if any.
    pub fn check_abi_stability(
        &self,
        other: &Self,
    ) -> Result<(), AbiIncompatibility> {
        self.is_machine_compatible(other)?;

        for (this, that) in self.clock.timers.iter().zip(&other.clock.timers) {
            this.is_compatible_with(that)?;
        }

        match (&self.cpu, &other.cpu) {
            (None, None) => {}
            (Some(this), Some(that)) => this.is_compatible_with(that)?,
            (this, that) => {
                return Err(CpuIncompatibility::Presence {
                    this: this.is_some(),
                    other: that.is_some(),
                }
                .into())
            }
        }

        match (&self.sysinfo, &other.sysinfo) {
            (None, None) => {}
            (Some(this), Some(that)) => this.is_compatible_with(that)?,
            (this, that) => {
                return Err(SysinfoIncompatibility::Presence {
                    this: this.is_some(),
                    other: that.is_some(),
                }
                .into())
            }
        }

        macro_rules! check_collection {
            ($field:ident, $name:literal) => {
                self.$field.is_compatible_with(&other.$field).map_err(|e| {
                    AbiIncompatibility::Collection($name, e)
                })?;
            };
        }
        check_collection!(disks, "disks");
        check_collection!(controllers, "controllers");
        check_collection!(fss, "filesystems");
        check_collection!(nets, "interfaces");
        check_collection!(inputs, "inputs");
        check_collection!(sounds, "sounds");
        check_collection!(videos, "videos");
        check_collection!(hostdevs, "host devices");
        check_collection!(smartcards, "smartcards");
        check_collection!(serials, "serials");
        check_collection!(parallels, "parallels");
        check_collection!(channels, "channels");

        check_optional(
            "console",
            self.console.as_ref(),
            other.console.as_ref(),
        )?;
        check_optional(
            "watchdog",
            self.watchdog.as_ref(),
            other.watchdog.as_ref(),
        )?;
        check_optional(
            "memballoon",
            self.memballoon.as_ref(),
            other.memballoon.as_ref(),
        )?;

        Ok(())
    }
}
