// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The complete definition of a domain and the helpers used to edit one.

use domconf_types::MacAddr;
use uuid::Uuid;

use crate::address::{DeviceAddress, DeviceInfo};
use crate::context::{NamespaceData, ParseContext, XmlFlags};
use crate::cpu::CpuDef;
use crate::device::{
    ChrDef, ControllerDef, DeviceKind, DiskDef, FsDef, GraphicsDef, HostdevDef,
    InputDef, LeaseDef, MemballoonDef, NetDef, SmartcardDef, SoundDef, VideoDef,
    WatchdogDef,
};
use crate::drive::disk_name_to_index;
use crate::enums::{CrashAction, LifecycleAction, VirtType};
use crate::error::Result;
use crate::sysinfo::SysinfoDef;

mod clock;
mod controllers;
mod format;
mod os;
mod parse;
mod seclabel;
mod tune;

pub use clock::{ClockDef, ClockOffset, TimerCatchup, TimerDef};
pub use os::{OsDef, MAX_BOOT_DEVS};
pub use seclabel::SecLabel;
pub use tune::{BlkioTune, CpuTune, MemoryDef, NumaTune, VcpuDef, VcpuPin};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DomainFeatures: u32 {
        const ACPI = 1 << 0;
        const APIC = 1 << 1;
        const PAE = 1 << 2;
        const HAP = 1 << 3;
        const VIRIDIAN = 1 << 4;
    }
}

impl DomainFeatures {
    /// Element names under `<features>`, in output order.
    pub const NAMES: &'static [(&'static str, DomainFeatures)] = &[
        ("acpi", DomainFeatures::ACPI),
        ("apic", DomainFeatures::APIC),
        ("pae", DomainFeatures::PAE),
        ("hap", DomainFeatures::HAP),
        ("viridian", DomainFeatures::VIRIDIAN),
    ];
}

/// A guest definition, as read from or written to a `<domain>` document.
#[derive(Clone, Debug)]
pub struct DomainDef {
    pub virt_type: VirtType,
    /// Runtime identifier, -1 while inactive.
    pub id: i32,
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,

    pub mem: MemoryDef,
    pub blkio: BlkioTune,
    pub vcpu: VcpuDef,
    pub cputune: CpuTune,
    pub numatune: Option<NumaTune>,

    pub on_reboot: LifecycleAction,
    pub on_poweroff: LifecycleAction,
    pub on_crash: CrashAction,

    pub os: OsDef,
    pub features: DomainFeatures,
    pub clock: ClockDef,
    pub cpu: Option<CpuDef>,
    pub sysinfo: Option<SysinfoDef>,
    pub seclabel: Option<SecLabel>,

    pub emulator: Option<String>,
    pub disks: Vec<DiskDef>,
    pub controllers: Vec<ControllerDef>,
    pub leases: Vec<LeaseDef>,
    pub fss: Vec<FsDef>,
    pub nets: Vec<NetDef>,
    pub inputs: Vec<InputDef>,
    pub sounds: Vec<SoundDef>,
    pub videos: Vec<VideoDef>,
    pub hostdevs: Vec<HostdevDef>,
    pub smartcards: Vec<SmartcardDef>,
    pub serials: Vec<ChrDef>,
    pub parallels: Vec<ChrDef>,
    pub channels: Vec<ChrDef>,
    pub graphics: Vec<GraphicsDef>,
    pub console: Option<ChrDef>,
    pub watchdog: Option<WatchdogDef>,
    pub memballoon: Option<MemballoonDef>,

    pub namespace: Option<NamespaceData>,
}

impl DomainDef {
    /// An empty definition with every default applied; the starting point
    /// for the parser and for programmatic construction.
    pub fn new(virt_type: VirtType, name: &str, uuid: Uuid) -> Self {
        Self {
            virt_type,
            id: -1,
            uuid,
            name: name.to_owned(),
            description: None,
            mem: MemoryDef::default(),
            blkio: BlkioTune::default(),
            vcpu: VcpuDef::default(),
            cputune: CpuTune::default(),
            numatune: None,
            on_reboot: LifecycleAction::Restart,
            on_poweroff: LifecycleAction::Destroy,
            on_crash: CrashAction::Destroy,
            os: OsDef::default(),
            features: DomainFeatures::empty(),
            clock: ClockDef::default(),
            cpu: None,
            sysinfo: None,
            seclabel: None,
            emulator: None,
            disks: Vec::new(),
            controllers: Vec::new(),
            leases: Vec::new(),
            fss: Vec::new(),
            nets: Vec::new(),
            inputs: Vec::new(),
            sounds: Vec::new(),
            videos: Vec::new(),
            hostdevs: Vec::new(),
            smartcards: Vec::new(),
            serials: Vec::new(),
            parallels: Vec::new(),
            channels: Vec::new(),
            graphics: Vec::new(),
            console: None,
            watchdog: None,
            memballoon: None,
            namespace: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.id != -1
    }

    /// Deep copy through the XML representation. A `live` copy keeps
    /// runtime state; otherwise only the persistent projection survives.
    pub fn copy(&self, ctx: &ParseContext, live: bool) -> Result<DomainDef> {
        let mut flags = XmlFlags::SECURE;
        if !live {
            flags |= XmlFlags::INACTIVE;
        }
        let xml = self.format(flags)?;
        let read_flags =
            if live { XmlFlags::empty() } else { XmlFlags::INACTIVE };
        let ctx = ctx
            .clone()
            .with_flags(read_flags)
            .with_expected_virt_types(VirtType::ALL_MASK);
        DomainDef::parse_str(&xml, &ctx)
    }

    /// Finds a disk by target name, or by source path when `name` starts
    /// with `/`. A path shared by several disks matches none of them
    /// unless `allow_ambiguous` is set, in which case the first wins.
    pub fn disk_index_by_name(
        &self,
        name: &str,
        allow_ambiguous: bool,
    ) -> Option<usize> {
        if !name.starts_with('/') {
            return self.disks.iter().position(|d| d.dst == name);
        }
        let mut found = None;
        for (i, disk) in self.disks.iter().enumerate() {
            if disk.src.as_deref() != Some(name) {
                continue;
            }
            if allow_ambiguous {
                return Some(i);
            }
            if found.is_some() {
                return None;
            }
            found = Some(i);
        }
        found
    }

    pub fn disk_path_by_name(&self, name: &str) -> Option<&str> {
        let idx = self.disk_index_by_name(name, true)?;
        self.disks[idx].src.as_deref()
    }

    /// Inserts `disk` after the last disk on the same bus that sorts before
    /// it, or before the first one that sorts after it. Disks on a bus not
    /// yet present go at the end.
    pub fn insert_disk(&mut self, disk: DiskDef) {
        let key =
            |d: &DiskDef| disk_name_to_index(&d.dst).map_or(-1, i64::from);
        let new_key = key(&disk);
        let mut insert_at: Option<usize> = None;
        for (i, cur) in self.disks.iter().enumerate().rev() {
            if cur.bus != disk.bus {
                continue;
            }
            if key(cur) > new_key {
                insert_at = Some(i);
            } else if insert_at.is_none() {
                insert_at = Some(i + 1);
            }
        }
        match insert_at {
            Some(i) => self.disks.insert(i, disk),
            None => self.disks.push(disk),
        }
    }

    pub fn remove_disk(&mut self, idx: usize) -> Option<DiskDef> {
        (idx < self.disks.len()).then(|| self.disks.remove(idx))
    }

    pub fn remove_disk_by_dst(&mut self, dst: &str) -> Option<DiskDef> {
        let idx = self.disks.iter().position(|d| d.dst == dst)?;
        self.remove_disk(idx)
    }

    pub fn insert_controller(&mut self, ctrl: ControllerDef) {
        crate::device::controller::insert_controller(
            &mut self.controllers,
            ctrl,
        );
    }

    pub fn find_net_by_mac(&self, mac: &MacAddr) -> Option<usize> {
        self.nets.iter().position(|n| n.mac == *mac)
    }

    pub fn remove_net(&mut self, idx: usize) -> Option<NetDef> {
        (idx < self.nets.len()).then(|| self.nets.remove(idx))
    }

    /// The placement info of every addressable device, in the order the
    /// devices are written out.
    pub fn device_infos_mut(
        &mut self,
    ) -> impl Iterator<Item = (DeviceKind, &mut DeviceInfo)> + '_ {
        let chrs = self
            .serials
            .iter_mut()
            .chain(self.parallels.iter_mut())
            .chain(self.channels.iter_mut())
            .chain(self.console.iter_mut());
        let disks =
            self.disks.iter_mut().map(|d| (DeviceKind::Disk, &mut d.info));
        let nets =
            self.nets.iter_mut().map(|n| (DeviceKind::Interface, &mut n.info));
        let sounds =
            self.sounds.iter_mut().map(|s| (DeviceKind::Sound, &mut s.info));
        let hostdevs = self
            .hostdevs
            .iter_mut()
            .map(|h| (DeviceKind::Hostdev, &mut h.info));
        let videos =
            self.videos.iter_mut().map(|v| (DeviceKind::Video, &mut v.info));
        let controllers = self
            .controllers
            .iter_mut()
            .map(|c| (DeviceKind::Controller, &mut c.info));
        let smartcards = self
            .smartcards
            .iter_mut()
            .map(|s| (DeviceKind::Smartcard, &mut s.info));
        let inputs =
            self.inputs.iter_mut().map(|i| (DeviceKind::Input, &mut i.info));
        let fss =
            self.fss.iter_mut().map(|f| (DeviceKind::Filesystem, &mut f.info));
        let watchdog = self
            .watchdog
            .iter_mut()
            .map(|w| (DeviceKind::Watchdog, &mut w.info));
        let memballoon = self
            .memballoon
            .iter_mut()
            .map(|m| (DeviceKind::Memballoon, &mut m.info));

        disks
            .chain(nets)
            .chain(sounds)
            .chain(hostdevs)
            .chain(videos)
            .chain(controllers)
            .chain(smartcards)
            .chain(chrs.map(|c| (DeviceKind::Chr, &mut c.info)))
            .chain(inputs)
            .chain(fss)
            .chain(watchdog)
            .chain(memballoon)
    }

    /// Calls `f` on the placement info of every addressable device, stopping
    /// at the first error.
    pub fn for_each_device_info<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(DeviceKind, &mut DeviceInfo) -> Result<()>,
    {
        self.device_infos_mut().try_for_each(|(kind, info)| f(kind, info))
    }

    pub fn clear_device_aliases(&mut self) {
        for (_, info) in self.device_infos_mut() {
            info.alias = None;
        }
    }

    /// Forgets every PCI address so the driver can reassign them.
    pub fn clear_pci_addresses(&mut self) {
        for (_, info) in self.device_infos_mut() {
            if info.addr.is_pci() {
                info.addr = DeviceAddress::None;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::test::test_ctx;
    use crate::enums::DiskBus;
    use crate::error::{Error, ErrorKind};

    const DISKS: &str = "<domain type='kvm'><name>d</name><memory>1024</memory>\
        <os><type>hvm</type></os><devices>\
        <disk type='file'><source file='/img/a'/><target dev='hdb'/></disk>\
        <disk type='file'><source file='/img/b'/><target dev='vda'/></disk>\
        <disk type='file'><source file='/img/shared'/><target dev='hda'/>\
        </disk>\
        <disk type='file'><source file='/img/shared'/><target dev='vdb'/>\
        <alias name='virtio-disk1'/><address type='pci' slot='0x05'/></disk>\
        </devices></domain>";

    #[test]
    fn disks_are_ordered_per_bus() {
        let dom = DomainDef::parse_str(DISKS, &test_ctx()).unwrap();
        let dsts: Vec<_> = dom.disks.iter().map(|d| d.dst.as_str()).collect();
        assert_eq!(dsts, vec!["hda", "hdb", "vda", "vdb"]);
    }

    #[test]
    fn insert_disk_without_index() {
        let mut dom = DomainDef::parse_str(DISKS, &test_ctx()).unwrap();
        let mut odd = dom.disks[0].clone();
        odd.dst = "hd".to_string();
        dom.insert_disk(odd);
        assert_eq!(dom.disks[0].dst, "hd");

        let mut usb = dom.disks[0].clone();
        usb.bus = DiskBus::Usb;
        usb.dst = "sdz".to_string();
        dom.insert_disk(usb);
        assert_eq!(dom.disks.last().unwrap().dst, "sdz");
    }

    #[test]
    fn lookup_by_name() {
        let dom = DomainDef::parse_str(DISKS, &test_ctx()).unwrap();
        assert_eq!(dom.disk_index_by_name("vda", false), Some(2));
        assert_eq!(dom.disk_index_by_name("/img/a", false), Some(1));
        assert_eq!(dom.disk_index_by_name("/img/shared", false), None);
        assert_eq!(dom.disk_index_by_name("/img/shared", true), Some(0));
        assert_eq!(dom.disk_index_by_name("sdq", true), None);
        assert_eq!(dom.disk_path_by_name("vda"), Some("/img/b"));
    }

    #[test]
    fn edit_helpers() {
        let ctx = test_ctx().with_flags(XmlFlags::INACTIVE);
        let mut dom = DomainDef::parse_str(DISKS, &ctx).unwrap();
        assert!(dom.remove_disk(9).is_none());
        assert_eq!(
            dom.remove_disk_by_dst("hdb").map(|d| d.dst),
            Some("hdb".to_string())
        );
        assert_eq!(dom.disks.len(), 3);

        assert!(dom.disks[2].info.alias.is_none());
        assert!(dom.disks[2].info.addr.is_pci());
        dom.clear_pci_addresses();
        assert!(dom.disks[2].info.addr.is_none());
        assert!(!dom.disks[0].info.addr.is_none());

        let mut count = 0;
        dom.for_each_device_info(|kind, _| {
            if kind == DeviceKind::Disk {
                count += 1;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 3);

        let kinds: Vec<_> = dom.device_infos_mut().map(|(k, _)| k).collect();
        assert_eq!(&kinds[..3], &[DeviceKind::Disk; 3]);
        assert!(kinds[3..].iter().all(|k| *k != DeviceKind::Disk));

        let mut seen = 0;
        let err = dom
            .for_each_device_info(|_, _| {
                seen += 1;
                Err(Error::Internal("stop".to_string()))
            })
            .unwrap_err();
        assert_eq!(seen, 1);
        assert_eq!(err.kind(), ErrorKind::InternalError);
    }

    #[test]
    fn aliases_are_cleared() {
        let mut dom = DomainDef::parse_str(DISKS, &test_ctx()).unwrap();
        assert_eq!(dom.disks[3].info.alias.as_deref(), Some("virtio-disk1"));
        dom.clear_device_aliases();
        assert!(dom.disks.iter().all(|d| d.info.alias.is_none()));
    }

    #[test]
    fn copy_drops_runtime_state() {
        let xml = DISKS
            .replace("<domain type='kvm'>", "<domain type='kvm' id='4'>");

        let dom = DomainDef::parse_str(&xml, &test_ctx()).unwrap();
        assert!(dom.is_active());

        let live = dom.copy(&test_ctx(), true).unwrap();
        assert_eq!(live.id, 4);
        assert_eq!(live.disks[3].info.alias.as_deref(), Some("virtio-disk1"));

        let inactive = dom.copy(&test_ctx(), false).unwrap();
        assert!(!inactive.is_active());
        assert!(inactive.disks[3].info.alias.is_none());
        assert_eq!(inactive.uuid, dom.uuid);
    }
}
