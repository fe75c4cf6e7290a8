// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device definitions: one module per device kind, each with a parser from
//! its XML element and a serializer back to it.

use strum::{Display, IntoStaticStr};

use crate::context::ParseContext;
use crate::domain::DomainDef;
use crate::error::{Error, Result};
use crate::xml::{parse_document, Element};

pub mod chr;
pub mod controller;
pub mod disk;
pub mod fs;
pub mod graphics;
pub mod hostdev;
pub mod input;
pub mod lease;
pub mod misc;
pub mod net;
pub mod smartcard;
pub mod video;

pub use chr::{ChrDef, ChrSource, ChrTarget};
pub use controller::ControllerDef;
pub use disk::DiskDef;
pub use fs::FsDef;
pub use graphics::GraphicsDef;
pub use hostdev::HostdevDef;
pub use input::InputDef;
pub use lease::LeaseDef;
pub use misc::{MemballoonDef, SoundDef, WatchdogDef};
pub use net::NetDef;
pub use smartcard::SmartcardDef;
pub use video::VideoDef;

/// The kinds of device a domain can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum DeviceKind {
    Disk,
    Lease,
    Filesystem,
    Interface,
    Input,
    Sound,
    Video,
    Hostdev,
    Watchdog,
    Controller,
    Graphics,
    Memballoon,
    Smartcard,
    Chr,
}

/// A single device parsed outside of a full domain document, as used for
/// hot-plug requests.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceDef {
    Disk(DiskDef),
    Lease(LeaseDef),
    Filesystem(FsDef),
    Interface(NetDef),
    Input(InputDef),
    Sound(SoundDef),
    Video(VideoDef),
    Hostdev(HostdevDef),
    Watchdog(WatchdogDef),
    Controller(ControllerDef),
    Graphics(GraphicsDef),
    Smartcard(SmartcardDef),
}

impl DeviceDef {
    pub fn kind(&self) -> DeviceKind {
        match self {
            DeviceDef::Disk(_) => DeviceKind::Disk,
            DeviceDef::Lease(_) => DeviceKind::Lease,
            DeviceDef::Filesystem(_) => DeviceKind::Filesystem,
            DeviceDef::Interface(_) => DeviceKind::Interface,
            DeviceDef::Input(_) => DeviceKind::Input,
            DeviceDef::Sound(_) => DeviceKind::Sound,
            DeviceDef::Video(_) => DeviceKind::Video,
            DeviceDef::Hostdev(_) => DeviceKind::Hostdev,
            DeviceDef::Watchdog(_) => DeviceKind::Watchdog,
            DeviceDef::Controller(_) => DeviceKind::Controller,
            DeviceDef::Graphics(_) => DeviceKind::Graphics,
            DeviceDef::Smartcard(_) => DeviceKind::Smartcard,
        }
    }

    /// Parses one device element against the domain it will be attached
    /// to. The domain supplies the guest OS type and hypervisor, which
    /// decide some defaults.
    pub fn parse_str(
        xml: &str,
        dom: &DomainDef,
        ctx: &ParseContext,
    ) -> Result<Self> {
        let node = parse_document(xml)?;
        Self::parse(&node, dom, ctx)
    }

    pub fn parse(
        node: &Element,
        dom: &DomainDef,
        ctx: &ParseContext,
    ) -> Result<Self> {
        let flags = ctx.flags;
        let dev = match node.name() {
            "disk" => DeviceDef::Disk(DiskDef::parse(node, ctx)?),
            "lease" => DeviceDef::Lease(LeaseDef::parse(node)?),
            "filesystem" => DeviceDef::Filesystem(FsDef::parse(node, flags)?),
            "interface" => DeviceDef::Interface(NetDef::parse(node, ctx)?),
            "input" => DeviceDef::Input(InputDef::parse(
                node,
                flags,
                dom.os.is_hvm(),
            )?),
            "sound" => DeviceDef::Sound(SoundDef::parse(node, flags)?),
            "watchdog" => DeviceDef::Watchdog(WatchdogDef::parse(node, flags)?),
            "video" => DeviceDef::Video(VideoDef::parse(
                node,
                flags,
                dom.virt_type,
                &dom.os.os_type,
            )?),
            "hostdev" => DeviceDef::Hostdev(HostdevDef::parse(node, flags)?),
            "controller" => {
                DeviceDef::Controller(ControllerDef::parse(node, flags)?)
            }
            "graphics" => DeviceDef::Graphics(GraphicsDef::parse(node, flags)?),
            "smartcard" => {
                DeviceDef::Smartcard(SmartcardDef::parse(node, flags)?)
            }
            other => {
                return Err(Error::Xml(format!(
                    "unknown device type '{}'",
                    other
                )))
            }
        };
        Ok(dev)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::test::test_ctx;
    use crate::enums::{InputBus, SoundModel, VideoType};

    const DOMAIN: &str = "<domain type='kvm'><name>hp</name>\
        <memory>65536</memory><os><type>hvm</type></os></domain>";

    #[test]
    fn hotplug_uses_domain_defaults() {
        let ctx = test_ctx();
        let dom = DomainDef::parse_str(DOMAIN, &ctx).unwrap();

        let dev =
            DeviceDef::parse_str("<input type='tablet'/>", &dom, &ctx).unwrap();
        match dev {
            DeviceDef::Input(i) => assert_eq!(i.bus, InputBus::Usb),
            other => panic!("unexpected {:?}", other),
        }

        let dev = DeviceDef::parse_str("<video/>", &dom, &ctx).unwrap();
        match dev {
            DeviceDef::Video(v) => assert_eq!(v.kind, VideoType::Cirrus),
            other => panic!("unexpected {:?}", other),
        }

        let dev = DeviceDef::parse_str("<sound model='es1370'/>", &dom, &ctx)
            .unwrap();
        assert_eq!(dev.kind(), DeviceKind::Sound);
        assert!(matches!(
            dev,
            DeviceDef::Sound(SoundDef { model: SoundModel::Es1370, .. })
        ));


        let dev = DeviceDef::parse_str(
            "<disk type='file'><source file='/img'/><target dev='sdb'/></disk>",
            &dom,
            &ctx,
        )
        .unwrap();
        let DeviceDef::Disk(disk) = dev else { panic!("not a disk") };
        assert_eq!(disk.info.addr.type_name(), "drive");
    }

    #[test]
    fn hotplug_rejects_unknown_elements() {
        let ctx = test_ctx();
        let dom = DomainDef::parse_str(DOMAIN, &ctx).unwrap();
        for xml in ["<serial type='pty'/>", "<floppy/>", "not xml"] {
            assert!(DeviceDef::parse_str(xml, &dom, &ctx).is_err(), "{}", xml);
        }
    }
}
