// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::warn;
use uuid::Uuid;

use crate::address::{DeviceAddress, DeviceInfo, InfoAllow};
use crate::context::{ParseContext, XmlFlags};
use crate::drive::drive_address_for;
use crate::enums::{
    DiskBus, DiskCache, DiskDevice, DiskErrorPolicy, DiskIo, DiskProtocol,
    DiskType, EncryptionFormat, SnapshotMode, TriState,
};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

/// One server of a network-backed disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiskHost {
    pub name: String,
    pub port: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionSecret {
    pub kind: String,
    pub uuid: Uuid,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Encryption {
    pub format: EncryptionFormat,
    pub secrets: Vec<EncryptionSecret>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiskDef {
    pub kind: DiskType,
    pub device: DiskDevice,
    pub bus: DiskBus,
    /// File, block device or directory path; for network disks, the
    /// protocol-specific volume name.
    pub src: Option<String>,
    pub protocol: Option<DiskProtocol>,
    pub hosts: Vec<DiskHost>,
    /// Guest target name, e.g. `vda`.
    pub dst: String,
    pub driver_name: Option<String>,
    pub driver_type: Option<String>,
    pub cache: DiskCache,
    pub error_policy: DiskErrorPolicy,
    pub io: DiskIo,
    pub ioeventfd: TriState,
    pub event_idx: TriState,
    pub serial: Option<String>,
    pub snapshot: SnapshotMode,
    pub readonly: bool,
    pub shareable: bool,
    pub transient: bool,
    pub encryption: Option<Encryption>,
    pub info: DeviceInfo,
}

const DISK_PREFIXES: &[&str] = &["hd", "sd", "vd", "xvd", "ubd"];

fn bus_from_target(dst: &str) -> DiskBus {
    if dst.starts_with("hd") {
        DiskBus::Ide
    } else if dst.starts_with("sd") {
        DiskBus::Scsi
    } else if dst.starts_with("vd") {
        DiskBus::Virtio
    } else if dst.starts_with("xvd") {
        DiskBus::Xen
    } else if dst.starts_with("ubd") {
        DiskBus::Uml
    } else {
        DiskBus::Ide
    }
}

impl DiskDef {
    pub fn parse(node: &Element, ctx: &ParseContext) -> Result<Self> {
        let mut def = DiskDef {
            kind: node.attr_enum("type")?.unwrap_or_default(),
            device: node.attr_enum("device")?.unwrap_or_default(),
            ..Default::default()
        };

        let mut source_seen = false;
        let mut target: Option<String> = None;
        let mut bus: Option<DiskBus> = None;

        for child in node.elements() {
            match child.name() {
                "source" if !source_seen => {
                    source_seen = true;
                    def.parse_source(child)?;
                }
                "target" if target.is_none() => {
                    target = child.attr("dev").map(str::to_owned);
                    bus = child.attr_enum("bus")?;
                }
                "driver" => def.parse_driver(child)?,
                "readonly" => def.readonly = true,
                "shareable" => def.shareable = true,
                "transient" => def.transient = true,
                "serial" if def.serial.is_none() => {
                    def.serial = Some(child.text().to_owned());
                }
                "encryption" if def.encryption.is_none() => {
                    def.encryption = Some(Encryption::parse(child)?);
                }
                _ => {}
            }
        }

        let has_source = def.src.is_some() || def.protocol.is_some();
        if !has_source
            && def.device != DiskDevice::Cdrom
            && def.device != DiskDevice::Floppy
        {
            return Err(Error::NoSource(target.unwrap_or_default()));
        }

        let mut dst = target.ok_or_else(|| {
            Error::NoTarget(def.src.clone().unwrap_or_default())
        })?;

        if let Some(stripped) = dst.strip_prefix("ioemu:") {
            warn!(ctx.log, "stripping legacy target prefix";
                "target" => &dst, "stripped" => stripped);
            dst = stripped.to_owned();
        }

        if def.device == DiskDevice::Floppy && !dst.starts_with("fd") {
            return Err(Error::Xml(format!(
                "Invalid floppy device name: {}",
                dst
            )));
        }

        if def.device == DiskDevice::Disk
            && !DISK_PREFIXES.iter().any(|p| dst.starts_with(p))
        {
            return Err(Error::Xml(format!(
                "Invalid harddisk device name: {}",
                dst
            )));
        }

        // Force CDROM to be listed as read only.
        if def.device == DiskDevice::Cdrom {
            def.readonly = true;
        }

        def.bus = match bus {
            Some(bus) => bus,
            None if def.device == DiskDevice::Floppy => DiskBus::Fdc,
            None => bus_from_target(&dst),
        };

        if def.device == DiskDevice::Floppy && def.bus != DiskBus::Fdc {
            return Err(Error::ConfigUnsupported(format!(
                "Invalid bus type '{}' for floppy disk",
                def.bus
            )));
        }
        if def.device != DiskDevice::Floppy && def.bus == DiskBus::Fdc {
            return Err(Error::ConfigUnsupported(format!(
                "Invalid bus type '{}' for disk",
                def.bus
            )));
        }

        if !def.ioeventfd.is_default() && def.bus != DiskBus::Virtio {
            return Err(Error::ConfigUnsupported(
                "disk ioeventfd mode supported only for virtio bus"
                    .to_string(),
            ));
        }
        if !def.event_idx.is_default() && def.bus != DiskBus::Virtio {
            return Err(Error::ConfigUnsupported(
                "disk event_idx mode supported only for virtio bus"
                    .to_string(),
            ));
        }

        def.snapshot = node.attr_enum("snapshot")?.unwrap_or_default();
        if def.snapshot == SnapshotMode::Default && def.readonly {
            def.snapshot = SnapshotMode::No;
        }

        def.dst = dst;
        def.info = DeviceInfo::parse(
            node,
            ctx.flags,
            InfoAllow::BOOT | InfoAllow::LEGACY_STATE,
        )?;

        if def.driver_name.is_none() {
            def.driver_name = ctx.caps.default_disk_driver_name.clone();
        }
        if def.driver_type.is_none() {
            def.driver_type = ctx.caps.default_disk_driver_type.clone();
        }

        if def.info.addr.is_none()
            && matches!(def.bus, DiskBus::Scsi | DiskBus::Ide | DiskBus::Fdc)
        {
            def.assign_address(ctx.caps.has_wide_scsi_bus)?;
        }

        Ok(def)
    }

    /// Gives the disk the drive address implied by its target name.
    pub fn assign_address(&mut self, wide_scsi: bool) -> Result<()> {
        let addr = drive_address_for(self.bus, &self.dst, wide_scsi)
            .ok_or_else(|| {
                Error::Internal(format!(
                    "Unknown disk name '{}' and no address specified",
                    self.dst
                ))
            })?;
        self.info.addr = DeviceAddress::Drive(addr);
        Ok(())
    }

    fn parse_source(&mut self, node: &Element) -> Result<()> {
        self.src = match self.kind {
            DiskType::File => node.attr("file").map(str::to_owned),
            DiskType::Block => node.attr("dev").map(str::to_owned),
            DiskType::Dir => node.attr("dir").map(str::to_owned),
            DiskType::Network => {
                let protocol = node.attr("protocol").ok_or_else(|| {
                    Error::Xml(
                        "missing network source protocol type".to_string(),
                    )
                })?;
                let protocol: DiskProtocol =
                    crate::enums::parse_enum(protocol)?;
                self.protocol = Some(protocol);

                let name = node.attr("name").map(str::to_owned);
                if name.is_none() && protocol != DiskProtocol::Nbd {
                    return Err(Error::Xml(
                        "missing name for disk source".to_string(),
                    ));
                }

                for host in node.children_named("host") {
                    let name = host.attr("name").ok_or_else(|| {
                        Error::Xml("missing name for host".to_string())
                    })?;
                    let port = host.attr("port").ok_or_else(|| {
                        Error::Xml("missing port for host".to_string())
                    })?;
                    self.hosts.push(DiskHost {
                        name: name.to_owned(),
                        port: port.to_owned(),
                    });
                }
                name
            }
        };
        Ok(())
    }

    fn parse_driver(&mut self, node: &Element) -> Result<()> {
        self.driver_name = node.attr("name").map(str::to_owned);
        self.driver_type = node.attr("type").map(str::to_owned);
        self.cache = node.attr_enum("cache")?.unwrap_or_default();
        self.error_policy = node.attr_enum("error_policy")?.unwrap_or_default();
        self.io = node.attr_enum("io")?.unwrap_or_default();
        self.ioeventfd = node.attr_enum("ioeventfd")?.unwrap_or_default();
        self.event_idx = node.attr_enum("event_idx")?.unwrap_or_default();
        Ok(())
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        let implied_no = self.readonly && self.snapshot == SnapshotMode::No;
        w.open(
            Tag::new("disk")
                .attr("type", self.kind)
                .attr("device", self.device)
                .attr_if(
                    self.snapshot != SnapshotMode::Default && !implied_no,
                    "snapshot",
                    self.snapshot,
                ),
        );

        let driver = Tag::new("driver")
            .attr_opt("name", self.driver_name.as_deref())
            .attr_opt("type", self.driver_type.as_deref())
            .attr_if(
                !matches!(self.cache, DiskCache::Default),
                "cache",
                self.cache,
            )
            .attr_if(
                !matches!(self.error_policy, DiskErrorPolicy::Default),
                "error_policy",
                self.error_policy,
            )
            .attr_if(!matches!(self.io, DiskIo::Default), "io", self.io)
            .attr_if(!self.ioeventfd.is_default(), "ioeventfd", self.ioeventfd)
            .attr_if(!self.event_idx.is_default(), "event_idx", self.event_idx);
        if driver.has_attrs() {
            w.empty(driver);
        }

        self.format_source(w)?;

        w.empty(
            Tag::new("target").attr("dev", &self.dst).attr("bus", self.bus),
        );

        if self.readonly {
            w.empty(Tag::new("readonly"));
        }
        if self.shareable {
            w.empty(Tag::new("shareable"));
        }
        if self.transient {
            w.empty(Tag::new("transient"));
        }
        w.leaf_opt("serial", self.serial.as_deref());
        if let Some(enc) = &self.encryption {
            enc.format(w);
        }
        self.info.format(w, flags);

        w.close("disk");
        Ok(())
    }

    fn format_source(&self, w: &mut XmlWriter) -> Result<()> {
        match self.kind {
            DiskType::Network => {
                let protocol = self.protocol.ok_or_else(|| {
                    Error::Internal(format!(
                        "network disk '{}' has no protocol",
                        self.dst
                    ))
                })?;
                let tag = Tag::new("source")
                    .attr("protocol", protocol)
                    .attr_opt("name", self.src.as_deref());
                let mut hosts = w.nested();
                for h in &self.hosts {
                    hosts.empty(
                        Tag::new("host")
                            .attr("name", &h.name)
                            .attr("port", &h.port),
                    );
                }
                w.element_with(tag, hosts);
            }
            kind => {
                if let Some(src) = &self.src {
                    let attr = match kind {
                        DiskType::Block => "dev",
                        DiskType::Dir => "dir",
                        _ => "file",
                    };
                    w.empty(Tag::new("source").attr(attr, src));
                }
            }
        }
        Ok(())
    }
}

impl Encryption {
    fn parse(node: &Element) -> Result<Self> {
        let format = match node.attr("format") {
            Some(f) => crate::enums::parse_enum(f)?,
            None => {
                return Err(Error::Xml(
                    "unknown volume encryption format".to_string(),
                ))
            }
        };
        let mut secrets = Vec::new();
        for s in node.children_named("secret") {
            let kind = s.attr("type").ok_or_else(|| {
                Error::Xml("missing volume encryption secret type".to_string())
            })?;
            let uuid = s.attr("uuid").ok_or_else(|| {
                Error::Xml("missing volume encryption uuid".to_string())
            })?;
            let uuid = Uuid::parse_str(uuid).map_err(|_| {
                Error::Xml(format!(
                    "malformed volume encryption uuid '{}'",
                    uuid
                ))
            })?;
            secrets.push(EncryptionSecret { kind: kind.to_owned(), uuid });
        }
        Ok(Encryption { format, secrets })
    }

    fn format(&self, w: &mut XmlWriter) {
        let mut inner = w.nested();
        for s in &self.secrets {
            inner.empty(
                Tag::new("secret").attr("type", &s.kind).attr("uuid", s.uuid),
            );
        }
        let tag = Tag::new("encryption").attr("format", self.format);
        w.element_with(tag, inner);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::test::test_ctx;
    use crate::error::ErrorKind;
    use crate::xml::parse_document;
    use domconf_types::DriveAddress;

    fn parse(xml: &str) -> Result<DiskDef> {
        DiskDef::parse(&parse_document(xml)?, &test_ctx())
    }

    fn format(disk: &DiskDef) -> String {
        let mut w = XmlWriter::new();
        disk.format(&mut w, XmlFlags::INACTIVE).unwrap();
        w.into_string()
    }

    #[test]
    fn file_disk_defaults() {
        let d = parse(
            "<disk type='file' device='disk'><source file='/v.img'/>\
             <target dev='hdc'/></disk>",
        )
        .unwrap();
        assert_eq!(d.bus, DiskBus::Ide);
        assert_eq!(d.src.as_deref(), Some("/v.img"));
        assert_eq!(
            d.info.addr,
            DeviceAddress::Drive(DriveAddress {
                controller: 0,
                bus: 1,
                unit: 0
            })
        );
        assert_eq!(
            format(&d),
            "<disk type='file' device='disk'>\n  <source file='/v.img'/>\n  \
             <target dev='hdc' bus='ide'/>\n  \
             <address type='drive' controller='0' bus='1' unit='0'/>\n</disk>\n"
        );
    }

    #[test]
    fn bus_inferred_from_prefix() {
        for (dst, bus) in [
            ("vda", DiskBus::Virtio),
            ("xvdb", DiskBus::Xen),
            ("ubda", DiskBus::Uml),
            ("sdc", DiskBus::Scsi),
        ] {
            let xml = format!(
                "<disk type='block'><source dev='/dev/x'/><target dev='{}'/>\
                 </disk>",
                dst
            );
            assert_eq!(parse(&xml).unwrap().bus, bus, "{}", dst);
        }
    }

    #[test]
    fn cdrom_is_readonly_and_not_snapshotted() {
        let d = parse(
            "<disk type='file' device='cdrom'><target dev='hdc'/></disk>",
        )
        .unwrap();
        assert!(d.readonly);
        assert_eq!(d.snapshot, SnapshotMode::No);
        assert!(d.src.is_none());
        assert!(!format(&d).contains("snapshot="));
    }

    #[test]
    fn floppy_rules() {
        let d = parse(
            "<disk type='file' device='floppy'><target dev='fdb'/></disk>",
        )
        .unwrap();
        assert_eq!(d.bus, DiskBus::Fdc);

        let err = parse(
            "<disk type='file' device='floppy'><target dev='hda'/></disk>",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::XmlError);

        let err = parse(
            "<disk type='file' device='floppy'><target dev='fda' bus='ide'/>\
             </disk>",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigUnsupported);

        let err = parse(
            "<disk type='file'><source file='/a'/><target dev='hda' bus='fdc'/>\
             </disk>",
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigUnsupported);
    }

    #[test]
    fn missing_source_and_target() {
        let err =
            parse("<disk type='file'><target dev='hda'/></disk>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSource);
        let err =
            parse("<disk type='file'><source file='/a'/></disk>").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoTarget);
    }

    #[test]
    fn virtio_only_driver_options() {
        let ok = parse(
            "<disk type='file'><driver name='qemu' type='raw' ioeventfd='on' \
             event_idx='off'/><source file='/a'/><target dev='vda'/></disk>",
        )
        .unwrap();
        assert_eq!(ok.ioeventfd, TriState::On);
        assert_eq!(ok.event_idx, TriState::Off);
        assert!(ok.info.addr.is_none());

        for attr in ["ioeventfd='on'", "event_idx='on'"] {
            let xml = format!(
                "<disk type='file'><driver {}/><source file='/a'/>\
                 <target dev='hda'/></disk>",
                attr
            );
            assert_eq!(
                parse(&xml).unwrap_err().kind(),
                ErrorKind::ConfigUnsupported
            );
        }
    }

    #[test]
    fn network_sources() {
        let d = parse(
            "<disk type='network'><source protocol='rbd' name='pool/img'>\
             <host name='mon1' port='6789'/><host name='mon2' port='6789'/>\
             </source><target dev='vdb'/></disk>",
        )
        .unwrap();
        assert_eq!(d.protocol, Some(DiskProtocol::Rbd));
        assert_eq!(d.hosts.len(), 2);
        let text = format(&d);
        assert!(text.contains(
            "<source protocol='rbd' name='pool/img'>\n    \
             <host name='mon1' port='6789'/>"
        ));

        assert!(parse(
            "<disk type='network'><source protocol='nbd'>\
             <host name='h' port='1'/></source><target dev='vdb'/></disk>"
        )
        .is_ok());
        assert!(parse(
            "<disk type='network'><source protocol='sheepdog'/>\
             <target dev='vdb'/></disk>"
        )
        .is_err());
        assert!(parse(
            "<disk type='network'><source protocol='iscsi' name='x'/>\
             <target dev='vdb'/></disk>"
        )
        .is_err());
    }

    #[test]
    fn legacy_ioemu_prefix_is_stripped() {
        let d = parse(
            "<disk type='file'><source file='/a'/>\
             <target dev='ioemu:hda'/></disk>",
        )
        .unwrap();

        assert_eq!(d.dst, "hda");
    }

    #[test]
    fn unknown_enum_values() {
        let err = parse(
            "<disk type='file'><driver cache='sometimes'/><source file='/a'/>\
             <target dev='hda'/></disk>",
        )
        .unwrap_err();
        assert!(err.to_string().contains("sometimes"));
        assert!(parse("<disk type='floppy'/>").is_err());
    }

    #[test]
    fn encryption_round_trip() {
        let d = parse(
            "<disk type='file'><source file='/a'/><target dev='vda'/>\
             <encryption format='qcow'><secret type='passphrase' \
             uuid='0a81f5b2-8403-7b23-c8d6-21ccc2f80d6f'/></encryption></disk>",
        )
        .unwrap();
        let enc = d.encryption.as_ref().unwrap();
        assert_eq!(enc.format, EncryptionFormat::Qcow);
        let again = parse(&format(&d)).unwrap();
        assert_eq!(again, d);
    }
}
