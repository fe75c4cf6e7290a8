// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reading a `<domain>` document into a [`DomainDef`].

use std::collections::BTreeSet;

use domconf_types::VirtioSerialAddress;
use slog::debug;
use uuid::Uuid;

use super::{
    BlkioTune, ClockDef, CpuTune, DomainDef, DomainFeatures, MemoryDef,
    NumaTune, OsDef, SecLabel, VcpuDef,
};
use crate::address::DeviceAddress;
use crate::context::{NamespaceData, ParseContext, XmlFlags};
use crate::cpu::{CpuDef, CpuType};
use crate::device::video::default_video_type;
use crate::device::{
    ChrDef, ChrTarget, ControllerDef, DiskDef, FsDef, GraphicsDef, HostdevDef,
    InputDef, LeaseDef, MemballoonDef, NetDef, SmartcardDef, SoundDef,
    VideoDef, WatchdogDef,
};
use crate::enums::{
    parse_enum, ChrDeviceType, ConsoleTargetType, MemballoonModel,
    SmbiosMode, VirtType,
};
use crate::error::{Error, Result};
use crate::sysinfo::SysinfoDef;
use crate::xml::{parse_document, Element};

/// Parses serials or parallels, numbering ports that were left out one
/// past the highest port seen so far. The first such port is 1.
fn parse_ports(
    root: &Element,
    path: &str,
    flags: XmlFlags,
    console_default: ConsoleTargetType,
) -> Result<Vec<ChrDef>> {
    let mut list: Vec<ChrDef> = Vec::new();
    for node in root.path_all(path) {
        let mut chr = ChrDef::parse(node, flags, console_default)?;
        if chr.port() == Some(-1) {
            let max = list.iter().filter_map(ChrDef::port).max().unwrap_or(0);
            chr.set_port(max + 1);
        }
        list.push(chr);
    }
    Ok(list)
}

/// Places virtio channels without a usable address on the next free port
/// of their virtio-serial bus. Port 0 is reserved for the console.
fn assign_channel_ports(channels: &mut [ChrDef]) {
    for i in 0..channels.len() {
        if !channels[i].is_virtio_channel() {
            continue;
        }
        let (controller, bus) = match channels[i].info.addr {
            DeviceAddress::None => (0, 0),
            DeviceAddress::VirtioSerial(a) if a.port == 0 => {
                (a.controller, a.bus)
            }
            _ => continue,
        };
        let max = channels[..i]
            .iter()
            .filter_map(|c| match c.info.addr {
                DeviceAddress::VirtioSerial(a)
                    if a.controller == controller && a.bus == bus =>
                {
                    Some(a.port)
                }
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let addr = VirtioSerialAddress { controller, bus, port: max + 1 };
        channels[i].info.addr = DeviceAddress::VirtioSerial(addr);
    }
}

fn parse_features(root: &Element) -> Result<DomainFeatures> {
    let mut features = DomainFeatures::empty();
    let Some(node) = root.child("features") else {
        return Ok(features);
    };
    for child in node.elements() {
        let (_, flag) = DomainFeatures::NAMES
            .iter()
            .find(|(name, _)| *name == child.name())
            .ok_or_else(|| {
                Error::ConfigUnsupported(format!(
                    "unknown feature '{}'",
                    child.name()
                ))
            })?;
        features |= *flag;
    }
    Ok(features)
}

fn parse_lifecycle<T: crate::enums::VirEnum>(
    root: &Element,
    name: &str,
    default: T,
) -> Result<T> {
    match root.path_text(name) {
        Some(action) => parse_enum(action),
        None => Ok(default),
    }
}

/// Per-device boot orders must be unique and, taken together, run from 1
/// without gaps.
fn check_boot_order(def: &DomainDef) -> Result<()> {
    let orders = def
        .disks
        .iter()
        .map(|d| d.info.boot_index)
        .chain(def.nets.iter().map(|n| n.info.boot_index))
        .chain(def.hostdevs.iter().map(|h| h.info.boot_index))
        .flatten();

    let mut seen = BTreeSet::new();
    for order in orders {
        if !seen.insert(order) {
            return Err(Error::Xml(format!(
                "boot order '{}' used for more than one device",
                order
            )));
        }
    }
    for (expected, order) in (1u32..).zip(seen.iter()) {
        if *order != expected {
            return Err(Error::ConfigUnsupported(format!(
                "boot orders must be contiguous, order {} is missing",
                expected
            )));
        }
    }
    Ok(())
}

impl DomainDef {
    /// Parses a complete `<domain>` document.
    pub fn parse_str(xml: &str, ctx: &ParseContext) -> Result<DomainDef> {
        let root = parse_document(xml)?;
        Self::parse_node(&root, ctx)
    }

    /// Parses an already loaded `<domain>` element.
    pub fn parse_node(root: &Element, ctx: &ParseContext) -> Result<DomainDef> {
        if root.name() != "domain" {
            return Err(Error::Xml(format!(
                "expecting root element of 'domain', not '{}'",
                root.name()
            )));
        }
        let flags = ctx.flags;
        let caps = &ctx.caps;

        let id = if ctx.has(XmlFlags::INACTIVE) {
            -1
        } else {
            root.attr_parse::<i32>("id")?.unwrap_or(-1)
        };

        let virt_type: VirtType = match root.attr("type") {
            Some(t) => parse_enum(t)?,
            None => {
                return Err(Error::Internal(
                    "missing domain type attribute".to_string(),
                ))
            }
        };
        if ctx.expected_virt_types & virt_type.mask() == 0 {
            return Err(Error::Internal(format!(
                "unexpected domain type {}",
                virt_type
            )));
        }

        let name = root
            .path_text("name")
            .ok_or_else(|| Error::NoName("domain definition".to_string()))?;

        let sysinfo = root.child("sysinfo").map(SysinfoDef::parse).transpose()?;
        let uuid = match root.path_text("uuid") {
            Some(u) => Uuid::parse_str(u).map_err(|_| {
                Error::Internal(format!("malformed uuid element '{}'", u))
            })?,
            None => match sysinfo.as_ref().and_then(SysinfoDef::uuid) {
                Some(u) => u,
                None => ctx.generate_uuid(),
            },
        };
        if let Some(sys_uuid) = sysinfo.as_ref().and_then(SysinfoDef::uuid) {
            if sys_uuid != uuid {
                return Err(Error::ConfigUnsupported(format!(
                    "UUID mismatch between <uuid> '{}' and <sysinfo> '{}'",
                    uuid, sys_uuid
                )));
            }
        }

        let mut def = DomainDef::new(virt_type, name, uuid);
        def.id = id;
        def.sysinfo = sysinfo;
        def.description = root.path_text("description").map(str::to_owned);

        def.mem = MemoryDef::parse(root)?;
        def.blkio = BlkioTune::parse(root)?;
        def.vcpu = VcpuDef::parse(root)?;
        def.cputune = CpuTune::parse(root, def.vcpu.max)?;
        def.numatune = NumaTune::parse(root)?;
        def.features = parse_features(root)?;

        def.on_reboot = parse_lifecycle(root, "on_reboot", def.on_reboot)?;
        def.on_poweroff =
            parse_lifecycle(root, "on_poweroff", def.on_poweroff)?;
        def.on_crash = parse_lifecycle(root, "on_crash", def.on_crash)?;

        def.clock = ClockDef::parse(root)?;

        let per_device_boot = root
            .path("devices")
            .map_or(false, |d| {
                d.elements().any(|dev| dev.child("boot").is_some())
            });
        def.os = OsDef::parse(root, ctx, virt_type, per_device_boot)?;
        let hvm = def.os.is_hvm();

        def.emulator = match root.path_text("devices/emulator") {
            Some(e) => Some(e.to_owned()),
            None if caps.emulator_required => Some(
                caps.default_emulator(&def.os.os_type, &def.os.arch, virt_type)
                    .ok_or_else(|| {
                        Error::Internal(format!(
                            "unsupported guest type '{}' '{}'",
                            def.os.os_type, def.os.arch
                        ))
                    })?
                    .to_owned(),
            ),
            None => None,
        };

        for node in root.path_all("devices/disk") {
            def.insert_disk(DiskDef::parse(node, ctx)?);
        }
        for node in root.path_all("devices/controller") {
            def.insert_controller(ControllerDef::parse(node, flags)?);
        }
        def.leases = root
            .path_all("devices/lease")
            .into_iter()
            .map(LeaseDef::parse)
            .collect::<Result<_>>()?;
        def.fss = root
            .path_all("devices/filesystem")
            .into_iter()
            .map(|n| FsDef::parse(n, flags))
            .collect::<Result<_>>()?;
        def.nets = root
            .path_all("devices/interface")
            .into_iter()
            .map(|n| NetDef::parse(n, ctx))
            .collect::<Result<_>>()?;
        def.smartcards = root
            .path_all("devices/smartcard")
            .into_iter()
            .map(|n| SmartcardDef::parse(n, flags))
            .collect::<Result<_>>()?;

        let console_default = caps.default_console_target(&def.os.os_type);
        def.parallels =
            parse_ports(root, "devices/parallel", flags, console_default)?;
        def.serials =
            parse_ports(root, "devices/serial", flags, console_default)?;

        if let Some(node) = root.path("devices/console") {
            let mut console = ChrDef::parse(node, flags, console_default)?;
            let serial_target = matches!(
                console.target,
                ChrTarget::Console { kind: ConsoleTargetType::Serial, .. }
            );
            if hvm && serial_target {
                // The console is the first serial port seen another way.
                if def.serials.is_empty() {
                    let port = console.port().unwrap_or(0);
                    console.device_type = ChrDeviceType::Serial;
                    console.target = ChrTarget::Port(port);
                    def.serials.push(console);
                }
            } else {
                def.console = Some(console);
            }
        }

        def.channels = root
            .path_all("devices/channel")
            .into_iter()
            .map(|n| ChrDef::parse(n, flags, console_default))
            .collect::<Result<_>>()?;
        assign_channel_ports(&mut def.channels);

        for node in root.path_all("devices/input") {
            let input = InputDef::parse(node, flags, hvm)?;
            if !input.is_implicit_mouse(hvm) {
                def.inputs.push(input);
            }
        }

        def.graphics = root
            .path_all("devices/graphics")
            .into_iter()
            .map(|n| GraphicsDef::parse(n, flags))
            .collect::<Result<_>>()?;
        if hvm || !def.graphics.is_empty() {
            def.inputs.push(InputDef::implicit_mouse(hvm));
        }

        def.sounds = root
            .path_all("devices/sound")
            .into_iter()
            .map(|n| SoundDef::parse(n, flags))
            .collect::<Result<_>>()?;

        def.videos = root
            .path_all("devices/video")
            .into_iter()
            .map(|n| VideoDef::parse(n, flags, virt_type, &def.os.os_type))
            .collect::<Result<_>>()?;
        if !def.graphics.is_empty() && def.videos.is_empty() {
            let kind = default_video_type(virt_type, &def.os.os_type)
                .ok_or_else(|| {
                    Error::ConfigUnsupported(
                        "cannot determine default video type".to_string(),
                    )
                })?;
            def.videos.push(VideoDef::new_default(kind, virt_type));
        }

        def.hostdevs = root
            .path_all("devices/hostdev")
            .into_iter()
            .map(|n| HostdevDef::parse(n, flags))
            .collect::<Result<_>>()?;

        let watchdogs = root.path_all("devices/watchdog");
        if watchdogs.len() > 1 {
            return Err(Error::Internal(
                "only a single watchdog device is supported".to_string(),
            ));
        }
        def.watchdog = watchdogs
            .first()
            .map(|n| WatchdogDef::parse(n, flags))
            .transpose()?;

        let balloons = root.path_all("devices/memballoon");
        if balloons.len() > 1 {
            return Err(Error::Internal(
                "only a single memory balloon device is supported".to_string(),
            ));
        }
        def.memballoon = match balloons.first() {
            Some(n) => Some(MemballoonDef::parse(n, flags)?),
            None => match virt_type {
                VirtType::Xen => Some(MemballoonDef::new(MemballoonModel::Xen)),
                VirtType::Qemu | VirtType::Kqemu | VirtType::Kvm => {
                    Some(MemballoonDef::new(MemballoonModel::Virtio))
                }
                _ => None,
            },
        };

        check_boot_order(&def)?;

        def.seclabel = SecLabel::parse(root, flags)?;
        def.cpu = root
            .child("cpu")
            .map(|n| CpuDef::parse(n, CpuType::Guest))
            .transpose()?;

        if def.os.smbios_mode == Some(SmbiosMode::Sysinfo)
            && def.sysinfo.is_none()
        {
            return Err(Error::ConfigUnsupported(
                "smbios mode 'sysinfo' requires a <sysinfo> element"
                    .to_string(),
            ));
        }

        if let Some(handler) = &ctx.ns {
            if let Some(data) = handler.parse(root)? {
                def.namespace =
                    Some(NamespaceData { handler: handler.clone(), data });
            }
        }

        def.add_implicit_controllers();

        debug!(ctx.log, "parsed domain definition";
            "name" => %def.name,
            "uuid" => %def.uuid,
            "virt_type" => %def.virt_type
        );
        Ok(def)
    }
}
