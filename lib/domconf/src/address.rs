// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Guest-visible device addresses and the common `<alias>`, `<address>`,
//! `<boot>` and `<rom>` children shared by every device.

use std::fmt;

use domconf_types::{CcidAddress, DriveAddress, PciAddress, VirtioSerialAddress};

use crate::context::XmlFlags;
use crate::enums::TriState;
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DeviceAddress {
    #[default]
    None,
    Pci {
        addr: PciAddress,
        multi: TriState,
    },
    Drive(DriveAddress),
    VirtioSerial(VirtioSerialAddress),
    Ccid(CcidAddress),
}

impl DeviceAddress {
    pub fn type_name(&self) -> &'static str {
        match self {
            DeviceAddress::None => "none",
            DeviceAddress::Pci { .. } => "pci",
            DeviceAddress::Drive(_) => "drive",
            DeviceAddress::VirtioSerial(_) => "virtio-serial",
            DeviceAddress::Ccid(_) => "ccid",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DeviceAddress::None)
    }

    pub fn is_pci(&self) -> bool {
        matches!(self, DeviceAddress::Pci { .. })
    }

    fn parse(node: &Element) -> Result<Self> {
        let kind = node.attr("type").ok_or_else(|| {
            Error::Xml("No type specified for device address".to_string())
        })?;

        match kind {
            "pci" => {
                let field = |name: &str| -> Result<u32> {
                    match node.attr(name) {
                        None => Ok(0),
                        Some(v) => parse_c_uint(v).ok_or_else(|| {
                            Error::Xml(format!(
                                "Cannot parse <address> '{}' attribute",
                                name
                            ))
                        }),
                    }
                };
                let addr = PciAddress::new(
                    field("domain")?,
                    field("bus")?,
                    field("slot")?,
                    field("function")?,
                )
                .map_err(|e| Error::Xml(e.to_string()))?;
                let multi = match node.attr("multifunction") {
                    None => TriState::Default,
                    Some("on") => TriState::On,
                    Some("off") => TriState::Off,
                    Some(v) => {
                        return Err(Error::Xml(format!(
                            "Unknown value '{}' for <address> 'multifunction' \
                             attribute",
                            v
                        )))
                    }
                };
                Ok(DeviceAddress::Pci { addr, multi })
            }
            "drive" => Ok(DeviceAddress::Drive(DriveAddress {
                controller: decimal_field(node, "controller")?,
                bus: decimal_field(node, "bus")?,
                unit: decimal_field(node, "unit")?,
            })),
            "virtio-serial" => {
                Ok(DeviceAddress::VirtioSerial(VirtioSerialAddress {
                    controller: decimal_field(node, "controller")?,
                    bus: decimal_field(node, "bus")?,
                    port: decimal_field(node, "port")?,
                }))
            }
            "ccid" => Ok(DeviceAddress::Ccid(CcidAddress {
                controller: decimal_field(node, "controller")?,
                slot: decimal_field(node, "slot")?,
            })),
            other => Err(Error::ConfigUnsupported(format!(
                "unknown address type '{}'",
                other
            ))),
        }
    }

    fn format(&self, w: &mut XmlWriter) {
        let tag = Tag::new("address").attr("type", self.type_name());
        let tag = match self {
            DeviceAddress::None => return,
            DeviceAddress::Pci { addr, multi } => tag
                .attr("domain", format_args!("{:#06x}", addr.domain()))
                .attr("bus", format_args!("{:#04x}", addr.bus()))
                .attr("slot", format_args!("{:#04x}", addr.slot()))
                .attr("function", format_args!("{:#x}", addr.function()))
                .attr_if(!multi.is_default(), "multifunction", multi),
            DeviceAddress::Drive(d) => tag
                .attr("controller", d.controller)
                .attr("bus", d.bus)
                .attr("unit", d.unit),
            DeviceAddress::VirtioSerial(v) => tag
                .attr("controller", v.controller)
                .attr("bus", v.bus)
                .attr("port", v.port),
            DeviceAddress::Ccid(c) => {
                tag.attr("controller", c.controller).attr("slot", c.slot)
            }
        };
        w.empty(tag);
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAddress::None => write!(f, "none"),
            DeviceAddress::Pci { addr, .. } => write!(f, "pci {}", addr),
            DeviceAddress::Drive(a) => write!(f, "drive {}", a),
            DeviceAddress::VirtioSerial(a) => write!(f, "virtio-serial {}", a),
            DeviceAddress::Ccid(a) => write!(f, "ccid {}", a),
        }
    }
}

fn decimal_field(node: &Element, name: &str) -> Result<u32> {
    match node.attr(name) {
        None => Ok(0),
        Some(v) => v.trim().parse::<u32>().map_err(|_| {
            Error::Xml(format!("Cannot parse <address> '{}' attribute", name))
        }),
    }
}

/// Parses an unsigned integer the way `strtoul(s, NULL, 0)` does: a `0x`
/// prefix selects hex, a leading `0` octal, anything else decimal.
pub fn parse_c_uint(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if s.len() > 1 && s.starts_with('0') {
        u32::from_str_radix(&s[1..], 8).ok()
    } else {
        s.parse().ok()
    }
}

bitflags! {
    /// Which optional children a device kind accepts.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct InfoAllow: u8 {
        const BOOT = 1 << 0;
        const ROM = 1 << 1;
        /// Status files written by older releases recorded the PCI address
        /// as `<state devaddr='DOMAIN:BUS:SLOT'/>`.
        const LEGACY_STATE = 1 << 2;
    }
}

/// Identification and placement common to all devices.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Runtime name assigned by the hypervisor driver.
    pub alias: Option<String>,
    pub addr: DeviceAddress,
    /// Per-device boot order, starting at 1.
    pub boot_index: Option<u32>,
    pub rom_bar: TriState,
}

impl DeviceInfo {
    pub fn with_addr(addr: DeviceAddress) -> Self {
        Self { addr, ..Default::default() }
    }

    pub fn parse(
        node: &Element,
        flags: XmlFlags,
        allow: InfoAllow,
    ) -> Result<Self> {
        let mut info = DeviceInfo::default();
        let mut address = None;
        let mut alias = None;
        let mut boot = None;
        let mut rom = None;
        let mut devaddr = None;

        for child in node.elements() {
            match child.name() {
                "address" if address.is_none() => address = Some(child),
                "alias"
                    if alias.is_none()
                        && !flags.contains(XmlFlags::INACTIVE) =>
                {
                    alias = Some(child)
                }
                "boot" if boot.is_none() && allow.contains(InfoAllow::BOOT) => {
                    boot = Some(child)
                }
                "rom" if rom.is_none() && allow.contains(InfoAllow::ROM) => {
                    rom = Some(child)
                }
                "state"
                    if devaddr.is_none()
                        && allow.contains(InfoAllow::LEGACY_STATE)
                        && flags.contains(XmlFlags::INTERNAL_STATUS) =>
                {
                    devaddr = child.attr("devaddr")
                }
                _ => {}
            }
        }

        if let Some(alias) = alias {
            info.alias = alias.attr("name").map(str::to_owned);
        }

        if let Some(boot) = boot {
            let order = boot.attr("order").ok_or_else(|| {
                Error::Internal("missing boot order attribute".to_string())
            })?;
            match order.trim().parse::<u32>() {
                Ok(n) if n > 0 => info.boot_index = Some(n),
                _ => {
                    return Err(Error::Internal(format!(
                        "incorrect boot order '{}', expecting positive integer",
                        order
                    )))
                }
            }
        }

        if let Some(rom) = rom {
            info.rom_bar = match rom.attr("bar") {
                None => TriState::Default,
                Some("on") => TriState::On,
                Some("off") => TriState::Off,
                Some(other) => {
                    return Err(Error::Xml(format!(
                        "unknown rom bar value '{}'",
                        other
                    )))
                }
            };
        }

        if let Some(address) = address {
            info.addr = DeviceAddress::parse(address)?;
        } else if let Some(devaddr) = devaddr {
            let addr = PciAddress::parse_legacy(devaddr).map_err(|_| {
                Error::Internal(format!(
                    "Unable to parse devaddr parameter '{}'",
                    devaddr
                ))
            })?;
            info.addr = DeviceAddress::Pci { addr, multi: TriState::Default };
        }

        Ok(info)
    }

    /// Writes the boot, alias, rom and address children, in that order.
    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) {
        if let Some(order) = self.boot_index {
            w.empty(Tag::new("boot").attr("order", order));
        }
        if let Some(alias) = &self.alias {
            if !flags.contains(XmlFlags::INACTIVE) {
                w.empty(Tag::new("alias").attr("name", alias));
            }
        }
        if !self.rom_bar.is_default() {
            w.empty(Tag::new("rom").attr("bar", self.rom_bar));
        }
        self.addr.format(w);
    }
}
