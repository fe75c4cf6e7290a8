// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host USB and PCI devices assigned to a guest.

use domconf_types::PciAddress;

use crate::address::{parse_c_uint, DeviceAddress, DeviceInfo, InfoAllow};
use crate::context::XmlFlags;
use crate::enums::{parse_enum, HostdevMode, HostdevSubsysType};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

/// Host-side state of an assigned PCI device before it was detached,
/// restored when it is given back to the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PciOrigStates {
    pub unbind_from_stub: bool,
    pub remove_slot: bool,
    pub reprobe: bool,
}

impl PciOrigStates {
    fn is_empty(&self) -> bool {
        !(self.unbind_from_stub || self.remove_slot || self.reprobe)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostdevSource {
    Usb {
        vendor: Option<u16>,
        product: Option<u16>,
        bus: Option<u32>,
        device: Option<u32>,
    },
    Pci {
        addr: PciAddress,
        orig_states: PciOrigStates,
    },
}

impl HostdevSource {
    pub fn subsys_type(&self) -> HostdevSubsysType {
        match self {
            HostdevSource::Usb { .. } => HostdevSubsysType::Usb,
            HostdevSource::Pci { .. } => HostdevSubsysType::Pci,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostdevDef {
    pub managed: bool,
    pub source: HostdevSource,
    /// Attached by the host for the lifetime of one run only. Never read
    /// from a document.
    pub ephemeral: bool,
    pub info: DeviceInfo,
}

fn id_field(node: Option<&Element>, what: &str) -> Result<Option<u16>> {
    let Some(node) = node else {
        return Ok(None);
    };
    let id = node.attr("id").ok_or_else(|| {
        Error::Xml(format!("usb {} needs id", what))
    })?;
    parse_c_uint(id)
        .and_then(|v| u16::try_from(v).ok())
        .map(Some)
        .ok_or_else(|| Error::Xml(format!("cannot parse {} {}", what, id)))
}

fn parse_usb(source: &Element) -> Result<HostdevSource> {
    let vendor = id_field(source.child("vendor"), "vendor")?;
    let product = id_field(source.child("product"), "product")?;

    let (mut bus, mut device) = (None, None);
    if let Some(addr) = source.child("address") {
        let field = |name: &str| -> Result<u32> {
            let v = addr.attr(name).ok_or_else(|| {
                Error::Xml(format!("usb address needs {} id", name))
            })?;
            parse_c_uint(v).ok_or_else(|| {
                Error::Xml(format!("cannot parse {} {}", name, v))
            })
        };
        bus = Some(field("bus")?);
        device = Some(field("device")?);
    }

    match (vendor, product) {
        (Some(_), None) => {
            return Err(Error::Xml(
                "missing product id for usb device".to_string(),
            ))
        }
        (None, Some(_)) => {
            return Err(Error::Xml(
                "missing vendor id for usb device".to_string(),
            ))
        }
        (None, None) if bus.is_none() => {
            return Err(Error::Xml(
                "usb hostdev needs either a vendor/product pair or a \
                 bus/device address"
                    .to_string(),
            ))
        }
        _ => {}
    }

    Ok(HostdevSource::Usb { vendor, product, bus, device })
}

fn parse_pci(source: &Element, flags: XmlFlags) -> Result<HostdevSource> {
    let addr = source.child("address").ok_or_else(|| {
        Error::Xml("PCI host devices need a source address".to_string())
    })?;
    let field = |name: &str| -> Result<u32> {
        match addr.attr(name) {
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

    let mut orig_states = PciOrigStates::default();
    if flags.contains(XmlFlags::INTERNAL_STATUS) {
        if let Some(states) = source.child("origstates") {
            for s in states.elements() {
                match s.name() {
                    "unbind" => orig_states.unbind_from_stub = true,
                    "removeslot" => orig_states.remove_slot = true,
                    "reprobe" => orig_states.reprobe = true,
                    other => {
                        return Err(Error::Internal(format!(
                            "unsupported element '{}' of 'origstates'",
                            other
                        )))
                    }
                }
            }
        }
    }

    Ok(HostdevSource::Pci { addr, orig_states })
}

impl HostdevDef {
    pub fn parse(node: &Element, flags: XmlFlags) -> Result<Self> {
        let mode: HostdevMode = node.attr_enum("mode")?.unwrap_or_default();
        if mode != HostdevMode::Subsystem {
            return Err(Error::ConfigUnsupported(format!(
                "unexpected hostdev mode '{}'",
                mode
            )));
        }

        let subsys: HostdevSubsysType = match node.attr("type") {
            Some(t) => parse_enum(t)?,
            None => {
                return Err(Error::Xml(
                    "missing type in hostdev".to_string(),
                ))
            }
        };

        let managed = node.attr("managed") == Some("yes");

        let source = node.child("source").ok_or_else(|| {
            Error::Xml("Missing <source> element in hostdev device".to_string())
        })?;
        let source = match subsys {
            HostdevSubsysType::Usb => parse_usb(source)?,
            HostdevSubsysType::Pci => parse_pci(source, flags)?,
        };

        let info =
            DeviceInfo::parse(node, flags, InfoAllow::BOOT | InfoAllow::ROM)?;

        if subsys == HostdevSubsysType::Pci
            && !matches!(
                info.addr,
                DeviceAddress::None | DeviceAddress::Pci { .. }
            )
        {
            return Err(Error::ConfigUnsupported(
                "PCI host devices must use 'pci' address type".to_string(),
            ));
        }
        if subsys == HostdevSubsysType::Usb && !info.rom_bar.is_default() {
            return Err(Error::ConfigUnsupported(
                "ROM tuning is only supported for PCI devices".to_string(),
            ));
        }

        Ok(HostdevDef { managed, source, ephemeral: false, info })
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        w.open(
            Tag::new("hostdev")
                .attr("mode", HostdevMode::Subsystem)
                .attr("type", self.source.subsys_type())
                .attr("managed", if self.managed { "yes" } else { "no" }),
        );

        w.open(Tag::new("source"));
        match &self.source {
            HostdevSource::Usb { vendor, product, bus, device } => {
                if let Some(v) = vendor {
                    w.empty(
                        Tag::new("vendor")
                            .attr("id", format_args!("{:#06x}", v)),

                    );
                }
                if let Some(p) = product {
                    w.empty(
                        Tag::new("product")
                            .attr("id", format_args!("{:#06x}", p)),
                    );
                }
                if let (Some(b), Some(d)) = (bus, device) {
                    w.empty(
                        Tag::new("address").attr("bus", b).attr("device", d),
                    );
                }
            }
            HostdevSource::Pci { addr, orig_states } => {
                w.empty(
                    Tag::new("address")
                        .attr("domain", format_args!("{:#06x}", addr.domain()))
                        .attr("bus", format_args!("{:#04x}", addr.bus()))
                        .attr("slot", format_args!("{:#04x}", addr.slot()))
                        .attr(
                            "function",
                            format_args!("{:#x}", addr.function()),
                        ),
                );
                if flags.contains(XmlFlags::INTERNAL_STATUS)
                    && !orig_states.is_empty()
                {
                    w.open(Tag::new("origstates"));
                    if orig_states.unbind_from_stub {
                        w.empty(Tag::new("unbind"));
                    }
                    if orig_states.remove_slot {
                        w.empty(Tag::new("removeslot"));
                    }
                    if orig_states.reprobe {
                        w.empty(Tag::new("reprobe"));
                    }
                    w.close("origstates");
                }
            }
        }
        w.close("source");

        self.info.format(w, flags);
        w.close("hostdev");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::enums::TriState;
    use crate::xml::parse_document;

    fn parse(xml: &str, flags: XmlFlags) -> Result<HostdevDef> {
        HostdevDef::parse(&parse_document(xml)?, flags)
    }

    fn format(h: &HostdevDef, flags: XmlFlags) -> String {
        let mut w = XmlWriter::new();
        h.format(&mut w, flags).unwrap();
        w.into_string()
    }

    #[test]
    fn usb_by_id_or_address() {
        let h = parse(
            "<hostdev mode='subsystem' type='usb'><source><vendor id='0x0204'/>\
             <product id='0x6025'/></source></hostdev>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert!(!h.managed);
        assert_eq!(
            format(&h, XmlFlags::INACTIVE),
            "<hostdev mode='subsystem' type='usb' managed='no'>\n  \
             <source>\n    <vendor id='0x0204'/>\n    \
             <product id='0x6025'/>\n  </source>\n</hostdev>\n"
        );

        let h = parse(
            "<hostdev type='usb'><source><address bus='2' device='5'/></source>\
             </hostdev>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert!(matches!(
            h.source,
            HostdevSource::Usb { bus: Some(2), device: Some(5), .. }
        ));

        for bad in [
            "<hostdev type='usb'><source><vendor id='0x0204'/></source>\
             </hostdev>",
            "<hostdev type='usb'><source><product id='0x0204'/></source>\
             </hostdev>",
            "<hostdev type='usb'><source/></hostdev>",
            "<hostdev type='usb'><source><address bus='1' device='2'/></source>\
             <rom bar='off'/></hostdev>",
            "<hostdev mode='capabilities' type='usb'/>",
            "<hostdev mode='subsystem'/>",
        ] {
            assert!(parse(bad, XmlFlags::INACTIVE).is_err(), "{}", bad);
        }
    }

    #[test]
    fn pci_with_rom_and_orig_states() {
        let xml = "<hostdev mode='subsystem' type='pci' managed='yes'><source>\
            <address domain='0x0000' bus='0x06' slot='0x12' function='0x5'/>\
            <origstates><unbind/><reprobe/></origstates></source>\
            <rom bar='on'/><address type='pci' slot='0x07'/></hostdev>";

        let inactive = parse(xml, XmlFlags::INACTIVE).unwrap();
        assert_eq!(inactive.info.rom_bar, TriState::On);
        match &inactive.source {
            HostdevSource::Pci { addr, orig_states } => {
                assert_eq!(
                    (addr.bus(), addr.slot(), addr.function()),
                    (6, 0x12, 5)
                );
                assert!(orig_states.is_empty());
            }
            other => panic!("unexpected source {:?}", other),
        }

        let status = parse(xml, XmlFlags::INTERNAL_STATUS).unwrap();
        let text = format(&status, XmlFlags::INTERNAL_STATUS);
        assert!(text.contains(
            "<origstates>\n      <unbind/>\n      <reprobe/>\n    \
             </origstates>"
        ));

        assert!(!format(&status, XmlFlags::INACTIVE).contains("origstates"));
        assert_eq!(parse(&text, XmlFlags::INTERNAL_STATUS).unwrap(), status);

        assert!(parse(
            "<hostdev type='pci'><source/></hostdev>",
            XmlFlags::INACTIVE
        )
        .is_err());
        assert!(parse(
            "<hostdev type='pci'><source><address bus='0x1'/></source>\
             <address type='drive'/></hostdev>",
            XmlFlags::INACTIVE
        )
        .is_err());
    }
}
