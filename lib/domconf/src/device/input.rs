// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::address::{DeviceInfo, InfoAllow};
use crate::context::XmlFlags;
use crate::enums::{parse_enum, InputBus, InputType};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputDef {
    pub kind: InputType,
    pub bus: InputBus,
    pub info: DeviceInfo,
}

impl InputDef {
    pub fn new(kind: InputType, bus: InputBus) -> Self {
        Self { kind, bus, info: DeviceInfo::default() }
    }

    /// The mouse every guest gets without asking: PS/2 for fully
    /// virtualized guests, the Xen paravirtual pointer otherwise.
    pub fn implicit_mouse(hvm: bool) -> Self {
        let bus = if hvm { InputBus::Ps2 } else { InputBus::Xen };
        Self::new(InputType::Mouse, bus)
    }

    pub fn is_implicit_mouse(&self, hvm: bool) -> bool {
        self.kind == InputType::Mouse
            && ((hvm && self.bus == InputBus::Ps2)
                || (!hvm && self.bus == InputBus::Xen))
    }

    pub fn parse(node: &Element, flags: XmlFlags, hvm: bool) -> Result<Self> {
        let kind: InputType = match node.attr("type") {
            Some(t) => parse_enum(t)?,
            None => {
                return Err(Error::Xml("missing input device type".to_string()))
            }
        };

        let bus = match node.attr("bus") {
            Some(b) => {
                let bus: InputBus = parse_enum(b)?;
                if hvm {
                    if bus == InputBus::Ps2 && kind != InputType::Mouse {
                        return Err(Error::ConfigUnsupported(format!(
                            "ps2 bus does not support {} input device",
                            kind
                        )));
                    }
                    if bus == InputBus::Xen {
                        return Err(Error::ConfigUnsupported(format!(
                            "unsupported input bus {}",
                            bus
                        )));
                    }
                } else {
                    if bus != InputBus::Xen {
                        return Err(Error::ConfigUnsupported(format!(
                            "unsupported input bus {}",
                            bus
                        )));
                    }
                    if kind != InputType::Mouse {
                        return Err(Error::ConfigUnsupported(format!(
                            "xen bus does not support {} input device",
                            kind
                        )));
                    }
                }
                bus
            }
            None if !hvm => InputBus::Xen,
            None if kind == InputType::Mouse => InputBus::Ps2,
            None => InputBus::Usb,
        };

        Ok(InputDef {
            kind,
            bus,
            info: DeviceInfo::parse(node, flags, InfoAllow::empty())?,
        })
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        let tag =
            Tag::new("input").attr("type", self.kind).attr("bus", self.bus);
        let mut inner = w.nested();
        self.info.format(&mut inner, flags);
        w.element_with(tag, inner);
        Ok(())
    }
}
