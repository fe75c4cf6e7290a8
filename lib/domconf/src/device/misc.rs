// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sound cards, watchdogs and memory balloons: devices that are little
//! more than a model name.

use crate::address::{DeviceInfo, InfoAllow};
use crate::context::XmlFlags;
use crate::enums::{
    parse_enum, MemballoonModel, SoundModel, WatchdogAction, WatchdogModel,
};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

fn write_with_info(
    w: &mut XmlWriter,
    tag: Tag,
    info: &DeviceInfo,
    flags: XmlFlags,
) {
    let mut inner = w.nested();
    info.format(&mut inner, flags);
    w.element_with(tag, inner);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoundDef {
    pub model: SoundModel,
    pub info: DeviceInfo,
}

impl SoundDef {
    pub fn parse(node: &Element, flags: XmlFlags) -> Result<Self> {
        let model = match node.attr("model") {
            Some(m) => parse_enum(m)?,
            None => return Err(Error::Xml("missing sound model".to_string())),
        };
        Ok(SoundDef {
            model,
            info: DeviceInfo::parse(node, flags, InfoAllow::empty())?,
        })
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        write_with_info(
            w,
            Tag::new("sound").attr("model", self.model),
            &self.info,
            flags,
        );
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchdogDef {
    pub model: WatchdogModel,
    pub action: WatchdogAction,
    pub info: DeviceInfo,
}

impl WatchdogDef {
    pub fn parse(node: &Element, flags: XmlFlags) -> Result<Self> {
        let model = match node.attr("model") {
            Some(m) => parse_enum(m)?,
            None => {
                return Err(Error::Xml(
                    "watchdog must contain model name".to_string(),
                ))
            }
        };
        Ok(WatchdogDef {
            model,
            action: node.attr_enum("action")?.unwrap_or_default(),
            info: DeviceInfo::parse(node, flags, InfoAllow::empty())?,
        })
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        write_with_info(
            w,
            Tag::new("watchdog")
                .attr("model", self.model)
                .attr("action", self.action),
            &self.info,
            flags,
        );
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemballoonDef {
    pub model: MemballoonModel,
    pub info: DeviceInfo,
}

impl MemballoonDef {
    pub fn new(model: MemballoonModel) -> Self {
        Self { model, info: DeviceInfo::default() }
    }

    pub fn parse(node: &Element, flags: XmlFlags) -> Result<Self> {
        let model = match node.attr("model") {
            Some(m) => parse_enum(m)?,
            None => {
                return Err(Error::Xml(
                    "balloon memory must contain model name".to_string(),
                ))
            }
        };
        Ok(MemballoonDef {
            model,
            info: DeviceInfo::parse(node, flags, InfoAllow::empty())?,
        })
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        write_with_info(
            w,
            Tag::new("memballoon").attr("model", self.model),
            &self.info,
            flags,
        );
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::xml::parse_document;

    #[test]
    fn models_are_required() {
        let doc = |s: &str| parse_document(s).unwrap();
        let flags = XmlFlags::INACTIVE;
        assert!(SoundDef::parse(&doc("<sound/>"), flags).is_err());
        assert!(WatchdogDef::parse(&doc("<watchdog/>"), flags).is_err());
        assert!(MemballoonDef::parse(&doc("<memballoon/>"), flags).is_err());
        assert!(SoundDef::parse(&doc("<sound model='gus'/>"), flags).is_err());
    }

    #[test]
    fn watchdog_action_default() {
        let wd = WatchdogDef::parse(
            &parse_document("<watchdog model='ib700'/>").unwrap(),
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert_eq!(wd.action, WatchdogAction::Reset);
        let mut w = XmlWriter::new();
        wd.format(&mut w, XmlFlags::INACTIVE).unwrap();
        assert_eq!(w.as_str(), "<watchdog model='ib700' action='reset'/>\n");
    }

    #[test]
    fn sound_with_address() {
        let s = SoundDef::parse(
            &parse_document(
                "<sound model='ac97'><alias name='sound0'/>\
                 <address type='pci' slot='0x04'/></sound>",
            )
            .unwrap(),

            XmlFlags::empty(),
        )
        .unwrap();
        let mut w = XmlWriter::new();
        s.format(&mut w, XmlFlags::empty()).unwrap();
        assert_eq!(
            w.as_str(),
            "<sound model='ac97'>\n  <alias name='sound0'/>\n  \
             <address type='pci' domain='0x0000' bus='0x00' slot='0x04' \
             function='0x0'/>\n</sound>\n"
        );
    }
}
