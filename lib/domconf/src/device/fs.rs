// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::address::{DeviceInfo, InfoAllow};
use crate::context::XmlFlags;
use crate::enums::{FsAccessMode, FsDriver, FsType};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

/// A host directory, device or image exported into the guest.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FsDef {
    pub kind: FsType,
    pub driver: FsDriver,
    pub access_mode: FsAccessMode,
    pub src: String,
    pub dst: String,
    pub readonly: bool,
    pub info: DeviceInfo,
}

fn source_attr(kind: FsType) -> &'static str {
    match kind {
        FsType::Mount => "dir",
        FsType::Block => "dev",
        FsType::File => "file",
        FsType::Template => "name",
    }
}

impl FsDef {
    pub fn parse(node: &Element, flags: XmlFlags) -> Result<Self> {
        let kind: FsType = node.attr_enum("type")?.unwrap_or_default();
        let access_mode = node.attr_enum("accessmode")?.unwrap_or_default();
        let driver = match node.child("driver") {
            Some(d) => d.attr_enum("type")?.unwrap_or_default(),
            None => FsDriver::default(),
        };

        let src = node
            .child("source")
            .and_then(|s| s.attr(source_attr(kind)))
            .map(str::to_owned);
        let dst = node
            .child("target")
            .and_then(|t| t.attr("dir"))
            .map(str::to_owned);

        let dst = dst.ok_or_else(|| {
            Error::NoTarget(
                src.clone().unwrap_or_else(|| "filesystem".to_string()),
            )
        })?;
        let src = src.ok_or_else(|| Error::NoSource(dst.clone()))?;

        Ok(FsDef {
            kind,
            driver,
            access_mode,
            src,
            dst,
            readonly: node.child("readonly").is_some(),
            info: DeviceInfo::parse(node, flags, InfoAllow::empty())?,
        })
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        w.open(
            Tag::new("filesystem")
                .attr("type", self.kind)
                .attr("accessmode", self.access_mode),
        );
        if self.driver != FsDriver::Default {
            w.empty(Tag::new("driver").attr("type", self.driver));
        }
        w.empty(Tag::new("source").attr(source_attr(self.kind), &self.src));
        w.empty(Tag::new("target").attr("dir", &self.dst));
        if self.readonly {
            w.empty(Tag::new("readonly"));
        }
        self.info.format(w, flags);
        w.close("filesystem");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;
    use crate::xml::parse_document;

    fn parse(xml: &str) -> Result<FsDef> {
        FsDef::parse(&parse_document(xml)?, XmlFlags::INACTIVE)
    }

    #[test]
    fn mount_and_template() {
        let fs = parse(
            "<filesystem type='mount' accessmode='mapped'><driver type='path'/>\
             <source dir='/export'/><target dir='/import'/><readonly/>\
             </filesystem>",
        )
        .unwrap();
        assert_eq!(fs.access_mode, FsAccessMode::Mapped);
        assert_eq!(fs.driver, FsDriver::Path);
        assert!(fs.readonly);
        let mut w = XmlWriter::new();
        fs.format(&mut w, XmlFlags::INACTIVE).unwrap();
        assert_eq!(
            w.as_str(),
            "<filesystem type='mount' accessmode='mapped'>\n  \
             <driver type='path'/>\n  <source dir='/export'/>\n  \
             <target dir='/import'/>\n  <readonly/>\n</filesystem>\n"
        );

        let t = parse(
            "<filesystem type='template'><source name='debian'/>\
             <target dir='/'/></filesystem>",
        )
        .unwrap();
        assert_eq!(t.src, "debian");
        assert_eq!(t.access_mode, FsAccessMode::Passthrough);
    }

    #[test]
    fn missing_parts() {
        let e =
            parse("<filesystem><source dir='/a'/></filesystem>").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::NoTarget);
        let e =
            parse("<filesystem><target dir='/a'/></filesystem>").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::NoSource);
        // The source attribute depends on the type.
        let e = parse(
            "<filesystem type='block'><source dir='/a'/>\
             <target dir='/b'/></filesystem>",
        )
        .unwrap_err();

        assert_eq!(e.kind(), ErrorKind::NoSource);
    }
}
