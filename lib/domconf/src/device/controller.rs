// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::address::{DeviceInfo, InfoAllow};
use crate::context::XmlFlags;
use crate::enums::{ControllerModel, ControllerType};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerDef {
    pub kind: ControllerType,
    pub idx: u32,
    pub model: Option<ControllerModel>,
    /// `virtio-serial` only.
    pub ports: Option<u32>,
    /// `virtio-serial` only.
    pub vectors: Option<u32>,
    pub info: DeviceInfo,
}

impl ControllerDef {
    /// A controller with nothing but its type and index set, as synthesized
    /// for devices that reference it.
    pub fn new(kind: ControllerType, idx: u32) -> Self {
        Self {
            kind,
            idx,
            model: None,
            ports: None,
            vectors: None,
            info: DeviceInfo::default(),
        }
    }

    pub fn parse(node: &Element, flags: XmlFlags) -> Result<Self> {
        let kind = node.attr_enum("type")?.unwrap_or(ControllerType::Ide);

        let idx = match node.attr("index") {
            Some(v) => v.trim().parse::<u32>().map_err(|_| {
                Error::Internal(format!("Cannot parse controller index {}", v))
            })?,
            None => 0,
        };

        let model = node.attr_enum("model")?;

        let mut def = ControllerDef::new(kind, idx);
        def.model = model;
        def.info = DeviceInfo::parse(node, flags, InfoAllow::empty())?;

        if kind == ControllerType::VirtioSerial {
            let opt = |name: &str| -> Result<Option<u32>> {
                node.attr(name)
                    .map(|v| {
                        v.trim().parse::<u32>().map_err(|_| {
                            Error::Xml(format!(
                                "Invalid {}: {}",
                                name, v
                            ))
                        })
                    })
                    .transpose()
            };
            def.ports = opt("ports")?;
            def.vectors = opt("vectors")?;
        }

        if !def.info.addr.is_none() && !def.info.addr.is_pci() {
            return Err(Error::ConfigUnsupported(
                "Controllers must use the 'pci' address type".to_string(),
            ));
        }

        Ok(def)
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        let tag = Tag::new("controller")
            .attr("type", self.kind)
            .attr("index", self.idx)
            .attr_opt("model", self.model)
            .attr_opt("ports", self.ports)
            .attr_opt("vectors", self.vectors);

        let mut inner = w.nested();
        self.info.format(&mut inner, flags);
        w.element_with(tag, inner);
        Ok(())
    }
}

/// Inserts `ctrl` after the last controller of the same type with a lower
/// index, or before the first one with a higher index, or at the end.
pub fn insert_controller(list: &mut Vec<ControllerDef>, ctrl: ControllerDef) {
    let mut insert_at: Option<usize> = None;
    for (i, cur) in list.iter().enumerate().rev() {
        if cur.kind != ctrl.kind {
            continue;
        }
        if cur.idx > ctrl.idx {
            insert_at = Some(i);
        } else if insert_at.is_none() {
            insert_at = Some(i + 1);
            break;
        } else {
            break;
        }
    }
    match insert_at {
        Some(i) => list.insert(i, ctrl),
        None => list.push(ctrl),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::xml::parse_document;

    fn parse(xml: &str) -> Result<ControllerDef> {
        ControllerDef::parse(&parse_document(xml)?, XmlFlags::INACTIVE)
    }

    #[test]
    fn virtio_serial_options() {
        let c = parse(
            "<controller type='virtio-serial' index='1' ports='16' \
             vectors='4'/>",
        )
        .unwrap();
        assert_eq!(c.kind, ControllerType::VirtioSerial);
        assert_eq!(c.ports, Some(16));
        let mut w = XmlWriter::new();
        c.format(&mut w, XmlFlags::INACTIVE).unwrap();
        assert_eq!(
            w.as_str(),
            "<controller type='virtio-serial' index='1' ports='16' \
             vectors='4'/>\n"
        );

        let ide = parse("<controller type='ide' ports='3'/>").unwrap();
        assert_eq!(ide.idx, 0);
        assert_eq!(ide.ports, None);
    }

    #[test]
    fn only_pci_addresses() {
        let c = parse(
            "<controller type='scsi' index='0' model='lsilogic'>\
             <address type='pci' slot='0x04'/></controller>",
        )
        .unwrap();
        assert_eq!(c.model, Some(ControllerModel::Lsilogic));
        assert!(c.info.addr.is_pci());

        let err = parse(
            "<controller type='scsi' index='0'>\
             <address type='drive' controller='0'/></controller>",
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ConfigUnsupported);
        assert!(parse("<controller type='usb'/>").is_err());
        assert!(parse("<controller type='ide' index='x'/>").is_err());
    }

    #[test]
    fn insertion_keeps_types_sorted() {
        let mut list = Vec::new();
        for (kind, idx) in [
            (ControllerType::Ide, 1),
            (ControllerType::Scsi, 0),
            (ControllerType::Ide, 0),
            (ControllerType::Ide, 2),
            (ControllerType::Fdc, 0),
        ] {
            insert_controller(&mut list, ControllerDef::new(kind, idx));
        }


        let order: Vec<_> = list.iter().map(|c| (c.kind, c.idx)).collect();
        assert_eq!(
            order,
            vec![
                (ControllerType::Ide, 0),
                (ControllerType::Ide, 1),
                (ControllerType::Ide, 2),
                (ControllerType::Scsi, 0),
                (ControllerType::Fdc, 0),
            ]
        );
    }
}
