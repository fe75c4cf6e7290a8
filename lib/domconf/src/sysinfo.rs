// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SMBIOS strings presented to the guest.

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

const BIOS_FIELDS: &[&str] = &["vendor", "version", "date", "release"];
const SYSTEM_FIELDS: &[&str] =
    &["manufacturer", "product", "version", "serial", "uuid", "sku", "family"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SysinfoDef {
    /// `(name, value)` pairs from `<bios>`, in canonical field order.
    pub bios: Vec<(String, String)>,
    /// `(name, value)` pairs from `<system>`, in canonical field order.
    pub system: Vec<(String, String)>,
}

fn entries(
    node: Option<&Element>,
    fields: &[&str],
) -> Vec<(String, String)> {
    let Some(node) = node else {
        return Vec::new();
    };
    fields
        .iter()
        .filter_map(|field| {
            node.children_named("entry")
                .find(|e| e.attr("name") == Some(*field))
                .map(|e| e.text())
                .filter(|v| !v.is_empty())
                .map(|v| ((*field).to_owned(), v.to_owned()))
        })
        .collect()
}

impl SysinfoDef {
    pub fn parse(node: &Element) -> Result<Self> {
        if node.name() != "sysinfo" {
            return Err(Error::Xml(
                "XML does not contain expected 'sysinfo' element".to_string(),
            ));
        }
        match node.attr("type") {
            None => {
                return Err(Error::Xml(
                    "sysinfo must contain a type attribute".to_string(),
                ))
            }
            Some("smbios") => {}
            Some(other) => {
                return Err(Error::ConfigUnsupported(format!(
                    "unknown sysinfo type '{}'",
                    other
                )))
            }
        }

        let def = SysinfoDef {
            bios: entries(node.child("bios"), BIOS_FIELDS),
            system: entries(node.child("system"), SYSTEM_FIELDS),
        };
        if let Some(uuid) = def.system_entry("uuid") {
            Uuid::parse_str(uuid).map_err(|_| {
                Error::Internal(format!("malformed uuid element '{}'", uuid))
            })?;
        }
        Ok(def)
    }

    pub fn bios_entry(&self, name: &str) -> Option<&str> {
        self.bios.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn system_entry(&self, name: &str) -> Option<&str> {
        self.system.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// The `system` uuid entry, if present.
    pub fn uuid(&self) -> Option<Uuid> {
        self.system_entry("uuid").and_then(|u| Uuid::parse_str(u).ok())
    }

    pub fn format(&self, w: &mut XmlWriter) {
        let mut inner = w.nested();
        let sections = [("bios", &self.bios), ("system", &self.system)];
        for (section, list) in sections {
            let mut block = inner.nested();
            for (k, v) in list {
                block.leaf(Tag::new("entry").attr("name", k), v);
            }
            inner.element_if_nonempty(Tag::new(section), block);
        }
        w.element_with(Tag::new("sysinfo").attr("type", "smbios"), inner);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::xml::parse_document;

    #[test]
    fn smbios_entries() {
        let xml = "<sysinfo type='smbios'>\
            <bios><entry name='release'>1.0</entry>\
            <entry name='vendor'>LENOVO</entry></bios>\
            <system>\
            <entry name='uuid'>c7a5fdbd-edaf-9455-926a-d65c16db1809</entry>\
            <entry name='bogus'>x</entry></system>\
            </sysinfo>";
        let s = SysinfoDef::parse(&parse_document(xml).unwrap()).unwrap();
        assert_eq!(s.bios_entry("vendor"), Some("LENOVO"));
        assert_eq!(s.system.len(), 1);
        assert_eq!(
            s.uuid(),
            Some(
                Uuid::parse_str("c7a5fdbd-edaf-9455-926a-d65c16db1809")
                    .unwrap()
            )
        );

        let mut w = XmlWriter::new();
        s.format(&mut w);
        assert_eq!(
            w.as_str(),
            "<sysinfo type='smbios'>\n  <bios>\n    \
             <entry name='vendor'>LENOVO</entry>\n    \
             <entry name='release'>1.0</entry>\n  </bios>\n  <system>\n    \
             <entry \
             name='uuid'>c7a5fdbd-edaf-9455-926a-d65c16db1809</entry>\n  \
             </system>\n</sysinfo>\n"
        );
    }

    #[test]
    fn type_is_required() {
        let parse =
            |xml: &str| SysinfoDef::parse(&parse_document(xml).unwrap());
        assert!(parse("<sysinfo/>").is_err());
        assert!(parse("<sysinfo type='dmi'/>").is_err());
        assert!(parse(
            "<sysinfo type='smbios'><system>\
             <entry name='uuid'>nope</entry></system></sysinfo>"
        )
        .is_err());

    }
}
