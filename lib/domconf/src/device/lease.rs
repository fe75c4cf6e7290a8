// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

/// A lock-manager lease held while the domain runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseDef {
    pub lockspace: Option<String>,
    pub key: String,
    pub path: String,
    pub offset: Option<u64>,
}

impl LeaseDef {
    pub fn parse(node: &Element) -> Result<Self> {
        let key = node.path_text("key").ok_or_else(|| {
            Error::Xml("Missing 'key' element for lease".to_string())
        })?;
        let target = node.child("target");
        let path = target.and_then(|t| t.attr("path")).ok_or_else(|| {
            Error::Xml("Missing 'target' element for lease".to_string())
        })?;
        let offset = match target {
            Some(t) => t.attr_parse::<u64>("offset")?,
            None => None,
        };

        Ok(LeaseDef {
            lockspace: node.path_text("lockspace").map(str::to_owned),
            key: key.to_owned(),
            path: path.to_owned(),
            offset,
        })
    }

    pub fn format(&self, w: &mut XmlWriter) -> Result<()> {
        w.open(Tag::new("lease"));
        w.leaf_opt("lockspace", self.lockspace.as_deref());
        w.leaf(Tag::new("key"), &self.key);
        w.empty(
            Tag::new("target")
                .attr("path", &self.path)
                .attr_opt("offset", self.offset),
        );
        w.close("lease");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::xml::parse_document;

    #[test]
    fn lease_round_trip() {
        let xml = "<lease>\n  <lockspace>somearea</lockspace>\n  \
            <key>thequickbrownfoxjumpedoverthelazydog</key>\n  \
            <target path='/some/lease/path' offset='1024'/>\n</lease>\n";
        let lease = LeaseDef::parse(&parse_document(xml).unwrap()).unwrap();
        assert_eq!(lease.offset, Some(1024));
        let mut w = XmlWriter::new();
        lease.format(&mut w).unwrap();
        assert_eq!(w.as_str(), xml);
    }

    #[test]
    fn key_and_target_required() {
        for xml in [
            "<lease><target path='/p'/></lease>",
            "<lease><key>k</key></lease>",
            "<lease><key>k</key><target/></lease>",
        ] {
            assert!(
                LeaseDef::parse(&parse_document(xml).unwrap()).is_err(),
                "{}",
                xml
            );

        }
    }
}
