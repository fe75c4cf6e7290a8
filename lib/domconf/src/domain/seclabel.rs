// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::context::XmlFlags;
use crate::enums::{parse_enum, SeclabelType};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

/// The security driver label applied to the guest process and its images.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecLabel {
    pub model: Option<String>,
    pub label: Option<String>,
    pub imagelabel: Option<String>,
    /// Dynamic labels only: the template the generated label starts from.
    pub baselabel: Option<String>,
    pub kind: SeclabelType,
    pub norelabel: bool,
}

impl SecLabel {
    pub fn parse(root: &Element, flags: XmlFlags) -> Result<Option<Self>> {
        let Some(node) = root.child("seclabel") else {
            return Ok(None);
        };
        let inactive = flags.contains(XmlFlags::INACTIVE);

        let kind: SeclabelType = match node.attr("type") {
            Some(t) => parse_enum(t)?,
            None => {
                return Err(Error::Internal("missing security type".to_string()))
            }
        };

        let norelabel = match node.attr_yes_no("relabel")? {
            Some(relabel) => !relabel,
            None => kind == SeclabelType::Static,
        };
        if kind == SeclabelType::Dynamic && norelabel {
            return Err(Error::Xml(
                "dynamic label type must use resource relabeling".to_string(),
            ));
        }

        let mut sec = SecLabel { kind, norelabel, ..Default::default() };

        let live_or_static = kind == SeclabelType::Static || !inactive;

        if live_or_static {
            sec.label = node.path_text("label").map(str::to_owned);
            if sec.label.is_none() {
                return Err(Error::Xml("security label is missing".to_string()));
            }
        }

        if !inactive && !norelabel {
            sec.imagelabel = node.path_text("imagelabel").map(str::to_owned);
            if sec.imagelabel.is_none() {
                return Err(Error::Xml(
                    "security imagelabel is missing".to_string(),
                ));
            }
        }

        if kind == SeclabelType::Dynamic {
            sec.baselabel = node.path_text("baselabel").map(str::to_owned);
        }

        sec.model = node.attr("model").map(str::to_owned);
        if sec.model.is_none() && live_or_static {
            return Err(Error::Xml("missing security model".to_string()));
        }

        Ok(Some(sec))
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) {
        let inactive = flags.contains(XmlFlags::INACTIVE);
        let tag = Tag::new("seclabel")
            .attr("type", self.kind)
            .attr_opt("model", self.model.as_deref())
            .attr("relabel", if self.norelabel { "no" } else { "yes" });

        let mut inner = w.nested();
        let dynamic = self.kind == SeclabelType::Dynamic;
        if !(dynamic && inactive) {
            inner.leaf_opt("label", self.label.as_deref());
        }
        if !inactive && !self.norelabel {
            inner.leaf_opt("imagelabel", self.imagelabel.as_deref());
        }
        if dynamic {
            inner.leaf_opt("baselabel", self.baselabel.as_deref());
        }
        w.element_with(tag, inner);
    }
}
