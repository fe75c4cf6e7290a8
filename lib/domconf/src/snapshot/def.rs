// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use uuid::Uuid;

use crate::context::{ParseContext, XmlFlags};
use crate::domain::DomainDef;
use crate::enums::{parse_enum, SnapshotMode, SnapshotState};
use crate::error::{Error, Result};
use crate::xml::{self, Element, Tag, XmlWriter};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SnapshotParseFlags: u32 {
        /// The document describes an existing snapshot: name, state and
        /// creation time are required rather than generated.
        const REDEFINE = 1 << 0;
        /// Accept a `<disks>` block.
        const DISKS = 1 << 1;
        /// Read the `<active>` marker written to internal metadata files.
        const INTERNAL = 1 << 2;
    }
}

/// One `<disk>` of a `<domainsnapshot>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotDiskDef {
    /// Target or source path as given; the target once aligned.
    pub name: String,
    /// Index into the domain's disks, known after alignment.
    pub index: Option<usize>,
    pub snapshot: SnapshotMode,
    pub file: Option<String>,
    pub driver_type: Option<String>,
}

impl SnapshotDiskDef {
    fn parse(node: &Element) -> Result<Self> {
        let name = node.attr("name").ok_or_else(|| {
            Error::Xml("missing name from disk snapshot element".to_string())
        })?;
        let mut snapshot = node.attr_enum("snapshot")?.unwrap_or_default();
        let file = node.path_attr("source", "file").map(str::to_owned);
        let driver_type = node.path_attr("driver", "type").map(str::to_owned);

        if snapshot == SnapshotMode::Default
            && (file.is_some() || driver_type.is_some())
        {
            snapshot = SnapshotMode::External;
        }

        Ok(Self {
            name: name.to_owned(),
            index: None,
            snapshot,
            file,
            driver_type,
        })
    }

    fn format(&self, w: &mut XmlWriter) {
        let tag = Tag::new("disk").attr("name", &self.name).attr_if(
            self.snapshot != SnapshotMode::Default,
            "snapshot",
            self.snapshot,
        );
        let mut inner = w.nested();
        if let Some(t) = &self.driver_type {
            inner.empty(Tag::new("driver").attr("type", t));
        }
        if let Some(f) = &self.file {
            inner.empty(Tag::new("source").attr("file", f));
        }
        w.element_with(tag, inner);
    }
}

/// A `<domainsnapshot>` document.
#[derive(Clone, Debug)]
pub struct SnapshotDef {
    pub name: String,
    pub description: Option<String>,
    pub parent: Option<String>,
    /// Seconds since the Unix epoch.
    pub creation_time: i64,
    pub state: SnapshotState,
    pub disks: Vec<SnapshotDiskDef>,
    /// The domain as it was when the snapshot was taken, when known.
    pub dom: Option<DomainDef>,
    /// Set from the `<active>` marker of internal metadata.
    pub current: bool,
}

impl SnapshotDef {
    pub fn parse_str(
        xml: &str,
        ctx: &ParseContext,
        flags: SnapshotParseFlags,
    ) -> Result<Self> {
        let root = xml::parse_document(xml)?;
        Self::parse_node(&root, ctx, flags)
    }

    pub fn parse_node(
        root: &Element,
        ctx: &ParseContext,
        flags: SnapshotParseFlags,
    ) -> Result<Self> {
        if root.name() != "domainsnapshot" {
            return Err(Error::Xml(format!(
                "unexpected root element <{}>, expecting <domainsnapshot>",
                root.name()
            )));
        }
        let redefine = flags.contains(SnapshotParseFlags::REDEFINE);

        let name = match root.path_text("name") {
            Some(name) => name.to_owned(),
            None if redefine => {
                return Err(Error::Xml(
                    "a redefined snapshot must have a name".to_string(),
                ))
            }
            None => ctx.env.now().to_string(),
        };
        let description = root.path_text("description").map(str::to_owned);

        let mut def = SnapshotDef {
            name,
            description,
            parent: None,
            creation_time: 0,
            state: SnapshotState::Nostate,
            disks: Vec::new(),
            dom: None,
            current: false,
        };

        if redefine {
            def.creation_time = root
                .path("creationTime")
                .ok_or_else(|| {
                    Error::Xml(
                        "missing creationTime from existing snapshot"
                            .to_string(),
                    )
                })?
                .text_parse()?;
            def.parent = root.path_text("parent/name").map(str::to_owned);

            let state = root.path_text("state").ok_or_else(|| {
                Error::Xml("missing state from existing snapshot".to_string())
            })?;
            def.state = parse_enum(state)?;

            if let Some(dom) = root.child("domain") {
                if dom.attr("type").is_some() {
                    let inner = ctx.clone().with_flags(XmlFlags::INACTIVE);
                    def.dom = Some(DomainDef::parse_node(dom, &inner)?);
                }
            }
        } else {
            def.creation_time = ctx.env.now();
        }

        let disks = root.path_all("disks/disk");
        if flags.contains(SnapshotParseFlags::DISKS) {
            def.disks = disks
                .into_iter()
                .map(SnapshotDiskDef::parse)
                .collect::<Result<_>>()?;
        } else if !disks.is_empty() {
            return Err(Error::ConfigUnsupported(
                "unable to handle disk requests in snapshot".to_string(),
            ));
        }

        if flags.contains(SnapshotParseFlags::INTERNAL) {
            let active: i32 = root
                .path("active")
                .ok_or_else(|| {
                    Error::Xml("could not find 'active' element".to_string())
                })?
                .text_parse()?;
            def.current = active != 0;
        }

        Ok(def)
    }

    /// Serializes the snapshot. `domain_uuid` is written in place of the
    /// domain document when the definition is not known. `internal` adds
    /// the `<active>` marker.
    pub fn format(
        &self,
        domain_uuid: &Uuid,
        flags: XmlFlags,
        internal: bool,
    ) -> Result<String> {
        let mut w = XmlWriter::new();
        w.open(Tag::new("domainsnapshot"));

        w.leaf(Tag::new("name"), &self.name);
        w.leaf_opt("description", self.description.as_deref());
        w.leaf(Tag::new("state"), self.state);
        if let Some(parent) = &self.parent {
            w.open(Tag::new("parent"));
            w.leaf(Tag::new("name"), parent);
            w.close("parent");
        }
        w.leaf(Tag::new("creationTime"), self.creation_time);

        if self.state == SnapshotState::DiskSnapshot && !self.disks.is_empty()
        {
            w.open(Tag::new("disks"));
            for disk in &self.disks {
                disk.format(&mut w);
            }
            w.close("disks");
        }

        match &self.dom {
            Some(dom) => w.raw_lines(&dom.format(flags)?),
            None => {
                w.open(Tag::new("domain"));
                w.leaf(Tag::new("uuid"), domain_uuid.hyphenated());
                w.close("domain");
            }
        }

        if internal {
            w.leaf(Tag::new("active"), u8::from(self.current));
        }

        w.close("domainsnapshot");
        Ok(w.into_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::test::test_ctx;

    const DOMAIN_UUID: &str = "c7a5fdbd-edaf-9455-926a-d65c16db1809";

    #[test]
    fn defaults_for_new_snapshot() {
        let ctx = test_ctx();
        let def = SnapshotDef::parse_str(
            "<domainsnapshot><description>before upgrade</description>\
             </domainsnapshot>",
            &ctx,
            SnapshotParseFlags::empty(),
        )
        .unwrap();
        assert_eq!(def.name, "1300000000");
        assert_eq!(def.creation_time, 1_300_000_000);
        assert_eq!(def.description.as_deref(), Some("before upgrade"));
        assert!(def.dom.is_none());
    }

    #[test]
    fn disks_need_flag() {
        let xml = "<domainsnapshot><disks>\
            <disk name='vda'><source file='/snap/a.qcow2'/></disk>\
            <disk name='vdb' snapshot='no'/>\
            </disks></domainsnapshot>";
        let ctx = test_ctx();

        let err = SnapshotDef::parse_str(xml, &ctx, SnapshotParseFlags::empty())
            .unwrap_err();
        assert!(matches!(err, Error::ConfigUnsupported(_)));

        let def = SnapshotDef::parse_str(xml, &ctx, SnapshotParseFlags::DISKS)
            .unwrap();

        assert_eq!(def.disks.len(), 2);
        assert_eq!(def.disks[0].snapshot, SnapshotMode::External);
        assert_eq!(def.disks[0].file.as_deref(), Some("/snap/a.qcow2"));
        assert_eq!(def.disks[1].snapshot, SnapshotMode::No);
    }

    #[test]
    fn redefine_requires_metadata() {
        let ctx = test_ctx();
        let flags = SnapshotParseFlags::REDEFINE;

        let err = SnapshotDef::parse_str(
            "<domainsnapshot/>",
            &ctx,
            flags,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Xml(_)));

        let err = SnapshotDef::parse_str(
            "<domainsnapshot><name>s1</name><state>running</state>\
             </domainsnapshot>",
            &ctx,
            flags,
        )
        .unwrap_err();
        assert!(err.to_string().contains("creationTime"));

        let def = SnapshotDef::parse_str(
            "<domainsnapshot><name>s2</name><state>disk-snapshot</state>\
             <parent><name>s1</name></parent>\
             <creationTime>1299999999</creationTime>\
             <domain><uuid>c7a5fdbd-edaf-9455-926a-d65c16db1809</uuid></domain>\
             </domainsnapshot>",
            &ctx,
            flags,
        )
        .unwrap();
        assert_eq!(def.state, SnapshotState::DiskSnapshot);
        assert_eq!(def.parent.as_deref(), Some("s1"));
        assert_eq!(def.creation_time, 1_299_999_999);
        assert!(def.dom.is_none());
    }

    #[test]
    fn internal_metadata_round_trip() {
        let ctx = test_ctx();
        let xml = "<domainsnapshot><name>s1</name><state>shutoff</state>\
            <creationTime>1299999999</creationTime><active>1</active>\
            </domainsnapshot>";
        let flags = SnapshotParseFlags::REDEFINE | SnapshotParseFlags::INTERNAL;
        let def = SnapshotDef::parse_str(xml, &ctx, flags).unwrap();
        assert!(def.current);

        let uuid: Uuid = DOMAIN_UUID.parse().unwrap();
        let out = def.format(&uuid, XmlFlags::INACTIVE, true).unwrap();
        assert_eq!(
            out,
            "<domainsnapshot>\n\
             \x20 <name>s1</name>\n\
             \x20 <state>shutoff</state>\n\
             \x20 <creationTime>1299999999</creationTime>\n\
             \x20 <domain>\n\
             \x20   <uuid>c7a5fdbd-edaf-9455-926a-d65c16db1809</uuid>\n\
             \x20 </domain>\n\
             \x20 <active>1</active>\n\
             </domainsnapshot>\n"
        );

        let again = SnapshotDef::parse_str(&out, &ctx, flags).unwrap();
        assert_eq!(again.format(&uuid, XmlFlags::INACTIVE, true).unwrap(), out);
    }
}
