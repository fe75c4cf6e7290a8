// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::{SnapshotDef, SnapshotDiskDef};
use crate::enums::SnapshotMode;
use crate::error::{Error, Result};

/// `<source>.<snapshot>`, or with the source's extension replaced by the
/// snapshot name when it has one.
fn external_file_name(source: &str, snapshot: &str) -> String {
    match source.rfind('.') {
        Some(dot) if !source[dot..].contains('/') => {
            format!("{}.{}", &source[..dot], snapshot)
        }
        _ => format!("{}.{}", source, snapshot),
    }
}

impl SnapshotDef {
    /// Expands the disk requests into one entry per domain disk, in domain
    /// disk order.
    ///
    /// Disks the request does not name take the mode declared on the domain
    /// disk, or `default_mode` if it declares none. With `require_match`, a
    /// request may not choose a mode other than the one its domain disk
    /// declares. External snapshots without an explicit file get one
    /// derived from the disk source.
    pub fn align_disks(
        &mut self,
        default_mode: SnapshotMode,
        require_match: bool,
    ) -> Result<()> {
        if default_mode == SnapshotMode::Default {
            return Err(Error::InvalidArg(
                "default snapshot mode must be explicit".to_string(),
            ));
        }
        let dom = self.dom.as_ref().ok_or_else(|| {
            Error::Internal("missing domain in snapshot".to_string())
        })?;
        if self.disks.len() > dom.disks.len() {
            return Err(Error::ConfigUnsupported(
                "too many disk snapshot requests for domain".to_string(),
            ));
        }

        let mut seen = vec![false; dom.disks.len()];
        for disk in &mut self.disks {
            let idx = dom.disk_index_by_name(&disk.name, false).ok_or_else(
                || {
                    Error::ConfigUnsupported(format!(
                        "no disk named '{}'",
                        disk.name
                    ))
                },
            )?;
            if seen[idx] {
                return Err(Error::ConfigUnsupported(format!(
                    "disk '{}' specified twice",
                    disk.name
                )));
            }
            seen[idx] = true;
            disk.index = Some(idx);

            let dom_disk = &dom.disks[idx];
            if dom_disk.snapshot != SnapshotMode::Default
                && disk.snapshot != dom_disk.snapshot
            {
                if disk.snapshot == SnapshotMode::Default {
                    disk.snapshot = dom_disk.snapshot;
                } else if require_match {
                    return Err(Error::ConfigUnsupported(format!(
                        "disk '{}' must use snapshot mode '{}'",
                        disk.name, dom_disk.snapshot
                    )));
                }
            }
            if disk.snapshot == SnapshotMode::Default {
                disk.snapshot = default_mode;
            }
            if disk.file.is_some() && disk.snapshot != SnapshotMode::External {
                return Err(Error::ConfigUnsupported(format!(
                    "file '{}' for disk '{}' requires use of external snapshot \
                     mode",
                    disk.file.as_deref().unwrap_or_default(),
                    disk.name
                )));
            }
            if disk.name != dom_disk.dst {
                disk.name = dom_disk.dst.clone();
            }
        }

        for (idx, dom_disk) in dom.disks.iter().enumerate() {
            if seen[idx] {
                continue;
            }
            let snapshot = match dom_disk.snapshot {
                SnapshotMode::Default => default_mode,
                mode => mode,
            };
            self.disks.push(SnapshotDiskDef {
                name: dom_disk.dst.clone(),
                index: Some(idx),
                snapshot,
                file: None,
                driver_type: None,
            });
        }
        self.disks.sort_by_key(|d| d.index);

        for disk in &mut self.disks {
            if disk.snapshot != SnapshotMode::External || disk.file.is_some() {
                continue;
            }
            let source = disk
                .index
                .and_then(|i| dom.disks[i].src.as_deref())
                .ok_or_else(|| {
                    Error::ConfigUnsupported(format!(
                        "cannot generate external snapshot name for disk '{}' \
                         without source",
                        disk.name
                    ))
                })?;
            disk.file = Some(external_file_name(source, &self.name));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::test::test_ctx;
    use crate::context::XmlFlags;
    use crate::domain::DomainDef;
    use crate::snapshot::SnapshotParseFlags;

    fn snapshot(disks: &str) -> SnapshotDef {
        let dom = DomainDef::parse_str(
            "<domain type='kvm'><name>s</name><memory>1024</memory>\
             <os><type>hvm</type></os><devices>\
             <disk type='file'><source file='/var/lib/images/a.img'/>\
             <target dev='vda' bus='virtio'/></disk>\
             <disk type='file' snapshot='no'><source file='/srv/b'/>\
             <target dev='vdb' bus='virtio'/></disk>\
             <disk type='file' snapshot='external'><source file='/srv.d/c'/>\
             <target dev='vdc' bus='virtio'/></disk>\
             </devices></domain>",
            &test_ctx().with_flags(XmlFlags::INACTIVE),
        )
        .unwrap();
        let mut def = SnapshotDef::parse_str(
            &format!(
                "<domainsnapshot><name>snap1</name><disks>{}</disks>\
                 </domainsnapshot>",
                disks
            ),
            &test_ctx(),
            SnapshotParseFlags::DISKS,
        )
        .unwrap();
        def.dom = Some(dom);
        def
    }

    #[test]
    fn file_names() {
        assert_eq!(external_file_name("/a/b.img", "s"), "/a/b.s");
        assert_eq!(external_file_name("/a/b", "s"), "/a/b.s");
        assert_eq!(external_file_name("/a.d/b", "s"), "/a.d/b.s");
    }

    #[test]
    fn unrequested_disks_are_filled_in() {
        let mut def = snapshot("<disk name='/srv.d/c'/>");
        def.align_disks(SnapshotMode::Internal, false).unwrap();

        let summary: Vec<_> = def
            .disks
            .iter()
            .map(|d| (d.name.as_str(), d.snapshot, d.file.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("vda", SnapshotMode::Internal, None),
                ("vdb", SnapshotMode::No, None),
                ("vdc", SnapshotMode::External, Some("/srv.d/c.snap1")),
            ]
        );
    }

    #[test]
    fn request_errors() {
        let mut def = snapshot("<disk name='vdz'/>");
        assert!(def.align_disks(SnapshotMode::External, false).is_err());

        let mut def = snapshot(
            "<disk name='vda'/><disk name='/var/lib/images/a.img'/>",
        );
        let err = def.align_disks(SnapshotMode::External, false).unwrap_err();
        assert!(err.to_string().contains("specified twice"));

        let mut def = snapshot("<disk name='vdb' snapshot='internal'/>");
        let err = def.align_disks(SnapshotMode::External, true).unwrap_err();
        assert!(err.to_string().contains("must use snapshot mode 'no'"));

        let mut def = snapshot(
            "<disk name='vda' snapshot='internal'><source file='/x'/></disk>",
        );
        let err = def.align_disks(SnapshotMode::External, false).unwrap_err();
        assert!(err.to_string().contains("requires use of external"));

        let mut def = snapshot("");
        assert!(matches!(
            def.align_disks(SnapshotMode::Default, false),
            Err(Error::InvalidArg(_))
        ));
    }

    #[test]
    fn external_default_generates_files() {
        let mut def = snapshot("");
        def.align_disks(SnapshotMode::External, false).unwrap();
        assert_eq!(def.disks.len(), 3);
        assert_eq!(
            def.disks[0].file.as_deref(),
            Some("/var/lib/images/a.snap1")
        );
        assert_eq!(def.disks[1].snapshot, SnapshotMode::No);
        assert!(def.disks[1].file.is_none());
        assert_eq!(
            def.disks.iter().map(|d| d.index).collect::<Vec<_>>(),
            vec![Some(0), Some(1), Some(2)]
        );

    }
}
