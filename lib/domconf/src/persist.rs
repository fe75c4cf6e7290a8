// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! On-disk storage of domain definitions.
//!
//! Persistent definitions live in `<config_dir>/<name>.xml`. A domain that
//! starts with the host has a symlink to its config file in the autostart
//! directory. Running domains also have a status file in the status
//! directory, from which they can be recovered after a restart of the
//! managing process.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use slog::{debug, info, warn, Logger};

use crate::context::{ParseContext, XmlFlags};
use crate::domain::DomainDef;
use crate::error::{Error, Result};
use crate::registry::{
    DomainObj, DomainObjInner, DomainObjList, DomainStatus, TaintFlags,
};
use crate::xml::{self, Tag, XmlWriter};

const BANNER: &str = "\
<!--
WARNING: THIS IS AN AUTO-GENERATED FILE. CHANGES TO IT ARE LIKELY TO BE
OVERWRITTEN AND LOST. Changes to this configuration should be made through
the domain management interface.
-->
";

/// Flags for the projection written to status files.
const STATUS_FLAGS: XmlFlags = XmlFlags::SECURE
    .union(XmlFlags::INTERNAL_STATUS)
    .union(XmlFlags::INTERNAL_ACTUAL_NET);

#[derive(Clone, Debug)]
pub struct DomainStore {
    config_dir: PathBuf,
    autostart_dir: PathBuf,
    status_dir: PathBuf,
    log: Logger,
}

impl DomainStore {
    pub fn new(
        config_dir: impl Into<PathBuf>,
        autostart_dir: impl Into<PathBuf>,
        status_dir: impl Into<PathBuf>,
        log: Logger,
    ) -> Self {
        Self {
            config_dir: config_dir.into(),
            autostart_dir: autostart_dir.into(),
            status_dir: status_dir.into(),
            log,
        }
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.config_dir.join(format!("{}.xml", name))
    }

    pub fn autostart_link(&self, name: &str) -> PathBuf {
        self.autostart_dir.join(format!("{}.xml", name))
    }

    pub fn status_path(&self, name: &str) -> PathBuf {
        self.status_dir.join(format!("{}.xml", name))
    }

    fn write_atomic(&self, dir: &Path, path: &Path, doc: &str) -> Result<()> {
        fs::create_dir_all(dir)
            .map_err(|e| Error::io("cannot create directory", dir, e))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".domconf")
            .tempfile_in(dir)
            .map_err(|e| Error::io("cannot create file in", dir, e))?;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .and_then(|_| tmp.write_all(BANNER.as_bytes()))
            .and_then(|_| tmp.write_all(doc.as_bytes()))
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::io("cannot write", path, e))?;
        tmp.persist(path)
            .map_err(|e| Error::io("cannot write", path, e.error))?;
        Ok(())
    }

    /// Writes the persistent projection of `def` to its config file.
    pub fn save_config(&self, def: &DomainDef) -> Result<()> {
        let doc = def.format(XmlFlags::INACTIVE | XmlFlags::SECURE)?;
        let path = self.config_path(&def.name);
        self.write_atomic(&self.config_dir, &path, &doc)?;
        info!(self.log, "saved domain config";
            "name" => %def.name,
            "path" => %path.display());
        Ok(())
    }

    /// Writes the full runtime state of a domain to its status file.
    pub fn save_status(&self, obj: &DomainObjInner) -> Result<()> {
        let doc = format_status(obj)?;
        let path = self.status_path(&obj.def.name);
        self.write_atomic(&self.status_dir, &path, &doc)?;
        debug!(self.log, "saved domain status";
            "name" => %obj.def.name,
            "status" => %obj.status());
        Ok(())
    }

    /// Reads `<config_dir>/<name>.xml`, which must define a domain called
    /// `name`.
    pub fn load_config(
        &self,
        name: &str,
        ctx: &ParseContext,
    ) -> Result<DomainDef> {
        let path = self.config_path(name);
        let doc = fs::read_to_string(&path)
            .map_err(|e| Error::io("cannot read", &path, e))?;
        let ctx = ctx.clone().with_flags(XmlFlags::INACTIVE);
        let def = DomainDef::parse_str(&doc, &ctx)?;
        if def.name != name {
            return Err(Error::InvalidArg(format!(
                "domain config file '{}' does not match domain name '{}'",
                path.display(),
                def.name
            )));
        }
        Ok(def)
    }

    fn register_config<F>(
        &self,
        list: &mut DomainObjList,
        name: &str,
        ctx: &ParseContext,
        notify: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&Arc<DomainObj>, bool),
    {
        let def = self.load_config(name, ctx)?;
        let is_new = list.find_by_uuid(&def.uuid).is_none();
        let autostart = self.is_autostart(name);
        let obj = list.assign_def(def, false);
        {
            let mut inner = obj.lock();
            inner.autostart = autostart;
            inner.persistent = true;
        }
        notify(&obj, is_new);
        Ok(())
    }

    /// Reads `<status_dir>/<name>.xml` and registers the running domain it
    /// describes.
    pub fn load_status(
        &self,
        list: &mut DomainObjList,
        name: &str,
        ctx: &ParseContext,
    ) -> Result<Arc<DomainObj>> {
        let path = self.status_path(name);
        let doc = fs::read_to_string(&path)
            .map_err(|e| Error::io("cannot read", &path, e))?;
        let root = xml::parse_document(&doc)?;
        if root.name() != "domstatus" {
            return Err(Error::Xml(format!(
                "unexpected root element <{}>, expecting <domstatus>",
                root.name()
            )));
        }

        let state = root.attr("state").ok_or_else(|| {
            Error::Internal("missing domain state".to_string())
        })?;
        let status = DomainStatus::parse(state, root.attr("reason"))?;
        let pid = root.attr_parse::<u32>("pid")?;

        let mut taint = TaintFlags::empty();
        for node in root.children_named("taint") {
            let flag = node.attr("flag").ok_or_else(|| {
                Error::Xml("missing taint flag".to_string())
            })?;
            taint |= TaintFlags::by_name(flag).ok_or_else(|| {
                Error::Internal(format!("unknown taint flag {}", flag))
            })?;
        }

        let dom = root.child("domain").ok_or_else(|| {
            Error::Internal("no domain config".to_string())
        })?;
        let dom_ctx = ctx.clone().with_flags(STATUS_FLAGS);
        let def = DomainDef::parse_node(dom, &dom_ctx)?;

        if let Some(existing) = list.find_by_uuid(&def.uuid) {
            return Err(Error::Internal(format!(
                "unexpected domain {} already exists",
                existing.lock().def.name
            )));
        }

        let mut private = list.alloc_private();
        if let Some(private) = private.as_mut() {
            private.parse_status(&root)?;
        }

        let obj = list.insert_new(def, private);
        {
            let mut inner = obj.lock();
            inner.set_status(status);
            inner.pid = pid;
            inner.taint(taint);
        }
        info!(self.log, "recovered domain status";
            "name" => name,
            "status" => %status);
        Ok(obj)
    }

    /// Registers every domain found in the config directory, or with
    /// `live_status` in the status directory. `notify` is called for each
    /// one with whether it was not yet in `list`. A file that cannot be
    /// loaded is logged and skipped.
    pub fn load_all<F>(
        &self,
        list: &mut DomainObjList,
        live_status: bool,
        ctx: &ParseContext,
        mut notify: F,
    ) -> Result<()>
    where
        F: FnMut(&Arc<DomainObj>, bool),
    {
        let dir = if live_status { &self.status_dir } else { &self.config_dir };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(Error::io("cannot open directory", dir, e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::io("cannot read directory", dir, e))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            if let Some(name) = file_name.strip_suffix(".xml") {
                names.push(name.to_owned());
            }
        }
        names.sort();

        for name in names {
            let res = if live_status {
                self.load_status(list, &name, ctx).map(|obj| notify(&obj, true))
            } else {
                self.register_config(list, &name, ctx, &mut notify)
            };
            if let Err(e) = res {
                warn!(self.log, "failed to load domain";
                    "name" => %name,
                    "error" => %e);
            }
        }
        Ok(())
    }

    /// Removes the autostart link and the config file of a domain. Failing
    /// to remove the link is only logged.
    pub fn delete_config(&self, def: &DomainDef) -> Result<()> {
        let link = self.autostart_link(&def.name);
        if let Err(e) = fs::remove_file(&link) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(self.log, "failed to remove autostart link";
                    "path" => %link.display(),
                    "error" => %e);
            }
        }

        let path = self.config_path(&def.name);
        fs::remove_file(&path)
            .map_err(|e| Error::io("cannot remove config", &path, e))?;
        info!(self.log, "deleted domain config"; "name" => %def.name);
        Ok(())
    }

    pub fn delete_status(&self, name: &str) -> Result<()> {
        let path = self.status_path(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("cannot remove status", &path, e)),
        }
    }

    pub fn set_autostart(&self, name: &str, autostart: bool) -> Result<()> {
        let link = self.autostart_link(name);
        if !autostart {
            return match fs::remove_file(&link) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => {
                    Err(Error::io("cannot remove autostart link", &link, e))
                }
            };
        }
        if self.is_autostart(name) {
            return Ok(());
        }
        fs::create_dir_all(&self.autostart_dir).map_err(|e| {
            Error::io(
                "cannot create autostart directory",
                &self.autostart_dir,
                e,
            )
        })?;
        symlink(self.config_path(name), &link)
            .map_err(|e| Error::io("cannot create autostart link", &link, e))
    }

    /// Whether the autostart link for `name` points at its config file.
    pub fn is_autostart(&self, name: &str) -> bool {
        let link = self.autostart_link(name);
        let config = self.config_path(name);
        match (fs::canonicalize(link), fs::canonicalize(config)) {
            (Ok(target), Ok(config)) => target == config,
            _ => false,
        }
    }
}

/// `<domstatus>` wrapping the live definition.
pub fn format_status(obj: &DomainObjInner) -> Result<String> {
    let status = obj.status();
    let mut w = XmlWriter::new();
    let mut tag = Tag::new("domstatus")
        .attr("state", status.state())
        .attr("reason", status.reason());
    if let Some(pid) = obj.pid {
        tag = tag.attr("pid", pid);
    }
    w.open(tag);
    for flag in obj.taints().names() {
        w.empty(Tag::new("taint").attr("flag", flag));
    }
    if let Some(private) = &obj.private {
        private.format_status(&mut w)?;
    }
    w.raw_lines(&obj.def.format(STATUS_FLAGS)?);
    w.close("domstatus");
    Ok(w.into_string())
}
