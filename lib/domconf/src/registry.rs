// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime bookkeeping for defined domains.
//!
//! A [`DomainObjList`] indexes [`DomainObj`]s by UUID. It has no lock of
//! its own: the driver that owns the list serializes access to it, and
//! each object carries a mutex guarding its own state. Inserting into or
//! removing from the list therefore happens with the driver's lock held
//! first and the object's lock second.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use slog::{debug, info, Logger};
use strum::{EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::context::ParseContext;
use crate::domain::DomainDef;
use crate::enums::{parse_enum, DomainState, VirEnum};
use crate::error::{Error, Result};
use crate::snapshot::SnapshotObjList;
use crate::xml::{Element, XmlWriter};

macro_rules! reasons {
    ($($ty:ident => $what:literal { $($variant:ident),* $(,)? })*) => {
        $(
            #[derive(
                Clone, Copy, Debug, Default, PartialEq, Eq, EnumString,
                IntoStaticStr,
            )]
            #[strum(serialize_all = "kebab-case")]
            pub enum $ty {
                #[default]
                Unknown,
                $($variant,)*
            }

            impl VirEnum for $ty {
                const WHAT: &'static str = $what;
            }
        )*
    };
}

reasons! {
    NostateReason => "nostate reason" {}
    RunningReason => "running reason" {
        Booted, Migrated, Restored, FromSnapshot, Unpaused,
        MigrationCanceled, SaveCanceled,
    }
    BlockedReason => "blocked reason" {}
    PausedReason => "paused reason" {
        User, Migration, Save, Dump, IoError, Watchdog, FromSnapshot,
        ShuttingDown,
    }
    ShutdownReason => "shutdown reason" { User }
    ShutoffReason => "shutoff reason" {
        Shutdown, Destroyed, Crashed, Migrated, Saved, Failed, FromSnapshot,
    }
    CrashedReason => "crashed reason" {}
}

/// A domain state together with why the domain entered it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomainStatus {
    Nostate(NostateReason),
    Running(RunningReason),
    Blocked(BlockedReason),
    Paused(PausedReason),
    Shutdown(ShutdownReason),
    Shutoff(ShutoffReason),
    Crashed(CrashedReason),
}

impl Default for DomainStatus {
    fn default() -> Self {
        DomainStatus::Shutoff(ShutoffReason::Unknown)
    }
}

impl DomainStatus {
    pub fn state(self) -> DomainState {
        match self {
            DomainStatus::Nostate(_) => DomainState::Nostate,
            DomainStatus::Running(_) => DomainState::Running,
            DomainStatus::Blocked(_) => DomainState::Blocked,
            DomainStatus::Paused(_) => DomainState::Paused,
            DomainStatus::Shutdown(_) => DomainState::Shutdown,
            DomainStatus::Shutoff(_) => DomainState::Shutoff,
            DomainStatus::Crashed(_) => DomainState::Crashed,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            DomainStatus::Nostate(r) => r.as_str(),
            DomainStatus::Running(r) => r.as_str(),
            DomainStatus::Blocked(r) => r.as_str(),
            DomainStatus::Paused(r) => r.as_str(),
            DomainStatus::Shutdown(r) => r.as_str(),
            DomainStatus::Shutoff(r) => r.as_str(),
            DomainStatus::Crashed(r) => r.as_str(),
        }
    }

    /// Reads the `state`/`reason` pair of a status file. A missing reason
    /// is `unknown`.
    pub fn parse(state: &str, reason: Option<&str>) -> Result<Self> {
        fn reason_of<T: VirEnum + Default>(r: Option<&str>) -> Result<T> {
            r.map(parse_enum).transpose().map(Option::unwrap_or_default)
        }
        Ok(match parse_enum::<DomainState>(state)? {
            DomainState::Nostate => DomainStatus::Nostate(reason_of(reason)?),
            DomainState::Running => DomainStatus::Running(reason_of(reason)?),
            DomainState::Blocked => DomainStatus::Blocked(reason_of(reason)?),
            DomainState::Paused => DomainStatus::Paused(reason_of(reason)?),
            DomainState::Shutdown => DomainStatus::Shutdown(reason_of(reason)?),
            DomainState::Shutoff => DomainStatus::Shutoff(reason_of(reason)?),
            DomainState::Crashed => DomainStatus::Crashed(reason_of(reason)?),
        })
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.state(), self.reason())
    }
}

bitflags! {
    /// Conditions under which a running domain can no longer be supported.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TaintFlags: u32 {
        const CUSTOM_ARGV = 1 << 0;
        const CUSTOM_MONITOR = 1 << 1;
        const HIGH_PRIVILEGES = 1 << 2;
        const SHELL_SCRIPTS = 1 << 3;
        const DISK_PROBING = 1 << 4;
        const EXTERNAL_LAUNCH = 1 << 5;
        const HOST_CPU = 1 << 6;
    }
}

impl TaintFlags {
    pub const NAMES: &'static [(&'static str, TaintFlags)] = &[
        ("custom-argv", TaintFlags::CUSTOM_ARGV),
        ("custom-monitor", TaintFlags::CUSTOM_MONITOR),
        ("high-privileges", TaintFlags::HIGH_PRIVILEGES),
        ("shell-scripts", TaintFlags::SHELL_SCRIPTS),
        ("disk-probing", TaintFlags::DISK_PROBING),
        ("external-launch", TaintFlags::EXTERNAL_LAUNCH),
        ("host-cpu", TaintFlags::HOST_CPU),
    ];

    pub fn by_name(name: &str) -> Option<TaintFlags> {
        Self::NAMES.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
    }

    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .iter()
            .filter(move |(_, f)| self.contains(*f))
            .map(|(n, _)| *n)
    }
}

/// Driver-specific state attached to a domain object and kept in its
/// status file.
pub trait PrivateData: Send {
    fn parse_status(&mut self, node: &Element) -> Result<()>;
    fn format_status(&self, w: &mut XmlWriter) -> Result<()>;
}

pub trait PrivateDataFactory: Send + Sync {
    fn alloc(&self) -> Box<dyn PrivateData>;
}

/// The mutable state of a [`DomainObj`], reached through
/// [`DomainObj::lock`].
pub struct DomainObjInner {
    pub pid: Option<u32>,
    status: DomainStatus,
    pub autostart: bool,
    pub persistent: bool,
    /// The running definition differs from the one it was started with.
    pub updated: bool,
    pub def: DomainDef,
    /// The definition that takes over once the domain shuts down.
    pub new_def: Option<DomainDef>,
    pub snapshots: SnapshotObjList,
    /// Name of the snapshot the domain currently descends from.
    pub current_snapshot: Option<String>,
    pub private: Option<Box<dyn PrivateData>>,
    taint: TaintFlags,
}

impl fmt::Debug for DomainObjInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainObjInner")
            .field("name", &self.def.name)
            .field("uuid", &self.def.uuid)
            .field("status", &self.status)
            .field("pid", &self.pid)
            .field("persistent", &self.persistent)
            .field("taint", &self.taint)
            .finish_non_exhaustive()
    }
}

impl DomainObjInner {
    pub fn is_active(&self) -> bool {
        self.def.is_active()
    }

    pub fn status(&self) -> DomainStatus {
        self.status
    }

    pub fn state(&self) -> DomainState {
        self.status.state()
    }

    pub fn set_status(&mut self, status: DomainStatus) {
        self.status = status;
    }

    pub fn taints(&self) -> TaintFlags {
        self.taint
    }

    /// Records `flag`, returning whether it was newly set.
    pub fn taint(&mut self, flag: TaintFlags) -> bool {
        if self.taint.contains(flag) {
            return false;
        }
        self.taint |= flag;
        true
    }

    /// Before a persistent domain's definition is changed at runtime, keeps
    /// a copy of the persistent definition to restore at shutdown. Nothing
    /// happens for transient domains, for inactive domains unless `live` is
    /// set, or when a copy already exists.
    pub fn set_def_transient(
        &mut self,
        ctx: &ParseContext,
        live: bool,
    ) -> Result<()> {
        if (!self.is_active() && !live)
            || !self.persistent
            || self.new_def.is_some()
        {
            return Ok(());
        }
        self.new_def = Some(self.def.copy(ctx, false)?);
        Ok(())
    }

    /// The definition that would be written to the config file.
    pub fn persistent_def(&mut self, ctx: &ParseContext) -> Result<&DomainDef> {
        self.set_def_transient(ctx, false)?;
        Ok(self.new_def.as_ref().unwrap_or(&self.def))
    }
}

/// A defined domain. Shared between the list and whoever looked it up.
#[derive(Debug)]
pub struct DomainObj {
    uuid: Uuid,
    inner: Mutex<DomainObjInner>,
}

impl DomainObj {
    fn new(
        def: DomainDef,
        private: Option<Box<dyn PrivateData>>,
        log: &Logger,
    ) -> Self {
        let snapshot_log = log.new(slog::o!("domain" => def.name.clone()));
        Self {
            uuid: def.uuid,
            inner: Mutex::new(DomainObjInner {
                pid: None,
                status: DomainStatus::default(),
                autostart: false,
                persistent: false,
                updated: false,
                def,
                new_def: None,
                snapshots: SnapshotObjList::new(snapshot_log),
                current_snapshot: None,
                private,
                taint: TaintFlags::empty(),
            }),
        }
    }

    /// The UUID never changes for the lifetime of the object, so it can be
    /// read without the lock.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn lock(&self) -> MutexGuard<'_, DomainObjInner> {
        self.inner.lock().unwrap()
    }
}

pub struct DomainObjList {
    objs: HashMap<Uuid, Arc<DomainObj>>,
    private: Option<Arc<dyn PrivateDataFactory>>,
    log: Logger,
}

impl fmt::Debug for DomainObjList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainObjList")
            .field("len", &self.objs.len())
            .finish_non_exhaustive()
    }
}

impl DomainObjList {
    pub fn new(log: Logger) -> Self {
        Self { objs: HashMap::new(), private: None, log }
    }

    pub fn with_private_data(
        mut self,
        factory: Arc<dyn PrivateDataFactory>,
    ) -> Self {
        self.private = Some(factory);
        self
    }

    pub fn len(&self) -> usize {
        self.objs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objs.is_empty()
    }

    pub fn find_by_uuid(&self, uuid: &Uuid) -> Option<Arc<DomainObj>> {
        self.objs.get(uuid).cloned()
    }

    fn find<F>(&self, mut pred: F) -> Option<Arc<DomainObj>>
    where
        F: FnMut(&DomainObjInner) -> bool,
    {
        self.objs.values().find(|obj| pred(&obj.lock())).cloned()
    }

    pub fn find_by_id(&self, id: i32) -> Option<Arc<DomainObj>> {
        self.find(|o| o.is_active() && o.def.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<DomainObj>> {
        self.find(|o| o.def.name == name)
    }

    /// Installs `def`, either as a new object or into the existing object
    /// with the same UUID.
    ///
    /// An inactive object takes the new definition directly; with `live`,
    /// its previous definition is kept as the one to return to at shutdown.
    /// An active object keeps running with its current definition and gets
    /// `def` as the one to switch to at shutdown.
    pub fn assign_def(&mut self, def: DomainDef, live: bool) -> Arc<DomainObj> {
        if let Some(obj) = self.objs.get(&def.uuid) {
            let mut inner = obj.lock();
            if inner.is_active() {
                inner.new_def = Some(def);
            } else if live {
                let old = std::mem::replace(&mut inner.def, def);
                if inner.new_def.is_none() {
                    inner.new_def = Some(old);
                }
            } else {
                inner.def = def;
            }
            debug!(self.log, "replaced domain definition";
                "name" => %inner.def.name,
                "uuid" => %obj.uuid);
            drop(inner);
            return obj.clone();
        }

        let private = self.alloc_private();
        self.insert_new(def, private)
    }

    /// Fresh driver-private data, if the list was given a factory.
    pub fn alloc_private(&self) -> Option<Box<dyn PrivateData>> {
        self.private.as_ref().map(|f| f.alloc())
    }

    /// Registers a new object for `def`, whose UUID must not be in the list.
    pub(crate) fn insert_new(
        &mut self,
        def: DomainDef,
        private: Option<Box<dyn PrivateData>>,
    ) -> Arc<DomainObj> {
        let uuid = def.uuid;
        info!(self.log, "registered domain";
            "name" => %def.name,
            "uuid" => %uuid);
        let obj = Arc::new(DomainObj::new(def, private, &self.log));
        self.objs.insert(uuid, obj.clone());
        obj
    }

    /// Drops an inactive domain from the list. The object itself lives on
    /// until the last outstanding reference to it goes away.
    pub fn remove_inactive(&mut self, obj: &DomainObj) -> Result<()> {
        let inner = obj.lock();
        if inner.is_active() {
            return Err(Error::OperationInvalid(format!(
                "domain '{}' is still running",
                inner.def.name
            )));
        }
        info!(self.log, "removed domain"; "name" => %inner.def.name);
        drop(inner);
        self.objs.remove(&obj.uuid);
        Ok(())
    }

    /// Checks `def` against the domains already defined. Returns `true`
    /// when it redefines an existing domain and `false` when it is new.
    /// Fails when its name or UUID clashes with a different domain, or,
    /// with `check_active`, when the domain it redefines is running.
    pub fn is_duplicate(
        &self,
        def: &DomainDef,
        check_active: bool,
    ) -> Result<bool> {
        if let Some(obj) = self.objs.get(&def.uuid) {
            let inner = obj.lock();
            if inner.def.name != def.name {
                return Err(Error::OperationFailed(format!(
                    "domain '{}' is already defined with uuid {}",
                    inner.def.name, def.uuid
                )));
            }
            if check_active && inner.is_active() {
                return Err(Error::OperationInvalid(format!(
                    "domain is already active as '{}'",
                    inner.def.name
                )));
            }
            return Ok(true);
        }

        if let Some(obj) = self.find_by_name(&def.name) {
            return Err(Error::OperationFailed(format!(
                "domain '{}' already exists with uuid {}",
                def.name,
                obj.uuid()
            )));
        }
        Ok(false)
    }

    pub fn num_of_domains(&self, active: bool) -> usize {
        self.objs.values().filter(|o| o.lock().is_active() == active).count()
    }

    pub fn active_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .objs
            .values()
            .filter_map(|o| {
                let inner = o.lock();
                inner.is_active().then_some(inner.def.id)
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn inactive_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .objs
            .values()
            .filter_map(|o| {
                let inner = o.lock();
                (!inner.is_active()).then(|| inner.def.name.clone())
            })
            .collect();
        names.sort();
        names
    }
}
