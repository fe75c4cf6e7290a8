// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Everything a parse needs besides the document itself.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use slog::{o, Logger};

use crate::caps::Capabilities;
use crate::enums::VirtType;
use crate::error::Result;
use crate::xml::{Element, XmlWriter};

bitflags! {
    /// Controls which projection of a definition is read or written.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct XmlFlags: u32 {
        /// The persistent projection: runtime-only state is ignored on input
        /// and suppressed on output.
        const INACTIVE = 1 << 0;
        /// Include passwords.
        const SECURE = 1 << 1;
        /// Expand a `host-model` CPU against the host CPU on output.
        const UPDATE_CPU = 1 << 2;
        /// Accept and emit host-side device state kept in status files.
        const INTERNAL_STATUS = 1 << 16;
        /// Accept and emit the runtime resolution of network interfaces.
        const INTERNAL_ACTUAL_NET = 1 << 17;
        /// Omit devices that only exist while the domain runs.
        const NO_EPHEMERAL_DEVICES = 1 << 18;
    }
}

/// Sources of randomness and wall-clock time.
pub trait Environment: Send + Sync {
    fn random_bytes(&self, buf: &mut [u8]);

    /// Seconds since the Unix epoch.
    fn now(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn random_bytes(&self, buf: &mut [u8]) {
        rand::thread_rng().fill_bytes(buf);
    }

    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Driver-private data carried in a definition under a foreign XML
/// namespace.
#[derive(Clone)]
pub struct NamespaceData {
    pub handler: Arc<dyn NamespaceHandler>,
    pub data: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for NamespaceData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceData")
            .field("prefix", &self.handler.prefix())
            .finish_non_exhaustive()
    }
}

/// Parses and formats a driver's extension elements on `<domain>`.
pub trait NamespaceHandler: Send + Sync {
    /// The namespace prefix, e.g. `qemu`.
    fn prefix(&self) -> &str;

    /// The namespace URI, emitted as `xmlns:<prefix>` on the root.
    fn href(&self) -> &str;

    /// Reads the extension elements from the `<domain>` root. Returns
    /// `None` when the document carries nothing for this namespace.
    fn parse(&self, root: &Element)
        -> Result<Option<Arc<dyn Any + Send + Sync>>>;

    /// Writes the extension elements at the current position of `w`.
    fn format(
        &self,
        w: &mut XmlWriter,
        data: &(dyn Any + Send + Sync),
    ) -> Result<()>;
}

/// Parameters of one parse call.
#[derive(Clone)]
pub struct ParseContext {
    pub caps: Arc<Capabilities>,
    /// Bitmask of [`VirtType::mask`] values accepted as `<domain type>`.
    pub expected_virt_types: u32,
    pub flags: XmlFlags,
    pub ns: Option<Arc<dyn NamespaceHandler>>,
    pub env: Arc<dyn Environment>,
    pub log: Logger,
}

impl fmt::Debug for ParseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseContext")
            .field("expected_virt_types", &self.expected_virt_types)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl ParseContext {
    pub fn new(caps: Arc<Capabilities>) -> Self {
        Self {
            caps,
            expected_virt_types: VirtType::ALL_MASK,
            flags: XmlFlags::empty(),
            ns: None,
            env: Arc::new(SystemEnvironment),
            log: Logger::root(slog::Discard, o!()),
        }
    }

    pub fn with_flags(mut self, flags: XmlFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_expected_virt_types(mut self, mask: u32) -> Self {
        self.expected_virt_types = mask;
        self
    }

    pub fn with_namespace(mut self, ns: Arc<dyn NamespaceHandler>) -> Self {
        self.ns = Some(ns);
        self
    }

    pub fn with_env(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    pub fn with_log(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    pub fn has(&self, flag: XmlFlags) -> bool {
        self.flags.contains(flag)
    }

    pub(crate) fn generate_uuid(&self) -> uuid::Uuid {
        let mut bytes = [0u8; 16];
        self.env.random_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }
}
