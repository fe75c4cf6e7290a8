// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reading, validating, normalizing and writing virtual machine domain
//! definitions, along with the snapshot metadata, ABI stability checks and
//! on-disk bookkeeping that go with them.

#![allow(clippy::style)]

#[macro_use]
extern crate bitflags;

pub mod abi;
pub mod address;
pub mod caps;
pub mod context;
pub mod cpu;
pub mod device;
pub mod domain;
pub mod drive;
pub mod enums;
pub mod error;
pub mod persist;
pub mod registry;
pub mod snapshot;
pub mod sysinfo;
pub mod xml;

pub use abi::{AbiIncompatibility, CompatCheck};
pub use caps::Capabilities;
pub use context::{Environment, ParseContext, SystemEnvironment, XmlFlags};
pub use domain::DomainDef;
pub use error::{Error, ErrorKind, Result};
pub use persist::DomainStore;
pub use registry::{DomainObj, DomainObjList};
pub use snapshot::{SnapshotDef, SnapshotObjList};
