// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Snapshot metadata: the `<domainsnapshot>` document, alignment of its
//! disk requests with the domain's disks, and the per-domain snapshot tree.

mod align;
mod def;
mod list;

pub use def::{SnapshotDef, SnapshotDiskDef, SnapshotParseFlags};
pub use list::SnapshotObjList;
