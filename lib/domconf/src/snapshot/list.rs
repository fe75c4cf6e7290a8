// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;

use slog::{o, warn, Logger};

use super::SnapshotDef;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Mark {
    #[default]
    None,
    Descendant,
    Other,
}

#[derive(Debug)]
struct SnapshotObj {
    def: SnapshotDef,
    mark: Mark,
}

/// The snapshots of one domain, keyed by name. Parent links are names, so
/// the tree is only as consistent as the definitions put into it.
#[derive(Debug)]
pub struct SnapshotObjList {
    objs: HashMap<String, SnapshotObj>,
    log: Logger,
}

impl Default for SnapshotObjList {
    fn default() -> Self {
        Self::new(Logger::root(slog::Discard, o!()))
    }
}

impl SnapshotObjList {
    pub fn new(log: Logger) -> Self {
        Self { objs: HashMap::new(), log }
    }

    pub fn assign(&mut self, def: SnapshotDef) -> Result<&SnapshotDef> {
        if self.objs.contains_key(&def.name) {
            return Err(Error::OperationFailed(format!(
                "snapshot '{}' already exists",
                def.name
            )));
        }
        let name = def.name.clone();
        let obj = self
            .objs
            .entry(name)
            .or_insert(SnapshotObj { def, mark: Mark::None });
        Ok(&obj.def)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SnapshotDef> {
        self.objs.get(name).map(|o| &o.def)
    }

    pub fn find_by_name_mut(&mut self, name: &str) -> Option<&mut SnapshotDef> {
        self.objs.get_mut(name).map(|o| &mut o.def)
    }

    pub fn remove(&mut self, name: &str) -> Option<SnapshotDef> {
        self.objs.remove(name).map(|o| o.def)
    }

    /// Snapshot names in sorted order, optionally only those without a
    /// parent.
    pub fn names(&self, roots_only: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .objs
            .values()
            .filter(|o| !roots_only || o.def.parent.is_none())
            .map(|o| o.def.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn num(&self, roots_only: bool) -> usize {
        if roots_only {
            self.num_roots()
        } else {
            self.objs.len()
        }
    }

    pub fn num_roots(&self) -> usize {
        self.objs.values().filter(|o| o.def.parent.is_none()).count()
    }

    pub fn has_children(&self, name: &str) -> bool {
        self.objs.values().any(|o| o.def.parent.as_deref() == Some(name))
    }

    /// Calls `f` on each direct child of `parent` and returns how many
    /// there were.
    pub fn for_each_child<F>(&self, parent: &str, mut f: F) -> usize
    where
        F: FnMut(&SnapshotDef),
    {
        let mut count = 0;
        for obj in self.objs.values() {
            if obj.def.parent.as_deref() == Some(parent) {
                f(&obj.def);
                count += 1;
            }
        }
        count
    }

    /// Calls `f` on every snapshot below `ancestor`, in no particular
    /// order, and returns how many there were.
    pub fn for_each_descendant<F>(&mut self, ancestor: &str, mut f: F) -> usize
    where
        F: FnMut(&SnapshotDef),
    {
        for obj in self.objs.values_mut() {
            obj.mark = Mark::None;
        }

        loop {
            let mut updates = Vec::new();
            for (name, obj) in &self.objs {
                if obj.mark != Mark::None {
                    continue;
                }
                let mark = match obj.def.parent.as_deref() {
                    None => Mark::Other,
                    Some(p) if p == ancestor => Mark::Descendant,
                    Some(p) => match self.objs.get(p) {
                        Some(parent) => parent.mark,
                        None => {
                            warn!(self.log, "snapshot has unknown parent";
                                "snapshot" => name.as_str(),
                                "parent" => p);
                            Mark::Other
                        }
                    },
                };
                if mark != Mark::None {
                    updates.push((name.clone(), mark));
                }
            }
            if updates.is_empty() {
                break;
            }
            for (name, mark) in updates {
                if let Some(obj) = self.objs.get_mut(&name) {
                    obj.mark = mark;
                }
            }
        }

        let mut count = 0;
        for obj in self.objs.values_mut() {
            if obj.mark == Mark::Descendant {
                f(&obj.def);
                count += 1;
            }
            obj.mark = Mark::None;
        }
        count
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::enums::SnapshotState;

    fn snap(name: &str, parent: Option<&str>) -> SnapshotDef {
        SnapshotDef {
            name: name.to_string(),
            description: None,
            parent: parent.map(str::to_string),
            creation_time: 0,
            state: SnapshotState::Shutoff,
            disks: Vec::new(),
            dom: None,
            current: false,
        }
    }

    // a -> b -> c, a -> d, e, f -> (missing)
    fn tree() -> SnapshotObjList {
        let mut list = SnapshotObjList::default();
        for (name, parent) in [
            ("c", Some("b")),
            ("a", None),
            ("b", Some("a")),
            ("d", Some("a")),
            ("e", None),
            ("f", Some("gone")),
        ] {
            list.assign(snap(name, parent)).unwrap();
        }
        list
    }

    #[test]
    fn counts_and_names() {
        let list = tree();
        assert_eq!(list.num(false), 6);
        assert_eq!(list.num(true), 2);
        assert_eq!(list.names(true), vec!["a", "e"]);
        assert!(list.has_children("a"));
        assert!(!list.has_children("c"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut list = tree();
        let err = list.assign(snap("a", None)).unwrap_err();
        assert!(matches!(err, Error::OperationFailed(_)));
    }

    #[test]
    fn children_and_descendants() {
        let mut list = tree();

        let mut children = Vec::new();
        let n = list.for_each_child("a", |s| children.push(s.name.clone()));
        assert_eq!(n, 2);

        children.sort();
        assert_eq!(children, vec!["b", "d"]);

        let mut below = Vec::new();
        assert_eq!(
            list.for_each_descendant("a", |s| below.push(s.name.clone())),
            3
        );
        below.sort();
        assert_eq!(below, vec!["b", "c", "d"]);

        // Marks are reset between walks.
        assert_eq!(list.for_each_descendant("b", |_| {}), 1);
        assert_eq!(list.for_each_descendant("e", |_| {}), 0);
    }

    #[test]
    fn removal() {
        let mut list = tree();
        assert!(list.remove("c").is_some());
        assert!(list.remove("c").is_none());
        assert!(!list.has_children("b"));
        assert_eq!(list.names(false), vec!["a", "b", "d", "e", "f"]);
    }
}
