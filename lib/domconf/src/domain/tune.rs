// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Memory sizing and the resource tuning blocks: `<memoryBacking>`,
//! `<blkiotune>`, `<memtune>`, `<vcpu>`, `<cputune>` and `<numatune>`.

use domconf_types::{CpuSet, DEFAULT_MAX_CPUS};

use crate::enums::NumatuneMode;
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

/// Memory sizes, all in KiB.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryDef {
    pub max_balloon: u64,
    pub cur_balloon: u64,
    pub hugepage_backed: bool,
    pub ksm_disabled: bool,
    pub hard_limit: Option<u64>,
    pub soft_limit: Option<u64>,
    pub min_guarantee: Option<u64>,
    pub swap_hard_limit: Option<u64>,
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    let m = match unit {
        "b" | "bytes" => 1,
        "k" | "KiB" => 1 << 10,
        "KB" => 1_000,
        "M" | "MiB" => 1 << 20,
        "MB" => 1_000_000,
        "G" | "GiB" => 1 << 30,
        "GB" => 1_000_000_000,
        "T" | "TiB" => 1 << 40,
        "TB" => 1_000_000_000_000,
        _ => return None,
    };
    Some(m)
}

/// Reads a memory size element, honouring its `unit` attribute, and returns
/// the value in KiB rounded up.
pub(crate) fn parse_scaled(node: &Element) -> Result<u64> {
    let value: u64 = node.text().parse().map_err(|_| {
        Error::Xml(format!(
            "invalid value '{}' in <{}>",
            node.text(),
            node.name()
        ))
    })?;
    let unit = node.attr("unit").unwrap_or("KiB");
    let mult = unit_multiplier(unit).ok_or_else(|| {
        Error::ConfigUnsupported(format!("unknown memory unit '{}'", unit))
    })?;
    let bytes = u128::from(value) * u128::from(mult);
    let kib = (bytes + 1023) / 1024;
    u64::try_from(kib).map_err(|_| {
        Error::ConfigUnsupported(format!(
            "value '{}{}' of <{}> is too large",
            value,
            unit,
            node.name()
        ))
    })
}

fn optional_scaled(root: &Element, path: &str) -> Result<Option<u64>> {
    root.path(path).map(parse_scaled).transpose()
}

impl MemoryDef {
    pub fn parse(root: &Element) -> Result<Self> {
        let max_balloon = match root.child("memory") {
            Some(m) => parse_scaled(m)?,
            None => {
                return Err(Error::Internal(
                    "missing memory element".to_string(),
                ))
            }
        };
        let cur_balloon =
            optional_scaled(root, "currentMemory")?.unwrap_or(max_balloon);
        if cur_balloon > max_balloon {
            return Err(Error::ConfigUnsupported(format!(
                "current memory '{}k' exceeds maximum '{}k'",
                cur_balloon, max_balloon
            )));
        }

        Ok(MemoryDef {
            max_balloon,
            cur_balloon,
            hugepage_backed: root.path("memoryBacking/hugepages").is_some(),
            ksm_disabled: root.path("memoryBacking/nosharepages").is_some(),
            hard_limit: optional_scaled(root, "memtune/hard_limit")?,
            soft_limit: optional_scaled(root, "memtune/soft_limit")?,
            min_guarantee: optional_scaled(root, "memtune/min_guarantee")?,
            swap_hard_limit: optional_scaled(root, "memtune/swap_hard_limit")?,
        })
    }

    /// Writes `<memory>` and `<currentMemory>`.
    pub fn format_sizes(&self, w: &mut XmlWriter) {
        w.leaf(Tag::new("memory").attr("unit", "KiB"), self.max_balloon);
        w.leaf(Tag::new("currentMemory").attr("unit", "KiB"), self.cur_balloon);
    }

    pub fn format_memtune(&self, w: &mut XmlWriter) {
        let mut inner = w.nested();
        for (name, value) in [
            ("hard_limit", self.hard_limit),
            ("soft_limit", self.soft_limit),
            ("min_guarantee", self.min_guarantee),
            ("swap_hard_limit", self.swap_hard_limit),
        ] {
            if let Some(v) = value {
                inner.leaf(Tag::new(name).attr("unit", "KiB"), v);
            }
        }
        w.element_if_nonempty(Tag::new("memtune"), inner);
    }

    pub fn format_backing(&self, w: &mut XmlWriter) {
        let mut inner = w.nested();
        if self.hugepage_backed {
            inner.empty(Tag::new("hugepages"));
        }
        if self.ksm_disabled {
            inner.empty(Tag::new("nosharepages"));
        }
        w.element_if_nonempty(Tag::new("memoryBacking"), inner);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlkioTune {
    pub weight: Option<u32>,
}

impl BlkioTune {
    pub fn parse(root: &Element) -> Result<Self> {
        let weight = match root.path("blkiotune/weight") {
            Some(w) => Some(w.text_parse::<u32>()?),
            None => None,
        };
        Ok(BlkioTune { weight })
    }

    pub fn format(&self, w: &mut XmlWriter) {
        if let Some(weight) = self.weight {
            w.open(Tag::new("blkiotune"));
            w.leaf(Tag::new("weight"), weight);
            w.close("blkiotune");
        }
    }
}

/// The `<vcpu>` element: maximum and current counts plus the host CPU
/// mask.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VcpuDef {
    pub max: u32,
    pub current: u32,
    pub cpumask: Option<CpuSet>,
}

impl Default for VcpuDef {
    fn default() -> Self {
        Self { max: 1, current: 1, cpumask: None }
    }
}

impl VcpuDef {
    pub fn parse(root: &Element) -> Result<Self> {
        let Some(node) = root.child("vcpu") else {
            return Ok(VcpuDef::default());
        };

        let max = if node.text().is_empty() {
            1
        } else {
            node.text().parse::<u32>().map_err(|_| {
                Error::Xml("maximum vcpus must be an integer".to_string())
            })?
        };
        if max == 0 {
            return Err(Error::ConfigUnsupported(
                "maximum vcpus must be at least 1".to_string(),
            ));
        }

        let current = match node.attr("current") {
            None => max,
            Some(c) => c.trim().parse::<u32>().map_err(|_| {
                Error::Xml("current vcpus must be an integer".to_string())
            })?,
        };
        if current == 0 {
            return Err(Error::ConfigUnsupported(
                "current vcpus must be at least 1".to_string(),
            ));
        }
        if current > max {
            return Err(Error::ConfigUnsupported(format!(
                "maxvcpus {} must not be less than current vcpus {}",
                max, current
            )));
        }

        let cpumask = node
            .attr("cpuset")
            .map(|s| {
                CpuSet::parse(s, DEFAULT_MAX_CPUS).map_err(|e| {
                    Error::Xml(format!("invalid cpuset '{}': {}", s, e))
                })
            })
            .transpose()?;

        Ok(VcpuDef { max, current, cpumask })
    }

    pub fn format(&self, w: &mut XmlWriter) {
        w.leaf(
            Tag::new("vcpu")
                .attr_opt("cpuset", self.cpumask.as_ref())
                .attr_if(self.current != self.max, "current", self.current),
            self.max,
        );
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VcpuPin {
    pub vcpu: u32,
    pub cpumask: CpuSet,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuTune {
    pub shares: Option<u64>,
    pub period: Option<u64>,
    pub quota: Option<i64>,
    pub vcpupin: Vec<VcpuPin>,
}

fn leaf_value<T>(root: &Element, path: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    root.path(path).map(Element::text_parse::<T>).transpose()
}

impl CpuTune {
    pub fn parse(root: &Element, max_vcpus: u32) -> Result<Self> {
        let mut tune = CpuTune {
            shares: leaf_value(root, "cputune/shares")?,
            period: leaf_value(root, "cputune/period")?,
            quota: leaf_value(root, "cputune/quota")?,
            vcpupin: Vec::new(),
        };

        for pin in root.path_all("cputune/vcpupin") {
            let vcpu = pin
                .attr_parse::<u32>("vcpu")?
                .ok_or_else(|| {
                    Error::Xml("missing vcpu id in vcpupin".to_string())
                })?;
            if vcpu >= max_vcpus {
                return Err(Error::Internal(format!(
                    "vcpu id {} must be less than maxvcpus {}",
                    vcpu, max_vcpus
                )));
            }
            if tune.vcpupin.iter().any(|p| p.vcpu == vcpu) {
                return Err(Error::Internal(format!(
                    "duplicate vcpupin for same vcpu {}",
                    vcpu
                )));
            }
            let set = pin.attr("cpuset").ok_or_else(|| {
                Error::Xml("missing cpuset for vcpupin".to_string())
            })?;
            let cpumask = CpuSet::parse(set, DEFAULT_MAX_CPUS).map_err(|e| {
                Error::Xml(format!("invalid vcpupin cpuset '{}': {}", set, e))
            })?;
            tune.vcpupin.push(VcpuPin { vcpu, cpumask });
        }

        Ok(tune)
    }

    pub fn pin_for(&self, vcpu: u32) -> Option<&CpuSet> {
        self.vcpupin.iter().find(|p| p.vcpu == vcpu).map(|p| &p.cpumask)
    }

    pub fn format(&self, w: &mut XmlWriter) {
        let mut inner = w.nested();
        inner.leaf_opt("shares", self.shares);
        inner.leaf_opt("period", self.period);
        inner.leaf_opt("quota", self.quota);
        for pin in &self.vcpupin {
            inner.empty(
                Tag::new("vcpupin")
                    .attr("vcpu", pin.vcpu)
                    .attr("cpuset", &pin.cpumask),
            );
        }
        w.element_if_nonempty(Tag::new("cputune"), inner);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumaTune {
    pub nodemask: CpuSet,
    pub mode: NumatuneMode,
}

impl NumaTune {
    pub fn parse(root: &Element) -> Result<Option<Self>> {
        let Some(node) = root.path("numatune/memory") else {
            return Ok(None);
        };
        let set = node.attr("nodeset").ok_or_else(|| {
            Error::Xml("nodeset for NUMA memory tuning must be set".to_string())
        })?;
        let nodemask = CpuSet::parse(set, DEFAULT_MAX_CPUS).map_err(|e| {
            Error::Xml(format!("invalid nodeset '{}': {}", set, e))
        })?;
        Ok(Some(NumaTune {
            nodemask,
            mode: node.attr_enum("mode")?.unwrap_or_default(),
        }))
    }

    pub fn format(&self, w: &mut XmlWriter) {
        w.open(Tag::new("numatune"));
        w.empty(
            Tag::new("memory")
                .attr("mode", self.mode)
                .attr("nodeset", &self.nodemask),
        );
        w.close("numatune");
    }
}
