// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Guest and host CPU model descriptions.

use domconf_types::CpuSet;

use crate::enums::{CpuFallback, CpuFeaturePolicy, CpuMatch, CpuMode};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

/// Whether a `<cpu>` describes the host (capabilities) or a guest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CpuType {
    Host,
    #[default]
    Guest,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuTopology {
    pub sockets: u32,
    pub cores: u32,
    pub threads: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuFeature {
    pub name: String,
    /// Always `None` for host CPUs.
    pub policy: Option<CpuFeaturePolicy>,
}

/// A guest NUMA cell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NumaCell {
    pub cpus: CpuSet,
    /// KiB.
    pub memory: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CpuDef {
    pub cpu_type: CpuType,
    pub mode: CpuMode,
    pub matching: CpuMatch,
    pub arch: Option<String>,
    pub model: Option<String>,
    pub fallback: CpuFallback,
    pub vendor: Option<String>,
    pub topology: Option<CpuTopology>,
    pub features: Vec<CpuFeature>,
    pub cells: Vec<NumaCell>,
}

impl CpuDef {
    pub fn parse(node: &Element, cpu_type: CpuType) -> Result<Self> {
        if node.name() != "cpu" {
            return Err(Error::Xml(
                "XML does not contain expected 'cpu' element".to_string(),
            ));
        }

        let mut def = CpuDef { cpu_type, ..Default::default() };

        if cpu_type == CpuType::Guest {
            def.mode = node.attr_enum("mode")?.unwrap_or_default();
            if def.mode == CpuMode::Custom {
                def.matching = node.attr_enum("match")?.unwrap_or_default();
            }
        } else {
            def.arch = node.path_text("arch").map(str::to_owned);
            if def.arch.is_none() {
                return Err(Error::Xml("Missing CPU architecture".to_string()));
            }
        }

        if let Some(model) = node.child("model") {
            def.model = Some(model.text().to_owned()).filter(|m| !m.is_empty());
            if cpu_type == CpuType::Guest {
                def.fallback = model.attr_enum("fallback")?.unwrap_or_default();
            }
        }
        if def.model.is_none()
            && def.mode == CpuMode::Custom
            && cpu_type == CpuType::Guest
            && node.elements().next().is_some()
            && node.child("topology").is_none()
        {
            return Err(Error::Xml("Missing CPU model name".to_string()));
        }

        def.vendor = node.path_text("vendor").map(str::to_owned);
        if def.vendor.is_some() && def.model.is_none() {
            return Err(Error::Xml(
                "CPU vendor specified without CPU model".to_string(),
            ));
        }

        if let Some(topo) = node.child("topology") {
            let field = |name: &str| -> Result<u32> {
                match topo.attr_parse::<u32>(name)? {
                    Some(n) if n > 0 => Ok(n),
                    Some(_) => Err(Error::Xml(format!(
                        "Invalid '{}' value in CPU topology",
                        name
                    ))),
                    None => Err(Error::Xml(format!(
                        "Missing '{}' attribute in CPU topology",
                        name
                    ))),
                }
            };
            def.topology = Some(CpuTopology {
                sockets: field("sockets")?,
                cores: field("cores")?,
                threads: field("threads")?,
            });
        }

        for feature in node.children_named("feature") {
            let name = feature.attr("name").ok_or_else(|| {
                Error::Xml("Invalid CPU feature name".to_string())
            })?;
            let policy = match cpu_type {
                CpuType::Guest => {
                    Some(feature.attr_enum("policy")?.unwrap_or_default())
                }
                CpuType::Host => None,
            };
            if def.features.iter().any(|f| f.name == name) {
                return Err(Error::ConfigUnsupported(format!(
                    "CPU feature `{}' specified more than once",
                    name
                )));
            }
            def.features.push(CpuFeature { name: name.to_owned(), policy });
        }

        for cell in node.path_all("numa/cell") {
            let cpus = cell.attr("cpus").ok_or_else(|| {
                Error::Xml("Missing 'cpus' attribute in NUMA cell".to_string())
            })?;
            let cpus = CpuSet::parse(cpus, domconf_types::CPUSET_MAX_CPUS)
                .map_err(|e| Error::Xml(format!("NUMA cell cpus: {}", e)))?;
            let memory = cell.attr_parse::<u64>("memory")?.ok_or_else(|| {
                Error::Xml(
                    "Missing 'memory' attribute in NUMA cell".to_string(),
                )
            })?;
            def.cells.push(NumaCell { cpus, memory });
        }

        Ok(def)
    }

    /// Whether formatting would produce anything at all.
    fn is_empty(&self) -> bool {
        self.mode == CpuMode::Custom
            && self.model.is_none()
            && self.topology.is_none()
            && self.features.is_empty()
            && self.cells.is_empty()
            && self.arch.is_none()
    }

    pub fn format(&self, w: &mut XmlWriter) {
        if self.is_empty() {
            return;
        }

        let mut tag = Tag::new("cpu");
        if self.cpu_type == CpuType::Guest {
            tag = if self.mode != CpuMode::Custom {
                tag.attr("mode", self.mode)
            } else if self.model.is_some() {
                tag.attr("match", self.matching)
            } else {
                tag
            };
        }

        let mut inner = w.nested();
        inner.leaf_opt("arch", self.arch.as_deref());
        if let Some(model) = &self.model {
            let mtag = Tag::new("model").attr_if(
                self.cpu_type == CpuType::Guest
                    && self.fallback != CpuFallback::Allow,
                "fallback",
                self.fallback,
            );
            inner.leaf(mtag, model);
        }
        inner.leaf_opt("vendor", self.vendor.as_deref());
        if let Some(t) = &self.topology {
            inner.empty(
                Tag::new("topology")
                    .attr("sockets", t.sockets)
                    .attr("cores", t.cores)
                    .attr("threads", t.threads),
            );
        }
        for f in &self.features {
            inner.empty(
                Tag::new("feature")
                    .attr_opt("policy", f.policy)
                    .attr("name", &f.name),
            );
        }
        if !self.cells.is_empty() {
            let mut numa = inner.nested();
            for c in &self.cells {
                numa.empty(
                    Tag::new("cell")
                        .attr("cpus", &c.cpus)
                        .attr("memory", c.memory),
                );
            }
            inner.element_with(Tag::new("numa"), numa);
        }
        w.element_with(tag, inner);
    }

    /// Turns a `host-model` guest CPU into a custom CPU matching `host`,
    /// keeping any features the guest adds on top.
    pub fn update_from_host(&mut self, host: &CpuDef) -> Result<()> {
        if self.mode != CpuMode::HostModel {
            return Ok(());
        }
        let model = host.model.clone().ok_or_else(|| {
            Error::OperationFailed(
                "cannot update guest CPU from a host CPU without a model"
                    .to_string(),
            )
        })?;

        let mut features: Vec<CpuFeature> = host
            .features
            .iter()
            .map(|f| CpuFeature {
                name: f.name.clone(),
                policy: Some(CpuFeaturePolicy::Require),
            })
            .collect();
        for f in &self.features {
            match features.iter_mut().find(|h| h.name == f.name) {
                Some(existing) => existing.policy = f.policy,
                None => features.push(f.clone()),
            }
        }

        self.mode = CpuMode::Custom;
        self.matching = CpuMatch::Exact;
        self.model = Some(model);
        self.vendor = host.vendor.clone();
        self.fallback = CpuFallback::Allow;
        self.features = features;
        Ok(())
    }
}
