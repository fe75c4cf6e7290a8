// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Guest network interfaces.

use domconf_types::MacAddr;
use uuid::Uuid;

use crate::address::{DeviceInfo, InfoAllow};
use crate::context::{ParseContext, XmlFlags};
use crate::enums::{
    parse_enum, MacvtapMode, NetBackend, NetTxMode, NetType, TriState,
    VirtualPortType,
};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

/// Prefix of tap device names generated by the host; such names are not
/// part of the persistent configuration.
pub const GENERATED_IFNAME_PREFIX: &str = "vnet";

const MAX_VLAN_TAG: u32 = 4095;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VirtPortProfile {
    Qbg {
        manager_id: u8,
        type_id: u32,
        type_id_version: u8,
        instance_id: Uuid,
    },
    Qbh {
        profile_id: String,
    },
}

impl VirtPortProfile {
    fn parse(node: &Element, ctx: &ParseContext) -> Result<Self> {
        let kind: VirtualPortType = match node.attr("type") {
            Some(t) => parse_enum(t)?,
            None => {
                return Err(Error::Xml(
                    "missing virtualportprofile type".to_string(),
                ))
            }
        };
        let params = node.child("parameters");
        let param = |name: &str| params.and_then(|p| p.attr(name));

        match kind {
            VirtualPortType::Qbg => {
                let required = |name: &str, max: u32| -> Result<u32> {
                    let v = param(name).ok_or_else(|| {
                        Error::Xml(format!(
                            "a {} must be specified for 802.1Qbg",
                            name
                        ))
                    })?;
                    match v.trim().parse::<u32>() {
                        Ok(n) if n <= max => Ok(n),
                        _ => Err(Error::Xml(format!(
                            "invalid {} '{}' in virtualport",
                            name, v
                        ))),
                    }
                };
                let manager_id = required("managerid", 0xff)? as u8;
                let type_id = required("typeid", 0xff_ffff)?;
                let type_id_version = required("typeidversion", 0xff)? as u8;
                let instance_id = match param("instanceid") {
                    Some(v) => Uuid::parse_str(v).map_err(|_| {
                        Error::Xml(format!(
                            "cannot parse instanceid parameter as a uuid: {}",
                            v
                        ))
                    })?,
                    None => ctx.generate_uuid(),
                };
                Ok(VirtPortProfile::Qbg {
                    manager_id,
                    type_id,
                    type_id_version,
                    instance_id,
                })
            }
            VirtualPortType::Qbh => {
                let profile_id = param("profileid").ok_or_else(|| {
                    Error::Xml(
                        "profileid parameter missing for 802.1Qbh description"
                            .to_string(),
                    )
                })?;
                Ok(VirtPortProfile::Qbh { profile_id: profile_id.to_owned() })
            }
        }
    }

    fn format(&self, w: &mut XmlWriter) {
        let (kind, params) = match self {
            VirtPortProfile::Qbg {
                manager_id,
                type_id,
                type_id_version,
                instance_id,
            } => (
                VirtualPortType::Qbg,
                Tag::new("parameters")
                    .attr("managerid", manager_id)
                    .attr("typeid", type_id)
                    .attr("typeidversion", type_id_version)
                    .attr("instanceid", instance_id),
            ),
            VirtPortProfile::Qbh { profile_id } => (
                VirtualPortType::Qbh,
                Tag::new("parameters").attr("profileid", profile_id),
            ),
        };
        let mut inner = w.nested();
        inner.empty(params);
        w.element_with(Tag::new("virtualport").attr("type", kind), inner);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vlan {
    pub tags: Vec<u32>,
    pub trunk: bool,
}

impl Vlan {
    fn parse(node: &Element) -> Result<Self> {
        let mut tags = Vec::new();
        for tag in node.children_named("tag") {
            let id = tag.attr_parse::<u32>("id")?.ok_or_else(|| {
                Error::Xml("missing id for vlan tag".to_string())
            })?;
            if id > MAX_VLAN_TAG {
                return Err(Error::Xml(format!(
                    "vlan tag id {} too large (maximum {})",
                    id, MAX_VLAN_TAG
                )));
            }
            tags.push(id);
        }
        if tags.is_empty() {
            return Err(Error::Xml(
                "missing tag id - each <vlan> must have at least one \
                 <tag id='n'/> subelement"
                    .to_string(),
            ));
        }
        let trunk = match node.attr_yes_no("trunk")? {
            Some(false) if tags.len() > 1 => {
                return Err(Error::Xml(
                    "invalid \"trunk='no'\" in <vlan> - trunk='no' is not \
                     allowed with multiple tags"
                        .to_string(),
                ))
            }
            Some(t) => t,
            None => tags.len() > 1,
        };
        Ok(Vlan { tags, trunk })
    }

    fn format(&self, w: &mut XmlWriter) {
        let mut inner = w.nested();
        for id in &self.tags {
            inner.empty(Tag::new("tag").attr("id", id));
        }
        let explicit = self.trunk && self.tags.len() == 1;
        let tag = Tag::new("vlan").attr_if(explicit, "trunk", "yes");
        w.element_with(tag, inner);
    }
}

/// One direction of a bandwidth limit, in KiB/s and KiB.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rate {
    pub average: u64,
    pub peak: Option<u64>,
    pub burst: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bandwidth {
    pub inbound: Option<Rate>,
    pub outbound: Option<Rate>,
}

impl Bandwidth {
    fn parse(node: &Element) -> Result<Self> {
        let rate = |name: &str| -> Result<Option<Rate>> {
            let Some(r) = node.child(name) else {
                return Ok(None);
            };
            let average = r.attr_parse::<u64>("average")?.ok_or_else(|| {
                Error::Xml(format!(
                    "Missing mandatory average attribute in <{}>",
                    name
                ))
            })?;
            Ok(Some(Rate {
                average,
                peak: r.attr_parse("peak")?,
                burst: r.attr_parse("burst")?,
            }))
        };
        Ok(Bandwidth { inbound: rate("inbound")?, outbound: rate("outbound")? })
    }

    fn format(&self, w: &mut XmlWriter) {
        let mut inner = w.nested();
        let rates = [("inbound", &self.inbound), ("outbound", &self.outbound)];
        for (name, rate) in rates {
            if let Some(r) = rate {
                inner.empty(
                    Tag::new(name)
                        .attr("average", r.average)
                        .attr_opt("peak", r.peak)
                        .attr_opt("burst", r.burst),
                );
            }
        }
        w.element_if_nonempty(Tag::new("bandwidth"), inner);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterRef {
    pub filter: String,
    pub params: Vec<(String, String)>,
}

/// The host side an interface is connected to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetSource {
    User,
    Ethernet {
        dev: Option<String>,
    },
    /// Shared by the `server`, `client` and `mcast` socket types.
    Socket {
        kind: NetType,
        address: Option<String>,
        port: u16,
    },
    Network {
        name: String,
        portgroup: Option<String>,
        virtport: Option<VirtPortProfile>,
        /// Resolution of the network at start-up; runtime only.
        actual: Option<Box<NetSource>>,
    },
    Bridge {
        brname: String,
    },
    Internal {
        name: String,
    },
    Direct {
        linkdev: String,
        mode: MacvtapMode,
        virtport: Option<VirtPortProfile>,
    },
}

impl NetSource {
    pub fn kind(&self) -> NetType {
        match self {
            NetSource::User => NetType::User,
            NetSource::Ethernet { .. } => NetType::Ethernet,
            NetSource::Socket { kind, .. } => *kind,
            NetSource::Network { .. } => NetType::Network,
            NetSource::Bridge { .. } => NetType::Bridge,
            NetSource::Internal { .. } => NetType::Internal,
            NetSource::Direct { .. } => NetType::Direct,
        }
    }

    fn parse(
        kind: NetType,
        node: &Element,
        ctx: &ParseContext,
    ) -> Result<Self> {
        let source = node.child("source");
        let attr = |name: &str| source.and_then(|s| s.attr(name));
        let virtport = node
            .child("virtualport")
            .map(|v| VirtPortProfile::parse(v, ctx))
            .transpose()?;

        let parsed = match kind {
            NetType::User => NetSource::User,
            NetType::Ethernet => {
                NetSource::Ethernet { dev: attr("dev").map(str::to_owned) }
            }
            NetType::Server | NetType::Client | NetType::Mcast => {
                let address = attr("address").map(str::to_owned);
                if address.is_none() && kind != NetType::Server {
                    return Err(Error::Xml(
                        "No <source> 'address' attribute specified with \
                         socket interface"
                            .to_string(),
                    ));
                }
                let port = attr("port").ok_or_else(|| {
                    Error::Xml(
                        "No <source> 'port' attribute specified with socket \
                         interface"
                            .to_string(),
                    )
                })?;
                let port = port.trim().parse::<u16>().map_err(|_| {
                    Error::Xml(format!(
                        "Cannot parse <source> 'port' attribute with socket \
                         interface: {}",
                        port
                    ))
                })?;
                NetSource::Socket { kind, address, port }
            }
            NetType::Network => {
                let name = attr("network").ok_or_else(|| {
                    Error::Xml(
                        "No <source> 'network' attribute specified with \
                         <interface type='network'/>"
                            .to_string(),
                    )
                })?;
                let actual = match node.child("actual") {
                    Some(a) if ctx.has(XmlFlags::INTERNAL_ACTUAL_NET) => {
                        Some(Box::new(Self::parse_actual(a, ctx)?))
                    }
                    _ => None,
                };
                NetSource::Network {
                    name: name.to_owned(),
                    portgroup: attr("portgroup").map(str::to_owned),
                    virtport,
                    actual,
                }
            }
            NetType::Bridge => {
                let brname = attr("bridge").ok_or_else(|| {
                    Error::Xml(
                        "No <source> 'bridge' attribute specified with \
                         <interface type='bridge'/>"
                            .to_string(),
                    )
                })?;
                NetSource::Bridge { brname: brname.to_owned() }
            }
            NetType::Internal => {
                let name = attr("name").ok_or_else(|| {
                    Error::Xml(
                        "No <source> 'name' attribute specified with \
                         <interface type='internal'/>"
                            .to_string(),
                    )
                })?;
                NetSource::Internal { name: name.to_owned() }
            }
            NetType::Direct => {
                let linkdev = attr("dev").ok_or_else(|| {
                    Error::Xml(
                        "No <source> 'dev' attribute specified with \
                         <interface type='direct'/>"
                            .to_string(),
                    )
                })?;
                let mode = match attr("mode") {
                    Some(m) => parse_enum(m)?,
                    None => MacvtapMode::default(),
                };
                NetSource::Direct {
                    linkdev: linkdev.to_owned(),
                    mode,
                    virtport,
                }
            }
        };
        Ok(parsed)
    }

    /// `<actual>` may only resolve to a bridge or a direct connection.
    fn parse_actual(node: &Element, ctx: &ParseContext) -> Result<Self> {
        let kind: NetType = match node.attr("type") {
            Some(t) => parse_enum(t)?,
            None => {
                return Err(Error::Internal(
                    "missing type attribute in interface's <actual> element"
                        .to_string(),
                ))
            }
        };
        if !matches!(kind, NetType::Bridge | NetType::Direct) {
            return Err(Error::Internal(format!(
                "unsupported type '{}' in interface's <actual> element",
                kind
            )));
        }
        Self::parse(kind, node, ctx)
    }

    fn format_source(&self, w: &mut XmlWriter) {
        match self {
            NetSource::User => {}
            NetSource::Ethernet { dev } => {
                if let Some(dev) = dev {
                    w.empty(Tag::new("source").attr("dev", dev));
                }
            }
            NetSource::Socket { address, port, .. } => w.empty(
                Tag::new("source")
                    .attr_opt("address", address.as_deref())
                    .attr("port", port),
            ),
            NetSource::Network { name, portgroup, virtport, .. } => {
                w.empty(
                    Tag::new("source")
                        .attr("network", name)
                        .attr_opt("portgroup", portgroup.as_deref()),
                );
                if let Some(vp) = virtport {
                    vp.format(w);
                }
            }
            NetSource::Bridge { brname } => {
                w.empty(Tag::new("source").attr("bridge", brname));
            }
            NetSource::Internal { name } => {
                w.empty(Tag::new("source").attr("name", name));
            }
            NetSource::Direct { linkdev, mode, virtport } => {
                w.empty(
                    Tag::new("source").attr("dev", linkdev).attr("mode", mode),
                );
                if let Some(vp) = virtport {
                    vp.format(w);
                }
            }
        }
    }
}

/// Tuning of the virtio backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetDriver {
    pub backend: NetBackend,
    pub txmode: NetTxMode,
    pub ioeventfd: TriState,
    pub event_idx: TriState,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetDef {
    pub mac: MacAddr,
    pub model: Option<String>,
    pub source: NetSource,
    pub driver: NetDriver,
    /// Host tap device name.
    pub ifname: Option<String>,
    pub script: Option<String>,
    pub ip: Option<String>,
    pub vlan: Option<Vlan>,
    pub filter: Option<FilterRef>,
    pub tune_sndbuf: Option<u64>,
    pub bandwidth: Option<Bandwidth>,
    pub info: DeviceInfo,
}

impl NetDef {
    pub fn kind(&self) -> NetType {
        self.source.kind()
    }

    pub fn is_virtio(&self) -> bool {
        self.model.as_deref() == Some("virtio")
    }

    pub fn parse(node: &Element, ctx: &ParseContext) -> Result<Self> {
        let kind: NetType = node.attr_enum("type")?.unwrap_or_default();

        let mac = match node.path_attr("mac", "address") {
            Some(m) => {
                let mac = m.parse::<MacAddr>().map_err(|_| {
                    Error::Xml(format!("unable to parse mac address '{}'", m))
                })?;
                if mac.is_multicast() {
                    return Err(Error::Xml(format!(
                        "expected unicast mac address, found multicast '{}'",
                        m
                    )));
                }
                mac
            }
            None => ctx.caps.generate_mac(ctx.env.as_ref()),
        };

        let model = node.path_attr("model", "type").map(str::to_owned);
        if let Some(m) = &model {
            if !m.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(Error::InvalidArg(
                    "Model name contains invalid characters".to_string(),
                ));
            }
        }

        let source = NetSource::parse(kind, node, ctx)?;

        let mut ifname = node.path_attr("target", "dev").map(str::to_owned);
        if ctx.has(XmlFlags::INACTIVE)
            && ifname
                .as_deref()
                .is_some_and(|n| n.starts_with(GENERATED_IFNAME_PREFIX))
        {
            ifname = None;
        }

        let (script, ip) = match kind {
            NetType::Ethernet | NetType::Bridge => (
                node.path_attr("script", "path").map(str::to_owned),
                node.path_attr("ip", "address").map(str::to_owned),
            ),
            _ => (None, None),
        };

        let mut driver = NetDriver::default();
        if model.as_deref() == Some("virtio") {
            if let Some(d) = node.child("driver") {
                driver = NetDriver {
                    backend: d.attr_enum("name")?.unwrap_or_default(),
                    txmode: d.attr_enum("txmode")?.unwrap_or_default(),
                    ioeventfd: d.attr_enum("ioeventfd")?.unwrap_or_default(),
                    event_idx: d.attr_enum("event_idx")?.unwrap_or_default(),
                };
            }
        }

        let vlan = node.child("vlan").map(Vlan::parse).transpose()?;

        let filter = match node.child("filterref") {
            Some(f) => {
                let filter = f.attr("filter").ok_or_else(|| {
                    Error::Xml(
                        "filterref is missing the filter name".to_string(),
                    )
                })?;
                let mut params = Vec::new();
                for p in f.children_named("parameter") {
                    match (p.attr("name"), p.attr("value")) {
                        (Some(n), Some(v)) => {
                            params.push((n.to_owned(), v.to_owned()))
                        }
                        _ => {
                            return Err(Error::Xml(
                                "filterref parameter needs a name and a value"
                                    .to_string(),
                            ))
                        }
                    }
                }
                Some(FilterRef { filter: filter.to_owned(), params })
            }
            None => None,
        };

        let tune_sndbuf = match node.path("tune/sndbuf") {
            Some(s) => Some(s.text_parse::<u64>()?),
            None => None,
        };

        let bandwidth =
            node.child("bandwidth").map(Bandwidth::parse).transpose()?;

        let info = DeviceInfo::parse(
            node,
            ctx.flags,
            InfoAllow::BOOT | InfoAllow::ROM | InfoAllow::LEGACY_STATE,
        )?;
        if !info.addr.is_none() && !info.addr.is_pci() {
            return Err(Error::ConfigUnsupported(
                "Network interfaces must use 'pci' address type".to_string(),
            ));
        }

        Ok(NetDef {
            mac,
            model,
            source,
            driver,
            ifname,
            script,
            ip,
            vlan,
            filter,
            tune_sndbuf,
            bandwidth,
            info,
        })
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        w.open(Tag::new("interface").attr("type", self.kind()));
        w.empty(Tag::new("mac").attr("address", self.mac));
        self.source.format_source(w);

        if let Some(vlan) = &self.vlan {
            vlan.format(w);
        }

        if let NetSource::Network { actual: Some(actual), .. } = &self.source {
            if flags.contains(XmlFlags::INTERNAL_ACTUAL_NET) {
                let mut inner = w.nested();
                actual.format_source(&mut inner);
                w.element_with(
                    Tag::new("actual").attr("type", actual.kind()),
                    inner,
                );
            }
        }

        if let Some(ip) = &self.ip {
            w.empty(Tag::new("ip").attr("address", ip));
        }
        if let Some(script) = &self.script {
            w.empty(Tag::new("script").attr("path", script));
        }

        if let Some(ifname) = &self.ifname {
            let generated = ifname.starts_with(GENERATED_IFNAME_PREFIX);
            if !(flags.contains(XmlFlags::INACTIVE) && generated) {
                w.empty(Tag::new("target").attr("dev", ifname));
            }
        }

        if let Some(model) = &self.model {
            w.empty(Tag::new("model").attr("type", model));
            if self.is_virtio() {
                let d = &self.driver;
                let tag = Tag::new("driver")
                    .attr_if(
                        d.backend != NetBackend::Default,
                        "name",
                        d.backend,
                    )
                    .attr_if(d.txmode != NetTxMode::Default, "txmode", d.txmode)
                    .attr_if(
                        !d.ioeventfd.is_default(),
                        "ioeventfd",
                        d.ioeventfd,
                    )
                    .attr_if(
                        !d.event_idx.is_default(),
                        "event_idx",
                        d.event_idx,
                    );
                if tag.has_attrs() {
                    w.empty(tag);
                }
            }
        }

        if let Some(f) = &self.filter {
            let mut inner = w.nested();
            for (name, value) in &f.params {
                inner.empty(
                    Tag::new("parameter")
                        .attr("name", name)
                        .attr("value", value),
                );
            }
            let tag = Tag::new("filterref").attr("filter", &f.filter);
            w.element_with(tag, inner);
        }

        if let Some(sndbuf) = self.tune_sndbuf {
            w.open(Tag::new("tune"));
            w.leaf(Tag::new("sndbuf"), sndbuf);
            w.close("tune");
        }

        if let Some(bw) = &self.bandwidth {
            bw.format(w);
        }

        self.info.format(w, flags);
        w.close("interface");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::context::test::test_ctx;
    use crate::error::ErrorKind;
    use crate::xml::parse_document;

    fn parse_with(xml: &str, flags: XmlFlags) -> Result<NetDef> {
        NetDef::parse(&parse_document(xml)?, &test_ctx().with_flags(flags))
    }

    fn parse(xml: &str) -> Result<NetDef> {
        parse_with(xml, XmlFlags::INACTIVE)
    }

    fn format(net: &NetDef, flags: XmlFlags) -> String {
        let mut w = XmlWriter::new();
        net.format(&mut w, flags).unwrap();
        w.into_string()
    }

    #[test]
    fn bridge_interface() {
        let xml = "<interface type='bridge'><mac address='52:54:00:11:22:33'/>\
            <source bridge='br0'/><script path='/etc/qemu-ifup'/>\
            <target dev='tap7'/><model type='virtio'/>\
            <driver name='vhost' txmode='iothread'/></interface>";
        let n = parse(xml).unwrap();
        assert_eq!(n.kind(), NetType::Bridge);
        assert_eq!(n.driver.backend, NetBackend::Vhost);
        assert_eq!(
            format(&n, XmlFlags::INACTIVE),
            "<interface type='bridge'>\n  \
             <mac address='52:54:00:11:22:33'/>\n  <source bridge='br0'/>\n  \
             <script path='/etc/qemu-ifup'/>\n  <target dev='tap7'/>\n  \
             <model type='virtio'/>\n  \
             <driver name='vhost' txmode='iothread'/>\n</interface>\n"
        );
    }

    #[test]
    fn generated_mac_and_ifname() {
        let n = parse_with(
            "<interface type='network'><source network='default'/>\
             <target dev='vnet3'/></interface>",
            XmlFlags::empty(),
        )
        .unwrap();
        assert_eq!(n.mac.bytes()[..3], [0x52, 0x54, 0x00]);
        assert_eq!(n.ifname.as_deref(), Some("vnet3"));
        assert!(
            format(&n, XmlFlags::empty()).contains("<target dev='vnet3'/>")
        );
        assert!(!format(&n, XmlFlags::INACTIVE).contains("<target"));

        let inactive = parse(
            "<interface type='network'><source network='default'/>\
             <target dev='vnet3'/></interface>",
        )
        .unwrap();
        assert!(inactive.ifname.is_none());
    }

    #[test]
    fn rejected_inputs() {
        let cases: &[(&str, ErrorKind)] = &[
            (
                "<interface type='user'><mac address='01:00:5e:00:00:01'/>\
                 </interface>",
                ErrorKind::XmlError,
            ),
            (
                "<interface type='user'><mac address='zz'/></interface>",
                ErrorKind::XmlError,
            ),
            (
                "<interface type='user'><model type='e1000;rm'/></interface>",
                ErrorKind::InvalidArg,
            ),
            ("<interface type='bridge'/>", ErrorKind::XmlError),
            ("<interface type='network'/>", ErrorKind::XmlError),
            ("<interface type='direct'/>", ErrorKind::XmlError),
            (
                "<interface type='client'><source port='5558'/></interface>",
                ErrorKind::XmlError,
            ),
            (
                "<interface type='user'><address type='drive'/></interface>",
                ErrorKind::ConfigUnsupported,
            ),
            ("<interface type='token-ring'/>", ErrorKind::ConfigUnsupported),
        ];
        for (xml, kind) in cases {
            assert_eq!(parse(xml).unwrap_err().kind(), *kind, "{}", xml);
        }
    }

    #[test]
    fn direct_with_profile_and_vlan() {
        let xml = "<interface type='direct'><mac address='52:54:00:aa:bb:cc'/>\
            <source dev='eth0' mode='private'/><virtualport type='802.1Qbg'>\
            <parameters managerid='11' typeid='1193047' typeidversion='2'/>\
            </virtualport><vlan><tag id='42'/></vlan></interface>";
        let n = parse(xml).unwrap();
        match &n.source {
            NetSource::Direct {
                mode,
                virtport: Some(VirtPortProfile::Qbg { type_id, .. }),
                ..
            } => {
                assert_eq!(*mode, MacvtapMode::Private);
                assert_eq!(*type_id, 1193047);
            }
            other => panic!("unexpected source {:?}", other),
        }
        assert_eq!(n.vlan, Some(Vlan { tags: vec![42], trunk: false }));

        let text = format(&n, XmlFlags::INACTIVE);
        assert!(text.contains(
            "<parameters managerid='11' typeid='1193047' typeidversion='2' \
             instanceid='"
        ));
        assert_eq!(parse(&text).unwrap(), n);

        for xml in [
            "<interface type='direct'><source dev='eth0'/>\
             <vlan><tag id='4096'/></vlan></interface>",
            "<interface type='direct'><source dev='eth0'/>\
             <vlan trunk='no'><tag id='1'/><tag id='2'/></vlan></interface>",
            "<interface type='direct'><source dev='eth0'/>\
             <virtualport type='802.1Qbh'/></interface>",
        ] {
            assert!(parse(xml).is_err(), "{}", xml);
        }
    }

    #[test]
    fn actual_only_with_internal_flag() {
        let xml = "<interface type='network'><mac address='52:54:00:aa:bb:cc'/>\
            <source network='lan'/><actual type='bridge'>\
            <source bridge='virbr0'/></actual></interface>";
        let plain = parse_with(xml, XmlFlags::empty()).unwrap();
        assert!(matches!(
            plain.source,
            NetSource::Network { actual: None, .. }
        ));

        let internal = parse_with(xml, XmlFlags::INTERNAL_ACTUAL_NET).unwrap();
        let text = format(&internal, XmlFlags::INTERNAL_ACTUAL_NET);
        assert!(text.contains(
            "<actual type='bridge'>\n    <source bridge='virbr0'/>\n  \
             </actual>"
        ));
        assert!(!format(&internal, XmlFlags::INACTIVE).contains("actual"));
    }

    #[test]
    fn filter_tune_bandwidth() {
        let xml = "<interface type='user'><mac address='52:54:00:aa:bb:cc'/>\
            <filterref filter='clean-traffic'>\
            <parameter name='IP' value='10.0.0.1'/></filterref><tune>\
            <sndbuf>1600</sndbuf></tune><bandwidth>\
            <inbound average='1000' peak='5000'/><outbound average='128'/>\
            </bandwidth><boot order='1'/></interface>";
        let n = parse(xml).unwrap();
        assert_eq!(n.tune_sndbuf, Some(1600));
        assert_eq!(n.info.boot_index, Some(1));
        let text = format(&n, XmlFlags::INACTIVE);
        assert!(text.contains(
            "<filterref filter='clean-traffic'>\n    \
             <parameter name='IP' value='10.0.0.1'/>\n  </filterref>"
        ));

        assert!(text.contains("<tune>\n    <sndbuf>1600</sndbuf>\n  </tune>"));
        assert!(text.contains("<inbound average='1000' peak='5000'/>"));
        assert_eq!(parse(&text).unwrap(), n);
    }
}
