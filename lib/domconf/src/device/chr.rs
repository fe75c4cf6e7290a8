// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serial ports, parallel ports, consoles and channels.
//!
//! All four share the same host-side [`ChrSource`]; they differ in how the
//! guest-side `<target>` is interpreted.

use std::net::Ipv4Addr;

use crate::address::{DeviceInfo, InfoAllow};
use crate::context::XmlFlags;
use crate::enums::{
    parse_enum, ChannelTargetType, ChrDeviceType, ChrTcpProtocol, ChrType,
    ConsoleTargetType, SpicevmcName,
};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

/// Name given to a spice agent channel that does not set one.
pub const DEFAULT_SPICE_CHANNEL_NAME: &str = "com.redhat.spice.0";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChrSource {
    Null,
    Vc,
    /// The path is allocated by the host when the domain starts.
    Pty {
        path: Option<String>,
    },
    Dev {
        path: String,
    },
    File {
        path: String,
    },
    Pipe {
        path: String,
    },
    Stdio,
    Udp {
        bind_host: Option<String>,
        bind_service: Option<String>,
        connect_host: Option<String>,
        connect_service: String,
    },
    Tcp {
        host: String,
        service: String,
        listen: bool,
        protocol: ChrTcpProtocol,
    },
    Unix {
        path: String,
        listen: bool,
    },
    Spicevmc(SpicevmcName),
}

impl ChrSource {
    pub fn kind(&self) -> ChrType {
        match self {
            ChrSource::Null => ChrType::Null,
            ChrSource::Vc => ChrType::Vc,
            ChrSource::Pty { .. } => ChrType::Pty,
            ChrSource::Dev { .. } => ChrType::Dev,
            ChrSource::File { .. } => ChrType::File,
            ChrSource::Pipe { .. } => ChrType::Pipe,
            ChrSource::Stdio => ChrType::Stdio,
            ChrSource::Udp { .. } => ChrType::Udp,
            ChrSource::Tcp { .. } => ChrType::Tcp,
            ChrSource::Unix { .. } => ChrType::Unix,
            ChrSource::Spicevmc(_) => ChrType::Spicevmc,
        }
    }

    /// Reads the `<source>` and `<protocol>` children of `node` for a
    /// device of source type `kind`.
    pub fn parse(kind: ChrType, node: &Element) -> Result<Self> {
        let mut path: Option<&str> = None;
        let mut bind: Option<&Element> = None;
        let mut connect: Option<&Element> = None;
        let mut listen = false;

        for source in node.children_named("source") {
            let bind_mode = match source.attr("mode") {
                None | Some("connect") => false,
                Some("bind") => true,
                Some(other) => {
                    return Err(Error::Xml(format!(
                        "Unknown source mode '{}'",
                        other
                    )))
                }
            };
            match kind {
                ChrType::Pty
                | ChrType::Dev
                | ChrType::File
                | ChrType::Pipe
                | ChrType::Unix => {
                    if path.is_none() {
                        path = source.attr("path");
                        listen = bind_mode;
                    }
                }
                ChrType::Udp | ChrType::Tcp => {
                    if bind_mode && bind.is_none() {
                        bind = Some(source);
                    } else if !bind_mode && connect.is_none() {
                        connect = Some(source);
                    }
                }
                _ => {}
            }
        }

        let missing_path = || {
            Error::Xml(
                "Missing source path attribute for char device".to_string(),
            )
        };

        let src = match kind {
            ChrType::Null => ChrSource::Null,
            ChrType::Vc => ChrSource::Vc,
            ChrType::Stdio => ChrSource::Stdio,
            ChrType::Pty => ChrSource::Pty { path: path.map(str::to_owned) },
            ChrType::Dev => ChrSource::Dev {
                path: path.ok_or_else(missing_path)?.to_owned(),
            },
            ChrType::File => ChrSource::File {
                path: path.ok_or_else(missing_path)?.to_owned(),
            },
            ChrType::Pipe => ChrSource::Pipe {
                path: path.ok_or_else(missing_path)?.to_owned(),
            },
            ChrType::Unix => ChrSource::Unix {
                path: path.ok_or_else(missing_path)?.to_owned(),
                listen,
            },
            ChrType::Tcp => {
                let (endpoint, listen) = match (bind, connect) {
                    (Some(b), _) => (b, true),
                    (None, Some(c)) => (c, false),
                    (None, None) => {
                        return Err(Error::Xml(
                            "Missing source host attribute for char device"
                                .to_string(),
                        ))
                    }
                };
                let host = endpoint.attr("host").ok_or_else(|| {
                    Error::Xml(
                        "Missing source host attribute for char device"
                            .to_string(),
                    )
                })?;
                let service = endpoint.attr("service").ok_or_else(|| {
                    Error::Xml(
                        "Missing source service attribute for char device"
                            .to_string(),
                    )
                })?;
                let protocol = match node.path_attr("protocol", "type") {
                    Some(p) => parse_enum(p)?,
                    None => ChrTcpProtocol::default(),
                };
                ChrSource::Tcp {
                    host: host.to_owned(),
                    service: service.to_owned(),
                    listen,
                    protocol,
                }
            }
            ChrType::Udp => {
                let connect_service = connect
                    .and_then(|c| c.attr("service"))
                    .ok_or_else(|| {
                        Error::Xml(
                            "Missing source service attribute for char device"
                                .to_string(),
                        )
                    })?;
                ChrSource::Udp {
                    bind_host: bind
                        .and_then(|b| b.attr("host"))
                        .map(str::to_owned),
                    bind_service: bind
                        .and_then(|b| b.attr("service"))
                        .map(str::to_owned),
                    connect_host: connect
                        .and_then(|c| c.attr("host"))
                        .map(str::to_owned),
                    connect_service: connect_service.to_owned(),
                }
            }
            ChrType::Spicevmc => ChrSource::Spicevmc(SpicevmcName::Vdagent),
        };
        Ok(src)
    }

    /// Writes the `<source>` (and `<protocol>`) children.
    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) {
        let mode = |listen: bool| if listen { "bind" } else { "connect" };
        match self {
            ChrSource::Null
            | ChrSource::Vc
            | ChrSource::Stdio
            | ChrSource::Spicevmc(_) => {}
            ChrSource::Pty { path } => {
                if let Some(path) = path {
                    if !flags.contains(XmlFlags::INACTIVE) {
                        w.empty(Tag::new("source").attr("path", path));
                    }
                }
            }
            ChrSource::Dev { path }
            | ChrSource::File { path }
            | ChrSource::Pipe { path } => {
                w.empty(Tag::new("source").attr("path", path));
            }
            ChrSource::Udp {
                bind_host,
                bind_service,
                connect_host,
                connect_service,
            } => {
                if bind_host.is_some() || bind_service.is_some() {
                    w.empty(
                        Tag::new("source")
                            .attr("mode", "bind")
                            .attr_opt("host", bind_host.as_deref())
                            .attr_opt("service", bind_service.as_deref()),
                    );
                }
                w.empty(
                    Tag::new("source")
                        .attr("mode", "connect")
                        .attr_opt("host", connect_host.as_deref())
                        .attr("service", connect_service),
                );
            }
            ChrSource::Tcp { host, service, listen, protocol } => {
                w.empty(
                    Tag::new("source")
                        .attr("mode", mode(*listen))
                        .attr("host", host)
                        .attr("service", service),
                );
                w.empty(Tag::new("protocol").attr("type", protocol));
            }
            ChrSource::Unix { path, listen } => {
                w.empty(
                    Tag::new("source")
                        .attr("mode", mode(*listen))
                        .attr("path", path),
                );
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChrTarget {
    /// Serial and parallel ports; -1 until a port is assigned.
    Port(i32),
    Console {
        kind: ConsoleTargetType,
        port: i32,
    },
    Guestfwd {
        addr: Ipv4Addr,
        port: u16,
    },
    Virtio {
        name: Option<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChrDef {
    pub device_type: ChrDeviceType,
    pub target: ChrTarget,
    pub source: ChrSource,
    pub info: DeviceInfo,
}

impl ChrDef {
    /// The numeric target port for serial, parallel and console devices.
    pub fn port(&self) -> Option<i32> {
        match self.target {
            ChrTarget::Port(p) | ChrTarget::Console { port: p, .. } => Some(p),
            _ => None,
        }
    }

    pub fn set_port(&mut self, port: i32) {
        match &mut self.target {
            ChrTarget::Port(p) | ChrTarget::Console { port: p, .. } => {
                *p = port
            }
            _ => {}
        }
    }

    pub fn is_virtio_channel(&self) -> bool {
        matches!(self.target, ChrTarget::Virtio { .. })
    }

    /// Parses a `<serial>`, `<parallel>`, `<console>` or `<channel>`
    /// element. `console_default` is the target type given to consoles that
    /// do not name one.
    pub fn parse(
        node: &Element,
        flags: XmlFlags,
        console_default: ConsoleTargetType,
    ) -> Result<Self> {
        let device_type: ChrDeviceType = parse_enum(node.name())?;
        let kind: ChrType = node.attr_enum("type")?.unwrap_or_default();
        let source = ChrSource::parse(kind, node)?;

        let target = node.child("target");
        let target = match device_type {
            ChrDeviceType::Serial | ChrDeviceType::Parallel => {
                ChrTarget::Port(parse_port(target)?.unwrap_or(-1))
            }
            ChrDeviceType::Console => {
                let kind = match target.and_then(|t| t.attr("type")) {
                    Some(t) => parse_enum(t)?,
                    None => console_default,
                };
                let port = parse_port(target)?.unwrap_or(0);
                ChrTarget::Console { kind, port }
            }
            ChrDeviceType::Channel => {
                let target = target.ok_or_else(|| {
                    Error::Xml(
                        "character device is missing a target".to_string(),
                    )
                })?;
                let kind: ChannelTargetType = match target.attr("type") {
                    Some(t) => parse_enum(t)?,
                    None => {
                        return Err(Error::Xml(
                            "unknown target type for character device: none"
                                .to_string(),
                        ))
                    }
                };
                match kind {
                    ChannelTargetType::Guestfwd => {
                        let addr = target.attr("address").ok_or_else(|| {
                            Error::Xml(
                                "guestfwd channel does not define a target \
                                 address"
                                    .to_string(),
                            )
                        })?;
                        let addr = addr.parse::<Ipv4Addr>().map_err(|_| {
                            Error::Xml(format!(
                                "guestfwd channel only supports IPv4 \
                                 addresses, not '{}'",
                                addr
                            ))
                        })?;
                        let port = target.attr("port").ok_or_else(|| {
                            Error::Xml(
                                "guestfwd channel does not define a target port"
                                    .to_string(),
                            )
                        })?;
                        let port = port.trim().parse::<u16>().map_err(|_| {
                            Error::Xml(format!("Invalid port number: {}", port))
                        })?;
                        ChrTarget::Guestfwd { addr, port }
                    }
                    ChannelTargetType::Virtio => ChrTarget::Virtio {
                        name: target.attr("name").map(str::to_owned),
                    },
                }
            }
        };

        if matches!(source, ChrSource::Spicevmc(_))
            && !matches!(target, ChrTarget::Virtio { .. })
        {
            return Err(Error::Xml(
                "spicevmc device type only supports virtio".to_string(),
            ));
        }

        let mut def = ChrDef {
            device_type,
            target,
            source,
            info: DeviceInfo::parse(node, flags, InfoAllow::empty())?,
        };

        if let (ChrSource::Spicevmc(_), ChrTarget::Virtio { name }) =
            (&def.source, &mut def.target)
        {
            if name.is_none() {
                *name = Some(DEFAULT_SPICE_CHANNEL_NAME.to_string());
            }
        }

        Ok(def)
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        self.format_as(w, flags, self.device_type, &self.target)
    }

    /// Writes this serial port as the `<console>` that older consumers
    /// expect to find alongside it.
    pub fn format_as_console(
        &self,
        w: &mut XmlWriter,
        flags: XmlFlags,
    ) -> Result<()> {
        let target = ChrTarget::Console {
            kind: ConsoleTargetType::Serial,
            port: self.port().unwrap_or(0),
        };
        let mut console = self.clone();
        console.info = DeviceInfo::default();
        console.format_as(w, flags, ChrDeviceType::Console, &target)
    }

    fn format_as(
        &self,
        w: &mut XmlWriter,
        flags: XmlFlags,
        device_type: ChrDeviceType,
        target: &ChrTarget,
    ) -> Result<()> {
        let name: &str = device_type.into();
        w.open(Tag::new(name).attr("type", self.source.kind()));
        self.source.format(w, flags);

        let tag = match target {
            ChrTarget::Port(port) => {
                Tag::new("target").attr_if(*port >= 0, "port", port)
            }
            ChrTarget::Console { kind, port } => Tag::new("target")
                .attr("type", kind)
                .attr_if(*port >= 0, "port", port),
            ChrTarget::Guestfwd { addr, port } => Tag::new("target")
                .attr("type", ChannelTargetType::Guestfwd)
                .attr("address", addr)
                .attr("port", port),
            ChrTarget::Virtio { name } => Tag::new("target")
                .attr("type", ChannelTargetType::Virtio)
                .attr_opt("name", name.as_deref()),
        };
        w.empty(tag);

        self.info.format(w, flags);
        w.close(name);
        Ok(())
    }
}

fn parse_port(target: Option<&Element>) -> Result<Option<i32>> {
    match target.and_then(|t| t.attr("port")) {
        None => Ok(None),
        Some(p) => match p.trim().parse::<i32>() {
            Ok(n) if n >= 0 => Ok(Some(n)),
            _ => Err(Error::Xml(format!("Invalid port number: {}", p))),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::xml::parse_document;

    fn parse(xml: &str, flags: XmlFlags) -> Result<ChrDef> {
        ChrDef::parse(&parse_document(xml)?, flags, ConsoleTargetType::Serial)
    }

    fn format(chr: &ChrDef, flags: XmlFlags) -> String {
        let mut w = XmlWriter::new();
        chr.format(&mut w, flags).unwrap();
        w.into_string()
    }

    #[test]
    fn pty_path_is_runtime_only() {
        let s = parse(
            "<serial type='pty'><source path='/dev/pts/4'/><target port='0'/>\
             </serial>",
            XmlFlags::empty(),
        )
        .unwrap();
        assert_eq!(s.port(), Some(0));
        assert_eq!(
            format(&s, XmlFlags::empty()),
            "<serial type='pty'>\n  <source path='/dev/pts/4'/>\n  \
             <target port='0'/>\n</serial>\n"
        );
        assert_eq!(
            format(&s, XmlFlags::INACTIVE),
            "<serial type='pty'>\n  <target port='0'/>\n</serial>\n"
        );

        let mut w = XmlWriter::new();
        s.format_as_console(&mut w, XmlFlags::INACTIVE).unwrap();
        assert_eq!(
            w.as_str(),
            "<console type='pty'>\n  \
             <target type='serial' port='0'/>\n</console>\n"
        );
    }

    #[test]
    fn unassigned_port() {
        let p = parse(
            "<parallel type='file'><source path='/tmp/lp'/></parallel>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert_eq!(p.port(), Some(-1));
        assert!(parse("<parallel type='file'/>", XmlFlags::INACTIVE).is_err());
        assert!(parse(
            "<serial type='pty'><target port='-2'/></serial>",
            XmlFlags::INACTIVE
        )
        .is_err());
    }

    #[test]
    fn network_sources() {
        let tcp = parse(
            "<serial type='tcp'><source mode='bind' host='127.0.0.1' \
             service='9999'/><protocol type='telnet'/><target port='1'/>\
             </serial>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert_eq!(
            tcp.source,
            ChrSource::Tcp {
                host: "127.0.0.1".to_string(),
                service: "9999".to_string(),
                listen: true,
                protocol: ChrTcpProtocol::Telnet,
            }
        );
        let text = format(&tcp, XmlFlags::INACTIVE);
        assert_eq!(parse(&text, XmlFlags::INACTIVE).unwrap(), tcp);

        let udp = parse(
            "<serial type='udp'><source mode='bind' service='9998'/>\
             <source mode='connect' host='0.0.0.0' service='9999'/>\
             <target port='0'/></serial>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert_eq!(
            format(&udp, XmlFlags::INACTIVE),
            "<serial type='udp'>\n  <source mode='bind' service='9998'/>\n  \
             <source mode='connect' host='0.0.0.0' service='9999'/>\n  \
             <target port='0'/>\n</serial>\n"
        );

        let unix = parse(
            "<channel type='unix'><source mode='bind' path='/tmp/guestfwd'/>\
             <target type='guestfwd' address='10.0.2.1' port='4600'/>\
             </channel>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert_eq!(
            unix.target,
            ChrTarget::Guestfwd { addr: Ipv4Addr::new(10, 0, 2, 1), port: 4600 }
        );
        assert!(parse(
            "<serial type='tcp'><source mode='connect' host='h'/></serial>",
            XmlFlags::INACTIVE
        )
        .is_err());
    }

    #[test]
    fn channel_targets() {
        let rejects = [
            "<channel type='pty'><target type='guestfwd' address='::1' \
             port='1'/></channel>",
            "<channel type='pty'><target type='guestfwd' address='10.0.0.1'/>\
             </channel>",
            "<channel type='pty'><target/></channel>",
            "<channel type='pty'/>",
            "<serial type='spicevmc'/>",
            "<channel type='spicevmc'>\
             <target type='guestfwd' address='10.0.0.1' port='1'/></channel>",
        ];
        for xml in rejects {
            assert!(parse(xml, XmlFlags::INACTIVE).is_err(), "{}", xml);
        }

        let agent = parse(
            "<channel type='spicevmc'><target type='virtio'/></channel>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert_eq!(
            agent.target,
            ChrTarget::Virtio {
                name: Some(DEFAULT_SPICE_CHANNEL_NAME.to_string())
            }
        );
        assert_eq!(
            format(&agent, XmlFlags::INACTIVE),
            "<channel type='spicevmc'>\n  \
             <target type='virtio' name='com.redhat.spice.0'/>\n</channel>\n"
        );
    }

    #[test]
    fn console_target_defaults() {
        let c = ChrDef::parse(
            &parse_document("<console type='pty'/>").unwrap(),
            XmlFlags::INACTIVE,
            ConsoleTargetType::Xen,
        )
        .unwrap();
        assert_eq!(
            c.target,
            ChrTarget::Console { kind: ConsoleTargetType::Xen, port: 0 }
        );

    }
}
