// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local and remote framebuffers.
//!
//! Remote protocols (VNC, RDP, SPICE) bind to one or more [`GraphicsListen`]
//! points. The legacy `listen` attribute on `<graphics>` is kept in sync
//! with the first address-typed listen: on input it either creates that
//! listen or must agree with it, and on output it is derived from it.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use strum::IntoEnumIterator;

use crate::context::XmlFlags;
use crate::enums::{
    parse_enum, GraphicsType, ListenType, SpiceChannelMode, SpiceChannelName,
    SpiceClipboardCopyPaste, SpiceImageCompression, SpiceStreamingMode,
    SpiceWanCompression, TriState,
};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

const VALID_TO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphicsListen {
    pub kind: ListenType,
    pub address: Option<String>,
    pub network: Option<String>,
}

impl GraphicsListen {
    pub fn address(addr: &str) -> Self {
        Self {
            kind: ListenType::Address,
            address: Some(addr.to_owned()),
            network: None,
        }
    }

    fn parse(node: &Element, flags: XmlFlags) -> Result<Self> {
        let kind: ListenType = match node.attr("type") {
            Some(t) => parse_enum(t)?,
            None => {
                return Err(Error::Xml(
                    "graphics listen type must be specified".to_string(),
                ))
            }
        };

        let mut listen = GraphicsListen { kind, ..Default::default() };
        match kind {
            ListenType::None => {}
            ListenType::Address => {
                listen.address = node.attr("address").map(str::to_owned);
            }
            ListenType::Network => {
                listen.network =
                    Some(node.attr("network").map(str::to_owned).ok_or_else(
                        || {
                            Error::Xml(
                                "network attribute is required for listen type \
                                 'network'"
                                    .to_string(),
                            )
                        },
                    )?);
                // The resolved address of a network listen is runtime state.
                if !flags.contains(XmlFlags::INACTIVE) {
                    listen.address = node.attr("address").map(str::to_owned);
                }
            }
        }
        Ok(listen)
    }

    fn format(&self, w: &mut XmlWriter, flags: XmlFlags) {
        let show_address = self.kind == ListenType::Address
            || !flags.contains(XmlFlags::INACTIVE);
        w.empty(
            Tag::new("listen")
                .attr("type", self.kind)
                .attr_opt(
                    "address",
                    self.address.as_deref().filter(|_| show_address),
                )

                .attr_opt("network", self.network.as_deref()),
        );
    }
}

/// Access password of a remote display.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GraphicsAuth {
    pub passwd: Option<String>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl GraphicsAuth {
    fn parse(node: &Element) -> Result<Self> {
        let Some(passwd) = node.attr("passwd") else {
            return Ok(Self::default());
        };
        let valid_to = match node.attr("passwdValidTo") {
            None => None,
            Some(s) => {
                let naive = NaiveDateTime::parse_from_str(s, VALID_TO_FORMAT)
                    .map_err(|_| {
                        Error::Xml(format!(
                            "cannot parse password validity time '{}', expect \
                             YYYY-MM-DDTHH:MM:SS",
                            s
                        ))
                    })?;
                Some(Utc.from_utc_datetime(&naive))
            }
        };
        Ok(Self { passwd: Some(passwd.to_owned()), valid_to })
    }

    fn format(&self, tag: Tag, flags: XmlFlags) -> Tag {
        if self.passwd.is_none() {
            return tag;
        }
        tag.attr_opt(
            "passwd",
            self.passwd.as_deref().filter(|_| flags.contains(XmlFlags::SECURE)),
        )
        .attr_opt(
            "passwdValidTo",
            self.valid_to.map(|t| t.format(VALID_TO_FORMAT)),
        )
    }
}

/// SPICE per-channel security and compression tuning.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpiceOptions {
    /// Indexed by [`SpiceChannelName`].
    pub channels: [SpiceChannelMode; SpiceChannelName::COUNT],
    pub image: SpiceImageCompression,
    pub jpeg: SpiceWanCompression,
    pub zlib: SpiceWanCompression,
    pub playback: TriState,
    pub streaming: SpiceStreamingMode,
    pub copypaste: SpiceClipboardCopyPaste,
}

impl SpiceOptions {
    pub fn channel_mode(&self, name: SpiceChannelName) -> SpiceChannelMode {
        self.channels[name as usize]
    }

    fn parse(node: &Element) -> Result<Self> {
        let mut opts = SpiceOptions::default();
        for child in node.elements() {
            match child.name() {
                "channel" => {
                    let name: SpiceChannelName = match child.attr("name") {
                        Some(n) => parse_enum(n)?,
                        None => {
                            return Err(Error::Xml(
                                "spice channel missing name/mode".to_string(),
                            ))
                        }
                    };
                    let mode: SpiceChannelMode = match child.attr("mode") {
                        Some(m) => parse_enum(m)?,
                        None => {
                            return Err(Error::Xml(
                                "spice channel missing name/mode".to_string(),
                            ))
                        }
                    };
                    opts.channels[name as usize] = mode;
                }
                "image" => {
                    opts.image = required_value(child, "compression")?;
                }
                "jpeg" => {
                    opts.jpeg = required_value(child, "compression")?;
                }
                "zlib" => {
                    opts.zlib = required_value(child, "compression")?;
                }
                "playback" => {
                    opts.playback = required_value(child, "compression")?;
                }
                "streaming" => {
                    opts.streaming = required_value(child, "mode")?;
                }
                "clipboard" => {
                    opts.copypaste = required_value(child, "copypaste")?;
                }
                _ => {}
            }
        }
        Ok(opts)
    }

    fn format(&self, w: &mut XmlWriter) {
        for name in SpiceChannelName::iter() {
            let mode = self.channel_mode(name);
            if mode != SpiceChannelMode::Any {
                w.empty(
                    Tag::new("channel").attr("name", name).attr("mode", mode),
                );
            }
        }
        if self.image != SpiceImageCompression::Default {
            w.empty(Tag::new("image").attr("compression", self.image));
        }
        if self.jpeg != SpiceWanCompression::Default {
            w.empty(Tag::new("jpeg").attr("compression", self.jpeg));
        }
        if self.zlib != SpiceWanCompression::Default {
            w.empty(Tag::new("zlib").attr("compression", self.zlib));
        }
        if !self.playback.is_default() {
            w.empty(Tag::new("playback").attr("compression", self.playback));
        }
        if self.streaming != SpiceStreamingMode::Default {
            w.empty(Tag::new("streaming").attr("mode", self.streaming));
        }
        if self.copypaste != SpiceClipboardCopyPaste::Default {
            w.empty(Tag::new("clipboard").attr("copypaste", self.copypaste));
        }
    }
}

fn required_value<T: crate::enums::VirEnum>(
    node: &Element,
    key: &str,
) -> Result<T> {
    match node.attr_enum::<T>(key)? {
        Some(v) => Ok(v),
        None => Err(Error::Xml(format!(
            "spice {} missing {}",
            node.name(),
            key
        ))),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphicsData {
    Sdl {
        display: Option<String>,
        xauth: Option<String>,
        fullscreen: bool,
    },
    Vnc {
        port: i32,
        autoport: bool,
        keymap: Option<String>,
        socket: Option<String>,
        auth: GraphicsAuth,
    },
    Rdp {
        port: i32,
        autoport: bool,
        replace_user: bool,
        multi_user: bool,
    },
    Desktop {
        display: Option<String>,
        fullscreen: bool,
    },
    Spice {
        port: i32,
        tls_port: i32,
        autoport: bool,
        keymap: Option<String>,
        auth: GraphicsAuth,
        options: SpiceOptions,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphicsDef {
    pub data: GraphicsData,
    /// Always empty for local displays.
    pub listens: Vec<GraphicsListen>,
}

fn parse_port(node: &Element, key: &str) -> Result<Option<i32>> {
    node.attr_parse::<i32>(key).map_err(|_| {
        Error::Xml(format!(
            "cannot parse {} {}",
            key,
            node.attr(key).unwrap_or_default()
        ))
    })
}

impl GraphicsDef {
    pub fn kind(&self) -> GraphicsType {
        match self.data {
            GraphicsData::Sdl { .. } => GraphicsType::Sdl,
            GraphicsData::Vnc { .. } => GraphicsType::Vnc,
            GraphicsData::Rdp { .. } => GraphicsType::Rdp,
            GraphicsData::Desktop { .. } => GraphicsType::Desktop,
            GraphicsData::Spice { .. } => GraphicsType::Spice,
        }
    }

    /// The address of the first address-typed listen, which doubles as the
    /// `listen` attribute.
    pub fn listen_address(&self) -> Option<&str> {
        self.listens
            .iter()
            .find(|l| l.kind == ListenType::Address)
            .and_then(|l| l.address.as_deref())
    }

    pub fn parse(node: &Element, flags: XmlFlags) -> Result<Self> {
        let kind: GraphicsType = match node.attr("type") {
            Some(t) => parse_enum(t)?,
            None => {
                return Err(Error::Xml(
                    "missing graphics device type".to_string(),
                ))
            }
        };
        let inactive = flags.contains(XmlFlags::INACTIVE);

        let data = match kind {
            GraphicsType::Sdl => GraphicsData::Sdl {
                display: node.attr("display").map(str::to_owned),
                xauth: node.attr("xauth").map(str::to_owned),
                fullscreen: node.attr("fullscreen") == Some("yes"),
            },
            GraphicsType::Desktop => GraphicsData::Desktop {
                display: node.attr("display").map(str::to_owned),
                fullscreen: node.attr("fullscreen") == Some("yes"),
            },
            GraphicsType::Vnc => {
                let (mut port, mut autoport) = match parse_port(node, "port")? {
                    Some(-1) | None => (0, true),
                    Some(p) => (p, false),
                };
                if node.attr("autoport") == Some("yes") {
                    autoport = true;
                }
                if autoport && inactive {
                    port = 0;
                }
                GraphicsData::Vnc {
                    port,
                    autoport,
                    keymap: node.attr("keymap").map(str::to_owned),
                    socket: node.attr("socket").map(str::to_owned),
                    auth: GraphicsAuth::parse(node)?,
                }
            }
            GraphicsType::Rdp => {
                let (mut port, mut autoport) = match parse_port(node, "port")? {
                    Some(-1) => (0, true),
                    Some(p) => (p, false),
                    None => (0, false),
                };
                if node.attr("autoport") == Some("yes") {
                    autoport = true;
                }
                if autoport && inactive {
                    port = 0;
                }
                GraphicsData::Rdp {
                    port,
                    autoport,
                    replace_user: node.attr("replaceUser") == Some("yes"),
                    multi_user: node.attr("multiUser") == Some("yes"),
                }
            }
            GraphicsType::Spice => {
                let mut port = parse_port(node, "port")?.unwrap_or(0);
                let mut tls_port = parse_port(node, "tlsPort")?.unwrap_or(0);
                let autoport = node.attr("autoport") == Some("yes");
                if autoport && inactive {
                    port = 0;
                    tls_port = 0;
                }
                GraphicsData::Spice {
                    port,
                    tls_port,
                    autoport,
                    keymap: node.attr("keymap").map(str::to_owned),
                    auth: GraphicsAuth::parse(node)?,
                    options: SpiceOptions::parse(node)?,
                }
            }
        };

        let listens = match kind {
            GraphicsType::Vnc | GraphicsType::Rdp | GraphicsType::Spice => {
                Self::parse_listens(node, flags)?
            }
            GraphicsType::Sdl | GraphicsType::Desktop => Vec::new(),
        };

        Ok(GraphicsDef { data, listens })
    }

    fn parse_listens(
        node: &Element,
        flags: XmlFlags,
    ) -> Result<Vec<GraphicsListen>> {
        let mut listens = node
            .children_named("listen")
            .map(|l| GraphicsListen::parse(l, flags))
            .collect::<Result<Vec<_>>>()?;

        let Some(listen_attr) = node.attr("listen") else {
            return Ok(listens);
        };

        let no_listens = listens.is_empty();
        match listens.iter_mut().find(|l| l.kind == ListenType::Address) {
            None if no_listens => {
                listens.push(GraphicsListen::address(listen_attr));
            }
            None => {
                return Err(Error::Xml(format!(
                    "graphics listen attribute {} must match address \
                     attribute of first listen element (found none)",
                    listen_attr
                )));
            }
            Some(first) => match first.address.as_deref() {
                None => first.address = Some(listen_attr.to_owned()),
                Some(found) if found == listen_attr => {}
                Some(found) => {
                    return Err(Error::Xml(format!(
                        "graphics listen attribute {} must match address \
                         attribute of first listen element (found {})",
                        listen_attr, found
                    )));
                }
            },
        }
        Ok(listens)
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        let inactive = flags.contains(XmlFlags::INACTIVE);
        let mut tag = Tag::new("graphics").attr("type", self.kind());
        let mut inner = w.nested();

        match &self.data {
            GraphicsData::Sdl { display, xauth, fullscreen } => {
                tag = tag
                    .attr_opt("display", display.as_deref())
                    .attr_opt("xauth", xauth.as_deref())
                    .attr_if(*fullscreen, "fullscreen", "yes");
            }
            GraphicsData::Desktop { display, fullscreen } => {
                tag = tag
                    .attr_opt("display", display.as_deref())
                    .attr_if(*fullscreen, "fullscreen", "yes");
            }
            GraphicsData::Vnc { port, autoport, keymap, socket, auth } => {
                if let Some(socket) = socket {
                    tag = tag.attr("socket", socket);
                } else {
                    tag = tag
                        .attr_if(
                            *port != 0 && (!*autoport || !inactive),
                            "port",
                            port,
                        )
                        .attr_if(*autoport, "autoport", "yes")
                        .attr_opt("listen", self.listen_address());
                }
                tag = tag.attr_opt("keymap", keymap.as_deref());
                tag = auth.format(tag, flags);
            }
            GraphicsData::Rdp { port, autoport, replace_user, multi_user } => {
                tag = tag
                    .attr_if(
                        *port != 0 && (!*autoport || !inactive),
                        "port",
                        port,
                    )
                    .attr_if(*autoport, "autoport", "yes")
                    .attr_if(*replace_user, "replaceUser", "yes")
                    .attr_if(*multi_user, "multiUser", "yes")
                    .attr_opt("listen", self.listen_address());
            }
            GraphicsData::Spice {
                port,
                tls_port,
                autoport,
                keymap,
                auth,
                options,
            } => {
                let show_ports = !*autoport || !inactive;
                tag = tag
                    .attr_if(*port > 0 && show_ports, "port", port)
                    .attr_if(*tls_port > 0 && show_ports, "tlsPort", tls_port)
                    .attr_if(*autoport, "autoport", "yes")
                    .attr_opt("listen", self.listen_address())
                    .attr_opt("keymap", keymap.as_deref());
                tag = auth.format(tag, flags);
                for l in &self.listens {
                    l.format(&mut inner, flags);
                }
                options.format(&mut inner);
            }
        }

        if !matches!(self.data, GraphicsData::Spice { .. }) {
            for l in &self.listens {
                l.format(&mut inner, flags);
            }
        }

        w.element_with(tag, inner);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::xml::parse_document;

    fn parse(xml: &str, flags: XmlFlags) -> Result<GraphicsDef> {
        GraphicsDef::parse(&parse_document(xml)?, flags)
    }

    fn format(g: &GraphicsDef, flags: XmlFlags) -> String {
        let mut w = XmlWriter::new();
        g.format(&mut w, flags).unwrap();
        w.into_string()
    }

    #[test]
    fn vnc_autoport_and_listen() {
        let g = parse(
            "<graphics type='vnc' port='-1' listen='127.0.0.1' \
             keymap='en-us'/>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert_eq!(g.listens, vec![GraphicsListen::address("127.0.0.1")]);
        assert!(matches!(
            g.data,
            GraphicsData::Vnc { port: 0, autoport: true, .. }
        ));
        let text = format(&g, XmlFlags::INACTIVE);
        assert_eq!(
            text,
            "<graphics type='vnc' autoport='yes' listen='127.0.0.1' \
             keymap='en-us'>\n  \
             <listen type='address' address='127.0.0.1'/>\n</graphics>\n"
        );
        assert_eq!(parse(&text, XmlFlags::INACTIVE).unwrap(), g);

        let running = parse(
            "<graphics type='vnc' port='5901' autoport='yes'/>",
            XmlFlags::empty(),
        )
        .unwrap();
        assert!(format(&running, XmlFlags::empty()).contains("port='5901'"));
        assert!(!format(&running, XmlFlags::INACTIVE).contains("port='5901'"));
    }

    #[test]
    fn listen_attribute_must_match() {
        assert!(parse(
            "<graphics type='vnc' listen='10.0.0.1'>\
             <listen type='address' address='10.0.0.2'/></graphics>",
            XmlFlags::INACTIVE
        )
        .is_err());
        assert!(parse(
            "<graphics type='vnc' listen='10.0.0.1'>\
             <listen type='network' network='default'/></graphics>",
            XmlFlags::INACTIVE
        )
        .is_err());
        let g = parse(
            "<graphics type='vnc' listen='10.0.0.1'><listen type='address'/>\
             </graphics>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert_eq!(g.listen_address(), Some("10.0.0.1"));
    }

    #[test]
    fn network_listen_address_is_runtime_only() {
        let xml = "<graphics type='vnc' autoport='yes'>\
            <listen type='network' network='default' address='192.168.122.1'/>\
            </graphics>";
        let live = parse(xml, XmlFlags::empty()).unwrap();
        assert_eq!(live.listens[0].address.as_deref(), Some("192.168.122.1"));
        assert!(!format(&live, XmlFlags::INACTIVE).contains("192.168.122.1"));
        let inactive = parse(xml, XmlFlags::INACTIVE).unwrap();
        assert_eq!(inactive.listens[0].address, None);
        assert!(parse(
            "<graphics type='vnc'><listen type='network'/></graphics>",
            XmlFlags::INACTIVE
        )
        .is_err());
    }

    #[test]
    fn password_needs_secure_flag() {
        let g = parse(
            "<graphics type='vnc' port='5900' passwd='secret' \
             passwdValidTo='2011-05-31T16:11:22'/>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        match &g.data {
            GraphicsData::Vnc { auth, .. } => {
                assert_eq!(auth.valid_to.unwrap().timestamp(), 1306858282);
            }
            other => panic!("unexpected {:?}", other),
        }
        let public = format(&g, XmlFlags::INACTIVE);
        assert!(!public.contains("secret"));
        assert!(public.contains("passwdValidTo='2011-05-31T16:11:22'"));
        let secure = format(&g, XmlFlags::INACTIVE | XmlFlags::SECURE);
        assert!(secure.contains("port='5900' passwd='secret'"));

        assert!(parse(
            "<graphics type='vnc' passwd='x' passwdValidTo='tomorrow'/>",
            XmlFlags::INACTIVE
        )
        .is_err());
    }

    #[test]
    fn spice_channels_and_compression() {
        let xml = "<graphics type='spice' port='5903' tlsPort='5904' \
            autoport='no' listen='127.0.0.1'>\n  \
            <listen type='address' address='127.0.0.1'/>\n  \
            <channel name='main' mode='secure'/>\n  \
            <channel name='inputs' mode='insecure'/>\n  \
            <image compression='auto_glz'/>\n  <jpeg compression='auto'/>\n  \
            <zlib compression='auto'/>\n  <playback compression='on'/>\n  \
            <streaming mode='filter'/>\n  \
            <clipboard copypaste='no'/>\n</graphics>\n";
        let g = parse(xml, XmlFlags::INACTIVE).unwrap();
        let GraphicsData::Spice { options, .. } = &g.data else {
            panic!("not spice");
        };
        assert_eq!(
            options.channel_mode(SpiceChannelName::Main),
            SpiceChannelMode::Secure
        );
        assert_eq!(
            options.channel_mode(SpiceChannelName::Display),
            SpiceChannelMode::Any
        );
        assert_eq!(options.playback, TriState::On);
        assert_eq!(
            format(&g, XmlFlags::INACTIVE),
            xml.replace(" autoport='no'", "")
        );

        for bad in [
            "<graphics type='spice'><channel name='main'/></graphics>",
            "<graphics type='spice'><channel name='usb' mode='any'/>\
             </graphics>",
            "<graphics type='spice'><image/></graphics>",
            "<graphics type='spice'><streaming mode='sometimes'/></graphics>",
        ] {
            assert!(parse(bad, XmlFlags::INACTIVE).is_err(), "{}", bad);
        }
    }

    #[test]
    fn local_displays() {
        let g = parse(
            "<graphics type='sdl' display=':0.0' xauth='/root/.Xauthority' \
             fullscreen='yes'/>",
            XmlFlags::INACTIVE,
        )
        .unwrap();
        assert!(g.listens.is_empty());
        assert_eq!(
            format(&g, XmlFlags::INACTIVE),
            "<graphics type='sdl' display=':0.0' xauth='/root/.Xauthority' \
             fullscreen='yes'/>\n"
        );
        assert!(parse("<graphics/>", XmlFlags::INACTIVE).is_err());
        assert!(parse("<graphics type='x11'/>", XmlFlags::INACTIVE).is_err());
    }
}
