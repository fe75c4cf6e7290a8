// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::address::{DeviceAddress, DeviceInfo, InfoAllow};
use crate::context::XmlFlags;
use crate::device::chr::ChrSource;
use crate::enums::{parse_enum, ChrType, SmartcardMode, SpicevmcName};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

const SMARTCARD_NUM_CERTIFICATES: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SmartcardBackend {
    Host,
    HostCertificates {
        certificates: [String; SMARTCARD_NUM_CERTIFICATES],
        database: Option<String>,
    },
    Passthrough(ChrSource),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmartcardDef {
    pub backend: SmartcardBackend,
    pub info: DeviceInfo,
}

impl SmartcardDef {
    pub fn mode(&self) -> SmartcardMode {
        match self.backend {
            SmartcardBackend::Host => SmartcardMode::Host,
            SmartcardBackend::HostCertificates { .. } => {
                SmartcardMode::HostCertificates
            }
            SmartcardBackend::Passthrough(_) => SmartcardMode::Passthrough,
        }
    }

    pub fn parse(node: &Element, flags: XmlFlags) -> Result<Self> {
        let mode: SmartcardMode = match node.attr("mode") {
            Some(m) => parse_enum(m)?,
            None => {
                return Err(Error::Xml(
                    "missing smartcard device mode".to_string(),
                ))
            }
        };

        let backend = match mode {
            SmartcardMode::Host => {
                if node
                    .elements()
                    .any(|c| c.name() != "address" && c.name() != "alias")
                {
                    return Err(Error::Xml(
                        "host smartcard mode accepts no additional elements"
                            .to_string(),
                    ));
                }
                SmartcardBackend::Host
            }
            SmartcardMode::HostCertificates => {
                let certs: Vec<String> = node
                    .children_named("certificate")
                    .map(|c| c.text().to_owned())
                    .collect();
                if certs.iter().any(String::is_empty) {
                    return Err(Error::Xml(
                        "host-certificates mode needs non-empty certificate \
                         names"
                            .to_string(),
                    ));
                }
                let certificates: [String; SMARTCARD_NUM_CERTIFICATES] =
                    certs.try_into().map_err(|_| {
                        Error::Xml(
                            "host-certificates mode needs exactly three \
                             certificates"
                                .to_string(),
                        )
                    })?;
                let database = node.path_text("database").map(str::to_owned);
                if let Some(db) = &database {
                    if !db.starts_with('/') {
                        return Err(Error::Xml(format!(
                            "expecting absolute path: {}",
                            db
                        )));
                    }
                }
                SmartcardBackend::HostCertificates { certificates, database }
            }
            SmartcardMode::Passthrough => {
                let kind: ChrType = match node.attr("type") {
                    Some(t) => parse_enum(t)?,
                    None => {
                        return Err(Error::Xml(
                            "passthrough mode requires a character device type \
                             attribute"
                                .to_string(),
                        ))
                    }
                };
                let source = match ChrSource::parse(kind, node)? {
                    ChrSource::Spicevmc(_) => {
                        ChrSource::Spicevmc(SpicevmcName::Smartcard)
                    }
                    other => other,
                };
                SmartcardBackend::Passthrough(source)
            }
        };

        let info = DeviceInfo::parse(node, flags, InfoAllow::empty())?;
        if !matches!(info.addr, DeviceAddress::None | DeviceAddress::Ccid(_)) {
            return Err(Error::ConfigUnsupported(
                "Smartcard devices must use the 'ccid' address type"
                    .to_string(),
            ));
        }

        Ok(SmartcardDef { backend, info })
    }

    pub fn format(&self, w: &mut XmlWriter, flags: XmlFlags) -> Result<()> {
        let mut tag = Tag::new("smartcard").attr("mode", self.mode());
        let mut inner = w.nested();
        match &self.backend {
            SmartcardBackend::Host => {}
            SmartcardBackend::HostCertificates { certificates, database } => {
                for cert in certificates {
                    inner.leaf(Tag::new("certificate"), cert);
                }
                inner.leaf_opt("database", database.as_deref());
            }
            SmartcardBackend::Passthrough(source) => {
                tag = tag.attr("type", source.kind());
                source.format(&mut inner, flags);
            }
        }
        self.info.format(&mut inner, flags);
        w.element_with(tag, inner);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::xml::parse_document;
    use domconf_types::CcidAddress;

    fn parse(xml: &str) -> Result<SmartcardDef> {
        SmartcardDef::parse(&parse_document(xml)?, XmlFlags::INACTIVE)
    }

    fn format(sc: &SmartcardDef) -> String {
        let mut w = XmlWriter::new();
        sc.format(&mut w, XmlFlags::INACTIVE).unwrap();
        w.into_string()
    }

    #[test]
    fn modes() {
        let host = parse(
            "<smartcard mode='host'>\
             <address type='ccid' controller='0' slot='1'/></smartcard>",
        )
        .unwrap();
        assert_eq!(
            host.info.addr,
            DeviceAddress::Ccid(CcidAddress { controller: 0, slot: 1 })
        );
        assert_eq!(
            format(&host),
            "<smartcard mode='host'>\n  <address type='ccid' controller='0' \
             slot='1'/>\n</smartcard>\n"
        );

        let certs = parse(
            "<smartcard mode='host-certificates'><certificate>a</certificate>\
             <certificate>b</certificate><certificate>c</certificate>\
             <database>/etc/pki/nssdb</database></smartcard>",
        )
        .unwrap();
        assert_eq!(certs.mode(), SmartcardMode::HostCertificates);
        assert_eq!(parse(&format(&certs)).unwrap(), certs);

        let spice =
            parse("<smartcard mode='passthrough' type='spicevmc'/>").unwrap();
        assert_eq!(
            spice.backend,
            SmartcardBackend::Passthrough(ChrSource::Spicevmc(
                SpicevmcName::Smartcard
            ))
        );
        assert_eq!(
            format(&spice),
            "<smartcard mode='passthrough' type='spicevmc'/>\n"
        );

    }

    #[test]
    fn rejects() {
        for xml in [
            "<smartcard/>",
            "<smartcard mode='host'><certificate>a</certificate></smartcard>",
            "<smartcard mode='host-certificates'><certificate>a</certificate>\
             </smartcard>",
            "<smartcard mode='host-certificates'><certificate>a</certificate>\
             <certificate>b</certificate><certificate>c</certificate>\
             <database>relative</database></smartcard>",
            "<smartcard mode='passthrough'/>",
            "<smartcard mode='host'><address type='pci' slot='3'/></smartcard>",
        ] {
            assert!(parse(xml).is_err(), "{}", xml);
        }
    }
}
