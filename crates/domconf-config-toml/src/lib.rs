// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use domconf::DomainStore;
use serde_derive::{Deserialize, Serialize};
use slog::Logger;
use thiserror::Error;

pub mod caps;

/// Configuration of a domain configuration host: where definitions are
/// stored and what the host can run.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub host: HostConfig,

    #[serde(default, rename = "guest")]
    pub guests: Vec<GuestConfig>,
}

/// Directories holding config files, autostart links and status files.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub config_dir: PathBuf,
    pub autostart_dir: PathBuf,
    pub status_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/domconf/qemu"),
            autostart_dir: PathBuf::from("/etc/domconf/qemu/autostart"),
            status_dir: PathBuf::from("/var/run/domconf/qemu"),
        }
    }
}

/// Host-wide defaults applied while parsing definitions.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct HostConfig {
    #[serde(default)]
    pub wide_scsi_bus: bool,

    #[serde(default)]
    pub emulator_required: bool,

    /// First three octets of generated MAC addresses.
    #[serde(default = "default_mac_prefix")]
    pub mac_prefix: String,

    pub default_init: Option<String>,
    pub disk_driver_name: Option<String>,
    pub disk_driver_type: Option<String>,

    /// Default console target type, keyed by guest OS type.
    #[serde(default)]
    pub console: BTreeMap<String, String>,
}

fn default_mac_prefix() -> String {
    "52:54:00".to_string()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            wide_scsi_bus: false,
            emulator_required: false,
            mac_prefix: default_mac_prefix(),
            default_init: None,
            disk_driver_name: None,
            disk_driver_type: None,
            console: BTreeMap::new(),
        }
    }
}

/// A guest OS type and architecture the host supports.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct GuestConfig {
    pub os_type: String,
    pub arch: String,
    #[serde(default = "default_wordsize")]
    pub wordsize: u32,
    pub emulator: Option<String>,
    #[serde(default)]
    pub machines: Vec<String>,
    #[serde(default, rename = "domain")]
    pub domains: Vec<GuestDomainConfig>,
}

fn default_wordsize() -> u32 {
    64
}

/// Hypervisor-specific overrides for a guest.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct GuestDomainConfig {
    pub virt_type: String,
    pub emulator: Option<String>,
    #[serde(default)]
    pub machines: Vec<String>,
}

impl Config {
    /// A store rooted at the configured directories.
    pub fn store(&self, log: Logger) -> DomainStore {
        DomainStore::new(
            &self.store.config_dir,
            &self.store.autostart_dir,
            &self.store.status_dir,
            log,
        )
    }
}

/// Errors which may be returned when parsing the configuration.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Cannot parse toml: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses a TOML file into a configuration object.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<Config, ParseError> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let cfg = toml::from_str::<Config>(&contents)?;
    Ok(cfg)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn config_can_be_serialized_as_toml() {
        let dummy_config = Config { ..Default::default() };
        let serialized = toml::ser::to_string(&dummy_config).unwrap();
        let deserialized: Config = toml::de::from_str(&serialized).unwrap();
        assert_eq!(dummy_config, deserialized);
    }

    #[test]
    fn parse_basic_config() {
        let raw = r#"
[store]
config_dir = "/srv/domconf"
autostart_dir = "/srv/domconf/autostart"
status_dir = "/run/domconf"

[host]
wide_scsi_bus = true
default_init = "/sbin/init"

[host.console]
xen = "xen"

[[guest]]
os_type = "hvm"
arch = "x86_64"
emulator = "/usr/bin/qemu-system-x86_64"
machines = ["pc", "isapc"]

[[guest.domain]]
virt_type = "kvm"
emulator = "/usr/bin/qemu-kvm"

[[guest]]
os_type = "exe"
arch = "x86_64"

[[guest.domain]]
virt_type = "lxc"
"#;
        let cfg: Config = toml::de::from_str(raw).unwrap();

        assert_eq!(cfg.store.status_dir, PathBuf::from("/run/domconf"));
        assert!(cfg.host.wide_scsi_bus);
        assert!(!cfg.host.emulator_required);
        assert_eq!(cfg.host.mac_prefix, "52:54:00");
        assert_eq!(
            cfg.host.console.get("xen").map(String::as_str),
            Some("xen")
        );


        assert_eq!(cfg.guests.len(), 2);
        assert_eq!(cfg.guests[0].wordsize, 64);
        assert_eq!(cfg.guests[0].machines, vec!["pc", "isapc"]);
        assert_eq!(cfg.guests[0].domains[0].virt_type, "kvm");
        assert_eq!(
            cfg.guests[0].domains[0].emulator.as_deref(),
            Some("/usr/bin/qemu-kvm")
        );
        assert!(cfg.guests[1].emulator.is_none());

        let store = cfg.store(slog::Logger::root(slog::Discard, slog::o!()));
        assert_eq!(
            store.config_path("web"),
            PathBuf::from("/srv/domconf/web.xml")
        );
    }

    #[test]
    fn parse_reports_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[host\n").unwrap();
        assert!(matches!(parse(&path), Err(ParseError::Toml(_))));
        assert!(matches!(
            parse(dir.path().join("missing.toml")),
            Err(ParseError::Io(_))
        ));
    }
}
