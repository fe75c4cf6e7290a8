// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conversion of a [`super::Config`] into host [`Capabilities`].

use domconf::caps::{Guest, GuestDomain};
use domconf::enums::{ConsoleTargetType, VirtType};
use domconf::Capabilities;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TomlToCapsError {
    #[error(
        "unrecognized virtualization type {virt_type:?} for guest \
         {os_type}/{arch}"
    )]
    UnrecognizedVirtType { virt_type: String, os_type: String, arch: String },

    #[error("invalid MAC prefix {0:?}, expected three hex octets")]
    InvalidMacPrefix(String),

    #[error(
        "unrecognized console target type {target:?} for OS type {os_type:?}"
    )]
    UnrecognizedConsoleTarget { os_type: String, target: String },
}

fn parse_mac_prefix(s: &str) -> Result<[u8; 3], TomlToCapsError> {
    let err = || TomlToCapsError::InvalidMacPrefix(s.to_owned());
    let mut prefix = [0u8; 3];
    let mut octets = s.split(':');
    for byte in prefix.iter_mut() {
        let octet = octets.next().ok_or_else(err)?;
        if octet.len() != 2 {
            return Err(err());
        }
        *byte = u8::from_str_radix(octet, 16).map_err(|_| err())?;
    }
    if octets.next().is_some() {
        return Err(err());
    }
    Ok(prefix)
}

impl TryFrom<&super::Config> for Capabilities {
    type Error = TomlToCapsError;

    fn try_from(config: &super::Config) -> Result<Self, Self::Error> {
        let host = &config.host;
        let mut caps = Capabilities {
            emulator_required: host.emulator_required,
            has_wide_scsi_bus: host.wide_scsi_bus,
            mac_prefix: parse_mac_prefix(&host.mac_prefix)?,
            default_init: host.default_init.clone(),
            default_disk_driver_name: host.disk_driver_name.clone(),
            default_disk_driver_type: host.disk_driver_type.clone(),
            ..Default::default()
        };

        for (os_type, target) in host.console.iter() {
            let kind: ConsoleTargetType = target.parse().map_err(|_| {
                TomlToCapsError::UnrecognizedConsoleTarget {
                    os_type: os_type.clone(),
                    target: target.clone(),
                }
            })?;
            caps.console_targets.insert(os_type.clone(), kind);
        }

        for guest in config.guests.iter() {
            let mut entry =
                Guest::new(&guest.os_type, &guest.arch, guest.wordsize);
            entry.emulator = guest.emulator.clone();
            entry.machines = guest.machines.clone();
            for dom in guest.domains.iter() {
                let virt_type: VirtType = dom.virt_type.parse().map_err(|_| {
                    TomlToCapsError::UnrecognizedVirtType {
                        virt_type: dom.virt_type.clone(),
                        os_type: guest.os_type.clone(),
                        arch: guest.arch.clone(),
                    }
                })?;
                entry.domains.push(GuestDomain {
                    virt_type,
                    emulator: dom.emulator.clone(),
                    machines: dom.machines.clone(),
                });
            }
            caps.guests.push(entry);
        }

        Ok(caps)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Config;

    fn config(raw: &str) -> Config {
        toml::de::from_str(raw).unwrap()
    }

    #[test]
    fn mac_prefixes() {
        assert_eq!(parse_mac_prefix("52:54:00").unwrap(), [0x52, 0x54, 0x00]);
        assert_eq!(parse_mac_prefix("00:16:3e").unwrap(), [0x00, 0x16, 0x3e]);
        for bad in ["52:54", "52:54:00:01", "5:54:00", "zz:54:00", ""] {
            assert!(parse_mac_prefix(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn guests_become_capabilities() {
        let cfg = config(
            r#"
[host]
emulator_required = true
mac_prefix = "00:16:3e"

[host.console]
xen = "xen"
exe = "lxc"

[[guest]]
os_type = "hvm"
arch = "x86_64"
emulator = "/usr/bin/qemu-system-x86_64"
machines = ["pc"]

[[guest.domain]]
virt_type = "qemu"

[[guest.domain]]
virt_type = "kvm"
emulator = "/usr/bin/qemu-kvm"
"#,
        );
        let caps = Capabilities::try_from(&cfg).unwrap();
        assert!(caps.emulator_required);
        assert_eq!(caps.mac_prefix, [0x00, 0x16, 0x3e]);
        assert_eq!(
            caps.console_targets.get("exe"),
            Some(&ConsoleTargetType::Lxc)
        );

        assert_eq!(caps.default_arch("hvm", VirtType::Kvm), Some("x86_64"));
        assert_eq!(
            caps.default_machine("hvm", "x86_64", VirtType::Qemu),
            Some("pc")
        );
        assert_eq!(
            caps.default_emulator("hvm", "x86_64", VirtType::Kvm),
            Some("/usr/bin/qemu-kvm")
        );
        assert_eq!(
            caps.default_emulator("hvm", "x86_64", VirtType::Qemu),
            Some("/usr/bin/qemu-system-x86_64")
        );
    }

    #[test]
    fn invalid_values_rejected() {
        let cfg = config(
            r#"
[[guest]]
os_type = "hvm"
arch = "x86_64"

[[guest.domain]]
virt_type = "bhyve"
"#,
        );
        assert!(matches!(
            Capabilities::try_from(&cfg),
            Err(TomlToCapsError::UnrecognizedVirtType { .. })
        ));

        let cfg = config(
            r#"
[host.console]
hvm = "teletype"
"#,
        );
        assert!(matches!(
            Capabilities::try_from(&cfg),
            Err(TomlToCapsError::UnrecognizedConsoleTarget { .. })
        ));
    }
}
