// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host capabilities consulted while parsing: which guest OS types and
//! architectures exist, their default machines and emulators, and a few
//! per-host defaults.

use std::collections::BTreeMap;

use domconf_types::MacAddr;

use crate::context::Environment;
use crate::cpu::CpuDef;
use crate::enums::{ConsoleTargetType, VirtType};

/// The vendor prefix used for generated MAC addresses when none is
/// configured.
pub const DEFAULT_MAC_PREFIX: [u8; 3] = [0x52, 0x54, 0x00];

/// Per-virtualization-type overrides for a guest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestDomain {
    pub virt_type: VirtType,
    pub emulator: Option<String>,
    pub machines: Vec<String>,
}

/// One guest OS type / architecture pair the host can run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Guest {
    pub os_type: String,
    pub arch: String,
    pub wordsize: u32,
    pub emulator: Option<String>,
    pub machines: Vec<String>,
    pub domains: Vec<GuestDomain>,
}

impl Guest {
    pub fn new(os_type: &str, arch: &str, wordsize: u32) -> Self {
        Self {
            os_type: os_type.to_owned(),
            arch: arch.to_owned(),
            wordsize,
            emulator: None,
            machines: Vec::new(),
            domains: Vec::new(),
        }
    }

    pub fn with_emulator(mut self, emulator: &str) -> Self {
        self.emulator = Some(emulator.to_owned());
        self
    }

    pub fn with_machines(mut self, machines: &[&str]) -> Self {
        self.machines = machines.iter().map(|m| (*m).to_owned()).collect();
        self
    }

    pub fn with_domain(mut self, virt_type: VirtType) -> Self {
        self.domains.push(GuestDomain {
            virt_type,
            emulator: None,
            machines: Vec::new(),
        });
        self
    }

    fn domain(&self, virt_type: VirtType) -> Option<&GuestDomain> {
        self.domains.iter().find(|d| d.virt_type == virt_type)
    }
}

#[derive(Clone, Debug)]
pub struct Capabilities {
    pub guests: Vec<Guest>,
    /// Whether a `<devices><emulator>` must be filled in from the guest
    /// table when the document omits it.
    pub emulator_required: bool,
    /// Whether SCSI controllers expose 16 units (wide) rather than 8.
    pub has_wide_scsi_bus: bool,
    pub mac_prefix: [u8; 3],
    /// Default console target type per guest OS type.
    pub console_targets: BTreeMap<String, ConsoleTargetType>,
    pub default_init: Option<String>,
    pub default_disk_driver_name: Option<String>,
    pub default_disk_driver_type: Option<String>,
    pub host_cpu: Option<CpuDef>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            guests: Vec::new(),
            emulator_required: false,
            has_wide_scsi_bus: false,
            mac_prefix: DEFAULT_MAC_PREFIX,
            console_targets: BTreeMap::new(),
            default_init: None,
            default_disk_driver_name: None,
            default_disk_driver_type: None,
            host_cpu: None,
        }
    }
}

impl Capabilities {
    pub fn with_guest(mut self, guest: Guest) -> Self {
        self.guests.push(guest);
        self
    }

    pub fn supports_os_type(&self, os_type: &str) -> bool {
        self.guests.iter().any(|g| g.os_type == os_type)
    }

    pub fn supports_arch(&self, os_type: &str, arch: &str) -> bool {
        self.guests.iter().any(|g| g.os_type == os_type && g.arch == arch)
    }

    /// The architecture of the first guest of `os_type` that can run under
    /// `virt_type`.
    pub fn default_arch(
        &self,
        os_type: &str,
        virt_type: VirtType,
    ) -> Option<&str> {
        self.guests
            .iter()
            .find(|g| g.os_type == os_type && g.domain(virt_type).is_some())
            .map(|g| g.arch.as_str())
    }

    /// The guest entry for `os_type`/`arch`, preferring one that lists
    /// `virt_type`.
    fn guest(
        &self,
        os_type: &str,
        arch: &str,
        virt_type: VirtType,
    ) -> Option<&Guest> {
        let mut matching = self
            .guests
            .iter()
            .filter(|g| g.os_type == os_type && g.arch == arch);
        let first = matching.clone().next();
        matching.find(|g| g.domain(virt_type).is_some()).or(first)
    }

    /// The first machine type listed for this guest, preferring the
    /// machines specific to `virt_type`.
    pub fn default_machine(
        &self,
        os_type: &str,
        arch: &str,
        virt_type: VirtType,
    ) -> Option<&str> {
        let guest = self.guest(os_type, arch, virt_type)?;
        guest
            .domain(virt_type)
            .and_then(|d| d.machines.first())
            .or_else(|| guest.machines.first())
            .map(String::as_str)
    }

    pub fn default_emulator(
        &self,
        os_type: &str,
        arch: &str,
        virt_type: VirtType,
    ) -> Option<&str> {
        let guest = self.guest(os_type, arch, virt_type)?;
        guest
            .domain(virt_type)
            .and_then(|d| d.emulator.as_deref())
            .or(guest.emulator.as_deref())
    }

    pub fn default_console_target(&self, os_type: &str) -> ConsoleTargetType {
        self.console_targets.get(os_type).copied().unwrap_or_default()
    }

    pub fn generate_mac(&self, env: &dyn Environment) -> MacAddr {
        let mut tail = [0u8; 3];
        env.random_bytes(&mut tail);
        MacAddr::from_prefix(self.mac_prefix, tail)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// A host with x86_64 hvm guests under qemu and kvm, and xen PV guests.
    pub(crate) fn test_caps() -> Capabilities {
        let mut caps = Capabilities::default()
            .with_guest(
                Guest::new("hvm", "x86_64", 64)
                    .with_emulator("/usr/bin/qemu-system-x86_64")
                    .with_machines(&["pc", "isapc"])
                    .with_domain(VirtType::Qemu)
                    .with_domain(VirtType::Kvm),
            )
            .with_guest(
                Guest::new("hvm", "i686", 32)
                    .with_emulator("/usr/bin/qemu-system-i386")
                    .with_machines(&["pc"])
                    .with_domain(VirtType::Qemu),
            )
            .with_guest(
                Guest::new("xen", "x86_64", 64)
                    .with_machines(&["xenpv"])
                    .with_domain(VirtType::Xen),
            )
            .with_guest(
                Guest::new("hvm", "x86_64", 64)
                    .with_machines(&["xenfv"])
                    .with_domain(VirtType::Xen),
            )
            .with_guest(
                Guest::new("exe", "x86_64", 64).with_domain(VirtType::Lxc),
            );
        caps.guests[0].domains[1].emulator =
            Some("/usr/bin/qemu-kvm".to_string());
        caps.console_targets.insert("xen".to_string(), ConsoleTargetType::Xen);
        caps.console_targets.insert("exe".to_string(), ConsoleTargetType::Lxc);
        caps.default_init = Some("/sbin/init".to_string());
        caps
    }

    #[test]
    fn guest_defaults() {
        let caps = test_caps();
        assert_eq!(caps.default_arch("hvm", VirtType::Kvm), Some("x86_64"));
        assert_eq!(caps.default_arch("xen", VirtType::Kvm), None);
        assert_eq!(
            caps.default_machine("hvm", "x86_64", VirtType::Kvm),
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
        assert_eq!(
            caps.default_machine("hvm", "x86_64", VirtType::Xen),
            Some("xenfv")
        );
        assert!(caps.supports_arch("hvm", "i686"));
        assert!(!caps.supports_arch("xen", "i686"));
        assert_eq!(
            caps.default_console_target("hvm"),
            ConsoleTargetType::Serial
        );
        assert_eq!(caps.default_console_target("xen"), ConsoleTargetType::Xen);
    }
}
