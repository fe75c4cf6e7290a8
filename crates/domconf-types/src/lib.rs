// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fundamental value types shared by the domain configuration crates.
//!
//! This crate defines the small grammars that appear inside domain
//! documents (device addresses, MAC addresses and CPU sets) so that the
//! configuration library and its callers can share them without pulling in
//! any XML machinery.

use std::fmt::Display;
use std::io::{Error, ErrorKind};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

mod cpuset;
mod mac;

pub use cpuset::{CpuSet, CpuSetError, CPUSET_MAX_CPUS, DEFAULT_MAX_CPUS};
pub use mac::MacAddr;

const PCI_SLOTS_PER_BUS: u32 = 32;
const PCI_FUNCTIONS_PER_SLOT: u32 = 8;
const PCI_MAX_DOMAIN: u32 = 0xffff;
const PCI_MAX_BUS: u32 = 0xff;

/// Parses a hexadecimal field with an optional `0x` prefix.
pub fn parse_hex_u32(s: &str) -> Result<u32, Error> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(digits, 16).map_err(|e| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("cannot parse hex value {:?}: {}", s, e),
        )
    })
}

/// A PCI domain/bus/slot/function tuple as seen by the guest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct PciAddress {
    domain: u16,
    bus: u8,
    slot: u8,
    function: u8,
}

impl PciAddress {
    pub fn new(
        domain: u32,
        bus: u32,
        slot: u32,
        function: u32,
    ) -> Result<Self, Error> {
        if domain > PCI_MAX_DOMAIN {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "PCI domain {:#x} outside range of 0-{:#x}",
                    domain, PCI_MAX_DOMAIN
                ),
            ));
        }

        if bus > PCI_MAX_BUS {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "PCI bus {:#x} outside range of 0-{:#x}",
                    bus, PCI_MAX_BUS
                ),

            ));
        }

        if slot >= PCI_SLOTS_PER_BUS {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "PCI slot {} outside range of 0-{}",
                    slot,
                    PCI_SLOTS_PER_BUS - 1
                ),
            ));
        }

        if function >= PCI_FUNCTIONS_PER_SLOT {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "PCI function {} outside range of 0-{}",
                    function,
                    PCI_FUNCTIONS_PER_SLOT - 1
                ),
            ));
        }

        Ok(Self {
            domain: domain as u16,
            bus: bus as u8,
            slot: slot as u8,
            function: function as u8,
        })
    }

    /// Parses the legacy `DOMAIN:BUS:SLOT` form, where every field is hex
    /// and the function is implicitly zero.
    pub fn parse_legacy(s: &str) -> Result<Self, Error> {
        let fields: Vec<&str> = s.split(':').collect();
        if fields.len() != 3 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "expected 3 fields in legacy PCI address {:?}, got {}",
                    s,
                    fields.len()
                ),
            ));
        }

        Self::new(
            parse_hex_u32(fields[0])?,
            parse_hex_u32(fields[1])?,
            parse_hex_u32(fields[2])?,
            0,
        )
    }

    #[inline]
    pub fn domain(&self) -> u16 {
        self.domain
    }

    #[inline]
    pub fn bus(&self) -> u8 {
        self.bus
    }

    #[inline]
    pub fn slot(&self) -> u8 {
        self.slot
    }

    #[inline]
    pub fn function(&self) -> u8 {
        self.function
    }
}

impl FromStr for PciAddress {
    type Err = Error;

    /// Accepts `DDDD:BB:SS.F`, all fields hexadecimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, function) = s.rsplit_once('.').ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("PCI address {:?} has no function field", s),
            )
        })?;

        let fields: Vec<&str> = head.split(':').collect();
        if fields.len() != 3 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "expected 4 fields in PCI address {}, got {}",
                    s,
                    fields.len() + 1
                ),
            ));
        }

        Self::new(
            parse_hex_u32(fields[0])?,
            parse_hex_u32(fields[1])?,
            parse_hex_u32(fields[2])?,
            parse_hex_u32(function)?,
        )
    }
}

impl Display for PciAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.slot, self.function
        )
    }
}

impl Serialize for PciAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(format!("{}", self).as_str())
    }
}

impl<'d> Deserialize<'d> for PciAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

/// The location of a disk on an IDE, SCSI or floppy controller.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct DriveAddress {
    pub controller: u32,
    pub bus: u32,
    pub unit: u32,
}

impl Display for DriveAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.controller, self.bus, self.unit)
    }
}

/// The location of a port on a virtio-serial controller.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct VirtioSerialAddress {
    pub controller: u32,
    pub bus: u32,
    pub port: u32,
}

impl Display for VirtioSerialAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.controller, self.bus, self.port)
    }
}

/// The slot of a smartcard on a CCID controller.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct CcidAddress {
    pub controller: u32,
    pub slot: u32,
}

impl Display for CcidAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.controller, self.slot)
    }
}

#[cfg(test)]
mod test {
    use super::PciAddress;
    use serde_test::{assert_de_tokens_error, assert_tokens, Token};
    use std::str::FromStr;

    const TEST_CASES: &[(&str, Result<PciAddress, ()>)] = &[
        (
            "0000:00:07.0",
            Ok(PciAddress { domain: 0, bus: 0, slot: 7, function: 0 }),
        ),
        (
            "0001:02:1f.7",
            Ok(PciAddress { domain: 1, bus: 2, slot: 31, function: 7 }),
        ),
        ("0000:00:20.0", Err(())),
        ("0000:00:01.8", Err(())),
        ("10000:00:01.0", Err(())),
        ("0000:100:01.0", Err(())),
        ("0000:00:01", Err(())),
        ("00:01.0", Err(())),
        ("zz:00:01.0", Err(())),
        ("", Err(())),
        ("alas, poor PCI device", Err(())),
    ];

    #[test]
    fn pci_address_from_str() {
        for (input, expected) in TEST_CASES {
            match PciAddress::from_str(input) {
                Ok(addr) => assert_eq!(addr, expected.unwrap()),
                Err(_) => assert!(
                    expected.is_err(),
                    "Expected error parsing PCI address {}",
                    input
                ),
            }
        }
    }

    #[test]
    fn pci_address_serialization() {
        for (input, expected) in TEST_CASES {
            match expected {
                Ok(addr) => {
                    assert_tokens(addr, &[Token::Str(*input)]);
                }
                Err(_) => {
                    let msg = PciAddress::from_str(input).unwrap_err();
                    assert_de_tokens_error::<PciAddress>(
                        &[Token::Str(*input)],
                        &msg.to_string(),
                    );
                }
            }
        }
    }

    #[test]
    fn pci_slot_and_function_bounds() {
        assert!(PciAddress::new(0, 0, 31, 7).is_ok());
        assert!(PciAddress::new(0, 0, 32, 0).is_err());
        assert!(PciAddress::new(0, 0, 0, 8).is_err());
    }

    #[test]
    fn legacy_pci_address() {
        let addr = PciAddress::parse_legacy("0000:00:0a").unwrap();
        assert_eq!(addr.slot(), 10);
        assert_eq!(addr.function(), 0);
        assert!(PciAddress::parse_legacy("0x0:0x0:0x3").is_ok());
        assert!(PciAddress::parse_legacy("0000:00").is_err());
        assert!(PciAddress::parse_legacy("0000:00:40").is_err());
    }
}
