// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt::Display;
use std::io::{Error, ErrorKind};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub const MAC_LEN: usize = 6;

/// A six-byte Ethernet MAC address, written as `xx:xx:xx:xx:xx:xx`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct MacAddr([u8; MAC_LEN]);

impl MacAddr {
    pub const fn new(bytes: [u8; MAC_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds an address from a vendor OUI and three device-specific bytes.
    pub fn from_prefix(prefix: [u8; 3], tail: [u8; 3]) -> Self {
        Self([prefix[0], prefix[1], prefix[2], tail[0], tail[1], tail[2]])
    }

    pub fn bytes(&self) -> [u8; MAC_LEN] {
        self.0
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; MAC_LEN];
        let mut count = 0;
        for field in s.split(':') {
            if count == MAC_LEN {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("too many fields in MAC address {:?}", s),
                ));
            }

            if field.is_empty()
                || field.len() > 2
                || !field.chars().all(|c| c.is_ascii_hexdigit())
            {
                return Err(Error::new(
                    ErrorKind::InvalidInput,
                    format!("invalid field {:?} in MAC address {:?}", field, s),
                ));
            }

            bytes[count] = u8::from_str_radix(field, 16).map_err(|e| {
                Error::new(
                    ErrorKind::InvalidInput,
                    format!("failed to parse MAC address {}: {}", s, e),
                )
            })?;
            count += 1;
        }

        if count != MAC_LEN {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "expected {} fields in MAC address {}, got {}",
                    MAC_LEN, s, count
                ),
            ));
        }

        Ok(Self(bytes))
    }
}

impl Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl Serialize for MacAddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(format!("{}", self).as_str())
    }
}

impl<'d> Deserialize<'d> for MacAddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}
