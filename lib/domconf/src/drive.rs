// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Maps disk target names such as `sdb` or `hdc` to drive addresses.

use domconf_types::DriveAddress;

use crate::enums::DiskBus;

const DRIVE_PREFIXES: &[&str] = &["fd", "hd", "vd", "sd", "xvd", "ubd"];

/// SCSI unit 7 is taken by the controller itself.
const SCSI_CONTROLLER_UNIT: u32 = 7;

/// Converts a target name to its position in the naming sequence:
/// `sda` is 0, `sdz` is 25, `sdaa` is 26 and so on. A trailing partition
/// number (`sda1`) is ignored. Returns `None` for names that do not follow
/// the scheme.
pub fn disk_name_to_index(name: &str) -> Option<u32> {
    let rest = DRIVE_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))?;

    let letters = rest.bytes().take_while(u8::is_ascii_lowercase).count();
    if letters == 0 {
        return None;
    }

    let mut idx: u32 = 0;
    for (i, c) in rest.bytes().take(letters).enumerate() {
        let carry = if i == 0 { 0 } else { 1 };
        idx = idx.checked_add(carry)?.checked_mul(26)?;
        idx = idx.checked_add(u32::from(c - b'a'))?;
    }

    if rest[letters..].bytes().all(|b| b.is_ascii_digit()) {
        Some(idx)
    } else {
        None
    }
}

/// The drive address implied by a target name on a given bus, or `None`
/// when the bus is not addressed this way or the name cannot be indexed.
pub fn drive_address_for(
    bus: DiskBus,
    target: &str,
    wide_scsi: bool,
) -> Option<DriveAddress> {
    let idx = disk_name_to_index(target)?;
    let addr = match bus {
        DiskBus::Scsi if wide_scsi => {
            // 16 units per bus with unit 7 reserved leaves 15 per controller.
            let unit = idx % 15;
            DriveAddress {
                controller: idx / 15,
                bus: 0,
                unit: if unit >= SCSI_CONTROLLER_UNIT {
                    unit + 1
                } else {
                    unit
                },
            }
        }
        DiskBus::Scsi => {
            DriveAddress { controller: idx / 7, bus: 0, unit: idx % 7 }
        }
        DiskBus::Ide => DriveAddress {
            controller: idx / 4,
            bus: (idx % 4) / 2,
            unit: idx % 2,
        },
        DiskBus::Fdc => {
            DriveAddress { controller: idx / 2, bus: 0, unit: idx % 2 }
        }
        _ => return None,
    };
    Some(addr)
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn name_indices() {
        let cases: &[(&str, Option<u32>)] = &[
            ("sda", Some(0)),
            ("hdc", Some(2)),
            ("vdz", Some(25)),
            ("sdaa", Some(26)),
            ("sdab", Some(27)),
            ("sdba", Some(52)),
            ("sdzz", Some(701)),
            ("sdaaa", Some(702)),
            ("xvda", Some(0)),
            ("ubdb", Some(1)),
            ("fdb", Some(1)),
            ("sda1", Some(0)),
            ("sdb12", Some(1)),
            ("sd", None),
            ("sd1", None),
            ("sda1b", None),
            ("nvme0n1", None),
            ("sdA", None),
            ("", None),
        ];
        for (name, expected) in cases {
            assert_eq!(disk_name_to_index(name), *expected, "{}", name);
        }
    }

    #[test]
    fn bus_tables() {
        let da =
            |c, b, u| Some(DriveAddress { controller: c, bus: b, unit: u });

        assert_eq!(drive_address_for(DiskBus::Ide, "hda", false), da(0, 0, 0));
        assert_eq!(drive_address_for(DiskBus::Ide, "hdb", false), da(0, 0, 1));
        assert_eq!(drive_address_for(DiskBus::Ide, "hdc", false), da(0, 1, 0));
        assert_eq!(drive_address_for(DiskBus::Ide, "hde", false), da(1, 0, 0));

        assert_eq!(drive_address_for(DiskBus::Fdc, "fda", false), da(0, 0, 0));
        assert_eq!(drive_address_for(DiskBus::Fdc, "fdb", false), da(0, 0, 1));
        assert_eq!(drive_address_for(DiskBus::Fdc, "fdc", false), da(1, 0, 0));

        assert_eq!(drive_address_for(DiskBus::Scsi, "sdg", false), da(0, 0, 6));
        assert_eq!(drive_address_for(DiskBus::Scsi, "sdh", false), da(1, 0, 0));

        assert_eq!(drive_address_for(DiskBus::Scsi, "sdg", true), da(0, 0, 6));
        assert_eq!(drive_address_for(DiskBus::Scsi, "sdh", true), da(0, 0, 8));
        assert_eq!(drive_address_for(DiskBus::Scsi, "sdo", true), da(0, 0, 15));
        assert_eq!(drive_address_for(DiskBus::Scsi, "sdp", true), da(1, 0, 0));
        assert_eq!(drive_address_for(DiskBus::Scsi, "sdz", true), da(1, 0, 11));
        assert_eq!(
            drive_address_for(DiskBus::Scsi, "sdaa", true),
            da(1, 0, 12)
        );


        assert_eq!(drive_address_for(DiskBus::Virtio, "vda", false), None);
        assert_eq!(drive_address_for(DiskBus::Ide, "hd", false), None);
    }

    proptest! {
        #[test]
        fn wide_scsi_never_uses_controller_unit(idx in 0u32..2000) {
            let name = index_to_name("sd", idx);
            prop_assert_eq!(disk_name_to_index(&name), Some(idx));
            let addr = drive_address_for(DiskBus::Scsi, &name, true).unwrap();
            prop_assert_ne!(addr.unit, SCSI_CONTROLLER_UNIT);
            prop_assert!(addr.unit < 16);
        }
    }

    fn index_to_name(prefix: &str, mut idx: u32) -> String {
        let mut letters = Vec::new();
        loop {
            letters.push(b'a' + (idx % 26) as u8);
            if idx < 26 {
                break;
            }
            idx = idx / 26 - 1;
        }
        letters.reverse();
        format!("{}{}", prefix, String::from_utf8(letters).unwrap())
    }
}
