// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CPU set strings such as `0-3,^2,8`.

use std::fmt::Display;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// The CPU mask length used for domain-level CPU sets.
pub const DEFAULT_MAX_CPUS: usize = 1024;

/// The largest bitmap a CPU set may describe.
pub const CPUSET_MAX_CPUS: usize = 100_000;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CpuSetError {
    #[error("CPU set is empty")]
    Empty,

    #[error("malformed CPU set {0:?}")]
    Malformed(String),

    #[error("CPU {cpu} outside range of 0-{}", max - 1)]
    OutOfRange { cpu: usize, max: usize },

    #[error("CPU range {start}-{end} is reversed")]
    ReversedRange { start: usize, end: usize },

    #[error("CPU exclusion cannot be combined with a range in {0:?}")]
    NegatedRange(String),

    #[error("CPU set size {0} exceeds the maximum of {CPUSET_MAX_CPUS}")]
    TooLarge(usize),
}

/// A dense bitmap of host CPUs.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct CpuSet {
    bits: Vec<bool>,
}

impl CpuSet {
    /// Creates an empty set able to hold CPUs `0..max_cpus`.
    pub fn new(max_cpus: usize) -> Self {
        Self { bits: vec![false; max_cpus] }
    }

    /// Creates a set containing the CPUs yielded by `cpus`.
    pub fn from_cpus(
        max_cpus: usize,
        cpus: impl IntoIterator<Item = usize>,
    ) -> Result<Self, CpuSetError> {
        let mut set = Self::new(max_cpus);
        for cpu in cpus {
            set.insert(cpu)?;
        }
        Ok(set)
    }

    /// The number of CPUs this set can describe.
    pub fn capacity(&self) -> usize {
        self.bits.len()
    }

    /// The number of CPUs in the set.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|b| *b)
    }

    pub fn contains(&self, cpu: usize) -> bool {
        self.bits.get(cpu).copied().unwrap_or(false)
    }

    pub fn insert(&mut self, cpu: usize) -> Result<(), CpuSetError> {
        let max = self.bits.len();
        let bit = self
            .bits
            .get_mut(cpu)
            .ok_or(CpuSetError::OutOfRange { cpu, max })?;
        *bit = true;
        Ok(())
    }

    pub fn remove(&mut self, cpu: usize) {
        if let Some(bit) = self.bits.get_mut(cpu) {
            *bit = false;
        }
    }

    /// Iterates over the CPUs present in the set in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter().enumerate().filter(|(_, b)| **b).map(|(i, _)| i)
    }

    /// Parses the whole of `s` as a CPU set of capacity `max_cpus`.
    pub fn parse(s: &str, max_cpus: usize) -> Result<Self, CpuSetError> {
        let (set, consumed) = Self::parse_until(s, None, max_cpus)?;
        if consumed != s.len() {
            return Err(CpuSetError::Malformed(s.to_owned()));
        }
        Ok(set)
    }

    /// Parses a CPU set from the start of `s`, stopping at the end of the
    /// string or at the first occurrence of `sep` between tokens. Returns the
    /// set and the number of bytes consumed (not including the separator).
    ///
    /// Tokens are `N`, `N-M` (inclusive, `N <= M`) and `^N` (remove `N`).
    pub fn parse_until(
        s: &str,
        sep: Option<char>,
        max_cpus: usize,
    ) -> Result<(Self, usize), CpuSetError> {
        if max_cpus > CPUSET_MAX_CPUS {
            return Err(CpuSetError::TooLarge(max_cpus));
        }

        let malformed = || CpuSetError::Malformed(s.to_owned());
        let mut cur = Cursor { s, pos: 0 };
        let mut set = Self::new(max_cpus);

        cur.skip_spaces();
        if cur.at_end() {
            return Err(CpuSetError::Empty);
        }

        while !cur.at_end() && cur.peek() != sep {
            let negate = cur.eat('^');
            let start = cur.number().ok_or_else(malformed)?;
            if start >= max_cpus {
                return Err(CpuSetError::OutOfRange {
                    cpu: start,
                    max: max_cpus,
                });
            }
            cur.skip_spaces();

            if cur.eat('-') {
                if negate {
                    return Err(CpuSetError::NegatedRange(s.to_owned()));
                }
                cur.skip_spaces();
                let end = cur.number().ok_or_else(malformed)?;
                if end >= max_cpus {
                    return Err(CpuSetError::OutOfRange {
                        cpu: end,
                        max: max_cpus,
                    });
                }
                if end < start {
                    return Err(CpuSetError::ReversedRange { start, end });
                }
                for cpu in start..=end {
                    set.bits[cpu] = true;
                }
                cur.skip_spaces();
            } else if negate {
                set.bits[start] = false;
            } else {
                set.bits[start] = true;
            }

            if cur.eat(',') {
                cur.skip_spaces();
            } else if cur.at_end() || cur.peek() == sep {
                break;
            } else {
                return Err(malformed());
            }
        }

        Ok((set, cur.pos))
    }
}

struct Cursor<'a> {
    s: &'a str,
    pos: usize,
}

impl Cursor<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.s.len()
    }

    fn peek(&self) -> Option<char> {
        self.s[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_spaces(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    fn number(&mut self) -> Option<usize> {
        let rest = &self.s[self.pos..];
        let len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        if len == 0 {
            return None;
        }
        let value = rest[..len].parse().ok()?;
        self.pos += len;
        Some(value)
    }
}

impl FromStr for CpuSet {
    type Err = CpuSetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, DEFAULT_MAX_CPUS)
    }
}

impl Display for CpuSet {
    /// Writes the canonical form: maximal runs as `start-end`, singletons as
    /// `start`, joined by commas.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut runs: Vec<(usize, usize)> = Vec::new();
        let mut run: Option<usize> = None;
        for (cpu, set) in self.bits.iter().enumerate() {
            match (*set, run) {
                (true, None) => run = Some(cpu),
                (false, Some(start)) => {
                    runs.push((start, cpu - 1));
                    run = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run {
            runs.push((start, self.bits.len() - 1));
        }

        for (i, (start, end)) in runs.into_iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if start == end {
                write!(f, "{}", start)?;
            } else {
                write!(f, "{}-{}", start, end)?;
            }
        }
        Ok(())
    }
}

impl Serialize for CpuSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(format!("{}", self).as_str())
    }
}

impl<'d> Deserialize<'d> for CpuSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_grammar() {
        let cases: &[(&str, Result<&[usize], ()>)] = &[
            ("0", Ok(&[0])),
            ("0-3", Ok(&[0, 1, 2, 3])),
            ("0-3,^2", Ok(&[0, 1, 3])),
            (" 1 , 4 - 5 ", Ok(&[1, 4, 5])),
            ("5-5", Ok(&[5])),
            ("^5", Ok(&[])),
            ("0,0,0", Ok(&[0])),
            ("5-3", Err(())),
            ("^1-3", Err(())),
            ("1024", Err(())),
            ("a", Err(())),
            ("1,", Ok(&[1])),
            ("1;2", Err(())),
            ("", Err(())),
            ("   ", Err(())),
        ];

        for (input, expected) in cases {
            match (CpuSet::from_str(input), expected) {
                (Ok(set), Ok(cpus)) => {
                    let got: Vec<_> = set.iter().collect();
                    assert_eq!(got, *cpus, "{}", input)
                }
                (Err(_), Err(())) => {}
                (res, _) => {
                    panic!("unexpected result for {:?}: {:?}", input, res)
                }

            }
        }
    }

    #[test]
    fn parse_stops_at_separator() {
        let (set, consumed) =
            CpuSet::parse_until("0-2,7:rest", Some(':'), 16).unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(set.count(), 4);
        assert!(set.contains(7));
        assert!(!set.contains(3));
    }

    #[test]
    fn format_is_canonical() {
        let set = CpuSet::from_cpus(16, [0, 1, 2, 3, 5, 7, 8, 15]).unwrap();
        assert_eq!(set.to_string(), "0-3,5,7-8,15");
        assert_eq!(CpuSet::new(8).to_string(), "");
        assert_eq!(
            CpuSet::from_str("3,2,1,0,^1,1").unwrap().to_string(),
            "0-3"
        );
    }

    #[test]
    fn rejects_oversized_capacity() {
        assert_eq!(
            CpuSet::parse("0", CPUSET_MAX_CPUS + 1),
            Err(CpuSetError::TooLarge(CPUSET_MAX_CPUS + 1))
        );
    }

    proptest! {
        #[test]
        fn format_then_parse_is_identity(
            cpus in proptest::collection::btree_set(0usize..256, 1..64)
        ) {
            let set = CpuSet::from_cpus(256, cpus.iter().copied()).unwrap();
            let text = set.to_string();
            let reparsed = CpuSet::parse(&text, 256).unwrap();
            prop_assert_eq!(&reparsed, &set);
            prop_assert_eq!(reparsed.to_string(), text);
        }
    }
}
