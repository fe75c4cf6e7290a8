// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Guest clock offset and timer sources.

use crate::enums::{
    parse_enum, ClockBasis, TimerMode, TimerName, TimerTickPolicy, TimerTrack,
};
use crate::error::{Error, Result};
use crate::xml::{Element, Tag, XmlWriter};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ClockOffset {
    #[default]
    Utc,
    Localtime,
    /// Seconds added to `basis` when the guest starts.
    Variable { adjustment: i64, basis: ClockBasis },
    Timezone(String),
}

impl ClockOffset {
    pub fn name(&self) -> &'static str {
        match self {
            ClockOffset::Utc => "utc",
            ClockOffset::Localtime => "localtime",
            ClockOffset::Variable { .. } => "variable",
            ClockOffset::Timezone(_) => "timezone",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerCatchup {
    pub threshold: Option<u64>,
    pub slew: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerDef {
    pub name: TimerName,
    pub present: Option<bool>,
    pub tickpolicy: Option<TimerTickPolicy>,
    /// Only used with the `catchup` tick policy.
    pub catchup: TimerCatchup,
    /// `platform` and `rtc` only.
    pub track: Option<TimerTrack>,
    /// `tsc` only; Hz.
    pub frequency: Option<u64>,
    /// `tsc` only.
    pub mode: Option<TimerMode>,
}

impl TimerDef {
    pub fn new(name: TimerName) -> Self {
        Self {
            name,
            present: None,
            tickpolicy: None,
            catchup: TimerCatchup::default(),
            track: None,
            frequency: None,
            mode: None,
        }
    }

    fn parse(node: &Element) -> Result<Self> {
        let name: TimerName = match node.attr("name") {
            Some(n) => parse_enum(n)?,
            None => {
                return Err(Error::Internal("missing timer name".to_string()))
            }
        };
        let mut timer = TimerDef::new(name);
        timer.present = node.attr_yes_no("present")?;
        timer.tickpolicy = node.attr_enum("tickpolicy")?;

        if timer.tickpolicy == Some(TimerTickPolicy::Catchup) {
            if let Some(c) = node.child("catchup") {
                timer.catchup = TimerCatchup {
                    threshold: c.attr_parse("threshold")?,
                    slew: c.attr_parse("slew")?,
                    limit: c.attr_parse("limit")?,
                };
            }
        }

        if matches!(name, TimerName::Platform | TimerName::Rtc) {
            timer.track = node.attr_enum("track")?;
        }

        if name == TimerName::Tsc {
            timer.frequency = node.attr_parse("frequency")?;
            timer.mode = node.attr_enum("mode")?;
        }

        Ok(timer)
    }

    fn format(&self, w: &mut XmlWriter) {
        let tag = Tag::new("timer")
            .attr("name", self.name)
            .attr_opt(
                "present",
                self.present.map(|p| if p { "yes" } else { "no" }),
            )
            .attr_opt("tickpolicy", self.tickpolicy)
            .attr_opt("track", self.track)
            .attr_opt("frequency", self.frequency)
            .attr_opt("mode", self.mode);

        let mut inner = w.nested();
        let c = &self.catchup;
        if c.threshold.is_some() || c.slew.is_some() || c.limit.is_some() {
            inner.empty(
                Tag::new("catchup")
                    .attr_opt("threshold", c.threshold)
                    .attr_opt("slew", c.slew)
                    .attr_opt("limit", c.limit),
            );
        }
        w.element_with(tag, inner);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClockDef {
    pub offset: ClockOffset,
    pub timers: Vec<TimerDef>,
}

impl ClockDef {
    pub fn parse(root: &Element) -> Result<Self> {
        let Some(node) = root.child("clock") else {
            return Ok(ClockDef::default());
        };

        let offset = match node.attr("offset").unwrap_or("utc") {
            "utc" => ClockOffset::Utc,
            "localtime" => ClockOffset::Localtime,
            "variable" => ClockOffset::Variable {
                adjustment: node.attr_parse("adjustment")?.unwrap_or(0),
                basis: node.attr_enum("basis")?.unwrap_or(ClockBasis::Utc),
            },
            "timezone" => {
                let tz = node.attr("timezone").ok_or_else(|| {
                    Error::Internal(
                        "missing 'timezone' attribute for clock with \
                         offset='timezone'"
                            .to_string(),
                    )
                })?;
                ClockOffset::Timezone(tz.to_owned())
            }
            other => {
                return Err(Error::ConfigUnsupported(format!(
                    "unknown clock offset '{}'",
                    other
                )))
            }
        };

        let timers = node
            .children_named("timer")
            .map(TimerDef::parse)
            .collect::<Result<Vec<_>>>()?;

        Ok(ClockDef { offset, timers })
    }

    pub fn format(&self, w: &mut XmlWriter) {
        let mut tag = Tag::new("clock").attr("offset", self.offset.name());
        match &self.offset {
            ClockOffset::Variable { adjustment, basis } => {
                tag = tag.attr("adjustment", adjustment).attr("basis", basis);
            }
            ClockOffset::Timezone(tz) => tag = tag.attr("timezone", tz),
            ClockOffset::Utc | ClockOffset::Localtime => {}
        }

        let mut inner = w.nested();
        for timer in &self.timers {
            timer.format(&mut inner);
        }
        w.element_with(tag, inner);
    }
}
