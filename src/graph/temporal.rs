//! Temporal facts: when a node was valid or an edge held.
//!
//! A [`TemporalFact`] is a closed union. Its serialized form is tagged by
//! `type` (`instant`, `interval`, `fuzzy`), so a JSON value satisfies exactly
//! one variant or fails to parse.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static INTERVAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})\s*[-–]\s*(\d{4})$").expect("valid regex"));
static INSTANT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}(-\d{2}(-\d{2})?)?$").expect("valid regex"));
static LEADING_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(-?\d{1,4})").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemporalFact {
    /// A single date: `"1918-11-11"` or `"1903"`.
    Instant { timestamp: String },
    /// A span between two dates.
    Interval { start: String, end: String },
    /// A description like "early 1900s" with optional uncertainty in [0, 1].
    Fuzzy {
        approximate: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uncertainty: Option<f64>,
    },
}

impl TemporalFact {
    pub fn instant(timestamp: impl Into<String>) -> Self {
        TemporalFact::Instant {
            timestamp: timestamp.into(),
        }
    }

    pub fn interval(start: impl Into<String>, end: impl Into<String>) -> Self {
        TemporalFact::Interval {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn fuzzy(approximate: impl Into<String>, uncertainty: Option<f64>) -> Self {
        TemporalFact::Fuzzy {
            approximate: approximate.into(),
            uncertainty,
        }
    }

    /// Parse a legacy date string.
    ///
    /// `"YYYY-YYYY"` becomes an interval; `"YYYY"`, `"YYYY-MM"` and
    /// `"YYYY-MM-DD"` become instants. Anything else carries no usable year
    /// and yields `None`.
    pub fn parse_text(raw: &str) -> Option<Self> {
        let text = raw.trim();
        if let Some(caps) = INTERVAL_RE.captures(text) {
            return Some(Self::interval(&caps[1], &caps[2]));
        }
        if INSTANT_RE.is_match(text) {
            return Some(Self::instant(text));
        }
        None
    }

    /// A bare year number as an instant. Non-finite or fractional years are rejected.
    pub fn from_year(year: f64) -> Option<Self> {
        if !year.is_finite() || year.fract() != 0.0 || year == 0.0 || year.abs() > 9999.0 {
            return None;
        }
        Some(Self::instant((year as i32).to_string()))
    }

    /// Every required field is non-empty and the uncertainty, if any, is in [0, 1].
    pub fn is_well_formed(&self) -> bool {
        match self {
            TemporalFact::Instant { timestamp } => !timestamp.trim().is_empty(),
            TemporalFact::Interval { start, end } => {
                !start.trim().is_empty() && !end.trim().is_empty()
            }
            TemporalFact::Fuzzy {
                approximate,
                uncertainty,
            } => {
                !approximate.trim().is_empty()
                    && uncertainty.is_none_or(|u| (0.0..=1.0).contains(&u))
            }
        }
    }

    /// Leading year of an instant or of an interval's start. Fuzzy facts have none.
    pub fn year(&self) -> Option<i32> {
        match self {
            TemporalFact::Instant { timestamp } => leading_year(timestamp),
            TemporalFact::Interval { start, .. } => leading_year(start),
            TemporalFact::Fuzzy { .. } => None,
        }
    }

    /// Last year covered: an interval's end, or the instant's own year.
    pub fn end_year(&self) -> Option<i32> {
        match self {
            TemporalFact::Instant { timestamp } => leading_year(timestamp),
            TemporalFact::Interval { end, .. } => leading_year(end),
            TemporalFact::Fuzzy { .. } => None,
        }
    }

    /// Whether the fact holds during `year`.
    ///
    /// Fuzzy facts and facts without a readable year cover every year; an
    /// interval with an unreadable end is open-ended.
    pub fn covers_year(&self, year: i32) -> bool {
        let Some(start) = self.year() else {
            return true;
        };
        match self.end_year() {
            Some(end) => start <= year && year <= end.max(start),
            None => start <= year,
        }
    }
}

impl std::fmt::Display for TemporalFact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemporalFact::Instant { timestamp } => f.write_str(timestamp),
            TemporalFact::Interval { start, end } => write!(f, "{start}-{end}"),
            TemporalFact::Fuzzy { approximate, .. } => f.write_str(approximate),
        }
    }
}

fn leading_year(text: &str) -> Option<i32> {
    let caps = LEADING_YEAR_RE.captures(text)?;
    caps[1].parse().ok()
}
