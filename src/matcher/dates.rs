//! Date window predicates.
//!
//! Patterns use the familiar `MM/dd/yyyy` letter notation and are converted
//! once into a `chrono` format string.

use crate::config::defaults::{DAYS_PER_MONTH_DIVISOR, DAYS_PER_YEAR_DIVISOR, MILLIS_PER_DAY};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateUnit {
    Days,
    Months,
    Years,
}

impl DateUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "D" | "DAY" | "DAYS" => Some(DateUnit::Days),
            "M" | "MONTH" | "MONTHS" => Some(DateUnit::Months),
            "Y" | "YEAR" | "YEARS" => Some(DateUnit::Years),
            _ => None,
        }
    }

    /// Fixed millisecond divisor used by `DATEDIFF`.
    pub fn millis(self) -> i64 {
        match self {
            DateUnit::Days => MILLIS_PER_DAY,
            DateUnit::Months => MILLIS_PER_DAY * DAYS_PER_MONTH_DIVISOR,
            DateUnit::Years => MILLIS_PER_DAY * DAYS_PER_YEAR_DIVISOR,
        }
    }
}

/// A date pattern such as `MM/dd/yyyy`, with its `chrono` translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    source: String,
    format: String,
}

impl DatePattern {
    pub fn new(pattern: &str) -> Self {
        Self {
            source: pattern.to_string(),
            format: to_chrono_format(pattern),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    /// Parse a value; date-only patterns resolve to midnight.
    pub fn parse(&self, value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        NaiveDateTime::parse_from_str(value, &self.format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, &self.format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
    }
}

fn to_chrono_format(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut format = String::with_capacity(pattern.len() + 4);
    let mut pos = 0;
    while pos < chars.len() {
        let ch = chars[pos];
        let mut run = 1;
        while pos + run < chars.len() && chars[pos + run] == ch {
            run += 1;
        }
        let token = match (ch, run) {
            ('y', 2) => Some("%y"),
            ('y', _) => Some("%Y"),
            ('M', 1 | 2) => Some("%m"),
            ('M', 3) => Some("%b"),
            ('M', _) => Some("%B"),
            ('d', _) => Some("%d"),
            ('H', _) => Some("%H"),
            ('h', _) => Some("%I"),
            ('m', _) => Some("%M"),
            ('s', _) => Some("%S"),
            ('a', _) => Some("%p"),
            ('E', 1..=3) => Some("%a"),
            ('E', _) => Some("%A"),
            _ => None,
        };
        match token {
            Some(token) => format.push_str(token),
            None => {
                for _ in 0..run {
                    if ch == '%' {
                        format.push_str("%%");
                    } else {
                        format.push(ch);
                    }
                }
            }
        }
        pos += run;
    }
    format
}

fn parse_pair(
    pattern: &DatePattern,
    s: &str,
    t: &str,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    match (pattern.parse(s), pattern.parse(t)) {
        (Some(a), Some(b)) => Some((a, b)),
        _ => {
            warn!(
                pattern = pattern.source(),
                left = s,
                right = t,
                "date value does not fit pattern"
            );
            None
        }
    }
}

/// Whole calendar months from `early` to `late` (`early <= late`).
fn full_months(early: NaiveDateTime, late: NaiveDateTime) -> i64 {
    let mut months = i64::from(late.year() - early.year()) * 12
        + i64::from(late.month()) - i64::from(early.month());
    if (late.day(), late.time()) < (early.day(), early.time()) {
        months -= 1;
    }
    months
}

/// Calendar-based window: `|t - s| <= amount` in whole units.
pub fn within(pattern: &DatePattern, s: &str, t: &str, amount: i64, unit: DateUnit) -> bool {
    let Some((a, b)) = parse_pair(pattern, s, t) else {
        return false;
    };
    let (early, late) = if a <= b { (a, b) } else { (b, a) };
    let difference = match unit {
        DateUnit::Days => (late.date() - early.date()).num_days(),
        DateUnit::Months => full_months(early, late),
        DateUnit::Years => full_months(early, late) / 12,
    };
    difference <= amount
}

/// Millisecond difference divided by the unit's fixed divisor.
pub fn date_diff(pattern: &DatePattern, s: &str, t: &str, amount: i64, unit: DateUnit) -> bool {
    let Some((a, b)) = parse_pair(pattern, s, t) else {
        return false;
    };
    let millis = (b - a).num_milliseconds().abs();
    millis / unit.millis() <= amount
}
