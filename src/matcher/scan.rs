//! Character-class scan.
//!
//! `SCAN(direction, class, length, case, order)` derives a string by walking a
//! value from one end, keeping characters of a class, folding case and
//! optionally sorting. Two values match when their derived strings are equal
//! and non-empty. The same derivation serves as an index hash.

use super::SpecParts;
use crate::error::RuleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanDirection {
    LeftToRight,
    RightToLeft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    All,
    NonBlank,
    Alpha,
    Digit,
    AlphaNumeric,
}

impl CharClass {
    fn accepts(self, ch: char) -> bool {
        match self {
            CharClass::All => true,
            CharClass::NonBlank => !ch.is_whitespace(),
            CharClass::Alpha => ch.is_alphabetic(),
            CharClass::Digit => ch.is_ascii_digit(),
            CharClass::AlphaNumeric => ch.is_alphanumeric(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseFold {
    KeepCase,
    ToUpper,
    ToLower,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanOrder {
    /// Characters stay in their original left-to-right order.
    SameOrder,
    /// Sorted low to high, duplicates kept.
    LowToHighKeepDup,
    /// Sorted low to high, duplicates dropped.
    LowToHighDropDup,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanSpec {
    pub direction: ScanDirection,
    pub class: CharClass,
    /// Maximum characters kept; 0 keeps everything.
    pub max_len: usize,
    pub case: CaseFold,
    pub order: ScanOrder,
}

impl Default for ScanSpec {
    fn default() -> Self {
        Self {
            direction: ScanDirection::LeftToRight,
            class: CharClass::All,
            max_len: 0,
            case: CaseFold::ToUpper,
            order: ScanOrder::SameOrder,
        }
    }
}

impl ScanSpec {
    /// Read the five scan arguments starting at `offset`. Omitted trailing
    /// arguments keep their defaults.
    pub(crate) fn from_parts(parts: &SpecParts, offset: usize) -> Result<Self, RuleError> {
        let mut spec = ScanSpec::default();

        if let Some(raw) = parts.arg(offset) {
            spec.direction = match raw.to_ascii_uppercase().as_str() {
                "LR" => ScanDirection::LeftToRight,
                "RL" => ScanDirection::RightToLeft,
                _ => return Err(parts.invalid_argument(offset, raw)),
            };
        }
        if let Some(raw) = parts.arg(offset + 1) {
            spec.class = match raw.to_ascii_uppercase().as_str() {
                "ALL" => CharClass::All,
                "NONBLANK" => CharClass::NonBlank,
                "ALPHA" | "LETTER" => CharClass::Alpha,
                "DIGIT" | "NUMERIC" => CharClass::Digit,
                "ALNUM" | "ALPHANUMERIC" => CharClass::AlphaNumeric,
                _ => return Err(parts.invalid_argument(offset + 1, raw)),
            };
        }
        spec.max_len = parts.usize_or(offset + 2, 0)?;
        if let Some(raw) = parts.arg(offset + 3) {
            spec.case = match raw.to_ascii_uppercase().as_str() {
                "KEEPCASE" => CaseFold::KeepCase,
                "TOUPPER" => CaseFold::ToUpper,
                "TOLOWER" => CaseFold::ToLower,
                _ => return Err(parts.invalid_argument(offset + 3, raw)),
            };
        }
        if let Some(raw) = parts.arg(offset + 4) {
            spec.order = match raw.to_ascii_uppercase().as_str() {
                "SAMEORDER" => ScanOrder::SameOrder,
                "L2HKEEPDUP" => ScanOrder::LowToHighKeepDup,
                "L2HDROPDUP" => ScanOrder::LowToHighDropDup,
                _ => return Err(parts.invalid_argument(offset + 4, raw)),
            };
        }
        Ok(spec)
    }

    /// Derive the scanned string.
    pub fn apply(&self, value: &str) -> String {
        let limit = if self.max_len == 0 {
            usize::MAX
        } else {
            self.max_len
        };
        let fold = |ch: char| -> Vec<char> {
            match self.case {
                CaseFold::KeepCase => vec![ch],
                CaseFold::ToUpper => ch.to_uppercase().collect(),
                CaseFold::ToLower => ch.to_lowercase().collect(),
            }
        };

        let mut kept: Vec<char> = match self.direction {
            ScanDirection::LeftToRight => value
                .chars()
                .filter(|ch| self.class.accepts(*ch))
                .flat_map(fold)
                .take(limit)
                .collect(),
            ScanDirection::RightToLeft => {
                let mut reversed: Vec<char> = value
                    .chars()
                    .rev()
                    .filter(|ch| self.class.accepts(*ch))
                    .flat_map(fold)
                    .take(limit)
                    .collect();
                reversed.reverse();
                reversed
            }
        };

        match self.order {
            ScanOrder::SameOrder => {}
            ScanOrder::LowToHighKeepDup => kept.sort_unstable(),
            ScanOrder::LowToHighDropDup => {
                kept.sort_unstable();
                kept.dedup();
            }
        }
        kept.into_iter().collect()
    }
}
