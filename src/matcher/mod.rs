//! # Match Evaluator
//!
//! Interprets match specification strings such as `LED(0.8)`, `~SOUNDEX` or
//! `WITHINDAYS(MM/dd/yyyy,30)` and decides whether two attribute values agree.
//!
//! A specification is parsed once into a [`MatchSpec`] (name, negation flag,
//! typed predicate) and then evaluated any number of times. On a hit the spec's
//! own label is returned so that rules document which predicate fired; a miss
//! yields the `"X"` sentinel.

pub mod address;
pub mod dates;
pub mod nickname;
pub mod phonetic;
pub mod scan;
pub mod similarity;

use crate::config::defaults::{
    DEFAULT_COEFFICIENT_THRESHOLD, DEFAULT_LED_THRESHOLD, DEFAULT_QTR_THRESHOLD,
    DEFAULT_SW_GAP, DEFAULT_SW_MATCH, DEFAULT_SW_MISMATCH, DEFAULT_SW_THRESHOLD,
    DEFAULT_TVERSKY_ALPHA, DEFAULT_TVERSKY_BETA,
};
use crate::error::RuleError;
use dates::{DatePattern, DateUnit};
use nickname::NicknameTable;
use phonetic::PhoneticCode;
use scan::ScanSpec;
use similarity::{Coefficient, SmithWaterman};
use std::fmt;

/// Sentinel returned when a predicate does not match.
pub const NO_MATCH: &str = "X";

/// Prefix that inverts a predicate.
pub const NEGATION_PREFIX: char = '~';

/// Result of evaluating a spec against a pair of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The predicate fired; carries the spec label.
    Match(String),
    NoMatch,
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Match(_))
    }

    /// The spec label on a match, `"X"` otherwise.
    pub fn as_str(&self) -> &str {
        match self {
            MatchOutcome::Match(label) => label,
            MatchOutcome::NoMatch => NO_MATCH,
        }
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw pieces of a spec string before predicate-specific coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SpecParts {
    pub text: String,
    pub name: String,
    pub negated: bool,
    pub args: Vec<String>,
}

impl SpecParts {
    pub(crate) fn parse(spec: &str) -> Result<Self, RuleError> {
        let text = spec.trim();
        if text.is_empty() {
            return Err(RuleError::EmptySpec);
        }
        let (negated, body) = match text.strip_prefix(NEGATION_PREFIX) {
            Some(rest) => (true, rest.trim_start()),
            None => (false, text),
        };

        let (name, args) = match body.find('(') {
            Some(open) => {
                let inner = body[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| RuleError::UnbalancedParens(text.to_string()))?;
                if inner.contains('(') || inner.contains(')') {
                    return Err(RuleError::UnbalancedParens(text.to_string()));
                }
                let args = if inner.trim().is_empty() {
                    Vec::new()
                } else {
                    inner.split(',').map(|arg| arg.trim().to_string()).collect()
                };
                (&body[..open], args)
            }
            None if body.contains(')') => {
                return Err(RuleError::UnbalancedParens(text.to_string()));
            }
            None => (body, Vec::new()),
        };

        let name = name.trim().to_ascii_uppercase();
        if name.is_empty() {
            return Err(RuleError::EmptySpec);
        }

        Ok(Self {
            text: text.to_string(),
            name,
            negated,
            args,
        })
    }

    pub(crate) fn arg(&self, position: usize) -> Option<&str> {
        self.args
            .get(position)
            .map(String::as_str)
            .filter(|arg| !arg.is_empty())
    }

    pub(crate) fn required(&self, position: usize) -> Result<&str, RuleError> {
        self.arg(position).ok_or_else(|| RuleError::MissingArgument {
            spec: self.text.clone(),
            position,
        })
    }

    pub(crate) fn f64_or(&self, position: usize, default: f64) -> Result<f64, RuleError> {
        match self.arg(position) {
            Some(raw) => raw.parse::<f64>().map_err(|_| self.invalid_number(position, raw)),
            None => Ok(default),
        }
    }

    /// A score threshold; must lie in `[0, 1]`.
    pub(crate) fn ratio_or(&self, position: usize, default: f64) -> Result<f64, RuleError> {
        self.bounded_or(position, default, |value| (0.0..=1.0).contains(&value))
    }

    pub(crate) fn non_negative_or(&self, position: usize, default: f64) -> Result<f64, RuleError> {
        self.bounded_or(position, default, |value| value.is_finite() && value >= 0.0)
    }

    pub(crate) fn positive_or(&self, position: usize, default: f64) -> Result<f64, RuleError> {
        self.bounded_or(position, default, |value| value.is_finite() && value > 0.0)
    }

    fn bounded_or(
        &self,
        position: usize,
        default: f64,
        accept: impl Fn(f64) -> bool,
    ) -> Result<f64, RuleError> {
        let value = self.f64_or(position, default)?;
        if accept(value) {
            Ok(value)
        } else {
            Err(self.invalid_argument(position, self.arg(position).unwrap_or_default()))
        }
    }

    pub(crate) fn usize_or(&self, position: usize, default: usize) -> Result<usize, RuleError> {
        match self.arg(position) {
            Some(raw) => raw.parse::<usize>().map_err(|_| self.invalid_number(position, raw)),
            None => Ok(default),
        }
    }

    pub(crate) fn usize_required(&self, position: usize) -> Result<usize, RuleError> {
        let raw = self.required(position)?;
        raw.parse::<usize>()
            .map_err(|_| self.invalid_number(position, raw))
    }

    pub(crate) fn i64_required(&self, position: usize) -> Result<i64, RuleError> {
        let raw = self.required(position)?;
        raw.parse::<i64>()
            .map_err(|_| self.invalid_number(position, raw))
    }

    pub(crate) fn invalid_number(&self, position: usize, raw: &str) -> RuleError {
        RuleError::InvalidNumber {
            spec: self.text.clone(),
            position,
            value: raw.to_string(),
        }
    }

    pub(crate) fn invalid_argument(&self, position: usize, raw: &str) -> RuleError {
        RuleError::InvalidArgument {
            spec: self.text.clone(),
            position,
            value: raw.to_string(),
        }
    }
}

/// A typed match predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Exact,
    ExactIgnoreCase,
    Missing,
    Transpose,
    /// Normalized Levenshtein score at or above the threshold.
    Led(f64),
    /// Q-gram tetrahedral ratio at or above the threshold.
    Qtr(f64),
    Coefficient { kind: Coefficient, threshold: f64 },
    Tversky { threshold: f64, alpha: f64, beta: f64 },
    SmithWaterman(SmithWaterman),
    Phonetic(PhoneticCode),
    SubstrLeft(usize),
    SubstrRight(usize),
    SubstrMid { start: usize, len: usize },
    PSubstr(usize),
    Initial,
    Nickname,
    Scan(ScanSpec),
    PhoneMatch,
    LeadingZero,
    /// Calendar-based date window (`WITHINDAYS`, `WITHINMONTHS`, `WITHINYEARS`).
    Within {
        pattern: DatePattern,
        amount: i64,
        unit: DateUnit,
    },
    /// Millisecond difference divided by a fixed unit divisor.
    DateDiff {
        pattern: DatePattern,
        amount: i64,
        unit: DateUnit,
    },
    Address,
    /// Unrecognized identifier; never matches.
    Unknown(String),
}

impl Predicate {
    fn from_parts(parts: &SpecParts) -> Result<Self, RuleError> {
        let predicate = match parts.name.as_str() {
            "EXACT" => Predicate::Exact,
            "EXACT_IGNORE_CASE" | "EXACTIGNORECASE" => Predicate::ExactIgnoreCase,
            "MISSING" => Predicate::Missing,
            "TRANSPOSE" | "TRANSPOSITION" => Predicate::Transpose,
            "LED" => Predicate::Led(parts.ratio_or(0, DEFAULT_LED_THRESHOLD)?),
            "QTR" => Predicate::Qtr(parts.ratio_or(0, DEFAULT_QTR_THRESHOLD)?),
            "JACCARD" => Predicate::Coefficient {
                kind: Coefficient::Jaccard,
                threshold: parts.ratio_or(0, DEFAULT_COEFFICIENT_THRESHOLD)?,
            },
            "SORENSEN" | "DICE" => Predicate::Coefficient {
                kind: Coefficient::Sorensen,
                threshold: parts.ratio_or(0, DEFAULT_COEFFICIENT_THRESHOLD)?,
            },
            "TANIMOTO" => Predicate::Coefficient {
                kind: Coefficient::Tanimoto,
                threshold: parts.ratio_or(0, DEFAULT_COEFFICIENT_THRESHOLD)?,
            },
            "TVERSKY" => Predicate::Tversky {
                threshold: parts.ratio_or(0, DEFAULT_COEFFICIENT_THRESHOLD)?,
                alpha: parts.non_negative_or(1, DEFAULT_TVERSKY_ALPHA)?,
                beta: parts.non_negative_or(2, DEFAULT_TVERSKY_BETA)?,
            },
            "SMITHWATERMAN" | "SMITH_WATERMAN" => Predicate::SmithWaterman(SmithWaterman {
                match_score: parts.positive_or(0, DEFAULT_SW_MATCH)?,
                mismatch: parts.f64_or(1, DEFAULT_SW_MISMATCH)?,
                gap: parts.f64_or(2, DEFAULT_SW_GAP)?,
                threshold: parts.ratio_or(3, DEFAULT_SW_THRESHOLD)?,
            }),
            "SUBSTRLEFT" => Predicate::SubstrLeft(parts.usize_required(0)?),
            "SUBSTRRIGHT" => Predicate::SubstrRight(parts.usize_required(0)?),
            "SUBSTRMID" => Predicate::SubstrMid {
                start: parts.usize_required(0)?,
                len: parts.usize_required(1)?,
            },
            "PSUBSTR" => Predicate::PSubstr(parts.usize_or(0, 1)?),
            "INITIAL" => Predicate::Initial,
            "NICKNAME" => Predicate::Nickname,
            "SCAN" => Predicate::Scan(ScanSpec::from_parts(parts, 0)?),
            "PHONEMATCH" => Predicate::PhoneMatch,
            "LEADINGZERO" => Predicate::LeadingZero,
            "WITHINDAYS" | "WITHINMONTHS" | "WITHINYEARS" => {
                let unit = match parts.name.as_str() {
                    "WITHINDAYS" => DateUnit::Days,
                    "WITHINMONTHS" => DateUnit::Months,
                    _ => DateUnit::Years,
                };
                Predicate::Within {
                    pattern: DatePattern::new(parts.required(0)?),
                    amount: parts.i64_required(1)?,
                    unit,
                }
            }
            "DATEDIFF" => {
                let raw_unit = parts.required(2)?;
                let unit = DateUnit::parse(raw_unit)
                    .ok_or_else(|| parts.invalid_argument(2, raw_unit))?;
                Predicate::DateDiff {
                    pattern: DatePattern::new(parts.required(0)?),
                    amount: parts.i64_required(1)?,
                    unit,
                }
            }
            "ADDRESS" | "USADDRESS" => Predicate::Address,
            other => match PhoneticCode::from_name(other) {
                Some(code) => Predicate::Phonetic(code),
                None => Predicate::Unknown(other.to_string()),
            },
        };
        Ok(predicate)
    }

    /// Evaluate on two non-blank values.
    fn matches(&self, s: &str, t: &str, nicknames: &NicknameTable) -> bool {
        match self {
            Predicate::Exact => s == t,
            Predicate::ExactIgnoreCase => s.to_lowercase() == t.to_lowercase(),
            Predicate::Missing => false,
            Predicate::Transpose => similarity::is_single_transposition(s, t),
            Predicate::Led(threshold) => similarity::led_score(s, t) >= *threshold,
            Predicate::Qtr(threshold) => similarity::qtr_score(s, t) >= *threshold,
            Predicate::Coefficient { kind, threshold } => kind.score(s, t) >= *threshold,
            Predicate::Tversky {
                threshold,
                alpha,
                beta,
            } => similarity::tversky(s, t, *alpha, *beta) >= *threshold,
            Predicate::SmithWaterman(params) => params.is_match(s, t),
            Predicate::Phonetic(code) => code.is_match(s, t),
            Predicate::SubstrLeft(n) => match (prefix(s, *n), prefix(t, *n)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            Predicate::SubstrRight(n) => match (suffix(s, *n), suffix(t, *n)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            Predicate::SubstrMid { start, len } => {
                match (middle(s, *start, *len), middle(t, *start, *len)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            Predicate::PSubstr(min_len) => proper_substring(s, t, *min_len),
            Predicate::Initial => is_initial(s, t),
            Predicate::Nickname => nicknames.are_aliases(s, t),
            Predicate::Scan(spec) => {
                let left = spec.apply(s);
                !left.is_empty() && left == spec.apply(t)
            }
            Predicate::PhoneMatch => {
                let left = keypad_digits(s);
                !left.is_empty() && left == keypad_digits(t)
            }
            Predicate::LeadingZero => leading_zero_match(s, t),
            Predicate::Within {
                pattern,
                amount,
                unit,
            } => dates::within(pattern, s, t, *amount, *unit),
            Predicate::DateDiff {
                pattern,
                amount,
                unit,
            } => dates::date_diff(pattern, s, t, *amount, *unit),
            Predicate::Address => address::is_match(s, t),
            Predicate::Unknown(_) => false,
        }
    }
}

/// A parsed match specification.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSpec {
    label: String,
    name: String,
    negated: bool,
    predicate: Predicate,
}

impl MatchSpec {
    /// Parse a spec string. Malformed numeric arguments are errors; unknown
    /// identifiers parse into a predicate that never matches.
    pub fn parse(spec: &str) -> Result<Self, RuleError> {
        let parts = SpecParts::parse(spec)?;
        let predicate = Predicate::from_parts(&parts)?;
        Ok(Self {
            label: parts.text,
            name: parts.name,
            negated: parts.negated,
            predicate,
        })
    }

    /// The spec text as configured; returned on a match.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Bare upper-cased identifier without negation or arguments.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Evaluate with the built-in nickname table.
    pub fn evaluate(&self, s: Option<&str>, t: Option<&str>) -> MatchOutcome {
        self.evaluate_with(s, t, NicknameTable::builtin())
    }

    /// Evaluate against two optional values.
    ///
    /// Blank values count as missing. Predicates other than `MISSING` never
    /// fire on a missing operand, negated or not.
    pub fn evaluate_with(
        &self,
        s: Option<&str>,
        t: Option<&str>,
        nicknames: &NicknameTable,
    ) -> MatchOutcome {
        let s = non_blank(s);
        let t = non_blank(t);
        let hit = match (&self.predicate, s, t) {
            (Predicate::Unknown(_), _, _) => return MatchOutcome::NoMatch,
            (Predicate::Missing, s, t) => s.is_none() || t.is_none(),
            (predicate, Some(s), Some(t)) => predicate.matches(s, t, nicknames),
            _ => return MatchOutcome::NoMatch,
        };
        if hit != self.negated {
            MatchOutcome::Match(self.label.clone())
        } else {
            MatchOutcome::NoMatch
        }
    }

    /// Whether the spec fires for the pair.
    pub fn is_match(&self, s: Option<&str>, t: Option<&str>, nicknames: &NicknameTable) -> bool {
        self.evaluate_with(s, t, nicknames).is_match()
    }
}

/// Stateless evaluator over spec strings.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    nicknames: NicknameTable,
}

impl RuleEngine {
    /// Engine using the built-in nickname table.
    pub fn new() -> Self {
        Self {
            nicknames: NicknameTable::builtin().clone(),
        }
    }

    pub fn with_nicknames(nicknames: NicknameTable) -> Self {
        Self { nicknames }
    }

    pub fn nicknames(&self) -> &NicknameTable {
        &self.nicknames
    }

    /// Parse and evaluate in one step.
    pub fn evaluate(
        &self,
        s: Option<&str>,
        t: Option<&str>,
        spec: &str,
    ) -> Result<MatchOutcome, RuleError> {
        let spec = MatchSpec::parse(spec)?;
        Ok(self.evaluate_spec(s, t, &spec))
    }

    pub fn evaluate_spec(&self, s: Option<&str>, t: Option<&str>, spec: &MatchSpec) -> MatchOutcome {
        spec.evaluate_with(s, t, &self.nicknames)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn prefix(value: &str, n: usize) -> Option<String> {
    if n == 0 || value.chars().count() < n {
        return None;
    }
    Some(value.chars().take(n).collect())
}

fn suffix(value: &str, n: usize) -> Option<String> {
    let len = value.chars().count();
    if n == 0 || len < n {
        return None;
    }
    Some(value.chars().skip(len - n).collect())
}

fn middle(value: &str, start: usize, len: usize) -> Option<String> {
    if len == 0 || value.chars().count() < start + len {
        return None;
    }
    Some(value.chars().skip(start).take(len).collect())
}

fn proper_substring(s: &str, t: &str, min_len: usize) -> bool {
    let (short, long) = if s.chars().count() <= t.chars().count() {
        (s, t)
    } else {
        (t, s)
    };
    let short_len = short.chars().count();
    short_len >= min_len.max(1) && short_len < long.chars().count() && long.contains(short)
}

fn is_initial(s: &str, t: &str) -> bool {
    let (initial, full) = match (s.chars().count(), t.chars().count()) {
        (1, n) if n > 1 => (s, t),
        (n, 1) if n > 1 => (t, s),
        _ => return false,
    };
    match (initial.chars().next(), full.chars().next()) {
        (Some(a), Some(b)) => a.to_lowercase().eq(b.to_lowercase()),
        _ => false,
    }
}

/// Map phone keypad letters to digits and drop everything else.
pub fn keypad_digits(value: &str) -> String {
    value
        .chars()
        .filter_map(|ch| match ch.to_ascii_uppercase() {
            digit @ '0'..='9' => Some(digit),
            'A' | 'B' | 'C' => Some('2'),
            'D' | 'E' | 'F' => Some('3'),
            'G' | 'H' | 'I' => Some('4'),
            'J' | 'K' | 'L' => Some('5'),
            'M' | 'N' | 'O' => Some('6'),
            'P' | 'Q' | 'R' | 'S' => Some('7'),
            'T' | 'U' | 'V' => Some('8'),
            'W' | 'X' | 'Y' | 'Z' => Some('9'),
            _ => None,
        })
        .collect()
}

/// One SSN equals the other with a leading zero inserted.
///
/// Covers both the truncated form (`012345678` vs `123456789`, same width)
/// and the padded form (`0123456789` vs `123456789`).
fn leading_zero_match(s: &str, t: &str) -> bool {
    let s: String = s.chars().filter(char::is_ascii_digit).collect();
    let t: String = t.chars().filter(char::is_ascii_digit).collect();
    one_sided_leading_zero(&s, &t) || one_sided_leading_zero(&t, &s)
}

fn one_sided_leading_zero(zeroed: &str, other: &str) -> bool {
    let Some(rest) = zeroed.strip_prefix('0') else {
        return false;
    };
    if rest.is_empty() || other.starts_with('0') {
        return false;
    }
    if zeroed.len() == other.len() {
        other.starts_with(rest)
    } else {
        zeroed.len() == other.len() + 1 && rest == other
    }
}
