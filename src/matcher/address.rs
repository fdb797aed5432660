//! Composite US street-address comparison.
//!
//! Both strings are parsed into house number, directionals, street name,
//! suffix and unit. Eleven sub-field comparisons each score between -1 and
//! +1; the pair matches when the mean exceeds the configured threshold and
//! the house numbers do not contradict each other.

use super::phonetic::PhoneticCode;
use super::similarity::{is_single_transposition, led_score};
use crate::config::defaults::{ADDRESS_MATCH_THRESHOLD, DEFAULT_LED_THRESHOLD};

const SUB_SCORES: f64 = 11.0;

/// A parsed street address. Every component is upper-cased and normalized
/// to its USPS abbreviation where one exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressParts {
    pub house_number: Option<String>,
    pub pre_directional: Option<String>,
    pub street_name: Option<String>,
    pub suffix: Option<String>,
    pub post_directional: Option<String>,
    pub unit_designator: Option<String>,
    pub unit_number: Option<String>,
}

fn directional(token: &str) -> Option<&'static str> {
    let normalized = match token {
        "N" | "NORTH" => "N",
        "S" | "SOUTH" => "S",
        "E" | "EAST" => "E",
        "W" | "WEST" => "W",
        "NE" | "NORTHEAST" => "NE",
        "NW" | "NORTHWEST" => "NW",
        "SE" | "SOUTHEAST" => "SE",
        "SW" | "SOUTHWEST" => "SW",
        _ => return None,
    };
    Some(normalized)
}

fn street_suffix(token: &str) -> Option<&'static str> {
    let normalized = match token {
        "ST" | "STREET" | "STR" => "ST",
        "AVE" | "AV" | "AVENUE" | "AVEN" => "AVE",
        "RD" | "ROAD" => "RD",
        "DR" | "DRIVE" | "DRV" => "DR",
        "BLVD" | "BOULEVARD" | "BOUL" => "BLVD",
        "LN" | "LANE" => "LN",
        "CT" | "COURT" => "CT",
        "PL" | "PLACE" => "PL",
        "TER" | "TERRACE" | "TERR" => "TER",
        "CIR" | "CIRCLE" => "CIR",
        "PKWY" | "PARKWAY" | "PKY" => "PKWY",
        "HWY" | "HIGHWAY" => "HWY",
        "WAY" | "WY" => "WAY",
        "TRL" | "TRAIL" => "TRL",
        "SQ" | "SQUARE" => "SQ",
        "LOOP" => "LOOP",
        "ALY" | "ALLEY" => "ALY",
        "PIKE" => "PIKE",
        "RUN" => "RUN",
        "XING" | "CROSSING" => "XING",
        _ => return None,
    };
    Some(normalized)
}

fn unit_designator(token: &str) -> Option<&'static str> {
    let normalized = match token {
        "#" => "#",
        "APT" | "APARTMENT" => "APT",
        "STE" | "SUITE" => "STE",
        "UNIT" => "UNIT",
        "FL" | "FLOOR" => "FL",
        "RM" | "ROOM" => "RM",
        "BLDG" | "BUILDING" => "BLDG",
        "DEPT" | "DEPARTMENT" => "DEPT",
        "LOT" => "LOT",
        "SPC" | "SPACE" => "SPC",
        "TRLR" | "TRAILER" => "TRLR",
        "PH" | "PENTHOUSE" => "PH",
        _ => return None,
    };
    Some(normalized)
}

fn tokenize(raw: &str) -> Vec<String> {
    let mut spaced = String::with_capacity(raw.len() + 4);
    for ch in raw.chars() {
        match ch {
            '#' => spaced.push_str(" # "),
            ',' | '.' | ';' => spaced.push(' '),
            other => spaced.extend(other.to_uppercase()),
        }
    }
    spaced.split_whitespace().map(str::to_string).collect()
}

impl AddressParts {
    pub fn parse(raw: &str) -> Self {
        let mut tokens = tokenize(raw);
        let mut parts = AddressParts::default();

        // "APT 4 123 MAIN ST" reads the unit first; move it to the end.
        if tokens.len() > 2 && unit_designator(&tokens[0]).is_some() {
            let unit: Vec<String> = tokens.drain(..2).collect();
            tokens.extend(unit);
        }

        let mut start = 0;
        let mut end = tokens.len();

        if end > start && tokens[start].starts_with(|ch: char| ch.is_ascii_digit()) {
            parts.house_number = Some(tokens[start].clone());
            start += 1;
        }

        if end >= start + 2 {
            if let Some(designator) = unit_designator(&tokens[end - 2]) {
                parts.unit_designator = Some(designator.to_string());
                parts.unit_number = Some(tokens[end - 1].clone());
                end -= 2;
            }
        }

        if end > start + 1 {
            if let Some(direction) = directional(&tokens[start]) {
                parts.pre_directional = Some(direction.to_string());
                start += 1;
            }
        }
        if end > start + 1 {
            if let Some(direction) = directional(&tokens[end - 1]) {
                parts.post_directional = Some(direction.to_string());
                end -= 1;
            }
        }
        if end > start + 1 {
            if let Some(suffix) = street_suffix(&tokens[end - 1]) {
                parts.suffix = Some(suffix.to_string());
                end -= 1;
            }
        }
        if end > start {
            parts.street_name = Some(tokens[start..end].join(" "));
        }
        parts
    }

    fn full_street(&self) -> String {
        [
            self.pre_directional.as_deref(),
            self.street_name.as_deref(),
            self.suffix.as_deref(),
            self.post_directional.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// +1 equal, -1 different, 0 when either side is absent.
fn exact_score(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a == b => 1.0,
        (Some(_), Some(_)) => -1.0,
        _ => 0.0,
    }
}

/// Like [`exact_score`] with half credit for a single transposition.
fn transposed_score(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a == b => 1.0,
        (Some(a), Some(b)) if is_single_transposition(a, b) => 0.5,
        (Some(_), Some(_)) => -1.0,
        _ => 0.0,
    }
}

fn phonetic_score(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if PhoneticCode::Soundex.is_match(a, b) => 1.0,
        (Some(_), Some(_)) => -1.0,
        _ => 0.0,
    }
}

fn ratio_score(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) => {
            let score = led_score(a, b);
            if score >= DEFAULT_LED_THRESHOLD {
                1.0
            } else if score >= 0.5 {
                0.5
            } else {
                -0.5
            }
        }
        _ => 0.0,
    }
}

/// A `#` designator is compatible with any named designator.
fn designator_score(a: Option<&str>, b: Option<&str>) -> f64 {
    match (a, b) {
        (Some(a), Some(b)) if a == b => 1.0,
        (Some("#"), Some(_)) | (Some(_), Some("#")) => 0.5,
        (Some(_), Some(_)) => -0.5,
        _ => 0.0,
    }
}

/// Half credit when one side writes the direction before the street and the
/// other after it.
fn swapped_directional_score(left: &AddressParts, right: &AddressParts) -> f64 {
    let crossed = |a: &AddressParts, b: &AddressParts| {
        a.pre_directional.is_some()
            && a.post_directional.is_none()
            && b.pre_directional.is_none()
            && a.pre_directional == b.post_directional
    };
    if crossed(left, right) || crossed(right, left) {
        0.5
    } else {
        0.0
    }
}

/// Score two parsed addresses; the result lies in `[-1, 1]`.
pub fn score(left: &AddressParts, right: &AddressParts) -> f64 {
    let street = (left.street_name.as_deref(), right.street_name.as_deref());
    let full_left = left.full_street();
    let full_right = right.full_street();
    let full = (
        Some(full_left.as_str()).filter(|s| !s.is_empty()),
        Some(full_right.as_str()).filter(|s| !s.is_empty()),
    );

    let scores = [
        transposed_score(left.house_number.as_deref(), right.house_number.as_deref()),
        exact_score(left.pre_directional.as_deref(), right.pre_directional.as_deref()),
        exact_score(street.0, street.1),
        phonetic_score(street.0, street.1),
        ratio_score(street.0, street.1),
        exact_score(left.suffix.as_deref(), right.suffix.as_deref()),
        exact_score(left.post_directional.as_deref(), right.post_directional.as_deref()),
        designator_score(left.unit_designator.as_deref(), right.unit_designator.as_deref()),
        transposed_score(left.unit_number.as_deref(), right.unit_number.as_deref()),
        swapped_directional_score(left, right),
        exact_score(full.0, full.1),
    ];
    scores.iter().sum::<f64>() / SUB_SCORES
}

/// Match when the normalized sub-field total exceeds the threshold.
pub fn is_match(s: &str, t: &str) -> bool {
    score(&AddressParts::parse(s), &AddressParts::parse(t)) > ADDRESS_MATCH_THRESHOLD
}
