//! Phonetic and hash codes.
//!
//! Everything except the IBM alpha code is delegated to `rphonetic`.

use rphonetic::{
    Caverphone1, Caverphone2, DaitchMokotoffSoundex, DoubleMetaphone, Encoder,
    MatchRatingApproach, Metaphone, Nysiis, Soundex,
};
use std::sync::OnceLock;

/// Phonetic algorithms usable as match predicates and index hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhoneticCode {
    Soundex,
    DmSoundex,
    Nysiis,
    IbmAlphaCode,
    MatchRating,
    Caverphone1,
    Caverphone2,
    Metaphone,
    DoubleMetaphone,
}

impl PhoneticCode {
    pub fn from_name(name: &str) -> Option<Self> {
        let code = match name.to_ascii_uppercase().as_str() {
            "SOUNDEX" => PhoneticCode::Soundex,
            "DMSOUNDEX" | "DAITCHMOKOTOFF" => PhoneticCode::DmSoundex,
            "NYSIIS" => PhoneticCode::Nysiis,
            "IBMALPHACODE" | "ALPHACODE" => PhoneticCode::IbmAlphaCode,
            "MATCHRATING" | "MRA" => PhoneticCode::MatchRating,
            "CAVERPHONE" | "CAVERPHONE1" => PhoneticCode::Caverphone1,
            "CAVERPHONE2" => PhoneticCode::Caverphone2,
            "METAPHONE" => PhoneticCode::Metaphone,
            "DOUBLEMETAPHONE" | "DMETAPHONE" => PhoneticCode::DoubleMetaphone,
            _ => return None,
        };
        Some(code)
    }

    /// All codes for a value. Only Daitch-Mokotoff can produce more than one.
    pub fn codes(self, value: &str) -> Vec<String> {
        let letters = letters_only(value);
        if letters.is_empty() {
            return Vec::new();
        }
        if self == PhoneticCode::DmSoundex {
            return dm_soundex().inner_soundex(&letters, true);
        }
        non_empty(self.encode_letters(&letters))
    }

    /// The primary code for a value; empty when nothing encodes.
    ///
    /// Daitch-Mokotoff yields its unbranched code, so the result does not
    /// depend on branch order.
    pub fn encode(self, value: &str) -> String {
        let letters = letters_only(value);
        if letters.is_empty() {
            return String::new();
        }
        self.encode_letters(&letters)
    }

    /// Match when the code sets intersect.
    pub fn is_match(self, s: &str, t: &str) -> bool {
        let left = self.codes(s);
        if left.is_empty() {
            return false;
        }
        let right = self.codes(t);
        left.iter().any(|code| right.contains(code))
    }

    fn encode_letters(self, letters: &str) -> String {
        match self {
            PhoneticCode::DmSoundex => dm_soundex()
                .inner_soundex(letters, false)
                .into_iter()
                .next()
                .unwrap_or_default(),
            PhoneticCode::Soundex => Soundex::default().encode(letters),
            PhoneticCode::Nysiis => Nysiis::default().encode(letters),
            PhoneticCode::Metaphone => Metaphone::default().encode(letters),
            PhoneticCode::DoubleMetaphone => DoubleMetaphone::default().encode(letters),
            PhoneticCode::MatchRating => MatchRatingApproach.encode(letters),
            PhoneticCode::Caverphone1 => Caverphone1.encode(letters),
            PhoneticCode::Caverphone2 => Caverphone2.encode(letters),
            PhoneticCode::IbmAlphaCode => ibm_alpha_code(letters),
        }
    }
}

/// Shared encoder; building one parses the embedded rule table.
fn dm_soundex() -> &'static DaitchMokotoffSoundex {
    static ENCODER: OnceLock<DaitchMokotoffSoundex> = OnceLock::new();
    ENCODER.get_or_init(DaitchMokotoffSoundex::default)
}

fn non_empty(code: String) -> Vec<String> {
    if code.is_empty() {
        Vec::new()
    } else {
        vec![code]
    }
}

fn letters_only(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

// ---------------------------------------------------------------------------
// IBM alpha code
// ---------------------------------------------------------------------------

const ALPHA_CODE_LEN: usize = 14;

/// Consonant skeleton code in the style of IBM's alpha inquiry system.
///
/// Silent leading groups are reduced, the first letter is kept, later vowels
/// and `H`/`W`/`Y` are dropped, sound-alike consonants are folded together and
/// doubled letters collapse.
pub fn ibm_alpha_code(letters: &str) -> String {
    let mut word = letters.to_string();
    for (from, to) in [
        ("WR", "R"),
        ("KN", "N"),
        ("GN", "N"),
        ("PN", "N"),
        ("PS", "S"),
        ("WH", "W"),
        ("AE", "E"),
    ] {
        if let Some(rest) = word.strip_prefix(from) {
            word = format!("{to}{rest}");
            break;
        }
    }
    if let Some(rest) = word.strip_prefix('X') {
        word = format!("S{rest}");
    }
    for (from, to) in [("SCH", "SK"), ("TCH", "CH"), ("PH", "F"), ("CK", "K"), ("DG", "G")] {
        word = word.replace(from, to);
    }

    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let mut code = String::from(first);
    let mut last = fold_consonant(first);
    for ch in chars {
        if matches!(ch, 'A' | 'E' | 'I' | 'O' | 'U' | 'H' | 'W' | 'Y') {
            last = None;
            continue;
        }
        let folded = fold_consonant(ch);
        if folded != last {
            if let Some(folded) = folded {
                code.push(folded);
            }
        }
        last = folded;
        if code.len() >= ALPHA_CODE_LEN {
            break;
        }
    }
    code
}

fn fold_consonant(ch: char) -> Option<char> {
    match ch {
        'A' | 'E' | 'I' | 'O' | 'U' | 'H' | 'W' | 'Y' => None,
        'C' | 'K' | 'Q' => Some('K'),
        'V' => Some('F'),
        'Z' => Some('S'),
        'J' => Some('G'),
        'D' => Some('T'),
        'B' => Some('P'),
        other => Some(other),
    }
}
