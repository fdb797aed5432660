use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use crate::config::{
    BlockingConfig, IndexRuleConfig, MatchRuleConfig, MatchingConfig, ResolverConfig,
    SegmentConfig, TermConfig,
};
use crate::model::{Encoding, IdentityRecord, Schema, REF_ID};

const FIRST_NAMES: [&str; 12] = [
    "William", "Robert", "Catherine", "Elizabeth", "James", "Margaret", "Thomas", "Jennifer",
    "Michael", "Patricia", "Richard", "Susan",
];
const NICKNAMES: [&str; 12] = [
    "Bill", "Bob", "Kate", "Liz", "Jim", "Peggy", "Tom", "Jenny", "Mike", "Pat", "Rick", "Sue",
];
const LAST_NAMES: [&str; 10] = [
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Miller", "Davis", "Garcia", "Wilson",
    "Anderson",
];

pub const PERSON_ATTRIBUTES: [&str; 5] = ["first", "last", "ssn", "dob", "phone"];

/// Configuration resolving the generated people: SSN, or first name
/// (exact or nickname) with a phonetic last name and date of birth.
pub fn default_config() -> ResolverConfig {
    let term = |attribute: &str, spec: &str| TermConfig {
        attribute: attribute.to_string(),
        spec: spec.to_string(),
    };
    let segment = |attribute: &str, hash: &str| SegmentConfig {
        attribute: attribute.to_string(),
        hash: hash.to_string(),
    };
    ResolverConfig {
        attributes: PERSON_ATTRIBUTES.iter().map(|a| a.to_string()).collect(),
        blocking: BlockingConfig {
            rules: vec![
                IndexRuleConfig {
                    id: "ssn".to_string(),
                    segments: vec![segment("ssn", "SCAN(LR,DIGIT,9,KeepCase,SameOrder)")],
                },
                IndexRuleConfig {
                    id: "name".to_string(),
                    segments: vec![segment("last", "SOUNDEX"), segment("dob", "EXACT")],
                },
            ],
            ..Default::default()
        },
        matching: MatchingConfig {
            rules: vec![
                MatchRuleConfig {
                    id: "SSN".to_string(),
                    terms: vec![term("ssn", "SCAN(LR,DIGIT,9,KeepCase,SameOrder)")],
                },
                MatchRuleConfig {
                    id: "NAME_DOB".to_string(),
                    terms: vec![
                        term("first", "EXACT_IGNORE_CASE"),
                        term("last", "SOUNDEX"),
                        term("dob", "EXACT"),
                    ],
                },
                MatchRuleConfig {
                    id: "NICK_DOB".to_string(),
                    terms: vec![
                        term("first", "NICKNAME"),
                        term("last", "EXACT_IGNORE_CASE"),
                        term("dob", "EXACT"),
                    ],
                },
            ],
        },
        ..Default::default()
    }
}

/// Generate `count` people with RefIDs `p000001..`; with probability
/// `duplicate_probability` a record restates an earlier person with noise.
pub fn generate_people(
    schema: &Arc<Schema>,
    count: usize,
    duplicate_probability: f64,
    seed: u64,
) -> Vec<IdentityRecord> {
    generate_batch(schema, 1, count, duplicate_probability, seed)
}

/// Like [`generate_people`], starting at RefID number `start_id`
pub fn generate_batch(
    schema: &Arc<Schema>,
    start_id: usize,
    count: usize,
    duplicate_probability: f64,
    seed: u64,
) -> Vec<IdentityRecord> {
    let mut rng = StdRng::seed_from_u64(seed ^ start_id as u64);
    let mut people: Vec<[String; 5]> = Vec::with_capacity(count);
    let mut records = Vec::with_capacity(count);

    for offset in 0..count {
        let id = start_id + offset;
        let fields = if !people.is_empty() && rng.random_bool(duplicate_probability) {
            let original = people[rng.random_range(0..people.len())].clone();
            noisy_copy(&mut rng, original)
        } else {
            let person = random_person(&mut rng);
            people.push(person.clone());
            person
        };

        let ref_id = format!("p{id:06}");
        let pairs = std::iter::once((REF_ID, ref_id.as_str()))
            .chain(PERSON_ATTRIBUTES.iter().copied().zip(fields.iter().map(String::as_str)));
        if let Ok(record) = IdentityRecord::from_fields(Arc::clone(schema), Encoding::Tagged, pairs) {
            records.push(record);
        }
    }
    records
}

fn random_person(rng: &mut StdRng) -> [String; 5] {
    let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())].to_string();
    let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())].to_string();
    let ssn = format!(
        "{:03}-{:02}-{:04}",
        rng.random_range(100..899),
        rng.random_range(10..99),
        rng.random_range(1000..9999)
    );
    let dob = format!(
        "{:02}/{:02}/{}",
        rng.random_range(1..=12),
        rng.random_range(1..=28),
        rng.random_range(1940..2005)
    );
    let phone = format!("555-{:04}", rng.random_range(1000..9999));
    [first, last, ssn, dob, phone]
}

fn noisy_copy(rng: &mut StdRng, mut person: [String; 5]) -> [String; 5] {
    match rng.random_range(0..4) {
        // nickname
        0 => {
            if let Some(pos) = FIRST_NAMES.iter().position(|name| *name == person[0]) {
                person[0] = NICKNAMES[pos].to_string();
            }
        }
        // drop the SSN
        1 => person[2].clear(),
        // SSN without punctuation
        2 => person[2] = person[2].replace('-', ""),
        // new phone
        _ => person[4] = format!("555-{:04}", rng.random_range(1000..9999)),
    }
    person
}
