//! # Ontology Module
//!
//! Defines the resolution rules: identity rules that decide whether two
//! records describe the same entity, and index rules that derive blocking
//! keys from a record.

use crate::config::defaults::{KEY_SEGMENT_SEPARATOR, MAX_KEY_VALUES_PER_ATTR};
use crate::config::{IndexRuleConfig, MatchRuleConfig};
use crate::error::{ResolveError, RuleError};
use crate::matcher::nickname::NicknameTable;
use crate::matcher::phonetic::PhoneticCode;
use crate::matcher::scan::ScanSpec;
use crate::matcher::{MatchSpec, RuleEngine, SpecParts};
use crate::model::{split_values, AttrTag, IdentityRecord, Schema};
use std::collections::BTreeSet;
use std::fmt;

/// One `(attribute, match spec)` condition of an identity rule.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchTerm {
    /// Attribute name as configured
    pub attribute: String,
    /// Resolved schema tag
    pub tag: AttrTag,
    /// Parsed match specification
    pub spec: MatchSpec,
}

impl MatchTerm {
    /// Create a term, resolving the attribute and parsing the spec
    pub fn new(schema: &Schema, attribute: &str, spec: &str) -> Result<Self, ResolveError> {
        let tag = schema
            .tag_of(attribute)
            .ok_or_else(|| ResolveError::UnknownAttribute(attribute.to_string()))?;
        Ok(Self {
            attribute: attribute.to_string(),
            tag,
            spec: MatchSpec::parse(spec)?,
        })
    }

    /// Evaluate the term on two records.
    ///
    /// Multi-valued attributes match when any pair of sub-values matches.
    /// When either side has no value the spec sees a missing operand.
    pub fn evaluate(
        &self,
        left: &IdentityRecord,
        right: &IdentityRecord,
        nicknames: &NicknameTable,
    ) -> bool {
        let left_values = left.get_tag(self.tag).map(split_values).unwrap_or_default();
        let right_values = right.get_tag(self.tag).map(split_values).unwrap_or_default();
        if left_values.is_empty() || right_values.is_empty() {
            return self.spec.is_match(
                left_values.first().copied(),
                right_values.first().copied(),
                nicknames,
            );
        }
        left_values.iter().any(|s| {
            right_values
                .iter()
                .any(|t| self.spec.is_match(Some(s), Some(t), nicknames))
        })
    }
}

/// A conjunction of match terms; fires when every term matches
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityRule {
    /// Rule identifier recorded in traces
    pub id: String,
    /// Terms that must all match
    pub terms: Vec<MatchTerm>,
}

impl IdentityRule {
    /// Create an identity rule from `(attribute, spec)` pairs
    pub fn new<I, A, S>(schema: &Schema, id: &str, terms: I) -> Result<Self, ResolveError>
    where
        I: IntoIterator<Item = (A, S)>,
        A: AsRef<str>,
        S: AsRef<str>,
    {
        let terms = terms
            .into_iter()
            .map(|(attribute, spec)| MatchTerm::new(schema, attribute.as_ref(), spec.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: id.to_string(),
            terms,
        })
    }

    /// Whether the rule fires for a pair of records
    pub fn fires(
        &self,
        left: &IdentityRecord,
        right: &IdentityRecord,
        nicknames: &NicknameTable,
    ) -> bool {
        !self.terms.is_empty()
            && self
                .terms
                .iter()
                .all(|term| term.evaluate(left, right, nicknames))
    }
}

/// Hash function applied to one attribute of an index rule
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexHash {
    /// Upper-cased raw value
    Exact,
    Soundex,
    /// First Daitch-Mokotoff code only
    DmSoundex,
    IbmAlphaCode,
    Nysiis,
    Scan(ScanSpec),
}

impl IndexHash {
    /// Hash a single value; `None` when nothing encodes.
    pub fn apply(&self, value: &str) -> Option<String> {
        let hashed = match self {
            IndexHash::Exact => value.trim().to_uppercase(),
            IndexHash::Soundex => PhoneticCode::Soundex.encode(value),
            IndexHash::DmSoundex => PhoneticCode::DmSoundex.encode(value),
            IndexHash::IbmAlphaCode => PhoneticCode::IbmAlphaCode.encode(value),
            IndexHash::Nysiis => PhoneticCode::Nysiis.encode(value),
            IndexHash::Scan(spec) => spec.apply(value),
        };
        if hashed.is_empty() {
            None
        } else {
            Some(hashed)
        }
    }
}

impl fmt::Display for IndexHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexHash::Exact => f.write_str("EXACT"),
            IndexHash::Soundex => f.write_str("SOUNDEX"),
            IndexHash::DmSoundex => f.write_str("DMSOUNDEX"),
            IndexHash::IbmAlphaCode => f.write_str("IBMALPHACODE"),
            IndexHash::Nysiis => f.write_str("NYSIIS"),
            IndexHash::Scan(_) => f.write_str("SCAN"),
        }
    }
}

/// One `(attribute, hash)` segment of an index rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSegment {
    pub attribute: String,
    pub tag: AttrTag,
    pub hash: IndexHash,
    /// Keep only this many characters of the hashed value
    pub truncate: Option<usize>,
}

impl IndexSegment {
    /// Parse a segment from an attribute name and a hash spec such as
    /// `SOUNDEX`, `NYSIIS(4)` or `SCAN(LR,DIGIT,4,KeepCase,SameOrder)`.
    pub fn new(schema: &Schema, attribute: &str, hash: &str) -> Result<Self, ResolveError> {
        let tag = schema
            .tag_of(attribute)
            .ok_or_else(|| ResolveError::UnknownAttribute(attribute.to_string()))?;
        let parts = SpecParts::parse(hash)?;
        let (hash, truncate) = match parts.name.as_str() {
            "EXACT" => (IndexHash::Exact, parts.arg(0)),
            "SOUNDEX" => (IndexHash::Soundex, parts.arg(0)),
            "DMSOUNDEX" => (IndexHash::DmSoundex, parts.arg(0)),
            "IBMALPHACODE" | "ALPHACODE" => (IndexHash::IbmAlphaCode, parts.arg(0)),
            "NYSIIS" => (IndexHash::Nysiis, parts.arg(0)),
            "SCAN" => (IndexHash::Scan(ScanSpec::from_parts(&parts, 0)?), parts.arg(5)),
            other => return Err(RuleError::UnknownHash(other.to_string()).into()),
        };
        let position = if matches!(hash, IndexHash::Scan(_)) { 5 } else { 0 };
        let truncate = match truncate {
            Some(raw) => Some(
                raw.parse::<usize>()
                    .map_err(|_| parts.invalid_number(position, raw))?,
            ),
            None => None,
        };
        Ok(Self {
            attribute: attribute.to_string(),
            tag,
            hash,
            truncate,
        })
    }

    /// Hashed values of every sub-value, deduplicated, bounded per attribute.
    fn hashed_values(&self, record: &IdentityRecord) -> Vec<String> {
        let mut hashed: Vec<String> = Vec::new();
        let Some(value) = record.get_tag(self.tag) else {
            return hashed;
        };
        for part in split_values(value).into_iter().take(MAX_KEY_VALUES_PER_ATTR) {
            let Some(mut code) = self.hash.apply(part) else {
                continue;
            };
            if let Some(limit) = self.truncate {
                code = code.chars().take(limit).collect();
            }
            if !code.is_empty() && !hashed.contains(&code) {
                hashed.push(code);
            }
        }
        hashed
    }
}

/// An ordered list of segments whose hashed values form a blocking key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRule {
    pub id: String,
    pub segments: Vec<IndexSegment>,
}

impl IndexRule {
    /// Create an index rule from `(attribute, hash spec)` pairs
    pub fn new<I, A, H>(schema: &Schema, id: &str, segments: I) -> Result<Self, ResolveError>
    where
        I: IntoIterator<Item = (A, H)>,
        A: AsRef<str>,
        H: AsRef<str>,
    {
        let segments = segments
            .into_iter()
            .map(|(attribute, hash)| IndexSegment::new(schema, attribute.as_ref(), hash.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: id.to_string(),
            segments,
        })
    }

    /// Keys this rule derives for a record.
    ///
    /// A segment without a usable value yields no key at all. Multi-valued
    /// attributes contribute one key per combination of sub-values.
    pub fn keys_for(&self, record: &IdentityRecord) -> Vec<String> {
        if self.segments.is_empty() {
            return Vec::new();
        }
        let mut keys = vec![self.id.clone()];
        for segment in &self.segments {
            let hashed = segment.hashed_values(record);
            if hashed.is_empty() {
                return Vec::new();
            }
            keys = keys
                .iter()
                .flat_map(|prefix| {
                    hashed
                        .iter()
                        .map(move |code| format!("{prefix}{KEY_SEGMENT_SEPARATOR}{code}"))
                })
                .collect();
        }
        keys
    }
}

/// Every identity and index rule of a run, plus the evaluator they share
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub identity_rules: Vec<IdentityRule>,
    pub index_rules: Vec<IndexRule>,
    engine: RuleEngine,
}

impl RuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build rules from configuration; any malformed spec fails the whole set
    pub fn from_config(
        schema: &Schema,
        matching: &[MatchRuleConfig],
        blocking: &[IndexRuleConfig],
        engine: RuleEngine,
    ) -> Result<Self, ResolveError> {
        let identity_rules = matching
            .iter()
            .map(|rule| {
                IdentityRule::new(
                    schema,
                    &rule.id,
                    rule.terms.iter().map(|term| (&term.attribute, &term.spec)),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let index_rules = blocking
            .iter()
            .map(|rule| {
                IndexRule::new(
                    schema,
                    &rule.id,
                    rule.segments
                        .iter()
                        .map(|segment| (&segment.attribute, &segment.hash)),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            identity_rules,
            index_rules,
            engine,
        })
    }

    /// Add an identity rule
    pub fn add_identity_rule(&mut self, rule: IdentityRule) {
        self.identity_rules.push(rule);
    }

    /// Add an index rule
    pub fn add_index_rule(&mut self, rule: IndexRule) {
        self.index_rules.push(rule);
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    /// Ids of every identity rule that fires for the pair
    pub fn fired_rules(&self, left: &IdentityRecord, right: &IdentityRecord) -> BTreeSet<String> {
        let nicknames = self.engine.nicknames();
        self.identity_rules
            .iter()
            .filter(|rule| rule.fires(left, right, nicknames))
            .map(|rule| rule.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Encoding, REF_ID};
    use std::sync::Arc;

    fn schema() -> Arc<Schema> {
        Schema::new(["first", "last", "ssn", "phone"]).unwrap()
    }

    fn record(schema: &Arc<Schema>, fields: &[(&str, &str)]) -> IdentityRecord {
        IdentityRecord::from_fields(Arc::clone(schema), Encoding::Tagged, fields.iter().copied())
            .unwrap()
    }

    #[test]
    fn test_identity_rule_is_conjunctive() {
        let schema = schema();
        let rule = IdentityRule::new(&schema, "R1", [("first", "NICKNAME"), ("last", "EXACT")])
            .unwrap();
        let a = record(&schema, &[(REF_ID, "a"), ("first", "Bill"), ("last", "Smith")]);
        let b = record(&schema, &[(REF_ID, "b"), ("first", "William"), ("last", "Smith")]);
        let c = record(&schema, &[(REF_ID, "c"), ("first", "William"), ("last", "Smyth")]);
        let nicknames = NicknameTable::builtin();
        assert!(rule.fires(&a, &b, nicknames));
        assert!(!rule.fires(&a, &c, nicknames));
    }

    #[test]
    fn test_multi_valued_terms_match_any_pair() {
        let schema = schema();
        let rule = IdentityRule::new(&schema, "SSN", [("ssn", "EXACT")]).unwrap();
        let a = record(&schema, &[(REF_ID, "a"), ("ssn", "111|222")]);
        let b = record(&schema, &[(REF_ID, "b"), ("ssn", "222")]);
        assert!(rule.fires(&a, &b, NicknameTable::builtin()));
    }

    #[test]
    fn test_rule_errors_surface_at_build_time() {
        let schema = schema();
        assert!(matches!(
            IdentityRule::new(&schema, "R", [("first", "LED(x)")]),
            Err(ResolveError::Rule(RuleError::InvalidNumber { .. }))
        ));
        assert!(matches!(
            IdentityRule::new(&schema, "R", [("middle", "EXACT")]),
            Err(ResolveError::UnknownAttribute(_))
        ));
        assert!(matches!(
            IndexRule::new(&schema, "K", [("last", "METAPHONE")]),
            Err(ResolveError::Rule(RuleError::UnknownHash(_)))
        ));
    }

    #[test]
    fn test_index_keys_are_never_partial() {
        let schema = schema();
        let rule = IndexRule::new(&schema, "K1", [("last", "SOUNDEX"), ("first", "EXACT(1)")])
            .unwrap();
        let full = record(&schema, &[(REF_ID, "a"), ("first", "john"), ("last", "Smith")]);
        let partial = record(&schema, &[(REF_ID, "b"), ("last", "Smith")]);
        let sep = KEY_SEGMENT_SEPARATOR;
        assert_eq!(rule.keys_for(&full), vec![format!("K1{sep}S530{sep}J")]);
        assert!(rule.keys_for(&partial).is_empty());
    }

    #[test]
    fn test_scan_hash_and_multi_valued_keys() {
        let schema = schema();
        let rule = IndexRule::new(
            &schema,
            "PH",
            [("phone", "SCAN(RL,DIGIT,4,KeepCase,SameOrder)")],
        )
        .unwrap();
        let a = record(&schema, &[(REF_ID, "a"), ("phone", "555-1234|(555) 999-8888")]);
        assert_eq!(rule.keys_for(&a).len(), 2);
    }

    #[test]
    fn test_fired_rules_collects_ids() {
        let schema = schema();
        let mut rules = RuleSet::new();
        rules.add_identity_rule(IdentityRule::new(&schema, "A", [("last", "EXACT")]).unwrap());
        rules.add_identity_rule(IdentityRule::new(&schema, "B", [("last", "SOUNDEX")]).unwrap());
        rules.add_identity_rule(IdentityRule::new(&schema, "C", [("ssn", "EXACT")]).unwrap());
        let a = record(&schema, &[(REF_ID, "a"), ("last", "Smith")]);
        let b = record(&schema, &[(REF_ID, "b"), ("last", "Smith")]);
        let fired: Vec<String> = rules.fired_rules(&a, &b).into_iter().collect();
        assert_eq!(fired, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_dm_soundex_hash_uses_primary_code() {
        assert_eq!(IndexHash::DmSoundex.apply("Moskowitz").as_deref(), Some("645740"));
        assert_eq!(IndexHash::Soundex.apply("123"), None);
    }
}
