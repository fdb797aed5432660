//! # Data Model
//!
//! Core data structures for entity resolution: the attribute schema shared by
//! every record, identity records with two interchangeable storage encodings,
//! and the audit traces that follow records between clusters and runs.

use crate::error::{ResolveError, RuleError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Reserved attribute holding the record identifier.
pub const REF_ID: &str = "@RefID";
/// Reserved attribute holding the resolved cluster identifier.
pub const CLUSTER_ID: &str = "@OysterID";
/// Separator between the sub-values of a multi-valued attribute.
pub const VALUE_DELIMITER: char = '|';
const VALUE_DELIMITER_STR: &str = "|";

/// Record identifiers are the raw `@RefID` strings from the input.
pub type RefId = String;

/// Identifier of one batch execution of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub u32);

impl RunId {
    /// The run immediately before this one, if any.
    pub fn previous(self) -> Option<RunId> {
        self.0.checked_sub(1).map(RunId)
    }

    pub fn next(self) -> RunId {
        RunId(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for clusters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub String);

impl ClusterId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClusterId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Compact identifier for attributes: the attribute's position in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttrTag(pub u16);

impl fmt::Display for AttrTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// Immutable tag↔name registry for record attributes.
///
/// Built once per pipeline and shared by every record through an `Arc`.
/// `@RefID` and `@OysterID` always occupy the first two tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    names: Vec<String>,
    codes: Vec<String>,
    by_name: HashMap<String, AttrTag>,
}

impl Schema {
    /// Create a schema from user attributes, in the order given.
    ///
    /// Duplicate names and the reserved attributes are ignored in the input;
    /// the reserved attributes are always present. Fails when the tags would
    /// not fit in a `u16`.
    pub fn new<I, S>(attributes: I) -> Result<Arc<Self>, RuleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = vec![REF_ID.to_string(), CLUSTER_ID.to_string()];
        let mut seen: HashSet<String> = names.iter().cloned().collect();
        for attr in attributes {
            let attr = attr.as_ref().trim();
            if !attr.is_empty() && seen.insert(attr.to_string()) {
                names.push(attr.to_string());
            }
        }
        Self::from_names(names).map(Arc::new)
    }

    fn from_names(names: Vec<String>) -> Result<Self, RuleError> {
        let by_name = names
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                u16::try_from(idx)
                    .map(|tag| (name.clone(), AttrTag(tag)))
                    .map_err(|_| RuleError::TooManyAttributes(names.len()))
            })
            .collect::<Result<_, _>>()?;
        let codes = (0..names.len()).map(tag_code).collect();
        Ok(Self {
            names,
            codes,
            by_name,
        })
    }

    pub fn ref_tag(&self) -> AttrTag {
        AttrTag(0)
    }

    pub fn cluster_tag(&self) -> AttrTag {
        AttrTag(1)
    }

    /// Whether a tag names one of the reserved `@` attributes.
    pub fn is_special(&self, tag: AttrTag) -> bool {
        tag.0 < 2
    }

    pub fn tag_of(&self, name: &str) -> Option<AttrTag> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, tag: AttrTag) -> Option<&str> {
        self.names.get(tag.0 as usize).map(String::as_str)
    }

    /// Short output code for a tag (`A`, `B`, ..., `Z`, `AA`, ...).
    pub fn code_of(&self, tag: AttrTag) -> Option<&str> {
        self.codes.get(tag.0 as usize).map(String::as_str)
    }

    /// All attributes in tag order.
    pub fn attributes(&self) -> impl Iterator<Item = (AttrTag, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(idx, name)| (AttrTag(idx as u16), name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn require(&self, name: &str) -> Result<AttrTag, ResolveError> {
        self.tag_of(name)
            .ok_or_else(|| ResolveError::UnknownAttribute(name.to_string()))
    }
}

fn tag_code(mut idx: usize) -> String {
    let mut code = Vec::new();
    loop {
        code.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    code.reverse();
    String::from_utf8(code).unwrap_or_default()
}

/// Audit record of the cluster, run, and rules behind a record's placement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Trace {
    pub cluster_id: ClusterId,
    pub run_id: RunId,
    pub rules: BTreeSet<String>,
}

impl Trace {
    pub fn new<I, S>(cluster_id: ClusterId, run_id: RunId, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cluster_id,
            run_id,
            rules: rules.into_iter().map(Into::into).collect(),
        }
    }

    /// Rule ids joined for output.
    pub fn rule_label(&self) -> String {
        self.rules.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

/// Physical encoding used to hold a record's attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// A single compact string of tag-prefixed segments.
    #[default]
    Tagged,
    /// A tag → value map.
    Map,
}

/// Storage capability behind an identity record.
///
/// Both encodings must behave identically through this contract: values are
/// kept in tag order and blank values are never stored.
pub trait AttributeStore {
    fn get(&self, tag: AttrTag) -> Option<&str>;
    fn set(&mut self, tag: AttrTag, value: &str);
    fn remove(&mut self, tag: AttrTag) -> Option<String>;
    fn entries(&self) -> Vec<(AttrTag, &str)>;
}

const SEGMENT_END: char = '\u{1E}';
const TAG_WIDTH: usize = 4;

/// Values never carry the tagged-segment terminator, whichever store holds them.
fn sanitize_value(value: &str) -> String {
    value.replace(SEGMENT_END, "")
}

/// Compact string encoding: `{tag as 4 hex digits}{value}\u{1E}` per attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedValues {
    encoded: String,
}

impl TaggedValues {
    fn segments(&self) -> impl Iterator<Item = (AttrTag, &str)> {
        self.encoded.split_terminator(SEGMENT_END).filter_map(|segment| {
            let tag = segment.get(..TAG_WIDTH)?;
            let tag = u16::from_str_radix(tag, 16).ok()?;
            Some((AttrTag(tag), &segment[TAG_WIDTH..]))
        })
    }

    fn rebuild(entries: &[(AttrTag, &str)]) -> String {
        let mut encoded = String::new();
        for (tag, value) in entries {
            encoded.push_str(&format!("{:04x}", tag.0));
            encoded.push_str(value);
            encoded.push(SEGMENT_END);
        }
        encoded
    }

    pub fn as_encoded(&self) -> &str {
        &self.encoded
    }
}

impl AttributeStore for TaggedValues {
    fn get(&self, tag: AttrTag) -> Option<&str> {
        self.segments()
            .find(|(candidate, _)| *candidate == tag)
            .map(|(_, value)| value)
    }

    fn set(&mut self, tag: AttrTag, value: &str) {
        let sanitized = sanitize_value(value);
        let mut entries: Vec<(AttrTag, &str)> =
            self.segments().filter(|(existing, _)| *existing != tag).collect();
        let position = entries.partition_point(|(existing, _)| *existing < tag);
        entries.insert(position, (tag, sanitized.as_str()));
        self.encoded = Self::rebuild(&entries);
    }

    fn remove(&mut self, tag: AttrTag) -> Option<String> {
        let removed = self.get(tag).map(str::to_string)?;
        let entries: Vec<(AttrTag, &str)> =
            self.segments().filter(|(existing, _)| *existing != tag).collect();
        self.encoded = Self::rebuild(&entries);
        Some(removed)
    }

    fn entries(&self) -> Vec<(AttrTag, &str)> {
        self.segments().collect()
    }
}

/// Map encoding keyed by tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapValues {
    values: BTreeMap<AttrTag, String>,
}

impl AttributeStore for MapValues {
    fn get(&self, tag: AttrTag) -> Option<&str> {
        self.values.get(&tag).map(String::as_str)
    }

    fn set(&mut self, tag: AttrTag, value: &str) {
        self.values.insert(tag, sanitize_value(value));
    }

    fn remove(&mut self, tag: AttrTag) -> Option<String> {
        self.values.remove(&tag)
    }

    fn entries(&self) -> Vec<(AttrTag, &str)> {
        self.values
            .iter()
            .map(|(tag, value)| (*tag, value.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Storage {
    Tagged(TaggedValues),
    Map(MapValues),
}

impl Storage {
    fn new(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Tagged => Storage::Tagged(TaggedValues::default()),
            Encoding::Map => Storage::Map(MapValues::default()),
        }
    }

    fn encoding(&self) -> Encoding {
        match self {
            Storage::Tagged(_) => Encoding::Tagged,
            Storage::Map(_) => Encoding::Map,
        }
    }

    fn store(&self) -> &dyn AttributeStore {
        match self {
            Storage::Tagged(values) => values,
            Storage::Map(values) => values,
        }
    }

    fn store_mut(&mut self) -> &mut dyn AttributeStore {
        match self {
            Storage::Tagged(values) => values,
            Storage::Map(values) => values,
        }
    }
}

/// A single normalized input record, or the collapsed form of a cluster.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    schema: Arc<Schema>,
    storage: Storage,
    current_trace: Option<Trace>,
    previous_traces: BTreeSet<Trace>,
}

impl IdentityRecord {
    /// Create an empty record.
    pub fn new(schema: Arc<Schema>, encoding: Encoding) -> Self {
        Self {
            schema,
            storage: Storage::new(encoding),
            current_trace: None,
            previous_traces: BTreeSet::new(),
        }
    }

    /// Build a record from raw `(attribute, value)` fields.
    ///
    /// Values are trimmed; blank values are dropped. A repeated attribute
    /// accumulates as a multi-valued attribute.
    pub fn from_fields<I, K, V>(
        schema: Arc<Schema>,
        encoding: Encoding,
        fields: I,
    ) -> Result<Self, ResolveError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut record = Self::new(schema, encoding);
        for (name, value) in fields {
            record.append(name.as_ref(), value.as_ref())?;
        }
        Ok(record)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn encoding(&self) -> Encoding {
        self.storage.encoding()
    }

    /// Value of an attribute, `None` when absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        let tag = self.schema.tag_of(name)?;
        self.get_tag(tag)
    }

    pub fn get_tag(&self, tag: AttrTag) -> Option<&str> {
        self.storage.store().get(tag)
    }

    /// Sub-values of a possibly multi-valued attribute.
    pub fn sub_values(&self, name: &str) -> Vec<&str> {
        self.get(name).map(split_values).unwrap_or_default()
    }

    /// Set an attribute, replacing any existing value. A blank value removes it.
    pub fn add(&mut self, name: &str, value: &str) -> Result<(), ResolveError> {
        let tag = self.schema.require(name)?;
        let value = value.trim();
        if value.is_empty() {
            self.storage.store_mut().remove(tag);
        } else {
            self.storage.store_mut().set(tag, value);
        }
        Ok(())
    }

    /// Append a sub-value to an attribute. Returns `false` when the value was
    /// blank or already present.
    pub fn append(&mut self, name: &str, value: &str) -> Result<bool, ResolveError> {
        let tag = self.schema.require(name)?;
        Ok(self.append_tag(tag, value))
    }

    pub(crate) fn append_tag(&mut self, tag: AttrTag, value: &str) -> bool {
        let mut appended = false;
        let mut combined: Vec<String> = self
            .get_tag(tag)
            .map(|existing| split_values(existing).into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        for part in split_values(value) {
            if !combined.iter().any(|existing| existing == part) {
                combined.push(part.to_string());
                appended = true;
            }
        }
        if appended {
            let joined = combined.join(VALUE_DELIMITER_STR);
            self.storage.store_mut().set(tag, &joined);
        }
        appended
    }

    pub fn remove(&mut self, name: &str) -> Result<Option<String>, ResolveError> {
        let tag = self.schema.require(name)?;
        Ok(self.storage.store_mut().remove(tag))
    }

    pub fn ref_id(&self) -> Option<&str> {
        self.get_tag(self.schema.ref_tag())
    }

    pub fn cluster_id(&self) -> Option<&str> {
        self.get_tag(self.schema.cluster_tag())
    }

    pub fn set_cluster_id(&mut self, cluster_id: &ClusterId) {
        let tag = self.schema.cluster_tag();
        self.storage.store_mut().set(tag, cluster_id.as_str());
    }

    /// All stored values in tag order.
    pub fn tagged_values(&self) -> Vec<(AttrTag, &str)> {
        self.storage.store().entries()
    }

    /// All stored values as `(name, value)` in tag order.
    pub fn values(&self) -> Vec<(&str, &str)> {
        self.tagged_values()
            .into_iter()
            .filter_map(|(tag, value)| self.schema.name_of(tag).map(|name| (name, value)))
            .collect()
    }

    pub fn current_trace(&self) -> Option<&Trace> {
        self.current_trace.as_ref()
    }

    pub fn previous_traces(&self) -> &BTreeSet<Trace> {
        &self.previous_traces
    }

    pub fn set_current_trace(&mut self, trace: Option<Trace>) {
        self.current_trace = trace;
    }

    /// Replace the current trace, pushing the old one into history.
    pub fn stamp_trace(&mut self, trace: Trace) {
        if let Some(previous) = self.current_trace.take() {
            if previous != trace {
                self.previous_traces.insert(previous);
            }
        }
        self.current_trace = Some(trace);
    }

    /// Fill in trace information this record lacks from another copy of it.
    pub fn absorb_traces(&mut self, other: &IdentityRecord) {
        if self.current_trace.is_none() {
            self.current_trace = other.current_trace.clone();
        }
        self.previous_traces
            .extend(other.previous_traces.iter().cloned());
        if let Some(current) = &self.current_trace {
            self.previous_traces.remove(current);
        }
    }

    /// Amount of trace information: (has current trace, previous trace count).
    pub fn trace_depth(&self) -> (bool, usize) {
        (self.current_trace.is_some(), self.previous_traces.len())
    }

    /// Attribute richness: (non-reserved attributes, sub-values, characters).
    pub fn richness(&self) -> (usize, usize, usize) {
        let mut attributes = 0;
        let mut sub_values = 0;
        let mut chars = 0;
        for (tag, value) in self.tagged_values() {
            if self.schema.is_special(tag) {
                continue;
            }
            attributes += 1;
            sub_values += split_values(value).len();
            chars += value.chars().count();
        }
        (attributes, sub_values, chars)
    }

    pub fn is_richer_than(&self, other: &IdentityRecord) -> bool {
        self.richness() > other.richness()
    }

    /// Attribute-level equality, independent of encoding and traces.
    pub fn same_attributes(&self, other: &IdentityRecord) -> bool {
        self.tagged_values() == other.tagged_values()
    }

    /// Same attributes stored in the other encoding.
    pub fn with_encoding(&self, encoding: Encoding) -> Self {
        if encoding == self.encoding() {
            return self.clone();
        }
        let mut storage = Storage::new(encoding);
        for (tag, value) in self.tagged_values() {
            storage.store_mut().set(tag, value);
        }
        Self {
            schema: Arc::clone(&self.schema),
            storage,
            current_trace: self.current_trace.clone(),
            previous_traces: self.previous_traces.clone(),
        }
    }

    /// Render values as `^code^value` segments in tag order.
    pub fn tagged_string(&self) -> String {
        let mut out = String::new();
        for (tag, value) in self.tagged_values() {
            if let Some(code) = self.schema.code_of(tag) {
                out.push('^');
                out.push_str(code);
                out.push('^');
                out.push_str(value);
            }
        }
        out
    }

    pub fn to_snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            encoding: self.encoding(),
            values: self
                .values()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            current_trace: self.current_trace.clone(),
            previous_traces: self.previous_traces.clone(),
        }
    }

    pub fn from_snapshot(
        schema: Arc<Schema>,
        snapshot: RecordSnapshot,
    ) -> Result<Self, ResolveError> {
        let mut record = Self::new(schema, snapshot.encoding);
        for (name, value) in &snapshot.values {
            record.add(name, value)?;
        }
        record.current_trace = snapshot.current_trace;
        record.previous_traces = snapshot.previous_traces;
        Ok(record)
    }
}

impl PartialEq for IdentityRecord {
    fn eq(&self, other: &Self) -> bool {
        self.same_attributes(other)
            && self.current_trace == other.current_trace
            && self.previous_traces == other.previous_traces
    }
}

/// Serializable, schema-free form of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    pub encoding: Encoding,
    pub values: BTreeMap<String, String>,
    pub current_trace: Option<Trace>,
    pub previous_traces: BTreeSet<Trace>,
}

/// Split a stored value into its non-blank sub-values.
pub fn split_values(value: &str) -> Vec<&str> {
    value
        .split(VALUE_DELIMITER)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Arc<Schema> {
        Schema::new(["first", "last", "ssn"]).unwrap()
    }

    #[test]
    fn test_schema_reserves_special_tags() {
        let schema = Schema::new(["name", REF_ID, "name"]).unwrap();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.tag_of(REF_ID), Some(AttrTag(0)));
        assert_eq!(schema.tag_of(CLUSTER_ID), Some(AttrTag(1)));
        assert_eq!(schema.name_of(AttrTag(2)), Some("name"));
        assert!(schema.is_special(AttrTag(1)));
        assert!(!schema.is_special(AttrTag(2)));
    }

    #[test]
    fn test_schema_rejects_tag_overflow() {
        let attributes: Vec<String> =
            (0..=usize::from(u16::MAX)).map(|i| format!("a{i}")).collect();
        assert_eq!(
            Schema::new(&attributes).unwrap_err(),
            RuleError::TooManyAttributes(attributes.len() + 2)
        );
        assert!(Schema::new(&attributes[..100]).is_ok());
    }

    #[test]
    fn test_segment_terminator_stripped_by_both_stores() {
        let mut tagged = TaggedValues::default();
        let mut mapped = MapValues::default();
        let stores: [&mut dyn AttributeStore; 2] = [&mut tagged, &mut mapped];
        for store in stores {
            store.set(AttrTag(2), "Ann\u{1E}Marie");
            store.set(AttrTag(3), "Smith");
        }
        assert_eq!(tagged.get(AttrTag(2)), Some("AnnMarie"));
        assert_eq!(tagged.entries(), mapped.entries());

        let fields = [(REF_ID, "r1"), ("first", "Ann\u{1E}Marie")];
        let tagged = IdentityRecord::from_fields(schema(), Encoding::Tagged, fields).unwrap();
        let mapped = IdentityRecord::from_fields(schema(), Encoding::Map, fields).unwrap();
        assert_eq!(tagged.get("first"), mapped.get("first"));
        assert_eq!(tagged, mapped);
    }

    #[test]
    fn test_tag_codes() {
        assert_eq!(tag_code(0), "A");
        assert_eq!(tag_code(25), "Z");
        assert_eq!(tag_code(26), "AA");
        assert_eq!(tag_code(27), "AB");
    }

    #[test]
    fn test_encodings_behave_identically() {
        for encoding in [Encoding::Tagged, Encoding::Map] {
            let mut record = IdentityRecord::new(schema(), encoding);
            record.add(REF_ID, "r1").unwrap();
            record.add("last", "Smith").unwrap();
            record.add("first", "John").unwrap();
            assert!(record.append("first", "Johnny").unwrap());
            assert!(!record.append("first", "John").unwrap());
            assert_eq!(record.get("first"), Some("John|Johnny"));
            assert_eq!(record.sub_values("first"), vec!["John", "Johnny"]);
            assert_eq!(
                record.values(),
                vec![(REF_ID, "r1"), ("first", "John|Johnny"), ("last", "Smith")]
            );
            assert_eq!(record.remove("last").unwrap(), Some("Smith".to_string()));
            assert_eq!(record.get("last"), None);
            assert_eq!(record.ref_id(), Some("r1"));
        }
    }

    #[test]
    fn test_cross_encoding_equality() {
        let fields = [(REF_ID, "r1"), ("first", "Ann"), ("ssn", "123456789")];
        let tagged = IdentityRecord::from_fields(schema(), Encoding::Tagged, fields).unwrap();
        let mapped = IdentityRecord::from_fields(schema(), Encoding::Map, fields).unwrap();
        assert_eq!(tagged, mapped);
        assert_eq!(tagged.with_encoding(Encoding::Map).encoding(), Encoding::Map);
        assert_eq!(tagged.tagged_string(), "^A^r1^C^Ann^E^123456789");
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let mut record = IdentityRecord::new(schema(), Encoding::Map);
        assert_eq!(
            record.add("phone", "555"),
            Err(ResolveError::UnknownAttribute("phone".to_string()))
        );
    }

    #[test]
    fn test_stamp_trace_pushes_history() {
        let mut record = IdentityRecord::new(schema(), Encoding::Tagged);
        record.stamp_trace(Trace::new(ClusterId::from("B"), RunId(1), ["r1"]));
        record.stamp_trace(Trace::new(ClusterId::from("A"), RunId(2), ["r2"]));
        assert_eq!(record.current_trace().unwrap().cluster_id.as_str(), "A");
        assert_eq!(record.previous_traces().len(), 1);
        assert_eq!(
            record.previous_traces().iter().next().unwrap().run_id,
            RunId(1)
        );
    }

    #[test]
    fn test_richness_ignores_reserved() {
        let mut sparse = IdentityRecord::new(schema(), Encoding::Map);
        sparse.add(REF_ID, "a-very-long-reference").unwrap();
        sparse.add("first", "Al").unwrap();
        let mut rich = IdentityRecord::new(schema(), Encoding::Map);
        rich.add(REF_ID, "r").unwrap();
        rich.add("first", "Al").unwrap();
        rich.add("last", "Ng").unwrap();
        assert!(rich.is_richer_than(&sparse));
        assert!(!sparse.is_richer_than(&rich));
    }

    #[test]
    fn test_snapshot_round_trip_keeps_traces() {
        let mut record =
            IdentityRecord::from_fields(schema(), Encoding::Tagged, [(REF_ID, "r9")]).unwrap();
        record.stamp_trace(Trace::new(ClusterId::from("C1"), RunId(3), ["rule"]));
        let json = serde_json::to_string(&record.to_snapshot()).unwrap();
        let snapshot: RecordSnapshot = serde_json::from_str(&json).unwrap();
        let restored = IdentityRecord::from_snapshot(schema(), snapshot).unwrap();
        assert_eq!(restored, record);
    }
}
