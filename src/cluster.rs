//! # Cluster Module
//!
//! A cluster is the set of identity records currently believed to describe
//! one entity. Membership is keyed by `@RefID`: records live in an arena
//! vector and a map from `@RefID` to arena slot, so dedupe-on-insert is a
//! lookup plus an explicit "keep the better record" decision.

use crate::error::ResolveError;
use crate::model::{
    split_values, ClusterId, Encoding, IdentityRecord, RecordSnapshot, RefId, RunId, Schema,
    Trace,
};
use chrono::{NaiveDate, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Lifecycle state of a cluster relative to one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterState {
    /// Unchanged by the run
    Existing,
    /// Gained records in the run
    Updated,
    /// Absorbed records that belonged to another cluster in the previous run
    Merged,
    /// Created in the run
    New,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClusterState::Existing => "Existing",
            ClusterState::Updated => "Updated",
            ClusterState::Merged => "Merged",
            ClusterState::New => "New",
        };
        f.write_str(label)
    }
}

/// What happened to a record handed to [`Cluster::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Added,
    /// Same `@RefID` already present; the incoming record was richer
    Replaced,
    /// Same `@RefID` already present; the existing member was kept
    Kept,
}

/// A set of records resolved to one entity
#[derive(Debug, Clone)]
pub struct Cluster {
    id: ClusterId,
    schema: Arc<Schema>,
    created: NaiveDate,
    persistent: bool,
    members: Vec<IdentityRecord>,
    positions: HashMap<RefId, usize>,
    asserted_same: BTreeSet<ClusterId>,
    asserted_different: BTreeSet<ClusterId>,
    /// Former cluster id -> RefIDs it held when merged in
    merge_history: BTreeMap<ClusterId, Vec<RefId>>,
}

impl Cluster {
    /// Create an empty cluster dated today
    pub fn new(id: ClusterId, schema: Arc<Schema>) -> Self {
        Self {
            id,
            schema,
            created: Utc::now().date_naive(),
            persistent: false,
            members: Vec::new(),
            positions: HashMap::new(),
            asserted_same: BTreeSet::new(),
            asserted_different: BTreeSet::new(),
            merge_history: BTreeMap::new(),
        }
    }

    /// Create a cluster holding one record
    pub fn with_seed(id: ClusterId, record: IdentityRecord) -> Result<Self, ResolveError> {
        let mut cluster = Self::new(id, Arc::clone(record.schema()));
        cluster.insert(record)?;
        Ok(cluster)
    }

    pub fn id(&self) -> &ClusterId {
        &self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn created(&self) -> NaiveDate {
        self.created
    }

    pub fn set_created(&mut self, created: NaiveDate) {
        self.created = created;
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in insertion order
    pub fn members(&self) -> &[IdentityRecord] {
        &self.members
    }

    pub fn get(&self, ref_id: &str) -> Option<&IdentityRecord> {
        self.positions.get(ref_id).map(|&pos| &self.members[pos])
    }

    pub fn contains(&self, ref_id: &str) -> bool {
        self.positions.contains_key(ref_id)
    }

    /// Member RefIDs in insertion order
    pub fn ref_ids(&self) -> Vec<&str> {
        self.members.iter().filter_map(IdentityRecord::ref_id).collect()
    }

    pub fn merge_history(&self) -> &BTreeMap<ClusterId, Vec<RefId>> {
        &self.merge_history
    }

    pub fn asserted_same(&self) -> &BTreeSet<ClusterId> {
        &self.asserted_same
    }

    pub fn asserted_different(&self) -> &BTreeSet<ClusterId> {
        &self.asserted_different
    }

    /// Record that this cluster and `other` describe the same entity
    pub fn assert_same_with(&mut self, other: &ClusterId) {
        if other != &self.id {
            self.asserted_same.insert(other.clone());
        }
    }

    /// Record that this cluster and `other` must never merge
    pub fn assert_different_with(&mut self, other: &ClusterId) {
        if other != &self.id {
            self.asserted_different.insert(other.clone());
        }
    }

    pub fn is_asserted_different(&self, other: &ClusterId) -> bool {
        self.asserted_different.contains(other)
    }

    /// Add a record, deduplicating on `@RefID`.
    ///
    /// A verbatim copy of an existing member only contributes trace
    /// information. Otherwise the richer record is kept and inherits the
    /// other's traces.
    pub fn insert(&mut self, mut record: IdentityRecord) -> Result<InsertOutcome, ResolveError> {
        let ref_id = record.ref_id().ok_or(ResolveError::MissingRefId)?.to_string();
        record.set_cluster_id(&self.id);

        let Some(&pos) = self.positions.get(&ref_id) else {
            self.positions.insert(ref_id, self.members.len());
            self.members.push(record);
            return Ok(InsertOutcome::Added);
        };

        let existing = &mut self.members[pos];
        if existing.same_attributes(&record) || !record.is_richer_than(existing) {
            existing.absorb_traces(&record);
            return Ok(InsertOutcome::Kept);
        }
        record.absorb_traces(existing);
        *existing = record;
        Ok(InsertOutcome::Replaced)
    }

    /// Drain every member of `other` into this cluster.
    ///
    /// `other`'s id and RefIDs are kept in the merge history. With tracing
    /// enabled each moved record is stamped with this cluster, the run and
    /// the rules that caused the merge. On error neither cluster is touched.
    pub fn merge(
        &mut self,
        other: &mut Cluster,
        run: RunId,
        rules: &BTreeSet<String>,
        trace: bool,
    ) -> Result<(), ResolveError> {
        if !Arc::ptr_eq(&self.schema, &other.schema) && self.schema != other.schema {
            return Err(ResolveError::SchemaMismatch(other.id.to_string()));
        }
        if other.members.iter().any(|member| member.ref_id().is_none()) {
            return Err(ResolveError::MissingRefId);
        }

        let other_id = other.id.clone();
        let other_members = std::mem::take(&mut other.members);
        other.positions.clear();
        let other_same = std::mem::take(&mut other.asserted_same);
        let other_different = std::mem::take(&mut other.asserted_different);
        let other_history = std::mem::take(&mut other.merge_history);

        let moved: Vec<RefId> = other_members
            .iter()
            .filter_map(|member| member.ref_id().map(str::to_string))
            .collect();
        self.merge_history.extend(other_history);
        self.merge_history.insert(other_id.clone(), moved);

        for id in other_same {
            self.assert_same_with(&id);
        }
        for id in other_different {
            self.assert_different_with(&id);
        }
        self.persistent |= other.persistent;
        self.created = self.created.min(other.created);

        for mut member in other_members {
            if trace {
                member.stamp_trace(Trace::new(self.id.clone(), run, rules.iter().cloned()));
            }
            self.insert(member)?;
        }
        Ok(())
    }

    /// Classify this cluster for `run` from its members' traces.
    ///
    /// Members not placed in this cluster during `run` count as existing.
    /// A member placed during `run` makes the cluster new, updated, or merged
    /// when one of its previous traces names another cluster in the run just
    /// before. States only escalate from existing to updated to merged.
    pub fn classify_state(&self, run: RunId) -> ClusterState {
        let mut state: Option<ClusterState> = None;
        for member in &self.members {
            let placed_now = member
                .current_trace()
                .map(|trace| trace.run_id == run && trace.cluster_id == self.id)
                .unwrap_or(false);
            if !placed_now {
                if state.is_none() {
                    state = Some(ClusterState::Existing);
                }
                continue;
            }

            let moved_from_previous_run = run.previous().is_some_and(|previous| {
                member
                    .previous_traces()
                    .iter()
                    .any(|trace| trace.run_id == previous && trace.cluster_id != self.id)
            });
            state = match state {
                None | Some(ClusterState::Existing) | Some(ClusterState::Updated)
                    if moved_from_previous_run =>
                {
                    Some(ClusterState::Merged)
                }
                None => Some(ClusterState::New),
                Some(ClusterState::Existing) => Some(ClusterState::Updated),
                unchanged => unchanged,
            };
        }
        state.unwrap_or(ClusterState::Existing)
    }

    /// Collapse the cluster into one record.
    ///
    /// Every attribute except `@OysterID` accumulates the distinct values of
    /// all members, in schema order.
    pub fn merged_record(&self) -> IdentityRecord {
        let encoding = self
            .members
            .first()
            .map(IdentityRecord::encoding)
            .unwrap_or(Encoding::Tagged);
        let mut merged = IdentityRecord::new(Arc::clone(&self.schema), encoding);
        let cluster_tag = self.schema.cluster_tag();
        for (tag, _) in self.schema.attributes() {
            if tag == cluster_tag {
                continue;
            }
            for member in &self.members {
                if let Some(value) = member.get_tag(tag) {
                    merged.append_tag(tag, value);
                }
            }
        }
        merged
    }

    /// XML-like rendering with entity-escaped values.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "  <Identity Identifier=\"{}\" CDate=\"{}\" Persistent=\"{}\">",
            escape_xml(self.id.as_str()),
            self.created.format("%Y-%m-%d"),
            self.persistent
        );
        if !self.asserted_same.is_empty() || !self.asserted_different.is_empty() {
            out.push_str("    <Links>\n");
            for (kind, ids) in [
                ("AssertedSame", &self.asserted_same),
                ("AssertedDifferent", &self.asserted_different),
            ] {
                for id in ids {
                    let _ = writeln!(
                        out,
                        "      <Link Type=\"{kind}\" Identifier=\"{}\"/>",
                        escape_xml(id.as_str())
                    );
                }
            }
            out.push_str("    </Links>\n");
        }
        out.push_str("    <References>\n");
        for member in &self.members {
            let _ = writeln!(
                out,
                "      <Reference Value=\"{}\">",
                escape_xml(&self.reference_value(member))
            );
            let traces: Vec<(&Trace, bool)> = member
                .current_trace()
                .map(|trace| (trace, true))
                .into_iter()
                .chain(member.previous_traces().iter().map(|trace| (trace, false)))
                .collect();
            if traces.is_empty() {
                out.push_str("        <Traces/>\n");
            } else {
                out.push_str("        <Traces>\n");
                for (trace, current) in traces {
                    let _ = writeln!(
                        out,
                        "          <Trace OID=\"{}\" RunID=\"{}\" Rule=\"{}\" Current=\"{}\"/>",
                        escape_xml(trace.cluster_id.as_str()),
                        trace.run_id,
                        escape_xml(&trace.rule_label()),
                        current
                    );
                }
                out.push_str("        </Traces>\n");
            }
            out.push_str("      </Reference>\n");
        }
        out.push_str("    </References>\n");
        out.push_str("  </Identity>\n");
        out
    }

    /// `code^value` segments for every attribute but `@OysterID`, joined by `|`.
    fn reference_value(&self, member: &IdentityRecord) -> String {
        let cluster_tag = self.schema.cluster_tag();
        member
            .tagged_values()
            .into_iter()
            .filter(|(tag, _)| *tag != cluster_tag)
            .filter_map(|(tag, value)| {
                self.schema
                    .code_of(tag)
                    .map(|code| format!("{code}^{}", split_values(value).join("|")))
            })
            .collect::<Vec<_>>()
            .join("^")
    }

    pub fn to_snapshot(&self) -> ClusterSnapshot {
        ClusterSnapshot {
            id: self.id.clone(),
            created: self.created,
            persistent: self.persistent,
            members: self.members.iter().map(IdentityRecord::to_snapshot).collect(),
            asserted_same: self.asserted_same.clone(),
            asserted_different: self.asserted_different.clone(),
            merge_history: self.merge_history.clone(),
        }
    }

    pub fn from_snapshot(
        schema: Arc<Schema>,
        snapshot: ClusterSnapshot,
    ) -> Result<Self, ResolveError> {
        let mut cluster = Self::new(snapshot.id, Arc::clone(&schema));
        cluster.created = snapshot.created;
        cluster.persistent = snapshot.persistent;
        cluster.asserted_same = snapshot.asserted_same;
        cluster.asserted_different = snapshot.asserted_different;
        cluster.merge_history = snapshot.merge_history;
        for member in snapshot.members {
            cluster.insert(IdentityRecord::from_snapshot(Arc::clone(&schema), member)?)?;
        }
        Ok(cluster)
    }
}

/// Serializable form of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub id: ClusterId,
    pub created: NaiveDate,
    pub persistent: bool,
    pub members: Vec<RecordSnapshot>,
    pub asserted_same: BTreeSet<ClusterId>,
    pub asserted_different: BTreeSet<ClusterId>,
    pub merge_history: BTreeMap<ClusterId, Vec<RefId>>,
}

/// Escape `& " ' < >` for attribute and text content.
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::REF_ID;

    fn schema() -> Arc<Schema> {
        Schema::new(["first", "last"]).unwrap()
    }

    fn record(schema: &Arc<Schema>, fields: &[(&str, &str)]) -> IdentityRecord {
        IdentityRecord::from_fields(Arc::clone(schema), Encoding::Tagged, fields.iter().copied())
            .unwrap()
    }

    fn rules(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_duplicate_insert_is_idempotent() {
        let schema = schema();
        let r = record(&schema, &[(REF_ID, "r1"), ("first", "Ann")]);
        let mut cluster = Cluster::with_seed(ClusterId::from("C1"), r.clone()).unwrap();
        assert_eq!(cluster.insert(r).unwrap(), InsertOutcome::Kept);
        assert_eq!(cluster.len(), 1);
    }

    #[test]
    fn test_richer_record_replaces_and_keeps_traces() {
        let schema = schema();
        let mut sparse = record(&schema, &[(REF_ID, "r1"), ("first", "Ann")]);
        sparse.stamp_trace(Trace::new(ClusterId::from("C1"), RunId(1), ["R1"]));
        let mut cluster = Cluster::with_seed(ClusterId::from("C1"), sparse).unwrap();

        let rich = record(&schema, &[(REF_ID, "r1"), ("first", "Ann"), ("last", "Lee")]);
        assert_eq!(cluster.insert(rich).unwrap(), InsertOutcome::Replaced);
        let member = cluster.get("r1").unwrap();
        assert_eq!(member.get("last"), Some("Lee"));
        assert_eq!(member.current_trace().map(|t| t.run_id), Some(RunId(1)));

        let poorer = record(&schema, &[(REF_ID, "r1")]);
        assert_eq!(cluster.insert(poorer).unwrap(), InsertOutcome::Kept);
        assert_eq!(cluster.get("r1").unwrap().get("last"), Some("Lee"));
    }

    #[test]
    fn test_insert_requires_ref_id() {
        let schema = schema();
        let mut cluster = Cluster::new(ClusterId::from("C1"), Arc::clone(&schema));
        let r = record(&schema, &[("first", "Ann")]);
        assert_eq!(cluster.insert(r), Err(ResolveError::MissingRefId));
    }

    #[test]
    fn test_merge_records_history_and_stamps_traces() {
        let schema = schema();
        let mut a = Cluster::with_seed(
            ClusterId::from("A"),
            record(&schema, &[(REF_ID, "a1"), ("first", "Ann")]),
        )
        .unwrap();
        let mut b_member = record(&schema, &[(REF_ID, "b1"), ("first", "Anne")]);
        b_member.stamp_trace(Trace::new(ClusterId::from("B"), RunId(1), ["R0"]));
        let mut b = Cluster::with_seed(ClusterId::from("B"), b_member).unwrap();

        a.merge(&mut b, RunId(2), &rules(&["R1"]), true).unwrap();
        assert!(b.is_empty());
        assert_eq!(a.ref_ids(), vec!["a1", "b1"]);
        assert_eq!(
            a.merge_history().get(&ClusterId::from("B")),
            Some(&vec!["b1".to_string()])
        );
        let moved = a.get("b1").unwrap();
        assert_eq!(moved.cluster_id(), Some("A"));
        assert_eq!(moved.current_trace().unwrap().cluster_id, ClusterId::from("A"));
        assert_eq!(moved.previous_traces().len(), 1);
    }

    #[test]
    fn test_merge_across_schemas_leaves_both_untouched() {
        let schema = schema();
        let foreign = Schema::new(["first"]).unwrap();
        let mut a =
            Cluster::with_seed(ClusterId::from("A"), record(&schema, &[(REF_ID, "a1")])).unwrap();
        let mut b =
            Cluster::with_seed(ClusterId::from("B"), record(&foreign, &[(REF_ID, "b1")])).unwrap();

        assert_eq!(
            a.merge(&mut b, RunId(2), &rules(&["R1"]), true),
            Err(ResolveError::SchemaMismatch("B".to_string()))
        );
        assert_eq!(a.ref_ids(), vec!["a1"]);
        assert_eq!(b.ref_ids(), vec!["b1"]);
        assert!(a.merge_history().is_empty());
    }

    #[test]
    fn test_classify_merged_and_new() {
        let schema = schema();
        let mut member = record(&schema, &[(REF_ID, "r1")]);
        member.stamp_trace(Trace::new(ClusterId::from("B"), RunId(1), ["Y"]));
        member.stamp_trace(Trace::new(ClusterId::from("A"), RunId(2), ["X"]));
        let cluster = Cluster::with_seed(ClusterId::from("A"), member).unwrap();
        assert_eq!(cluster.classify_state(RunId(2)), ClusterState::Merged);

        let mut fresh = record(&schema, &[(REF_ID, "r1")]);
        fresh.stamp_trace(Trace::new(ClusterId::from("A"), RunId(2), ["X"]));
        let cluster = Cluster::with_seed(ClusterId::from("A"), fresh).unwrap();
        assert_eq!(cluster.classify_state(RunId(2)), ClusterState::New);
    }

    #[test]
    fn test_classify_existing_and_updated() {
        let schema = schema();
        let mut old = record(&schema, &[(REF_ID, "r1")]);
        old.stamp_trace(Trace::new(ClusterId::from("A"), RunId(1), ["X"]));
        let mut cluster = Cluster::with_seed(ClusterId::from("A"), old).unwrap();
        assert_eq!(cluster.classify_state(RunId(2)), ClusterState::Existing);

        let mut added = record(&schema, &[(REF_ID, "r2")]);
        added.stamp_trace(Trace::new(ClusterId::from("A"), RunId(2), ["X"]));
        cluster.insert(added).unwrap();
        assert_eq!(cluster.classify_state(RunId(2)), ClusterState::Updated);

        let untraced = Cluster::with_seed(ClusterId::from("Z"), record(&schema, &[(REF_ID, "z")]))
            .unwrap();
        assert_eq!(untraced.classify_state(RunId(1)), ClusterState::Existing);
    }

    #[test]
    fn test_merged_record_appends_distinct_values() {
        let schema = schema();
        let mut cluster = Cluster::with_seed(
            ClusterId::from("C1"),
            record(&schema, &[(REF_ID, "r1"), ("first", "Bill"), ("last", "Lee")]),
        )
        .unwrap();
        cluster
            .insert(record(&schema, &[(REF_ID, "r2"), ("first", "William"), ("last", "Lee")]))
            .unwrap();
        let merged = cluster.merged_record();
        assert_eq!(merged.get("first"), Some("Bill|William"));
        assert_eq!(merged.get("last"), Some("Lee"));
        assert_eq!(merged.get(REF_ID), Some("r1|r2"));
        assert_eq!(merged.cluster_id(), None);
    }

    #[test]
    fn test_xml_escapes_and_marks_empty_traces() {
        let schema = schema();
        let mut cluster = Cluster::with_seed(
            ClusterId::from("C1"),
            record(&schema, &[(REF_ID, "r1"), ("last", "O'Neil & <Sons>")]),
        )
        .unwrap();
        cluster.set_created(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        cluster.assert_different_with(&ClusterId::from("C9"));
        let xml = cluster.to_xml();
        assert!(xml.contains("CDate=\"2024-05-01\""));
        assert!(xml.contains("O&apos;Neil &amp; &lt;Sons&gt;"));
        assert!(xml.contains("<Traces/>"));
        assert!(xml.contains("Type=\"AssertedDifferent\" Identifier=\"C9\""));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let schema = schema();
        let mut member = record(&schema, &[(REF_ID, "r1"), ("first", "Ann")]);
        member.stamp_trace(Trace::new(ClusterId::from("C1"), RunId(1), ["R1"]));
        let mut cluster = Cluster::with_seed(ClusterId::from("C1"), member).unwrap();
        cluster.assert_same_with(&ClusterId::from("C2"));

        let json = serde_json::to_string(&cluster.to_snapshot()).unwrap();
        let snapshot: ClusterSnapshot = serde_json::from_str(&json).unwrap();
        let restored = Cluster::from_snapshot(Arc::clone(&schema), snapshot).unwrap();
        assert_eq!(restored.members(), cluster.members());
        assert_eq!(restored.asserted_same(), cluster.asserted_same());
        assert_eq!(restored.created(), cluster.created());
    }
}
