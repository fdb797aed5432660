//! # Streaming Linker Module
//!
//! Resolves one record at a time: block, match against candidate clusters,
//! then merge or create. Later records observe every earlier merge because
//! the index and store are mutated in place before the next record runs.

use crate::index::BlockingIndex;
use crate::model::{ClusterId, IdentityRecord, RunId};
use crate::ontology::RuleSet;
use crate::store::ClusterStore;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument, warn};

/// Where a linked record ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub cluster_id: ClusterId,
    /// A new cluster was started for the record
    pub created: bool,
    /// The record was already resolved before this call
    pub reingested: bool,
    /// Clusters absorbed into `cluster_id` while linking
    pub absorbed: Vec<ClusterId>,
}

/// Streaming linker for continuous clustering.
#[derive(Debug, Clone)]
pub struct StreamingLinker {
    index: BlockingIndex,
    rules: RuleSet,
}

impl StreamingLinker {
    pub fn new(index: BlockingIndex, rules: RuleSet) -> Self {
        Self { index, rules }
    }

    pub fn index(&self) -> &BlockingIndex {
        &self.index
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Index every record already held by `store`, e.g. after a restore
    pub fn rebuild_index(&mut self, store: &ClusterStore) -> Result<()> {
        for cluster in store.clusters() {
            for member in cluster.members() {
                self.index
                    .insert(member)
                    .with_context(|| format!("indexing member of cluster '{}'", cluster.id()))?;
            }
        }
        Ok(())
    }

    /// Link a record to existing clusters and return where it landed.
    ///
    /// Records without `@RefID` are skipped with a warning and yield `None`.
    /// A record whose `@RefID` is already resolved is deduped into its
    /// current cluster and matched again with its updated attributes.
    #[instrument(skip(self, store, record), level = "debug")]
    pub fn link_record(
        &mut self,
        store: &mut ClusterStore,
        record: IdentityRecord,
        run: RunId,
    ) -> Result<Option<LinkOutcome>> {
        let Some(ref_id) = record.ref_id().map(str::to_string) else {
            warn!("skipping record without @RefID");
            return Ok(None);
        };

        let home = store.cluster_of(&ref_id).cloned();
        let query = match &home {
            Some(current) => {
                self.index.remove(&ref_id);
                store.insert_into(current, record, run, &BTreeSet::new())?;
                store
                    .record(&ref_id)
                    .cloned()
                    .with_context(|| format!("record '{ref_id}' vanished from '{current}'"))?
            }
            None => record,
        };

        let matched = self.matching_clusters(store, &query, home.as_ref());

        let (cluster_id, created, absorbed) = match home.clone() {
            Some(current) => {
                let (survivor, absorbed) = Self::merge_all(store, current, matched, run)?;
                (survivor, false, absorbed)
            }
            None => {
                let mut matched = matched.into_iter();
                match matched.next() {
                    Some((target, rules)) => {
                        store.insert_into(&target, query.clone(), run, &rules)?;
                        let (survivor, absorbed) =
                            Self::merge_all(store, target, matched.collect(), run)?;
                        (survivor, false, absorbed)
                    }
                    None => (store.create(query.clone(), run)?, true, Vec::new()),
                }
            }
        };

        // Index after matching so the record never competes with itself.
        self.index.insert(&query)?;
        debug!(ref_id = %ref_id, cluster = %cluster_id, created, merges = absorbed.len(), "linked record");

        Ok(Some(LinkOutcome {
            cluster_id,
            created,
            reingested: home.is_some(),
            absorbed,
        }))
    }

    /// Clusters whose candidate members fire at least one identity rule
    /// against `query`, in id order, with the rules that fired.
    fn matching_clusters(
        &mut self,
        store: &ClusterStore,
        query: &IdentityRecord,
        home: Option<&ClusterId>,
    ) -> BTreeMap<ClusterId, BTreeSet<String>> {
        let own = query.ref_id();
        let mut matched: BTreeMap<ClusterId, BTreeSet<String>> = BTreeMap::new();
        for candidate in self.index.candidates(query) {
            if Some(candidate.as_str()) == own {
                continue;
            }
            let Some(cluster_id) = store.cluster_of(&candidate) else {
                continue;
            };
            if Some(cluster_id) == home || matched.contains_key(cluster_id) {
                continue;
            }
            if home.is_some_and(|home| store.are_different(home, cluster_id)) {
                debug!(candidate = %candidate, cluster = %cluster_id, "skipping cluster asserted different");
                continue;
            }
            let Some(member) = store.get(cluster_id).and_then(|cluster| cluster.get(&candidate)) else {
                continue;
            };
            let fired = self.rules.fired_rules(query, member);
            if !fired.is_empty() {
                matched.insert(cluster_id.clone(), fired);
            }
        }
        matched
    }

    /// Merge each matched cluster into `target`, skipping any the survivor
    /// is asserted different from.
    fn merge_all(
        store: &mut ClusterStore,
        target: ClusterId,
        matched: BTreeMap<ClusterId, BTreeSet<String>>,
        run: RunId,
    ) -> Result<(ClusterId, Vec<ClusterId>)> {
        let mut survivor = target;
        let mut absorbed = Vec::new();
        for (other, rules) in matched {
            if store.are_different(&survivor, &other) {
                debug!(survivor = %survivor, cluster = %other, "skipping merge asserted different");
                continue;
            }
            let merged = store.merge(&survivor, &other, run, &rules)?;
            absorbed.push(if merged == survivor { other } else { survivor.clone() });
            survivor = merged;
        }
        Ok((survivor, absorbed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterState;
    use crate::config::{BlockingMode, TruncationConfig};
    use crate::model::{Encoding, Schema, REF_ID};
    use crate::ontology::{IdentityRule, IndexRule};
    use std::sync::Arc;

    fn schema() -> Arc<Schema> {
        Schema::new(["first", "last", "ssn"]).unwrap()
    }

    fn record(schema: &Arc<Schema>, fields: &[(&str, &str)]) -> IdentityRecord {
        IdentityRecord::from_fields(Arc::clone(schema), Encoding::Tagged, fields.iter().copied())
            .unwrap()
    }

    fn linker(schema: &Schema) -> StreamingLinker {
        let mut rules = RuleSet::new();
        rules.add_identity_rule(IdentityRule::new(schema, "SSN", [("ssn", "EXACT")]).unwrap());
        rules.add_identity_rule(
            IdentityRule::new(schema, "NAME", [("first", "EXACT"), ("last", "SOUNDEX")]).unwrap(),
        );
        let index = BlockingIndex::new(
            BlockingMode::Rules,
            vec![
                IndexRule::new(schema, "ssn", [("ssn", "EXACT")]).unwrap(),
                IndexRule::new(schema, "last", [("last", "SOUNDEX")]).unwrap(),
            ],
            TruncationConfig::default(),
        );
        StreamingLinker::new(index, rules)
    }

    #[test]
    fn test_unmatched_records_get_own_clusters() {
        let schema = schema();
        let mut linker = linker(&schema);
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let a = linker
            .link_record(&mut store, record(&schema, &[(REF_ID, "a"), ("last", "Smith")]), RunId(1))
            .unwrap()
            .unwrap();
        let b = linker
            .link_record(&mut store, record(&schema, &[(REF_ID, "b"), ("last", "Jones")]), RunId(1))
            .unwrap()
            .unwrap();
        assert!(a.created && b.created);
        assert_ne!(a.cluster_id, b.cluster_id);
    }

    #[test]
    fn test_matching_record_joins_cluster_with_rule_trace() {
        let schema = schema();
        let mut linker = linker(&schema);
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let first = linker
            .link_record(&mut store, record(&schema, &[(REF_ID, "a"), ("ssn", "123")]), RunId(1))
            .unwrap()
            .unwrap();
        let second = linker
            .link_record(&mut store, record(&schema, &[(REF_ID, "b"), ("ssn", "123")]), RunId(1))
            .unwrap()
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.cluster_id, first.cluster_id);
        let trace = store.record("b").unwrap().current_trace().unwrap();
        assert_eq!(trace.rule_label(), "SSN");
    }

    #[test]
    fn test_bridge_record_merges_clusters_across_runs() {
        let schema = schema();
        let mut linker = linker(&schema);
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let a = linker
            .link_record(
                &mut store,
                record(&schema, &[(REF_ID, "a"), ("first", "Ann"), ("last", "Smith")]),
                RunId(1),
            )
            .unwrap()
            .unwrap();
        let b = linker
            .link_record(&mut store, record(&schema, &[(REF_ID, "b"), ("ssn", "555")]), RunId(1))
            .unwrap()
            .unwrap();
        assert_ne!(a.cluster_id, b.cluster_id);

        let bridge = record(
            &schema,
            &[(REF_ID, "c"), ("first", "Ann"), ("last", "Smyth"), ("ssn", "555")],
        );
        let outcome = linker.link_record(&mut store, bridge, RunId(2)).unwrap().unwrap();
        assert_eq!(outcome.cluster_id, a.cluster_id);
        assert_eq!(outcome.absorbed, vec![b.cluster_id.clone()]);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.classify_all(RunId(2)).get(&a.cluster_id),
            Some(&ClusterState::Merged)
        );
    }

    #[test]
    fn test_missing_ref_id_is_skipped() {
        let schema = schema();
        let mut linker = linker(&schema);
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let outcome = linker
            .link_record(&mut store, record(&schema, &[("ssn", "1")]), RunId(1))
            .unwrap();
        assert!(outcome.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_reingest_updates_keys_and_links() {
        let schema = schema();
        let mut linker = linker(&schema);
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        linker
            .link_record(&mut store, record(&schema, &[(REF_ID, "a"), ("ssn", "111")]), RunId(1))
            .unwrap();
        linker
            .link_record(&mut store, record(&schema, &[(REF_ID, "b"), ("ssn", "222")]), RunId(1))
            .unwrap();

        let updated = record(&schema, &[(REF_ID, "a"), ("ssn", "222"), ("last", "Lee")]);
        let outcome = linker.link_record(&mut store, updated, RunId(1)).unwrap().unwrap();
        assert!(outcome.reingested);
        assert_eq!(store.len(), 1);
        assert_eq!(store.record("a").unwrap().get("last"), Some("Lee"));
        assert_eq!(linker.index().len(), 2);
    }

    #[test]
    fn test_asserted_different_clusters_stay_apart() {
        let schema = schema();
        let mut linker = linker(&schema);
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let a = linker
            .link_record(&mut store, record(&schema, &[(REF_ID, "a"), ("ssn", "111")]), RunId(1))
            .unwrap()
            .unwrap();
        let b = linker
            .link_record(&mut store, record(&schema, &[(REF_ID, "b"), ("ssn", "222")]), RunId(1))
            .unwrap()
            .unwrap();
        store.assert_different(&a.cluster_id, &b.cluster_id).unwrap();

        let updated = record(&schema, &[(REF_ID, "a"), ("ssn", "222"), ("last", "Lee")]);
        let outcome = linker.link_record(&mut store, updated, RunId(1)).unwrap().unwrap();
        assert_eq!(outcome.cluster_id, a.cluster_id);
        assert!(outcome.absorbed.is_empty());
        assert_eq!(store.len(), 2);
    }
}
