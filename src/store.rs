//! # Store Module
//!
//! Owns every live cluster of a resolver, the `@RefID` to cluster map, and
//! cluster id generation. All structural changes (create, insert, merge,
//! assertions) go through here so the reverse map never drifts.

use crate::cluster::{Cluster, ClusterSnapshot, ClusterState, InsertOutcome};
use crate::config::defaults::{ASSERT_SAME_RULE, CLUSTER_ID_WIDTH, NEW_CLUSTER_RULE};
use crate::error::ResolveError;
use crate::model::{ClusterId, IdentityRecord, RefId, RunId, Schema, Trace};
use anyhow::{Context, Result};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Live clusters of one resolver
#[derive(Debug, Clone)]
pub struct ClusterStore {
    schema: Arc<Schema>,
    prefix: String,
    next_id: u64,
    trace: bool,
    clusters: BTreeMap<ClusterId, Cluster>,
    cluster_of: HashMap<RefId, ClusterId>,
}

impl ClusterStore {
    /// Create a new store
    pub fn new(schema: Arc<Schema>, prefix: impl Into<String>, trace: bool) -> Self {
        Self {
            schema,
            prefix: prefix.into(),
            next_id: 1,
            trace,
            clusters: BTreeMap::new(),
            cluster_of: HashMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace
    }

    /// Number of clusters
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Number of resolved records across all clusters
    pub fn record_count(&self) -> usize {
        self.cluster_of.len()
    }

    /// Clusters in id order
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn get(&self, id: &ClusterId) -> Option<&Cluster> {
        self.clusters.get(id)
    }

    /// Cluster currently holding a record
    pub fn cluster_of(&self, ref_id: &str) -> Option<&ClusterId> {
        self.cluster_of.get(ref_id)
    }

    /// Resolved form of a record, as stored in its cluster
    pub fn record(&self, ref_id: &str) -> Option<&IdentityRecord> {
        let id = self.cluster_of.get(ref_id)?;
        self.clusters.get(id)?.get(ref_id)
    }

    fn allocate_id(&mut self) -> ClusterId {
        loop {
            let id = ClusterId::new(format!(
                "{}{:0width$}",
                self.prefix,
                self.next_id,
                width = CLUSTER_ID_WIDTH
            ));
            self.next_id += 1;
            if !self.clusters.contains_key(&id) {
                return id;
            }
        }
    }

    fn require(&self, id: &ClusterId) -> Result<&Cluster> {
        self.clusters
            .get(id)
            .ok_or_else(|| ResolveError::UnknownCluster(id.to_string()).into())
    }

    fn require_mut(&mut self, id: &ClusterId) -> Result<&mut Cluster> {
        self.clusters
            .get_mut(id)
            .ok_or_else(|| ResolveError::UnknownCluster(id.to_string()).into())
    }

    /// Start a new cluster seeded with `record`
    pub fn create(&mut self, mut record: IdentityRecord, run: RunId) -> Result<ClusterId> {
        let ref_id = record.ref_id().ok_or(ResolveError::MissingRefId)?.to_string();
        let id = self.allocate_id();
        if self.trace {
            record.stamp_trace(Trace::new(id.clone(), run, [NEW_CLUSTER_RULE]));
        }
        let cluster = Cluster::with_seed(id.clone(), record)?;
        self.clusters.insert(id.clone(), cluster);
        self.cluster_of.insert(ref_id, id.clone());
        debug!(cluster = %id, "created cluster");
        Ok(id)
    }

    /// Add a record to an existing cluster.
    ///
    /// The record is stamped with `rules` when tracing is enabled and `rules`
    /// is non-empty; an empty set dedupes the record in without a new trace.
    pub fn insert_into(
        &mut self,
        id: &ClusterId,
        mut record: IdentityRecord,
        run: RunId,
        rules: &BTreeSet<String>,
    ) -> Result<InsertOutcome> {
        let ref_id = record.ref_id().ok_or(ResolveError::MissingRefId)?.to_string();
        if let Some(current) = self.cluster_of.get(&ref_id) {
            if current != id {
                anyhow::bail!("record '{ref_id}' already belongs to cluster '{current}'");
            }
        }
        if self.trace && !rules.is_empty() {
            record.stamp_trace(Trace::new(id.clone(), run, rules.iter().cloned()));
        }
        let outcome = self.require_mut(id)?.insert(record)?;
        self.cluster_of.insert(ref_id, id.clone());
        Ok(outcome)
    }

    /// Merge two clusters into the one with the lower id, returning the survivor.
    ///
    /// Refused when either side asserts the other different. Links other
    /// clusters hold to the absorbed id are redirected to the survivor.
    pub fn merge(
        &mut self,
        left: &ClusterId,
        right: &ClusterId,
        run: RunId,
        rules: &BTreeSet<String>,
    ) -> Result<ClusterId> {
        if left == right {
            self.require(left)?;
            return Ok(left.clone());
        }
        if self.are_different(left, right) {
            return Err(ResolveError::AssertedDifferent(left.to_string(), right.to_string()).into());
        }
        let (target, absorbed) = if left < right {
            (left.clone(), right.clone())
        } else {
            (right.clone(), left.clone())
        };
        self.require(&target)?;
        let mut other = self
            .clusters
            .remove(&absorbed)
            .ok_or_else(|| ResolveError::UnknownCluster(absorbed.to_string()))?;
        let moved: Vec<RefId> = other.ref_ids().into_iter().map(str::to_string).collect();

        let merged = match self.clusters.get_mut(&target) {
            Some(cluster) => cluster.merge(&mut other, run, rules, self.trace),
            None => Err(ResolveError::UnknownCluster(target.to_string())),
        };
        if let Err(err) = merged {
            self.clusters.insert(absorbed.clone(), other);
            return Err(anyhow::Error::new(err)
                .context(format!("merging cluster '{absorbed}' into '{target}'")));
        }
        for ref_id in moved {
            self.cluster_of.insert(ref_id, target.clone());
        }
        self.redirect_links(&absorbed, &target);
        debug!(target = %target, absorbed = %absorbed, rules = ?rules, "merged clusters");
        Ok(target)
    }

    fn redirect_links(&mut self, from: &ClusterId, to: &ClusterId) {
        for cluster in self.clusters.values_mut() {
            let id = cluster.id().clone();
            if cluster.asserted_same().contains(from) && &id != to {
                cluster.assert_same_with(to);
            }
            if cluster.asserted_different().contains(from) && &id != to {
                cluster.assert_different_with(to);
            }
        }
    }

    /// Drop a cluster and forget its records
    pub fn remove(&mut self, id: &ClusterId) -> Option<Cluster> {
        let cluster = self.clusters.remove(id)?;
        for ref_id in cluster.ref_ids() {
            self.cluster_of.remove(ref_id);
        }
        Some(cluster)
    }

    /// Merge two clusters on an explicit assertion, recording the link.
    pub fn assert_same(&mut self, left: &ClusterId, right: &ClusterId, run: RunId) -> Result<ClusterId> {
        let rules: BTreeSet<String> = [ASSERT_SAME_RULE.to_string()].into_iter().collect();
        let survivor = self.merge(left, right, run, &rules)?;
        let absorbed = if &survivor == left { right } else { left };
        self.require_mut(&survivor)?.assert_same_with(absorbed);
        Ok(survivor)
    }

    /// Record on both sides that two clusters must never merge
    pub fn assert_different(&mut self, left: &ClusterId, right: &ClusterId) -> Result<()> {
        if left == right {
            anyhow::bail!("cluster '{left}' cannot be asserted different from itself");
        }
        self.require(right)?;
        self.require_mut(left)?.assert_different_with(right);
        self.require_mut(right)?.assert_different_with(left);
        debug!(left = %left, right = %right, "asserted different");
        Ok(())
    }

    pub fn are_different(&self, left: &ClusterId, right: &ClusterId) -> bool {
        let declared = |from: &ClusterId, to: &ClusterId| {
            self.clusters
                .get(from)
                .is_some_and(|cluster| cluster.is_asserted_different(to))
        };
        declared(left, right) || declared(right, left)
    }

    /// State of every cluster for `run`
    pub fn classify_all(&self, run: RunId) -> BTreeMap<ClusterId, ClusterState> {
        self.clusters
            .iter()
            .map(|(id, cluster)| (id.clone(), cluster.classify_state(run)))
            .collect()
    }

    /// Every cluster in id order, wrapped in a `<Clusters>` element
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<Clusters>\n");
        for cluster in self.clusters.values() {
            out.push_str(&cluster.to_xml());
        }
        out.push_str("</Clusters>\n");
        out
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            prefix: self.prefix.clone(),
            next_id: self.next_id,
            clusters: self.clusters.values().map(Cluster::to_snapshot).collect(),
        }
    }

    /// Rebuild a store from a snapshot taken under the same schema
    pub fn restore(schema: Arc<Schema>, snapshot: StoreSnapshot, trace: bool) -> Result<Self> {
        let mut store = Self::new(Arc::clone(&schema), snapshot.prefix, trace);
        store.next_id = snapshot.next_id;
        for cluster in snapshot.clusters {
            let id = cluster.id.clone();
            let cluster = Cluster::from_snapshot(Arc::clone(&schema), cluster)
                .with_context(|| format!("restoring cluster '{id}'"))?;
            for ref_id in cluster.ref_ids() {
                if let Some(previous) = store.cluster_of.insert(ref_id.to_string(), id.clone()) {
                    anyhow::bail!("record '{ref_id}' appears in clusters '{previous}' and '{id}'");
                }
            }
            store.clusters.insert(id, cluster);
        }
        Ok(store)
    }
}

/// Serializable form of a cluster store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub prefix: String,
    pub next_id: u64,
    pub clusters: Vec<ClusterSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Encoding, REF_ID};

    fn schema() -> Arc<Schema> {
        Schema::new(["name"]).unwrap()
    }

    fn record(schema: &Arc<Schema>, ref_id: &str, name: &str) -> IdentityRecord {
        IdentityRecord::from_fields(
            Arc::clone(schema),
            Encoding::Tagged,
            [(REF_ID, ref_id), ("name", name)],
        )
        .unwrap()
    }

    fn rules(id: &str) -> BTreeSet<String> {
        [id.to_string()].into_iter().collect()
    }

    #[test]
    fn test_create_assigns_padded_ids() {
        let schema = schema();
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let a = store.create(record(&schema, "r1", "Ann"), RunId(1)).unwrap();
        let b = store.create(record(&schema, "r2", "Bob"), RunId(1)).unwrap();
        assert_eq!(a.as_str(), "C00000001");
        assert_eq!(b.as_str(), "C00000002");
        assert_eq!(store.cluster_of("r2"), Some(&b));
        let trace = store.record("r1").unwrap().current_trace().unwrap();
        assert_eq!(trace.rule_label(), NEW_CLUSTER_RULE);
    }

    #[test]
    fn test_insert_into_rejects_foreign_record() {
        let schema = schema();
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let a = store.create(record(&schema, "r1", "Ann"), RunId(1)).unwrap();
        let b = store.create(record(&schema, "r2", "Bob"), RunId(1)).unwrap();
        assert!(store
            .insert_into(&b, record(&schema, "r1", "Ann"), RunId(1), &rules("R1"))
            .is_err());
        assert_eq!(
            store
                .insert_into(&a, record(&schema, "r3", "Anne"), RunId(1), &rules("R1"))
                .unwrap(),
            InsertOutcome::Added
        );
        assert_eq!(store.cluster_of("r3"), Some(&a));
    }

    #[test]
    fn test_merge_keeps_lower_id_and_updates_map() {
        let schema = schema();
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let a = store.create(record(&schema, "r1", "Ann"), RunId(1)).unwrap();
        let b = store.create(record(&schema, "r2", "Anne"), RunId(1)).unwrap();
        let survivor = store.merge(&b, &a, RunId(2), &rules("R1")).unwrap();
        assert_eq!(survivor, a);
        assert_eq!(store.len(), 1);
        assert_eq!(store.cluster_of("r2"), Some(&a));
        assert_eq!(store.classify_all(RunId(2)).get(&a), Some(&ClusterState::Merged));
    }

    #[test]
    fn test_asserted_different_blocks_merge() {
        let schema = schema();
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let a = store.create(record(&schema, "r1", "Ann"), RunId(1)).unwrap();
        let b = store.create(record(&schema, "r2", "Anne"), RunId(1)).unwrap();
        let c = store.create(record(&schema, "r3", "Annie"), RunId(1)).unwrap();
        store.assert_different(&b, &c).unwrap();

        store.merge(&a, &c, RunId(1), &rules("R1")).unwrap();
        // a inherits c's assertion against b
        let err = store.merge(&a, &b, RunId(1), &rules("R1")).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResolveError>(),
            Some(&ResolveError::AssertedDifferent(a.to_string(), b.to_string()))
        );
        assert!(store.are_different(&b, &a));
    }

    #[test]
    fn test_failed_merge_keeps_both_clusters() {
        let schema = schema();
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let a = store.create(record(&schema, "r1", "Ann"), RunId(1)).unwrap();
        let foreign = Schema::new(["name", "phone"]).unwrap();
        let b = store.create(record(&foreign, "r2", "Ann"), RunId(1)).unwrap();

        let err = store.merge(&a, &b, RunId(1), &rules("R1")).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ResolveError>(),
            Some(&ResolveError::SchemaMismatch(b.to_string()))
        );
        assert_eq!(store.len(), 2);
        assert_eq!(store.cluster_of("r2"), Some(&b));
        assert_eq!(store.get(&b).unwrap().ref_ids(), vec!["r2"]);
        assert_eq!(store.get(&a).unwrap().ref_ids(), vec!["r1"]);
    }

    #[test]
    fn test_assert_same_records_link() {
        let schema = schema();
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", true);
        let a = store.create(record(&schema, "r1", "Ann"), RunId(1)).unwrap();
        let b = store.create(record(&schema, "r2", "Zed"), RunId(1)).unwrap();
        let survivor = store.assert_same(&a, &b, RunId(1)).unwrap();
        let cluster = store.get(&survivor).unwrap();
        assert!(cluster.asserted_same().contains(&b));
        let moved = cluster.get("r2").unwrap().current_trace().unwrap();
        assert_eq!(moved.rule_label(), ASSERT_SAME_RULE);
    }

    #[test]
    fn test_remove_and_unknown_cluster() {
        let schema = schema();
        let mut store = ClusterStore::new(Arc::clone(&schema), "C", false);
        let a = store.create(record(&schema, "r1", "Ann"), RunId(1)).unwrap();
        assert!(store.record("r1").unwrap().current_trace().is_none());
        assert!(store.remove(&a).is_some());
        assert_eq!(store.cluster_of("r1"), None);
        let missing = store.assert_different(&a, &ClusterId::from("C9")).unwrap_err();
        assert!(missing.downcast_ref::<ResolveError>().is_some());
    }

    #[test]
    fn test_snapshot_restore_continues_ids() {
        let schema = schema();
        let mut store = ClusterStore::new(Arc::clone(&schema), "P", true);
        store.create(record(&schema, "r1", "Ann"), RunId(1)).unwrap();
        let json = serde_json::to_string(&store.snapshot()).unwrap();

        let snapshot: StoreSnapshot = serde_json::from_str(&json).unwrap();
        let mut restored = ClusterStore::restore(Arc::clone(&schema), snapshot, true).unwrap();
        assert_eq!(restored.cluster_of("r1").map(ClusterId::as_str), Some("P00000001"));
        let next = restored.create(record(&schema, "r2", "Bob"), RunId(2)).unwrap();
        assert_eq!(next.as_str(), "P00000002");
        assert!(restored.to_xml().starts_with("<Clusters>\n"));
    }
}
