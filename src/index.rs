//! # Indexing Module
//!
//! Inverted blocking index from derived keys to the `@RefID`s that produce
//! them. Queries union the buckets of every key a record satisfies and rank
//! candidates by how many keys they share with it.

use crate::cluster::Cluster;
use crate::config::defaults::MAX_KEY_VALUES_PER_ATTR;
use crate::config::{BlockingMode, TruncationConfig};
use crate::error::ResolveError;
use crate::model::{split_values, IdentityRecord, RefId};
use crate::ontology::IndexRule;
use crate::stats::IndexStatistics;
use hashbrown::{HashMap, HashSet};
use std::collections::BTreeMap;
use tracing::debug;

/// Key shared by every record in universal mode.
pub const UNIVERSAL_KEY: &str = "*";

/// RefIDs sharing one key, in insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeyBucket {
    members: Vec<RefId>,
    present: HashSet<RefId>,
}

impl KeyBucket {
    fn insert(&mut self, ref_id: &str) {
        if self.present.insert(ref_id.to_string()) {
            self.members.push(ref_id.to_string());
        }
    }

    fn remove(&mut self, ref_id: &str) {
        if self.present.remove(ref_id) {
            self.members.retain(|member| member != ref_id);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Blocking index over identity records
#[derive(Debug, Clone)]
pub struct BlockingIndex {
    mode: BlockingMode,
    rules: Vec<IndexRule>,
    truncation: TruncationConfig,
    /// Maps key -> members
    buckets: HashMap<String, KeyBucket>,
    /// Maps ref id -> keys it occupies, for removal
    record_keys: HashMap<RefId, Vec<String>>,
    /// Raw candidate-union size -> number of queries
    histogram: BTreeMap<usize, usize>,
    queries: usize,
    truncations: usize,
}

impl BlockingIndex {
    /// Create a new index
    pub fn new(mode: BlockingMode, rules: Vec<IndexRule>, truncation: TruncationConfig) -> Self {
        Self {
            mode,
            rules,
            truncation,
            buckets: HashMap::new(),
            record_keys: HashMap::new(),
            histogram: BTreeMap::new(),
            queries: 0,
            truncations: 0,
        }
    }

    /// Index every record under one key
    pub fn universal() -> Self {
        Self::new(BlockingMode::Universal, Vec::new(), TruncationConfig::default())
    }

    pub fn mode(&self) -> BlockingMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.record_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_keys.is_empty()
    }

    pub fn contains(&self, ref_id: &str) -> bool {
        self.record_keys.contains_key(ref_id)
    }

    /// Blocking keys a record satisfies, deduplicated, in derivation order
    pub fn keys_for(&self, record: &IdentityRecord) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let mut push = |key: String| {
            if !keys.contains(&key) {
                keys.push(key);
            }
        };
        match self.mode {
            BlockingMode::Universal => push(UNIVERSAL_KEY.to_string()),
            BlockingMode::Values => {
                let schema = record.schema();
                for (tag, value) in record.tagged_values() {
                    if schema.is_special(tag) {
                        continue;
                    }
                    for part in split_values(value).into_iter().take(MAX_KEY_VALUES_PER_ATTR) {
                        push(part.to_string());
                    }
                }
            }
            BlockingMode::Rules => {
                for rule in &self.rules {
                    for key in rule.keys_for(record) {
                        push(key);
                    }
                }
            }
        }
        keys
    }

    /// Add a record under every key it satisfies.
    ///
    /// A record that is already indexed is first removed, so re-ingesting a
    /// changed record never leaves stale keys behind.
    pub fn insert(&mut self, record: &IdentityRecord) -> Result<(), ResolveError> {
        let ref_id = record.ref_id().ok_or(ResolveError::MissingRefId)?.to_string();
        self.remove(&ref_id);
        let keys = self.keys_for(record);
        for key in &keys {
            self.buckets.entry(key.clone()).or_default().insert(&ref_id);
        }
        self.record_keys.insert(ref_id, keys);
        Ok(())
    }

    /// Remove a record from every key; empty keys are dropped
    pub fn remove(&mut self, ref_id: &str) -> bool {
        let Some(keys) = self.record_keys.remove(ref_id) else {
            return false;
        };
        for key in keys {
            if let Some(bucket) = self.buckets.get_mut(&key) {
                bucket.remove(ref_id);
                if bucket.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
        true
    }

    /// Candidate RefIDs for a record.
    ///
    /// Candidates are ranked by the number of keys shared with the query,
    /// ties by first appearance in the union. A union larger than the
    /// truncation trigger keeps only the top `min(len / divisor, cap)`.
    pub fn candidates(&mut self, record: &IdentityRecord) -> Vec<RefId> {
        let keys = self.keys_for(record);
        let mut order: Vec<&str> = Vec::new();
        let mut frequency: HashMap<&str, usize> = HashMap::new();
        for key in &keys {
            let Some(bucket) = self.buckets.get(key) else {
                continue;
            };
            for member in &bucket.members {
                let count = frequency.entry(member.as_str()).or_insert(0);
                if *count == 0 {
                    order.push(member.as_str());
                }
                *count += 1;
            }
        }

        let union_size = order.len();
        let mut ranked: Vec<(usize, usize, &str)> = order
            .into_iter()
            .enumerate()
            .map(|(seen, ref_id)| (frequency.get(ref_id).copied().unwrap_or(0), seen, ref_id))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let keep = if union_size > self.truncation.trigger {
            let keep = (union_size / self.truncation.divisor.max(1)).min(self.truncation.cap);
            debug!(
                union = union_size,
                kept = keep,
                ref_id = record.ref_id().unwrap_or_default(),
                "truncating candidate set"
            );
            Some(keep)
        } else {
            None
        };

        let candidates: Vec<RefId> = ranked
            .into_iter()
            .take(keep.unwrap_or(usize::MAX))
            .map(|(_, _, ref_id)| ref_id.to_string())
            .collect();

        self.queries += 1;
        if keep.is_some() {
            self.truncations += 1;
        }
        *self.histogram.entry(union_size).or_insert(0) += 1;
        candidates
    }

    /// Candidates for a whole cluster, queried with its merged record
    pub fn candidates_for_cluster(&mut self, cluster: &Cluster) -> Vec<RefId> {
        let merged = cluster.merged_record();
        self.candidates(&merged)
    }

    /// Keys currently held by a record
    pub fn record_keys(&self, ref_id: &str) -> &[String] {
        self.record_keys
            .get(ref_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Members of one key, in insertion order
    pub fn bucket(&self, key: &str) -> &[RefId] {
        self.buckets
            .get(key)
            .map(|bucket| bucket.members.as_slice())
            .unwrap_or_default()
    }

    pub fn key_count(&self) -> usize {
        self.buckets.len()
    }

    /// Raw candidate-union size -> number of queries that produced it
    pub fn histogram(&self) -> &BTreeMap<usize, usize> {
        &self.histogram
    }

    /// Summary statistics of the current key distribution
    pub fn statistics(&self) -> IndexStatistics {
        let sizes = self
            .buckets
            .iter()
            .map(|(key, bucket)| (key.as_str(), bucket.len()));
        IndexStatistics::compute(
            sizes,
            self.record_keys.len(),
            self.histogram.clone(),
            self.queries,
            self.truncations,
        )
    }
}
