//! # Oyster
//!
//! Rule-driven entity resolution. Records are blocked through an inverted
//! key index, compared with a small grammar of match predicates, and merged
//! into clusters whose lifecycle (new, updated, merged, existing) is tracked
//! across runs with an auditable trace of the rules behind every placement.

pub mod cluster;
pub mod config;
pub mod error;
pub mod index;
pub mod linker;
pub mod matcher;
pub mod model;
pub mod ontology;
pub mod stats;
pub mod store;
pub mod test_support;

// Re-export main types for convenience
pub use cluster::{Cluster, ClusterState, InsertOutcome};
pub use config::{BlockingMode, ConfigOverrides, ResolverConfig};
pub use error::{ResolveError, RuleError};
pub use index::BlockingIndex;
pub use linker::{LinkOutcome, StreamingLinker};
pub use matcher::{MatchOutcome, MatchSpec, RuleEngine};
pub use model::{ClusterId, Encoding, IdentityRecord, RefId, RunId, Schema, Trace, CLUSTER_ID, REF_ID};
pub use ontology::{IdentityRule, IndexRule, RuleSet};
pub use stats::IndexStatistics;
pub use store::{ClusterStore, StoreSnapshot};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Counters for one `ingest` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run: u32,
    pub processed: usize,
    /// Records rejected without `@RefID`
    pub skipped: usize,
    pub created: usize,
    pub reingested: usize,
    /// Clusters absorbed by merges
    pub merges: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResolverSnapshot {
    run: RunId,
    store: StoreSnapshot,
}

/// Main API for entity resolution
#[derive(Debug, Clone)]
pub struct Resolver {
    config: ResolverConfig,
    schema: Arc<Schema>,
    run: RunId,
    store: ClusterStore,
    linker: StreamingLinker,
}

impl Resolver {
    /// Create a resolver from an already-loaded configuration.
    ///
    /// Fails when any match or index rule spec is malformed.
    pub fn new(config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        let schema = config.schema()?;
        let engine = RuleEngine::with_nicknames(config.nickname_table());
        let rules = RuleSet::from_config(
            &schema,
            &config.matching.rules,
            &config.blocking.rules,
            engine,
        )
        .context("building rule set from configuration")?;

        let mut mode = config.blocking.mode;
        if mode == BlockingMode::Rules && rules.index_rules.is_empty() {
            debug!("no index rules configured, blocking on raw values");
            mode = BlockingMode::Values;
        }
        let index = BlockingIndex::new(mode, rules.index_rules.clone(), config.blocking.truncation);
        let store = ClusterStore::new(
            Arc::clone(&schema),
            config.cluster_id_prefix.clone(),
            config.trace,
        );
        Ok(Self {
            run: config.run(),
            schema,
            store,
            linker: StreamingLinker::new(index, rules),
            config,
        })
    }

    /// Load configuration (file, `OYSTER_` env, overrides) and build a resolver
    pub fn from_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let config = ResolverConfig::load(path, overrides).context("loading configuration")?;
        Self::new(config)
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Run currently being executed
    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn store(&self) -> &ClusterStore {
        &self.store
    }

    pub fn index(&self) -> &BlockingIndex {
        self.linker.index()
    }

    /// Build a record in this resolver's schema and encoding
    pub fn record<I, K, V>(&self, fields: I) -> Result<IdentityRecord>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Ok(IdentityRecord::from_fields(
            Arc::clone(&self.schema),
            self.config.encoding,
            fields,
        )?)
    }

    /// Start a new run; clusters and traces carry over
    pub fn begin_run(&mut self, run: RunId) {
        info!(run = run.0, clusters = self.store.len(), "starting run");
        self.run = run;
    }

    /// Resolve one record in the current run
    pub fn ingest_one(&mut self, record: IdentityRecord) -> Result<Option<LinkOutcome>> {
        self.linker.link_record(&mut self.store, record, self.run)
    }

    /// Resolve records in order; each sees the merges of those before it
    #[instrument(skip(self, records), level = "debug")]
    pub fn ingest<I>(&mut self, records: I) -> Result<RunSummary>
    where
        I: IntoIterator<Item = IdentityRecord>,
    {
        let mut summary = RunSummary {
            run: self.run.0,
            ..Default::default()
        };
        for record in records {
            summary.processed += 1;
            match self.ingest_one(record)? {
                None => summary.skipped += 1,
                Some(outcome) => {
                    summary.created += usize::from(outcome.created);
                    summary.reingested += usize::from(outcome.reingested);
                    summary.merges += outcome.absorbed.len();
                }
            }
        }
        info!(
            run = summary.run,
            processed = summary.processed,
            skipped = summary.skipped,
            created = summary.created,
            merges = summary.merges,
            clusters = self.store.len(),
            "ingest complete"
        );
        Ok(summary)
    }

    pub fn cluster_of(&self, ref_id: &str) -> Option<&ClusterId> {
        self.store.cluster_of(ref_id)
    }

    /// State of every cluster for the current run
    pub fn classify_all(&self) -> BTreeMap<ClusterId, ClusterState> {
        self.store.classify_all(self.run)
    }

    pub fn to_xml(&self) -> String {
        self.store.to_xml()
    }

    pub fn statistics(&self) -> IndexStatistics {
        self.linker.index().statistics()
    }

    /// Serialize the resolved identities for a later run
    pub fn snapshot_json(&self) -> Result<String> {
        let snapshot = ResolverSnapshot {
            run: self.run,
            store: self.store.snapshot(),
        };
        serde_json::to_string(&snapshot).context("serializing resolver snapshot")
    }

    /// Replace all clusters with a snapshot and rebuild the blocking index.
    ///
    /// The resolver keeps its rules and configuration; the run is set to the
    /// snapshot's run, so callers normally follow with `begin_run`.
    pub fn restore_json(&mut self, json: &str) -> Result<()> {
        let snapshot: ResolverSnapshot =
            serde_json::from_str(json).context("parsing resolver snapshot")?;
        let store = ClusterStore::restore(Arc::clone(&self.schema), snapshot.store, self.config.trace)?;
        let index = BlockingIndex::new(
            self.linker.index().mode(),
            self.linker.rules().index_rules.clone(),
            self.config.blocking.truncation,
        );
        let mut linker = StreamingLinker::new(index, self.linker.rules().clone());
        linker.rebuild_index(&store)?;

        info!(
            run = snapshot.run.0,
            clusters = store.len(),
            records = store.record_count(),
            "restored snapshot"
        );
        self.store = store;
        self.linker = linker;
        self.run = snapshot.run;
        Ok(())
    }

    fn cluster_for(&self, ref_id: &str) -> Result<ClusterId> {
        self.store
            .cluster_of(ref_id)
            .cloned()
            .with_context(|| format!("record '{ref_id}' is not resolved"))
    }

    /// Force the clusters of two records together
    pub fn assert_same(&mut self, left_ref: &str, right_ref: &str) -> Result<ClusterId> {
        let left = self.cluster_for(left_ref)?;
        let right = self.cluster_for(right_ref)?;
        self.store.assert_same(&left, &right, self.run)
    }

    /// Keep the clusters of two records apart from now on
    pub fn assert_different(&mut self, left_ref: &str, right_ref: &str) -> Result<()> {
        let left = self.cluster_for(left_ref)?;
        let right = self.cluster_for(right_ref)?;
        self.store.assert_different(&left, &right)
    }
}
