//! Unified configuration for the resolver.
//!
//! Configuration is loaded with precedence: overrides > Env vars > Config file > Defaults
//!
//! # Example config file (oyster.toml)
//! ```toml
//! attributes = ["first", "last", "ssn", "dob"]
//! run_id = 2
//!
//! [blocking]
//! mode = "rules"
//!
//! [[blocking.rules]]
//! id = "name"
//! segments = [{ attribute = "last", hash = "SOUNDEX" }, { attribute = "first", hash = "EXACT(1)" }]
//!
//! [[matching.rules]]
//! id = "R1"
//! terms = [{ attribute = "ssn", spec = "EXACT" }, { attribute = "last", spec = "LED(0.8)" }]
//! ```

pub mod defaults;

pub use defaults::*;

use crate::error::RuleError;
use crate::matcher::nickname::NicknameTable;
use crate::model::{Encoding, RunId, Schema};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Main configuration for a resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Attribute names in schema order; reserved attributes are added automatically
    pub attributes: Vec<String>,
    /// Run being executed
    pub run_id: u32,
    /// Record traces when records move between clusters
    pub trace: bool,
    /// Storage encoding for identity records
    pub encoding: Encoding,
    /// Prefix for generated cluster ids
    pub cluster_id_prefix: String,
    pub blocking: BlockingConfig,
    pub matching: MatchingConfig,
    /// Extra alias groups added to the built-in nickname table
    pub nicknames: Vec<Vec<String>>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            attributes: Vec::new(),
            run_id: 1,
            trace: true,
            encoding: Encoding::default(),
            cluster_id_prefix: DEFAULT_CLUSTER_ID_PREFIX.to_string(),
            blocking: BlockingConfig::default(),
            matching: MatchingConfig::default(),
            nicknames: Vec::new(),
        }
    }
}

impl ResolverConfig {
    /// Load configuration with precedence: overrides > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - Programmatic overrides applied last
    pub fn load(
        config_path: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(ResolverConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with OYSTER_ prefix; `__` separates nesting
        figment = figment.merge(Env::prefixed("OYSTER_").split("__"));

        // Layer 3: overrides
        figment = figment.merge(Serialized::defaults(overrides));

        let config: ResolverConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment and optional config file only
    pub fn from_env(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    /// Parse a TOML document on top of the defaults, without env lookup
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: ResolverConfig = Figment::new()
            .merge(Serialized::defaults(ResolverConfig::default()))
            .merge(Toml::string(toml))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the index or rule set meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blocking.truncation.divisor == 0 {
            return Err(ConfigError::Invalid(
                "blocking.truncation.divisor must be greater than zero".to_string(),
            ));
        }
        if self.cluster_id_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "cluster_id_prefix must not be blank".to_string(),
            ));
        }
        check_unique_ids("matching.rules", self.matching.rules.iter().map(|r| &r.id))?;
        check_unique_ids("blocking.rules", self.blocking.rules.iter().map(|r| &r.id))?;
        Ok(())
    }

    pub fn run(&self) -> RunId {
        RunId(self.run_id)
    }

    /// Schema built from the configured attributes
    pub fn schema(&self) -> Result<Arc<Schema>, RuleError> {
        Schema::new(self.attributes.iter().map(String::as_str))
    }

    /// Built-in nickname table extended with the configured groups
    pub fn nickname_table(&self) -> NicknameTable {
        let mut table = NicknameTable::builtin().clone();
        for group in &self.nicknames {
            table.insert_group(group.iter().map(String::as_str));
        }
        table
    }
}

fn check_unique_ids<'a>(
    section: &str,
    ids: impl Iterator<Item = &'a String>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("{section}: rule id must not be blank")));
        }
        if !seen.insert(id) {
            return Err(ConfigError::Invalid(format!("{section}: duplicate rule id '{id}'")));
        }
    }
    Ok(())
}

/// How blocking keys are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BlockingMode {
    /// Keys from configured index rules
    #[default]
    Rules,
    /// Every non-reserved attribute value is its own key
    Values,
    /// One key for every record; disables blocking
    Universal,
}

/// Blocking index configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingConfig {
    pub mode: BlockingMode,
    pub rules: Vec<IndexRuleConfig>,
    pub truncation: TruncationConfig,
}

/// Candidate truncation policy.
///
/// When a candidate union exceeds `trigger`, only the
/// `min(len / divisor, cap)` most frequent candidates are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationConfig {
    pub trigger: usize,
    pub divisor: usize,
    pub cap: usize,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            trigger: DEFAULT_TRUNCATION_TRIGGER,
            divisor: DEFAULT_TRUNCATION_DIVISOR,
            cap: DEFAULT_TRUNCATION_CAP,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRuleConfig {
    pub id: String,
    pub segments: Vec<SegmentConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub attribute: String,
    /// Hash spec such as `SOUNDEX`, `NYSIIS(4)` or `SCAN(...)`
    pub hash: String,
}

/// Identity rule configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub rules: Vec<MatchRuleConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRuleConfig {
    pub id: String,
    pub terms: Vec<TermConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermConfig {
    pub attribute: String,
    /// Match spec such as `EXACT`, `~SOUNDEX` or `LED(0.8)`
    pub spec: String,
}

/// Overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking: Option<BlockingOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<BlockingMode>,
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Figment(#[from] figment::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
