//! # Errors
//!
//! Typed failures for rule parsing and record/cluster handling. Pipeline entry
//! points wrap these in `anyhow::Error` with context.

use thiserror::Error;

/// Failure to parse a match or index rule specification string.
///
/// These are configuration errors: a rule that parses incorrectly would
/// silently corrupt clustering, so they are never downgraded to a mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("empty rule specification")]
    EmptySpec,
    #[error("unbalanced parentheses in rule specification '{0}'")]
    UnbalancedParens(String),
    #[error("rule '{spec}': argument {position} ('{value}') is not a valid number")]
    InvalidNumber {
        spec: String,
        position: usize,
        value: String,
    },
    #[error("rule '{spec}': missing required argument {position}")]
    MissingArgument { spec: String, position: usize },
    #[error("rule '{spec}': argument {position} has unsupported value '{value}'")]
    InvalidArgument {
        spec: String,
        position: usize,
        value: String,
    },
    #[error("unknown index hash function '{0}'")]
    UnknownHash(String),
    #[error("{0} attributes exceed the 65536 available tags")]
    TooManyAttributes(usize),
}

/// Failure while building records or mutating the cluster store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("record has no @RefID")]
    MissingRefId,
    #[error("attribute '{0}' is not defined in the schema")]
    UnknownAttribute(String),
    #[error("cluster '{0}' does not exist")]
    UnknownCluster(String),
    #[error("cluster '{0}' was built under a different schema")]
    SchemaMismatch(String),
    #[error("clusters '{0}' and '{1}' are asserted different")]
    AssertedDifferent(String, String),
    #[error("invalid rule: {0}")]
    Rule(#[from] RuleError),
}
