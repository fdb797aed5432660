//! Default constants for resolver configuration.
//!
//! All magic numbers are centralized here with documentation.

// =============================================================================
// Match Predicate Defaults
// =============================================================================

/// `LED` threshold when the spec carries no argument
pub const DEFAULT_LED_THRESHOLD: f64 = 0.8;

/// `QTR` threshold when the spec carries no argument
pub const DEFAULT_QTR_THRESHOLD: f64 = 0.25;

/// Threshold for `JACCARD`, `SORENSEN`, `TANIMOTO` and `TVERSKY`
pub const DEFAULT_COEFFICIENT_THRESHOLD: f64 = 0.8;

/// Tversky weight of features only in the left value
pub const DEFAULT_TVERSKY_ALPHA: f64 = 0.5;

/// Tversky weight of features only in the right value
pub const DEFAULT_TVERSKY_BETA: f64 = 0.5;

/// Smith-Waterman score for a matching character
pub const DEFAULT_SW_MATCH: f64 = 2.0;

/// Smith-Waterman score for a mismatching character
pub const DEFAULT_SW_MISMATCH: f64 = -1.0;

/// Smith-Waterman linear gap penalty
pub const DEFAULT_SW_GAP: f64 = -1.0;

/// Smith-Waterman normalized score threshold
pub const DEFAULT_SW_THRESHOLD: f64 = 0.8;

/// Normalized address score a pair must exceed
pub const ADDRESS_MATCH_THRESHOLD: f64 = 0.1;

// =============================================================================
// Date Defaults
// =============================================================================

/// Milliseconds in a day
pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Days per month used by `DATEDIFF`
pub const DAYS_PER_MONTH_DIVISOR: i64 = 30;

/// Days per year used by `DATEDIFF`
pub const DAYS_PER_YEAR_DIVISOR: i64 = 365;

// =============================================================================
// Blocking Defaults
// =============================================================================

/// Candidate count above which the candidate set is truncated
pub const DEFAULT_TRUNCATION_TRIGGER: usize = 100;

/// Truncated size is the candidate count divided by this
pub const DEFAULT_TRUNCATION_DIVISOR: usize = 3;

/// Upper bound on a truncated candidate set
pub const DEFAULT_TRUNCATION_CAP: usize = 100;

/// Sub-values of one attribute used for value-mode keys
/// Bounds the key fan-out of heavily merged records.
pub const MAX_KEY_VALUES_PER_ATTR: usize = 8;

/// Separator between hashed segments of a rule key
pub const KEY_SEGMENT_SEPARATOR: char = '\u{1F}';

/// Number of entries in the statistics top list
pub const STATS_TOP_N: usize = 10;

// =============================================================================
// Cluster Defaults
// =============================================================================

/// Prefix for generated cluster ids
pub const DEFAULT_CLUSTER_ID_PREFIX: &str = "C";

/// Digits in a generated cluster id
pub const CLUSTER_ID_WIDTH: usize = 8;

/// Rule id stamped on members joined by an explicit same-entity assertion
pub const ASSERT_SAME_RULE: &str = "@AssertSame";

/// Rule id stamped on a record that matched nothing
pub const NEW_CLUSTER_RULE: &str = "@New";
