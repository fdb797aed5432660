//! Blocking index statistics.
//!
//! Computed on demand from the index's bucket sizes and query counters, and
//! rendered as a plain-text report for tuning rule sets.

use crate::config::defaults::{KEY_SEGMENT_SEPARATOR, STATS_TOP_N};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStatistics {
    pub key_count: usize,
    /// Sum of bucket sizes
    pub total_tokens: usize,
    /// Distinct indexed records
    pub unique_tokens: usize,
    pub min_block: usize,
    pub max_block: usize,
    pub mean_block: f64,
    pub std_dev: f64,
    pub skewness: f64,
    /// Excess kurtosis
    pub kurtosis: f64,
    /// Largest blocks, largest first, ties by key
    pub top_blocks: Vec<(String, usize)>,
    /// Raw candidate-union size -> queries
    pub histogram: BTreeMap<usize, usize>,
    pub queries: usize,
    pub truncations: usize,
}

impl IndexStatistics {
    pub fn compute<'a>(
        blocks: impl IntoIterator<Item = (&'a str, usize)>,
        unique_tokens: usize,
        histogram: BTreeMap<usize, usize>,
        queries: usize,
        truncations: usize,
    ) -> Self {
        let mut blocks: Vec<(&str, usize)> = blocks.into_iter().collect();
        let mut stats = IndexStatistics {
            unique_tokens,
            histogram,
            queries,
            truncations,
            ..Default::default()
        };
        if blocks.is_empty() {
            return stats;
        }

        let n = blocks.len() as f64;
        let sizes: Vec<f64> = blocks.iter().map(|(_, size)| *size as f64).collect();
        let mean = sizes.iter().sum::<f64>() / n;
        let moment = |power: i32| sizes.iter().map(|s| (s - mean).powi(power)).sum::<f64>() / n;
        let m2 = moment(2);
        let m3 = moment(3);
        let m4 = moment(4);

        stats.key_count = blocks.len();
        stats.total_tokens = blocks.iter().map(|(_, size)| size).sum();
        stats.min_block = blocks.iter().map(|(_, size)| *size).min().unwrap_or(0);
        stats.max_block = blocks.iter().map(|(_, size)| *size).max().unwrap_or(0);
        stats.mean_block = mean;
        stats.std_dev = m2.sqrt();
        if m2 > 0.0 {
            stats.skewness = m3 / m2.powf(1.5);
            stats.kurtosis = m4 / (m2 * m2) - 3.0;
        }

        blocks.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        stats.top_blocks = blocks
            .into_iter()
            .take(STATS_TOP_N)
            .map(|(key, size)| (key.to_string(), size))
            .collect();
        stats
    }
}

fn display_key(key: &str) -> String {
    key.replace(KEY_SEGMENT_SEPARATOR, "+")
}

impl fmt::Display for IndexStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index statistics")?;
        writeln!(f, "  keys:           {}", self.key_count)?;
        writeln!(f, "  total tokens:   {}", self.total_tokens)?;
        writeln!(f, "  unique tokens:  {}", self.unique_tokens)?;
        writeln!(f, "  block min/max:  {} / {}", self.min_block, self.max_block)?;
        writeln!(f, "  block mean:     {:.3}", self.mean_block)?;
        writeln!(f, "  block std dev:  {:.3}", self.std_dev)?;
        writeln!(f, "  skewness:       {:.3}", self.skewness)?;
        writeln!(f, "  kurtosis:       {:.3}", self.kurtosis)?;
        writeln!(f, "  queries:        {} ({} truncated)", self.queries, self.truncations)?;
        writeln!(f, "Top {} blocks", self.top_blocks.len())?;
        for (rank, (key, size)) in self.top_blocks.iter().enumerate() {
            writeln!(f, "  {:>2}. {:>8}  {}", rank + 1, size, display_key(key))?;
        }
        writeln!(f, "Candidate set sizes")?;
        for (size, count) in &self.histogram {
            writeln!(f, "  {size:>8}: {count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_index() {
        let stats = IndexStatistics::compute(Vec::<(&str, usize)>::new(), 0, BTreeMap::new(), 0, 0);
        assert_eq!(stats.key_count, 0);
        assert_eq!(stats.skewness, 0.0);
        assert!(stats.top_blocks.is_empty());
    }

    #[test]
    fn test_moments() {
        let blocks = [("a", 1), ("b", 1), ("c", 1), ("d", 5)];
        let stats = IndexStatistics::compute(blocks, 6, BTreeMap::new(), 0, 0);
        assert_eq!(stats.key_count, 4);
        assert_eq!(stats.total_tokens, 8);
        assert_eq!((stats.min_block, stats.max_block), (1, 5));
        assert!((stats.mean_block - 2.0).abs() < 1e-9);
        // Deviations -1,-1,-1,3: m2 = 3, m3 = 6, m4 = 21.
        assert!((stats.skewness - 6.0 / 3f64.powf(1.5)).abs() < 1e-9);
        assert!((stats.kurtosis - (21.0 / 9.0 - 3.0)).abs() < 1e-9);
        assert_eq!(stats.top_blocks[0], ("d".to_string(), 5));
        assert_eq!(stats.top_blocks[1], ("a".to_string(), 1));
    }

    #[test]
    fn test_report_lists_top_blocks_and_histogram() {
        let mut histogram = BTreeMap::new();
        histogram.insert(3, 2);
        let key = format!("name{KEY_SEGMENT_SEPARATOR}S530");
        let stats = IndexStatistics::compute([(key.as_str(), 3)], 3, histogram, 2, 0);
        let report = stats.to_string();
        assert!(report.contains("name+S530"));
        assert!(report.contains("keys:           1"));
        assert!(report.contains("       3: 2"));
    }
}
