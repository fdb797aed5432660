//! Edit-distance, q-gram and alignment scores used by the ratio predicates.
//!
//! Scores are computed on upper-cased input so that threshold predicates are
//! case-insensitive; `EXACT` remains the only case-sensitive comparison.

use std::collections::{HashMap, HashSet};

/// Normalized Levenshtein score: `1 - distance / max_len`.
pub fn led_score(s: &str, t: &str) -> f64 {
    strsim::normalized_levenshtein(&s.to_uppercase(), &t.to_uppercase())
}

/// True when `t` is `s` with exactly one pair of adjacent characters swapped.
pub fn is_single_transposition(s: &str, t: &str) -> bool {
    let s: Vec<char> = s.chars().collect();
    let t: Vec<char> = t.chars().collect();
    if s.len() != t.len() || s.len() < 2 {
        return false;
    }
    let diffs: Vec<usize> = (0..s.len()).filter(|&idx| s[idx] != t[idx]).collect();
    match diffs.as_slice() {
        [first, second] if *second == first + 1 => {
            s[*first] == t[*second] && s[*second] == t[*first]
        }
        _ => false,
    }
}

/// Q-gram tetrahedral ratio.
///
/// Every q-gram of the shorter string, for every q from 1 to its length, that
/// also occurs in the longer string contributes q. The sum is divided by the
/// tetrahedral number `n(n+1)(n+2)/6`, the total weight of all q-grams of an
/// `n`-character string, so identical strings score 1.0.
pub fn qtr_score(s: &str, t: &str) -> f64 {
    let s = s.to_uppercase();
    let t = t.to_uppercase();
    let (short, long) = if s.chars().count() <= t.chars().count() {
        (s, t)
    } else {
        (t, s)
    };
    let chars: Vec<char> = short.chars().collect();
    let n = chars.len();
    if n == 0 {
        return 0.0;
    }
    let mut weight = 0usize;
    for q in 1..=n {
        for start in 0..=(n - q) {
            let gram: String = chars[start..start + q].iter().collect();
            if long.contains(&gram) {
                weight += q;
            }
        }
    }
    let tetrahedral = n * (n + 1) * (n + 2) / 6;
    weight as f64 / tetrahedral as f64
}

/// Set- and vector-based bigram coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coefficient {
    Jaccard,
    Sorensen,
    Tanimoto,
}

impl Coefficient {
    pub fn score(self, s: &str, t: &str) -> f64 {
        match self {
            Coefficient::Jaccard => jaccard(s, t),
            Coefficient::Sorensen => sorensen(s, t),
            Coefficient::Tanimoto => tanimoto(s, t),
        }
    }
}

fn bigram_counts(value: &str) -> HashMap<String, usize> {
    let chars: Vec<char> = value.to_uppercase().chars().collect();
    let mut counts = HashMap::new();
    if chars.len() == 1 {
        counts.insert(chars[0].to_string(), 1);
        return counts;
    }
    for pair in chars.windows(2) {
        *counts.entry(pair.iter().collect::<String>()).or_insert(0) += 1;
    }
    counts
}

fn bigram_set(value: &str) -> HashSet<String> {
    bigram_counts(value).into_keys().collect()
}

pub fn jaccard(s: &str, t: &str) -> f64 {
    let a = bigram_set(s);
    let b = bigram_set(t);
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

pub fn sorensen(s: &str, t: &str) -> f64 {
    let a = bigram_set(s);
    let b = bigram_set(t);
    let total = a.len() + b.len();
    if total == 0 {
        return 0.0;
    }
    2.0 * a.intersection(&b).count() as f64 / total as f64
}

/// Tanimoto on bigram frequency vectors: `a·b / (|a|² + |b|² - a·b)`.
pub fn tanimoto(s: &str, t: &str) -> f64 {
    let a = bigram_counts(s);
    let b = bigram_counts(t);
    let dot: usize = a
        .iter()
        .filter_map(|(gram, count)| b.get(gram).map(|other| count * other))
        .sum();
    let norm_a: usize = a.values().map(|count| count * count).sum();
    let norm_b: usize = b.values().map(|count| count * count).sum();
    let denominator = (norm_a + norm_b) as f64 - dot as f64;
    if denominator <= 0.0 {
        return 0.0;
    }
    dot as f64 / denominator
}

/// Tversky index: `|A∩B| / (|A∩B| + α|A−B| + β|B−A|)`.
pub fn tversky(s: &str, t: &str, alpha: f64, beta: f64) -> f64 {
    let a = bigram_set(s);
    let b = bigram_set(t);
    let common = a.intersection(&b).count() as f64;
    let only_a = a.difference(&b).count() as f64;
    let only_b = b.difference(&a).count() as f64;
    let denominator = common + alpha * only_a + beta * only_b;
    if denominator <= 0.0 {
        return 0.0;
    }
    common / denominator
}

/// Smith-Waterman local alignment with a linear gap penalty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmithWaterman {
    pub match_score: f64,
    pub mismatch: f64,
    pub gap: f64,
    pub threshold: f64,
}

impl SmithWaterman {
    /// Best local alignment score divided by the best achievable score for
    /// the shorter string.
    pub fn score(&self, s: &str, t: &str) -> f64 {
        let a: Vec<char> = s.to_uppercase().chars().collect();
        let b: Vec<char> = t.to_uppercase().chars().collect();
        let shorter = a.len().min(b.len());
        if shorter == 0 || self.match_score <= 0.0 {
            return 0.0;
        }

        let mut previous = vec![0.0f64; b.len() + 1];
        let mut current = vec![0.0f64; b.len() + 1];
        let mut best = 0.0f64;
        for i in 1..=a.len() {
            for j in 1..=b.len() {
                let substitution = if a[i - 1] == b[j - 1] {
                    self.match_score
                } else {
                    self.mismatch
                };
                let cell = (previous[j - 1] + substitution)
                    .max(previous[j] + self.gap)
                    .max(current[j - 1] + self.gap)
                    .max(0.0);
                current[j] = cell;
                best = best.max(cell);
            }
            std::mem::swap(&mut previous, &mut current);
            current.iter_mut().for_each(|cell| *cell = 0.0);
        }
        best / (self.match_score * shorter as f64)
    }

    pub fn is_match(&self, s: &str, t: &str) -> bool {
        self.score(s, t) >= self.threshold
    }
}
