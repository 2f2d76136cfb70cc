//! String-distance metrics over normalized surfaces
//!
//! Three independent views of "how close are these two strings":
//! edit-distance ratio, prefix-weighted alignment (Jaro-Winkler), and
//! character-trigram overlap. The fuzzy linker requires agreement from
//! at least two of the three before merging identities.

/// Scores from all three metrics for one candidate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScores {
    /// Normalized Levenshtein ratio in [0, 1].
    pub edit: f64,
    /// Jaro-Winkler: alignment with extra weight on a shared prefix.
    pub prefix_weighted: f64,
    /// Jaccard overlap of character trigram sets.
    pub trigram: f64,
}

impl SimilarityScores {
    /// Score a pair of already-normalized surfaces.
    pub fn of(a: &str, b: &str) -> Self {
        Self {
            edit: strsim::normalized_levenshtein(a, b),
            prefix_weighted: strsim::jaro_winkler(a, b),
            trigram: trigram_overlap(a, b),
        }
    }

    /// How many of the three metrics meet `threshold`.
    pub fn votes_at(&self, threshold: f64) -> usize {
        [self.edit, self.prefix_weighted, self.trigram]
            .iter()
            .filter(|s| **s >= threshold)
            .count()
    }
}

/// Jaccard overlap of the character-trigram sets of `a` and `b`.
///
/// Strings shorter than three characters have no trigrams; such pairs
/// score 1.0 only on exact equality.
pub fn trigram_overlap(a: &str, b: &str) -> f64 {
    let ta = trigrams(a);
    let tb = trigrams(b);
    if ta.is_empty() || tb.is_empty() {
        return if a == b && !a.is_empty() { 1.0 } else { 0.0 };
    }
    let intersection = ta.iter().filter(|t| tb.contains(*t)).count();
    let union = ta.len() + tb.len() - intersection;
    intersection as f64 / union as f64
}

fn trigrams(s: &str) -> Vec<[char; 3]> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < 3 {
        return Vec::new();
    }
    let mut grams: Vec<[char; 3]> = chars.windows(3).map(|w| [w[0], w[1], w[2]]).collect();
    grams.sort_unstable();
    grams.dedup();
    grams
}
