//! String similarity strategies in `[0, 1]`.

use std::collections::HashSet;

use strsim::jaro_winkler;

pub trait Similarity: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;
}

fn prepare(a: &str, b: &str) -> (String, String) {
    (a.trim().to_lowercase(), b.trim().to_lowercase())
}

/// Shorter/longer length ratio when one string contains the other.
fn containment_ratio(a: &str, b: &str) -> Option<f64> {
    if a.contains(b) || b.contains(a) {
        let (la, lb) = (a.chars().count(), b.chars().count());
        Some(la.min(lb) as f64 / la.max(lb) as f64)
    } else {
        None
    }
}

fn jaccard<T: Eq + std::hash::Hash>(a: &HashSet<T>, b: &HashSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Equality, then containment ratio, then whitespace-token Jaccard.
/// Used for job titles.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenSetSimilarity;

impl Similarity for TokenSetSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = prepare(a, b);
        if a == b {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if let Some(ratio) = containment_ratio(&a, &b) {
            return ratio;
        }
        let ta: HashSet<&str> = a.split_whitespace().collect();
        let tb: HashSet<&str> = b.split_whitespace().collect();
        jaccard(&ta, &tb)
    }
}

/// Equality, then containment ratio, then Jaccard over the sets of
/// non-whitespace characters. Used for company names.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharSetSimilarity;

impl Similarity for CharSetSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = prepare(a, b);
        if a == b {
            return 1.0;
        }
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        if let Some(ratio) = containment_ratio(&a, &b) {
            return ratio;
        }
        let ca: HashSet<char> = a.chars().filter(|c| !c.is_whitespace()).collect();
        let cb: HashSet<char> = b.chars().filter(|c| !c.is_whitespace()).collect();
        jaccard(&ca, &cb)
    }
}

/// Edit-distance flavoured alternative for callers that want fewer
/// containment false positives.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinklerSimilarity;

impl Similarity for JaroWinklerSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let (a, b) = prepare(a, b);
        jaro_winkler(&a, &b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_set_follows_equality_containment_then_overlap() {
        let sim = TokenSetSimilarity;
        assert_eq!(sim.similarity("Rust Engineer", " rust engineer "), 1.0);
        assert_eq!(sim.similarity("Engineer", "Rust Engineer"), 8.0 / 13.0);
        let overlap = sim.similarity("senior rust engineer", "staff rust engineer");
        assert!((overlap - 0.5).abs() < 1e-9);
        assert_eq!(sim.similarity("", "anything"), 0.0);
    }

    #[test]
    fn char_set_scores_near_spellings_high() {
        let sim = CharSetSimilarity;
        assert_eq!(sim.similarity("Acme", "ACME"), 1.0);
        assert!(sim.similarity("Acme Corp", "Acme Corporation") > 0.5);
        assert!(sim.similarity("Globex", "Initech") < 0.5);
    }

    #[test]
    fn jaro_winkler_is_case_insensitive() {
        let sim = JaroWinklerSimilarity;
        assert_eq!(sim.similarity("Initech", "INITECH"), 1.0);
        assert!(sim.similarity("Initech", "Initrode") > 0.8);
    }
}
