//! Score fusion for incident search.
//!
//! Two signals per candidate: a lexical overlap score between the query
//! and the incident title, and (when both sides have embeddings) cosine
//! similarity. The vector score carries the ranking; the lexical score is
//! a bounded boost so short code-like queries still surface exact-word
//! hits.

/// Token-overlap score in [0,1]: matched query tokens / query tokens.
pub fn keyword_score(query: &str, text: &str) -> f32 {
    let query_tokens: Vec<String> = tokenize(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens: std::collections::HashSet<String> = tokenize(text).into_iter().collect();
    let matched = query_tokens
        .iter()
        .filter(|t| text_tokens.contains(*t))
        .count();
    matched as f32 / query_tokens.len() as f32
}

/// Cosine similarity; 0.0 for mismatched or empty vectors.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Fuse lexical and (optional) vector scores into one ranking score.
///
/// With a vector score the cosine leads and the lexical match adds a
/// capped boost; without one the lexical score stands alone.
pub fn fuse(text_score: f32, vector_score: Option<f32>) -> f32 {
    match vector_score {
        Some(v) => (v.max(0.0) + 0.3 * text_score).min(1.0),
        None => text_score,
    }
}

fn tokenize(s: &str) -> Vec<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_score_counts_overlap() {
        assert_eq!(keyword_score("login outage", "Login outage in prod"), 1.0);
        assert_eq!(keyword_score("login outage", "database migration"), 0.0);
        let half = keyword_score("login outage", "outage report");
        assert!((half - 0.5).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine(&[], &[]), 0.0);
        assert_eq!(cosine(&[1.0], &[1.0, 2.0]), 0.0);
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fusion_prefers_vector_with_lexical_boost() {
        let with_vec = fuse(1.0, Some(0.6));
        let text_only = fuse(1.0, None);
        assert!((with_vec - 0.9).abs() < 1e-6);
        assert_eq!(text_only, 1.0);
        assert!(fuse(1.0, Some(0.9)) <= 1.0);
    }
}
