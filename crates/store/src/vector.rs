//! Vector similarity utilities.
//!
//! Pure-Rust brute-force nearest-neighbor ranking, shared by the in-memory
//! and SQLite collections.

use policygate_core::{ChunkRecord, MetadataFilter, ScoredChunk};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank records matching `filter` by cosine similarity to `query`.
///
/// Returns at most `k` hits sorted by descending similarity; ties keep the
/// input order so results are stable.
pub fn rank_by_similarity<'a, I>(
    records: I,
    query: &[f32],
    k: usize,
    filter: &MetadataFilter,
) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = &'a ChunkRecord>,
{
    let mut scored: Vec<ScoredChunk> = records
        .into_iter()
        .filter(|r| filter.matches(&r.metadata))
        .map(|r| ScoredChunk {
            id: r.id.clone(),
            text: r.text.clone(),
            metadata: r.metadata.clone(),
            score: cosine_similarity(&r.embedding, query),
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use policygate_core::Metadata;

    fn record(id: &str, embedding: Vec<f32>, state: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.into(),
            text: format!("Content for {id}"),
            embedding,
            metadata: Metadata::from([("state".to_string(), state.to_string())]),
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn ranks_by_similarity() {
        let records = vec![
            record("a", vec![0.0, 1.0, 0.0], "Goa"),
            record("b", vec![1.0, 0.0, 0.0], "Goa"),
            record("c", vec![0.5, 0.5, 0.0], "Goa"),
        ];
        let hits = rank_by_similarity(&records, &[1.0, 0.0, 0.0], 10, &MetadataFilter::new());
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn applies_filter_before_limit() {
        let records = vec![
            record("best", vec![1.0, 0.0], "Kerala"),
            record("ok", vec![0.7, 0.7], "Goa"),
            record("worst", vec![0.0, 1.0], "Goa"),
        ];
        let filter = MetadataFilter::new().with("state", "Goa");
        let hits = rank_by_similarity(&records, &[1.0, 0.0], 1, &filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "ok");
    }

    #[test]
    fn ties_keep_input_order() {
        let records = vec![
            record("first", vec![1.0, 0.0], "Goa"),
            record("second", vec![1.0, 0.0], "Goa"),
        ];
        let hits = rank_by_similarity(&records, &[1.0, 0.0], 2, &MetadataFilter::new());
        assert_eq!(hits[0].id, "first");
        assert_eq!(hits[1].id, "second");
    }
}
