//! Top-K ranking shared by every [`VectorStore`](crate::store::VectorStore)
//! implementation.
//!
//! Stores compute a cosine score per candidate and hand the candidates
//! here. Ordering is score descending, then insertion ordinal ascending,
//! so equal scores come back earliest-ingested first and results are
//! deterministic across runs.

use std::cmp::Ordering;

use crate::models::ScoredRecord;

/// A scored record plus the store-assigned insertion ordinal.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub ordinal: u64,
    pub record: ScoredRecord,
}

/// Sort candidates and keep the best `k`.
///
/// Returns every candidate when fewer than `k` exist. NaN scores sort
/// last.
pub fn top_k(mut candidates: Vec<Candidate>, k: usize) -> Vec<ScoredRecord> {
    candidates.sort_by(|a, b| {
        compare_scores(a.record.score, b.record.score).then(a.ordinal.cmp(&b.ordinal))
    });
    candidates.truncate(k);
    candidates.into_iter().map(|c| c.record).collect()
}

fn compare_scores(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordMetadata;
    use std::collections::BTreeMap;

    fn cand(id: &str, ordinal: u64, score: f64) -> Candidate {
        Candidate {
            ordinal,
            record: ScoredRecord {
                id: id.to_string(),
                score,
                metadata: RecordMetadata {
                    source_id: "s".into(),
                    filename: "s".into(),
                    sequence_index: 0,
                    char_offset: 0,
                    content: String::new(),
                    content_hash: String::new(),
                    embedding_model: String::new(),
                    ingested_at: String::new(),
                    extra: BTreeMap::new(),
                },
            },
        }
    }

    fn ids(records: &[ScoredRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_orders_by_score_desc() {
        let out = top_k(vec![cand("a", 0, 0.1), cand("b", 1, 0.9), cand("c", 2, 0.5)], 10);
        assert_eq!(ids(&out), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let out = top_k(vec![cand("late", 9, 0.5), cand("early", 2, 0.5), cand("mid", 5, 0.5)], 2);
        assert_eq!(ids(&out), vec!["early", "mid"]);
    }

    #[test]
    fn test_k_larger_than_candidates() {
        let out = top_k(vec![cand("a", 0, 0.3)], 50);
        assert_eq!(out.len(), 1);
        assert!(top_k(Vec::new(), 5).is_empty());
    }

    #[test]
    fn test_nan_sorts_last() {
        let out = top_k(vec![cand("nan", 0, f64::NAN), cand("ok", 1, -0.2)], 2);
        assert_eq!(ids(&out), vec!["ok", "nan"]);
    }
}
