//! Relation edge set merging.
//!
//! Edges are restatements of the same observed fact, so dedup is plain
//! last-write-wins on the composite key — no recency or metric heuristic.

use std::collections::BTreeMap;

use siga_core::{EdgeKey, RelationEdge};

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// Deduplicated union, ordered by composite key.
    pub merged: Vec<RelationEdge>,
    /// Number of keys not previously present in `existing`.
    pub admitted: usize,
}

/// Merge `incoming` into `existing`, deduplicated by
/// `(source, target, relation, provenance_url)`; incoming wins on collision.
/// Associative and idempotent: merging the same batch twice is a no-op.
pub fn merge_edges(existing: &[RelationEdge], incoming: &[RelationEdge]) -> MergeOutcome {
    let mut map: BTreeMap<EdgeKey, RelationEdge> = existing
        .iter()
        .map(|edge| (edge.key(), edge.clone()))
        .collect();

    let mut admitted = 0;
    for edge in incoming {
        let key = edge.key();
        if !map.contains_key(&key) {
            admitted += 1;
        }
        map.insert(key, edge.clone());
    }

    MergeOutcome {
        merged: map.into_values().collect(),
        admitted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use siga_core::RelationKind;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 24, hour, 0, 0).single().unwrap()
    }

    fn edge(source: &str, target: &str, relation: RelationKind, hour: u32) -> RelationEdge {
        RelationEdge {
            source: source.to_string(),
            target: target.to_string(),
            relation,
            provenance_url: "https://twitter.com/budi/status/1".to_string(),
            timestamp: ts(hour),
            scraped_at: ts(hour),
        }
    }

    #[test]
    fn distinct_keys_accumulate() {
        let a = vec![edge("@budi", "@ahmad", RelationKind::Mention, 9)];
        let b = vec![
            edge("@budi", "@ahmad", RelationKind::Retweet, 9),
            edge("@budi", "#politik", RelationKind::HashtagUse, 9),
        ];
        let out = merge_edges(&a, &b);
        assert_eq!(out.merged.len(), 3);
        assert_eq!(out.admitted, 2);
    }

    #[test]
    fn collision_keeps_incoming() {
        let a = vec![edge("@budi", "@ahmad", RelationKind::Mention, 9)];
        let b = vec![edge("@budi", "@ahmad", RelationKind::Mention, 11)];
        let out = merge_edges(&a, &b);
        assert_eq!(out.merged.len(), 1);
        assert_eq!(out.admitted, 0);
        assert_eq!(out.merged[0].scraped_at, ts(11));
    }

    #[test]
    fn merge_is_idempotent_and_associative() {
        let a = vec![
            edge("@budi", "@ahmad", RelationKind::Mention, 9),
            edge("@budi", "#politik", RelationKind::HashtagUse, 9),
        ];
        let b = vec![
            edge("@budi", "@ahmad", RelationKind::Mention, 10),
            edge("@citra", "PUBLIC", RelationKind::Post, 10),
        ];

        let ab = merge_edges(&a, &b);
        let abb = merge_edges(&ab.merged, &b);
        assert_eq!(ab.merged, abb.merged);
        assert_eq!(abb.admitted, 0);

        let bc = merge_edges(&b, &[]);
        let a_bc = merge_edges(&a, &bc.merged);
        assert_eq!(ab.merged, a_bc.merged);
    }

    #[test]
    fn duplicate_keys_within_incoming_count_once() {
        let b = vec![
            edge("@budi", "@ahmad", RelationKind::Mention, 9),
            edge("@budi", "@ahmad", RelationKind::Mention, 10),
        ];
        let out = merge_edges(&[], &b);
        assert_eq!(out.merged.len(), 1);
        assert_eq!(out.admitted, 1);
        assert_eq!(out.merged[0].scraped_at, ts(10));
    }
}
