//! Snapshot reconciliation for the canonical content set.
//!
//! One generalized implementation parametrized by the tracked metric field
//! names, replacing the near-identical per-platform merge logic the crawlers
//! would otherwise each carry.

use std::collections::BTreeMap;

use siga_core::ContentRecord;

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Exactly one record per `canonical_url`, ordered by key.
    pub merged: Vec<ContentRecord>,
    /// Records admitted or replacing an existing record this cycle. Relation
    /// extraction runs over these and only these.
    pub winners: Vec<ContentRecord>,
    pub new_records: usize,
    pub superseded: usize,
}

/// Incoming replaces existing when the capture is strictly later OR any
/// tracked metric strictly grew. The triggers are independent: a later
/// capture wins even if its metrics regressed (scrape noise), and a higher
/// metric at an equal-or-earlier capture time also wins. Missing metrics
/// compare as zero.
fn prefer_incoming(
    existing: &ContentRecord,
    incoming: &ContentRecord,
    metric_fields: &[String],
) -> bool {
    if incoming.scraped_at > existing.scraped_at {
        return true;
    }
    metric_fields
        .iter()
        .any(|field| incoming.metric(field) > existing.metric(field))
}

/// Collapse one side to a single record per key, later entries challenging
/// earlier ones under the same selection rule. Keeps the output invariant
/// intact even when a provider delivers the same URL twice in one batch.
fn fold_side(
    records: &[ContentRecord],
    metric_fields: &[String],
) -> BTreeMap<String, ContentRecord> {
    let mut by_url: BTreeMap<String, ContentRecord> = BTreeMap::new();
    for record in records {
        match by_url.get(&record.canonical_url) {
            Some(held) if !prefer_incoming(held, record, metric_fields) => {}
            _ => {
                by_url.insert(record.canonical_url.clone(), record.clone());
            }
        }
    }
    by_url
}

/// Merge two snapshots of the canonical set keyed by `canonical_url`.
pub fn reconcile(
    existing: &[ContentRecord],
    incoming: &[ContentRecord],
    metric_fields: &[String],
) -> ReconcileOutcome {
    let existing_by = fold_side(existing, metric_fields);
    let incoming_by = fold_side(incoming, metric_fields);

    let mut merged = existing_by.clone();
    let mut winners = Vec::new();
    let mut new_records = 0;
    let mut superseded = 0;

    for (url, candidate) in incoming_by {
        match existing_by.get(&url) {
            None => {
                new_records += 1;
                winners.push(candidate.clone());
                merged.insert(url, candidate);
            }
            Some(held) => {
                if prefer_incoming(held, &candidate, metric_fields) {
                    superseded += 1;
                    winners.push(candidate.clone());
                    merged.insert(url, candidate);
                }
            }
        }
    }

    ReconcileOutcome {
        merged: merged.into_values().collect(),
        winners,
        new_records,
        superseded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use siga_core::Platform;

    fn metric_fields() -> Vec<String> {
        ["likes", "shares", "comments", "views"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 24, hour, 0, 0).single().unwrap()
    }

    fn rec(url: &str, likes: u64, scraped_hour: u32) -> ContentRecord {
        ContentRecord {
            platform: Platform::Twitter,
            canonical_url: url.to_string(),
            author: "budi".to_string(),
            author_handle: "@budi".to_string(),
            text: "politik hari ini".to_string(),
            metrics: [("likes".to_string(), likes)].into_iter().collect(),
            timestamp: ts(6),
            scraped_at: ts(scraped_hour),
            hashtags: Vec::new(),
            mentions: Vec::new(),
            is_retweet: false,
            is_reply: false,
        }
    }

    #[test]
    fn empty_sides_are_identity() {
        let set = vec![rec("https://t.co/a", 5, 9), rec("https://t.co/b", 2, 9)];
        let left = reconcile(&set, &[], &metric_fields());
        assert_eq!(left.merged, set);
        assert_eq!(left.new_records, 0);
        assert_eq!(left.superseded, 0);
        assert!(left.winners.is_empty());

        let right = reconcile(&[], &set, &metric_fields());
        assert_eq!(right.merged, set);
        assert_eq!(right.new_records, 2);
        assert_eq!(right.winners.len(), 2);
    }

    #[test]
    fn output_keys_are_unique() {
        let existing = vec![rec("https://t.co/a", 5, 9)];
        let incoming = vec![
            rec("https://t.co/a", 6, 10),
            rec("https://t.co/a", 7, 11),
            rec("https://t.co/b", 1, 10),
        ];
        let out = reconcile(&existing, &incoming, &metric_fields());
        let mut urls: Vec<_> = out.merged.iter().map(|r| &r.canonical_url).collect();
        urls.dedup();
        assert_eq!(urls.len(), out.merged.len());
        assert_eq!(out.merged.len(), 2);
    }

    #[test]
    fn higher_metric_at_same_capture_time_wins() {
        let existing = vec![rec("https://t.co/u", 5, 9)];
        let incoming = vec![rec("https://t.co/u", 10, 9)];
        let out = reconcile(&existing, &incoming, &metric_fields());
        assert_eq!(out.merged[0].metric("likes"), 10);
        assert_eq!(out.superseded, 1);
        assert_eq!(out.winners.len(), 1);
    }

    #[test]
    fn later_capture_wins_despite_metric_regression() {
        let existing = vec![rec("https://t.co/u", 10, 9)];
        let incoming = vec![rec("https://t.co/u", 3, 11)];
        let out = reconcile(&existing, &incoming, &metric_fields());
        assert_eq!(out.merged[0].metric("likes"), 3);
        assert_eq!(out.merged[0].scraped_at, ts(11));
        assert_eq!(out.superseded, 1);
    }

    #[test]
    fn stale_equal_capture_keeps_existing() {
        let existing = vec![rec("https://t.co/u", 10, 9)];
        let incoming = vec![rec("https://t.co/u", 10, 9)];
        let out = reconcile(&existing, &incoming, &metric_fields());
        assert_eq!(out.superseded, 0);
        assert!(out.winners.is_empty());
        assert_eq!(out.merged, existing);
    }

    #[test]
    fn missing_metrics_compare_as_zero() {
        let mut existing = rec("https://t.co/u", 0, 9);
        existing.metrics.clear();
        let incoming = vec![rec("https://t.co/u", 1, 9)];
        let out = reconcile(&[existing], &incoming, &metric_fields());
        assert_eq!(out.merged[0].metric("likes"), 1);
        assert_eq!(out.superseded, 1);
    }

    #[test]
    fn untracked_metrics_do_not_trigger_replacement() {
        let existing = vec![rec("https://t.co/u", 5, 9)];
        let mut candidate = rec("https://t.co/u", 5, 9);
        candidate.metrics.insert("bookmarks".to_string(), 99);
        let out = reconcile(&existing, &[candidate], &metric_fields());
        assert_eq!(out.superseded, 0);
        assert_eq!(out.merged, existing);
    }
}
