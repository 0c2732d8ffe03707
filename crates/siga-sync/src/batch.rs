//! Batch intake: boundary validation of loosely-shaped provider items.
//!
//! Source providers deliver already-mapped but stringly-typed items. This is
//! the single place where those become typed `ContentRecord`s: timestamps and
//! counters run through the total normalizers, non-essential gaps are nulled,
//! and only a missing `canonical_url` drops an item (counted, never fatal).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use siga_core::normalize::{normalize_metric, normalize_timestamp_at};
use siga_core::{ContentRecord, Platform, RawItem};
use thiserror::Error;
use tracing::warn;

/// One fully delivered capture cycle's worth of raw items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBatch {
    pub platform: Platform,
    #[serde(default)]
    pub query: Option<String>,
    pub items: Vec<RawItem>,
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("reading batch {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("batch {path} is not valid JSON: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn load_batch(path: impl AsRef<Path>) -> Result<RawBatch, BatchError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| BatchError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| BatchError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone)]
pub struct BatchIntake {
    pub records: Vec<ContentRecord>,
    /// Items discarded for lacking the one essential field.
    pub dropped_missing_url: usize,
}

fn metric_value(value: &JsonValue) -> u64 {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v > 0.0).map(|v| v as u64))
            .unwrap_or(0),
        JsonValue::String(s) => normalize_metric(s),
        _ => 0,
    }
}

/// Validate and normalize one raw batch into typed records.
pub fn map_batch(batch: &RawBatch, now: DateTime<Utc>) -> BatchIntake {
    let mut records = Vec::with_capacity(batch.items.len());
    let mut dropped_missing_url = 0;

    for item in &batch.items {
        let canonical_url = item
            .canonical_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        let Some(canonical_url) = canonical_url else {
            dropped_missing_url += 1;
            continue;
        };

        records.push(ContentRecord {
            platform: item.platform.unwrap_or(batch.platform),
            canonical_url: canonical_url.to_string(),
            author: item.author.clone().unwrap_or_default(),
            author_handle: item.author_handle.clone().unwrap_or_default(),
            text: item.text.clone().unwrap_or_default(),
            metrics: item
                .metrics
                .iter()
                .map(|(name, value)| (name.clone(), metric_value(value)))
                .collect(),
            timestamp: normalize_timestamp_at(item.timestamp.as_deref(), now),
            scraped_at: normalize_timestamp_at(item.scraped_at.as_deref(), now),
            hashtags: item.hashtags.clone(),
            mentions: item.mentions.clone(),
            is_retweet: item.is_retweet.unwrap_or(false),
            is_reply: item.is_reply.unwrap_or(false),
        });
    }

    if dropped_missing_url > 0 {
        warn!(
            dropped = dropped_missing_url,
            platform = batch.platform.as_str(),
            "dropped items without canonical_url"
        );
    }

    BatchIntake {
        records,
        dropped_missing_url,
    }
}
