//! Core domain model and value normalizers for SIGA.

pub mod normalize;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const CRATE_NAME: &str = "siga-core";

/// Source platform a content record was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Twitter,
    Tiktok,
    Instagram,
    Facebook,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
        }
    }
}

/// Canonical deduplicated representation of one piece of social content.
///
/// `canonical_url` is the sole deduplication anchor across capture cycles.
/// Records are only ever replaced wholesale during reconciliation, never
/// patched field-by-field, and never hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub platform: Platform,
    pub canonical_url: String,
    pub author: String,
    pub author_handle: String,
    pub text: String,
    /// Named non-negative engagement counters (likes, shares, comments, views).
    #[serde(default)]
    pub metrics: BTreeMap<String, u64>,
    pub timestamp: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
    /// Pre-supplied by the source provider when available; empty means
    /// "derive from text".
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub mentions: Vec<String>,
    #[serde(default)]
    pub is_retweet: bool,
    #[serde(default)]
    pub is_reply: bool,
}

impl ContentRecord {
    /// Counter value for `name`, with absent counters read as zero.
    pub fn metric(&self, name: &str) -> u64 {
        self.metrics.get(name).copied().unwrap_or(0)
    }

    /// Identity an outgoing relation edge is attributed to.
    pub fn source_identity(&self) -> &str {
        if self.author_handle.is_empty() {
            &self.author
        } else {
            &self.author_handle
        }
    }
}

/// Kind tag for a derived relationship edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Mention,
    Reply,
    Retweet,
    SelfMention,
    HashtagUse,
    EntityMention,
    Post,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Mention => "mention",
            RelationKind::Reply => "reply",
            RelationKind::Retweet => "retweet",
            RelationKind::SelfMention => "self_mention",
            RelationKind::HashtagUse => "hashtag_use",
            RelationKind::EntityMention => "entity_mention",
            RelationKind::Post => "post",
        }
    }
}

/// Composite deduplication key of a relation edge.
pub type EdgeKey = (String, String, RelationKind, String);

/// Directed, typed link between a content author and a target (user,
/// hashtag, or watched entity), derived from one content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub source: String,
    pub target: String,
    pub relation: RelationKind,
    pub provenance_url: String,
    pub timestamp: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
}

impl RelationEdge {
    pub fn key(&self) -> EdgeKey {
        (
            self.source.clone(),
            self.target.clone(),
            self.relation,
            self.provenance_url.clone(),
        )
    }
}

/// Loosely-shaped intake record as delivered by a source provider, before
/// boundary validation. Every field is optional; metrics arrive either as
/// numbers or as magnitude-suffixed strings ("12.3K").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub canonical_url: Option<String>,
    pub platform: Option<Platform>,
    pub author: Option<String>,
    pub author_handle: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, JsonValue>,
    pub timestamp: Option<String>,
    pub scraped_at: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub mentions: Vec<String>,
    pub is_retweet: Option<bool>,
    pub is_reply: Option<bool>,
}
