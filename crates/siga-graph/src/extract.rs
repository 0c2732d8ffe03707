//! Derives typed relation edges from one reconciled content record.
//!
//! Rules run in a fixed priority and are independently applicable: an
//! "RT @user" tweet yields both a mention edge and a retweet edge to the
//! same target. Every emitted edge inherits the record's provenance URL and
//! both timestamps.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use siga_core::{ContentRecord, RelationEdge, RelationKind};

static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(\w+)").unwrap());
static HASHTAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\w+)").unwrap());
static RETWEET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"RT @(\w+)").unwrap());

/// Static list of watched entity names, compiled to whole-word
/// case-insensitive matchers once up front.
#[derive(Debug, Clone)]
pub struct EntityWatchlist {
    names: Vec<String>,
    patterns: Vec<Regex>,
}

impl EntityWatchlist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|n| !n.trim().is_empty())
            .collect();
        let patterns = names
            .iter()
            .map(|name| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name))).expect("escaped literal")
            })
            .collect();
        Self { names, patterns }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn matches<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> {
        self.names
            .iter()
            .zip(&self.patterns)
            .filter(move |(_, pattern)| pattern.is_match(text))
            .map(|(name, _)| name.as_str())
    }
}

impl Default for EntityWatchlist {
    /// Watchlist used when no profile overrides it: Indonesian political
    /// institutions, figures, parties, and major cities.
    fn default() -> Self {
        Self::new([
            "DPR", "MPR", "KPK", "Polri", "TNI", "Prabowo", "Jokowi", "Gibran", "Indonesia",
            "Jakarta", "Surabaya", "Bandung", "Medan", "Gerindra", "PDIP", "PKS", "Demokrat",
            "Golkar", "Nasdem", "PKB",
        ])
    }
}

/// Prefix `token` with `sigil` exactly once.
fn with_sigil(token: &str, sigil: char) -> String {
    let trimmed = token.trim().trim_start_matches(sigil);
    format!("{sigil}{trimmed}")
}

/// Distinct case-insensitive token list, preserving first-seen casing and
/// order, each carrying its sigil exactly once.
fn distinct_tokens(supplied: &[String], text: &str, re: &Regex, sigil: char) -> Vec<String> {
    let raw: Vec<String> = if supplied.is_empty() {
        re.captures_iter(text)
            .map(|caps| caps[1].to_string())
            .collect()
    } else {
        supplied.to_vec()
    };

    let mut seen = BTreeSet::new();
    let mut tokens = Vec::new();
    for token in raw {
        let token = with_sigil(&token, sigil);
        if token.len() > 1 && seen.insert(token.to_lowercase()) {
            tokens.push(token);
        }
    }
    tokens
}

/// Apply the extraction rules to one reconciled record. Never fails; a record
/// with no mentions or hashtags resolves to a single `post` edge so isolated
/// content stays visible in the graph.
pub fn extract_relations(record: &ContentRecord, entities: &EntityWatchlist) -> Vec<RelationEdge> {
    let source = with_sigil(record.source_identity(), '@');
    if source.len() <= 1 {
        return Vec::new();
    }

    let edge = |target: String, relation: RelationKind| RelationEdge {
        source: source.clone(),
        target,
        relation,
        provenance_url: record.canonical_url.clone(),
        timestamp: record.timestamp,
        scraped_at: record.scraped_at,
    };

    let mentions = distinct_tokens(&record.mentions, &record.text, &MENTION_RE, '@');
    let hashtags = distinct_tokens(&record.hashtags, &record.text, &HASHTAG_RE, '#');

    let mut edges = Vec::new();

    // 1. mention — distinct targets other than the author
    for mention in &mentions {
        if !mention.eq_ignore_ascii_case(&source) {
            edges.push(edge(mention.clone(), RelationKind::Mention));
        }
    }

    // 2. retweet — alongside the mention edge to the same target
    if record.is_retweet || record.text.starts_with("RT @") {
        if let Some(caps) = RETWEET_RE.captures(&record.text) {
            edges.push(edge(with_sigil(&caps[1], '@'), RelationKind::Retweet));
        }
    }

    // 3. reply — to the first mention
    let reply_detected = record.canonical_url.contains("/status/")
        && record.text.to_lowercase().contains("reply");
    if (record.is_reply || reply_detected) && !mentions.is_empty() {
        edges.push(edge(mentions[0].clone(), RelationKind::Reply));
    }

    // 4. self_mention — collapsed to one edge regardless of occurrences
    if mentions.iter().any(|m| m.eq_ignore_ascii_case(&source)) {
        edges.push(edge(source.clone(), RelationKind::SelfMention));
    }

    // 5. hashtag_use
    for hashtag in &hashtags {
        edges.push(edge(hashtag.clone(), RelationKind::HashtagUse));
    }

    // 6. entity_mention — whole-word match from the watchlist
    let author_name = source.trim_start_matches('@');
    for entity in entities.matches(&record.text) {
        if !entity.eq_ignore_ascii_case(author_name) && !entity.eq_ignore_ascii_case(&source) {
            edges.push(edge(entity.to_string(), RelationKind::EntityMention));
        }
    }

    // 7. post — only when no mention and no hashtag edge was produced
    let has_mention = edges.iter().any(|e| e.relation == RelationKind::Mention);
    let has_hashtag = edges.iter().any(|e| e.relation == RelationKind::HashtagUse);
    if !has_mention && !has_hashtag {
        edges.push(edge("PUBLIC".to_string(), RelationKind::Post));
    }

    edges
}
