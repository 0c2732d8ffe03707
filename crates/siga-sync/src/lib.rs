//! Ingestion cycle orchestration: reconcile a delivered batch against the
//! durable canonical set, derive and merge relation edges, persist both sets
//! wholesale, and report per-cycle statistics.

pub mod batch;
pub mod reconcile;
pub mod snapshot;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siga_core::{ContentRecord, RelationEdge};
use siga_graph::{extract_relations, merge_edges, EntityWatchlist};
use siga_storage::{TableStore, CONTENT_TABLE, RELATIONS_TABLE};
use tokio::fs;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub use batch::{load_batch, map_batch, BatchIntake, RawBatch};
pub use reconcile::{reconcile, ReconcileOutcome};

pub const CRATE_NAME: &str = "siga-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub store_dir: PathBuf,
    pub profile_path: PathBuf,
    pub workspace_root: PathBuf,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            store_dir: std::env::var("SIGA_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./store")),
            profile_path: std::env::var("SIGA_PROFILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./ingest.yaml")),
            workspace_root: PathBuf::from("."),
        }
    }

    pub fn reports_root(&self) -> PathBuf {
        self.workspace_root.join("reports")
    }
}

/// Declarative ingest profile: which counters reconciliation compares, which
/// entity names the extractor watches, and the query rotation list.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestProfile {
    #[allow(dead_code)]
    #[serde(default)]
    version: u32,
    #[serde(default = "default_metric_fields")]
    pub metric_fields: Vec<String>,
    #[serde(default)]
    pub queries: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
}

fn default_metric_fields() -> Vec<String> {
    ["likes", "shares", "comments", "views"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for IngestProfile {
    fn default() -> Self {
        Self {
            version: 1,
            metric_fields: default_metric_fields(),
            queries: Vec::new(),
            entities: Vec::new(),
        }
    }
}

impl IngestProfile {
    /// Load the YAML profile; an absent file falls back to defaults.
    pub fn load_or_default(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    fn watchlist(&self) -> EntityWatchlist {
        if self.entities.is_empty() {
            EntityWatchlist::default()
        } else {
            EntityWatchlist::new(self.entities.iter().cloned())
        }
    }
}

/// Rotation over the configured query list. The position is an explicit
/// cursor owned by the caller and handed back advanced in the summary, so no
/// rotation state lives inside the pipeline.
#[derive(Debug, Clone)]
pub struct QueryRotation {
    queries: Vec<String>,
}

impl QueryRotation {
    pub fn new(queries: Vec<String>) -> Self {
        Self { queries }
    }

    pub fn query_at(&self, cursor: usize) -> Option<&str> {
        if self.queries.is_empty() {
            None
        } else {
            Some(self.queries[cursor % self.queries.len()].as_str())
        }
    }

    pub fn advance(&self, cursor: usize) -> usize {
        if self.queries.is_empty() {
            0
        } else {
            (cursor + 1) % self.queries.len()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub platform: String,
    pub query: Option<String>,
    pub cursor: usize,
    pub next_cursor: usize,
    pub received: usize,
    pub dropped_missing_url: usize,
    pub new_records: usize,
    pub superseded: usize,
    pub new_edges: usize,
    pub content_total: usize,
    pub edge_total: usize,
    pub reports_dir: String,
}

pub struct IngestPipeline {
    config: SyncConfig,
    profile: IngestProfile,
    store: TableStore,
    watchlist: EntityWatchlist,
    rotation: QueryRotation,
    // One cycle per store at a time: read-wholesale/write-wholesale only
    // holds under single-writer discipline.
    run_guard: tokio::sync::Mutex<()>,
}

impl IngestPipeline {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let profile = IngestProfile::load_or_default(&config.profile_path)?;
        let store = TableStore::new(config.store_dir.clone());
        let watchlist = profile.watchlist();
        let rotation = QueryRotation::new(profile.queries.clone());
        Ok(Self {
            config,
            profile,
            store,
            watchlist,
            rotation,
            run_guard: tokio::sync::Mutex::new(()),
        })
    }

    pub fn profile(&self) -> &IngestProfile {
        &self.profile
    }

    /// Run one ingestion cycle to completion. Fails closed: if either durable
    /// set cannot be read, nothing is written and the last good persisted
    /// state survives.
    pub async fn run_cycle(&self, batch: &RawBatch, cursor: usize) -> Result<CycleSummary> {
        let _guard = self.run_guard.lock().await;
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest_cycle", %run_id, platform = batch.platform.as_str());
        // Instrument rather than enter(): the cycle awaits, and an entered
        // span must not cross an await point.
        self.cycle_inner(batch, cursor, run_id).instrument(span).await
    }

    async fn cycle_inner(
        &self,
        batch: &RawBatch,
        cursor: usize,
        run_id: Uuid,
    ) -> Result<CycleSummary> {
        let started_at = Utc::now();

        let existing_content: Vec<ContentRecord> = self.store.read_table(CONTENT_TABLE).await?;
        let existing_edges: Vec<RelationEdge> = self.store.read_table(RELATIONS_TABLE).await?;

        let intake = map_batch(batch, started_at);
        let outcome = reconcile(
            &existing_content,
            &intake.records,
            &self.profile.metric_fields,
        );

        // Post-reconciliation only: superseded records must not re-emit edges.
        let mut cycle_edges = Vec::new();
        for record in &outcome.winners {
            cycle_edges.extend(extract_relations(record, &self.watchlist));
        }
        let merge = merge_edges(&existing_edges, &cycle_edges);

        self.store.write_table(CONTENT_TABLE, &outcome.merged).await?;
        self.store.write_table(RELATIONS_TABLE, &merge.merged).await?;

        let finished_at = Utc::now();
        let query = batch
            .query
            .clone()
            .or_else(|| self.rotation.query_at(cursor).map(String::from));
        let reports_dir = self.config.reports_root().join(run_id.to_string());

        let summary = CycleSummary {
            run_id,
            started_at,
            finished_at,
            platform: batch.platform.as_str().to_string(),
            query,
            cursor,
            next_cursor: self.rotation.advance(cursor),
            received: batch.items.len(),
            dropped_missing_url: intake.dropped_missing_url,
            new_records: outcome.new_records,
            superseded: outcome.superseded,
            new_edges: merge.admitted,
            content_total: outcome.merged.len(),
            edge_total: merge.merged.len(),
            reports_dir: reports_dir.display().to_string(),
        };

        self.write_reports(&reports_dir, &summary, &outcome.merged, &merge.merged)
            .await?;

        info!(
            new_records = summary.new_records,
            superseded = summary.superseded,
            new_edges = summary.new_edges,
            content_total = summary.content_total,
            edge_total = summary.edge_total,
            "cycle complete"
        );
        Ok(summary)
    }

    async fn write_reports(
        &self,
        reports_dir: &PathBuf,
        summary: &CycleSummary,
        content: &[ContentRecord],
        edges: &[RelationEdge],
    ) -> Result<()> {
        fs::create_dir_all(reports_dir)
            .await
            .with_context(|| format!("creating {}", reports_dir.display()))?;

        let summary_json =
            serde_json::to_vec_pretty(summary).context("serializing cycle summary")?;
        fs::write(reports_dir.join("cycle_summary.json"), summary_json)
            .await
            .context("writing cycle_summary.json")?;

        let brief = format!(
            "# SIGA Cycle Brief\n\n- Run ID: `{}`\n- Platform: {}\n- Query: {}\n- Started: {}\n- Finished: {}\n- Received: {} (dropped without URL: {})\n- New canonical records: {}\n- Superseded records: {}\n- Newly admitted edges: {}\n- Canonical set size: {}\n- Edge set size: {}\n",
            summary.run_id,
            summary.platform,
            summary.query.as_deref().unwrap_or("-"),
            summary.started_at,
            summary.finished_at,
            summary.received,
            summary.dropped_missing_url,
            summary.new_records,
            summary.superseded,
            summary.new_edges,
            summary.content_total,
            summary.edge_total,
        );
        fs::write(reports_dir.join("cycle_brief.md"), brief)
            .await
            .context("writing cycle_brief.md")?;

        snapshot::export_snapshots(reports_dir, content, edges, &self.profile.metric_fields)?;
        Ok(())
    }
}

/// Convenience entrypoint for the CLI: env config, batch file, one cycle.
pub async fn run_cycle_from_env(batch_path: PathBuf, cursor: usize) -> Result<CycleSummary> {
    let config = SyncConfig::from_env();
    let pipeline = IngestPipeline::new(config)?;
    let batch = load_batch(&batch_path)?;
    pipeline.run_cycle(&batch, cursor).await
}

/// Markdown digest of the most recent cycle reports.
pub fn report_recent(runs: usize, workspace_root: Option<PathBuf>) -> Result<String> {
    let root = workspace_root.unwrap_or_else(|| PathBuf::from("."));
    let reports_root = root.join("reports");
    let mut dirs = std::fs::read_dir(&reports_root)
        .with_context(|| format!("reading {}", reports_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# SIGA Recent Cycles".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let summary_path = dir.path().join("cycle_summary.json");
        let summary: CycleSummary = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;

        lines.push(format!("## Run `{}`", summary.run_id));
        lines.push(format!("- platform: {}", summary.platform));
        lines.push(format!(
            "- query: {}",
            summary.query.as_deref().unwrap_or("-")
        ));
        lines.push(format!(
            "- new records: {} (superseded: {})",
            summary.new_records, summary.superseded
        ));
        lines.push(format!("- new edges: {}", summary.new_edges));
        lines.push(format!(
            "- totals: {} records, {} edges",
            summary.content_total, summary.edge_total
        ));
        lines.push(String::new());
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use siga_core::{Platform, RawItem};
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> SyncConfig {
        SyncConfig {
            store_dir: dir.join("store"),
            profile_path: dir.join("ingest.yaml"),
            workspace_root: dir.to_path_buf(),
        }
    }

    fn item(url: &str, text: &str, likes: &str, scraped_at: &str) -> RawItem {
        RawItem {
            canonical_url: Some(url.to_string()),
            author_handle: Some("@budi".to_string()),
            author: Some("Budi".to_string()),
            text: Some(text.to_string()),
            metrics: [("likes".to_string(), serde_json::json!(likes))]
                .into_iter()
                .collect(),
            timestamp: Some("2026-02-24T09:00:00Z".to_string()),
            scraped_at: Some(scraped_at.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn rotation_cursor_is_explicit_and_wrapping() {
        let rotation = QueryRotation::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(rotation.query_at(0), Some("a"));
        assert_eq!(rotation.query_at(4), Some("b"));
        assert_eq!(rotation.advance(2), 0);

        let empty = QueryRotation::new(Vec::new());
        assert_eq!(empty.query_at(7), None);
        assert_eq!(empty.advance(7), 0);
    }

    #[test]
    fn profile_parses_yaml_and_defaults_metric_fields() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("ingest.yaml");
        std::fs::write(
            &path,
            "version: 1\nqueries:\n  - politik indonesia\nentities:\n  - DPR\n",
        )
        .expect("seed profile");

        let profile = IngestProfile::load_or_default(&path).expect("load");
        assert_eq!(profile.queries, vec!["politik indonesia".to_string()]);
        assert_eq!(profile.entities, vec!["DPR".to_string()]);
        assert_eq!(profile.metric_fields, default_metric_fields());

        let absent = IngestProfile::load_or_default(&dir.path().join("missing.yaml"))
            .expect("defaults");
        assert!(absent.queries.is_empty());
    }

    #[tokio::test]
    async fn two_cycles_reconcile_and_deduplicate_edges() {
        let dir = tempdir().expect("tempdir");
        let pipeline = IngestPipeline::new(config_in(dir.path())).expect("pipeline");

        let first = RawBatch {
            platform: Platform::Twitter,
            query: Some("politik indonesia".to_string()),
            items: vec![
                item(
                    "https://twitter.com/budi/status/1",
                    "RT @ahmad keren! #politik #2024",
                    "5",
                    "2026-02-24T10:00:00Z",
                ),
                item(
                    "https://twitter.com/budi/status/2",
                    "hari ini cerah",
                    "1",
                    "2026-02-24T10:00:00Z",
                ),
            ],
        };
        let summary = pipeline.run_cycle(&first, 0).await.expect("first cycle");
        assert_eq!(summary.received, 2);
        assert_eq!(summary.new_records, 2);
        assert_eq!(summary.superseded, 0);
        // mention + retweet + two hashtags, plus one post fallback
        assert_eq!(summary.new_edges, 5);
        assert_eq!(summary.content_total, 2);
        assert_eq!(summary.edge_total, 5);

        let second = RawBatch {
            platform: Platform::Twitter,
            query: None,
            items: vec![
                // same URL, higher likes at the same capture time
                item(
                    "https://twitter.com/budi/status/1",
                    "RT @ahmad keren! #politik #2024",
                    "12",
                    "2026-02-24T10:00:00Z",
                ),
                RawItem::default(),
            ],
        };
        let summary = pipeline.run_cycle(&second, 1).await.expect("second cycle");
        assert_eq!(summary.received, 2);
        assert_eq!(summary.dropped_missing_url, 1);
        assert_eq!(summary.new_records, 0);
        assert_eq!(summary.superseded, 1);
        // re-extracted edges collide with the stored ones
        assert_eq!(summary.new_edges, 0);
        assert_eq!(summary.content_total, 2);
        assert_eq!(summary.edge_total, 5);

        let store = TableStore::new(dir.path().join("store"));
        let content: Vec<ContentRecord> =
            store.read_table(CONTENT_TABLE).await.expect("content");
        let updated = content
            .iter()
            .find(|r| r.canonical_url.ends_with("/status/1"))
            .expect("record survives");
        assert_eq!(updated.metric("likes"), 12);

        let reports_dir = PathBuf::from(&summary.reports_dir);
        assert!(reports_dir.join("cycle_summary.json").exists());
        assert!(reports_dir.join("snapshots").join("manifest.json").exists());
        assert!(reports_dir.join("snapshots").join("relations.parquet").exists());
    }

    #[tokio::test]
    async fn cycle_future_is_send_and_spawnable() {
        let dir = tempdir().expect("tempdir");
        let pipeline =
            std::sync::Arc::new(IngestPipeline::new(config_in(dir.path())).expect("pipeline"));
        let batch = RawBatch {
            platform: Platform::Twitter,
            query: None,
            items: vec![item(
                "https://twitter.com/budi/status/3",
                "selamat pagi",
                "2",
                "2026-02-24T10:00:00Z",
            )],
        };

        // spawn requires the future to be Send
        let handle = tokio::spawn({
            let pipeline = pipeline.clone();
            async move { pipeline.run_cycle(&batch, 0).await }
        });
        let summary = handle.await.expect("join").expect("cycle");
        assert_eq!(summary.new_records, 1);
    }

    #[tokio::test]
    async fn corrupt_store_fails_cycle_before_any_write() {
        let dir = tempdir().expect("tempdir");
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.store_dir).expect("store dir");
        std::fs::write(config.store_dir.join(CONTENT_TABLE), b"not json").expect("seed");

        let pipeline = IngestPipeline::new(config.clone()).expect("pipeline");
        let batch = RawBatch {
            platform: Platform::Twitter,
            query: None,
            items: vec![item(
                "https://twitter.com/budi/status/9",
                "halo",
                "1",
                "2026-02-24T10:00:00Z",
            )],
        };

        let err = pipeline.run_cycle(&batch, 0).await.expect_err("fails closed");
        assert!(err.to_string().contains("corrupt"));
        assert!(!config.store_dir.join(RELATIONS_TABLE).exists());
    }
}
