//! Tabular parquet snapshots of the persisted sets, one pair per cycle,
//! plus a checksummed manifest for downstream dashboard loads.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use siga_core::{ContentRecord, RelationEdge};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub schema_version: u32,
    pub files: Vec<SnapshotManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Write `content.parquet`, `relations.parquet`, and `manifest.json` under
/// `reports_dir/snapshots`. Returns the manifest path.
pub fn export_snapshots(
    reports_dir: &Path,
    records: &[ContentRecord],
    edges: &[RelationEdge],
    metric_fields: &[String],
) -> Result<PathBuf> {
    let snapshot_dir = reports_dir.join("snapshots");
    std::fs::create_dir_all(&snapshot_dir)
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let content_path = snapshot_dir.join("content.parquet");
    let relations_path = snapshot_dir.join("relations.parquet");

    write_content_parquet(&content_path, records, metric_fields)?;
    write_relations_parquet(&relations_path, edges)?;

    let manifest = SnapshotManifest {
        schema_version: 1,
        files: vec![
            manifest_entry("content", reports_dir, &content_path)?,
            manifest_entry("relations", reports_dir, &relations_path)?,
        ],
    };

    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing snapshot manifest")?;
    std::fs::write(&manifest_path, bytes)
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn utf8_column<'a, I: Iterator<Item = &'a str>>(values: I) -> ArrayRef {
    Arc::new(StringArray::from(values.map(Some).collect::<Vec<_>>()))
}

fn write_content_parquet(
    path: &Path,
    records: &[ContentRecord],
    metric_fields: &[String],
) -> Result<()> {
    let mut fields = vec![
        ArrowField::new("platform", DataType::Utf8, false),
        ArrowField::new("canonical_url", DataType::Utf8, false),
        ArrowField::new("author", DataType::Utf8, false),
        ArrowField::new("author_handle", DataType::Utf8, false),
        ArrowField::new("timestamp", DataType::Utf8, false),
        ArrowField::new("scraped_at", DataType::Utf8, false),
    ];
    for metric in metric_fields {
        fields.push(ArrowField::new(metric, DataType::UInt64, false));
    }
    let schema = Arc::new(Schema::new(fields));

    let timestamps: Vec<String> = records.iter().map(|r| r.timestamp.to_rfc3339()).collect();
    let scraped: Vec<String> = records.iter().map(|r| r.scraped_at.to_rfc3339()).collect();

    let mut columns: Vec<ArrayRef> = vec![
        utf8_column(records.iter().map(|r| r.platform.as_str())),
        utf8_column(records.iter().map(|r| r.canonical_url.as_str())),
        utf8_column(records.iter().map(|r| r.author.as_str())),
        utf8_column(records.iter().map(|r| r.author_handle.as_str())),
        utf8_column(timestamps.iter().map(String::as_str)),
        utf8_column(scraped.iter().map(String::as_str)),
    ];
    for metric in metric_fields {
        columns.push(Arc::new(UInt64Array::from(
            records.iter().map(|r| r.metric(metric)).collect::<Vec<_>>(),
        )));
    }

    let batch =
        RecordBatch::try_new(schema, columns).context("building content record batch")?;
    write_parquet(path, batch)
}

fn write_relations_parquet(path: &Path, edges: &[RelationEdge]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("target", DataType::Utf8, false),
        ArrowField::new("relation", DataType::Utf8, false),
        ArrowField::new("provenance_url", DataType::Utf8, false),
        ArrowField::new("timestamp", DataType::Utf8, false),
        ArrowField::new("scraped_at", DataType::Utf8, false),
    ]));

    let timestamps: Vec<String> = edges.iter().map(|e| e.timestamp.to_rfc3339()).collect();
    let scraped: Vec<String> = edges.iter().map(|e| e.scraped_at.to_rfc3339()).collect();

    let batch = RecordBatch::try_new(
        schema,
        vec![
            utf8_column(edges.iter().map(|e| e.source.as_str())),
            utf8_column(edges.iter().map(|e| e.target.as_str())),
            utf8_column(edges.iter().map(|e| e.relation.as_str())),
            utf8_column(edges.iter().map(|e| e.provenance_url.as_str())),
            utf8_column(timestamps.iter().map(String::as_str)),
            utf8_column(scraped.iter().map(String::as_str)),
        ],
    )
    .context("building relations record batch")?;
    write_parquet(path, batch)
}

fn manifest_entry(name: &str, reports_dir: &Path, path: &Path) -> Result<SnapshotManifestFile> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let sha256 = hex::encode(hasher.finalize());
    let rel = path
        .strip_prefix(reports_dir)
        .unwrap_or(path)
        .display()
        .to_string();
    Ok(SnapshotManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}
