//! Durable whole-table storage for the canonical content and relation sets.
//!
//! The sink boundary is read-wholesale then write-wholesale per cycle: a
//! table is a single JSON array on disk, replaced atomically via a temp file
//! and rename so a crash mid-write can never leave a truncated store. An
//! absent table reads as an empty set; an unreadable or corrupt table is a
//! hard error the caller must treat as fatal for the cycle.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "siga-storage";

/// Canonical content set table name.
pub const CONTENT_TABLE: &str = "content.json";
/// Relation edge set table name.
pub const RELATIONS_TABLE: &str = "relations.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading table {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("table {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("writing table {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing table {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct TableStore {
    root: PathBuf,
}

impl TableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    /// Read a whole table. A missing file is an empty set.
    pub async fn read_table<T: DeserializeOwned>(&self, table: &str) -> Result<Vec<T>, StoreError> {
        let path = self.table_path(table);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(table, "table absent, treating as empty set");
                return Ok(Vec::new());
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Replace a whole table atomically: write to a temp file in the same
    /// directory, flush, then rename over the target.
    pub async fn write_table<T: Serialize>(&self, table: &str, rows: &[T]) -> Result<(), StoreError> {
        let path = self.table_path(table);
        let bytes = serde_json::to_vec_pretty(rows).map_err(|source| StoreError::Serialize {
            path: path.clone(),
            source,
        })?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::Write {
                path: self.root.clone(),
                source,
            })?;

        let temp_path = self.root.join(format!(".{}.{table}.tmp", Uuid::new_v4()));
        let write_err = |source| StoreError::Write {
            path: temp_path.clone(),
            source,
        };

        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(write_err)?;
        if let Err(source) = async {
            file.write_all(&bytes).await?;
            file.flush().await
        }
        .await
        {
            let _ = fs::remove_file(&temp_path).await;
            return Err(write_err(source));
        }
        drop(file);

        match fs::rename(&temp_path, &path).await {
            Ok(()) => {
                debug!(table, rows = rows.len(), "table replaced");
                Ok(())
            }
            Err(source) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(StoreError::Write { path, source })
            }
        }
    }
}
