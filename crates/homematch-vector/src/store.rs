use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use homematch_core::error::{Error, Result};
use homematch_core::traits::{Embedder, IndexStore, SimilarityIndex};
use homematch_core::types::Fragment;

use crate::search::LanceIndex;
use crate::table::{clear_stamp, drop_fragment_table, open_db, read_stamp, table_exists, write_stamp, BuildStamp};
use crate::writer::FragmentWriter;

/// Persists fragment tables under `db_path` and reuses them when the stored
/// corpus fingerprint and embedder id both match the current run.
pub struct LanceIndexStore {
    db_path: PathBuf,
    table_name: String,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl LanceIndexStore {
    pub fn new(db_path: impl Into<PathBuf>, table_name: &str, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self { db_path: db_path.into(), table_name: table_name.to_string(), embedder, batch_size }
    }

    fn uri(&self) -> String { self.db_path.to_string_lossy().to_string() }

    async fn try_open(&self, fingerprint: &str) -> anyhow::Result<Option<Arc<dyn SimilarityIndex>>> {
        if !self.db_path.exists() {
            return Ok(None);
        }
        let conn = open_db(&self.uri()).await?;
        if !table_exists(&conn, &self.table_name).await? {
            return Ok(None);
        }
        let Some(stamp) = read_stamp(&conn, &self.table_name).await? else {
            warn!(table = %self.table_name, "persisted index has no build stamp");
            return Ok(None);
        };
        if stamp.fingerprint != fingerprint || stamp.embedder_id != self.embedder.embedder_id() {
            warn!(
                table = %self.table_name,
                stored_fingerprint = %stamp.fingerprint,
                stored_embedder = %stamp.embedder_id,
                "persisted index does not match this corpus"
            );
            return Ok(None);
        }
        info!(table = %self.table_name, built_at = %stamp.built_at, "persisted index matches");
        let table = conn.open_table(&self.table_name).execute().await?;
        let index: Arc<dyn SimilarityIndex> = Arc::new(LanceIndex::new(table, Arc::clone(&self.embedder)));
        Ok(Some(index))
    }

    async fn try_build(&self, fragments: &[Fragment], fingerprint: &str) -> anyhow::Result<Arc<dyn SimilarityIndex>> {
        std::fs::create_dir_all(&self.db_path)?;
        let conn = open_db(&self.uri()).await?;
        // stamp goes first so a half-written table is never reused
        clear_stamp(&conn, &self.table_name).await?;
        if table_exists(&conn, &self.table_name).await? {
            info!(table = %self.table_name, "replacing previous index table");
            drop_fragment_table(&self.db_path, &self.table_name)?;
        }
        let conn = open_db(&self.uri()).await?;
        FragmentWriter::new(&conn, &self.table_name, self.embedder.as_ref(), self.batch_size).write(fragments).await?;
        let stamp = BuildStamp {
            fingerprint: fingerprint.to_string(),
            embedder_id: self.embedder.embedder_id().to_string(),
            built_at: Utc::now().to_rfc3339(),
        };
        write_stamp(&conn, &self.table_name, &stamp).await?;
        let table = conn.open_table(&self.table_name).execute().await?;
        let index: Arc<dyn SimilarityIndex> = Arc::new(LanceIndex::new(table, Arc::clone(&self.embedder)));
        Ok(index)
    }
}

#[async_trait]
impl IndexStore for LanceIndexStore {
    async fn open(&self, fingerprint: &str) -> Result<Option<Arc<dyn SimilarityIndex>>> {
        self.try_open(fingerprint).await.map_err(|e| Error::IndexUnavailable(format!("open {}: {e:#}", self.db_path.display())))
    }

    async fn build(&self, fragments: &[Fragment], fingerprint: &str) -> Result<Arc<dyn SimilarityIndex>> {
        self.try_build(fragments, fingerprint).await.map_err(|e| Error::IndexUnavailable(format!("build {}: {e:#}", self.db_path.display())))
    }
}
