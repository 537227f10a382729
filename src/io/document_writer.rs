//! Persist pipeline documents as `<output>/<namespace>/<tile>.json`.

use crate::pipeline::PipelineDocument;
use anyhow::{Context, Result};
use futures::future::try_join_all;
use std::path::{Path, PathBuf};

/// A document that has been written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenDocument {
    pub tile_id: u32,
    pub path: PathBuf,
}

/// Writes pipeline documents under a namespace directory.
#[derive(Debug, Clone)]
pub struct DocumentWriter {
    dir: PathBuf,
}

impl DocumentWriter {
    /// Create the writer, creating `<output_dir>/<namespace>` if needed.
    pub async fn create(output_dir: &Path, namespace: &str) -> Result<Self> {
        let dir = output_dir.join(namespace);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document for `tile_id`.
    pub fn document_path(&self, tile_id: u32) -> PathBuf {
        self.dir.join(format!("{}.json", tile_id))
    }

    /// Write one document.
    pub async fn persist(&self, tile_id: u32, document: &PipelineDocument) -> Result<WrittenDocument> {
        let path = self.document_path(tile_id);
        let json = document.to_json_pretty()?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write pipeline {}", path.display()))?;
        tracing::debug!("Wrote {}", path.display());
        Ok(WrittenDocument { tile_id, path })
    }

    /// Write every document concurrently.
    ///
    /// Returns once all writes have finished, in input order. The first failure
    /// fails the whole batch.
    pub async fn persist_all(
        &self,
        documents: &[(u32, PipelineDocument)],
    ) -> Result<Vec<WrittenDocument>> {
        try_join_all(documents.iter().map(|(id, doc)| self.persist(*id, doc))).await
    }
}
