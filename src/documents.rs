//! Document registry for the batch workbench.
//!
//! Holds every uploaded document and its batch plan. Batches of one document
//! may run concurrently; each worker touches only its own batch entry, but
//! all of them go through the registry lock, so the map itself is never
//! mutated unsynchronised.

use crate::batch::{plan, Batch, BatchStatus};
use crate::error::WorkbenchError;
use crate::ids::new_document_id;
use crate::pipeline::render::PageRenderer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// An uploaded PDF and its batch plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub source_path: PathBuf,
    pub total_pages: usize,
    pub batch_size: usize,
    pub batches: Vec<Batch>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// File name without its extension, used to name combined output.
    pub fn stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.id.clone())
    }

    pub fn summary(&self) -> DocumentSummary {
        let count = |status| self.batches.iter().filter(|b| b.status == status).count();
        DocumentSummary {
            id: self.id.clone(),
            filename: self.filename.clone(),
            total_pages: self.total_pages,
            batch_size: self.batch_size,
            batch_count: self.batches.len(),
            completed_batches: count(BatchStatus::Completed),
            failed_batches: count(BatchStatus::Error),
            created_at: self.created_at,
        }
    }
}

/// Listing entry for [`DocumentRegistry::list_all`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub total_pages: usize,
    pub batch_size: usize,
    pub batch_count: usize,
    pub completed_batches: usize,
    pub failed_batches: usize,
    pub created_at: DateTime<Utc>,
}

/// Process-wide map from document id to [`Document`].
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    documents: RwLock<HashMap<String, Document>>,
}

impl DocumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe the page count, plan the batches and store the record.
    pub async fn register(
        &self,
        filename: &str,
        source_path: &Path,
        batch_size: usize,
        probe: &dyn PageRenderer,
    ) -> Result<Document, WorkbenchError> {
        if batch_size == 0 {
            return Err(WorkbenchError::InvalidBatchSize { batch_size });
        }
        let total_pages = probe.page_count(source_path).await?;
        let batches = plan(total_pages, batch_size)?;
        let document = Document {
            id: new_document_id(),
            filename: filename.to_string(),
            source_path: source_path.to_path_buf(),
            total_pages,
            batch_size,
            batches,
            created_at: Utc::now(),
        };

        info!(
            doc_id = %document.id,
            "Registered '{}': {} pages in {} batch(es)",
            filename,
            total_pages,
            document.batches.len()
        );
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(document.id.clone(), document.clone());
        Ok(document)
    }

    /// A copy of the current record.
    pub fn get(&self, doc_id: &str) -> Result<Document, WorkbenchError> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(doc_id)
            .cloned()
            .ok_or_else(|| WorkbenchError::DocumentNotFound {
                doc_id: doc_id.to_string(),
            })
    }

    /// Every document, oldest first.
    pub fn list_all(&self) -> Vec<DocumentSummary> {
        let mut all: Vec<DocumentSummary> = self
            .documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Document::summary)
            .collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Run `f` against the stored record under the write lock.
    ///
    /// This is how batch transitions reach the registry; `f` must not block.
    pub fn update<R>(
        &self,
        doc_id: &str,
        f: impl FnOnce(&mut Document) -> Result<R, WorkbenchError>,
    ) -> Result<R, WorkbenchError> {
        let mut documents = self
            .documents
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let document = documents
            .get_mut(doc_id)
            .ok_or_else(|| WorkbenchError::DocumentNotFound {
                doc_id: doc_id.to_string(),
            })?;
        f(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{complete_batch, start_batch};
    use crate::results::ResultRef;
    use async_trait::async_trait;
    use image::DynamicImage;

    struct Pages(usize);

    #[async_trait]
    impl PageRenderer for Pages {
        async fn page_count(&self, _pdf_path: &Path) -> Result<usize, WorkbenchError> {
            Ok(self.0)
        }

        async fn render_page(
            &self,
            _pdf_path: &Path,
            _page_index: usize,
        ) -> Result<DynamicImage, WorkbenchError> {
            Ok(DynamicImage::new_rgb8(1, 1))
        }
    }

    #[tokio::test]
    async fn register_plans_batches() {
        let registry = DocumentRegistry::new();
        let doc = registry
            .register("paper.pdf", Path::new("/tmp/paper.pdf"), 5, &Pages(23))
            .await
            .unwrap();
        assert_eq!(doc.total_pages, 23);
        assert_eq!(doc.batches.len(), 5);
        assert_eq!(doc.stem(), "paper");
        assert_eq!(registry.get(&doc.id).unwrap(), doc);
    }

    #[tokio::test]
    async fn register_rejects_zero_batch_size() {
        let registry = DocumentRegistry::new();
        let err = registry
            .register("paper.pdf", Path::new("/tmp/paper.pdf"), 0, &Pages(3))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkbenchError::InvalidBatchSize { .. }));
        assert!(registry.list_all().is_empty());
    }

    #[test]
    fn unknown_document() {
        let registry = DocumentRegistry::new();
        assert!(matches!(
            registry.get("doc_nope"),
            Err(WorkbenchError::DocumentNotFound { .. })
        ));
        assert!(registry.update("doc_nope", |_| Ok(())).is_err());
    }

    #[tokio::test]
    async fn update_reaches_stored_record() {
        let registry = DocumentRegistry::new();
        let doc = registry
            .register("a.pdf", Path::new("/tmp/a.pdf"), 2, &Pages(4))
            .await
            .unwrap();

        let job_id = registry.update(&doc.id, |d| start_batch(d, 0)).unwrap();
        registry
            .update(&doc.id, |d| complete_batch(d, 0, &job_id, ResultRef::new("x.md")))
            .unwrap();

        let summary = &registry.list_all()[0];
        assert_eq!(summary.batch_count, 2);
        assert_eq!(summary.completed_batches, 1);
    }
}
