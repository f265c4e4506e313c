//! Batch planner: split a document into fixed-size page ranges and track
//! each range's lifecycle.
//!
//! ```text
//! plan(23, 5) → [1-5] [6-10] [11-15] [16-20] [21-23]
//!
//! pending ──start──▶ processing ──complete──▶ completed
//!                              └──fail──────▶ error
//! ```
//!
//! A batch runs at most one job at a time: starting a batch that is still
//! `processing` is rejected. Only the job currently bound to a batch may
//! complete or fail it; outcomes reported by any other job are dropped.
//! Restarting a finished batch is allowed and simply runs it again.

use crate::documents::Document;
use crate::error::WorkbenchError;
use crate::ids::new_job_id;
use crate::processor::{page_range_label, SECTION_DIVIDER};
use crate::results::{ResultRef, ResultStore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

/// One contiguous page range of a document; `start..=end`, 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub start: usize,
    pub end: usize,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Job currently or most recently bound to this batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl Batch {
    fn pending(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            status: BatchStatus::Pending,
            result: None,
            error: None,
            job_id: None,
        }
    }

    pub fn page_count(&self) -> usize {
        self.end - self.start + 1
    }

    fn is_bound_to(&self, job_id: &str) -> bool {
        self.job_id.as_deref() == Some(job_id)
    }
}

/// Partition `[1, total_pages]` into runs of `batch_size` pages; the last
/// run may be shorter. Deterministic.
pub fn plan(total_pages: usize, batch_size: usize) -> Result<Vec<Batch>, WorkbenchError> {
    if batch_size == 0 {
        return Err(WorkbenchError::InvalidBatchSize { batch_size });
    }
    if total_pages == 0 {
        return Err(WorkbenchError::InvalidInput {
            input: "total_pages".into(),
            reason: "document has no pages".into(),
        });
    }
    Ok((1..=total_pages)
        .step_by(batch_size)
        .map(|start| Batch::pending(start, (start + batch_size - 1).min(total_pages)))
        .collect())
}

fn batch_mut(document: &mut Document, index: usize) -> Result<&mut Batch, WorkbenchError> {
    let len = document.batches.len();
    document
        .batches
        .get_mut(index)
        .ok_or(WorkbenchError::BatchOutOfRange { index, len })
}

/// Mark batch `index` as `processing` and bind a fresh job id to it.
///
/// An out-of-range index, or a batch that is already `processing`, leaves
/// every batch untouched.
pub fn start_batch(document: &mut Document, index: usize) -> Result<String, WorkbenchError> {
    let batch = batch_mut(document, index)?;
    if batch.status == BatchStatus::Processing {
        return Err(WorkbenchError::BatchInProgress {
            index,
            job_id: batch.job_id.clone().unwrap_or_default(),
        });
    }
    let job_id = new_job_id();
    batch.status = BatchStatus::Processing;
    batch.result = None;
    batch.error = None;
    batch.job_id = Some(job_id.clone());
    Ok(job_id)
}

/// Record `job_id`'s result on batch `index`.
///
/// Returns `false`, leaving the batch as it is, when the batch is no longer
/// bound to `job_id`.
pub fn complete_batch(
    document: &mut Document,
    index: usize,
    job_id: &str,
    result: ResultRef,
) -> Result<bool, WorkbenchError> {
    let batch = batch_mut(document, index)?;
    if !batch.is_bound_to(job_id) {
        warn!(job_id, "Ignoring completion of batch {}: bound to {:?}", index, batch.job_id);
        return Ok(false);
    }
    batch.status = BatchStatus::Completed;
    batch.result = Some(result);
    batch.error = None;
    Ok(true)
}

/// Record `job_id`'s failure on batch `index`. Same binding rule as
/// [`complete_batch`].
pub fn fail_batch(
    document: &mut Document,
    index: usize,
    job_id: &str,
    message: &str,
) -> Result<bool, WorkbenchError> {
    let batch = batch_mut(document, index)?;
    if !batch.is_bound_to(job_id) {
        warn!(job_id, "Ignoring failure of batch {}: bound to {:?}", index, batch.job_id);
        return Ok(false);
    }
    batch.status = BatchStatus::Error;
    batch.error = Some(message.to_string());
    Ok(true)
}

/// Join the output of every `completed` batch in batch order, each under a
/// `# Pages start-end` heading, separated by a horizontal rule.
///
/// A completed batch whose result file has disappeared is skipped with a
/// warning. Fails with [`WorkbenchError::NothingToCombine`] when nothing is
/// left to join.
pub async fn combine_completed(
    document: &Document,
    store: &ResultStore,
) -> Result<String, WorkbenchError> {
    let mut parts = Vec::new();
    for batch in document
        .batches
        .iter()
        .filter(|b| b.status == BatchStatus::Completed)
    {
        let Some(reference) = &batch.result else {
            continue;
        };
        match store.read_to_string(reference).await {
            Ok(text) => parts.push(format!(
                "# {}\n\n{}",
                page_range_label(batch.start, batch.end),
                text
            )),
            Err(e) => warn!(doc_id = %document.id, "Skipping batch {}-{}: {}", batch.start, batch.end, e),
        }
    }

    if parts.is_empty() {
        return Err(WorkbenchError::NothingToCombine {
            doc_id: document.id.clone(),
        });
    }
    info!(doc_id = %document.id, "Combined {} batch(es)", parts.len());
    Ok(parts.join(SECTION_DIVIDER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    /// Start batch `index` and complete it with `reference`.
    fn finish(doc: &mut Document, index: usize, reference: ResultRef) {
        let job_id = start_batch(doc, index).unwrap();
        assert!(complete_batch(doc, index, &job_id, reference).unwrap());
    }

    fn document(total_pages: usize, batch_size: usize) -> Document {
        Document {
            id: "doc_1_abcdef01".into(),
            filename: "paper.pdf".into(),
            source_path: PathBuf::from("/tmp/paper.pdf"),
            total_pages,
            batch_size,
            batches: plan(total_pages, batch_size).unwrap(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn twenty_three_pages_in_fives() {
        let batches = plan(23, 5).unwrap();
        let ranges: Vec<(usize, usize)> = batches.iter().map(|b| (b.start, b.end)).collect();
        assert_eq!(ranges, vec![(1, 5), (6, 10), (11, 15), (16, 20), (21, 23)]);
        assert!(batches.iter().all(|b| b.status == BatchStatus::Pending));
    }

    #[test]
    fn plan_covers_every_page_exactly_once() {
        for total in 1..=40 {
            for size in 1..=12 {
                let batches = plan(total, size).unwrap();
                assert_eq!(batches.len(), total.div_ceil(size), "{total}/{size}");
                assert_eq!(batches[0].start, 1);
                assert_eq!(batches.last().unwrap().end, total);
                for pair in batches.windows(2) {
                    assert_eq!(pair[1].start, pair[0].end + 1);
                }
                assert!(batches.iter().all(|b| b.start <= b.end && b.page_count() <= size));
            }
        }
    }

    #[test]
    fn plan_rejects_zero() {
        assert!(matches!(
            plan(10, 0),
            Err(WorkbenchError::InvalidBatchSize { batch_size: 0 })
        ));
        assert!(matches!(plan(0, 5), Err(WorkbenchError::InvalidInput { .. })));
    }

    #[test]
    fn batch_larger_than_document() {
        let batches = plan(3, 10).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!((batches[0].start, batches[0].end), (1, 3));
    }

    #[test]
    fn start_out_of_range_changes_nothing() {
        let mut doc = document(23, 5);
        let before = doc.batches.clone();
        let err = start_batch(&mut doc, 5).unwrap_err();
        assert!(matches!(err, WorkbenchError::BatchOutOfRange { index: 5, len: 5 }));
        assert_eq!(doc.batches, before);
    }

    #[test]
    fn lifecycle_transitions() {
        let mut doc = document(10, 5);
        let job_id = start_batch(&mut doc, 1).unwrap();
        assert_eq!(doc.batches[1].status, BatchStatus::Processing);
        assert_eq!(doc.batches[1].job_id.as_deref(), Some(job_id.as_str()));
        assert_eq!(doc.batches[0].status, BatchStatus::Pending);

        complete_batch(&mut doc, 1, &job_id, ResultRef::new("b.md")).unwrap();
        assert_eq!(doc.batches[1].status, BatchStatus::Completed);

        // The bound job may still overwrite its own outcome.
        fail_batch(&mut doc, 1, &job_id, "late failure").unwrap();
        assert_eq!(doc.batches[1].status, BatchStatus::Error);
        assert_eq!(doc.batches[1].error.as_deref(), Some("late failure"));

        let again = start_batch(&mut doc, 1).unwrap();
        assert_ne!(again, job_id);
        assert_eq!(doc.batches[1].status, BatchStatus::Processing);
        assert_eq!(doc.batches[1].error, None);
    }

    #[test]
    fn processing_batch_cannot_be_restarted() {
        let mut doc = document(10, 5);
        let job_id = start_batch(&mut doc, 0).unwrap();
        let before = doc.batches.clone();

        let err = start_batch(&mut doc, 0).unwrap_err();
        assert!(matches!(
            &err,
            WorkbenchError::BatchInProgress { index: 0, job_id: running } if *running == job_id
        ));
        assert_eq!(doc.batches, before);
    }

    #[test]
    fn outcome_from_unbound_job_is_dropped() {
        let mut doc = document(10, 5);
        let first = start_batch(&mut doc, 0).unwrap();
        fail_batch(&mut doc, 0, &first, "boom").unwrap();
        let second = start_batch(&mut doc, 0).unwrap();

        assert!(!complete_batch(&mut doc, 0, &first, ResultRef::new("stale.md")).unwrap());
        assert!(!fail_batch(&mut doc, 0, &first, "stale").unwrap());
        let batch = &doc.batches[0];
        assert_eq!(batch.status, BatchStatus::Processing);
        assert_eq!(batch.job_id.as_deref(), Some(second.as_str()));
        assert_eq!(batch.result, None);
        assert_eq!(batch.error, None);

        // Never-started batches have no bound job.
        assert!(!complete_batch(&mut doc, 1, &first, ResultRef::new("x.md")).unwrap());
        assert_eq!(doc.batches[1].status, BatchStatus::Pending);
    }

    #[tokio::test]
    async fn combine_requires_a_completed_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let doc = document(10, 5);
        let err = combine_completed(&doc, &store).await.unwrap_err();
        assert!(matches!(err, WorkbenchError::NothingToCombine { .. }));
    }

    #[tokio::test]
    async fn combine_single_batch_is_text_plus_heading() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let mut doc = document(10, 5);
        let (path, reference) = store.allocate("batch_doc_1.md");
        std::fs::write(&path, "body text").unwrap();
        finish(&mut doc, 1, reference);

        let combined = combine_completed(&doc, &store).await.unwrap();
        assert_eq!(combined, "# Pages 6-10\n\nbody text");
    }

    #[tokio::test]
    async fn combine_in_batch_order_skipping_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let mut doc = document(15, 5);
        for (i, text) in [(2, "third"), (0, "first")] {
            let (path, reference) = store.allocate(&format!("b{i}.md"));
            std::fs::write(&path, text).unwrap();
            finish(&mut doc, i, reference);
        }
        finish(&mut doc, 1, ResultRef::new("gone.md"));

        let combined = combine_completed(&doc, &store).await.unwrap();
        assert_eq!(
            combined,
            "# Pages 1-5\n\nfirst\n\n---\n\n# Pages 11-15\n\nthird"
        );
    }
}
