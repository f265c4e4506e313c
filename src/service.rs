//! [`OcrService`]: the explicit service object behind every request handler.
//!
//! Built once at process start and cloned into handlers. Every clone shares
//! the same job tracker, document registry and output directory.
//!
//! ```text
//! submit_document ─┐                      ┌─▶ JobTracker ◀── poll / wait_for
//!                  ├─ validate ─▶ spawn ──┤
//! submit_batch ────┘   (sync)    (task)   └─▶ results/*.md ◀── read_result
//!                                              ▲
//! upload_document ─▶ DocumentRegistry ─────────┴── combine_document
//! ```
//!
//! Validation (bad input, unknown ids, out-of-range pages and batches) runs
//! in the submitting call and is returned as `Err`. Once a job id has been
//! handed out, every later failure is reported through the job snapshot.

use crate::batch::{self, combine_completed, Batch};
use crate::config::{ProcessorConfig, ServiceConfig};
use crate::documents::{Document, DocumentRegistry, DocumentSummary};
use crate::error::WorkbenchError;
use crate::ids::new_job_id;
use crate::jobs::{JobProgress, JobSnapshot, JobStatus, JobTracker};
use crate::pipeline::input::{resolve_input, sanitize_filename, validate_upload, ResolvedInput};
use crate::processor::{ChunkProcessor, FileSink, ProcessReport};
use crate::results::{ResultRef, ResultStore};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Returned by [`OcrService::submit_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: String,
    /// First page the job will process, 1-indexed.
    pub start_page: usize,
    /// Number of pages the job will process.
    pub page_count: usize,
    /// Page count of the whole document.
    pub total_pages: usize,
}

/// Returned by [`OcrService::submit_batch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTicket {
    pub job_id: String,
    pub doc_id: String,
    pub batch_index: usize,
    pub start: usize,
    pub end: usize,
}

/// Returned by [`OcrService::upload_document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub doc_id: String,
    pub filename: String,
    pub total_pages: usize,
    pub batches: Vec<Batch>,
}

#[derive(Clone)]
pub struct OcrService {
    processor: Arc<ChunkProcessor>,
    jobs: Arc<JobTracker>,
    documents: Arc<DocumentRegistry>,
    results: ResultStore,
    config: ServiceConfig,
    limiter: Option<Arc<Semaphore>>,
}

impl OcrService {
    pub fn new(processor: ChunkProcessor, config: ServiceConfig) -> Self {
        let limiter = config
            .max_concurrent_jobs
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        Self {
            processor: Arc::new(processor),
            jobs: Arc::new(JobTracker::new()),
            documents: Arc::new(DocumentRegistry::new()),
            results: ResultStore::new(config.output_dir.clone()),
            config,
            limiter,
        }
    }

    /// Service backed by pdfium and the configured vision provider.
    pub fn from_config(
        processor_config: ProcessorConfig,
        config: ServiceConfig,
    ) -> Result<Self, WorkbenchError> {
        Ok(Self::new(ChunkProcessor::from_config(processor_config)?, config))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    pub fn documents(&self) -> &DocumentRegistry {
        &self.documents
    }

    // ── Jobs ─────────────────────────────────────────────────────────────

    /// Start a whole-document job on a local path or HTTP(S) URL.
    ///
    /// `start_page` is 1-indexed (default 1). The page count is capped by
    /// `max_pages`, by [`ServiceConfig::max_document_pages`] and by the end
    /// of the document.
    pub async fn submit_document(
        &self,
        input: &str,
        start_page: Option<usize>,
        max_pages: Option<usize>,
    ) -> Result<JobTicket, WorkbenchError> {
        let resolved = resolve_input(input, self.processor.config().download_timeout_secs).await?;
        let total_pages = self.processor.page_count(resolved.path()).await?;

        let start_page = start_page.unwrap_or(1);
        if start_page == 0 || start_page > total_pages {
            return Err(WorkbenchError::PageOutOfRange {
                page: start_page,
                total: total_pages,
            });
        }
        if max_pages == Some(0) {
            return Err(WorkbenchError::InvalidInput {
                input: input.to_string(),
                reason: "max_pages must be ≥ 1".into(),
            });
        }
        let page_count = [
            Some(total_pages - start_page + 1),
            max_pages,
            self.config.max_document_pages,
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(total_pages);

        let job_id = new_job_id();
        let stem = file_stem(resolved.path());
        let (output_path, reference) = self.results.allocate(&format!("{stem}_{job_id}.md"));
        self.jobs.create(&job_id, total_pages);
        info!(
            job_id = %job_id,
            "Accepted {}: pages {}-{} of {}",
            input,
            start_page,
            start_page + page_count - 1,
            total_pages
        );

        let this = self.clone();
        let worker_job = job_id.clone();
        self.spawn_job(job_id.clone(), None, async move {
            this.run_document_job(&worker_job, resolved, start_page - 1, page_count, output_path, reference)
                .await
        });

        Ok(JobTicket {
            job_id,
            start_page,
            page_count,
            total_pages,
        })
    }

    /// Start a job for batch `batch_index` of a registered document.
    pub async fn submit_batch(
        &self,
        doc_id: &str,
        batch_index: usize,
    ) -> Result<BatchTicket, WorkbenchError> {
        let (job_id, batch, source_path, total_pages) = self.documents.update(doc_id, |doc| {
            let job_id = batch::start_batch(doc, batch_index)?;
            Ok((
                job_id,
                doc.batches[batch_index].clone(),
                doc.source_path.clone(),
                doc.total_pages,
            ))
        })?;

        let (output_path, reference) = self
            .results
            .allocate(&format!("batch_{doc_id}_{batch_index}.md"));
        self.jobs.create_at(
            &job_id,
            batch.start,
            total_pages,
            &format!("Starting batch {} (pages {}-{})...", batch_index + 1, batch.start, batch.end),
        );
        info!(job_id = %job_id, doc_id, "Batch {} accepted: pages {}-{}", batch_index, batch.start, batch.end);

        let this = self.clone();
        let worker_job = job_id.clone();
        let worker_doc = doc_id.to_string();
        let (start, count) = (batch.start - 1, batch.page_count());
        let bound = BoundBatch {
            doc_id: doc_id.to_string(),
            index: batch_index,
        };
        self.spawn_job(job_id.clone(), Some(bound), async move {
            let outcome = this
                .process_to_file(&worker_job, &source_path, start, count, &output_path)
                .await;
            let recorded = match &outcome {
                Ok(_) => this.documents.update(&worker_doc, |doc| {
                    batch::complete_batch(doc, batch_index, &worker_job, reference.clone())
                }),
                Err(e) => this.documents.update(&worker_doc, |doc| {
                    batch::fail_batch(doc, batch_index, &worker_job, &e.to_string())
                }),
            };
            if let Err(e) = recorded {
                warn!(doc_id = %worker_doc, "Could not record batch outcome: {}", e);
            }
            this.finish_job(&worker_job, outcome, reference);
        });

        Ok(BatchTicket {
            job_id,
            doc_id: doc_id.to_string(),
            batch_index,
            start: batch.start,
            end: batch.end,
        })
    }

    /// Latest snapshot, or the `not_found` sentinel.
    pub fn poll(&self, job_id: &str) -> JobSnapshot {
        self.jobs.get(job_id)
    }

    /// Poll until the job is terminal.
    pub async fn wait_for(
        &self,
        job_id: &str,
        poll_interval: Duration,
    ) -> Result<JobSnapshot, WorkbenchError> {
        loop {
            let snapshot = self.jobs.get(job_id);
            match snapshot.status {
                JobStatus::NotFound => {
                    return Err(WorkbenchError::JobNotFound {
                        job_id: job_id.to_string(),
                    })
                }
                JobStatus::Complete | JobStatus::Error => return Ok(snapshot),
                JobStatus::Processing => tokio::time::sleep(poll_interval).await,
            }
        }
    }

    // ── Documents ────────────────────────────────────────────────────────

    /// Store an uploaded PDF and register it with a batch plan.
    ///
    /// `batch_size` defaults to [`ServiceConfig::default_batch_size`].
    pub async fn upload_document(
        &self,
        filename: &str,
        bytes: &[u8],
        batch_size: Option<usize>,
    ) -> Result<UploadReceipt, WorkbenchError> {
        validate_upload(filename, bytes)?;
        let batch_size = batch_size.unwrap_or(self.config.default_batch_size);
        if batch_size == 0 {
            return Err(WorkbenchError::InvalidBatchSize { batch_size });
        }

        let safe_name = sanitize_filename(filename);
        let random = Uuid::new_v4().simple().to_string();
        let stored = self
            .config
            .upload_dir
            .join(format!("{}_{}", &random[..8], safe_name));
        let write_err = |source| WorkbenchError::UploadWriteFailed {
            filename: filename.to_string(),
            source,
        };
        tokio::fs::create_dir_all(&self.config.upload_dir)
            .await
            .map_err(write_err)?;
        tokio::fs::write(&stored, bytes).await.map_err(write_err)?;

        let document = match self
            .documents
            .register(&safe_name, &stored, batch_size, self.processor.renderer())
            .await
        {
            Ok(doc) => doc,
            Err(e) => {
                let _ = tokio::fs::remove_file(&stored).await;
                return Err(e);
            }
        };

        Ok(UploadReceipt {
            doc_id: document.id,
            filename: document.filename,
            total_pages: document.total_pages,
            batches: document.batches,
        })
    }

    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        self.documents.list_all()
    }

    pub fn get_document(&self, doc_id: &str) -> Result<Document, WorkbenchError> {
        self.documents.get(doc_id)
    }

    // ── Results ──────────────────────────────────────────────────────────

    /// Markdown of every completed batch of `doc_id`, in batch order.
    pub async fn combine_document(&self, doc_id: &str) -> Result<String, WorkbenchError> {
        let document = self.documents.get(doc_id)?;
        combine_completed(&document, &self.results).await
    }

    /// [`combine_document`](Self::combine_document), written to
    /// `<stem>_complete.md` in the output directory.
    pub async fn combine_document_to_file(
        &self,
        doc_id: &str,
    ) -> Result<ResultRef, WorkbenchError> {
        let document = self.documents.get(doc_id)?;
        let combined = combine_completed(&document, &self.results).await?;
        let (path, reference) = self
            .results
            .allocate(&format!("{}_complete.md", sanitize_filename(&document.stem())));
        let write_err = |source| WorkbenchError::OutputWriteFailed {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(self.results.root())
            .await
            .map_err(write_err)?;
        tokio::fs::write(&path, combined).await.map_err(write_err)?;
        Ok(reference)
    }

    pub fn result_path(&self, reference: &ResultRef) -> Result<PathBuf, WorkbenchError> {
        self.results.resolve(reference)
    }

    pub async fn read_result(&self, reference: &ResultRef) -> Result<String, WorkbenchError> {
        self.results.read_to_string(reference).await
    }

    // ── Workers ──────────────────────────────────────────────────────────

    /// Spawn `work` as the job's worker. A panicking worker ends the job in
    /// `error` instead of leaving it `processing` forever, and fails the
    /// batch it was started for, if any.
    fn spawn_job<F>(&self, job_id: String, bound: Option<BoundBatch>, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let jobs = Arc::clone(&self.jobs);
        let documents = Arc::clone(&self.documents);
        let limiter = self.limiter.clone();
        tokio::spawn(async move {
            let _permit = match limiter {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(e) => {
                        let message = format!("Worker pool closed: {e}");
                        fail_bound_batch(&documents, bound.as_ref(), &job_id, &message);
                        jobs.fail(&job_id, &message);
                        return;
                    }
                },
                None => None,
            };
            if let Err(e) = tokio::spawn(work).await {
                error!(job_id = %job_id, "Worker panicked: {}", e);
                let message = format!("Internal error: {e}");
                fail_bound_batch(&documents, bound.as_ref(), &job_id, &message);
                jobs.fail(&job_id, &message);
            }
        });
    }

    async fn run_document_job(
        &self,
        job_id: &str,
        input: ResolvedInput,
        start_page: usize,
        page_count: usize,
        output_path: PathBuf,
        reference: ResultRef,
    ) {
        let outcome = self
            .process_to_file(job_id, input.path(), start_page, page_count, &output_path)
            .await;
        self.finish_job(job_id, outcome, reference);
        // Dropping `input` here removes a downloaded temp file.
        drop(input);
    }

    async fn process_to_file(
        &self,
        job_id: &str,
        pdf_path: &Path,
        start_page: usize,
        page_count: usize,
        output_path: &Path,
    ) -> Result<ProcessReport, WorkbenchError> {
        let mut sink = FileSink::create(output_path).await?;
        let progress = JobProgress::new(Arc::clone(&self.jobs), job_id);
        self.processor
            .process(pdf_path, start_page, Some(page_count), &mut sink, &progress)
            .await
    }

    fn finish_job(
        &self,
        job_id: &str,
        outcome: Result<ProcessReport, WorkbenchError>,
        reference: ResultRef,
    ) {
        match outcome {
            Ok(report) => {
                if !report.is_complete() {
                    warn!(
                        job_id,
                        "{} of {} window(s) skipped",
                        report.skipped_windows(),
                        report.windows
                    );
                }
                info!(job_id, "Job complete → {}", reference);
                self.jobs
                    .complete(job_id, reference, report.skipped_windows());
            }
            Err(e) => {
                error!(job_id, kind = ?e.kind(), "Job failed: {}", e);
                self.jobs.fail(job_id, &e.to_string());
            }
        }
    }
}

/// The document batch a worker was started for.
struct BoundBatch {
    doc_id: String,
    index: usize,
}

fn fail_bound_batch(
    documents: &DocumentRegistry,
    bound: Option<&BoundBatch>,
    job_id: &str,
    message: &str,
) {
    let Some(bound) = bound else {
        return;
    };
    let recorded = documents.update(&bound.doc_id, |doc| {
        batch::fail_batch(doc, bound.index, job_id, message)
    });
    if let Err(e) = recorded {
        warn!(doc_id = %bound.doc_id, "Could not record batch outcome: {}", e);
    }
}

fn file_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    sanitize_filename(&stem)
}
