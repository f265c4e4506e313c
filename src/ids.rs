//! Opaque identifiers for jobs and documents.
//!
//! Ids are `<prefix>_<unix seconds>_<8 hex chars>`. The timestamp keeps them
//! roughly sortable in logs; the random suffix keeps two submissions in the
//! same second apart. Ids are never reused.

use chrono::Utc;
use uuid::Uuid;

/// A fresh job id, e.g. `job_1760000000_9f2c41ab`.
pub fn new_job_id() -> String {
    with_prefix("job")
}

/// A fresh document id, e.g. `doc_1760000000_03be7d10`.
pub fn new_document_id() -> String {
    with_prefix("doc")
}

fn with_prefix(prefix: &str) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}", Utc::now().timestamp(), &random[..8])
}
