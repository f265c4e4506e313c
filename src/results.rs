//! Result references: opaque handles a caller exchanges for finished files.
//!
//! A reference is the bare file name of a Markdown file inside the output
//! directory. Resolution refuses anything that could step outside that
//! directory.

use crate::error::WorkbenchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Handle to a finished Markdown file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRef(String);

impl ResultRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps result references to files under one output directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a result called `file_name` lives, plus its reference.
    pub fn allocate(&self, file_name: &str) -> (PathBuf, ResultRef) {
        (self.root.join(file_name), ResultRef::new(file_name))
    }

    /// Path of an existing result.
    pub fn resolve(&self, reference: &ResultRef) -> Result<PathBuf, WorkbenchError> {
        let name = reference.as_str();
        let not_found = || WorkbenchError::ResultNotFound {
            reference: name.to_string(),
        };
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(not_found());
        }
        let path = self.root.join(name);
        if !path.is_file() {
            return Err(not_found());
        }
        Ok(path)
    }

    /// Contents of an existing result.
    pub async fn read_to_string(&self, reference: &ResultRef) -> Result<String, WorkbenchError> {
        let path = self.resolve(reference)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| WorkbenchError::ResultNotFound {
                reference: reference.to_string(),
            })
    }
}
