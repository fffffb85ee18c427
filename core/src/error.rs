/*
 * Copyright 2024 Oxide Computer Company
 */

use thiserror::Error;
use zpm_client::StoreError;

pub type DeployResult<T> = std::result::Result<T, DeployError>;

/**
 * Every way a deployment can fail.  None of these are retried: the pipeline
 * stops at the first one, and anything already uploaded stays uploaded.
 */
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("malformed archive: {0}")]
    MalformedArchive(String),
    #[error("authentication failed")]
    Authentication(#[source] StoreError),
    #[error("upload of {path:?} failed")]
    Upload {
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("invalid job description: {0}")]
    InvalidJobDescription(String),
    #[error("UI file {0:?} is not present in the archive")]
    MissingUiAsset(String),
    #[error("rendering {path:?}: {reason}")]
    Render { path: String, reason: String },
    #[error("job execution failed")]
    Execution(#[source] StoreError),
}

impl DeployError {
    pub(crate) fn malformed<S: AsRef<str>, E: std::fmt::Display>(
        entry: S,
        e: E,
    ) -> DeployError {
        DeployError::MalformedArchive(format!("{}: {}", entry.as_ref(), e))
    }
}
