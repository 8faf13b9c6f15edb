//! Error taxonomy for the pipeline and its collaborators.

use std::path::PathBuf;

use thiserror::Error;

/// Error type returned by the parser, publisher and serializer collaborators.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by an [`Uploader`](crate::contract::Uploader).
///
/// Only [`UploadError::Transient`] is worth retrying; a rejection from the
/// archive will be rejected again.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("transient upload failure: {0}")]
    Transient(String),

    #[error("archive rejected upload (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("uploader is not configured: {0}")]
    Config(String),

    #[error("failed to read JSON document: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Transient(_))
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to parse {}: {source}", document.display())]
    Parse {
        document: PathBuf,
        source: CollaboratorError,
    },

    #[error("failed to publish assets for {}: {source}", storage_path.display())]
    Publish {
        storage_path: PathBuf,
        source: CollaboratorError,
    },

    #[error("failed to serialize pair ({} x {}): {source}", root.display(), derived.display())]
    Serialize {
        root: PathBuf,
        derived: PathBuf,
        source: CollaboratorError,
    },

    #[error("failed to upload {} after {attempts} attempt(s): {source}", json_path.display())]
    Upload {
        json_path: PathBuf,
        attempts: u32,
        source: UploadError,
    },

    #[error("output directory {} is not usable: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown destination {0:?}: expected \"staging\" or \"production\"")]
pub struct UnknownDestination(pub String);
