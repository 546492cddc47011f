//! Error types for loading environment files

use crate::config::ConfigError;
use crate::providers::{ProviderError, RegistryError};
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that abort a load
///
/// None of these leave output behind: the destination is only written after
/// resolution has succeeded.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The input file does not exist
    #[error("Input file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Neither a path nor literal text was supplied
    #[error("Either an input path or input text must be provided")]
    MissingInput,

    /// Both a path and literal text were supplied
    #[error("Only one of an input path or input text may be provided")]
    ConflictingInput,

    /// Configuration data is malformed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A configured provider could not be provisioned
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Strict-mode resolution failure
    #[error("Failed to resolve {key}: {failed} reference(s) failed, first error: {source}")]
    Resolution {
        /// Number of references sharing the failing canonical key
        failed: usize,
        /// Variable holding the first failing reference
        key: String,
        #[source]
        source: Box<ProviderError>,
    },

    /// The load was cancelled before resolution finished
    #[error("Load cancelled")]
    Cancelled,

    /// Reading input or writing output failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this error stems from the caller's input or configuration
    /// rather than from resolving secrets
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            LoadError::NotFound(_)
                | LoadError::MissingInput
                | LoadError::ConflictingInput
                | LoadError::Config(_)
                | LoadError::Registry(_)
        )
    }
}
