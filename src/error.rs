//! Error types for the build helpers.
//!
//! Every fatal condition of a documentation build is reported through
//! [`BuildError`]. Step bodies use `anyhow` internally; the step runner turns
//! their failures into `false` results and logs them.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for build operations
#[derive(Error, Debug)]
pub enum BuildError {
    /// Generic fatal build failure
    #[error("{message}")]
    Build { message: String },

    /// A step was executed before `initialize` succeeded
    #[error("The build step is not initialized")]
    NotInitialized,

    /// The project has no documentation groups to build
    #[error("There is no build group available")]
    NoBuildGroups,

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Malformed XML in a settings, project or TOC file
    #[error("XML error in {path:?}: {message}")]
    Xml {
        path: Option<PathBuf>,
        message: String,
    },

    /// IO errors (file operations, directory access, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BuildError {
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn xml(message: impl std::fmt::Display) -> Self {
        Self::Xml {
            path: None,
            message: message.to_string(),
        }
    }

    /// Attach the offending file to an XML error
    pub fn with_path(self, file: impl Into<PathBuf>) -> Self {
        match self {
            Self::Xml { message, .. } => Self::Xml {
                path: Some(file.into()),
                message,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
