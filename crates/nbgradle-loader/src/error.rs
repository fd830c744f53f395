use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a build-tool connection.
#[derive(Debug, Error)]
pub enum ToolingError {
    #[error("failed to connect to Gradle: {0}")]
    Connection(String),

    #[error("build script evaluation failed: {message}")]
    BuildScript { message: String },

    #[error("model `{model_type}` is not supported by this Gradle version")]
    UnknownModel { model_type: String },

    #[error("Gradle protocol error: {0}")]
    Protocol(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why loading the model of a project failed.
///
/// A failed load leaves the previously loaded model (if any) in effect.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to evaluate the build script of {project_dir}: {message}")]
    BuildScript { project_dir: PathBuf, message: String },

    #[error("failed to connect to Gradle for {project_dir}: {source}")]
    Connection {
        project_dir: PathBuf,
        #[source]
        source: ToolingError,
    },

    #[error("unexpected error while loading {project_dir}: {message}")]
    Unexpected { project_dir: PathBuf, message: String },

    #[error("i/o error while loading {project_dir}: {source}")]
    Io {
        project_dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("loading {project_dir} was cancelled")]
    Cancelled { project_dir: PathBuf },

    #[error("loading {project_dir} was abandoned before completing")]
    Aborted { project_dir: PathBuf },
}

impl ModelLoadError {
    /// Classifies a tooling failure that happened while loading `project_dir`.
    pub fn from_tooling(project_dir: impl Into<PathBuf>, err: ToolingError) -> Self {
        let project_dir = project_dir.into();
        match err {
            ToolingError::BuildScript { message } => Self::BuildScript {
                project_dir,
                message,
            },
            ToolingError::Cancelled => Self::Cancelled { project_dir },
            ToolingError::Io(source) => Self::Io {
                project_dir,
                source,
            },
            err @ ToolingError::Connection(_) => Self::Connection {
                project_dir,
                source: err,
            },
            err @ (ToolingError::UnknownModel { .. } | ToolingError::Protocol(_)) => {
                Self::Unexpected {
                    project_dir,
                    message: err.to_string(),
                }
            }
        }
    }

    pub fn project_dir(&self) -> &std::path::Path {
        match self {
            Self::BuildScript { project_dir, .. }
            | Self::Connection { project_dir, .. }
            | Self::Unexpected { project_dir, .. }
            | Self::Io { project_dir, .. }
            | Self::Cancelled { project_dir }
            | Self::Aborted { project_dir } => project_dir,
        }
    }

    /// `true` for errors in the user's build scripts, as opposed to infrastructure failures.
    pub fn is_build_script_error(&self) -> bool {
        matches!(self, Self::BuildScript { .. })
    }
}

pub type Result<T> = std::result::Result<T, ModelLoadError>;
