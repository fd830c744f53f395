use std::path::PathBuf;

use crate::error::ModelLoadError;
use crate::version::GradleVersion;

/// A problem found while loading a project, for display to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelLoadIssue {
    /// The project's build script failed to evaluate. Editing the script can fix it.
    BuildScript { project_dir: PathBuf, message: String },
    /// Anything else that prevented the load.
    Unexpected { project_dir: PathBuf, message: String },
    /// The connected Gradle version has known tooling problems.
    VersionAdvisory {
        project_dir: PathBuf,
        version: GradleVersion,
        message: String,
    },
}

impl ModelLoadIssue {
    /// The issue to show for a failed load; `None` for cancellations.
    pub fn from_error(err: &ModelLoadError) -> Option<Self> {
        let project_dir = err.project_dir().to_path_buf();
        match err {
            ModelLoadError::BuildScript { message, .. } => Some(Self::BuildScript {
                project_dir,
                message: message.clone(),
            }),
            ModelLoadError::Cancelled { .. } => None,
            other => Some(Self::Unexpected {
                project_dir,
                message: other.to_string(),
            }),
        }
    }
}

pub trait ModelLoadIssueReporter: Send + Sync {
    fn report(&self, issue: ModelLoadIssue);
}

/// Reports issues as log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingIssueReporter;

impl ModelLoadIssueReporter for LoggingIssueReporter {
    fn report(&self, issue: ModelLoadIssue) {
        match issue {
            ModelLoadIssue::BuildScript {
                project_dir,
                message,
            } => tracing::warn!(
                target: "nbgradle.loader",
                project_dir = %project_dir.display(),
                error = %message,
                "build script evaluation failed"
            ),
            ModelLoadIssue::Unexpected {
                project_dir,
                message,
            } => tracing::error!(
                target: "nbgradle.loader",
                project_dir = %project_dir.display(),
                error = %message,
                "failed to load project model"
            ),
            ModelLoadIssue::VersionAdvisory {
                project_dir,
                version,
                message,
            } => tracing::warn!(
                target: "nbgradle.loader",
                project_dir = %project_dir.display(),
                gradle_version = %version,
                "{message}"
            ),
        }
    }
}
