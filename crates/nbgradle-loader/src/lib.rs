//! Loads Gradle project models through the build tool and keeps the caches up to date.
//!
//! [`GradleModelContext`] owns the shared state. It hands out one [`GradleModelLoader`] per
//! project directory; a loader answers requests from the in-memory cache, from the disk cache
//! right after startup, or by connecting to the build. Which protocol a connection uses is
//! decided by [`select_strategy`] from the negotiated Gradle version.

mod bulk;
mod compatible;
mod context;
mod error;
mod extension;
mod issues;
mod loader;
mod project;
mod protocol;
mod strategy;
mod version;

pub use context::{
    GradleModelContext, GradleModelContextBuilder, NOTIFIER_THREAD_NAME, UI_THREAD_NAME,
};
pub use error::{ModelLoadError, Result, ToolingError};
pub use extension::{ExtensionRegistry, GradleExtension};
pub use issues::{LoggingIssueReporter, ModelLoadIssue, ModelLoadIssueReporter};
pub use loader::{CacheWarmth, GradleModelLoader, LoaderServices, LOADER_THREAD_NAME};
pub use project::{GradleProject, OpenProjectRegistry, ProjectModelChangeListener};
pub use protocol::{
    BuildEnvironment, BulkModelRequest, BulkModelResponse, ConnectionTarget, GradleConnector,
    IdeaModule, IdeaProjectModel, OperationConfig, ProgressListener, ProjectConnection,
    RawModels, RawProject, TracingProgressListener,
};
pub use strategy::{select_strategy, LoaderStrategy};
pub use version::{
    known_issues, GradleVersion, InvalidGradleVersion, ReleaseVersion, BULK_FETCH_MIN_VERSION,
    MIN_SUPPORTED_VERSION,
};
