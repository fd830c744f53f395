//! The boundary to the Gradle tooling API.
//!
//! A [`GradleConnector`] opens a [`ProjectConnection`] for a project directory. Connections
//! negotiate a [`BuildEnvironment`] and answer model requests; how they talk to Gradle is
//! up to the implementation.

use nbgradle_config::{GradleConfig, GradleDistribution};
use nbgradle_model::{ProjectInfo, ProjectTree, TaskDescriptor};
use nbgradle_scheduler::CancellationToken;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ToolingError;
use crate::version::GradleVersion;

/// Raw models keyed by model type, as returned by the build.
pub type RawModels = BTreeMap<String, serde_json::Value>;

/// What a connection is opened against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub project_dir: PathBuf,
    pub distribution: GradleDistribution,
    pub user_home: Option<PathBuf>,
    pub daemon_idle_timeout: Option<Duration>,
}

impl ConnectionTarget {
    pub fn new(project_dir: &Path, settings: &GradleConfig) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            distribution: settings.distribution.clone(),
            user_home: settings.user_home.clone(),
            daemon_idle_timeout: settings.daemon_idle_timeout(),
        }
    }
}

/// Receives textual progress of a running operation.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, description: &str);
}

/// Options applied to every operation of a connection.
#[derive(Clone, Default)]
pub struct OperationConfig {
    pub java_home: Option<PathBuf>,
    pub arguments: Vec<String>,
    pub jvm_arguments: Vec<String>,
    pub progress_listeners: Vec<Arc<dyn ProgressListener>>,
}

impl OperationConfig {
    pub fn from_settings(settings: &GradleConfig) -> Self {
        Self {
            java_home: settings.java_home.clone(),
            arguments: settings.arguments.clone(),
            jvm_arguments: settings.jvm_args.clone(),
            progress_listeners: Vec::new(),
        }
    }

    pub fn with_progress_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress_listeners.push(listener);
        self
    }

    /// Forwards `description` to every progress listener.
    pub fn report_progress(&self, description: &str) {
        for listener in &self.progress_listeners {
            listener.on_progress(description);
        }
    }
}

impl fmt::Debug for OperationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationConfig")
            .field("java_home", &self.java_home)
            .field("arguments", &self.arguments)
            .field("jvm_arguments", &self.jvm_arguments)
            .field("progress_listeners", &self.progress_listeners.len())
            .finish()
    }
}

/// Environment negotiated with the connected build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildEnvironment {
    pub gradle_version: GradleVersion,
    pub java_home: Option<PathBuf>,
}

/// A project as reported by the build, including its subprojects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProject {
    pub name: String,
    pub path: String,
    pub project_dir: PathBuf,
    #[serde(default)]
    pub build_script: Option<PathBuf>,
    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,
    #[serde(default)]
    pub children: Vec<RawProject>,
}

impl RawProject {
    pub fn to_tree(&self) -> Arc<ProjectTree> {
        let mut info = ProjectInfo::new(self.name.clone(), self.path.clone(), self.project_dir.clone());
        info.build_script = self.build_script.clone();
        Arc::new(ProjectTree::new(
            info,
            self.tasks.clone(),
            self.children.iter().map(RawProject::to_tree).collect(),
        ))
    }
}

/// One request fetching the whole build at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkModelRequest {
    /// Model types fetched for every project of the build.
    pub project_model_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkModelResponse {
    pub root: RawProject,
    /// Models per project, keyed by Gradle path.
    #[serde(default)]
    pub project_models: BTreeMap<String, RawModels>,
    /// Requested model types the build could not provide.
    #[serde(default)]
    pub unknown_model_types: Vec<String>,
}

/// IDEA-shaped project model, available from every supported Gradle version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaProjectModel {
    pub name: String,
    pub root_dir: PathBuf,
    pub modules: Vec<IdeaModule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaModule {
    pub name: String,
    pub gradle_path: String,
    pub project_dir: PathBuf,
    #[serde(default)]
    pub build_script: Option<PathBuf>,
    #[serde(default)]
    pub tasks: Vec<TaskDescriptor>,
}

/// An open connection to the build of one project directory.
///
/// Calls block until Gradle answers. Implementations should check the cancellation token
/// where they can; callers treat cancellation as best effort.
pub trait ProjectConnection: Send {
    fn build_environment(
        &mut self,
        config: &OperationConfig,
        cancellation: &CancellationToken,
    ) -> Result<BuildEnvironment, ToolingError>;

    /// Fetches the project tree and `request`'s models of every project in one round trip.
    fn fetch_bulk(
        &mut self,
        request: &BulkModelRequest,
        config: &OperationConfig,
        cancellation: &CancellationToken,
    ) -> Result<BulkModelResponse, ToolingError>;

    fn fetch_idea_project(
        &mut self,
        config: &OperationConfig,
        cancellation: &CancellationToken,
    ) -> Result<IdeaProjectModel, ToolingError>;

    /// Fetches one model of the connected project.
    ///
    /// Returns [`ToolingError::UnknownModel`] when the Gradle version cannot build it.
    fn fetch_model(
        &mut self,
        model_type: &str,
        config: &OperationConfig,
        cancellation: &CancellationToken,
    ) -> Result<serde_json::Value, ToolingError>;
}

pub trait GradleConnector: Send + Sync {
    fn connect(
        &self,
        target: &ConnectionTarget,
        cancellation: &CancellationToken,
    ) -> Result<Box<dyn ProjectConnection>, ToolingError>;
}

/// Forwards progress to `tracing`.
#[derive(Debug, Clone)]
pub struct TracingProgressListener {
    project_dir: PathBuf,
}

impl TracingProgressListener {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
        }
    }
}

impl ProgressListener for TracingProgressListener {
    fn on_progress(&self, description: &str) {
        tracing::debug!(
            target: "nbgradle.loader",
            project_dir = %self.project_dir.display(),
            progress = description,
            "gradle progress"
        );
    }
}
