use nbgradle_config::ModelLoadStrategy;
use nbgradle_model::{ExtensionModels, GradleModel, MultiProjectDef, ProjectTree};
use nbgradle_scheduler::CancellationToken;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ToolingError;
use crate::extension::ExtensionRegistry;
use crate::protocol::{OperationConfig, ProjectConnection};
use crate::version::{GradleVersion, BULK_FETCH_MIN_VERSION};
use crate::{bulk, compatible};

/// The protocol used to fetch models from a connected build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStrategy {
    /// One build action returning the tree and every project's models.
    Bulk,
    /// The IDEA project model plus one request per extension model.
    Compatible,
}

/// Chooses the protocol for a connection. Decided once per load.
pub fn select_strategy(version: &GradleVersion, preference: ModelLoadStrategy) -> LoaderStrategy {
    match preference {
        ModelLoadStrategy::NewestPossible if version.at_least(BULK_FETCH_MIN_VERSION) => {
            LoaderStrategy::Bulk
        }
        _ => LoaderStrategy::Compatible,
    }
}

pub(crate) struct LoadRequest<'a> {
    pub project_dir: &'a Path,
    pub settings_file: Option<&'a Path>,
    pub extensions: &'a ExtensionRegistry,
    pub config: &'a OperationConfig,
    pub cancellation: &'a CancellationToken,
}

/// Models produced by one load; `main` is the requested project.
#[derive(Debug)]
pub(crate) struct LoadedModels {
    pub main: GradleModel,
    pub others: Vec<GradleModel>,
}

impl LoaderStrategy {
    pub(crate) fn load(
        self,
        connection: &mut dyn ProjectConnection,
        request: &LoadRequest<'_>,
    ) -> Result<LoadedModels, ToolingError> {
        if request.cancellation.is_cancelled() {
            return Err(ToolingError::Cancelled);
        }
        match self {
            LoaderStrategy::Bulk => bulk::load(connection, request),
            LoaderStrategy::Compatible => compatible::load(connection, request),
        }
    }
}

/// The definition for `project_dir` within `root`; a singleton tree when it is not part of it.
pub(crate) fn project_def_in(root: &Arc<ProjectTree>, project_dir: &Path) -> MultiProjectDef {
    MultiProjectDef::for_project_dir(Arc::clone(root), project_dir).unwrap_or_else(|| {
        tracing::debug!(
            target: "nbgradle.loader",
            root = %root.project_dir().display(),
            project_dir = %project_dir.display(),
            "requested project is not part of the loaded tree"
        );
        MultiProjectDef::create_empty(project_dir)
    })
}

pub(crate) fn new_model(
    project_def: MultiProjectDef,
    settings_file: Option<&Path>,
    extensions: Vec<(String, ExtensionModels)>,
) -> GradleModel {
    let build_script = project_def.main_project().info().build_script.clone();
    let model = GradleModel::new(project_def, build_script, settings_file.map(PathBuf::from));
    for (name, models) in extensions {
        model.set_models_for_extension(&name, models);
    }
    model
}
