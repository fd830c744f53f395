use nbgradle_model::MultiProjectDef;
use std::sync::Arc;

use crate::error::ToolingError;
use crate::protocol::{BulkModelRequest, ProjectConnection, RawModels};
use crate::strategy::{new_model, project_def_in, LoadRequest, LoadedModels};

/// Loads every project of the build with a single request.
pub(crate) fn load(
    connection: &mut dyn ProjectConnection,
    request: &LoadRequest<'_>,
) -> Result<LoadedModels, ToolingError> {
    let bulk_request = BulkModelRequest {
        project_model_types: request.extensions.model_types(),
    };
    request.config.report_progress("fetching project models");
    let response = connection.fetch_bulk(&bulk_request, request.config, request.cancellation)?;

    for model_type in &response.unknown_model_types {
        tracing::info!(
            target: "nbgradle.loader",
            project_dir = %request.project_dir.display(),
            model_type = %model_type,
            "model type is not supported by this Gradle version"
        );
    }

    let root = response.root.to_tree();
    let empty = RawModels::new();
    let mut main = None;
    let mut others = Vec::new();
    for project in root.all_projects() {
        let fetched = response
            .project_models
            .get(project.path())
            .unwrap_or(&empty);
        let extensions = request.extensions.build_all(project.info(), fetched);
        let model = new_model(
            MultiProjectDef::new(Arc::clone(&root), Arc::clone(&project)),
            request.settings_file,
            extensions,
        );
        if main.is_none() && project.project_dir() == request.project_dir {
            main = Some(model);
        } else {
            others.push(model);
        }
    }

    let main = match main {
        Some(main) => main,
        None => {
            let def = project_def_in(&root, request.project_dir);
            let extensions = request.extensions.build_all(def.main_project().info(), &empty);
            new_model(def, request.settings_file, extensions)
        }
    };
    Ok(LoadedModels { main, others })
}
