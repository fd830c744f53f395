use nbgradle_model::{ExtensionModels, ProjectInfo, ProjectTree};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ToolingError;
use crate::protocol::{IdeaModule, IdeaProjectModel, ProjectConnection, RawModels};
use crate::strategy::{new_model, project_def_in, LoadRequest, LoadedModels};

/// Loads the requested project through the IDEA model, then each extension's models one
/// request at a time. Only the requested project gets a model.
pub(crate) fn load(
    connection: &mut dyn ProjectConnection,
    request: &LoadRequest<'_>,
) -> Result<LoadedModels, ToolingError> {
    request.config.report_progress("fetching project structure");
    let idea = connection.fetch_idea_project(request.config, request.cancellation)?;
    let root = tree_from_idea(&idea)?;
    let def = project_def_in(&root, request.project_dir);

    let mut extensions = Vec::new();
    for extension in request.extensions.iter() {
        let mut fetched = RawModels::new();
        for model_type in extension.model_types() {
            if request.cancellation.is_cancelled() {
                return Err(ToolingError::Cancelled);
            }
            request
                .config
                .report_progress(&format!("fetching {model_type}"));
            match connection.fetch_model(&model_type, request.config, request.cancellation) {
                Ok(value) => {
                    fetched.insert(model_type, value);
                }
                Err(ToolingError::UnknownModel { model_type }) => {
                    tracing::info!(
                        target: "nbgradle.loader",
                        project_dir = %request.project_dir.display(),
                        extension = extension.name(),
                        model_type = %model_type,
                        "model type is not supported by this Gradle version"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        let models = if fetched.is_empty() && !extension.model_types().is_empty() {
            ExtensionModels::empty()
        } else {
            extension.build_models(def.main_project().info(), &fetched)
        };
        extensions.push((extension.name().to_string(), models));
    }

    Ok(LoadedModels {
        main: new_model(def, request.settings_file, extensions),
        others: Vec::new(),
    })
}

/// Rebuilds the project tree from the flat module list using the modules' Gradle paths.
fn tree_from_idea(idea: &IdeaProjectModel) -> Result<Arc<ProjectTree>, ToolingError> {
    let mut by_parent: BTreeMap<String, Vec<&IdeaModule>> = BTreeMap::new();
    let mut root_module = None;
    for module in &idea.modules {
        match parent_path(&module.gradle_path) {
            Some(parent) => by_parent.entry(parent).or_default().push(module),
            None => root_module = Some(module),
        }
    }

    let Some(root_module) = root_module else {
        return Err(ToolingError::Protocol(format!(
            "IDEA model of {} has no root module",
            idea.root_dir.display()
        )));
    };
    Ok(build_node(root_module, &by_parent))
}

fn build_node(module: &IdeaModule, by_parent: &BTreeMap<String, Vec<&IdeaModule>>) -> Arc<ProjectTree> {
    let children = by_parent
        .get(&module.gradle_path)
        .map(|children| {
            children
                .iter()
                .map(|child| build_node(child, by_parent))
                .collect()
        })
        .unwrap_or_default();

    let mut info = ProjectInfo::new(
        module.name.clone(),
        module.gradle_path.clone(),
        module.project_dir.clone(),
    );
    info.build_script = module.build_script.clone();
    Arc::new(ProjectTree::new(info, module.tasks.clone(), children))
}

/// `:a:b` -> `:a`, `:a` -> `:`, `:` -> none.
fn parent_path(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches(':');
    if trimmed.is_empty() {
        return None;
    }
    let (parent, _) = trimmed.rsplit_once(':')?;
    Some(if parent.is_empty() {
        ":".to_string()
    } else {
        parent.to_string()
    })
}
