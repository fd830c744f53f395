use nbgradle_model::{
    ExtensionModels, GradleModel, ModelCodecs, MultiProjectDef, PersistentModelKey, ProjectTree,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;

/// Bumped whenever the layout of persisted models changes. Older files are treated as misses.
pub const MODEL_CACHE_SCHEMA_VERSION: u32 = 1;

/// One extension model in serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedPayload {
    pub model_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedExtension {
    pub name: String,
    pub models: Vec<PersistedPayload>,
}

/// A [`GradleModel`] in the form stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedModel {
    /// Normalized root directory; together with `project_dir` this is the persistent key.
    pub root_dir: PathBuf,
    pub project_dir: PathBuf,
    pub root: ProjectTree,
    pub main_path: String,
    pub build_script: Option<PathBuf>,
    pub settings_file: Option<PathBuf>,
    pub extensions: Vec<PersistedExtension>,
}

impl PersistedModel {
    /// Captures `model`, or returns `None` when one of its extension models cannot be
    /// serialized. Projects are persisted with all of their extensions or not at all.
    pub fn capture(model: &GradleModel) -> Option<Self> {
        let key = PersistentModelKey::for_model(model);
        let mut extensions = Vec::new();
        for name in model.loaded_extensions() {
            let models = model.extension_models(&name);
            let mut payloads = Vec::with_capacity(models.len());
            for extension_model in models.iter() {
                let Some(bytes) = extension_model.to_payload() else {
                    tracing::warn!(
                        target: "nbgradle.cache",
                        project_dir = %model.project_dir().display(),
                        extension = %name,
                        model_type = extension_model.model_type(),
                        "extension model is not serializable; project will not be persisted"
                    );
                    return None;
                };
                payloads.push(PersistedPayload {
                    model_type: extension_model.model_type().to_string(),
                    bytes,
                });
            }
            extensions.push(PersistedExtension {
                name,
                models: payloads,
            });
        }

        let main = model.project_def().main_project();
        Some(Self {
            root_dir: key.root_dir().to_path_buf(),
            project_dir: key.project_dir().to_path_buf(),
            root: ProjectTree::clone(model.project_def().root_project()),
            main_path: main.path().to_string(),
            build_script: model.build_script().map(PathBuf::from),
            settings_file: model.settings_file().map(PathBuf::from),
            extensions,
        })
    }

    pub fn key(&self) -> PersistentModelKey {
        PersistentModelKey::new(&self.root_dir, &self.project_dir)
    }

    /// `true` when this entry was stored for exactly `key`.
    pub fn matches(&self, key: &PersistentModelKey) -> bool {
        self.root_dir == key.root_dir() && self.project_dir == key.project_dir()
    }

    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions.iter().map(|ext| ext.name.as_str()).collect()
    }

    /// Rebuilds the model, decoding extension payloads with `codecs`.
    pub fn restore(&self, codecs: &ModelCodecs) -> Result<GradleModel> {
        let root = Arc::new(self.root.clone());
        let project_def = match root.find_by_path(&self.main_path) {
            Some(main) => MultiProjectDef::new(Arc::clone(&root), main),
            None => {
                tracing::debug!(
                    target: "nbgradle.cache",
                    project_dir = %self.project_dir.display(),
                    path = %self.main_path,
                    "persisted main project missing from its tree"
                );
                MultiProjectDef::for_project_dir(Arc::clone(&root), &self.project_dir)
                    .unwrap_or_else(|| MultiProjectDef::create_empty(&self.project_dir))
            }
        };

        let model = GradleModel::new(
            project_def,
            self.build_script.clone(),
            self.settings_file.clone(),
        );
        for extension in &self.extensions {
            let models = extension
                .models
                .iter()
                .map(|payload| codecs.decode(&payload.model_type, &payload.bytes))
                .collect::<std::result::Result<ExtensionModels, _>>()?;
            model.set_models_for_extension(&extension.name, models);
        }
        Ok(model)
    }
}
