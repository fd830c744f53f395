use nbgradle_model::{ExtensionModels, ModelCodecs, ProjectInfo};
use std::fmt;
use std::sync::Arc;

use crate::protocol::RawModels;

/// An IDE extension consuming its own models from the build.
pub trait GradleExtension: Send + Sync {
    /// Unique name; extension data of a model is stored under it.
    fn name(&self) -> &str;

    /// Model types this extension needs for every project.
    fn model_types(&self) -> Vec<String>;

    /// Turns the raw models fetched for `project` into extension models.
    ///
    /// `fetched` holds only the requested types the build could provide.
    fn build_models(&self, project: &ProjectInfo, fetched: &RawModels) -> ExtensionModels;

    /// Registers decoders for the persistable models this extension produces.
    fn register_codecs(&self, _codecs: &mut ModelCodecs) {}
}

/// The extensions whose models are loaded for every project.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Arc<dyn GradleExtension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `extension`, replacing a registered extension with the same name.
    pub fn register(&mut self, extension: Arc<dyn GradleExtension>) {
        self.extensions
            .retain(|existing| existing.name() != extension.name());
        self.extensions.push(extension);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn GradleExtension>> {
        self.extensions.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(|extension| extension.name())
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Every model type requested by any extension, without duplicates.
    pub fn model_types(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for model_type in self.extensions.iter().flat_map(|ext| ext.model_types()) {
            if !out.contains(&model_type) {
                out.push(model_type);
            }
        }
        out
    }

    pub fn codecs(&self) -> ModelCodecs {
        let mut codecs = ModelCodecs::new();
        for extension in &self.extensions {
            extension.register_codecs(&mut codecs);
        }
        codecs
    }

    /// Builds every extension's models for `project` from `fetched`.
    pub(crate) fn build_all(
        &self,
        project: &ProjectInfo,
        fetched: &RawModels,
    ) -> Vec<(String, ExtensionModels)> {
        self.extensions
            .iter()
            .map(|extension| {
                let wanted: RawModels = extension
                    .model_types()
                    .into_iter()
                    .filter_map(|model_type| {
                        let value = fetched.get(&model_type)?.clone();
                        Some((model_type, value))
                    })
                    .collect();
                (
                    extension.name().to_string(),
                    extension.build_models(project, &wanted),
                )
            })
            .collect()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
