//! Project model types shared by the Gradle model caches and loaders.
//!
//! A load produces one [`GradleModel`] per Gradle project. Each model carries the whole
//! multi-project tree ([`MultiProjectDef`]), the resolved build files, and the models that
//! IDE extensions requested from the build ([`ModelLookup`]).

mod build_files;
mod extension;
mod key;
mod model;
mod tree;

pub use build_files::{
    find_build_script, find_settings_file, is_build_src_dir, BUILD_SRC_NAME, SETTINGS_FILE_NAMES,
};
pub use extension::{
    json_payload, ExtensionModel, ExtensionModels, ModelCodecs, ModelLookup,
};
pub use key::{CacheKey, PersistentModelKey};
pub use model::GradleModel;
pub use tree::{MultiProjectDef, ProjectInfo, ProjectTree, TaskDescriptor};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no codec registered for model type `{0}`")]
    UnknownModelType(String),

    #[error("failed to decode `{model_type}` model: {message}")]
    Decode { model_type: String, message: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
