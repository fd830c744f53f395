//! Caches for loaded Gradle project models.
//!
//! [`GradleModelCache`] keeps recently loaded models in memory. [`PersistentModelCache`] keeps
//! them on disk across restarts so a project can show its last known layout before the build
//! has been queried again.

mod error;
mod memory;
mod persisted;
mod persistent;
mod store;
mod util;

pub use error::{CacheError, Result};
pub use memory::{GradleModelCache, ProjectModelUpdatedListener};
pub use persisted::{
    PersistedExtension, PersistedModel, PersistedPayload, MODEL_CACHE_SCHEMA_VERSION,
};
pub use persistent::{PersistentModelCache, WRITER_THREAD_NAME};
pub use store::{
    hashed_file_name, CacheDirLocator, ChainedModelStore, ModelPersister, MultiFileModelStore,
    SingleFileModelStore, StoredModelInfo, FILE_NAME_PREFIX_CHARS, ROOT_MODELS_FILE_NAME,
};
pub use util::{md5_hex, truncate_name, MAX_CACHE_FILE_BYTES};
