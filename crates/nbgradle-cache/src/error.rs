pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by the persistent model stores.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error(transparent)]
    Model(#[from] nbgradle_model::ModelError),

    #[error("incompatible cache schema version: expected {expected}, found {found}")]
    IncompatibleSchemaVersion { expected: u32, found: u32 },
}
