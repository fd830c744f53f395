use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{ModelError, Result};

/// A model object produced for an IDE extension.
pub trait ExtensionModel: Any + Send + Sync + fmt::Debug {
    /// Stable identifier of the model's type; used to pick a codec when restoring.
    fn model_type(&self) -> &str;

    /// Serialized form of this model, or `None` if it cannot be persisted.
    fn to_payload(&self) -> Option<Vec<u8>> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Encodes `value` as JSON for [`ExtensionModel::to_payload`].
pub fn json_payload<T: Serialize>(value: &T) -> Option<Vec<u8>> {
    match serde_json::to_vec(value) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            tracing::debug!(
                target: "nbgradle.model",
                error = %err,
                "failed to serialize extension model"
            );
            None
        }
    }
}

/// Immutable snapshot of the models one extension received.
#[derive(Clone, Default)]
pub struct ExtensionModels {
    models: Vec<Arc<dyn ExtensionModel>>,
}

impl ExtensionModels {
    pub fn new(models: Vec<Arc<dyn ExtensionModel>>) -> Self {
        Self { models }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ExtensionModel>> {
        self.models.iter()
    }

    /// First model of type `T`.
    pub fn get<T: ExtensionModel>(&self) -> Option<&T> {
        self.models
            .iter()
            .find_map(|model| model.as_any().downcast_ref::<T>())
    }

    /// `true` when every model can be persisted.
    pub fn is_persistable(&self) -> bool {
        self.models.iter().all(|model| model.to_payload().is_some())
    }
}

impl fmt::Debug for ExtensionModels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.models.iter()).finish()
    }
}

impl FromIterator<Arc<dyn ExtensionModel>> for ExtensionModels {
    fn from_iter<I: IntoIterator<Item = Arc<dyn ExtensionModel>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug)]
struct LookupState {
    models: Arc<ExtensionModels>,
    loaded: bool,
}

/// Shared handle to the current models of one extension.
///
/// Clones refer to the same cell: when a newer load replaces the contents, everyone holding
/// a handle observes the new snapshot on their next [`ModelLookup::current`] call.
#[derive(Clone)]
pub struct ModelLookup {
    cell: Arc<RwLock<LookupState>>,
}

impl ModelLookup {
    /// A handle with no data yet.
    pub fn unloaded() -> Self {
        Self {
            cell: Arc::new(RwLock::new(LookupState {
                models: Arc::new(ExtensionModels::empty()),
                loaded: false,
            })),
        }
    }

    pub fn current(&self) -> Arc<ExtensionModels> {
        Arc::clone(&self.cell.read().models)
    }

    /// `true` once any snapshot (possibly empty) has been stored.
    pub fn is_loaded(&self) -> bool {
        self.cell.read().loaded
    }

    pub fn replace(&self, models: ExtensionModels) {
        let mut state = self.cell.write();
        state.models = Arc::new(models);
        state.loaded = true;
    }

    /// Copies `other`'s current snapshot into this handle. Returns `false` for the same handle.
    pub(crate) fn replace_from(&self, other: &ModelLookup) -> bool {
        if self.same_handle(other) {
            return false;
        }
        let (models, loaded) = {
            let other = other.cell.read();
            (Arc::clone(&other.models), other.loaded)
        };
        let mut state = self.cell.write();
        state.models = models;
        state.loaded = loaded;
        true
    }

    pub fn same_handle(&self, other: &ModelLookup) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Default for ModelLookup {
    fn default() -> Self {
        Self::unloaded()
    }
}

impl fmt::Debug for ModelLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.cell.read();
        f.debug_struct("ModelLookup")
            .field("loaded", &state.loaded)
            .field("models", &state.models)
            .finish()
    }
}

type DecodeFn = dyn Fn(&[u8]) -> Result<Arc<dyn ExtensionModel>> + Send + Sync;

/// Decoders restoring persisted extension models by [`ExtensionModel::model_type`].
#[derive(Clone, Default)]
pub struct ModelCodecs {
    decoders: HashMap<String, Arc<DecodeFn>>,
}

impl ModelCodecs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        model_type: impl Into<String>,
        decode: impl Fn(&[u8]) -> Result<Arc<dyn ExtensionModel>> + Send + Sync + 'static,
    ) {
        self.decoders.insert(model_type.into(), Arc::new(decode));
    }

    /// Registers a decoder for models persisted with [`json_payload`].
    pub fn register_json<T>(&mut self, model_type: impl Into<String>)
    where
        T: ExtensionModel + DeserializeOwned,
    {
        let model_type = model_type.into();
        let name = model_type.clone();
        self.register(model_type, move |bytes| {
            let model: T = serde_json::from_slice(bytes).map_err(|err| ModelError::Decode {
                model_type: name.clone(),
                message: err.to_string(),
            })?;
            Ok(Arc::new(model) as Arc<dyn ExtensionModel>)
        });
    }

    pub fn contains(&self, model_type: &str) -> bool {
        self.decoders.contains_key(model_type)
    }

    pub fn decode(&self, model_type: &str, bytes: &[u8]) -> Result<Arc<dyn ExtensionModel>> {
        let decoder = self
            .decoders
            .get(model_type)
            .ok_or_else(|| ModelError::UnknownModelType(model_type.to_string()))?;
        decoder(bytes)
    }
}

impl fmt::Debug for ModelCodecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.decoders.keys().collect();
        types.sort();
        f.debug_struct("ModelCodecs").field("types", &types).finish()
    }
}
