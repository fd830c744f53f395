use indexmap::IndexMap;
use nbgradle_config::CacheConfig;
use nbgradle_model::{GradleModel, ModelCodecs, PersistentModelKey};
use nbgradle_scheduler::SerialExecutor;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::persisted::PersistedModel;
use crate::store::{CacheDirLocator, ChainedModelStore, ModelPersister, StoredModelInfo};

pub const WRITER_THREAD_NAME: &str = "gradle-model-cache-writer";

#[derive(Default)]
struct WriteQueue {
    /// Pending models grouped by destination file, then by project.
    groups: IndexMap<PathBuf, IndexMap<PersistentModelKey, PersistedModel>>,
    drain_scheduled: bool,
}

struct Shared {
    persister: Box<dyn ModelPersister>,
    queue: Mutex<WriteQueue>,
}

impl Shared {
    fn drain(&self) {
        let groups = {
            let mut queue = self.queue.lock();
            queue.drain_scheduled = false;
            std::mem::take(&mut queue.groups)
        };

        for (destination, models) in groups {
            let count = models.len();
            let models: Vec<_> = models.into_values().collect();
            match self.persister.write_group(&destination, models) {
                Ok(()) => tracing::trace!(
                    target: "nbgradle.cache",
                    path = %destination.display(),
                    count,
                    "saved project models"
                ),
                Err(err) => tracing::warn!(
                    target: "nbgradle.cache",
                    path = %destination.display(),
                    error = %err,
                    "failed to save project models"
                ),
            }
        }
    }
}

/// Disk cache of loaded models, surviving restarts.
///
/// Reads are synchronous. Saves are queued and written by a single background writer; a save
/// for a project that is still queued replaces the queued data. Failures are logged and never
/// returned to callers of the load path.
#[derive(Clone)]
pub struct PersistentModelCache {
    shared: Arc<Shared>,
    codecs: Arc<RwLock<ModelCodecs>>,
    writer: SerialExecutor,
}

impl PersistentModelCache {
    pub fn new(persister: Box<dyn ModelPersister>, codecs: ModelCodecs) -> Self {
        Self {
            shared: Arc::new(Shared {
                persister,
                queue: Mutex::new(WriteQueue::default()),
            }),
            codecs: Arc::new(RwLock::new(codecs)),
            writer: SerialExecutor::new(WRITER_THREAD_NAME),
        }
    }

    /// Multi-file store with the single-file layout as read fallback, placed per `config`.
    pub fn from_config(config: &CacheConfig, codecs: ModelCodecs) -> Self {
        Self::new(
            Box::new(ChainedModelStore::standard(CacheDirLocator::from_config(config))),
            codecs,
        )
    }

    /// Adds decoders, e.g. for extensions registered after construction.
    pub fn register_codecs(&self, register: impl FnOnce(&mut ModelCodecs)) {
        register(&mut self.codecs.write());
    }

    /// The persisted form of `key`, including writes that are still queued.
    pub fn load_persisted(&self, key: &PersistentModelKey) -> Option<PersistedModel> {
        let queued = {
            let queue = self.shared.queue.lock();
            let destination = self.shared.persister.destination(key);
            queue
                .groups
                .get(&destination)
                .and_then(|group| group.get(key))
                .cloned()
        };
        if queued.is_some() {
            return queued;
        }

        match self.shared.persister.load(key) {
            Ok(found) => found,
            Err(err) => {
                tracing::debug!(
                    target: "nbgradle.cache",
                    project_dir = %key.project_dir().display(),
                    error = %err,
                    "failed to read persisted project model"
                );
                None
            }
        }
    }

    /// Restores the model saved for `key`. Any failure is reported as a miss.
    pub fn try_get_model(&self, key: &PersistentModelKey) -> Option<GradleModel> {
        let persisted = self.load_persisted(key)?;
        match persisted.restore(&self.codecs.read()) {
            Ok(model) => Some(model),
            Err(err) => {
                tracing::debug!(
                    target: "nbgradle.cache",
                    project_dir = %key.project_dir().display(),
                    error = %err,
                    "failed to restore persisted project model"
                );
                None
            }
        }
    }

    /// Queues `models` for writing. Projects with an unserializable extension model are
    /// skipped.
    pub fn save_models<'a>(&self, models: impl IntoIterator<Item = &'a GradleModel>) {
        let captured: Vec<_> = models
            .into_iter()
            .filter_map(PersistedModel::capture)
            .collect();
        if captured.is_empty() {
            return;
        }

        let schedule = {
            let mut queue = self.shared.queue.lock();
            for model in captured {
                let key = model.key();
                let destination = self.shared.persister.destination(&key);
                queue
                    .groups
                    .entry(destination)
                    .or_default()
                    .insert(key, model);
            }
            !std::mem::replace(&mut queue.drain_scheduled, true)
        };

        if schedule {
            let shared = Arc::clone(&self.shared);
            self.writer.submit(move || shared.drain());
        }
    }

    /// Blocks until every queued save has been written.
    pub fn flush(&self) {
        self.writer.flush();
    }

    /// Forgets `key`, both queued and on disk.
    pub fn invalidate(&self, key: &PersistentModelKey) -> Result<bool> {
        let queued = {
            let mut queue = self.shared.queue.lock();
            let destination = self.shared.persister.destination(key);
            queue
                .groups
                .get_mut(&destination)
                .and_then(|group| group.shift_remove(key))
                .is_some()
        };
        // A drain that already took the group must finish before the file is removed.
        self.flush();
        let removed = self.shared.persister.remove(key)?;
        Ok(queued || removed)
    }

    /// Removes everything persisted for the build rooted at `root_dir`.
    pub fn clear_root(&self, root_dir: &Path) -> Result<usize> {
        self.flush();
        self.shared.persister.clear_root(root_dir)
    }

    pub fn list_entries(&self, root_dir: &Path) -> Result<Vec<StoredModelInfo>> {
        self.flush();
        self.shared.persister.list(root_dir)
    }
}

impl fmt::Debug for PersistentModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentModelCache")
            .field("persister", &self.shared.persister)
            .field("codecs", &*self.codecs.read())
            .finish()
    }
}
