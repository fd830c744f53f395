use indexmap::IndexMap;
use nbgradle_config::{LiveValue, LiveValueSubscription};
use nbgradle_model::{CacheKey, GradleModel};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Notified when a cached model is superseded by a newer one.
pub trait ProjectModelUpdatedListener: Send + Sync {
    fn on_update_project(&self, model: &Arc<GradleModel>);
}

/// In-memory cache of loaded models keyed by project directory and settings file.
///
/// Entries are kept in insertion order; once the cache grows past its capacity the oldest
/// inserted entries are evicted. Updating an existing entry keeps its position.
pub struct GradleModelCache {
    max_capacity: AtomicUsize,
    entries: Mutex<IndexMap<CacheKey, Arc<GradleModel>>>,
    listeners: RwLock<Vec<Arc<dyn ProjectModelUpdatedListener>>>,
}

impl GradleModelCache {
    pub fn new(max_capacity: usize) -> Self {
        Self {
            max_capacity: AtomicUsize::new(max_capacity.max(1)),
            entries: Mutex::new(IndexMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Changes the capacity; shrinking evicts immediately. Values below one are raised to one.
    pub fn set_max_capacity(&self, max_capacity: usize) {
        let max_capacity = max_capacity.max(1);
        let previous = self.max_capacity.swap(max_capacity, Ordering::AcqRel);
        if max_capacity < previous {
            let mut entries = self.entries.lock();
            self.evict_overflow(&mut entries);
        }
    }

    /// Follows `capacity` until the returned subscription is dropped.
    pub fn bind_capacity(self: &Arc<Self>, capacity: &LiveValue<usize>) -> LiveValueSubscription {
        self.set_max_capacity(capacity.get());
        let cache = Arc::downgrade(self);
        capacity.subscribe(move |&size| {
            if let Some(cache) = cache.upgrade() {
                tracing::debug!(
                    target: "nbgradle.cache",
                    capacity = size,
                    "project model cache capacity changed"
                );
                cache.set_max_capacity(size);
            }
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn ProjectModelUpdatedListener>) {
        self.listeners.write().push(listener);
    }

    /// The cached model for the key, unless it has been marked dirty.
    pub fn try_get(
        &self,
        project_dir: &Path,
        settings_file: Option<&Path>,
    ) -> Option<Arc<GradleModel>> {
        let key = CacheKey::new(project_dir, settings_file.map(Path::to_path_buf));
        self.try_get_key(&key)
    }

    pub fn try_get_key(&self, key: &CacheKey) -> Option<Arc<GradleModel>> {
        self.entries
            .lock()
            .get(key)
            .filter(|model| !model.is_dirty())
            .cloned()
    }

    /// Stores `model`, merging it into an existing entry for the same key.
    ///
    /// Returns the model actually stored. A superseded entry is marked dirty.
    pub fn update_entry(&self, model: Arc<GradleModel>) -> Arc<GradleModel> {
        let key = model.cache_key();
        let (stored, replaced) = {
            let mut entries = self.entries.lock();
            match entries.get_mut(&key) {
                Some(existing) => {
                    let merged = Arc::new(existing.merged_with(&model));
                    existing.mark_dirty();
                    *existing = Arc::clone(&merged);
                    (merged, true)
                }
                None => {
                    entries.insert(key, Arc::clone(&model));
                    self.evict_overflow(&mut entries);
                    (model, false)
                }
            }
        };

        if replaced {
            self.notify(&stored);
        }
        stored
    }

    /// Stores `model` as is, overwriting any existing entry.
    pub fn replace_entry(&self, model: Arc<GradleModel>) {
        let key = model.cache_key();
        let previous = {
            let mut entries = self.entries.lock();
            let previous = entries.insert(key, Arc::clone(&model));
            if previous.is_none() {
                self.evict_overflow(&mut entries);
            }
            previous
        };

        if previous.is_some() {
            self.notify(&model);
        }
    }

    fn evict_overflow(&self, entries: &mut IndexMap<CacheKey, Arc<GradleModel>>) {
        let capacity = self.max_capacity();
        while entries.len() > capacity {
            if let Some((key, _)) = entries.shift_remove_index(0) {
                tracing::trace!(
                    target: "nbgradle.cache",
                    project_dir = %key.project_dir.display(),
                    "evicted project model"
                );
            }
        }
    }

    fn notify(&self, model: &Arc<GradleModel>) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.on_update_project(model);
        }
    }
}

impl fmt::Debug for GradleModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradleModelCache")
            .field("max_capacity", &self.max_capacity())
            .field("len", &self.len())
            .finish()
    }
}
