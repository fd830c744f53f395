use nbgradle_config::CacheConfig;
use nbgradle_model::PersistentModelKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CacheError, Result};
use crate::persisted::{PersistedModel, MODEL_CACHE_SCHEMA_VERSION};
use crate::util::{
    atomic_write, decode, encode, is_temp_file, md5_hex, now_millis,
    read_cache_file, remove_best_effort, truncate_name,
};

/// Characters of the directory name kept in persisted file names.
pub const FILE_NAME_PREFIX_CHARS: usize = 16;

/// File holding every project of a root in the single-file layout.
pub const ROOT_MODELS_FILE_NAME: &str = "project-models.bin";

/// Maps a build root to the directory its persisted models live in.
#[derive(Clone)]
pub struct CacheDirLocator {
    locate: Arc<dyn Fn(&Path) -> PathBuf + Send + Sync>,
}

impl CacheDirLocator {
    pub fn new(locate: impl Fn(&Path) -> PathBuf + Send + Sync + 'static) -> Self {
        Self {
            locate: Arc::new(locate),
        }
    }

    /// Follows `config`: a relative directory lives inside each root, an absolute directory
    /// is shared and gets one sub-directory per root.
    pub fn from_config(config: &CacheConfig) -> Self {
        let config = config.clone();
        Self::new(move |root_dir| {
            if config.directory.is_absolute() {
                config
                    .directory
                    .join(hashed_file_name(root_dir, &root_dir.to_string_lossy()))
            } else {
                config.persistent_dir_for_root(root_dir)
            }
        })
    }

    pub fn cache_dir(&self, root_dir: &Path) -> PathBuf {
        (self.locate)(root_dir)
    }
}

impl fmt::Debug for CacheDirLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheDirLocator").finish_non_exhaustive()
    }
}

/// `<first 16 chars of the directory name>-<md5 of hashed>`.
pub fn hashed_file_name(dir: &Path, hashed: &str) -> String {
    let dir_name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!(
        "{}-{}",
        truncate_name(&dir_name, FILE_NAME_PREFIX_CHARS),
        md5_hex(hashed)
    )
}

/// Summary of one persisted project, as reported by [`ModelPersister::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredModelInfo {
    pub file: PathBuf,
    pub root_dir: PathBuf,
    pub project_dir: PathBuf,
    pub project_path: String,
    pub extensions: Vec<String>,
    pub saved_at_millis: u64,
}

impl StoredModelInfo {
    fn new(file: &Path, model: &PersistedModel, saved_at_millis: u64) -> Self {
        Self {
            file: file.to_path_buf(),
            root_dir: model.root_dir.clone(),
            project_dir: model.project_dir.clone(),
            project_path: model.main_path.clone(),
            extensions: model.extension_names().into_iter().map(String::from).collect(),
            saved_at_millis,
        }
    }
}

/// A disk layout for persisted models.
pub trait ModelPersister: Send + Sync + fmt::Debug {
    /// File the model for `key` is written to. Writes are grouped by this path.
    fn destination(&self, key: &PersistentModelKey) -> PathBuf;

    fn load(&self, key: &PersistentModelKey) -> Result<Option<PersistedModel>>;

    /// Writes `models`, all of which map to `destination`.
    fn write_group(&self, destination: &Path, models: Vec<PersistedModel>) -> Result<()>;

    fn remove(&self, key: &PersistentModelKey) -> Result<bool>;

    fn list(&self, root_dir: &Path) -> Result<Vec<StoredModelInfo>>;

    /// Removes every entry of `root_dir`, returning how many files were deleted.
    fn clear_root(&self, root_dir: &Path) -> Result<usize>;
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    schema_version: u32,
    saved_at_millis: u64,
    model: PersistedModel,
}

#[derive(Debug, Serialize, Deserialize)]
struct RootModelsFile {
    schema_version: u32,
    saved_at_millis: u64,
    models: BTreeMap<String, PersistedModel>,
}

fn check_schema(found: u32) -> Result<()> {
    if found == MODEL_CACHE_SCHEMA_VERSION {
        Ok(())
    } else {
        Err(CacheError::IncompatibleSchemaVersion {
            expected: MODEL_CACHE_SCHEMA_VERSION,
            found,
        })
    }
}

/// Reads and decodes `path`. Undecodable or incompatible files are deleted and reported as
/// missing.
fn read_versioned<T: for<'de> Deserialize<'de>>(
    path: &Path,
    schema_of: impl Fn(&T) -> u32,
) -> Option<T> {
    let bytes = read_cache_file(path)?;
    let decoded = decode::<T>(&bytes).and_then(|value| {
        check_schema(schema_of(&value))?;
        Ok(value)
    });
    match decoded {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(
                target: "nbgradle.cache",
                path = %path.display(),
                error = %err,
                "discarding unreadable model cache file"
            );
            remove_best_effort(path, "undecodable");
            None
        }
    }
}

fn remove_dir_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    let mut removed = 0;
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && !keep(&path) && remove_best_effort(&path, "clear") {
            removed += 1;
        }
    }
    Ok(removed)
}

/// One file per project, named `<dir name prefix>-<md5 of the root-relative path>`.
#[derive(Debug, Clone)]
pub struct MultiFileModelStore {
    locator: CacheDirLocator,
}

impl MultiFileModelStore {
    pub fn new(locator: CacheDirLocator) -> Self {
        Self { locator }
    }

    pub fn file_name(key: &PersistentModelKey) -> String {
        hashed_file_name(key.project_dir(), &key.relative_project_path())
    }

    fn is_model_file(path: &Path) -> bool {
        !is_temp_file(path)
            && path.file_name().and_then(|name| name.to_str()) != Some(ROOT_MODELS_FILE_NAME)
    }
}

impl ModelPersister for MultiFileModelStore {
    fn destination(&self, key: &PersistentModelKey) -> PathBuf {
        self.locator
            .cache_dir(key.root_dir())
            .join(Self::file_name(key))
    }

    fn load(&self, key: &PersistentModelKey) -> Result<Option<PersistedModel>> {
        let path = self.destination(key);
        let Some(file) = read_versioned::<ModelFile>(&path, |file| file.schema_version) else {
            return Ok(None);
        };
        if !file.model.matches(key) {
            tracing::debug!(
                target: "nbgradle.cache",
                path = %path.display(),
                project_dir = %key.project_dir().display(),
                stored = %file.model.project_dir.display(),
                "persisted model belongs to a different project"
            );
            return Ok(None);
        }
        Ok(Some(file.model))
    }

    fn write_group(&self, destination: &Path, models: Vec<PersistedModel>) -> Result<()> {
        // Later entries for the same file win.
        let Some(model) = models.into_iter().last() else {
            return Ok(());
        };
        let file = ModelFile {
            schema_version: MODEL_CACHE_SCHEMA_VERSION,
            saved_at_millis: now_millis(),
            model,
        };
        atomic_write(destination, &encode(&file)?)
    }

    fn remove(&self, key: &PersistentModelKey) -> Result<bool> {
        let path = self.destination(key);
        let existed = path.exists();
        Ok(remove_best_effort(&path, "invalidate") && existed)
    }

    fn list(&self, root_dir: &Path) -> Result<Vec<StoredModelInfo>> {
        let dir = self.locator.cache_dir(root_dir);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut out = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || !Self::is_model_file(&path) {
                continue;
            }
            if let Some(file) = read_versioned::<ModelFile>(&path, |file| file.schema_version) {
                out.push(StoredModelInfo::new(&path, &file.model, file.saved_at_millis));
            }
        }
        out.sort_by(|a, b| a.project_path.cmp(&b.project_path));
        Ok(out)
    }

    fn clear_root(&self, root_dir: &Path) -> Result<usize> {
        remove_dir_entries(&self.locator.cache_dir(root_dir), |path| {
            !Self::is_model_file(path)
        })
    }
}

/// Older layout: a single file per root holding every project keyed by relative path.
#[derive(Debug, Clone)]
pub struct SingleFileModelStore {
    locator: CacheDirLocator,
}

impl SingleFileModelStore {
    pub fn new(locator: CacheDirLocator) -> Self {
        Self { locator }
    }

    fn read(&self, path: &Path) -> Option<RootModelsFile> {
        read_versioned::<RootModelsFile>(path, |file| file.schema_version)
    }
}

impl ModelPersister for SingleFileModelStore {
    fn destination(&self, key: &PersistentModelKey) -> PathBuf {
        self.locator
            .cache_dir(key.root_dir())
            .join(ROOT_MODELS_FILE_NAME)
    }

    fn load(&self, key: &PersistentModelKey) -> Result<Option<PersistedModel>> {
        let path = self.destination(key);
        let Some(mut file) = self.read(&path) else {
            return Ok(None);
        };
        Ok(file
            .models
            .remove(&key.relative_project_path())
            .filter(|model| model.matches(key)))
    }

    fn write_group(&self, destination: &Path, models: Vec<PersistedModel>) -> Result<()> {
        let mut file = self.read(destination).unwrap_or_else(|| RootModelsFile {
            schema_version: MODEL_CACHE_SCHEMA_VERSION,
            saved_at_millis: 0,
            models: BTreeMap::new(),
        });
        for model in models {
            let key = model.key();
            file.models.insert(key.relative_project_path(), model);
        }
        file.saved_at_millis = now_millis();
        atomic_write(destination, &encode(&file)?)
    }

    fn remove(&self, key: &PersistentModelKey) -> Result<bool> {
        let path = self.destination(key);
        let Some(mut file) = self.read(&path) else {
            return Ok(false);
        };
        if file.models.remove(&key.relative_project_path()).is_none() {
            return Ok(false);
        }
        if file.models.is_empty() {
            remove_best_effort(&path, "invalidate");
        } else {
            atomic_write(&path, &encode(&file)?)?;
        }
        Ok(true)
    }

    fn list(&self, root_dir: &Path) -> Result<Vec<StoredModelInfo>> {
        let path = self.locator.cache_dir(root_dir).join(ROOT_MODELS_FILE_NAME);
        let Some(file) = self.read(&path) else {
            return Ok(Vec::new());
        };
        Ok(file
            .models
            .values()
            .map(|model| StoredModelInfo::new(&path, model, file.saved_at_millis))
            .collect())
    }

    fn clear_root(&self, root_dir: &Path) -> Result<usize> {
        let path = self.locator.cache_dir(root_dir).join(ROOT_MODELS_FILE_NAME);
        let existed = path.is_file();
        Ok(usize::from(existed && remove_best_effort(&path, "clear")))
    }
}

/// Reads from each store in order; writes go to the first.
#[derive(Debug)]
pub struct ChainedModelStore {
    primary: Box<dyn ModelPersister>,
    fallbacks: Vec<Box<dyn ModelPersister>>,
}

impl ChainedModelStore {
    pub fn new(primary: Box<dyn ModelPersister>, fallbacks: Vec<Box<dyn ModelPersister>>) -> Self {
        Self { primary, fallbacks }
    }

    /// Multi-file store backed by the single-file layout for entries written by older versions.
    pub fn standard(locator: CacheDirLocator) -> Self {
        Self::new(
            Box::new(MultiFileModelStore::new(locator.clone())),
            vec![Box::new(SingleFileModelStore::new(locator))],
        )
    }

    fn stores(&self) -> impl Iterator<Item = &dyn ModelPersister> {
        std::iter::once(&*self.primary).chain(self.fallbacks.iter().map(|store| &**store))
    }
}

impl ModelPersister for ChainedModelStore {
    fn destination(&self, key: &PersistentModelKey) -> PathBuf {
        self.primary.destination(key)
    }

    fn load(&self, key: &PersistentModelKey) -> Result<Option<PersistedModel>> {
        for store in self.stores() {
            match store.load(key) {
                Ok(Some(model)) => return Ok(Some(model)),
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(
                        target: "nbgradle.cache",
                        project_dir = %key.project_dir().display(),
                        error = %err,
                        "persistent model store failed to load"
                    );
                }
            }
        }
        Ok(None)
    }

    fn write_group(&self, destination: &Path, models: Vec<PersistedModel>) -> Result<()> {
        self.primary.write_group(destination, models)
    }

    fn remove(&self, key: &PersistentModelKey) -> Result<bool> {
        let mut removed = false;
        for store in self.stores() {
            removed |= store.remove(key)?;
        }
        Ok(removed)
    }

    fn list(&self, root_dir: &Path) -> Result<Vec<StoredModelInfo>> {
        let mut out: Vec<StoredModelInfo> = Vec::new();
        for store in self.stores() {
            for info in store.list(root_dir)? {
                if !out.iter().any(|seen| seen.project_dir == info.project_dir) {
                    out.push(info);
                }
            }
        }
        Ok(out)
    }

    fn clear_root(&self, root_dir: &Path) -> Result<usize> {
        let mut removed = 0;
        for store in self.stores() {
            removed += store.clear_root(root_dir)?;
        }
        Ok(removed)
    }
}
