use nbgradle_cache::{GradleModelCache, PersistentModelCache};
use nbgradle_config::{GradleConfig, ProjectSettingsProvider};
use nbgradle_model::{find_settings_file, GradleModel, PersistentModelKey};
use nbgradle_scheduler::{CancellationToken, SerialExecutor, TaskExecutor};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ModelLoadError, Result, ToolingError};
use crate::extension::ExtensionRegistry;
use crate::issues::{ModelLoadIssue, ModelLoadIssueReporter};
use crate::project::OpenProjectRegistry;
use crate::protocol::{ConnectionTarget, GradleConnector, OperationConfig, TracingProgressListener};
use crate::strategy::{select_strategy, LoadRequest, LoadedModels};
use crate::version::known_issues;

pub const LOADER_THREAD_NAME: &str = "Gradle-Project-Loader";

/// Shared collaborators of every loader created by one context.
#[derive(Clone)]
pub struct LoaderServices {
    pub settings: Arc<dyn ProjectSettingsProvider>,
    pub memory: Arc<GradleModelCache>,
    pub persistent: Option<PersistentModelCache>,
    pub extensions: Arc<ExtensionRegistry>,
    pub connector: Arc<dyn GradleConnector>,
    pub issues: Arc<dyn ModelLoadIssueReporter>,
    /// Delivers load results, one at a time.
    pub notifier: Arc<dyn TaskExecutor>,
    pub open_projects: Arc<OpenProjectRegistry>,
}

impl fmt::Debug for LoaderServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderServices")
            .field("memory", &self.memory)
            .field("persistent", &self.persistent)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// Whether the disk cache may still be consulted.
///
/// Loaders start cold and turn warm after their first successful live load; from then on,
/// live data is authoritative and persisted models are never served again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWarmth {
    Cold,
    Warm,
}

/// Loads the model of one project directory.
///
/// Requests are queued on a dedicated worker and processed in submission order, so at most
/// one connection to the build is open per loader. Clones share the same worker and state.
#[derive(Clone)]
pub struct GradleModelLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    project_dir: PathBuf,
    services: LoaderServices,
    warmth: Mutex<CacheWarmth>,
    /// Settings file whose build turned out not to contain this project.
    excluded_by: Mutex<Option<PathBuf>>,
    cancellation: CancellationToken,
    executor: SerialExecutor,
}

enum LoadKey {
    /// Load the project live using this settings file.
    Resolved(Option<PathBuf>),
    /// Loading the root already produced the project's model.
    Loaded(Arc<GradleModel>),
}

impl GradleModelLoader {
    pub fn new(project_dir: &Path, services: LoaderServices) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                project_dir: project_dir.to_path_buf(),
                services,
                warmth: Mutex::new(CacheWarmth::Cold),
                excluded_by: Mutex::new(None),
                cancellation: CancellationToken::new(),
                executor: SerialExecutor::new(LOADER_THREAD_NAME),
            }),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.inner.project_dir
    }

    pub fn warmth(&self) -> CacheWarmth {
        *self.inner.warmth.lock()
    }

    /// Queues a load and returns immediately.
    ///
    /// `listener` is called exactly once, on the notifier, with the loaded model or the reason
    /// the load failed. A failed load leaves previously loaded models in effect.
    /// `about_to_complete` runs on the loader worker right before the result is handed over.
    ///
    /// With `may_fetch_from_cache` unset, cached models are ignored for this request; the
    /// caches are still updated with the result.
    pub fn fetch_model<L, C>(&self, may_fetch_from_cache: bool, listener: L, about_to_complete: C)
    where
        L: FnOnce(Result<Arc<GradleModel>>) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let guard = CompletionGuard {
            project_dir: self.inner.project_dir.clone(),
            notifier: Arc::clone(&self.inner.services.notifier),
            listener: Some(Box::new(listener)),
            about_to_complete: Some(Box::new(about_to_complete)),
        };
        let inner = Arc::clone(&self.inner);
        self.inner
            .executor
            .submit(move || inner.fetch(may_fetch_from_cache, guard));
    }

    /// Blocks until every load queued before this call has finished.
    pub fn flush(&self) {
        self.inner.executor.flush();
    }

    /// Cancels the running load and fails every later one with [`ModelLoadError::Cancelled`].
    pub fn shutdown(&self) {
        self.inner.cancellation.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancellation.is_cancelled()
    }
}

impl fmt::Debug for GradleModelLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradleModelLoader")
            .field("project_dir", &self.inner.project_dir)
            .field("warmth", &self.warmth())
            .field("pending", &self.inner.executor.pending())
            .finish()
    }
}

impl LoaderInner {
    fn fetch(self: &Arc<Self>, may_fetch_from_cache: bool, guard: CompletionGuard) {
        let project_dir = self.project_dir.as_path();
        let settings_file = if may_fetch_from_cache {
            self.lookup_settings_file(project_dir)
        } else {
            find_settings_file(project_dir)
        };

        if may_fetch_from_cache {
            if let Some(model) = self.cached_model(project_dir, settings_file.as_deref()) {
                tracing::debug!(
                    target: "nbgradle.loader",
                    project_dir = %project_dir.display(),
                    "project model served from memory"
                );
                guard.complete(Ok(model));
                return;
            }

            if self.warmth() == CacheWarmth::Cold {
                if let Some(model) = self.persisted_model(project_dir, settings_file.as_deref()) {
                    tracing::debug!(
                        target: "nbgradle.loader",
                        project_dir = %project_dir.display(),
                        "project model served from disk; reloading in background"
                    );
                    let inner = Arc::clone(self);
                    self.executor.submit(move || {
                        let project_dir = inner.project_dir.clone();
                        let settings_file = find_settings_file(&project_dir);
                        if let Err(err) = inner.load_live(&project_dir, settings_file, false) {
                            inner.report(&err);
                        }
                    });
                    guard.complete(Ok(model));
                    return;
                }
            }
        }

        let result = self.load_live(project_dir, settings_file, may_fetch_from_cache);
        if let Err(err) = &result {
            self.report(err);
        }
        guard.complete(result);
    }

    fn warmth(&self) -> CacheWarmth {
        *self.warmth.lock()
    }

    /// The settings file the project's models are cached under.
    ///
    /// `None` once the project was found to be outside the build of its settings file, for as
    /// long as that settings file stays the nearest one.
    fn lookup_settings_file(&self, project_dir: &Path) -> Option<PathBuf> {
        let found = find_settings_file(project_dir)?;
        if self.excluded_by.lock().as_deref() == Some(found.as_path()) {
            return None;
        }
        Some(found)
    }

    /// A non-dirty memory entry carrying data of every registered extension.
    fn cached_model(
        &self,
        project_dir: &Path,
        settings_file: Option<&Path>,
    ) -> Option<Arc<GradleModel>> {
        let model = self.services.memory.try_get(project_dir, settings_file)?;
        model
            .has_all_extensions(self.services.extensions.names())
            .then_some(model)
    }

    fn persisted_model(
        &self,
        project_dir: &Path,
        settings_file: Option<&Path>,
    ) -> Option<Arc<GradleModel>> {
        let persistent = self.services.persistent.as_ref()?;
        let root_dir = settings_file.and_then(Path::parent).unwrap_or(project_dir);
        let model = persistent.try_get_model(&PersistentModelKey::new(root_dir, project_dir))?;

        if model.settings_file() != settings_file {
            tracing::debug!(
                target: "nbgradle.loader",
                project_dir = %project_dir.display(),
                "persisted model was loaded with a different settings file"
            );
            return None;
        }
        if !model.has_all_extensions(self.services.extensions.names()) {
            tracing::debug!(
                target: "nbgradle.loader",
                project_dir = %project_dir.display(),
                "persisted model lacks data of some extensions"
            );
            return None;
        }

        Some(self.publish(Arc::new(model)))
    }

    fn load_live(
        &self,
        project_dir: &Path,
        settings_file: Option<PathBuf>,
        may_fetch_from_cache: bool,
    ) -> Result<Arc<GradleModel>> {
        let settings = self.services.settings.gradle_settings(project_dir);

        let settings_file = if settings.load_root_project_first {
            match self.fix_load_key(project_dir, settings_file, may_fetch_from_cache)? {
                LoadKey::Loaded(model) => return Ok(model),
                LoadKey::Resolved(settings_file) => settings_file,
            }
        } else {
            settings_file
        };

        let loaded = self.connect_and_load(project_dir, settings_file.as_deref(), &settings)?;
        Ok(self.store(loaded))
    }

    /// Resolves the build the project belongs to by loading its root project first.
    ///
    /// A project that the root's tree does not contain is loaded as a standalone build.
    fn fix_load_key(
        &self,
        project_dir: &Path,
        settings_file: Option<PathBuf>,
        may_fetch_from_cache: bool,
    ) -> Result<LoadKey> {
        let Some(root_dir) = settings_file
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
        else {
            return Ok(LoadKey::Resolved(settings_file));
        };
        if root_dir.as_path() == project_dir {
            return Ok(LoadKey::Resolved(settings_file));
        }

        let cached_root = if may_fetch_from_cache {
            self.cached_model(&root_dir, settings_file.as_deref())
        } else {
            None
        };
        let (root_model, loaded_live) = match cached_root {
            Some(model) => (model, false),
            None => {
                let root_settings = self.services.settings.gradle_settings(&root_dir);
                let loaded =
                    self.connect_and_load(&root_dir, settings_file.as_deref(), &root_settings)?;
                (self.store(loaded), true)
            }
        };

        if root_model
            .project_def()
            .root_project()
            .find_by_dir(project_dir)
            .is_none()
        {
            tracing::info!(
                target: "nbgradle.loader",
                project_dir = %project_dir.display(),
                root_dir = %root_dir.display(),
                "project is not part of the build of its settings file; loading it standalone"
            );
            *self.excluded_by.lock() = settings_file;
            if may_fetch_from_cache {
                if let Some(model) = self.cached_model(project_dir, None) {
                    return Ok(LoadKey::Loaded(model));
                }
            }
            return Ok(LoadKey::Resolved(None));
        }
        *self.excluded_by.lock() = None;

        if loaded_live {
            if let Some(model) = self.cached_model(project_dir, settings_file.as_deref()) {
                return Ok(LoadKey::Loaded(model));
            }
        }
        Ok(LoadKey::Resolved(settings_file))
    }

    fn connect_and_load(
        &self,
        project_dir: &Path,
        settings_file: Option<&Path>,
        settings: &GradleConfig,
    ) -> Result<LoadedModels> {
        let cancellation = &self.cancellation;
        if cancellation.is_cancelled() {
            return Err(ModelLoadError::Cancelled {
                project_dir: project_dir.to_path_buf(),
            });
        }
        let tooling = |err: ToolingError| ModelLoadError::from_tooling(project_dir, err);

        let target = ConnectionTarget::new(project_dir, settings);
        let config = OperationConfig::from_settings(settings)
            .with_progress_listener(Arc::new(TracingProgressListener::new(project_dir)));

        let mut connection = self
            .services
            .connector
            .connect(&target, cancellation)
            .map_err(tooling)?;
        let environment = connection
            .build_environment(&config, cancellation)
            .map_err(tooling)?;

        for message in known_issues(&environment.gradle_version) {
            self.services.issues.report(ModelLoadIssue::VersionAdvisory {
                project_dir: project_dir.to_path_buf(),
                version: environment.gradle_version.clone(),
                message,
            });
        }

        let strategy = select_strategy(&environment.gradle_version, settings.model_load_strategy);
        tracing::info!(
            target: "nbgradle.loader",
            project_dir = %project_dir.display(),
            gradle_version = %environment.gradle_version,
            strategy = ?strategy,
            "loading project models"
        );

        let request = LoadRequest {
            project_dir,
            settings_file,
            extensions: &*self.services.extensions,
            config: &config,
            cancellation,
        };
        strategy.load(&mut *connection, &request).map_err(tooling)
    }

    /// Writes a live load through to both caches and the open projects; returns the stored
    /// main model.
    fn store(&self, loaded: LoadedModels) -> Arc<GradleModel> {
        let LoadedModels { main, others } = loaded;
        let main = self.publish(Arc::new(main));
        let others: Vec<_> = others
            .into_iter()
            .map(|model| self.publish(Arc::new(model)))
            .collect();

        if let Some(persistent) = &self.services.persistent {
            persistent.save_models(std::iter::once(&*main).chain(others.iter().map(|m| &**m)));
        }

        *self.warmth.lock() = CacheWarmth::Warm;
        main
    }

    fn publish(&self, model: Arc<GradleModel>) -> Arc<GradleModel> {
        let stored = self.services.memory.update_entry(model);
        self.services.open_projects.model_loaded(&stored);
        stored
    }

    fn report(&self, err: &ModelLoadError) {
        match ModelLoadIssue::from_error(err) {
            Some(issue) => self.services.issues.report(issue),
            None => tracing::info!(
                target: "nbgradle.loader",
                project_dir = %err.project_dir().display(),
                "project load cancelled"
            ),
        }
    }
}

type ModelListener = Box<dyn FnOnce(Result<Arc<GradleModel>>) + Send>;

/// Answers a request exactly once; a request dropped unanswered is reported as aborted.
struct CompletionGuard {
    project_dir: PathBuf,
    notifier: Arc<dyn TaskExecutor>,
    listener: Option<ModelListener>,
    about_to_complete: Option<Box<dyn FnOnce() + Send>>,
}

impl CompletionGuard {
    fn complete(mut self, result: Result<Arc<GradleModel>>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: Result<Arc<GradleModel>>) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        if let Some(about_to_complete) = self.about_to_complete.take() {
            about_to_complete();
        }
        self.notifier.execute(Box::new(move || listener(result)));
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.listener.is_some() {
            tracing::warn!(
                target: "nbgradle.loader",
                project_dir = %self.project_dir.display(),
                "project load ended without a result"
            );
            let project_dir = std::mem::take(&mut self.project_dir);
            self.deliver(Err(ModelLoadError::Aborted { project_dir }));
        }
    }
}
