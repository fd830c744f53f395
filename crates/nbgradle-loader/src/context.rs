use nbgradle_cache::{GradleModelCache, PersistentModelCache};
use nbgradle_config::{LiveValueSubscription, ProjectSettingsProvider, SettingsStore};
use nbgradle_scheduler::{SerialExecutor, TaskExecutor};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::extension::{ExtensionRegistry, GradleExtension};
use crate::issues::{LoggingIssueReporter, ModelLoadIssueReporter};
use crate::loader::{GradleModelLoader, LoaderServices};
use crate::project::{GradleProject, OpenProjectRegistry};
use crate::protocol::GradleConnector;

pub const NOTIFIER_THREAD_NAME: &str = "gradle-model-notifier";
pub const UI_THREAD_NAME: &str = "gradle-project-ui";

/// Application-lifetime owner of the model caches and everything loaders share.
pub struct GradleModelContext {
    settings: SettingsStore,
    services: LoaderServices,
    _capacity: LiveValueSubscription,
    ui: Arc<dyn TaskExecutor>,
}

enum PersistentChoice {
    FromSettings,
    Given(PersistentModelCache),
    Disabled,
}

pub struct GradleModelContextBuilder {
    connector: Arc<dyn GradleConnector>,
    settings: SettingsStore,
    extensions: ExtensionRegistry,
    issues: Arc<dyn ModelLoadIssueReporter>,
    notifier: Option<Arc<dyn TaskExecutor>>,
    ui: Option<Arc<dyn TaskExecutor>>,
    persistent: PersistentChoice,
}

impl GradleModelContextBuilder {
    pub fn settings(mut self, settings: SettingsStore) -> Self {
        self.settings = settings;
        self
    }

    pub fn extension(mut self, extension: Arc<dyn GradleExtension>) -> Self {
        self.extensions.register(extension);
        self
    }

    pub fn issue_reporter(mut self, issues: Arc<dyn ModelLoadIssueReporter>) -> Self {
        self.issues = issues;
        self
    }

    /// Executor delivering load results. Defaults to a dedicated sequential worker.
    pub fn notifier(mut self, notifier: Arc<dyn TaskExecutor>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Executor running project change listeners.
    pub fn ui_executor(mut self, ui: Arc<dyn TaskExecutor>) -> Self {
        self.ui = Some(ui);
        self
    }

    /// Uses `cache` instead of the one described by the cache settings.
    pub fn persistent_cache(mut self, cache: PersistentModelCache) -> Self {
        self.persistent = PersistentChoice::Given(cache);
        self
    }

    pub fn without_persistent_cache(mut self) -> Self {
        self.persistent = PersistentChoice::Disabled;
        self
    }

    pub fn build(self) -> GradleModelContext {
        let cache_settings = self.settings.cache_settings();
        let persistent = match self.persistent {
            PersistentChoice::Given(cache) => {
                let extensions = &self.extensions;
                cache.register_codecs(|codecs| {
                    for extension in extensions.iter() {
                        extension.register_codecs(codecs);
                    }
                });
                Some(cache)
            }
            PersistentChoice::FromSettings if cache_settings.persistent => Some(
                PersistentModelCache::from_config(&cache_settings, self.extensions.codecs()),
            ),
            PersistentChoice::FromSettings | PersistentChoice::Disabled => None,
        };

        let memory = Arc::new(GradleModelCache::new(cache_settings.project_cache_size));
        let capacity = memory.bind_capacity(&self.settings.project_cache_size());

        let open_projects = Arc::new(OpenProjectRegistry::new());
        memory.add_listener(open_projects.clone());

        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(SerialExecutor::new(NOTIFIER_THREAD_NAME)));
        let ui = self
            .ui
            .unwrap_or_else(|| Arc::new(SerialExecutor::new(UI_THREAD_NAME)));

        tracing::debug!(
            target: "nbgradle.loader",
            extensions = ?self.extensions,
            persistent = persistent.is_some(),
            capacity = memory.max_capacity(),
            "created gradle model context"
        );

        GradleModelContext {
            services: LoaderServices {
                settings: Arc::new(self.settings.clone()),
                memory,
                persistent,
                extensions: Arc::new(self.extensions),
                connector: self.connector,
                issues: self.issues,
                notifier,
                open_projects,
            },
            settings: self.settings,
            _capacity: capacity,
            ui,
        }
    }
}

impl GradleModelContext {
    pub fn builder(connector: Arc<dyn GradleConnector>) -> GradleModelContextBuilder {
        GradleModelContextBuilder {
            connector,
            settings: SettingsStore::default(),
            extensions: ExtensionRegistry::new(),
            issues: Arc::new(LoggingIssueReporter),
            notifier: None,
            ui: None,
            persistent: PersistentChoice::FromSettings,
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn memory_cache(&self) -> &Arc<GradleModelCache> {
        &self.services.memory
    }

    pub fn persistent_cache(&self) -> Option<&PersistentModelCache> {
        self.services.persistent.as_ref()
    }

    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.services.extensions
    }

    pub fn open_projects(&self) -> &Arc<OpenProjectRegistry> {
        &self.services.open_projects
    }

    /// A new loader for `project_dir`. Each loader has its own worker.
    pub fn create_loader(&self, project_dir: &Path) -> GradleModelLoader {
        GradleModelLoader::new(project_dir, self.services.clone())
    }

    /// Opens `project_dir` and starts loading its model.
    ///
    /// Returns the already open project when there is one.
    pub fn open_project(&self, project_dir: &Path) -> Arc<GradleProject> {
        if let Some(project) = self.services.open_projects.find(project_dir) {
            return project;
        }

        let project = GradleProject::with_loader(
            project_dir,
            Arc::clone(&self.ui),
            self.create_loader(project_dir),
        );
        self.services.open_projects.register(&project);
        tracing::debug!(
            target: "nbgradle.loader",
            project_dir = %project_dir.display(),
            "opened project"
        );
        project.reload(true);
        project
    }

    pub fn close_project(&self, project_dir: &Path) {
        if let Some(project) = self.services.open_projects.find(project_dir) {
            if let Some(loader) = project.loader() {
                loader.shutdown();
            }
        }
        self.services.open_projects.unregister(project_dir);
    }

    /// Blocks until queued persistent cache writes are on disk.
    pub fn flush(&self) {
        if let Some(persistent) = &self.services.persistent {
            persistent.flush();
        }
    }
}

impl fmt::Debug for GradleModelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradleModelContext")
            .field("settings", &self.settings)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}
