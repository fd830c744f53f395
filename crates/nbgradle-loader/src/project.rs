use nbgradle_cache::ProjectModelUpdatedListener;
use nbgradle_model::GradleModel;
use nbgradle_scheduler::TaskExecutor;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::loader::GradleModelLoader;

/// Told when the active model of an open project changes. Always called on the UI executor.
pub trait ProjectModelChangeListener: Send + Sync {
    fn on_model_changed(&self, project: &Arc<GradleProject>);
}

/// A project open in the IDE and its currently active model.
pub struct GradleProject {
    project_dir: PathBuf,
    model: RwLock<Arc<GradleModel>>,
    listeners: RwLock<Vec<Arc<dyn ProjectModelChangeListener>>>,
    ui: Arc<dyn TaskExecutor>,
    loader: Option<GradleModelLoader>,
}

impl GradleProject {
    /// A project showing a placeholder model until its first load completes.
    pub fn new(project_dir: &Path, ui: Arc<dyn TaskExecutor>) -> Arc<Self> {
        Self::create(project_dir, ui, None)
    }

    pub(crate) fn with_loader(
        project_dir: &Path,
        ui: Arc<dyn TaskExecutor>,
        loader: GradleModelLoader,
    ) -> Arc<Self> {
        Self::create(project_dir, ui, Some(loader))
    }

    fn create(
        project_dir: &Path,
        ui: Arc<dyn TaskExecutor>,
        loader: Option<GradleModelLoader>,
    ) -> Arc<Self> {
        Arc::new(Self {
            project_dir: project_dir.to_path_buf(),
            model: RwLock::new(Arc::new(GradleModel::create_empty(project_dir))),
            listeners: RwLock::new(Vec::new()),
            ui,
            loader,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn current_model(&self) -> Arc<GradleModel> {
        Arc::clone(&self.model.read())
    }

    pub fn add_change_listener(&self, listener: Arc<dyn ProjectModelChangeListener>) {
        self.listeners.write().push(listener);
    }

    /// Makes `model` the active model. Returns `false` if it already was.
    pub fn replace_model(self: &Arc<Self>, model: Arc<GradleModel>) -> bool {
        {
            let mut current = self.model.write();
            if Arc::ptr_eq(&current, &model) {
                return false;
            }
            *current = model;
        }

        let listeners = self.listeners.read().clone();
        if !listeners.is_empty() {
            let project = Arc::clone(self);
            self.ui.execute(Box::new(move || {
                for listener in listeners {
                    listener.on_model_changed(&project);
                }
            }));
        }
        true
    }

    /// Loads the model through this project's loader; the result becomes the active model.
    ///
    /// A failed load keeps the current model. Does nothing for projects without a loader.
    pub fn reload(self: &Arc<Self>, may_fetch_from_cache: bool) {
        let Some(loader) = &self.loader else {
            return;
        };
        let project = Arc::downgrade(self);
        loader.fetch_model(
            may_fetch_from_cache,
            move |result| {
                if let (Some(project), Ok(model)) = (project.upgrade(), result) {
                    project.replace_model(model);
                }
            },
            || {},
        );
    }

    pub fn loader(&self) -> Option<&GradleModelLoader> {
        self.loader.as_ref()
    }
}

impl fmt::Debug for GradleProject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradleProject")
            .field("project_dir", &self.project_dir)
            .field("state_id", &self.model.read().state_id())
            .finish()
    }
}

/// Projects currently open, by directory.
///
/// Holds projects weakly; a closed and dropped project disappears on its own.
#[derive(Default)]
pub struct OpenProjectRegistry {
    projects: Mutex<HashMap<PathBuf, Weak<GradleProject>>>,
}

impl OpenProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, project: &Arc<GradleProject>) {
        self.projects
            .lock()
            .insert(project.project_dir().to_path_buf(), Arc::downgrade(project));
    }

    pub fn unregister(&self, project_dir: &Path) {
        self.projects.lock().remove(project_dir);
    }

    pub fn find(&self, project_dir: &Path) -> Option<Arc<GradleProject>> {
        let mut projects = self.projects.lock();
        let project = projects.get(project_dir)?.upgrade();
        if project.is_none() {
            projects.remove(project_dir);
        }
        project
    }

    pub fn open_projects(&self) -> Vec<Arc<GradleProject>> {
        let mut projects = self.projects.lock();
        projects.retain(|_, project| project.strong_count() > 0);
        projects.values().filter_map(Weak::upgrade).collect()
    }

    /// Makes `model` active in the open project it belongs to, if any.
    pub fn model_loaded(&self, model: &Arc<GradleModel>) -> bool {
        match self.find(model.project_dir()) {
            Some(project) => project.replace_model(Arc::clone(model)),
            None => false,
        }
    }
}

impl ProjectModelUpdatedListener for OpenProjectRegistry {
    fn on_update_project(&self, model: &Arc<GradleModel>) {
        self.model_loaded(model);
    }
}

impl fmt::Debug for OpenProjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let projects = self.projects.lock();
        let mut dirs: Vec<_> = projects.keys().collect();
        dirs.sort();
        f.debug_struct("OpenProjectRegistry")
            .field("projects", &dirs)
            .finish()
    }
}
