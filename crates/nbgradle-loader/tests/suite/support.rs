use nbgradle_config::{NbGradleConfig, SettingsStore};
use nbgradle_loader::{
    BuildEnvironment, BulkModelRequest, BulkModelResponse, ConnectionTarget, GradleConnector,
    GradleExtension, GradleModelContext, GradleModelLoader, GradleVersion, IdeaModule,
    IdeaProjectModel, ModelLoadIssue, ModelLoadIssueReporter, OperationConfig,
    ProjectConnection, RawModels, RawProject, ToolingError,
};
use nbgradle_model::{
    json_payload, ExtensionModel, ExtensionModels, GradleModel, ModelCodecs, ProjectInfo,
};
use nbgradle_scheduler::CancellationToken;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const SOURCE_ROOTS: &str = "test.source-roots";
pub const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRoots(pub Vec<String>);

impl ExtensionModel for SourceRoots {
    fn model_type(&self) -> &str {
        SOURCE_ROOTS
    }

    fn to_payload(&self) -> Option<Vec<u8>> {
        json_payload(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Reads the source roots model for every project.
pub struct JavaExtension;

impl GradleExtension for JavaExtension {
    fn name(&self) -> &str {
        "java"
    }

    fn model_types(&self) -> Vec<String> {
        vec![SOURCE_ROOTS.to_string()]
    }

    fn build_models(&self, _project: &ProjectInfo, fetched: &RawModels) -> ExtensionModels {
        let roots = fetched
            .get(SOURCE_ROOTS)
            .and_then(|value| serde_json::from_value::<Vec<String>>(value.clone()).ok());
        match roots {
            Some(roots) => ExtensionModels::new(vec![Arc::new(SourceRoots(roots))]),
            None => ExtensionModels::empty(),
        }
    }

    fn register_codecs(&self, codecs: &mut ModelCodecs) {
        codecs.register_json::<SourceRoots>(SOURCE_ROOTS);
    }
}

/// Scripted stand-in for the Gradle tooling API.
#[derive(Debug)]
pub struct FakeGradle {
    state: Arc<FakeState>,
}

impl std::ops::Deref for FakeGradle {
    type Target = FakeState;

    fn deref(&self) -> &FakeState {
        &self.state
    }
}

#[derive(Debug)]
pub struct FakeState {
    pub version: Mutex<GradleVersion>,
    /// Roots of the builds the fake knows. Other directories are single-project builds.
    pub builds: Mutex<Vec<RawProject>>,
    pub source_roots: Mutex<Vec<String>>,
    pub unknown_models: Mutex<BTreeSet<String>>,
    pub build_script_error: Mutex<Option<String>>,
    pub delay: Mutex<Duration>,
    /// Which requests were made, in order.
    pub requests: Mutex<Vec<String>>,
    pub connections: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl FakeGradle {
    pub fn new(version: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(FakeState {
                version: Mutex::new(GradleVersion::parse(version).unwrap()),
                builds: Mutex::new(Vec::new()),
                source_roots: Mutex::new(vec!["src/main/java".to_string()]),
                unknown_models: Mutex::new(BTreeSet::new()),
                build_script_error: Mutex::new(None),
                delay: Mutex::new(Duration::ZERO),
                requests: Mutex::new(Vec::new()),
                connections: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }),
        })
    }
}

impl FakeState {
    pub fn add_build(&self, root: RawProject) {
        self.builds.lock().unwrap().push(root);
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn build_containing(&self, dir: &Path) -> RawProject {
        let builds = self.builds.lock().unwrap();
        builds
            .iter()
            .find(|root| contains_dir(root, dir))
            .cloned()
            .unwrap_or_else(|| raw_project(dir, ":", Vec::new()))
    }

    fn project_models(&self, requested: &[String]) -> RawModels {
        let unknown = self.unknown_models.lock().unwrap();
        let mut models = RawModels::new();
        if requested.iter().any(|ty| ty == SOURCE_ROOTS) && !unknown.contains(SOURCE_ROOTS) {
            models.insert(
                SOURCE_ROOTS.to_string(),
                serde_json::to_value(&*self.source_roots.lock().unwrap()).unwrap_or_default(),
            );
        }
        models
    }

    fn simulate_work(&self, request: &str) -> Result<(), ToolingError> {
        self.requests.lock().unwrap().push(request.to_string());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        match self.build_script_error.lock().unwrap().clone() {
            Some(message) => Err(ToolingError::BuildScript { message }),
            None => Ok(()),
        }
    }
}

fn contains_dir(project: &RawProject, dir: &Path) -> bool {
    project.project_dir == dir || project.children.iter().any(|child| contains_dir(child, dir))
}

fn flatten(project: &RawProject, out: &mut Vec<IdeaModule>) {
    out.push(IdeaModule {
        name: project.name.clone(),
        gradle_path: project.path.clone(),
        project_dir: project.project_dir.clone(),
        build_script: project.build_script.clone(),
        tasks: project.tasks.clone(),
    });
    for child in &project.children {
        flatten(child, out);
    }
}

fn collect_paths(project: &RawProject, out: &mut Vec<String>) {
    out.push(project.path.clone());
    for child in &project.children {
        collect_paths(child, out);
    }
}

impl GradleConnector for FakeGradle {
    fn connect(
        &self,
        target: &ConnectionTarget,
        _cancellation: &CancellationToken,
    ) -> Result<Box<dyn ProjectConnection>, ToolingError> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            gradle: Arc::clone(&self.state),
            project_dir: target.project_dir.clone(),
        }))
    }
}

struct FakeConnection {
    gradle: Arc<FakeState>,
    project_dir: PathBuf,
}

impl FakeConnection {
    fn gradle(&self) -> &FakeState {
        &self.gradle
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.gradle().active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ProjectConnection for FakeConnection {
    fn build_environment(
        &mut self,
        _config: &OperationConfig,
        _cancellation: &CancellationToken,
    ) -> Result<BuildEnvironment, ToolingError> {
        Ok(BuildEnvironment {
            gradle_version: self.gradle().version.lock().unwrap().clone(),
            java_home: None,
        })
    }

    fn fetch_bulk(
        &mut self,
        request: &BulkModelRequest,
        _config: &OperationConfig,
        _cancellation: &CancellationToken,
    ) -> Result<BulkModelResponse, ToolingError> {
        let gradle = self.gradle();
        gradle.simulate_work("bulk")?;
        let root = gradle.build_containing(&self.project_dir);

        let mut paths = Vec::new();
        collect_paths(&root, &mut paths);
        let models = gradle.project_models(&request.project_model_types);
        let unknown = gradle.unknown_models.lock().unwrap();
        Ok(BulkModelResponse {
            project_models: paths
                .into_iter()
                .map(|path| (path, models.clone()))
                .collect(),
            unknown_model_types: request
                .project_model_types
                .iter()
                .filter(|ty| unknown.contains(*ty))
                .cloned()
                .collect(),
            root,
        })
    }

    fn fetch_idea_project(
        &mut self,
        _config: &OperationConfig,
        _cancellation: &CancellationToken,
    ) -> Result<IdeaProjectModel, ToolingError> {
        let gradle = self.gradle();
        gradle.simulate_work("idea")?;
        let root = gradle.build_containing(&self.project_dir);
        let mut modules = Vec::new();
        flatten(&root, &mut modules);
        Ok(IdeaProjectModel {
            name: root.name.clone(),
            root_dir: root.project_dir.clone(),
            modules,
        })
    }

    fn fetch_model(
        &mut self,
        model_type: &str,
        _config: &OperationConfig,
        _cancellation: &CancellationToken,
    ) -> Result<serde_json::Value, ToolingError> {
        let gradle = self.gradle();
        gradle.requests.lock().unwrap().push(format!("model {model_type}"));
        gradle
            .project_models(&[model_type.to_string()])
            .remove(model_type)
            .ok_or_else(|| ToolingError::UnknownModel {
                model_type: model_type.to_string(),
            })
    }
}

pub fn raw_project(dir: &Path, path: &str, children: Vec<RawProject>) -> RawProject {
    RawProject {
        name: dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        path: path.to_string(),
        project_dir: dir.to_path_buf(),
        build_script: None,
        tasks: Vec::new(),
        children,
    }
}

#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub issues: Mutex<Vec<ModelLoadIssue>>,
}

impl RecordingReporter {
    pub fn issues(&self) -> Vec<ModelLoadIssue> {
        self.issues.lock().unwrap().clone()
    }
}

impl ModelLoadIssueReporter for RecordingReporter {
    fn report(&self, issue: ModelLoadIssue) {
        self.issues.lock().unwrap().push(issue);
    }
}

pub fn settings(root_first: bool) -> SettingsStore {
    let mut config = NbGradleConfig::default();
    config.gradle.load_root_project_first = root_first;
    SettingsStore::new(config)
}

/// A context without disk cache, reporting into `issues`.
pub fn context(gradle: &Arc<FakeGradle>, issues: &Arc<RecordingReporter>) -> GradleModelContext {
    GradleModelContext::builder(gradle.clone())
        .settings(settings(true))
        .extension(Arc::new(JavaExtension))
        .issue_reporter(issues.clone())
        .without_persistent_cache()
        .build()
}

/// Runs one request and waits for its answer.
pub fn fetch(
    loader: &GradleModelLoader,
    may_fetch_from_cache: bool,
) -> nbgradle_loader::Result<Arc<GradleModel>> {
    let (tx, rx) = mpsc::channel();
    loader.fetch_model(
        may_fetch_from_cache,
        move |result| {
            let _ = tx.send(result);
        },
        || {},
    );
    rx.recv_timeout(TIMEOUT).expect("load did not complete")
}

pub fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("timed out waiting for condition");
}

pub fn source_roots(model: &GradleModel) -> Option<Vec<String>> {
    model
        .extension_models("java")
        .get::<SourceRoots>()
        .map(|roots| roots.0.clone())
}
