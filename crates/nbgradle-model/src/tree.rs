use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// A task as reported by the build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,
    /// Fully qualified task path, e.g. `:core:compileJava`.
    pub qualified_name: String,
    pub description: Option<String>,
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualified_name: qualified_name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Generic properties of a single Gradle project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    /// Colon separated Gradle path. The root project is `:`.
    pub path: String,
    pub project_dir: PathBuf,
    pub build_script: Option<PathBuf>,
}

impl ProjectInfo {
    pub fn new(name: impl Into<String>, path: impl Into<String>, project_dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            project_dir,
            build_script: None,
        }
    }

    /// `true` for `:` (and the degenerate empty path).
    pub fn is_root_path(&self) -> bool {
        self.path.chars().all(|c| c == ':')
    }

    /// Number of path segments below the root (`:` is 0, `:a:b` is 2).
    pub fn depth(&self) -> usize {
        self.path.split(':').filter(|segment| !segment.is_empty()).count()
    }
}

/// One node of a multi-project build.
///
/// Children are fixed at construction; the by-name child index is built lazily on first
/// lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTree {
    info: ProjectInfo,
    tasks: Vec<TaskDescriptor>,
    children: Vec<Arc<ProjectTree>>,
    #[serde(skip)]
    child_index: OnceLock<HashMap<String, usize>>,
}

impl ProjectTree {
    pub fn new(
        info: ProjectInfo,
        tasks: Vec<TaskDescriptor>,
        children: Vec<Arc<ProjectTree>>,
    ) -> Self {
        Self {
            info,
            tasks,
            children,
            child_index: OnceLock::new(),
        }
    }

    pub fn leaf(info: ProjectInfo) -> Self {
        Self::new(info, Vec::new(), Vec::new())
    }

    /// A single-project tree for `project_dir`, named after the directory.
    pub fn create_empty(project_dir: &Path) -> Self {
        let name = project_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| project_dir.display().to_string());
        let mut info = ProjectInfo::new(name, ":", project_dir.to_path_buf());
        info.build_script = crate::find_build_script(project_dir);
        Self::leaf(info)
    }

    pub fn info(&self) -> &ProjectInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn path(&self) -> &str {
        &self.info.path
    }

    pub fn project_dir(&self) -> &Path {
        &self.info.project_dir
    }

    pub fn tasks(&self) -> &[TaskDescriptor] {
        &self.tasks
    }

    pub fn children(&self) -> &[Arc<ProjectTree>] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&Arc<ProjectTree>> {
        let index = self.child_index.get_or_init(|| {
            self.children
                .iter()
                .enumerate()
                .map(|(idx, child)| (child.info.name.clone(), idx))
                .collect()
        });
        index.get(name).map(|&idx| &self.children[idx])
    }

    /// Resolves a Gradle path relative to this node's own path.
    pub fn find_by_path(self: &Arc<Self>, path: &str) -> Option<Arc<ProjectTree>> {
        let own = self.info.path.trim_end_matches(':');
        let rest = if own.is_empty() {
            path
        } else {
            path.strip_prefix(own)?
        };
        if !rest.is_empty() && !rest.starts_with(':') {
            return None;
        }

        let mut node = Arc::clone(self);
        for segment in rest.split(':').filter(|segment| !segment.is_empty()) {
            let next = Arc::clone(node.child(segment)?);
            node = next;
        }
        Some(node)
    }

    pub fn find_by_dir(self: &Arc<Self>, project_dir: &Path) -> Option<Arc<ProjectTree>> {
        if self.info.project_dir == project_dir {
            return Some(Arc::clone(self));
        }
        self.children
            .iter()
            .find_map(|child| child.find_by_dir(project_dir))
    }

    /// Every node of the subtree rooted here, parents before children.
    pub fn all_projects(self: &Arc<Self>) -> Vec<Arc<ProjectTree>> {
        let mut out = Vec::new();
        let mut pending = vec![Arc::clone(self)];
        while let Some(node) = pending.pop() {
            pending.extend(node.children.iter().rev().cloned());
            out.push(node);
        }
        out
    }
}

impl PartialEq for ProjectTree {
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info && self.tasks == other.tasks && self.children == other.children
    }
}

impl Eq for ProjectTree {}

/// The build's project tree plus the node the IDE project corresponds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiProjectDef {
    root: Arc<ProjectTree>,
    main: Arc<ProjectTree>,
}

impl MultiProjectDef {
    /// Pairs `main` with the tree rooted at `root`.
    ///
    /// When `main` cannot be found in `root` by its path, `main` becomes its own root.
    pub fn new(root: Arc<ProjectTree>, main: Arc<ProjectTree>) -> Self {
        match root.find_by_path(main.path()) {
            Some(found) if found.project_dir() == main.project_dir() => Self { root, main: found },
            _ => {
                tracing::debug!(
                    target: "nbgradle.model",
                    root = %root.project_dir().display(),
                    main = %main.project_dir().display(),
                    path = main.path(),
                    "main project is not part of the root tree; treating it as a single project"
                );
                Self {
                    root: Arc::clone(&main),
                    main,
                }
            }
        }
    }

    /// Locates the project with `project_dir` in `root`.
    pub fn for_project_dir(root: Arc<ProjectTree>, project_dir: &Path) -> Option<Self> {
        let main = root.find_by_dir(project_dir)?;
        Some(Self { root, main })
    }

    pub fn create_empty(project_dir: &Path) -> Self {
        let tree = Arc::new(ProjectTree::create_empty(project_dir));
        Self {
            root: Arc::clone(&tree),
            main: tree,
        }
    }

    pub fn root_project(&self) -> &Arc<ProjectTree> {
        &self.root
    }

    pub fn main_project(&self) -> &Arc<ProjectTree> {
        &self.main
    }

    pub fn is_root_project(&self) -> bool {
        self.main.info().is_root_path()
    }
}
