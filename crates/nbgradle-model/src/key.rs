use std::path::{Component, Path, PathBuf};

use crate::model::GradleModel;

/// Key of the in-memory model cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub project_dir: PathBuf,
    pub settings_file: Option<PathBuf>,
}

impl CacheKey {
    pub fn new(project_dir: impl Into<PathBuf>, settings_file: Option<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            settings_file,
        }
    }
}

/// Key of the persistent model cache: the build root plus the project inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PersistentModelKey {
    root_dir: PathBuf,
    project_dir: PathBuf,
}

impl PersistentModelKey {
    pub fn new(root_dir: &Path, project_dir: &Path) -> Self {
        Self {
            root_dir: normalize(root_dir),
            project_dir: normalize(project_dir),
        }
    }

    pub fn for_model(model: &GradleModel) -> Self {
        Self::new(model.root_dir(), model.project_dir())
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Project directory relative to the root, `/` separated; empty for the root itself.
    ///
    /// A project outside the root yields its full normalized path.
    pub fn relative_project_path(&self) -> String {
        let relative = self
            .project_dir
            .strip_prefix(&self.root_dir)
            .unwrap_or(&self.project_dir);
        relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                Component::Prefix(prefix) => {
                    Some(prefix.as_os_str().to_string_lossy().into_owned())
                }
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn normalize(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| lexical_normalize(path))
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
