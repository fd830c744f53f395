use nbgradle_model::{
    json_payload, ExtensionModel, ExtensionModels, GradleModel, ModelCodecs, MultiProjectDef,
    ProjectInfo, ProjectTree,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRoots(pub Vec<String>);

impl ExtensionModel for SourceRoots {
    fn model_type(&self) -> &str {
        "test.source-roots"
    }

    fn to_payload(&self) -> Option<Vec<u8>> {
        json_payload(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Cannot be persisted.
#[derive(Debug)]
pub struct LiveHandle;

impl ExtensionModel for LiveHandle {
    fn model_type(&self) -> &str {
        "test.live-handle"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn codecs() -> ModelCodecs {
    let mut codecs = ModelCodecs::new();
    codecs.register_json::<SourceRoots>("test.source-roots");
    codecs
}

pub fn roots(values: &[&str]) -> ExtensionModels {
    ExtensionModels::new(vec![Arc::new(SourceRoots(
        values.iter().map(|value| value.to_string()).collect(),
    ))])
}

pub fn single_project(dir: &Path) -> GradleModel {
    GradleModel::new(MultiProjectDef::create_empty(dir), None, None)
}

/// A root at `root` with one child `app` in `root/app`; the model is for `app`.
pub fn child_project(root: &Path) -> GradleModel {
    let app = Arc::new(ProjectTree::leaf(ProjectInfo::new(
        "app",
        ":app",
        root.join("app"),
    )));
    let tree = Arc::new(ProjectTree::new(
        ProjectInfo::new("root", ":", root.to_path_buf()),
        Vec::new(),
        vec![app],
    ));
    let def = MultiProjectDef::for_project_dir(tree, &root.join("app")).unwrap();
    GradleModel::new(def, None, Some(root.join("settings.gradle")))
}
