use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::build_files::{find_build_script, find_settings_file, is_build_src_dir};
use crate::extension::{ExtensionModels, ModelLookup};
use crate::key::CacheKey;
use crate::tree::MultiProjectDef;

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(1);

fn next_state_id() -> u64 {
    NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed)
}

/// The result of loading one Gradle project.
///
/// The project layout and build files are fixed once constructed. Extension data is held in
/// [`ModelLookup`] handles which are shared with merged copies of this model, so a newer load
/// becomes visible through handles obtained from an older model.
#[derive(Debug)]
pub struct GradleModel {
    project_def: MultiProjectDef,
    build_script: Option<PathBuf>,
    settings_file: Option<PathBuf>,
    extensions: RwLock<BTreeMap<String, ModelLookup>>,
    dirty: AtomicBool,
    state_id: AtomicU64,
}

impl GradleModel {
    pub fn new(
        project_def: MultiProjectDef,
        build_script: Option<PathBuf>,
        settings_file: Option<PathBuf>,
    ) -> Self {
        Self::with_lookups(project_def, build_script, settings_file, BTreeMap::new())
    }

    fn with_lookups(
        project_def: MultiProjectDef,
        build_script: Option<PathBuf>,
        settings_file: Option<PathBuf>,
        extensions: BTreeMap<String, ModelLookup>,
    ) -> Self {
        Self {
            project_def,
            build_script,
            settings_file,
            extensions: RwLock::new(extensions),
            dirty: AtomicBool::new(false),
            state_id: AtomicU64::new(next_state_id()),
        }
    }

    /// Placeholder model for a directory that has not been loaded yet.
    pub fn create_empty(project_dir: &Path) -> Self {
        Self::new(
            MultiProjectDef::create_empty(project_dir),
            find_build_script(project_dir),
            find_settings_file(project_dir),
        )
    }

    pub fn project_def(&self) -> &MultiProjectDef {
        &self.project_def
    }

    pub fn project_dir(&self) -> &Path {
        self.project_def.main_project().project_dir()
    }

    pub fn root_dir(&self) -> &Path {
        self.project_def.root_project().project_dir()
    }

    pub fn build_script(&self) -> Option<&Path> {
        self.build_script.as_deref()
    }

    pub fn settings_file(&self) -> Option<&Path> {
        self.settings_file.as_deref()
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.project_dir(), self.settings_file.clone())
    }

    pub fn is_root_project(&self) -> bool {
        self.project_def.is_root_project()
    }

    pub fn is_build_src(&self) -> bool {
        is_build_src_dir(self.project_dir())
    }

    pub fn display_name(&self) -> String {
        let main = self.project_def.main_project();
        if self.is_build_src() {
            let parent = self
                .project_dir()
                .parent()
                .and_then(|parent| parent.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            return format!("buildSrc [{parent}]");
        }

        if main.info().depth() <= 1 {
            main.name().to_string()
        } else {
            main.path().trim_start_matches(':').to_string()
        }
    }

    /// The handle for `extension`; created unloaded when the extension has no data yet.
    pub fn extension_lookup(&self, extension: &str) -> ModelLookup {
        if let Some(lookup) = self.extensions.read().get(extension) {
            return lookup.clone();
        }
        self.extensions
            .write()
            .entry(extension.to_string())
            .or_default()
            .clone()
    }

    pub fn extension_models(&self, extension: &str) -> Arc<ExtensionModels> {
        self.extension_lookup(extension).current()
    }

    /// Stores `models` for `extension`; existing handles observe the new snapshot.
    pub fn set_models_for_extension(&self, extension: &str, models: ExtensionModels) {
        self.extension_lookup(extension).replace(models);
        self.state_id.store(next_state_id(), Ordering::Release);
    }

    /// Names of extensions with loaded data, sorted.
    pub fn loaded_extensions(&self) -> Vec<String> {
        self.extensions
            .read()
            .iter()
            .filter(|(_, lookup)| lookup.is_loaded())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn has_all_extensions<'a>(&self, extensions: impl IntoIterator<Item = &'a str>) -> bool {
        let current = self.extensions.read();
        extensions
            .into_iter()
            .all(|name| current.get(name).is_some_and(ModelLookup::is_loaded))
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Token that changes whenever extension data of this model changes.
    pub fn state_id(&self) -> u64 {
        self.state_id.load(Ordering::Acquire)
    }

    /// A non-dirty model sharing this model's layout and extension handles.
    pub fn create_non_dirty_copy(&self) -> Self {
        Self::with_lookups(
            self.project_def.clone(),
            self.build_script.clone(),
            self.settings_file.clone(),
            self.extensions.read().clone(),
        )
    }

    /// Combines this (older) model with `newer`.
    ///
    /// Layout and build files come from `newer`. Extensions present in both keep this model's
    /// handles with `newer`'s contents; extensions `newer` did not load are kept as they are.
    ///
    /// Copying data into this model's handles changes this model's [`state_id`](Self::state_id).
    pub fn merged_with(&self, newer: &GradleModel) -> Self {
        let mut extensions = self.extensions.read().clone();
        let mut changed = false;
        for (name, lookup) in newer.extensions.read().iter() {
            if !lookup.is_loaded() {
                extensions.entry(name.clone()).or_insert_with(|| lookup.clone());
                continue;
            }
            match extensions.get(name) {
                Some(existing) => changed |= existing.replace_from(lookup),
                None => {
                    extensions.insert(name.clone(), lookup.clone());
                }
            }
        }
        if changed {
            self.state_id.store(next_state_id(), Ordering::Release);
        }

        Self::with_lookups(
            newer.project_def.clone(),
            newer.build_script.clone(),
            newer.settings_file.clone(),
            extensions,
        )
    }
}
