use crate::suite::support::{roots, single_project, SourceRoots};
use nbgradle_cache::{GradleModelCache, ProjectModelUpdatedListener};
use nbgradle_config::LiveValue;
use nbgradle_model::GradleModel;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Default)]
struct Recorder {
    updates: Mutex<Vec<PathBuf>>,
}

impl ProjectModelUpdatedListener for Recorder {
    fn on_update_project(&self, model: &Arc<GradleModel>) {
        self.updates.lock().push(model.project_dir().to_path_buf());
    }
}

fn project(dir: &str) -> Arc<GradleModel> {
    Arc::new(single_project(Path::new(dir)))
}

#[test]
fn retains_exactly_capacity_entries_in_insertion_order() {
    let cache = GradleModelCache::new(3);
    let dirs: Vec<String> = (0..10).map(|idx| format!("/none/p{idx}")).collect();
    for dir in &dirs {
        cache.update_entry(project(dir));
    }

    assert_eq!(cache.len(), 3);
    for (idx, dir) in dirs.iter().enumerate() {
        let cached = cache.try_get(Path::new(dir), None).is_some();
        assert_eq!(cached, idx >= 7, "{dir}");
    }
}

#[test]
fn replace_entry_stores_the_given_instance() {
    let cache = GradleModelCache::new(10);
    cache.update_entry(project("/none/a"));

    let replacement = project("/none/a");
    cache.replace_entry(Arc::clone(&replacement));

    let cached = cache.try_get(Path::new("/none/a"), None).unwrap();
    assert!(Arc::ptr_eq(&cached, &replacement));
}

#[test]
fn update_entry_merges_with_previous_model() {
    let cache = GradleModelCache::new(10);

    let first = project("/none/a");
    first.set_models_for_extension("java", roots(&["src/main/java"]));
    first.set_models_for_extension("groovy", roots(&["src/main/groovy"]));
    cache.update_entry(first);

    let second = project("/none/a");
    second.set_models_for_extension("java", roots(&["src"]));
    let stored = cache.update_entry(Arc::clone(&second));

    let cached = cache.try_get(Path::new("/none/a"), None).unwrap();
    assert!(Arc::ptr_eq(&cached, &stored));
    assert!(!Arc::ptr_eq(&cached, &second));
    assert_eq!(
        cached.extension_models("java").get::<SourceRoots>(),
        Some(&SourceRoots(vec!["src".to_string()]))
    );
    assert_eq!(
        cached.extension_models("groovy").get::<SourceRoots>(),
        Some(&SourceRoots(vec!["src/main/groovy".to_string()]))
    );
}

#[test]
fn listeners_only_hear_about_replaced_entries() {
    let cache = GradleModelCache::new(10);
    let recorder = Arc::new(Recorder::default());
    cache.add_listener(recorder.clone());

    cache.update_entry(project("/none/a"));
    assert!(recorder.updates.lock().is_empty());

    cache.update_entry(project("/none/a"));
    cache.replace_entry(project("/none/a"));
    cache.replace_entry(project("/none/b"));
    assert_eq!(
        *recorder.updates.lock(),
        vec![PathBuf::from("/none/a"), PathBuf::from("/none/a")]
    );
}

#[test]
fn capacity_follows_live_setting() {
    let cache = Arc::new(GradleModelCache::new(10));
    let size = LiveValue::new(4);
    let _subscription = cache.bind_capacity(&size);
    assert_eq!(cache.max_capacity(), 4);

    for idx in 0..4 {
        cache.update_entry(project(&format!("/none/p{idx}")));
    }
    size.set(2);
    assert_eq!(cache.max_capacity(), 2);
    assert_eq!(cache.len(), 2);
    assert!(cache.try_get(Path::new("/none/p3"), None).is_some());
    assert!(cache.try_get(Path::new("/none/p0"), None).is_none());
}
