use crate::suite::support::{child_project, codecs, roots, single_project, LiveHandle, SourceRoots};
use nbgradle_cache::{
    CacheDirLocator, ChainedModelStore, MultiFileModelStore, PersistentModelCache,
};
use nbgradle_model::{ExtensionModels, PersistentModelKey};
use std::path::Path;
use std::sync::Arc;

fn cache_at(cache_dir: &Path) -> PersistentModelCache {
    let dir = cache_dir.to_path_buf();
    let locator = CacheDirLocator::new(move |_| dir.clone());
    PersistentModelCache::new(Box::new(ChainedModelStore::standard(locator)), codecs())
}

#[test]
fn saved_models_survive_a_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("build");
    std::fs::create_dir_all(root.join("app")).unwrap();
    let cache_dir = tmp.path().join("cache");

    let model = child_project(&root);
    model.set_models_for_extension("java", roots(&["src/main/java"]));
    model.set_models_for_extension("empty", ExtensionModels::empty());
    let key = PersistentModelKey::for_model(&model);

    let cache = cache_at(&cache_dir);
    cache.save_models([&model]);
    cache.flush();
    drop(cache);

    let restarted = cache_at(&cache_dir);
    let restored = restarted.try_get_model(&key).unwrap();
    assert_eq!(restored.project_dir(), model.project_dir());
    assert_eq!(restored.root_dir(), model.root_dir());
    assert_eq!(restored.loaded_extensions(), model.loaded_extensions());
    assert_eq!(
        restored.extension_models("java").get::<SourceRoots>(),
        Some(&SourceRoots(vec!["src/main/java".to_string()]))
    );

    let file = cache_dir.join(MultiFileModelStore::file_name(&key));
    assert!(file.is_file(), "{}", file.display());
}

#[test]
fn unserializable_extension_prevents_persisting_the_project() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("p");
    std::fs::create_dir_all(&project).unwrap();

    let model = single_project(&project);
    model.set_models_for_extension("java", roots(&["src"]));
    model.set_models_for_extension("live", ExtensionModels::new(vec![Arc::new(LiveHandle)]));

    let cache = cache_at(&tmp.path().join("cache"));
    cache.save_models([&model]);
    cache.flush();
    assert!(cache
        .try_get_model(&PersistentModelKey::for_model(&model))
        .is_none());
}

#[test]
fn later_save_for_same_project_wins() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("p");
    std::fs::create_dir_all(&project).unwrap();
    let cache = cache_at(&tmp.path().join("cache"));

    for value in ["first", "second", "third"] {
        let model = single_project(&project);
        model.set_models_for_extension("java", roots(&[value]));
        cache.save_models([&model]);
    }
    cache.flush();

    let key = PersistentModelKey::new(&project, &project);
    let restored = cache.try_get_model(&key).unwrap();
    assert_eq!(
        restored.extension_models("java").get::<SourceRoots>(),
        Some(&SourceRoots(vec!["third".to_string()]))
    );
}

#[test]
fn maintenance_lists_invalidates_and_clears() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("build");
    std::fs::create_dir_all(root.join("app")).unwrap();
    let cache = cache_at(&tmp.path().join("cache"));

    let app = child_project(&root);
    let top = single_project(&root);
    cache.save_models([&app, &top]);

    let entries = cache.list_entries(&root).unwrap();
    let mut paths: Vec<_> = entries.iter().map(|entry| entry.project_path.as_str()).collect();
    paths.sort();
    assert_eq!(paths, vec![":", ":app"]);

    let app_key = PersistentModelKey::for_model(&app);
    assert!(cache.invalidate(&app_key).unwrap());
    assert!(cache.try_get_model(&app_key).is_none());
    assert_eq!(cache.list_entries(&root).unwrap().len(), 1);

    assert_eq!(cache.clear_root(&root).unwrap(), 1);
    assert!(cache.list_entries(&root).unwrap().is_empty());
}

#[test]
fn missing_entry_is_a_quiet_miss() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = cache_at(&tmp.path().join("cache"));
    let key = PersistentModelKey::new(tmp.path(), &tmp.path().join("nothing"));
    assert!(cache.try_get_model(&key).is_none());
}

#[test]
fn invalidate_wins_over_a_write_in_progress() {
    let tmp = tempfile::tempdir().unwrap();
    let project = tmp.path().join("p");
    std::fs::create_dir_all(&project).unwrap();
    let cache_dir = tmp.path().join("cache");
    let cache = cache_at(&cache_dir);
    let key = PersistentModelKey::new(&project, &project);

    for round in 0..50 {
        let model = single_project(&project);
        let source_root = format!("src{round}");
        model.set_models_for_extension("java", roots(&[source_root.as_str()]));
        cache.save_models([&model]);
        cache.invalidate(&key).unwrap();
        cache.flush();

        assert!(cache_at(&cache_dir).try_get_model(&key).is_none(), "round {round}");
    }
}
