use assert_cmd::Command;
use nbgradle_cache::PersistentModelCache;
use nbgradle_config::CacheConfig;
use nbgradle_model::{ExtensionModels, GradleModel, ModelCodecs, MultiProjectDef};
use predicates::prelude::*;
use std::path::Path;

fn nbgradle() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("nbgradle"))
}

fn persist_root_model(root: &Path) {
    let cache = PersistentModelCache::from_config(&CacheConfig::default(), ModelCodecs::new());
    let model = GradleModel::new(MultiProjectDef::create_empty(root), None, None);
    model.set_models_for_extension("java", ExtensionModels::empty());
    cache.save_models(std::iter::once(&model));
    cache.flush();
}

#[test]
fn help_mentions_core_commands() {
    nbgradle().arg("--help").assert().success().stdout(
        predicate::str::contains("cache").and(predicate::str::contains("settings")),
    );
}

#[test]
fn settings_check_accepts_a_valid_file() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("nbgradle.toml");
    std::fs::write(
        &file,
        "[gradle]\nload_root_project_first = false\n\n[cache]\nproject_cache_size = 20\n",
    )
    .unwrap();

    nbgradle()
        .arg("settings")
        .arg("check")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn settings_check_reports_unknown_keys_and_errors() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("nbgradle.toml");
    std::fs::write(&file, "[cache]\nproject_cache_size = 0\nsize = 3\n").unwrap();

    let output = nbgradle()
        .arg("settings")
        .arg("check")
        .arg(&file)
        .arg("--json")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["ok"], serde_json::Value::Bool(false));
    assert_eq!(v["unknown_keys"][0], "cache.size");
    assert!(v["errors"][0]
        .as_str()
        .unwrap()
        .contains("cache.project_cache_size"));
}

#[test]
fn unreadable_settings_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    nbgradle()
        .arg("settings")
        .arg("check")
        .arg(temp.path().join("missing.toml"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to load"));
}

#[test]
fn cache_list_shows_persisted_projects() {
    let temp = tempfile::tempdir().unwrap();
    persist_root_model(temp.path());

    let output = nbgradle()
        .arg("cache")
        .arg("list")
        .arg("--root")
        .arg(temp.path())
        .arg("--json")
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = v.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["project_path"], ":");
    assert_eq!(entries[0]["extensions"][0], "java");
}

#[test]
fn cache_show_describes_the_model() {
    let temp = tempfile::tempdir().unwrap();
    persist_root_model(temp.path());

    nbgradle()
        .arg("cache")
        .arg("--root")
        .arg(temp.path())
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("extension java"));
}

#[test]
fn cache_show_without_entry_fails() {
    let temp = tempfile::tempdir().unwrap();
    nbgradle()
        .arg("cache")
        .arg("--root")
        .arg(temp.path())
        .arg("show")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("no persisted model"));
}

#[test]
fn cache_clean_removes_persisted_models() {
    let temp = tempfile::tempdir().unwrap();
    persist_root_model(temp.path());

    nbgradle()
        .arg("cache")
        .arg("--root")
        .arg(temp.path())
        .arg("clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("removed 1 file"));

    nbgradle()
        .arg("cache")
        .arg("--root")
        .arg(temp.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("no persisted models"));
}
