use std::path::{Path, PathBuf};

pub const SETTINGS_FILE_NAMES: [&str; 2] = ["settings.gradle", "settings.gradle.kts"];

pub const BUILD_SRC_NAME: &str = "buildSrc";

pub fn is_build_src_dir(dir: &Path) -> bool {
    dir.file_name()
        .is_some_and(|name| name.eq_ignore_ascii_case(BUILD_SRC_NAME))
}

fn settings_in(dir: &Path) -> Option<PathBuf> {
    SETTINGS_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Finds the settings file governing `project_dir` by searching it and its ancestors.
///
/// `buildSrc` is a separate build, so only its own directory is searched.
pub fn find_settings_file(project_dir: &Path) -> Option<PathBuf> {
    if is_build_src_dir(project_dir) {
        return settings_in(project_dir);
    }
    project_dir.ancestors().find_map(settings_in)
}

/// Resolves the build script of the project in `project_dir`.
pub fn find_build_script(project_dir: &Path) -> Option<PathBuf> {
    for name in ["build.gradle", "build.gradle.kts"] {
        let candidate = project_dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let dir_name = project_dir.file_name()?.to_string_lossy();
    [format!("{dir_name}.gradle"), format!("{dir_name}.gradle.kts")]
        .into_iter()
        .map(|name| project_dir.join(name))
        .find(|candidate| candidate.is_file())
}
