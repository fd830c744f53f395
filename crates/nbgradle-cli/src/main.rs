use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nbgradle_cache::{PersistedModel, PersistentModelCache, StoredModelInfo};
use nbgradle_config::{init_tracing, ConfigDiagnostics, NbGradleConfig};
use nbgradle_model::{ModelCodecs, PersistentModelKey};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "nbgradle", version, about = "Inspect Gradle model caches and settings")]
struct Cli {
    /// Settings file (defaults to built-in settings)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect or clean persisted project models
    Cache(CacheArgs),
    /// Work with settings files
    Settings(SettingsArgs),
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
    /// Root directory of the Gradle build
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Emit JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// List every persisted project of the build
    List,
    /// Show the persisted model of one project
    Show {
        /// Project directory (defaults to the root)
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Delete persisted models of the build, or of one project
    Clean {
        #[arg(long)]
        project: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SettingsArgs {
    #[command(subcommand)]
    command: SettingsCommand,
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Report unknown keys and invalid values of a settings file
    Check {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => NbGradleConfig::load_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => NbGradleConfig::default(),
    };
    init_tracing(&config.logging);

    match cli.command {
        Command::Cache(args) => run_cache(&config, args),
        Command::Settings(args) => match args.command {
            SettingsCommand::Check { file, json } => check_settings(&file, json),
        },
    }
}

fn run_cache(config: &NbGradleConfig, args: CacheArgs) -> Result<i32> {
    let cache = PersistentModelCache::from_config(&config.cache, ModelCodecs::new());
    let root = &args.root;

    match args.command {
        CacheCommand::List => {
            let entries = cache
                .list_entries(root)
                .with_context(|| format!("failed to list cache of {}", root.display()))?;
            if args.json {
                print_json(&entries)?;
            } else {
                print_entries(&entries);
            }
            Ok(0)
        }
        CacheCommand::Show { project } => {
            let project = project.unwrap_or_else(|| root.clone());
            let key = PersistentModelKey::new(root, &project);
            match cache.load_persisted(&key) {
                Some(model) => {
                    let report = ModelReport::new(&model);
                    if args.json {
                        print_json(&report)?;
                    } else {
                        print_model(&report);
                    }
                    Ok(0)
                }
                None => {
                    if args.json {
                        print_json(&serde_json::Value::Null)?;
                    } else {
                        println!("no persisted model for {}", project.display());
                    }
                    Ok(1)
                }
            }
        }
        CacheCommand::Clean { project } => {
            let removed = match project {
                Some(project) => {
                    let key = PersistentModelKey::new(root, &project);
                    usize::from(cache.invalidate(&key).with_context(|| {
                        format!("failed to remove cached model of {}", project.display())
                    })?)
                }
                None => cache
                    .clear_root(root)
                    .with_context(|| format!("failed to clean cache of {}", root.display()))?,
            };
            tracing::debug!(target: "nbgradle.cli", removed, "cleaned model cache");
            if args.json {
                print_json(&serde_json::json!({ "ok": true, "removed": removed }))?;
            } else {
                println!("cache: removed {removed} file(s) for {}", root.display());
            }
            Ok(0)
        }
    }
}

fn check_settings(file: &Path, json: bool) -> Result<i32> {
    let (_config, diagnostics) = NbGradleConfig::load_from_path_with_diagnostics(file)
        .with_context(|| format!("failed to load {}", file.display()))?;
    let report = SettingsReport::new(&diagnostics);
    if json {
        print_json(&report)?;
    } else {
        for key in &report.unknown_keys {
            println!("warning: unknown key `{key}`");
        }
        for warning in &report.warnings {
            println!("warning: {warning}");
        }
        for error in &report.errors {
            println!("error: {error}");
        }
        if report.ok && report.unknown_keys.is_empty() && report.warnings.is_empty() {
            println!("{}: ok", file.display());
        }
    }
    Ok(if report.ok { 0 } else { 1 })
}

#[derive(Serialize)]
struct SettingsReport {
    ok: bool,
    unknown_keys: Vec<String>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl SettingsReport {
    fn new(diagnostics: &ConfigDiagnostics) -> Self {
        Self {
            ok: diagnostics.is_ok(),
            unknown_keys: diagnostics.unknown_keys.clone(),
            warnings: diagnostics.warnings.iter().map(ToString::to_string).collect(),
            errors: diagnostics.errors.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Serialize)]
struct ExtensionReport {
    name: String,
    model_types: Vec<String>,
}

#[derive(Serialize)]
struct ModelReport {
    root_dir: PathBuf,
    project_dir: PathBuf,
    project_path: String,
    build_script: Option<PathBuf>,
    settings_file: Option<PathBuf>,
    projects: Vec<String>,
    extensions: Vec<ExtensionReport>,
}

impl ModelReport {
    fn new(model: &PersistedModel) -> Self {
        let root = Arc::new(model.root.clone());
        Self {
            root_dir: model.root_dir.clone(),
            project_dir: model.project_dir.clone(),
            project_path: model.main_path.clone(),
            build_script: model.build_script.clone(),
            settings_file: model.settings_file.clone(),
            projects: root
                .all_projects()
                .iter()
                .map(|project| project.path().to_string())
                .collect(),
            extensions: model
                .extensions
                .iter()
                .map(|extension| ExtensionReport {
                    name: extension.name.clone(),
                    model_types: extension
                        .models
                        .iter()
                        .map(|payload| payload.model_type.clone())
                        .collect(),
                })
                .collect(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

fn print_entries(entries: &[StoredModelInfo]) {
    if entries.is_empty() {
        println!("cache: no persisted models");
        return;
    }
    for entry in entries {
        println!(
            "{}\t{}\t[{}]",
            entry.project_path,
            entry.project_dir.display(),
            entry.extensions.join(", ")
        );
    }
}

fn print_model(report: &ModelReport) {
    println!("project: {} ({})", report.project_path, report.project_dir.display());
    println!("  root: {}", report.root_dir.display());
    if let Some(settings) = &report.settings_file {
        println!("  settings: {}", settings.display());
    }
    if let Some(script) = &report.build_script {
        println!("  build script: {}", script.display());
    }
    println!("  projects: {}", report.projects.join(" "));
    for extension in &report.extensions {
        println!(
            "  extension {}: {}",
            extension.name,
            extension.model_types.join(", ")
        );
    }
}
