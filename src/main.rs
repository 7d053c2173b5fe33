use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use f1x_repair::config::load_from_path;
use f1x_repair::{
    input, repair, project::SourceProjectController, project::ProjectFile, runtime::Runtime,
    search::ProcessOracle, RepairConfig, RepairError, RepairInputs, RepairStatus,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "f1x-repair")]
#[command(about = "Automated program repair engine for C: patch search and test-equivalence search", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full repair pipeline and emit unified diffs for every
    /// plausible patch found.
    Repair {
        /// Path to the project under repair.
        #[arg(short, long)]
        root: PathBuf,

        /// Candidate-locations JSON file(s) produced by the instrumentation
        /// pass.
        #[arg(long = "locations", required = true, num_args = 1..)]
        location_files: Vec<PathBuf>,

        /// Fault-localization profile JSON.
        #[arg(long)]
        profile: PathBuf,

        /// Ordered negative-tests JSON list.
        #[arg(long)]
        tests: PathBuf,

        /// Test-driver executable.
        #[arg(long)]
        driver: PathBuf,

        /// Project build command, e.g. `make -C build`.
        #[arg(long, required = true, num_args = 1..)]
        build_command: Vec<String>,

        /// Run configuration TOML file (see `RepairConfig` for recognized options).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the diff(s) for plausible patches.
        #[arg(short, long, default_value = "f1x.patch")]
        output: PathBuf,

        /// Per-test timeout in milliseconds.
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },

    /// Generate and prioritize the search space without executing any
    /// tests; dump each candidate as a numbered `.patch` file.
    SearchSpace {
        #[arg(short, long)]
        root: PathBuf,

        #[arg(long = "locations", required = true, num_args = 1..)]
        location_files: Vec<PathBuf>,

        #[arg(long, required = true, num_args = 1..)]
        build_command: Vec<String>,

        /// Directory to dump numbered `.patch` files into.
        #[arg(short, long, default_value = "f1x-search-space")]
        output: PathBuf,
    },

    /// Re-run the validator (source-level re-apply + full rebuild + full
    /// test suite) over a previously discovered plausible patch.
    Validate {
        #[arg(short, long)]
        root: PathBuf,

        #[arg(long = "locations", required = true, num_args = 1..)]
        location_files: Vec<PathBuf>,

        #[arg(long)]
        tests: PathBuf,

        #[arg(long)]
        driver: PathBuf,

        #[arg(long, required = true, num_args = 1..)]
        build_command: Vec<String>,

        /// `appId:base:int2:bool2:cond3:param` identifying the patch to
        /// validate, as emitted in the search-space dump's filenames.
        #[arg(long)]
        app_id: u32,

        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Repair {
            root,
            location_files,
            profile,
            tests,
            driver,
            build_command,
            config,
            output,
            timeout_ms,
        } => cmd_repair(root, location_files, profile, tests, driver, build_command, config, output, timeout_ms),

        Commands::SearchSpace { root, location_files, build_command, output } => {
            cmd_search_space(root, location_files, build_command, output)
        }

        Commands::Validate { root, location_files, tests, driver, build_command, app_id, timeout_ms } => {
            cmd_validate(root, location_files, tests, driver, build_command, app_id, timeout_ms)
        }
    }
}

fn discover_project_files(location_files: &[PathBuf]) -> Result<Vec<ProjectFile>> {
    let applications = input::load_schema_applications(location_files)?;
    let mut seen = std::collections::BTreeSet::new();
    let mut files = Vec::new();
    for app in &applications {
        if seen.insert(app.location.file_id) {
            files.push(ProjectFile {
                relpath: PathBuf::from(format!("file_{}.c", app.location.file_id)),
                file_id: app.location.file_id,
            });
        }
    }
    Ok(files)
}

#[allow(clippy::too_many_arguments)]
fn cmd_repair(
    root: PathBuf,
    location_files: Vec<PathBuf>,
    profile: PathBuf,
    tests_path: PathBuf,
    driver: PathBuf,
    build_command: Vec<String>,
    config_path: Option<PathBuf>,
    output: PathBuf,
    timeout_ms: u64,
) -> Result<()> {
    let config = match &config_path {
        Some(path) => load_from_path(path).with_context(|| format!("loading configuration from {}", path.display()))?,
        None => RepairConfig::default(),
    };
    config
        .validate()
        .map_err(|source| RepairError::from(f1x_repair::ConfigError::Validation { path: config_path.clone(), source }))?;

    let schema_applications = input::load_schema_applications(&location_files)?;
    let related_test_indexes = input::load_profile(&profile)?;
    let tests = input::load_tests(&tests_path)?;
    let files = discover_project_files(&location_files)?;

    println!("{}", format!("loaded {} schema application(s), {} test(s)", schema_applications.len(), tests.len()).dimmed());

    let mut project = SourceProjectController::new(&root, files, build_command);
    let oracle = ProcessOracle::new(driver, Duration::from_millis(timeout_ms));
    let runtime_compile_command = vec![
        "cc".to_string(),
        "-c".to_string(),
        "-o".to_string(),
        "f1x_runtime.o".to_string(),
        "f1x_runtime.c".to_string(),
    ];
    let runtime = Runtime::new(config.data_dir.clone(), runtime_compile_command);

    let inputs = RepairInputs { schema_applications, tests, related_test_indexes };
    let status = repair(&mut project, oracle, &runtime, inputs, &config, &output);

    match status {
        RepairStatus::Success => {
            println!("{}", "repair succeeded".green().bold());
            println!("diff written to {}", output.display());
        }
        RepairStatus::Failure => {
            println!("{}", "search space exhausted without a plausible patch".red());
        }
        RepairStatus::NoNegativeTests => {
            println!("{}", "no negative tests to repair against".yellow());
        }
        RepairStatus::Error => {
            anyhow::bail!("repair failed due to an unrecoverable error");
        }
    }

    Ok(())
}

fn cmd_search_space(root: PathBuf, location_files: Vec<PathBuf>, build_command: Vec<String>, output: PathBuf) -> Result<()> {
    let schema_applications = input::load_schema_applications(&location_files)?;
    let files = discover_project_files(&location_files)?;
    let generated = f1x_repair::synthesis::generate_search_space(&schema_applications);

    println!(
        "{}",
        format!("generated {} candidate patch(es) across {} application(s)", generated.patches.len(), schema_applications.len()).dimmed()
    );

    let mut project = SourceProjectController::new(&root, files, build_command);
    project.backup_files();

    std::fs::create_dir_all(&output)?;
    for (i, patch) in generated.patches.iter().enumerate() {
        if f1x_repair::ProjectController::apply_patch(&mut project, patch).is_ok() {
            if let Some(file) = f1x_repair::ProjectController::files(&project)
                .iter()
                .find(|f| f.file_id == patch.app.location.file_id)
                .cloned()
            {
                let out = output.join(format!("{i}_f1x.patch"));
                let _ = f1x_repair::ProjectController::compute_diff(&project, &file.relpath, &out);
            }
        }
        f1x_repair::ProjectController::restore_files(&mut project);
    }

    println!("search space dumped to {}", output.display());
    Ok(())
}

fn cmd_validate(
    root: PathBuf,
    location_files: Vec<PathBuf>,
    tests_path: PathBuf,
    driver: PathBuf,
    build_command: Vec<String>,
    app_id: u32,
    timeout_ms: u64,
) -> Result<()> {
    let schema_applications = input::load_schema_applications(&location_files)?;
    let tests = input::load_tests(&tests_path)?;
    let files = discover_project_files(&location_files)?;

    let generated = f1x_repair::synthesis::generate_search_space(&schema_applications);
    let patch = generated
        .patches
        .into_iter()
        .find(|p| p.app.app_id == app_id)
        .ok_or_else(|| anyhow::anyhow!("no candidate found for app_id {app_id}"))?;

    let mut project = SourceProjectController::new(&root, files, build_command);
    project.backup_files();
    let mut oracle = ProcessOracle::new(driver, Duration::from_millis(timeout_ms));

    let valid = f1x_repair::validate::validate_patch(&mut project, &mut oracle, &tests, &patch);

    if valid {
        println!("{}", "patch passed validation".green().bold());
    } else {
        println!("{}", "patch failed validation".red().bold());
        anyhow::bail!("validation failed");
    }

    Ok(())
}
