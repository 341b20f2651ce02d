use clap::{Parser, Subcommand};
use harness::clean::clean_targets;
use harness::{
    CiJob, HarnessConfig, HarnessResult, InterpreterVersion, LocalTargets, Matrix, MatrixCell,
    OperatingSystem, ReportOutcome, Target, TargetOutcome,
};
use isolation::{IsolationToggle, ToggleMode};
use runner::{CommandRunner, RecordingRunner, RunnerConfig, SystemRunner};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Build, test and document the ki package locally or as a CI matrix job")]
struct Cli {
    /// Configuration file (defaults to $HARNESS_CONFIG, then ./harness.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Print external commands instead of running them; file-rewriting
    /// targets only list what they would touch
    #[arg(long, global = true)]
    dry_run: bool,
    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Do nothing
    Default,
    /// Install test tools and the package in editable mode
    Install,
    /// Generate HTML documentation into the docs directory
    Documentation,
    /// Remove generated documentation, caches and coverage output
    Clean,
    /// Run every test group under coverage
    Test,
    /// Run the unit group under coverage
    Unit,
    /// Run the integration group under coverage
    Integration,
    /// Render the coverage database to HTML
    Report,
    /// Insert a skip marker before every test
    Isolate {
        /// Refuse to run when the tests are already isolated
        #[arg(long)]
        checked: bool,
    },
    /// Remove the skip markers inserted by `isolate`
    Unisolate {
        /// Refuse to run when the tests are not isolated
        #[arg(long)]
        checked: bool,
    },
    /// Show the recorded isolation state
    Status,
    /// List the CI matrix cells
    Matrix {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Run the CI job for one matrix cell on this machine
    Ci {
        /// Operating system of the cell (defaults to the host)
        #[arg(long, value_enum)]
        os: Option<OperatingSystem>,
        /// Interpreter version of the cell
        #[arg(long, value_enum, default_value = "3.10")]
        python: InterpreterVersion,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> HarnessResult<()> {
    let config = HarnessConfig::load(cli.config.as_deref())?;

    let recording = RecordingRunner::new();
    let system;
    let runner: &dyn CommandRunner = if cli.dry_run {
        &recording
    } else {
        system = SystemRunner::new(RunnerConfig::new().with_working_dir(&config.project_root))?;
        &system
    };

    let result = dispatch(cli.command, cli.dry_run, runner, &config).await;

    if cli.dry_run {
        for line in recording.command_lines() {
            println!("would run: {}", line);
        }
    }

    result
}

async fn dispatch(
    command: Commands,
    dry_run: bool,
    runner: &dyn CommandRunner,
    config: &HarnessConfig,
) -> HarnessResult<()> {
    let (target, mode) = match command {
        Commands::Matrix { json } => {
            print_matrix(json);
            return Ok(());
        }
        Commands::Status => {
            let state = LocalTargets::new(runner, config).isolation_state()?;
            println!(
                "isolated: {} (depth {}{})",
                state.is_isolated(),
                state.depth,
                if state.is_consistent() {
                    ""
                } else {
                    ", a single unisolate will not restore the tests"
                }
            );
            if let Some(at) = state.updated_at {
                println!("last changed: {}", at.to_rfc3339());
            }
            return Ok(());
        }
        Commands::Ci { os, python } => {
            let cell = MatrixCell::new(os.unwrap_or_else(OperatingSystem::host), python);
            let report = CiJob::for_cell(runner, config, cell).run().await?;
            for step in &report.steps {
                println!("{:<18} {:>8.1}s", step.name, step.elapsed.as_secs_f64());
            }
            println!("CI job {} passed", cell.id());
            return Ok(());
        }
        Commands::Default => (Target::Default, ToggleMode::Permissive),
        Commands::Install => (Target::Install, ToggleMode::Permissive),
        Commands::Documentation => (Target::Documentation, ToggleMode::Permissive),
        Commands::Clean => (Target::Clean, ToggleMode::Permissive),
        Commands::Test => (Target::Test, ToggleMode::Permissive),
        Commands::Unit => (Target::Unit, ToggleMode::Permissive),
        Commands::Integration => (Target::Integration, ToggleMode::Permissive),
        Commands::Report => (Target::Report, ToggleMode::Permissive),
        Commands::Isolate { checked } => (Target::Isolate, toggle_mode(checked)),
        Commands::Unisolate { checked } => (Target::Unisolate, toggle_mode(checked)),
    };

    if dry_run && preview_file_target(target, config)? {
        return Ok(());
    }

    let outcome = LocalTargets::new(runner, config)
        .with_toggle_mode(mode)
        .with_dry_run(dry_run)
        .run(target)
        .await?;
    print_outcome(&outcome);
    Ok(())
}

fn toggle_mode(checked: bool) -> ToggleMode {
    if checked {
        ToggleMode::Checked
    } else {
        ToggleMode::Permissive
    }
}

/// List what a file-rewriting target would touch; returns whether it handled the target
fn preview_file_target(target: Target, config: &HarnessConfig) -> HarnessResult<bool> {
    match target {
        Target::Clean => {
            for path in clean_targets(config)? {
                println!("would remove: {}", path.display());
            }
            Ok(true)
        }
        Target::Isolate | Target::Unisolate => {
            let toggle = IsolationToggle::new(config.isolation_config())?;
            for file in toggle.test_files()? {
                println!("would rewrite: {}", file.display());
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

fn print_matrix(json: bool) {
    let cells = Matrix::ci().cells();
    if json {
        match serde_json::to_string_pretty(&cells) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => error!("failed to render matrix: {}", e),
        }
        return;
    }
    for cell in cells {
        println!("{:<16} {}", cell.id(), cell);
    }
}

fn print_outcome(outcome: &TargetOutcome) {
    match outcome {
        TargetOutcome::Nothing => println!("No default target."),
        TargetOutcome::Installed => println!("Installed."),
        TargetOutcome::Documentation(report) if report.dry_run => {
            println!(
                "would copy: {} -> {}",
                report.generated.display(),
                report.output.display()
            );
            if let Some(transient) = report.generated.parent() {
                println!("would remove: {}", transient.display());
            }
        }
        TargetOutcome::Documentation(report) => {
            println!("Documentation: {} file(s) updated", report.copied.len())
        }
        TargetOutcome::Cleaned(report) => {
            for path in &report.removed {
                println!("removed {}", path.display());
            }
        }
        TargetOutcome::Tested(reports) => {
            for report in reports {
                println!(
                    "{:<12} {:<12} {:>8.1}s",
                    report.name,
                    report.label.to_string(),
                    report.elapsed.as_secs_f64()
                );
            }
        }
        TargetOutcome::Report(ReportOutcome::NoDatabase) => {
            println!("No coverage data; run test, unit or integration first.")
        }
        TargetOutcome::Report(ReportOutcome::Rendered { html_dir }) => {
            println!("Coverage report: {}", html_dir.join("index.html").display())
        }
        TargetOutcome::Toggled(report) => println!(
            "{} marker(s) in {} file(s); isolation depth {}",
            report.markers,
            report.files_changed.len(),
            report.state.depth
        ),
    }
}
