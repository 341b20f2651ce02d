use runner::{run_checked, CommandRunner, CommandSpec, RunnerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Coverage report failed: {0}")]
    Report(#[from] RunnerError),
}

impl CoverageError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CoverageError::Report(source) => source.exit_code(),
        }
    }
}

pub type CoverageResult<T> = Result<T, CoverageError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub program: String,
    /// Data file written by `coverage run`
    pub database: PathBuf,
    /// Output directory of `coverage html`
    pub html_dir: PathBuf,
    /// Variables telling the package under test that it runs under test
    pub test_env: BTreeMap<String, String>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            program: "coverage".to_string(),
            database: PathBuf::from(".coverage"),
            html_dir: PathBuf::from("htmlcov"),
            test_env: BTreeMap::from([("KITEST".to_string(), "1".to_string())]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// No database exists yet; nothing was rendered
    NoDatabase,
    Rendered { html_dir: PathBuf },
}

/// Wraps test commands in `coverage run` and renders the result
pub struct CoverageReporter {
    config: CoverageConfig,
    root: PathBuf,
}

impl CoverageReporter {
    pub fn new(config: CoverageConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            root: root.into(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        resolve(&self.root, &self.config.database)
    }

    pub fn html_path(&self) -> PathBuf {
        resolve(&self.root, &self.config.html_dir)
    }

    /// Run `inner` as a module under `coverage run`
    ///
    /// Without `append` the database is overwritten.
    pub fn wrap(&self, inner: &CommandSpec, append: bool) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.config.program).arg("run");
        if append {
            spec = spec.arg("--append");
        }
        spec = spec
            .args(["-m", inner.program.as_str()])
            .args(inner.args.iter().cloned())
            .envs(inner.env.clone())
            .envs(self.config.test_env.clone())
            .env("COVERAGE_FILE", self.database_path().to_string_lossy());

        match &inner.current_dir {
            Some(dir) => spec.current_dir(dir),
            None => spec.current_dir(&self.root),
        }
    }

    pub fn report_command(&self) -> CommandSpec {
        CommandSpec::new(&self.config.program)
            .arg("html")
            .arg("-d")
            .path_arg(self.html_path())
            .env("COVERAGE_FILE", self.database_path().to_string_lossy())
            .current_dir(&self.root)
    }

    /// Render the database to HTML; a missing database is not an error
    pub async fn report(&self, runner: &dyn CommandRunner) -> CoverageResult<ReportOutcome> {
        let database = self.database_path();
        if !database.exists() {
            warn!(
                "no coverage database at {}; run test, unit or integration first",
                database.display()
            );
            return Ok(ReportOutcome::NoDatabase);
        }

        run_checked(runner, &self.report_command(), None).await?;
        let html_dir = self.html_path();
        info!("coverage report written to {}", html_dir.display());
        Ok(ReportOutcome::Rendered { html_dir })
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
