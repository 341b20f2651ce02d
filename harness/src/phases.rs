use crate::config::HarnessConfig;
use crate::coverage::CoverageReporter;
use crate::provision::ProvisioningContext;
use runner::{run_checked, CommandRunner, CommandSpec, RunnerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

/// Default time limit for the unit and integration phases
pub const PHASE_TIMEOUT_SECS: u64 = 120;

const PYTEST_MODULE: &str = "pytest";

#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("Phase '{phase}' failed: {source}")]
    Failed {
        phase: String,
        #[source]
        source: RunnerError,
    },
}

impl PhaseError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PhaseError::Failed { source, .. } => source.exit_code(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            PhaseError::Failed { source, .. } => source.is_timeout(),
        }
    }
}

pub type PhaseResult<T> = Result<T, PhaseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseLabel {
    /// Packaging smoke test, run before development dependencies exist
    Package,
    Unit,
    Integration,
}

impl fmt::Display for PhaseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseLabel::Package => write!(f, "package"),
            PhaseLabel::Unit => write!(f, "unit"),
            PhaseLabel::Integration => write!(f, "integration"),
        }
    }
}

/// Named set of test files sharing a time limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestGroup {
    pub name: String,
    pub label: PhaseLabel,
    pub files: Vec<PathBuf>,
    /// Seconds before the phase is killed; no limit when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl TestGroup {
    pub fn package() -> Self {
        Self {
            name: "package".to_string(),
            label: PhaseLabel::Package,
            files: vec![PathBuf::from("tests/test_package.py")],
            timeout_secs: None,
        }
    }

    pub fn unit() -> Self {
        Self {
            name: "unit".to_string(),
            label: PhaseLabel::Unit,
            files: vec![
                PathBuf::from("tests/test_ki.py"),
                PathBuf::from("tests/test_parser.py"),
            ],
            timeout_secs: Some(PHASE_TIMEOUT_SECS),
        }
    }

    pub fn integration() -> Self {
        Self {
            name: "integration".to_string(),
            label: PhaseLabel::Integration,
            files: vec![PathBuf::from("tests/test_integration.py")],
            timeout_secs: Some(PHASE_TIMEOUT_SECS),
        }
    }

    /// The three groups in execution order
    pub fn defaults() -> Vec<Self> {
        vec![Self::package(), Self::unit(), Self::integration()]
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub name: String,
    pub label: PhaseLabel,
    pub files: Vec<PathBuf>,
    pub elapsed: Duration,
    pub instrumented: bool,
}

/// Runs test groups through pytest, optionally under coverage
pub struct PhaseRunner<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a HarnessConfig,
    context: &'a ProvisioningContext,
    coverage: Option<&'a CoverageReporter>,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        config: &'a HarnessConfig,
        context: &'a ProvisioningContext,
    ) -> Self {
        Self {
            runner,
            config,
            context,
            coverage: None,
        }
    }

    pub fn with_coverage(mut self, coverage: &'a CoverageReporter) -> Self {
        self.coverage = Some(coverage);
        self
    }

    /// pytest module invocation (`pytest <args> <files>`) with the context
    /// environment; the program is the module name, not an executable
    fn pytest_module(&self, group: &TestGroup) -> CommandSpec {
        let spec = CommandSpec::new(PYTEST_MODULE)
            .args(self.config.pytest_args.iter().cloned())
            .args(group.files.iter().map(|f| f.to_string_lossy().into_owned()))
            .current_dir(&self.config.project_root);
        self.context.apply(spec)
    }

    /// `<python> -m pytest` for a group, the same interpreter pip installs into
    pub fn pytest_command(&self, group: &TestGroup) -> CommandSpec {
        let module = self.pytest_module(group);
        let mut spec = CommandSpec::new(&self.config.python)
            .args(["-m", module.program.as_str()])
            .args(module.args)
            .envs(module.env);
        if let Some(dir) = module.current_dir {
            spec = spec.current_dir(dir);
        }
        spec
    }

    fn command_for(&self, group: &TestGroup, append: bool) -> CommandSpec {
        match self.coverage {
            Some(coverage) => coverage.wrap(&self.pytest_module(group), append),
            None => self.pytest_command(group),
        }
    }

    /// Run one group; `append` continues an existing coverage database
    pub async fn run_group(&self, group: &TestGroup, append: bool) -> PhaseResult<PhaseReport> {
        info!(
            phase = %group.label,
            timeout_secs = ?group.timeout_secs,
            "running test group '{}'",
            group.name
        );
        let started = Instant::now();
        let command = self.command_for(group, append);

        run_checked(self.runner, &command, group.timeout())
            .await
            .map_err(|source| {
                error!("test group '{}' failed: {}", group.name, source);
                PhaseError::Failed {
                    phase: group.name.clone(),
                    source,
                }
            })?;

        Ok(PhaseReport {
            name: group.name.clone(),
            label: group.label,
            files: group.files.clone(),
            elapsed: started.elapsed(),
            instrumented: self.coverage.is_some(),
        })
    }

    /// Run groups in order, stopping at the first failure
    ///
    /// Under coverage the first group starts a fresh database and later
    /// groups append to it.
    pub async fn run_groups(&self, groups: &[&TestGroup]) -> PhaseResult<Vec<PhaseReport>> {
        let mut reports = Vec::with_capacity(groups.len());
        for (idx, group) in groups.iter().enumerate() {
            reports.push(self.run_group(group, idx > 0).await?);
        }
        Ok(reports)
    }

    pub async fn run_label(&self, label: PhaseLabel) -> PhaseResult<Vec<PhaseReport>> {
        let groups = self.config.groups_for(label);
        self.run_groups(&groups).await
    }

    pub async fn run_all(&self) -> PhaseResult<Vec<PhaseReport>> {
        let groups: Vec<&TestGroup> = self.config.groups.iter().collect();
        self.run_groups(&groups).await
    }
}
