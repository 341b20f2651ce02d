pub mod clean;
pub mod config;
pub mod coverage;
pub mod docs;
pub mod install;
pub mod matrix;
pub mod phases;
pub mod pipeline;
pub mod provision;
pub mod targets;

use thiserror::Error;

pub use clean::{clean, CleanConfig, CleanError, CleanReport};
pub use config::{ConfigError, HarnessConfig, CONFIG_ENV, CONFIG_FILE};
pub use coverage::{CoverageConfig, CoverageError, CoverageReporter, ReportOutcome};
pub use docs::{DocsConfig, DocsError, DocsReport, DocumentationBuilder};
pub use install::{InstallError, InstallMode, PackageInstaller};
pub use matrix::{InterpreterVersion, Matrix, MatrixCell, OperatingSystem};
pub use phases::{PhaseError, PhaseLabel, PhaseReport, PhaseRunner, TestGroup};
pub use pipeline::{CiJob, JobReport, StepReport};
pub use provision::{
    provisioner_for, GitIdentity, PackageManager, PosixProvisioner, ProvisionError, Provisioner,
    ProvisioningContext, WindowsProvisioner,
};
pub use targets::{LocalTargets, Target, TargetOutcome};

/// Any failure of a job or target
///
/// Failures of external tools keep their exit status so the caller sees the
/// same code the tool returned.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error(transparent)]
    Docs(#[from] DocsError),
    #[error(transparent)]
    Coverage(#[from] CoverageError),
    #[error(transparent)]
    Clean(#[from] CleanError),
    #[error("Test isolation failed: {0}")]
    Isolation(#[from] isolation::IsolationError),
    #[error(transparent)]
    Runner(#[from] runner::RunnerError),
}

impl HarnessError {
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Provision(e) => e.exit_code(),
            HarnessError::Install(e) => e.exit_code(),
            HarnessError::Phase(e) => e.exit_code(),
            HarnessError::Docs(e) => e.exit_code(),
            HarnessError::Coverage(e) => e.exit_code(),
            HarnessError::Runner(e) => e.exit_code(),
            HarnessError::Config(_) => 2,
            HarnessError::Clean(_) | HarnessError::Isolation(_) => 1,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            HarnessError::Phase(e) => e.is_timeout(),
            HarnessError::Runner(e) => e.is_timeout(),
            _ => false,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
