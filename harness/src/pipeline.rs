//! One CI matrix job.
//!
//! Steps run strictly in sequence and the first failure ends the job:
//!
//! 1. provision the platform tools and git identity
//! 2. install test tools and the package (standard mode)
//! 3. package verification phase
//! 4. install development dependencies
//! 5. unit phase
//! 6. integration phase
//!
//! Tests run without coverage here; instrumentation is a local concern.

use crate::config::HarnessConfig;
use crate::install::{InstallMode, PackageInstaller};
use crate::matrix::MatrixCell;
use crate::phases::{PhaseLabel, PhaseReport, PhaseRunner};
use crate::provision::{provisioner_for, Provisioner, ProvisioningContext};
use crate::HarnessResult;
use chrono::{DateTime, Utc};
use runner::CommandRunner;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub cell: MatrixCell,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    pub phases: Vec<PhaseReport>,
}

impl JobReport {
    fn new(cell: MatrixCell) -> Self {
        Self {
            cell,
            started_at: Utc::now(),
            steps: Vec::new(),
            phases: Vec::new(),
        }
    }

    fn step(&mut self, name: &str, started: Instant) {
        self.steps.push(StepReport {
            name: name.to_string(),
            elapsed: started.elapsed(),
        });
    }
}

pub struct CiJob<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a HarnessConfig,
    cell: MatrixCell,
    provisioner: Box<dyn Provisioner>,
}

impl<'a> CiJob<'a> {
    /// Job for `cell` provisioned by an explicit strategy
    pub fn new(
        runner: &'a dyn CommandRunner,
        config: &'a HarnessConfig,
        cell: MatrixCell,
        provisioner: Box<dyn Provisioner>,
    ) -> Self {
        Self {
            runner,
            config,
            cell,
            provisioner,
        }
    }

    /// Job using the provisioner matching the cell's operating system
    pub fn for_cell(
        runner: &'a dyn CommandRunner,
        config: &'a HarnessConfig,
        cell: MatrixCell,
    ) -> Self {
        Self::new(runner, config, cell, provisioner_for(cell.os))
    }

    pub fn cell(&self) -> MatrixCell {
        self.cell
    }

    pub async fn run(&self) -> HarnessResult<JobReport> {
        let cell = self.cell;
        info!("starting CI job {}", cell.id());
        let mut report = JobReport::new(cell);

        let started = Instant::now();
        let context = self
            .provisioner
            .provision(self.runner, cell, &self.config.identity)
            .await?;
        report.step("provision", started);

        self.run_with_context(&context, report).await
    }

    async fn run_with_context(
        &self,
        context: &ProvisioningContext,
        mut report: JobReport,
    ) -> HarnessResult<JobReport> {
        let installer = PackageInstaller::new(self.runner, self.config, context);
        let phases = PhaseRunner::new(self.runner, self.config, context);

        let started = Instant::now();
        installer.install(InstallMode::Standard).await?;
        report.step("install", started);

        let started = Instant::now();
        report.phases.extend(phases.run_label(PhaseLabel::Package).await?);
        report.step("package", started);

        let started = Instant::now();
        installer.install_dev_dependencies().await?;
        report.step("dev-dependencies", started);

        for label in [PhaseLabel::Unit, PhaseLabel::Integration] {
            let started = Instant::now();
            report.phases.extend(phases.run_label(label).await?);
            report.step(&label.to_string(), started);
        }

        info!(
            steps = report.steps.len(),
            "CI job {} succeeded",
            report.cell.id()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{Matrix, OperatingSystem};
    use crate::HarnessError;
    use runner::RecordingRunner;

    #[tokio::test]
    async fn test_provisioning_precedes_install_for_every_cell() {
        let config = HarnessConfig::default();
        for cell in Matrix::ci().cells() {
            let runner = RecordingRunner::new();
            let report = CiJob::for_cell(&runner, &config, cell)
                .run()
                .await
                .unwrap();

            let tidy = runner.position("tidy").unwrap();
            let install = runner.position("pip install").unwrap();
            assert!(tidy < install, "cell {}", cell.id());
            assert_eq!(
                report
                    .steps
                    .iter()
                    .map(|s| s.name.as_str())
                    .collect::<Vec<_>>(),
                vec![
                    "provision",
                    "install",
                    "package",
                    "dev-dependencies",
                    "unit",
                    "integration"
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_full_command_sequence() {
        let config = HarnessConfig::default();
        let runner = RecordingRunner::new();
        let cell = Matrix::ci().cells()[0];
        CiJob::for_cell(&runner, &config, cell)
            .run()
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "sudo apt-get install -y tidy",
                "python -m pip install pytest wheel",
                "python -m pip install .",
                "python -m pytest -vv tests/test_package.py",
                "python -m pip install -r requirements-dev.txt",
                "python -m pytest -vv tests/test_ki.py tests/test_parser.py",
                "python -m pytest -vv tests/test_integration.py",
            ]
        );
    }

    #[tokio::test]
    async fn test_identity_reaches_test_commands() {
        let config = HarnessConfig::default();
        let runner = RecordingRunner::new();
        let cell = Matrix::ci().cells()[4];
        CiJob::for_cell(&runner, &config, cell)
            .run()
            .await
            .unwrap();

        let calls = runner.calls();
        let pytest = calls
            .iter()
            .find(|c| c.command_line().contains("-m pytest"))
            .unwrap();
        assert_eq!(pytest.env["GIT_AUTHOR_EMAIL"], "you@example.com");
        assert!(pytest
            .env
            .values()
            .any(|v| v == "core.symlinks"));
        assert!(!calls[0].env.contains_key("GIT_CONFIG_COUNT"));
    }

    #[tokio::test]
    async fn test_package_failure_blocks_dev_dependencies() {
        let config = HarnessConfig::default();
        let runner = RecordingRunner::new().fail_when("test_package.py", 1);
        let cell = Matrix::ci().cells()[2];
        let err = CiJob::for_cell(&runner, &config, cell)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Phase(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(runner.position("requirements-dev.txt").is_none());
        assert!(runner.position("test_ki.py").is_none());
        assert!(runner.position("test_integration.py").is_none());
    }

    #[tokio::test]
    async fn test_provision_failure_stops_job() {
        let config = HarnessConfig::default();
        let runner = RecordingRunner::new().fail_when("brew", 1);
        let cell = Matrix::ci().cells()[2];
        let err = CiJob::for_cell(&runner, &config, cell)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::Provision(_)));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_job_provisions_for_its_own_cell() {
        let config = HarnessConfig::default();
        for cell in Matrix::ci().cells() {
            let runner = RecordingRunner::new();
            let job = CiJob::for_cell(&runner, &config, cell);
            assert_eq!(job.cell(), cell);

            let report = job.run().await.unwrap();
            assert_eq!(report.cell, cell);
            let first = runner.command_lines()[0].clone();
            match cell.os {
                OperatingSystem::Linux => assert!(first.starts_with("sudo apt-get")),
                OperatingSystem::Macos => assert!(first.starts_with("brew")),
                OperatingSystem::Windows => assert!(first.starts_with("choco")),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_integration_phase_times_out() {
        let config = HarnessConfig::default();
        let runner = RecordingRunner::new()
            .sleep_when("test_integration.py", Duration::from_secs(3600));
        let cell = Matrix::ci().cells()[1];
        let err = CiJob::for_cell(&runner, &config, cell)
            .run()
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.exit_code(), runner::TIMEOUT_EXIT_CODE);
    }
}
