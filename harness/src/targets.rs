//! Developer targets.
//!
//! Every target is independent; nothing enforces an order between them.
//! Test targets run under coverage with the test-mode environment set.

use crate::clean::{clean, CleanReport};
use crate::config::HarnessConfig;
use crate::coverage::{CoverageReporter, ReportOutcome};
use crate::docs::{DocsReport, DocumentationBuilder};
use crate::install::{InstallMode, PackageInstaller};
use crate::matrix::{InterpreterVersion, MatrixCell, OperatingSystem};
use crate::phases::{PhaseLabel, PhaseReport, PhaseRunner};
use crate::provision::ProvisioningContext;
use crate::HarnessResult;
use isolation::{IsolationState, IsolationToggle, ToggleMode, ToggleReport};
use runner::CommandRunner;
use std::fmt;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Does nothing
    Default,
    Install,
    Documentation,
    Clean,
    Test,
    Unit,
    Integration,
    Report,
    Isolate,
    Unisolate,
}

impl Target {
    pub const ALL: [Target; 10] = [
        Target::Default,
        Target::Install,
        Target::Documentation,
        Target::Clean,
        Target::Test,
        Target::Unit,
        Target::Integration,
        Target::Report,
        Target::Isolate,
        Target::Unisolate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Target::Default => "default",
            Target::Install => "install",
            Target::Documentation => "documentation",
            Target::Clean => "clean",
            Target::Test => "test",
            Target::Unit => "unit",
            Target::Integration => "integration",
            Target::Report => "report",
            Target::Isolate => "isolate",
            Target::Unisolate => "unisolate",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown target '{}'", s))
    }
}

#[derive(Debug)]
pub enum TargetOutcome {
    Nothing,
    Installed,
    Documentation(DocsReport),
    Cleaned(CleanReport),
    Tested(Vec<PhaseReport>),
    Report(ReportOutcome),
    Toggled(ToggleReport),
}

pub struct LocalTargets<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a HarnessConfig,
    context: ProvisioningContext,
    coverage: CoverageReporter,
    toggle_mode: ToggleMode,
    dry_run: bool,
}

impl<'a> LocalTargets<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a HarnessConfig) -> Self {
        let cell = MatrixCell::new(OperatingSystem::host(), InterpreterVersion::Py310);
        Self {
            runner,
            config,
            context: ProvisioningContext::local(cell),
            coverage: CoverageReporter::new(config.coverage.clone(), &config.project_root),
            toggle_mode: ToggleMode::Permissive,
            dry_run: false,
        }
    }

    /// External commands still go to the runner; documentation skips its
    /// copy and cleanup
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_toggle_mode(mut self, mode: ToggleMode) -> Self {
        self.toggle_mode = mode;
        self
    }

    pub fn coverage(&self) -> &CoverageReporter {
        &self.coverage
    }

    fn toggle(&self) -> HarnessResult<IsolationToggle> {
        Ok(IsolationToggle::new(self.config.isolation_config())?)
    }

    pub fn isolation_state(&self) -> HarnessResult<IsolationState> {
        Ok(self.toggle()?.state()?)
    }

    pub async fn run(&self, target: Target) -> HarnessResult<TargetOutcome> {
        info!("target: {}", target);
        let phases =
            PhaseRunner::new(self.runner, self.config, &self.context).with_coverage(&self.coverage);

        let outcome = match target {
            Target::Default => TargetOutcome::Nothing,
            Target::Install => {
                PackageInstaller::new(self.runner, self.config, &self.context)
                    .install(InstallMode::Editable)
                    .await?;
                TargetOutcome::Installed
            }
            Target::Documentation => TargetOutcome::Documentation(
                DocumentationBuilder::new(self.runner, self.config)
                    .with_dry_run(self.dry_run)
                    .build()
                    .await?,
            ),
            Target::Clean => TargetOutcome::Cleaned(clean(self.config)?),
            Target::Test => TargetOutcome::Tested(phases.run_all().await?),
            Target::Unit => TargetOutcome::Tested(phases.run_label(PhaseLabel::Unit).await?),
            Target::Integration => {
                TargetOutcome::Tested(phases.run_label(PhaseLabel::Integration).await?)
            }
            Target::Report => TargetOutcome::Report(self.coverage.report(self.runner).await?),
            Target::Isolate => TargetOutcome::Toggled(self.toggle()?.isolate(self.toggle_mode)?),
            Target::Unisolate => {
                TargetOutcome::Toggled(self.toggle()?.unisolate(self.toggle_mode)?)
            }
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner::RecordingRunner;

    #[test]
    fn test_target_names_round_trip() {
        for target in Target::ALL {
            assert_eq!(target.name().parse::<Target>().unwrap(), target);
        }
        assert!("deploy".parse::<Target>().is_err());
    }

    #[tokio::test]
    async fn test_default_is_a_no_op() {
        let config = HarnessConfig::default();
        let runner = RecordingRunner::new();
        let outcome = LocalTargets::new(&runner, &config)
            .run(Target::Default)
            .await
            .unwrap();
        assert!(matches!(outcome, TargetOutcome::Nothing));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_install_is_editable() {
        let config = HarnessConfig::default();
        let runner = RecordingRunner::new();
        LocalTargets::new(&runner, &config)
            .run(Target::Install)
            .await
            .unwrap();
        assert_eq!(
            runner.command_lines().last().map(String::as_str),
            Some("python -m pip install -e .")
        );
    }

    #[tokio::test]
    async fn test_test_target_is_instrumented_and_appends() {
        let config = HarnessConfig::default();
        let runner = RecordingRunner::new();
        let outcome = LocalTargets::new(&runner, &config)
            .run(Target::Test)
            .await
            .unwrap();

        let TargetOutcome::Tested(reports) = outcome else {
            panic!("expected test reports");
        };
        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.instrumented));

        let calls = runner.calls();
        assert_eq!(
            calls[0].command_line(),
            "coverage run -m pytest -vv tests/test_package.py"
        );
        assert!(calls[1].command_line().starts_with("coverage run --append -m pytest"));
        assert!(calls[2].command_line().starts_with("coverage run --append -m pytest"));
        assert!(calls.iter().all(|c| c.env["KITEST"] == "1"));
    }

    #[tokio::test]
    async fn test_unit_target_overwrites_database() {
        let config = HarnessConfig::default();
        let runner = RecordingRunner::new();
        LocalTargets::new(&runner, &config)
            .run(Target::Unit)
            .await
            .unwrap();
        assert_eq!(
            runner.command_lines(),
            vec!["coverage run -m pytest -vv tests/test_ki.py tests/test_parser.py"]
        );
    }
}
