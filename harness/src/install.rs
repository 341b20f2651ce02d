use crate::config::HarnessConfig;
use crate::provision::ProvisioningContext;
use runner::{run_checked, CommandRunner, CommandSpec, RunnerError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Installing {what} failed: {source}")]
    Failed {
        what: String,
        #[source]
        source: RunnerError,
    },
}

impl InstallError {
    pub fn exit_code(&self) -> i32 {
        match self {
            InstallError::Failed { source, .. } => source.exit_code(),
        }
    }
}

pub type InstallResult<T> = Result<T, InstallError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallMode {
    /// Regular install from the source tree (CI)
    Standard,
    /// `pip install -e` for local development
    Editable,
}

/// Installs test tooling and the package into the active interpreter
pub struct PackageInstaller<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a HarnessConfig,
    context: &'a ProvisioningContext,
}

impl<'a> PackageInstaller<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        config: &'a HarnessConfig,
        context: &'a ProvisioningContext,
    ) -> Self {
        Self {
            runner,
            config,
            context,
        }
    }

    fn pip(&self) -> CommandSpec {
        let spec = CommandSpec::new(&self.config.python)
            .args(["-m", "pip", "install"])
            .current_dir(&self.config.project_root);
        self.context.apply(spec)
    }

    pub fn tools_command(&self) -> CommandSpec {
        self.pip().args(self.config.test_tools.iter().cloned())
    }

    pub fn package_command(&self, mode: InstallMode) -> CommandSpec {
        match mode {
            InstallMode::Standard => self.pip().arg("."),
            InstallMode::Editable => self.pip().args(["-e", "."]),
        }
    }

    pub fn dev_command(&self) -> CommandSpec {
        self.pip().arg("-r").path_arg(&self.config.dev_requirements)
    }

    async fn step(&self, what: &str, spec: CommandSpec) -> InstallResult<()> {
        run_checked(self.runner, &spec, None)
            .await
            .map_err(|source| InstallError::Failed {
                what: what.to_string(),
                source,
            })?;
        Ok(())
    }

    /// Test tools first, then the package itself
    pub async fn install(&self, mode: InstallMode) -> InstallResult<()> {
        info!(?mode, "installing {}", self.config.package);
        self.step("test tools", self.tools_command()).await?;
        self.step(&self.config.package, self.package_command(mode))
            .await
    }

    pub async fn install_dev_dependencies(&self) -> InstallResult<()> {
        info!(
            "installing development dependencies from {}",
            self.config.dev_requirements.display()
        );
        self.step("development dependencies", self.dev_command())
            .await
    }
}
