//! Per-platform environment provisioning.
//!
//! Each CI cell starts by installing the HTML normalisation tool (`tidy`) and
//! fixing a git identity. Rather than writing global git configuration, the
//! provisioner returns a [`ProvisioningContext`] whose environment is applied
//! to every later command of the job.

use crate::matrix::{MatrixCell, OperatingSystem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runner::{run_checked, CommandRunner, CommandSpec, RunnerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Failed to install {tool} on {os}: {source}")]
    ToolInstall {
        tool: String,
        os: OperatingSystem,
        #[source]
        source: RunnerError,
    },
}

impl ProvisionError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ProvisionError::ToolInstall { source, .. } => source.exit_code(),
        }
    }
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Author/committer identity for git operations performed by the tests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for GitIdentity {
    fn default() -> Self {
        Self {
            name: "Your Name".to_string(),
            email: "you@example.com".to_string(),
        }
    }
}

/// Environment prepared by provisioning, threaded into every later step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningContext {
    pub cell: MatrixCell,
    pub identity: Option<GitIdentity>,
    /// git configuration entries, e.g. `core.symlinks = false`
    pub git_settings: BTreeMap<String, String>,
    /// Tools installed by the provisioner
    pub tools: Vec<String>,
    pub provisioned_at: Option<DateTime<Utc>>,
}

impl ProvisioningContext {
    /// Context for a developer machine: nothing installed, no identity override
    pub fn local(cell: MatrixCell) -> Self {
        Self {
            cell,
            identity: None,
            git_settings: BTreeMap::new(),
            tools: Vec::new(),
            provisioned_at: None,
        }
    }

    /// All git configuration entries, identity first
    pub fn git_config(&self) -> Vec<(String, String)> {
        let mut entries = Vec::new();
        if let Some(identity) = &self.identity {
            entries.push(("user.email".to_string(), identity.email.clone()));
            entries.push(("user.name".to_string(), identity.name.clone()));
        }
        entries.extend(
            self.git_settings
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        entries
    }

    /// Environment variables carrying the git configuration to child processes
    ///
    /// Uses git's `GIT_CONFIG_COUNT`/`GIT_CONFIG_KEY_n`/`GIT_CONFIG_VALUE_n`
    /// protocol plus the author and committer variables.
    pub fn env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        let entries = self.git_config();
        if entries.is_empty() {
            return env;
        }

        env.insert("GIT_CONFIG_COUNT".to_string(), entries.len().to_string());
        for (idx, (key, value)) in entries.into_iter().enumerate() {
            env.insert(format!("GIT_CONFIG_KEY_{}", idx), key);
            env.insert(format!("GIT_CONFIG_VALUE_{}", idx), value);
        }

        if let Some(identity) = &self.identity {
            for role in ["AUTHOR", "COMMITTER"] {
                env.insert(format!("GIT_{}_NAME", role), identity.name.clone());
                env.insert(format!("GIT_{}_EMAIL", role), identity.email.clone());
            }
        }

        env
    }

    pub fn apply(&self, spec: CommandSpec) -> CommandSpec {
        spec.envs(self.env())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageManager {
    Apt,
    Homebrew,
    Chocolatey,
}

impl PackageManager {
    pub fn install_command(&self, package: &str) -> CommandSpec {
        match self {
            PackageManager::Apt => {
                CommandSpec::new("sudo").args(["apt-get", "install", "-y", package])
            }
            PackageManager::Homebrew => CommandSpec::new("brew").args(["install", package]),
            PackageManager::Chocolatey => {
                CommandSpec::new("choco").args(["install", package, "-y"])
            }
        }
    }
}

/// Platform-specific provisioning strategy
#[async_trait]
pub trait Provisioner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Packages installed by this provisioner, in order
    fn packages(&self) -> Vec<String>;

    fn package_manager(&self) -> PackageManager;

    /// Extra git configuration required on this platform
    fn git_settings(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn install_commands(&self) -> Vec<CommandSpec> {
        let manager = self.package_manager();
        self.packages()
            .iter()
            .map(|package| manager.install_command(package))
            .collect()
    }

    /// Install every package, stopping at the first failure, then build the
    /// context for the rest of the job
    async fn provision(
        &self,
        runner: &dyn CommandRunner,
        cell: MatrixCell,
        identity: &GitIdentity,
    ) -> ProvisionResult<ProvisioningContext> {
        info!(provisioner = self.name(), "provisioning {}", cell);

        let packages = self.packages();
        for (package, command) in packages.iter().zip(self.install_commands()) {
            run_checked(runner, &command, None)
                .await
                .map_err(|source| ProvisionError::ToolInstall {
                    tool: package.clone(),
                    os: cell.os,
                    source,
                })?;
        }

        Ok(ProvisioningContext {
            cell,
            identity: Some(identity.clone()),
            git_settings: self.git_settings(),
            tools: packages,
            provisioned_at: Some(Utc::now()),
        })
    }
}

/// Linux and macOS: `tidy` from the system package manager
pub struct PosixProvisioner {
    manager: PackageManager,
}

impl PosixProvisioner {
    pub fn new(manager: PackageManager) -> Self {
        Self { manager }
    }

    pub fn for_os(os: OperatingSystem) -> Self {
        match os {
            OperatingSystem::Macos => Self::new(PackageManager::Homebrew),
            _ => Self::new(PackageManager::Apt),
        }
    }
}

#[async_trait]
impl Provisioner for PosixProvisioner {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn packages(&self) -> Vec<String> {
        vec!["tidy".to_string()]
    }

    fn package_manager(&self) -> PackageManager {
        self.manager
    }
}

/// Windows: `html-tidy` from Chocolatey, and no symlinks in checkouts since
/// creating them needs elevated privileges
pub struct WindowsProvisioner;

impl WindowsProvisioner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provisioner for WindowsProvisioner {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn packages(&self) -> Vec<String> {
        vec!["html-tidy".to_string()]
    }

    fn package_manager(&self) -> PackageManager {
        PackageManager::Chocolatey
    }

    fn git_settings(&self) -> BTreeMap<String, String> {
        BTreeMap::from([("core.symlinks".to_string(), "false".to_string())])
    }
}

pub fn provisioner_for(os: OperatingSystem) -> Box<dyn Provisioner> {
    if os.is_posix() {
        Box::new(PosixProvisioner::for_os(os))
    } else {
        Box::new(WindowsProvisioner::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::InterpreterVersion;
    use runner::RecordingRunner;

    fn cell(os: OperatingSystem) -> MatrixCell {
        MatrixCell::new(os, InterpreterVersion::Py310)
    }

    #[tokio::test]
    async fn test_linux_installs_tidy_with_apt() {
        let runner = RecordingRunner::new();
        let provisioner = provisioner_for(OperatingSystem::Linux);
        let ctx = provisioner
            .provision(&runner, cell(OperatingSystem::Linux), &GitIdentity::default())
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec!["sudo apt-get install -y tidy"]
        );
        assert_eq!(ctx.tools, vec!["tidy"]);
        assert!(ctx.git_settings.is_empty());
        assert!(ctx.provisioned_at.is_some());
    }

    #[tokio::test]
    async fn test_macos_installs_tidy_with_brew() {
        let runner = RecordingRunner::new();
        provisioner_for(OperatingSystem::Macos)
            .provision(&runner, cell(OperatingSystem::Macos), &GitIdentity::default())
            .await
            .unwrap();
        assert_eq!(runner.command_lines(), vec!["brew install tidy"]);
    }

    #[tokio::test]
    async fn test_windows_installs_html_tidy_and_disables_symlinks() {
        let runner = RecordingRunner::new();
        let provisioner = provisioner_for(OperatingSystem::Windows);
        assert_eq!(provisioner.name(), "windows");

        let ctx = provisioner
            .provision(&runner, cell(OperatingSystem::Windows), &GitIdentity::default())
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec!["choco install html-tidy -y"]
        );
        assert_eq!(
            ctx.git_settings.get("core.symlinks").map(String::as_str),
            Some("false")
        );
    }

    #[tokio::test]
    async fn test_install_failure_aborts_provisioning() {
        let runner = RecordingRunner::new().fail_when("apt-get", 100);
        let err = provisioner_for(OperatingSystem::Linux)
            .provision(&runner, cell(OperatingSystem::Linux), &GitIdentity::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::ToolInstall { ref tool, .. } if tool == "tidy"));
        assert_eq!(err.exit_code(), 100);
    }

    #[tokio::test]
    async fn test_missing_package_manager() {
        let runner = RecordingRunner::new().missing_when("choco");
        let err = provisioner_for(OperatingSystem::Windows)
            .provision(&runner, cell(OperatingSystem::Windows), &GitIdentity::default())
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), runner::NOT_FOUND_EXIT_CODE);
    }

    #[test]
    fn test_context_env_carries_identity_and_settings() {
        let mut ctx = ProvisioningContext::local(cell(OperatingSystem::Windows));
        ctx.identity = Some(GitIdentity::default());
        ctx.git_settings = WindowsProvisioner::new().git_settings();

        let env = ctx.env();
        assert_eq!(env["GIT_CONFIG_COUNT"], "3");
        assert_eq!(env["GIT_CONFIG_KEY_0"], "user.email");
        assert_eq!(env["GIT_CONFIG_VALUE_0"], "you@example.com");
        assert_eq!(env["GIT_CONFIG_KEY_1"], "user.name");
        assert_eq!(env["GIT_CONFIG_VALUE_1"], "Your Name");
        assert_eq!(env["GIT_CONFIG_KEY_2"], "core.symlinks");
        assert_eq!(env["GIT_CONFIG_VALUE_2"], "false");
        assert_eq!(env["GIT_AUTHOR_NAME"], "Your Name");
        assert_eq!(env["GIT_COMMITTER_EMAIL"], "you@example.com");
    }

    #[test]
    fn test_local_context_has_empty_env() {
        let ctx = ProvisioningContext::local(cell(OperatingSystem::Linux));
        assert!(ctx.env().is_empty());
        let spec = ctx.apply(CommandSpec::new("pytest"));
        assert!(spec.env.is_empty());
    }
}
