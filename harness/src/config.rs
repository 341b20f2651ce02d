use crate::clean::CleanConfig;
use crate::coverage::CoverageConfig;
use crate::docs::DocsConfig;
use crate::phases::{PhaseLabel, TestGroup};
use crate::provision::GitIdentity;
use isolation::{IsolationConfig, MarkerRules};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "harness.toml";
/// Environment variable naming an alternative configuration file
pub const CONFIG_ENV: &str = "HARNESS_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Importable name of the package under test
    pub package: String,
    /// Interpreter used for `-m pip`
    pub python: String,
    pub project_root: PathBuf,
    pub dev_requirements: PathBuf,
    /// Packages installed ahead of the package itself
    pub test_tools: Vec<String>,
    /// Flags passed to every pytest run
    pub pytest_args: Vec<String>,
    /// Test groups in execution order
    pub groups: Vec<TestGroup>,
    pub identity: GitIdentity,
    pub docs: DocsConfig,
    pub coverage: CoverageConfig,
    pub isolation: IsolationConfig,
    pub clean: CleanConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            package: "ki".to_string(),
            python: "python".to_string(),
            project_root: PathBuf::from("."),
            dev_requirements: PathBuf::from("requirements-dev.txt"),
            test_tools: vec!["pytest".to_string(), "wheel".to_string()],
            pytest_args: vec!["-vv".to_string()],
            groups: TestGroup::defaults(),
            identity: GitIdentity::default(),
            docs: DocsConfig::default(),
            coverage: CoverageConfig::default(),
            isolation: IsolationConfig::default(),
            clean: CleanConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn with_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_groups(mut self, groups: Vec<TestGroup>) -> Self {
        self.groups = groups;
        self
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml(raw: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration
    ///
    /// An explicit path (argument or `HARNESS_CONFIG`) must exist. Otherwise
    /// `harness.toml` in the working directory is used when present, and the
    /// built-in defaults when it is not.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let path = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => path,
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.exists() {
                    debug!("no {} found; using defaults", CONFIG_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };

        debug!("loading configuration from {}", path.display());
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            })
        };

        if self.package.trim().is_empty() {
            return invalid("package cannot be empty");
        }
        if self.python.trim().is_empty() {
            return invalid("python cannot be empty");
        }
        if self.groups.is_empty() {
            return invalid("at least one test group is required");
        }

        let mut names = HashSet::new();
        for group in &self.groups {
            if group.files.is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("test group '{}' has no files", group.name),
                });
            }
            if group.timeout_secs == Some(0) {
                return Err(ConfigError::Invalid {
                    message: format!("test group '{}' has a zero timeout", group.name),
                });
            }
            if !names.insert(group.name.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!("duplicate test group '{}'", group.name),
                });
            }
        }

        if self.docs.generator.trim().is_empty() || self.coverage.program.trim().is_empty() {
            return invalid("tool programs cannot be empty");
        }
        if self.docs.transient_dir.as_os_str().is_empty()
            || self.docs.output_dir.as_os_str().is_empty()
        {
            return invalid("documentation directories cannot be empty");
        }

        MarkerRules::new(
            self.isolation.marker.clone(),
            &self.isolation.declaration_pattern,
        )
        .map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })?;

        Ok(())
    }

    /// Interpret `path` relative to the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn groups_for(&self, label: PhaseLabel) -> Vec<&TestGroup> {
        self.groups.iter().filter(|g| g.label == label).collect()
    }

    /// Isolation settings with the tests directory anchored at the project root
    pub fn isolation_config(&self) -> IsolationConfig {
        let mut config = self.isolation.clone();
        config.tests_dir = self.resolve(&self.isolation.tests_dir);
        config
    }
}
