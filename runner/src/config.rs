use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Working directory used when a command does not set its own
    pub working_dir: Option<PathBuf>,
    /// Stream child stdout/stderr to the terminal instead of discarding it
    pub inherit_output: bool,
    /// Environment applied to every command before the command's own variables
    pub base_env: BTreeMap<String, String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            inherit_output: true,
            base_env: BTreeMap::new(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_inherit_output(mut self, inherit: bool) -> Self {
        self.inherit_output = inherit;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_env.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(dir) = &self.working_dir {
            if dir.as_os_str().is_empty() {
                return Err("Working directory cannot be empty".to_string());
            }
        }

        if self.base_env.keys().any(|k| k.is_empty() || k.contains('=')) {
            return Err("Environment variable names must be non-empty and contain no '='".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert!(config.working_dir.is_none());
        assert!(config.inherit_output);
        assert!(config.base_env.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RunnerConfig::new()
            .with_working_dir("/repo")
            .with_inherit_output(false)
            .with_env("PYTHONUNBUFFERED", "1");
        assert_eq!(config.working_dir, Some(PathBuf::from("/repo")));
        assert!(!config.inherit_output);
        assert_eq!(config.base_env.len(), 1);
    }

    #[test]
    fn test_validation() {
        let config = RunnerConfig::new().with_working_dir("");
        assert!(config.validate().is_err());

        let config = RunnerConfig::new().with_env("A=B", "1");
        assert!(config.validate().is_err());

        let config = RunnerConfig::new().with_env("", "1");
        assert!(config.validate().is_err());
    }
}
