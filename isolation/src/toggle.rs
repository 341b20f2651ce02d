use crate::state::IsolationState;
use crate::transform::{MarkerRules, DEFAULT_DECLARATION_PATTERN, DEFAULT_MARKER};
use crate::{IsolationError, IsolationResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    /// Directory holding the test sources
    pub tests_dir: PathBuf,
    /// Glob, relative to `tests_dir`, selecting the files to rewrite
    pub file_pattern: String,
    /// Marker line inserted above each declaration
    pub marker: String,
    /// Regex identifying a test declaration line
    pub declaration_pattern: String,
    /// State file name, relative to `tests_dir`
    pub state_file: String,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            tests_dir: PathBuf::from("tests"),
            file_pattern: "*.py".to_string(),
            marker: DEFAULT_MARKER.to_string(),
            declaration_pattern: DEFAULT_DECLARATION_PATTERN.to_string(),
            state_file: ".isolation.json".to_string(),
        }
    }
}

impl IsolationConfig {
    pub fn with_tests_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tests_dir = dir.into();
        self
    }
}

/// How precondition violations are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToggleMode {
    /// Rewrite regardless and log a warning
    #[default]
    Permissive,
    /// Refuse to rewrite when the recorded state says it would corrupt the tree
    Checked,
}

#[derive(Debug, Clone)]
pub struct ToggleReport {
    pub files_changed: Vec<PathBuf>,
    pub markers: usize,
    pub state: IsolationState,
}

pub struct IsolationToggle {
    config: IsolationConfig,
    rules: MarkerRules,
}

impl IsolationToggle {
    pub fn new(config: IsolationConfig) -> IsolationResult<Self> {
        let rules = MarkerRules::new(config.marker.clone(), &config.declaration_pattern)?;
        Ok(Self { config, rules })
    }

    pub fn config(&self) -> &IsolationConfig {
        &self.config
    }

    pub fn state_path(&self) -> PathBuf {
        self.config.tests_dir.join(&self.config.state_file)
    }

    pub fn state(&self) -> IsolationResult<IsolationState> {
        IsolationState::load(&self.state_path())
    }

    /// Test files matched by the configured glob, sorted
    pub fn test_files(&self) -> IsolationResult<Vec<PathBuf>> {
        if !self.config.tests_dir.is_dir() {
            return Err(IsolationError::MissingTestsDir {
                path: self.config.tests_dir.clone(),
            });
        }

        let pattern = format!(
            "{}/{}",
            glob::Pattern::escape(&self.config.tests_dir.to_string_lossy()),
            self.config.file_pattern
        );
        let mut files = Vec::new();
        for entry in glob::glob(&pattern)? {
            let path = entry.map_err(|e| IsolationError::Io(e.into_error()))?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn isolate(&self, mode: ToggleMode) -> IsolationResult<ToggleReport> {
        let state = self.state()?;
        if state.is_isolated() {
            if mode == ToggleMode::Checked {
                return Err(IsolationError::AlreadyIsolated { depth: state.depth });
            }
            warn!(
                depth = state.depth,
                "tests are already isolated; a single unisolate will no longer restore them"
            );
        }

        let (files, markers) = self.rewrite(|source| self.rules.isolate(source))?;
        let depth = state.depth.saturating_add(1);
        self.finish(state, depth, files, markers)
    }

    pub fn unisolate(&self, mode: ToggleMode) -> IsolationResult<ToggleReport> {
        let state = self.state()?;
        if !state.is_isolated() {
            if mode == ToggleMode::Checked {
                return Err(IsolationError::NotIsolated);
            }
            warn!("tests are not recorded as isolated; removing any markers found anyway");
        }

        let (files, markers) = self.rewrite(|source| self.rules.unisolate(source))?;
        let depth = state.depth.saturating_sub(1);
        self.finish(state, depth, files, markers)
    }

    fn rewrite<F>(&self, transform: F) -> IsolationResult<(Vec<PathBuf>, usize)>
    where
        F: Fn(&str) -> (String, usize),
    {
        let mut changed = Vec::new();
        let mut total = 0;

        for path in self.test_files()? {
            let source = fs::read_to_string(&path)?;
            let (rewritten, count) = transform(&source);
            if count == 0 {
                debug!("{}: no declarations touched", path.display());
                continue;
            }
            fs::write(&path, rewritten)?;
            debug!("{}: {} marker(s)", path.display(), count);
            total += count;
            changed.push(path);
        }

        Ok((changed, total))
    }

    fn finish(
        &self,
        mut state: IsolationState,
        depth: u32,
        files: Vec<PathBuf>,
        markers: usize,
    ) -> IsolationResult<ToggleReport> {
        state.record(depth, files.clone());
        state.save(&self.state_path())?;
        info!(
            files = files.len(),
            markers,
            depth,
            "isolation state updated in {}",
            self.config.tests_dir.display()
        );
        Ok(ToggleReport {
            files_changed: files,
            markers,
            state,
        })
    }
}
