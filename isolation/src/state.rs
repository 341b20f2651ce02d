use crate::IsolationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Recorded isolation status of a test directory
///
/// `depth` counts `isolate` runs minus `unisolate` runs. Anything other than
/// 0 or 1 means the tree can no longer be restored by one `unisolate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolationState {
    pub depth: u32,
    pub updated_at: Option<DateTime<Utc>>,
    /// Files rewritten by the most recent toggle
    pub files: Vec<PathBuf>,
}

impl IsolationState {
    pub fn is_isolated(&self) -> bool {
        self.depth > 0
    }

    pub fn is_consistent(&self) -> bool {
        self.depth <= 1
    }

    /// Load the state file; a missing file means "never isolated"
    pub fn load(path: &Path) -> IsolationResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> IsolationResult<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw + "\n")?;
        Ok(())
    }

    pub(crate) fn record(&mut self, depth: u32, files: Vec<PathBuf>) {
        self.depth = depth;
        self.files = files;
        self.updated_at = Some(Utc::now());
    }
}
