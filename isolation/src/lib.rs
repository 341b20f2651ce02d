//! Bulk enable/disable of a Python test suite
//!
//! This crate rewrites every test file of a directory so that each test
//! declaration is preceded by a skip marker (`isolate`), or removes those
//! markers again (`unisolate`). The rewrite is purely textual. A small JSON
//! state file next to the tests records how many times the tree has been
//! isolated so callers can detect a tree that one `unisolate` cannot restore.

use std::path::PathBuf;
use thiserror::Error;

pub mod state;
pub mod toggle;
pub mod transform;

pub use state::IsolationState;
pub use toggle::{IsolationConfig, IsolationToggle, ToggleMode, ToggleReport};
pub use transform::{MarkerRules, DEFAULT_DECLARATION_PATTERN, DEFAULT_MARKER};

/// Errors related to test isolation
#[derive(Error, Debug)]
pub enum IsolationError {
    #[error("Tests directory not found: {}", .path.display())]
    MissingTestsDir { path: PathBuf },
    #[error("Invalid skip marker: {marker:?}")]
    InvalidMarker { marker: String },
    #[error("Invalid declaration pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("Invalid file pattern: {0}")]
    Glob(#[from] glob::PatternError),
    #[error("Tests are already isolated (depth {depth}); run unisolate first")]
    AlreadyIsolated { depth: u32 },
    #[error("Tests are not isolated; nothing to unisolate")]
    NotIsolated,
    #[error("State file error: {0}")]
    State(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IsolationResult<T> = Result<T, IsolationError>;
