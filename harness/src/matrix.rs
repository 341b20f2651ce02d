//! CI matrix model.
//!
//! A matrix cell is one (operating system, interpreter version) pair. The CI
//! workflow runs every cell as an independent job on its own machine, so
//! nothing here is shared between cells.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Linux,
    Macos,
    Windows,
}

impl OperatingSystem {
    pub const ALL: [OperatingSystem; 3] = [
        OperatingSystem::Linux,
        OperatingSystem::Macos,
        OperatingSystem::Windows,
    ];

    /// Hosted runner image label used by the workflow
    pub fn runner_label(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "ubuntu-latest",
            OperatingSystem::Macos => "macos-latest",
            OperatingSystem::Windows => "windows-latest",
        }
    }

    /// The operating system this binary was compiled for; other Unix
    /// flavours are provisioned like Linux
    pub fn host() -> Self {
        if cfg!(windows) {
            OperatingSystem::Windows
        } else if cfg!(target_os = "macos") {
            OperatingSystem::Macos
        } else {
            OperatingSystem::Linux
        }
    }

    pub fn is_posix(&self) -> bool {
        !matches!(self, OperatingSystem::Windows)
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingSystem::Linux => write!(f, "linux"),
            OperatingSystem::Macos => write!(f, "macos"),
            OperatingSystem::Windows => write!(f, "windows"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum InterpreterVersion {
    #[serde(rename = "3.9")]
    #[value(name = "3.9")]
    Py39,
    #[serde(rename = "3.10")]
    #[value(name = "3.10")]
    Py310,
}

impl InterpreterVersion {
    pub const ALL: [InterpreterVersion; 2] = [InterpreterVersion::Py39, InterpreterVersion::Py310];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterpreterVersion::Py39 => "3.9",
            InterpreterVersion::Py310 => "3.10",
        }
    }
}

impl fmt::Display for InterpreterVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatrixCell {
    pub os: OperatingSystem,
    pub python: InterpreterVersion,
}

impl MatrixCell {
    pub fn new(os: OperatingSystem, python: InterpreterVersion) -> Self {
        Self { os, python }
    }

    /// Stable identifier such as `linux-py3.10`
    pub fn id(&self) -> String {
        format!("{}-py{}", self.os, self.python)
    }
}

impl fmt::Display for MatrixCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / python {}", self.os.runner_label(), self.python)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    pub operating_systems: Vec<OperatingSystem>,
    pub python_versions: Vec<InterpreterVersion>,
}

impl Matrix {
    /// The push-triggered workflow matrix
    pub fn ci() -> Self {
        Self {
            operating_systems: OperatingSystem::ALL.to_vec(),
            python_versions: InterpreterVersion::ALL.to_vec(),
        }
    }

    /// Cells in workflow order: operating system major, interpreter minor
    pub fn cells(&self) -> Vec<MatrixCell> {
        self.operating_systems
            .iter()
            .flat_map(|os| {
                self.python_versions
                    .iter()
                    .map(move |python| MatrixCell::new(*os, *python))
            })
            .collect()
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::ci()
    }
}
