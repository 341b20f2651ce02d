//! Static documentation generation.
//!
//! The generator writes into a transient directory (`html/<package>/`). Its
//! contents are copied over the persistent documentation directory and the
//! transient directory is removed. The copy is additive: files that the
//! generator stopped producing stay in place until `clean` runs.

use crate::config::HarnessConfig;
use runner::{run_checked, CommandRunner, CommandSpec, RunnerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum DocsError {
    #[error("Documentation generator failed: {0}")]
    Generator(#[from] RunnerError),
    #[error("Generator produced no output at {}", .path.display())]
    MissingOutput { path: PathBuf },
    #[error("Failed to walk generated output: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocsError {
    pub fn exit_code(&self) -> i32 {
        match self {
            DocsError::Generator(source) => source.exit_code(),
            _ => 1,
        }
    }
}

pub type DocsResult<T> = Result<T, DocsError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    pub generator: String,
    /// Template directory handed to the generator
    pub template_dir: PathBuf,
    /// Persistent, version-controlled documentation directory
    pub output_dir: PathBuf,
    /// Scratch directory the generator writes into
    pub transient_dir: PathBuf,
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            generator: "pdoc".to_string(),
            template_dir: PathBuf::from("docs/template"),
            output_dir: PathBuf::from("docs"),
            transient_dir: PathBuf::from("html"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocsReport {
    /// Directory the generator wrote into
    pub generated: PathBuf,
    /// Persistent documentation directory
    pub output: PathBuf,
    /// Files written into the persistent directory, relative to it
    pub copied: Vec<PathBuf>,
    /// Nothing was copied or removed
    pub dry_run: bool,
}

pub struct DocumentationBuilder<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a HarnessConfig,
    dry_run: bool,
}

impl<'a> DocumentationBuilder<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a HarnessConfig) -> Self {
        Self {
            runner,
            config,
            dry_run: false,
        }
    }

    /// Hand the generator to the runner but leave the filesystem alone
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn generate_command(&self) -> CommandSpec {
        let docs = &self.config.docs;
        CommandSpec::new(&docs.generator)
            .args(["--html", self.config.package.as_str(), "--template-dir"])
            .path_arg(&docs.template_dir)
            .arg("--force")
            .current_dir(&self.config.project_root)
    }

    /// Directory holding the generated pages for the package
    pub fn generated_dir(&self) -> PathBuf {
        self.config
            .resolve(&self.config.docs.transient_dir)
            .join(&self.config.package)
    }

    pub async fn build(&self) -> DocsResult<DocsReport> {
        run_checked(self.runner, &self.generate_command(), None).await?;

        let generated = self.generated_dir();
        let output = self.config.resolve(&self.config.docs.output_dir);
        let transient = self.config.resolve(&self.config.docs.transient_dir);

        if self.dry_run {
            info!(
                "dry run: would copy {} into {} and remove {}",
                generated.display(),
                output.display(),
                transient.display()
            );
            return Ok(DocsReport {
                generated,
                output,
                copied: Vec::new(),
                dry_run: true,
            });
        }

        if !generated.is_dir() {
            return Err(DocsError::MissingOutput { path: generated });
        }

        let copied = copy_tree(&generated, &output)?;

        fs::remove_dir_all(&transient)?;
        debug!("removed {}", transient.display());

        info!(
            files = copied.len(),
            "documentation written to {}",
            output.display()
        );
        Ok(DocsReport {
            generated,
            output,
            copied,
            dry_run: false,
        })
    }
}

/// Copy every file under `from` into `to`, overwriting same-named files and
/// leaving everything else in `to` untouched
fn copy_tree(from: &Path, to: &Path) -> DocsResult<Vec<PathBuf>> {
    fs::create_dir_all(to)?;
    let mut copied = Vec::new();

    for entry in WalkDir::new(from).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(entry.file_name()));
        let target = to.join(&relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied.push(relative);
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner::RecordingRunner;
    use tempfile::TempDir;

    fn fake_pdoc(root: PathBuf) -> RecordingRunner {
        RecordingRunner::new().on_run("pdoc", move |_| {
            let out = root.join("html").join("ki");
            fs::create_dir_all(out.join("sub")).unwrap();
            fs::write(out.join("index.html"), "<h1>ki</h1>").unwrap();
            fs::write(out.join("sub").join("types.html"), "<h1>types</h1>").unwrap();
        })
    }

    fn config(root: &Path) -> HarnessConfig {
        HarnessConfig::default().with_project_root(root)
    }

    #[test]
    fn test_generate_command() {
        let config = HarnessConfig::default();
        let runner = RecordingRunner::new();
        let builder = DocumentationBuilder::new(&runner, &config);
        assert_eq!(
            builder.generate_command().command_line(),
            "pdoc --html ki --template-dir docs/template --force"
        );
    }

    #[tokio::test]
    async fn test_build_copies_and_removes_transient() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let runner = fake_pdoc(dir.path().to_path_buf());

        let report = DocumentationBuilder::new(&runner, &config)
            .build()
            .await
            .unwrap();

        assert_eq!(report.copied.len(), 2);
        assert!(dir.path().join("docs/index.html").is_file());
        assert!(dir.path().join("docs/sub/types.html").is_file());
        assert!(!dir.path().join("html").exists());
    }

    #[tokio::test]
    async fn test_copy_is_additive() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/stale.html"), "old").unwrap();
        fs::write(dir.path().join("docs/index.html"), "old").unwrap();
        let config = config(dir.path());
        let runner = fake_pdoc(dir.path().to_path_buf());

        DocumentationBuilder::new(&runner, &config)
            .build()
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("docs/stale.html")).unwrap(),
            "old"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("docs/index.html")).unwrap(),
            "<h1>ki</h1>"
        );
    }

    #[tokio::test]
    async fn test_missing_output_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let runner = RecordingRunner::new();

        let err = DocumentationBuilder::new(&runner, &config)
            .build()
            .await
            .unwrap_err();
        assert!(matches!(err, DocsError::MissingOutput { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_plans_without_touching_files() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let runner = RecordingRunner::new();

        let report = DocumentationBuilder::new(&runner, &config)
            .with_dry_run(true)
            .build()
            .await
            .unwrap();

        assert!(report.dry_run);
        assert!(report.copied.is_empty());
        assert_eq!(report.generated, dir.path().join("html").join("ki"));
        assert_eq!(report.output, dir.path().join("docs"));
        assert_eq!(
            runner.command_lines(),
            vec!["pdoc --html ki --template-dir docs/template --force"]
        );
        assert!(!dir.path().join("docs").exists());
    }

    #[tokio::test]
    async fn test_generator_failure_keeps_docs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/index.html"), "old").unwrap();
        let config = config(dir.path());
        let runner = RecordingRunner::new().fail_when("pdoc", 1);

        let err = DocumentationBuilder::new(&runner, &config)
            .build()
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("docs/index.html")).unwrap(),
            "old"
        );
    }
}
