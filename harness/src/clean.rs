use crate::config::HarnessConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum CleanError {
    #[error("Invalid clean pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("Failed to read {}: {}", .0.path().display(), .0.error())]
    Glob(#[from] glob::GlobError),
    #[error("Failed to walk the docs directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type CleanResult<T> = Result<T, CleanError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// Additional globs, relative to the project root unless absolute
    pub extra_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CleanReport {
    pub removed: Vec<PathBuf>,
}

/// Absolute globs removed by `clean` besides the generated pages: the
/// transient docs directory, package metadata, pytest cache, coverage
/// report and database
pub fn clean_patterns(config: &HarnessConfig) -> Vec<String> {
    let escape = |p: &Path| glob::Pattern::escape(&p.to_string_lossy());
    let resolved = |p: &PathBuf| escape(&config.resolve(p));
    let root = escape(&config.project_root);

    let mut patterns = vec![
        resolved(&config.docs.transient_dir),
        format!("{}/*.egg-info", root),
        format!("{}/.pytest_cache", root),
        resolved(&config.coverage.html_dir),
        resolved(&config.coverage.database),
    ];
    patterns.extend(config.clean.extra_patterns.iter().map(|extra| {
        if Path::new(extra).is_absolute() {
            extra.clone()
        } else {
            format!("{}/{}", root, extra)
        }
    }));
    patterns
}

/// HTML pages anywhere under the docs directory, outside the template directory
fn generated_pages(config: &HarnessConfig) -> CleanResult<Vec<PathBuf>> {
    let output = config.resolve(&config.docs.output_dir);
    if !output.is_dir() {
        return Ok(Vec::new());
    }
    let template = config.resolve(&config.docs.template_dir);

    let mut pages = Vec::new();
    let walker = WalkDir::new(&output)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.path() != template);
    for entry in walker {
        let entry = entry?;
        let is_html = entry.path().extension().is_some_and(|ext| ext == "html");
        if entry.file_type().is_file() && is_html {
            pages.push(entry.into_path());
        }
    }
    Ok(pages)
}

/// Every existing path `clean` would remove
pub fn clean_targets(config: &HarnessConfig) -> CleanResult<Vec<PathBuf>> {
    let mut targets = generated_pages(config)?;
    for pattern in clean_patterns(config) {
        for entry in glob::glob(&pattern)? {
            let path = entry?;
            if !targets.contains(&path) {
                targets.push(path);
            }
        }
    }
    Ok(targets)
}

pub fn clean(config: &HarnessConfig) -> CleanResult<CleanReport> {
    let mut removed = Vec::new();

    for path in clean_targets(config)? {
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                debug!("removed {}", path.display());
                removed.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(CleanError::Remove { path, source }),
        }
    }

    prune_emptied_dirs(config, &removed)?;

    info!(count = removed.len(), "clean finished");
    Ok(CleanReport { removed })
}

/// Drop subdirectories of the docs directory that only held removed pages
fn prune_emptied_dirs(config: &HarnessConfig, removed: &[PathBuf]) -> CleanResult<()> {
    let output = config.resolve(&config.docs.output_dir);
    for path in removed {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == output || !current.starts_with(&output) {
                break;
            }
            let empty = match fs::read_dir(current) {
                Ok(mut entries) => entries.next().is_none(),
                Err(_) => false,
            };
            if !empty {
                break;
            }
            fs::remove_dir(current).map_err(|source| CleanError::Remove {
                path: current.to_path_buf(),
                source,
            })?;
            debug!("removed empty {}", current.display());
            dir = current.parent();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &std::path::Path, rel: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_clean_removes_generated_artifacts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "docs/index.html");
        touch(root, "docs/ki.html");
        touch(root, "docs/template/module.html.jinja2");
        touch(root, "docs/README.md");
        touch(root, "ki.egg-info/PKG-INFO");
        touch(root, ".pytest_cache/v/cache/nodeids");
        touch(root, "htmlcov/index.html");
        touch(root, ".coverage");
        touch(root, "html/ki/index.html");

        let config = HarnessConfig::default().with_project_root(root);
        let report = clean(&config).unwrap();

        assert_eq!(report.removed.len(), 7);
        assert!(!root.join("docs/index.html").exists());
        assert!(!root.join("docs/ki.html").exists());
        assert!(!root.join("ki.egg-info").exists());
        assert!(!root.join(".pytest_cache").exists());
        assert!(!root.join("htmlcov").exists());
        assert!(!root.join(".coverage").exists());
        assert!(!root.join("html").exists());
        assert!(root.join("docs/template/module.html.jinja2").exists());
        assert!(root.join("docs/README.md").exists());
    }

    #[test]
    fn test_clean_on_empty_tree() {
        let dir = TempDir::new().unwrap();
        let config = HarnessConfig::default().with_project_root(dir.path());
        let report = clean(&config).unwrap();
        assert!(report.removed.is_empty());
    }

    #[test]
    fn test_extra_patterns() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "build/lib/ki.py");
        let mut config = HarnessConfig::default().with_project_root(dir.path());
        config.clean.extra_patterns.push("build".to_string());

        let report = clean(&config).unwrap();
        assert_eq!(report.removed, vec![dir.path().join("build")]);
    }

    #[test]
    fn test_nested_pages_removed_template_kept() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "docs/index.html");
        touch(root, "docs/sub/types.html");
        touch(root, "docs/sub/deeper/parser.html");
        touch(root, "docs/guide/notes.md");
        touch(root, "docs/guide/page.html");
        touch(root, "docs/template/module.html.jinja2");
        touch(root, "docs/template/partials/head.html");

        let config = HarnessConfig::default().with_project_root(root);
        let report = clean(&config).unwrap();

        assert_eq!(report.removed.len(), 4);
        assert!(!root.join("docs/sub").exists());
        assert!(!root.join("docs/guide/page.html").exists());
        assert!(root.join("docs/guide/notes.md").exists());
        assert!(root.join("docs/template/module.html.jinja2").exists());
        assert!(root.join("docs/template/partials/head.html").exists());
    }

    #[test]
    fn test_absolute_paths_are_honoured() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        touch(outside.path(), "cov/index.html");
        touch(outside.path(), "site/index.html");

        let mut config = HarnessConfig::default().with_project_root(dir.path());
        config.coverage.html_dir = outside.path().join("cov");
        config.docs.output_dir = outside.path().join("site");

        let targets = clean_targets(&config).unwrap();
        assert!(targets.contains(&outside.path().join("cov")));
        assert!(targets.contains(&outside.path().join("site/index.html")));

        clean(&config).unwrap();
        assert!(!outside.path().join("cov").exists());
        assert!(!outside.path().join("site/index.html").exists());
        assert!(outside.path().join("site").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_an_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        touch(dir.path(), "locked/stale.txt");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // permissions are not enforced for this user
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let mut config = HarnessConfig::default().with_project_root(dir.path());
        config.clean.extra_patterns.push("locked/*".to_string());
        let result = clean(&config);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(CleanError::Glob(_))));
        assert!(locked.join("stale.txt").exists());
    }
}
