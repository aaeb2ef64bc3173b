//! Setup stage: source tree resolution.
//!
//! The setup stage obtains the source tree at the triggering commit and
//! derives the run's version string from its hash. A checkout failure is
//! fatal for the whole run; no build job starts.

use shipit_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// A resolved source tree: the build context for every component job.
#[derive(Debug, Clone)]
pub struct SourceTree {
    pub root: PathBuf,
    /// Full commit SHA at the tree's HEAD.
    pub sha: String,
}

impl SourceTree {
    /// Resolve an existing working copy.
    pub fn resolve(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::Checkout(format!(
                "source directory {} does not exist",
                root.display()
            )));
        }

        let sha = run_git(root, &["rev-parse", "HEAD"])?;
        if sha.is_empty() {
            return Err(Error::Checkout(format!(
                "{} has no commit at HEAD",
                root.display()
            )));
        }

        Ok(Self {
            root: root.to_path_buf(),
            sha,
        })
    }
}

fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| Error::Checkout(format!("failed to run git: {}", e)))?;

    if !output.status.success() {
        return Err(Error::Checkout(format!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Create a throwaway git repository with one commit.
    pub(crate) fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .status()
                .unwrap();
            assert!(status.success(), "git {:?} failed", args);
        };
        run(&["init", "-q"]);
        run(&["config", "user.email", "ci@example.com"]);
        run(&["config", "user.name", "ci"]);
        fs::write(dir.path().join("Dockerfile.api"), "FROM alpine").unwrap();
        fs::write(dir.path().join("Dockerfile.queue"), "FROM alpine").unwrap();
        fs::write(dir.path().join("Dockerfile.ui"), "FROM alpine").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "initial"]);
        dir
    }

    #[test]
    fn test_resolve_returns_full_sha() {
        let repo = init_repo();
        let tree = SourceTree::resolve(repo.path()).unwrap();
        assert_eq!(tree.sha.len(), 40);
        assert!(tree.sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_resolve_missing_dir_is_checkout_error() {
        let result = SourceTree::resolve(Path::new("/nonexistent/repo"));
        assert!(matches!(result, Err(Error::Checkout(_))));
    }

    #[test]
    fn test_resolve_non_repo_is_checkout_error() {
        let dir = TempDir::new().unwrap();
        let result = SourceTree::resolve(dir.path());
        assert!(matches!(result, Err(Error::Checkout(_))));
    }
}
