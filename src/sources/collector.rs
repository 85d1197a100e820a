use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use super::SourceRepository;

/// Clones source repositories into a shared parent directory
#[derive(Debug, Clone)]
pub struct SourceCollector {
    clone_root: PathBuf,
}

impl SourceCollector {
    #[inline]
    pub fn new(clone_root: impl Into<PathBuf>) -> Self {
        Self {
            clone_root: clone_root.into(),
        }
    }

    #[inline]
    pub fn repository_path(&self, repo: &SourceRepository) -> PathBuf {
        self.clone_root.join(&repo.name)
    }

    /// Clone the repository unless its directory already exists
    ///
    /// Returns the local checkout path. An existing directory is trusted as-is.
    #[inline]
    pub fn ensure_cloned(&self, repo: &SourceRepository) -> Result<PathBuf> {
        let repo_path = self.repository_path(repo);

        if repo_path.exists() {
            info!(
                "Repository {} already exists in {}",
                repo.name,
                repo_path.display()
            );
            return Ok(repo_path);
        }

        std::fs::create_dir_all(&self.clone_root).with_context(|| {
            format!(
                "Failed to create clone directory: {}",
                self.clone_root.display()
            )
        })?;

        info!(
            "Cloning {} from {} into {}",
            repo.name,
            repo.url,
            repo_path.display()
        );
        run_git_clone(&repo.url, &repo_path)?;

        Ok(repo_path)
    }
}

fn run_git_clone(url: &str, destination: &Path) -> Result<()> {
    if url.chars().any(char::is_whitespace) {
        bail!("Repository URL must not contain whitespace: {url:?}");
    }

    let status = Command::new("git")
        .arg("clone")
        .arg("--depth=1")
        .arg(url)
        .arg(destination)
        .status()
        .context("Failed to run git")?;

    if !status.success() {
        // A failed clone can leave a partial checkout that would be skipped next time
        let _ = std::fs::remove_dir_all(destination);
        bail!(
            "git clone of {} failed with exit code: {}",
            url,
            status.code().unwrap_or(-1)
        );
    }

    debug!("Clone of {} finished", url);
    Ok(())
}
