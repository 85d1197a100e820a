
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::{Document, LoadTarget, REPOSITORY_KEY, SOURCE_KEY, SourceRepository};

/// Anything that can turn a repository's issue tracker into documents
pub trait IssueSource: Send + Sync {
    fn fetch_issues(&self, repo_name: &str, slug: &str) -> Result<Vec<Document>>;
}

/// Counts reported after loading one repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub file_documents: usize,
    pub issue_documents: usize,
    pub skipped_targets: usize,
    pub skipped_files: usize,
}

/// Loads text files and issue threads as documents
#[derive(Default)]
pub struct DocumentLoader {
    issues: Option<Box<dyn IssueSource>>,
}

impl std::fmt::Debug for DocumentLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentLoader")
            .field("issues", &self.issues.is_some())
            .finish()
    }
}

impl DocumentLoader {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_issue_source(mut self, source: Box<dyn IssueSource>) -> Self {
        self.issues = Some(source);
        self
    }

    /// Load every target of a repository checkout, followed by its issues
    ///
    /// Missing subdirectories, unreadable files and issue-tracker failures are
    /// logged and skipped; they never abort the load.
    #[inline]
    pub fn load_repository(
        &self,
        repo: &SourceRepository,
        repo_path: &Path,
    ) -> (Vec<Document>, LoadStats) {
        let mut documents = Vec::new();
        let mut stats = LoadStats::default();

        for target in &repo.targets {
            let target_path = resolve_target_path(repo_path, target);
            if !target_path.exists() {
                warn!(
                    "Path '{}' not found for repo '{}'. Skipping.",
                    target_path.display(),
                    repo.name
                );
                stats.skipped_targets += 1;
                continue;
            }

            info!(
                "Loading files from '{}' with pattern '{}'",
                target_path.display(),
                target.pattern
            );
            match load_target(&target_path, &target.pattern, &repo.name) {
                Ok((target_docs, skipped)) => {
                    info!("Loaded {} documents from this target", target_docs.len());
                    stats.file_documents += target_docs.len();
                    stats.skipped_files += skipped;
                    documents.extend(target_docs);
                }
                Err(e) => {
                    warn!(
                        "Failed to load target '{}' of repo '{}': {:#}",
                        target_path.display(),
                        repo.name,
                        e
                    );
                    stats.skipped_targets += 1;
                }
            }
        }

        if let Some(issue_source) = &self.issues {
            let issue_docs = load_issues(issue_source.as_ref(), repo);
            stats.issue_documents = issue_docs.len();
            documents.extend(issue_docs);
        }

        (documents, stats)
    }
}

fn load_issues(source: &dyn IssueSource, repo: &SourceRepository) -> Vec<Document> {
    let Some(slug) = repo.github_slug() else {
        warn!(
            "Could not parse owner/repo from URL: {}. Skipping issues.",
            repo.url
        );
        return Vec::new();
    };

    info!("Fetching issues and pull requests for {} from {}", repo.name, slug);
    match source.fetch_issues(&repo.name, &slug) {
        Ok(docs) => {
            info!("Loaded {} issues and PRs from {}", docs.len(), repo.name);
            docs
        }
        Err(e) => {
            warn!("Error fetching issues for {}: {:#}", repo.name, e);
            Vec::new()
        }
    }
}

fn resolve_target_path(repo_path: &Path, target: &LoadTarget) -> PathBuf {
    if target.subpath.is_empty() || target.subpath == "." {
        repo_path.to_path_buf()
    } else {
        repo_path.join(&target.subpath)
    }
}

/// List files under `root` matching `pattern`, in sorted path order
///
/// Hidden files and anything inside hidden directories are excluded.
#[inline]
pub fn list_matching_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let full_pattern = format!("{}/{}", escaped_root.trim_end_matches('/'), pattern);

    let mut files = Vec::new();
    for entry in glob::glob(&full_pattern)
        .with_context(|| format!("Invalid glob pattern: {}", full_pattern))?
    {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping unreadable path: {}", e);
                continue;
            }
        };

        if !path.is_file() || is_hidden(root, &path) {
            continue;
        }
        files.push(path);
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn is_hidden(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|component| match component {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        })
}

fn load_target(root: &Path, pattern: &str, repo_name: &str) -> Result<(Vec<Document>, usize)> {
    let files = list_matching_files(root, pattern)?;
    let mut documents = Vec::with_capacity(files.len());
    let mut skipped = 0;

    for path in files {
        match fs::read_to_string(&path) {
            Ok(content) => {
                let mut metadata = BTreeMap::new();
                metadata.insert(SOURCE_KEY.to_string(), path.display().to_string());
                metadata.insert(REPOSITORY_KEY.to_string(), repo_name.to_string());
                documents.push(Document::new(content, metadata));
            }
            Err(e) => {
                debug!("Skipping {}: {}", path.display(), e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!(
            "Skipped {} unreadable files under {}",
            skipped,
            root.display()
        );
    }

    Ok((documents, skipped))
}
