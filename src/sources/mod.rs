// Source collection module
// Knows which repositories feed the index and turns their files and issues into documents

pub mod collector;
pub mod github;
pub mod loader;


use std::collections::BTreeMap;
use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};

pub use collector::SourceCollector;
pub use github::IssueClient;
pub use loader::DocumentLoader;

/// Metadata key holding the file path or issue URL of a document
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the repository name a document came from
pub const REPOSITORY_KEY: &str = "repository";

static GITHUB_SLUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com/([^/]+/[^/]+)\.git").expect("slug pattern is valid")
});

/// A unit of source text, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    #[inline]
    pub fn new(content: impl Into<String>, metadata: BTreeMap<String, String>) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    #[inline]
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }

    #[inline]
    pub fn repository(&self) -> Option<&str> {
        self.metadata.get(REPOSITORY_KEY).map(String::as_str)
    }
}

/// A (subdirectory, glob) pair selecting files inside a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTarget {
    /// Path relative to the repository root; "." is the root itself
    pub subpath: String,
    pub pattern: String,
}

impl LoadTarget {
    #[inline]
    pub fn new(subpath: &str, pattern: &str) -> Self {
        Self {
            subpath: subpath.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRepository {
    pub name: String,
    pub url: String,
    pub targets: Vec<LoadTarget>,
}

impl SourceRepository {
    /// `owner/name` parsed out of a GitHub clone URL
    #[inline]
    pub fn github_slug(&self) -> Option<String> {
        github_slug(&self.url)
    }
}

#[inline]
pub fn github_slug(url: &str) -> Option<String> {
    GITHUB_SLUG_RE
        .captures(url)
        .ok()
        .flatten()
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// The repositories the bot knows about, with their docs and code targets
#[inline]
pub fn default_repositories() -> Vec<SourceRepository> {
    vec![
        SourceRepository {
            name: "pypsa".to_string(),
            url: "https://github.com/PyPSA/pypsa.git".to_string(),
            targets: vec![
                LoadTarget::new("docs", "**/*.md"),
                LoadTarget::new("test", "**/*.py"),
                LoadTarget::new("pypsa", "**/*.py"),
                LoadTarget::new(".", "**/*.y*ml"),
            ],
        },
        SourceRepository {
            name: "pypsa-eur".to_string(),
            url: "https://github.com/PyPSA/pypsa-eur.git".to_string(),
            targets: vec![
                LoadTarget::new("doc", "**/*.rst"),
                LoadTarget::new("scripts", "**/*.py"),
                LoadTarget::new(".", "**/*.y*ml"),
            ],
        },
        SourceRepository {
            name: "pypsa-earth".to_string(),
            url: "https://github.com/pypsa-meets-earth/pypsa-earth.git".to_string(),
            targets: vec![
                LoadTarget::new("doc", "**/*.rst"),
                LoadTarget::new("scripts", "**/*.py"),
                LoadTarget::new(".", "**/*.y*ml"),
            ],
        },
    ]
}
