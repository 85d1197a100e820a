#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::loader::IssueSource;
use super::{Document, REPOSITORY_KEY, SOURCE_KEY};
use crate::HelperError;
use crate::config::api_base_url;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const PAGE_SIZE: usize = 100;
const USER_AGENT: &str = concat!("pypsa-helper-bot/", env!("CARGO_PKG_VERSION"));

/// Fetches issues and pull requests through the GitHub REST API
#[derive(Clone)]
pub struct IssueClient {
    api_base: Url,
    token: Option<String>,
    agent: ureq::Agent,
}

impl std::fmt::Debug for IssueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssueClient")
            .field("api_base", &self.api_base.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct GithubIssue {
    html_url: String,
    number: u64,
    title: String,
    state: String,
    body: Option<String>,
    user: Option<GithubUser>,
    created_at: Option<String>,
    #[serde(default)]
    labels: Vec<GithubLabel>,
    #[serde(default)]
    comments: u64,
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GithubLabel {
    name: String,
}

impl IssueClient {
    #[inline]
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_api_base(DEFAULT_API_BASE, token)
    }

    #[inline]
    pub fn with_api_base(api_base: &str, token: Option<String>) -> Result<Self> {
        let api_base = api_base_url(api_base)
            .with_context(|| format!("Invalid GitHub API base URL: {}", api_base))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .user_agent(USER_AGENT)
            .build()
            .into();

        Ok(Self {
            api_base,
            token,
            agent,
        })
    }

    /// Fetch all issues and pull requests (any state) for `owner/name`
    #[inline]
    pub fn list_issues(&self, repo_name: &str, slug: &str) -> Result<Vec<Document>> {
        let url = self
            .api_base
            .join(&format!("repos/{}/issues", slug))
            .context("Failed to build issues URL")?;

        let mut documents = Vec::new();
        let mut page = 1usize;

        loop {
            debug!("Fetching issues page {} for {}", page, slug);
            let issues = self.fetch_page(&url, page)?;
            let count = issues.len();

            documents.extend(
                issues
                    .into_iter()
                    .map(|issue| issue_to_document(issue, repo_name)),
            );

            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        Ok(documents)
    }

    fn fetch_page(&self, url: &Url, page: usize) -> Result<Vec<GithubIssue>> {
        let mut request = self
            .agent
            .get(url.as_str())
            .query("state", "all")
            .query("per_page", PAGE_SIZE.to_string())
            .query("page", page.to_string())
            .header("Accept", "application/vnd.github+json");

        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let body = request
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| HelperError::Network(format!("GitHub issues request failed: {}", e)))?;

        serde_json::from_str(&body).context("Failed to parse GitHub issues response")
    }
}

impl IssueSource for IssueClient {
    fn fetch_issues(&self, repo_name: &str, slug: &str) -> Result<Vec<Document>> {
        self.list_issues(repo_name, slug)
    }
}

fn issue_to_document(issue: GithubIssue, repo_name: &str) -> Document {
    let mut metadata = BTreeMap::new();
    metadata.insert(SOURCE_KEY.to_string(), issue.html_url.clone());
    metadata.insert(REPOSITORY_KEY.to_string(), repo_name.to_string());
    metadata.insert("url".to_string(), issue.html_url);
    metadata.insert("title".to_string(), issue.title.clone());
    metadata.insert("number".to_string(), issue.number.to_string());
    metadata.insert("state".to_string(), issue.state);
    metadata.insert("comments".to_string(), issue.comments.to_string());
    metadata.insert(
        "is_pull_request".to_string(),
        issue.pull_request.is_some().to_string(),
    );
    if let Some(user) = issue.user {
        metadata.insert("creator".to_string(), user.login);
    }
    if let Some(created_at) = issue.created_at {
        metadata.insert("created_at".to_string(), created_at);
    }
    if !issue.labels.is_empty() {
        let labels: Vec<String> = issue.labels.into_iter().map(|l| l.name).collect();
        metadata.insert("labels".to_string(), labels.join(", "));
    }

    let content = match issue.body.as_deref().map(str::trim) {
        Some(body) if !body.is_empty() => format!("{}\n\n{}", issue.title, body),
        _ => issue.title,
    };

    Document::new(content, metadata)
}
