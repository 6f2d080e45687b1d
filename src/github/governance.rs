//! Repository governance probes: alert settings, branch protection, README
//! and `.github` conventions.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::Result;
use crate::github::repos::repo_endpoint;
use crate::github::{GitHubClient, RepoOps};

/// An entry in a repository directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentEntry {
    pub name: String,
}

/// Conventions found in the `.github` directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GithubDirConfig {
    pub has_pull_request_template: bool,
    pub has_code_owner: bool,
}

impl GithubDirConfig {
    /// Classify the files of a directory listing.
    pub fn from_entries(entries: &[ContentEntry]) -> Self {
        let mut config = Self::default();
        for entry in entries {
            let name = entry.name.to_lowercase();
            if name.contains("pull_request_template") {
                config.has_pull_request_template = true;
            }
            if name.contains("codeowners") {
                config.has_code_owner = true;
            }
        }
        config
    }
}

/// Presence checks against a single repository.
pub trait GovernanceOps {
    /// Whether vulnerability alerts are enabled.
    fn alerts_enabled(&self, owner: &str, repo: &str) -> Result<bool>;

    /// Whether at least one branch is protected.
    fn has_protected_branch(&self, owner: &str, repo: &str) -> Result<bool>;

    /// Whether the repository has a README.
    fn has_readme(&self, owner: &str, repo: &str) -> Result<bool>;

    /// List a directory; `None` when it does not exist or cannot be read.
    fn list_directory(&self, owner: &str, repo: &str, path: &str)
        -> Result<Option<Vec<ContentEntry>>>;

    /// Pull request template and code owners conventions under `.github`.
    fn github_dir_config(&self, owner: &str, repo: &str) -> Result<GithubDirConfig> {
        Ok(self
            .list_directory(owner, repo, ".github")?
            .map(|entries| GithubDirConfig::from_entries(&entries))
            .unwrap_or_default())
    }
}

impl GovernanceOps for GitHubClient {
    fn alerts_enabled(&self, owner: &str, repo: &str) -> Result<bool> {
        let status = self.status(&repo_endpoint(owner, repo, "vulnerability-alerts"))?;
        Ok(status == StatusCode::NO_CONTENT)
    }

    fn has_protected_branch(&self, owner: &str, repo: &str) -> Result<bool> {
        for branch in self.list_repo_branches(owner, repo) {
            if branch?.protected {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn has_readme(&self, owner: &str, repo: &str) -> Result<bool> {
        let status = self.status(&repo_endpoint(owner, repo, "readme"))?;
        Ok(status == StatusCode::OK)
    }

    fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
    ) -> Result<Option<Vec<ContentEntry>>> {
        let url = self.url(&repo_endpoint(owner, repo, &format!("contents/{}", path)));
        let response = self.send_get(&url, &[])?;
        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        // A file path answers with a single object rather than a listing.
        match response.json::<serde_json::Value>()? {
            serde_json::Value::Array(items) => Ok(Some(
                items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value(item).ok())
                    .collect(),
            )),
            _ => Ok(None),
        }
    }
}
