//! Organization and repository listing operations.

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::github::{GitHubClient, Pages};

/// Repository information from the organization listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub archived: bool,
}

/// Organization metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub login: String,
    #[serde(default)]
    pub public_repos: u64,
    #[serde(default)]
    pub total_private_repos: u64,
}

impl Organization {
    /// Number of repositories the organization owns.
    pub fn total_repos(&self) -> u64 {
        self.public_repos + self.total_private_repos
    }
}

/// A team with access to a repository.
#[derive(Debug, Clone, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub permission: String,
}

impl Team {
    /// Whether the team administers the repository.
    pub fn is_admin(&self) -> bool {
        self.permission == "admin"
    }
}

/// A repository or organization webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct Webhook {
    pub id: u64,
    #[serde(default)]
    pub config: WebhookConfig,
}

/// Delivery settings of a webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookConfig {
    pub url: Option<String>,
}

/// A deploy key installed on a repository.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployKey {
    pub id: u64,
    pub key: String,
}

/// A CI workflow definition.
#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    pub name: String,
}

/// A repository branch.
#[derive(Debug, Clone, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub protected: bool,
}

/// Path of a repository sub-resource, e.g. `/repos/acme/api/hooks`.
pub(crate) fn repo_endpoint(owner: &str, repo: &str, resource: &str) -> String {
    format!(
        "/repos/{}/{}/{}",
        urlencoding::encode(owner),
        urlencoding::encode(repo),
        resource
    )
}

/// Organization and repository listings.
///
/// Listings are lazy [`Pages`] iterators; see its documentation for how
/// unavailable listings are reported.
pub trait RepoOps {
    /// Get organization metadata.
    fn get_org(&self, org: &str) -> Result<Organization>;

    /// List all repositories in an organization.
    fn list_org_repos(&self, org: &str) -> Pages<'_, Repository>;

    /// List organization-level webhooks.
    fn list_org_hooks(&self, org: &str) -> Pages<'_, Webhook>;

    /// List the most recent commits of a repository as raw records.
    fn list_repo_commits(&self, owner: &str, repo: &str, per_page: u32) -> Pages<'_, Value>;

    /// List teams with access to a repository.
    fn list_repo_teams(&self, owner: &str, repo: &str) -> Pages<'_, Team>;

    /// List repository webhooks.
    fn list_repo_hooks(&self, owner: &str, repo: &str) -> Pages<'_, Webhook>;

    /// List repository deploy keys.
    fn list_repo_keys(&self, owner: &str, repo: &str) -> Pages<'_, DeployKey>;

    /// List CI workflow definitions.
    fn list_repo_workflows(&self, owner: &str, repo: &str) -> Pages<'_, Workflow>;

    /// List repository branches.
    fn list_repo_branches(&self, owner: &str, repo: &str) -> Pages<'_, Branch>;
}

impl RepoOps for GitHubClient {
    fn get_org(&self, org: &str) -> Result<Organization> {
        self.get(&format!("/orgs/{}", urlencoding::encode(org)))
    }

    fn list_org_repos(&self, org: &str) -> Pages<'_, Repository> {
        self.paginate(&format!("/orgs/{}/repos", urlencoding::encode(org)))
    }

    fn list_org_hooks(&self, org: &str) -> Pages<'_, Webhook> {
        self.paginate(&format!("/orgs/{}/hooks", urlencoding::encode(org)))
    }

    fn list_repo_commits(&self, owner: &str, repo: &str, per_page: u32) -> Pages<'_, Value> {
        self.paginate(&repo_endpoint(owner, repo, "commits"))
            .per_page(per_page)
    }

    fn list_repo_teams(&self, owner: &str, repo: &str) -> Pages<'_, Team> {
        self.paginate(&repo_endpoint(owner, repo, "teams"))
    }

    fn list_repo_hooks(&self, owner: &str, repo: &str) -> Pages<'_, Webhook> {
        self.paginate(&repo_endpoint(owner, repo, "hooks"))
    }

    fn list_repo_keys(&self, owner: &str, repo: &str) -> Pages<'_, DeployKey> {
        self.paginate(&repo_endpoint(owner, repo, "keys"))
    }

    fn list_repo_workflows(&self, owner: &str, repo: &str) -> Pages<'_, Workflow> {
        self.paginate(&repo_endpoint(owner, repo, "actions/workflows"))
            .extract(|mut body| body.get_mut("workflows").map(Value::take))
    }

    fn list_repo_branches(&self, owner: &str, repo: &str) -> Pages<'_, Branch> {
        self.paginate(&repo_endpoint(owner, repo, "branches"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard) -> GitHubClient {
        let url = server.url();
        GitHubClient::with_endpoints("token", &url, &format!("{}/graphql", url)).unwrap()
    }

    #[test]
    fn test_repo_endpoint_encodes_segments() {
        assert_eq!(
            repo_endpoint("acme", "my repo", "hooks"),
            "/repos/acme/my%20repo/hooks"
        );
    }

    #[test]
    fn test_get_org_totals() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/orgs/acme")
            .match_header("authorization", "Bearer token")
            .with_body(r#"{"login": "acme", "public_repos": 3, "total_private_repos": 4}"#)
            .create();

        let org = client(&server).get_org("acme").unwrap();
        assert_eq!(org.total_repos(), 7);
    }

    #[test]
    fn test_get_org_failure() {
        let mut server = mockito::Server::new();
        let _m = server.mock("GET", "/orgs/acme").with_status(403).create();

        let err = client(&server).get_org("acme").unwrap_err();
        assert!(matches!(err, AuditError::GitHub { .. }));
    }

    #[test]
    fn test_workflows_are_unwrapped() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/repos/acme/api/actions/workflows")
            .match_query(Matcher::Any)
            .with_body(r#"{"total_count": 2, "workflows": [{"name": "CI"}, {"name": "Release"}]}"#)
            .create();

        let client = client(&server);
        let names: Vec<String> = client
            .list_repo_workflows("acme", "api")
            .map(|w| w.map(|w| w.name))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(names, vec!["CI", "Release"]);
    }

    #[test]
    fn test_commits_use_requested_page_size() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", "/repos/acme/api/commits")
            .match_query(Matcher::UrlEncoded("per_page".into(), "5".into()))
            .with_body("[]")
            .create();

        let client = client(&server);
        assert_eq!(client.list_repo_commits("acme", "api", 5).count(), 0);
        m.assert();
    }
}
