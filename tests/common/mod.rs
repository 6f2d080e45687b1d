//! Shared mock organization for integration tests.

#![allow(dead_code)]

use mockito::{Matcher, Mock, ServerGuard};
use repo_audit::config::AuditConfig;
use serde_json::{Value, json};

/// A mock GitHub API serving one organization named `acme`.
pub struct MockOrg {
    pub server: ServerGuard,
    mocks: Vec<Mock>,
}

impl MockOrg {
    pub fn new() -> Self {
        Self {
            server: mockito::Server::new(),
            mocks: Vec::new(),
        }
    }

    /// Configuration pointing at the mock server.
    pub fn config(&self) -> AuditConfig {
        AuditConfig::new("acme", "test-token").with_api_url(self.server.url())
    }

    fn get(&mut self, path: &str, body: Value) {
        let mock = self
            .server
            .mock("GET", path)
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create();
        self.mocks.push(mock);
    }

    /// Organization metadata.
    pub fn org(&mut self, public_repos: u64, private_repos: u64) -> &mut Self {
        self.get(
            "/orgs/acme",
            json!({
                "login": "acme",
                "public_repos": public_repos,
                "total_private_repos": private_repos
            }),
        );
        self
    }

    /// Repository listing split over pages linked with `rel="next"`.
    pub fn repo_pages(&mut self, pages: Vec<Value>) -> &mut Self {
        let count = pages.len();
        for (i, page) in pages.into_iter().enumerate() {
            let number = (i + 1).to_string();
            let mut mock = self
                .server
                .mock("GET", "/orgs/acme/repos")
                .match_query(Matcher::UrlEncoded("page".into(), number))
                .with_body(page.to_string());
            if i + 1 < count {
                let link = format!(
                    "<{}/orgs/acme/repos?per_page=100&page={}>; rel=\"next\"",
                    self.server.url(),
                    i + 2
                );
                mock = mock.with_header("link", &link);
            }
            self.mocks.push(mock.create());
        }
        self
    }

    /// The four REST listings the fact collector reads for a repository.
    pub fn repo(
        &mut self,
        name: &str,
        teams: Value,
        hooks: Value,
        keys: Value,
        workflows: Value,
    ) -> &mut Self {
        self.get(&format!("/repos/acme/{}/teams", name), teams);
        self.get(&format!("/repos/acme/{}/hooks", name), hooks);
        self.get(&format!("/repos/acme/{}/keys", name), keys);
        self.get(
            &format!("/repos/acme/{}/actions/workflows", name),
            json!({
                "total_count": workflows.as_array().map_or(0, Vec::len),
                "workflows": workflows
            }),
        );
        self
    }

    /// A repository with no teams, hooks, keys or workflows.
    pub fn bare_repo(&mut self, name: &str) -> &mut Self {
        self.repo(name, json!([]), json!([]), json!([]), json!([]))
    }

    /// Commit listing of a repository.
    pub fn commits(&mut self, name: &str, commits: Value) -> &mut Self {
        self.get(&format!("/repos/acme/{}/commits", name), commits);
        self
    }

    /// GraphQL endpoint answering every alert query with an empty page.
    pub fn no_alerts(&mut self) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/graphql")
            .with_body(
                json!({"data": {"repository": {"vulnerabilityAlerts": {
                    "pageInfo": {"endCursor": null, "startCursor": null},
                    "nodes": []
                }}}})
                .to_string(),
            )
            .create();
        self.mocks.push(mock);
        self
    }
}

/// A commit record as returned by the commits listing.
pub fn commit(sha: &str, author: &str, date: &str) -> Value {
    json!({
        "sha": sha,
        "commit": {"author": {"name": author, "email": "dev@example.com", "date": date}}
    })
}

/// A repository record as returned by the organization listing.
pub fn repo(name: &str, archived: bool) -> Value {
    json!({"name": name, "full_name": format!("acme/{}", name), "archived": archived})
}
