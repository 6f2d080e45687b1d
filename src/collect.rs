//! Per-repository fact collection.
//!
//! [`FactCollector::collect`] runs five independent lookups for one repository
//! on a bounded worker pool and waits for all of them before assembling a
//! [`RepoFacts`] record:
//!
//! - the admin team,
//! - CI workflow names,
//! - webhook target domains,
//! - the deploy key count,
//! - vulnerability alert counts.
//!
//! Lookups are not retried and their errors are not swallowed: when several
//! fail, the first in the order above is returned.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::AuditConfig;
use crate::error::Result;
use crate::github::{AlertCounts, AlertOps, GitHubClient, GithubDirConfig, GovernanceOps, RepoOps};

/// Facts collected for one repository; one row of the primary report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFacts {
    pub name: String,
    /// Name of the team holding admin permission, if any.
    pub team: Option<String>,
    pub key_count: usize,
    pub workflow_names: Vec<String>,
    pub webhook_domains: Vec<String>,
    pub alerts: AlertCounts,
    /// Present only when governance probes are enabled.
    pub governance: Option<GovernanceFacts>,
}

impl RepoFacts {
    pub fn workflow_count(&self) -> usize {
        self.workflow_names.len()
    }

    pub fn webhook_count(&self) -> usize {
        self.webhook_domains.len()
    }

    /// Workflow names joined with commas.
    pub fn workflow_names_joined(&self) -> String {
        self.workflow_names.join(",")
    }

    /// Webhook domains joined with commas.
    pub fn webhook_names_joined(&self) -> String {
        self.webhook_domains.join(",")
    }
}

/// Optional governance columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GovernanceFacts {
    pub alerts_enabled: bool,
    pub has_protected_branch: bool,
    pub has_readme: bool,
    pub github_dir: GithubDirConfig,
}

/// Author and date of one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub date: String,
}

#[derive(Deserialize)]
struct CommitRecord {
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    author: CommitSignature,
}

#[derive(Deserialize)]
struct CommitSignature {
    name: String,
    date: String,
}

impl CommitAuthor {
    /// Read the author of a raw commit record.
    pub fn from_commit(commit: Value) -> serde_json::Result<Self> {
        let record: CommitRecord = serde_json::from_value(commit)?;
        Ok(Self {
            name: record.commit.author.name,
            date: record.commit.author.date,
        })
    }
}

/// Network location (host and explicit port) of a webhook target URL.
pub fn webhook_domain(target: &str) -> Option<String> {
    let url = Url::parse(target).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Gathers [`RepoFacts`] for repositories of one organization.
pub struct FactCollector {
    client: GitHubClient,
    owner: String,
    alert_batch_size: u32,
    governance: bool,
    pool: rayon::ThreadPool,
}

impl FactCollector {
    /// Create a collector with a worker pool sized from the configuration.
    pub fn new(client: GitHubClient, config: &AuditConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("repo-audit-{}", i))
            .build()?;

        Ok(Self {
            client,
            owner: config.owner.clone(),
            alert_batch_size: config.alert_batch_size,
            governance: config.governance,
            pool,
        })
    }

    /// The client lookups are issued through.
    pub fn client(&self) -> &GitHubClient {
        &self.client
    }

    /// Collect all facts for one repository.
    pub fn collect(&self, repo: &str) -> Result<RepoFacts> {
        let (team, (workflows, (webhooks, (keys, alerts)))) = self.pool.install(|| {
            rayon::join(
                || self.admin_team(repo),
                || {
                    rayon::join(
                        || self.workflow_names(repo),
                        || {
                            rayon::join(
                                || self.webhook_domains(repo),
                                || {
                                    rayon::join(
                                        || self.deploy_key_count(repo),
                                        || self.alert_counts(repo),
                                    )
                                },
                            )
                        },
                    )
                },
            )
        });

        let mut facts = RepoFacts {
            name: repo.to_string(),
            team: team?,
            workflow_names: workflows?,
            webhook_domains: webhooks?,
            key_count: keys?,
            alerts: alerts?,
            governance: None,
        };

        if self.governance {
            facts.governance = Some(self.governance_facts(repo)?);
        }
        Ok(facts)
    }

    /// Name of the first team with admin permission on the repository.
    pub fn admin_team(&self, repo: &str) -> Result<Option<String>> {
        for team in self.client.list_repo_teams(&self.owner, repo) {
            let team = team?;
            if team.is_admin() {
                return Ok(Some(team.name));
            }
        }
        Ok(None)
    }

    /// Display names of all CI workflows.
    pub fn workflow_names(&self, repo: &str) -> Result<Vec<String>> {
        self.client
            .list_repo_workflows(&self.owner, repo)
            .map(|workflow| workflow.map(|w| w.name))
            .collect()
    }

    /// Target domain of every webhook; an unreadable target yields an empty entry.
    pub fn webhook_domains(&self, repo: &str) -> Result<Vec<String>> {
        let mut domains = Vec::new();
        for hook in self.client.list_repo_hooks(&self.owner, repo) {
            let hook = hook?;
            let domain = hook.config.url.as_deref().and_then(webhook_domain);
            if domain.is_none() {
                warn!(repo, hook = hook.id, "webhook target has no readable host");
            }
            domains.push(domain.unwrap_or_default());
        }
        Ok(domains)
    }

    /// Number of deploy keys.
    pub fn deploy_key_count(&self, repo: &str) -> Result<usize> {
        let mut count = 0;
        for key in self.client.list_repo_keys(&self.owner, repo) {
            key?;
            count += 1;
        }
        Ok(count)
    }

    /// Vulnerability alert counts by severity and state.
    pub fn alert_counts(&self, repo: &str) -> Result<AlertCounts> {
        self.client
            .alert_counts(&self.owner, repo, self.alert_batch_size)
    }

    /// Governance probes, run concurrently on the same pool.
    pub fn governance_facts(&self, repo: &str) -> Result<GovernanceFacts> {
        let ((alerts_enabled, protected), (readme, github_dir)) = self.pool.install(|| {
            rayon::join(
                || {
                    rayon::join(
                        || self.client.alerts_enabled(&self.owner, repo),
                        || self.client.has_protected_branch(&self.owner, repo),
                    )
                },
                || {
                    rayon::join(
                        || self.client.has_readme(&self.owner, repo),
                        || self.client.github_dir_config(&self.owner, repo),
                    )
                },
            )
        });

        Ok(GovernanceFacts {
            alerts_enabled: alerts_enabled?,
            has_protected_branch: protected?,
            has_readme: readme?,
            github_dir: github_dir?,
        })
    }

    /// Up to `count` most recent commit authors.
    ///
    /// Commits whose author name or date cannot be read are logged and
    /// skipped; listing failures still propagate.
    pub fn recent_commits(&self, repo: &str, count: usize) -> Result<Vec<CommitAuthor>> {
        let mut authors = Vec::with_capacity(count);
        if count == 0 {
            return Ok(authors);
        }

        let per_page = count.min(100) as u32;
        for commit in self.client.list_repo_commits(&self.owner, repo, per_page) {
            match CommitAuthor::from_commit(commit?) {
                Ok(author) => authors.push(author),
                Err(e) => {
                    warn!(repo, error = %e, "skipping commit without readable author");
                    continue;
                }
            }
            if authors.len() >= count {
                break;
            }
        }

        debug!(repo, commits = authors.len(), "collected recent commit authors");
        Ok(authors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuditError;
    use mockito::Matcher;
    use serde_json::json;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::{Duration, Instant};

    fn collector(server: &mockito::ServerGuard) -> FactCollector {
        let config = AuditConfig::new("acme", "token").with_api_url(server.url());
        let client = GitHubClient::from_config(&config).unwrap();
        FactCollector::new(client, &config).unwrap()
    }

    fn empty_alerts() -> String {
        json!({"data": {"repository": {"vulnerabilityAlerts": {
            "pageInfo": {"endCursor": null, "startCursor": null},
            "nodes": []
        }}}})
        .to_string()
    }

    #[test]
    fn test_webhook_domain() {
        assert_eq!(
            webhook_domain("https://hooks.slack.com/services/T0/B0").as_deref(),
            Some("hooks.slack.com")
        );
        assert_eq!(
            webhook_domain("http://ci.internal:8080/hook").as_deref(),
            Some("ci.internal:8080")
        );
        assert_eq!(webhook_domain("not a url"), None);
    }

    #[test]
    fn test_commit_author_parsing() {
        let author = CommitAuthor::from_commit(json!({
            "sha": "abc",
            "commit": {"author": {"name": "Ada", "date": "2024-05-01T10:00:00Z"}}
        }))
        .unwrap();
        assert_eq!(author.name, "Ada");

        let unreadable = json!({"sha": "abc", "commit": {"author": null}});
        assert!(CommitAuthor::from_commit(unreadable).is_err());
    }

    #[test]
    fn test_empty_repository_yields_complete_record() {
        let mut server = mockito::Server::new();
        let mut mocks = Vec::new();
        for resource in ["teams", "hooks", "keys"] {
            let mock = server
                .mock("GET", format!("/repos/acme/bare/{}", resource).as_str())
                .match_query(Matcher::Any)
                .with_body("[]")
                .create();
            mocks.push(mock);
        }
        let _m1 = server
            .mock("GET", "/repos/acme/bare/actions/workflows")
            .match_query(Matcher::Any)
            .with_body(r#"{"total_count": 0, "workflows": []}"#)
            .create();
        let _m2 = server
            .mock("POST", "/graphql")
            .with_body(empty_alerts())
            .create();

        let facts = collector(&server).collect("bare").unwrap();
        assert_eq!(facts.team, None);
        assert_eq!(facts.key_count, 0);
        assert_eq!(facts.workflow_count(), 0);
        assert_eq!(facts.webhook_count(), 0);
        assert_eq!(facts.workflow_names_joined(), "");
        assert_eq!(facts.webhook_names_joined(), "");
        assert_eq!(facts.alerts.report_values(), [0; 8]);
        assert_eq!(facts.governance, None);
    }

    #[test]
    fn test_collects_all_facts() {
        let mut server = mockito::Server::new();
        let _m1 = server
            .mock("GET", "/repos/acme/api/teams")
            .match_query(Matcher::Any)
            .with_body(
                r#"[{"name": "readers", "permission": "pull"},
                    {"name": "platform", "permission": "admin"}]"#,
            )
            .create();
        let _m2 = server
            .mock("GET", "/repos/acme/api/hooks")
            .match_query(Matcher::Any)
            .with_body(
                r#"[{"id": 1, "config": {"url": "https://hooks.slack.com/x"}},
                    {"id": 2, "config": {"url": "https://ci.example.com:8443/build"}}]"#,
            )
            .create();
        let _m3 = server
            .mock("GET", "/repos/acme/api/keys")
            .match_query(Matcher::Any)
            .with_body(r#"[{"id": 9, "key": "ssh-ed25519 AAAA"}]"#)
            .create();
        let _m4 = server
            .mock("GET", "/repos/acme/api/actions/workflows")
            .match_query(Matcher::Any)
            .with_body(r#"{"total_count": 2, "workflows": [{"name": "CI"}, {"name": "Deploy"}]}"#)
            .create();
        let _m5 = server
            .mock("POST", "/graphql")
            .with_body(
                json!({"data": {"repository": {"vulnerabilityAlerts": {
                    "pageInfo": {"endCursor": null, "startCursor": null},
                    "nodes": [{
                        "id": "n1", "state": "OPEN", "createdAt": null, "dismissedAt": null,
                        "securityVulnerability": {
                            "severity": "CRITICAL",
                            "package": {"name": "openssl"}
                        }
                    }]
                }}}})
                .to_string(),
            )
            .create();

        let facts = collector(&server).collect("api").unwrap();
        assert_eq!(facts.team.as_deref(), Some("platform"));
        assert_eq!(facts.key_count, 1);
        assert_eq!(facts.workflow_names_joined(), "CI,Deploy");
        assert_eq!(
            facts.webhook_names_joined(),
            "hooks.slack.com,ci.example.com:8443"
        );
        assert_eq!(facts.alerts.get("CRITICAL_OPEN"), 1);
    }

    #[test]
    fn test_failed_lookup_fails_collection() {
        let mut server = mockito::Server::new();
        let mut mocks = Vec::new();
        for resource in ["teams", "hooks", "keys"] {
            let mock = server
                .mock("GET", format!("/repos/acme/api/{}", resource).as_str())
                .match_query(Matcher::Any)
                .with_body("[]")
                .create();
            mocks.push(mock);
        }
        let _m1 = server
            .mock("GET", "/repos/acme/api/actions/workflows")
            .match_query(Matcher::Any)
            .with_body(r#"{"total_count": 0, "workflows": []}"#)
            .create();
        let _m2 = server
            .mock("POST", "/graphql")
            .with_body(r#"{"errors": [{"message": "Something went wrong"}]}"#)
            .create();

        let err = collector(&server).collect("api").unwrap_err();
        assert!(matches!(err, AuditError::GraphQl { .. }));
    }

    /// Serve every request on its own thread after `delay`, so that
    /// overlapping requests overlap their delays.
    fn slow_api(delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                thread::spawn(move || respond_slowly(stream, delay));
            }
        });
        url
    }

    fn respond_slowly(stream: TcpStream, delay: Duration) {
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();

        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line.trim().is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse().unwrap();
            }
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).unwrap();

        let path = request_line.split_whitespace().nth(1).unwrap_or("/");
        let payload = if path.starts_with("/graphql") {
            empty_alerts()
        } else if path.starts_with("/repos/acme/api/actions/workflows") {
            r#"{"total_count": 0, "workflows": []}"#.to_string()
        } else {
            "[]".to_string()
        };

        thread::sleep(delay);
        let mut stream = reader.into_inner();
        write!(stream, "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n").unwrap();
        write!(
            stream,
            "content-length: {}\r\nconnection: close\r\n\r\n{}",
            payload.len(),
            payload
        )
        .unwrap();
    }

    fn timed_collect(url: &str, workers: usize) -> Duration {
        let mut config = AuditConfig::new("acme", "token").with_api_url(url);
        config.workers = workers;
        let client = GitHubClient::from_config(&config).unwrap();
        let collector = FactCollector::new(client, &config).unwrap();

        let start = Instant::now();
        collector.collect("api").unwrap();
        start.elapsed()
    }

    #[test]
    fn test_lookups_run_concurrently() {
        let delay = Duration::from_millis(300);
        let url = slow_api(delay);

        let elapsed = timed_collect(&url, 5);
        assert!(
            elapsed < delay * 3,
            "five lookups on five workers took {:?}",
            elapsed
        );
    }

    #[test]
    fn test_single_worker_runs_lookups_in_turn() {
        let delay = Duration::from_millis(300);
        let url = slow_api(delay);

        let elapsed = timed_collect(&url, 1);
        assert!(
            elapsed >= delay * 5,
            "five lookups on one worker took {:?}",
            elapsed
        );
    }

    #[test]
    fn test_recent_commits_skip_malformed_and_cap() {
        let mut server = mockito::Server::new();
        let _m1 = server
            .mock("GET", "/repos/acme/api/commits")
            .match_query(Matcher::UrlEncoded("per_page".into(), "2".into()))
            .with_body(
                json!([
                    {"sha": "1", "commit": {"author": {"name": "Ada", "date": "2024-05-03"}}},
                    {"sha": "2", "commit": {"author": null}},
                    {"sha": "3", "commit": {"author": {"name": "Linus", "date": "2024-05-01"}}},
                    {"sha": "4", "commit": {"author": {"name": "Grace", "date": "2024-04-30"}}}
                ])
                .to_string(),
            )
            .create();

        let authors = collector(&server).recent_commits("api", 2).unwrap();
        assert_eq!(
            authors,
            vec![
                CommitAuthor {
                    name: "Ada".into(),
                    date: "2024-05-03".into(),
                },
                CommitAuthor {
                    name: "Linus".into(),
                    date: "2024-05-01".into(),
                },
            ]
        );
    }

    #[test]
    fn test_governance_facts() {
        let mut server = mockito::Server::new();
        let _m1 = server
            .mock("GET", "/repos/acme/api/vulnerability-alerts")
            .with_status(204)
            .create();
        let _m2 = server
            .mock("GET", "/repos/acme/api/branches")
            .match_query(Matcher::Any)
            .with_body(r#"[{"name": "main", "protected": true}]"#)
            .create();
        let _m3 = server
            .mock("GET", "/repos/acme/api/readme")
            .with_status(404)
            .create();
        let _m4 = server
            .mock("GET", "/repos/acme/api/contents/.github")
            .with_body(r#"[{"name": "pull_request_template.md"}, {"name": "CODEOWNERS"}]"#)
            .create();

        let facts = collector(&server).governance_facts("api").unwrap();
        assert!(facts.alerts_enabled);
        assert!(facts.has_protected_branch);
        assert!(!facts.has_readme);
        assert!(facts.github_dir.has_pull_request_template);
        assert!(facts.github_dir.has_code_owner);
    }
}
