//! Vulnerability alert counts via the GraphQL API.
//!
//! Alerts are fetched in cursor-paginated batches. Every page, the first and
//! the last included, is tallied into an [`AlertAccumulator`], which counts
//! nodes per `{severity}_{state}` bucket and remembers every node id. Once the
//! server stops returning an end cursor the accumulator checks that the number
//! of distinct ids equals the number of counted nodes; a mismatch means a page
//! was counted twice and fails the run.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::error::{AuditError, Result};
use crate::github::GitHubClient;

const ALERTS_QUERY: &str = r#"
query($owner: String!, $name: String!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    vulnerabilityAlerts(first: $first, after: $after) {
      pageInfo {
        endCursor
        startCursor
      }
      nodes {
        state
        id
        createdAt
        dismissedAt
        securityVulnerability {
          package {
            name
          }
          severity
        }
      }
    }
  }
}
"#;

/// Buckets reported per repository, in column order.
pub const REPORT_BUCKETS: [&str; 8] = [
    "CRITICAL_FIXED",
    "HIGH_FIXED",
    "MODERATE_FIXED",
    "LOW_FIXED",
    "CRITICAL_OPEN",
    "HIGH_OPEN",
    "MODERATE_OPEN",
    "LOW_OPEN",
];

/// Alert counts keyed by `{severity}_{state}`.
///
/// Buckets outside [`REPORT_BUCKETS`] (dismissed alerts, for instance) are
/// kept so the totals stay consistent with the ids seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertCounts {
    buckets: BTreeMap<String, u64>,
}

impl AlertCounts {
    /// Count in one bucket; zero when no alert fell into it.
    pub fn get(&self, bucket: &str) -> u64 {
        self.buckets.get(bucket).copied().unwrap_or(0)
    }

    /// Counts of the reported buckets, in column order.
    pub fn report_values(&self) -> [u64; 8] {
        REPORT_BUCKETS.map(|bucket| self.get(bucket))
    }

    /// Sum over every bucket.
    pub fn total(&self) -> u64 {
        self.buckets.values().sum()
    }

    fn increment(&mut self, bucket: String) {
        *self.buckets.entry(bucket).or_insert(0) += 1;
    }
}

/// One vulnerability alert node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNode {
    pub id: String,
    pub state: String,
    pub created_at: Option<String>,
    pub dismissed_at: Option<String>,
    pub security_vulnerability: SecurityVulnerability,
}

impl AlertNode {
    /// Bucket key of this alert, e.g. `HIGH_OPEN`.
    pub fn bucket(&self) -> String {
        format!("{}_{}", self.security_vulnerability.severity, self.state)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityVulnerability {
    pub severity: String,
    pub package: Option<VulnerablePackage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VulnerablePackage {
    pub name: String,
}

/// Running tally of alert nodes across GraphQL pages.
#[derive(Debug, Default)]
pub struct AlertAccumulator {
    counts: AlertCounts,
    seen: HashSet<String>,
}

impl AlertAccumulator {
    /// Tally the nodes of one page.
    pub fn add_page(&mut self, nodes: &[AlertNode]) {
        for node in nodes {
            self.counts.increment(node.bucket());
            self.seen.insert(node.id.clone());
        }
    }

    /// Check the tally against the distinct ids seen and hand back the counts.
    pub fn finish(self, repo: &str) -> Result<AlertCounts> {
        let counted = self.counts.total();
        if self.seen.len() as u64 != counted {
            return Err(AuditError::AlertCountMismatch {
                repo: repo.to_string(),
                distinct: self.seen.len(),
                counted,
            });
        }
        Ok(self.counts)
    }
}

#[derive(Serialize)]
struct AlertVariables<'a> {
    owner: &'a str,
    name: &'a str,
    first: u32,
    after: Option<&'a str>,
}

#[derive(Deserialize)]
struct AlertsData {
    repository: Option<RepositoryAlerts>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryAlerts {
    vulnerability_alerts: AlertConnection,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlertConnection {
    page_info: PageInfo,
    #[serde(default)]
    nodes: Vec<AlertNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    end_cursor: Option<String>,
}

/// Vulnerability alert queries.
pub trait AlertOps {
    /// Count a repository's vulnerability alerts by severity and state.
    fn alert_counts(&self, owner: &str, repo: &str, batch_size: u32) -> Result<AlertCounts>;
}

impl AlertOps for GitHubClient {
    fn alert_counts(&self, owner: &str, repo: &str, batch_size: u32) -> Result<AlertCounts> {
        let mut accumulator = AlertAccumulator::default();
        let mut after: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let connection = self.alert_page(owner, repo, batch_size, after.as_deref())?;
            accumulator.add_page(&connection.nodes);
            pages += 1;

            match connection.page_info.end_cursor {
                Some(cursor) if after.as_deref() == Some(cursor.as_str()) => {
                    return Err(AuditError::GraphQl {
                        message: format!(
                            "alert cursor for {} did not advance past {}",
                            repo, cursor
                        ),
                    });
                }
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        debug!(repo, pages, "collected vulnerability alerts");
        accumulator.finish(repo)
    }
}

impl GitHubClient {
    fn alert_page(
        &self,
        owner: &str,
        repo: &str,
        batch_size: u32,
        after: Option<&str>,
    ) -> Result<AlertConnection> {
        let variables = AlertVariables {
            owner,
            name: repo,
            first: batch_size,
            after,
        };
        let data = self.graphql(ALERTS_QUERY, &variables)?;
        let data: AlertsData = serde_json::from_value(data).map_err(|e| AuditError::GraphQl {
            message: format!("malformed alert page for {}: {}", repo, e),
        })?;

        data.repository
            .map(|r| r.vulnerability_alerts)
            .ok_or_else(|| AuditError::GraphQl {
                message: format!("repository {}/{} not found", owner, repo),
            })
    }
}
