//! GitHub API access for organization audits.
//!
//! This module provides a blocking client for:
//! - Paginated REST listings (repositories, teams, webhooks, deploy keys,
//!   workflows, commits, branches)
//! - Vulnerability alert counts through the GraphQL API
//! - Governance presence probes
//!
//! # Example
//!
//! ```rust,no_run
//! use repo_audit::github::{GitHubClient, RepoOps};
//!
//! let client = GitHubClient::new("ghp_your_token_here")?;
//!
//! for repo in client.list_org_repos("my-org") {
//!     let repo = repo?;
//!     println!("{} (archived: {})", repo.name, repo.archived);
//! }
//! # Ok::<(), repo_audit::error::AuditError>(())
//! ```

mod alerts;
mod client;
mod governance;
mod paginate;
mod repos;

pub use alerts::{AlertAccumulator, AlertCounts, AlertNode, AlertOps, REPORT_BUCKETS};
pub use client::GitHubClient;
pub use governance::{ContentEntry, GithubDirConfig, GovernanceOps};
pub use paginate::{DEFAULT_PAGE_SIZE, Extract, Pages, next_link};
pub use repos::{
    Branch, DeployKey, Organization, RepoOps, Repository, Team, Webhook, WebhookConfig, Workflow,
};
