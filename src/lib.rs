//! # Repo Audit
//!
//! Periodic CSV audit reports for the repositories of a GitHub organization.
//!
//! For every repository the report records the admin team, webhook target
//! domains, deploy keys, CI workflow names and vulnerability alert counts by
//! severity and state. An optional orphan report lists repositories without an
//! admin team together with their most recent commit authors.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use repo_audit::prelude::*;
//!
//! let config = AuditConfig::new("my-org", "ghp_your_token_here");
//! let driver = ReportDriver::new(&config)?;
//!
//! let report = driver.run(&ReportOptions::new(".").with_orphan_report())?;
//! for row in &report.rows {
//!     println!("{}: {:?}", row.name, row.team);
//! }
//! # Ok::<(), repo_audit::error::AuditError>(())
//! ```
//!
//! ## Collecting a Single Repository
//!
//! ```rust,no_run
//! use repo_audit::prelude::*;
//!
//! let config = AuditConfig::new("my-org", "ghp_your_token_here");
//! let collector = FactCollector::new(GitHubClient::from_config(&config)?, &config)?;
//!
//! let facts = collector.collect("api")?;
//! println!("{} open critical alerts", facts.alerts.get("CRITICAL_OPEN"));
//! # Ok::<(), repo_audit::error::AuditError>(())
//! ```

pub mod collect;
pub mod config;
pub mod error;
pub mod github;
pub mod logging;
pub mod report;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::collect::{CommitAuthor, FactCollector, GovernanceFacts, RepoFacts};
    pub use crate::config::{AuditConfig, ConfigFile};
    pub use crate::error::{AuditError, Result};
    pub use crate::github::{
        AlertCounts, AlertOps, GitHubClient, GovernanceOps, Pages, RepoOps, Repository,
    };
    pub use crate::report::{
        AuditReport, OrphanRecord, ReportDriver, ReportFiles, ReportOptions, is_orphan,
    };
}

pub use prelude::*;
