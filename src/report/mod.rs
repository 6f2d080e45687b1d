//! Organization report driver.
//!
//! The driver enumerates the organization's repositories strictly one at a
//! time, collects the facts of each (the lookups for a single repository run
//! concurrently, see [`FactCollector`]) and, when asked, the recent commit
//! authors of orphan repositories. Records are only appended by this single
//! sequential loop. Any lookup failure aborts the run; the one tolerated
//! failure is an unreadable commit author, which is logged and skipped.
//!
//! # Example
//!
//! ```rust,no_run
//! use repo_audit::config::AuditConfig;
//! use repo_audit::report::{ReportDriver, ReportOptions};
//!
//! let config = AuditConfig::load(None)?;
//! let driver = ReportDriver::new(&config)?;
//! let files = driver.generate(&ReportOptions::new("reports").with_orphan_report())?;
//! println!("{}", files.primary.display());
//! # Ok::<(), repo_audit::error::AuditError>(())
//! ```

mod output;

pub use output::{
    GOVERNANCE_HEADER, PRIMARY_HEADER, ReportFiles, date_stamp, orphan_header, write_orphans,
    write_primary, write_reports,
};

use std::path::PathBuf;
use tracing::{info, warn};

use crate::collect::{CommitAuthor, FactCollector, RepoFacts, webhook_domain};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::github::{GitHubClient, RepoOps};

/// Per-run options supplied by the caller.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Directory the report files are written to.
    pub output_dir: PathBuf,
    /// Also collect the orphan repository report.
    pub orphan_report: bool,
    /// Stop after this many repositories.
    pub test_limit: Option<usize>,
}

impl ReportOptions {
    /// Options writing to the given directory, without orphan report or limit.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            orphan_report: false,
            test_limit: None,
        }
    }

    /// Collect the orphan repository report as well.
    pub fn with_orphan_report(mut self) -> Self {
        self.orphan_report = true;
        self
    }

    /// Stop after `limit` repositories; zero means no limit.
    pub fn with_test_limit(mut self, limit: usize) -> Self {
        self.test_limit = (limit > 0).then_some(limit);
        self
    }
}

/// A repository without an admin team, with its most recent commit authors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanRecord {
    pub repo_name: String,
    pub commits: Vec<CommitAuthor>,
}

/// Collected report data, ready to be written.
#[derive(Debug, Clone, Default)]
pub struct AuditReport {
    pub rows: Vec<RepoFacts>,
    /// `None` unless the orphan report was requested.
    pub orphans: Option<Vec<OrphanRecord>>,
    /// Whether rows carry governance columns.
    pub governance: bool,
    /// Number of author/date column pairs in the orphan report.
    pub orphan_columns: usize,
}

/// Whether a repository belongs in the orphan report.
pub fn is_orphan(team: Option<&str>, archived: bool) -> bool {
    team.is_none() && !archived
}

/// Runs a complete organization report.
pub struct ReportDriver {
    collector: FactCollector,
    owner: String,
    orphan_commit_count: usize,
    governance: bool,
}

impl ReportDriver {
    /// Build a driver, its client and its worker pool from the configuration.
    pub fn new(config: &AuditConfig) -> Result<Self> {
        config.validate()?;
        let client = GitHubClient::from_config(config)?;

        Ok(Self {
            collector: FactCollector::new(client, config)?,
            owner: config.owner.clone(),
            orphan_commit_count: config.orphan_commit_count,
            governance: config.governance,
        })
    }

    /// Collect the report data for every repository (or the limited subset).
    pub fn run(&self, options: &ReportOptions) -> Result<AuditReport> {
        let client = self.collector.client();

        let total = match client.get_org(&self.owner) {
            Ok(org) => org.total_repos().to_string(),
            Err(e) => {
                warn!(owner = %self.owner, error = %e, "organization metadata unavailable");
                "?".to_string()
            }
        };
        info!(
            owner = %self.owner,
            total = %total,
            orphan_report = options.orphan_report,
            "collecting repository data"
        );

        if self.governance {
            self.log_org_hooks()?;
        }

        let mut report = AuditReport {
            rows: Vec::new(),
            orphans: options.orphan_report.then(Vec::new),
            governance: self.governance,
            orphan_columns: self.orphan_commit_count,
        };

        for (index, repo) in client.list_org_repos(&self.owner).enumerate() {
            let repo = repo?;
            info!("Progress: {:>4}/{:>4} {}", index + 1, total, repo.name);

            let facts = self.collector.collect(&repo.name)?;

            if let Some(orphans) = report.orphans.as_mut()
                && is_orphan(facts.team.as_deref(), repo.archived)
            {
                let commits = self
                    .collector
                    .recent_commits(&repo.name, self.orphan_commit_count)?;
                orphans.push(OrphanRecord {
                    repo_name: repo.name.clone(),
                    commits,
                });
            }

            report.rows.push(facts);

            if let Some(limit) = options.test_limit
                && index + 1 >= limit
            {
                info!("Break by test limit={}", limit);
                break;
            }
        }

        Ok(report)
    }

    /// Collect the report and write it under the output directory, stamped
    /// with today's UTC date.
    pub fn generate(&self, options: &ReportOptions) -> Result<ReportFiles> {
        let report = self.run(options)?;
        let stamp = date_stamp(chrono::Utc::now().date_naive());
        let files = write_reports(&report, &options.output_dir, &stamp)?;

        info!(path = %files.primary.display(), rows = report.rows.len(), "wrote report");
        if let Some(path) = &files.orphan {
            info!(path = %path.display(), "wrote orphan report");
        }
        Ok(files)
    }

    fn log_org_hooks(&self) -> Result<()> {
        let mut domains = Vec::new();
        for hook in self.collector.client().list_org_hooks(&self.owner) {
            let hook = hook?;
            domains.push(
                hook.config
                    .url
                    .as_deref()
                    .and_then(webhook_domain)
                    .unwrap_or_default(),
            );
        }
        info!(
            count = domains.len(),
            domains = %domains.join(","),
            "organization webhooks"
        );
        Ok(())
    }
}
