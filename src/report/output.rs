//! CSV rendering of collected reports.

use chrono::NaiveDate;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{AuditReport, OrphanRecord};
use crate::collect::RepoFacts;
use crate::error::Result;

/// Columns of the primary report.
pub const PRIMARY_HEADER: [&str; 15] = [
    "name",
    "team",
    "keyCount",
    "workflowCount",
    "webhookCount",
    "workflowNames",
    "webhookNames",
    "alertCount_CRITICAL_FIXED",
    "alertCount_HIGH_FIXED",
    "alertCount_MODERATE_FIXED",
    "alertCount_LOW_FIXED",
    "alertCount_CRITICAL_OPEN",
    "alertCount_HIGH_OPEN",
    "alertCount_MODERATE_OPEN",
    "alertCount_LOW_OPEN",
];

/// Columns appended to the primary report when governance probes ran.
pub const GOVERNANCE_HEADER: [&str; 5] = [
    "alertsEnabled",
    "hasProtectedBranch",
    "hasReadme",
    "hasPullRequestTemplate",
    "hasCodeOwner",
];

/// Paths of the files written for one run.
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub primary: PathBuf,
    pub orphan: Option<PathBuf>,
}

/// `YYYYMMDD` stamp used in report file names.
pub fn date_stamp(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Orphan report columns for `pairs` author/date pairs.
pub fn orphan_header(pairs: usize) -> Vec<String> {
    let mut header = vec!["repo_name".to_string()];
    for i in 1..=pairs {
        header.push(format!("author{}", i));
        header.push(format!("date{}", i));
    }
    header
}

fn primary_record(facts: &RepoFacts, governance: bool) -> Vec<String> {
    let mut record = vec![
        facts.name.clone(),
        facts.team.clone().unwrap_or_default(),
        facts.key_count.to_string(),
        facts.workflow_count().to_string(),
        facts.webhook_count().to_string(),
        facts.workflow_names_joined(),
        facts.webhook_names_joined(),
    ];
    record.extend(facts.alerts.report_values().iter().map(u64::to_string));

    if governance {
        let g = facts.governance.unwrap_or_default();
        record.extend(
            [
                g.alerts_enabled,
                g.has_protected_branch,
                g.has_readme,
                g.github_dir.has_pull_request_template,
                g.github_dir.has_code_owner,
            ]
            .iter()
            .map(bool::to_string),
        );
    }
    record
}

/// Write the primary report.
pub fn write_primary<W: Write>(rows: &[RepoFacts], governance: bool, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = PRIMARY_HEADER.to_vec();
    if governance {
        header.extend(GOVERNANCE_HEADER);
    }
    csv.write_record(&header)?;

    for facts in rows {
        csv.write_record(primary_record(facts, governance))?;
    }
    csv.flush()?;
    Ok(())
}

/// Write the orphan report; rows with fewer commits than `pairs` are padded
/// with blank cells.
pub fn write_orphans<W: Write>(orphans: &[OrphanRecord], pairs: usize, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(orphan_header(pairs))?;

    for orphan in orphans {
        let mut record = Vec::with_capacity(1 + pairs * 2);
        record.push(orphan.repo_name.clone());
        for i in 0..pairs {
            match orphan.commits.get(i) {
                Some(commit) => {
                    record.push(commit.name.clone());
                    record.push(commit.date.clone());
                }
                None => record.extend([String::new(), String::new()]),
            }
        }
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Write all report files for a run into `dir`, creating it if needed.
pub fn write_reports(report: &AuditReport, dir: &Path, stamp: &str) -> Result<ReportFiles> {
    std::fs::create_dir_all(dir)?;

    let primary = dir.join(format!("github_report_{}.csv", stamp));
    write_primary(
        &report.rows,
        report.governance,
        std::fs::File::create(&primary)?,
    )?;

    let orphan = match &report.orphans {
        Some(orphans) => {
            let path = dir.join(format!("github_orphan_report_{}.csv", stamp));
            write_orphans(orphans, report.orphan_columns, std::fs::File::create(&path)?)?;
            Some(path)
        }
        None => None,
    };

    Ok(ReportFiles { primary, orphan })
}
