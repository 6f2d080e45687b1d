//! CLI for the repo-audit tool.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repo_audit::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "repo-audit")]
#[command(author, version, about = "GitHub organization repository audit", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Collect governance columns (alert settings, branch protection, README, .github)
    #[arg(long, global = true)]
    governance: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the repository report for the whole organization
    Report {
        /// Output report directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Also write the orphan repository report
        #[arg(long, alias = "orphan_report")]
        orphan_report: bool,

        /// Stop after this many repositories (0 = no limit)
        #[arg(long, alias = "test_limit", default_value_t = 0)]
        test_limit: usize,
    },

    /// Print the collected facts of a single repository
    Inspect {
        /// Repository name within the organization
        repo: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    repo_audit::logging::init(cli.verbose);

    let mut config =
        AuditConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.governance {
        config.governance = true;
    }

    match cli.command {
        Commands::Report {
            output,
            orphan_report,
            test_limit,
        } => cmd_report(&config, output, orphan_report, test_limit),
        Commands::Inspect { repo } => cmd_inspect(&config, &repo),
    }
}

fn cmd_report(
    config: &AuditConfig,
    output: PathBuf,
    orphan_report: bool,
    test_limit: usize,
) -> Result<()> {
    let mut options = ReportOptions::new(output).with_test_limit(test_limit);
    if orphan_report {
        options = options.with_orphan_report();
    }

    let driver = ReportDriver::new(config).context("Failed to set up report")?;
    let files = driver
        .generate(&options)
        .with_context(|| format!("Report for {} failed", config.owner))?;

    println!("Generate github report at: {}", files.primary.display());
    if let Some(orphan) = files.orphan {
        println!("Generate github orphan report at: {}", orphan.display());
    }
    Ok(())
}

fn cmd_inspect(config: &AuditConfig, repo: &str) -> Result<()> {
    let client = GitHubClient::from_config(config)?;
    let collector = FactCollector::new(client, config)?;
    let facts = collector
        .collect(repo)
        .with_context(|| format!("Failed to collect {}/{}", config.owner, repo))?;

    field("name", &facts.name);
    field("team", facts.team.as_deref().unwrap_or("-"));
    field("deploy keys", facts.key_count);
    field(
        "workflows",
        format!("{} ({})", facts.workflow_count(), facts.workflow_names_joined()),
    );
    field(
        "webhooks",
        format!("{} ({})", facts.webhook_count(), facts.webhook_names_joined()),
    );
    for bucket in repo_audit::github::REPORT_BUCKETS {
        field(bucket, facts.alerts.get(bucket));
    }
    if let Some(g) = facts.governance {
        field("alerts on", g.alerts_enabled);
        field("protected", g.has_protected_branch);
        field("readme", g.has_readme);
        field("pr template", g.github_dir.has_pull_request_template);
        field("codeowners", g.github_dir.has_code_owner);
    }
    Ok(())
}

fn field(label: &str, value: impl std::fmt::Display) {
    println!("{:<17}{}", format!("{}:", label), value);
}
