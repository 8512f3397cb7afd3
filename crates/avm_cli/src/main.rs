//! Maintenance CLI for the AVM node store.

use anyhow::{Context, Result};
use avm_core::{
    default_log_level, init_logging, open_db_with, AvmConfig, IntegrityReport, ReapSummary,
    ReaperService, VersionRoot, VersionService,
};
use clap::{Args, Parser, Subcommand};
use log::error;
use rusqlite::Connection;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "avm_cli")]
#[command(about = "Maintenance CLI for the AVM node store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DbArgs {
    /// SQLite database file
    #[arg(value_name = "DB")]
    db: PathBuf,

    /// JSON config file
    #[arg(long, env = "AVM_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, env = "AVM_LOG_DIR", value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Health check
    Ping,
    /// Print the core crate version
    Version,
    /// Count orphans, layered nodes and content locators
    Scan {
        #[command(flatten)]
        db: DbArgs,
    },
    /// List a store's live versions
    Versions {
        #[command(flatten)]
        db: DbArgs,
        /// Store name
        store: String,
    },
    /// Delete orphan nodes and print the released content locators
    Reap {
        #[command(flatten)]
        db: DbArgs,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_run module=cli status=error error={err:#}");
            eprintln!("avm_cli: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<String> {
    match cli.command {
        Commands::Ping => Ok(format!("avm_core ping={}\n", avm_core::ping())),
        Commands::Version => Ok(format!("avm_core version={}\n", avm_core::core_version())),
        Commands::Scan { db } => {
            let (config, conn) = open(&db)?;
            let report = ReaperService::new(&conn, config.name_policy())
                .scan(config.content_scan_batch_size)
                .context("integrity scan failed")?;
            Ok(render_scan(&report))
        }
        Commands::Versions { db, store } => {
            let (config, conn) = open(&db)?;
            let service = VersionService::new(&conn, config.name_policy());
            let roots = service
                .list_versions(&store)
                .with_context(|| format!("failed to list versions of store `{store}`"))?;
            let next = service.next_version_id(&store)?;
            Ok(render_versions(&roots, next))
        }
        Commands::Reap { db } => {
            let (config, conn) = open(&db)?;
            let summary = ReaperService::new(&conn, config.name_policy())
                .reap_orphans(config.orphan_batch_size)
                .context("orphan reap failed")?;
            Ok(render_reap(&summary))
        }
    }
}

fn open(args: &DbArgs) -> Result<(AvmConfig, Connection)> {
    if let Some(dir) = &args.log_dir {
        init_logging(default_log_level(), dir)
            .with_context(|| format!("failed to initialize logging in {}", dir.display()))?;
    }
    let config = match &args.config {
        Some(path) => AvmConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AvmConfig::default(),
    };
    let conn = open_db_with(&args.db, &config)
        .with_context(|| format!("failed to open database {}", args.db.display()))?;
    Ok((config, conn))
}

fn render_scan(report: &IntegrityReport) -> String {
    format!(
        "orphans={}\nlayered_directories={}\nlayered_files={}\ncontent_urls={}\n",
        report.orphans, report.layered_directories, report.layered_files, report.content_urls
    )
}

fn render_versions(roots: &[VersionRoot], next_version_id: i64) -> String {
    let mut out = String::new();
    for root in roots {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\n",
            root.version_id,
            root.root_node_id,
            root.created_at,
            root.creator,
            root.tag.as_deref().unwrap_or("-")
        ));
    }
    out.push_str(&format!("next_version_id={next_version_id}\n"));
    out
}

fn render_reap(summary: &ReapSummary) -> String {
    let mut out = String::new();
    for url in &summary.released_content_urls {
        out.push_str(&format!("released {url}\n"));
    }
    out.push_str(&format!(
        "passes={} nodes_reaped={}\n",
        summary.passes, summary.nodes_reaped
    ));
    out
}
