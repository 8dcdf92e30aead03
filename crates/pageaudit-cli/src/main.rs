//! pageaudit — run page audits from the command line.
//!
//! ## Commands
//!
//! - `run`: load a JSON configuration and audit a URL
//! - `list-audits`: list bundled audits, or audit definitions in a directory

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

use pageaudit_core::{
    list_audit_names, ArtifactStore, AuditCatalog, AuditFailurePolicy, CancellationToken,
    ConfigFile, FsArtifactStore, HttpGatherer, NoopArtifactStore, Pipeline, RunFlags, RunLimits,
    RunOptions,
};

#[derive(Parser)]
#[command(name = "pageaudit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Audit a web page against a declarative configuration", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a URL
    Run {
        /// URL to audit
        url: String,

        /// Configuration file (JSON)
        #[arg(short, long, env = "PAGEAUDIT_CONFIG")]
        config: PathBuf,

        /// Persist gathered artifacts before auditing
        #[arg(long)]
        save_artifacts: bool,

        /// Persist per-artifact assets before auditing
        #[arg(long)]
        save_assets: bool,

        /// Directory for saved artifacts and assets
        #[arg(long, env = "PAGEAUDIT_OUTPUT_DIR", default_value = ".pageaudit")]
        output_dir: PathBuf,

        /// Record failing audits in the results instead of failing the run
        #[arg(long)]
        isolate_failures: bool,

        /// Time limit per phase, in seconds (0 = no limit)
        #[arg(long, default_value = "0")]
        timeout_secs: u64,

        /// Write the JSON result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List audit names
    ListAudits {
        /// Scan this directory for `*.audit.json` definitions instead of
        /// listing the bundled audits. Only names that match a bundled
        /// audit can be used by `run`; the others are marked unregistered.
        #[arg(long, env = "PAGEAUDIT_AUDITS_DIR")]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    pageaudit_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            url,
            config,
            save_artifacts,
            save_assets,
            output_dir,
            isolate_failures,
            timeout_secs,
            output,
        } => {
            let flags = RunFlags {
                save_artifacts,
                save_assets,
            };
            let policy = if isolate_failures {
                AuditFailurePolicy::Isolate
            } else {
                AuditFailurePolicy::FailFast
            };
            cmd_run(
                &url,
                &config,
                flags,
                &output_dir,
                policy,
                timeout_secs,
                output.as_deref(),
            )
            .await
        }
        Commands::ListAudits { dir } => cmd_list_audits(dir.as_deref()),
    }
}

/// Audit `url` with the configuration at `config_path`.
async fn cmd_run(
    url: &str,
    config_path: &Path,
    flags: RunFlags,
    output_dir: &Path,
    policy: AuditFailurePolicy,
    timeout_secs: u64,
    output: Option<&Path>,
) -> Result<()> {
    let config = ConfigFile::from_path(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?
        .classify(&AuditCatalog::builtin())
        .context("Invalid configuration")?;

    let store: Arc<dyn ArtifactStore> = if flags.save_artifacts || flags.save_assets {
        Arc::new(
            FsArtifactStore::new(output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?,
        )
    } else {
        Arc::new(NoopArtifactStore)
    };

    let limits = if timeout_secs > 0 {
        RunLimits::uniform(Duration::from_secs(timeout_secs))
    } else {
        RunLimits::default()
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let options = RunOptions::new(url)
        .with_flags(flags)
        .with_limits(limits)
        .with_failure_policy(policy)
        .with_cancel(cancel);

    let session = reqwest::Client::builder()
        .user_agent(concat!("pageaudit/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    let pipeline = Pipeline::new(HttpGatherer::new()).with_store(store);
    let result = pipeline
        .run(session, &config, &options)
        .await
        .with_context(|| format!("Audit of {url} failed"))?;

    let rendered = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote results");
        }
        None => println!("{rendered}"),
    }

    Ok(())
}

/// Audit names paired with whether `run` can resolve them.
fn audit_listing(dir: Option<&Path>) -> Result<Vec<(String, bool)>> {
    let catalog = AuditCatalog::builtin();
    let names = match dir {
        Some(dir) => list_audit_names(dir)
            .with_context(|| format!("Failed to list audits in {}", dir.display()))?,
        None => catalog.names(),
    };

    Ok(names
        .into_iter()
        .map(|name| {
            let registered = catalog.contains(&name);
            (name, registered)
        })
        .collect())
}

/// Print one audit name per line.
fn cmd_list_audits(dir: Option<&Path>) -> Result<()> {
    for (name, registered) in audit_listing(dir)? {
        if registered {
            println!("{name}");
        } else {
            warn!(audit = %name, "Audit definition has no registered implementation");
            println!("{name} (unregistered)");
        }
    }
    Ok(())
}
