//! autodev - single-pass issue-to-change orchestrator.
//!
//! Each invocation claims at most one trigger-labeled work item, drives it
//! through generate -> validate -> apply -> CI, and exits. Continuation is
//! the job of an external scheduler (a timer re-invoking this binary).
//! Done and blocked dispositions both exit 0; they are reported through
//! tracker labels and the event ledger, not the exit code.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

use autodev_core::{
    init_tracing, EventLedger, Orchestrator, OrchestratorConfig, RunOutcome,
};
use autodev_forge::{ForgeConfig, GithubForge, OllamaBackend, OllamaConfig};

#[derive(Parser)]
#[command(name = "autodev")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn tracked work items into reviewed, CI-verified change requests", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Path to the append-only event ledger
    #[arg(long, default_value = "logs/events.jsonl")]
    log: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let forge = GithubForge::from_env();
    let backend = OllamaBackend::new(OllamaConfig::from_env());
    let config = OrchestratorConfig::from_env();
    let ledger = EventLedger::new(cli.log);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(event = "run.cancel_requested");
                cancel.cancel();
            }
        });
    }

    let orchestrator =
        Orchestrator::new(&forge, backend, ledger, config).with_cancellation(cancel);

    match orchestrator.run_once().await {
        Ok(RunOutcome::NoCandidates) => {
            info!(event = "run.idle", "no claimable work items");
        }
        Ok(RunOutcome::Done {
            number,
            change_request,
            attempts,
        }) => {
            info!(
                event = "run.done",
                number,
                change_request,
                attempts,
            );
        }
        Ok(RunOutcome::Blocked { number, reason }) => {
            info!(event = "run.blocked", number, reason = %reason);
        }
        // A collaborator failure is already in the ledger; labels were left
        // untouched. Exit normally so the scheduler keeps re-invoking us.
        Err(err) => {
            error!(event = "run.failed", error = %err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_defaults() {
        let cli = Cli::try_parse_from(["autodev"]).expect("parse");
        assert!(!cli.verbose);
        assert!(!cli.json);
        assert_eq!(cli.log, PathBuf::from("logs/events.jsonl"));
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from(["autodev", "-v", "--json", "--log", "/tmp/l.jsonl"])
            .expect("parse");
        assert!(cli.verbose);
        assert!(cli.json);
        assert_eq!(cli.log, PathBuf::from("/tmp/l.jsonl"));
    }
}
