//! Push, pull and sync command implementations.
//!
//! All three run through the batch processor, so a single id and `--all`
//! share rate limiting, retries and the summary output.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::batch::{plan, BatchOptions, BatchProcessor, BatchResult};
use crate::cli::commands::{block_on, home_dir, load_config, open_local, orchestrator, CliOrchestrator};
use crate::cli::{BatchFlags, BatchTargetArgs, SyncArgs};
use crate::config::Config;
use crate::error::Result;
use crate::model::ItemFilter;
use crate::storage::LocalStore;
use crate::sync::SyncOperation;
use crate::validate::normalize_strategy;

/// Global flags the sync commands care about.
#[derive(Debug, Clone, Copy)]
pub struct RunFlags<'a> {
    pub home: Option<&'a PathBuf>,
    pub provider: Option<&'a str>,
    pub dry_run: bool,
    pub json: bool,
    pub quiet: bool,
}

/// Execute `push`.
pub fn push(args: &BatchTargetArgs, flags: RunFlags<'_>) -> Result<()> {
    run(SyncOperation::Push, args, None, flags)
}

/// Execute `pull`.
pub fn pull(args: &BatchTargetArgs, flags: RunFlags<'_>) -> Result<()> {
    run(SyncOperation::Pull, args, None, flags)
}

/// Execute `sync`.
pub fn sync(args: &SyncArgs, flags: RunFlags<'_>) -> Result<()> {
    run(
        SyncOperation::Bidirectional,
        &args.target,
        args.strategy.as_deref(),
        flags,
    )
}

fn run(
    op: SyncOperation,
    args: &BatchTargetArgs,
    strategy: Option<&str>,
    flags: RunFlags<'_>,
) -> Result<()> {
    let strategy = strategy.map(normalize_strategy).transpose()?;
    let home = home_dir(flags.home)?;
    let config = load_config(&home, flags.provider)?;
    let options = batch_options(&config, &args.batch, flags);

    if flags.dry_run && !(args.all && op == SyncOperation::Pull) {
        // Only pull --all needs the remote to plan.
        let items = select_local(op, args, &home)?;
        let mut options = options;
        return report(&plan(items, op, &mut options), flags.json);
    }

    let orch = Arc::new(orchestrator(&home, &config, strategy)?);
    block_on(async move {
        let items = select(op, args, &orch).await?;
        let cancel = CancellationToken::new();
        let on_ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing in-flight items");
                on_ctrl_c.cancel();
            }
        });

        let result = BatchProcessor::new(orch)
            .run(items, op, options.cancel_token(cancel))
            .await?;
        report(&result, flags.json)
    })
}

fn batch_options(config: &Config, overrides: &BatchFlags, flags: RunFlags<'_>) -> BatchOptions {
    let mut options = BatchOptions::from(&config.batch).dry_run(flags.dry_run);
    if let Some(n) = overrides.max_concurrent {
        options.max_concurrent = n;
    }
    if let Some(n) = overrides.max_retries {
        options.rate_limit.max_retries = n;
    }
    if let Some(n) = overrides.threshold {
        options.rate_limit.threshold = n;
    }
    if !flags.json && !flags.quiet && std::io::stderr().is_terminal() {
        options = options.on_progress(|e| {
            let mark = if e.ok { "ok".green() } else { "failed".red() };
            eprintln!("[{}/{}] {} {}", e.current, e.total, e.item, mark);
        });
    }
    options
}

/// Ids from the command line, or every local id for `--all`.
fn select_local(op: SyncOperation, args: &BatchTargetArgs, home: &Path) -> Result<Vec<String>> {
    if args.all && op != SyncOperation::Pull {
        return open_local(home)?.list_ids();
    }
    Ok(args.ids.clone())
}

async fn select(op: SyncOperation, args: &BatchTargetArgs, orch: &CliOrchestrator) -> Result<Vec<String>> {
    match (op, args.all) {
        (SyncOperation::Pull, true) => {
            orch.ensure_authenticated().await?;
            let remote = orch.list_remote(&ItemFilter::default()).await?;
            Ok(remote.into_iter().map(|r| r.remote_id).collect())
        }
        (_, true) => orch.local().list_ids(),
        (_, false) => Ok(args.ids.clone()),
    }
}

fn report(result: &BatchResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(result)?);
        return Ok(());
    }

    let op = result.operation().as_str();
    if result.dry_run() {
        println!(
            "Dry run: would {op} {} item(s), estimated {:.1}s",
            result.total(),
            Duration::from_millis(result.estimated_duration_ms().unwrap_or_default()).as_secs_f64()
        );
        return Ok(());
    }

    let headline = format!(
        "{op}: {} succeeded, {} failed, {} aborted of {}",
        result.succeeded(),
        result.failed(),
        result.aborted(),
        result.total()
    );
    if result.is_complete() {
        println!("{}", headline.green());
    } else {
        println!("{}", headline.yellow());
    }

    for (label, count) in result.outcomes() {
        println!("  {label}: {count}");
    }
    for err in result.errors() {
        println!("  {} {} [{}] {}", "✗".red(), err.item, err.code, err.error);
    }
    if result.cancelled() {
        println!("  {}", "cancelled".yellow());
    }
    if let Some(rate) = result.rate_limit_state() {
        println!(
            "  rate limit: {} remaining, resets {}",
            rate.remaining,
            rate.reset_at.format("%H:%M:%S")
        );
    }
    println!("  took {}ms", result.duration_ms());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dry_run_plan() {
        let items = (0..20).map(|i| format!("wi_{i}")).collect();
        let mut options = BatchOptions::new().max_concurrent(5).dry_run(true);
        let result = plan(items, SyncOperation::Push, &mut options);
        assert!(result.dry_run());
        assert_eq!(result.succeeded(), 20);
        assert_eq!(result.estimated_duration_ms(), Some(2_000));
    }

    #[test]
    fn test_batch_flags_override_config() {
        let config = Config::default();
        let overrides = BatchFlags {
            max_concurrent: Some(2),
            max_retries: Some(0),
            threshold: None,
        };
        let flags = RunFlags {
            home: None,
            provider: None,
            dry_run: false,
            json: true,
            quiet: false,
        };
        let options = batch_options(&config, &overrides, flags);
        assert_eq!(options.max_concurrent, 2);
        assert_eq!(options.rate_limit.max_retries, 0);
        assert_eq!(options.rate_limit.threshold, config.batch.threshold);
        assert!(options.on_progress.is_none());
    }
}
