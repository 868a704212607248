//! Race units against an in-process ledger.

use super::report::render_report;
use crate::cli::{Command, RetrySettings, RuntimeConfig};
use crate::dispatch::audit_history;
use crate::error::{LedgerError, Result};
use crate::ledger::SimulatedLedger;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Pause between two foreign writes, in milliseconds
const WRITER_PAUSE_MS: std::ops::Range<u64> = 5..50;

/// Execute the simulate command
pub(super) async fn execute_simulate(command: &Command, config: &RuntimeConfig) -> Result<i32> {
    let Command::Simulate {
        branch,
        writers,
        latency_ms,
        run,
    } = command
    else {
        return Ok(1);
    };

    let ledger = Arc::new(
        SimulatedLedger::new(branch.clone()).with_latency(Duration::from_millis(*latency_ms)),
    );
    let base = ledger.tip(branch).ok_or_else(|| LedgerError::NotFound {
        what: format!("branch {}", branch),
    })?;

    let settings = RetrySettings::from(run);
    config.section("Simulate");
    config.indent(&format!("Branch: {}", branch));
    config.indent(&format!("Units: {}", run.count));
    config.indent(&format!("Background writers: {}", writers));
    config.indent(&format!("Latency: {}ms", latency_ms));
    config.indent(&format!("Policy: {}", settings.describe()));

    let stop = CancellationToken::new();
    let mut background = JoinSet::new();
    for _ in 0..*writers {
        background.spawn(foreign_writer(Arc::clone(&ledger), branch.clone(), stop.clone()));
    }

    let dispatcher = super::build_dispatcher(ledger.clone(), branch, run);
    let report = dispatcher.run(run.count).await;

    stop.cancel();
    let mut foreign_landed = 0usize;
    while let Some(joined) = background.join_next().await {
        match joined {
            Ok(landed) => foreign_landed += landed,
            Err(e) => log::warn!("background writer failed: {}", e),
        }
    }

    let exit_code = render_report(config, branch, &report);
    let summary = audit_history(&ledger, branch, &base, &report)?;
    config.indent(&format!(
        "History: {} unit commits, {} foreign commits ({} written)",
        summary.unit_commits, summary.foreign_commits, foreign_landed
    ));

    Ok(exit_code)
}

/// Keep advancing the tip until `stop` fires; returns the commits landed
async fn foreign_writer(ledger: Arc<SimulatedLedger>, branch: String, stop: CancellationToken) -> usize {
    let mut landed = 0;
    loop {
        let pause = Duration::from_millis(rand::thread_rng().gen_range(WRITER_PAUSE_MS));
        tokio::select! {
            _ = stop.cancelled() => return landed,
            _ = tokio::time::sleep(pause) => {}
        }

        match ledger.land_foreign_commit(&branch) {
            Ok(commit) => {
                landed += 1;
                log::debug!("foreign write {} on {}", commit.short(), branch);
            }
            Err(e) => {
                log::warn!("foreign write failed: {}", e);
                return landed;
            }
        }
    }
}
