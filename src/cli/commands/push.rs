//! Push units to a GitHub branch.

use super::helpers::{parse_github_repo, resolve_token};
use super::report::render_report;
use crate::cli::{Command, RetrySettings, RuntimeConfig};
use crate::error::Result;
use crate::ledger::{GitHubLedger, GitHubLedgerConfig};
use std::sync::Arc;
use std::time::Duration;

/// Execute the push command
pub(super) async fn execute_push(command: &Command, config: &RuntimeConfig) -> Result<i32> {
    let Command::Push {
        repository,
        branch,
        api_url,
        request_timeout,
        run,
    } = command
    else {
        return Ok(1);
    };

    let (owner, repo) = parse_github_repo(repository)?;
    let token = resolve_token(|name| std::env::var(name).ok())?;

    let ledger = GitHubLedger::new(GitHubLedgerConfig {
        owner,
        repo,
        token,
        api_url: api_url.clone(),
        timeout: Duration::from_secs(*request_timeout),
    })?;
    let slug = ledger.slug();

    let settings = RetrySettings::from(run);
    config.section("Push");
    config.indent(&format!("Repository: {}", slug));
    config.indent(&format!("Branch: {}", branch));
    config.indent(&format!("Units: {}", run.count));
    config.indent(&format!("Policy: {}", settings.describe()));
    if let Some(limit) = run.max_in_flight {
        config.indent(&format!("Max in flight: {}", limit));
    }

    log::info!("pushing {} units to {}:{}", run.count, slug, branch);

    let dispatcher = super::build_dispatcher(Arc::new(ledger), branch, run);
    let report = dispatcher.run(run.count).await;

    Ok(render_report(config, branch, &report))
}
