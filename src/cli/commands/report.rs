//! Run report rendering.

use crate::cli::RuntimeConfig;
use crate::dispatch::Report;

/// Failed units listed individually before the list is elided
const MAX_LISTED_FAILURES: usize = 10;

/// Print the run summary and return the process exit code
pub(super) fn render_report(config: &RuntimeConfig, branch: &str, report: &Report) -> i32 {
    let total = report.outcomes.len();
    let succeeded = report.succeeded().count();
    let failed = total - succeeded;

    config.section("Summary");
    config.indent(&format!("Elapsed: {:.2?}", report.elapsed));
    config.indent(&format!("Succeeded: {}/{}", succeeded, total));
    config.indent(&format!("Failed: {}", failed));
    config.indent(&format!(
        "Attempts: {} (conflicts: {}, rate limited: {})",
        report.total_attempts(),
        report.total_conflicts(),
        report.total_rate_limits()
    ));

    for (outcome, receipt) in report.succeeded() {
        config.detail(&format!(
            "Unit {} {} -> {} on {} (attempts: {}, conflicts: {}, rate limited: {}, errors: {})",
            outcome.index,
            outcome.path,
            receipt.commit.short(),
            receipt.parent.short(),
            receipt.attempts,
            receipt.conflicts,
            receipt.rate_limits,
            receipt.transient_errors
        ));
    }

    if report.all_succeeded() {
        config.success_println(&format!(
            "All {} pushes to branch {} are done!",
            total, branch
        ));
        return 0;
    }

    for (outcome, error) in report.failed().take(MAX_LISTED_FAILURES) {
        config.error_println(&format!(
            "Unit {} ({}): {}",
            outcome.index, outcome.path, error
        ));
    }
    if failed > MAX_LISTED_FAILURES {
        config.warning_println(&format!(
            "... and {} more failed units",
            failed - MAX_LISTED_FAILURES
        ));
    }

    1
}
