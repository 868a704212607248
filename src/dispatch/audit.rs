//! Post-run check of the branch history against a report.

use super::{Report, UnitOfWork};
use crate::error::Result;
use crate::ledger::{ObjectId, SimulatedLedger};
use anyhow::anyhow;
use std::collections::HashSet;

/// What the audited segment of history contained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditSummary {
    /// Commits published by units of this run
    pub unit_commits: usize,
    /// Commits landed by other writers during the run
    pub foreign_commits: usize,
}

/// Verify that every successful unit appears exactly once after `base`
///
/// Walks first-parent history from the tip of `branch` down to `base`. Every
/// non-foreign commit in that segment must be the receipt of exactly one
/// successful unit, every receipt must be present, and the tip tree must hold
/// each unit's file with its content.
pub fn audit_history(
    ledger: &SimulatedLedger,
    branch: &str,
    base: &ObjectId,
    report: &Report,
) -> Result<AuditSummary> {
    let history = ledger.history(branch)?;
    let base_at = history
        .iter()
        .position(|c| &c.id == base)
        .ok_or_else(|| anyhow!("base commit {} is not on {}", base, branch))?;
    let segment = &history[..base_at];

    let expected: HashSet<&ObjectId> = report.succeeded().map(|(_, r)| &r.commit).collect();
    let mut seen = HashSet::new();
    let mut foreign_commits = 0;

    for commit in segment {
        if commit.is_foreign() {
            foreign_commits += 1;
            continue;
        }
        if !expected.contains(&commit.id) {
            return Err(anyhow!("commit {} ({}) has no matching unit", commit.id, commit.message).into());
        }
        if !seen.insert(&commit.id) {
            return Err(anyhow!("commit {} appears twice", commit.id).into());
        }
    }

    if let Some(missing) = expected.iter().find(|id| !seen.contains(*id)) {
        return Err(anyhow!("published commit {} is missing from {}", missing, branch).into());
    }

    let files = ledger.files(branch)?;
    for (outcome, _) in report.succeeded() {
        let unit = UnitOfWork::with_id(outcome.index, outcome.id);
        if files.get(&unit.path) != Some(&unit.content) {
            return Err(anyhow!("file {} is missing or altered", unit.path).into());
        }
    }

    Ok(AuditSummary {
        unit_commits: seen.len(),
        foreign_commits,
    })
}
