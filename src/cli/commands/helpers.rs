//! Shared helper functions for command execution.

use crate::error::{CliError, PushError, Result};

/// Parse GitHub repository string into owner/repo tuple
pub(super) fn parse_github_repo(repo: &str) -> Result<(String, String)> {
    let repo = repo.trim().trim_end_matches(".git");
    let parts: Vec<&str> = repo.split('/').collect();

    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(PushError::Cli(CliError::InvalidArguments {
            reason: format!(
                "Invalid GitHub repository format: '{}'. Expected: owner/repo",
                repo
            ),
        }));
    }

    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Read the access token from `GITHUB_TOKEN`, falling back to `GH_TOKEN`
pub(super) fn resolve_token<F>(lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("GITHUB_TOKEN")
        .or_else(|| lookup("GH_TOKEN"))
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| {
            PushError::Cli(CliError::MissingArgument {
                argument: "a GitHub token via the GITHUB_TOKEN or GH_TOKEN environment variable"
                    .to_string(),
            })
        })
}
