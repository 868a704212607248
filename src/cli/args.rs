//! Command line argument parsing and validation.

use crate::error::{CliError, PushError, Result};
use clap::{Parser, Subcommand, ValueEnum};

/// Concurrent branch-tip append stress tool
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_push_stress",
    version,
    about = "Race many concurrent commits onto the tip of one branch",
    long_about = "Append many uniquely named files to a single branch concurrently.

Every file is its own commit. Writers race on the branch tip and retry on
conflicts, rate limits and transient failures until they land.

Usage:
  kodegen_push_stress push isindir/poc --branch master --count 200
  kodegen_push_stress push isindir/poc --policy bounded --max-attempts 5
  kodegen_push_stress simulate --count 500 --writers 4"
)]
pub struct Args {
    /// Command to execute
    #[command(subcommand)]
    pub command: Command,

    /// List every unit's receipt in the summary
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Print errors only
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Push unique files to a GitHub branch
    Push {
        /// Target repository as owner/repo
        #[arg(value_name = "OWNER/REPO")]
        repository: String,

        /// Branch to append to
        #[arg(long, short = 'b', default_value = "master")]
        branch: String,

        /// GitHub API base URL
        #[arg(long, env = "GITHUB_API_URL", default_value = crate::ledger::DEFAULT_API_URL)]
        api_url: String,

        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 30)]
        request_timeout: u64,

        /// Run options
        #[command(flatten)]
        run: RunArgs,
    },

    /// Race units against an in-process simulated repository
    Simulate {
        /// Branch name inside the simulated repository
        #[arg(long, short = 'b', default_value = "master")]
        branch: String,

        /// Background writers that keep advancing the tip during the run
        #[arg(long, default_value_t = 0)]
        writers: usize,

        /// Simulated round-trip latency per ledger call, in milliseconds
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,

        /// Run options
        #[command(flatten)]
        run: RunArgs,
    },
}

/// Retry policy selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    /// Retry until success with uniform jitter
    Unlimited,
    /// Give up after --max-attempts with linear jitter
    Bounded,
}

/// Options shared by every run
#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    /// Number of files (and commits) to push
    #[arg(long, short = 'n', default_value_t = 200)]
    pub count: usize,

    /// Retry policy
    #[arg(long, value_enum, default_value_t = PolicyKind::Unlimited)]
    pub policy: PolicyKind,

    /// Attempt cap of the bounded policy
    #[arg(long, env = "KODEGEN_PUSH_MAX_ATTEMPTS", default_value_t = crate::engine::DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Lower bound of the unlimited policy's jitter, in milliseconds
    #[arg(long, env = "KODEGEN_PUSH_MIN_DELAY_MS", default_value_t = 50)]
    pub min_delay_ms: u64,

    /// Upper bound (exclusive) of the unlimited policy's jitter, in milliseconds
    #[arg(long, env = "KODEGEN_PUSH_MAX_DELAY_MS", default_value_t = 5000)]
    pub max_delay_ms: u64,

    /// Per-attempt growth of the bounded policy's jitter, in milliseconds
    #[arg(long, env = "KODEGEN_PUSH_BASE_DELAY_MS", default_value_t = 2000)]
    pub base_delay_ms: u64,

    /// Admit at most this many units at once (default: all)
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Cancel all remaining units as soon as one gives up
    #[arg(long)]
    pub abort_on_failure: bool,
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<()> {
        let run = self.command.run_args();
        if run.count == 0 {
            return Err(invalid("--count must be at least 1".to_string()));
        }
        if run.max_in_flight == Some(0) {
            return Err(invalid("--max-in-flight must be at least 1".to_string()));
        }

        if let Command::Push {
            repository, branch, ..
        } = &self.command
        {
            if !repository.contains('/') {
                return Err(invalid(format!(
                    "Invalid repository '{}'. Expected: owner/repo",
                    repository
                )));
            }
            if branch.trim().is_empty() {
                return Err(invalid("--branch must not be empty".to_string()));
            }
        }

        super::RetrySettings::from(run).validate()?;
        Ok(())
    }
}

fn invalid(reason: String) -> PushError {
    PushError::Cli(CliError::InvalidArguments { reason })
}

impl Command {
    /// Command name for messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Push { .. } => "push",
            Command::Simulate { .. } => "simulate",
        }
    }

    /// Run options of any command
    pub fn run_args(&self) -> &RunArgs {
        match self {
            Command::Push { run, .. } | Command::Simulate { run, .. } => run,
        }
    }
}

/// Configuration derived from command line arguments
#[derive(Debug)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            output: super::OutputManager::new(verbose, quiet),
        }
    }

    /// Print message
    pub fn println(&self, message: &str) {
        let _ = self.output.println(message);
    }

    /// Print error message (always shown)
    pub fn error_println(&self, message: &str) {
        self.output.error(message);
    }

    /// Print warning message
    pub fn warning_println(&self, message: &str) {
        let _ = self.output.warn(message);
    }

    /// Print success message
    pub fn success_println(&self, message: &str) {
        let _ = self.output.success(message);
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        let _ = self.output.section(title);
    }

    /// Print indented text
    pub fn indent(&self, message: &str) {
        let _ = self.output.indent(message);
    }

    /// Print indented text in verbose mode only
    pub fn detail(&self, message: &str) {
        let _ = self.output.detail(message);
    }
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.verbose, args.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("kodegen_push_stress").chain(argv.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn test_validate_reports_invalid_arguments() {
        let err = parse(&["simulate", "--count", "0"])
            .validate()
            .expect_err("zero count");
        assert!(matches!(err, PushError::Cli(CliError::InvalidArguments { .. })));

        let err = parse(&["simulate", "--policy", "bounded", "--max-attempts", "0"])
            .validate()
            .expect_err("zero cap");
        assert!(
            matches!(err, PushError::Cli(CliError::InvalidArguments { ref reason }) if reason.contains("max attempts"))
        );
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_output_flags_are_global() {
        let args = parse(&["simulate", "--quiet"]);
        assert!(args.quiet);
        assert!(!args.verbose);
        assert!(args.validate().is_ok());

        let args = parse(&["-v", "push", "isindir/poc"]);
        assert!(args.verbose);
        assert!(args.validate().is_ok());
    }
}
