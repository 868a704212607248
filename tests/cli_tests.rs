#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn cli() -> Command {
        let mut cmd = Command::cargo_bin("kodegen_push_stress").expect("binary builds");
        cmd.env_remove("KODEGEN_PUSH_MAX_ATTEMPTS")
            .env_remove("KODEGEN_PUSH_MIN_DELAY_MS")
            .env_remove("KODEGEN_PUSH_MAX_DELAY_MS")
            .env_remove("KODEGEN_PUSH_BASE_DELAY_MS")
            .env("RUST_LOG", "off");
        cmd
    }

    #[test]
    fn test_simulate_lands_every_unit() {
        cli()
            .args([
                "simulate",
                "--count",
                "20",
                "--writers",
                "1",
                "--min-delay-ms",
                "1",
                "--max-delay-ms",
                "5",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "All 20 pushes to branch master are done!",
            ));
    }

    #[test]
    fn test_simulate_bounded_policy_with_custom_branch() {
        cli()
            .args([
                "simulate",
                "-n",
                "8",
                "-b",
                "main",
                "--policy",
                "bounded",
                "--max-attempts",
                "50",
                "--base-delay-ms",
                "2",
                "--max-in-flight",
                "4",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("All 8 pushes to branch main are done!"));
    }

    #[test]
    fn test_zero_max_attempts_rejected() {
        cli()
            .args([
                "simulate",
                "--count",
                "1",
                "--policy",
                "bounded",
                "--max-attempts",
                "0",
            ])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("max attempts"));
    }

    #[test]
    fn test_invalid_arguments_come_with_suggestions() {
        cli()
            .args(["simulate", "--min-delay-ms", "100", "--max-delay-ms", "10"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid arguments"))
            .stdout(predicate::str::contains("--help"));
    }

    #[test]
    fn test_quiet_run_prints_nothing() {
        cli()
            .args([
                "simulate",
                "--quiet",
                "-n",
                "5",
                "--min-delay-ms",
                "1",
                "--max-delay-ms",
                "5",
            ])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }

    #[test]
    fn test_verbose_run_lists_every_unit() {
        cli()
            .args([
                "simulate",
                "-v",
                "-n",
                "3",
                "--min-delay-ms",
                "1",
                "--max-delay-ms",
                "5",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Unit 0 unique-file-"))
            .stdout(predicate::str::contains("Unit 2 unique-file-"));
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        cli()
            .args(["simulate", "--quiet", "--verbose"])
            .assert()
            .failure();
    }

    #[test]
    fn test_zero_count_rejected() {
        cli()
            .args(["simulate", "--count", "0"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("--count"));
    }

    #[test]
    fn test_push_without_token_fails() {
        cli()
            .env_remove("GITHUB_TOKEN")
            .env_remove("GH_TOKEN")
            .args(["push", "isindir/poc", "--count", "1"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_push_rejects_malformed_repository() {
        cli()
            .env("GITHUB_TOKEN", "unused")
            .args(["push", "isindir", "--count", "1"])
            .assert()
            .code(1)
            .stderr(predicate::str::contains("owner/repo"));
    }
}
