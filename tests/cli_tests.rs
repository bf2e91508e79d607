//! Integration tests for the stdout-relay binary

use assert_cmd::prelude::*;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::process::{Child, ChildStdout, Command as StdCommand, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const FIXTURE: &str = include_str!("fixtures/playbook_result.json");

fn relay() -> Command {
    Command::cargo_bin("stdout-relay").unwrap()
}

/// Upstream that prints something, then stays silent with its stdout open
fn silent_upstream(script: &str) -> (Child, ChildStdout) {
    let mut child = StdCommand::new("sh")
        .args(["-c", script])
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    let stdout = child.stdout.take().unwrap();
    (child, stdout)
}

/// Run the relay on `upstream` and return its output with the wall time taken
fn relay_from(upstream: ChildStdout, args: &[&str]) -> (Output, Duration) {
    let started = Instant::now();
    let output = StdCommand::cargo_bin("stdout-relay")
        .unwrap()
        .args(args)
        .stdin(upstream)
        .output()
        .unwrap();
    (output, started.elapsed())
}

#[test]
fn test_help_lists_flags() {
    relay()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--check-stats"))
        .stdout(predicate::str::contains("--skip"));
}

#[test]
fn test_text_relay_with_prepend_and_skip() {
    relay()
        .args(["--prepend", "[deploy]", "--skip", "skipping"])
        .write_stdin("PLAY [all]\nskipping: [db1]\nok: [web1]\n")
        .assert()
        .success()
        .stdout("[deploy] PLAY [all]\n\n[deploy] ok: [web1]\n");
}

#[test]
fn test_logs_stay_off_stdout() {
    relay()
        .arg("-vv")
        .write_stdin("only this\n")
        .assert()
        .success()
        .stdout("only this\n")
        .stderr(predicate::str::contains("Pipeline run finished"));
}

#[test]
fn test_jsonl_malformed_record_fails_after_relaying_the_rest() {
    relay()
        .args(["--mode", "jsonl"])
        .write_stdin("{\"b\":1,\"a\":2}\nNOT-JSON\n{\"a\":3}\n")
        .assert()
        .code(1)
        .stdout("{\"a\":2,\"b\":1}\n{\"a\":3}\n")
        .stderr(predicate::str::contains("1 malformed record(s)"))
        .stderr(predicate::str::contains("NOT-JSON"));
}

#[test]
fn test_check_stats_reports_unreachable_host() {
    let input = format!("{FIXTURE}\nPlaybook run took 0 days, 0 hours, 1 minutes, 2 seconds\n");
    relay()
        .args(["--mode", "json", "--check-stats"])
        .write_stdin(input)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"plays\""))
        .stdout(predicate::str::contains("Playbook run took").not())
        .stderr(predicate::str::contains("host db1 finished with 1 unreachable"));
}

#[test]
fn test_check_stats_passes_for_healthy_run() {
    relay()
        .args(["--mode", "json", "--check-stats"])
        .write_stdin("{\"stats\": {\"web1\": {\"ok\": 3}}}\n")
        .assert()
        .success();
}

#[test]
fn test_timeout_ends_process_while_upstream_is_silent() {
    let (mut upstream, stdout) = silent_upstream("echo a; exec sleep 10");

    let (output, elapsed) = relay_from(stdout, &["--timeout-secs", "1"]);
    upstream.kill().ok();
    upstream.wait().ok();

    assert!(elapsed < Duration::from_secs(4), "relay ran for {elapsed:?}");
    output.assert().success().stdout("a\n");
}

#[test]
fn test_check_stats_streams_partial_output_on_timeout() {
    let (mut upstream, stdout) = silent_upstream(r#"echo '{"stats":{}}'; exec sleep 10"#);

    let (output, elapsed) = relay_from(
        stdout,
        &["--mode", "json", "--check-stats", "--timeout-secs", "1"],
    );
    upstream.kill().ok();
    upstream.wait().ok();

    assert!(elapsed < Duration::from_secs(4), "relay ran for {elapsed:?}");
    output
        .assert()
        .success()
        .stdout("{\"stats\":{}}\n")
        .stderr(predicate::str::contains("stats not checked"));
}

#[test]
fn test_check_stats_needs_json_mode() {
    relay()
        .arg("--check-stats")
        .write_stdin("{}\n")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--check-stats needs --mode json"));
}

#[test]
fn test_config_file_and_flag_override() -> anyhow::Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("relay.toml");
    fs::write(
        &config_path,
        r#"
prepend = "[file]"
append = "(staging)"
"#,
    )?;

    relay()
        .arg("--config")
        .arg(&config_path)
        .args(["--prepend", "[flag]"])
        .write_stdin("ok\n")
        .assert()
        .success()
        .stdout("[flag] ok (staging)\n");
    Ok(())
}

#[test]
fn test_invalid_skip_pattern_is_rejected() {
    relay()
        .args(["--skip", "(unclosed"])
        .write_stdin("x\n")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_zero_capacity_is_rejected() {
    relay()
        .args(["--queue-capacity", "0"])
        .write_stdin("x\n")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Queue capacity must be positive"));
}
