//! Smoke tests for the binary surface: flags, exit codes, config
//! validation.

use std::process::Command;

fn portal_server() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_portal-server"));
    cmd.env_remove("PORTAL__DATABASE__DSN");
    cmd
}

/// Minimal valid environment: a DSN plus identity-provider credentials.
fn with_valid_env(cmd: &mut Command) -> &mut Command {
    cmd.env("PORTAL__DATABASE__DSN", "sqlite::memory:")
        .env("PORTAL__AUTH__IDENTITY_PROVIDER__TENANT_ID", "tenant")
        .env("PORTAL__AUTH__IDENTITY_PROVIDER__CLIENT_ID", "client")
        .env("PORTAL__AUTH__IDENTITY_PROVIDER__CLIENT_SECRET", "secret")
}

#[test]
fn help_prints_usage() {
    let output = portal_server().arg("--help").output().expect("run binary");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("MCP Portal"));
    assert!(stdout.contains("--config"));
}

#[test]
fn missing_database_dsn_exits_with_config_code() {
    let output = portal_server().arg("check").output().expect("run binary");
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("database.dsn"));
}

#[test]
fn nonexistent_config_file_exits_with_config_code() {
    let output = portal_server()
        .args(["--config", "/nonexistent/portal.yaml", "check"])
        .output()
        .expect("run binary");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn check_passes_with_dsn_from_environment() {
    let mut cmd = portal_server();
    let output = with_valid_env(&mut cmd)
        .arg("check")
        .output()
        .expect("run binary");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("valid"));
}

#[test]
fn print_config_renders_effective_configuration() {
    let mut cmd = portal_server();
    let output = with_valid_env(&mut cmd)
        .args(["--print-config"])
        .output()
        .expect("run binary");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("sqlite::memory:"));
    assert!(stdout.contains("\"executor\""));
}

#[test]
fn port_override_appears_in_printed_config() {
    let mut cmd = portal_server();
    let output = with_valid_env(&mut cmd)
        .args(["--port", "9099", "--print-config"])
        .output()
        .expect("run binary");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("9099"));
}
