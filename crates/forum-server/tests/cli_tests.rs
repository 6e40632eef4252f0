//! Tests that run the compiled `forum` binary against temporary roots.

use assert_cmd::Command;
use forum_test_utils::{ArchiveBuilder, TestExtensions};
use predicates::prelude::*;
use serde_json::json;

/// A `forum` command pointed at `env` through a config file.
fn forum_cmd(env: &TestExtensions) -> Command {
    let config = env.base().join("forum.toml");
    if !config.exists() {
        std::fs::write(
            &config,
            "[extensions]\nroot = \"extensions\"\nconfigs_dir = \"ExtensionConfigs\"\nprotected = [\"core-editor\"]\n",
        )
        .unwrap();
    }

    let mut cmd = Command::cargo_bin("forum").expect("Failed to find forum binary");
    cmd.arg("--config")
        .arg(&config)
        .env_remove("FORUM_CONFIG")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let env = TestExtensions::new();
    forum_cmd(&env)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("activate"));
}

#[test]
fn test_list_empty_root() {
    let env = TestExtensions::new();
    forum_cmd(&env)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No extensions installed"));
}

#[test]
fn test_install_then_list_json() {
    let env = TestExtensions::new();
    let archive = env.base().join("cookie-consent.zip");
    std::fs::write(&archive, ArchiveBuilder::plugin("cookie-consent").build()).unwrap();

    forum_cmd(&env)
        .arg("install")
        .arg(&archive)
        .args(["--user", "alice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Installed 'Cookie Consent'"));

    let output = forum_cmd(&env).args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());
    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listing[0]["id"], "cookie-consent");
    assert_eq!(listing[0]["status"], "inactive");
    assert_eq!(listing[0]["installedBy"], "alice");
}

#[test]
fn test_enable_and_disable() {
    let env = TestExtensions::new();
    env.write_plugin("alpha", false);

    forum_cmd(&env)
        .args(["enable", "alpha"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Enabled 'Alpha'"));
    assert_eq!(env.read_json("extensions/alpha/manifest.json")["enabled"], true);

    forum_cmd(&env)
        .args(["disable", "alpha"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Disabled 'Alpha'"));
    assert_eq!(env.read_json("extensions/alpha/manifest.json")["enabled"], false);
}

#[test]
fn test_unknown_extension_fails() {
    let env = TestExtensions::new();
    forum_cmd(&env)
        .args(["enable", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown extension: ghost"));
}

#[test]
fn test_protected_uninstall_fails() {
    let env = TestExtensions::new();
    env.write_plugin("core-editor", true);

    forum_cmd(&env)
        .args(["uninstall", "core-editor"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("protected"));
    env.assert_file_exists("extensions/core-editor/manifest.json");
}

#[test]
fn test_config_set_and_get() {
    let env = TestExtensions::new();
    env.write_plugin_with_schema(
        "counter",
        json!({"groups": [{"key": "general", "properties": {
            "limit": {"type": "integer", "default": 5, "maximum": 10}
        }}]}),
    );

    forum_cmd(&env)
        .args(["config", "set", "counter", "limit=8"])
        .assert()
        .success();

    let output = forum_cmd(&env).args(["config", "get", "counter"]).output().unwrap();
    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["userConfig"], json!({"limit": 8}));
    assert_eq!(record["defaultConfig"], json!({"limit": 5}));

    forum_cmd(&env)
        .args(["config", "set", "counter", "limit=80"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("limit: must be at most 10"));
}

#[test]
fn test_token_prints_uuid() {
    let env = TestExtensions::new();
    forum_cmd(&env)
        .arg("token")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[0-9a-f-]{36}\n$").unwrap());
}

#[test]
fn test_malformed_config_file_fails() {
    let env = TestExtensions::new();
    std::fs::write(env.base().join("forum.toml"), "[extensions\n").unwrap();

    forum_cmd(&env)
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
