use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `tsync` isolated from the caller's environment and home.
fn tsync(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tsync").unwrap();
    cmd.arg("--home")
        .arg(home.path())
        .env_remove("TRACKSYNC_HOME")
        .env_remove("TRACKSYNC_PROVIDER")
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITHUB_OWNER")
        .env_remove("GITHUB_REPO")
        .env_remove("AZURE_DEVOPS_PAT")
        .env_remove("AZURE_DEVOPS_ORG")
        .env_remove("AZURE_DEVOPS_PROJECT")
        .env_remove("RUST_LOG");
    cmd
}

fn add_item(home: &TempDir, title: &str) -> String {
    let output = tsync(home)
        .args(["--json", "item", "add", title])
        .output()
        .unwrap();
    assert!(output.status.success());
    let item: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    item["local_id"].as_str().unwrap().to_string()
}

#[test]
fn test_item_add_and_list() {
    let home = TempDir::new().unwrap();
    let id = add_item(&home, "Fix login redirect");
    assert!(id.starts_with("wi_"));

    tsync(&home)
        .args(["--json", "item", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fix login redirect"))
        .stdout(predicate::str::contains("\"count\":1"));

    assert!(home.path().join("data").join("tracksync.db").exists());
}

#[test]
fn test_item_add_normalizes_status() {
    let home = TempDir::new().unwrap();
    tsync(&home)
        .args(["--json", "item", "add", "Ship it", "--status", "wip", "--kind", "story"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\":\"in_progress\""))
        .stdout(predicate::str::contains("\"kind\":\"feature\""));
}

#[test]
fn test_invalid_status_exits_with_validation_code() {
    let home = TempDir::new().unwrap();
    tsync(&home)
        .args(["--json", "item", "add", "Broken", "--status", "blockd"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("INVALID_ARGUMENT"));
}

#[test]
fn test_show_missing_item() {
    let home = TempDir::new().unwrap();
    tsync(&home)
        .args(["--json", "item", "show", "wi_000000000000"])
        .assert()
        .code(3);
}

#[test]
fn test_config_set_and_show_redacts_tokens() {
    let home = TempDir::new().unwrap();
    tsync(&home)
        .args(["config", "set", "github.token", "ghp_supersecret1234"])
        .assert()
        .success();
    tsync(&home)
        .args(["config", "set", "github.owner", "acme"])
        .assert()
        .success();

    tsync(&home)
        .args(["--json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("acme"))
        .stdout(predicate::str::contains("****1234"))
        .stdout(predicate::str::contains("supersecret").not());
}

#[test]
fn test_config_set_unknown_key_suggests() {
    let home = TempDir::new().unwrap();
    tsync(&home)
        .args(["config", "set", "github.ownr", "acme"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("github.owner"));
}

#[test]
fn test_push_without_provider_is_config_error() {
    let home = TempDir::new().unwrap();
    let id = add_item(&home, "Needs a remote");
    tsync(&home).args(["push", &id]).assert().code(7);
}

#[test]
fn test_push_dry_run_needs_no_credentials() {
    let home = TempDir::new().unwrap();
    for i in 0..3 {
        add_item(&home, &format!("item {i}"));
    }
    tsync(&home)
        .args(["--json", "--dry-run", "push", "--all", "--max-concurrent", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"dryRun\":true"))
        .stdout(predicate::str::contains("\"succeeded\":3"))
        .stdout(predicate::str::contains("\"estimatedDurationMs\":1000"));
}

#[test]
fn test_version() {
    let home = TempDir::new().unwrap();
    tsync(&home)
        .args(["--json", "version"])
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")))
        .stdout(predicate::str::contains(r#""activeProvider":null"#));

    tsync(&home)
        .args(["--json", "--provider", "azure", "version"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""activeProvider":"azure_devops""#))
        .stdout(predicate::str::contains(r#""backends":["github","azure_devops"]"#));
}
