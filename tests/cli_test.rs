//! Integration tests for the rtbridge command line
//!
//! Covers argument handling, error reporting and exit codes without a
//! package manager or a server.

mod common;

use common::{servers_toml, TestProject};
use predicates::prelude::*;

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[tokio::test]
async fn test_help_lists_commands() {
    let project = TestProject::new();
    let output = project.run(&["--help"]).await;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let listed = predicate::str::contains("npm")
        .and(predicate::str::contains("yarn"))
        .and(predicate::str::contains("terraform"))
        .and(predicate::str::contains("rt"));
    assert!(listed.eval(&stdout), "help output: {stdout}");
}

#[tokio::test]
async fn test_npm_without_project_config_fails() {
    let project = TestProject::new();
    project.write_servers(&servers_toml("main", "https://acme.jfrog.io"));

    let output = project.run(&["npm", "install"]).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(
        predicate::str::contains("npm project configuration").eval(&stderr(&output)),
        "stderr: {}",
        stderr(&output)
    );
}

#[tokio::test]
async fn test_terraform_unknown_flag() {
    let project = TestProject::new();
    let output = project
        .run(&["terraform", "publish", "--namespace=ns", "--provider=aws", "--tag=v1", "--bogus"])
        .await;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Unknown flag: --bogus."));
}

#[tokio::test]
async fn test_terraform_unsupported_subcommand() {
    let project = TestProject::new();
    let output = project.run(&["terraform", "apply"]).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Unsupported terraform command 'apply'"));
}

#[tokio::test]
async fn test_transfer_rejects_same_server() {
    let project = TestProject::new();
    project.write_servers(
        r#"
[servers.src]
url = "https://acme.jfrog.io"
access_token = "a"

[servers.dst]
url = "https://acme.jfrog.io/"
access_token = "b"
"#,
    );

    let output = project.run(&["rt", "transfer-config-merge", "src", "dst"]).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("identical"));
}

#[tokio::test]
async fn test_transfer_unknown_server() {
    let project = TestProject::new();
    project.write_servers(&servers_toml("src", "https://acme.jfrog.io"));

    let output = project.run(&["rt", "transfer-config-merge", "src", "missing"]).await;
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("server 'missing' is not configured"));
}

#[tokio::test]
async fn test_json_error_document() {
    let project = TestProject::new();
    let output = project.run(&["--json", "terraform", "apply"]).await;
    assert_eq!(output.status.code(), Some(1));

    let doc: serde_json::Value = serde_json::from_str(stderr(&output).lines().last().unwrap_or_default())
        .expect("stderr should end with a JSON document");
    assert_eq!(doc["exit_code"], 1);
    assert!(doc["error"].as_str().unwrap().contains("apply"));
}

#[tokio::test]
async fn test_failed_install_leaves_project_untouched() {
    use assert_fs::prelude::*;

    let project = TestProject::new();
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("package.json").write_str(r#"{"name":"app","version":"1.0.0"}"#).unwrap();
    dir.child(".npmrc").write_str("registry=https://registry.npmjs.org/\n").unwrap();

    let output = project
        .command(&["npm", "ci"])
        .current_dir(dir.path())
        .output()
        .await
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    dir.child(".npmrc")
        .assert(predicate::str::contains("registry=https://registry.npmjs.org/"));
    dir.child("node_modules").assert(predicate::path::missing());
}
