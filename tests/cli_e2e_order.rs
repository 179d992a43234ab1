//! End-to-end tests for the `order` and `tool` commands.

mod common;
use common::prelude::*;

const DIAMOND: &str = r#"
packages:
  - name: app
    depends: [lib, tools]
  - name: lib
    depends: [base]
  - name: tools
    depends: [base]
  - name: base
"#;

#[test]
fn test_order_prints_build_order() {
    let fixture = TestFixture::new().with_manifest(DIAMOND);

    fixture
        .command()
        .arg("order")
        .assert()
        .success()
        .stdout(predicate::eq("base\nlib\ntools\napp\n"));
}

#[test]
fn test_order_tree() {
    let fixture = TestFixture::new().with_manifest(DIAMOND);

    fixture
        .command()
        .args(["order", "--tree"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("app"))
        .stdout(predicate::str::contains("lib"))
        .stdout(predicate::str::contains("base"));
}

#[test]
fn test_order_cycle() {
    let fixture = TestFixture::new().with_manifest(manifests::CYCLE);

    fixture
        .command()
        .arg("order")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Cycle detected"));
}

#[test]
fn test_order_explicit_manifest() {
    let fixture = TestFixture::new().with_file("conf/build.yaml", "packages: [{ name: solo }]");

    fixture
        .command()
        .args(["order", "--manifest", "conf/build.yaml"])
        .assert()
        .success()
        .stdout(predicate::eq("solo\n"));
}

#[cfg(unix)]
#[test]
fn test_tool_resolves_from_path() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .env("PATH", "/bin:/usr/bin")
        .args(["tool", "sh"])
        .assert()
        .success()
        .stdout(predicate::str::ends_with("/sh\n"));
}

#[test]
fn test_tool_not_found() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .args(["tool", "metabuild-no-such-tool"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Tool metabuild-no-such-tool"));
}

#[test]
fn test_help_and_version() {
    let fixture = TestFixture::new();
    fixture.command().arg("--help").assert().success();
    fixture.command().arg("--version").assert().success();
    fixture.command().arg("frobnicate").assert().code(2);
}
