//! CLI integration tests for calshare admin commands.
//!
//! Each test uses an isolated temp directory for the database, ensuring tests
//! can run in parallel safely.

#![allow(deprecated)] // Command::cargo_bin deprecation only affects custom build dirs

use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use calshare::store::{SqliteStore, Store};
use calshare::types::ROLE_ADMIN;
use predicates::prelude::*;

struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    fn data_dir_str(&self) -> String {
        self.data_dir().to_string_lossy().to_string()
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("calshare").expect("failed to find binary");
        cmd.env("NO_COLOR", "1");
        cmd
    }

    fn init(&self, extra: &[&str]) -> assert_cmd::assert::Assert {
        self.cmd()
            .args([
                "admin",
                "init",
                "--data-dir",
                &self.data_dir_str(),
                "--non-interactive",
            ])
            .args(extra)
            .assert()
    }

    fn store(&self) -> SqliteStore {
        SqliteStore::new(self.data_dir().join("calshare.db")).expect("open store")
    }
}

#[test]
fn test_init_creates_admin_and_token_file() {
    let ctx = TestContext::new();

    ctx.init(&["--email", "ops@example.com"])
        .success()
        .stdout(predicate::str::contains("Admin account: ops@example.com"))
        .stdout(predicate::str::contains("Generated password:"))
        .stdout(predicate::str::contains("calshare_"));

    let token_path = ctx.data_dir().join(".admin_token");
    let token = std::fs::read_to_string(&token_path).expect("read token file");
    assert!(token.starts_with("calshare_"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&token_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let store = ctx.store();
    let admin = store
        .get_user_by_email("ops@example.com")
        .unwrap()
        .expect("admin user exists");
    assert!(admin.has_role(ROLE_ADMIN));
    assert!(admin.active);
    assert_eq!(store.list_user_tokens(&admin.id).unwrap().len(), 1);
}

#[test]
fn test_init_defaults_email() {
    let ctx = TestContext::new();

    ctx.init(&[]).success();

    let admin = ctx
        .store()
        .get_user_by_email("admin@calshare.local")
        .unwrap();
    assert!(admin.is_some());
}

#[test]
fn test_init_refuses_reinitialization() {
    let ctx = TestContext::new();

    ctx.init(&[]).success();
    let first_token = std::fs::read_to_string(ctx.data_dir().join(".admin_token")).unwrap();

    ctx.init(&[])
        .failure()
        .stderr(predicate::str::contains("already initialized"));

    let token = std::fs::read_to_string(ctx.data_dir().join(".admin_token")).unwrap();
    assert_eq!(token, first_token);
}

#[test]
fn test_init_rejects_invalid_email() {
    let ctx = TestContext::new();

    ctx.init(&["--email", "not-an-email"])
        .failure()
        .stderr(predicate::str::contains("Email"));

    assert!(!ctx.data_dir().join(".admin_token").exists());
}

#[test]
fn test_serve_requires_init() {
    let ctx = TestContext::new();

    ctx.cmd()
        .args(["serve", "--data-dir", &ctx.data_dir_str(), "--port", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Server not initialized"));
}

#[test]
fn test_serve_rejects_invalid_config_file() {
    let ctx = TestContext::new();
    let config_path = ctx.data_dir().join("calshare.toml");
    std::fs::write(&config_path, "token_ttl_seconds = -1\n").unwrap();

    ctx.cmd()
        .args(["serve", "--config"])
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("token_ttl_seconds"));
}
