use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use calshare::auth::{hash_password, issue_token_with};
use calshare::config::ServerConfig;
use calshare::server::{AppState, create_router};
use calshare::store::{SqliteStore, Store};
use calshare::types::{ROLE_ADMIN, ROLE_USER, User};
use chrono::Utc;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "correct horse battery";

/// An in-process server bound to an ephemeral port, backed by a temp database
/// that already holds an admin account.
pub struct TestServer {
    pub temp_dir: TempDir,
    pub base_url: String,
    pub admin_id: String,
    pub admin_token: String,
    pub store: Arc<SqliteStore>,
    client: reqwest::Client,
    server: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..ServerConfig::default()
        };

        let store = Arc::new(SqliteStore::new(config.db_path()).expect("open store"));
        store.initialize().expect("initialize store");

        let now = Utc::now();
        let admin = User {
            id: Uuid::new_v4().to_string(),
            email: "admin@calshare.test".to_string(),
            name: "Admin".to_string(),
            password_hash: hash_password(TEST_PASSWORD).expect("hash password"),
            active: true,
            roles: BTreeSet::from([ROLE_USER.to_string(), ROLE_ADMIN.to_string()]),
            created_at: now,
            updated_at: now,
        };
        store.create_user(&admin).expect("create admin");

        let state = Arc::new(AppState::new(store.clone(), &config));
        let (_, admin_token) = issue_token_with(store.as_ref(), &state.tokens, &admin.id, None)
            .expect("issue admin token");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let app = create_router(state);

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        Self {
            temp_dir,
            base_url: format!("http://{addr}"),
            admin_id: admin.id,
            admin_token,
            store,
            client: reqwest::Client::new(),
            server,
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Registers a user and logs them in. Returns (user_id, token).
    pub async fn register_and_login(&self, email: &str, name: &str) -> (String, String) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "email": email, "name": name, "password": TEST_PASSWORD }))
            .send()
            .await
            .expect("register");
        assert_eq!(resp.status(), 201, "register {email}");
        let body: Value = resp.json().await.expect("parse register response");
        let user_id = body["data"]["id"].as_str().expect("user id").to_string();

        let token = self.login(email, TEST_PASSWORD).await;
        (user_id, token)
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login");
        assert_eq!(resp.status(), 201, "login {email}");
        let body: Value = resp.json().await.expect("parse login response");
        body["data"]["token"].as_str().expect("token").to_string()
    }

    /// Creates a calendar as the token's user and returns its id.
    pub async fn create_calendar(&self, token: &str, name: &str) -> String {
        let resp = self
            .client
            .post(self.url("/api/v1/calendars"))
            .bearer_auth(token)
            .json(&json!({ "name": name }))
            .send()
            .await
            .expect("create calendar");
        assert_eq!(resp.status(), 201, "create calendar {name}");
        let body: Value = resp.json().await.expect("parse calendar response");
        body["data"]["id"].as_str().expect("calendar id").to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.abort();
    }
}
