#![allow(dead_code)]

use aio_usage::infra::auth_paths::{AuthPaths, PathEnv, Platform};
use aio_usage::infra::credential_store::FileCredentialStore;
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

/// Isolated home directory with Linux-style auth paths resolved under it.
pub struct TestHome {
    home: TempDir,
    pub paths: AuthPaths,
}

impl TestHome {
    pub fn new() -> Self {
        let home = tempfile::tempdir().expect("tempdir");
        let paths = AuthPaths::resolve(home.path(), &PathEnv::default(), Platform::Linux);
        Self { home, paths }
    }

    pub fn home_dir(&self) -> &Path {
        self.home.path()
    }

    pub fn write_auth(&self, body: Value) {
        write_json(&self.paths.auth_files[0], &body);
    }

    pub fn write_codex_cli_auth(&self, body: Value) {
        write_json(&self.paths.codex_auth_file, &body);
    }

    pub fn read_auth(&self) -> Value {
        let content = std::fs::read_to_string(&self.paths.auth_files[0]).expect("read auth file");
        serde_json::from_str(&content).expect("auth file is json")
    }

    pub fn store(&self) -> FileCredentialStore {
        FileCredentialStore::new(self.paths.clone())
    }
}

pub fn write_json(path: &Path, body: &Value) {
    std::fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent dir");
    std::fs::write(path, serde_json::to_vec_pretty(body).expect("encode json")).expect("write json");
}

/// Serves `app` on an ephemeral port and returns its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock server");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    format!("http://{addr}")
}
