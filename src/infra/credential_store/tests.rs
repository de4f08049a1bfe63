use super::*;
use crate::infra::auth_paths::{PathEnv, Platform};
use tempfile::TempDir;

fn linux_paths(home: &Path) -> AuthPaths {
    AuthPaths::resolve(home, &PathEnv::default(), Platform::Linux)
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

#[test]
fn load_reports_missing_files() {
    let dir = TempDir::new().unwrap();
    let store = FileCredentialStore::new(linux_paths(dir.path()));
    let load = store.load().unwrap();

    assert!(load.records.is_empty());
    assert!(load.diagnostics[0].starts_with("Auth paths checked: "));
    assert_eq!(
        load.diagnostics
            .iter()
            .filter(|d| d.starts_with("Missing auth file: "))
            .count(),
        2
    );
    assert_eq!(load.copilot_usage_token, None);
}

#[test]
fn higher_priority_file_wins_and_codex_cli_is_mapped() {
    let dir = TempDir::new().unwrap();
    let paths = linux_paths(dir.path());
    write(
        &paths.auth_files[0],
        r#"{"openai": {"type": "oauth", "access": "from-opencode", "refresh": "r"},
            "openrouter": {"type": "api", "key": "sk-or"},
            "broken": 42}"#,
    );
    write(
        &paths.codex_auth_file,
        r#"{"tokens": {"access_token": "from-codex", "refresh_token": "rc", "account_id": "acct"}}"#,
    );

    let load = FileCredentialStore::new(paths.clone()).load().unwrap();
    assert_eq!(
        load.records["openai"].access_token(),
        Some("from-opencode")
    );
    assert_eq!(load.records["openrouter"].api_key(), Some("sk-or"));
    assert!(!load.records.contains_key("broken"));
    assert!(load
        .diagnostics
        .iter()
        .any(|d| d.starts_with("Codex CLI auth loaded from ")));
    assert!(load
        .diagnostics
        .iter()
        .any(|d| d.starts_with("Skipped malformed auth entry 'broken'")));
}

#[test]
fn codex_cli_file_alone_provides_openai_label() {
    let dir = TempDir::new().unwrap();
    let paths = linux_paths(dir.path());
    write(
        &paths.codex_auth_file,
        r#"{"tokens": {"access_token": "a", "refresh_token": "r", "account_id": "acct"}}"#,
    );
    let load = FileCredentialStore::new(paths).load().unwrap();
    let record = &load.records["openai"];
    assert_eq!(record.declared_type(), Some("oauth"));
    assert_eq!(record.account(), Some("acct"));
}

#[test]
fn invalid_files_are_diagnosed_not_fatal() {
    let dir = TempDir::new().unwrap();
    let paths = linux_paths(dir.path());
    write(&paths.auth_files[0], "[1, 2]");
    write(&paths.codex_auth_file, r#"{"tokens": {}}"#);
    let load = FileCredentialStore::new(paths).load().unwrap();
    assert!(load.records.is_empty());
    assert!(load
        .diagnostics
        .iter()
        .any(|d| d.starts_with("Auth file is not a JSON object: ")));
    assert!(load
        .diagnostics
        .iter()
        .any(|d| d.starts_with("Invalid Codex auth in ")));
}

#[test]
fn anthropic_falls_back_to_claude_code_and_env_overrides() {
    let dir = TempDir::new().unwrap();
    let paths = linux_paths(dir.path());
    write(
        &paths.claude_credential_files[0],
        r#"{"claudeAiOauth": {"accessToken": "claude-a", "refreshToken": "claude-r", "expiresAt": 1700000000000}}"#,
    );

    let load = FileCredentialStore::new(paths.clone()).load().unwrap();
    let record = &load.records["anthropic"];
    assert_eq!(record.access_token(), Some("claude-a"));
    assert_eq!(record.expires, Some(1_700_000_000_000));

    let load = FileCredentialStore::new(paths)
        .with_anthropic_env_token(Some("env-token".to_string()))
        .load()
        .unwrap();
    assert_eq!(load.records["anthropic"].access_token(), Some("env-token"));
}

#[test]
fn copilot_usage_token_is_read_from_side_channel_file() {
    let dir = TempDir::new().unwrap();
    let paths = linux_paths(dir.path());
    write(&paths.copilot_usage_token_file(), r#"{"token": "gho_side"}"#);
    let load = FileCredentialStore::new(paths).load().unwrap();
    assert_eq!(load.copilot_usage_token.as_deref(), Some("gho_side"));
}

#[test]
fn save_record_preserves_other_labels() {
    let dir = TempDir::new().unwrap();
    let paths = linux_paths(dir.path());
    write(
        &paths.auth_files[0],
        r#"{"anthropic": {"type": "oauth", "access": "keep", "custom": true}}"#,
    );
    let store = FileCredentialStore::new(paths.clone());
    store
        .save_record(
            "github-copilot",
            &RawCredentialRecord::oauth("gho_1", Some("gho_1".into()), Some(0), None),
        )
        .unwrap();

    let raw: Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.auth_files[0]).unwrap()).unwrap();
    assert_eq!(raw["anthropic"]["custom"], true);
    assert_eq!(raw["github-copilot"]["access"], "gho_1");
    assert_eq!(raw["github-copilot"]["expires"], 0);

    let load = store.load().unwrap();
    assert_eq!(load.records.len(), 2);
}

#[test]
fn save_record_refuses_to_overwrite_unparsable_file() {
    let dir = TempDir::new().unwrap();
    let paths = linux_paths(dir.path());
    write(&paths.auth_files[0], "{ truncated");
    let err = FileCredentialStore::new(paths.clone())
        .save_record("openai", &RawCredentialRecord::default())
        .unwrap_err();
    assert_eq!(err.code(), "SYSTEM_ERROR");
    assert_eq!(
        std::fs::read_to_string(&paths.auth_files[0]).unwrap(),
        "{ truncated"
    );
}

#[test]
fn memory_store_round_trips_records() {
    let store = MemoryCredentialStore::default();
    store
        .save_record("openai", &RawCredentialRecord::oauth("a", None, None, None))
        .unwrap();
    assert_eq!(store.record("openai").unwrap().access_token(), Some("a"));
    assert_eq!(store.load().unwrap().records.len(), 1);
}

#[test]
fn save_records_updates_every_label_together() {
    let dir = TempDir::new().unwrap();
    let paths = linux_paths(dir.path());
    write(
        &paths.auth_files[0],
        r#"{"openai": {"type": "oauth", "access": "old"}, "openrouter": {"type": "api", "key": "k"}}"#,
    );
    let store = FileCredentialStore::new(paths.clone());
    store
        .save_records(&[
            (
                "work".to_string(),
                RawCredentialRecord::oauth("new", Some("r".into()), None, None),
            ),
            (
                "openai".to_string(),
                RawCredentialRecord::oauth("new", Some("r".into()), None, None),
            ),
        ])
        .unwrap();

    let raw: Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.auth_files[0]).unwrap()).unwrap();
    assert_eq!(raw["work"]["access"], "new");
    assert_eq!(raw["openai"]["access"], "new");
    assert_eq!(raw["openrouter"]["key"], "k");
    assert!(!paths.auth_files[0].with_extension("json.tmp").exists());
}

#[test]
fn save_records_on_unparsable_file_changes_no_label() {
    let dir = TempDir::new().unwrap();
    let paths = linux_paths(dir.path());
    write(&paths.auth_files[0], "{ truncated");
    let record = RawCredentialRecord::oauth("a", None, None, None);
    let err = FileCredentialStore::new(paths.clone())
        .save_records(&[
            ("work".to_string(), record.clone()),
            ("openai".to_string(), record),
        ])
        .unwrap_err();
    assert_eq!(err.code(), "SYSTEM_ERROR");
    assert_eq!(
        std::fs::read_to_string(&paths.auth_files[0]).unwrap(),
        "{ truncated"
    );
}

#[test]
fn memory_store_keeps_serving_after_a_writer_panics() {
    let store = std::sync::Arc::new(MemoryCredentialStore::default());
    let writer = std::sync::Arc::clone(&store);
    let _ = std::thread::spawn(move || {
        let mut state = writer.state.lock().unwrap();
        state.records.insert(
            "openai".to_string(),
            RawCredentialRecord::oauth("a", None, None, None),
        );
        panic!("writer died holding the lock");
    })
    .join();

    assert!(store.state.is_poisoned());
    assert_eq!(store.record("openai").unwrap().access_token(), Some("a"));
    store
        .save_record("work", &RawCredentialRecord::oauth("b", None, None, None))
        .unwrap();
    assert_eq!(store.load().unwrap().records.len(), 2);
}
