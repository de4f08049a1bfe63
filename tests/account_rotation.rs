mod support;

use aio_usage::domain::account_rotation::RotationTarget;
use aio_usage::oauth::refresh::HttpCodexRefresher;
use aio_usage::oauth::TokenEndpoint;
use aio_usage::usage::rotation::rotate_codex_account;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const FAR_FUTURE_MS: i64 = 4_102_444_800_000;

async fn token_mock(calls: Arc<AtomicUsize>, succeed: bool) -> TokenEndpoint {
    let app = Router::new().route(
        "/oauth/token",
        post(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if succeed {
                    (
                        axum::http::StatusCode::OK,
                        Json(json!({"access_token": "access-b2", "refresh_token": "refresh-b2", "expires_in": 600})),
                    )
                } else {
                    (
                        axum::http::StatusCode::BAD_REQUEST,
                        Json(json!({"error": "invalid_grant"})),
                    )
                }
            }
        }),
    );
    let base = support::serve(app).await;
    TokenEndpoint {
        token_url: format!("{base}/oauth/token"),
        client_id: "client".to_string(),
    }
}

fn seed(home: &support::TestHome, b_expires: i64) {
    home.write_auth(json!({
        "openai": {"type": "oauth", "access": "access-a", "refresh": "refresh-a", "accountId": "A", "expires": FAR_FUTURE_MS},
        "work": {"type": "oauth", "access": "access-a", "refresh": "refresh-a", "accountId": "A", "expires": FAR_FUTURE_MS},
        "personal": {"type": "oauth", "access": "access-b", "refresh": "refresh-b", "accountId": "B", "expires": b_expires},
        "openrouter": {"type": "api", "key": "sk-or-keep"}
    }));
}

#[tokio::test]
async fn rotation_writes_current_account_and_keeps_other_labels() {
    let home = support::TestHome::new();
    seed(&home, FAR_FUTURE_MS);
    let calls = Arc::new(AtomicUsize::new(0));
    let refresher = HttpCodexRefresher::new(
        reqwest::Client::new(),
        token_mock(Arc::clone(&calls), true).await,
    );

    let selection = rotate_codex_account(Arc::new(home.store()), &refresher, RotationTarget::Next)
        .await
        .unwrap();

    // `openai` and `work` are the same account; the named label keeps the first slot.
    assert_eq!(selection.total, 2);
    assert_eq!(selection.previous_label.as_deref(), Some("work"));
    assert_eq!(selection.selected.label, "personal");
    assert_eq!(calls.load(Ordering::SeqCst), 0, "fresh token must not be refreshed");

    let auth = home.read_auth();
    assert_eq!(auth["openai"]["access"], "access-b");
    assert_eq!(auth["openai"]["accountId"], "B");
    assert_eq!(auth["openrouter"]["key"], "sk-or-keep");
    assert_eq!(auth["work"]["access"], "access-a");
}

#[tokio::test]
async fn expired_selection_is_refreshed_before_it_becomes_current() {
    let home = support::TestHome::new();
    seed(&home, 1_000);
    let calls = Arc::new(AtomicUsize::new(0));
    let refresher = HttpCodexRefresher::new(
        reqwest::Client::new(),
        token_mock(Arc::clone(&calls), true).await,
    );

    let selection =
        rotate_codex_account(Arc::new(home.store()), &refresher, RotationTarget::Order(2))
            .await
            .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(selection.selected.credential.access, "access-b2");
    let auth = home.read_auth();
    for label in ["openai", "personal"] {
        assert_eq!(auth[label]["access"], "access-b2");
        assert_eq!(auth[label]["refresh"], "refresh-b2");
        assert_eq!(auth[label]["accountId"], "B");
    }
}

#[tokio::test]
async fn refresh_rejection_still_rotates_with_stale_token() {
    let home = support::TestHome::new();
    seed(&home, 1_000);
    let calls = Arc::new(AtomicUsize::new(0));
    let refresher = HttpCodexRefresher::new(
        reqwest::Client::new(),
        token_mock(Arc::clone(&calls), false).await,
    );

    let selection =
        rotate_codex_account(Arc::new(home.store()), &refresher, RotationTarget::Order(2))
            .await
            .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(selection.selected.label, "personal");
    let auth = home.read_auth();
    assert_eq!(auth["openai"]["access"], "access-b");
    assert_eq!(auth["personal"]["refresh"], "refresh-b");
}

#[tokio::test]
async fn out_of_range_order_reports_bounds() {
    let home = support::TestHome::new();
    seed(&home, FAR_FUTURE_MS);
    let refresher = HttpCodexRefresher::new(reqwest::Client::new(), TokenEndpoint::codex());

    let err = rotate_codex_account(Arc::new(home.store()), &refresher, RotationTarget::Order(0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "OUT_OF_RANGE_SELECTION");
    assert_eq!(err.message(), "Order number 0 is out of range (1-2)");
}

#[tokio::test]
async fn cycling_through_every_account_returns_to_an_unnamed_current_account() {
    let home = support::TestHome::new();
    home.write_auth(json!({
        "openai": {"type": "oauth", "access": "access-x", "refresh": "refresh-x", "accountId": "X", "expires": FAR_FUTURE_MS},
        "work": {"type": "oauth", "access": "access-y", "refresh": "refresh-y", "accountId": "Y", "expires": FAR_FUTURE_MS}
    }));
    let refresher = HttpCodexRefresher::new(reqwest::Client::new(), TokenEndpoint::codex());
    let store = Arc::new(home.store());

    let mut seen = Vec::new();
    for _ in 0..2 {
        let selection = rotate_codex_account(store.clone(), &refresher, RotationTarget::Next)
            .await
            .unwrap();
        seen.push(selection.selected.credential.access);
    }
    assert_eq!(seen, vec!["access-y".to_string(), "access-x".to_string()]);

    let auth = home.read_auth();
    assert_eq!(auth["openai"]["access"], "access-x");
    assert_eq!(auth["work"]["access"], "access-y");
    let copies = auth
        .as_object()
        .unwrap()
        .iter()
        .filter(|(label, v)| label.starts_with("codex-") && v["access"] == "access-x")
        .count();
    assert_eq!(copies, 1);
}
