//! HTTP surface of the gift-card engine.
//!
//! Public redemption routes sit behind the strict IP limiter; staff and
//! internal routes (issuance, in-store use, cancellation, wallet reads)
//! are authenticated upstream and get the relaxed one. The engine itself
//! performs no authentication - callers arrive with an opaque identity
//! established by the session layer.

pub mod cards;
pub mod redemption;
pub mod wallets;

use axum::Router;
use axum::routing::{get, post};

use crate::middleware;
use crate::state::AppState;

/// Build the service router.
#[must_use]
pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/redemption/validate", post(redemption::validate))
        .route("/redemption/verify-identity", post(redemption::verify_identity))
        .route("/redemption/execute", post(redemption::execute))
        .layer(middleware::redemption_rate_limiter());

    let staff = Router::new()
        .route("/cards", post(cards::activate))
        .route("/cards/{id}", get(cards::detail))
        .route("/cards/{id}/use", post(cards::record_use))
        .route("/cards/{id}/cancel", post(cards::cancel))
        .route("/wallets/{identity}", get(wallets::balance))
        .route("/wallets/{identity}/transactions", get(wallets::transactions))
        .layer(middleware::staff_rate_limiter());

    Router::new().merge(public).merge(staff)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use url::Url;

    use crate::config::GiftcardsConfig;
    use crate::db::MemoryStore;
    use crate::services::{LogNotifier, StaticDirectory};
    use crate::state::AppState;

    fn test_config() -> GiftcardsConfig {
        GiftcardsConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 4000,
            base_url: Url::parse("https://wildflowerdayspa.com").unwrap(),
            code_prefix: "WF".to_string(),
            card_validity_months: 24,
            token_ttl_hours: 48,
            verify_attempts_per_minute: 100,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }

    fn app() -> Router {
        let state = AppState::new(
            test_config(),
            Arc::new(MemoryStore::new()),
            Arc::new(StaticDirectory::new()),
            Arc::new(LogNotifier),
        );
        super::routes().with_state(state)
    }

    fn post_json(uri: &str, body: &Value, ip: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validate_unknown_token_is_404() {
        let response = app()
            .oneshot(post_json(
                "/redemption/validate",
                &json!({"token": "not-a-real-token"}),
                "203.0.113.10",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["error"], "token_invalid");
    }

    #[tokio::test]
    async fn test_execute_without_identity_is_401() {
        let response = app()
            .oneshot(post_json(
                "/redemption/execute",
                &json!({
                    "token": "whatever",
                    "email": "holder@example.com",
                    "disposition": "wallet"
                }),
                "203.0.113.11",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_issue_use_cancel_flow_over_http() {
        let app = app();

        // Issue a card through the purchase-completion endpoint.
        let response = app
            .clone()
            .oneshot(post_json(
                "/cards",
                &json!({
                    "amount": 15_000,
                    "purchaser_email": "dana@example.com",
                    "purchaser_name": "Dana Buyer"
                }),
                "203.0.113.12",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let issued = body_json(response).await;
        let id = issued["id"].as_i64().unwrap();
        assert!(issued["redemption_link"].as_str().unwrap().contains("/redeem/"));

        // Record an in-store use.
        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cards/{id}/use"),
                &json!({"amount": 4_000, "service_name": "facial"}),
                "203.0.113.12",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let used = body_json(response).await;
        assert_eq!(used["remaining_amount"], 11_000);
        assert_eq!(used["status"], "partially_used");

        // Over-drawing is a 400 with the precise error code.
        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cards/{id}/use"),
                &json!({"amount": 99_000}),
                "203.0.113.12",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "insufficient_value");

        // Cancel the remainder; a second cancel conflicts.
        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cards/{id}/cancel"),
                &json!({"reason": "customer refund"}),
                "203.0.113.12",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/cards/{id}/cancel"),
                &json!({}),
                "203.0.113.12",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_card_detail_never_returns_token_material() {
        let app = app();
        let response = app
            .clone()
            .oneshot(post_json(
                "/cards",
                &json!({
                    "amount": 5_000,
                    "purchaser_email": "dana@example.com"
                }),
                "203.0.113.13",
            ))
            .await
            .unwrap();
        let issued = body_json(response).await;
        let id = issued["id"].as_i64().unwrap();
        let link = issued["redemption_link"].as_str().unwrap().to_owned();
        let token = link.rsplit('/').next().unwrap().to_owned();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/cards/{id}"))
                    .header("x-forwarded-for", "203.0.113.13")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let detail = body_json(response).await;
        let raw = detail.to_string();
        assert!(!raw.contains(&token));
        assert!(!raw.contains("token_hash"));
    }

    #[tokio::test]
    async fn test_wallet_of_unknown_identity_is_404() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/wallets/usr_nobody")
                    .header("x-forwarded-for", "203.0.113.14")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
