use crate::auth::otp::{decode_token, OtpRetentionMap};
use crate::auth::{Credentials, UserAuthenticator};
use crate::channel::ChannelHandle;
use crate::client::Client;
use crate::config::Config;
use crate::error::AuthError;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state, composing the Channel, the OTP store, and
/// the (stubbed) user authenticator behind the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub channel: ChannelHandle,
    pub otp: OtpRetentionMap,
    pub user_authenticator: Arc<dyn UserAuthenticator>,
    pub config: Arc<Config>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/auth", post(auth_handler))
        .route("/ws", get(ws_handler))
        .route("/", get(index_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn auth_handler(
    State(state): State<AppState>,
    Json(creds): Json<Credentials>,
) -> Response {
    match state.user_authenticator.authenticate_credentials(creds) {
        Ok(user) => {
            let token = state.otp.new_token(user).await;
            (StatusCode::OK, Json(serde_json::json!({ "key": token.key }))).into_response()
        }
        Err(err) => auth_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    otp: Option<String>,
}

async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = match decode_token(query.otp) {
        Ok(token) => token,
        Err(err) => return auth_error_response(err),
    };
    let user = match state.otp.authenticate_token(&token).await {
        Ok(user) => user,
        Err(err) => return auth_error_response(err),
    };

    info!(user = %user.name, "websocket upgrade authorized");
    let channel = state.channel.clone();
    let config = state.config.clone();
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| async move {
            Client::start(socket, user, channel, config).await;
        })
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("static/index.html"))
}

fn auth_error_response(err: AuthError) -> Response {
    let (status, code) = match err {
        AuthError::MissingToken => (StatusCode::BAD_REQUEST, "MISSING_TOKEN"),
        AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
        AuthError::CredentialInvalid => (StatusCode::UNAUTHORIZED, "CREDENTIAL_INVALID"),
    };
    // Never leak detail on an auth failure (spec §7) — the code alone
    // is the caller-visible contract.
    (
        status,
        Json(serde_json::json!({ "code": code, "message": "authentication failed" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::EchoUserAuth;
    use crate::channel::spawn_channel;
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let config = Arc::new(Config::default());
        AppState {
            channel: spawn_channel(&config),
            otp: OtpRetentionMap::new(Duration::from_secs(5)),
            user_authenticator: Arc::new(EchoUserAuth),
            config,
        }
    }

    #[tokio::test]
    async fn index_serves_html_with_the_expected_content_type() {
        let router = build_router(test_state());
        let response = router
            .oneshot(Request::get("/").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn auth_round_trip_issues_a_consumable_token() {
        let router = build_router(test_state());
        let body = serde_json::to_vec(&serde_json::json!({
            "username": "tester",
            "password": ""
        }))
        .unwrap();

        let response = router
            .oneshot(
                Request::post("/auth")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(parsed["key"].as_str().is_some_and(|k| !k.is_empty()));
    }

    #[tokio::test]
    async fn ws_upgrade_is_refused_without_an_otp() {
        let router = build_router(test_state());
        let response = router
            .oneshot(Request::get("/ws").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ws_upgrade_is_refused_with_an_unknown_otp() {
        let router = build_router(test_state());
        let response = router
            .oneshot(
                Request::get("/ws?otp=not-a-real-token")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
