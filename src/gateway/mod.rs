//! HTTP gateway (axum).
//!
//! Callers identify themselves with `X-Username` plus
//! `Authorization: Bearer <token>`. The only place a raw token leaves the
//! server is the post-login redirect back to the client.

use crate::auth::Username;
use crate::config::Config;
use crate::error::ServiceError;
use crate::identity::{HandshakeError, IdentityProvider, ProviderKind, TwitterProvider};
use crate::push::{PushTransport, TargetedSendError, VapidKeys, WebPushTransport};
use crate::service::{LoginError, NotifyService};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB). Subscriptions and payloads are small.
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout for every route except `/send-notif`, whose fan-out is
/// bounded by the per-delivery timeout instead.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

const USERNAME_HEADER: &str = "x-username";

const DENIED_MESSAGE: &str = "You denied the app or your session expired.";
const NOT_ALLOWED_MESSAGE: &str = "You are not on the user allow list.";
const PROVIDER_ERROR_MESSAGE: &str =
    "Twitter authentication error: invalid verifier or access tokens.";
const MANUAL_PARSE_MESSAGE: &str = "Your username and/or token could not be parsed.";

const DEFAULT_BROADCAST_PAYLOAD: &str = "no payload";
const DEFAULT_TEST_PAYLOAD: &str = "test notification";

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NotifyService>,
    /// VAPID public key handed to browsers for `pushManager.subscribe`.
    pub vapid_public_key: Option<Arc<str>>,
    /// Front-end origin (e.g. "http://localhost:3000").
    pub client_url: Arc<str>,
    /// Public base URL of this gateway, used for OAuth callbacks.
    pub server_url: Arc<str>,
}

/// Build the router with CORS, body limit, and timeout layers.
pub fn build_router(state: AppState) -> Result<Router> {
    let origin = HeaderValue::from_str(state.client_url.trim_end_matches('/'))
        .with_context(|| format!("Invalid gateway.client_url {:?}", state.client_url))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(USERNAME_HEADER),
        ])
        .max_age(Duration::from_secs(3600));

    let timed = Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/vapid-public-key", get(handle_vapid_public_key))
        .route("/login/twitter", get(handle_login_twitter))
        .route("/callback/twitter", get(handle_callback_twitter))
        .route("/callback/manual", get(handle_callback_manual))
        .route("/save-subscription", post(handle_save_subscription))
        .route("/test-notif", post(handle_test_notif))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ));

    Ok(Router::new()
        .route("/send-notif", post(handle_send_notif))
        .merge(timed)
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE)))
}

/// Wire everything from config and serve until Ctrl-C.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let http = reqwest::Client::builder()
        .timeout(config.push.delivery_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let (public_key, private_key) = match (
        config.push.vapid_public_key.as_deref(),
        config.push.vapid_private_key.as_ref(),
    ) {
        (Some(public), Some(private)) => (public, private.expose()),
        _ => anyhow::bail!(
            "VAPID keys are not configured.\n\
             Fix: run `pushgate vapid-keygen` and set push.vapid_public_key / \
             push.vapid_private_key (or PUSHGATE_VAPID_PUBLIC_KEY / PUSHGATE_VAPID_PRIVATE_KEY)."
        ),
    };
    let vapid = VapidKeys::from_base64url(public_key, private_key)?;
    let transport = WebPushTransport::new(http.clone(), vapid, config.push.vapid_subject.clone());
    let vapid_public_key: Arc<str> = Arc::from(transport.public_key());
    let transport: Arc<dyn PushTransport> = Arc::new(transport);

    let identity: Option<Arc<dyn IdentityProvider>> = match (
        config.identity.twitter_key.as_ref(),
        config.identity.twitter_key_secret.as_ref(),
    ) {
        (Some(key), Some(secret)) => Some(Arc::new(
            TwitterProvider::new(http, key.expose(), secret.expose())
                .with_api_base(config.identity.twitter_api_base.clone()),
        )),
        _ => {
            tracing::warn!("Twitter consumer key/secret not set; /login/twitter is disabled");
            None
        }
    };

    let service = NotifyService::from_config(&config, transport, identity)?;
    let state = AppState {
        service: Arc::new(service),
        vapid_public_key: Some(vapid_public_key),
        client_url: Arc::from(config.gateway.client_url.as_str()),
        server_url: Arc::from(config.gateway.server_url.trim_end_matches('/')),
    };
    let app = build_router(state)?;

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "Gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /: send browsers to the front-end
async fn handle_root(State(state): State<AppState>) -> Response {
    found(&state.client_url)
}

/// GET /health: always public
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /vapid-public-key: application server key for `pushManager.subscribe`
async fn handle_vapid_public_key(State(state): State<AppState>) -> Response {
    match state.vapid_public_key.as_deref() {
        Some(key) => Json(serde_json::json!({ "publicKey": key })).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "Push is not configured" })),
        )
            .into_response(),
    }
}

/// GET /login/twitter: start the OAuth handshake
async fn handle_login_twitter(State(state): State<AppState>) -> Response {
    let callback_url = format!("{}/callback/twitter", state.server_url);
    match state.service.begin_login(&callback_url).await {
        Ok(redirect_url) => found(&redirect_url),
        Err(e) => {
            tracing::warn!("Could not start Twitter login: {e}");
            (
                StatusCode::BAD_GATEWAY,
                "Could not start login with Twitter. Try again later.",
            )
                .into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TwitterCallbackQuery {
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
}

/// GET /callback/twitter: finish the handshake and hand the token to the client
async fn handle_callback_twitter(
    State(state): State<AppState>,
    Query(query): Query<TwitterCallbackQuery>,
) -> Response {
    let (Some(token), Some(verifier)) = (query.oauth_token, query.oauth_verifier) else {
        return (StatusCode::BAD_REQUEST, DENIED_MESSAGE).into_response();
    };

    match state
        .service
        .complete_login(ProviderKind::Twitter, &token, &verifier)
        .await
    {
        Ok(login) => found(&format!(
            "{}/callback?username={}&name={}&userToken={}",
            state.client_url.trim_end_matches('/'),
            urlencoding::encode(login.username.as_str()),
            urlencoding::encode(&login.display_name),
            urlencoding::encode(login.token.expose()),
        )),
        Err(LoginError::Handshake(HandshakeError::Denied | HandshakeError::Expired)) => {
            (StatusCode::BAD_REQUEST, DENIED_MESSAGE).into_response()
        }
        Err(LoginError::NotAllowed(_)) => {
            (StatusCode::FORBIDDEN, NOT_ALLOWED_MESSAGE).into_response()
        }
        Err(e) => {
            tracing::warn!("Twitter login failed: {e}");
            (StatusCode::FORBIDDEN, PROVIDER_ERROR_MESSAGE).into_response()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualCallbackQuery {
    pub username: Option<String>,
    pub user_token: Option<String>,
}

/// GET /callback/manual: a provisioned user hands their token to the client
async fn handle_callback_manual(
    State(state): State<AppState>,
    Query(query): Query<ManualCallbackQuery>,
) -> Response {
    let (Some(username), Some(token)) = (query.username, query.user_token) else {
        tracing::info!("Manual login rejected: missing parameters");
        return (StatusCode::BAD_REQUEST, MANUAL_PARSE_MESSAGE).into_response();
    };
    let username = match Username::parse(&username) {
        Ok(username) if state.service.check_authorized(username.as_str(), &token) => username,
        _ => {
            tracing::info!("Manual login rejected");
            return ServiceError::Unauthorized.into_response();
        }
    };

    tracing::info!(user = %username, "Manual login, redirecting to client");
    found(&format!(
        "{}/callback?username={}&userToken={}",
        state.client_url.trim_end_matches('/'),
        urlencoding::encode(username.as_str()),
        urlencoding::encode(&token),
    ))
}

/// POST /save-subscription: store the caller's push subscription
async fn handle_save_subscription(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (username, token) = credentials(&headers);
    let descriptor = serde_json::from_slice::<serde_json::Value>(&body).ok();

    match state.service.save_subscription(username, token, descriptor) {
        Ok(outcome) if outcome.success => {
            Json(serde_json::json!({ "success": true })).into_response()
        }
        Ok(_) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "success": false })),
        )
            .into_response(),
        Err(e) => ServiceError::from(e).into_response(),
    }
}

/// Body of `/send-notif` and `/test-notif`. Any JSON value is accepted as
/// the payload.
#[derive(Debug, Default, Deserialize)]
pub struct NotifBody {
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendNotifResponse {
    success: bool,
    update_required: bool,
    attempted: usize,
    succeeded: usize,
    failed: usize,
}

/// POST /send-notif: broadcast to every subscriber
///
/// The fan-out runs on its own task so a dropped connection cannot cut it
/// short.
async fn handle_send_notif(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (username, token) = credentials(&headers);
    let (username, token) = (username.to_owned(), token.to_owned());
    let payload = notification_payload(&body, DEFAULT_BROADCAST_PAYLOAD);

    let service = Arc::clone(&state.service);
    let task = tokio::spawn(async move {
        service.send_broadcast(&username, &token, &payload).await
    });
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Broadcast task failed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "error": "broadcast failed" })),
            )
                .into_response();
        }
    };
    let status = if outcome.success || outcome.update_required {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    let response = SendNotifResponse {
        success: outcome.success,
        update_required: outcome.update_required,
        attempted: outcome.report.attempted,
        succeeded: outcome.report.succeeded,
        failed: outcome.report.failed,
    };
    (status, Json(response)).into_response()
}

/// POST /test-notif: send to the caller's own subscription only
async fn handle_test_notif(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (username, token) = credentials(&headers);
    let payload = notification_payload(&body, DEFAULT_TEST_PAYLOAD);

    match state.service.send_test(username, token, &payload).await {
        Ok(()) => Json(serde_json::json!({ "success": true })).into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "success": false, "error": "unauthorized" }),
            ),
            Self::Validation(e) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "success": false, "error": e.to_string() }),
            ),
            Self::Send(TargetedSendError::NoSubscription) => (
                StatusCode::OK,
                serde_json::json!({ "success": false, "updateRequired": true }),
            ),
            Self::Send(TargetedSendError::Delivery(e)) => (
                StatusCode::BAD_GATEWAY,
                serde_json::json!({ "success": false, "error": e.to_string() }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ══════════════════════════════════════════════════════════════════════════════

/// 302 Found with a `Location` header.
fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::error!("Refusing to redirect to a malformed location");
            Redirect::to("/").into_response()
        }
    }
}

/// Extract bearer token from Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

/// `(username, token)` from the request headers; empty when absent so the
/// service rejects them on the same path as a wrong token.
fn credentials(headers: &HeaderMap) -> (&str, &str) {
    let username = headers
        .get(USERNAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    (username, extract_bearer_token(headers).unwrap_or_default())
}

/// Bytes to push. A JSON string payload is sent as-is; any other JSON value
/// is sent serialized; a missing or unparsable body yields `default`.
fn notification_payload(body: &[u8], default: &str) -> Vec<u8> {
    let payload = serde_json::from_slice::<NotifBody>(body)
        .ok()
        .and_then(|b| b.payload)
        .filter(|v| !v.is_null());
    match payload {
        Some(serde_json::Value::String(s)) => s.into_bytes(),
        Some(other) => other.to_string().into_bytes(),
        None => default.as_bytes().to_vec(),
    }
}
