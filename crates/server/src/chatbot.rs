use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chatgate_core::errors::GatewayError;
use chatgate_core::request::AssistRequest;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::state::AppState;

pub const CHATBOT_PATH: &str = "/api/chatbot";

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route(
            CHATBOT_PATH,
            post(chat).options(preflight).fallback(method_not_allowed),
        )
        .layer(cors)
        .with_state(state)
}

/// Rate-limit identity: the first `X-Forwarded-For` hop when trusted, then
/// the socket peer, then a shared `"unknown"` bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl FromRequestParts<AppState> for ClientKey {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.trust_forwarded_for {
            let forwarded = parts
                .headers
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty());
            if let Some(client) = forwarded {
                return Ok(Self(client.to_string()));
            }
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(address)| address.ip().to_string());
        Ok(Self(peer.unwrap_or_else(|| "unknown".to_string())))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub provider: String,
    pub cached: bool,
    pub response_time_ms: u64,
}

/// HTTP face of [`GatewayError`].
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error = self.0;
        let status =
            StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &error {
            GatewayError::Validation(_) => json!({ "error": error.user_message() }),
            GatewayError::RateLimited { retry_after_secs } => json!({
                "error": error.user_message(),
                "retryAfterSeconds": retry_after_secs,
            }),
            GatewayError::ChainExhausted(exhausted) => json!({
                "error": error.user_message(),
                "lastError": exhausted.last_error_message(),
                "fallbackResponse": exhausted.fallback_text(),
                "attempts": exhausted
                    .attempts
                    .iter()
                    .map(|attempt| json!({
                        "provider": attempt.provider,
                        "error": attempt.error.to_string(),
                    }))
                    .collect::<Vec<_>>(),
            }),
            GatewayError::Internal { .. } => json!({
                "error": error.user_message(),
                "fallbackResponse": error.fallback_text(),
            }),
        };

        let mut response = (status, Json(body)).into_response();
        if let GatewayError::RateLimited { retry_after_secs } = error {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        Self(error)
    }
}

pub async fn chat(
    State(state): State<AppState>,
    ClientKey(client_key): ClientKey,
    payload: Result<Json<AssistRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let correlation_id = Uuid::new_v4();
    let span = info_span!("chatbot_request", %correlation_id, client_key = %client_key);

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(
                parent: &span,
                event_name = "chatgate.request.rejected",
                reason = %rejection.body_text(),
                "request body could not be parsed"
            );
            return Err(GatewayError::Validation("Invalid request body".to_string()).into());
        }
    };
    request.validate()?;

    if let Some(retry_after_secs) = state.limiter.admit(&client_key).retry_after_secs() {
        warn!(
            parent: &span,
            event_name = "chatgate.request.rate_limited",
            retry_after_secs,
            "client exceeded the request window"
        );
        return Err(GatewayError::RateLimited { retry_after_secs }.into());
    }

    let locale = request.language;
    let chain = state.chain.clone();
    let run = tokio::spawn(async move { chain.respond(&request).await }.instrument(span.clone()));

    match run.await {
        Ok(Ok(success)) => {
            info!(
                parent: &span,
                event_name = "chatgate.request.answered",
                provider = %success.provider,
                cached = success.cached,
                "request answered"
            );
            Ok(Json(ChatResponse {
                response: success.text,
                provider: success.provider.as_str().to_string(),
                cached: success.cached,
                response_time_ms: success.elapsed.as_millis() as u64,
            }))
        }
        Ok(Err(exhausted)) => Err(GatewayError::from(exhausted).into()),
        Err(join_error) => {
            tracing::error!(
                parent: &span,
                event_name = "chatgate.request.internal_error",
                error = %join_error,
                "provider chain task failed"
            );
            Err(GatewayError::Internal { message: join_error.to_string(), locale }.into())
        }
    }
}

pub async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub async fn method_not_allowed() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::METHOD_NOT_ALLOWED, Json(json!({ "error": "Method not allowed" })))
}
