use crate::{
    auth::AuthError,
    db::{PlanType, UsageCommit, UserId},
    entitlement::{self, Entitlement, ANONYMOUS_FREE_READINGS},
    plans::{PricingPlan, PAYMENT_PLANS},
    reading::{build_prompt, ReadingType},
    AppState, Error, Result,
};
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{self, header, HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use open_ai::OpenAiError;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, sync::Arc};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub const READING_RETRY_AFTER_SECS: u64 = 60;

pub fn routes(state: Arc<AppState>) -> Router<(), Body> {
    Router::new()
        .route("/reading", post(perform_reading).options(reading_preflight))
        .route("/user", get(get_user_usage))
        .route("/plans", get(list_plans))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(Extension(state))
                .layer(middleware::from_fn(append_cors_headers)),
        )
}

/// The web client is served from a different origin than the functions, so
/// every response carries permissive CORS headers, mirroring what the
/// OPTIONS preflight advertises.
async fn append_cors_headers<B>(request: Request<B>, next: Next<B>) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    response
}

async fn reading_preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformReadingParams {
    pub reading_type: String,
    #[serde(default)]
    pub user_input: HashMap<String, String>,
    /// How many readings the anonymous client reports having consumed
    /// locally. Trusted as reported: clearing client storage resets it.
    #[serde(default)]
    pub anonymous_readings_used: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingResponse {
    pub reading: String,
    pub readings_remaining: Option<i32>,
}

async fn perform_reading(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(params): Json<PerformReadingParams>,
) -> Result<Json<ReadingResponse>> {
    let caller_key = client_ip(&headers).unwrap_or_else(|| addr.ip().to_string());
    if state.rate_limiter.is_rate_limited(&caller_key) {
        tracing::info!(%caller_key, "rate limit exceeded");
        return Err(Error::too_many_requests(
            "Too many requests. Please try again in 1 minute.",
            READING_RETRY_AFTER_SECS,
        ));
    }

    match bearer_token(&headers)? {
        Some(token) => perform_authenticated_reading(&state, token, &params).await,
        None => perform_anonymous_reading(&state, &params).await,
    }
}

async fn perform_authenticated_reading(
    state: &Arc<AppState>,
    token: &str,
    params: &PerformReadingParams,
) -> Result<Json<ReadingResponse>> {
    let identity = state.identity.get_user(token).await.map_err(identity_error)?;
    let user_id = UserId::new(identity.id);
    let email = identity.email.unwrap_or_default();

    let profile = state.db.get_or_create_profile(&user_id, &email).await?;
    if let Entitlement::Deny { .. } = entitlement::check(&profile) {
        tracing::info!(user_id = %user_id, "free trial ended");
        return Err(Error::payment_required(
            "You have used all your free readings. Please upgrade to continue.",
        ));
    }

    let reading = generate_reading(state, params).await?;

    let readings_remaining = match state.db.commit_reading_usage(&user_id, Utc::now()).await? {
        // Remaining count is computed from the pre-commit value the
        // entitlement check saw.
        UsageCommit::Committed => {
            (!profile.is_premium).then(|| profile.free_readings_remaining - 1)
        }
        UsageCommit::QuotaExhausted => {
            // A concurrent request consumed the last reading between the
            // entitlement check and this commit. The generated text is
            // discarded rather than billed.
            tracing::info!(user_id = %user_id, "quota exhausted at commit time");
            return Err(Error::payment_required(
                "You have used all your free readings. Please upgrade to continue.",
            ));
        }
    };

    Ok(Json(ReadingResponse {
        reading,
        readings_remaining,
    }))
}

/// The anonymous path never touches the quota store; the caller's local
/// counter is the only record of anonymous usage.
async fn perform_anonymous_reading(
    state: &Arc<AppState>,
    params: &PerformReadingParams,
) -> Result<Json<ReadingResponse>> {
    let readings_used = params.anonymous_readings_used.unwrap_or(0).max(0);
    if let Entitlement::Deny { .. } = entitlement::check_anonymous(readings_used) {
        return Err(Error::payment_required(
            "You have used all your free readings. Please sign in or upgrade to continue.",
        ));
    }

    let reading = generate_reading(state, params).await?;
    let readings_remaining = (ANONYMOUS_FREE_READINGS - readings_used - 1).max(0);

    Ok(Json(ReadingResponse {
        reading,
        readings_remaining: Some(readings_remaining),
    }))
}

async fn generate_reading(state: &Arc<AppState>, params: &PerformReadingParams) -> Result<String> {
    let reading_type = ReadingType::from_wire(&params.reading_type).ok_or_else(|| {
        Error::bad_request(format!("Unsupported reading type: {}", params.reading_type))
    })?;
    let prompt = build_prompt(reading_type, &params.user_input)
        .map_err(|error| Error::bad_request(error.to_string()))?;

    state
        .completion
        .complete(&prompt)
        .await
        .map_err(|error| completion_error(reading_type, error))
}

fn completion_error(reading_type: ReadingType, error: OpenAiError) -> Error {
    match error {
        OpenAiError::RateLimited => {
            tracing::info!(
                reading_type = reading_type.wire_name(),
                "upstream rate limit exceeded"
            );
            Error::too_many_requests(
                "Too many requests - please try again later",
                READING_RETRY_AFTER_SECS,
            )
        }
        OpenAiError::AuthenticationFailed(message) => {
            tracing::error!(%message, "completion API rejected server credentials");
            Error::http(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Invalid OpenAI API key".to_string(),
            )
        }
        OpenAiError::NoChoices => Error::http(
            StatusCode::INTERNAL_SERVER_ERROR,
            "No response received".to_string(),
        ),
        OpenAiError::Api { message, .. } => {
            Error::http(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
        OpenAiError::Other(error) => Error::Internal(error.context("reading generation failed")),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUsageResponse {
    pub readings_count: i32,
    pub is_premium: bool,
    pub plan_type: PlanType,
    pub readings_remaining: Option<i32>,
    pub last_reading_date: Option<DateTime<Utc>>,
}

async fn get_user_usage(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<UserUsageResponse>> {
    let token = bearer_token(&headers)?.ok_or_else(Error::unauthorized)?;
    let identity = state.identity.get_user(token).await.map_err(identity_error)?;
    let user_id = UserId::new(identity.id);
    let email = identity.email.unwrap_or_default();

    let profile = state.db.get_or_create_profile(&user_id, &email).await?;
    Ok(Json(UserUsageResponse {
        readings_count: profile.readings_count,
        is_premium: profile.is_premium,
        plan_type: profile.plan_type,
        readings_remaining: (!profile.is_premium).then_some(profile.free_readings_remaining),
        last_reading_date: profile.last_reading_date,
    }))
}

async fn list_plans() -> Json<&'static [PricingPlan]> {
    Json(PAYMENT_PLANS)
}

fn identity_error(error: AuthError) -> Error {
    match error {
        AuthError::InvalidToken => Error::unauthorized(),
        AuthError::Unavailable(error) => {
            Error::Internal(error.context("identity provider unavailable"))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>> {
    let Some(header) = headers.get(http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let token = header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            Error::http(
                StatusCode::BAD_REQUEST,
                "invalid authorization header".to_string(),
            )
        })?;
    Ok(Some(token))
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    ["client-ip", "x-nf-client-connection-ip", "x-forwarded-for"]
        .into_iter()
        .find_map(|name| headers.get(name))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or(value).trim().to_string())
        .filter(|value| !value.is_empty())
}
