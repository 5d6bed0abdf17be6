pub mod api;
pub mod auth;
pub mod completion;
pub mod db;
pub mod entitlement;
pub mod env;
pub mod plans;
pub mod rate_limiter;
pub mod reading;
pub mod retry;

use anyhow::Context as _;
use auth::{GoTrueClient, IdentityProvider};
use axum::{
    http::{header::RETRY_AFTER, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use completion::{CompletionProvider, OpenAiCompletionClient};
use db::Database;
use rate_limiter::RateLimiter;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc, time::Duration};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub enum Error {
    Http(StatusCode, String, HeaderMap),
    Database(sea_orm::error::DbErr),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for Error {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error)
    }
}

impl From<sea_orm::error::DbErr> for Error {
    fn from(error: sea_orm::error::DbErr) -> Self {
        Self::Database(error)
    }
}

impl From<axum::Error> for Error {
    fn from(error: axum::Error) -> Self {
        Self::Internal(error.into())
    }
}

impl From<axum::http::Error> for Error {
    fn from(error: axum::http::Error) -> Self {
        Self::Internal(error.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Internal(error.into())
    }
}

impl Error {
    fn http(code: StatusCode, message: String) -> Self {
        Self::Http(code, message, HeaderMap::default())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::http(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn unauthorized() -> Self {
        Self::http(StatusCode::UNAUTHORIZED, "unauthorized".to_string())
    }

    pub fn payment_required(message: impl Into<String>) -> Self {
        Self::http(StatusCode::PAYMENT_REQUIRED, message.into())
    }

    /// A 429 whose `Retry-After` header (and mirrored `retryAfter` body
    /// field) tells the caller when to try again.
    pub fn too_many_requests(message: impl Into<String>, retry_after_secs: u64) -> Self {
        let mut headers = HeaderMap::default();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_str(&retry_after_secs.to_string()).unwrap_or(HeaderValue::from_static("60")),
        );
        Self::Http(StatusCode::TOO_MANY_REQUESTS, message.into(), headers)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    requires_upgrade: Option<bool>,
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        match self {
            Error::Http(code, message, headers) => {
                log::error!("HTTP error {}: {}", code, &message);
                let retry_after = headers
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| value.to_string());
                let body = ErrorBody {
                    error: message,
                    retry_after,
                    requires_upgrade: (code == StatusCode::PAYMENT_REQUIRED).then_some(true),
                };
                (code, headers, Json(body)).into_response()
            }
            Error::Database(error) => {
                log::error!(
                    "HTTP error {}: {:?}",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &error
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        error: format!("{}", &error),
                        retry_after: None,
                        requires_upgrade: None,
                    }),
                )
                    .into_response()
            }
            Error::Internal(error) => {
                log::error!(
                    "HTTP error {}: {:?}",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &error
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        error: format!("{}", &error),
                        retry_after: None,
                        requires_upgrade: None,
                    }),
                )
                    .into_response()
            }
        }
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(code, message, _headers) => (code, message).fmt(f),
            Error::Database(error) => error.fmt(f),
            Error::Internal(error) => error.fmt(f),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(code, message, _) => write!(f, "{code}: {message}"),
            Error::Database(error) => error.fmt(f),
            Error::Internal(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for Error {}

#[derive(Clone, Deserialize)]
pub struct Config {
    pub http_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub migrations_path: Option<PathBuf>,
    pub openai_api_key: Arc<str>,
    pub openai_project_id: Option<Arc<str>>,
    pub openai_api_url: Option<Arc<str>>,
    pub auth_api_url: String,
    pub auth_service_key: Arc<str>,
    pub stripe_secret_key: Option<Arc<str>>,
    pub stripe_webhook_secret: Option<Arc<str>>,
    pub app_base_url: Option<String>,
    pub app_environment: Arc<str>,
    pub rust_log: Option<String>,
    pub log_json: Option<bool>,
}

impl Config {
    pub fn is_development(&self) -> bool {
        self.app_environment == "development".into()
    }

    /// Returns the base URL of the web client, used by the checkout
    /// collaborator when constructing redirect URLs.
    pub fn app_url(&self) -> &str {
        match self.app_base_url.as_deref() {
            Some(url) => url,
            None if self.is_development() => "http://localhost:5173",
            None => "https://mystic-readings.netlify.app",
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn test() -> Self {
        Self {
            http_port: 0,
            database_url: "".into(),
            database_max_connections: 0,
            migrations_path: None,
            openai_api_key: "".into(),
            openai_project_id: None,
            openai_api_url: None,
            auth_api_url: "".into(),
            auth_service_key: "".into(),
            stripe_secret_key: None,
            stripe_webhook_secret: None,
            app_base_url: None,
            app_environment: "test".into(),
            rust_log: None,
            log_json: None,
        }
    }
}

#[derive(Deserialize)]
pub struct MigrateConfig {
    pub database_url: String,
    pub migrations_path: Option<PathBuf>,
}

pub struct AppState {
    pub db: Arc<Database>,
    pub identity: Arc<dyn IdentityProvider>,
    pub completion: Arc<dyn CompletionProvider>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let mut db_options = db::ConnectOptions::new(config.database_url.clone());
        db_options
            .max_connections(config.database_max_connections)
            .connect_timeout(Duration::from_secs(10));
        let db = Database::new(db_options).await?;

        let identity = Arc::new(GoTrueClient::new(
            config.auth_api_url.clone(),
            config.auth_service_key.clone(),
        )?) as Arc<dyn IdentityProvider>;
        let completion =
            Arc::new(OpenAiCompletionClient::new(&config).context("failed to construct completion client")?)
                as Arc<dyn CompletionProvider>;

        let this = Self {
            db: Arc::new(db),
            identity,
            completion,
            rate_limiter: Arc::new(RateLimiter::new()),
            config,
        };
        Ok(Arc::new(this))
    }
}
