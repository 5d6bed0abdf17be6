use crate::retry::retry_with_backoff;
use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;

const IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);
const IDENTITY_RETRY_DELAY: Duration = Duration::from_millis(250);

/// The identity the auth backend resolves a bearer token to.
#[derive(Clone, Debug, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired access token")]
    InvalidToken,
    #[error("identity provider unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_user(&self, bearer_token: &str) -> Result<UserIdentity, AuthError>;
}

/// Client for the auth backend's GoTrue-style user endpoint.
pub struct GoTrueClient {
    http: reqwest::Client,
    api_url: String,
    service_key: Arc<str>,
}

impl GoTrueClient {
    pub fn new(api_url: String, service_key: Arc<str>) -> anyhow::Result<Self> {
        let user_agent = format!("Mystic Server/{}", env!("CARGO_PKG_VERSION"));
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(IDENTITY_TIMEOUT)
            .build()
            .context("failed to construct http client")?;
        Ok(Self {
            http,
            api_url,
            service_key,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn get_user(&self, bearer_token: &str) -> Result<UserIdentity, AuthError> {
        let url = format!("{}/auth/v1/user", self.api_url.trim_end_matches('/'));

        // Transport failures get one retry; HTTP-level rejections do not.
        let response = retry_with_backoff(2, IDENTITY_RETRY_DELAY, || {
            self.http
                .get(&url)
                .header("apikey", self.service_key.as_ref())
                .bearer_auth(bearer_token)
                .send()
        })
        .await
        .map_err(|error| AuthError::Unavailable(anyhow!(error)))?;

        let status = response.status().as_u16();
        match status {
            200..=299 => response
                .json::<UserIdentity>()
                .await
                .map_err(|error| AuthError::Unavailable(anyhow!(error))),
            400..=499 => Err(AuthError::InvalidToken),
            _ => Err(AuthError::Unavailable(anyhow!(
                "identity provider returned status {status}"
            ))),
        }
    }
}
