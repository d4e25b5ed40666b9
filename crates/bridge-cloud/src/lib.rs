//! `bridge-cloud` — HTTP account session for the sensor cloud.
//!
//! [`CloudClient`] implements [`AccountSession`]: an OAuth password-grant
//! login followed by bearer-authenticated reads of the user profile and
//! garden, and sample uploads.

use async_trait::async_trait;
use bridge_core::{AccessToken, AccountSession, BridgeError, Credentials, Result, SampleUpload};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use tokio::sync::RwLock;

const AUTHENTICATE: &str = "/user/v1/authenticate";
const PROFILE: &str = "/user/v4/profile";
const GARDEN: &str = "/sensor_data/v4/garden_locations_status";
const SAMPLES: &str = "/sensor_data/v8/sample";

// ─── CloudClient ──────────────────────────────────────────────────────────

pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<AccessToken>>,
}

impl CloudClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    /// Reuse a token obtained earlier instead of logging in.
    pub async fn set_token(&self, token: AccessToken) {
        *self.token.write().await = Some(token);
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let token = self.token.read().await;
        let token = token
            .as_ref()
            .ok_or_else(|| BridgeError::Auth("not logged in".into()))?;
        Ok(self
            .http
            .request(method, self.url(path))
            .bearer_auth(&token.access_token))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let resp = send(path, self.authorized(Method::GET, path).await?).await?;
        decode(path, resp).await
    }
}

async fn send(path: &str, req: RequestBuilder) -> Result<Response> {
    let resp = req
        .send()
        .await
        .map_err(|e| BridgeError::Transport(format!("{path}: {e}")))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(BridgeError::Auth(format!("{path} rejected the token: {body}")));
    }
    Err(BridgeError::Api {
        endpoint: path.to_string(),
        status: status.as_u16(),
        message: body,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(path: &str, resp: Response) -> Result<T> {
    resp.json::<T>().await.map_err(|e| BridgeError::Api {
        endpoint: path.to_string(),
        status: 200,
        message: format!("unreadable body: {e}"),
    })
}

#[async_trait]
impl AccountSession for CloudClient {
    async fn login(&self, credentials: &Credentials) -> Result<AccessToken> {
        let form = [
            ("grant_type", "password"),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
        ];
        let req = self.http.post(self.url(AUTHENTICATE)).form(&form);
        let resp = match send(AUTHENTICATE, req).await {
            Ok(r) => r,
            Err(BridgeError::Api {
                status, message, ..
            }) => return Err(BridgeError::Auth(format!("status {status}: {message}"))),
            Err(e) => return Err(e),
        };
        let token: AccessToken = decode(AUTHENTICATE, resp).await?;
        tracing::info!(user = %credentials.username, "logged in");
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    async fn get_profile(&self) -> Result<Value> {
        self.get_json(PROFILE).await
    }

    async fn get_garden(&self) -> Result<Value> {
        self.get_json(GARDEN).await
    }

    async fn upload_samples(&self, upload: &SampleUpload) -> Result<()> {
        let req = self
            .authorized(Method::PUT, SAMPLES)
            .await?
            .json(&upload.payload);
        send(SAMPLES, req).await?;
        tracing::debug!(device = %upload.device_id, "samples uploaded");
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
