//! Thin HTTP wrapper around the chat backend.
//!
//! Every call is a POST against `{base_url}{path}`. Non-2xx responses become
//! `CarelineError::Backend`, undecodable bodies become `CarelineError::Decode`.

use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use careline_core::config::BackendConfig;
use careline_core::error::{CarelineError, Result};

/// Opens a session and returns the greeting.
pub const START_PATH: &str = "/api/chatbot/start";
/// Sends a text message within a session.
pub const MESSAGE_PATH: &str = "/api/chatbot/message";

/// Longest slice of an error body kept in `CarelineError::Backend`.
const MAX_ERROR_BODY: usize = 512;

/// Body of the `start` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub agent: String,
}

/// Body of the `message` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub session_id: String,
    pub message: String,
    pub agent: String,
}

/// Raw response body with its content type.
#[derive(Debug, Clone)]
pub struct RawBody {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl RawBody {
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
    }
}

/// HTTP client bound to one backend base URL.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client from the backend section of the configuration.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(config.cookies)
            .build()
            .map_err(|e| CarelineError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a backend path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(%url, "POST json");
        let resp = self.http.post(&url).json(body).send().await?;
        decode_json(check_status(resp).await?).await
    }

    /// POST a multipart form and decode a JSON response.
    pub async fn post_multipart<R>(&self, path: &str, form: Form) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!(%url, "POST multipart");
        let resp = self.http.post(&url).multipart(form).send().await?;
        decode_json(check_status(resp).await?).await
    }

    /// POST a multipart form and return the body undecoded.
    pub async fn post_multipart_raw(&self, path: &str, form: Form) -> Result<RawBody> {
        let url = self.url(path);
        tracing::debug!(%url, "POST multipart (raw)");
        let resp = check_status(self.http.post(&url).multipart(form).send().await?).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?.to_vec();
        Ok(RawBody {
            content_type,
            bytes,
        })
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let mut body = resp.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(CarelineError::Backend {
        status: status.as_u16(),
        body,
    })
}

async fn decode_json<R: DeserializeOwned>(resp: Response) -> Result<R> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| CarelineError::Decode(e.to_string()))
}
