//! Client mode: talk to a running daemon over its control API.

use serde::de::DeserializeOwned;

use crate::api::handlers::{ErrorResponse, ReloadResponse, RunRequest, RunResponse};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not reach daemon: {0}")]
    Http(#[from] reqwest::Error),
    #[error("daemon returned {status}: {message}")]
    Api { status: u16, message: String },
}

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Client for a daemon on this machine.
    pub fn local(port: u16) -> Self {
        Self::with_base_url(format!("http://127.0.0.1:{}", port))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Client {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Submit script text to be run as an API token.
    pub async fn run(&self, text: &str) -> Result<RunResponse, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/run", self.base_url))
            .json(&RunRequest {
                text: text.to_string(),
                uid: None,
            })
            .send()
            .await?;
        decode(resp).await
    }

    pub async fn reload_mappings(&self) -> Result<ReloadResponse, ClientError> {
        let resp = self
            .http
            .post(format!("{}/api/mappings/reload", self.base_url))
            .send()
            .await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let message = match resp.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
