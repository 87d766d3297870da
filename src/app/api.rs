// Handles all interactions with the appliance's service-manager REST API.

use super::model::{Service, ServiceAction};
use async_trait::async_trait;
use reqwest::{StatusCode, Url, header};
use serde::Deserialize;
use serde_json::Value;

const SERVICES_PATH: &str = "/api/sm/services";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(String),

    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Text shown in a row's error popup.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// The backend collaborator the services view talks to.
#[async_trait]
pub trait ServiceApi: Send + Sync {
    async fn list_services(&self) -> Result<Vec<Service>, ApiError>;

    async fn control_service(&self, name: &str, action: ServiceAction) -> Result<(), ApiError>;
}

pub struct HttpServiceApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpServiceApi {
    /// `insecure_tls` accepts the appliance's self-signed certificate.
    pub fn new(base: Url, insecure_tls: bool) -> Result<Self, ApiError> {
        if insecure_tls {
            tracing::warn!("certificate verification disabled");
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base.join(path).map_err(|e| ApiError::Url(e.to_string()))
    }
}

#[async_trait]
impl ServiceApi for HttpServiceApi {
    async fn list_services(&self) -> Result<Vec<Service>, ApiError> {
        let url = self.url(SERVICES_PATH)?;
        tracing::debug!(%url, "fetching services");

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                message: parse_error_message(status, &body),
            });
        }

        Ok(parse_collection(&body)?)
    }

    async fn control_service(&self, name: &str, action: ServiceAction) -> Result<(), ApiError> {
        let url = self.url(&format!("{}/{}/{}", SERVICES_PATH, name, action.as_str()))?;
        tracing::info!(service = name, action = action.as_str(), "sending service command");

        let response = self
            .client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status,
            message: parse_error_message(status, &body),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionBody {
    List(Vec<Service>),
    Page { results: Vec<Service> },
}

/// Accepts a bare list or a paginated `{"results": [...]}` envelope.
pub fn parse_collection(body: &str) -> Result<Vec<Service>, serde_json::Error> {
    Ok(match serde_json::from_str(body)? {
        CollectionBody::List(services) => services,
        CollectionBody::Page { results } => results,
    })
}

/// Pulls a human-readable message out of an error response.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) {
        match fields.get("detail") {
            Some(Value::String(detail)) => return detail.clone(),
            Some(detail) => return detail.to_string(),
            None => {}
        }
    }

    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }

    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
