//! Collaborator services reached over HTTP: room lookup/creation and
//! autocomplete suggestions.
//!
//! ```text
//! POST {api}/rooms              → { roomId, created_at }
//! GET  {api}/rooms/{id}         → { roomId, created_at, code, language }   (404 when unknown)
//! POST {api}/autocomplete       { code, cursorPosition, language }
//!                               → { suggestion, confidence, description? }
//! ```

use std::future::Future;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClientConfig;

/// A freshly created room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub created_at: String,
}

/// An existing room with its persisted buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub created_at: String,
    #[serde(default)]
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "python".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutocompleteRequest {
    pub code: String,
    pub cursor_position: usize,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AutocompleteResponse {
    pub suggestion: String,
    pub confidence: f64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Errors from collaborator calls.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Persisted-room service.
pub trait RoomService: Send + Sync + 'static {
    fn create_room(&self) -> impl Future<Output = Result<Room, ApiError>> + Send;

    fn get_room(&self, room_id: &str) -> impl Future<Output = Result<RoomInfo, ApiError>> + Send;
}

/// Autocomplete suggestion service.
pub trait SuggestionService: Send + Sync + 'static {
    fn autocomplete(
        &self,
        request: AutocompleteRequest,
    ) -> impl Future<Output = Result<AutocompleteResponse, ApiError>> + Send;
}

/// reqwest-backed client for both services.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpApi {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Use a preconfigured reqwest client (timeouts, proxies, ...).
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.api_base_url
    }

    async fn checked(
        response: reqwest::Response,
        what: &str,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(what.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl RoomService for HttpApi {
    async fn create_room(&self) -> Result<Room, ApiError> {
        let url = self.config.api_url("rooms");
        log::debug!("POST {url}");
        let response = self.client.post(&url).send().await?;
        let room: Room = Self::checked(response, "rooms").await?.json().await?;
        if room.room_id.trim().is_empty() {
            return Err(ApiError::InvalidResponse("empty roomId".to_string()));
        }
        log::info!("Created room {}", room.room_id);
        Ok(room)
    }

    async fn get_room(&self, room_id: &str) -> Result<RoomInfo, ApiError> {
        let url = self.config.room_api_url(room_id);
        log::debug!("GET {url}");
        let response = self.client.get(&url).send().await?;
        let info = Self::checked(response, &format!("room {room_id}"))
            .await?
            .json()
            .await?;
        Ok(info)
    }
}

impl SuggestionService for HttpApi {
    async fn autocomplete(
        &self,
        request: AutocompleteRequest,
    ) -> Result<AutocompleteResponse, ApiError> {
        let url = self.config.api_url("autocomplete");
        log::trace!("POST {url} (cursor {})", request.cursor_position);
        let response = self.client.post(&url).json(&request).send().await?;
        let suggestion = Self::checked(response, "autocomplete").await?.json().await?;
        Ok(suggestion)
    }
}
