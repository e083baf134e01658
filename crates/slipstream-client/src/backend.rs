// Backend-of-record client: async trait seams plus the reqwest implementation.
//
// The traits are what the rest of the crate programs against; tests swap in
// in-process implementations without touching the network.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::protocol::{
    DraftSnapshotPayload, DriverPayload, NotificationPayload, PickOutcomePayload,
};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether retrying the same request later could succeed.
    pub fn retryable(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::Api { status, .. } => *status >= 500 || *status == 429,
            BackendError::Decode(_) => false,
        }
    }
}

/// Draft queries and commands served by the backend of record.
#[async_trait]
pub trait DraftBackend: Send + Sync {
    /// Current turn state plus pick history for a (league, race).
    async fn fetch_draft(
        &self,
        league_id: &str,
        race_id: &str,
    ) -> Result<DraftSnapshotPayload, BackendError>;

    /// Submit a pick for the acting team.
    async fn submit_pick(
        &self,
        league_id: &str,
        race_id: &str,
        driver_id: &str,
    ) -> Result<PickOutcomePayload, BackendError>;

    /// The race's driver pool, annotated with price/points/constructor.
    async fn list_drivers(
        &self,
        league_id: &str,
        race_id: &str,
    ) -> Result<Vec<DriverPayload>, BackendError>;
}

/// Request/response half of the notification feed; the push half is the
/// realtime channel in notify::channel.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn list_notifications(&self) -> Result<Vec<NotificationPayload>, BackendError>;
    async fn mark_read(&self, id: &str) -> Result<(), BackendError>;
    async fn mark_all_read(&self) -> Result<(), BackendError>;
    async fn delete(&self, id: &str) -> Result<(), BackendError>;
    async fn clear_all(&self) -> Result<(), BackendError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Error body shape used by the backend for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PickBody<'a> {
    driver_id: &'a str,
}

/// reqwest-backed implementation of both backend traits.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
    session_token: String,
}

impl HttpBackend {
    pub fn new(base_url: String, session_token: String) -> Self {
        HttpBackend {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        debug!("GET {path}");
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.session_token)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, BackendError> {
        debug!("POST {path}");
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.session_token)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(response).await
    }

    async fn post_empty(&self, path: &str) -> Result<(), BackendError> {
        debug!("POST {path}");
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.session_token)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::expect_success(response).await
    }

    async fn delete_empty(&self, path: &str) -> Result<(), BackendError> {
        debug!("DELETE {path}");
        let response = self
            .http
            .delete(self.url(path))
            .bearer_auth(&self.session_token)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::expect_success(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BackendError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(Self::api_error(status.as_u16(), text));
        }
        serde_json::from_str(&text).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn expect_success(response: reqwest::Response) -> Result<(), BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Err(Self::api_error(status.as_u16(), text))
    }

    /// Prefer the structured `{"error": "..."}` body; fall back to raw text.
    fn api_error(status: u16, body: String) -> BackendError {
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        BackendError::Api { status, message }
    }
}

#[async_trait]
impl DraftBackend for HttpBackend {
    async fn fetch_draft(
        &self,
        league_id: &str,
        race_id: &str,
    ) -> Result<DraftSnapshotPayload, BackendError> {
        self.get_json(&format!("/leagues/{league_id}/races/{race_id}/draft"))
            .await
    }

    async fn submit_pick(
        &self,
        league_id: &str,
        race_id: &str,
        driver_id: &str,
    ) -> Result<PickOutcomePayload, BackendError> {
        self.post_json(
            &format!("/leagues/{league_id}/races/{race_id}/draft/pick"),
            &PickBody { driver_id },
        )
        .await
    }

    async fn list_drivers(
        &self,
        league_id: &str,
        race_id: &str,
    ) -> Result<Vec<DriverPayload>, BackendError> {
        self.get_json(&format!("/leagues/{league_id}/races/{race_id}/drivers"))
            .await
    }
}

#[async_trait]
impl NotificationBackend for HttpBackend {
    async fn list_notifications(&self) -> Result<Vec<NotificationPayload>, BackendError> {
        self.get_json("/notifications").await
    }

    async fn mark_read(&self, id: &str) -> Result<(), BackendError> {
        self.post_empty(&format!("/notifications/{id}/read")).await
    }

    async fn mark_all_read(&self) -> Result<(), BackendError> {
        self.post_empty("/notifications/read-all").await
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.delete_empty(&format!("/notifications/{id}")).await
    }

    async fn clear_all(&self) -> Result<(), BackendError> {
        self.delete_empty("/notifications").await
    }
}
