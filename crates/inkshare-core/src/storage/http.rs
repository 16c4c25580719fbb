//! Stroke log backed by the relay server's REST API.

use super::{BoxFuture, StorageError, StorageResult, StrokeLog};
use crate::model::{NewStroke, RoomId, Stroke};
use reqwest::{Client, Response, StatusCode};
use url::Url;

/// Client for `GET|POST|DELETE {base}/rooms/{room}/strokes`.
#[derive(Debug, Clone)]
pub struct HttpStrokeLog {
    client: Client,
    base_url: Url,
}

impl HttpStrokeLog {
    /// Create a client for a server such as `http://localhost:3030`.
    pub fn new(base_url: &str) -> StorageResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| StorageError::Other(format!("Invalid URL: {}", e)))?;
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            return Err(StorageError::Other(format!("Invalid HTTP URL scheme: {}", base_url.scheme())));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn strokes_url(&self, room: &RoomId) -> StorageResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::Other("Base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(["rooms", room.as_str(), "strokes"]);
        Ok(url)
    }
}

fn transport(e: reqwest::Error) -> StorageError {
    StorageError::Transport(e.to_string())
}

/// Map a non-success response to a storage error, keeping the server's message.
async fn check(response: Response) -> StorageResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(body);
    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StorageError::Rejected(message),
        StatusCode::NOT_FOUND => StorageError::NotFound(message),
        _ => StorageError::Transport(format!("{}: {}", status, message)),
    })
}

impl StrokeLog for HttpStrokeLog {
    fn load_all(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<Vec<Stroke>>> {
        let url = self.strokes_url(room);
        Box::pin(async move {
            let response = self.client.get(url?).send().await.map_err(transport)?;
            check(response).await?.json().await.map_err(|e| StorageError::Serialization(e.to_string()))
        })
    }

    fn append(&self, room: &RoomId, stroke: NewStroke) -> BoxFuture<'_, StorageResult<Stroke>> {
        let url = self.strokes_url(room);
        Box::pin(async move {
            let response = self.client.post(url?).json(&stroke).send().await.map_err(transport)?;
            check(response).await?.json().await.map_err(|e| StorageError::Serialization(e.to_string()))
        })
    }

    fn clear_room(&self, room: &RoomId) -> BoxFuture<'_, StorageResult<()>> {
        let url = self.strokes_url(room);
        Box::pin(async move {
            let response = self.client.delete(url?).send().await.map_err(transport)?;
            check(response).await?;
            Ok(())
        })
    }
}
