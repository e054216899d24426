//! HTTP route handlers for the host-facing viewer API

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::websocket::AppState;
use crate::bridge::{BridgeError, SendOutcome};
use crate::payload::{self, DEFAULT_HEIGHT, OverlaySpec, ViewerRequest, VolumePayload};
use crate::protocol::{InteractionEvent, ViewMode, ViewerSettings};

/// Error response for the viewer API
#[derive(Debug, Serialize)]
pub struct BridgeErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<BridgeError> for BridgeErrorResponse {
    fn from(e: BridgeError) -> Self {
        let code = match &e {
            BridgeError::Validation(_) => "validation",
            BridgeError::Transport(_) => "transport",
            BridgeError::InitializationTimeout(_) => "initialization_timeout",
            BridgeError::ProtocolViolation(_) => "protocol_violation",
            BridgeError::UnknownInstance(_) => "unknown_instance",
        };
        Self {
            error: e.to_string(),
            code: code.to_string(),
        }
    }
}

impl IntoResponse for BridgeErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "validation" | "invalid_payload" => StatusCode::BAD_REQUEST,
            "unknown_instance" => StatusCode::NOT_FOUND,
            "initialization_timeout" => StatusCode::GATEWAY_TIMEOUT,
            "transport" | "protocol_violation" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

fn invalid_payload(detail: impl std::fmt::Display) -> BridgeErrorResponse {
    BridgeErrorResponse {
        error: detail.to_string(),
        code: "invalid_payload".to_string(),
    }
}

/// Body of POST /api/viewer/:key/render, mirroring the widget call of the
/// reference integration: base64 volume bytes plus per-overlay settings.
#[derive(Debug, Deserialize)]
pub struct RenderBody {
    /// Base64 volume bytes; omit to render an empty canvas
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub overlays: Vec<OverlayBody>,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default = "default_styled")]
    pub styled: bool,
    #[serde(default)]
    pub settings: ViewerSettings,
}

#[derive(Debug, Deserialize)]
pub struct OverlayBody {
    pub data: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub colormap: Option<String>,
    #[serde(default)]
    pub opacity: Option<f32>,
}

fn default_height() -> u32 {
    DEFAULT_HEIGHT
}

fn default_styled() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub outcome: &'static str,
    pub generation: u64,
}

impl From<SendOutcome> for RenderResponse {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Delivered { generation } => Self {
                outcome: "delivered",
                generation,
            },
            SendOutcome::Buffered { generation } => Self {
                outcome: "buffered",
                generation,
            },
            SendOutcome::Superseded { generation } => Self {
                outcome: "superseded",
                generation,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub phase: &'static str,
    pub latest_generation: u64,
    pub loaded_generation: u64,
    /// Whether a viewer connection is currently attached
    pub connected: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventParams {
    /// Long-poll up to this many milliseconds for the next event
    pub wait_ms: Option<u64>,
}

impl RenderBody {
    fn into_request(self, instance_key: String) -> Result<ViewerRequest, BridgeErrorResponse> {
        let volume = match self.volume {
            Some(data) if !data.is_empty() => {
                let bytes = payload::decode(&data).map_err(invalid_payload)?;
                Some(VolumePayload::new(
                    bytes,
                    self.filename.unwrap_or_else(|| "image.nii".to_string()),
                ))
            }
            _ => None,
        };

        let overlays = self
            .overlays
            .into_iter()
            .map(|overlay| {
                Ok(OverlaySpec {
                    bytes: payload::decode(&overlay.data).map_err(invalid_payload)?.into(),
                    name: overlay.name,
                    filename: overlay.filename,
                    colormap: overlay.colormap,
                    opacity: overlay.opacity,
                })
            })
            .collect::<Result<Vec<_>, BridgeErrorResponse>>()?;

        Ok(ViewerRequest {
            volume,
            overlays,
            height: self.height,
            view_mode: self.view_mode,
            styled: self.styled,
            settings: self.settings,
            instance_key,
        })
    }
}

/// POST /api/viewer/:key/render - Drive a render request against an instance
pub async fn render_viewer(
    State(state): State<AppState>,
    Path(instance_key): Path<String>,
    Json(body): Json<RenderBody>,
) -> Result<Json<RenderResponse>, BridgeErrorResponse> {
    let request = body.into_request(instance_key.clone())?;
    let outcome = state.bridge.render(request).await.map_err(|e| {
        tracing::warn!("render failed for instance {}: {}", instance_key, e);
        BridgeErrorResponse::from(e)
    })?;
    Ok(Json(outcome.into()))
}

/// GET /api/viewer/:key/event - Consume the pending interaction event.
/// Each event is delivered at most once; `wait_ms` long-polls for the next.
pub async fn get_event(
    State(state): State<AppState>,
    Path(instance_key): Path<String>,
    Query(params): Query<EventParams>,
) -> Result<Json<Option<InteractionEvent>>, BridgeErrorResponse> {
    let event = match params.wait_ms {
        Some(wait_ms) => {
            let wait = Duration::from_millis(wait_ms);
            match tokio::time::timeout(wait, state.bridge.next_event(&instance_key)).await {
                Ok(result) => result.map_err(BridgeErrorResponse::from)?,
                Err(_) => None,
            }
        }
        None => state
            .bridge
            .take_event(&instance_key)
            .await
            .map_err(BridgeErrorResponse::from)?,
    };
    Ok(Json(event))
}

/// GET /api/viewer/:key/status - Protocol progress for one instance
pub async fn get_status(
    State(state): State<AppState>,
    Path(instance_key): Path<String>,
) -> Result<Json<StatusResponse>, BridgeErrorResponse> {
    let status = state
        .bridge
        .status(&instance_key)
        .await
        .ok_or_else(|| BridgeErrorResponse::from(BridgeError::UnknownInstance(instance_key.clone())))?;
    Ok(Json(StatusResponse {
        phase: status.phase.name(),
        latest_generation: status.latest_generation,
        loaded_generation: status.loaded_generation,
        connected: state.transport.is_connected(&instance_key).await,
    }))
}

/// DELETE /api/viewer/:key - Host-driven teardown
pub async fn remove_viewer(
    State(state): State<AppState>,
    Path(instance_key): Path<String>,
) -> StatusCode {
    if state.bridge.remove(&instance_key).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// Build viewer API routes
pub fn viewer_routes(state: AppState) -> Router {
    Router::new()
        .route("/viewer/:key/render", post(render_viewer))
        .route("/viewer/:key/event", get(get_event))
        .route("/viewer/:key/status", get(get_status))
        .route("/viewer/:key", delete(remove_viewer))
        .with_state(state)
}
