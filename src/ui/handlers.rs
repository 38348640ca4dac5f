//! HTTP API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::audio::BridgeStats;
use crate::error::ParamError;
use crate::params::{Origin, ParamValue, ParameterDelta, ParameterSet, Stage};
use crate::signaling::{NegotiationState, Role, SessionId};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Link status
#[derive(Debug, serde::Serialize)]
pub struct SystemStatus {
    pub role: Option<Role>,
    pub state: Option<NegotiationState>,
    pub session_id: Option<SessionId>,
    pub uptime_seconds: u64,
    pub active_chain: Vec<Stage>,
    pub bridge: BridgeStats,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let session = state.negotiation.as_ref().map(|handle| handle.session());
    let status = SystemStatus {
        role: session.as_ref().map(|s| s.role),
        state: session.as_ref().map(|s| s.state),
        session_id: session.and_then(|s| s.id),
        uptime_seconds: state.started.elapsed().as_secs(),
        active_chain: state.store.snapshot().active_chain(),
        bridge: state.bridge.stats(),
    };
    Json(ApiResponse::ok(status))
}

pub async fn get_params(State(state): State<Arc<AppState>>) -> Json<ApiResponse<ParameterSet>> {
    Json(ApiResponse::ok(state.store.snapshot()))
}

#[derive(Debug, serde::Deserialize)]
pub struct SetParamRequest {
    pub value: ParamValue,
}

/// Apply a local edit to one parameter
///
/// The stored (possibly clamped) value is returned; the change reaches the
/// peer through the store's outbound queue.
pub async fn set_param(
    State(state): State<Arc<AppState>>,
    Path((stage, field)): Path<(String, String)>,
    Json(req): Json<SetParamRequest>,
) -> (StatusCode, Json<ApiResponse<ParameterDelta>>) {
    let path = format!("{}.{}", stage, field);
    let applied = ParameterDelta::new(&path, req.value)
        .and_then(|delta| state.store.apply(delta, Origin::Local));

    match applied {
        Ok(delta) => (StatusCode::OK, Json(ApiResponse::ok(delta))),
        Err(e @ ParamError::UnknownPath(_)) => {
            (StatusCode::NOT_FOUND, Json(ApiResponse::error(e.to_string())))
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string()))),
    }
}
