use crate::config::Config;
use crate::session;
use crate::supervisor::BackendSupervisor;
use axum::{
    extract::{ws::WebSocketUpgrade, FromRequestParts, Request, State},
    http::{header, HeaderMap, Method},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub supervisor: Arc<BackendSupervisor>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let supervisor = Arc::new(BackendSupervisor::new(config.backend.clone()));
        Self {
            supervisor,
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub backend: String,
    pub timestamp: f64,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: String,
    pub status: String,
    pub backend: String,
    pub websocket_url: String,
}

/// ホスティング基盤向けヘルスチェック
///
/// 判定対象はゲートウェイ自身の応答性のみ。バックエンドの状態は見ないため、
/// バックエンド未起動でも常に200を返す。
pub async fn health_check(method: Method, State(state): State<AppState>) -> Json<HealthResponse> {
    debug!(%method, "health check");
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.server.service_name.clone(),
        backend: state.config.backend.engine.clone(),
        timestamp: unix_timestamp(),
    })
}

/// ルートパスの振り分け
///
/// Upgradeヘッダを持つ要求はWebSocket中継セッションへ、
/// それ以外の通常GETにはサービス情報JSONを返す。
pub async fn websocket_endpoint(State(state): State<AppState>, request: Request) -> Response {
    if !wants_websocket_upgrade(request.headers()) {
        debug!("service info request");
        return Json(ServiceInfo {
            service: format!("{} WebSocket Server", state.config.server.service_name),
            status: "running".to_string(),
            backend: state.config.backend.engine.clone(),
            websocket_url: state.config.public_ws_url(),
        })
        .into_response();
    }

    let (mut parts, _body) = request.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade.on_upgrade(move |socket| session::run(state, socket)),
        Err(rejection) => rejection.into_response(),
    }
}

fn wants_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn unix_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
