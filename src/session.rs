//! 1本の外部WebSocket接続を担当するセッション処理
//!
//! バックエンド確保 → 内部接続 → 双方向中継 → 後始末、の順に進む。
//! どの段階で失敗しても外部接続を閉じて終了する。
use std::fmt;

use axum::extract::ws::{self, WebSocket};
use thiserror::Error;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite};
use tracing::{error, info};
use uuid::Uuid;

use crate::handlers::AppState;
use crate::relay::{self, BackendStream};
use crate::supervisor::StartupError;

/// セッションの進行段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Opening,
    Relaying,
    Closing,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Opening => "opening",
            Self::Relaying => "relaying",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        write!(f, "{}", label)
    }
}

/// 中継開始前のセットアップで起きるエラー
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("backend startup failed: {0}")]
    Startup(#[from] StartupError),
    #[error("backend connect failed: {url}: {source}")]
    UpstreamConnect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("backend connect timed out after {timeout_ms}ms: {url}")]
    UpstreamConnectTimeout { url: String, timeout_ms: u64 },
}

/// アップグレード済みの外部接続を処理する
pub async fn run(state: AppState, mut client: WebSocket) {
    let session_id = Uuid::new_v4().to_string();
    info!(
        session_id = %session_id,
        phase = %SessionPhase::Opening,
        "new websocket connection established"
    );

    match open_backend(&state).await {
        Ok(backend) => {
            info!(
                session_id = %session_id,
                phase = %SessionPhase::Relaying,
                backend = %state.config.backend_ws_url(),
                "relaying to backend"
            );
            let summary = relay::run(&session_id, client, backend).await;
            info!(
                session_id = %session_id,
                phase = %SessionPhase::Closing,
                to_backend = summary.to_backend,
                to_client = summary.to_client,
                "relay finished"
            );
        }
        Err(e) => {
            error!(
                session_id = %session_id,
                phase = %SessionPhase::Opening,
                error = %e,
                "websocket proxy setup failed"
            );
            // バックエンドに到達できなかったことをクライアントに伝えて閉じる
            let _ = client.send(ws::Message::Close(None)).await;
        }
    }

    info!(
        session_id = %session_id,
        phase = %SessionPhase::Closed,
        "websocket connection closed"
    );
}

/// バックエンドの稼働を保証してからWebSocketで接続する
async fn open_backend(state: &AppState) -> Result<BackendStream, SessionError> {
    state.supervisor.ensure_running().await?;

    let url = state.config.backend_ws_url();
    match timeout(
        state.config.backend.connect_timeout(),
        connect_async(url.as_str()),
    )
    .await
    {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(source)) => Err(SessionError::UpstreamConnect { url, source }),
        Err(_) => Err(SessionError::UpstreamConnectTimeout {
            url,
            timeout_ms: state.config.backend.connect_timeout_ms,
        }),
    }
}
