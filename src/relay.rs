//! 外部クライアントと内部バックエンド間の双方向中継
//!
//! - 片方向ごとに1タスクを割り当て、両方の完了を待つ
//! - テキスト/バイナリの種別は変換を挟んでも保持する
//! - 一方が閉じたらもう一方にもクローズを伝播して収束させる
use axum::extract::ws::{self, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// 内部バックエンドとのWebSocket接続
pub type BackendStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 中継される1メッセージ。音声チャンクはBinary、制御や結果はTextで流れる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl RelayMessage {
    /// 外部クライアントのフレームから変換する。中継対象外（ping等）はNone。
    pub fn from_client(message: ws::Message) -> Option<Self> {
        match message {
            ws::Message::Text(text) => Some(Self::Text(text.as_str().to_owned())),
            ws::Message::Binary(data) => Some(Self::Binary(data.to_vec())),
            _ => None,
        }
    }

    /// バックエンドのフレームから変換する。中継対象外はNone。
    pub fn from_backend(message: tungstenite::Message) -> Option<Self> {
        match message {
            tungstenite::Message::Text(text) => Some(Self::Text(text)),
            tungstenite::Message::Binary(data) => Some(Self::Binary(data)),
            _ => None,
        }
    }

    pub fn into_client(self) -> ws::Message {
        match self {
            Self::Text(text) => ws::Message::Text(text.into()),
            Self::Binary(data) => ws::Message::Binary(data.into()),
        }
    }

    pub fn into_backend(self) -> tungstenite::Message {
        match self {
            Self::Text(text) => tungstenite::Message::Text(text.into()),
            Self::Binary(data) => tungstenite::Message::Binary(data.into()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Binary(_) => "binary",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 中継終了時の転送実績
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// クライアント→バックエンドへ転送したメッセージ数
    pub to_backend: u64,
    /// バックエンド→クライアントへ転送したメッセージ数
    pub to_client: u64,
}

/// 両方向の中継を開始し、双方のループが終わるまで待つ
pub async fn run(session_id: &str, client: WebSocket, backend: BackendStream) -> RelaySummary {
    let (client_tx, client_rx) = client.split();
    let (backend_tx, backend_rx) = backend.split();

    let uplink = tokio::spawn(pump_client_to_backend(
        session_id.to_string(),
        client_rx,
        backend_tx,
    ));
    let downlink = tokio::spawn(pump_backend_to_client(
        session_id.to_string(),
        backend_rx,
        client_tx,
    ));

    let (uplink_result, downlink_result) = tokio::join!(uplink, downlink);
    let to_backend = uplink_result.unwrap_or_else(|e| {
        warn!(session_id = %session_id, error = %e, "uplink task failed");
        0
    });
    let to_client = downlink_result.unwrap_or_else(|e| {
        warn!(session_id = %session_id, error = %e, "downlink task failed");
        0
    });

    RelaySummary {
        to_backend,
        to_client,
    }
}

/// クライアント→バックエンド方向の転送ループ
async fn pump_client_to_backend(
    session_id: String,
    mut source: SplitStream<WebSocket>,
    mut dest: SplitSink<BackendStream, tungstenite::Message>,
) -> u64 {
    let mut forwarded = 0u64;

    while let Some(received) = source.next().await {
        match received {
            Ok(ws::Message::Close(_)) => {
                debug!(session_id = %session_id, "client closed connection");
                break;
            }
            Ok(frame) => match RelayMessage::from_client(frame) {
                Some(message) => {
                    debug!(
                        session_id = %session_id,
                        kind = message.kind(),
                        bytes = message.len(),
                        "forwarding to backend"
                    );
                    if let Err(e) = dest.send(message.into_backend()).await {
                        warn!(session_id = %session_id, error = %e, "backend send failed");
                        break;
                    }
                    forwarded += 1;
                }
                // ping/pong等はトランスポート層に任せる
                None => {
                    debug!(session_id = %session_id, "ignoring control frame");
                }
            },
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "client receive failed");
                break;
            }
        }
    }

    // こちら側が終わったことをバックエンドにも伝える
    let _ = dest.send(tungstenite::Message::Close(None)).await;
    forwarded
}

/// バックエンド→クライアント方向の転送ループ
async fn pump_backend_to_client(
    session_id: String,
    mut source: SplitStream<BackendStream>,
    mut dest: SplitSink<WebSocket, ws::Message>,
) -> u64 {
    let mut forwarded = 0u64;

    while let Some(received) = source.next().await {
        match received {
            Ok(tungstenite::Message::Close(_)) => {
                debug!(session_id = %session_id, "backend closed connection");
                break;
            }
            Ok(frame) => match RelayMessage::from_backend(frame) {
                Some(message) => {
                    debug!(
                        session_id = %session_id,
                        kind = message.kind(),
                        bytes = message.len(),
                        "forwarding to client"
                    );
                    if let Err(e) = dest.send(message.into_client()).await {
                        warn!(session_id = %session_id, error = %e, "client send failed");
                        break;
                    }
                    forwarded += 1;
                }
                None => {
                    debug!(session_id = %session_id, "ignoring control frame");
                }
            },
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "backend receive failed");
                break;
            }
        }
    }

    // バックエンド側の終了をクライアントにも伝える
    let _ = dest.send(ws::Message::Close(None)).await;
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_kind_survives_both_directions() {
        let from_backend =
            RelayMessage::from_backend(tungstenite::Message::Text("結果".to_string())).unwrap();
        assert!(matches!(from_backend.clone().into_client(), ws::Message::Text(_)));
        assert_eq!(from_backend.kind(), "text");

        let from_client = RelayMessage::from_client(ws::Message::Text("config".into())).unwrap();
        assert!(matches!(
            from_client.into_backend(),
            tungstenite::Message::Text(_)
        ));
    }

    #[test]
    fn binary_kind_survives_both_directions() {
        let chunk = vec![0u8, 1, 2, 3];
        let from_client =
            RelayMessage::from_client(ws::Message::Binary(chunk.clone().into())).unwrap();
        assert_eq!(from_client.kind(), "binary");
        assert_eq!(from_client.len(), 4);
        match from_client.into_backend() {
            tungstenite::Message::Binary(data) => assert_eq!(data, chunk),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn control_frames_are_not_relayed() {
        assert!(RelayMessage::from_client(ws::Message::Ping(vec![].into())).is_none());
        assert!(RelayMessage::from_backend(tungstenite::Message::Pong(vec![])).is_none());
    }
}
