use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use whisper_live_gateway::config::Config;
use whisper_live_gateway::handlers::AppState;
use whisper_live_gateway::transcriber::{FileTranscriber, MockTranscriber, TranscribeOptions};

/// 代役バックエンドの接続イベント
#[derive(Debug, PartialEq, Eq)]
pub enum BackendEvent {
    Connected,
    Disconnected,
}

/// 内部文字起こしサーバーの代役を起動する
///
/// - テキストには受領応答のJSONを1フレーム返す
/// - バイナリにはエコー1フレームと文字起こし結果のJSON1フレームを返す
pub async fn spawn_scripted_backend() -> (u16, mpsc::UnboundedReceiver<BackendEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("バックエンド用ポートの確保に失敗");
    let port = listener
        .local_addr()
        .expect("ローカルアドレスの取得に失敗")
        .port();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(_) => break,
            };
            let event_tx = event_tx.clone();

            tokio::spawn(async move {
                let ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => return,
                };
                let _ = event_tx.send(BackendEvent::Connected);
                let (mut tx, mut rx) = ws.split();

                while let Some(Ok(frame)) = rx.next().await {
                    match frame {
                        Message::Text(text) => {
                            let reply = serde_json::json!({
                                "message": "SERVER_READY",
                                "received": text,
                            });
                            if tx.send(Message::Text(reply.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        Message::Binary(audio) => {
                            if tx.send(Message::Binary(audio.clone().into())).await.is_err() {
                                break;
                            }
                            let result = MockTranscriber
                                .transcribe(&audio, &TranscribeOptions::default())
                                .await
                                .expect("モック文字起こしに失敗");
                            let reply =
                                serde_json::to_string(&result).expect("結果のJSON化に失敗");
                            if tx.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                let _ = tx.send(Message::Close(None)).await;
                let _ = event_tx.send(BackendEvent::Disconnected);
            });
        }
    });

    (port, event_rx)
}

/// 指定の代役バックエンドを向くテスト用設定
///
/// 子プロセスには引数を無視して生き続けるシェルを使い、起動契約だけを通す。
pub fn gateway_config(backend_port: u16) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.backend.host = "127.0.0.1".to_string();
    config.backend.port = backend_port;
    config.backend.command = "sh".to_string();
    config.backend.args = vec![
        "-c".to_string(),
        "sleep 30".to_string(),
        "gateway-backend".to_string(),
    ];
    config.backend.startup_grace_ms = 50;
    config.backend.connect_timeout_ms = 2_000;
    config
}

/// ゲートウェイを空きポートで起動し、アドレスと状態を返す
pub async fn spawn_gateway(config: Config) -> (SocketAddr, AppState) {
    let app_state = AppState::new(config);
    let app = whisper_live_gateway::create_app(app_state.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ゲートウェイ用ポートの確保に失敗");
    let addr = listener
        .local_addr()
        .expect("ローカルアドレスの取得に失敗");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, app_state)
}
