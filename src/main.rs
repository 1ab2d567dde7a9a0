use std::future::IntoFuture;
use std::net::SocketAddr;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use whisper_live_gateway::{config::Config, handlers::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    println!("WhisperLive ゲートウェイを起動中...");

    let mut config = Config::load_or_create_default("config.toml")?;
    config.apply_env_overrides()?;
    config.validate()?;

    println!("設定ファイルを読み込みました");
    println!("公開アドレス: {}", config.server_address());
    println!(
        "バックエンド: {} ({})",
        config.backend_ws_url(),
        config.backend.engine
    );

    let app_state = AppState::new(config.clone());
    let supervisor = app_state.supervisor.clone();
    let app = whisper_live_gateway::create_app(app_state);

    let addr: SocketAddr = config
        .server_address()
        .parse()
        .map_err(|e| anyhow::anyhow!("無効なサーバーアドレス: {}", e))?;

    println!("ゲートウェイを起動します: http://{}", addr);
    println!("エンドポイント:");
    println!("  GET/HEAD /health - ヘルスチェック");
    println!("  GET      /       - サービス情報 (Upgrade指定時はWebSocket中継)");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app).into_future();

    // 終了シグナルを受けたら接続の完了は待たずに抜ける
    tokio::select! {
        result = server => {
            result.map_err(|e| anyhow::anyhow!("ゲートウェイの起動に失敗: {}", e))?;
        }
        _ = shutdown_signal() => {
            info!("shutdown signal received");
        }
    }

    supervisor.shutdown().await;
    println!("ゲートウェイを停止しました");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install tracing subscriber: {err}");
    }
}
