//! バックエンドプロセスの監督
//!
//! - 文字起こしサーバーの子プロセスを高々1つだけ追跡する
//! - 起動は遅延実行で、最初に必要とした接続が引き金になる
//! - 終了を検知したら次の要求時に再起動する
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::BackendConfig;

/// バックエンド起動時のエラー
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to spawn backend process `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// 文字起こしサーバーのプロセスを管理するスーパーバイザ
pub struct BackendSupervisor {
    config: BackendConfig,
    child: Mutex<Option<Child>>,
    spawns: AtomicU64,
}

impl BackendSupervisor {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
            spawns: AtomicU64::new(0),
        }
    }

    /// バックエンドが稼働中であることを保証する
    ///
    /// 未起動または終了済みなら起動し、リスナー準備の猶予時間まで待ってから返る。
    /// 猶予待ちもロックを保持したまま行うため、同時に複数の接続が来ても
    /// 起動は一度だけになり、後続はその完了を待つ。
    pub async fn ensure_running(&self) -> Result<(), StartupError> {
        let mut guard = self.child.lock().await;

        if let Some(child) = guard.as_mut() {
            match child.try_wait() {
                // 稼働中なので何もしない
                Ok(None) => return Ok(()),
                Ok(Some(status)) => {
                    warn!(%status, "backend process has exited, restarting");
                    *guard = None;
                }
                Err(e) => {
                    warn!(error = %e, "backend liveness check failed, restarting");
                    *guard = None;
                }
            }
        }

        info!(
            command = %self.config.command,
            port = self.config.port,
            engine = %self.config.engine,
            "starting backend server"
        );

        let child = Command::new(&self.config.command)
            .args(self.config.launch_args())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StartupError::Spawn {
                command: self.config.command.clone(),
                source,
            })?;

        *guard = Some(child);
        self.spawns.fetch_add(1, Ordering::SeqCst);

        // ポーリングはせず、固定の猶予時間でリスナー準備完了とみなす
        tokio::time::sleep(self.config.startup_grace()).await;
        info!("backend server started");
        Ok(())
    }

    /// 追跡中のプロセスが生きているかどうか
    pub async fn is_alive(&self) -> bool {
        let mut guard = self.child.lock().await;
        match guard.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// これまでに子プロセスを起動した回数
    pub fn spawn_count(&self) -> u64 {
        self.spawns.load(Ordering::SeqCst)
    }

    /// 追跡中のプロセスを停止する（シャットダウン時）
    pub async fn shutdown(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            info!("stopping backend server");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill backend process");
            }
        }
    }
}
