use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// ホスティング基盤が外部公開ポートを指定する環境変数
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "ServerConfig::default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// 文字起こしサーバーの起動コマンド
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub host: String,
    pub port: u16,
    #[serde(default = "BackendConfig::default_engine")]
    pub engine: String,
    /// 起動からリスナー準備完了とみなすまでの待ち時間
    #[serde(default = "BackendConfig::default_startup_grace_ms")]
    pub startup_grace_ms: u64,
    #[serde(default = "BackendConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl ServerConfig {
    fn default_service_name() -> String {
        "WhisperLive".to_string()
    }
}

impl BackendConfig {
    fn default_engine() -> String {
        "faster_whisper".to_string()
    }

    const fn default_startup_grace_ms() -> u64 {
        3_000
    }

    const fn default_connect_timeout_ms() -> u64 {
        5_000
    }

    /// 実際に子プロセスへ渡す引数列（設定の引数 + ポートとエンジンの指定）
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--port".to_string());
        args.push(self.port.to_string());
        args.push("--backend".to_string());
        args.push(self.engine.clone());
        args
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Config {
    pub fn load_or_create_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let default_config = Self::default();
            let content = toml::to_string(&default_config)?;
            fs::write(path, content)?;
            println!("デフォルト設定ファイルを作成しました: {}", path.display());
            Ok(default_config)
        }
    }

    /// 環境変数による上書きを反映する（起動時に一度だけ呼ぶ）
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        if let Ok(value) = std::env::var(PORT_ENV) {
            let port: u16 = value
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT環境変数の値が無効です: {}", value))?;
            self.server.port = port;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("サーバーポートが無効です"));
        }

        if self.server.service_name.trim().is_empty() {
            return Err(anyhow::anyhow!("サービス名が設定されていません"));
        }

        if self.backend.port == 0 {
            return Err(anyhow::anyhow!("バックエンドポートが無効です"));
        }

        if self.server.port == self.backend.port {
            return Err(anyhow::anyhow!(
                "外部公開ポートとバックエンドポートが重複しています"
            ));
        }

        if self.backend.command.trim().is_empty() {
            return Err(anyhow::anyhow!("バックエンド起動コマンドが設定されていません"));
        }

        if self.backend.host.trim().is_empty() {
            return Err(anyhow::anyhow!("バックエンドホストが設定されていません"));
        }

        if self.backend.engine.trim().is_empty() {
            return Err(anyhow::anyhow!("バックエンドエンジンが設定されていません"));
        }

        if self.backend.connect_timeout_ms == 0 {
            return Err(anyhow::anyhow!("バックエンド接続タイムアウトが無効です"));
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 内部バックエンドへのWebSocket接続先
    pub fn backend_ws_url(&self) -> String {
        format!("ws://{}:{}", self.backend.host, self.backend.port)
    }

    /// 外部クライアントへ案内する接続先
    pub fn public_ws_url(&self) -> String {
        format!("ws://localhost:{}/", self.server.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 9090,
                service_name: ServerConfig::default_service_name(),
            },
            backend: BackendConfig {
                command: "python3".to_string(),
                args: vec!["run_server.py".to_string()],
                host: "127.0.0.1".to_string(),
                port: 9091,
                engine: BackendConfig::default_engine(),
                startup_grace_ms: BackendConfig::default_startup_grace_ms(),
                connect_timeout_ms: BackendConfig::default_connect_timeout_ms(),
            },
        }
    }
}
