//! ファイル一括文字起こしの外部契約
//!
//! - 実体はバックエンドプロセス側にあり、ゲートウェイは呼び出し契約だけを持つ
//! - `FileTranscriber` は音声バイト列と指定パラメータから結果を返す最小インタフェース
//! - `MockTranscriber` は結合テストで全体面を動かすための決定的な実装
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("invalid audio payload: {message}")]
    InvalidAudio { message: String },
    #[error("transcription failed: {message}")]
    Failed { message: String },
}

/// 文字起こしの指定パラメータ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeOptions {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub temperature: f32,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: None,
            temperature: 0.0,
        }
    }
}

/// 区間ごとの文字起こし結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// 1ファイル分の文字起こし結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: String,
    pub segments: Vec<Segment>,
}

/// ファイル一括文字起こしの最小インタフェース
#[async_trait]
pub trait FileTranscriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        options: &TranscribeOptions,
    ) -> Result<Transcription, TranscribeError>;
}

/// 入力サイズから決定的に結果を組み立てるモック実装
#[derive(Debug, Clone, Default)]
pub struct MockTranscriber;

#[async_trait]
impl FileTranscriber for MockTranscriber {
    async fn transcribe(
        &self,
        audio: &[u8],
        options: &TranscribeOptions,
    ) -> Result<Transcription, TranscribeError> {
        if audio.is_empty() {
            return Err(TranscribeError::InvalidAudio {
                message: "empty audio payload".to_string(),
            });
        }

        // 16kHz 16bitモノラル相当として長さを換算
        let duration = audio.len() as f64 / 32_000.0;
        let language = options
            .language
            .clone()
            .unwrap_or_else(|| "ja".to_string());
        let text = format!("audio {} bytes", audio.len());

        Ok(Transcription {
            text: text.clone(),
            language,
            segments: vec![Segment {
                start: 0.0,
                end: duration,
                text,
            }],
        })
    }
}
