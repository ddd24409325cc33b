use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Stored in place of a transcript when transcription fails.
pub const TRANSCRIPT_UNAVAILABLE: &str = "Transcript unavailable";

/// Speech-to-text for a remote video.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, video_url: &str) -> Result<String>;
}

/// Used when no transcription endpoint is configured; every call fails.
#[derive(Debug, Default)]
pub struct DisabledTranscriber;

#[async_trait]
impl Transcriber for DisabledTranscriber {
    async fn transcribe(&self, _video_url: &str) -> Result<String> {
        bail!("transcription is not configured")
    }
}

/// Delegates to an HTTP speech-to-text service that accepts
/// `{"video_url": ...}` and answers `{"text": ...}`.
pub struct HttpTranscriber {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    video_url: &'a str,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    text: String,
}

impl HttpTranscriber {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, video_url: &str) -> Result<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&TranscribeRequest { video_url });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Failed to reach transcription service")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            bail!("Transcription service returned {}: {}", status, error_text);
        }

        let body: TranscribeResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;
        Ok(body.text)
    }
}

/// Never fails: any transcription error is logged and replaced by
/// [`TRANSCRIPT_UNAVAILABLE`].
pub async fn transcribe_or_placeholder(transcriber: &dyn Transcriber, video_url: &str) -> String {
    match transcriber.transcribe(video_url).await {
        Ok(text) => {
            info!(video = %video_url, chars = text.len(), "Transcript generated");
            text
        }
        Err(e) => {
            warn!(
                video = %video_url,
                error = %format!("{e:#}"),
                fallback = TRANSCRIPT_UNAVAILABLE,
                "Transcription failed"
            );
            TRANSCRIPT_UNAVAILABLE.to_string()
        }
    }
}
