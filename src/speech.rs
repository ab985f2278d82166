//! Text-to-speech API client

use crate::config::SpeechConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, check_status};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;

/// Anything that renders text to encoded audio
///
/// One remote call per invocation; the caller wraps it in retries.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `text` and return the encoded audio bytes
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Client for the ElevenLabs streaming text-to-speech endpoint
#[derive(Clone)]
pub struct ElevenLabsClient {
    http: HttpClient,
    api_key: String,
    config: SpeechConfig,
}

impl ElevenLabsClient {
    /// Create a client using the voice and output settings in `config`
    pub fn new(http: HttpClient, api_key: impl Into<String>, config: SpeechConfig) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            config,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream",
            self.config.api_base.trim_end_matches('/'),
            self.config.voice_id
        )
    }
}

impl std::fmt::Debug for ElevenLabsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsClient")
            .field("voice_id", &self.config.voice_id)
            .field("model_id", &self.config.model_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let body = SpeechRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
                style: self.config.style,
                use_speaker_boost: self.config.use_speaker_boost,
            },
        };

        let response = self
            .http
            .inner()
            .post(self.endpoint())
            .query(&[
                ("output_format", self.config.output_format.as_str()),
                ("optimize_streaming_latency", "0"),
            ])
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let mut audio = Vec::new();
        let mut chunks = 0usize;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            chunks += 1;
            audio.extend_from_slice(&chunk);
        }

        if audio.is_empty() {
            return Err(Error::Permanent("speech endpoint returned no audio".to_string()));
        }

        tracing::debug!(chunks, bytes = audio.len(), "Speech stream complete");
        Ok(audio)
    }
}
