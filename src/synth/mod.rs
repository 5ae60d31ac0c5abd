pub mod openai;

pub use openai::OpenAiSpeechClient;

use std::sync::Arc;

use async_trait::async_trait;

use crate::audio::SpeechAudio;
use crate::config::{AudioFormat, Config, DEFAULT_MODEL, DEFAULT_VOICE};
use crate::error::{Result, SynthesisError, VoiceboxError};

/// Model, voice and container requested for every segment of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceParams {
    pub model: String,
    pub voice: String,
    pub format: AudioFormat,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            format: AudioFormat::default(),
        }
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Turn one segment of text into encoded audio.
    async fn synthesize(
        &self,
        text: &str,
        params: &VoiceParams,
    ) -> std::result::Result<SpeechAudio, SynthesisError>;

    fn name(&self) -> &'static str;

    /// Whether a credential is available. Checked before any segment is sent.
    fn has_credentials(&self) -> bool {
        true
    }
}

/// Build the speech client described by `config`.
pub fn create_synthesizer(config: &Config) -> Result<Arc<dyn SpeechSynthesizer>> {
    let api_key = config
        .openai_api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            VoiceboxError::Config(
                "OPENAI_API_KEY not set. Export it with: export OPENAI_API_KEY=sk-...".to_string(),
            )
        })?;

    let client = OpenAiSpeechClient::new(api_key)
        .with_endpoint(config.api_url.clone())
        .with_timeout(config.request_timeout())
        .with_max_retries(config.max_retries)
        .with_retry_delay(config.retry_delay());

    Ok(Arc::new(client))
}
