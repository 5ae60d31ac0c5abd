use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audio::SpeechAudio;
use crate::config::DEFAULT_API_URL;
use crate::error::SynthesisError;

use super::{SpeechSynthesizer, VoiceParams};

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Additional attempts after the first on timeouts and connection failures.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base delay; retry `n` waits `n * base`.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Client for OpenAI's `/v1/audio/speech` endpoint.
pub struct OpenAiSpeechClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    retry_on_provider_error: bool,
}

impl OpenAiSpeechClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            endpoint: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            retry_on_provider_error: false,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Also retry 429 and 5xx provider responses.
    pub fn with_retry_on_provider_error(mut self, retry: bool) -> Self {
        self.retry_on_provider_error = retry;
        self
    }

    fn should_retry(&self, error: &SynthesisError) -> bool {
        match error {
            SynthesisError::Provider { status, .. } => {
                self.retry_on_provider_error && (*status == 429 || *status >= 500)
            }
            other => other.is_retryable(),
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> SynthesisError {
        if error.is_timeout() {
            SynthesisError::Timeout(self.timeout)
        } else {
            SynthesisError::TransientNetwork(error.without_url().to_string())
        }
    }

    /// Make a single request.
    async fn call_api(
        &self,
        text: &str,
        params: &VoiceParams,
    ) -> Result<SpeechAudio, SynthesisError> {
        let body = SpeechRequest {
            model: &params.model,
            input: text,
            voice: &params.voice,
            response_format: params.format.extension(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        debug!("Speech API response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = error_message(&error_body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });

            return Err(match status.as_u16() {
                401 | 403 => SynthesisError::Auth(message),
                code => SynthesisError::Provider {
                    status: code,
                    message,
                },
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        let mime_type = if essence.starts_with("audio/") {
            essence
        } else if essence == "application/octet-stream" {
            params.format.mime_type().to_string()
        } else {
            return Err(SynthesisError::InvalidResponse(format!(
                "expected audio but the provider returned content type '{declared}'"
            )));
        };

        let data = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;

        if data.is_empty() {
            return Err(SynthesisError::InvalidResponse(
                "provider returned an empty audio body".to_string(),
            ));
        }

        debug!("Received {} bytes of {}", data.len(), mime_type);
        Ok(SpeechAudio::new(data.to_vec(), mime_type))
    }

    /// Delay before retrying after failed attempt `attempt` (1-based).
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * attempt
    }

    async fn synthesize_with_retry(
        &self,
        text: &str,
        params: &VoiceParams,
    ) -> Result<SpeechAudio, SynthesisError> {
        let attempts = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.call_api(text, params).await {
                Ok(audio) => return Ok(audio),
                Err(e) if attempt < attempts && self.should_retry(&e) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "Speech request attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechClient {
    async fn synthesize(
        &self,
        text: &str,
        params: &VoiceParams,
    ) -> Result<SpeechAudio, SynthesisError> {
        if text.trim().is_empty() {
            return Err(SynthesisError::InvalidInput(
                "text is empty or only whitespace".to_string(),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(SynthesisError::Auth("API key is missing".to_string()));
        }

        debug!(
            "Synthesizing {} chars with {} / {} as {}",
            text.chars().count(),
            params.model,
            params.voice,
            params.format
        );

        self.synthesize_with_retry(text, params).await
    }

    fn name(&self) -> &'static str {
        "OpenAI TTS"
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<ApiErrorDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Human-readable message from an error body: `error.message`, then
/// `message`, then the raw body.
fn error_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(body) {
        if let Some(message) = parsed.error.and_then(|e| e.message).or(parsed.message) {
            return Some(message);
        }
    }

    Some(body.to_string())
}
