use crate::error::{Result, VoiceboxError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// OpenAI speech endpoint.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Maximum input length accepted by the speech endpoint.
pub const DEFAULT_MAX_CHARS: usize = 4096;

/// Reference sample rate for silence when no speech has been decoded.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

pub const DEFAULT_MODEL: &str = "tts-1";
pub const DEFAULT_VOICE: &str = "alloy";

pub const MODELS: &[&str] = &["tts-1", "tts-1-hd", "gpt-4o-mini-tts"];

pub const VOICES: &[&str] = &[
    "alloy", "ash", "coral", "echo", "fable", "onyx", "nova", "sage", "shimmer",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Opus,
    Aac,
    Flac,
    Wav,
    Pcm,
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "opus" => Ok(AudioFormat::Opus),
            "aac" => Ok(AudioFormat::Aac),
            "flac" => Ok(AudioFormat::Flac),
            "wav" => Ok(AudioFormat::Wav),
            "pcm" => Ok(AudioFormat::Pcm),
            _ => Err(format!(
                "Unknown format: {}. Use 'mp3', 'opus', 'aac', 'flac', 'wav', or 'pcm'",
                s
            )),
        }
    }
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 6] = [
        AudioFormat::Mp3,
        AudioFormat::Opus,
        AudioFormat::Aac,
        AudioFormat::Flac,
        AudioFormat::Wav,
        AudioFormat::Pcm,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Aac => "aac",
            AudioFormat::Flac => "flac",
            AudioFormat::Wav => "wav",
            AudioFormat::Pcm => "pcm",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Opus => "audio/opus",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Pcm => "audio/pcm",
        }
    }

    /// Map a declared content type (parameters ignored) back to a format.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" => Some(AudioFormat::Mp3),
            "audio/opus" | "audio/ogg" => Some(AudioFormat::Opus),
            "audio/aac" | "audio/x-aac" => Some(AudioFormat::Aac),
            "audio/flac" | "audio/x-flac" => Some(AudioFormat::Flac),
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some(AudioFormat::Wav),
            "audio/pcm" | "audio/l16" => Some(AudioFormat::Pcm),
            _ => None,
        }
    }

    /// Formats written without any codec: a WAV container or raw samples.
    pub fn is_uncompressed(&self) -> bool {
        matches!(self, AudioFormat::Wav | AudioFormat::Pcm)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_chars: usize,
    pub concurrency: usize,
    pub sample_rate: u32,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("max_chars", &self.max_chars)
            .field("concurrency", &self.concurrency)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
            retry_delay_ms: 1000,
            max_chars: DEFAULT_MAX_CHARS,
            concurrency: 1,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        // Override with environment variables
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("VOICEBOX_API_URL") {
            config.api_url = url;
        }
        if let Ok(timeout) = std::env::var("VOICEBOX_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse() {
                config.request_timeout_secs = t;
            }
        }
        if let Ok(retries) = std::env::var("VOICEBOX_MAX_RETRIES") {
            if let Ok(r) = retries.parse() {
                config.max_retries = r;
            }
        }
        if let Ok(max_chars) = std::env::var("VOICEBOX_MAX_CHARS") {
            if let Ok(m) = max_chars.parse() {
                config.max_chars = m;
            }
        }
        if let Ok(concurrency) = std::env::var("VOICEBOX_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                config.concurrency = c;
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        match self.openai_api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(VoiceboxError::Config(
                    "OPENAI_API_KEY not set. Export it with: export OPENAI_API_KEY=sk-..."
                        .to_string(),
                ));
            }
        }

        if self.concurrency == 0 {
            return Err(VoiceboxError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.max_chars == 0 {
            return Err(VoiceboxError::Config(
                "Maximum characters per request must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("voicebox"))
    }

    fn config_file_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }
}
