use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AudioFormat, Config, DEFAULT_MODEL, DEFAULT_VOICE};
use crate::error::Result;
use crate::silence::SilenceSettings;
use crate::synth::VoiceParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub model: String,
    pub voice: String,
    pub format: AudioFormat,
    pub text: String,
    pub silence_settings: SilenceSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            format: AudioFormat::default(),
            text: String::new(),
            silence_settings: SilenceSettings::default(),
        }
    }
}

impl Settings {
    pub fn voice_params(&self) -> VoiceParams {
        VoiceParams {
            model: self.model.clone(),
            voice: self.voice.clone(),
            format: self.format,
        }
    }
}

/// Parse a stored record. Never fails: corrupt data yields defaults and
/// out-of-range silence durations are reset.
pub fn parse_settings(contents: &str) -> Settings {
    let mut settings = match serde_json::from_str::<Settings>(contents) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Stored settings are unreadable, using defaults: {}", e);
            return Settings::default();
        }
    };

    if let Err(e) = settings.silence_settings.validate() {
        warn!("{}; resetting silence durations to defaults", e);
        settings.silence_settings = SilenceSettings::default();
    }
    if settings.model.trim().is_empty() {
        settings.model = DEFAULT_MODEL.to_string();
    }
    if settings.voice.trim().is_empty() {
        settings.voice = DEFAULT_VOICE.to_string();
    }

    settings
}

pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> Result<()>;
}

/// JSON file, by default `<config dir>/voicebox/settings.json`.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Option<Self> {
        Config::config_dir().map(|dir| Self::new(dir.join("settings.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Settings {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => parse_settings(&contents),
            Err(e) => {
                debug!("No settings at {}: {}", self.path.display(), e);
                Settings::default()
            }
        }
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, contents)?;
        debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

/// In-memory store holding the serialized record.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    contents: Mutex<Option<String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with raw stored contents.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Settings {
        match self.contents.lock() {
            Ok(guard) => guard.as_deref().map(parse_settings).unwrap_or_default(),
            Err(_) => Settings::default(),
        }
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        let contents = serde_json::to_string(settings)?;
        if let Ok(mut guard) = self.contents.lock() {
            *guard = Some(contents);
        }
        Ok(())
    }
}
