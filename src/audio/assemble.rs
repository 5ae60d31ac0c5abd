use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{AudioFormat, DEFAULT_SAMPLE_RATE};
use crate::error::{Result, VoiceboxError};

use super::codec::{AudioCodec, NativeCodec};
use super::silence::generate_silence_with_channels;
use super::{PcmBuffer, SpeechAudio};

/// One entry in the ordered sequence handed to the assembler.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioUnit {
    Speech(SpeechAudio),
    Silence { seconds: f64 },
}

/// Final encoded output of a run.
#[derive(Debug, Clone)]
pub struct AssembledAudio {
    pub data: Vec<u8>,
    pub format: AudioFormat,
    pub mime_type: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: Duration,
}

/// Turns speech and silence units into one continuous encoded file.
#[derive(Clone)]
pub struct AudioAssembler {
    codec: Arc<dyn AudioCodec>,
    default_sample_rate: u32,
}

impl Default for AudioAssembler {
    fn default() -> Self {
        Self::new(Arc::new(NativeCodec::new()))
    }
}

impl AudioAssembler {
    pub fn new(codec: Arc<dyn AudioCodec>) -> Self {
        Self {
            codec,
            default_sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Sample rate used for silence when no speech unit is present.
    pub fn with_default_sample_rate(mut self, sample_rate: u32) -> Self {
        self.default_sample_rate = sample_rate;
        self
    }

    pub fn can_encode(&self, format: AudioFormat) -> bool {
        self.codec.can_encode(format)
    }

    pub fn decode(&self, audio: &SpeechAudio) -> Result<PcmBuffer> {
        self.codec.decode(&audio.data, &audio.mime_type)
    }

    /// Decode, normalize, join and encode `units` in order.
    ///
    /// Every unit is converted to the sample rate and channel count of the
    /// first speech unit. Silence is generated in that same format.
    pub fn concatenate(&self, units: &[AudioUnit], format: AudioFormat) -> Result<AssembledAudio> {
        if units.is_empty() {
            return Err(VoiceboxError::NoAudioProduced);
        }

        let mut decoded: Vec<Option<PcmBuffer>> = Vec::with_capacity(units.len());
        for (index, unit) in units.iter().enumerate() {
            match unit {
                AudioUnit::Speech(audio) => {
                    let pcm = self.decode(audio).map_err(|e| VoiceboxError::Decode {
                        index,
                        message: e.to_string(),
                    })?;
                    debug!(
                        "Decoded unit {}: {} Hz, {} ch, {:.2}s",
                        index,
                        pcm.sample_rate,
                        pcm.channels,
                        pcm.duration().as_secs_f64()
                    );
                    decoded.push(Some(pcm));
                }
                AudioUnit::Silence { .. } => decoded.push(None),
            }
        }

        let (sample_rate, channels) = decoded
            .iter()
            .flatten()
            .next()
            .map(|pcm| (pcm.sample_rate, pcm.channels))
            .unwrap_or((self.default_sample_rate, 1));

        let buffers: Vec<PcmBuffer> = units
            .iter()
            .zip(decoded)
            .map(|(unit, pcm)| match (unit, pcm) {
                (_, Some(pcm)) => pcm.convert(sample_rate, channels),
                (AudioUnit::Silence { seconds }, None) => {
                    generate_silence_with_channels(*seconds, sample_rate, channels)
                }
                (AudioUnit::Speech(_), None) => PcmBuffer::empty(sample_rate, channels),
            })
            .collect();

        let combined = self.codec.concatenate(buffers)?;
        let duration = combined.duration();
        let data = self.codec.encode(&combined, format)?;

        info!(
            "Assembled {} units into {:.2}s of {} audio ({} bytes)",
            units.len(),
            duration.as_secs_f64(),
            format,
            data.len()
        );

        Ok(AssembledAudio {
            data,
            format,
            mime_type: format.mime_type().to_string(),
            sample_rate,
            channels,
            duration,
        })
    }
}
