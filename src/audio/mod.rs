pub mod assemble;
pub mod codec;
pub mod ffmpeg;
pub mod pcm;
pub mod silence;

pub use assemble::{AssembledAudio, AudioAssembler, AudioUnit};
pub use codec::{AudioCodec, NativeCodec, PROVIDER_PCM_SAMPLE_RATE};
pub use ffmpeg::{check_ffmpeg, ffmpeg_available, transcode};
pub use pcm::PcmBuffer;
pub use silence::{generate_silence, generate_silence_with_channels};

/// Encoded audio returned for one speech segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl SpeechAudio {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }
}
