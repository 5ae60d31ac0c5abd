use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::config::AudioFormat;
use crate::error::{Result, VoiceboxError};

use super::ffmpeg::{ffmpeg_available, transcode};
use super::PcmBuffer;

/// Sample rate of raw `pcm` responses from the speech endpoint
/// (16-bit little-endian, mono).
pub const PROVIDER_PCM_SAMPLE_RATE: u32 = 24000;

/// Decodes provider audio to PCM and encodes the assembled result.
pub trait AudioCodec: Send + Sync {
    /// Decode one encoded unit. `mime_type` is the type declared by the provider.
    fn decode(&self, data: &[u8], mime_type: &str) -> Result<PcmBuffer>;

    /// Encode PCM into the requested output format.
    fn encode(&self, pcm: &PcmBuffer, format: AudioFormat) -> Result<Vec<u8>>;

    /// Whether [`AudioCodec::encode`] can produce `format` in this environment.
    fn can_encode(&self, format: AudioFormat) -> bool;

    /// Join buffers that already share one sample rate and channel count.
    fn concatenate(&self, buffers: Vec<PcmBuffer>) -> Result<PcmBuffer> {
        let mut iter = buffers.into_iter();
        let mut combined = iter.next().ok_or(VoiceboxError::NoAudioProduced)?;
        for buffer in iter {
            combined.append(&buffer)?;
        }
        Ok(combined)
    }
}

/// Codec built on hound and symphonia, with FFmpeg for formats neither covers.
#[derive(Debug, Clone)]
pub struct NativeCodec {
    use_ffmpeg: bool,
}

impl Default for NativeCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeCodec {
    pub fn new() -> Self {
        Self { use_ffmpeg: true }
    }

    /// Only WAV and raw PCM output; decoding limited to what symphonia reads.
    pub fn without_ffmpeg() -> Self {
        Self { use_ffmpeg: false }
    }

    fn ffmpeg(&self) -> bool {
        self.use_ffmpeg && ffmpeg_available()
    }
}

impl AudioCodec for NativeCodec {
    fn decode(&self, data: &[u8], mime_type: &str) -> Result<PcmBuffer> {
        if data.is_empty() {
            return Err(VoiceboxError::Audio("audio data is empty".to_string()));
        }

        let format = AudioFormat::from_mime(mime_type);
        match format {
            Some(AudioFormat::Pcm) => return decode_raw_pcm(data),
            Some(AudioFormat::Wav) => match hound::WavReader::new(Cursor::new(data)) {
                Ok(reader) => return read_wav(reader, has_streaming_length(data)),
                Err(e) => debug!("hound could not read WAV header, trying symphonia: {}", e),
            },
            _ => {}
        }

        let native_err = match decode_with_symphonia(data, format) {
            Ok(pcm) => return Ok(pcm),
            Err(e) => e,
        };

        if !self.ffmpeg() {
            return Err(native_err);
        }

        debug!("Falling back to FFmpeg for {}: {}", mime_type, native_err);
        let ext = format.map(|f| f.extension()).unwrap_or("bin");
        let wav = transcode(data, ext, "wav")?;
        decode_wav(&wav)
    }

    fn encode(&self, pcm: &PcmBuffer, format: AudioFormat) -> Result<Vec<u8>> {
        match format {
            AudioFormat::Wav => encode_wav(pcm),
            AudioFormat::Pcm => Ok(encode_raw_pcm(pcm)),
            other => {
                if !self.ffmpeg() {
                    return Err(VoiceboxError::UnsupportedFormat(format!(
                        "{other} output requires FFmpeg; install it or choose wav or pcm"
                    )));
                }
                let wav = encode_wav(pcm)?;
                transcode(&wav, "wav", other.extension())
            }
        }
    }

    fn can_encode(&self, format: AudioFormat) -> bool {
        format.is_uncompressed() || self.ffmpeg()
    }
}

fn decode_raw_pcm(data: &[u8]) -> Result<PcmBuffer> {
    if data.len() % 2 != 0 {
        return Err(VoiceboxError::Audio(format!(
            "Raw PCM has {} bytes, not a whole number of 16-bit samples",
            data.len()
        )));
    }
    let samples = data
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    Ok(PcmBuffer::new(PROVIDER_PCM_SAMPLE_RATE, 1, samples))
}

fn encode_raw_pcm(pcm: &PcmBuffer) -> Vec<u8> {
    pcm.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn decode_wav(data: &[u8]) -> Result<PcmBuffer> {
    let reader = hound::WavReader::new(Cursor::new(data))
        .map_err(|e| VoiceboxError::Audio(format!("Invalid WAV data: {e}")))?;
    read_wav(reader, has_streaming_length(data))
}

/// Streamed WAV responses are written before their length is known and carry
/// `0xFFFFFFFF` as the data chunk size.
fn has_streaming_length(data: &[u8]) -> bool {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return false;
    }

    let mut offset = 12usize;
    while let Some(header) = data.get(offset..offset + 8) {
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if &header[0..4] == b"data" {
            return size == u32::MAX;
        }
        let padded = size as usize + (size as usize & 1);
        offset = match offset.checked_add(8 + padded) {
            Some(next) => next,
            None => return false,
        };
    }
    false
}

/// Read every sample. Running out of data is an error unless the header
/// declared a streaming length, in which case the data simply ends at EOF.
fn collect_samples<S>(
    samples: impl Iterator<Item = hound::Result<S>>,
    streaming: bool,
    convert: impl Fn(S) -> i16,
) -> Result<Vec<i16>> {
    let mut out = Vec::new();
    for sample in samples {
        match sample {
            Ok(s) => out.push(convert(s)),
            Err(e) if streaming => {
                debug!("Streamed WAV ended after {} samples: {}", out.len(), e);
                break;
            }
            Err(e) => {
                return Err(VoiceboxError::Audio(format!(
                    "WAV data ended after {} samples: {e}",
                    out.len()
                )))
            }
        }
    }
    Ok(out)
}

fn read_wav<R: std::io::Read>(reader: hound::WavReader<R>, streaming: bool) -> Result<PcmBuffer> {
    let spec = reader.spec();

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => {
            collect_samples(reader.into_samples::<i16>(), streaming, |s| s)?
        }
        (hound::SampleFormat::Int, bits) => {
            let shift = bits as i32 - 16;
            collect_samples(reader.into_samples::<i32>(), streaming, |s| {
                if shift >= 0 {
                    (s >> shift) as i16
                } else {
                    (s << -shift) as i16
                }
            })?
        }
        (hound::SampleFormat::Float, _) => {
            collect_samples(reader.into_samples::<f32>(), streaming, |s| {
                (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
            })?
        }
    };

    Ok(PcmBuffer::new(spec.sample_rate, spec.channels, samples))
}

fn encode_wav(pcm: &PcmBuffer) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: pcm.channels,
        sample_rate: pcm.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| VoiceboxError::Audio(format!("Failed to create WAV writer: {e}")))?;
        for &sample in &pcm.samples {
            writer
                .write_sample(sample)
                .map_err(|e| VoiceboxError::Audio(format!("Failed to write sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| VoiceboxError::Audio(format!("Failed to finalize WAV: {e}")))?;
    }

    Ok(cursor.into_inner())
}

fn decode_with_symphonia(data: &[u8], format: Option<AudioFormat>) -> Result<PcmBuffer> {
    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    if let Some(format) = format {
        hint.with_extension(format.extension());
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| VoiceboxError::Audio(format!("Unrecognized audio data: {e}")))?;

    let mut reader = probed.format;

    let track = reader
        .default_track()
        .ok_or_else(|| VoiceboxError::Audio("No audio track found".to_string()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VoiceboxError::Audio(format!("Decoder creation failed: {e}")))?;

    let mut samples: Vec<i16> = Vec::new();

    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => break,
            Err(e) => {
                return Err(VoiceboxError::Audio(format!("Packet read error: {e}")));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                warn!("Decode error (skipping packet): {}", e);
                continue;
            }
            Err(e) => return Err(VoiceboxError::Audio(format!("Decode failed: {e}"))),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channels.get_or_insert(spec.channels.count() as u16);

        let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    let sample_rate =
        sample_rate.ok_or_else(|| VoiceboxError::Audio("Unknown sample rate".to_string()))?;
    let channels =
        channels.ok_or_else(|| VoiceboxError::Audio("Unknown channel count".to_string()))?;

    Ok(PcmBuffer::new(sample_rate, channels, samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(sample_rate: u32, channels: u16, frames: usize) -> PcmBuffer {
        let samples = (0..frames * channels as usize)
            .map(|i| ((i % 200) as i16 - 100) * 50)
            .collect();
        PcmBuffer::new(sample_rate, channels, samples)
    }

    #[test]
    fn test_wav_round_trip() {
        let codec = NativeCodec::without_ffmpeg();
        let pcm = tone(22050, 2, 1000);

        let wav = codec.encode(&pcm, AudioFormat::Wav).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + pcm.samples.len() * 2);

        let decoded = codec.decode(&wav, "audio/wav").unwrap();
        assert_eq!(decoded, pcm);
    }

    #[test]
    fn test_wav_decoded_by_symphonia_when_mime_unknown() {
        let codec = NativeCodec::without_ffmpeg();
        let pcm = tone(16000, 1, 400);
        let wav = codec.encode(&pcm, AudioFormat::Wav).unwrap();

        let decoded = codec.decode(&wav, "audio/unknown").unwrap();
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples, pcm.samples);
    }

    #[test]
    fn test_float_wav_is_scaled() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(0.5f32).unwrap();
            writer.write_sample(-1.0f32).unwrap();
            writer.finalize().unwrap();
        }

        let decoded = NativeCodec::without_ffmpeg()
            .decode(&cursor.into_inner(), "audio/wav")
            .unwrap();
        assert_eq!(decoded.samples, vec![16383, -32767]);
    }

    #[test]
    fn test_raw_pcm_round_trip() {
        let codec = NativeCodec::without_ffmpeg();
        let pcm = PcmBuffer::new(PROVIDER_PCM_SAMPLE_RATE, 1, vec![1, -1, 256, i16::MIN]);

        let bytes = codec.encode(&pcm, AudioFormat::Pcm).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(codec.decode(&bytes, "audio/pcm").unwrap(), pcm);
    }

    #[test]
    fn test_truncated_wav_fails() {
        let codec = NativeCodec::without_ffmpeg();
        let wav = codec
            .encode(&tone(PROVIDER_PCM_SAMPLE_RATE, 1, 24000), AudioFormat::Wav)
            .unwrap();

        let result = codec.decode(&wav[..44 + 2000], "audio/wav");
        assert!(matches!(result, Err(VoiceboxError::Audio(_))));
    }

    #[test]
    fn test_streaming_length_wav_reads_to_end() {
        let codec = NativeCodec::without_ffmpeg();
        let pcm = tone(PROVIDER_PCM_SAMPLE_RATE, 1, 2400);
        let mut wav = codec.encode(&pcm, AudioFormat::Wav).unwrap();
        wav[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        wav[40..44].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(has_streaming_length(&wav));

        let decoded = codec.decode(&wav, "audio/wav").unwrap();
        assert_eq!(decoded.frames(), 2400);
        assert_eq!(decoded.samples, pcm.samples);
    }

    #[test]
    fn test_streaming_length_detection() {
        let wav = NativeCodec::without_ffmpeg()
            .encode(&tone(8000, 1, 10), AudioFormat::Wav)
            .unwrap();
        assert!(!has_streaming_length(&wav));
        assert!(!has_streaming_length(b"RIFF"));
        assert!(!has_streaming_length(b"not a wav file at all"));
    }

    #[test]
    fn test_odd_length_raw_pcm_fails() {
        let codec = NativeCodec::without_ffmpeg();
        let result = codec.decode(&[1, 2, 3], "audio/pcm");
        assert!(matches!(result, Err(VoiceboxError::Audio(_))));
    }

    #[test]
    fn test_compressed_output_needs_ffmpeg() {
        let codec = NativeCodec::without_ffmpeg();
        assert!(codec.can_encode(AudioFormat::Wav));
        assert!(codec.can_encode(AudioFormat::Pcm));
        assert!(!codec.can_encode(AudioFormat::Mp3));

        let result = codec.encode(&tone(8000, 1, 10), AudioFormat::Mp3);
        assert!(matches!(result, Err(VoiceboxError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let codec = NativeCodec::without_ffmpeg();
        assert!(codec.decode(b"not audio at all", "audio/mpeg").is_err());
        assert!(codec.decode(&[], "audio/wav").is_err());
    }

    #[test]
    fn test_concatenate() {
        let codec = NativeCodec::without_ffmpeg();
        assert!(matches!(
            codec.concatenate(Vec::new()),
            Err(VoiceboxError::NoAudioProduced)
        ));

        let joined = codec
            .concatenate(vec![
                PcmBuffer::new(8000, 1, vec![1, 2]),
                PcmBuffer::new(8000, 1, vec![3]),
            ])
            .unwrap();
        assert_eq!(joined.samples, vec![1, 2, 3]);
    }
}
