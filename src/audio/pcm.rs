use std::time::Duration;

use crate::error::{Result, VoiceboxError};

/// Decoded 16-bit audio, samples interleaved by channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl PcmBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            channels,
            samples,
        }
    }

    pub fn empty(sample_rate: u32, channels: u16) -> Self {
        Self::new(sample_rate, channels, Vec::new())
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn same_spec(&self, other: &PcmBuffer) -> bool {
        self.sample_rate == other.sample_rate && self.channels == other.channels
    }

    /// Append another buffer of the same sample rate and channel count.
    pub fn append(&mut self, other: &PcmBuffer) -> Result<()> {
        if !self.same_spec(other) {
            return Err(VoiceboxError::Audio(format!(
                "Cannot concatenate {} Hz/{} ch audio onto {} Hz/{} ch audio",
                other.sample_rate, other.channels, self.sample_rate, self.channels
            )));
        }
        self.samples.extend_from_slice(&other.samples);
        Ok(())
    }

    /// Convert to the given sample rate and channel count.
    ///
    /// Channels are up- or down-mixed first, then the signal is linearly
    /// resampled. A buffer already in the target spec is returned unchanged.
    pub fn convert(self, sample_rate: u32, channels: u16) -> PcmBuffer {
        if self.sample_rate == sample_rate && self.channels == channels {
            return self;
        }

        let remixed = remix(&self.samples, self.channels, channels);
        let samples = resample(&remixed, channels, self.sample_rate, sample_rate);
        PcmBuffer::new(sample_rate, channels, samples)
    }
}

fn remix(samples: &[i16], from: u16, to: u16) -> Vec<i16> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let from = from as usize;
    let to = to as usize;
    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in samples.chunks_exact(from) {
        if to == 1 {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            out.push((sum / from as i32) as i16);
        } else {
            for channel in 0..to {
                out.push(frame[channel.min(from - 1)]);
            }
        }
    }

    out
}

fn resample(samples: &[i16], channels: u16, from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || channels == 0 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    let frames = samples.len() / channels;
    if frames == 0 {
        return Vec::new();
    }

    let out_frames = (frames as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let mut out = Vec::with_capacity(out_frames * channels);

    for i in 0..out_frames {
        let position = i as f64 * step;
        let index = (position.floor() as usize).min(frames - 1);
        let next = (index + 1).min(frames - 1);
        let frac = position - index as f64;

        for channel in 0..channels {
            let a = samples[index * channels + channel] as f64;
            let b = samples[next * channels + channel] as f64;
            let value = a + (b - a) * frac;
            out.push(value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
        }
    }

    out
}
