use super::PcmBuffer;

/// Mono digital silence of the given duration.
pub fn generate_silence(seconds: f64, sample_rate: u32) -> PcmBuffer {
    generate_silence_with_channels(seconds, sample_rate, 1)
}

/// Silence of `floor(seconds * sample_rate)` frames. Non-positive or
/// non-finite durations yield an empty buffer.
pub fn generate_silence_with_channels(seconds: f64, sample_rate: u32, channels: u16) -> PcmBuffer {
    if !seconds.is_finite() || seconds <= 0.0 || sample_rate == 0 || channels == 0 {
        return PcmBuffer::empty(sample_rate, channels);
    }

    let frames = (seconds * sample_rate as f64).floor() as usize;
    PcmBuffer::new(sample_rate, channels, vec![0; frames * channels as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sample_count() {
        let silence = generate_silence(2.0, 44100);
        assert_eq!(silence.samples.len(), 88200);
        assert_eq!(silence.channels, 1);
        assert!(silence.samples.iter().all(|&s| s == 0));
        assert_eq!(silence.duration(), Duration::from_secs(2));
    }

    #[test]
    fn test_fractional_duration_floors() {
        let silence = generate_silence(0.5, 44101);
        assert_eq!(silence.frames(), 22050);
    }

    #[test]
    fn test_zero_and_invalid_durations() {
        assert!(generate_silence(0.0, 44100).is_empty());
        assert!(generate_silence(-1.0, 44100).is_empty());
        assert!(generate_silence(f64::NAN, 44100).is_empty());
        assert!(generate_silence(1.0, 0).is_empty());
    }

    #[test]
    fn test_stereo_silence() {
        let silence = generate_silence_with_channels(1.0, 8000, 2);
        assert_eq!(silence.frames(), 8000);
        assert_eq!(silence.samples.len(), 16000);
    }
}
