use std::process::Command;
use std::sync::OnceLock;

use tracing::{debug, info};

use crate::error::{Result, VoiceboxError};

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg() -> Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map_err(|e| {
            VoiceboxError::Audio(format!(
                "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(VoiceboxError::Audio("FFmpeg check failed".to_string()));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// Cached result of [`check_ffmpeg`] for the lifetime of the process.
pub fn ffmpeg_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| check_ffmpeg().is_ok())
}

/// Convert encoded audio between container formats with FFmpeg.
///
/// Input and output go through a temporary directory that is removed when
/// the call returns. Extensions select FFmpeg's demuxer and muxer.
pub fn transcode(input: &[u8], input_ext: &str, output_ext: &str) -> Result<Vec<u8>> {
    let dir = tempfile::Builder::new().prefix("voicebox_").tempdir()?;
    let input_path = dir.path().join(format!("input.{input_ext}"));
    let output_path = dir.path().join(format!("output.{output_ext}"));

    std::fs::write(&input_path, input)?;

    debug!(
        "Transcoding {} bytes from {} to {}",
        input.len(),
        input_ext,
        output_ext
    );

    let output = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-i"])
        .arg(&input_path)
        .arg("-vn")
        .arg(&output_path)
        .output()
        .map_err(|e| VoiceboxError::Audio(format!("Failed to run FFmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VoiceboxError::Audio(format!(
            "FFmpeg transcoding to {output_ext} failed: {}",
            stderr.trim()
        )));
    }

    if !output_path.exists() {
        return Err(VoiceboxError::Audio(
            "Output file was not created".to_string(),
        ));
    }

    let data = std::fs::read(&output_path)?;
    info!("Transcoded audio to {} ({} bytes)", output_ext, data.len());
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_ffmpeg() {
        let result = check_ffmpeg();
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available or broken");
            return;
        }
        assert!(result.is_ok(), "FFmpeg check failed: {:?}", result.err());
    }

    #[test]
    fn test_transcode_garbage_fails() {
        if !ffmpeg_available() {
            eprintln!("Skipping test: FFmpeg not available");
            return;
        }

        let result = transcode(b"definitely not audio", "mp3", "wav");
        assert!(matches!(result, Err(VoiceboxError::Audio(_))));
    }
}
