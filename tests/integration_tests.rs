//! Integration tests for voicebox
//!
//! These tests drive segmentation, silence planning, assembly and the full
//! pipeline with a deterministic in-process synthesizer. No API key or
//! FFmpeg is required.

use async_trait::async_trait;
use voicebox::audio::{
    AudioAssembler, AudioCodec, AudioUnit, NativeCodec, PcmBuffer, SpeechAudio,
};
use voicebox::config::AudioFormat;
use voicebox::error::{SynthesisError, VoiceboxError};
use voicebox::pipeline::{GenerationRequest, Orchestrator, RunState};
use voicebox::silence::{plan_units, SilenceSettings, UnitPlan};
use voicebox::synth::{SpeechSynthesizer, VoiceParams};
use voicebox::text::{segment, SegmentKind};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const STUB_RATE: u32 = 24000;
const STUB_FRAMES: usize = 2400;

/// Returns 0.1s of WAV per call, every sample equal to `10 * text length`.
struct StubSynthesizer {
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
    fail_on_text: Option<String>,
    /// Earlier calls sleep longer, so concurrent runs complete out of order.
    stagger: bool,
}

impl StubSynthesizer {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
            fail_on_text: None,
            stagger: false,
        }
    }

    fn failing_on(text: &str) -> Self {
        Self {
            fail_on_text: Some(text.to_string()),
            ..Self::new()
        }
    }

    fn staggered() -> Self {
        Self {
            stagger: true,
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn level_for(text: &str) -> i16 {
    (text.chars().count() * 10) as i16
}

#[async_trait]
impl SpeechSynthesizer for StubSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        _params: &VoiceParams,
    ) -> Result<SpeechAudio, SynthesisError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().unwrap().push(text.to_string());

        if self.stagger {
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(call as u64 * 10))).await;
        }

        if self.fail_on_text.as_deref() == Some(text) {
            return Err(SynthesisError::Provider {
                status: 400,
                message: "Input rejected".to_string(),
            });
        }

        let pcm = PcmBuffer::new(STUB_RATE, 1, vec![level_for(text); STUB_FRAMES]);
        let data = NativeCodec::without_ffmpeg()
            .encode(&pcm, AudioFormat::Wav)
            .map_err(|e| SynthesisError::InvalidResponse(e.to_string()))?;
        Ok(SpeechAudio::new(data, "audio/wav"))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

fn native_assembler() -> AudioAssembler {
    AudioAssembler::new(Arc::new(NativeCodec::without_ffmpeg()))
}

fn orchestrator(synth: Arc<StubSynthesizer>) -> Orchestrator {
    Orchestrator::new(synth, native_assembler())
}

fn wav_request(text: &str) -> GenerationRequest {
    GenerationRequest::new(text).with_voice(VoiceParams {
        format: AudioFormat::Wav,
        ..Default::default()
    })
}

fn decode_wav(bytes: &[u8]) -> PcmBuffer {
    NativeCodec::without_ffmpeg()
        .decode(bytes, "audio/wav")
        .unwrap()
}

/// Distinct consecutive non-zero sample levels, in order.
fn speech_levels(pcm: &PcmBuffer) -> Vec<i16> {
    let mut levels: Vec<i16> = Vec::new();
    let mut previous = 0;
    for &sample in &pcm.samples {
        if sample != 0 && sample != previous {
            levels.push(sample);
        }
        previous = sample;
    }
    levels
}

// ============================================================================
// Segmentation Tests
// ============================================================================

mod segmentation_tests {
    use super::*;

    #[test]
    fn test_heading_and_body() {
        let segments = segment("# Title\n\nBody text.", 4096);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].kind, SegmentKind::Heading1);
        assert_eq!(segments[0].content, "Title");
        assert_eq!(segments[1].kind, SegmentKind::Paragraph);
        assert_eq!(segments[1].content, "Body text.");
    }

    #[test]
    fn test_chapter_end_between_parts() {
        let segments = segment("Part one.\n\n###\n\nPart two.", 4096);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].content, "Part one.");
        assert_eq!(segments[1].kind, SegmentKind::ChapterEnd);
        assert!(segments[1].content.is_empty());
        assert_eq!(segments[2].content, "Part two.");

        let plan = plan_units(&segments, &SilenceSettings::default());
        assert!(matches!(plan.last(), Some(UnitPlan::Speech { .. })));
    }

    #[test]
    fn test_empty_input() {
        assert!(segment("", 4096).is_empty());
        assert!(segment("\n\n   \n", 4096).is_empty());
    }

    #[test]
    fn test_limits_and_text_preserved() {
        let text = "# The Long Road\n\n\
            It was late. The rain had not stopped for hours! Nobody on the street \
            seemed to care? A dog barked somewhere far away.\n\
            Then silence.\n\n\
            ## Morning\n\n\
            Light came slowly, the way it always does in late autumn, creeping over \
            the rooftops one tile at a time.\n\n###\n\nThe end.";

        for max_chars in [12, 25, 40, 80, 4096] {
            let segments = segment(text, max_chars);

            for s in &segments {
                assert!(
                    s.length <= max_chars,
                    "segment {:?} exceeds {}",
                    s.content,
                    max_chars
                );
                assert!(s.within_limit);
            }

            let produced: Vec<&str> = segments
                .iter()
                .filter(|s| s.kind.is_text())
                .flat_map(|s| s.content.split_whitespace())
                .collect();
            let expected: Vec<&str> = text
                .lines()
                .map(str::trim)
                .filter(|l| *l != "###")
                .map(|l| l.trim_start_matches("## ").trim_start_matches("# "))
                .flat_map(str::split_whitespace)
                .collect();
            assert_eq!(produced, expected, "max_chars = {}", max_chars);
        }
    }

    #[test]
    fn test_indivisible_token_flagged() {
        let segments = segment("Short words then Supercalifragilisticexpialidocious here", 10);
        let oversized: Vec<_> = segments.iter().filter(|s| !s.within_limit).collect();
        assert_eq!(oversized.len(), 1);
        assert_eq!(oversized[0].content, "Supercalifragilisticexpialidocious");
    }

    #[test]
    fn test_silence_directive_segment() {
        let segments = segment("Before.\n{{2.5}}\nAfter.", 4096);
        assert_eq!(segments[1].kind, SegmentKind::Silence(2.5));
    }
}

// ============================================================================
// Assembly Tests
// ============================================================================

mod assembly_tests {
    use super::*;

    #[test]
    fn test_two_silences_at_16k() {
        let units = vec![
            AudioUnit::Silence { seconds: 1.0 },
            AudioUnit::Silence { seconds: 1.0 },
        ];
        let out = native_assembler()
            .with_default_sample_rate(16000)
            .concatenate(&units, AudioFormat::Wav)
            .unwrap();

        let decoded = decode_wav(&out.data);
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.samples.len(), 32000);
        assert!(decoded.samples.iter().all(|&s| s == 0));
        assert_eq!(out.duration, Duration::from_secs(2));
    }

    #[test]
    fn test_uncompressed_round_trip_is_bit_identical() {
        let pcm = PcmBuffer::new(
            44100,
            2,
            (0..8820).map(|i| ((i * 37) % 65536) as u16 as i16).collect(),
        );
        let codec = NativeCodec::without_ffmpeg();

        let wav = codec.encode(&pcm, AudioFormat::Wav).unwrap();
        let unit = AudioUnit::Speech(SpeechAudio::new(wav, "audio/wav"));
        let out = native_assembler()
            .concatenate(&[unit], AudioFormat::Wav)
            .unwrap();

        assert_eq!(decode_wav(&out.data), pcm);
    }

    #[test]
    fn test_truncated_speech_unit_is_decode_error() {
        let pcm = PcmBuffer::new(STUB_RATE, 1, vec![500; STUB_RATE as usize]);
        let wav = NativeCodec::without_ffmpeg()
            .encode(&pcm, AudioFormat::Wav)
            .unwrap();
        let units = vec![
            AudioUnit::Silence { seconds: 0.5 },
            AudioUnit::Speech(SpeechAudio::new(wav[..44 + 2000].to_vec(), "audio/wav")),
        ];

        let result = native_assembler().concatenate(&units, AudioFormat::Wav);
        assert!(matches!(result, Err(VoiceboxError::Decode { index: 1, .. })));
    }

    #[test]
    fn test_duration_is_sum_of_units() {
        let codec = NativeCodec::without_ffmpeg();
        let speech = |rate: u32, frames: usize| {
            let pcm = PcmBuffer::new(rate, 1, vec![1000; frames]);
            AudioUnit::Speech(SpeechAudio::new(
                codec.encode(&pcm, AudioFormat::Wav).unwrap(),
                "audio/wav",
            ))
        };

        let units = vec![
            speech(24000, 12000),
            AudioUnit::Silence { seconds: 1.5 },
            speech(48000, 24000),
            AudioUnit::Silence { seconds: 0.25 },
            speech(24000, 6000),
        ];

        let out = native_assembler()
            .concatenate(&units, AudioFormat::Wav)
            .unwrap();
        assert_eq!(out.sample_rate, 24000);
        // 0.5 + 1.5 + 0.5 + 0.25 + 0.25
        assert_eq!(decode_wav(&out.data).frames(), 72000);
    }
}

// ============================================================================
// Pipeline Tests
// ============================================================================

mod pipeline_tests {
    use super::*;

    const BOOK: &str = "# Title\n\nFirst paragraph.\n\n###\n\nLast words.\n\n###\n{{5}}";

    #[tokio::test]
    async fn test_no_trailing_silence() {
        let synth = Arc::new(StubSynthesizer::new());
        let output = orchestrator(synth.clone())
            .generate(&wav_request(BOOK))
            .await
            .unwrap();

        let pcm = decode_wav(&output.bytes);
        // 3 x 0.1s speech + 2.0s h1 + 1.0s paragraph + 3.0s chapter end
        assert_eq!(pcm.frames(), 151200);
        assert_ne!(*pcm.samples.last().unwrap(), 0);
        assert_ne!(pcm.samples[0], 0);
        assert_eq!(synth.calls(), 3);
        assert_eq!(output.stats.silence_units, 3);
    }

    #[tokio::test]
    async fn test_output_follows_segment_order() {
        let synth = Arc::new(StubSynthesizer::new());
        let output = orchestrator(synth.clone())
            .generate(&wav_request(BOOK))
            .await
            .unwrap();

        let expected = vec![
            level_for("Title"),
            level_for("First paragraph."),
            level_for("Last words."),
        ];
        assert_eq!(speech_levels(&decode_wav(&output.bytes)), expected);
        assert_eq!(
            *synth.texts.lock().unwrap(),
            vec!["Title", "First paragraph.", "Last words."]
        );
    }

    #[tokio::test]
    async fn test_concurrent_order_preserved() {
        let text = "One.\n\nSecond one.\n\nThird one here.\n\nFourth one is longest.";

        let sequential = orchestrator(Arc::new(StubSynthesizer::new()))
            .generate(&wav_request(text))
            .await
            .unwrap();
        let concurrent = orchestrator(Arc::new(StubSynthesizer::staggered()))
            .with_concurrency(4)
            .generate(&wav_request(text))
            .await
            .unwrap();

        assert_eq!(sequential.bytes, concurrent.bytes);
        assert_eq!(
            speech_levels(&decode_wav(&concurrent.bytes)),
            vec![
                level_for("One."),
                level_for("Second one."),
                level_for("Third one here."),
                level_for("Fourth one is longest."),
            ]
        );
    }

    #[tokio::test]
    async fn test_idempotent_output() {
        let first = orchestrator(Arc::new(StubSynthesizer::new()))
            .generate(&wav_request(BOOK))
            .await
            .unwrap();
        let second = orchestrator(Arc::new(StubSynthesizer::new()))
            .generate(&wav_request(BOOK))
            .await
            .unwrap();

        assert_eq!(first.bytes, second.bytes);
        assert_eq!(first.mime_type, "audio/wav");
    }

    #[tokio::test]
    async fn test_custom_silence_settings() {
        let silence = SilenceSettings {
            h1: 0.5,
            h2: 0.0,
            paragraph: 0.25,
            chapter_end: 1.0,
        };
        let request = wav_request("# A\n\n## Bb\n\nCcc.\n\nDddd.").with_silence(silence);

        let output = orchestrator(Arc::new(StubSynthesizer::new()))
            .generate(&request)
            .await
            .unwrap();

        // 4 x 0.1s + 0.5 + 0.0 + 0.25
        assert_eq!(decode_wav(&output.bytes).frames(), 27600);
    }

    #[tokio::test]
    async fn test_failure_aborts_without_output() {
        let synth = Arc::new(StubSynthesizer::failing_on("Second."));
        let orch = orchestrator(synth.clone());

        let result = orch
            .generate(&wav_request("First.\n\nSecond.\n\nThird."))
            .await;

        match result {
            Err(VoiceboxError::Synthesis(SynthesisError::Provider { message, .. })) => {
                assert_eq!(message, "Input rejected");
            }
            other => panic!("expected provider error, got {:?}", other.map(|o| o.bytes.len())),
        }
        assert_eq!(synth.calls(), 2);
        assert!(matches!(orch.state(), RunState::Failed(_)));
    }

    #[tokio::test]
    async fn test_validation_makes_zero_calls() {
        let synth = Arc::new(StubSynthesizer::new());
        let orch = orchestrator(synth.clone());

        let empty = orch.generate(&wav_request("  ")).await;
        assert!(matches!(empty, Err(VoiceboxError::InvalidInput(_))));

        let bad_silence = wav_request("Hello.").with_silence(SilenceSettings {
            h1: 11.0,
            ..Default::default()
        });
        assert!(orch.generate(&bad_silence).await.unwrap_err().is_validation());

        let long_directive = orch.generate(&wav_request("Hello.\n{{61}}\nBye.")).await;
        assert!(matches!(long_directive, Err(VoiceboxError::InvalidInput(_))));

        let oversized = wav_request("Tiny Supercalifragilistic").with_max_chars(10);
        assert!(matches!(
            orch.generate(&oversized).await,
            Err(VoiceboxError::InvalidInput(_))
        ));

        let mp3 = GenerationRequest::new("Hello.");
        assert!(matches!(
            orch.generate(&mp3).await,
            Err(VoiceboxError::UnsupportedFormat(_))
        ));

        assert_eq!(synth.calls(), 0);
    }
}

// ============================================================================
// Run Control Tests
// ============================================================================

mod run_control_tests {
    use super::*;
    use tokio::sync::Notify;

    struct GatedSynthesizer {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl SpeechSynthesizer for GatedSynthesizer {
        async fn synthesize(
            &self,
            _text: &str,
            _params: &VoiceParams,
        ) -> Result<SpeechAudio, SynthesisError> {
            self.gate.notified().await;
            let pcm = PcmBuffer::new(STUB_RATE, 1, vec![7; STUB_FRAMES]);
            let data = NativeCodec::without_ffmpeg()
                .encode(&pcm, AudioFormat::Wav)
                .map_err(|e| SynthesisError::InvalidResponse(e.to_string()))?;
            Ok(SpeechAudio::new(data, "audio/wav"))
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_second_run_rejected_while_processing() {
        let gate = Arc::new(Notify::new());
        let orch = Orchestrator::new(
            Arc::new(GatedSynthesizer { gate: gate.clone() }),
            native_assembler(),
        );
        let request = wav_request("Only paragraph.");

        let first = orch.generate(&request);
        tokio::pin!(first);

        tokio::select! {
            _ = &mut first => panic!("run finished before the gate opened"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}
        }

        assert!(matches!(orch.state(), RunState::Processing { .. }));
        assert!(matches!(
            orch.generate(&request).await,
            Err(VoiceboxError::RunInProgress)
        ));

        gate.notify_one();
        assert!(first.await.is_ok());
        assert_eq!(orch.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_abandoned_run_releases_orchestrator() {
        let gate = Arc::new(Notify::new());
        let orch = Orchestrator::new(
            Arc::new(GatedSynthesizer { gate: gate.clone() }),
            native_assembler(),
        );
        let request = wav_request("Only paragraph.");

        let abandoned = tokio::time::timeout(Duration::from_millis(50), orch.generate(&request)).await;
        assert!(abandoned.is_err());
        assert!(matches!(orch.state(), RunState::Failed(_)));

        gate.notify_one();
        assert!(orch.generate(&request).await.is_ok());
    }
}
