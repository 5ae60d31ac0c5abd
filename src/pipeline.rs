use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::audio::{AudioAssembler, AudioUnit, SpeechAudio};
use crate::config::{AudioFormat, DEFAULT_MAX_CHARS};
use crate::error::{Result, VoiceboxError};
use crate::progress::{NoProgress, ProgressReporter};
use crate::silence::{plan_units, summarize, validate_directives, SilenceSettings, UnitPlan};
use crate::synth::{SpeechSynthesizer, VoiceParams};
use crate::text::{segment, Segment};

/// Lifecycle of a single generation run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Idle,
    Validating,
    Processing { current: usize, total: usize },
    Assembling,
    Completed,
    Failed(String),
}

impl RunState {
    /// True while a run holds the orchestrator.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunState::Validating | RunState::Processing { .. } | RunState::Assembling
        )
    }
}

/// Everything needed to narrate one text.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub text: String,
    pub voice: VoiceParams,
    pub silence: SilenceSettings,
    /// Maximum characters per synthesis request.
    pub max_chars: usize,
}

impl GenerationRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: VoiceParams::default(),
            silence: SilenceSettings::default(),
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    pub fn with_voice(mut self, voice: VoiceParams) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_silence(mut self, silence: SilenceSettings) -> Self {
        self.silence = silence;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

/// Statistics from a completed run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Segments produced by the segmenter, markers included.
    pub segments: usize,
    pub speech_units: usize,
    pub silence_units: usize,
    pub silence_secs: f64,
    pub audio_duration: Duration,
    pub synthesis_time: Duration,
    pub assembly_time: Duration,
    pub total_time: Duration,
    pub synthesizer: String,
}

/// Final audio of a completed run.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub format: AudioFormat,
    pub duration: Duration,
    pub stats: PipelineStats,
}

/// Releases the run slot even if the `generate` future is dropped.
struct ActiveRunGuard<'a> {
    orchestrator: &'a Orchestrator,
}

impl Drop for ActiveRunGuard<'_> {
    fn drop(&mut self) {
        if self.orchestrator.state().is_active() {
            warn!("Generation abandoned before completion");
            self.orchestrator
                .set_state(RunState::Failed(VoiceboxError::Cancelled.to_string()));
        }
        self.orchestrator.active.store(false, Ordering::SeqCst);
    }
}

/// Drives segmentation, synthesis and assembly for one run at a time.
pub struct Orchestrator {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    assembler: AudioAssembler,
    concurrency: usize,
    progress: Arc<dyn ProgressReporter>,
    cancelled: Arc<AtomicBool>,
    state: Mutex<RunState>,
    active: AtomicBool,
}

impl Orchestrator {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, assembler: AudioAssembler) -> Self {
        Self {
            synthesizer,
            assembler,
            concurrency: 1,
            progress: Arc::new(NoProgress),
            cancelled: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(RunState::Idle),
            active: AtomicBool::new(false),
        }
    }

    /// Number of synthesis requests allowed in flight. 1 is sequential.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Flag checked between segments; setting it aborts the run.
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn state(&self) -> RunState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_state(&self, state: RunState) {
        match self.state.lock() {
            Ok(mut current) => *current = state.clone(),
            Err(poisoned) => *poisoned.into_inner() = state.clone(),
        }
        self.progress.on_state(&state);
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(VoiceboxError::Cancelled);
        }
        Ok(())
    }

    /// Run the full pipeline for `request`.
    ///
    /// Fails with [`VoiceboxError::RunInProgress`] if another run on this
    /// orchestrator has not finished. Any failure aborts the run; partial
    /// audio is never returned.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VoiceboxError::RunInProgress);
        }
        let _guard = ActiveRunGuard { orchestrator: self };

        match self.run(request).await {
            Ok(output) => {
                self.set_state(RunState::Completed);
                Ok(output)
            }
            Err(e) => {
                warn!("Generation failed: {}", e);
                self.set_state(RunState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        let start_time = Instant::now();

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 1: Validation
        // ═══════════════════════════════════════════════════════════════════════
        self.set_state(RunState::Validating);
        info!("Stage 1/3: Validating input");

        let segments = self.validate(request)?;
        let plan = plan_units(&segments, &request.silence);
        let summary = summarize(&plan);

        if summary.speech_units == 0 {
            return Err(VoiceboxError::NoAudioProduced);
        }

        info!(
            "Planned {} speech requests and {} silences ({:.1}s) from {} segments",
            summary.speech_units,
            summary.silence_units,
            summary.total_silence_secs,
            segments.len()
        );

        self.check_cancelled()?;

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 2: Synthesis
        // ═══════════════════════════════════════════════════════════════════════
        info!(
            "Stage 2/3: Synthesizing with {} (concurrency: {})",
            self.synthesizer.name(),
            self.concurrency
        );
        let synthesis_start = Instant::now();

        let speech: Vec<&Segment> = plan
            .iter()
            .filter_map(|unit| match unit {
                UnitPlan::Speech { segment } => Some(&segments[*segment]),
                UnitPlan::Silence { .. } => None,
            })
            .collect();

        let audio = if self.concurrency > 1 && speech.len() > 1 {
            self.synthesize_concurrent(&speech, &request.voice).await?
        } else {
            self.synthesize_sequential(&speech, &request.voice).await?
        };

        let synthesis_time = synthesis_start.elapsed();
        info!(
            "Synthesis complete: {} segments in {:.2}s",
            audio.len(),
            synthesis_time.as_secs_f64()
        );

        self.check_cancelled()?;

        // ═══════════════════════════════════════════════════════════════════════
        // Stage 3: Assembly
        // ═══════════════════════════════════════════════════════════════════════
        self.set_state(RunState::Assembling);
        info!("Stage 3/3: Assembling {} audio", request.voice.format);
        let assembly_start = Instant::now();

        let mut audio = audio.into_iter();
        let mut units = Vec::with_capacity(plan.len());
        for unit in &plan {
            match unit {
                UnitPlan::Speech { .. } => {
                    let speech = audio.next().ok_or(VoiceboxError::NoAudioProduced)?;
                    units.push(AudioUnit::Speech(speech));
                }
                UnitPlan::Silence { seconds } => {
                    units.push(AudioUnit::Silence { seconds: *seconds })
                }
            }
        }

        let assembler = self.assembler.clone();
        let format = request.voice.format;
        let assembled = tokio::task::spawn_blocking(move || assembler.concatenate(&units, format))
            .await
            .map_err(|e| VoiceboxError::Audio(format!("Assembly task failed: {e}")))??;

        let assembly_time = assembly_start.elapsed();
        info!(
            "Assembly complete: {:.1}s of audio in {:.2}s",
            assembled.duration.as_secs_f64(),
            assembly_time.as_secs_f64()
        );

        let stats = PipelineStats {
            segments: segments.len(),
            speech_units: summary.speech_units,
            silence_units: summary.silence_units,
            silence_secs: summary.total_silence_secs,
            audio_duration: assembled.duration,
            synthesis_time,
            assembly_time,
            total_time: start_time.elapsed(),
            synthesizer: self.synthesizer.name().to_string(),
        };

        Ok(GenerationOutput {
            bytes: assembled.data,
            mime_type: assembled.mime_type,
            format: assembled.format,
            duration: assembled.duration,
            stats,
        })
    }

    /// Reject bad input before any synthesis request is made.
    fn validate(&self, request: &GenerationRequest) -> Result<Vec<Segment>> {
        if request.text.trim().is_empty() {
            return Err(VoiceboxError::InvalidInput(
                "Text is empty. Please provide some text to narrate.".to_string(),
            ));
        }

        if !self.synthesizer.has_credentials() {
            return Err(VoiceboxError::Config(
                "No API key configured. Set OPENAI_API_KEY or enter a key.".to_string(),
            ));
        }

        if request.max_chars == 0 {
            return Err(VoiceboxError::InvalidInput(
                "Maximum characters per request must be greater than 0".to_string(),
            ));
        }

        if request.voice.model.trim().is_empty() || request.voice.voice.trim().is_empty() {
            return Err(VoiceboxError::InvalidInput(
                "Model and voice must not be empty".to_string(),
            ));
        }

        request.silence.validate()?;

        if !self.assembler.can_encode(request.voice.format) {
            return Err(VoiceboxError::UnsupportedFormat(format!(
                "{} output requires FFmpeg; install it or choose wav or pcm",
                request.voice.format
            )));
        }

        let segments = segment(&request.text, request.max_chars);
        validate_directives(&segments)?;

        if let Some((index, oversized)) = segments
            .iter()
            .enumerate()
            .find(|(_, s)| !s.within_limit)
        {
            return Err(VoiceboxError::InvalidInput(format!(
                "Segment {} has {} characters without a break, above the {} character limit",
                index + 1,
                oversized.length,
                request.max_chars
            )));
        }

        debug!("Validated {} segments", segments.len());
        Ok(segments)
    }

    async fn synthesize_sequential(
        &self,
        speech: &[&Segment],
        voice: &VoiceParams,
    ) -> Result<Vec<SpeechAudio>> {
        let total = speech.len();
        self.set_state(RunState::Processing { current: 0, total });

        let mut results = Vec::with_capacity(total);
        for (index, segment) in speech.iter().enumerate() {
            self.check_cancelled()?;

            debug!(
                "Synthesizing segment {}/{} ({}, {} chars)",
                index + 1,
                total,
                segment.kind.label(),
                segment.length
            );

            let audio = self
                .synthesizer
                .synthesize(&segment.content, voice)
                .await
                .map_err(|e| {
                    warn!("Segment {} failed: {}", index + 1, e);
                    VoiceboxError::from(e)
                })?;
            results.push(audio);

            self.set_state(RunState::Processing {
                current: index + 1,
                total,
            });
            self.progress.on_segment(index + 1, total);
        }

        Ok(results)
    }

    /// Bounded-concurrency synthesis. Results are returned in segment order;
    /// the first failure drops every in-flight request.
    async fn synthesize_concurrent(
        &self,
        speech: &[&Segment],
        voice: &VoiceParams,
    ) -> Result<Vec<SpeechAudio>> {
        let total = speech.len();
        self.set_state(RunState::Processing { current: 0, total });

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut futures = FuturesUnordered::new();

        for (index, segment) in speech.iter().enumerate() {
            let sem = semaphore.clone();
            let synthesizer = self.synthesizer.clone();
            let cancelled = self.cancelled.clone();
            let text = segment.content.clone();
            let voice = voice.clone();

            futures.push(async move {
                let _permit = sem
                    .acquire()
                    .await
                    .map_err(|_| VoiceboxError::Cancelled)?;
                if cancelled.load(Ordering::Relaxed) {
                    return Err(VoiceboxError::Cancelled);
                }

                debug!("Starting synthesis of segment {}", index + 1);
                let audio = synthesizer.synthesize(&text, &voice).await.map_err(|e| {
                    warn!("Segment {} failed: {}", index + 1, e);
                    VoiceboxError::from(e)
                })?;
                Ok::<_, VoiceboxError>((index, audio))
            });
        }

        let mut results: Vec<(usize, SpeechAudio)> = Vec::with_capacity(total);
        while let Some(result) = futures.next().await {
            results.push(result?);
            self.check_cancelled()?;

            self.set_state(RunState::Processing {
                current: results.len(),
                total,
            });
            self.progress.on_segment(results.len(), total);
        }

        results.sort_by_key(|(index, _)| *index);
        Ok(results.into_iter().map(|(_, audio)| audio).collect())
    }
}

/// Output file beside `input` with the format's extension; `speech.<ext>`
/// when the text came from stdin.
pub fn derive_output_path(input: Option<&Path>, format: AudioFormat) -> PathBuf {
    match input {
        Some(input) => {
            let stem = input.file_stem().unwrap_or_default();
            let mut output = input.to_path_buf();
            output.set_file_name(format!("{}.{}", stem.to_string_lossy(), format.extension()));
            output
        }
        None => PathBuf::from(format!("speech.{}", format.extension())),
    }
}

/// Print a summary of a completed run.
pub fn print_summary(output: &GenerationOutput, path: &Path) {
    let stats = &output.stats;
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                      Narration Complete                        ");
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Output:     {}", path.display());
    println!("  Format:     {} ({})", output.format, output.mime_type);
    println!("  Duration:   {:.1}s audio", output.duration.as_secs_f64());
    println!(
        "  Segments:   {} ({} spoken, {} silences totalling {:.1}s)",
        stats.segments, stats.speech_units, stats.silence_units, stats.silence_secs
    );
    println!("  Provider:   {}", stats.synthesizer);
    println!();
    println!("  Timing:");
    println!(
        "    Synthesize:  {:.2}s",
        stats.synthesis_time.as_secs_f64()
    );
    println!("    Assemble:    {:.2}s", stats.assembly_time.as_secs_f64());
    println!("    Total:       {:.2}s", stats.total_time.as_secs_f64());
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
