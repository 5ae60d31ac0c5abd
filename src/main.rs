use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use voicebox::audio::{AudioAssembler, NativeCodec};
use voicebox::config::{AudioFormat, Config};
use voicebox::interactive::run_interactive_wizard;
use voicebox::pipeline::{derive_output_path, print_summary, GenerationRequest, Orchestrator};
use voicebox::progress::ConsoleProgress;
use voicebox::settings::{FileSettingsStore, Settings, SettingsStore};
use voicebox::synth::create_synthesizer;
use voicebox::text::{render_preview, segment};

#[derive(Parser)]
#[command(name = "voicebox")]
#[command(version, about = "Narrate text into a single audio file")]
#[command(
    long_about = "Split structured text into segments, synthesize each with OpenAI text-to-speech, and join them with silence after headings, paragraphs and chapter ends."
)]
struct Cli {
    /// Input text file ("-" or omitted reads stdin)
    input: Option<PathBuf>,

    /// Output audio file (defaults to input name with the format's extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: mp3, opus, aac, flac, wav, pcm
    #[arg(short, long)]
    format: Option<String>,

    /// Speech model (e.g., tts-1, tts-1-hd)
    #[arg(short, long)]
    model: Option<String>,

    /// Voice (e.g., alloy, nova, shimmer)
    #[arg(long)]
    voice: Option<String>,

    /// Maximum characters per synthesis request
    #[arg(long)]
    max_chars: Option<usize>,

    /// Seconds of silence after a "# " heading
    #[arg(long)]
    h1_silence: Option<f64>,

    /// Seconds of silence after a "## " heading
    #[arg(long)]
    h2_silence: Option<f64>,

    /// Seconds of silence after a paragraph
    #[arg(long)]
    paragraph_silence: Option<f64>,

    /// Seconds of silence at a "###" chapter end
    #[arg(long)]
    chapter_silence: Option<f64>,

    /// Number of concurrent synthesis requests
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Print the segment plan and exit without calling the API
    #[arg(long)]
    preview: bool,

    /// Run the interactive wizard
    #[arg(short, long)]
    interactive: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn read_text(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read text from stdin")?;
            Ok(text)
        }
    }
}

/// Merge command-line flags over the persisted settings.
fn apply_overrides(cli: &Cli, mut settings: Settings) -> Result<Settings> {
    if let Some(ref format) = cli.format {
        settings.format = format
            .parse::<AudioFormat>()
            .map_err(|e: String| anyhow::anyhow!(e))?;
    }
    if let Some(ref model) = cli.model {
        settings.model = model.clone();
    }
    if let Some(ref voice) = cli.voice {
        settings.voice = voice.clone();
    }
    if let Some(h1) = cli.h1_silence {
        settings.silence_settings.h1 = h1;
    }
    if let Some(h2) = cli.h2_silence {
        settings.silence_settings.h2 = h2;
    }
    if let Some(paragraph) = cli.paragraph_silence {
        settings.silence_settings.paragraph = paragraph;
    }
    if let Some(chapter_end) = cli.chapter_silence {
        settings.silence_settings.chapter_end = chapter_end;
    }
    Ok(settings)
}

/// Match the output format to the `-o` extension.
///
/// Without `-f`, a known extension selects the format. Otherwise a mismatch
/// between the extension and the chosen format is reported.
fn resolve_output_format(cli: &Cli, settings: &mut Settings) {
    let Some(ref output) = cli.output else {
        return;
    };
    let ext = output.extension().and_then(|e| e.to_str());
    let from_ext = ext.and_then(|e| e.parse::<AudioFormat>().ok());

    match from_ext {
        Some(format) if cli.format.is_none() => settings.format = format,
        Some(format) if format == settings.format => {}
        _ => warn!(
            "Writing {} audio to {}; the file extension does not match",
            settings.format,
            output.display()
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let store = FileSettingsStore::default_location();
    let saved = store.as_ref().map(|s| s.load()).unwrap_or_default();

    let (input, output, mut config, request, settings) = if cli.interactive {
        let result = run_interactive_wizard(&saved)?;
        (
            Some(result.input),
            result.output,
            result.config,
            result.request,
            result.settings,
        )
    } else {
        let input = cli
            .input
            .clone()
            .filter(|p| p.as_os_str() != "-");
        if let Some(ref path) = input {
            if !path.exists() {
                anyhow::bail!("Input file not found: {}", path.display());
            }
        }

        let mut settings = apply_overrides(&cli, saved)?;
        resolve_output_format(&cli, &mut settings);
        settings.text = read_text(input.as_ref())?;

        let config = Config::load().context("Failed to load configuration")?;
        let max_chars = cli.max_chars.unwrap_or(config.max_chars);

        if cli.preview {
            let segments = segment(&settings.text, max_chars);
            print!(
                "{}",
                render_preview(&segments, &settings.silence_settings, max_chars)
            );
            return Ok(());
        }

        let output = cli
            .output
            .clone()
            .unwrap_or_else(|| derive_output_path(input.as_deref(), settings.format));

        let request = GenerationRequest::new(settings.text.clone())
            .with_voice(settings.voice_params())
            .with_silence(settings.silence_settings)
            .with_max_chars(max_chars);

        (input, output, config, request, settings)
    };

    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    if let Some(ref path) = input {
        info!("Input:    {}", path.display());
    }
    info!("Output:   {}", output.display());
    info!("Format:   {}", request.voice.format);
    info!("Model:    {}", request.voice.model);
    info!("Voice:    {}", request.voice.voice);

    let cancelled = Arc::new(AtomicBool::new(false));
    let handler_flag = cancelled.clone();
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\nCancelling after the current segment... (press Ctrl+C again to force quit)");
    })
    .context("Failed to install Ctrl+C handler")?;

    let synthesizer = create_synthesizer(&config)?;
    let assembler = AudioAssembler::new(Arc::new(NativeCodec::new()))
        .with_default_sample_rate(config.sample_rate);
    let orchestrator = Orchestrator::new(synthesizer, assembler)
        .with_concurrency(config.concurrency)
        .with_progress(Arc::new(ConsoleProgress::new()))
        .with_cancel_flag(cancelled);

    let result = match orchestrator.generate(&request).await {
        Ok(result) => result,
        Err(e) if e.is_validation() => {
            return Err(anyhow::Error::new(e).context("Invalid input; no speech requests were sent"))
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Narration failed")),
    };

    std::fs::write(&output, &result.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    if let Some(store) = store {
        if let Err(e) = store.save(&settings) {
            warn!("Failed to save settings to {}: {}", store.path().display(), e);
        }
    }

    print_summary(&result, &output);
    Ok(())
}
