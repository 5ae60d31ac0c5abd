use crate::audio::ffmpeg_available;
use crate::config::{AudioFormat, Config, MODELS, VOICES};
use crate::pipeline::{derive_output_path, GenerationRequest};
use crate::settings::Settings;
use crate::silence::{SilenceSettings, MAX_STRUCTURAL_SILENCE_SECS};
use crate::text::segment;
use console::style;
use dialoguer::{Confirm, Input, Password, Select};
use std::fs;
use std::path::{Path, PathBuf};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text"];

pub struct InteractiveResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub config: Config,
    pub request: GenerationRequest,
    /// Choices to persist once the run succeeds.
    pub settings: Settings,
}

pub fn run_interactive_wizard(saved: &Settings) -> anyhow::Result<InteractiveResult> {
    print_header();

    // Step 1: Check/Setup API Key
    let config = setup_api_key()?;

    // Step 2: Select text file
    let input = select_text_file()?;
    let text = fs::read_to_string(&input)?;

    // Step 3: Model and voice
    let model = select_from("Select model", MODELS, &saved.model)?;
    let voice = select_from("Select voice", VOICES, &saved.voice)?;

    // Step 4: Output format
    let format = select_output_format(saved.format)?;

    // Step 5: Silence durations
    let silence = setup_silence(&saved.silence_settings)?;

    let output = derive_output_path(Some(&input), format);

    // Step 6: Confirm
    let settings = Settings {
        model,
        voice,
        format,
        text,
        silence_settings: silence,
    };
    print_summary(&input, &output, &settings, config.max_chars);

    if !Confirm::new()
        .with_prompt("Proceed with these settings?")
        .default(true)
        .interact()?
    {
        anyhow::bail!("Cancelled by user");
    }

    println!();

    let request = GenerationRequest::new(settings.text.clone())
        .with_voice(settings.voice_params())
        .with_silence(settings.silence_settings)
        .with_max_chars(config.max_chars);

    Ok(InteractiveResult {
        input,
        output,
        config,
        request,
        settings,
    })
}

fn print_header() {
    println!();
    println!(
        "{}",
        style("╔═══════════════════════════════════════════════════╗").cyan()
    );
    println!(
        "{}",
        style("║          voicebox - Text to Speech Narrator       ║").cyan()
    );
    println!(
        "{}",
        style("╚═══════════════════════════════════════════════════╝").cyan()
    );
    println!();
}

/// The key entered here lives only for this session.
fn setup_api_key() -> anyhow::Result<Config> {
    let mut config = Config::load().unwrap_or_default();

    if config
        .openai_api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty())
    {
        println!("{} API key configured", style("✓").green());
        return Ok(config);
    }

    println!("{} OpenAI API key not found", style("!").yellow());
    println!("  Get one at: https://platform.openai.com/api-keys\n");

    let api_key = Password::new()
        .with_prompt("Enter your OpenAI API key (used for this session only)")
        .interact()?;

    if api_key.trim().is_empty() {
        anyhow::bail!("API key is required");
    }

    config.openai_api_key = Some(api_key.trim().to_string());
    Ok(config)
}

fn select_text_file() -> anyhow::Result<PathBuf> {
    println!("\n{}", style("Select text file:").bold());

    let files = scan_text_files(".")?;

    if files.is_empty() {
        println!("  No text files found in current directory.\n");
        return prompt_path();
    }

    let mut items: Vec<String> = files
        .iter()
        .map(|f| {
            let size = fs::metadata(f)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "?".to_string());
            format!("{} ({})", f.display(), size)
        })
        .collect();
    items.push("Enter custom path...".to_string());

    let selection = Select::new()
        .with_prompt("Choose a file")
        .items(&items)
        .default(0)
        .interact()?;

    if selection == files.len() {
        prompt_path()
    } else {
        Ok(files[selection].clone())
    }
}

fn prompt_path() -> anyhow::Result<PathBuf> {
    let path: String = Input::new()
        .with_prompt("Enter file path")
        .interact_text()?;
    let path = PathBuf::from(path.trim());
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(path)
}

fn scan_text_files(dir: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_file() {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
                    files.push(path);
                }
            }
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn default_index(options: &[&str], current: &str) -> usize {
    options.iter().position(|o| *o == current).unwrap_or(0)
}

fn select_from(prompt: &str, options: &[&str], current: &str) -> anyhow::Result<String> {
    let selection = Select::new()
        .with_prompt(prompt)
        .items(options)
        .default(default_index(options, current))
        .interact()?;
    Ok(options[selection].to_string())
}

fn select_output_format(current: AudioFormat) -> anyhow::Result<AudioFormat> {
    let ffmpeg = ffmpeg_available();

    let items: Vec<String> = AudioFormat::ALL
        .iter()
        .map(|format| {
            if format.is_uncompressed() || ffmpeg {
                format.extension().to_uppercase()
            } else {
                format!("{} (requires FFmpeg)", format.extension().to_uppercase())
            }
        })
        .collect();

    let default = AudioFormat::ALL
        .iter()
        .position(|f| *f == current)
        .unwrap_or(0);

    let selection = Select::new()
        .with_prompt("Select output format")
        .items(&items)
        .default(default)
        .interact()?;

    Ok(AudioFormat::ALL[selection])
}

fn setup_silence(current: &SilenceSettings) -> anyhow::Result<SilenceSettings> {
    println!(
        "\n  Silence: H1 {:.1}s, H2 {:.1}s, paragraph {:.1}s, chapter end {:.1}s",
        current.h1, current.h2, current.paragraph, current.chapter_end
    );

    if !Confirm::new()
        .with_prompt("Customize silence durations?")
        .default(false)
        .interact()?
    {
        return Ok(*current);
    }

    Ok(SilenceSettings {
        h1: prompt_seconds("Silence after Heading 1 (s)", current.h1)?,
        h2: prompt_seconds("Silence after Heading 2 (s)", current.h2)?,
        paragraph: prompt_seconds("Silence after paragraphs (s)", current.paragraph)?,
        chapter_end: prompt_seconds("Silence at chapter end (s)", current.chapter_end)?,
    })
}

fn prompt_seconds(prompt: &str, default: f64) -> anyhow::Result<f64> {
    let value = Input::<f64>::new()
        .with_prompt(prompt)
        .default(default)
        .validate_with(|v: &f64| -> Result<(), String> {
            if v.is_finite() && (0.0..=MAX_STRUCTURAL_SILENCE_SECS).contains(v) {
                Ok(())
            } else {
                Err(format!(
                    "Enter a value between 0 and {}",
                    MAX_STRUCTURAL_SILENCE_SECS
                ))
            }
        })
        .interact_text()?;
    Ok(value)
}

fn print_summary(input: &Path, output: &Path, settings: &Settings, max_chars: usize) {
    let segments = segment(&settings.text, max_chars);
    let speech = segments.iter().filter(|s| s.is_speech()).count();

    println!("\n{}", style("═══ Summary ═══").bold());
    println!("  Input:     {}", style(input.display()).cyan());
    println!("  Output:    {}", style(output.display()).cyan());
    println!("  Model:     {}", settings.model);
    println!("  Voice:     {}", settings.voice);
    println!("  Format:    {}", settings.format.extension().to_uppercase());
    println!(
        "  Segments:  {} ({} speech requests)",
        segments.len(),
        speech
    );
    println!();
}
