pub mod audio;
pub mod config;
pub mod error;
pub mod interactive;
pub mod pipeline;
pub mod progress;
pub mod settings;
pub mod silence;
pub mod synth;
pub mod text;

pub use config::{AudioFormat, Config};
pub use error::{Result, SynthesisError, VoiceboxError};
pub use pipeline::{
    derive_output_path, print_summary, GenerationOutput, GenerationRequest, Orchestrator,
    PipelineStats, RunState,
};
pub use silence::SilenceSettings;
pub use synth::{SpeechSynthesizer, VoiceParams};
pub use text::{segment, Segment, SegmentKind};
