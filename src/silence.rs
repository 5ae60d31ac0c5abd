use serde::{Deserialize, Serialize};

use crate::error::{Result, VoiceboxError};
use crate::text::{Segment, SegmentKind};

/// Upper bound for heading, paragraph and chapter-end silence.
pub const MAX_STRUCTURAL_SILENCE_SECS: f64 = 10.0;

/// Upper bound for an explicit `{{seconds}}` directive.
pub const MAX_DIRECTIVE_SILENCE_SECS: f64 = 60.0;

/// Seconds of silence inserted after each kind of segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SilenceSettings {
    pub h1: f64,
    pub h2: f64,
    pub paragraph: f64,
    pub chapter_end: f64,
}

impl Default for SilenceSettings {
    fn default() -> Self {
        Self {
            h1: 2.0,
            h2: 1.5,
            paragraph: 1.0,
            chapter_end: 3.0,
        }
    }
}

impl SilenceSettings {
    /// Reject negative, non-finite or over-limit durations.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("Heading 1", self.h1),
            ("Heading 2", self.h2),
            ("Paragraph", self.paragraph),
            ("Chapter end", self.chapter_end),
        ];

        for (name, value) in fields {
            if !value.is_finite() || !(0.0..=MAX_STRUCTURAL_SILENCE_SECS).contains(&value) {
                return Err(VoiceboxError::InvalidInput(format!(
                    "{} silence must be between 0 and {} seconds (got {})",
                    name, MAX_STRUCTURAL_SILENCE_SECS, value
                )));
            }
        }

        Ok(())
    }
}

/// Silence configured for a segment kind. Directives carry their own
/// duration and yield 0 here.
pub fn duration_for(kind: SegmentKind, settings: &SilenceSettings) -> f64 {
    match kind {
        SegmentKind::Heading1 => settings.h1,
        SegmentKind::Heading2 => settings.h2,
        SegmentKind::Paragraph => settings.paragraph,
        SegmentKind::ChapterEnd => settings.chapter_end,
        SegmentKind::Silence(_) => 0.0,
    }
}

/// Check every explicit directive against [`MAX_DIRECTIVE_SILENCE_SECS`].
pub fn validate_directives(segments: &[Segment]) -> Result<()> {
    for segment in segments {
        if let SegmentKind::Silence(seconds) = segment.kind {
            if !seconds.is_finite() || !(0.0..=MAX_DIRECTIVE_SILENCE_SECS).contains(&seconds) {
                return Err(VoiceboxError::InvalidInput(format!(
                    "Silence directive {{{{{}}}}} exceeds the {} second limit",
                    seconds, MAX_DIRECTIVE_SILENCE_SECS
                )));
            }
        }
    }
    Ok(())
}

/// Seconds of silence to insert after each segment.
///
/// Nothing is inserted after the last speech segment, so a run never ends in
/// silence. Pieces of a split paragraph get no silence between them.
pub fn silence_after(segments: &[Segment], settings: &SilenceSettings) -> Vec<f64> {
    let last_speech = segments.iter().rposition(Segment::is_speech);

    segments
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            match last_speech {
                Some(last) if index < last => {}
                _ => return 0.0,
            }
            match segment.kind {
                SegmentKind::Silence(seconds) => seconds,
                _ if segment.continues => 0.0,
                kind => duration_for(kind, settings),
            }
        })
        .collect()
}

/// One entry of the ordered audio plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitPlan {
    Speech { segment: usize },
    Silence { seconds: f64 },
}

/// Expand segments into the ordered speech/silence plan.
pub fn plan_units(segments: &[Segment], settings: &SilenceSettings) -> Vec<UnitPlan> {
    let after = silence_after(segments, settings);
    let mut plan = Vec::with_capacity(segments.len() * 2);

    for (index, (segment, silence)) in segments.iter().zip(after).enumerate() {
        if segment.is_speech() {
            plan.push(UnitPlan::Speech { segment: index });
        }
        if silence > 0.0 {
            plan.push(UnitPlan::Silence { seconds: silence });
        }
    }

    plan
}

/// Totals over a unit plan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlanSummary {
    pub speech_units: usize,
    pub silence_units: usize,
    pub total_silence_secs: f64,
}

pub fn summarize(plan: &[UnitPlan]) -> PlanSummary {
    plan.iter().fold(PlanSummary::default(), |mut summary, unit| {
        match unit {
            UnitPlan::Speech { .. } => summary.speech_units += 1,
            UnitPlan::Silence { seconds } => {
                summary.silence_units += 1;
                summary.total_silence_secs += seconds;
            }
        }
        summary
    })
}
