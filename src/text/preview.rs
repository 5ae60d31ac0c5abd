use console::style;

use crate::silence::{plan_units, silence_after, summarize, SilenceSettings};

use super::{Segment, SegmentKind};

/// Render a human-readable listing of segments with their silence gaps.
pub fn render_preview(segments: &[Segment], settings: &SilenceSettings, max_chars: usize) -> String {
    let mut out = String::new();

    if segments.is_empty() {
        out.push_str("No segments: the text is empty.\n");
        return out;
    }

    let after = silence_after(segments, settings);

    for (index, (segment, silence)) in segments.iter().zip(&after).enumerate() {
        let header = match segment.kind {
            SegmentKind::Silence(seconds) => format!("[{}] Silence directive ({:.1}s)", index + 1, seconds),
            SegmentKind::ChapterEnd => format!("[{}] Chapter end", index + 1),
            kind => format!("[{}] {} ({} chars)", index + 1, kind.label(), segment.length),
        };
        out.push_str(&style(header).bold().to_string());

        if !segment.within_limit {
            out.push_str(&format!(
                " {}",
                style(format!("! exceeds the {} character limit", max_chars)).red()
            ));
        }
        out.push('\n');

        if segment.is_speech() {
            for line in segment.content.lines() {
                out.push_str("    ");
                out.push_str(line);
                out.push('\n');
            }
        }

        if *silence > 0.0 {
            out.push_str(&format!(
                "    {}\n",
                style(format!("... {:.1}s silence", silence)).dim()
            ));
        }
    }

    let summary = summarize(&plan_units(segments, settings));
    out.push_str(&format!(
        "\n{} segments, {} speech requests, {:.1}s of inserted silence\n",
        segments.len(),
        summary.speech_units,
        summary.total_silence_secs
    ));

    out
}
