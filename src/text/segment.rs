use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

/// Line prefix that starts a level-one heading.
pub const H1_PREFIX: &str = "# ";

/// Line prefix that starts a level-two heading.
pub const H2_PREFIX: &str = "## ";

/// A line consisting of exactly this token marks the end of a chapter.
pub const CHAPTER_END_MARKER: &str = "###";

/// Structural role of a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentKind {
    Paragraph,
    Heading1,
    Heading2,
    ChapterEnd,
    /// A `{{seconds}}` directive carrying its own duration.
    Silence(f64),
}

impl SegmentKind {
    pub fn label(&self) -> &'static str {
        match self {
            SegmentKind::Paragraph => "Paragraph",
            SegmentKind::Heading1 => "Heading 1",
            SegmentKind::Heading2 => "Heading 2",
            SegmentKind::ChapterEnd => "Chapter end",
            SegmentKind::Silence(_) => "Silence",
        }
    }

    /// Kinds whose content is sent to the speech provider.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            SegmentKind::Paragraph | SegmentKind::Heading1 | SegmentKind::Heading2
        )
    }
}

/// A structurally typed slice of the input text.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub content: String,
    /// Character count of `content`.
    pub length: usize,
    /// False only for a single token longer than the request limit.
    pub within_limit: bool,
    /// True when the next segment continues the same paragraph or heading.
    pub continues: bool,
}

impl Segment {
    fn text(kind: SegmentKind, content: String, max_chars: usize, continues: bool) -> Self {
        let length = content.chars().count();
        Self {
            kind,
            content,
            length,
            within_limit: length <= max_chars,
            continues,
        }
    }

    fn marker(kind: SegmentKind) -> Self {
        Self {
            kind,
            content: String::new(),
            length: 0,
            within_limit: true,
            continues: false,
        }
    }

    /// Whether this segment produces a synthesis request.
    pub fn is_speech(&self) -> bool {
        self.kind.is_text() && !self.content.is_empty()
    }
}

/// Split text into ordered, typed segments no longer than `max_chars`.
///
/// Lines are trimmed before marker detection. A heading occupies one line, a
/// blank line ends a paragraph, and paragraphs or headings longer than
/// `max_chars` are split at sentence boundaries, then at whitespace.
pub fn segment(text: &str, max_chars: usize) -> Vec<Segment> {
    let max_chars = max_chars.max(1);
    let mut segments = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim();

        if line.is_empty() {
            flush_paragraph(&mut paragraph, max_chars, &mut segments);
            continue;
        }

        if line == CHAPTER_END_MARKER {
            flush_paragraph(&mut paragraph, max_chars, &mut segments);
            segments.push(Segment::marker(SegmentKind::ChapterEnd));
            continue;
        }

        if let Some(seconds) = parse_silence_directive(line) {
            flush_paragraph(&mut paragraph, max_chars, &mut segments);
            segments.push(Segment::marker(SegmentKind::Silence(seconds)));
            continue;
        }

        if let Some(heading) = line.strip_prefix(H2_PREFIX) {
            flush_paragraph(&mut paragraph, max_chars, &mut segments);
            push_text(SegmentKind::Heading2, heading, max_chars, &mut segments);
            continue;
        }

        if let Some(heading) = line.strip_prefix(H1_PREFIX) {
            flush_paragraph(&mut paragraph, max_chars, &mut segments);
            push_text(SegmentKind::Heading1, heading, max_chars, &mut segments);
            continue;
        }

        paragraph.push(line);
    }

    flush_paragraph(&mut paragraph, max_chars, &mut segments);

    debug!(
        "Segmented {} characters into {} segments (max {} chars)",
        text.chars().count(),
        segments.len(),
        max_chars
    );

    segments
}

/// Parse a `{{seconds}}` directive line.
pub fn parse_silence_directive(line: &str) -> Option<f64> {
    static DIRECTIVE: OnceLock<Regex> = OnceLock::new();
    let re = DIRECTIVE.get_or_init(|| {
        Regex::new(r"^\{\{\s*(\d*\.?\d+)\s*\}\}$").expect("Invalid silence directive regex")
    });

    re.captures(line.trim())
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn flush_paragraph(lines: &mut Vec<&str>, max_chars: usize, segments: &mut Vec<Segment>) {
    if lines.is_empty() {
        return;
    }
    let content = lines.join("\n");
    lines.clear();
    push_text(SegmentKind::Paragraph, &content, max_chars, segments);
}

fn push_text(kind: SegmentKind, content: &str, max_chars: usize, segments: &mut Vec<Segment>) {
    let content = content.trim();
    if content.is_empty() {
        return;
    }

    let pieces = split_to_limit(content, max_chars);
    let count = pieces.len();
    for (i, piece) in pieces.into_iter().enumerate() {
        segments.push(Segment::text(kind, piece, max_chars, i + 1 < count));
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split text into pieces of at most `max_chars`, preferring sentence boundaries.
///
/// A single whitespace-free token longer than `max_chars` is kept whole.
fn split_to_limit(text: &str, max_chars: usize) -> Vec<String> {
    if char_len(text) <= max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        if char_len(sentence) <= max_chars {
            pack(&mut pieces, &mut current, sentence, max_chars);
            continue;
        }

        // Start the long sentence on a fresh piece, then fill word by word
        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        for word in sentence.split_whitespace() {
            pack(&mut pieces, &mut current, word, max_chars);
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    pieces
}

fn pack(pieces: &mut Vec<String>, current: &mut String, unit: &str, max_chars: usize) {
    let separator = if ends_cjk_sentence(current) { "" } else { " " };
    if current.is_empty() {
        current.push_str(unit);
    } else if char_len(current) + separator.len() + char_len(unit) <= max_chars {
        current.push_str(separator);
        current.push_str(unit);
    } else {
        pieces.push(std::mem::take(current));
        current.push_str(unit);
    }
}

/// CJK sentences are written without a space between them.
fn ends_cjk_sentence(text: &str) -> bool {
    text.chars()
        .rev()
        .find(|&ch| !is_closing(ch))
        .is_some_and(is_cjk_terminal)
}

#[inline]
fn is_sentence_terminal(ch: char) -> bool {
    matches!(ch, '.' | '!' | '?' | '…' | '。' | '！' | '？')
}

#[inline]
fn is_cjk_terminal(ch: char) -> bool {
    matches!(ch, '。' | '！' | '？')
}

#[inline]
fn is_closing(ch: char) -> bool {
    matches!(
        ch,
        '"' | '\'' | ')' | ']' | '}' | '\u{201D}' | '\u{2019}' | '»' | '」' | '』'
    )
}

/// Split text after sentence-ending punctuation followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        if !is_sentence_terminal(ch) {
            continue;
        }

        let mut end = i + ch.len_utf8();
        let mut cjk = is_cjk_terminal(ch);
        while let Some(&(j, next)) = chars.peek() {
            if is_sentence_terminal(next) || is_closing(next) {
                cjk |= is_cjk_terminal(next);
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }

        let at_boundary = match chars.peek() {
            None => true,
            Some(&(_, next)) => cjk || next.is_whitespace(),
        };

        if at_boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}
