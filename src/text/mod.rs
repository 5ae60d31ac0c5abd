pub mod preview;
pub mod segment;

pub use preview::render_preview;
pub use segment::{
    parse_silence_directive, segment, Segment, SegmentKind, CHAPTER_END_MARKER, H1_PREFIX,
    H2_PREFIX,
};
