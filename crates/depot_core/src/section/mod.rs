//! Bounded append-only section files.
//!
//! A section is the primitive storage unit of the queue: one file holding
//! framed records, append-only, immutable once its position reaches the
//! configured capacity ("full").
//!
//! ## Record Format
//!
//! Every section begins with a marker record declaring how the file was
//! produced (`A` written directly, `C` produced by compaction):
//!
//! ```text
//! | 'A' | 0x00 0x01 | tag (1) | '\n' |
//! ```
//!
//! Data records:
//!
//! ```text
//! | type (1) | stored length (u16 BE) | stored payload (N) | '\n' |
//! ```
//!
//! where `type` is `A` (payload contains no reserved bytes, stored
//! verbatim) or `B` (reserved bytes escaped: `\` -> `\\`, `\n` -> `\$`,
//! `-` -> `\.`). The stored length counts the escaped bytes, so the
//! terminating separator sits at a known offset in the intact case.
//!
//! Removed records stand in for bytes elided by compaction:
//!
//! ```text
//! | 'C' | removed byte count (u32 BE) | '\n' |
//! ```
//!
//! A streamer advances its position by the removed count rather than the
//! six physical bytes, which keeps record ids stable across compaction.
//!
//! ## Torn Writes
//!
//! A writer that crashes mid-record leaves a frame without its separator.
//! The next writer to open the file appends `--\n` (`-` is reserved and
//! escaped inside payloads, so it can only appear bare here); streamers
//! flag the affected record `truncated` instead of failing.

mod compactor;
mod record;
mod streamer;
mod writer;

pub use compactor::SectionCompactor;
pub use record::{
    SectionEntry, SectionRecord, SectionRecordType, ABSOLUTE_MAX_FILE_SIZE, MARKER_ESCAPE,
    MARKER_FAIL, MARKER_FAIL_REMAP, MARKER_SEPARATOR, MARKER_SEPARATOR_REMAP, MAX_FILE_SIZE,
    MAX_ITEM_SIZE,
};
pub use streamer::SectionStreamer;
pub use writer::SectionWriter;
