//! Section record types and framing constants.

/// Maximum payload size for a single record, in bytes.
pub const MAX_ITEM_SIZE: usize = 8192;

/// Absolute ceiling for a section file's logical size. Local ids must fit
/// in a 31-bit non-negative integer so they stay portable across host
/// environments.
pub const ABSOLUTE_MAX_FILE_SIZE: u32 = 2_147_483_647;

/// Default capacity at which a section is considered full. Leaves headroom
/// below the absolute ceiling for the record that crosses the boundary plus
/// escaping overhead.
pub const MAX_FILE_SIZE: u32 = ABSOLUTE_MAX_FILE_SIZE - 3 * 65536;

/// Escape byte. Reserved; payload occurrences are escaped as `\\`.
pub const MARKER_ESCAPE: u8 = b'\\';

/// Record separator. Reserved; remapped to `\$` inside payloads.
pub const MARKER_SEPARATOR: u8 = b'\n';

/// Remap target for an escaped separator.
pub const MARKER_SEPARATOR_REMAP: u8 = b'$';

/// Fail marker. Written when repairing a torn write; reserved, remapped to
/// `\.` inside payloads so it can only appear bare in repaired regions.
pub const MARKER_FAIL: u8 = b'-';

/// Remap target for an escaped fail marker.
pub const MARKER_FAIL_REMAP: u8 = b'.';

/// Width of a Raw/Encoded record header: type byte plus 16-bit length.
pub(crate) const HEADER_SIZE: usize = 3;

/// On-disk width of the leading marker record:
/// `[Raw][0x00,0x01][tag][separator]`.
pub(crate) const MARKER_FRAME_SIZE: u32 = 5;

/// On-disk width of a removed record: `[Removed][count u32 BE][separator]`.
pub(crate) const REMOVED_FRAME_SIZE: usize = 6;

/// Largest possible on-disk frame: header, fully escaped payload,
/// separator. Used to bound corruption scans.
pub(crate) const MAX_FRAME_SIZE: usize = HEADER_SIZE + 2 * MAX_ITEM_SIZE + 1;

/// Type tag of a record, stored as its first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SectionRecordType {
    /// Payload stored verbatim; contains no reserved bytes.
    Raw = 0x41,
    /// Payload stored with reserved bytes escaped.
    Encoded = 0x42,
    /// A span of bytes elided by compaction; carries only a byte count.
    Removed = 0x43,
}

impl SectionRecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x41 => Some(Self::Raw),
            0x42 => Some(Self::Encoded),
            0x43 => Some(Self::Removed),
            _ => None,
        }
    }

    /// Converts the record type to its tag byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One decoded record from a section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRecord {
    /// Local id: the byte offset at which this record begins, in the
    /// section's original coordinate space.
    pub id: u32,
    /// Decoded payload. For a truncated record the partial bytes are
    /// returned as stored, without unescaping.
    pub data: Vec<u8>,
    /// True if the record was torn by a crashed writer.
    pub truncated: bool,
}

/// Outcome of advancing a section streamer by one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionEntry {
    /// A data record.
    Data(SectionRecord),
    /// A compaction marker spanning this many elided bytes.
    Removed(u32),
    /// No complete record is available yet; the section may still grow.
    SoftEof,
    /// The section has reached capacity and will never produce more data.
    AbsoluteEof,
}

/// Returns true if the byte is reserved by the framing grammar and must be
/// escaped inside payloads.
pub(crate) fn is_reserved(b: u8) -> bool {
    b == MARKER_ESCAPE || b == MARKER_SEPARATOR || b == MARKER_FAIL
}

/// The on-disk bytes of a section marker carrying `kind`.
pub(crate) const fn marker_frame(kind: SectionRecordType) -> [u8; MARKER_FRAME_SIZE as usize] {
    [
        SectionRecordType::Raw as u8,
        0x00,
        0x01,
        kind as u8,
        MARKER_SEPARATOR,
    ]
}
