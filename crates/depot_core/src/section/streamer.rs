//! Section streamer.

use crate::config::Config;
use crate::error::{DepotError, DepotResult};
use crate::section::record::{
    SectionEntry, SectionRecord, SectionRecordType, HEADER_SIZE, MARKER_ESCAPE, MARKER_FAIL,
    MARKER_FAIL_REMAP, MARKER_SEPARATOR, MARKER_SEPARATOR_REMAP, MAX_FILE_SIZE, MAX_FRAME_SIZE,
    REMOVED_FRAME_SIZE,
};
use std::cmp;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Sequential reader over a section file.
///
/// [`next`](Self::next) distinguishes a section that may still grow
/// ([`SectionEntry::SoftEof`]) from one that has reached capacity
/// ([`SectionEntry::AbsoluteEof`]), so callers can poll a live tail or roll
/// to the next section. A streamer that reports corruption is poisoned and
/// reproduces the same error on every subsequent call.
pub struct SectionStreamer {
    file: File,
    buf: Vec<u8>,
    buf_pos: usize,
    buf_len: usize,
    /// Logical position: the local id of the next record.
    position: u32,
    max_file_size: u32,
    kind: Option<SectionRecordType>,
    pending_seek: Option<u32>,
    failed: Option<String>,
}

impl SectionStreamer {
    /// Opens the section at `path`, optionally resuming from the record at
    /// local id `resume_from`.
    ///
    /// If the file is too short to hold its marker yet (a writer may be
    /// racing ahead of us), the marker read and any resume seek are
    /// deferred until the first [`next`](Self::next) call.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its marker is
    /// corrupt.
    pub fn open(path: &Path, config: &Config, resume_from: Option<u32>) -> DepotResult<Self> {
        let file = File::open(path)?;

        let mut streamer = Self {
            file,
            buf: vec![0; cmp::max(config.read_chunk_size, REMOVED_FRAME_SIZE)],
            buf_pos: 0,
            buf_len: 0,
            position: 0,
            max_file_size: cmp::min(config.max_file_size, MAX_FILE_SIZE),
            kind: None,
            pending_seek: resume_from,
            failed: None,
        };
        streamer.initialize()?;
        Ok(streamer)
    }

    /// Advances to the next entry.
    ///
    /// # Errors
    ///
    /// Returns [`DepotError::Corruption`] on malformed data; the streamer
    /// is then poisoned and repeats the error. I/O errors are propagated
    /// unchanged and do not poison the streamer.
    pub fn next(&mut self) -> DepotResult<SectionEntry> {
        if let Some(message) = &self.failed {
            return Err(DepotError::corruption(message.clone()));
        }

        match self.advance() {
            Err(DepotError::Corruption { message }) => {
                self.failed = Some(message.clone());
                Err(DepotError::Corruption { message })
            }
            other => other,
        }
    }

    /// Current logical position: the local id the next record would carry.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// The section's marker kind, once the marker has been read.
    #[must_use]
    pub fn kind(&self) -> Option<SectionRecordType> {
        self.kind
    }

    fn advance(&mut self) -> DepotResult<SectionEntry> {
        if !self.initialize()? {
            return Ok(SectionEntry::SoftEof);
        }
        if self.position >= self.max_file_size {
            return Ok(SectionEntry::AbsoluteEof);
        }
        self.decode_frame()
    }

    /// Reads the marker record and applies any deferred resume seek.
    /// Returns false if the file does not hold a complete marker yet.
    fn initialize(&mut self) -> DepotResult<bool> {
        if self.kind.is_none() {
            match self.decode_frame()? {
                SectionEntry::Data(record) => {
                    let kind = if record.truncated {
                        // Compacted output is written whole; a torn marker
                        // can only come from a direct writer.
                        SectionRecordType::Raw
                    } else if record.data.len() == 1 {
                        match SectionRecordType::from_byte(record.data[0]) {
                            Some(tag @ (SectionRecordType::Raw | SectionRecordType::Removed)) => {
                                tag
                            }
                            _ => {
                                return Err(DepotError::corruption(
                                    "invalid section marker tag",
                                ))
                            }
                        }
                    } else {
                        return Err(DepotError::corruption("invalid section marker"));
                    };
                    self.kind = Some(kind);
                }
                SectionEntry::SoftEof => return Ok(false),
                SectionEntry::Removed(_) | SectionEntry::AbsoluteEof => {
                    return Err(DepotError::corruption("missing section marker"));
                }
            }
        }

        if let Some(target) = self.pending_seek.take() {
            self.apply_seek(target)?;
        }
        Ok(true)
    }

    fn apply_seek(&mut self, target: u32) -> DepotResult<()> {
        if target <= self.position {
            return Ok(());
        }

        if self.kind == Some(SectionRecordType::Raw) {
            // Ids in a directly written section are physical offsets.
            self.file.seek(SeekFrom::Start(u64::from(target)))?;
            self.buf_pos = 0;
            self.buf_len = 0;
            self.position = target;
            return Ok(());
        }

        // Compacted coordinates are logical; walk forward to the target.
        while self.position < target {
            if matches!(self.decode_frame()?, SectionEntry::SoftEof) {
                break;
            }
        }
        Ok(())
    }

    fn decode_frame(&mut self) -> DepotResult<SectionEntry> {
        if !self.ensure_buffered(HEADER_SIZE)? {
            return Ok(SectionEntry::SoftEof);
        }

        let type_byte = self.buf[self.buf_pos];
        let Some(record_type) = SectionRecordType::from_byte(type_byte) else {
            return Err(DepotError::corruption(format!(
                "unknown record type {type_byte:#04x} at offset {}",
                self.position
            )));
        };

        if record_type == SectionRecordType::Removed {
            self.decode_removed()
        } else {
            self.decode_data(record_type)
        }
    }

    fn decode_removed(&mut self) -> DepotResult<SectionEntry> {
        if !self.ensure_buffered(REMOVED_FRAME_SIZE)? {
            return Ok(SectionEntry::SoftEof);
        }

        let start = self.buf_pos;
        let count = u32::from_be_bytes([
            self.buf[start + 1],
            self.buf[start + 2],
            self.buf[start + 3],
            self.buf[start + 4],
        ]);
        if self.buf[start + 5] != MARKER_SEPARATOR {
            return Err(DepotError::corruption(format!(
                "removed record at offset {} is missing its separator",
                self.position
            )));
        }

        self.buf_pos += REMOVED_FRAME_SIZE;
        // Advance by the span the record stands in for, not its six
        // physical bytes; this keeps ids stable across compaction.
        self.position = self.position.checked_add(count).ok_or_else(|| {
            DepotError::corruption(format!(
                "removed span at offset {} overflows the section",
                self.position
            ))
        })?;
        Ok(SectionEntry::Removed(count))
    }

    fn decode_data(&mut self, record_type: SectionRecordType) -> DepotResult<SectionEntry> {
        let start = self.buf_pos;
        let stored_len = usize::from(u16::from_be_bytes([
            self.buf[start + 1],
            self.buf[start + 2],
        ]));
        let hinted = HEADER_SIZE + stored_len;

        // The stored length puts the separator at a known offset for an
        // intact record; fall back to a scan when the hint misses.
        let have_hint = self.ensure_buffered(hinted + 1)?;
        let start = self.buf_pos;
        let separator = if have_hint && self.buf[start + hinted] == MARKER_SEPARATOR {
            Some(hinted)
        } else {
            self.scan_separator()?
        };
        let Some(separator) = separator else {
            return Ok(SectionEntry::SoftEof);
        };

        let start = self.buf_pos;
        let truncated = separator != hinted || self.buf[start + separator - 1] == MARKER_FAIL;

        let payload = &self.buf[start + HEADER_SIZE..start + separator];
        let data = if truncated {
            // Partial frames are returned as stored; decoding could fail
            // on a torn escape sequence.
            payload.to_vec()
        } else if record_type == SectionRecordType::Encoded {
            unescape(payload, self.position)?
        } else {
            payload.to_vec()
        };

        let record = SectionRecord {
            id: self.position,
            data,
            truncated,
        };
        self.buf_pos += separator + 1;
        self.position += (separator + 1) as u32;
        Ok(SectionEntry::Data(record))
    }

    /// Scans for the record separator starting just past the header.
    /// Returns `None` if the separator has not been written yet.
    fn scan_separator(&mut self) -> DepotResult<Option<usize>> {
        let mut rel = HEADER_SIZE;
        loop {
            while self.buf_pos + rel < self.buf_len {
                if self.buf[self.buf_pos + rel] == MARKER_SEPARATOR {
                    return Ok(Some(rel));
                }
                rel += 1;
                if rel > MAX_FRAME_SIZE {
                    return Err(DepotError::corruption(format!(
                        "no separator within the maximum frame at offset {}",
                        self.position
                    )));
                }
            }
            if !self.ensure_buffered(rel + 1)? {
                return Ok(None);
            }
        }
    }

    /// Buffers at least `min` unread bytes, growing the buffer if needed.
    /// Returns false on end of file; buffered partial bytes are kept so a
    /// later call can pick up where this one stopped.
    fn ensure_buffered(&mut self, min: usize) -> DepotResult<bool> {
        if self.buf_len - self.buf_pos >= min {
            return Ok(true);
        }

        if self.buf_pos > 0 {
            self.buf.copy_within(self.buf_pos..self.buf_len, 0);
            self.buf_len -= self.buf_pos;
            self.buf_pos = 0;
        }
        if min > self.buf.len() {
            self.buf.resize(min.next_power_of_two(), 0);
        }

        while self.buf_len < min {
            let read = self.file.read(&mut self.buf[self.buf_len..])?;
            if read == 0 {
                return Ok(false);
            }
            self.buf_len += read;
        }
        Ok(true)
    }
}

/// Decodes an escaped payload back to its original bytes.
fn unescape(stored: &[u8], offset: u32) -> DepotResult<Vec<u8>> {
    let mut out = Vec::with_capacity(stored.len());
    let mut bytes = stored.iter();

    while let Some(&b) = bytes.next() {
        if b != MARKER_ESCAPE {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(&MARKER_ESCAPE) => out.push(MARKER_ESCAPE),
            Some(&MARKER_SEPARATOR_REMAP) => out.push(MARKER_SEPARATOR),
            Some(&MARKER_FAIL_REMAP) => out.push(MARKER_FAIL),
            Some(&other) => {
                return Err(DepotError::corruption(format!(
                    "invalid escape sequence {other:#04x} in record at offset {offset}"
                )));
            }
            None => {
                return Err(DepotError::corruption(format!(
                    "dangling escape at end of record at offset {offset}"
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::writer::SectionWriter;
    use std::fs;
    use tempfile::tempdir;

    fn expect_data(streamer: &mut SectionStreamer) -> SectionRecord {
        match streamer.next().unwrap() {
            SectionEntry::Data(record) => record,
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn round_trip_raw_and_encoded() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("d0.dpo");
        let config = Config::default();

        let mut writer = SectionWriter::open(&path, &config).unwrap();
        let a = writer.append(b"plain").unwrap();
        let b = writer.append(b"with\nreserved\\bytes-here").unwrap();
        let c = writer.append(b"").unwrap();
        writer.sync().unwrap();

        let mut streamer = SectionStreamer::open(&path, &config, None).unwrap();

        let record = expect_data(&mut streamer);
        assert_eq!((record.id, record.truncated), (a, false));
        assert_eq!(record.data, b"plain");

        let record = expect_data(&mut streamer);
        assert_eq!(record.id, b);
        assert_eq!(record.data, b"with\nreserved\\bytes-here");

        let record = expect_data(&mut streamer);
        assert_eq!(record.id, c);
        assert!(record.data.is_empty());

        assert_eq!(streamer.next().unwrap(), SectionEntry::SoftEof);
    }

    #[test]
    fn resume_seeks_directly_in_raw_section() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("d0.dpo");
        let config = Config::default();

        let mut writer = SectionWriter::open(&path, &config).unwrap();
        writer.append(b"first").unwrap();
        let second = writer.append(b"second").unwrap();
        writer.append(b"third").unwrap();
        writer.sync().unwrap();

        let mut streamer = SectionStreamer::open(&path, &config, Some(second)).unwrap();
        assert_eq!(expect_data(&mut streamer).data, b"second");
        assert_eq!(expect_data(&mut streamer).data, b"third");
        assert_eq!(streamer.next().unwrap(), SectionEntry::SoftEof);
    }

    #[test]
    fn soft_eof_then_growth() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("d0.dpo");
        let config = Config::default();

        let mut writer = SectionWriter::open(&path, &config).unwrap();
        writer.append(b"early").unwrap();
        writer.sync().unwrap();

        let mut streamer = SectionStreamer::open(&path, &config, None).unwrap();
        assert_eq!(expect_data(&mut streamer).data, b"early");
        assert_eq!(streamer.next().unwrap(), SectionEntry::SoftEof);

        writer.append(b"late").unwrap();
        writer.sync().unwrap();

        assert_eq!(expect_data(&mut streamer).data, b"late");
        assert_eq!(streamer.next().unwrap(), SectionEntry::SoftEof);
    }

    #[test]
    fn empty_file_is_soft_eof() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("d0.dpo");
        fs::write(&path, b"").unwrap();

        let mut streamer = SectionStreamer::open(&path, &Config::default(), None).unwrap();
        assert_eq!(streamer.next().unwrap(), SectionEntry::SoftEof);
        assert!(streamer.kind().is_none());
    }

    #[test]
    fn truncated_record_is_flagged() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("d0.dpo");
        let config = Config::default();

        let mut writer = SectionWriter::open(&path, &config).unwrap();
        writer.append(b"whole").unwrap();
        writer.sync().unwrap();
        drop(writer);

        // A crash leaves a frame without its separator; reopening repairs it.
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(b"A\x00\x09part");
        fs::write(&path, &bytes).unwrap();
        let mut writer = SectionWriter::open(&path, &config).unwrap();
        let after = writer.append(b"after").unwrap();
        writer.sync().unwrap();

        let mut streamer = SectionStreamer::open(&path, &config, None).unwrap();

        let record = expect_data(&mut streamer);
        assert_eq!(record.data, b"whole");
        assert!(!record.truncated);

        let record = expect_data(&mut streamer);
        assert!(record.truncated);
        assert_eq!(record.data, b"part--");

        let record = expect_data(&mut streamer);
        assert_eq!((record.id, record.truncated), (after, false));
        assert_eq!(record.data, b"after");
    }

    #[test]
    fn corruption_poisons_permanently() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("d0.dpo");
        fs::write(&path, b"A\x00\x01A\nZ\x00\x01x\n").unwrap();

        let mut streamer = SectionStreamer::open(&path, &Config::default(), None).unwrap();

        let first = streamer.next().unwrap_err();
        assert!(matches!(first, DepotError::Corruption { .. }));

        let second = streamer.next().unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn invalid_escape_is_corruption() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("d0.dpo");
        fs::write(&path, b"A\x00\x01A\nB\x00\x02\\x\n").unwrap();

        let mut streamer = SectionStreamer::open(&path, &Config::default(), None).unwrap();
        assert!(matches!(
            streamer.next(),
            Err(DepotError::Corruption { .. })
        ));
    }

    #[test]
    fn absolute_eof_at_capacity() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("d0.dpo");
        let config = Config::new().max_file_size(32);

        let mut writer = SectionWriter::open(&path, &config).unwrap();
        let mut count = 0;
        while !writer.is_full() {
            writer.append(b"0123456789").unwrap();
            count += 1;
        }

        let mut streamer = SectionStreamer::open(&path, &config, None).unwrap();
        for _ in 0..count {
            expect_data(&mut streamer);
        }
        assert_eq!(streamer.next().unwrap(), SectionEntry::AbsoluteEof);
        assert_eq!(streamer.next().unwrap(), SectionEntry::AbsoluteEof);
    }

    #[test]
    fn compacted_section_entries() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("d0.dpo");

        // Marker stamped by compaction, a removed span of 100 bytes, then
        // a surviving record whose id reflects the original coordinates.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"A\x00\x01C\n");
        bytes.extend_from_slice(&[b'C', 0, 0, 0, 100, b'\n']);
        bytes.extend_from_slice(b"A\x00\x03abc\n");
        fs::write(&path, &bytes).unwrap();

        let config = Config::default();
        let mut streamer = SectionStreamer::open(&path, &config, None).unwrap();
        assert_eq!(streamer.kind(), Some(SectionRecordType::Removed));

        assert_eq!(streamer.next().unwrap(), SectionEntry::Removed(100));
        let record = expect_data(&mut streamer);
        assert_eq!(record.id, 105);
        assert_eq!(record.data, b"abc");

        // Resuming at the survivor's id walks the removed span instead of
        // seeking, since logical and physical offsets disagree here.
        let mut streamer = SectionStreamer::open(&path, &config, Some(105)).unwrap();
        let record = expect_data(&mut streamer);
        assert_eq!(record.id, 105);
        assert_eq!(record.data, b"abc");
    }

    #[test]
    fn unescape_rejects_dangling_escape() {
        assert!(unescape(b"ab\\", 0).is_err());
        assert_eq!(unescape(b"a\\\\b\\$c\\.d", 0).unwrap(), b"a\\b\nc-d");
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_payloads_round_trip(
            payloads in proptest::collection::vec(
                proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512),
                1..20,
            )
        ) {
            let temp = tempdir().unwrap();
            let path = temp.path().join("d0.dpo");
            let config = Config::default();

            let mut writer = SectionWriter::open(&path, &config).unwrap();
            let ids: Vec<u32> = payloads
                .iter()
                .map(|payload| writer.append(payload).unwrap())
                .collect();
            writer.sync().unwrap();

            let mut streamer = SectionStreamer::open(&path, &config, None).unwrap();
            for (payload, id) in payloads.iter().zip(&ids) {
                let record = expect_data(&mut streamer);
                proptest::prop_assert_eq!(record.id, *id);
                proptest::prop_assert_eq!(&record.data, payload);
                proptest::prop_assert!(!record.truncated);
            }
            proptest::prop_assert_eq!(streamer.next().unwrap(), SectionEntry::SoftEof);
        }
    }
}
