//! Section writer.

use crate::config::Config;
use crate::error::{DepotError, DepotResult};
use crate::section::record::{
    is_reserved, marker_frame, SectionRecordType, HEADER_SIZE, MARKER_ESCAPE, MARKER_FAIL,
    MARKER_FAIL_REMAP, MARKER_FRAME_SIZE, MARKER_SEPARATOR, MARKER_SEPARATOR_REMAP, MAX_FILE_SIZE,
    MAX_ITEM_SIZE,
};
use crate::section::ABSOLUTE_MAX_FILE_SIZE;
use std::cmp;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Appends framed records to a single section file.
///
/// Opening an existing file repairs any torn tail left by a crashed writer
/// before the first append. Opening a file produced by compaction yields a
/// writer that is already full; compacted sections are immutable.
pub struct SectionWriter {
    buffer: std::io::BufWriter<File>,
    /// Logical position: the local id the next record will receive.
    position: u32,
    max_file_size: u32,
    last_id: Option<u32>,
    /// Set when an existing compacted section was opened; such sections
    /// are immutable regardless of position.
    compacted: bool,
}

impl SectionWriter {
    /// Opens (creating if necessary) the section at `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or repaired, or if it
    /// exceeds the format's absolute size ceiling.
    pub fn open(path: &Path, config: &Config) -> DepotResult<Self> {
        Self::open_with_kind(path, config, SectionRecordType::Raw)
    }

    /// Opens a section, stamping `kind` into the marker record if the file
    /// is fresh. Compaction uses this to mark its output.
    pub(crate) fn open_with_kind(
        path: &Path,
        config: &Config,
        kind: SectionRecordType,
    ) -> DepotResult<Self> {
        let max_file_size = cmp::min(config.max_file_size, MAX_FILE_SIZE);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len > u64::from(ABSOLUTE_MAX_FILE_SIZE) {
            return Err(DepotError::validation(format!(
                "section {} exceeds the absolute size ceiling",
                path.display()
            )));
        }

        let mut compacted = false;
        let position = if len < u64::from(MARKER_FRAME_SIZE) {
            if len > 0 {
                tracing::warn!(path = %path.display(), "rewriting partial section marker");
            }
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&marker_frame(kind))?;
            MARKER_FRAME_SIZE
        } else {
            let mut head = [0u8; MARKER_FRAME_SIZE as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut head)?;

            compacted = head == marker_frame(SectionRecordType::Removed);

            if compacted {
                // Compacted sections are complete by construction and
                // immutable; position reports the physical end.
                len as u32
            } else {
                Self::repair_tail(&mut file, path, len)?
            }
        };

        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            buffer: std::io::BufWriter::with_capacity(config.write_chunk_size, file),
            position,
            max_file_size,
            last_id: None,
            compacted,
        })
    }

    /// Checks the final byte of the file and, if a crashed writer left a
    /// record without its separator, closes the torn frame with `--\n`.
    /// Returns the physical length after repair.
    fn repair_tail(file: &mut File, path: &Path, len: u64) -> DepotResult<u32> {
        let mut tail = [0u8; 2];
        file.seek(SeekFrom::Start(len - 1))?;
        file.read_exact(&mut tail[..1])?;

        if tail[0] == MARKER_SEPARATOR {
            return Ok(len as u32);
        }

        file.seek(SeekFrom::Start(len - 2))?;
        file.read_exact(&mut tail)?;
        file.seek(SeekFrom::End(0))?;

        // Two fail markers so the byte before the separator is a bare fail
        // marker even when the torn frame ended on an escape byte. If a
        // previous repair already wrote them, only the separator is missing.
        let appended: &[u8] = if tail == [MARKER_FAIL, MARKER_FAIL] {
            &[MARKER_SEPARATOR]
        } else {
            &[MARKER_FAIL, MARKER_FAIL, MARKER_SEPARATOR]
        };
        file.write_all(appended)?;

        tracing::warn!(path = %path.display(), "repaired torn section tail");
        Ok((len + appended.len() as u64) as u32)
    }

    /// Appends one record and returns its local id.
    ///
    /// The payload is stored verbatim when it contains no reserved bytes,
    /// otherwise reserved bytes are escaped and the record tagged encoded.
    /// When the append brings the section to capacity it is synced to disk
    /// automatically.
    ///
    /// # Errors
    ///
    /// Returns [`DepotError::Validation`] if the payload exceeds
    /// [`MAX_ITEM_SIZE`], or [`DepotError::SectionFull`] if the section has
    /// reached capacity.
    pub fn append(&mut self, data: &[u8]) -> DepotResult<u32> {
        if data.len() > MAX_ITEM_SIZE {
            return Err(DepotError::validation(format!(
                "record of {} bytes exceeds the {MAX_ITEM_SIZE} byte maximum",
                data.len()
            )));
        }
        if self.is_full() {
            return Err(DepotError::SectionFull);
        }

        let reserved = data.iter().filter(|&&b| is_reserved(b)).count();
        let stored_len = data.len() + reserved;
        let record_type = if reserved > 0 {
            SectionRecordType::Encoded
        } else {
            SectionRecordType::Raw
        };

        self.buffer.write_all(&[record_type.as_byte()])?;
        self.buffer.write_all(&(stored_len as u16).to_be_bytes())?;

        if reserved > 0 {
            for &b in data {
                match b {
                    MARKER_ESCAPE => self.buffer.write_all(&[MARKER_ESCAPE, MARKER_ESCAPE])?,
                    MARKER_SEPARATOR => {
                        self.buffer
                            .write_all(&[MARKER_ESCAPE, MARKER_SEPARATOR_REMAP])?;
                    }
                    MARKER_FAIL => self.buffer.write_all(&[MARKER_ESCAPE, MARKER_FAIL_REMAP])?,
                    _ => self.buffer.write_all(&[b])?,
                }
            }
        } else {
            self.buffer.write_all(data)?;
        }
        self.buffer.write_all(&[MARKER_SEPARATOR])?;

        let id = self.position;
        self.position += (HEADER_SIZE + stored_len + 1) as u32;
        self.last_id = Some(id);

        if self.is_full() {
            self.sync()?;
        }

        Ok(id)
    }

    /// Appends a removed record covering `bytes` elided bytes and advances
    /// the logical position by that amount.
    pub(crate) fn append_removed(&mut self, bytes: u32) -> DepotResult<()> {
        self.buffer
            .write_all(&[SectionRecordType::Removed.as_byte()])?;
        self.buffer.write_all(&bytes.to_be_bytes())?;
        self.buffer.write_all(&[MARKER_SEPARATOR])?;

        self.position = self
            .position
            .checked_add(bytes)
            .ok_or_else(|| DepotError::validation("removed span overflows the section"))?;
        Ok(())
    }

    /// Flushes buffered records and syncs the file to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or sync fails.
    pub fn sync(&mut self) -> DepotResult<()> {
        self.buffer.flush()?;
        self.buffer.get_ref().sync_all()?;
        Ok(())
    }

    /// Current logical position; the local id the next record would
    /// receive. For a reopened compacted section, which refuses appends,
    /// this is the physical end of the file instead.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Local id of the last record appended through this writer, if any.
    #[must_use]
    pub fn last_id(&self) -> Option<u32> {
        self.last_id
    }

    /// Returns true if the section accepts no more appends: it has
    /// reached capacity, or it is a reopened compacted section.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.compacted || self.position >= self.max_file_size
    }

    /// Returns true if the section holds no records beyond its marker.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.position <= MARKER_FRAME_SIZE
    }
}
