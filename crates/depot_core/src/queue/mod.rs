//! The queue: a logically infinite record log over rolling sections.
//!
//! Records live in bounded section files arranged in a four-level
//! directory tree (`d<one>/d<two>/d<three>/d<four>.dpo`). When a section
//! reaches capacity the writer rolls to the next component; a streamer
//! follows the same order, so the queue reads as one continuous log. Every
//! record carries a 64-bit global id of the section's packed component in
//! the high half and the record's local offset in the low half, which
//! makes ids strictly increasing in append order and stable across
//! compaction.
//!
//! One writer per queue directory; any number of streamers may read
//! concurrently, including while the writer is appending.

mod compactor;
mod streamer;
mod writer;

pub use compactor::QueueCompactor;
pub use streamer::QueueStreamer;
pub use writer::QueueWriter;

use crate::config::Config;
use crate::error::DepotResult;
use std::path::PathBuf;

/// One record read back from the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// Global id: packed component in the high 32 bits, local offset in
    /// the low 32 bits.
    pub id: u64,
    /// The record payload.
    pub data: Vec<u8>,
    /// True if the record was torn by a crashed writer. The payload then
    /// holds the partial bytes as stored.
    pub truncated: bool,
}

/// Handle over a queue directory combining the writer, streamer and
/// compactor behind one surface.
///
/// The writer is opened lazily on the first append, so constructing a
/// `Queue` performs no I/O.
pub struct Queue {
    root: PathBuf,
    config: Config,
    writer: Option<QueueWriter>,
}

impl Queue {
    /// Creates a handle for the queue at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
            writer: None,
        }
    }

    /// Appends a record and returns its global id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for oversized payloads, or propagates
    /// I/O errors from the section layer.
    pub fn append(&mut self, data: &[u8]) -> DepotResult<u64> {
        self.writer()?.append(data)
    }

    /// Syncs any buffered appends to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or sync fails.
    pub fn sync(&mut self) -> DepotResult<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.sync(),
            None => Ok(()),
        }
    }

    /// Global id of the last record appended through this handle, if any.
    #[must_use]
    pub fn last_id(&self) -> Option<u64> {
        self.writer.as_ref().and_then(QueueWriter::last_id)
    }

    /// Opens a streamer over the queue, optionally starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `start` does not decode to a valid
    /// component.
    pub fn stream(&self, start: Option<u64>) -> DepotResult<QueueStreamer> {
        QueueStreamer::new(&*self.root, &self.config, start)
    }

    /// Compacts every full section, keeping records the filter accepts.
    /// The filter sees each record's global id and payload. The section
    /// currently accepting appends is never touched.
    ///
    /// # Errors
    ///
    /// Propagates I/O and corruption errors from the sections visited.
    pub fn compact<F>(&self, filter: F) -> DepotResult<()>
    where
        F: FnMut(u64, &[u8]) -> bool,
    {
        QueueCompactor::new(&*self.root, &self.config).compact(filter)
    }

    fn writer(&mut self) -> DepotResult<&mut QueueWriter> {
        match &mut self.writer {
            Some(writer) => Ok(writer),
            slot => {
                let writer = QueueWriter::open(&*self.root, &self.config)?;
                Ok(slot.insert(writer))
            }
        }
    }
}
