//! Queue streamer.

use crate::component::Component;
use crate::config::Config;
use crate::error::DepotResult;
use crate::queue::QueueItem;
use crate::section::{SectionEntry, SectionStreamer};
use std::fs;
use std::io;
use std::path::PathBuf;

/// Sequential reader over the whole queue.
///
/// Follows the component order across section files, rolling to the next
/// section when one reaches capacity. `Ok(None)` means no item is
/// available right now; a writer may still be appending, so callers poll.
pub struct QueueStreamer {
    root: PathBuf,
    config: Config,
    component: Component,
    section: Option<SectionStreamer>,
    resume: Option<u32>,
    exhausted: bool,
}

impl QueueStreamer {
    /// Creates a streamer over the queue at `root`, optionally starting at
    /// the record with global id `start`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `start` does not decode to a valid
    /// component.
    pub fn new(
        root: impl Into<PathBuf>,
        config: &Config,
        start: Option<u64>,
    ) -> DepotResult<Self> {
        let (component, resume) = match start {
            Some(id) => {
                let (component, local) = Component::decode_id(id)?;
                (component, Some(local))
            }
            None => (Component::default(), None),
        };

        Ok(Self {
            root: root.into(),
            config: config.clone(),
            component,
            section: None,
            resume,
            exhausted: false,
        })
    }

    /// Returns the next item, or `None` if the queue is drained for now.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors and corruption from the underlying section.
    pub fn next(&mut self) -> DepotResult<Option<QueueItem>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }

            let entry = match self.section.as_mut() {
                Some(section) => section.next()?,
                None => match self.open_section()? {
                    Some(mut section) => {
                        let entry = section.next()?;
                        self.section = Some(section);
                        entry
                    }
                    None => return Ok(None),
                },
            };

            match entry {
                SectionEntry::Data(record) => {
                    return Ok(Some(QueueItem {
                        id: self.component.encode_id(record.id),
                        data: record.data,
                        truncated: record.truncated,
                    }));
                }
                SectionEntry::Removed(_) => {}
                SectionEntry::SoftEof => return Ok(None),
                SectionEntry::AbsoluteEof => match self.component.next() {
                    Some(next) => {
                        self.component = next;
                        self.section = None;
                        self.resume = None;
                    }
                    None => {
                        self.exhausted = true;
                        return Ok(None);
                    }
                },
            }
        }
    }

    /// Component of the section currently being read.
    #[must_use]
    pub fn component(&self) -> Component {
        self.component
    }

    fn open_section(&mut self) -> DepotResult<Option<SectionStreamer>> {
        let path = self.component.path(&self.root);

        // Distinguish a section that does not exist yet (the writer has
        // not reached this component) from one we cannot read.
        match fs::metadata(&path.file) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let streamer = SectionStreamer::open(&path.file, &self.config, self.resume.take())?;
        Ok(Some(streamer))
    }
}
