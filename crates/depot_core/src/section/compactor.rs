//! Section compaction.

use crate::config::Config;
use crate::error::{DepotError, DepotResult};
use crate::section::record::{SectionEntry, SectionRecord, SectionRecordType, MARKER_FRAME_SIZE};
use crate::section::streamer::SectionStreamer;
use crate::section::writer::SectionWriter;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Rewrites a section, dropping records a filter rejects.
///
/// Surviving records keep their local ids: every dropped span is replaced
/// by a removed record carrying its logical width, so offsets established
/// before compaction stay valid. Adjacent dropped spans are merged, and
/// spans already removed by an earlier compaction merge with their
/// neighbors, so repeated compaction never grows the file.
///
/// The output is built in a temporary file, synced, and moved over the
/// destination atomically.
pub struct SectionCompactor {
    path: PathBuf,
    config: Config,
}

impl SectionCompactor {
    /// Creates a compactor for the section at `path`.
    pub fn new(path: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            path: path.into(),
            config: config.clone(),
        }
    }

    /// Compacts the section into `destination`, keeping records the filter
    /// accepts. The destination may be the source path itself.
    ///
    /// Truncated records are always dropped without consulting the filter;
    /// their partial bytes cannot be re-framed without shifting ids.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the section has not reached capacity;
    /// a section still accepting appends must not be rewritten underneath
    /// its writer.
    pub fn compact<F>(&self, filter: F, destination: &Path) -> DepotResult<()>
    where
        F: FnMut(&SectionRecord) -> bool,
    {
        self.compact_any(filter, destination, true)
    }

    pub(crate) fn compact_any<F>(
        &self,
        mut filter: F,
        destination: &Path,
        only_full: bool,
    ) -> DepotResult<()>
    where
        F: FnMut(&SectionRecord) -> bool,
    {
        let mut streamer = SectionStreamer::open(&self.path, &self.config, None)?;

        let temp = temp_path(destination)?;
        remove_stale(&temp)?;
        let mut writer =
            SectionWriter::open_with_kind(&temp, &self.config, SectionRecordType::Removed)?;

        // A repaired marker occupies more than its nominal frame; the
        // overage counts as removed so ids downstream stay aligned.
        let mut pending: u32 = streamer.position().saturating_sub(MARKER_FRAME_SIZE);
        let mut kept: u32 = 0;

        loop {
            let before = streamer.position();
            match streamer.next()? {
                SectionEntry::Data(record) => {
                    let cost = streamer.position() - before;
                    if !record.truncated && filter(&record) {
                        if pending > 0 {
                            writer.append_removed(pending)?;
                            pending = 0;
                        }
                        writer.append(&record.data)?;
                        kept += 1;
                    } else {
                        pending += cost;
                    }
                }
                SectionEntry::Removed(count) => {
                    pending += count;
                }
                SectionEntry::SoftEof => {
                    if only_full {
                        return Err(DepotError::validation(format!(
                            "section {} has not reached capacity; refusing to compact",
                            self.path.display()
                        )));
                    }
                    if pending > 0 {
                        writer.append_removed(pending)?;
                    }
                    break;
                }
                SectionEntry::AbsoluteEof => {
                    if pending > 0 {
                        writer.append_removed(pending)?;
                    }
                    break;
                }
            }
        }

        writer.sync()?;
        drop(writer);

        fs::rename(&temp, destination)?;
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            sync_dir(parent)?;
        }

        tracing::debug!(
            source = %self.path.display(),
            destination = %destination.display(),
            kept,
            "compacted section"
        );
        Ok(())
    }
}

fn temp_path(destination: &Path) -> DepotResult<PathBuf> {
    let name = destination
        .file_name()
        .ok_or_else(|| {
            DepotError::validation(format!(
                "invalid compaction destination {}",
                destination.display()
            ))
        })?
        .to_string_lossy();
    Ok(destination.with_file_name(format!(".{name}.tmp")))
}

/// A crashed compaction can leave a stale temporary behind; start fresh.
fn remove_stale(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
