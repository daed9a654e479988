//! Queue compaction.

use crate::component::Component;
use crate::config::Config;
use crate::error::DepotResult;
use crate::section::{
    SectionCompactor, SectionRecordType, MARKER_SEPARATOR, MAX_FILE_SIZE,
};
use std::cmp;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Compacts the queue's full sections in place.
///
/// Walks components from the first, rewriting each full section through
/// [`SectionCompactor`], and stops at the first missing or still-growing
/// section so the writer's active tail is never touched.
pub struct QueueCompactor {
    root: PathBuf,
    config: Config,
}

impl QueueCompactor {
    /// Creates a compactor for the queue at `root`.
    pub fn new(root: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            root: root.into(),
            config: config.clone(),
        }
    }

    /// Compacts every full section, keeping records the filter accepts.
    /// The filter sees each record's global id and payload.
    ///
    /// # Errors
    ///
    /// Propagates I/O and corruption errors from the sections visited.
    pub fn compact<F>(&self, mut filter: F) -> DepotResult<()>
    where
        F: FnMut(u64, &[u8]) -> bool,
    {
        let mut component = Component::default();

        loop {
            let path = component.path(&self.root);
            match fs::metadata(&path.file) {
                Ok(metadata) => {
                    if !self.is_full(&path.file, metadata.len())? {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            }

            let current = component;
            SectionCompactor::new(&path.file, &self.config).compact(
                |record| filter(current.encode_id(record.id), &record.data),
                &path.file,
            )?;
            tracing::debug!(component = current.encode(), "compacted queue section");

            match component.next() {
                Some(next) => component = next,
                None => break,
            }
        }

        Ok(())
    }

    /// A section is full once its physical size reaches capacity, or once
    /// its marker says it was produced by compaction; compacted output is
    /// physically small but logically complete.
    fn is_full(&self, path: &Path, len: u64) -> DepotResult<bool> {
        let capacity = u64::from(cmp::min(self.config.max_file_size, MAX_FILE_SIZE));
        if len >= capacity {
            return Ok(true);
        }

        let marker = [
            SectionRecordType::Raw.as_byte(),
            0x00,
            0x01,
            SectionRecordType::Removed.as_byte(),
            MARKER_SEPARATOR,
        ];
        if len < marker.len() as u64 {
            return Ok(false);
        }

        let mut head = [0u8; 5];
        File::open(path)?.read_exact(&mut head)?;
        Ok(head == marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{QueueStreamer, QueueWriter};
    use tempfile::tempdir;

    #[test]
    fn compacts_full_sections_and_leaves_tail() {
        let temp = tempdir().unwrap();
        let config = Config::new().max_file_size(64);

        let mut writer = QueueWriter::open(temp.path(), &config).unwrap();
        let ids: Vec<u64> = (0..20)
            .map(|_| writer.append(b"payload").unwrap())
            .collect();
        writer.sync().unwrap();
        let tail = writer.component();

        let keep: Vec<u64> = ids.iter().copied().step_by(3).collect();
        QueueCompactor::new(temp.path(), &config)
            .compact(|id, _| keep.contains(&id))
            .unwrap();

        let mut streamer = QueueStreamer::new(temp.path(), &config, None).unwrap();
        let mut seen = Vec::new();
        while let Some(item) = streamer.next().unwrap() {
            seen.push(item.id);
        }

        // Records in full sections were filtered; the tail section kept
        // everything because compaction never reached it.
        let tail_base = tail.encode_id(0);
        let expected: Vec<u64> = ids
            .iter()
            .copied()
            .filter(|&id| keep.contains(&id) || id >= tail_base)
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn survivors_keep_their_ids() {
        let temp = tempdir().unwrap();
        let config = Config::new().max_file_size(64);

        let mut writer = QueueWriter::open(temp.path(), &config).unwrap();
        let ids: Vec<u64> = (0..12)
            .map(|i| writer.append(format!("item-{i:02}").as_bytes()).unwrap())
            .collect();
        writer.sync().unwrap();

        QueueCompactor::new(temp.path(), &config)
            .compact(|id, _| id == ids[4])
            .unwrap();

        let mut streamer = QueueStreamer::new(temp.path(), &config, Some(ids[4])).unwrap();
        let item = streamer.next().unwrap().unwrap();
        assert_eq!(item.id, ids[4]);
        assert_eq!(item.data, b"item-04");
    }

    #[test]
    fn repeated_compaction_is_stable() {
        let temp = tempdir().unwrap();
        let config = Config::new().max_file_size(64);

        let mut writer = QueueWriter::open(temp.path(), &config).unwrap();
        let ids: Vec<u64> = (0..12)
            .map(|_| writer.append(b"payload").unwrap())
            .collect();
        writer.sync().unwrap();

        let compactor = QueueCompactor::new(temp.path(), &config);
        compactor.compact(|id, _| id == ids[0] || id >= ids[10]).unwrap();
        let size_once = fs::metadata(temp.path().join("d0/d0/d0/d0.dpo"))
            .unwrap()
            .len();

        // An already compacted section counts as full and can be walked
        // again without growing.
        compactor.compact(|id, _| id == ids[0] || id >= ids[10]).unwrap();
        let size_twice = fs::metadata(temp.path().join("d0/d0/d0/d0.dpo"))
            .unwrap()
            .len();
        assert!(size_twice <= size_once);

        let mut streamer = QueueStreamer::new(temp.path(), &config, None).unwrap();
        let mut seen = Vec::new();
        while let Some(item) = streamer.next().unwrap() {
            seen.push(item.id);
        }
        assert!(seen.contains(&ids[0]));
        assert!(seen.contains(&ids[11]));
    }
}
