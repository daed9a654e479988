//! Queue writer.

use crate::component::Component;
use crate::config::Config;
use crate::discovery;
use crate::error::{DepotError, DepotResult};
use crate::section::SectionWriter;
use std::fs;
use std::path::PathBuf;

/// Appends records to the queue, rolling to the next section when the
/// current one fills.
///
/// Opening resumes where the previous writer stopped: the latest section
/// is found by walking the directory tree for the highest-numbered child
/// at each level, so no side index is needed.
pub struct QueueWriter {
    root: PathBuf,
    config: Config,
    component: Component,
    section: SectionWriter,
    last_id: Option<u64>,
}

impl QueueWriter {
    /// Opens a writer positioned at the latest section under `root`,
    /// creating the directory tree on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory tree cannot be read or the latest
    /// section fails to open.
    pub fn open(root: impl Into<PathBuf>, config: &Config) -> DepotResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let (level_one, one) = discovery::latest_dir(&root)?;
        let (level_two, two) = discovery::latest_dir(&level_one)?;
        let (level_three, three) = discovery::latest_dir(&level_two)?;
        let (file, four) = discovery::latest_file(&level_three)?;

        let component = Component::new(one, two, three, four)?;
        let section = SectionWriter::open(&file, config)?;

        tracing::debug!(
            root = %root.display(),
            component = component.encode(),
            position = section.position(),
            "opened queue writer"
        );

        Ok(Self {
            root,
            config: config.clone(),
            component,
            section,
            last_id: None,
        })
    }

    /// Appends a record and returns its global id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for oversized payloads, or
    /// [`DepotError::AddressSpaceExhausted`] once every component has been
    /// used up.
    pub fn append(&mut self, data: &[u8]) -> DepotResult<u64> {
        if self.section.is_full() {
            self.roll()?;
        }

        let local = self.section.append(data)?;
        let id = self.component.encode_id(local);
        self.last_id = Some(id);
        Ok(id)
    }

    /// Syncs the current section to stable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or sync fails.
    pub fn sync(&mut self) -> DepotResult<()> {
        self.section.sync()
    }

    /// Global id of the last record appended through this writer, if any.
    #[must_use]
    pub fn last_id(&self) -> Option<u64> {
        self.last_id
    }

    /// Component of the section currently accepting appends.
    #[must_use]
    pub fn component(&self) -> Component {
        self.component
    }

    /// Returns true if the current section holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.section.is_empty()
    }

    fn roll(&mut self) -> DepotResult<()> {
        self.section.sync()?;

        let next = self
            .component
            .next()
            .ok_or(DepotError::AddressSpaceExhausted)?;
        let path = next.path(&self.root);
        fs::create_dir_all(&path.directory)?;

        self.section = SectionWriter::open(&path.file, &self.config)?;
        self.component = next;
        tracing::debug!(component = next.encode(), "rolled to next section");
        Ok(())
    }
}
