//! Engine configuration.

use crate::section::MAX_FILE_SIZE;

/// Configuration shared by the queue and its sections.
#[derive(Debug, Clone)]
pub struct Config {
    /// Size in bytes at which a section is considered full. Once a
    /// section's position reaches this value it becomes immutable, so the
    /// final file may exceed it by up to one maximum-size record frame.
    pub max_file_size: u32,

    /// Buffer size for streaming reads.
    pub read_chunk_size: usize,

    /// Buffer size for the section writer.
    pub write_chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            read_chunk_size: 8 * 1024,
            write_chunk_size: 8 * 1024,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the section capacity. Values above the format's absolute
    /// maximum are clamped when the section is opened.
    #[must_use]
    pub const fn max_file_size(mut self, size: u32) -> Self {
        self.max_file_size = size;
        self
    }

    /// Sets the read buffer size.
    #[must_use]
    pub const fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    /// Sets the write buffer size.
    #[must_use]
    pub const fn write_chunk_size(mut self, size: usize) -> Self {
        self.write_chunk_size = size;
        self
    }
}
