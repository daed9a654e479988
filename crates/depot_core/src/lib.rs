//! # Depot Core
//!
//! Persistent append-only record log ("queue") stored as a tree of
//! bounded-size section files.
//!
//! This crate provides:
//! - Binary record framing with per-record escaping and torn-write repair
//! - A resumable writer and streamer over rolling section files
//! - Offline compaction that preserves record ids
//! - 64-bit global ids combining a section address with a byte offset
//!
//! ## On-disk layout
//!
//! ```text
//! <root>/d<one>/d<two>/d<three>/d<four>.dpo
//! ```
//!
//! `one` counts in {0,1}, the inner three levels in [0,1000), giving two
//! billion addressable sections. A section holds framed records (see
//! [`section`]) and becomes immutable once it reaches its configured
//! capacity; the writer then rolls to the next component.
//!
//! ## Example
//!
//! ```no_run
//! use depot_core::{Config, Queue};
//!
//! # fn main() -> depot_core::DepotResult<()> {
//! let mut queue = Queue::new("/var/lib/depot", Config::default());
//! let id = queue.append(b"hello")?;
//! queue.sync()?;
//!
//! let mut streamer = queue.stream(Some(id))?;
//! while let Some(item) = streamer.next()? {
//!     println!("{}: {} bytes", item.id, item.data.len());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod component;
pub mod config;
pub mod discovery;
pub mod error;
pub mod queue;
pub mod section;

pub use component::{Component, ComponentPath};
pub use config::Config;
pub use error::{DepotError, DepotResult};
pub use queue::{Queue, QueueCompactor, QueueItem, QueueStreamer, QueueWriter};
pub use section::{
    SectionCompactor, SectionEntry, SectionRecord, SectionRecordType, SectionStreamer,
    SectionWriter, MAX_FILE_SIZE, MAX_ITEM_SIZE,
};
