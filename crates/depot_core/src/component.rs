//! Component addressing.
//!
//! A [`Component`] names one section within the queue's directory tree. It
//! is a 4-tuple of small integers that maps bijectively onto a packed 32-bit
//! value via mixed-radix arithmetic: radix 1000 for the three inner digits
//! and radix 2 for the outer one. Concatenated with a 32-bit local offset it
//! forms the 64-bit global id of a record.

use crate::error::{DepotError, DepotResult};
use std::path::{Path, PathBuf};

/// Exclusive upper bound for the three inner digits.
const MAX_VALUE: u32 = 1000;

/// Exclusive upper bound for the packed encoding (2 × 1000³).
const MAX_ENCODED: u32 = 2_000_000_000;

/// File extension for section files.
const SECTION_EXTENSION: &str = "dpo";

/// The 4-level address of a section.
///
/// Components order lexicographically, which matches the order of their
/// packed encodings, so sections can be compared and iterated by either
/// representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Component {
    one: u16,
    two: u16,
    three: u16,
    four: u16,
}

/// The filesystem location of a component: the directory holding the
/// section file, and the file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentPath {
    /// Directory that must exist before the section file can be created.
    pub directory: PathBuf,
    /// The section file path.
    pub file: PathBuf,
}

impl Component {
    /// Creates a component from its four digits.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `one > 1` or any inner digit is
    /// outside `[0, 1000)`.
    pub fn new(one: u16, two: u16, three: u16, four: u16) -> DepotResult<Self> {
        if u32::from(one) > 1
            || u32::from(two) >= MAX_VALUE
            || u32::from(three) >= MAX_VALUE
            || u32::from(four) >= MAX_VALUE
        {
            return Err(DepotError::validation(format!(
                "invalid component value ({one}, {two}, {three}, {four})"
            )));
        }

        Ok(Self {
            one,
            two,
            three,
            four,
        })
    }

    /// Unpacks a component from its 32-bit encoding.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `encoded` is outside the addressable
    /// range.
    pub fn from_encoded(encoded: u32) -> DepotResult<Self> {
        if encoded >= MAX_ENCODED {
            return Err(DepotError::validation(format!(
                "encoded component {encoded} exceeds maximum value"
            )));
        }

        let one = encoded / (MAX_VALUE * MAX_VALUE * MAX_VALUE);
        let two = (encoded % (MAX_VALUE * MAX_VALUE * MAX_VALUE)) / (MAX_VALUE * MAX_VALUE);
        let three = (encoded % (MAX_VALUE * MAX_VALUE)) / MAX_VALUE;
        let four = encoded % MAX_VALUE;

        // Digits are in range by construction of the divisions above.
        Ok(Self {
            one: one as u16,
            two: two as u16,
            three: three as u16,
            four: four as u16,
        })
    }

    /// Packs the component into its 32-bit encoding.
    #[must_use]
    pub fn encode(self) -> u32 {
        u32::from(self.one) * MAX_VALUE * MAX_VALUE * MAX_VALUE
            + u32::from(self.two) * MAX_VALUE * MAX_VALUE
            + u32::from(self.three) * MAX_VALUE
            + u32::from(self.four)
    }

    /// Combines this component with a local offset into a 64-bit global id.
    #[must_use]
    pub fn encode_id(self, local_id: u32) -> u64 {
        (u64::from(self.encode()) << 32) | u64::from(local_id)
    }

    /// Splits a 64-bit global id into its component and local offset.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the component half is out of range.
    pub fn decode_id(id: u64) -> DepotResult<(Self, u32)> {
        let component = Self::from_encoded((id >> 32) as u32)?;
        let local_id = id as u32;
        Ok((component, local_id))
    }

    /// Returns the lexicographically next component, or `None` if this is
    /// the last addressable one.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let max = (MAX_VALUE - 1) as u16;

        if self.four < max {
            Some(Self {
                four: self.four + 1,
                ..self
            })
        } else if self.three < max {
            Some(Self {
                three: self.three + 1,
                four: 0,
                ..self
            })
        } else if self.two < max {
            Some(Self {
                two: self.two + 1,
                three: 0,
                four: 0,
                ..self
            })
        } else if self.one < 1 {
            Some(Self {
                one: self.one + 1,
                two: 0,
                three: 0,
                four: 0,
            })
        } else {
            None
        }
    }

    /// Returns true if this is the first component.
    #[must_use]
    pub fn is_first(self) -> bool {
        self == Self::default()
    }

    /// Returns true if this is the last addressable component.
    #[must_use]
    pub fn is_last(self) -> bool {
        self.next().is_none()
    }

    /// Derives the directory and file paths for this component below `base`.
    #[must_use]
    pub fn path(self, base: &Path) -> ComponentPath {
        let directory = base
            .join(format!("d{}", self.one))
            .join(format!("d{}", self.two))
            .join(format!("d{}", self.three));
        let file = directory.join(format!("d{}.{}", self.four, SECTION_EXTENSION));

        ComponentPath { directory, file }
    }
}
