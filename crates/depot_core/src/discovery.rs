//! Latest-entry discovery.
//!
//! The queue persists no index of its own; the directory tree *is* the
//! index. To resume after a restart, the writer looks for the
//! highest-numbered child at each nesting level. Children are named `d<N>`
//! for directories and `d<N>.dpo` for section files, where `N` is purely
//! numeric with no sign and bounded to 15 bits. Anything else in the
//! directory is ignored.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Largest child number recognized during discovery.
const MAX_ENTRY_NUMBER: u32 = i16::MAX as u32;

/// Scans `base` for the child with the largest valid entry number.
///
/// Returns `None` if the directory holds no validly named children.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn latest(base: &Path) -> io::Result<Option<(PathBuf, u16)>> {
    let mut found: Option<(PathBuf, u16)> = None;

    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let name = entry.file_name();

        let Some(number) = extract_number(&name.to_string_lossy()) else {
            continue;
        };

        if found.as_ref().is_none_or(|(_, n)| number > *n) {
            found = Some((entry.path(), number));
        }
    }

    Ok(found)
}

/// Finds the latest numbered directory under `base`, defaulting to a
/// freshly created `d0` when none exists.
pub fn latest_dir(base: &Path) -> io::Result<(PathBuf, u16)> {
    match latest(base)? {
        Some(found) => Ok(found),
        None => {
            let dir = base.join("d0");
            fs::create_dir_all(&dir)?;
            Ok((dir, 0))
        }
    }
}

/// Finds the latest numbered section file under `base`, defaulting to the
/// `d0.dpo` path when none exists. The default path is not created; the
/// section writer creates it on first use.
pub fn latest_file(base: &Path) -> io::Result<(PathBuf, u16)> {
    match latest(base)? {
        Some(found) => Ok(found),
        None => Ok((base.join("d0.dpo"), 0)),
    }
}

/// Extracts the entry number from a child name, or `None` if the name does
/// not follow the `d<N>` / `d<N>.dpo` convention.
fn extract_number(name: &str) -> Option<u16> {
    let rest = name.strip_prefix('d')?;
    let digits = rest.strip_suffix(".dpo").unwrap_or(rest);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let value: u32 = digits.parse().ok()?;
    if value > MAX_ENTRY_NUMBER {
        return None;
    }

    Some(value as u16)
}
