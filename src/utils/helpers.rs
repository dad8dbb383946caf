/// Helper utilities for basement

use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::Path;

use crate::utils::{ARCHIVE_TIMESTAMP_FORMAT, SHORT_ID_LEN, TRUTHY_LABEL_VALUES};

/// Format an archive timestamp in local time
pub fn format_archive_timestamp(at: DateTime<Local>) -> String {
    at.format(ARCHIVE_TIMESTAMP_FORMAT).to_string()
}

/// First characters of an engine id, as shown by `docker ps`
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Interpret a boolean label value
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    TRUTHY_LABEL_VALUES.contains(&value.as_str())
}

/// Engine names come back as `/name`
pub fn trim_container_name(name: &str) -> &str {
    name.trim_start_matches('/')
}

/// Remove everything inside `dir`, keeping `dir` itself
///
/// Mount points must survive: removing one would detach the volume from
/// the running child, and the engine refuses with EBUSY anyway. Entries
/// listed in `mount_points` (and directories leading to one) are emptied
/// in place instead; mounted files are left alone.
pub fn empty_directory(dir: &Path, mount_points: &[&Path]) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        // file_type does not follow symlinks, so links to directories are unlinked
        let is_dir = entry.file_type()?.is_dir();

        if mount_points.iter().any(|m| m.starts_with(&path)) {
            if is_dir {
                removed += empty_directory(&path, mount_points)?;
            }
            continue;
        }

        if is_dir {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
        removed += 1;
    }
    Ok(removed)
}
