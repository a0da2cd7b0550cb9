//! Value types exchanged with a share server.
//!
//! Remote paths always use `\` as separator and are relative to the share
//! root. Search patterns are a directory path followed by a wildcard mask
//! (`\docs\*`, `*.txt`), matched case-insensitively with `*` and `?`.

use std::fmt;

/// Canonical separator for remote paths.
pub const SEPARATOR: char = '\\';

/// Share type: disk tree.
pub const SHARE_TYPE_DISK: u32 = 0x0000_0000;

/// Share type: interprocess communication (`IPC$`).
pub const SHARE_TYPE_IPC: u32 = 0x0000_0003;

/// Flag bit for special (administrative) shares.
pub const SHARE_SPECIAL: u32 = 0x8000_0000;

/// Identifier of a tree connection (a session attached to one share).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub u16);

/// Identifier of an open file within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u16);

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{}", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fid:{}", self.0)
    }
}

/// One row of a share enumeration, as the server sent it.
///
/// Names keep whatever terminator the wire format carries; callers strip it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawShareInfo {
    /// Network name of the share.
    pub name: String,
    /// Share type and flag bits.
    pub raw_flags: u32,
}

/// One row of a directory search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    /// Full (non-truncated) entry name.
    pub long_name: String,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Size in bytes (0 for directories).
    pub file_size: u64,
}

impl PathInfo {
    /// Directory row.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            long_name: name.into(),
            is_directory: true,
            file_size: 0,
        }
    }

    /// File row.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            long_name: name.into(),
            is_directory: false,
            file_size: size,
        }
    }
}

/// Split a path on either separator, dropping empty segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['\\', '/']).filter(|s| !s.is_empty())
}

/// Split a search pattern into its directory part and wildcard mask.
///
/// `\a\b\*` gives `("\a\b", "*")`, `*` gives `("", "*")`.
pub fn split_pattern(pattern: &str) -> (&str, &str) {
    match pattern.rfind(['\\', '/']) {
        Some(idx) => (&pattern[..idx], &pattern[idx + 1..]),
        None => ("", pattern),
    }
}

/// Case-insensitive wildcard match supporting `*` and `?`.
pub fn wildcard_match(mask: &str, name: &str) -> bool {
    let mask: Vec<char> = mask.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();

    let (mut m, mut n) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if m < mask.len() && (mask[m] == '?' || mask[m] == name[n]) {
            m += 1;
            n += 1;
        } else if m < mask.len() && mask[m] == '*' {
            star = Some((m, n));
            m += 1;
        } else if let Some((star_m, star_n)) = star {
            m = star_m + 1;
            n = star_n + 1;
            star = Some((star_m, star_n + 1));
        } else {
            return false;
        }
    }

    while m < mask.len() && mask[m] == '*' {
        m += 1;
    }
    m == mask.len()
}
