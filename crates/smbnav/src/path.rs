//! Remote browsing path.
//!
//! A [`PathCursor`] always starts with `\`, never ends with one (except the
//! root itself) and never contains empty, `.` or `..` segments. Input may use
//! either `/` or `\`.

use std::fmt;

use protocol::types::segments;
use protocol::SEPARATOR;
use serde::Serialize;

/// Normalized remote directory path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct PathCursor {
    path: String,
}

impl Default for PathCursor {
    fn default() -> Self {
        Self::root()
    }
}

impl PathCursor {
    /// The share root, `\`.
    pub fn root() -> Self {
        Self {
            path: SEPARATOR.to_string(),
        }
    }

    /// Normalize an arbitrary path string.
    ///
    /// `.` segments are dropped and `..` segments step up, never above the
    /// root.
    pub fn parse(input: &str) -> Self {
        Self::root().enter(input)
    }

    /// Whether this is the share root.
    pub fn is_root(&self) -> bool {
        self.path.len() == 1
    }

    /// The normalized path, e.g. `\docs\2024`.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Last segment, or `None` at the root.
    pub fn name(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        self.path.rsplit(SEPARATOR).next()
    }

    /// Parent directory. The root is its own parent.
    pub fn up(&self) -> Self {
        match self.path.rfind(SEPARATOR) {
            Some(0) | None => Self::root(),
            Some(idx) => Self {
                path: self.path[..idx].to_string(),
            },
        }
    }

    /// Descend into `child`, which may itself contain separators.
    pub fn enter(&self, child: &str) -> Self {
        let mut next = self.clone();
        for segment in segments(child) {
            match segment {
                "." => {}
                ".." => next = next.up(),
                name => {
                    if !next.is_root() {
                        next.path.push(SEPARATOR);
                    }
                    next.path.push_str(name);
                }
            }
        }
        next
    }

    /// Remote path of `name` inside this directory.
    pub fn join(&self, name: &str) -> String {
        self.enter(name).path
    }

    /// Directory form with a trailing separator: `\` or `\a\b\`.
    pub fn dir_prefix(&self) -> String {
        if self.is_root() {
            self.path.clone()
        } else {
            format!("{}{}", self.path, SEPARATOR)
        }
    }

    /// Search pattern matching every entry of this directory.
    ///
    /// The root gives `*`; anything else gives `\a\b\*`.
    pub fn search_pattern(&self) -> String {
        if self.is_root() {
            "*".to_string()
        } else {
            format!("{}*", self.dir_prefix())
        }
    }
}

impl fmt::Display for PathCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root() {
        let root = PathCursor::root();
        assert!(root.is_root());
        assert_eq!(root.as_str(), "\\");
        assert_eq!(root.name(), None);
        assert_eq!(PathCursor::default(), root);
    }

    #[test]
    fn test_up_of_root_is_root() {
        assert_eq!(PathCursor::root().up(), PathCursor::root());
    }

    #[test]
    fn test_up_after_enter_returns_to_start() {
        for start in ["\\", "\\a", "\\a\\b c"] {
            let p = PathCursor::parse(start);
            assert_eq!(p.enter("X").up(), p);
        }
    }

    #[test]
    fn test_parse_normalizes_separators() {
        assert_eq!(PathCursor::parse("docs/2024").as_str(), "\\docs\\2024");
        assert_eq!(PathCursor::parse("\\\\docs\\\\\\2024\\").as_str(), "\\docs\\2024");
        assert_eq!(PathCursor::parse("/").as_str(), "\\");
        assert_eq!(PathCursor::parse("").as_str(), "\\");
    }

    #[test]
    fn test_enter_dot_segments() {
        let p = PathCursor::parse("\\a\\b");
        assert_eq!(p.enter(".."), p.up());
        assert_eq!(p.enter("."), p);
        assert_eq!(p.enter(""), p);
        assert_eq!(p.enter("..\\..\\..\\c").as_str(), "\\c");
    }

    #[test]
    fn test_enter_nested_child() {
        let p = PathCursor::root().enter("a/b").enter("c");
        assert_eq!(p.as_str(), "\\a\\b\\c");
        assert_eq!(p.name(), Some("c"));
    }

    #[test]
    fn test_listing_forms() {
        let root = PathCursor::root();
        assert_eq!(root.search_pattern(), "*");
        assert_eq!(root.dir_prefix(), "\\");

        let p = PathCursor::parse("a\\b");
        assert_eq!(p.search_pattern(), "\\a\\b\\*");
        assert_eq!(p.dir_prefix(), "\\a\\b\\");
    }

    #[test]
    fn test_join() {
        assert_eq!(PathCursor::root().join("file.txt"), "\\file.txt");
        assert_eq!(PathCursor::parse("docs").join("file.txt"), "\\docs\\file.txt");
    }
}
