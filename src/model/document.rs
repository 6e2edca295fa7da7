//! In-memory document state owned by the document controller

use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of the open document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum DocumentPath {
    /// New document that has never been saved
    #[default]
    Untitled,
    File(PathBuf),
}

impl DocumentPath {
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::Untitled => None,
            Self::File(path) => Some(path),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untitled => write!(f, "<untitled>"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Canonical content plus the last-known-disk baseline.
///
/// `is_dirty` is always derived from the two texts, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    path: DocumentPath,
    content: String,
    saved_content: String,
    cursor_line: usize,
}

impl Document {
    pub fn untitled(template: &str) -> Self {
        Self {
            path: DocumentPath::Untitled,
            content: template.to_string(),
            saved_content: template.to_string(),
            cursor_line: 1,
        }
    }

    /// Document whose baseline is `disk_content` and whose canonical text is
    /// `content` (which differs when an unsaved shadow copy was applied)
    pub fn opened(path: PathBuf, disk_content: String, content: String) -> Self {
        Self {
            path: DocumentPath::File(path),
            content,
            saved_content: disk_content,
            cursor_line: 1,
        }
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn saved_content(&self) -> &str {
        &self.saved_content
    }

    pub fn is_dirty(&self) -> bool {
        self.content != self.saved_content
    }

    pub fn cursor_line(&self) -> usize {
        self.cursor_line
    }

    /// Number of lines, counting a trailing empty line after a final newline
    pub fn line_count(&self) -> usize {
        self.content.split('\n').count()
    }

    /// Replace the canonical content. Returns false if nothing changed.
    pub fn set_content(&mut self, text: String) -> bool {
        if self.content == text {
            return false;
        }
        self.content = text;
        true
    }

    /// Set the cursor line, clamped to `1..=line_count`
    pub fn set_cursor_line(&mut self, line: usize) -> usize {
        self.cursor_line = line.clamp(1, self.line_count());
        self.cursor_line
    }

    /// Record that `content` is now what is on disk at `path`
    pub fn mark_saved_as(&mut self, path: PathBuf) {
        self.path = DocumentPath::File(path);
        self.saved_content = self.content.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_is_derived() {
        let mut doc = Document::untitled("# Untitled\n");
        assert!(!doc.is_dirty());
        assert!(doc.set_content("# Changed\n".to_string()));
        assert!(doc.is_dirty());
        assert!(doc.set_content("# Untitled\n".to_string()));
        assert!(!doc.is_dirty());
        assert!(!doc.set_content("# Untitled\n".to_string()));
    }

    #[test]
    fn test_opened_with_shadow_is_dirty() {
        let doc = Document::opened(PathBuf::from("/a.md"), "Y".into(), "X".into());
        assert!(doc.is_dirty());
        assert_eq!(doc.content(), "X");
        assert_eq!(doc.saved_content(), "Y");
        assert_eq!(doc.path().file(), Some(Path::new("/a.md")));
    }

    #[test]
    fn test_mark_saved_as() {
        let mut doc = Document::untitled("");
        doc.set_content("text".into());
        doc.mark_saved_as(PathBuf::from("/b.md"));
        assert!(!doc.is_dirty());
        assert!(doc.path().is_file());
        assert_eq!(doc.path().to_string(), "/b.md");
    }

    #[test]
    fn test_cursor_line_clamped() {
        let mut doc = Document::untitled("a\nb\nc");
        assert_eq!(doc.set_cursor_line(0), 1);
        assert_eq!(doc.set_cursor_line(2), 2);
        assert_eq!(doc.set_cursor_line(40), 3);
    }
}
