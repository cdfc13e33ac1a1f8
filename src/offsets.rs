//! Conversion between (line, column) positions and byte offsets.
//!
//! Lines and columns are zero-based; columns count characters. Offsets are
//! byte offsets into the UTF-8 text. Out-of-range positions clamp to the end
//! of their line, or to the end of the file.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{IndexError, IndexResult};
use crate::types::LineCol;

/// Start offsets of every line of one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            line_starts,
            len: text.len(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Byte range of `line` without its terminator.
    fn line_span(&self, text: &str, line: usize) -> (usize, usize) {
        let start = self.line_starts[line];
        let mut end = self
            .line_starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        if end > start && text.as_bytes()[end - 1] == b'\r' {
            end -= 1;
        }
        (start, end)
    }

    /// Byte offset of `at` in `text`.
    pub fn offset(&self, text: &str, at: LineCol) -> usize {
        let line = at.line as usize;
        if line >= self.line_count() {
            return self.len;
        }
        let (start, end) = self.line_span(text, line);
        text[start..end]
            .char_indices()
            .nth(at.column as usize)
            .map(|(i, _)| start + i)
            .unwrap_or(end)
    }

    /// Position of byte `offset` in `text`. Offsets inside a multi-byte
    /// character resolve to that character.
    pub fn line_col(&self, text: &str, offset: usize) -> LineCol {
        let mut offset = offset.min(self.len);
        while !text.is_char_boundary(offset) {
            offset -= 1;
        }
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let (start, end) = self.line_span(text, line);
        let column = text[start..offset.min(end)].chars().count();
        LineCol::new(line as u32, column as u32)
    }
}

/// Files kept in memory at once; the whole set is dropped when exceeded.
const MAX_CACHED_SOURCES: usize = 256;

/// Identifies one version of a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: Option<SystemTime>,
    len: u64,
}

#[derive(Debug)]
struct SourceText {
    stamp: Stamp,
    text: String,
    lines: LineIndex,
    offsets: DashMap<(u32, u32), usize>,
}

/// File-backed position translator, memoized per (file, line, column).
///
/// A file whose modification time or size changed is read again.
#[derive(Debug, Default)]
pub struct OffsetTranslator {
    sources: DashMap<PathBuf, Arc<SourceText>>,
}

fn read_error(file: &Path, e: std::io::Error) -> IndexError {
    if e.kind() == std::io::ErrorKind::NotFound {
        IndexError::FileNotFound {
            path: file.to_path_buf(),
        }
    } else {
        IndexError::FileRead {
            path: file.to_path_buf(),
            source: e,
        }
    }
}

impl OffsetTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    fn source(&self, file: &Path) -> IndexResult<Arc<SourceText>> {
        let metadata = std::fs::metadata(file).map_err(|e| read_error(file, e))?;
        let stamp = Stamp {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        };
        if let Some(source) = self.sources.get(file)
            && source.stamp == stamp
        {
            return Ok(Arc::clone(source.value()));
        }

        let text = std::fs::read_to_string(file).map_err(|e| read_error(file, e))?;
        let lines = LineIndex::new(&text);
        let source = Arc::new(SourceText {
            stamp,
            text,
            lines,
            offsets: DashMap::new(),
        });
        if self.sources.len() >= MAX_CACHED_SOURCES {
            tracing::debug!(target: "query", "Dropping {} cached source texts", self.sources.len());
            self.sources.clear();
        }
        self.sources.insert(file.to_path_buf(), Arc::clone(&source));
        Ok(source)
    }

    /// Byte offset of `at` in `file`.
    pub fn offset(&self, file: &Path, at: LineCol) -> IndexResult<usize> {
        let source = self.source(file)?;
        let offset = *source
            .offsets
            .entry((at.line, at.column))
            .or_insert_with(|| source.lines.offset(&source.text, at));
        Ok(offset)
    }

    /// Position of byte `offset` in `file`.
    pub fn position(&self, file: &Path, offset: usize) -> IndexResult<LineCol> {
        let source = self.source(file)?;
        Ok(source.lines.line_col(&source.text, offset))
    }

    /// Clamp `at` onto a position that exists in `file`.
    pub fn clamp(&self, file: &Path, at: LineCol) -> IndexResult<LineCol> {
        let offset = self.offset(file, at)?;
        self.position(file, offset)
    }

    /// Forget everything memoized for `file`.
    pub fn invalidate(&self, file: &Path) {
        self.sources.remove(file);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn clear(&self) {
        self.sources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEXT: &str = "class Foo {\r\n  int größe;\n}\n";

    #[test]
    fn test_offset_counts_characters() {
        let index = LineIndex::new(TEXT);
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.offset(TEXT, LineCol::new(0, 6)), 6);
        assert_eq!(index.offset(TEXT, LineCol::new(1, 6)), 13 + 6);
        // 'ö' is two bytes, so 'ß' at column 9 starts at byte 10 of the line
        assert_eq!(index.offset(TEXT, LineCol::new(1, 9)), 13 + 10);
    }

    #[test]
    fn test_offset_clamps_to_line_end_and_eof() {
        let index = LineIndex::new(TEXT);
        // past the end of line 0 lands before "\r\n"
        assert_eq!(index.offset(TEXT, LineCol::new(0, 99)), 11);
        assert_eq!(index.offset(TEXT, LineCol::new(42, 0)), TEXT.len());
    }

    #[test]
    fn test_line_col_round_trips() {
        let index = LineIndex::new(TEXT);
        for at in [LineCol::new(0, 0), LineCol::new(1, 8), LineCol::new(2, 0)] {
            let offset = index.offset(TEXT, at);
            assert_eq!(index.line_col(TEXT, offset), at);
        }
        // inside the two-byte 'ö'
        assert_eq!(index.line_col(TEXT, 13 + 9), LineCol::new(1, 8));
    }

    #[test]
    fn test_translator_memoizes_and_clamps() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Foo.java");
        std::fs::write(&file, "a\nbcd\n").unwrap();

        let translator = OffsetTranslator::new();
        assert_eq!(translator.offset(&file, LineCol::new(1, 1)).unwrap(), 3);
        assert_eq!(translator.clamp(&file, LineCol::new(1, 50)).unwrap(), LineCol::new(1, 3));

        translator.invalidate(&file);
        assert!(translator.is_empty());
        assert_eq!(translator.offset(&file, LineCol::new(1, 1)).unwrap(), 3);
    }

    #[test]
    fn test_translator_rereads_changed_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("Foo.java");
        std::fs::write(&file, "a\nbcd\n").unwrap();

        let translator = OffsetTranslator::new();
        assert_eq!(translator.clamp(&file, LineCol::new(1, 50)).unwrap(), LineCol::new(1, 3));

        std::fs::write(&file, "a\nbcdefgh\n").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();
        assert_eq!(translator.clamp(&file, LineCol::new(1, 50)).unwrap(), LineCol::new(1, 7));
        assert_eq!(translator.len(), 1);
    }

    #[test]
    fn test_missing_file() {
        let translator = OffsetTranslator::new();
        let err = translator
            .offset(Path::new("/definitely/not/here.java"), LineCol::new(0, 0))
            .unwrap_err();
        assert!(matches!(err, IndexError::FileNotFound { .. }));
    }
}
