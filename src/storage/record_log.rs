//! Flat, append-only record log: the persisted index of one project.
//!
//! One JSON array per line:
//!
//! ```text
//! [kind, key, file, startLine, startCol, endLine, endCol, name, elementKind,
//!  exported, docText, originRepo, originUnit, title]
//! ```
//!
//! Writers build into a temp file next to the canonical path and rename it
//! into place once, so the canonical path only ever holds a complete log.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;

use super::{StorageError, StorageResult};
use crate::types::{ExternalOrigin, FactKind, Range, SymbolFact};

#[derive(Debug, Serialize, Deserialize)]
struct Row(
    FactKind,
    String,
    String,
    u32,
    u32,
    u32,
    u32,
    String,
    String,
    bool,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

impl From<&SymbolFact> for Row {
    fn from(fact: &SymbolFact) -> Self {
        let (origin_repo, origin_unit) = match &fact.origin {
            Some(origin) => (Some(origin.repo.clone()), Some(origin.unit.clone())),
            None => (None, None),
        };
        Row(
            fact.kind,
            fact.key.clone(),
            fact.range.file.clone(),
            fact.range.start_line,
            fact.range.start_column,
            fact.range.end_line,
            fact.range.end_column,
            fact.name.clone(),
            fact.element_kind.clone(),
            fact.exported,
            fact.doc.clone(),
            origin_repo,
            origin_unit,
            fact.title.clone(),
        )
    }
}

impl From<Row> for SymbolFact {
    fn from(row: Row) -> Self {
        let Row(
            kind,
            key,
            file,
            start_line,
            start_column,
            end_line,
            end_column,
            name,
            element_kind,
            exported,
            doc,
            origin_repo,
            origin_unit,
            title,
        ) = row;
        let origin = match (origin_repo, origin_unit) {
            (Some(repo), Some(unit)) if !repo.is_empty() => Some(ExternalOrigin { repo, unit }),
            _ => None,
        };
        SymbolFact {
            kind,
            key,
            range: Range::new(file, start_line, start_column, end_line, end_column),
            name,
            element_kind,
            exported,
            doc,
            origin,
            title,
        }
    }
}

/// Handle on the canonical log path of one project.
#[derive(Debug, Clone)]
pub struct RecordLog {
    path: PathBuf,
}

impl RecordLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A finished log exists. Temp files never satisfy this.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Start a new generation of this log in a temp file beside it.
    pub fn writer(&self) -> StorageResult<RecordWriter> {
        RecordWriter::create(&self.path)
    }

    /// Stream records accepted by `predicate`.
    pub fn scan<P>(&self, predicate: P) -> StorageResult<RecordScan<P>>
    where
        P: FnMut(&SymbolFact) -> bool,
    {
        let file = File::open(&self.path)?;
        Ok(RecordScan {
            path: self.path.clone(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            predicate,
        })
    }

    /// Remove the finished log, if any.
    pub fn remove(&self) -> StorageResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Thread-safe appender. Dropping it without [`RecordWriter::finish`]
/// discards everything written so far.
#[derive(Debug)]
pub struct RecordWriter {
    target: PathBuf,
    out: Mutex<BufWriter<NamedTempFile>>,
    appended: AtomicUsize,
}

impl RecordWriter {
    fn create(target: &Path) -> StorageResult<Self> {
        let dir = target
            .parent()
            .ok_or_else(|| StorageError::NoParentDirectory(target.to_path_buf()))?;
        let temp = tempfile::Builder::new()
            .prefix(".refindex-")
            .suffix(".tmp")
            .tempfile_in(dir)?;
        Ok(Self {
            target: target.to_path_buf(),
            out: Mutex::new(BufWriter::new(temp)),
            appended: AtomicUsize::new(0),
        })
    }

    pub fn append(&self, fact: &SymbolFact) -> StorageResult<()> {
        let line = encode(fact)?;
        let mut out = self.out.lock();
        out.write_all(line.as_bytes())?;
        drop(out);
        self.appended.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Append a batch under a single lock acquisition.
    pub fn append_all<'a>(&self, facts: impl IntoIterator<Item = &'a SymbolFact>) -> StorageResult<usize> {
        let mut buf = String::new();
        let mut count = 0;
        for fact in facts {
            buf.push_str(&encode(fact)?);
            count += 1;
        }
        if count == 0 {
            return Ok(0);
        }
        self.out.lock().write_all(buf.as_bytes())?;
        self.appended.fetch_add(count, Ordering::Relaxed);
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.appended.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush, sync and atomically rename the temp file onto the canonical path.
    pub fn finish(self) -> StorageResult<PathBuf> {
        let temp = self
            .out
            .into_inner()
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))?;
        temp.as_file().sync_all()?;
        temp.persist(&self.target).map_err(|e| StorageError::Persist {
            path: self.target.clone(),
            source: e.error,
        })?;
        Ok(self.target)
    }
}

fn encode(fact: &SymbolFact) -> StorageResult<String> {
    let mut line =
        serde_json::to_string(&Row::from(fact)).map_err(|e| StorageError::Serialization(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Lazy, filtered iteration over a finished log.
pub struct RecordScan<P> {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    predicate: P,
}

impl<P> Iterator for RecordScan<P>
where
    P: FnMut(&SymbolFact) -> bool,
{
    type Item = StorageResult<SymbolFact>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let row: Row = match serde_json::from_str(&line) {
                Ok(row) => row,
                Err(e) => {
                    return Some(Err(StorageError::MalformedRecord {
                        path: self.path.clone(),
                        line: self.line_no,
                        reason: e.to_string(),
                    }));
                }
            };
            let fact = SymbolFact::from(row);
            if (self.predicate)(&fact) {
                return Some(Ok(fact));
            }
        }
    }
}
