use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit type reported in def specs for every indexed unit.
pub const UNIT_TYPE: &str = "JavaArtifact";

/// Zero-based line and character column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

impl LineCol {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for LineCol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Source range; `file` is relative to the workspace root and `/`-separated.
/// Both ends are inclusive when testing containment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub file: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Range {
    pub fn new(
        file: impl Into<String>,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            file: file.into(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    pub fn start(&self) -> LineCol {
        LineCol::new(self.start_line, self.start_column)
    }

    pub fn end(&self) -> LineCol {
        LineCol::new(self.end_line, self.end_column)
    }

    pub fn contains(&self, at: LineCol) -> bool {
        self.start() <= at && at <= self.end()
    }

    /// True when `self` is strictly nested inside `other`: it starts no
    /// earlier, ends no later, and differs in at least one end. Ranges that
    /// merely overlap, or are identical, never qualify.
    pub fn is_nested_in(&self, other: &Range) -> bool {
        let (start, end) = (self.start(), self.end());
        let (other_start, other_end) = (other.start(), other.end());
        start >= other_start && end <= other_end && (start > other_start || end < other_end)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}-{}", self.file, self.start(), self.end())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Def,
    Ref,
}

/// Where an externally supplied symbol comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalOrigin {
    pub repo: String,
    pub unit: String,
}

impl ExternalOrigin {
    pub fn new(repo: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            unit: unit.into(),
        }
    }
}

/// One record of the index: a declaration or a usage of a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolFact {
    pub kind: FactKind,
    pub key: String,
    pub range: Range,
    pub name: String,
    pub element_kind: String,
    pub exported: bool,
    pub doc: Option<String>,
    pub origin: Option<ExternalOrigin>,
    pub title: Option<String>,
}

impl SymbolFact {
    pub fn definition(
        key: impl Into<String>,
        range: Range,
        name: impl Into<String>,
        element_kind: impl Into<String>,
    ) -> Self {
        Self {
            kind: FactKind::Def,
            key: key.into(),
            range,
            name: name.into(),
            element_kind: element_kind.into(),
            exported: true,
            doc: None,
            origin: None,
            title: None,
        }
    }

    pub fn reference(key: impl Into<String>, range: Range) -> Self {
        let key = key.into();
        let name = simple_name(&key).to_string();
        Self {
            kind: FactKind::Ref,
            key,
            range,
            name,
            element_kind: String::new(),
            exported: false,
            doc: None,
            origin: None,
            title: None,
        }
    }

    pub fn with_exported(mut self, exported: bool) -> Self {
        self.exported = exported;
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_origin(mut self, origin: ExternalOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn is_def(&self) -> bool {
        self.kind == FactKind::Def
    }

    pub fn is_ref(&self) -> bool {
        self.kind == FactKind::Ref
    }

    pub fn is_external(&self) -> bool {
        self.origin.is_some()
    }
}

/// Last segment of a dot-joined key.
pub fn simple_name(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or(key)
}

/// A repository at a given revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectRef {
    pub repo: String,
    pub revision: String,
}

impl ProjectRef {
    pub fn new(repo: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            revision: revision.into(),
        }
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repo, self.revision)
    }
}

/// Cursor position inside a file of a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub project: ProjectRef,
    pub file: String,
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub fn new(project: ProjectRef, file: impl Into<String>, line: u32, character: u32) -> Self {
        Self {
            project,
            file: file.into(),
            line,
            character,
        }
    }

    pub fn at(&self) -> LineCol {
        LineCol::new(self.line, self.character)
    }
}

/// Location-independent symbol specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DefSpec {
    pub repo: String,
    #[serde(default)]
    pub revision: String,
    pub unit_type: String,
    pub unit: String,
    pub path: String,
}

impl DefSpec {
    pub fn new(project: &ProjectRef, unit: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repo: project.repo.clone(),
            revision: project.revision.clone(),
            unit_type: UNIT_TYPE.to_string(),
            unit: unit.into(),
            path: path.into(),
        }
    }
}
