//! Syntactic Java analyzer built on tree-sitter.
//!
//! Pass 1 (inside [`SymbolAnalyzer::analyze`]) parses every compilation file
//! and records package, type and member declarations in a read-only
//! [`TypeTable`]. Pass 2 runs once per unit on the workers: it emits a `Def`
//! for every declaration name and a `Ref` for every identifier it can resolve
//! lexically, through the type table, or through the file's imports.
//!
//! Resolution is purely syntactic. Inherited members and receivers typed by a
//! variable are not followed; overloads share one key.

use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tree_sitter::{Node, Parser, Tree};
use walkdir::WalkDir;

use super::{AnalysisUnit, PendingUnit, SymbolAnalyzer, UnitStream};
use crate::error::{IndexError, IndexResult};
use crate::offsets::LineIndex;
use crate::paths;
use crate::project::ProjectConfig;
use crate::types::{ExternalOrigin, Range, SymbolFact};

// Node type constants from tree-sitter-java grammar
const NODE_PROGRAM: &str = "program";
const NODE_CLASS_DECLARATION: &str = "class_declaration";
const NODE_INTERFACE_DECLARATION: &str = "interface_declaration";
const NODE_ENUM_DECLARATION: &str = "enum_declaration";
const NODE_RECORD_DECLARATION: &str = "record_declaration";
const NODE_ANNOTATION_TYPE_DECLARATION: &str = "annotation_type_declaration";
const NODE_METHOD_DECLARATION: &str = "method_declaration";
const NODE_CONSTRUCTOR_DECLARATION: &str = "constructor_declaration";
const NODE_COMPACT_CONSTRUCTOR_DECLARATION: &str = "compact_constructor_declaration";
const NODE_ANNOTATION_ELEMENT_DECLARATION: &str = "annotation_type_element_declaration";
const NODE_FIELD_DECLARATION: &str = "field_declaration";
const NODE_CONSTANT_DECLARATION: &str = "constant_declaration";
const NODE_ENUM_CONSTANT: &str = "enum_constant";
const NODE_ENUM_BODY_DECLARATIONS: &str = "enum_body_declarations";
const NODE_PACKAGE_DECLARATION: &str = "package_declaration";
const NODE_IMPORT_DECLARATION: &str = "import_declaration";
const NODE_LOCAL_VARIABLE_DECLARATION: &str = "local_variable_declaration";
const NODE_FORMAL_PARAMETER: &str = "formal_parameter";
const NODE_SPREAD_PARAMETER: &str = "spread_parameter";
const NODE_VARIABLE_DECLARATOR: &str = "variable_declarator";
const NODE_METHOD_INVOCATION: &str = "method_invocation";
const NODE_FIELD_ACCESS: &str = "field_access";
const NODE_IDENTIFIER: &str = "identifier";
const NODE_TYPE_IDENTIFIER: &str = "type_identifier";
const NODE_SCOPED_TYPE_IDENTIFIER: &str = "scoped_type_identifier";
const NODE_SCOPED_IDENTIFIER: &str = "scoped_identifier";
const NODE_MODIFIERS: &str = "modifiers";
const NODE_BLOCK_COMMENT: &str = "block_comment";
const NODE_LINE_COMMENT: &str = "line_comment";

/// Nesting guard for pathological expression chains.
const MAX_DEPTH: usize = 512;

const OPENJDK_REPO_ROOT: &str = "hg.openjdk.java.net/jdk8/jdk8/";

/// Package prefixes shipped with the JDK, and the OpenJDK repository and
/// unit holding each.
const JDK_PACKAGES: &[(&str, &str, &str)] = &[
    ("java.", "jdk", "jdk"),
    ("javax.", "jdk", "jdk"),
    ("org.w3c.dom.", "jdk", "jdk"),
    ("org.xml.sax.", "jdk", "jdk"),
    ("org.ietf.jgss.", "jdk", "jdk"),
    ("com.sun.source.", "langtools", "tools"),
    ("com.sun.tools.", "langtools", "tools"),
    ("jdk.nashorn.", "nashorn", "nashorn"),
];

/// Types of `java.lang`, visible in every compilation unit without an import.
const JAVA_LANG_TYPES: &[&str] = &[
    "AbstractMethodError",
    "Appendable",
    "ArithmeticException",
    "ArrayIndexOutOfBoundsException",
    "AssertionError",
    "AutoCloseable",
    "Boolean",
    "Byte",
    "CharSequence",
    "Character",
    "Class",
    "ClassCastException",
    "ClassLoader",
    "ClassNotFoundException",
    "CloneNotSupportedException",
    "Cloneable",
    "Comparable",
    "Deprecated",
    "Double",
    "Enum",
    "Error",
    "Exception",
    "Float",
    "FunctionalInterface",
    "IllegalArgumentException",
    "IllegalStateException",
    "IndexOutOfBoundsException",
    "Integer",
    "InterruptedException",
    "Iterable",
    "Long",
    "Math",
    "NullPointerException",
    "Number",
    "NumberFormatException",
    "Object",
    "OutOfMemoryError",
    "Override",
    "Process",
    "ProcessBuilder",
    "Record",
    "ReflectiveOperationException",
    "Runnable",
    "Runtime",
    "RuntimeException",
    "SafeVarargs",
    "SecurityException",
    "Short",
    "StackOverflowError",
    "StrictMath",
    "String",
    "StringBuffer",
    "StringBuilder",
    "SuppressWarnings",
    "System",
    "Thread",
    "ThreadLocal",
    "Throwable",
    "UnsupportedOperationException",
    "Void",
];

fn jdk_origin(qualified: &str) -> Option<ExternalOrigin> {
    JDK_PACKAGES
        .iter()
        .find(|(prefix, _, _)| qualified.starts_with(prefix))
        .map(|(_, repo, unit)| ExternalOrigin::new(format!("{OPENJDK_REPO_ROOT}{repo}"), *unit))
}

fn is_type_declaration(kind: &str) -> bool {
    matches!(
        kind,
        NODE_CLASS_DECLARATION
            | NODE_INTERFACE_DECLARATION
            | NODE_ENUM_DECLARATION
            | NODE_RECORD_DECLARATION
            | NODE_ANNOTATION_TYPE_DECLARATION
    )
}

fn is_method_declaration(kind: &str) -> bool {
    matches!(
        kind,
        NODE_METHOD_DECLARATION
            | NODE_CONSTRUCTOR_DECLARATION
            | NODE_COMPACT_CONSTRUCTOR_DECLARATION
            | NODE_ANNOTATION_ELEMENT_DECLARATION
    )
}

/// (element kind, title keyword) of a type declaration.
fn type_kind(kind: &str) -> (&'static str, &'static str) {
    match kind {
        NODE_INTERFACE_DECLARATION => ("interface", "interface"),
        NODE_ENUM_DECLARATION => ("enum", "enum"),
        NODE_RECORD_DECLARATION => ("record", "record"),
        NODE_ANNOTATION_TYPE_DECLARATION => ("annotation", "@interface"),
        _ => ("class", "class"),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

fn parse(code: &str, file: &Path) -> IndexResult<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::LANGUAGE.into())
        .map_err(|e| IndexError::Analysis {
            unit: file.display().to_string(),
            reason: format!("Failed to initialize Java parser: {e}"),
        })?;
    parser.parse(code, None).ok_or_else(|| IndexError::Analysis {
        unit: file.display().to_string(),
        reason: "parser produced no tree".to_string(),
    })
}

fn read_source(file: &Path) -> IndexResult<String> {
    std::fs::read_to_string(file).map_err(|source| IndexError::FileRead {
        path: file.to_path_buf(),
        source,
    })
}

/// Package name in dot notation, e.g. "com.example.app".
fn package_name<'a>(root: Node<'_>, code: &'a str) -> Option<&'a str> {
    named_children(root)
        .into_iter()
        .find(|child| child.kind() == NODE_PACKAGE_DECLARATION)
        .and_then(|package| {
            named_children(package)
                .into_iter()
                .find(|c| matches!(c.kind(), NODE_SCOPED_IDENTIFIER | NODE_IDENTIFIER))
        })
        .map(|name| code[name.byte_range()].trim())
}

/// Comment text without its delimiters or javadoc leading stars.
fn extract_comment_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    let body = if let Some(content) = trimmed
        .strip_prefix("/**")
        .and_then(|s| s.strip_suffix("*/"))
    {
        content
    } else if let Some(content) = trimmed
        .strip_prefix("/*")
        .and_then(|s| s.strip_suffix("*/"))
    {
        content
    } else if let Some(content) = trimmed.strip_prefix("//") {
        content
    } else {
        return None;
    };

    let lines: Vec<&str> = body
        .lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix('*').map(str::trim).unwrap_or(line)
        })
        .filter(|line| !line.is_empty())
        .collect();
    Some(lines.join("\n"))
}

/// Contiguous comments directly before `node`.
fn doc_comment_for(node: Node<'_>, code: &str) -> Option<String> {
    let mut comments = Vec::new();
    let mut current = node.prev_sibling();
    while let Some(sibling) = current {
        if !matches!(sibling.kind(), NODE_BLOCK_COMMENT | NODE_LINE_COMMENT) {
            break;
        }
        match extract_comment_text(&code[sibling.byte_range()]) {
            Some(text) if !text.is_empty() => comments.push(text),
            Some(_) => {}
            None => break,
        }
        current = sibling.prev_sibling();
    }
    if comments.is_empty() {
        return None;
    }
    comments.reverse();
    Some(comments.join("\n"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Value,
    Method,
    Type,
}

/// Members declared directly in a class, interface, enum or annotation body:
/// (namespace, name node, declaration node).
fn body_members(body: Node<'_>) -> Vec<(Namespace, Node<'_>, Node<'_>)> {
    let mut members = Vec::new();
    for child in named_children(body) {
        let kind = child.kind();
        if kind == NODE_ENUM_BODY_DECLARATIONS {
            members.extend(body_members(child));
        } else if kind == NODE_FIELD_DECLARATION || kind == NODE_CONSTANT_DECLARATION {
            for declarator in field_children(child, "declarator") {
                if let Some(name) = declarator.child_by_field_name("name") {
                    members.push((Namespace::Value, name, child));
                }
            }
        } else if kind == NODE_METHOD_DECLARATION || kind == NODE_ANNOTATION_ELEMENT_DECLARATION {
            if let Some(name) = child.child_by_field_name("name") {
                members.push((Namespace::Method, name, child));
            }
        } else if kind == NODE_ENUM_CONSTANT {
            if let Some(name) = child.child_by_field_name("name") {
                members.push((Namespace::Value, name, child));
            }
        } else if is_type_declaration(kind) {
            if let Some(name) = child.child_by_field_name("name") {
                members.push((Namespace::Type, name, child));
            }
        }
    }
    members
}

/// Record components, declared as fields of the record.
fn record_components(declaration: Node<'_>) -> Vec<Node<'_>> {
    declaration
        .child_by_field_name("parameters")
        .map(|params| {
            named_children(params)
                .into_iter()
                .filter(|p| p.kind() == NODE_FORMAL_PARAMETER)
                .collect()
        })
        .unwrap_or_default()
}

/// Declarations visible across the whole project.
#[derive(Debug, Default)]
struct TypeTable {
    types: HashSet<String>,
    members: HashSet<String>,
}

impl TypeTable {
    fn is_type(&self, key: &str) -> bool {
        self.types.contains(key)
    }

    fn is_known(&self, key: &str) -> bool {
        self.types.contains(key) || self.members.contains(key)
    }

    fn merge(&mut self, other: TypeTable) {
        self.types.extend(other.types);
        self.members.extend(other.members);
    }

    fn collect(root: Node<'_>, code: &str) -> Self {
        let mut table = TypeTable::default();
        let package = package_name(root, code).unwrap_or_default();
        for child in named_children(root) {
            if is_type_declaration(child.kind()) {
                table.collect_type(child, code, package);
            }
        }
        table
    }

    fn collect_type(&mut self, declaration: Node<'_>, code: &str, prefix: &str) {
        let Some(name) = declaration.child_by_field_name("name") else {
            return;
        };
        let key = join(prefix, &code[name.byte_range()]);
        for component in record_components(declaration) {
            if let Some(name) = component.child_by_field_name("name") {
                self.members.insert(join(&key, &code[name.byte_range()]));
            }
        }
        if let Some(body) = declaration.child_by_field_name("body") {
            for (namespace, name, member) in body_members(body) {
                let member_key = join(&key, &code[name.byte_range()]);
                if namespace == Namespace::Type {
                    self.collect_type(member, code, &key);
                } else {
                    self.members.insert(member_key);
                }
            }
        }
        self.types.insert(key);
    }
}

/// Outcome of resolving a name.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolved {
    Local(String),
    External(String, ExternalOrigin),
}

#[derive(Debug, Default)]
struct Scope {
    values: HashMap<String, String>,
    methods: HashMap<String, String>,
    types: HashMap<String, String>,
}

impl Scope {
    fn names(&mut self, namespace: Namespace) -> &mut HashMap<String, String> {
        match namespace {
            Namespace::Value => &mut self.values,
            Namespace::Method => &mut self.methods,
            Namespace::Type => &mut self.types,
        }
    }
}

/// Shared, read-only state of one analysis run.
#[derive(Debug)]
struct ProjectContext {
    workspace_root: PathBuf,
    config: ProjectConfig,
    table: TypeTable,
}

impl ProjectContext {
    fn unit_id(&self, file: &Path) -> String {
        paths::relative_to(file, &self.workspace_root).unwrap_or_else(|| file.display().to_string())
    }

    fn analyze_file(&self, file: &Path) -> IndexResult<AnalysisUnit> {
        let code = read_source(file)?;
        let tree = parse(&code, file)?;
        let root = tree.root_node();

        let mut walker = UnitWalker {
            code: &code,
            lines: LineIndex::new(&code),
            file: self.unit_id(file),
            context: self,
            package: package_name(root, &code).unwrap_or_default().to_string(),
            imports: HashMap::new(),
            static_imports: HashMap::new(),
            wildcards: Vec::new(),
            scopes: vec![Scope::default()],
            prefixes: Vec::new(),
            classes: Vec::new(),
            declared: HashSet::new(),
            depth: 0,
            unit: AnalysisUnit::new(self.unit_id(file)),
        };
        walker.walk_program(root);

        tracing::trace!(
            target: "analysis",
            "{}: {} defs, {} refs",
            walker.unit.unit_id,
            walker.unit.declarations.len(),
            walker.unit.references.len()
        );
        Ok(walker.unit)
    }
}

/// Per-unit pass 2 state.
struct UnitWalker<'a> {
    code: &'a str,
    lines: LineIndex,
    file: String,
    context: &'a ProjectContext,
    package: String,
    imports: HashMap<String, String>,
    static_imports: HashMap<String, String>,
    wildcards: Vec<String>,
    scopes: Vec<Scope>,
    prefixes: Vec<String>,
    classes: Vec<String>,
    declared: HashSet<String>,
    depth: usize,
    unit: AnalysisUnit,
}

impl<'a> UnitWalker<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        &self.code[node.byte_range()]
    }

    fn prefix(&self) -> String {
        self.prefixes
            .last()
            .cloned()
            .unwrap_or_else(|| self.package.clone())
    }

    fn range_of(&self, node: Node<'_>) -> Range {
        let start = self.lines.line_col(self.code, node.start_byte());
        let end = self.lines.line_col(self.code, node.end_byte());
        Range::new(self.file.clone(), start.line, start.column, end.line, end.column)
    }

    fn bind(&mut self, namespace: Namespace, name: &str, key: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.names(namespace).insert(name.to_string(), key.to_string());
        }
    }

    fn lookup(&self, namespace: Namespace, name: &str) -> Option<String> {
        self.scopes.iter().rev().find_map(|scope| {
            let names = match namespace {
                Namespace::Value => &scope.values,
                Namespace::Method => &scope.methods,
                Namespace::Type => &scope.types,
            };
            names.get(name).cloned()
        })
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    // ---------------------------------------------------------------------
    // Resolution
    // ---------------------------------------------------------------------

    /// Where `qualified` comes from: a configured dependency with a known
    /// repository, else the JDK. `None` when neither provides it.
    fn origin_for(&self, qualified: &str) -> Option<ExternalOrigin> {
        if let Some(dependency) = self.context.config.dependency_providing(qualified) {
            let repo = dependency.repo.clone()?;
            return Some(ExternalOrigin::new(repo, dependency.unit_id()));
        }
        jdk_origin(qualified)
    }

    fn imported(&self, qualified: &str) -> Option<Resolved> {
        if self.context.table.is_known(qualified) {
            return Some(Resolved::Local(qualified.to_string()));
        }
        let origin = self.origin_for(qualified)?;
        Some(Resolved::External(qualified.to_string(), origin))
    }

    fn resolve_type(&self, name: &str) -> Option<Resolved> {
        if let Some(key) = self.lookup(Namespace::Type, name) {
            return Some(Resolved::Local(key));
        }
        // single-type imports shadow types of the same package
        if let Some(qualified) = self.imports.get(name) {
            return self.imported(qualified);
        }
        let same_package = join(&self.package, name);
        if self.context.table.is_type(&same_package) {
            return Some(Resolved::Local(same_package));
        }
        if let Some(found) = self
            .wildcards
            .iter()
            .map(|package| join(package, name))
            .find(|candidate| self.context.table.is_type(candidate))
        {
            return Some(Resolved::Local(found));
        }
        if JAVA_LANG_TYPES.contains(&name) {
            return self.imported(&join("java.lang", name));
        }
        None
    }

    fn resolve_value(&self, name: &str) -> Option<Resolved> {
        if let Some(key) = self.lookup(Namespace::Value, name) {
            return Some(Resolved::Local(key));
        }
        self.static_imports.get(name).and_then(|q| self.imported(q))
    }

    fn resolve_method(&self, name: &str) -> Option<Resolved> {
        if let Some(key) = self.lookup(Namespace::Method, name) {
            return Some(Resolved::Local(key));
        }
        self.static_imports.get(name).and_then(|q| self.imported(q))
    }

    fn member_of(&self, owner: &Resolved, member: &str) -> Option<Resolved> {
        match owner {
            Resolved::Local(key) => {
                let candidate = join(key, member);
                self.context
                    .table
                    .is_known(&candidate)
                    .then_some(Resolved::Local(candidate))
            }
            Resolved::External(key, origin) => {
                Some(Resolved::External(join(key, member), origin.clone()))
            }
        }
    }

    // ---------------------------------------------------------------------
    // Emission
    // ---------------------------------------------------------------------

    fn emit_ref(&mut self, node: Node<'_>, resolved: &Resolved) {
        let range = self.range_of(node);
        let mut fact = match resolved {
            Resolved::Local(key) => SymbolFact::reference(key.clone(), range),
            Resolved::External(key, origin) => {
                SymbolFact::reference(key.clone(), range).with_origin(origin.clone())
            }
        };
        fact.name = self.text(node).to_string();
        self.unit.references.push(fact);
    }

    fn define(
        &mut self,
        declaration: Node<'_>,
        name: Node<'_>,
        key: &str,
        element_kind: &str,
        exported: bool,
        title: Option<String>,
    ) {
        let mut fact = SymbolFact::definition(key, self.range_of(name), self.text(name), element_kind)
            .with_exported(exported);
        if exported && let Some(doc) = doc_comment_for(declaration, self.code) {
            fact = fact.with_doc(doc);
        }
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            fact = fact.with_title(title);
        }
        self.declared.insert(key.to_string());
        self.unit.declarations.push(fact);
    }

    /// Key for a parameter or local; repeated names in one member get a
    /// `$n` suffix so each declaration stays addressable.
    fn local_key(&self, name: &str) -> String {
        let base = join(&self.prefix(), name);
        if !self.declared.contains(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{base}${n}"))
            .find(|candidate| !self.declared.contains(candidate))
            .unwrap_or(base)
    }

    fn define_local(&mut self, declaration: Node<'_>, name: Node<'_>, element_kind: &str, title: Option<String>) {
        let simple = self.text(name);
        let key = self.local_key(simple);
        self.define(declaration, name, &key, element_kind, false, title);
        self.bind(Namespace::Value, simple, &key);
    }

    // ---------------------------------------------------------------------
    // Walkers
    // ---------------------------------------------------------------------

    fn walk_program(&mut self, root: Node<'_>) {
        // Top-level types of this file are visible before their declaration
        for child in named_children(root) {
            if is_type_declaration(child.kind())
                && let Some(name) = child.child_by_field_name("name")
            {
                let simple = self.text(name);
                let key = join(&self.package, simple);
                self.bind(Namespace::Type, simple, &key);
            }
        }
        if root.kind() == NODE_PROGRAM {
            self.walk_children(root);
        }
    }

    fn walk(&mut self, node: Node<'_>) {
        if self.depth >= MAX_DEPTH {
            tracing::debug!(target: "analysis", "{}: nesting limit reached at {:?}", self.file, node.start_position());
            return;
        }
        self.depth += 1;
        self.dispatch(node);
        self.depth -= 1;
    }

    fn walk_children(&mut self, node: Node<'_>) {
        for child in named_children(node) {
            self.walk(child);
        }
    }

    fn walk_scoped(&mut self, node: Node<'_>) {
        self.push_scope();
        self.walk_children(node);
        self.pop_scope();
    }

    fn dispatch(&mut self, node: Node<'_>) {
        let kind = node.kind();
        match kind {
            NODE_PACKAGE_DECLARATION | NODE_LINE_COMMENT | NODE_BLOCK_COMMENT => {}
            NODE_IMPORT_DECLARATION => self.walk_import(node),
            k if is_type_declaration(k) => self.walk_type_declaration(node),
            k if is_method_declaration(k) => self.walk_method(node),
            NODE_FIELD_DECLARATION | NODE_CONSTANT_DECLARATION => self.walk_field(node),
            NODE_ENUM_CONSTANT => self.walk_enum_constant(node),
            NODE_LOCAL_VARIABLE_DECLARATION => self.walk_local_variable(node),
            "block" | "constructor_body" | "switch_block" | "switch_block_statement_group"
            | "for_statement" | "catch_clause" | "try_with_resources_statement" => {
                self.walk_scoped(node)
            }
            "enhanced_for_statement" => self.walk_enhanced_for(node),
            "catch_formal_parameter" => self.walk_catch_parameter(node),
            "resource" => self.walk_resource(node),
            "lambda_expression" => self.walk_lambda(node),
            "instanceof_expression" => self.walk_instanceof(node),
            NODE_METHOD_INVOCATION => self.walk_invocation(node),
            NODE_FIELD_ACCESS => {
                self.walk_field_access(node);
            }
            NODE_TYPE_IDENTIFIER | NODE_SCOPED_TYPE_IDENTIFIER => {
                self.type_ref(node);
            }
            NODE_IDENTIFIER => self.value_ref(node),
            _ => self.walk_children(node),
        }
    }

    fn walk_import(&mut self, node: Node<'_>) {
        let children = named_children(node);
        let mut cursor = node.walk();
        let is_static = node.children(&mut cursor).any(|c| c.kind() == "static");
        let Some(path) = children
            .iter()
            .copied()
            .find(|c| matches!(c.kind(), NODE_SCOPED_IDENTIFIER | NODE_IDENTIFIER))
        else {
            return;
        };
        let qualified = squash(self.text(path)).replace(' ', "");

        if children.iter().any(|c| c.kind() == "asterisk") {
            if !is_static {
                self.wildcards.push(qualified);
            }
            return;
        }

        let name = if path.kind() == NODE_SCOPED_IDENTIFIER {
            path.child_by_field_name("name").unwrap_or(path)
        } else {
            path
        };
        let simple = self.text(name).to_string();
        if let Some(resolved) = self.imported(&qualified) {
            self.emit_ref(name, &resolved);
        }

        if is_static {
            self.static_imports.insert(simple, qualified);
        } else {
            self.imports.insert(simple, qualified);
        }
    }

    fn walk_type_declaration(&mut self, node: Node<'_>) {
        let Some(name) = node.child_by_field_name("name") else {
            return self.walk_children(node);
        };
        let simple = self.text(name);
        let key = join(&self.prefix(), simple);
        let (element_kind, keyword) = type_kind(node.kind());
        self.define(node, name, &key, element_kind, true, Some(format!("{keyword} {key}")));
        self.bind(Namespace::Type, simple, &key);

        let body = node.child_by_field_name("body");
        let parameters = node.child_by_field_name("parameters");
        for child in named_children(node) {
            if child == name || Some(child) == body || Some(child) == parameters {
                continue;
            }
            self.walk(child);
        }

        self.prefixes.push(key.clone());
        self.classes.push(key.clone());
        self.push_scope();

        for component in record_components(node) {
            let Some(component_name) = component.child_by_field_name("name") else {
                continue;
            };
            let type_text = component
                .child_by_field_name("type")
                .map(|t| squash(self.text(t)));
            if let Some(type_node) = component.child_by_field_name("type") {
                self.walk(type_node);
            }
            let component_key = join(&key, self.text(component_name));
            self.define(component, component_name, &component_key, "field", true, type_text);
            self.bind(Namespace::Value, self.text(component_name), &component_key);
        }

        if let Some(body) = body {
            for (namespace, member_name, _) in body_members(body) {
                let simple = self.text(member_name);
                let member_key = join(&key, simple);
                self.bind(namespace, simple, &member_key);
            }
            self.walk_children(body);
        }

        self.pop_scope();
        self.classes.pop();
        self.prefixes.pop();
    }

    fn parameter_type(&self, parameter: Node<'_>) -> Option<String> {
        match parameter.kind() {
            NODE_FORMAL_PARAMETER => parameter
                .child_by_field_name("type")
                .map(|t| squash(self.text(t))),
            NODE_SPREAD_PARAMETER => named_children(parameter)
                .into_iter()
                .find(|c| !matches!(c.kind(), NODE_MODIFIERS | NODE_VARIABLE_DECLARATOR))
                .map(|t| format!("{}...", squash(self.text(t)))),
            _ => None,
        }
    }

    fn parameter_name<'t>(&self, parameter: Node<'t>) -> Option<Node<'t>> {
        match parameter.kind() {
            NODE_FORMAL_PARAMETER => parameter.child_by_field_name("name"),
            NODE_SPREAD_PARAMETER => named_children(parameter)
                .into_iter()
                .find(|c| c.kind() == NODE_VARIABLE_DECLARATOR)
                .and_then(|d| d.child_by_field_name("name")),
            _ => None,
        }
    }

    fn walk_parameters(&mut self, parameters: Node<'_>) {
        for parameter in named_children(parameters) {
            let Some(name) = self.parameter_name(parameter) else {
                continue;
            };
            for child in named_children(parameter) {
                if child != name && child.kind() != NODE_VARIABLE_DECLARATOR {
                    self.walk(child);
                }
            }
            let title = self.parameter_type(parameter);
            self.define_local(parameter, name, "parameter", title);
        }
    }

    fn walk_method(&mut self, node: Node<'_>) {
        let Some(name) = node.child_by_field_name("name") else {
            return self.walk_children(node);
        };
        let simple = self.text(name);
        let key = join(&self.prefix(), simple);
        let parameters = node.child_by_field_name("parameters");

        let parameter_types: Vec<String> = parameters
            .map(|p| {
                named_children(p)
                    .into_iter()
                    .filter_map(|param| self.parameter_type(param))
                    .collect()
            })
            .unwrap_or_default();
        let signature = format!("{simple}({})", parameter_types.join(", "));
        let (element_kind, title) = match node.kind() {
            NODE_CONSTRUCTOR_DECLARATION | NODE_COMPACT_CONSTRUCTOR_DECLARATION => {
                ("constructor", signature)
            }
            _ => {
                let return_type = node
                    .child_by_field_name("type")
                    .map(|t| squash(self.text(t)))
                    .unwrap_or_default();
                ("method", format!("{return_type} {signature}"))
            }
        };
        self.define(node, name, &key, element_kind, true, Some(title));
        if element_kind == "method" {
            self.bind(Namespace::Method, simple, &key);
        }

        let body = node.child_by_field_name("body");
        for child in named_children(node) {
            if child == name || Some(child) == body || Some(child) == parameters {
                continue;
            }
            self.walk(child);
        }

        self.prefixes.push(key);
        self.push_scope();
        if let Some(parameters) = parameters {
            self.walk_parameters(parameters);
        }
        if let Some(body) = body {
            self.walk(body);
        }
        self.pop_scope();
        self.prefixes.pop();
    }

    fn walk_field(&mut self, node: Node<'_>) {
        let type_node = node.child_by_field_name("type");
        let type_text = type_node.map(|t| squash(self.text(t)));
        for child in named_children(node) {
            if child.kind() != NODE_VARIABLE_DECLARATOR {
                self.walk(child);
            }
        }
        let prefix = self.prefix();
        for declarator in field_children(node, "declarator") {
            let Some(name) = declarator.child_by_field_name("name") else {
                continue;
            };
            let simple = self.text(name);
            let key = join(&prefix, simple);
            self.define(node, name, &key, "field", true, type_text.clone());
            self.bind(Namespace::Value, simple, &key);
            if let Some(value) = declarator.child_by_field_name("value") {
                self.walk(value);
            }
        }
    }

    fn walk_enum_constant(&mut self, node: Node<'_>) {
        let Some(name) = node.child_by_field_name("name") else {
            return self.walk_children(node);
        };
        let owner = self.prefix();
        let key = join(&owner, self.text(name));
        self.define(node, name, &key, "enum_constant", true, Some(owner));
        for child in named_children(node) {
            if child != name {
                self.walk(child);
            }
        }
    }

    fn walk_local_variable(&mut self, node: Node<'_>) {
        let type_text = node
            .child_by_field_name("type")
            .map(|t| squash(self.text(t)));
        for child in named_children(node) {
            if child.kind() != NODE_VARIABLE_DECLARATOR {
                self.walk(child);
            }
        }
        for declarator in field_children(node, "declarator") {
            let Some(name) = declarator.child_by_field_name("name") else {
                continue;
            };
            self.define_local(node, name, "local", type_text.clone());
            if let Some(value) = declarator.child_by_field_name("value") {
                self.walk(value);
            }
        }
    }

    fn walk_enhanced_for(&mut self, node: Node<'_>) {
        self.push_scope();
        let name = node.child_by_field_name("name");
        let body = node.child_by_field_name("body");
        for child in named_children(node) {
            if Some(child) != name && Some(child) != body {
                self.walk(child);
            }
        }
        if let Some(name) = name {
            let title = node
                .child_by_field_name("type")
                .map(|t| squash(self.text(t)));
            self.define_local(node, name, "local", title);
        }
        if let Some(body) = body {
            self.walk(body);
        }
        self.pop_scope();
    }

    fn walk_catch_parameter(&mut self, node: Node<'_>) {
        let name = node.child_by_field_name("name");
        let mut title = None;
        for child in named_children(node) {
            if Some(child) == name {
                continue;
            }
            if child.kind() == "catch_type" {
                title = Some(squash(self.text(child)));
            }
            self.walk(child);
        }
        if let Some(name) = name {
            self.define_local(node, name, "local", title);
        }
    }

    fn walk_resource(&mut self, node: Node<'_>) {
        let Some(name) = node.child_by_field_name("name") else {
            return self.walk_children(node);
        };
        let type_node = node.child_by_field_name("type");
        if let Some(type_node) = type_node {
            self.walk(type_node);
        }
        let title = type_node.map(|t| squash(self.text(t)));
        self.define_local(node, name, "local", title);
        if let Some(value) = node.child_by_field_name("value") {
            self.walk(value);
        }
    }

    fn walk_lambda(&mut self, node: Node<'_>) {
        self.push_scope();
        if let Some(parameters) = node.child_by_field_name("parameters") {
            match parameters.kind() {
                NODE_IDENTIFIER => self.define_local(parameters, parameters, "parameter", None),
                "inferred_parameters" => {
                    for name in named_children(parameters) {
                        if name.kind() == NODE_IDENTIFIER {
                            self.define_local(name, name, "parameter", None);
                        }
                    }
                }
                _ => self.walk_parameters(parameters),
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.walk(body);
        }
        self.pop_scope();
    }

    fn walk_instanceof(&mut self, node: Node<'_>) {
        let name = node.child_by_field_name("name");
        for child in named_children(node) {
            if Some(child) != name {
                self.walk(child);
            }
        }
        if let Some(name) = name {
            let title = node
                .child_by_field_name("right")
                .map(|t| squash(self.text(t)));
            self.define_local(node, name, "local", title);
        }
    }

    fn walk_invocation(&mut self, node: Node<'_>) {
        let name = node.child_by_field_name("name");
        let object = node.child_by_field_name("object");

        if let Some(name) = name {
            let simple = self.text(name);
            let resolved = match object {
                None => self.resolve_method(simple),
                Some(object) => self
                    .walk_object(object)
                    .and_then(|owner| self.member_of(&owner, simple)),
            };
            if let Some(resolved) = resolved {
                self.emit_ref(name, &resolved);
            }
        }

        for child in named_children(node) {
            if Some(child) != name && Some(child) != object {
                self.walk(child);
            }
        }
    }

    /// Walk the receiver of a member access. Returns the type it names, if
    /// it names one.
    fn walk_object(&mut self, node: Node<'_>) -> Option<Resolved> {
        match node.kind() {
            NODE_IDENTIFIER => {
                let simple = self.text(node);
                if let Some(value) = self.resolve_value(simple) {
                    self.emit_ref(node, &value);
                    return None;
                }
                let resolved = self.resolve_type(simple)?;
                self.emit_ref(node, &resolved);
                Some(resolved)
            }
            "this" => self.classes.last().cloned().map(Resolved::Local),
            NODE_FIELD_ACCESS => self.walk_field_access(node),
            NODE_TYPE_IDENTIFIER | NODE_SCOPED_TYPE_IDENTIFIER => self.type_ref(node),
            _ => {
                self.walk(node);
                None
            }
        }
    }

    fn walk_field_access(&mut self, node: Node<'_>) -> Option<Resolved> {
        let object = node.child_by_field_name("object");
        let field = node.child_by_field_name("field");
        let owner = object.and_then(|o| self.walk_object(o));

        let field = field?;
        if field.kind() != NODE_IDENTIFIER {
            self.walk(field);
            return None;
        }
        let resolved = self.member_of(&owner?, self.text(field))?;
        self.emit_ref(field, &resolved);
        match &resolved {
            Resolved::Local(key) if self.context.table.is_type(key) => Some(resolved),
            _ => None,
        }
    }

    fn type_ref(&mut self, node: Node<'_>) -> Option<Resolved> {
        match node.kind() {
            NODE_TYPE_IDENTIFIER => {
                let resolved = self.resolve_type(self.text(node))?;
                self.emit_ref(node, &resolved);
                Some(resolved)
            }
            NODE_SCOPED_TYPE_IDENTIFIER => {
                let children = named_children(node);
                let name = children
                    .iter()
                    .rev()
                    .copied()
                    .find(|c| c.kind() == NODE_TYPE_IDENTIFIER)?;
                let qualified = squash(self.text(node)).replace(' ', "");
                if self.context.table.is_type(&qualified) {
                    let resolved = Resolved::Local(qualified);
                    self.emit_ref(name, &resolved);
                    return Some(resolved);
                }
                let scope = children.first().copied().filter(|c| *c != name)?;
                let owner = self.type_ref(scope)?;
                let resolved = self.member_of(&owner, self.text(name))?;
                self.emit_ref(name, &resolved);
                Some(resolved)
            }
            _ => {
                self.walk(node);
                None
            }
        }
    }

    fn value_ref(&mut self, node: Node<'_>) {
        let simple = self.text(node);
        if let Some(resolved) = self
            .resolve_value(simple)
            .or_else(|| self.resolve_type(simple))
        {
            self.emit_ref(node, &resolved);
        }
    }
}

/// Java analyzer over the source roots (or explicit file list) of a project.
#[derive(Debug, Clone)]
pub struct JavaAnalyzer {
    workspace_root: PathBuf,
}

impl JavaAnalyzer {
    /// Ranges are reported relative to `workspace_root`.
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: paths::normalize(workspace_root.as_ref()),
        }
    }

    /// Compilation files of `config`, in a stable order.
    pub fn compilation_files(&self, config: &ProjectConfig) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = if config.files.is_empty() {
            config
                .source_roots
                .iter()
                .map(|root| paths::resolve_against(root, &self.workspace_root))
                .flat_map(|root| {
                    WalkDir::new(root)
                        .sort_by_file_name()
                        .into_iter()
                        .filter_map(|entry| entry.ok())
                        .filter(|entry| entry.file_type().is_file())
                        .map(|entry| entry.into_path())
                        .filter(|path| path.extension().is_some_and(|ext| ext == "java"))
                })
                .collect()
        } else {
            config
                .files
                .iter()
                .map(|f| paths::resolve_against(f, &self.workspace_root))
                .collect()
        };
        let mut seen = HashSet::new();
        files.retain(|f| seen.insert(f.clone()));
        files
    }
}

impl SymbolAnalyzer for JavaAnalyzer {
    fn analyze(&self, config: &ProjectConfig) -> IndexResult<UnitStream> {
        let files = self.compilation_files(config);

        let tables = files
            .par_iter()
            .map(|file| {
                let code = read_source(file)?;
                let tree = parse(&code, file)?;
                Ok(TypeTable::collect(tree.root_node(), &code))
            })
            .collect::<IndexResult<Vec<_>>>()?;

        let mut table = TypeTable::default();
        for partial in tables {
            table.merge(partial);
        }

        tracing::debug!(
            target: "analysis",
            "{}: {} files, {} types, {} members",
            config.unit,
            files.len(),
            table.types.len(),
            table.members.len()
        );

        let context = Arc::new(ProjectContext {
            workspace_root: self.workspace_root.clone(),
            config: config.clone(),
            table,
        });
        let stream = files.into_iter().map(move |file| {
            let context = Arc::clone(&context);
            PendingUnit::new(context.unit_id(&file), move || context.analyze_file(&file))
        });
        Ok(Box::new(stream))
    }
}
