//! Read-only syntax tree consumed by the analysis passes.
//!
//! Front-ends lower their native parse trees into a [`SyntaxTree`] arena via
//! [`TreeBuilder`]. Every node carries a closed [`NodeKind`], explicit parent
//! and children links and a [`SourceSpan`]. Passes switch on the kind and walk
//! the links directly; there is no visitor hierarchy.

use crate::error::{AnalysisError, AnalysisResult};
use serde::Serialize;

pub mod java;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    CompilationUnit,
    Package,
    /// `name` is the imported path (with a trailing `.*` for on-demand
    /// imports), `detail` is `"static"` for static imports.
    Import,
    Class,
    Interface,
    Enum,
    EnumConstant,
    Record,
    AnnotationType,
    /// Body of an anonymous class; `detail` holds the instantiated type.
    AnonymousClass,
    /// `detail` holds the declared type.
    Field,
    VariableDeclarator,
    /// `detail` holds the declared type.
    Parameter,
    /// `detail` holds the declared type.
    LocalVariable,
    Method,
    Constructor,
    /// Inline callable (lambda).
    Lambda,
    /// `name` is the callee method name, `detail` the receiver expression text.
    Call,
    Arguments,
    StringLiteral,
    NullLiteral,
    Literal,
    Identifier,
    QualifiedName,
    /// `name` is the annotation name as written (simple or qualified).
    Annotation,
    /// `name = value` pair inside an annotation; `name` is the attribute key.
    AnnotationArgument,
    ArrayInitializer,
    /// `detail` holds the operator.
    BinaryExpression,
    /// `detail` holds the keyword modifiers, space separated.
    Modifiers,
    Block,
    Comment,
    Error,
    Other,
}

impl NodeKind {
    pub fn is_type_declaration(self) -> bool {
        matches!(
            self,
            NodeKind::Class
                | NodeKind::Interface
                | NodeKind::Enum
                | NodeKind::Record
                | NodeKind::AnnotationType
                | NodeKind::AnonymousClass
        )
    }

    pub fn is_named_callable(self) -> bool {
        matches!(self, NodeKind::Method | NodeKind::Constructor)
    }

    pub fn is_callable(self) -> bool {
        self.is_named_callable() || self == NodeKind::Lambda
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceSpan {
    pub start_line: i64,
    pub start_col: i64,
    pub end_line: i64,
    pub end_col: i64,
    pub start_byte: i64,
    pub end_byte: i64,
}

impl SourceSpan {
    pub fn contains_byte(&self, offset: i64) -> bool {
        self.start_byte <= offset && offset < self.end_byte
    }

    pub fn len(&self) -> i64 {
        self.end_byte - self.start_byte
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }
}

#[derive(Debug, Clone)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub span: SourceSpan,
    pub name: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralValue {
    String(String),
    Null,
    Other(String),
}

/// Immutable snapshot of one parsed source file.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    path: String,
    source: String,
    nodes: Vec<SyntaxNode>,
}

impl SyntaxTree {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> AnalysisResult<&SyntaxNode> {
        self.nodes.get(id.index()).ok_or_else(|| {
            AnalysisError::invalid_in(&self.path, format!("node {} is not part of this tree", id.0))
        })
    }

    pub fn kind(&self, id: NodeId) -> AnalysisResult<NodeKind> {
        Ok(self.node(id)?.kind)
    }

    pub fn parent(&self, id: NodeId) -> AnalysisResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: NodeId) -> AnalysisResult<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    pub fn span(&self, id: NodeId) -> AnalysisResult<SourceSpan> {
        Ok(self.node(id)?.span)
    }

    pub fn name(&self, id: NodeId) -> AnalysisResult<Option<&str>> {
        Ok(self.node(id)?.name.as_deref())
    }

    pub fn detail(&self, id: NodeId) -> AnalysisResult<Option<&str>> {
        Ok(self.node(id)?.detail.as_deref())
    }

    /// Source text covered by the node, trimmed.
    pub fn text(&self, id: NodeId) -> AnalysisResult<&str> {
        let span = self.span(id)?;
        Ok(self
            .source
            .get(span.start_byte as usize..span.end_byte as usize)
            .unwrap_or("")
            .trim())
    }

    /// Ids of all nodes of `kind`, in insertion order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, node)| node.kind == kind)
            .map(|(idx, _)| NodeId(idx as u32))
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> AnalysisResult<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut current = self.node(id)?.parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.node(parent)?.parent;
        }
        Ok(out)
    }

    /// Preorder descendants of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> AnalysisResult<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id)?.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next)?.iter().rev().copied());
        }
        Ok(out)
    }

    pub fn first_child_of_kind(&self, id: NodeId, kind: NodeKind) -> AnalysisResult<Option<NodeId>> {
        for child in self.children(id)? {
            if self.kind(*child)? == kind {
                return Ok(Some(*child));
            }
        }
        Ok(None)
    }

    /// First parse-error node, if the front-end reported any.
    pub fn first_error(&self) -> Option<(NodeId, SourceSpan)> {
        self.nodes
            .iter()
            .enumerate()
            .find(|(_, node)| node.kind == NodeKind::Error)
            .map(|(idx, node)| (NodeId(idx as u32), node.span))
    }

    /// Annotations attached to a declaration through its modifiers.
    pub fn annotations_of(&self, decl: NodeId) -> AnalysisResult<Vec<NodeId>> {
        let mut out = Vec::new();
        for child in self.children(decl)? {
            match self.kind(*child)? {
                NodeKind::Modifiers => {
                    for inner in self.children(*child)? {
                        if self.kind(*inner)? == NodeKind::Annotation {
                            out.push(*inner);
                        }
                    }
                }
                NodeKind::Annotation => out.push(*child),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Keyword modifiers of a declaration (`public static final` ...).
    pub fn modifier_keywords(&self, decl: NodeId) -> AnalysisResult<Vec<&str>> {
        let Some(modifiers) = self.first_child_of_kind(decl, NodeKind::Modifiers)? else {
            return Ok(Vec::new());
        };
        Ok(self
            .detail(modifiers)?
            .map(|raw| raw.split_whitespace().collect())
            .unwrap_or_default())
    }

    /// Argument expressions of a call or annotation, comments excluded.
    pub fn arguments_of(&self, node: NodeId) -> AnalysisResult<Option<Vec<NodeId>>> {
        let Some(list) = self.first_child_of_kind(node, NodeKind::Arguments)? else {
            return Ok(None);
        };
        let mut out = Vec::new();
        for child in self.children(list)? {
            if self.kind(*child)? != NodeKind::Comment {
                out.push(*child);
            }
        }
        Ok(Some(out))
    }

    pub fn literal_value(&self, id: NodeId) -> AnalysisResult<Option<LiteralValue>> {
        let value = match self.kind(id)? {
            NodeKind::StringLiteral => {
                let raw = self.text(id)?;
                match unquote_string_literal(raw) {
                    Some(value) => LiteralValue::String(value),
                    None => {
                        let span = self.span(id)?;
                        return Err(AnalysisError::invalid_at(
                            &self.path,
                            span,
                            format!("malformed string literal {raw}"),
                        ));
                    }
                }
            }
            NodeKind::NullLiteral => LiteralValue::Null,
            NodeKind::Literal => LiteralValue::Other(self.text(id)?.to_string()),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

/// Incremental constructor for [`SyntaxTree`]. The first node pushed is the
/// root; every later node must name an existing parent.
pub struct TreeBuilder {
    path: String,
    source: String,
    nodes: Vec<SyntaxNode>,
}

impl TreeBuilder {
    pub fn new(path: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            nodes: Vec::new(),
        }
    }

    pub fn push(
        &mut self,
        parent: Option<NodeId>,
        kind: NodeKind,
        span: SourceSpan,
    ) -> AnalysisResult<NodeId> {
        if span.start_byte < 0
            || span.end_byte < span.start_byte
            || span.end_byte as usize > self.source.len()
        {
            return Err(AnalysisError::invalid_at(
                &self.path,
                span,
                format!("span {}..{} is outside the source", span.start_byte, span.end_byte),
            ));
        }
        let id = NodeId(self.nodes.len() as u32);
        match (parent, self.nodes.is_empty()) {
            (None, true) => {}
            (None, false) => {
                return Err(AnalysisError::invalid_at(
                    &self.path,
                    span,
                    "a tree has exactly one root",
                ));
            }
            (Some(_), true) => {
                return Err(AnalysisError::invalid_at(
                    &self.path,
                    span,
                    "the first node must be the root",
                ));
            }
            (Some(parent), false) => {
                let Some(parent_node) = self.nodes.get_mut(parent.index()) else {
                    return Err(AnalysisError::invalid_at(
                        &self.path,
                        span,
                        format!("parent node {} does not exist", parent.0),
                    ));
                };
                parent_node.children.push(id);
            }
        }
        self.nodes.push(SyntaxNode {
            kind,
            parent,
            children: Vec::new(),
            span,
            name: None,
            detail: None,
        });
        Ok(id)
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.name = Some(name.into());
        }
    }

    pub fn set_detail(&mut self, id: NodeId, detail: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id.index()) {
            node.detail = Some(detail.into());
        }
    }

    pub fn finish(self) -> AnalysisResult<SyntaxTree> {
        if self.nodes.is_empty() {
            return Err(AnalysisError::invalid_in(&self.path, "empty syntax tree"));
        }
        Ok(SyntaxTree {
            path: self.path,
            source: self.source,
            nodes: self.nodes,
        })
    }
}

/// Decodes a Java string literal or text block, quotes included.
pub fn unquote_string_literal(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("\"\"\"") {
        let body = rest.strip_suffix("\"\"\"")?;
        let body = body.strip_prefix('\n').or_else(|| body.strip_prefix("\r\n")).unwrap_or(body);
        return Some(unescape(&strip_text_block_indent(body)));
    }
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return Some(unescape(&trimmed[1..trimmed.len() - 1]));
    }
    None
}

fn strip_text_block_indent(body: &str) -> String {
    let lines: Vec<&str> = body.split('\n').collect();
    let indent = lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|line| line.get(indent..).unwrap_or("").trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('s') => out.push(' '),
            Some('0') => out.push('\0'),
            Some('u') => {
                while chars.peek() == Some(&'u') {
                    chars.next();
                }
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some('\n') => {}
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
