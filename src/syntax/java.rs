use super::{NodeId, NodeKind, SourceSpan, SyntaxTree, TreeBuilder};
use crate::error::{AnalysisError, AnalysisResult};
use anyhow::Result;
use tree_sitter::{Node, Parser};

/// Fields whose subtrees only carry type information.
const SKIPPED_FIELDS: &[&str] = &[
    "name",
    "key",
    "type",
    "type_parameters",
    "type_arguments",
    "superclass",
    "interfaces",
    "permits",
    "dimensions",
];

pub struct JavaFrontend {
    parser: Parser,
}

impl JavaFrontend {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_java::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }

    pub fn parse(&mut self, path: &str, source: &str) -> AnalysisResult<SyntaxTree> {
        let Some(tree) = self.parser.parse(source, None) else {
            return Err(AnalysisError::invalid_in(path, "parser produced no tree"));
        };
        let mut builder = TreeBuilder::new(path, source);
        lower(tree.root_node(), source, &mut builder)?;
        builder.finish()
    }
}

fn lower(root: Node<'_>, source: &str, builder: &mut TreeBuilder) -> AnalysisResult<()> {
    let mut stack: Vec<(Node<'_>, Option<NodeId>)> = vec![(root, None)];
    while let Some((node, parent)) = stack.pop() {
        let kind = map_kind(node);
        let id = builder.push(parent, kind, span(node))?;
        annotate(node, kind, id, source, builder);
        if is_leaf(node, kind) {
            continue;
        }
        let children = lowered_children(node);
        for child in children.into_iter().rev() {
            stack.push((child, Some(id)));
        }
    }
    Ok(())
}

fn lowered_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    if !cursor.goto_first_child() {
        return out;
    }
    loop {
        let child = cursor.node();
        let skipped = cursor
            .field_name()
            .is_some_and(|field| SKIPPED_FIELDS.contains(&field));
        if (child.is_named() || child.is_missing()) && !skipped {
            out.push(child);
        }
        if !cursor.goto_next_sibling() {
            break;
        }
    }
    out
}

fn map_kind(node: Node<'_>) -> NodeKind {
    if node.is_missing() || node.is_error() {
        return NodeKind::Error;
    }
    match node.kind() {
        "program" => NodeKind::CompilationUnit,
        "package_declaration" => NodeKind::Package,
        "import_declaration" => NodeKind::Import,
        "class_declaration" => NodeKind::Class,
        "interface_declaration" => NodeKind::Interface,
        "enum_declaration" => NodeKind::Enum,
        "enum_constant" => NodeKind::EnumConstant,
        "record_declaration" => NodeKind::Record,
        "annotation_type_declaration" => NodeKind::AnnotationType,
        "class_body" => match node.parent().map(|parent| parent.kind()) {
            Some("object_creation_expression") | Some("enum_constant") => NodeKind::AnonymousClass,
            _ => NodeKind::Block,
        },
        "interface_body"
        | "enum_body"
        | "enum_body_declarations"
        | "annotation_type_body"
        | "block"
        | "constructor_body" => NodeKind::Block,
        "field_declaration" | "constant_declaration" => NodeKind::Field,
        "variable_declarator" => NodeKind::VariableDeclarator,
        "formal_parameter" | "spread_parameter" => NodeKind::Parameter,
        "local_variable_declaration" => NodeKind::LocalVariable,
        "method_declaration" => NodeKind::Method,
        "constructor_declaration" | "compact_constructor_declaration" => NodeKind::Constructor,
        "lambda_expression" => NodeKind::Lambda,
        "method_invocation" => NodeKind::Call,
        "argument_list" | "annotation_argument_list" => NodeKind::Arguments,
        "string_literal" => NodeKind::StringLiteral,
        "null_literal" => NodeKind::NullLiteral,
        "decimal_integer_literal"
        | "hex_integer_literal"
        | "octal_integer_literal"
        | "binary_integer_literal"
        | "decimal_floating_point_literal"
        | "hex_floating_point_literal"
        | "character_literal"
        | "true"
        | "false" => NodeKind::Literal,
        "identifier" => NodeKind::Identifier,
        "field_access" | "scoped_identifier" => NodeKind::QualifiedName,
        "annotation" | "marker_annotation" => NodeKind::Annotation,
        "element_value_pair" => NodeKind::AnnotationArgument,
        "element_value_array_initializer" | "array_initializer" => NodeKind::ArrayInitializer,
        "binary_expression" => NodeKind::BinaryExpression,
        "modifiers" => NodeKind::Modifiers,
        "line_comment" | "block_comment" => NodeKind::Comment,
        _ => NodeKind::Other,
    }
}

fn is_leaf(node: Node<'_>, kind: NodeKind) -> bool {
    match kind {
        NodeKind::StringLiteral
        | NodeKind::NullLiteral
        | NodeKind::Literal
        | NodeKind::Identifier
        | NodeKind::Comment
        | NodeKind::Package
        | NodeKind::Import => true,
        NodeKind::QualifiedName => node.kind() == "scoped_identifier",
        _ => false,
    }
}

fn annotate(node: Node<'_>, kind: NodeKind, id: NodeId, source: &str, builder: &mut TreeBuilder) {
    match kind {
        NodeKind::Class
        | NodeKind::Interface
        | NodeKind::Enum
        | NodeKind::EnumConstant
        | NodeKind::Record
        | NodeKind::AnnotationType
        | NodeKind::Method
        | NodeKind::Constructor
        | NodeKind::VariableDeclarator
        | NodeKind::Annotation => {
            if let Some(name) = field_text(node, "name", source) {
                builder.set_name(id, name);
            }
        }
        NodeKind::Parameter => {
            if let Some(name) = field_text(node, "name", source) {
                builder.set_name(id, name);
            } else if let Some(name) = last_identifier(node, source) {
                builder.set_name(id, name);
            }
            if let Some(ty) = field_text(node, "type", source) {
                builder.set_detail(id, ty);
            }
        }
        NodeKind::Field | NodeKind::LocalVariable => {
            if let Some(ty) = field_text(node, "type", source) {
                builder.set_detail(id, ty);
            }
        }
        NodeKind::Call => {
            if let Some(name) = field_text(node, "name", source) {
                builder.set_name(id, name);
            }
            if let Some(receiver) = field_text(node, "object", source) {
                builder.set_detail(id, receiver);
            }
        }
        NodeKind::AnnotationArgument => {
            if let Some(key) = field_text(node, "key", source) {
                builder.set_name(id, key);
            }
        }
        NodeKind::AnonymousClass => {
            let instantiated = node
                .parent()
                .and_then(|parent| field_text(parent, "type", source));
            if let Some(ty) = instantiated {
                builder.set_detail(id, ty);
            }
        }
        NodeKind::BinaryExpression => {
            if let Some(op) = field_text(node, "operator", source) {
                builder.set_detail(id, op);
            }
        }
        NodeKind::Modifiers => {
            let mut keywords = Vec::new();
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if !child.is_named() {
                    keywords.push(node_text(child, source));
                }
            }
            builder.set_detail(id, keywords.join(" "));
        }
        NodeKind::Package => {
            if let Some(name) = path_child_text(node, source) {
                builder.set_name(id, name);
            }
        }
        NodeKind::Import => {
            let mut is_static = false;
            let mut on_demand = false;
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "static" => is_static = true,
                    "asterisk" => on_demand = true,
                    _ => {}
                }
            }
            if let Some(path) = path_child_text(node, source) {
                let name = if on_demand { format!("{path}.*") } else { path };
                builder.set_name(id, name);
            }
            if is_static {
                builder.set_detail(id, "static");
            }
        }
        _ => {}
    }
}

fn path_child_text(node: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if matches!(child.kind(), "identifier" | "scoped_identifier") {
            let text = node_text(child, source);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn last_identifier(node: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let mut found = None;
    for child in node.named_children(&mut cursor) {
        if child.kind() == "identifier" {
            found = Some(node_text(child, source));
        }
    }
    found.filter(|value| !value.is_empty())
}

fn field_text(node: Node<'_>, field: &str, source: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|child| node_text(child, source))
        .filter(|value| !value.is_empty())
}

fn span(node: Node<'_>) -> SourceSpan {
    let start = node.start_position();
    let end = node.end_position();
    SourceSpan {
        start_line: start.row as i64 + 1,
        start_col: start.column as i64 + 1,
        end_line: end.row as i64 + 1,
        end_col: end.column as i64 + 1,
        start_byte: node.start_byte() as i64,
        end_byte: node.end_byte() as i64,
    }
}

fn node_text(node: Node<'_>, source: &str) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    source.get(start..end).unwrap_or("").trim().to_string()
}
