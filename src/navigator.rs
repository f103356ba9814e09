//! Ancestor and descendant queries over a [`SyntaxTree`].
//!
//! All queries are pure walks over parent links. They only fail when handed a
//! node id that does not belong to the tree.

use crate::error::AnalysisResult;
use crate::syntax::{NodeId, NodeKind, SyntaxTree};

/// Nearest enclosing type declaration, nested and anonymous types included.
pub fn enclosing_class(tree: &SyntaxTree, node: NodeId) -> AnalysisResult<Option<NodeId>> {
    find_ancestor(tree, node, |kind| kind.is_type_declaration())
}

/// Nearest enclosing method or constructor. Lambdas are transparent, so a node
/// inside an inline callable resolves to the named method around it.
pub fn enclosing_named_method(tree: &SyntaxTree, node: NodeId) -> AnalysisResult<Option<NodeId>> {
    find_ancestor(tree, node, |kind| kind.is_named_callable())
}

/// Nearest method, constructor or lambda.
pub fn enclosing_callable_scope(tree: &SyntaxTree, node: NodeId) -> AnalysisResult<Option<NodeId>> {
    find_ancestor(tree, node, |kind| kind.is_callable())
}

/// Nearest named method that is not declared inside an anonymous class.
///
/// A call inside `new Runnable() { public void run() { .. } }` belongs to the
/// named method that instantiates the anonymous class. An anonymous class
/// with no such outer method (a field initializer) has no declared method.
pub fn enclosing_declared_method(tree: &SyntaxTree, node: NodeId) -> AnalysisResult<Option<NodeId>> {
    match enclosing_named_method(tree, node)? {
        Some(first) => declared_method_from(tree, first),
        None => Ok(None),
    }
}

/// Like [`enclosing_declared_method`], but a method or constructor node
/// counts as its own container.
pub fn containing_declared_method(tree: &SyntaxTree, node: NodeId) -> AnalysisResult<Option<NodeId>> {
    if tree.kind(node)?.is_named_callable() {
        return declared_method_from(tree, node);
    }
    enclosing_declared_method(tree, node)
}

fn declared_method_from(tree: &SyntaxTree, first: NodeId) -> AnalysisResult<Option<NodeId>> {
    let mut current = first;
    loop {
        let owner = enclosing_class(tree, current)?;
        let anonymous = match owner {
            Some(owner) => tree.kind(owner)? == NodeKind::AnonymousClass,
            None => false,
        };
        if !anonymous {
            return Ok(Some(current));
        }
        match enclosing_named_method(tree, current)? {
            Some(outer) => current = outer,
            None => return Ok(None),
        }
    }
}

/// Root-level declarations in source order. Package and import declarations
/// and file-level comments count as top-level positions too.
pub fn top_level_declarations(tree: &SyntaxTree) -> AnalysisResult<Vec<NodeId>> {
    let mut out = Vec::new();
    for child in tree.children(tree.root())? {
        match tree.kind(*child)? {
            NodeKind::Package
            | NodeKind::Import
            | NodeKind::Comment
            | NodeKind::Class
            | NodeKind::Interface
            | NodeKind::Enum
            | NodeKind::Record
            | NodeKind::AnnotationType => out.push(*child),
            _ => {}
        }
    }
    Ok(out)
}

/// Smallest node whose span contains `offset`.
pub fn node_at_offset(tree: &SyntaxTree, offset: i64) -> AnalysisResult<Option<NodeId>> {
    let root = tree.root();
    if !tree.span(root)?.contains_byte(offset) {
        return Ok(None);
    }
    let mut current = root;
    'descend: loop {
        for child in tree.children(current)? {
            if tree.span(*child)?.contains_byte(offset) {
                current = *child;
                continue 'descend;
            }
        }
        return Ok(Some(current));
    }
}

/// Package declared by the file, if any.
pub fn package_name(tree: &SyntaxTree) -> AnalysisResult<Option<String>> {
    for child in tree.children(tree.root())? {
        if tree.kind(*child)? == NodeKind::Package {
            return Ok(tree.name(*child)?.map(|name| name.to_string()));
        }
    }
    Ok(None)
}

/// Qualified name of a type declaration: `pkg.Outer.Inner`. Anonymous types
/// have no qualified name.
pub fn type_qualname(tree: &SyntaxTree, decl: NodeId) -> AnalysisResult<Option<String>> {
    let mut parts = Vec::new();
    let mut current = Some(decl);
    while let Some(id) = current {
        if tree.kind(id)? == NodeKind::AnonymousClass {
            return Ok(None);
        }
        match tree.name(id)? {
            Some(name) => parts.push(name.to_string()),
            None => return Ok(None),
        }
        current = enclosing_class(tree, id)?;
    }
    if let Some(package) = package_name(tree)? {
        parts.push(package);
    }
    parts.reverse();
    Ok(Some(parts.join(".")))
}

/// Qualified name of a method: `pkg.Type.method`. Methods of anonymous
/// classes are reported by their bare name.
pub fn method_qualname(tree: &SyntaxTree, method: NodeId) -> AnalysisResult<Option<String>> {
    let Some(name) = tree.name(method)? else {
        return Ok(None);
    };
    let owner = match enclosing_class(tree, method)? {
        Some(owner) => type_qualname(tree, owner)?,
        None => None,
    };
    Ok(Some(match owner {
        Some(owner) => format!("{owner}.{name}"),
        None => name.to_string(),
    }))
}

fn find_ancestor(
    tree: &SyntaxTree,
    node: NodeId,
    accept: impl Fn(NodeKind) -> bool,
) -> AnalysisResult<Option<NodeId>> {
    let mut current = tree.parent(node)?;
    while let Some(id) = current {
        if accept(tree.kind(id)?) {
            return Ok(Some(id));
        }
        current = tree.parent(id)?;
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::java::JavaFrontend;

    const SOURCE: &str = r#"package com.example;

public class TopLevelClass {

    private String classField = "value"; // FIELD_MARKER

    private final Runnable hook = new Runnable() {
        public void run() {
            int y = 2; // FIELD_ANON_MARKER
        }
    };

    public TopLevelClass() {
        String varInConstructor = "constructor"; // CONSTRUCTOR_MARKER
    }

    public void simpleMethod() {
        String varInSimpleMethod = "here"; // SIMPLE_METHOD_MARKER
    }

    public void methodWithLambda() {
        Runnable r = () -> {
            String varInLambda = "lambda"; // LAMBDA_MARKER
        };
        r.run();
    }

    public void methodWithAnonymous() {
        Runnable r = new Runnable() {
            public void run() {
                int x = 1; // ANON_MARKER
            }
        };
    }

    public static class NestedClass {
        public void methodInNestedClass() {
            int varInNested = 1; // NESTED_CLASS_METHOD_MARKER
        }
    }
}

// TOP_LEVEL_COMMENT_MARKER
"#;

    fn parse() -> SyntaxTree {
        let mut frontend = JavaFrontend::new().unwrap();
        frontend.parse("TopLevelClass.java", SOURCE).unwrap()
    }

    fn at(tree: &SyntaxTree, marker: &str) -> NodeId {
        let offset = SOURCE.find(marker).unwrap() as i64;
        node_at_offset(tree, offset).unwrap().unwrap()
    }

    fn method_name(tree: &SyntaxTree, node: Option<NodeId>) -> Option<String> {
        node.and_then(|id| method_qualname(tree, id).unwrap())
    }

    #[test]
    fn named_method_skips_lambdas() {
        let tree = parse();
        let node = at(&tree, "LAMBDA_MARKER");
        let named = enclosing_named_method(&tree, node).unwrap();
        assert_eq!(
            method_name(&tree, named).as_deref(),
            Some("com.example.TopLevelClass.methodWithLambda")
        );
        let scope = enclosing_callable_scope(&tree, node).unwrap().unwrap();
        assert_eq!(tree.kind(scope).unwrap(), NodeKind::Lambda);
    }

    #[test]
    fn constructor_and_nested_class_methods() {
        let tree = parse();
        let ctor = enclosing_named_method(&tree, at(&tree, "CONSTRUCTOR_MARKER")).unwrap();
        assert_eq!(
            method_name(&tree, ctor).as_deref(),
            Some("com.example.TopLevelClass.TopLevelClass")
        );
        let nested = enclosing_named_method(&tree, at(&tree, "NESTED_CLASS_METHOD_MARKER")).unwrap();
        assert_eq!(
            method_name(&tree, nested).as_deref(),
            Some("com.example.TopLevelClass.NestedClass.methodInNestedClass")
        );
    }

    #[test]
    fn field_and_top_level_comment_have_no_method() {
        let tree = parse();
        assert!(enclosing_named_method(&tree, at(&tree, "FIELD_MARKER")).unwrap().is_none());
        let comment = at(&tree, "TOP_LEVEL_COMMENT_MARKER");
        assert!(enclosing_named_method(&tree, comment).unwrap().is_none());
        assert!(enclosing_class(&tree, comment).unwrap().is_none());
    }

    #[test]
    fn anonymous_class_methods() {
        let tree = parse();
        let node = at(&tree, "ANON_MARKER");
        let named = enclosing_named_method(&tree, node).unwrap();
        assert_eq!(method_name(&tree, named).as_deref(), Some("run"));
        let declared = enclosing_declared_method(&tree, node).unwrap();
        assert_eq!(
            method_name(&tree, declared).as_deref(),
            Some("com.example.TopLevelClass.methodWithAnonymous")
        );
        let owner = enclosing_class(&tree, node).unwrap().unwrap();
        assert_eq!(tree.kind(owner).unwrap(), NodeKind::AnonymousClass);
        let run = named.unwrap();
        assert_eq!(containing_declared_method(&tree, run).unwrap(), declared);
    }

    #[test]
    fn anonymous_class_in_field_initializer_has_no_declared_method() {
        let tree = parse();
        let node = at(&tree, "FIELD_ANON_MARKER");
        let run = enclosing_named_method(&tree, node).unwrap().unwrap();
        assert_eq!(method_name(&tree, Some(run)).as_deref(), Some("run"));
        assert_eq!(enclosing_declared_method(&tree, node).unwrap(), None);
        assert_eq!(containing_declared_method(&tree, run).unwrap(), None);
    }

    #[test]
    fn top_level_declarations_include_comments() {
        let tree = parse();
        let kinds: Vec<_> = top_level_declarations(&tree)
            .unwrap()
            .into_iter()
            .map(|id| tree.kind(id).unwrap())
            .collect();
        assert_eq!(
            kinds,
            vec![NodeKind::Package, NodeKind::Class, NodeKind::Comment]
        );
    }

    #[test]
    fn foreign_node_ids_are_rejected() {
        let tree = parse();
        let outside = NodeId(tree.len() as u32 + 10);
        assert!(enclosing_class(&tree, outside).is_err());
        assert!(enclosing_named_method(&tree, outside).is_err());
    }
}
