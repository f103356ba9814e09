//! Endpoint discovery from class- and method-level routing annotations.

use super::http::{self, HttpMethod, MethodSet};
use crate::error::{AnalysisError, AnalysisResult};
use crate::navigator;
use crate::resolve::{self, DeclarationResolver};
use crate::syntax::{NodeId, NodeKind, SourceSpan, SyntaxTree};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

const DEFAULT_MARKER: &str = "RestController";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAnnotationSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implies_method: Option<HttpMethod>,
    #[serde(default = "default_value_attr")]
    pub value_attr: String,
    #[serde(default = "default_path_attr")]
    pub path_attr: String,
    #[serde(default = "default_method_attr")]
    pub method_attr: String,
    #[serde(default = "allowed")]
    pub allowed_at_class_level: bool,
    #[serde(default = "allowed")]
    pub allowed_at_method_level: bool,
}

fn default_value_attr() -> String {
    "value".to_string()
}

fn default_path_attr() -> String {
    "path".to_string()
}

fn default_method_attr() -> String {
    "method".to_string()
}

fn allowed() -> bool {
    true
}

impl RouteAnnotationSpec {
    /// Generic mapping that may appear on classes and methods.
    pub fn generic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            implies_method: None,
            value_attr: default_value_attr(),
            path_attr: default_path_attr(),
            method_attr: default_method_attr(),
            allowed_at_class_level: true,
            allowed_at_method_level: true,
        }
    }

    /// Method-only mapping fixed to one verb.
    pub fn verb(name: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            implies_method: Some(method),
            allowed_at_class_level: false,
            ..Self::generic(name)
        }
    }

    fn allowed_at(&self, level: Level) -> bool {
        match level {
            Level::Class => self.allowed_at_class_level,
            Level::Method => self.allowed_at_method_level,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Class,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRegistry {
    #[serde(default = "default_marker")]
    pub marker_annotation: String,
    #[serde(default = "spring_annotations")]
    pub annotations: Vec<RouteAnnotationSpec>,
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

fn spring_annotations() -> Vec<RouteAnnotationSpec> {
    vec![
        RouteAnnotationSpec::generic("RequestMapping"),
        RouteAnnotationSpec::verb("GetMapping", HttpMethod::Get),
        RouteAnnotationSpec::verb("PostMapping", HttpMethod::Post),
        RouteAnnotationSpec::verb("PutMapping", HttpMethod::Put),
        RouteAnnotationSpec::verb("DeleteMapping", HttpMethod::Delete),
        RouteAnnotationSpec::verb("PatchMapping", HttpMethod::Patch),
    ]
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::spring()
    }
}

impl RouteRegistry {
    pub fn new(
        marker_annotation: impl Into<String>,
        annotations: Vec<RouteAnnotationSpec>,
    ) -> AnalysisResult<Self> {
        let registry = Self {
            marker_annotation: marker_annotation.into(),
            annotations,
        };
        registry.validate()?;
        Ok(registry)
    }

    /// Spring MVC mappings with `@RestController` as the marker.
    pub fn spring() -> Self {
        Self {
            marker_annotation: default_marker(),
            annotations: spring_annotations(),
        }
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if self.marker_annotation.trim().is_empty() {
            return Err(AnalysisError::Config(
                "marker_annotation must not be empty".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for spec in &self.annotations {
            let name = simple_name(&spec.name);
            if name.is_empty() {
                return Err(AnalysisError::Config(
                    "route annotation name must not be empty".to_string(),
                ));
            }
            if !seen.insert(name) {
                return Err(AnalysisError::Config(format!(
                    "route annotation {name} is declared twice"
                )));
            }
            if !spec.allowed_at_class_level && !spec.allowed_at_method_level {
                return Err(AnalysisError::Config(format!(
                    "route annotation {name} is not allowed at any level"
                )));
            }
            for attr in [&spec.value_attr, &spec.path_attr, &spec.method_attr] {
                if attr.trim().is_empty() {
                    return Err(AnalysisError::Config(format!(
                        "route annotation {name} has an empty attribute name"
                    )));
                }
            }
        }
        Ok(())
    }

    fn is_marker(&self, annotation_name: &str) -> bool {
        simple_name(annotation_name) == simple_name(&self.marker_annotation)
    }

    fn spec_for(&self, annotation_name: &str, level: Level) -> Option<&RouteAnnotationSpec> {
        let name = simple_name(annotation_name);
        self.annotations
            .iter()
            .find(|spec| simple_name(&spec.name) == name && spec.allowed_at(level))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HandlerRef {
    pub file: String,
    pub qualname: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EndpointDeclaration {
    pub handler: HandlerRef,
    pub span: SourceSpan,
    pub http_methods: MethodSet,
    pub paths: Vec<String>,
    pub patterns: Vec<String>,
    /// Path expressions that are not compile-time strings. Each one stands in
    /// `paths` as a `{expression}` segment.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_paths: Vec<String>,
    #[serde(skip)]
    pub method: NodeId,
}

#[derive(Debug, Default)]
struct ClassFacts {
    prefix: String,
    unresolved_prefix: Option<String>,
    default_methods: Vec<HttpMethod>,
}

/// Endpoints of every marker-annotated type in `tree`, in source order.
pub fn resolve_endpoints(
    tree: &SyntaxTree,
    registry: &RouteRegistry,
    resolver: &dyn DeclarationResolver,
) -> AnalysisResult<Vec<EndpointDeclaration>> {
    let mut out = Vec::new();
    for idx in 0..tree.len() {
        let class = NodeId(idx as u32);
        let kind = tree.kind(class)?;
        if !kind.is_type_declaration() || kind == NodeKind::AnonymousClass {
            continue;
        }
        let annotations = named_annotations(tree, class)?;
        if !annotations.iter().any(|(_, name)| registry.is_marker(name)) {
            continue;
        }
        let facts = class_facts(tree, registry, resolver, &annotations)?;
        for method in declared_methods(tree, class)? {
            if let Some(endpoint) = method_endpoint(tree, registry, resolver, &facts, method)? {
                out.push(endpoint);
            }
        }
    }
    Ok(out)
}

fn class_facts(
    tree: &SyntaxTree,
    registry: &RouteRegistry,
    resolver: &dyn DeclarationResolver,
    annotations: &[(NodeId, String)],
) -> AnalysisResult<ClassFacts> {
    let found = annotations
        .iter()
        .find_map(|(id, name)| registry.spec_for(name, Level::Class).map(|spec| (*id, spec)));
    let Some((annotation, spec)) = found else {
        return Ok(ClassFacts::default());
    };
    let prefixes = mapped_paths(tree, annotation, spec, resolver)?;
    if prefixes.len() > 1 {
        debug!(
            file = tree.path(),
            prefixes = prefixes.len(),
            "class mapping declares several prefixes; using the first"
        );
    }
    let first = prefixes.into_iter().next();
    let default_methods = match spec.implies_method {
        Some(method) => vec![method],
        None => mapped_methods(tree, annotation, spec)?,
    };
    Ok(ClassFacts {
        prefix: first.as_ref().map(|path| path.route.clone()).unwrap_or_default(),
        unresolved_prefix: first.and_then(|path| path.unresolved),
        default_methods,
    })
}

fn method_endpoint(
    tree: &SyntaxTree,
    registry: &RouteRegistry,
    resolver: &dyn DeclarationResolver,
    facts: &ClassFacts,
    method: NodeId,
) -> AnalysisResult<Option<EndpointDeclaration>> {
    let annotations = named_annotations(tree, method)?;
    let found = annotations
        .iter()
        .find_map(|(id, name)| registry.spec_for(name, Level::Method).map(|spec| (*id, spec)));
    let Some((annotation, spec)) = found else {
        return Ok(None);
    };

    let mut method_paths = mapped_paths(tree, annotation, spec, resolver)?;
    if method_paths.is_empty() {
        method_paths.push(MappedPath::default());
    }
    let http_methods = match spec.implies_method {
        Some(verb) => MethodSet::single(verb),
        None => {
            let own = mapped_methods(tree, annotation, spec)?;
            if own.is_empty() {
                MethodSet::from_methods(facts.default_methods.iter().copied())
            } else {
                MethodSet::from_methods(own)
            }
        }
    };

    let paths: Vec<String> = method_paths
        .iter()
        .map(|path| http::join_paths(&facts.prefix, &path.route))
        .collect();
    let unresolved_paths = facts
        .unresolved_prefix
        .iter()
        .cloned()
        .chain(method_paths.into_iter().filter_map(|path| path.unresolved))
        .collect();
    let patterns = paths.iter().map(|path| http::route_pattern(path)).collect();
    let span = tree.span(method)?;
    let name = tree
        .name(method)?
        .ok_or_else(|| AnalysisError::invalid_at(tree.path(), span, "handler method has no name"))?
        .to_string();
    let qualname = navigator::method_qualname(tree, method)?.unwrap_or_else(|| name.clone());
    Ok(Some(EndpointDeclaration {
        handler: HandlerRef {
            file: tree.path().to_string(),
            qualname,
            name,
        },
        span,
        http_methods,
        paths,
        patterns,
        unresolved_paths,
        method,
    }))
}

/// Methods declared directly in `class`, nested and anonymous types excluded.
fn declared_methods(tree: &SyntaxTree, class: NodeId) -> AnalysisResult<Vec<NodeId>> {
    let mut out = Vec::new();
    for node in tree.descendants(class)? {
        if tree.kind(node)? == NodeKind::Method && navigator::enclosing_class(tree, node)? == Some(class) {
            out.push(node);
        }
    }
    Ok(out)
}

fn named_annotations(tree: &SyntaxTree, decl: NodeId) -> AnalysisResult<Vec<(NodeId, String)>> {
    let mut out = Vec::new();
    for annotation in tree.annotations_of(decl)? {
        let Some(name) = tree.name(annotation)? else {
            return Err(AnalysisError::invalid_at(
                tree.path(),
                tree.span(annotation)?,
                "annotation without a name",
            ));
        };
        out.push((annotation, name.to_string()));
    }
    Ok(out)
}

/// One element of a path attribute. `unresolved` holds the source text of an
/// expression that did not fold to a string; `route` is then its placeholder.
#[derive(Debug, Clone, Default)]
struct MappedPath {
    route: String,
    unresolved: Option<String>,
}

impl MappedPath {
    fn is_blank(&self) -> bool {
        self.unresolved.is_none() && self.route.trim().is_empty()
    }
}

/// First non-empty of the value and path attributes. An element that cannot
/// be folded to a string counts as non-empty.
fn mapped_paths(
    tree: &SyntaxTree,
    annotation: NodeId,
    spec: &RouteAnnotationSpec,
    resolver: &dyn DeclarationResolver,
) -> AnalysisResult<Vec<MappedPath>> {
    for attr in [&spec.value_attr, &spec.path_attr] {
        let Some(value) = attribute(tree, annotation, attr, &spec.value_attr)? else {
            continue;
        };
        let values = string_values(tree, value, resolver)?;
        if values.iter().any(|path| !path.is_blank()) {
            return Ok(values);
        }
    }
    Ok(Vec::new())
}

fn mapped_methods(
    tree: &SyntaxTree,
    annotation: NodeId,
    spec: &RouteAnnotationSpec,
) -> AnalysisResult<Vec<HttpMethod>> {
    let Some(value) = attribute(tree, annotation, &spec.method_attr, &spec.value_attr)? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for element in elements(tree, value)? {
        let text = tree.text(element)?;
        match http::normalize_method(text) {
            Some(method) => {
                if !out.contains(&method) {
                    out.push(method);
                }
            }
            None => debug!(file = tree.path(), value = text, "ignoring unknown request method"),
        }
    }
    Ok(out)
}

/// Value node of `name = value`, or the bare single argument when `name` is
/// the implicit value attribute.
fn attribute(
    tree: &SyntaxTree,
    annotation: NodeId,
    name: &str,
    value_attr: &str,
) -> AnalysisResult<Option<NodeId>> {
    let Some(args) = tree.arguments_of(annotation)? else {
        return Ok(None);
    };
    for arg in args {
        if tree.kind(arg)? == NodeKind::AnnotationArgument {
            if tree.name(arg)? == Some(name) {
                return Ok(elements(tree, arg)?.into_iter().next());
            }
        } else if name == value_attr {
            return Ok(Some(arg));
        }
    }
    Ok(None)
}

fn string_values(
    tree: &SyntaxTree,
    value: NodeId,
    resolver: &dyn DeclarationResolver,
) -> AnalysisResult<Vec<MappedPath>> {
    let mut out = Vec::new();
    for element in elements(tree, value)? {
        match resolve::constant_string(tree, element, resolver)? {
            Some(route) => out.push(MappedPath {
                route,
                unresolved: None,
            }),
            None => {
                let text: String = tree
                    .text(element)?
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ");
                debug!(
                    file = tree.path(),
                    value = text.as_str(),
                    "mapping path is not a compile-time string"
                );
                out.push(MappedPath {
                    route: path_placeholder(&text),
                    unresolved: Some(text),
                });
            }
        }
    }
    Ok(out)
}

/// `{expression}` segment standing in for a path that is only known at run
/// time. Separators, braces, quotes and whitespace are dropped from the name.
fn path_placeholder(expression: &str) -> String {
    let name: String = expression
        .chars()
        .filter(|ch| !matches!(ch, '/' | '{' | '}' | '"') && !ch.is_whitespace())
        .collect();
    format!("{{{name}}}")
}

/// Members of an array initializer, or the value itself.
fn elements(tree: &SyntaxTree, value: NodeId) -> AnalysisResult<Vec<NodeId>> {
    let kind = tree.kind(value)?;
    if kind != NodeKind::ArrayInitializer && kind != NodeKind::AnnotationArgument {
        return Ok(vec![value]);
    }
    let mut out = Vec::new();
    for child in tree.children(value)? {
        if tree.kind(*child)? != NodeKind::Comment {
            out.push(*child);
        }
    }
    Ok(out)
}

fn simple_name(raw: &str) -> &str {
    let trimmed = raw.trim().trim_start_matches('@');
    trimmed.rsplit('.').next().unwrap_or(trimmed).trim()
}
