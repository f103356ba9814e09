//! Symbol resolution for compile-time constants and receiver types.
//!
//! The analysis passes never resolve names themselves; they ask a
//! [`DeclarationResolver`]. [`ConstantTable`] is the default implementation,
//! built from enum constants and `static final String` fields declared
//! anywhere in the analyzed forest.

use crate::error::AnalysisResult;
use crate::navigator;
use crate::syntax::{LiteralValue, NodeId, NodeKind, SyntaxTree};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    EnumConstant {
        type_name: String,
        qualified_type: String,
        member: String,
    },
    StringConstant {
        type_name: String,
        qualified_type: String,
        member: String,
        value: String,
    },
}

impl Declaration {
    pub fn type_name(&self) -> &str {
        match self {
            Declaration::EnumConstant { type_name, .. } => type_name,
            Declaration::StringConstant { type_name, .. } => type_name,
        }
    }

    pub fn qualified_type(&self) -> &str {
        match self {
            Declaration::EnumConstant { qualified_type, .. } => qualified_type,
            Declaration::StringConstant { qualified_type, .. } => qualified_type,
        }
    }

    pub fn member(&self) -> &str {
        match self {
            Declaration::EnumConstant { member, .. } => member,
            Declaration::StringConstant { member, .. } => member,
        }
    }

    /// True when the declaring type is `expected`, given either simple or
    /// qualified.
    pub fn is_member_of(&self, expected: &str) -> bool {
        let expected = expected.trim();
        if expected.contains('.') {
            self.qualified_type() == expected
        } else {
            self.type_name() == expected
        }
    }
}

pub trait DeclarationResolver: Send + Sync {
    /// Declaration a reference node (identifier or qualified name) points at.
    fn resolve_declaration(
        &self,
        tree: &SyntaxTree,
        node: NodeId,
    ) -> AnalysisResult<Option<Declaration>>;

    /// Simple name of the declared type of a call's receiver, when known.
    fn receiver_type(&self, tree: &SyntaxTree, call: NodeId) -> AnalysisResult<Option<String>>;
}

#[derive(Debug, Clone, Default)]
struct TypeConstants {
    simple: String,
    enum_constants: BTreeSet<String>,
    strings: BTreeMap<String, String>,
}

impl TypeConstants {
    fn declaration(&self, qualified: &str, member: &str) -> Option<Declaration> {
        if self.enum_constants.contains(member) {
            return Some(Declaration::EnumConstant {
                type_name: self.simple.clone(),
                qualified_type: qualified.to_string(),
                member: member.to_string(),
            });
        }
        self.strings
            .get(member)
            .map(|value| Declaration::StringConstant {
                type_name: self.simple.clone(),
                qualified_type: qualified.to_string(),
                member: member.to_string(),
                value: value.clone(),
            })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstantTable {
    types: BTreeMap<String, TypeConstants>,
    by_member: BTreeMap<String, BTreeSet<String>>,
}

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_trees<'a>(trees: impl IntoIterator<Item = &'a SyntaxTree>) -> AnalysisResult<Self> {
        let mut table = Self::new();
        for tree in trees {
            table.add_tree(tree)?;
        }
        Ok(table)
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn add_tree(&mut self, tree: &SyntaxTree) -> AnalysisResult<()> {
        for constant in tree.nodes_of_kind(NodeKind::EnumConstant).collect::<Vec<_>>() {
            let Some(member) = tree.name(constant)? else {
                continue;
            };
            let Some(owner) = navigator::enclosing_class(tree, constant)? else {
                continue;
            };
            if tree.kind(owner)? != NodeKind::Enum {
                continue;
            }
            let Some(qualified) = navigator::type_qualname(tree, owner)? else {
                continue;
            };
            let simple = tree.name(owner)?.unwrap_or_default().to_string();
            let member = member.to_string();
            self.entry(&qualified, &simple)
                .enum_constants
                .insert(member.clone());
            self.by_member.entry(member).or_default().insert(qualified);
        }

        for field in tree.nodes_of_kind(NodeKind::Field).collect::<Vec<_>>() {
            if !is_string_constant_field(tree, field)? {
                continue;
            }
            let Some(owner) = navigator::enclosing_class(tree, field)? else {
                continue;
            };
            let Some(qualified) = navigator::type_qualname(tree, owner)? else {
                continue;
            };
            let simple = tree.name(owner)?.unwrap_or_default().to_string();
            for declarator in tree.children(field)?.to_vec() {
                if tree.kind(declarator)? != NodeKind::VariableDeclarator {
                    continue;
                }
                let Some(member) = tree.name(declarator)?.map(|name| name.to_string()) else {
                    continue;
                };
                let Some(init) = first_expression(tree, declarator)? else {
                    continue;
                };
                let Some(value) = constant_string(tree, init, self)? else {
                    continue;
                };
                self.entry(&qualified, &simple).strings.insert(member.clone(), value);
                self.by_member
                    .entry(member)
                    .or_default()
                    .insert(qualified.clone());
            }
        }
        Ok(())
    }

    fn entry(&mut self, qualified: &str, simple: &str) -> &mut TypeConstants {
        self.types
            .entry(qualified.to_string())
            .or_insert_with(|| TypeConstants {
                simple: simple.to_string(),
                ..Default::default()
            })
    }

    /// Looks up `qualifier.member`, where the qualifier is a simple, partially
    /// or fully qualified type name as written in `tree`.
    pub fn lookup(
        &self,
        tree: &SyntaxTree,
        qualifier: &str,
        member: &str,
    ) -> AnalysisResult<Option<Declaration>> {
        let Some(qualified) = self.resolve_type(tree, qualifier)? else {
            return Ok(None);
        };
        Ok(self
            .types
            .get(&qualified)
            .and_then(|constants| constants.declaration(&qualified, member)))
    }

    fn resolve_type(&self, tree: &SyntaxTree, qualifier: &str) -> AnalysisResult<Option<String>> {
        if self.types.contains_key(qualifier) {
            return Ok(Some(qualifier.to_string()));
        }
        let suffix = format!(".{qualifier}");
        let candidates: Vec<&String> = self
            .types
            .keys()
            .filter(|name| name.ends_with(&suffix))
            .collect();
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(Some(candidates[0].clone())),
            _ => {
                let visible = visible_packages(tree)?;
                let imported: Vec<&String> = candidates
                    .into_iter()
                    .filter(|name| is_visible(name, qualifier, &visible))
                    .collect();
                if imported.len() == 1 {
                    Ok(Some(imported[0].clone()))
                } else {
                    Ok(None)
                }
            }
        }
    }

    fn resolve_bare(&self, tree: &SyntaxTree, node: NodeId, member: &str) -> AnalysisResult<Option<Declaration>> {
        if local_declaration(tree, node, member)?.is_some() {
            return Ok(None);
        }
        for import in tree.nodes_of_kind(NodeKind::Import) {
            if tree.detail(import)? != Some("static") {
                continue;
            }
            let Some(path) = tree.name(import)? else {
                continue;
            };
            if let Some(qualifier) = path.strip_suffix(&format!(".{member}")) {
                if let Some(found) = self.lookup(tree, qualifier, member)? {
                    return Ok(Some(found));
                }
            }
        }
        for import in tree.nodes_of_kind(NodeKind::Import) {
            if tree.detail(import)? != Some("static") {
                continue;
            }
            let Some(path) = tree.name(import)? else {
                continue;
            };
            if let Some(qualifier) = path.strip_suffix(".*") {
                if let Some(found) = self.lookup(tree, qualifier, member)? {
                    return Ok(Some(found));
                }
            }
        }
        let mut owner = navigator::enclosing_class(tree, node)?;
        while let Some(class) = owner {
            if let Some(qualified) = navigator::type_qualname(tree, class)? {
                if let Some(constants) = self.types.get(&qualified) {
                    if let Some(found) = constants.declaration(&qualified, member) {
                        return Ok(Some(found));
                    }
                }
            }
            owner = navigator::enclosing_class(tree, class)?;
        }
        let declaring = self.by_member.get(member);
        if let Some(declaring) = declaring {
            if declaring.len() == 1 {
                if let Some(qualified) = declaring.iter().next() {
                    return Ok(self
                        .types
                        .get(qualified)
                        .and_then(|constants| constants.declaration(qualified, member)));
                }
            }
        }
        Ok(None)
    }
}

impl DeclarationResolver for ConstantTable {
    fn resolve_declaration(
        &self,
        tree: &SyntaxTree,
        node: NodeId,
    ) -> AnalysisResult<Option<Declaration>> {
        match tree.kind(node)? {
            NodeKind::QualifiedName => {
                let text = compact(tree.text(node)?);
                let Some((qualifier, member)) = text.rsplit_once('.') else {
                    return Ok(None);
                };
                if qualifier.is_empty() || member.is_empty() || qualifier == "this" {
                    return Ok(None);
                }
                self.lookup(tree, qualifier, member)
            }
            NodeKind::Identifier => {
                let member = compact(tree.text(node)?);
                if member.is_empty() {
                    return Ok(None);
                }
                self.resolve_bare(tree, node, &member)
            }
            _ => Ok(None),
        }
    }

    fn receiver_type(&self, tree: &SyntaxTree, call: NodeId) -> AnalysisResult<Option<String>> {
        let Some(receiver) = tree.detail(call)? else {
            return Ok(None);
        };
        let receiver = compact(receiver);
        let ident = receiver.strip_prefix("this.").unwrap_or(&receiver);
        if ident.is_empty() || !ident.chars().all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '$') {
            return Ok(None);
        }
        if let Some(declared) = local_declaration(tree, call, ident)? {
            return Ok(simple_type_name(&declared));
        }
        if let Some(declared) = field_declaration(tree, call, ident)? {
            return Ok(simple_type_name(&declared));
        }
        if ident.chars().next().is_some_and(|ch| ch.is_ascii_uppercase()) {
            return Ok(Some(ident.to_string()));
        }
        Ok(None)
    }
}

/// Evaluates a compile-time string expression: literals, `+` concatenation,
/// parentheses and references to string constants.
pub fn constant_string(
    tree: &SyntaxTree,
    node: NodeId,
    resolver: &dyn DeclarationResolver,
) -> AnalysisResult<Option<String>> {
    match tree.kind(node)? {
        NodeKind::StringLiteral => match tree.literal_value(node)? {
            Some(LiteralValue::String(value)) => Ok(Some(value)),
            _ => Ok(None),
        },
        NodeKind::BinaryExpression => {
            if tree.detail(node)? != Some("+") {
                return Ok(None);
            }
            let operands = expressions(tree, node)?;
            if operands.len() != 2 {
                return Ok(None);
            }
            let Some(left) = constant_string(tree, operands[0], resolver)? else {
                return Ok(None);
            };
            let Some(right) = constant_string(tree, operands[1], resolver)? else {
                return Ok(None);
            };
            Ok(Some(left + &right))
        }
        NodeKind::Identifier | NodeKind::QualifiedName => {
            match resolver.resolve_declaration(tree, node)? {
                Some(Declaration::StringConstant { value, .. }) => Ok(Some(value)),
                _ => Ok(None),
            }
        }
        NodeKind::Other => {
            let inner = expressions(tree, node)?;
            if inner.len() == 1 {
                constant_string(tree, inner[0], resolver)
            } else {
                Ok(None)
            }
        }
        _ => Ok(None),
    }
}

fn expressions(tree: &SyntaxTree, node: NodeId) -> AnalysisResult<Vec<NodeId>> {
    let mut out = Vec::new();
    for child in tree.children(node)? {
        if tree.kind(*child)? != NodeKind::Comment {
            out.push(*child);
        }
    }
    Ok(out)
}

fn first_expression(tree: &SyntaxTree, node: NodeId) -> AnalysisResult<Option<NodeId>> {
    Ok(expressions(tree, node)?.into_iter().next())
}

fn is_string_constant_field(tree: &SyntaxTree, field: NodeId) -> AnalysisResult<bool> {
    let declared = tree.detail(field)?.unwrap_or("");
    if declared != "String" && declared != "java.lang.String" {
        return Ok(false);
    }
    let keywords = tree.modifier_keywords(field)?;
    if keywords.contains(&"static") && keywords.contains(&"final") {
        return Ok(true);
    }
    let implicit = match navigator::enclosing_class(tree, field)? {
        Some(owner) => matches!(
            tree.kind(owner)?,
            NodeKind::Interface | NodeKind::AnnotationType
        ),
        None => false,
    };
    Ok(implicit)
}

/// Declared type of a parameter or local variable named `name` that is in
/// scope at `node`.
fn local_declaration(tree: &SyntaxTree, node: NodeId, name: &str) -> AnalysisResult<Option<String>> {
    let position = tree.span(node)?.start_byte;
    let mut scope = navigator::enclosing_callable_scope(tree, node)?;
    while let Some(callable) = scope {
        let mut best: Option<(i64, String)> = None;
        for candidate in tree.descendants(callable)? {
            let kind = tree.kind(candidate)?;
            if kind != NodeKind::Parameter && kind != NodeKind::LocalVariable {
                continue;
            }
            if navigator::enclosing_callable_scope(tree, candidate)? != Some(callable) {
                continue;
            }
            let start = tree.span(candidate)?.start_byte;
            if start > position || !declares(tree, candidate, name)? {
                continue;
            }
            if best.as_ref().is_none_or(|(seen, _)| start > *seen) {
                let declared = tree.detail(candidate)?.unwrap_or("").to_string();
                best = Some((start, declared));
            }
        }
        if let Some((_, declared)) = best {
            return Ok(Some(declared));
        }
        scope = navigator::enclosing_callable_scope(tree, callable)?;
    }
    Ok(None)
}

fn field_declaration(tree: &SyntaxTree, node: NodeId, name: &str) -> AnalysisResult<Option<String>> {
    let mut owner = navigator::enclosing_class(tree, node)?;
    while let Some(class) = owner {
        for candidate in tree.descendants(class)? {
            if tree.kind(candidate)? != NodeKind::Field {
                continue;
            }
            if navigator::enclosing_class(tree, candidate)? != Some(class) {
                continue;
            }
            if declares(tree, candidate, name)? {
                return Ok(Some(tree.detail(candidate)?.unwrap_or("").to_string()));
            }
        }
        owner = navigator::enclosing_class(tree, class)?;
    }
    Ok(None)
}

fn declares(tree: &SyntaxTree, decl: NodeId, name: &str) -> AnalysisResult<bool> {
    if tree.kind(decl)? == NodeKind::Parameter {
        return Ok(tree.name(decl)? == Some(name));
    }
    for child in tree.children(decl)? {
        if tree.kind(*child)? == NodeKind::VariableDeclarator && tree.name(*child)? == Some(name) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `java.util.List<Foo>[]` -> `List`. `var` and empty types are unknown.
fn simple_type_name(declared: &str) -> Option<String> {
    let base = declared.split('<').next().unwrap_or(declared);
    let base = base.trim().trim_end_matches("[]").trim();
    let simple = base.rsplit('.').next().unwrap_or(base).trim();
    if simple.is_empty() || simple == "var" {
        None
    } else {
        Some(simple.to_string())
    }
}

fn visible_packages(tree: &SyntaxTree) -> AnalysisResult<Vec<String>> {
    let mut out = Vec::new();
    if let Some(package) = navigator::package_name(tree)? {
        out.push(format!("{package}.*"));
    }
    for import in tree.nodes_of_kind(NodeKind::Import) {
        if let Some(path) = tree.name(import)? {
            out.push(path.to_string());
        }
    }
    Ok(out)
}

fn is_visible(candidate: &str, qualifier: &str, visible: &[String]) -> bool {
    let head = qualifier.split('.').next().unwrap_or(qualifier);
    let Some(prefix_len) = candidate.len().checked_sub(qualifier.len()) else {
        return false;
    };
    let imported_type = format!("{}{}", &candidate[..prefix_len], head);
    visible.iter().any(|entry| {
        if let Some(package) = entry.strip_suffix(".*") {
            imported_type
                .rsplit_once('.')
                .is_some_and(|(pkg, _)| pkg == package)
        } else {
            entry == &imported_type
        }
    })
}

fn compact(raw: &str) -> String {
    raw.chars().filter(|ch| !ch.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::java::JavaFrontend;

    fn parse(path: &str, source: &str) -> SyntaxTree {
        JavaFrontend::new().unwrap().parse(path, source).unwrap()
    }

    const KEYS: &str = r#"
package com.example.features;

public enum FeatureKey {
    FEATURE_ONE,
    ANOTHER_FEATURE,
    DISABLED_FEATURE
}
"#;

    const PATHS: &str = r#"
package com.example.web;

public final class Paths {
    public static final String API = "/api";
    public static final String USERS = API + "/users";
    private final String notConstant = "/nope";
}

interface Routes {
    String HEALTH = "/health";
}
"#;

    fn first_arg(tree: &SyntaxTree, call_name: &str) -> NodeId {
        let call = tree
            .nodes_of_kind(NodeKind::Call)
            .find(|id| tree.name(*id).unwrap() == Some(call_name))
            .unwrap();
        tree.arguments_of(call).unwrap().unwrap()[0]
    }

    #[test]
    fn indexes_enum_and_string_constants() {
        let keys = parse("FeatureKey.java", KEYS);
        let paths = parse("Paths.java", PATHS);
        let table = ConstantTable::from_trees([&keys, &paths]).unwrap();
        assert_eq!(table.type_count(), 3);
        let found = table.lookup(&keys, "FeatureKey", "FEATURE_ONE").unwrap().unwrap();
        assert_eq!(found.type_name(), "FeatureKey");
        assert_eq!(found.qualified_type(), "com.example.features.FeatureKey");
        match table.lookup(&paths, "Paths", "USERS").unwrap().unwrap() {
            Declaration::StringConstant { value, .. } => assert_eq!(value, "/api/users"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(table.lookup(&paths, "Paths", "notConstant").unwrap().is_none());
        assert!(table.lookup(&paths, "Routes", "HEALTH").unwrap().is_some());
    }

    #[test]
    fn resolves_qualified_and_static_imported_references() {
        let keys = parse("FeatureKey.java", KEYS);
        let usage = parse(
            "Usage.java",
            r#"
package com.example.usage;

import static com.example.features.FeatureKey.FEATURE_ONE;

class Usage {
    void run() {
        client.isEnabled(FEATURE_ONE);
        client.check(com.example.features.FeatureKey.DISABLED_FEATURE);
        client.other(UNKNOWN);
    }
}
"#,
        );
        let table = ConstantTable::from_trees([&keys, &usage]).unwrap();

        let bare = table
            .resolve_declaration(&usage, first_arg(&usage, "isEnabled"))
            .unwrap()
            .unwrap();
        assert_eq!(bare.member(), "FEATURE_ONE");
        assert!(bare.is_member_of("FeatureKey"));
        assert!(bare.is_member_of("com.example.features.FeatureKey"));

        let qualified = table
            .resolve_declaration(&usage, first_arg(&usage, "check"))
            .unwrap()
            .unwrap();
        assert_eq!(qualified.member(), "DISABLED_FEATURE");

        assert!(
            table
                .resolve_declaration(&usage, first_arg(&usage, "other"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn local_variables_shadow_constants() {
        let keys = parse("FeatureKey.java", KEYS);
        let usage = parse(
            "Usage.java",
            r#"
class Usage {
    void run(String FEATURE_ONE) {
        client.isEnabled(FEATURE_ONE);
    }
}
"#,
        );
        let table = ConstantTable::from_trees([&keys, &usage]).unwrap();
        assert!(
            table
                .resolve_declaration(&usage, first_arg(&usage, "isEnabled"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn infers_receiver_types() {
        let tree = parse(
            "Usage.java",
            r#"
class Usage {
    private FeatureClient client;
    private com.acme.OtherClient other;

    void run(java.util.List<String> items) {
        var inferred = make();
        client.getBooleanValue("a", false);
        other.getBooleanValue("b", false);
        items.size();
        inferred.getBooleanValue("c", false);
        Flags.isEnabled("d");
        this.client.getBooleanValue("e", true);
    }
}
"#,
        );
        let table = ConstantTable::new();
        let types: Vec<Option<String>> = tree
            .nodes_of_kind(NodeKind::Call)
            .filter(|id| tree.name(*id).unwrap() != Some("make"))
            .map(|id| table.receiver_type(&tree, id).unwrap())
            .collect();
        assert_eq!(
            types,
            vec![
                Some("FeatureClient".to_string()),
                Some("OtherClient".to_string()),
                Some("List".to_string()),
                None,
                Some("Flags".to_string()),
                Some("FeatureClient".to_string()),
            ]
        );
    }

    #[test]
    fn simple_type_names() {
        assert_eq!(simple_type_name("java.util.List<String>"), Some("List".to_string()));
        assert_eq!(simple_type_name("Foo[]"), Some("Foo".to_string()));
        assert_eq!(simple_type_name("var"), None);
    }
}
