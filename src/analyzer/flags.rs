//! Feature-flag call-site extraction.

use super::rules::{KeyKind, SignatureRegistry, SignatureRule};
use crate::error::{AnalysisError, AnalysisResult};
use crate::resolve::DeclarationResolver;
use crate::syntax::{LiteralValue, NodeId, NodeKind, SourceSpan, SyntaxTree};
use crate::util;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureKey {
    Literal { value: String },
    SymbolicConstant { type_name: String, member: String },
    Unresolved,
}

impl FeatureKey {
    pub fn literal(value: impl Into<String>) -> Self {
        FeatureKey::Literal {
            value: value.into(),
        }
    }

    pub fn symbolic(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        FeatureKey::SymbolicConstant {
            type_name: type_name.into(),
            member: member.into(),
        }
    }

    /// Index key: the literal value, or the member name of a constant.
    pub fn normalized(&self) -> Option<&str> {
        match self {
            FeatureKey::Literal { value } => Some(value),
            FeatureKey::SymbolicConstant { member, .. } => Some(member),
            FeatureKey::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, FeatureKey::Unresolved)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConfigCallSite {
    pub file: String,
    pub call_span: SourceSpan,
    pub matched_rule: String,
    pub key: FeatureKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_arg_span: Option<SourceSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    pub snippet: String,
    #[serde(skip)]
    pub call: NodeId,
}

/// Every call in `tree` that matches a registry rule, in source order.
pub fn extract_call_sites(
    tree: &SyntaxTree,
    registry: &SignatureRegistry,
    resolver: &dyn DeclarationResolver,
) -> AnalysisResult<Vec<ConfigCallSite>> {
    let method_names: BTreeSet<&str> = registry
        .rules()
        .iter()
        .map(|rule| rule.method_name.as_str())
        .collect();
    let mut out = Vec::new();
    for call in tree.nodes_of_kind(NodeKind::Call) {
        let Some(name) = tree.name(call)? else {
            debug!(file = tree.path(), node = call.0, "call without a callee name");
            continue;
        };
        if !method_names.contains(name) {
            continue;
        }
        let Some(args) = tree.arguments_of(call)? else {
            return Err(AnalysisError::invalid_at(
                tree.path(),
                tree.span(call)?,
                format!("call to {name} has no argument list"),
            ));
        };
        let receiver_type = resolver.receiver_type(tree, call)?;
        let Some(rule) = registry.match_call(name, args.len(), receiver_type.as_deref()) else {
            debug!(
                file = tree.path(),
                method = name,
                arity = args.len(),
                receiver_type = receiver_type.as_deref().unwrap_or("?"),
                "call does not match any signature rule"
            );
            continue;
        };
        let key = extract_key(tree, args[rule.key_param_index], rule, resolver)?;
        let default_arg_span = match rule.default_index().and_then(|idx| args.get(idx)) {
            Some(arg) => Some(tree.span(*arg)?),
            None => None,
        };
        let call_span = tree.span(call)?;
        out.push(ConfigCallSite {
            file: tree.path().to_string(),
            call_span,
            matched_rule: rule.label(),
            key,
            default_arg_span,
            receiver: tree.detail(call)?.map(|value| value.to_string()),
            snippet: util::evidence_snippet(tree.source(), call_span.start_byte, call_span.end_byte),
            call,
        });
    }
    Ok(out)
}

fn extract_key(
    tree: &SyntaxTree,
    arg: NodeId,
    rule: &SignatureRule,
    resolver: &dyn DeclarationResolver,
) -> AnalysisResult<FeatureKey> {
    if let Some(LiteralValue::String(value)) = tree.literal_value(arg)? {
        return Ok(FeatureKey::Literal { value });
    }
    if rule.key_kind != KeyKind::SymbolicConstant {
        return Ok(FeatureKey::Unresolved);
    }
    let kind = tree.kind(arg)?;
    if kind != NodeKind::Identifier && kind != NodeKind::QualifiedName {
        return Ok(FeatureKey::Unresolved);
    }
    let expected = rule.expected_symbolic_type.as_deref();
    if let Some(declaration) = resolver.resolve_declaration(tree, arg)? {
        let accepted = expected.is_none_or(|expected| declaration.is_member_of(expected));
        if accepted {
            return Ok(FeatureKey::symbolic(declaration.type_name(), declaration.member()));
        }
        return Ok(FeatureKey::Unresolved);
    }
    if let (Some(expected), NodeKind::QualifiedName) = (expected, kind) {
        let text: String = tree
            .text(arg)?
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect();
        if let Some((qualifier, member)) = text.rsplit_once('.') {
            let qualifier_simple = qualifier.rsplit('.').next().unwrap_or(qualifier);
            let expected_simple = expected.rsplit('.').next().unwrap_or(expected);
            let qualified_match = !expected.contains('.') || qualifier == expected;
            if qualifier_simple == expected_simple && qualified_match && !member.is_empty() {
                return Ok(FeatureKey::symbolic(expected_simple, member));
            }
        }
    }
    Ok(FeatureKey::Unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ConstantTable;
    use crate::syntax::java::JavaFrontend;
    use crate::syntax::TreeBuilder;

    fn registry() -> SignatureRegistry {
        SignatureRegistry::new(vec![
            SignatureRule::new("getBooleanValue", 2, 0, KeyKind::StringLiteral),
            SignatureRule::new("isEnabled", 1, 0, KeyKind::SymbolicConstant)
                .with_expected_type("FeatureKey"),
        ])
        .unwrap()
    }

    #[test]
    fn qualified_reference_to_expected_type_is_accepted_without_declaration() {
        let source = r#"
class Usage {
    void run() {
        client.isEnabled(FeatureKey.FEATURE_ONE);
        client.isEnabled(OtherKey.FEATURE_ONE);
        client.isEnabled(featureName);
        client.getBooleanValue("feature-A", false);
    }
}
"#;
        let tree = JavaFrontend::new().unwrap().parse("Usage.java", source).unwrap();
        let sites = extract_call_sites(&tree, &registry(), &ConstantTable::new()).unwrap();
        let keys: Vec<_> = sites.iter().map(|site| site.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                FeatureKey::symbolic("FeatureKey", "FEATURE_ONE"),
                FeatureKey::Unresolved,
                FeatureKey::Unresolved,
                FeatureKey::literal("feature-A"),
            ]
        );
        let literal = &sites[3];
        assert_eq!(literal.matched_rule, "getBooleanValue/2");
        assert_eq!(literal.receiver.as_deref(), Some("client"));
        assert_eq!(literal.snippet, "client.getBooleanValue(\"feature-A\", false)");
        let default_span = literal.default_arg_span.unwrap();
        assert_eq!(&source[default_span.start_byte as usize..default_span.end_byte as usize], "false");
    }

    #[test]
    fn call_without_arguments_is_invalid_input() {
        let source = "foo.isEnabled";
        let span = |start: i64, end: i64| SourceSpan {
            start_line: 1,
            start_col: start + 1,
            end_line: 1,
            end_col: end + 1,
            start_byte: start,
            end_byte: end,
        };
        let mut builder = TreeBuilder::new("Broken.java", source);
        let root = builder.push(None, NodeKind::CompilationUnit, span(0, 13)).unwrap();
        let call = builder.push(Some(root), NodeKind::Call, span(0, 13)).unwrap();
        builder.set_name(call, "isEnabled");
        let tree = builder.finish().unwrap();
        let err = extract_call_sites(&tree, &registry(), &ConstantTable::new()).unwrap_err();
        match err {
            AnalysisError::InvalidInput { file, line, column, .. } => {
                assert_eq!(file, "Broken.java");
                assert_eq!((line, column), (1, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unrelated_call_without_arguments_is_skipped() {
        let source = "foo.refresh";
        let span = |start: i64, end: i64| SourceSpan {
            start_line: 1,
            start_col: start + 1,
            end_line: 1,
            end_col: end + 1,
            start_byte: start,
            end_byte: end,
        };
        let mut builder = TreeBuilder::new("Lenient.java", source);
        let root = builder.push(None, NodeKind::CompilationUnit, span(0, 11)).unwrap();
        let call = builder.push(Some(root), NodeKind::Call, span(0, 11)).unwrap();
        builder.set_name(call, "refresh");
        let tree = builder.finish().unwrap();
        let sites = extract_call_sites(&tree, &registry(), &ConstantTable::new()).unwrap();
        assert!(sites.is_empty());
    }

    #[test]
    fn normalized_keys() {
        assert_eq!(FeatureKey::literal("a").normalized(), Some("a"));
        assert_eq!(FeatureKey::symbolic("FeatureKey", "B").normalized(), Some("B"));
        assert_eq!(FeatureKey::Unresolved.normalized(), None);
    }
}
