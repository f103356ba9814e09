//! What the engine knows about one position in a file.

use super::FileAnalysis;
use super::routes::EndpointDeclaration;
use crate::error::{AnalysisError, AnalysisResult};
use crate::navigator;
use crate::syntax::{NodeKind, SyntaxTree};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextInfo {
    pub file: String,
    pub offset: i64,
    pub method_qualname: Option<String>,
    pub feature: Option<String>,
    pub endpoint: Option<EndpointDeclaration>,
    pub methods_in_file: Vec<String>,
    pub features_in_file: Vec<String>,
}

/// Context at byte `offset` of `tree`, using the results of analyzing that
/// same tree.
pub fn resolve_context(
    analysis: &FileAnalysis,
    tree: &SyntaxTree,
    offset: i64,
) -> AnalysisResult<ContextInfo> {
    if analysis.file != tree.path() {
        return Err(AnalysisError::invalid_in(
            tree.path(),
            format!("analysis belongs to {}", analysis.file),
        ));
    }
    if offset < 0 || offset as usize > tree.source().len() {
        return Err(AnalysisError::invalid_in(
            tree.path(),
            format!("offset {offset} is outside the file"),
        ));
    }

    let method = match navigator::node_at_offset(tree, offset)? {
        Some(node) => navigator::containing_declared_method(tree, node)?,
        None => None,
    };
    let method_qualname = match method {
        Some(method) => navigator::method_qualname(tree, method)?,
        None => None,
    };
    let endpoint = method.and_then(|method| {
        analysis
            .endpoints
            .iter()
            .find(|endpoint| endpoint.method == method)
            .cloned()
    });
    let feature = analysis
        .call_sites
        .iter()
        .filter(|site| site.call_span.contains_byte(offset))
        .min_by_key(|site| site.call_span.len())
        .and_then(|site| site.key.normalized())
        .map(|key| key.to_string());

    let mut methods = BTreeSet::new();
    for idx in 0..tree.len() {
        let node = crate::syntax::NodeId(idx as u32);
        if !matches!(tree.kind(node)?, NodeKind::Method | NodeKind::Constructor) {
            continue;
        }
        if let Some(declared) = navigator::containing_declared_method(tree, node)? {
            if let Some(name) = navigator::method_qualname(tree, declared)? {
                methods.insert(name);
            }
        }
    }
    let features: BTreeSet<String> = analysis
        .call_sites
        .iter()
        .filter_map(|site| site.key.normalized())
        .map(|key| key.to_string())
        .collect();

    Ok(ContextInfo {
        file: tree.path().to_string(),
        offset,
        method_qualname,
        feature,
        endpoint,
        methods_in_file: methods.into_iter().collect(),
        features_in_file: features.into_iter().collect(),
    })
}
