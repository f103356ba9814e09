//! Joins feature-flag call sites to the endpoints whose handlers contain them.

use super::flags::ConfigCallSite;
use super::routes::EndpointDeclaration;
use crate::error::{AnalysisError, AnalysisResult};
use crate::navigator;
use crate::syntax::{NodeId, SyntaxTree};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LinkedCall {
    pub call: ConfigCallSite,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointDeclaration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureEndpointIndex {
    pub features: BTreeMap<String, BTreeSet<EndpointDeclaration>>,
    pub unresolved: Vec<LinkedCall>,
    pub uncategorized: Vec<ConfigCallSite>,
    pub endpoints: Vec<EndpointDeclaration>,
}

impl FeatureEndpointIndex {
    /// Links the call sites and endpoints of one file.
    pub fn link(
        tree: &SyntaxTree,
        call_sites: &[ConfigCallSite],
        endpoints: &[EndpointDeclaration],
    ) -> AnalysisResult<Self> {
        let by_method: HashMap<NodeId, &EndpointDeclaration> = endpoints
            .iter()
            .filter(|endpoint| endpoint.handler.file == tree.path())
            .map(|endpoint| (endpoint.method, endpoint))
            .collect();

        let mut index = Self {
            endpoints: endpoints.to_vec(),
            ..Self::default()
        };
        for site in call_sites {
            if site.file != tree.path() {
                return Err(AnalysisError::invalid_at(
                    tree.path(),
                    site.call_span,
                    format!("call site belongs to {}", site.file),
                ));
            }
            let owner = navigator::enclosing_declared_method(tree, site.call)?;
            let endpoint = owner.and_then(|method| by_method.get(&method).copied());
            match (endpoint, site.key.normalized()) {
                (Some(endpoint), Some(key)) => {
                    index
                        .features
                        .entry(key.to_string())
                        .or_default()
                        .insert(endpoint.clone());
                }
                (Some(endpoint), None) => index.unresolved.push(LinkedCall {
                    call: site.clone(),
                    endpoint: Some(endpoint.clone()),
                }),
                (None, key) => {
                    if key.is_none() {
                        index.unresolved.push(LinkedCall {
                            call: site.clone(),
                            endpoint: None,
                        });
                    }
                    index.uncategorized.push(site.clone());
                }
            }
        }
        Ok(index)
    }

    /// Union of features, concatenation of lists; lists end up sorted so the
    /// result does not depend on merge order.
    pub fn merge(&mut self, other: FeatureEndpointIndex) {
        self.absorb(other);
        self.sort_lists();
    }

    /// Merges many per-file indexes, sorting the combined lists once.
    pub fn merge_all(indexes: impl IntoIterator<Item = FeatureEndpointIndex>) -> Self {
        let mut merged = Self::default();
        for index in indexes {
            merged.absorb(index);
        }
        merged.sort_lists();
        merged
    }

    fn absorb(&mut self, other: FeatureEndpointIndex) {
        for (key, endpoints) in other.features {
            self.features.entry(key).or_default().extend(endpoints);
        }
        self.unresolved.extend(other.unresolved);
        self.uncategorized.extend(other.uncategorized);
        self.endpoints.extend(other.endpoints);
    }

    fn sort_lists(&mut self) {
        self.unresolved.sort();
        self.uncategorized.sort();
        self.endpoints.sort();
    }

    pub fn endpoints_for(&self, feature: &str) -> Vec<&EndpointDeclaration> {
        self.features
            .get(feature)
            .map(|set| set.iter().collect())
            .unwrap_or_default()
    }

    /// Feature keys linked to the handler with the given qualified name.
    pub fn features_for_handler(&self, qualname: &str) -> Vec<&str> {
        self.features
            .iter()
            .filter(|(_, endpoints)| {
                endpoints
                    .iter()
                    .any(|endpoint| endpoint.handler.qualname == qualname)
            })
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Flag calls with an unresolved key inside the handler with the given
    /// qualified name.
    pub fn unresolved_for_handler(&self, qualname: &str) -> Vec<&ConfigCallSite> {
        self.unresolved
            .iter()
            .filter(|linked| {
                linked
                    .endpoint
                    .as_ref()
                    .is_some_and(|endpoint| endpoint.handler.qualname == qualname)
            })
            .map(|linked| &linked.call)
            .collect()
    }

    /// Endpoints with no flag call at all, resolved or not.
    pub fn ungated_endpoints(&self) -> Vec<&EndpointDeclaration> {
        let mut gated: BTreeSet<&EndpointDeclaration> = self.features.values().flatten().collect();
        gated.extend(self.unresolved.iter().filter_map(|linked| linked.endpoint.as_ref()));
        self.endpoints
            .iter()
            .filter(|endpoint| !gated.contains(endpoint))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::flags::{extract_call_sites, FeatureKey};
    use crate::analyzer::routes::{resolve_endpoints, RouteRegistry};
    use crate::analyzer::rules::{KeyKind, SignatureRegistry, SignatureRule};
    use crate::resolve::ConstantTable;
    use crate::syntax::java::JavaFrontend;

    const SOURCE: &str = r#"
package com.example;

@RestController
class Flags {
    @GetMapping("/gated")
    String gated() {
        client.getBooleanValue("feature-A", false);
        new Thread(new Runnable() {
            public void run() {
                client.getBooleanValue("feature-B", false);
            }
        }).start();
        client.getBooleanValue(System.getenv("KEY"), false);
        return "";
    }

    @GetMapping("/open")
    String open() { return ""; }

    @GetMapping("/dynamic")
    String dynamic() {
        client.getBooleanValue(System.getenv("FLAG"), false);
        return "";
    }

    void helper() {
        client.getBooleanValue("feature-A", false);
        client.getBooleanValue(name, true);
    }
}
"#;

    fn index_for(source: &str, path: &str) -> FeatureEndpointIndex {
        let tree = JavaFrontend::new().unwrap().parse(path, source).unwrap();
        let registry = SignatureRegistry::new(vec![SignatureRule::new(
            "getBooleanValue",
            2,
            0,
            KeyKind::StringLiteral,
        )])
        .unwrap();
        let table = ConstantTable::new();
        let sites = extract_call_sites(&tree, &registry, &table).unwrap();
        let endpoints = resolve_endpoints(&tree, &RouteRegistry::spring(), &table).unwrap();
        FeatureEndpointIndex::link(&tree, &sites, &endpoints).unwrap()
    }

    #[test]
    fn links_calls_to_enclosing_endpoints() {
        let index = index_for(SOURCE, "Flags.java");
        assert_eq!(index.endpoints.len(), 3);
        let keys: Vec<_> = index.features.keys().cloned().collect();
        assert_eq!(keys, vec!["feature-A", "feature-B"]);
        let gated = index.endpoints_for("feature-B");
        assert_eq!(gated.len(), 1);
        assert_eq!(gated[0].handler.qualname, "com.example.Flags.gated");

        assert_eq!(index.uncategorized.len(), 2);
        assert_eq!(index.uncategorized[0].key, FeatureKey::literal("feature-A"));

        assert_eq!(index.unresolved.len(), 3);
        assert!(index.unresolved[0].endpoint.is_some());
        assert!(index.unresolved[1].endpoint.is_some());
        assert!(index.unresolved[2].endpoint.is_none());

        let open: Vec<_> = index
            .ungated_endpoints()
            .into_iter()
            .map(|endpoint| endpoint.handler.name.clone())
            .collect();
        assert_eq!(open, vec!["open"]);
        assert_eq!(index.features_for_handler("com.example.Flags.gated"), vec!["feature-A", "feature-B"]);
    }

    #[test]
    fn endpoints_gated_only_by_dynamic_keys_are_not_ungated() {
        let index = index_for(SOURCE, "Flags.java");
        assert!(index.features_for_handler("com.example.Flags.dynamic").is_empty());
        let dynamic = index.unresolved_for_handler("com.example.Flags.dynamic");
        assert_eq!(dynamic.len(), 1);
        assert_eq!(dynamic[0].key, FeatureKey::Unresolved);
        assert!(
            index
                .ungated_endpoints()
                .iter()
                .all(|endpoint| endpoint.handler.name != "dynamic")
        );
    }

    #[test]
    fn merge_is_order_independent() {
        let a = index_for(SOURCE, "a/Flags.java");
        let b = index_for(SOURCE, "b/Flags.java");
        let mut left = FeatureEndpointIndex::default();
        left.merge(a.clone());
        left.merge(b.clone());
        let mut right = FeatureEndpointIndex::default();
        right.merge(b);
        right.merge(a);
        assert_eq!(left, right);
        assert_eq!(left.endpoints_for("feature-A").len(), 2);
    }

    #[test]
    fn merge_all_matches_pairwise_merges() {
        let a = index_for(SOURCE, "a/Flags.java");
        let b = index_for(SOURCE, "b/Flags.java");
        let c = index_for(SOURCE, "c/Flags.java");
        let mut pairwise = FeatureEndpointIndex::default();
        pairwise.merge(a.clone());
        pairwise.merge(b.clone());
        pairwise.merge(c.clone());
        assert_eq!(FeatureEndpointIndex::merge_all([c, a, b]), pairwise);
        assert_eq!(FeatureEndpointIndex::merge_all([]), FeatureEndpointIndex::default());
    }
}
