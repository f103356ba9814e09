//! Table-driven description of feature-flag client method shapes.

use crate::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};

pub const ANY_RECEIVER: &str = "*";

const OPENFEATURE_CLIENT: &str = "dev.openfeature.sdk.Client";
const OPENFEATURE_ACCESSORS: &[&str] = &[
    "getBooleanValue",
    "getStringValue",
    "getIntegerValue",
    "getDoubleValue",
    "getObjectValue",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    StringLiteral,
    SymbolicConstant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_receiver_pattern")]
    pub receiver_type_pattern: String,
    pub method_name: String,
    pub parameter_count: usize,
    #[serde(default)]
    pub key_param_index: usize,
    #[serde(default = "default_key_kind")]
    pub key_kind: KeyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_symbolic_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_param_index: Option<usize>,
}

fn default_receiver_pattern() -> String {
    ANY_RECEIVER.to_string()
}

fn default_key_kind() -> KeyKind {
    KeyKind::StringLiteral
}

impl SignatureRule {
    pub fn new(
        method_name: impl Into<String>,
        parameter_count: usize,
        key_param_index: usize,
        key_kind: KeyKind,
    ) -> Self {
        Self {
            name: None,
            receiver_type_pattern: default_receiver_pattern(),
            method_name: method_name.into(),
            parameter_count,
            key_param_index,
            key_kind,
            expected_symbolic_type: None,
            default_param_index: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_receiver(mut self, pattern: impl Into<String>) -> Self {
        self.receiver_type_pattern = pattern.into();
        self
    }

    pub fn with_expected_type(mut self, type_name: impl Into<String>) -> Self {
        self.expected_symbolic_type = Some(type_name.into());
        self
    }

    pub fn with_default_param(mut self, index: usize) -> Self {
        self.default_param_index = Some(index);
        self
    }

    /// Display name used in reports: the configured name, or
    /// `Receiver.method/arity`.
    pub fn label(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|name| !name.trim().is_empty()) {
            return name.to_string();
        }
        let receiver = simple_name(&self.receiver_type_pattern);
        if receiver == ANY_RECEIVER {
            format!("{}/{}", self.method_name, self.parameter_count)
        } else {
            format!("{receiver}.{}/{}", self.method_name, self.parameter_count)
        }
    }

    /// An unknown receiver type never rules a call out.
    pub fn accepts_receiver(&self, receiver_type: Option<&str>) -> bool {
        let pattern = simple_name(&self.receiver_type_pattern);
        let Some(actual) = receiver_type else {
            return true;
        };
        let actual = simple_name(actual);
        if pattern == ANY_RECEIVER {
            return true;
        }
        if let Some(suffix) = pattern.strip_prefix('*') {
            return actual.ends_with(suffix);
        }
        if let Some(prefix) = pattern.strip_suffix('*') {
            return actual.starts_with(prefix);
        }
        actual == pattern
    }

    /// Argument index of the fallback value: configured, or the last argument
    /// when that is not the key.
    pub fn default_index(&self) -> Option<usize> {
        if self.default_param_index.is_some() {
            return self.default_param_index;
        }
        let last = self.parameter_count.checked_sub(1)?;
        (last != self.key_param_index).then_some(last)
    }

    fn validate(&self, position: usize) -> AnalysisResult<()> {
        let invalid = |reason: String| {
            Err(AnalysisError::Config(format!(
                "signature rule {position} ({}): {reason}",
                self.label()
            )))
        };
        if self.method_name.trim().is_empty() {
            return invalid("method_name must not be empty".to_string());
        }
        if self.receiver_type_pattern.trim().is_empty() {
            return invalid("receiver_type_pattern must not be empty".to_string());
        }
        if self.key_param_index >= self.parameter_count {
            return invalid(format!(
                "key_param_index {} is out of range for {} parameters",
                self.key_param_index, self.parameter_count
            ));
        }
        if let Some(index) = self.default_param_index {
            if index >= self.parameter_count || index == self.key_param_index {
                return invalid(format!("default_param_index {index} is invalid"));
            }
        }
        if self.key_kind == KeyKind::StringLiteral && self.expected_symbolic_type.is_some() {
            return invalid("expected_symbolic_type requires key_kind symbolic_constant".to_string());
        }
        Ok(())
    }
}

/// Ordered rule list. A call matches the first rule whose method name and
/// arity agree and whose receiver pattern admits the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureRegistry {
    rules: Vec<SignatureRule>,
}

impl SignatureRegistry {
    pub fn new(rules: Vec<SignatureRule>) -> AnalysisResult<Self> {
        let registry = Self { rules };
        registry.validate()?;
        Ok(registry)
    }

    pub fn rules(&self) -> &[SignatureRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        for (position, rule) in self.rules.iter().enumerate() {
            rule.validate(position)?;
        }
        Ok(())
    }

    pub fn match_call(
        &self,
        method_name: &str,
        arity: usize,
        receiver_type: Option<&str>,
    ) -> Option<&SignatureRule> {
        self.rules.iter().find(|rule| {
            rule.method_name == method_name
                && rule.parameter_count == arity
                && rule.accepts_receiver(receiver_type)
        })
    }

    /// Typed flag accessors of the OpenFeature Java client, with and without
    /// an evaluation context argument.
    pub fn openfeature() -> Self {
        let mut rules = Vec::new();
        for accessor in OPENFEATURE_ACCESSORS {
            for arity in [2, 3] {
                rules.push(
                    SignatureRule::new(*accessor, arity, 0, KeyKind::StringLiteral)
                        .with_receiver(OPENFEATURE_CLIENT)
                        .with_default_param(1),
                );
            }
        }
        Self { rules }
    }
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::openfeature()
    }
}

fn simple_name(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.rsplit('.').next().unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SignatureRegistry {
        SignatureRegistry::new(vec![
            SignatureRule::new("getBooleanValue", 2, 0, KeyKind::StringLiteral),
            SignatureRule::new("getStringValue", 3, 1, KeyKind::StringLiteral),
            SignatureRule::new("isEnabled", 1, 0, KeyKind::SymbolicConstant)
                .with_receiver("FeatureClient")
                .with_expected_type("FeatureKey"),
            SignatureRule::new("isEnabled", 1, 0, KeyKind::StringLiteral),
        ])
        .unwrap()
    }

    #[test]
    fn first_match_by_name_and_arity() {
        let registry = registry();
        let rule = registry.match_call("getStringValue", 3, None).unwrap();
        assert_eq!(rule.key_param_index, 1);
        assert!(registry.match_call("getStringValue", 2, None).is_none());
        assert!(registry.match_call("noMatchingConfigMethod", 1, None).is_none());
    }

    #[test]
    fn known_receiver_types_filter_rules() {
        let registry = registry();
        let typed = registry.match_call("isEnabled", 1, Some("FeatureClient")).unwrap();
        assert_eq!(typed.key_kind, KeyKind::SymbolicConstant);
        let unknown = registry.match_call("isEnabled", 1, None).unwrap();
        assert_eq!(unknown.key_kind, KeyKind::SymbolicConstant);
        let other = registry.match_call("isEnabled", 1, Some("OtherClient")).unwrap();
        assert_eq!(other.key_kind, KeyKind::StringLiteral);
    }

    #[test]
    fn receiver_patterns() {
        let rule = SignatureRule::new("m", 1, 0, KeyKind::StringLiteral).with_receiver("*Client");
        assert!(rule.accepts_receiver(Some("FeatureClient")));
        assert!(!rule.accepts_receiver(Some("Flags")));
        let qualified = SignatureRule::new("m", 1, 0, KeyKind::StringLiteral)
            .with_receiver("dev.openfeature.sdk.Client");
        assert!(qualified.accepts_receiver(Some("Client")));
        assert!(!qualified.accepts_receiver(Some("FeatureClient")));
    }

    #[test]
    fn rejects_out_of_range_key_index() {
        let err = SignatureRegistry::new(vec![SignatureRule::new("m", 1, 1, KeyKind::StringLiteral)])
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
        let err = SignatureRegistry::new(vec![SignatureRule::new(" ", 1, 0, KeyKind::StringLiteral)])
            .unwrap_err();
        assert!(err.to_string().contains("method_name"));
    }

    #[test]
    fn default_argument_index() {
        let rule = SignatureRule::new("getStringValue", 3, 1, KeyKind::StringLiteral);
        assert_eq!(rule.default_index(), Some(2));
        let single = SignatureRule::new("isEnabled", 1, 0, KeyKind::SymbolicConstant);
        assert_eq!(single.default_index(), None);
    }

    #[test]
    fn openfeature_defaults_are_valid() {
        let registry = SignatureRegistry::default();
        registry.validate().unwrap();
        let rule = registry.match_call("getBooleanValue", 2, Some("Client")).unwrap();
        assert_eq!(rule.label(), "Client.getBooleanValue/2");
        assert!(registry.match_call("getBooleanValue", 2, Some("Map")).is_none());
    }

    #[test]
    fn deserializes_from_yaml() {
        let yaml = r#"
- method_name: isEnabled
  parameter_count: 1
  key_kind: symbolic_constant
  expected_symbolic_type: FeatureKey
"#;
        let registry: SignatureRegistry = serde_yaml_ng::from_str(yaml).unwrap();
        registry.validate().unwrap();
        let rule = &registry.rules()[0];
        assert_eq!(rule.receiver_type_pattern, "*");
        assert_eq!(rule.key_param_index, 0);
    }
}
