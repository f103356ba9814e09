// Engine configuration: rule registries from a YAML/JSON file plus
// environment overrides for run settings.

use crate::analyzer::routes::RouteRegistry;
use crate::analyzer::rules::SignatureRegistry;
use crate::error::{AnalysisError, AnalysisResult};
use crate::util;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

pub const ENV_THREADS: &str = "FLAGMAP_THREADS";
pub const ENV_STRICT_SYNTAX: &str = "FLAGMAP_STRICT_SYNTAX";
pub const ENV_FAIL_FAST: &str = "FLAGMAP_FAIL_FAST";

const MAX_DEFAULT_THREADS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Feature-flag client method shapes, matched in order.
    pub signatures: SignatureRegistry,
    /// Routing annotations and the controller marker.
    pub routes: RouteRegistry,
    /// Worker threads for per-file analysis (FLAGMAP_THREADS)
    pub threads: usize,
    /// Refuse files containing parse errors (FLAGMAP_STRICT_SYNTAX)
    pub strict_syntax: bool,
    /// Abort the run on the first failing file (FLAGMAP_FAIL_FAST)
    pub fail_fast: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signatures: SignatureRegistry::default(),
            routes: RouteRegistry::default(),
            threads: default_threads(),
            strict_syntax: true,
            fail_fast: false,
        }
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
        .clamp(1, MAX_DEFAULT_THREADS)
}

impl EngineConfig {
    /// Parses YAML or JSON; missing sections keep their defaults.
    pub fn parse(raw: &str) -> Result<Self> {
        let config: EngineConfig = if raw.trim().is_empty() {
            EngineConfig::default()
        } else {
            serde_yaml_ng::from_str(raw).context("parse engine config")?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = util::read_to_string(path)?;
        Self::parse(&raw).with_context(|| format!("load config {}", path.display()))
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        self.signatures.validate()?;
        self.routes.validate()?;
        if self.threads == 0 {
            return Err(AnalysisError::Config("threads must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).context("serialize engine config")
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Invalid values are reported and the
    /// current setting is kept.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup(ENV_THREADS) {
            match val.trim().parse::<usize>() {
                Ok(parsed) if parsed > 0 => self.threads = parsed,
                _ => warn!(
                    "invalid {ENV_THREADS} value: {val}, using: {}",
                    self.threads
                ),
            }
        }
        if let Some(val) = lookup(ENV_STRICT_SYNTAX) {
            override_flag(ENV_STRICT_SYNTAX, &val, &mut self.strict_syntax);
        }
        if let Some(val) = lookup(ENV_FAIL_FAST) {
            override_flag(ENV_FAIL_FAST, &val, &mut self.fail_fast);
        }
    }
}

fn override_flag(name: &str, val: &str, target: &mut bool) {
    match parse_flag(val) {
        Some(parsed) => *target = parsed,
        None => warn!("invalid {name} value: {val}, using: {target}"),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => bool::from_str(other).ok(),
    }
}
