use crate::analyzer::link::FeatureEndpointIndex;
use crate::analyzer::scan::ScannedFile;
use crate::analyzer::{FileFailure, ForestAnalysis};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Serialize, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub files_scanned: usize,
    pub files_analyzed: usize,
    pub files_failed: usize,
    pub call_sites: usize,
    pub endpoints: usize,
    pub features: usize,
    pub ungated: usize,
    pub unresolved: usize,
    pub uncategorized: usize,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub call_sites: usize,
    pub endpoints: usize,
}

#[derive(Debug, Serialize, Clone)]
pub struct AnalysisReport {
    pub root: String,
    pub summary: ReportSummary,
    pub files: Vec<FileEntry>,
    pub failures: Vec<FileFailure>,
    #[serde(flatten)]
    pub index: FeatureEndpointIndex,
    pub cancelled: bool,
}

impl AnalysisReport {
    pub fn new(repo_root: &Path, scanned: &[ScannedFile], forest: ForestAnalysis) -> Self {
        let hashes: BTreeMap<&str, &str> = scanned
            .iter()
            .map(|file| (file.rel_path.as_str(), file.hash.as_str()))
            .collect();
        let files: Vec<FileEntry> = forest
            .files
            .iter()
            .map(|analysis| FileEntry {
                path: analysis.file.clone(),
                hash: hashes.get(analysis.file.as_str()).map(|hash| hash.to_string()),
                call_sites: analysis.call_sites.len(),
                endpoints: analysis.endpoints.len(),
            })
            .collect();
        let summary = ReportSummary {
            files_scanned: scanned.len(),
            files_analyzed: files.len(),
            files_failed: forest.failures.len(),
            call_sites: files.iter().map(|file| file.call_sites).sum(),
            endpoints: forest.index.endpoints.len(),
            features: forest.index.features.len(),
            ungated: forest.index.ungated_endpoints().len(),
            unresolved: forest.index.unresolved.len(),
            uncategorized: forest.index.uncategorized.len(),
        };
        Self {
            root: repo_root.display().to_string(),
            summary,
            files,
            failures: forest.failures,
            index: forest.index,
            cancelled: forest.cancelled,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize report as json")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).context("serialize report as yaml")
    }
}
