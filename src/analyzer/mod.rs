//! Analysis entry points: per tree, per forest and per repository.
//!
//! Each file is analyzed independently (call-site extraction, endpoint
//! resolution, linking) against a resolver shared by the whole forest. Files
//! are spread over worker threads and merged in path order, so the result of
//! a run does not depend on scheduling.

pub mod context;
pub mod flags;
pub mod http;
pub mod link;
pub mod routes;
pub mod rules;
pub mod scan;

use crate::config::EngineConfig;
use crate::error::{AnalysisError, AnalysisResult};
use crate::model::AnalysisReport;
use crate::resolve::{ConstantTable, DeclarationResolver};
use crate::syntax::SyntaxTree;
use crate::syntax::java::JavaFrontend;
use crate::util;
use anyhow::{Context, Result};
use context::ContextInfo;
use flags::ConfigCallSite;
use link::FeatureEndpointIndex;
use routes::EndpointDeclaration;
use scan::{ScanOptions, ScannedFile};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation signal, polled between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileAnalysis {
    pub file: String,
    pub call_sites: Vec<ConfigCallSite>,
    pub endpoints: Vec<EndpointDeclaration>,
    #[serde(skip)]
    pub index: FeatureEndpointIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct FileFailure {
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    pub reason: String,
}

impl FileFailure {
    pub fn from_error(file: &str, error: &AnalysisError) -> Self {
        match error {
            AnalysisError::InvalidInput {
                line, column, reason, ..
            } => Self {
                file: file.to_string(),
                line: (*line > 0).then_some(*line),
                column: (*column > 0).then_some(*column),
                reason: reason.clone(),
            },
            other => Self::message(file, other.to_string()),
        }
    }

    pub fn message(file: &str, reason: impl Into<String>) -> Self {
        Self {
            file: file.to_string(),
            line: None,
            column: None,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForestAnalysis {
    /// Successfully analyzed files, sorted by path.
    pub files: Vec<FileAnalysis>,
    pub index: FeatureEndpointIndex,
    pub failures: Vec<FileFailure>,
    pub cancelled: bool,
}

pub struct Analyzer {
    config: EngineConfig,
}

impl Analyzer {
    pub fn new(config: EngineConfig) -> AnalysisResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn analyze_tree(
        &self,
        tree: &SyntaxTree,
        resolver: &dyn DeclarationResolver,
    ) -> AnalysisResult<FileAnalysis> {
        if self.config.strict_syntax {
            if let Some((_, span)) = tree.first_error() {
                return Err(AnalysisError::invalid_at(tree.path(), span, "syntax error"));
            }
        }
        let call_sites = flags::extract_call_sites(tree, &self.config.signatures, resolver)?;
        let endpoints = routes::resolve_endpoints(tree, &self.config.routes, resolver)?;
        let index = FeatureEndpointIndex::link(tree, &call_sites, &endpoints)?;
        debug!(
            file = tree.path(),
            call_sites = call_sites.len(),
            endpoints = endpoints.len(),
            "analyzed file"
        );
        Ok(FileAnalysis {
            file: tree.path().to_string(),
            call_sites,
            endpoints,
            index,
        })
    }

    /// Analyzes `trees` against a [`ConstantTable`] built from all of them.
    pub fn analyze_forest(
        &self,
        trees: &[SyntaxTree],
        cancel: &CancelFlag,
    ) -> AnalysisResult<ForestAnalysis> {
        let table = ConstantTable::from_trees(trees)?;
        self.analyze_forest_with(trees, &table, cancel)
    }

    pub fn analyze_forest_with(
        &self,
        trees: &[SyntaxTree],
        resolver: &dyn DeclarationResolver,
        cancel: &CancelFlag,
    ) -> AnalysisResult<ForestAnalysis> {
        let start = Instant::now();
        let failed = AtomicBool::new(false);
        let fail_fast = self.config.fail_fast;
        let results = run_parallel(
            self.config.threads,
            trees.len(),
            || cancel.is_cancelled() || failed.load(Ordering::SeqCst),
            || (),
            |_, idx| {
                let result = self.analyze_tree(&trees[idx], resolver);
                if result.is_err() && fail_fast {
                    failed.store(true, Ordering::SeqCst);
                }
                result
            },
        );
        let processed = results.len();

        let mut forest = ForestAnalysis::default();
        for (idx, result) in results {
            match result {
                Ok(analysis) => forest.files.push(analysis),
                Err(err) => {
                    if fail_fast {
                        return Err(err);
                    }
                    warn!(file = trees[idx].path(), "skipping file: {err}");
                    forest.failures.push(FileFailure::from_error(trees[idx].path(), &err));
                }
            }
        }
        forest.files.sort_by(|a, b| a.file.cmp(&b.file));
        forest.failures.sort();
        forest.index =
            FeatureEndpointIndex::merge_all(forest.files.iter().map(|file| file.index.clone()));
        forest.cancelled = cancel.is_cancelled() && processed < trees.len();

        info!(
            files = forest.files.len(),
            failed = forest.failures.len(),
            endpoints = forest.index.endpoints.len(),
            features = forest.index.features.len(),
            cancelled = forest.cancelled,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "analysis finished"
        );
        Ok(forest)
    }

    /// Scans, parses and analyzes every Java source under `repo_root`.
    pub fn analyze_paths(
        &self,
        repo_root: &Path,
        options: ScanOptions,
        cancel: &CancelFlag,
    ) -> Result<AnalysisReport> {
        let scanned = scan::scan_repo_with_options(repo_root, options)?;
        info!(root = %repo_root.display(), files = scanned.len(), "scanned repository");
        let parsed = self.parse_files(&scanned, cancel)?;
        let mut forest = self.analyze_forest(&parsed.trees, cancel)?;
        forest.failures.extend(parsed.failures);
        forest.failures.sort();
        forest.cancelled |= parsed.cancelled;
        Ok(AnalysisReport::new(repo_root, &scanned, forest))
    }

    /// Context at `offset` in `rel_path`, resolving constants across the whole
    /// repository.
    pub fn context_in_repo(
        &self,
        repo_root: &Path,
        rel_path: &str,
        offset: i64,
        options: ScanOptions,
    ) -> Result<ContextInfo> {
        let Some(target) = scan::scan_path(repo_root, &repo_root.join(rel_path))? else {
            anyhow::bail!("{rel_path} is not a Java source under {}", repo_root.display());
        };
        let mut scanned = scan::scan_repo_with_options(repo_root, options)?;
        if !scanned.iter().any(|file| file.rel_path == target.rel_path) {
            debug!(file = target.rel_path.as_str(), "context file is ignored by the scan; adding it");
            scanned.push(target.clone());
        }
        let parsed = self.parse_files(&scanned, &CancelFlag::new())?;
        let rel_path = target.rel_path.as_str();
        let Some(tree) = parsed.trees.iter().find(|tree| tree.path() == rel_path) else {
            match parsed.failures.iter().find(|failure| failure.file == rel_path) {
                Some(failure) => anyhow::bail!("{rel_path}: {}", failure.reason),
                None => anyhow::bail!("{rel_path} could not be parsed"),
            }
        };
        let table = ConstantTable::from_trees(&parsed.trees)?;
        let analysis = self.analyze_tree(tree, &table)?;
        Ok(context::resolve_context(&analysis, tree, offset)?)
    }

    fn parse_files(&self, files: &[ScannedFile], cancel: &CancelFlag) -> Result<ParsedFiles> {
        let failed = AtomicBool::new(false);
        let fail_fast = self.config.fail_fast;
        let results = run_parallel(
            self.config.threads,
            files.len(),
            || cancel.is_cancelled() || failed.load(Ordering::SeqCst),
            JavaFrontend::new,
            |frontend, idx| {
                let file = &files[idx];
                let result = match frontend {
                    Ok(frontend) => parse_one(frontend, file),
                    Err(err) => Err(anyhow::anyhow!("java parser unavailable: {err}")),
                };
                if result.is_err() && fail_fast {
                    failed.store(true, Ordering::SeqCst);
                }
                result
            },
        );
        let processed = results.len();

        let mut parsed = ParsedFiles::default();
        for (idx, result) in results {
            match result {
                Ok(tree) => parsed.trees.push(tree),
                Err(err) => {
                    let rel_path = &files[idx].rel_path;
                    if fail_fast {
                        return Err(err.context(format!("parse {rel_path}")));
                    }
                    warn!(file = rel_path.as_str(), "skipping file: {err:#}");
                    let failure = match err.downcast_ref::<AnalysisError>() {
                        Some(analysis_err) => FileFailure::from_error(rel_path, analysis_err),
                        None => FileFailure::message(rel_path, format!("{err:#}")),
                    };
                    parsed.failures.push(failure);
                }
            }
        }
        parsed.cancelled = cancel.is_cancelled() && processed < files.len();
        Ok(parsed)
    }
}

#[derive(Debug, Default)]
struct ParsedFiles {
    trees: Vec<SyntaxTree>,
    failures: Vec<FileFailure>,
    cancelled: bool,
}

fn parse_one(frontend: &mut JavaFrontend, file: &ScannedFile) -> Result<SyntaxTree> {
    let source = util::read_to_string(&file.abs_path)?;
    let tree = frontend
        .parse(&file.rel_path, &source)
        .with_context(|| format!("parse {}", file.rel_path))?;
    Ok(tree)
}

/// Runs `work` for every index in `0..count` on up to `threads` scoped
/// workers. Each worker builds its own state with `init`. Workers stop picking
/// up new items once `should_stop` returns true. Results come back sorted by
/// index; skipped items are absent.
fn run_parallel<S, T, P, I, W>(
    threads: usize,
    count: usize,
    should_stop: P,
    init: I,
    work: W,
) -> Vec<(usize, T)>
where
    T: Send,
    P: Fn() -> bool + Sync,
    I: Fn() -> S + Sync,
    W: Fn(&mut S, usize) -> T + Sync,
{
    let cursor = AtomicUsize::new(0);
    let collected: Mutex<Vec<(usize, T)>> = Mutex::new(Vec::with_capacity(count));
    let workers = threads.clamp(1, count.max(1));
    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                let mut state = init();
                loop {
                    if should_stop() {
                        break;
                    }
                    let idx = cursor.fetch_add(1, Ordering::SeqCst);
                    if idx >= count {
                        break;
                    }
                    let value = work(&mut state, idx);
                    collected
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((idx, value));
                }
            });
        }
    });
    let mut results = collected
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    results.sort_by_key(|(idx, _)| *idx);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_parallel_visits_every_index_once() {
        let results = run_parallel(4, 50, || false, || 0usize, |seen, idx| {
            *seen += 1;
            idx * 2
        });
        assert_eq!(results.len(), 50);
        assert!(results.iter().all(|(idx, value)| *value == idx * 2));
    }

    #[test]
    fn run_parallel_stops_when_asked() {
        let results = run_parallel(2, 10, || true, || (), |_, idx| idx);
        assert!(results.is_empty());
        let none: Vec<(usize, usize)> = run_parallel(3, 0, || false, || (), |_, idx| idx);
        assert!(none.is_empty());
    }

    #[test]
    fn failures_keep_invalid_input_locations() {
        let err = AnalysisError::InvalidInput {
            file: "A.java".to_string(),
            line: 3,
            column: 7,
            reason: "syntax error".to_string(),
        };
        let failure = FileFailure::from_error("A.java", &err);
        assert_eq!((failure.line, failure.column), (Some(3), Some(7)));
        let config = FileFailure::from_error("A.java", &AnalysisError::Config("x".to_string()));
        assert_eq!(config.line, None);
    }
}
