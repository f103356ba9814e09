use anyhow::{Context, Result};
use blake3::Hasher;
use ignore::WalkBuilder;
use serde::Serialize;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const SOURCE_EXTENSIONS: &[&str] = &["java"];
const SKIPPED_DIRS: &[&str] = &[".git", "target", "build", ".gradle", ".idea"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedFile {
    pub rel_path: String,
    #[serde(skip)]
    pub abs_path: PathBuf,
    pub hash: String,
    pub size: i64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub no_ignore: bool,
}

impl ScanOptions {
    pub fn new(no_ignore: bool) -> Self {
        Self { no_ignore }
    }
}

pub fn scan_repo(repo_root: &Path) -> Result<Vec<ScannedFile>> {
    scan_repo_with_options(repo_root, ScanOptions::default())
}

/// Java sources under `repo_root`, sorted by relative path.
pub fn scan_repo_with_options(repo_root: &Path, options: ScanOptions) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(repo_root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    let walker = builder
        .hidden(false)
        .filter_entry(|entry| !is_skipped_entry(entry))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if !is_java_source(path) {
            continue;
        }
        files.push(scanned(repo_root, path)?);
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// A single file, or `None` when it is not a Java source under the root.
pub fn scan_path(repo_root: &Path, path: &Path) -> Result<Option<ScannedFile>> {
    if !path.is_file() || !is_java_source(path) {
        return Ok(None);
    }
    if !path.starts_with(repo_root) {
        return Ok(None);
    }
    scanned(repo_root, path).map(Some)
}

pub fn is_java_source(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

fn scanned(repo_root: &Path, path: &Path) -> Result<ScannedFile> {
    let rel_path = crate::util::normalize_rel_path(repo_root, path)?;
    let metadata = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    let hash = hash_file(path).with_context(|| format!("hash {}", path.display()))?;
    Ok(ScannedFile {
        rel_path,
        abs_path: path.to_path_buf(),
        hash,
        size: metadata.len() as i64,
    })
}

fn is_skipped_entry(entry: &ignore::DirEntry) -> bool {
    let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());
    is_dir
        && SKIPPED_DIRS
            .iter()
            .any(|name| entry.file_name() == OsStr::new(name))
}

fn hash_file(path: &Path) -> Result<String> {
    let data = fs::read(path)?;
    let mut hasher = Hasher::new();
    hasher.update(&data);
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_java_sources_and_honors_gitignore() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/main/java")).unwrap();
        fs::create_dir_all(root.join("generated")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::write(root.join("src/main/java/B.java"), "class B {}").unwrap();
        fs::write(root.join("src/main/java/A.java"), "class A {}").unwrap();
        fs::write(root.join("src/main/java/notes.md"), "# notes").unwrap();
        fs::write(root.join("generated/G.java"), "class G {}").unwrap();
        fs::write(root.join("target/T.java"), "class T {}").unwrap();
        fs::write(root.join(".gitignore"), "generated/\n").unwrap();

        let files = scan_repo(root).unwrap();
        let paths: Vec<_> = files.iter().map(|file| file.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["src/main/java/A.java", "src/main/java/B.java"]);
        assert_eq!(files[0].hash.len(), 64);
        assert_eq!(files[0].size, 10);

        let all = scan_repo_with_options(root, ScanOptions::new(true)).unwrap();
        let paths: Vec<_> = all.iter().map(|file| file.rel_path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["generated/G.java", "src/main/java/A.java", "src/main/java/B.java"]
        );
    }

    #[test]
    fn scan_path_filters_non_java_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("A.java"), "class A {}").unwrap();
        fs::write(root.join("a.txt"), "text").unwrap();
        assert!(scan_path(root, &root.join("A.java")).unwrap().is_some());
        assert!(scan_path(root, &root.join("a.txt")).unwrap().is_none());
        assert!(scan_path(root, &root.join("missing.java")).unwrap().is_none());
    }
}
