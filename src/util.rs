use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path};

const SNIPPET_MAX_BYTES: usize = 200;

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

pub fn normalize_rel_path(repo_root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(repo_root).with_context(|| {
        format!(
            "strip prefix {} from {}",
            repo_root.display(),
            path.display()
        )
    })?;
    Ok(normalize_path(rel))
}

pub fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::CurDir => {}
            _ => {}
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

pub fn truncate_str_bytes(value: &str, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value.to_string();
    }
    let mut end = max_bytes.min(value.len());
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Source text of a byte range with whitespace runs collapsed, capped for
/// reports.
pub fn evidence_snippet(source: &str, start_byte: i64, end_byte: i64) -> String {
    if start_byte < 0 || end_byte <= start_byte {
        return String::new();
    }
    let end = (end_byte as usize).min(source.len());
    let Some(raw) = source.get(start_byte as usize..end) else {
        return String::new();
    };

    let mut out = String::new();
    let mut last_space = false;
    for ch in raw.chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    truncate_str_bytes(out.trim(), SNIPPET_MAX_BYTES)
}

/// Byte offset of a 1-based line and column.
pub fn offset_of(source: &str, line: usize, column: usize) -> Option<usize> {
    if line == 0 || column == 0 {
        return None;
    }
    let mut offset = 0usize;
    for (idx, text) in source.split_inclusive('\n').enumerate() {
        if idx + 1 == line {
            let col = column - 1;
            return (col <= text.len()).then_some(offset + col);
        }
        offset += text.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippets_collapse_whitespace() {
        let source = "client.getBooleanValue(\n        \"a\",\n        false)";
        assert_eq!(
            evidence_snippet(source, 0, source.len() as i64),
            "client.getBooleanValue( \"a\", false)"
        );
        assert_eq!(evidence_snippet(source, 5, 2), "");
    }

    #[test]
    fn offsets_from_line_and_column() {
        let source = "ab\ncd\n";
        assert_eq!(offset_of(source, 1, 1), Some(0));
        assert_eq!(offset_of(source, 2, 2), Some(4));
        assert_eq!(offset_of(source, 9, 1), None);
    }

    #[test]
    fn normalizes_relative_paths() {
        let root = Path::new("/repo");
        let rel = normalize_rel_path(root, Path::new("/repo/./src/Main.java")).unwrap();
        assert_eq!(rel, "src/Main.java");
    }
}
