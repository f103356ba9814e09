use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

pub const HTTP_ANY: &str = "ANY";
const PLACEHOLDER_PATTERN: &str = "[^/]+";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
    Trace,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
            HttpMethod::Trace => "TRACE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses `GET`, `"get"` or `RequestMethod.GET`.
pub fn normalize_method(raw: &str) -> Option<HttpMethod> {
    let trimmed = raw.trim().trim_matches('"');
    let last = trimmed.rsplit('.').next().unwrap_or(trimmed).trim();
    if last.is_empty() {
        return None;
    }
    let method = match last.to_ascii_uppercase().as_str() {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "PATCH" => HttpMethod::Patch,
        "DELETE" => HttpMethod::Delete,
        "OPTIONS" => HttpMethod::Options,
        "HEAD" => HttpMethod::Head,
        "TRACE" => HttpMethod::Trace,
        _ => return None,
    };
    Some(method)
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MethodSet {
    Any,
    Only(BTreeSet<HttpMethod>),
}

impl MethodSet {
    pub fn single(method: HttpMethod) -> Self {
        MethodSet::Only(BTreeSet::from([method]))
    }

    /// An empty collection means "unspecified", which is `Any`.
    pub fn from_methods(methods: impl IntoIterator<Item = HttpMethod>) -> Self {
        let set: BTreeSet<HttpMethod> = methods.into_iter().collect();
        if set.is_empty() {
            MethodSet::Any
        } else {
            MethodSet::Only(set)
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, MethodSet::Any)
    }

    pub fn contains(&self, method: HttpMethod) -> bool {
        match self {
            MethodSet::Any => true,
            MethodSet::Only(set) => set.contains(&method),
        }
    }

    pub fn labels(&self) -> Vec<&'static str> {
        match self {
            MethodSet::Any => vec![HTTP_ANY],
            MethodSet::Only(set) => set.iter().map(|method| method.as_str()).collect(),
        }
    }
}

impl Serialize for MethodSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.labels())
    }
}

/// Joins a class-level prefix and a method-level path into one route.
///
/// Both fragments are trimmed, the seam gets exactly one `/`, the result
/// always starts with `/`, repeated separators outside `{..}` placeholders
/// collapse and a trailing `/` is dropped unless the route is the root.
pub fn join_paths(prefix: &str, suffix: &str) -> String {
    let left = prefix.trim().trim_end_matches('/');
    let right = suffix.trim().trim_start_matches('/');
    let joined = match (left.is_empty(), right.is_empty()) {
        (true, true) => return "/".to_string(),
        (false, true) => left.to_string(),
        (true, false) => right.to_string(),
        (false, false) => format!("{left}/{right}"),
    };

    let mut out = String::with_capacity(joined.len() + 1);
    if !joined.starts_with('/') {
        out.push('/');
    }
    let mut depth = 0usize;
    for ch in joined.chars() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '/' if depth == 0 && out.ends_with('/') => continue,
            _ => {}
        }
        out.push(ch);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Rewrites `{placeholder}` segments to `[^/]+` so a route can be matched
/// against concrete request paths.
pub fn route_pattern(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let segment_end = tail.find('/').unwrap_or(tail.len());
        match tail[..segment_end].rfind('}') {
            Some(close) if close > 1 => {
                out.push_str(PLACEHOLDER_PATTERN);
                rest = &tail[close + 1..];
            }
            _ => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
