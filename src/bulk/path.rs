//! Resolution of the JSON paths the server reports in error bodies
//! (`$.args[3].args.sql`) against the request that was sent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static BULK_INDEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\.args\[([0-9]+)\]").expect("valid bulk index pattern"));

/// One step of a JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Index of the failing operation inside a bulk request.
pub fn failed_index(path: &str) -> Option<usize> {
    BULK_INDEX
        .captures(path)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Split a `$`-rooted path into segments. Supports `.key`, `[n]` and `['key']`.
pub fn parse_path(path: &str) -> Option<Vec<PathSegment>> {
    let rest = path.strip_prefix('$')?;
    let mut segments = Vec::new();
    let mut chars = rest.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                let mut key = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '.' || next == '[' {
                        break;
                    }
                    key.push(next);
                    chars.next();
                }
                if key.is_empty() {
                    return None;
                }
                segments.push(PathSegment::Key(key));
            }
            '[' => {
                let mut inner = String::new();
                for next in chars.by_ref() {
                    if next == ']' {
                        break;
                    }
                    inner.push(next);
                }
                let quoted = inner
                    .strip_prefix('\'')
                    .and_then(|s| s.strip_suffix('\''))
                    .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
                match quoted {
                    Some(key) => segments.push(PathSegment::Key(key.to_string())),
                    None => segments.push(PathSegment::Index(inner.trim().parse().ok()?)),
                }
            }
            _ => return None,
        }
    }

    Some(segments)
}

/// Resolve `path` against `value`. Returns `None` if the path is malformed
/// or points outside the value.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    parse_path(path)?
        .iter()
        .try_fold(value, |current, segment| match segment {
            PathSegment::Key(key) => current.get(key.as_str()),
            PathSegment::Index(index) => current.get(*index),
        })
}
