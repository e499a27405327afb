use toml::Value;

use super::Tree;

/// Splits a path into lowercase segments, ignoring empty ones.
///
/// `"Server..Port"` and `"server.port"` both yield `["server", "port"]`.
pub(super) fn segments(path: &str, delimiter: &str) -> Vec<String> {
    path.split(delimiter)
        .filter(|segment| !segment.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Normalizes a path to its canonical lowercase, delimiter-joined form.
pub(super) fn normalize(path: &str, delimiter: &str) -> String {
    segments(path, delimiter).join(delimiter)
}

/// Checks if a changed path and a subscription pattern overlap.
///
/// They overlap when one is a segment prefix of the other: a subscription to
/// `"server"` sees a change at `"server.port"`, and a subscription to
/// `"server.port"` sees the whole `"server"` table being replaced.
///
/// # Arguments
/// * `path` - The changed configuration path
/// * `pattern` - The subscribed path (supports "*" as a single-segment wildcard)
///
/// # Examples
/// * `"server.port"` matches `"server"`
/// * `"server.port"` matches `"server.*"`
/// * `"server.port"` matches `"*"`
/// * `"server.port"` does not match `"client"`
pub(super) fn path_matches(path: &str, pattern: &str, delimiter: &str) -> bool {
    const WILDCARD: &str = "*";

    if pattern == WILDCARD {
        return true;
    };

    let path_parts = path.split(delimiter);
    let pattern_parts = pattern.split(delimiter);

    for (path_part, pattern_part) in path_parts.zip(pattern_parts) {
        if pattern_part == WILDCARD {
            continue;
        }

        if path_part != pattern_part {
            return false;
        }
    }

    true
}

/// Navigates through the tree following a delimiter-separated path.
///
/// Segments are matched case-insensitively against the (already lowercase)
/// tree keys. Numeric segments index into arrays. An empty path resolves to
/// the whole tree.
///
/// Returns `None` when any segment is missing; a missing key is not an error.
pub(super) fn navigate_path(tree: &Tree, path: &str, delimiter: &str) -> Option<Value> {
    let parts = segments(path, delimiter);

    let Some((first, rest)) = parts.split_first() else {
        return Some(Value::Table(tree.clone()));
    };

    let mut current = tree.get(first)?;

    for part in rest {
        current = match current {
            Value::Table(table) => table.get(part)?,
            Value::Array(array) => array.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current.clone())
}
