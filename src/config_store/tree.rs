use toml::Value;

/// A nested configuration tree.
///
/// Leaves are TOML scalars or arrays, inner nodes are tables.
pub type Tree = toml::Table;

/// Deep merges `incoming` into `base` and returns the result.
///
/// Two tables at the same key are merged recursively. Anything else at a
/// conflicting key is replaced outright by the incoming value, so a scalar can
/// replace a table and the other way around. Later merges win.
pub fn merge(mut base: Tree, incoming: Tree) -> Tree {
    merge_into(&mut base, incoming);
    base
}

pub(super) fn merge_into(base: &mut Tree, incoming: Tree) {
    for (key, value) in incoming {
        match value {
            Value::Table(table) => match base.get_mut(&key) {
                Some(Value::Table(existing)) => merge_into(existing, table),
                _ => {
                    base.insert(key, Value::Table(table));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}

/// Lowercases every key in the tree, including tables nested in arrays.
///
/// Keys that collide after lowercasing are merged in iteration order.
pub(super) fn lowercase_keys(tree: Tree) -> Tree {
    let mut normalized = Tree::new();

    for (key, value) in tree {
        let mut single = Tree::new();
        single.insert(key.to_lowercase(), lowercase_value(value));
        merge_into(&mut normalized, single);
    }

    normalized
}

fn lowercase_value(value: Value) -> Value {
    match value {
        Value::Table(table) => Value::Table(lowercase_keys(table)),
        Value::Array(items) => Value::Array(items.into_iter().map(lowercase_value).collect()),
        value => value,
    }
}

/// Collects the delimiter-joined paths `incoming` changes when merged into
/// `base`.
///
/// A path is reported at the deepest point where the incoming value replaces
/// what is there. An empty table merged into an existing table changes
/// nothing, while an empty table replacing a scalar or filling a missing key
/// is reported as a change.
pub(super) fn changed_paths(base: &Tree, incoming: &Tree, delimiter: &str) -> Vec<String> {
    let mut paths = Vec::new();
    collect_changed_paths(Some(base), incoming, "", delimiter, &mut paths);
    paths
}

fn collect_changed_paths(
    base: Option<&Tree>,
    incoming: &Tree,
    prefix: &str,
    delimiter: &str,
    paths: &mut Vec<String>,
) {
    for (key, value) in incoming {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{delimiter}{key}")
        };

        match (value, base.and_then(|base| base.get(key))) {
            (Value::Table(table), Some(Value::Table(existing))) => {
                collect_changed_paths(Some(existing), table, &path, delimiter, paths);
            }
            (Value::Table(table), _) if !table.is_empty() => {
                collect_changed_paths(None, table, &path, delimiter, paths);
            }
            _ => paths.push(path),
        }
    }
}
