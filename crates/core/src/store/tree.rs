//! Navigation of JSON trees by dataset path
//!
//! Objects are groups, every other value is a dataset. Empty path segments
//! are ignored, so `a//b/` addresses the same node as `a/b`.

use serde_json::{Map, Value};

use super::{StoreError, StoreResult};

pub fn segments(subpath: &str) -> impl Iterator<Item = &str> {
    subpath.split('/').filter(|segment| !segment.is_empty())
}

/// Find the node at `subpath`. The empty path is the root itself.
pub fn lookup<'a>(tree: &'a Value, subpath: &str) -> Option<&'a Value> {
    segments(subpath).try_fold(tree, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// Store `value` at `subpath`, creating intermediate groups
pub fn insert(tree: &mut Value, subpath: &str, value: Value) -> StoreResult<()> {
    let parts: Vec<&str> = segments(subpath).collect();
    let Some((last, groups)) = parts.split_last() else {
        return Err(StoreError::InvalidPath(subpath.to_string()));
    };

    if tree.is_null() {
        *tree = Value::Object(Map::new());
    }

    let mut node = tree;
    let mut walked = String::new();
    for group in groups {
        if !walked.is_empty() {
            walked.push('/');
        }
        walked.push_str(group);
        let Value::Object(map) = node else {
            return Err(StoreError::NotAGroup { path: walked });
        };
        node = map
            .entry(group.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    match node {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        _ => Err(StoreError::NotAGroup {
            path: if walked.is_empty() { "/".to_string() } else { walked },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup() {
        let tree = json!({"data": {"raw": 7, "list": [1, 2]}});
        assert_eq!(lookup(&tree, "data/raw"), Some(&json!(7)));
        assert_eq!(lookup(&tree, "/data//raw/"), Some(&json!(7)));
        assert_eq!(lookup(&tree, "data/missing"), None);
        assert_eq!(lookup(&tree, "data/raw/deeper"), None);
        assert_eq!(lookup(&tree, ""), Some(&tree));
    }

    #[test]
    fn test_insert_creates_groups() {
        let mut tree = Value::Null;
        insert(&mut tree, "a/b/c", json!(1)).unwrap();
        insert(&mut tree, "a/d", json!("x")).unwrap();
        assert_eq!(tree, json!({"a": {"b": {"c": 1}, "d": "x"}}));
    }

    #[test]
    fn test_insert_replaces_existing_dataset() {
        let mut tree = json!({"x": 1});
        insert(&mut tree, "x", json!(2)).unwrap();
        assert_eq!(tree, json!({"x": 2}));
    }

    #[test]
    fn test_insert_through_dataset_fails() {
        let mut tree = json!({"a": 5});
        let err = insert(&mut tree, "a/b", json!(1)).unwrap_err();
        assert!(matches!(err, StoreError::NotAGroup { path } if path == "a"));
        assert!(matches!(
            insert(&mut tree, "//", json!(1)),
            Err(StoreError::InvalidPath(_))
        ));
    }
}
