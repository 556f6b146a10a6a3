//! Raw attribute storage behind a [`Model`](crate::Model): the current and
//! previously committed attribute maps, dot-path reads and writes, and the
//! structural diff used to compute changed paths.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::compare;

/// Top-level attributes. `None` marks a key that was explicitly set to
/// undefined and will be pruned at the end of the next commit.
pub(crate) type Attributes = BTreeMap<String, Option<Value>>;

#[derive(Debug, Clone, Default)]
pub(crate) struct AttributeStore {
    current: Attributes,
    previous: Attributes,
}

impl AttributeStore {
    pub(crate) fn from_map(attributes: Map<String, Value>) -> Self {
        let current: Attributes = attributes
            .into_iter()
            .map(|(key, value)| (key, Some(value)))
            .collect();
        Self {
            previous: current.clone(),
            current,
        }
    }

    pub(crate) fn raw(&self, key: &str) -> Option<&Value> {
        self.current.get(key).and_then(Option::as_ref)
    }

    pub(crate) fn raw_prev(&self, key: &str) -> Option<&Value> {
        self.previous.get(key).and_then(Option::as_ref)
    }

    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.current.contains_key(key)
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &String> {
        self.current.keys()
    }

    /// Writes `value` at a dot-separated path. Intermediate segments that are
    /// missing or not containers become empty objects; a `None` below the top
    /// level removes the leaf key.
    pub(crate) fn write(&mut self, path: &str, value: Option<Value>) {
        let segments: Vec<&str> = path.split('.').collect();
        let (head, rest) = match segments.split_first() {
            Some((head, rest)) if !rest.is_empty() => (*head, rest),
            _ => {
                self.current.insert(path.to_owned(), value);
                return;
            }
        };
        let slot = self.current.entry(head.to_owned()).or_insert(None);
        let mut node = slot.get_or_insert_with(|| Value::Object(Map::new()));
        let (leaf, parents) = match rest.split_last() {
            Some(split) => split,
            None => return,
        };
        for segment in parents {
            node = descend(node, segment);
        }
        write_leaf(node, leaf, value);
    }

    pub(crate) fn snapshot(&mut self) {
        self.previous = self.current.clone();
    }

    pub(crate) fn revert(&mut self) {
        self.current = self.previous.clone();
    }

    pub(crate) fn prune_undefined(&mut self) {
        self.current.retain(|_, value| value.is_some());
    }

    pub(crate) fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .current
            .iter()
            .filter_map(|(key, value)| value.clone().map(|value| (key.clone(), value)))
            .collect();
        Value::Object(map)
    }
}

fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was replaced with an object"),
    }
}

fn descend<'a>(node: &'a mut Value, segment: &str) -> &'a mut Value {
    let index = match node {
        Value::Array(_) => segment.parse::<usize>().ok(),
        _ => None,
    };
    match (index, node) {
        (Some(index), Value::Array(items)) => {
            if index >= items.len() {
                items.resize(index, Value::Null);
                items.push(Value::Object(Map::new()));
            }
            &mut items[index]
        }
        (_, node) => object_mut(node)
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new())),
    }
}

fn write_leaf(node: &mut Value, leaf: &str, value: Option<Value>) {
    if let Value::Array(items) = node {
        if let Ok(index) = leaf.parse::<usize>() {
            match value {
                Some(value) if index < items.len() => items[index] = value,
                Some(value) => {
                    items.resize(index, Value::Null);
                    items.push(value);
                }
                None if index < items.len() => items[index] = Value::Null,
                None => {}
            }
            return;
        }
    }
    let map = object_mut(node);
    match value {
        Some(value) => {
            map.insert(leaf.to_owned(), value);
        }
        None => {
            map.remove(leaf);
        }
    }
}

/// Child of an object by key or of an array by index.
pub(crate) fn child<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    }
}

/// Walks `segments` from `value`, short-circuiting on the first miss.
pub(crate) fn walk<'a, 'p>(
    value: &'a Value,
    segments: impl IntoIterator<Item = &'p str>,
) -> Option<&'a Value> {
    let mut current = value;
    for segment in segments {
        current = child(current, segment)?;
    }
    Some(current)
}

fn container_keys(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(Value::Array(items)) => (0..items.len()).map(|index| index.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn is_container(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Object(_)) | Some(Value::Array(_)))
}

/// Appends the dot paths under `path` whose values differ between `a` and
/// `b`. Child paths are reported before their parent, and the parent is
/// reported once if any child differs.
pub(crate) fn diff_paths(a: Option<&Value>, b: Option<&Value>, path: &str, out: &mut Vec<String>) {
    if !is_container(a) && !is_container(b) {
        if !compare::recursive(a, b) {
            out.push(path.to_owned());
        }
        return;
    }
    let mut keys = container_keys(a);
    for key in container_keys(b) {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    let start = out.len();
    for key in &keys {
        let child_a = a.and_then(|value| child(value, key));
        let child_b = b.and_then(|value| child(value, key));
        diff_paths(child_a, child_b, &format!("{path}.{key}"), out);
    }
    if out.len() > start || !same_container_kind(a, b) {
        out.push(path.to_owned());
    }
}

fn same_container_kind(a: Option<&Value>, b: Option<&Value>) -> bool {
    matches!(
        (a, b),
        (Some(Value::Object(_)), Some(Value::Object(_))) | (Some(Value::Array(_)), Some(Value::Array(_)))
    )
}

/// Truthiness of an attribute value: undefined, `null`, `false`, `0`, and
/// `""` are falsy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(value: Value) -> AttributeStore {
        match value {
            Value::Object(map) => AttributeStore::from_map(map),
            _ => AttributeStore::default(),
        }
    }

    #[test]
    fn test_write_top_level() {
        let mut attrs = AttributeStore::default();
        attrs.write("a", Some(json!(1)));
        assert_eq!(attrs.raw("a"), Some(&json!(1)));
        assert_eq!(attrs.raw_prev("a"), None);
    }

    #[test]
    fn test_write_nested_creates_objects() {
        let mut attrs = AttributeStore::default();
        attrs.write("a.b.c", Some(json!(1)));
        assert_eq!(attrs.to_json(), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_write_nested_replaces_primitive() {
        let mut attrs = store(json!({"a": 5}));
        attrs.write("a.b", Some(json!("x")));
        assert_eq!(attrs.to_json(), json!({"a": {"b": "x"}}));
    }

    #[test]
    fn test_write_nested_into_array() {
        let mut attrs = store(json!({"list": [1, 2]}));
        attrs.write("list.1", Some(json!(9)));
        attrs.write("list.2", Some(json!(3)));
        assert_eq!(attrs.to_json(), json!({"list": [1, 9, 3]}));
    }

    #[test]
    fn test_write_past_array_end_pads_with_null() {
        let mut attrs = store(json!({"list": [1, 2]}));
        attrs.write("list.5", Some(json!(9)));
        assert_eq!(attrs.to_json(), json!({"list": [1, 2, null, null, null, 9]}));
        attrs.write("list.7.name", Some(json!("x")));
        assert_eq!(attrs.raw("list").and_then(|list| list.get(7)), Some(&json!({"name": "x"})));
    }

    #[test]
    fn test_unset_array_index_keeps_array() {
        let mut attrs = store(json!({"list": [1, 2]}));
        attrs.write("list.0", None);
        attrs.write("list.9", None);
        assert_eq!(attrs.to_json(), json!({"list": [null, 2]}));
    }

    #[test]
    fn test_write_nested_undefined_removes_key() {
        let mut attrs = store(json!({"a": {"b": 1, "c": 2}}));
        attrs.write("a.b", None);
        assert_eq!(attrs.to_json(), json!({"a": {"c": 2}}));
    }

    #[test]
    fn test_undefined_top_level_pruned() {
        let mut attrs = store(json!({"a": 1, "b": 2}));
        attrs.write("a", None);
        assert!(attrs.contains_key("a"));
        assert_eq!(attrs.to_json(), json!({"b": 2}));
        attrs.prune_undefined();
        assert!(!attrs.contains_key("a"));
    }

    #[test]
    fn test_snapshot_and_revert() {
        let mut attrs = store(json!({"a": 1}));
        attrs.write("a", Some(json!(2)));
        assert_eq!(attrs.raw_prev("a"), Some(&json!(1)));
        attrs.revert();
        assert_eq!(attrs.raw("a"), Some(&json!(1)));
        attrs.write("a", Some(json!(3)));
        attrs.snapshot();
        assert_eq!(attrs.raw_prev("a"), Some(&json!(3)));
    }

    #[test]
    fn test_walk() {
        let value = json!({"a": {"b": [10, {"c": true}]}});
        assert_eq!(walk(&value, ["a", "b", "0"]), Some(&json!(10)));
        assert_eq!(walk(&value, ["a", "b", "1", "c"]), Some(&json!(true)));
        assert_eq!(walk(&value, ["a", "x", "c"]), None);
        assert_eq!(walk(&value, ["a", "b", "7"]), None);
    }

    #[test]
    fn test_diff_paths_primitives() {
        let mut out = Vec::new();
        diff_paths(Some(&json!(1)), Some(&json!(1)), "a", &mut out);
        assert!(out.is_empty());
        diff_paths(Some(&json!(1)), None, "a", &mut out);
        assert_eq!(out, vec!["a"]);
    }

    #[test]
    fn test_diff_paths_compares_numbers_by_value() {
        let mut out = Vec::new();
        diff_paths(Some(&json!(1)), Some(&json!(1.0)), "a", &mut out);
        diff_paths(Some(&json!({"b": [2]})), Some(&json!({"b": [2.0]})), "c", &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_diff_paths_nested_reports_children_then_parent() {
        let mut out = Vec::new();
        let a = json!({"b": {"c": 1, "d": 2}, "e": 3});
        let b = json!({"b": {"c": 1, "d": 5}, "e": 3});
        diff_paths(Some(&a), Some(&b), "a", &mut out);
        assert_eq!(out, vec!["a.b.d", "a.b", "a"]);
    }

    #[test]
    fn test_diff_paths_added_key() {
        let mut out = Vec::new();
        diff_paths(Some(&json!({"x": 1})), Some(&json!({})), "a", &mut out);
        assert_eq!(out, vec!["a.x", "a"]);
    }

    #[test]
    fn test_diff_paths_array_by_index() {
        let mut out = Vec::new();
        diff_paths(Some(&json!([1, 2, 3])), Some(&json!([1, 2])), "list", &mut out);
        assert_eq!(out, vec!["list.2", "list"]);
    }

    #[test]
    fn test_diff_paths_empty_containers() {
        let mut out = Vec::new();
        diff_paths(Some(&json!({})), Some(&json!({})), "a", &mut out);
        assert!(out.is_empty());
        diff_paths(Some(&json!({})), None, "a", &mut out);
        assert_eq!(out, vec!["a"]);
    }

    #[test]
    fn test_is_truthy() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&json!(null))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(is_truthy(Some(&json!("x"))));
        assert!(is_truthy(Some(&json!(1.5))));
        assert!(is_truthy(Some(&json!([]))));
    }
}
