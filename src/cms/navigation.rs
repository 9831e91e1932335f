//! Shaping of navigation menu items.
//!
//! Menu items are stored as a list (or keyed map) of objects carrying an `id`,
//! an `order` and a `parentIndex` pointing at the `id` of their parent. Items
//! whose `parentIndex` is missing, `0` or names no existing item are roots.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::cms::projector::pluck_entry;

/// How [`shape_items`] returns menu items.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MenuStructure {
    /// All items in one list, sorted by `order`.
    #[default]
    Flat,
    /// Root items sorted by `order`, each with a `children` list.
    Nested,
}

/// Sorts items by `order` and optionally nests them. When `fields` is given
/// every item is projected; nested items keep their `children` list.
pub fn shape_items(items: &Value, structure: MenuStructure, fields: Option<&[String]>) -> Value {
    let items = sorted_items(items);
    match structure {
        MenuStructure::Flat => Value::Array(
            items
                .into_iter()
                .map(|item| project_item(item, fields))
                .collect(),
        ),
        MenuStructure::Nested => Value::Array(nest(&items, fields)),
    }
}

fn sorted_items(items: &Value) -> Vec<&Value> {
    let mut items: Vec<&Value> = match items {
        Value::Array(entries) => entries.iter().filter(|item| item.is_object()).collect(),
        Value::Object(entries) => entries.values().filter(|item| item.is_object()).collect(),
        _ => Vec::new(),
    };
    // Stable sort keeps the stored order for items without an `order`.
    items.sort_by(|left, right| compare_order(left.get("order"), right.get("order")));
    items
}

fn compare_order(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let rank = |value: Option<&Value>| value.and_then(Value::as_f64);
    match (rank(left), rank(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn nest(items: &[&Value], fields: Option<&[String]>) -> Vec<Value> {
    let ids: HashSet<String> = items.iter().filter_map(|item| item_id(item)).collect();
    let mut placed = vec![false; items.len()];
    let mut roots = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let is_root = match parent_id(item) {
            None => true,
            Some(parent) => !ids.contains(&parent),
        };
        if is_root && !placed[index] {
            roots.push(build_node(items, index, &mut placed, fields));
        }
    }
    // Items caught in a parent cycle are never reached from a root.
    for index in 0..items.len() {
        if !placed[index] {
            roots.push(build_node(items, index, &mut placed, fields));
        }
    }
    roots
}

fn build_node(
    items: &[&Value],
    index: usize,
    placed: &mut [bool],
    fields: Option<&[String]>,
) -> Value {
    placed[index] = true;
    let id = item_id(items[index]);

    let mut children = Vec::new();
    if let Some(id) = id {
        for (child_index, child) in items.iter().enumerate() {
            if !placed[child_index] && parent_id(child).as_deref() == Some(id.as_str()) {
                children.push(build_node(items, child_index, placed, fields));
            }
        }
    }

    let mut node = match project_item(items[index], fields) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    node.insert("children".to_string(), Value::Array(children));
    Value::Object(node)
}

fn project_item(item: &Value, fields: Option<&[String]>) -> Value {
    match fields {
        Some(fields) => pluck_entry(item, fields),
        None => item.clone(),
    }
}

fn item_id(item: &Value) -> Option<String> {
    link_key(item.get("id")?)
}

fn parent_id(item: &Value) -> Option<String> {
    link_key(item.get("parentIndex")?).filter(|parent| parent != "0")
}

fn link_key(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}
