//! Paths into raw JSON values

use std::fmt;

use serde_json::{Map, Value};

/// One step of a path into a JSON value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object property
    Key(String),
    /// Array position
    Index(usize),
}

impl PathSegment {
    /// The key name, if this segment addresses an object property
    pub fn as_key(&self) -> Option<&str> {
        match self {
            PathSegment::Key(key) => Some(key),
            PathSegment::Index(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{}", key),
            PathSegment::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Write `value` at `path`, creating intermediate objects or arrays as the
/// segment types require. Existing non-container values on the way are replaced.
pub fn set_in(target: &mut Value, path: &[PathSegment], value: Value) {
    let slot = slot_mut(target, path);
    *slot = value;
}

/// Append `items` to the array at `path`. A missing or null destination becomes
/// a fresh array; any other non-array destination is replaced.
pub fn append_in(target: &mut Value, path: &[PathSegment], items: Vec<Value>) {
    let slot = slot_mut(target, path);
    match slot {
        Value::Array(existing) => existing.extend(items),
        other => *other = Value::Array(items),
    }
}

/// Read the value at `path`, if every segment exists
pub fn get_in<'a>(target: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter().try_fold(target, |current, segment| match segment {
        PathSegment::Key(key) => current.as_object()?.get(key),
        PathSegment::Index(index) => current.as_array()?.get(*index),
    })
}

fn slot_mut<'a>(target: &'a mut Value, path: &[PathSegment]) -> &'a mut Value {
    let Some((segment, rest)) = path.split_first() else {
        return target;
    };

    match segment {
        PathSegment::Key(key) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            let Value::Object(map) = target else {
                unreachable!("target was just made an object")
            };
            let entry = map.entry(key.clone()).or_insert(Value::Null);
            slot_mut(entry, rest)
        }
        PathSegment::Index(index) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            let Value::Array(items) = target else {
                unreachable!("target was just made an array")
            };
            if items.len() <= *index {
                items.resize(*index + 1, Value::Null);
            }
            slot_mut(&mut items[*index], rest)
        }
    }
}
