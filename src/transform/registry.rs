//! Lookup of transforms by output shape

use std::rc::Rc;

use serde_json::{Map, Value};

use super::Transform;

/// Transforms keyed by object patterns
///
/// A pattern matches a value when every key of the pattern is present in the
/// value with an equal value. The pattern with the most keys wins; among equal
/// patterns the one registered last wins.
#[derive(Default)]
pub struct TransformRegistry {
    entries: Vec<(Map<String, Value>, Rc<Transform>)>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `transform` for values matching `pattern`. Non-object patterns
    /// match everything.
    pub fn register(&mut self, pattern: Value, transform: impl Into<Transform>) {
        let pattern = match pattern {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.entries.push((pattern, Rc::new(transform.into())));
    }

    /// Register `transform` for assets whose `type` is `asset_type`
    pub fn register_type(&mut self, asset_type: &str, transform: impl Into<Transform>) {
        let mut pattern = Map::new();
        pattern.insert("type".to_string(), Value::String(asset_type.to_string()));
        self.register(Value::Object(pattern), transform);
    }

    pub fn with(mut self, pattern: Value, transform: impl Into<Transform>) -> Self {
        self.register(pattern, transform);
        self
    }

    pub fn with_type(mut self, asset_type: &str, transform: impl Into<Transform>) -> Self {
        self.register_type(asset_type, transform);
        self
    }

    /// Add all of `other`'s entries after this registry's own
    pub fn extend(&mut self, other: TransformRegistry) {
        self.entries.extend(other.entries);
    }

    pub fn get(&self, value: &Value) -> Option<Rc<Transform>> {
        let object = value.as_object()?;
        let mut best: Option<(usize, &Rc<Transform>)> = None;

        for (pattern, transform) in &self.entries {
            let matches = pattern
                .iter()
                .all(|(key, expected)| object.get(key) == Some(expected));
            if !matches {
                continue;
            }
            if best.map_or(true, |(score, _)| pattern.len() >= score) {
                best = Some((pattern.len(), transform));
            }
        }

        best.map(|(_, transform)| Rc::clone(transform))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(name: &str) -> Transform {
        Transform::new()
            .with_resolve(|value, _| Ok(value))
            .named(name)
    }

    fn matched(registry: &TransformRegistry, value: Value) -> Option<String> {
        registry
            .get(&value)
            .and_then(|transform| transform.name().map(str::to_string))
    }

    #[test]
    fn test_most_specific_pattern_wins() {
        let registry = TransformRegistry::new()
            .with(json!({"type": "input"}), named("input"))
            .with(json!({"type": "input", "variant": "date"}), named("date"))
            .with(json!({}), named("any"));

        assert_eq!(
            matched(&registry, json!({"type": "input", "variant": "date"})),
            Some("date".to_string())
        );
        assert_eq!(
            matched(&registry, json!({"type": "input"})),
            Some("input".to_string())
        );
        assert_eq!(
            matched(&registry, json!({"type": "text"})),
            Some("any".to_string())
        );
        assert_eq!(matched(&registry, json!("not an object")), None);
    }

    #[test]
    fn test_later_registration_wins_ties() {
        let mut registry = TransformRegistry::new().with_type("text", named("first"));
        registry.extend(TransformRegistry::new().with_type("text", named("second")));

        assert_eq!(registry.len(), 2);
        assert_eq!(
            matched(&registry, json!({"type": "text"})),
            Some("second".to_string())
        );
    }
}
