//! `{{binding}}` and `@[expression]@` substitution inside strings

use std::collections::HashSet;

use log::warn;
use serde_json::Value;

use crate::services::{BindingParser, DataModel, ExpressionEvaluator};

const BINDING_OPEN: &str = "{{";
const BINDING_CLOSE: &str = "}}";
const EXPRESSION_OPEN: &str = "@[";
const EXPRESSION_CLOSE: &str = "]@";

/// Collaborators markers are resolved against
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub model: &'a dyn DataModel,
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub bindings: &'a dyn BindingParser,
}

/// Whether `text` opens a marker before it closes one
pub fn has_markers(text: &str) -> bool {
    opens_before_close(text, BINDING_OPEN, BINDING_CLOSE)
        || opens_before_close(text, EXPRESSION_OPEN, EXPRESSION_CLOSE)
}

fn opens_before_close(text: &str, open: &str, close: &str) -> bool {
    match (text.find(open), text.find(close)) {
        (Some(start), Some(end)) => start < end,
        _ => false,
    }
}

/// Resolve every marker in `text`. A string made of exactly one marker
/// yields the raw value it points at, which need not be a string.
pub fn resolve_string(text: &str, scope: &Scope<'_>) -> Value {
    if !has_markers(text) {
        return Value::String(text.to_string());
    }

    match resolve_expressions(text, scope) {
        Value::String(rest) => resolve_bindings(&rest, scope),
        typed => typed,
    }
}

/// Resolve markers in every string of `value`, leaving properties named in
/// `skip` untouched at any depth
pub fn resolve_all(value: &Value, skip: &HashSet<String>, scope: &Scope<'_>) -> Value {
    match value {
        Value::String(text) => resolve_string(text, scope),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_all(item, skip, scope))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    let resolved = if skip.contains(key) {
                        item.clone()
                    } else {
                        resolve_all(item, skip, scope)
                    };
                    (key.clone(), resolved)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_expressions(text: &str, scope: &Scope<'_>) -> Value {
    let mut output = String::new();
    let mut rest = text;

    while let Some(start) = rest.find(EXPRESSION_OPEN) {
        let body_start = start + EXPRESSION_OPEN.len();
        let Some(length) = rest[body_start..].find(EXPRESSION_CLOSE) else {
            break;
        };
        let end = body_start + length + EXPRESSION_CLOSE.len();
        let expression = Value::String(rest[body_start..body_start + length].to_string());
        let value = scope.evaluator.evaluate(&expression, scope.model);

        if output.is_empty() && start == 0 && end == rest.len() && !value.is_string() {
            return value;
        }

        output.push_str(&rest[..start]);
        output.push_str(&stringify(&value));
        rest = &rest[end..];
    }

    output.push_str(rest);
    Value::String(output)
}

fn resolve_bindings(text: &str, scope: &Scope<'_>) -> Value {
    let mut output = String::new();
    let mut rest = text;

    while let Some(start) = rest.find(BINDING_OPEN) {
        let Some(end) = find_binding_end(rest, start) else {
            warn!("unbalanced {{{{ and }}}} in '{}'", text);
            return Value::String(text.to_string());
        };

        let inner = rest[start + BINDING_OPEN.len()..end - BINDING_CLOSE.len()].trim();
        let path = if inner.contains(BINDING_OPEN) {
            stringify(&resolve_bindings(inner, scope))
        } else {
            inner.to_string()
        };
        let value = scope.model.get(&scope.bindings.parse(&path));

        if output.is_empty() && start == 0 && end == rest.len() && !value.is_string() {
            return value;
        }

        output.push_str(&rest[..start]);
        output.push_str(&stringify(&value));
        rest = &rest[end..];
    }

    output.push_str(rest);
    Value::String(output)
}

/// Offset just past the `}}` matching the `{{` at `start`
fn find_binding_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 1;
    let mut position = start + BINDING_OPEN.len();

    while depth > 0 {
        let remaining = &text[position..];
        let close = remaining.find(BINDING_CLOSE)?;
        match remaining.find(BINDING_OPEN) {
            Some(open) if open < close => {
                depth += 1;
                position += open + BINDING_OPEN.len();
            }
            _ => {
                depth -= 1;
                position += close + BINDING_CLOSE.len();
            }
        }
    }

    Some(position)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
