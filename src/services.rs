//! Collaborators the engine reads from while resolving
//!
//! The data store, the expression language and the binding syntax all belong
//! to the host. The engine only sees the three traits below. Small reference
//! implementations are provided so the engine can run on its own: an
//! in-memory JSON model, a dotted-path binding parser and a lookup evaluator
//! that understands literals, bindings, negation and equality.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::{Number, Value};

use crate::node::{get_in, set_in, PathSegment};

/// A parsed reference into the data model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    raw: String,
    segments: Vec<PathSegment>,
}

impl Binding {
    pub fn new(raw: impl Into<String>, segments: Vec<PathSegment>) -> Self {
        Self {
            raw: raw.into(),
            segments,
        }
    }

    /// The binding as it was written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Turns binding strings into [`Binding`]s
pub trait BindingParser {
    fn parse(&self, raw: &str) -> Binding;
}

/// Read access to the host's data. Missing data reads as `Value::Null`.
pub trait DataModel {
    fn get(&self, binding: &Binding) -> Value;
}

/// Evaluates host expressions. Reads must go through `model` so the resolver
/// can see which bindings an expression depends on.
pub trait ExpressionEvaluator {
    fn evaluate(&self, expression: &Value, model: &dyn DataModel) -> Value;
}

/// Parses `a.b[0].c` and `a.b.0.c` style paths
#[derive(Debug, Clone, Copy, Default)]
pub struct DotPathParser;

impl BindingParser for DotPathParser {
    fn parse(&self, raw: &str) -> Binding {
        let mut segments = Vec::new();
        for part in raw.trim().split('.').filter(|p| !p.is_empty()) {
            let (head, mut rest) = match part.find('[') {
                Some(pos) => part.split_at(pos),
                None => (part, ""),
            };
            if !head.is_empty() {
                segments.push(segment_for(head));
            }
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(end) = stripped.find(']') else {
                    break;
                };
                let inner = stripped[..end].trim_matches(|c| c == '\'' || c == '"');
                segments.push(segment_for(inner));
                rest = &stripped[end + 1..];
            }
        }
        Binding::new(raw.trim(), segments)
    }
}

fn segment_for(part: &str) -> PathSegment {
    match part.parse::<usize>() {
        Ok(index) => PathSegment::Index(index),
        Err(_) => PathSegment::Key(part.to_string()),
    }
}

/// In-memory JSON data model
#[derive(Debug, Default)]
pub struct JsonModel {
    data: RefCell<Value>,
}

impl JsonModel {
    pub fn new(data: Value) -> Self {
        Self {
            data: RefCell::new(data),
        }
    }

    /// Write `value` at `binding`, creating intermediate containers
    pub fn set(&self, binding: &Binding, value: Value) {
        set_in(&mut self.data.borrow_mut(), binding.segments(), value);
    }

    /// Parse `path` with [`DotPathParser`] and write `value` there
    pub fn set_path(&self, path: &str, value: Value) {
        self.set(&DotPathParser.parse(path), value);
    }

    pub fn snapshot(&self) -> Value {
        self.data.borrow().clone()
    }
}

impl DataModel for JsonModel {
    fn get(&self, binding: &Binding) -> Value {
        get_in(&self.data.borrow(), binding.segments())
            .cloned()
            .unwrap_or(Value::Null)
    }
}

/// Minimal expression evaluator
///
/// Understands `true`, `false`, `null`, numbers, quoted strings, `{{binding}}`
/// or bare binding paths, a leading `!`, and a single `==` or `!=`
/// comparison. An array of expressions evaluates each in turn and yields the
/// last result.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupEvaluator;

impl ExpressionEvaluator for LookupEvaluator {
    fn evaluate(&self, expression: &Value, model: &dyn DataModel) -> Value {
        match expression {
            Value::String(source) => self.evaluate_str(source.trim(), model),
            Value::Array(items) => items
                .iter()
                .map(|item| self.evaluate(item, model))
                .last()
                .unwrap_or(Value::Null),
            other => other.clone(),
        }
    }
}

impl LookupEvaluator {
    fn evaluate_str(&self, source: &str, model: &dyn DataModel) -> Value {
        if source.is_empty() {
            return Value::Null;
        }

        if let Some((lhs, rhs)) = source.split_once("!=") {
            let equal = self.evaluate_str(lhs.trim(), model) == self.evaluate_str(rhs.trim(), model);
            return Value::Bool(!equal);
        }
        if let Some((lhs, rhs)) = source.split_once("==") {
            let equal = self.evaluate_str(lhs.trim(), model) == self.evaluate_str(rhs.trim(), model);
            return Value::Bool(equal);
        }

        if let Some(rest) = source.strip_prefix('!') {
            return Value::Bool(!is_truthy(&self.evaluate_str(rest.trim(), model)));
        }

        match source {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            "null" | "undefined" => return Value::Null,
            _ => {}
        }

        if let Ok(int) = source.parse::<i64>() {
            return Value::Number(int.into());
        }
        if let Ok(float) = source.parse::<f64>() {
            if let Some(number) = Number::from_f64(float) {
                return Value::Number(number);
            }
        }

        for quote in ['\'', '"'] {
            if let Some(text) = source
                .strip_prefix(quote)
                .and_then(|s| s.strip_suffix(quote))
            {
                return Value::String(text.to_string());
            }
        }

        let path = source
            .strip_prefix("{{")
            .and_then(|s| s.strip_suffix("}}"))
            .unwrap_or(source);
        model.get(&DotPathParser.parse(path))
    }
}

/// Truthiness used by switch cases and applicability guards
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// The collaborators one view resolves against
#[derive(Clone)]
pub struct Services {
    pub model: Rc<dyn DataModel>,
    pub evaluator: Rc<dyn ExpressionEvaluator>,
    pub bindings: Rc<dyn BindingParser>,
}

impl Services {
    pub fn new(
        model: Rc<dyn DataModel>,
        evaluator: Rc<dyn ExpressionEvaluator>,
        bindings: Rc<dyn BindingParser>,
    ) -> Self {
        Self {
            model,
            evaluator,
            bindings,
        }
    }

    /// Services over `model` with the reference evaluator and binding parser
    pub fn with_model(model: Rc<dyn DataModel>) -> Self {
        Self::new(model, Rc::new(LookupEvaluator), Rc::new(DotPathParser))
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
