//! # Binding Context
//!
//! Widget options may reference values from the surrounding context with
//! `{{ path }}` bindings. A context is a JSON map; containers that introduce
//! new names (list items, nested templates) create a child scope with
//! [`TemplateContext::with`] or [`TemplateContext::merged`].
//!
//! ```rust
//! use core_playback::context::{resolve_option, TemplateContext};
//! use serde_json::json;
//!
//! let ctx = TemplateContext::default().with("item", json!({ "title": "Menu" }));
//! assert_eq!(resolve_option(&json!("{{ item.title }}"), &ctx), json!("Menu"));
//! assert_eq!(resolve_option(&json!("Today: {{item.title}}"), &ctx), json!("Today: Menu"));
//! ```

use serde_json::{Map, Value};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Scoped binding names available to option resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    bindings: Map<String, Value>,
}

impl TemplateContext {
    pub fn new(bindings: Map<String, Value>) -> Self {
        Self { bindings }
    }

    /// Build a context from a JSON object. Non-objects produce an empty context.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map.clone()),
            _ => Self::default(),
        }
    }

    /// Child scope with one extra binding.
    pub fn with(&self, name: impl Into<String>, value: Value) -> Self {
        let mut bindings = self.bindings.clone();
        bindings.insert(name.into(), value);
        Self { bindings }
    }

    /// Child scope with every entry of `overrides` layered on top.
    pub fn merged(&self, overrides: &Map<String, Value>) -> Self {
        let mut bindings = self.bindings.clone();
        for (key, value) in overrides {
            bindings.insert(key.clone(), value.clone());
        }
        Self { bindings }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Look up a dotted path such as `item.images.0.url`.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.trim().split('.');
        let first = segments.next().filter(|s| !s.is_empty())?;
        let mut current = self.bindings.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

/// Resolve every binding inside `value` against `ctx`.
///
/// A string that is exactly one binding is replaced by the bound value (any
/// JSON type, `null` when unbound). Bindings embedded in longer strings are
/// interpolated as text. Arrays and objects are resolved recursively.
pub fn resolve_option(value: &Value, ctx: &TemplateContext) -> Value {
    match value {
        Value::String(text) => resolve_string(text, ctx),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_option(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_option(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(text: &str, ctx: &TemplateContext) -> Value {
    if let Some(path) = whole_binding(text) {
        return ctx.lookup(path).cloned().unwrap_or(Value::Null);
    }
    if !text.contains(OPEN) {
        return Value::String(text.to_string());
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let Some(len) = rest[start + OPEN.len()..].find(CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        let path = &rest[start + OPEN.len()..start + OPEN.len() + len];
        if let Some(bound) = ctx.lookup(path) {
            out.push_str(&display(bound));
        }
        rest = &rest[start + OPEN.len() + len + CLOSE.len()..];
    }
    out.push_str(rest);
    Value::String(out)
}

fn whole_binding(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    // "{{a}} and {{b}}" is interpolation, not a single binding.
    if inner.contains(OPEN) || inner.contains(CLOSE) {
        return None;
    }
    Some(inner.trim())
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Evaluate a `cond` attribute.
///
/// Accepts a boolean, a number, or a binding path (optionally wrapped in
/// `{{ }}` and optionally negated with `!`) tested for truthiness.
pub fn evaluate_condition(cond: &Value, ctx: &TemplateContext) -> bool {
    match cond {
        Value::String(expr) => {
            let expr = expr.trim();
            let expr = whole_binding(expr).unwrap_or(expr);
            match expr.strip_prefix('!') {
                Some(path) => !ctx.lookup(path).map(is_truthy).unwrap_or(false),
                None => ctx.lookup(expr).map(is_truthy).unwrap_or(false),
            }
        }
        other => is_truthy(other),
    }
}

/// Truthiness of a bound value. Empty strings, arrays and objects are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> TemplateContext {
        TemplateContext::from_value(&json!({
            "menu": { "title": "Lunch", "items": [{ "name": "Soup", "price": 4.5 }] },
            "show_prices": true,
            "empty": []
        }))
    }

    #[test]
    fn test_lookup_paths() {
        let ctx = ctx();
        assert_eq!(ctx.lookup("menu.title"), Some(&json!("Lunch")));
        assert_eq!(ctx.lookup("menu.items.0.name"), Some(&json!("Soup")));
        assert_eq!(ctx.lookup("menu.items.3.name"), None);
        assert_eq!(ctx.lookup("menu.title.length"), None);
        assert_eq!(ctx.lookup(""), None);
    }

    #[test]
    fn test_whole_binding_keeps_type() {
        let ctx = ctx();
        assert_eq!(resolve_option(&json!("{{menu.items}}"), &ctx), json!([{ "name": "Soup", "price": 4.5 }]));
        assert_eq!(resolve_option(&json!("{{ missing }}"), &ctx), Value::Null);
    }

    #[test]
    fn test_interpolation() {
        let ctx = ctx();
        assert_eq!(
            resolve_option(&json!("{{menu.items.0.name}}: {{menu.items.0.price}}"), &ctx),
            json!("Soup: 4.5")
        );
        assert_eq!(resolve_option(&json!("x {{nope}} y"), &ctx), json!("x  y"));
        assert_eq!(resolve_option(&json!("unterminated {{ menu"), &ctx), json!("unterminated {{ menu"));
    }

    #[test]
    fn test_nested_resolution() {
        let ctx = ctx();
        let opts = json!({ "text": "{{menu.title}}", "lines": ["{{menu.items.0.name}}", 3] });
        assert_eq!(
            resolve_option(&opts, &ctx),
            json!({ "text": "Lunch", "lines": ["Soup", 3] })
        );
    }

    #[test]
    fn test_child_scopes_do_not_leak() {
        let parent = ctx();
        let child = parent.with("item", json!(1));
        assert!(child.lookup("item").is_some());
        assert!(parent.lookup("item").is_none());

        let mut overrides = Map::new();
        overrides.insert("show_prices".into(), json!(false));
        assert!(!evaluate_condition(&json!("show_prices"), &parent.merged(&overrides)));
        assert!(evaluate_condition(&json!("show_prices"), &parent));
    }

    #[test]
    fn test_conditions() {
        let ctx = ctx();
        assert!(evaluate_condition(&json!(true), &ctx));
        assert!(!evaluate_condition(&json!(0), &ctx));
        assert!(evaluate_condition(&json!("{{ show_prices }}"), &ctx));
        assert!(evaluate_condition(&json!("!empty"), &ctx));
        assert!(!evaluate_condition(&json!("missing"), &ctx));
    }
}
