//! Variable resolution: `{{var}}` template substitution and context merging
//!
//! Resolution never fails. A placeholder whose dotted path is missing from
//! the context is left in place verbatim, so stale templates surface through
//! assertion or response inspection instead of aborting a run.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;

/// The variable context a run resolves against.
///
/// `serde_json::Map` keeps insertion order (preserve_order), which makes
/// context dumps stable in logs.
pub type VarContext = serde_json::Map<String, JsonValue>;

static TEMPLATE_VAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{([^}]+)\}\}").unwrap());

/// Replace every `{{ path }}` in `template` with its context value.
///
/// Paths are dotted and support nested maps and numeric list indices
/// (`users.0.name`). String values substitute as-is; other scalars and
/// structured values substitute as compact JSON text. Null or missing values
/// leave the placeholder untouched.
pub fn resolve(template: &str, context: &VarContext) -> String {
    TEMPLATE_VAR_RE
        .replace_all(template, |caps: &Captures| {
            let path = caps[1].trim();
            match lookup(context, path) {
                Some(JsonValue::Null) | None => caps[0].to_string(),
                Some(JsonValue::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Dotted-path lookup into the context.
///
/// Each segment steps into a map key or a numeric list index; anything else
/// (including an out-of-bounds index) resolves to `None`.
pub fn lookup<'a>(context: &'a VarContext, path: &str) -> Option<&'a JsonValue> {
    let mut parts = path.split('.');
    let mut current = context.get(parts.next()?)?;

    for part in parts {
        current = match current {
            JsonValue::Object(map) => map.get(part)?,
            JsonValue::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a string-to-string map. Keys are templates too.
pub fn resolve_string_map(
    map: &IndexMap<String, String>,
    context: &VarContext,
) -> IndexMap<String, String> {
    map.iter()
        .map(|(k, v)| (resolve(k, context), resolve(v, context)))
        .collect()
}

/// Resolve a map of structured values. Keys are templates too.
pub fn resolve_value_map(
    map: &IndexMap<String, JsonValue>,
    context: &VarContext,
) -> IndexMap<String, JsonValue> {
    map.iter()
        .map(|(k, v)| (resolve(k, context), resolve_value(v, context)))
        .collect()
}

/// Resolve a list of structured values.
pub fn resolve_list(items: &[JsonValue], context: &VarContext) -> Vec<JsonValue> {
    items.iter().map(|v| resolve_value(v, context)).collect()
}

/// Recursively resolve templates inside a structured value.
///
/// Strings become resolved strings (a lone placeholder still yields a
/// string); maps and lists recurse; other scalars pass through.
pub fn resolve_value(value: &JsonValue, context: &VarContext) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(resolve(s, context)),
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (resolve(k, context), resolve_value(v, context)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(resolve_list(items, context)),
        other => other.clone(),
    }
}

fn unwrap_variable_row(value: &JsonValue) -> JsonValue {
    // Environment/collection variable records may wrap the payload as
    // {value: ...}; the wrapper's value wins, not the row itself.
    if let JsonValue::Object(map) = value {
        if let Some(inner) = map.get("value") {
            return inner.clone();
        }
    }
    value.clone()
}

/// Merge variable sources into one context.
///
/// Precedence, lowest to highest: environment, collection, runtime,
/// extracted. Environment and collection rows tolerate the `{value: ...}`
/// record wrapper; runtime and extracted values merge verbatim.
pub fn build_context(
    environment_vars: Option<&IndexMap<String, JsonValue>>,
    collection_vars: Option<&IndexMap<String, JsonValue>>,
    runtime_vars: Option<&IndexMap<String, JsonValue>>,
    extracted_vars: Option<&IndexMap<String, JsonValue>>,
) -> VarContext {
    let mut context = VarContext::new();

    if let Some(vars) = environment_vars {
        for (name, value) in vars {
            context.insert(name.clone(), unwrap_variable_row(value));
        }
    }
    if let Some(vars) = collection_vars {
        for (name, value) in vars {
            context.insert(name.clone(), unwrap_variable_row(value));
        }
    }
    if let Some(vars) = runtime_vars {
        for (name, value) in vars {
            context.insert(name.clone(), value.clone());
        }
    }
    if let Some(vars) = extracted_vars {
        for (name, value) in vars {
            context.insert(name.clone(), value.clone());
        }
    }

    context
}

/// True if the text contains at least one `{{...}}` placeholder.
pub fn has_variables(text: &str) -> bool {
    TEMPLATE_VAR_RE.is_match(text)
}

/// The placeholder paths referenced by the text, in order of appearance.
pub fn extract_variables(text: &str) -> Vec<String> {
    TEMPLATE_VAR_RE
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(pairs: &[(&str, JsonValue)]) -> VarContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_resolve_simple() {
        let ctx = context(&[("name", json!("world"))]);
        assert_eq!(resolve("hello {{name}}", &ctx), "hello world");
    }

    #[test]
    fn test_missing_keeps_placeholder() {
        let ctx = VarContext::new();
        assert_eq!(resolve("hello {{name}}", &ctx), "hello {{name}}");
    }

    #[test]
    fn test_whitespace_in_placeholder() {
        let ctx = context(&[("id", json!(7))]);
        assert_eq!(resolve("/users/{{ id }}", &ctx), "/users/7");
    }

    #[test]
    fn test_nested_path_and_list_index() {
        let ctx = context(&[("users", json!([{"name": "ada"}, {"name": "bob"}]))]);
        assert_eq!(resolve("{{users.1.name}}", &ctx), "bob");
        assert_eq!(resolve("{{users.9.name}}", &ctx), "{{users.9.name}}");
    }

    #[test]
    fn test_structured_value_serializes() {
        let ctx = context(&[("ids", json!([1, 2, 3]))]);
        assert_eq!(resolve("ids={{ids}}", &ctx), "ids=[1,2,3]");
    }

    #[test]
    fn test_lone_placeholder_still_string() {
        let ctx = context(&[("n", json!(42))]);
        let resolved = resolve_value(&json!({"count": "{{n}}"}), &ctx);
        assert_eq!(resolved, json!({"count": "42"}));
    }

    #[test]
    fn test_map_keys_resolve() {
        let ctx = context(&[("h", json!("X-Trace"))]);
        let mut map = IndexMap::new();
        map.insert("{{h}}".to_string(), "on".to_string());
        let resolved = resolve_string_map(&map, &ctx);
        assert_eq!(resolved.get("X-Trace"), Some(&"on".to_string()));
    }

    #[test]
    fn test_build_context_precedence() {
        let env = IndexMap::from([("a".to_string(), json!({"value": "env"}))]);
        let coll = IndexMap::from([
            ("a".to_string(), json!("coll")),
            ("b".to_string(), json!({"value": 2})),
        ]);
        let runtime = IndexMap::from([("b".to_string(), json!(3))]);

        let ctx = build_context(Some(&env), Some(&coll), Some(&runtime), None);
        assert_eq!(ctx.get("a"), Some(&json!("coll")));
        assert_eq!(ctx.get("b"), Some(&json!(3)));
    }

    #[test]
    fn test_runtime_rows_not_unwrapped() {
        let runtime = IndexMap::from([("cfg".to_string(), json!({"value": 1, "extra": 2}))]);
        let ctx = build_context(None, None, Some(&runtime), None);
        assert_eq!(ctx.get("cfg"), Some(&json!({"value": 1, "extra": 2})));
    }

    #[test]
    fn test_idempotent_without_placeholders() {
        let ctx = context(&[("x", json!(1))]);
        let once = resolve("no templates here", &ctx);
        assert_eq!(once, "no templates here");
        assert_eq!(resolve(&once, &ctx), once);
    }

    #[test]
    fn test_resolve_twice_equals_once() {
        let ctx = context(&[("id", json!(5))]);
        let once = resolve("/u/{{id}}", &ctx);
        assert_eq!(resolve(&once, &ctx), once);
    }

    #[test]
    fn test_extract_variables() {
        assert_eq!(
            extract_variables("{{a}} and {{ b.c }}"),
            vec!["a".to_string(), "b.c".to_string()]
        );
        assert!(has_variables("{{a}}"));
        assert!(!has_variables("plain"));
    }
}
