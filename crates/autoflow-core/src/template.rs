//! `{{dotted.path}}` template interpolation over JSON configs.
//!
//! Interpolation is fail-open: a token whose path does not resolve is left in
//! place verbatim. Scalars are substituted as their literal text. A string
//! that is exactly one token resolving to an object or array is replaced by
//! the structured value itself, so the interpolated config stays valid JSON.

use serde_json::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Interpolate every string inside `config` against `context`.
pub fn interpolate(config: &Value, context: &Value) -> Value {
    interpolate_except(config, context, &[])
}

/// Like [`interpolate`], but leaves the listed top-level keys untouched.
///
/// Control-flow actions use this to keep nested action lists raw until each
/// nested action is dispatched with its own context (e.g. the loop `item`).
pub fn interpolate_except(config: &Value, context: &Value, skip_keys: &[&str]) -> Value {
    match config {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let resolved = if skip_keys.contains(&key.as_str()) {
                        value.clone()
                    } else {
                        interpolate_value(value, context)
                    };
                    (key.clone(), resolved)
                })
                .collect(),
        ),
        other => interpolate_value(other, context),
    }
}

fn interpolate_value(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => interpolate_string_value(s, context),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, context))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn interpolate_string_value(s: &str, context: &Value) -> Value {
    if let Some(path) = sole_token(s) {
        if let Some(resolved @ (Value::Object(_) | Value::Array(_))) = resolve_path(context, path) {
            return resolved.clone();
        }
    }
    Value::String(interpolate_str(s, context))
}

/// Returns the inner path if `s` is exactly one `{{ path }}` token.
fn sole_token(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix(OPEN)?.strip_suffix(CLOSE)?;
    if inner.contains(OPEN) || inner.contains(CLOSE) {
        return None;
    }
    Some(inner.trim())
}

/// Substitute every token inside a single string.
pub fn interpolate_str(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            // Unterminated token: keep the remainder as-is.
            out.push_str(&rest[start..]);
            return out;
        };

        let path = after_open[..end].trim();
        match resolve_path(context, path) {
            Some(value) => out.push_str(&value_to_string(value)),
            None => {
                tracing::debug!(path, "template token unresolved, leaving verbatim");
                out.push_str(&rest[start..start + OPEN.len() + end + CLOSE.len()]);
            }
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

/// Walk a dotted path through objects (by key) and arrays (by index).
pub fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(context, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Render a JSON value as template text: strings raw, everything else as
/// compact JSON.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "trigger": {"data": {"id": "abc", "amount": 42, "paid": true}},
            "customer": {"name": "Ada", "tags": ["vip", "net30"]},
            "rows": [{"id": 1}, {"id": 2}],
        })
    }

    #[test]
    fn test_nested_path_substituted_and_reparses() {
        let config = json!({"record_id": "{{trigger.data.id}}", "note": "id={{ trigger.data.id }}"});
        let out = interpolate(&config, &ctx());
        assert_eq!(out["record_id"], "abc");
        assert_eq!(out["note"], "id=abc");

        let text = serde_json::to_string(&out).unwrap();
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(reparsed, out);
    }

    #[test]
    fn test_scalars_become_literals() {
        let out = interpolate_str("{{trigger.data.amount}} / {{trigger.data.paid}}", &ctx());
        assert_eq!(out, "42 / true");
    }

    #[test]
    fn test_unresolved_token_left_verbatim() {
        let out = interpolate_str("hello {{ missing.path }}!", &ctx());
        assert_eq!(out, "hello {{ missing.path }}!");
    }

    #[test]
    fn test_sole_token_object_splices_structured_value() {
        let out = interpolate(&json!({"items": "{{customer.tags}}"}), &ctx());
        assert_eq!(out["items"], json!(["vip", "net30"]));
    }

    #[test]
    fn test_embedded_object_serializes_as_json_text() {
        let out = interpolate_str("tags: {{customer.tags}}", &ctx());
        assert_eq!(out, r#"tags: ["vip","net30"]"#);
    }

    #[test]
    fn test_array_index_segments() {
        assert_eq!(resolve_path(&ctx(), "rows.1.id"), Some(&json!(2)));
        assert_eq!(resolve_path(&ctx(), "rows.9.id"), None);
        assert_eq!(resolve_path(&ctx(), ""), None);
    }

    #[test]
    fn test_nested_arrays_and_objects_walked() {
        let config = json!({"data": {"lines": ["{{customer.name}}", 7, null]}});
        let out = interpolate(&config, &ctx());
        assert_eq!(out, json!({"data": {"lines": ["Ada", 7, null]}}));
    }

    #[test]
    fn test_interpolate_except_skips_keys() {
        let config = json!({"items": "{{customer.tags}}", "actions": [{"message": "{{customer.name}}"}]});
        let out = interpolate_except(&config, &ctx(), &["actions"]);
        assert_eq!(out["items"], json!(["vip", "net30"]));
        assert_eq!(out["actions"][0]["message"], "{{customer.name}}");
    }

    #[test]
    fn test_unterminated_token_kept() {
        assert_eq!(interpolate_str("a {{ b", &ctx()), "a {{ b");
    }

    #[test]
    fn test_deterministic() {
        let config = json!({"a": "{{customer.name}}-{{trigger.data.id}}"});
        assert_eq!(interpolate(&config, &ctx()), interpolate(&config, &ctx()));
    }
}
