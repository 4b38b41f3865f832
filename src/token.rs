//! Bearer-token discovery inside client-side storage dumps.
//!
//! The embedded app keeps its session state wherever its current build
//! happens to put it: sometimes a bare key, sometimes a JSON document
//! serialized into a single storage entry. The search therefore recurses
//! into string-embedded JSON as well as plain containers.

use serde_json::Value;

/// Storage keys that denote a bearer token.
const TOKEN_KEY_ALIASES: &[&str] = &["accesstoken", "access_token", "token", "bearer", "authorization"];

/// Find a bearer-token-shaped string anywhere inside `node`.
///
/// Mappings check their own keys before recursing into values in document
/// order; sequences recurse in order. A `Bearer ` prefix is stripped from
/// the result. Parse failures of embedded documents yield `None`, never an
/// error.
pub fn extract_bearer_token(node: &Value) -> Option<String> {
    match node {
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                let embedded: Value = serde_json::from_str(trimmed).ok()?;
                return extract_bearer_token(&embedded);
            }
            None
        }
        Value::Object(map) => {
            for (key, value) in map {
                if !TOKEN_KEY_ALIASES
                    .iter()
                    .any(|alias| key.eq_ignore_ascii_case(alias))
                {
                    continue;
                }
                if let Some(token) = value.as_str() {
                    let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
            map.values().find_map(extract_bearer_token)
        }
        Value::Array(items) => items.iter().find_map(extract_bearer_token),
        _ => None,
    }
}
