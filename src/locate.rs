//! Schema-tolerant search for a named balance inside an API payload.
//!
//! The balances endpoint is free to reshape its response; nothing here
//! assumes more than "JSON, somewhere inside of which an asset name sits
//! near a number". Malformed or mixed shapes never error, they just fail
//! to match.

use serde_json::Value;

use crate::numeric::coerce_number;

/// Keys that wrap nested collections of balances or items.
const CONTAINER_KEYS: &[&str] = &["balances", "data", "items", "result", "payload", "results"];

/// Keys that carry an asset's name inside a per-asset record.
const NAME_KEYS: &[&str] = &["asset", "asset_type", "type", "currency", "code", "name"];

/// Keys that carry an asset's quantity inside a per-asset record.
const VALUE_KEYS: &[&str] = &[
    "amount",
    "balance",
    "available",
    "available_balance",
    "value",
    "qty",
    "quantity",
    "total",
    "current",
    "count",
];

/// Find the quantity of the asset known under any of `names`.
///
/// Names match case-insensitively after trimming. Depth-first, first match
/// wins; within a mapping the search tries, in order: a directly matching
/// key, the well-known container keys, a name-field/value-field pairing,
/// and finally every child value.
pub fn locate_named_quantity(node: &Value, names: &[&str]) -> Option<f64> {
    let is_name =
        |candidate: &str| names.iter().any(|name| candidate.trim().eq_ignore_ascii_case(name));

    match node {
        Value::Object(map) => {
            for (key, value) in map {
                if is_name(key) {
                    if let Some(quantity) = coerce_number(value) {
                        return Some(quantity);
                    }
                }
            }

            for container in CONTAINER_KEYS {
                if let Some(child) = map.get(*container) {
                    if let Some(quantity) = locate_named_quantity(child, names) {
                        return Some(quantity);
                    }
                }
            }

            for name_key in NAME_KEYS {
                let Some(label) = map.get(*name_key).and_then(Value::as_str) else {
                    continue;
                };
                if !is_name(label) {
                    continue;
                }
                for value_key in VALUE_KEYS {
                    if let Some(quantity) = map.get(*value_key).and_then(coerce_number) {
                        return Some(quantity);
                    }
                }
                for value in map.values() {
                    if let Some(quantity) = locate_named_quantity(value, names) {
                        return Some(quantity);
                    }
                }
            }

            for value in map.values() {
                if let Some(quantity) = locate_named_quantity(value, names) {
                    return Some(quantity);
                }
            }
            None
        }
        Value::Array(items) => items
            .iter()
            .find_map(|item| locate_named_quantity(item, names)),
        _ => None,
    }
}
