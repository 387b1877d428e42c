//! Post-retrieval shaping of raw store documents.
//!
//! Runs for every strategy, whether or not the store already filtered by
//! store scope: inventory entries for other stores never reach mapping.

use serde_json::{Map, Value};

use crate::product::{fields, RawDocument};
use crate::types::StoreScope;

/// Shape one document in place: inventory restriction and score normalization.
pub fn shape_document(doc: &mut RawDocument, scope: &StoreScope) {
    retain_store_inventory(doc, scope);
    normalize_score(doc);
}

/// Keep only the inventory entries that belong to `scope`.
///
/// A missing or non-array inventory becomes an empty array.
pub fn retain_store_inventory(doc: &mut RawDocument, scope: &StoreScope) {
    let kept = match doc.remove(fields::INVENTORY) {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter(|entry| {
                entry
                    .as_object()
                    .and_then(|e| e.get(fields::STORE_ID))
                    .is_some_and(|id| scope.matches(id))
            })
            .collect(),
        _ => Vec::new(),
    };
    doc.insert(fields::INVENTORY.to_string(), Value::Array(kept));
}

/// Reduce whatever the engine put in `score` to a plain number, or drop it.
///
/// Accepts plain numbers, score-details objects (`{"value": ..}`) and
/// extended-JSON doubles (`{"$numberDouble": ".."}`). Anything else is
/// removed so the product maps with no score rather than a fake zero.
pub fn normalize_score(doc: &mut RawDocument) {
    let score = doc.remove(fields::SCORE).and_then(|v| score_value(&v));
    if let Some(score) = score.and_then(serde_json::Number::from_f64) {
        doc.insert(fields::SCORE.to_string(), Value::Number(score));
    }
}

fn score_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Object(map) => object_score(map),
        _ => None,
    }
    .filter(|s| s.is_finite())
}

fn object_score(map: &Map<String, Value>) -> Option<f64> {
    if let Some(Value::String(s)) = map.get("$numberDouble") {
        return s.parse().ok();
    }
    map.get("value").and_then(score_value)
}
