//! Payload shrinking: prefix truncation, then an emergency digest

use crate::tokens::TokenEstimator;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Object keys treated as the payload's main collection, in lookup order
pub const COLLECTION_KEYS: &[&str] = &["Items", "items", "data", "rows", "datasets", "sample"];

const DIGEST_KEYS: usize = 10;
const DIGEST_FIRST_ITEM_CHARS: usize = 200;
const DIGEST_VALUE_CHARS: usize = 500;
/// Sample sizes are halved this many times before being dropped
const DIGEST_SHRINK_STEPS: u32 = 5;

/// How a payload was made to fit
#[derive(Debug, Clone, PartialEq)]
pub enum Fit {
    Unchanged,
    Truncated {
        original_count: usize,
        truncated_count: usize,
    },
    Emergency,
}

/// A payload guaranteed (within the estimator) to fit its budget
#[derive(Debug, Clone)]
pub struct Governed {
    pub value: Value,
    pub tokens: usize,
    pub fit: Fit,
}

/// Bring `value` within `budget` tokens
pub fn govern(value: Value, budget: usize, estimator: &dyn TokenEstimator) -> Governed {
    let tokens = estimator.estimate_value(&value);
    if tokens <= budget {
        return Governed {
            value,
            tokens,
            fit: Fit::Unchanged,
        };
    }

    if let Some((value, tokens, original_count, truncated_count)) = truncate(&value, budget, estimator) {
        return Governed {
            value,
            tokens,
            fit: Fit::Truncated {
                original_count,
                truncated_count,
            },
        };
    }

    let digest = emergency_digest(&value, budget, estimator);
    Governed {
        tokens: estimator.estimate_value(&digest),
        value: digest,
        fit: Fit::Emergency,
    }
}

/// Where the shrinkable collection lives
#[derive(Debug, Clone, PartialEq)]
enum Target {
    Root,
    Field(String),
}

fn locate(value: &Value) -> Option<Target> {
    match value {
        Value::Array(items) if !items.is_empty() => Some(Target::Root),
        Value::Object(map) => COLLECTION_KEYS
            .iter()
            .find(|key| matches!(map.get(**key), Some(Value::Array(items)) if !items.is_empty()))
            .map(|key| Target::Field(key.to_string()))
            .or_else(|| {
                map.iter()
                    .filter_map(|(key, v)| v.as_array().map(|items| (key, items.len())))
                    .filter(|(_, len)| *len > 0)
                    .max_by_key(|(_, len)| *len)
                    .map(|(key, _)| Target::Field(key.clone()))
            }),
        _ => None,
    }
}

/// Longest fitting prefix of the target collection, found by binary search.
/// Returns `None` when not even one item fits.
fn truncate(
    value: &Value,
    budget: usize,
    estimator: &dyn TokenEstimator,
) -> Option<(Value, usize, usize, usize)> {
    let target = locate(value)?;
    let items = match (&target, value) {
        (Target::Root, Value::Array(items)) => items,
        (Target::Field(key), Value::Object(map)) => map.get(key)?.as_array()?,
        _ => return None,
    };

    let with_prefix = |n: usize| -> Value {
        let prefix = Value::Array(items[..n].to_vec());
        match (&target, value) {
            (Target::Field(key), Value::Object(map)) => {
                let mut shrunk: Map<String, Value> = map.clone();
                shrunk.insert(key.clone(), prefix);
                Value::Object(shrunk)
            }
            _ => prefix,
        }
    };

    // lo always fits (0 is the sentinel), hi never does
    let (mut lo, mut hi) = (0, items.len());
    let mut best: Option<(Value, usize)> = None;
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let candidate = with_prefix(mid);
        let tokens = estimator.estimate_value(&candidate);
        if tokens <= budget {
            lo = mid;
            best = Some((candidate, tokens));
        } else {
            hi = mid;
        }
    }

    let (value, tokens) = best?;
    debug!("Truncated collection from {} to {} items", items.len(), lo);
    Some((value, tokens, items.len(), lo))
}

/// Fixed-shape digest of `value` that fits `budget`. Samples shrink until
/// it fits; the last resort carries only the marker and type tag.
pub fn emergency_digest(value: &Value, budget: usize, estimator: &dyn TokenEstimator) -> Value {
    for step in 0..=DIGEST_SHRINK_STEPS {
        let digest = digest(value, 1 << step);
        if estimator.estimate_value(&digest) <= budget {
            return digest;
        }
    }
    bare_digest(value)
}

fn type_tag(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        _ => "primitive",
    }
}

fn bare_digest(value: &Value) -> Value {
    json!({"_emergency_summary": true, "type": type_tag(value)})
}

fn digest(value: &Value, divisor: usize) -> Value {
    let mut out = Map::new();
    out.insert("_emergency_summary".into(), json!(true));
    out.insert("type".into(), json!(type_tag(value)));

    match value {
        Value::Object(map) => {
            let keys: Vec<&String> = map.keys().take(DIGEST_KEYS / divisor).collect();
            out.insert("keys".into(), json!(keys));
            out.insert("key_count".into(), json!(map.len()));
            if let Some(Value::Array(items)) = map.get("Items") {
                out.insert("item_count".into(), json!(items.len()));
            }
        }
        Value::Array(items) => {
            out.insert("length".into(), json!(items.len()));
            let first = items
                .first()
                .map(|item| json!(clip(&render(item), DIGEST_FIRST_ITEM_CHARS / divisor)))
                .unwrap_or(Value::Null);
            out.insert("first_item".into(), first);
        }
        other => {
            out.insert(
                "value".into(),
                json!(clip(&render(other), DIGEST_VALUE_CHARS / divisor)),
            );
        }
    }
    Value::Object(out)
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::CharRatioEstimator;

    fn estimator() -> CharRatioEstimator {
        CharRatioEstimator::default()
    }

    fn rows(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"id": i, "name": format!("row {}", i)})).collect()
    }

    #[test]
    fn test_small_payload_is_unchanged() {
        let governed = govern(json!({"a": 1}), 100, &estimator());
        assert_eq!(governed.fit, Fit::Unchanged);
        assert_eq!(governed.value, json!({"a": 1}));
    }

    #[test]
    fn test_truncates_bare_list_to_longest_fitting_prefix() {
        let est = estimator();
        let governed = govern(Value::Array(rows(500)), 300, &est);

        let Fit::Truncated { original_count, truncated_count } = governed.fit else {
            panic!("expected truncation, got {:?}", governed.fit);
        };
        assert_eq!(original_count, 500);
        assert!(governed.tokens <= 300);
        let longer = Value::Array(rows(truncated_count + 1));
        assert!(est.estimate_value(&longer) > 300);
    }

    #[test]
    fn test_truncates_items_and_keeps_metadata() {
        let payload = json!({"TotalResults": 500, "Items": rows(500), "other": [1, 2, 3]});
        let governed = govern(payload, 200, &estimator());

        assert!(matches!(governed.fit, Fit::Truncated { original_count: 500, .. }));
        assert_eq!(governed.value["TotalResults"], json!(500));
        assert_eq!(governed.value["other"], json!([1, 2, 3]));
    }

    #[test]
    fn test_longest_array_is_the_fallback_target() {
        let payload = json!({"short": [1], "long": rows(200)});
        assert_eq!(locate(&payload), Some(Target::Field("long".into())));
    }

    #[test]
    fn test_oversized_object_gets_emergency_digest() {
        let payload = json!({"blob": "x".repeat(10_000), "n": 1});
        let governed = govern(payload, 80, &estimator());

        assert_eq!(governed.fit, Fit::Emergency);
        assert!(governed.tokens <= 80);
        assert_eq!(governed.value["_emergency_summary"], json!(true));
        assert_eq!(governed.value["type"], json!("object"));
        assert_eq!(governed.value["key_count"], json!(2));
    }

    #[test]
    fn test_single_oversized_item_falls_through_to_digest() {
        let payload = json!([{"blob": "y".repeat(5_000)}, {"blob": "z"}]);
        let governed = govern(payload, 100, &estimator());
        assert_eq!(governed.fit, Fit::Emergency);
        assert_eq!(governed.value["length"], json!(2));
        assert!(governed.tokens <= 100);
    }

    #[test]
    fn test_digest_ladder_ends_in_bare_marker() {
        let payload = json!("q".repeat(2_000));
        let digest = emergency_digest(&payload, 12, &estimator());
        assert_eq!(digest, json!({"_emergency_summary": true, "type": "primitive"}));

        let roomy = emergency_digest(&payload, 1_000, &estimator());
        assert_eq!(roomy["value"].as_str().map(str::len), Some(DIGEST_VALUE_CHARS));
    }
}
