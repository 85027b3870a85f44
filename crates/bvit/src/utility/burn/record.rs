//! # Burn Record Utilities

use burn::prelude::Backend;
use burn::record::{HalfPrecisionSettings, Record};
use serde_json::{Map, Value};

/// The key used to report the shape of a collapsed numeric array.
pub const SHAPE_KEY: &str = "_shape";

/// Shape of a (possibly nested) numeric JSON array.
///
/// Returns `None` for mixed or non-numeric content.
fn numeric_array_shape(arr: &[Value]) -> Option<Vec<usize>> {
    match arr.first() {
        None => Some(vec![0]),
        Some(Value::Number(_)) => Some(vec![arr.len()]),
        Some(Value::Array(inner)) => {
            let inner_shape = numeric_array_shape(inner)?;
            Some(std::iter::once(arr.len()).chain(inner_shape).collect())
        }
        Some(_) => None,
    }
}

/// Rewrite a serialized record, collapsing numeric arrays to ``{"_shape": [...]}``.
///
/// Raw ``bytes`` payloads and null fields are dropped; ``shape`` fields are kept verbatim.
pub fn collapse_numeric_arrays(value: Value) -> Value {
    match value {
        Value::Array(a) => match numeric_array_shape(&a) {
            Some(shape) => {
                let mut obj: Map<String, Value> = Map::new();
                obj.insert(
                    SHAPE_KEY.to_string(),
                    Value::Array(shape.into_iter().map(Value::from).collect()),
                );
                Value::Object(obj)
            }
            None => Value::Array(a.into_iter().map(collapse_numeric_arrays).collect()),
        },
        Value::Object(obj) => {
            let mut new_obj: Map<String, Value> = Map::new();
            for (k, v) in obj.into_iter() {
                if k == "bytes" || v.is_null() {
                    continue;
                }
                if k == "shape" {
                    new_obj.insert(k, v);
                } else {
                    new_obj.insert(k, collapse_numeric_arrays(v));
                }
            }
            Value::Object(new_obj)
        }
        v => v,
    }
}

/// Summarize a module record as a JSON parameter inventory.
///
/// Every tensor payload is replaced by its shape, which makes the
/// structure of a saved model readable.
pub fn record_summary<B: Backend, R: Record<B>>(record: R) -> serde_json::Result<Value> {
    let item = record.into_item::<HalfPrecisionSettings>();
    let value = serde_json::to_value(&item)?;
    Ok(collapse_numeric_arrays(value))
}

/// Render [`record_summary`] as pretty-printed JSON.
pub fn record_summary_string<B: Backend, R: Record<B>>(record: R) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&record_summary(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::module::Module;
    use burn::nn::LinearConfig;
    use serde_json::json;

    #[test]
    fn test_collapse_numeric_arrays() {
        let value = json!({
            "weight": [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
            "bytes": [1, 2, 3],
            "shape": [2, 3],
            "missing": null,
            "names": ["a", "b"],
            "empty": [],
        });

        let collapsed = collapse_numeric_arrays(value);

        assert_eq!(
            collapsed,
            json!({
                "weight": {"_shape": [2, 3]},
                "shape": [2, 3],
                "names": ["a", "b"],
                "empty": {"_shape": [0]},
            })
        );
    }

    #[test]
    fn test_record_summary_linear() {
        type B = NdArray<f32>;
        let device = Default::default();

        let linear = LinearConfig::new(3, 2).init::<B>(&device);
        let summary = record_summary::<B, _>(linear.into_record()).unwrap();

        let text = summary.to_string();
        assert!(text.contains("weight"), "{text}");
        assert!(text.contains("bias"), "{text}");
        assert!(!text.contains("bytes"), "{text}");
    }
}
