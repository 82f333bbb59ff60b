//! Field readers for rows written by other clients. Counts may arrive as
//! floats or numeric text, and ids or names as numbers.
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Only a present, non-null value becomes `Some`, so a field that was absent
/// stays absent when the row is written back. A `null` fails the row instead
/// of being silently dropped.
pub fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// A non-negative count. Negative, non-numeric and missing values read as zero.
pub fn count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| count_of(&value))
}

pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| text_of(value).unwrap_or_default())
}

pub fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(text_of)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count_of(value: &Value) -> u32 {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .filter(|n| n.is_finite() && *n > 0.0)
        .map_or(0, |n| n.min(f64::from(u32::MAX)) as u32)
}

fn text_of(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_accept_store_shapes() {
        assert_eq!(count_of(&json!(7)), 7);
        assert_eq!(count_of(&json!(7.9)), 7);
        assert_eq!(count_of(&json!(" 12 ")), 12);
        assert_eq!(count_of(&json!(-3)), 0);
        assert_eq!(count_of(&json!("lots")), 0);
        assert_eq!(count_of(&json!(null)), 0);
        assert_eq!(count_of(&json!(1e12)), u32::MAX);
    }

    #[test]
    fn text_accepts_numbers() {
        assert_eq!(text_of(json!(42)), Some("42".to_string()));
        assert_eq!(text_of(json!("Rifle")), Some("Rifle".to_string()));
        assert_eq!(text_of(json!(null)), None);
    }
}
