use serde_json::Value;

use crate::error::{AppError, Context};
use crate::model::MAX_COUNT;

use super::FetchResult;

const COUNT_KEY: &str = "signatureCount";
const GOAL_KEY: &str = "goal";

/// Progress exactly as the upstream reported it, before any goal override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSnapshot {
    pub signature_count: u64,
    pub goal: u64,
}

/// Decode an upstream progress payload. Unknown keys are ignored.
pub fn decode_progress(text: &str) -> FetchResult<RawSnapshot> {
    let json: Value = serde_json::from_str(text).context("Failed to parse progress JSON")?;

    if !json.is_object() {
        return Err(AppError::upstream("progress payload is not a JSON object"));
    }

    let signature_count = read_count(&json, COUNT_KEY)?;
    let goal = read_count(&json, GOAL_KEY)?;

    if goal == 0 {
        return Err(AppError::upstream("progress payload reported a zero goal"));
    }

    Ok(RawSnapshot {
        signature_count,
        goal,
    })
}

fn read_count(json: &Value, key: &str) -> FetchResult<u64> {
    let value = json
        .get(key)
        .ok_or_else(|| AppError::upstream(format!("missing `{key}` in progress payload")))?;

    let count = value_to_count(value).ok_or_else(|| {
        AppError::upstream(format!(
            "`{key}` must be a non-negative integer, found {value}"
        ))
    })?;
    if count > MAX_COUNT {
        return Err(AppError::upstream(format!(
            "`{key}` is out of range: {count}"
        )));
    }
    Ok(count)
}

fn value_to_count(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    // Some feeds serialise integers as `1234.0`.
    let f = value.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_payload_with_extra_fields() {
        let raw = decode_progress(
            r#"{"signatureCount": 1204, "goal": 100000, "title": "Save the park"}"#,
        )
        .unwrap();
        assert_eq!(
            raw,
            RawSnapshot {
                signature_count: 1204,
                goal: 100_000
            }
        );
    }

    #[test]
    fn accepts_integral_floats() {
        let raw = decode_progress(r#"{"signatureCount": 12.0, "goal": 50}"#).unwrap();
        assert_eq!(raw.signature_count, 12);
    }

    #[test]
    fn rejects_missing_count() {
        let err = decode_progress(r#"{"goal": 50}"#).unwrap_err();
        assert!(err.to_string().contains("signatureCount"), "{err}");
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(decode_progress(r#"{"signatureCount": "12", "goal": 50}"#).is_err());
        assert!(decode_progress(r#"{"signatureCount": -3, "goal": 50}"#).is_err());
        assert!(decode_progress(r#"{"signatureCount": 1.5, "goal": 50}"#).is_err());
        assert!(decode_progress(r#"{"signatureCount": 1, "goal": 0}"#).is_err());
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(decode_progress("[1, 2]").is_err());
        assert!(decode_progress("<html>").is_err());
    }

    #[test]
    fn rejects_counts_beyond_i64() {
        let err = decode_progress(r#"{"signatureCount": 9223372036854775808, "goal": 50}"#)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
        assert!(decode_progress(r#"{"signatureCount": 1, "goal": 1e19}"#).is_err());

        let max = decode_progress(r#"{"signatureCount": 9223372036854775807, "goal": 50}"#)
            .unwrap();
        assert_eq!(max.signature_count, MAX_COUNT);
    }
}
