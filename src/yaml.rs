//! Typed field access over parsed YAML mappings.
//!
//! Null values count as absent, so `timeout:` with no value falls back to the
//! default the same way an omitted key does.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::{Error, Result};

/// Look up a key, treating explicit nulls as absent
pub(crate) fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|v| !v.is_null())
}

/// Borrow a value as a mapping or fail with a type mismatch on `field`
pub(crate) fn as_mapping<'a>(value: &'a Value, field: &str) -> Result<&'a Mapping> {
    value
        .as_mapping()
        .ok_or_else(|| Error::type_mismatch(field, "a mapping"))
}

/// Borrow a value as a sequence or fail with a type mismatch on `field`
pub(crate) fn as_sequence<'a>(value: &'a Value, field: &str) -> Result<&'a Vec<Value>> {
    value
        .as_sequence()
        .ok_or_else(|| Error::type_mismatch(field, "a list"))
}

/// Join a parent path and a key for error messages
pub(crate) fn path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

/// Render a scalar as the string Kubernetes expects for labels and quantities
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Required string field
pub(crate) fn required_string(map: &Mapping, key: &str, context: &str) -> Result<String> {
    match get(map, key) {
        None => Err(Error::missing_key(key, context)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(Error::type_mismatch(
            path(context, key),
            "a non-empty string",
        )),
        Some(_) => Err(Error::type_mismatch(path(context, key), "a string")),
    }
}

/// Optional string field
pub(crate) fn optional_string(map: &Mapping, key: &str, context: &str) -> Result<Option<String>> {
    match get(map, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::type_mismatch(path(context, key), "a string")),
    }
}

/// Optional numeric field; integers are widened to f64
pub(crate) fn optional_f64(map: &Mapping, key: &str, context: &str) -> Result<Option<f64>> {
    match get(map, key) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| Error::type_mismatch(path(context, key), "a number")),
        Some(_) => Err(Error::type_mismatch(path(context, key), "a number")),
    }
}

/// Optional non-negative integer that fits in u32
pub(crate) fn optional_u32(map: &Mapping, key: &str, context: &str) -> Result<Option<u32>> {
    match get(map, key) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| Error::type_mismatch(path(context, key), "a non-negative integer")),
        Some(_) => Err(Error::type_mismatch(
            path(context, key),
            "a non-negative integer",
        )),
    }
}

/// Optional string-to-string mapping (labels, annotations)
///
/// Scalar values are stringified; nested values are rejected.
pub(crate) fn optional_string_map(
    map: &Mapping,
    key: &str,
    context: &str,
) -> Result<BTreeMap<String, String>> {
    let field = path(context, key);
    let Some(value) = get(map, key) else {
        return Ok(BTreeMap::new());
    };

    as_mapping(value, &field)?
        .iter()
        .map(|(k, v)| {
            let k = scalar_to_string(k)
                .ok_or_else(|| Error::type_mismatch(field.clone(), "scalar keys"))?;
            let v = scalar_to_string(v)
                .ok_or_else(|| Error::type_mismatch(path(&field, &k), "a scalar value"))?;
            Ok((k, v))
        })
        .collect()
}

/// Reject keys outside `allowed`, naming the first offender
pub(crate) fn deny_unknown_keys(
    map: &Mapping,
    allowed: &[&str],
    context: &str,
    expected: &'static str,
) -> Result<()> {
    for key in map.keys() {
        let name = key.as_str().unwrap_or_default();
        if !allowed.contains(&name) {
            let shown = scalar_to_string(key).unwrap_or_else(|| "<non-scalar key>".to_string());
            return Err(Error::type_mismatch(path(context, &shown), expected));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn null_is_absent() {
        let map = mapping("timeout:\nname: nb");
        assert!(get(&map, "timeout").is_none());
        assert!(get(&map, "name").is_some());
    }

    #[test]
    fn required_string_reports_missing_and_mismatch() {
        let map = mapping("name: 12\nimage: ''");
        assert!(matches!(
            required_string(&map, "other", "jobs[0]"),
            Err(Error::MissingMandatoryKey { .. })
        ));
        assert!(matches!(
            required_string(&map, "name", "jobs[0]"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            required_string(&map, "image", "jobs[0]"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn string_map_stringifies_scalars() {
        let map = mapping("labels:\n  team: ml\n  version: 2\n  gpu: true");
        let labels = optional_string_map(&map, "labels", "jobs[0]").unwrap();
        assert_eq!(labels["version"], "2");
        assert_eq!(labels["gpu"], "true");
        assert_eq!(labels["team"], "ml");
    }

    #[test]
    fn string_map_rejects_nested_values() {
        let map = mapping("labels:\n  team:\n    name: ml");
        let err = optional_string_map(&map, "labels", "jobs[0]").unwrap_err();
        assert_eq!(
            err.to_string(),
            "type mismatch for 'jobs[0].labels.team': expected a scalar value"
        );
    }

    #[test]
    fn u32_rejects_negative_and_fractional() {
        let map = mapping("a: -1\nb: 1.5\nc: 3");
        assert!(optional_u32(&map, "a", "").is_err());
        assert!(optional_u32(&map, "b", "").is_err());
        assert_eq!(optional_u32(&map, "c", "").unwrap(), Some(3));
    }

    #[test]
    fn unknown_keys_are_named() {
        let map = mapping("cpu: 1\ngpu: 1");
        let err = deny_unknown_keys(&map, &["cpu"], "resources.limits", "a known key").unwrap_err();
        assert!(err.to_string().contains("resources.limits.gpu"));
    }
}
