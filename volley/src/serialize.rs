// Copyright 2025 Oxide Computer Company

//! Response serialization
//!
//! The serializer turns a handler's returned [`Value`] into response body
//! bytes plus a content type.  JSON is the only encoding today, but the
//! entry point takes a [`ResponseContentType`] so that adding an encoding
//! is an enum variant rather than a new code path for callers.
//!
//! Rich scalars use one canonical string form each: dates as `YYYY-MM-DD`,
//! date-times as RFC 3339 with a `+HH:MM` offset, UUIDs hyphenated,
//! durations as ISO-8601 (`PT2H30M`), IP addresses in their display form.
//! A value with no wire rendering (today: a non-finite float) fails with
//! [`DispatchError::NotSerializable`], which is a handler defect and maps
//! to a 500.

use crate::conversion::format_isoduration;
use crate::conversion::render_date;
use crate::conversion::render_datetime;
use crate::error::DispatchError;
use crate::plan::ReturnType;
use crate::value::Value;
use bytes::Bytes;
use chrono::TimeDelta;

/// Content type emitted for JSON response bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json; charset=UTF-8";

/// The encoding applied to a response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseContentType {
    Json,
}

/// A serialized response body and the content type describing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedBody {
    pub body: Bytes,
    pub content_type: &'static str,
}

/// Serialize a handler return value.
///
/// Returns `Ok(None)` when the operation's declared return type is
/// [`ReturnType::None`] or the handler returned no value; the caller emits
/// a bodyless response in that case.
pub fn serialize(
    value: Option<&Value>,
    return_type: &ReturnType,
    content_type: ResponseContentType,
) -> Result<Option<SerializedBody>, DispatchError> {
    if matches!(return_type, ReturnType::None) {
        return Ok(None);
    }
    let Some(value) = value else {
        return Ok(None);
    };

    match content_type {
        ResponseContentType::Json => {
            let json = to_json(value)?;
            let body = serde_json::to_vec(&json).map_err(|e| {
                DispatchError::NotSerializable { type_name: e.to_string() }
            })?;
            Ok(Some(SerializedBody {
                body: Bytes::from(body),
                content_type: CONTENT_TYPE_JSON,
            }))
        }
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value, DispatchError> {
    use serde_json::Value as Json;

    match value {
        Value::Null => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(i) => Ok(Json::Number((*i).into())),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .ok_or_else(|| DispatchError::NotSerializable {
                type_name: "non-finite float".to_string(),
            }),
        Value::String(s) => Ok(Json::String(s.clone())),
        Value::Uuid(u) => Ok(Json::String(u.hyphenated().to_string())),
        Value::Date(d) => Ok(Json::String(render_date(d))),
        Value::DateTime(dt) => Ok(Json::String(render_datetime(dt))),
        Value::Duration(delta) => {
            Ok(Json::String(format_isoduration(delta_seconds(delta))))
        }
        Value::Ip(ip) => Ok(Json::String(ip.to_string())),
        Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(to_json(item)?);
            }
            Ok(Json::Array(out))
        }
        Value::Mapping(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), to_json(item)?);
            }
            Ok(Json::Object(out))
        }
        // A model flattens to its field mapping.
        Value::Model(instance) => {
            let mut out =
                serde_json::Map::with_capacity(instance.fields.len());
            for (key, item) in &instance.fields {
                out.insert(key.clone(), to_json(item)?);
            }
            Ok(Json::Object(out))
        }
    }
}

fn delta_seconds(delta: &TimeDelta) -> f64 {
    delta.num_seconds() as f64
        + f64::from(delta.subsec_nanos()) / 1_000_000_000.0
}

#[cfg(test)]
mod test {
    use super::serialize;
    use super::ResponseContentType;
    use super::CONTENT_TYPE_JSON;
    use crate::error::DispatchError;
    use crate::plan::ReturnType;
    use crate::value::Value;
    use chrono::DateTime;
    use chrono::TimeDelta;
    use std::net::IpAddr;
    use std::net::Ipv6Addr;
    use uuid::Uuid;

    fn to_body_text(value: &Value, return_type: &ReturnType) -> String {
        let body =
            serialize(Some(value), return_type, ResponseContentType::Json)
                .unwrap()
                .unwrap();
        assert_eq!(body.content_type, CONTENT_TYPE_JSON);
        String::from_utf8(body.body.to_vec()).unwrap()
    }

    #[test]
    fn test_serialize_datetime_mapping() {
        let now = DateTime::parse_from_rfc3339(
            "2024-03-03T20:25:50.286858+00:00",
        )
        .unwrap();
        let value = Value::mapping([("now", Value::DateTime(now))]);
        assert_eq!(
            to_body_text(&value, &ReturnType::Mapping),
            r#"{"now":"2024-03-03T20:25:50.286858+00:00"}"#
        );
    }

    #[test]
    fn test_serialize_rich_scalars() {
        let value = Value::mapping([
            (
                "id",
                Value::Uuid(
                    Uuid::parse_str("8c2cf754-3176-4a63-9f91-23ce1e38a0b9")
                        .unwrap(),
                ),
            ),
            ("elapsed", Value::Duration(TimeDelta::seconds(90))),
            ("addr", Value::Ip(IpAddr::V6(Ipv6Addr::LOCALHOST))),
        ]);
        assert_eq!(
            to_body_text(&value, &ReturnType::Mapping),
            concat!(
                r#"{"id":"8c2cf754-3176-4a63-9f91-23ce1e38a0b9","#,
                r#""elapsed":"PT1M30S","addr":"::1"}"#,
            )
        );
    }

    #[test]
    fn test_serialize_sequence() {
        let value = Value::Sequence(vec![
            Value::Int(1),
            Value::String("two".to_string()),
            Value::Null,
        ]);
        assert_eq!(
            to_body_text(&value, &ReturnType::Sequence),
            r#"[1,"two",null]"#
        );
    }

    #[test]
    fn test_none_return_type_skips_serialization() {
        let result = serialize(
            Some(&Value::Int(1)),
            &ReturnType::None,
            ResponseContentType::Json,
        )
        .unwrap();
        assert!(result.is_none());

        let result = serialize(
            None,
            &ReturnType::Mapping,
            ResponseContentType::Json,
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let value = Value::mapping([("ratio", Value::Float(f64::NAN))]);
        match serialize(
            Some(&value),
            &ReturnType::Mapping,
            ResponseContentType::Json,
        )
        .unwrap_err()
        {
            DispatchError::NotSerializable { type_name } => {
                assert_eq!(type_name, "non-finite float");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
