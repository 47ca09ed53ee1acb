// Copyright 2025 Oxide Computer Company

//! Closed value representation shared by the resolver and the serializer
//!
//! Handler arguments and return values are expressed as a [`Value`]: a
//! closed tagged variant over the primitives the conversion table knows how
//! to produce, the containers the serializer knows how to walk, and
//! structured model instances.  Using a closed sum type (rather than
//! trait-object dispatch over arbitrary types) keeps the "type to wire
//! value" table in one place and makes "no known rendering" a checkable
//! condition instead of a runtime surprise.

use crate::schema::ModelInstance;
use chrono::DateTime;
use chrono::FixedOffset;
use chrono::NaiveDate;
use chrono::TimeDelta;
use indexmap::IndexMap;
use std::net::IpAddr;
use uuid::Uuid;

/// A typed value flowing between the resolver, a handler, and the
/// serializer.
///
/// Mappings and model fields preserve insertion order, so serialized
/// bodies come out in declaration order.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(Uuid),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    /// A span of time, rendered as an ISO-8601 duration.
    Duration(TimeDelta),
    Ip(IpAddr),
    Sequence(Vec<Value>),
    Mapping(IndexMap<String, Value>),
    /// An instance of a registered model, flattened to its field mapping
    /// during serialization.
    Model(ModelInstance),
}

impl Value {
    /// Short name of this value's variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Date(_) => "date",
            Value::DateTime(_) => "date-time",
            Value::Duration(_) => "duration",
            Value::Ip(_) => "ip address",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::Model(_) => "model",
        }
    }

    /// Build a mapping value from `(name, value)` pairs, preserving order.
    pub fn mapping<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Mapping(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Value {
        Value::Uuid(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Value {
        Value::Date(v)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(v: DateTime<FixedOffset>) -> Value {
        Value::DateTime(v)
    }
}

impl From<TimeDelta> for Value {
    fn from(v: TimeDelta) -> Value {
        Value::Duration(v)
    }
}

impl From<IpAddr> for Value {
    fn from(v: IpAddr) -> Value {
        Value::Ip(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Value {
        Value::Sequence(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod test {
    use super::Value;

    #[test]
    fn test_mapping_preserves_order() {
        let value = Value::mapping([
            ("zebra", Value::Int(1)),
            ("aardvark", Value::Int(2)),
        ]);
        let Value::Mapping(map) = value else {
            panic!("expected a mapping");
        };
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zebra", "aardvark"]);
    }

    #[test]
    fn test_from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(7i64), Value::Int(7));
        assert_eq!(Value::from("x"), Value::String("x".to_string()));
        assert_eq!(
            Value::from(vec![1i64, 2, 3]),
            Value::Sequence(vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(3)
            ])
        );
    }
}
