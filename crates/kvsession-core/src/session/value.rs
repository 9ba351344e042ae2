use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SerializeError;

/// The value mapping carried by a session.
pub type Values = HashMap<SessionKey, SessionValue>;

/// Key type for session values.
///
/// Only `Str` keys survive the JSON serializer; the binary serializer keeps all of them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SessionKey {
    Str(String),
    Int(i64),
    Uint(u64),
    Bool(bool),
}

impl SessionKey {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionKey::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKey::Str(s) => write!(f, "{s:?}"),
            SessionKey::Int(i) => write!(f, "{i}"),
            SessionKey::Uint(u) => write!(f, "{u}"),
            SessionKey::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        SessionKey::Str(s.to_string())
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        SessionKey::Str(s)
    }
}

impl From<i64> for SessionKey {
    fn from(i: i64) -> Self {
        SessionKey::Int(i)
    }
}

impl From<i32> for SessionKey {
    fn from(i: i32) -> Self {
        SessionKey::Int(i as i64)
    }
}

impl From<u64> for SessionKey {
    fn from(u: u64) -> Self {
        SessionKey::Uint(u)
    }
}

impl From<bool> for SessionKey {
    fn from(b: bool) -> Self {
        SessionKey::Bool(b)
    }
}

/// A value stored in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<SessionValue>),
    Map(BTreeMap<String, SessionValue>),
}

impl SessionValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SessionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SessionValue::Float(f) => Some(*f),
            SessionValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SessionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SessionValue]> {
        match self {
            SessionValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SessionValue::Null)
    }

    /// Convert to a JSON value. `path` names the enclosing key for error messages.
    pub(crate) fn to_json(&self, path: &str) -> Result<serde_json::Value, SerializeError> {
        Ok(match self {
            SessionValue::Null => serde_json::Value::Null,
            SessionValue::Bool(b) => serde_json::Value::Bool(*b),
            SessionValue::Int(i) => serde_json::Value::from(*i),
            SessionValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| SerializeError::NonFinite(path.to_string()))?,
            SessionValue::Str(s) => serde_json::Value::String(s.clone()),
            SessionValue::Bytes(bytes) => {
                serde_json::Value::Array(bytes.iter().map(|b| serde_json::Value::from(*b)).collect())
            }
            SessionValue::List(items) => serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json(path))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            SessionValue::Map(map) => {
                let mut obj = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    obj.insert(k.clone(), v.to_json(&format!("{path}.{k}"))?);
                }
                serde_json::Value::Object(obj)
            }
        })
    }

    pub(crate) fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => SessionValue::Null,
            serde_json::Value::Bool(b) => SessionValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => SessionValue::Int(i),
                None => SessionValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => SessionValue::Str(s),
            serde_json::Value::Array(items) => {
                SessionValue::List(items.into_iter().map(SessionValue::from_json).collect())
            }
            serde_json::Value::Object(obj) => SessionValue::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, SessionValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for SessionValue {
    fn from(b: bool) -> Self {
        SessionValue::Bool(b)
    }
}

impl From<i64> for SessionValue {
    fn from(i: i64) -> Self {
        SessionValue::Int(i)
    }
}

impl From<i32> for SessionValue {
    fn from(i: i32) -> Self {
        SessionValue::Int(i as i64)
    }
}

impl From<u32> for SessionValue {
    fn from(u: u32) -> Self {
        SessionValue::Int(u as i64)
    }
}

impl From<f64> for SessionValue {
    fn from(f: f64) -> Self {
        SessionValue::Float(f)
    }
}

impl From<&str> for SessionValue {
    fn from(s: &str) -> Self {
        SessionValue::Str(s.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(s: String) -> Self {
        SessionValue::Str(s)
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(bytes: Vec<u8>) -> Self {
        SessionValue::Bytes(bytes)
    }
}

impl From<Vec<SessionValue>> for SessionValue {
    fn from(items: Vec<SessionValue>) -> Self {
        SessionValue::List(items)
    }
}

impl<T: Into<SessionValue>> From<Option<T>> for SessionValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SessionValue::Null)
    }
}
