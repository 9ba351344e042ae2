use serde::{Deserialize, Serialize};

use crate::error::SerializeError;

use super::value::{SessionKey, SessionValue, Values};

/// Pluggable encoding for a session's values.
///
/// `deserialize` merges decoded entries into `values`; entries absent from the
/// payload are left alone.
pub trait SessionSerializer: Send + Sync {
    fn serialize(&self, values: &Values) -> Result<Vec<u8>, SerializeError>;

    fn deserialize(&self, data: &[u8], values: &mut Values) -> Result<(), SerializeError>;
}

/// Encodes the session map as a JSON object. Only string keys are accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl SessionSerializer for JsonSerializer {
    fn serialize(&self, values: &Values) -> Result<Vec<u8>, SerializeError> {
        let mut obj = serde_json::Map::with_capacity(values.len());
        for (key, value) in values {
            let SessionKey::Str(name) = key else {
                return Err(SerializeError::NonStringKey(key.clone()));
            };
            obj.insert(name.clone(), value.to_json(name)?);
        }
        Ok(serde_json::to_vec(&obj)?)
    }

    fn deserialize(&self, data: &[u8], values: &mut Values) -> Result<(), SerializeError> {
        let parsed: serde_json::Value = serde_json::from_slice(data)?;
        let serde_json::Value::Object(obj) = parsed else {
            return Err(SerializeError::NotAnObject);
        };
        values.extend(
            obj.into_iter()
                .map(|(k, v)| (SessionKey::Str(k), SessionValue::from_json(v))),
        );
        Ok(())
    }
}

/// Encodes the session map with bincode. Round-trips every key and value type.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinarySerializer;

impl SessionSerializer for BinarySerializer {
    fn serialize(&self, values: &Values) -> Result<Vec<u8>, SerializeError> {
        Ok(bincode::serialize(values)?)
    }

    fn deserialize(&self, data: &[u8], values: &mut Values) -> Result<(), SerializeError> {
        let decoded: Values = bincode::deserialize(data)?;
        values.extend(decoded);
        Ok(())
    }
}

/// Serializer selection as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    Json,
    #[default]
    Binary,
}

impl SerializerKind {
    pub fn build(self) -> Box<dyn SessionSerializer> {
        match self {
            SerializerKind::Json => Box::new(JsonSerializer),
            SerializerKind::Binary => Box::new(BinarySerializer),
        }
    }
}

impl std::fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializerKind::Json => write!(f, "json"),
            SerializerKind::Binary => write!(f, "binary"),
        }
    }
}

impl std::str::FromStr for SerializerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(SerializerKind::Json),
            "binary" | "bincode" => Ok(SerializerKind::Binary),
            _ => Err(format!("Unknown serializer: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn sample_values() -> Values {
        let mut nested = BTreeMap::new();
        nested.insert("theme".to_string(), SessionValue::from("dark"));
        nested.insert("zoom".to_string(), SessionValue::Float(1.25));

        let mut values = Values::new();
        values.insert("count".into(), SessionValue::Int(1));
        values.insert("user".into(), SessionValue::from("alice"));
        values.insert("admin".into(), SessionValue::Bool(false));
        values.insert("prefs".into(), SessionValue::Map(nested));
        values.insert(
            "recent".into(),
            SessionValue::List(vec![SessionValue::Int(3), SessionValue::Null]),
        );
        values
    }

    #[test]
    fn test_json_roundtrip() {
        let values = sample_values();
        let data = JsonSerializer.serialize(&values).unwrap();

        let mut decoded = Values::new();
        JsonSerializer.deserialize(&data, &mut decoded).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_json_writes_plain_object() {
        let mut values = Values::new();
        values.insert("count".into(), SessionValue::Int(1));
        let data = JsonSerializer.serialize(&values).unwrap();
        assert_eq!(String::from_utf8(data).unwrap(), r#"{"count":1}"#);
    }

    #[test]
    fn test_json_rejects_non_string_key() {
        let mut values = sample_values();
        values.insert(SessionKey::Int(7), SessionValue::from("seven"));

        let err = JsonSerializer.serialize(&values).unwrap_err();
        assert!(matches!(err, SerializeError::NonStringKey(SessionKey::Int(7))));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_json_rejects_non_finite() {
        let mut values = Values::new();
        values.insert("ratio".into(), SessionValue::Float(f64::NAN));
        let err = JsonSerializer.serialize(&values).unwrap_err();
        assert!(matches!(err, SerializeError::NonFinite(ref k) if k == "ratio"));
    }

    #[test]
    fn test_json_bad_payload_leaves_target_untouched() {
        let mut target = Values::new();
        target.insert("keep".into(), SessionValue::Int(1));

        assert!(JsonSerializer.deserialize(b"{not json", &mut target).is_err());
        assert!(matches!(
            JsonSerializer.deserialize(b"[1,2]", &mut target),
            Err(SerializeError::NotAnObject)
        ));
        assert_eq!(target.len(), 1);
        assert_eq!(target.get(&SessionKey::from("keep")), Some(&SessionValue::Int(1)));
    }

    #[test]
    fn test_binary_roundtrip_with_non_string_keys() {
        let mut values = sample_values();
        values.insert(SessionKey::Int(-5), SessionValue::from("negative"));
        values.insert(SessionKey::Uint(9), SessionValue::Bytes(vec![0, 255, 7]));
        values.insert(SessionKey::Bool(true), SessionValue::Float(f64::INFINITY));

        let data = BinarySerializer.serialize(&values).unwrap();
        let mut decoded = Values::new();
        BinarySerializer.deserialize(&data, &mut decoded).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_deserialize_merges() {
        let mut stored = Values::new();
        stored.insert("count".into(), SessionValue::Int(2));

        for serializer in [SerializerKind::Json.build(), SerializerKind::Binary.build()] {
            let data = serializer.serialize(&stored).unwrap();

            let mut target = Values::new();
            target.insert("existing".into(), SessionValue::from("yes"));
            target.insert("count".into(), SessionValue::Int(0));
            serializer.deserialize(&data, &mut target).unwrap();

            assert_eq!(target.len(), 2);
            assert_eq!(target.get(&SessionKey::from("existing")), Some(&SessionValue::from("yes")));
            assert_eq!(target.get(&SessionKey::from("count")), Some(&SessionValue::Int(2)));
        }
    }

    #[test]
    fn test_binary_rejects_garbage() {
        let mut target = Values::new();
        assert!(BinarySerializer.deserialize(&[0xff; 3], &mut target).is_err());
        assert!(target.is_empty());
    }

    #[test]
    fn test_serializer_kind_parse() {
        assert_eq!("json".parse::<SerializerKind>().unwrap(), SerializerKind::Json);
        assert_eq!("Binary".parse::<SerializerKind>().unwrap(), SerializerKind::Binary);
        assert!("gob".parse::<SerializerKind>().is_err());
        assert_eq!(SerializerKind::default(), SerializerKind::Binary);
    }
}
