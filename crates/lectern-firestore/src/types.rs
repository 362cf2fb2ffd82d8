//! Firestore REST API types and JSON conversion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};
use std::collections::HashMap;

/// Firestore document value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: Option<HashMap<String, Value>>,
}

impl Value {
    /// Encode a JSON value in Firestore's typed representation.
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Value::NullValue(()),
            Json::Bool(b) => Value::BooleanValue(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::IntegerValue(i.to_string()),
                None => Value::DoubleValue(n.as_f64().unwrap_or(0.0)),
            },
            Json::String(s) => Value::StringValue(s.clone()),
            Json::Array(items) => Value::ArrayValue(ArrayValue {
                values: Some(items.iter().map(Value::from_json).collect()),
            }),
            Json::Object(map) => Value::MapValue(MapValue {
                fields: Some(
                    map.iter()
                        .map(|(k, v)| (k.clone(), Value::from_json(v)))
                        .collect(),
                ),
            }),
        }
    }

    /// Decode back to plain JSON. Timestamps, bytes and references become strings.
    pub fn to_json(&self) -> Json {
        match self {
            Value::NullValue(()) => Json::Null,
            Value::BooleanValue(b) => Json::Bool(*b),
            Value::IntegerValue(s) => s
                .parse::<i64>()
                .map(|i| Json::Number(i.into()))
                .unwrap_or_else(|_| Json::String(s.clone())),
            Value::DoubleValue(f) => Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null),
            Value::TimestampValue(s) | Value::StringValue(s) | Value::BytesValue(s) | Value::ReferenceValue(s) => {
                Json::String(s.clone())
            }
            Value::GeoPointValue(p) => serde_json::json!({
                "latitude": p.latitude,
                "longitude": p.longitude,
            }),
            Value::ArrayValue(a) => Json::Array(
                a.values
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(Value::to_json)
                    .collect(),
            ),
            Value::MapValue(m) => Json::Object(fields_to_json(m.fields.as_ref())),
        }
    }
}

/// Convert a top-level JSON object into document fields.
pub fn fields_from_json(map: &Map<String, Json>) -> HashMap<String, Value> {
    map.iter()
        .map(|(k, v)| (k.clone(), Value::from_json(v)))
        .collect()
}

/// Convert document fields into a JSON object.
pub fn fields_to_json(fields: Option<&HashMap<String, Value>>) -> Map<String, Json> {
    fields
        .map(|f| f.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
        .unwrap_or_default()
}

/// Firestore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Used as the compare-and-swap token for conditional writes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    /// Last path segment of the resource name.
    pub fn doc_id(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.rsplit('/').next())
    }

    pub fn to_json_object(&self) -> Map<String, Json> {
        fields_to_json(self.fields.as_ref())
    }
}

/// List documents response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Option<Vec<Document>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip_preserves_shape() {
        let original = json!({
            "status": "ready",
            "duration": 694.5,
            "count": 3,
            "flag": true,
            "missing": null,
            "concepts": [{"concept": "Entropy", "timestamp": 12}]
        });
        let encoded = Value::from_json(&original);
        assert_eq!(encoded.to_json(), original);
    }

    #[test]
    fn test_wire_encoding() {
        let v = serde_json::to_value(Value::from_json(&json!(5))).unwrap();
        assert_eq!(v, json!({"integerValue": "5"}));

        let v = serde_json::to_value(Value::from_json(&json!(null))).unwrap();
        assert_eq!(v, json!({"nullValue": null}));

        let v = serde_json::to_value(Value::from_json(&json!(["a"]))).unwrap();
        assert_eq!(v, json!({"arrayValue": {"values": [{"stringValue": "a"}]}}));
    }

    #[test]
    fn test_decodes_timestamp_and_empty_array() {
        let doc: Document = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/videos/v1",
            "fields": {
                "createdAt": {"timestampValue": "2024-01-01T00:00:00Z"},
                "quiz": {"arrayValue": {}}
            },
            "updateTime": "2024-01-01T00:00:01.000001Z"
        }))
        .unwrap();

        assert_eq!(doc.doc_id(), Some("v1"));
        let obj = doc.to_json_object();
        assert_eq!(obj["createdAt"], "2024-01-01T00:00:00Z");
        assert_eq!(obj["quiz"], json!([]));
    }
}
