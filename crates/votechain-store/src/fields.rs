//! Typed field values of the hosted document database's REST encoding.

use crate::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

pub fn string(value: &str) -> Value {
    json!({ "stringValue": value })
}

/// 64-bit integers travel as decimal strings.
pub fn integer(value: i64) -> Value {
    json!({ "integerValue": value.to_string() })
}

pub fn timestamp(value: DateTime<Utc>) -> Value {
    json!({ "timestampValue": value.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

pub fn string_array(values: &[String]) -> Value {
    let values: Vec<Value> = values.iter().map(|v| string(v)).collect();
    json!({ "arrayValue": { "values": values } })
}

/// Read access to the `fields` map of one document.
pub struct Fields<'a> {
    document: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    pub fn new(document: &'a str, map: &'a Map<String, Value>) -> Self {
        Self { document, map }
    }

    fn missing(&self, name: &str) -> StoreError {
        StoreError::Decode(format!("{}: missing or mistyped field '{name}'", self.document))
    }

    pub fn optional_string(&self, name: &str) -> Option<String> {
        self.map
            .get(name)?
            .get("stringValue")?
            .as_str()
            .map(str::to_string)
    }

    pub fn string(&self, name: &str) -> Result<String, StoreError> {
        self.optional_string(name).ok_or_else(|| self.missing(name))
    }

    pub fn integer(&self, name: &str) -> Result<i64, StoreError> {
        let value = self.map.get(name).ok_or_else(|| self.missing(name))?;
        if let Some(raw) = value.get("integerValue") {
            return match raw {
                Value::String(s) => s.parse().map_err(|_| self.missing(name)),
                Value::Number(n) => n.as_i64().ok_or_else(|| self.missing(name)),
                _ => Err(self.missing(name)),
            };
        }
        value
            .get("doubleValue")
            .and_then(Value::as_f64)
            .filter(|f| f.fract() == 0.0)
            .map(|f| f as i64)
            .ok_or_else(|| self.missing(name))
    }

    /// Accepts native timestamps and RFC 3339 strings.
    pub fn timestamp(&self, name: &str) -> Result<DateTime<Utc>, StoreError> {
        let value = self.map.get(name).ok_or_else(|| self.missing(name))?;
        let raw = value
            .get("timestampValue")
            .or_else(|| value.get("stringValue"))
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(name))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StoreError::Decode(format!("{}: field '{name}': {e}", self.document)))
    }

    pub fn string_array(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let array = self
            .map
            .get(name)
            .and_then(|v| v.get("arrayValue"))
            .ok_or_else(|| self.missing(name))?;
        // An empty array is encoded without a `values` key.
        let Some(values) = array.get("values").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };
        values
            .iter()
            .map(|v| {
                v.get("stringValue")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| self.missing(name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn integers_accept_string_and_number_encodings() {
        let fields = map(json!({
            "a": { "integerValue": "42" },
            "b": { "integerValue": 7 },
            "c": { "doubleValue": 3.0 },
            "d": { "doubleValue": 3.5 },
        }));
        let reader = Fields::new("votes/v1", &fields);
        assert_eq!(reader.integer("a").expect("a"), 42);
        assert_eq!(reader.integer("b").expect("b"), 7);
        assert_eq!(reader.integer("c").expect("c"), 3);
        assert!(reader.integer("d").is_err());
        assert!(reader.integer("missing").is_err());
    }

    #[test]
    fn timestamps_are_utc_with_microseconds() {
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).single().expect("time");
        assert_eq!(
            timestamp(t),
            json!({ "timestampValue": "2025-03-01T12:00:00.000000Z" })
        );

        let fields = map(json!({
            "native": timestamp(t),
            "text": { "stringValue": "2025-03-01T13:00:00+01:00" },
        }));
        let reader = Fields::new("polls/p1", &fields);
        assert_eq!(reader.timestamp("native").expect("native"), t);
        assert_eq!(reader.timestamp("text").expect("text"), t);
    }

    #[test]
    fn empty_array_has_no_values_key() {
        let fields = map(json!({
            "empty": { "arrayValue": {} },
            "names": string_array(&["A".to_string(), "B".to_string()]),
        }));
        let reader = Fields::new("polls/p1", &fields);
        assert!(reader.string_array("empty").expect("empty").is_empty());
        assert_eq!(reader.string_array("names").expect("names"), vec!["A", "B"]);
    }
}
