//! Normalized value types shared by every backend.
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::fmt;

/// Normalized column type, chosen once at discovery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Number,
    Int,
    Bool,
    Time,
    /// Objects, nested documents and anything else without a scalar mapping.
    Unknown,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Int => "int",
            ValueType::Bool => "bool",
            ValueType::Time => "time",
            ValueType::Unknown => "object",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single cell in a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    String(String),
    Int(i64),
    Number(f64),
    Bool(bool),
    Time(DateTime<Utc>),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Text representation as sent over a text protocol, `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::String(s) => Some(s.clone()),
            ScalarValue::Int(v) => Some(v.to_string()),
            ScalarValue::Number(v) => Some(v.to_string()),
            ScalarValue::Bool(v) => Some(if *v { "1" } else { "0" }.to_string()),
            ScalarValue::Time(t) => Some(t.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }

    /// Convert a JSON value from a backend document into a value of the given
    /// type.
    ///
    /// Values that don't fit the declared type are kept as strings rather than
    /// dropped.
    pub fn from_json(value: &serde_json::Value, typ: ValueType) -> ScalarValue {
        use serde_json::Value;

        match (value, typ) {
            (Value::Null, _) => ScalarValue::Null,
            (Value::Bool(b), ValueType::Bool) => ScalarValue::Bool(*b),
            (Value::String(s), ValueType::Bool) => match s.as_str() {
                "true" | "T" | "1" => ScalarValue::Bool(true),
                "false" | "F" | "0" => ScalarValue::Bool(false),
                _ => ScalarValue::String(s.clone()),
            },
            (Value::Number(n), ValueType::Int) => match n.as_i64() {
                Some(v) => ScalarValue::Int(v),
                None => ScalarValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            (Value::String(s), ValueType::Int) => match s.parse::<i64>() {
                Ok(v) => ScalarValue::Int(v),
                Err(_) => ScalarValue::String(s.clone()),
            },
            (Value::Number(n), ValueType::Number) => match n.as_f64() {
                Some(v) => ScalarValue::Number(v),
                None => ScalarValue::String(n.to_string()),
            },
            (Value::String(s), ValueType::Number) => match s.parse::<f64>() {
                Ok(v) => ScalarValue::Number(v),
                Err(_) => ScalarValue::String(s.clone()),
            },
            (Value::String(s), ValueType::Time) => match parse_time(s) {
                Some(t) => ScalarValue::Time(t),
                None => ScalarValue::String(s.clone()),
            },
            (Value::Number(n), ValueType::Time) => {
                // Epoch millis, the search engine's default numeric date format.
                let time = n
                    .as_i64()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single());
                match time {
                    Some(t) => ScalarValue::Time(t),
                    None => ScalarValue::String(n.to_string()),
                }
            }
            (Value::String(s), _) => ScalarValue::String(s.clone()),
            (Value::Bool(b), _) => ScalarValue::String(b.to_string()),
            (Value::Number(n), _) => ScalarValue::String(n.to_string()),
            (other, _) => ScalarValue::String(other.to_string()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(s) => f.write_str(&s),
            None => f.write_str("NULL"),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::String(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int(value)
    }
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(t.and_utc());
    }
    if let Ok(t) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(t.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_from_json() {
        assert_eq!(
            ScalarValue::Int(42),
            ScalarValue::from_json(&json!(42), ValueType::Int)
        );
        assert_eq!(
            ScalarValue::Int(7),
            ScalarValue::from_json(&json!("7"), ValueType::Int)
        );
        assert_eq!(
            ScalarValue::String("abc".to_string()),
            ScalarValue::from_json(&json!("abc"), ValueType::Int)
        );
    }

    #[test]
    fn time_from_json() {
        let v = ScalarValue::from_json(&json!("2015-03-01"), ValueType::Time);
        assert_eq!(Some("2015-03-01 00:00:00".to_string()), v.to_text());

        let v = ScalarValue::from_json(&json!("2015-03-01T10:11:12Z"), ValueType::Time);
        assert_eq!(Some("2015-03-01 10:11:12".to_string()), v.to_text());

        let v = ScalarValue::from_json(&json!(0), ValueType::Time);
        assert_eq!(Some("1970-01-01 00:00:00".to_string()), v.to_text());
    }

    #[test]
    fn object_as_json_text() {
        let v = ScalarValue::from_json(&json!({"a": 1}), ValueType::Unknown);
        assert_eq!(ScalarValue::String(r#"{"a":1}"#.to_string()), v);
    }

    #[test]
    fn null_stays_null() {
        assert!(ScalarValue::from_json(&serde_json::Value::Null, ValueType::String).is_null());
    }
}
