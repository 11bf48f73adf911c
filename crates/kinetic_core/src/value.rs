//! Animatable values
//!
//! [`Value`] is the tagged union every animated node resolves to. Numbers
//! and strings are the primitives; lists and maps are composites built from
//! them. Hosts receive values flattened into a [`PropertyMap`].

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Flat, ordered property map handed to renderer adapters
pub type PropertyMap = IndexMap<String, Value>;

/// A resolved animation value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A scalar
    Number(f64),
    /// A color, CSS transform, or any string with embedded numbers
    Text(String),
    /// A vector of values (usually numbers)
    List(Vec<Value>),
    /// Named values
    Map(IndexMap<String, Value>),
}

/// Discriminant of a [`Value`], used in error messages
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Text,
    List,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Number => "number",
            ValueKind::Text => "string",
            ValueKind::List => "list",
            ValueKind::Map => "map",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Text(_) => ValueKind::Text,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Numeric components of a number or a flat list of numbers
    ///
    /// Returns `None` for strings, maps, and lists containing non-numbers.
    pub fn numbers(&self) -> Option<Vec<f64>> {
        match self {
            Value::Number(n) => Some(vec![*n]),
            Value::List(items) => items.iter().map(Value::as_number).collect(),
            _ => None,
        }
    }

    /// Look up a dotted path (`"shadow.color"`) inside nested maps
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        path.split('.').try_fold(self, |value, segment| match value {
            Value::Map(map) => map.get(segment),
            Value::List(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Flatten nested maps into dotted keys
    ///
    /// Top-level non-map values are stored under the empty key. Lists are kept
    /// intact so hosts can compose them (e.g. into a transform) themselves.
    pub fn flatten(&self) -> PropertyMap {
        let mut out = PropertyMap::new();
        match self {
            Value::Map(map) => {
                for (key, value) in map {
                    flatten_into(key, value, &mut out);
                }
            }
            other => {
                out.insert(String::new(), other.clone());
            }
        }
        out
    }
}

fn flatten_into(prefix: &str, value: &Value, out: &mut PropertyMap) {
    match value {
        Value::Map(map) => {
            for (key, nested) in map {
                flatten_into(&format!("{prefix}.{key}"), nested, out);
            }
        }
        other => {
            out.insert(prefix.to_string(), other.clone());
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Format a number the way it is spliced back into templated strings
///
/// Integral values print without a fractional part and negative zero
/// prints as `0`.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    format!("{n}")
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value::List(values.into_iter().map(Value::Number).collect())
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(values: [f64; N]) -> Self {
        Value::List(values.into_iter().map(Value::Number).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(127.5), "127.5");
        assert_eq!(format_number(-12.0), "-12");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(Value::from(3.0).numbers(), Some(vec![3.0]));
        assert_eq!(Value::from([1.0, 2.0]).numbers(), Some(vec![1.0, 2.0]));
        assert_eq!(Value::from("1px").numbers(), None);
        assert_eq!(
            Value::List(vec![Value::from(1.0), Value::from("a")]).numbers(),
            None
        );
    }

    #[test]
    fn test_flatten_nested_maps() {
        let mut shadow = IndexMap::new();
        shadow.insert("blur".to_string(), Value::from(4.0));
        shadow.insert("color".to_string(), Value::from("rgba(0,0,0,1)"));

        let mut style = IndexMap::new();
        style.insert("opacity".to_string(), Value::from(0.5));
        style.insert("shadow".to_string(), Value::Map(shadow));

        let flat = Value::Map(style).flatten();
        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["opacity", "shadow.blur", "shadow.color"]);
        assert_eq!(flat["shadow.blur"], Value::from(4.0));
    }

    #[test]
    fn test_get_path() {
        let value: Value = serde_json::from_str(r#"{"a": {"b": [1, 2, 3]}}"#).unwrap();
        assert_eq!(value.get_path("a.b.1"), Some(&Value::Number(2.0)));
        assert_eq!(value.get_path("a.c"), None);
    }

    #[test]
    fn test_untagged_serde() {
        let value: Value = serde_json::from_str(r#"[0, "10px", {"x": 1}]"#).unwrap();
        assert_eq!(
            value.as_list().map(|items| items.iter().map(Value::kind).collect::<Vec<_>>()),
            Some(vec![ValueKind::Number, ValueKind::Text, ValueKind::Map])
        );
        let json = serde_json::to_string(&Value::from(vec![1.0, 2.5])).unwrap();
        assert_eq!(json, "[1.0,2.5]");
    }
}
