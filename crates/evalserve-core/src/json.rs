//! JSON encoding and decoding of session values.

use std::{collections::BTreeMap, io};

use serde::Serialize;
use serde_json::ser::Formatter;
use thiserror::Error;

use crate::Value;

/// JSON conversion error.
#[derive(Debug, Error)]
pub enum JsonError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("Object of type {0} is not JSON serializable")]
    NotSerializable(String),
    #[error("Out of range float values are not JSON compliant")]
    OutOfRangeFloat,
}

/// Parse JSON text into a value.
///
/// # Errors
/// Returns error if the text is not valid JSON.
pub fn from_json_str(text: &str) -> Result<Value, JsonError> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    Ok(Value::from(json))
}

/// Serialize a value to JSON text with `", "` and `": "` separators and
/// non-ASCII characters escaped.
///
/// # Errors
/// Returns error for opaque values and non-finite floats.
pub fn to_json_string(value: &Value) -> Result<String, JsonError> {
    let json = serde_json::Value::try_from(value)?;
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    json.serialize(&mut ser)?;
    // The formatter only ever emits ASCII.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            serde_json::Value::String(s) => Self::Str(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Self::from(v)))
                    .collect::<BTreeMap<_, _>>(),
            ),
        }
    }
}

impl TryFrom<&Value> for serde_json::Value {
    type Error = JsonError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::from(*i),
            Value::Float(x) => {
                let n = serde_json::Number::from_f64(*x).ok_or(JsonError::OutOfRangeFloat)?;
                Self::Number(n)
            }
            Value::Str(s) => Self::String(s.clone()),
            Value::List(items) => Self::Array(
                items
                    .iter()
                    .map(Self::try_from)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Map(entries) => {
                let mut object = serde_json::Map::new();
                for (key, item) in entries {
                    object.insert(key.clone(), Self::try_from(item)?);
                }
                Self::Object(object)
            }
            Value::Opaque(o) => return Err(JsonError::NotSerializable(o.type_name().to_string())),
        })
    }
}

/// Compact JSON with a space after each separator and `\uXXXX` escapes for
/// anything outside ASCII.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}
