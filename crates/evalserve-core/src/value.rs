//! Session values.

use std::{collections::BTreeMap, fmt};

/// Type name reported for builtin callables.
pub const BUILTIN_TYPE_NAME: &str = "builtin_function_or_method";

/// Type name reported for class objects returned by `type()`.
pub const CLASS_TYPE_NAME: &str = "type";

/// A value held in the session store.
///
/// Everything except [`Value::Opaque`] maps onto JSON. Opaque values are
/// produced by the code-execution capability for things that have no data
/// representation, such as a reference to a builtin function.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Opaque(Opaque),
}

/// Executor-native value with no JSON form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opaque {
    type_name: String,
    name: String,
}

impl Opaque {
    /// Create an opaque value of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Reference to a builtin function.
    #[must_use]
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::new(BUILTIN_TYPE_NAME, name)
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class object, as returned by `type(x)`.
    #[must_use]
    pub fn class(name: impl Into<String>) -> Self {
        Self::new(CLASS_TYPE_NAME, name)
    }

    /// Whether this is a builtin function reference.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.type_name == BUILTIN_TYPE_NAME
    }
}

impl fmt::Display for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_builtin() {
            write!(f, "<built-in function {}>", self.name)
        } else if self.type_name == CLASS_TYPE_NAME {
            write!(f, "<class '{}'>", self.name)
        } else {
            write!(f, "<{} {}>", self.type_name, self.name)
        }
    }
}

impl Value {
    /// Name of the value's type, as shown in error messages.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "dict",
            Self::Opaque(o) => o.type_name(),
        }
    }

    /// Source-like rendering: strings are quoted and escaped.
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            Self::Str(s) => quote_str(s),
            other => other.to_string(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_str(&self) -> bool {
        matches!(self, Self::Str(_))
    }
}

/// Plain rendering. Strings are emitted raw at the top level and quoted
/// inside containers.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&item.repr())?;
                }
                f.write_str("]")
            }
            Self::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", quote_str(key), value.repr())?;
                }
                f.write_str("}")
            }
            Self::Opaque(o) => write!(f, "{o}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::List(items)
    }
}

/// Format a float the way the numeric host expects: always with a decimal
/// point or exponent, exponent carries a sign and at least two digits.
#[must_use]
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let sci = format!("{x:e}");
        return match sci.split_once('e') {
            Some((mantissa, exp)) => {
                let exp: i32 = exp.parse().unwrap_or(0);
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{mantissa}e{sign}{:02}", exp.abs())
            }
            None => sci,
        };
    }

    let plain = format!("{x}");
    if plain.contains('.') {
        plain
    } else {
        format!("{plain}.0")
    }
}

/// Quote a string, preferring single quotes.
#[must_use]
pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_formatting() {
        assert_eq!(format_float(7.0), "7.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e20), "1e+20");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NAN), "nan");
    }

    #[test]
    fn test_quote_prefers_single_quotes() {
        assert_eq!(quote_str("abc"), "'abc'");
        assert_eq!(quote_str("it's"), "\"it's\"");
        assert_eq!(quote_str("a\nb"), "'a\\nb'");
        assert_eq!(quote_str("both ' and \""), "'both \\' and \"'");
    }

    #[test]
    fn test_display_nested() {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::List(vec![Value::Int(1), "a".into()]));
        map.insert("n".to_string(), Value::Null);
        let value = Value::Map(map);
        assert_eq!(value.to_string(), "{'k': [1, 'a'], 'n': None}");
    }

    #[test]
    fn test_top_level_string_is_raw() {
        let value = Value::from("hello");
        assert_eq!(value.to_string(), "hello");
        assert_eq!(value.repr(), "'hello'");
    }

    #[test]
    fn test_opaque_display() {
        let value = Value::Opaque(Opaque::builtin("len"));
        assert_eq!(value.to_string(), "<built-in function len>");
        assert_eq!(value.type_name(), BUILTIN_TYPE_NAME);
        assert_eq!(Opaque::class("int").to_string(), "<class 'int'>");
    }
}
