//! Operator semantics on session values.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use std::cmp::Ordering;

use evalserve_core::{ScriptError, Value};

use crate::parser::{BinOp, CmpOp};

/// Upper bound on the length of strings and lists built by repetition,
/// concatenation or `range`.
pub const MAX_SEQUENCE_LEN: usize = 1 << 24;

/// Upper bound on the total size of a value, counted by [`Shape`].
pub const MAX_VALUE_SIZE: usize = 1 << 25;

/// Deepest container nesting a value may reach.
pub const MAX_NESTING: usize = 1000;

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    const fn to_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(x) => x,
        }
    }
}

const fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Bool(b) => Some(Num::Int(*b as i64)),
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Float(x) => Some(Num::Float(*x)),
        _ => None,
    }
}

/// Truthiness: empty containers, zero and `None` are false.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(x) => *x != 0.0,
        Value::Str(s) => !s.is_empty(),
        Value::List(items) => !items.is_empty(),
        Value::Map(entries) => !entries.is_empty(),
        Value::Opaque(_) => true,
    }
}

pub fn too_large() -> ScriptError {
    ScriptError::Limit("result is too large".to_string())
}

pub fn too_deep() -> ScriptError {
    ScriptError::Limit("maximum recursion depth exceeded".to_string())
}

/// Size and container depth of one or more values.
///
/// Size counts one unit per value plus one per byte of string data and map
/// keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Shape {
    pub size: usize,
    pub depth: usize,
}

impl Shape {
    #[must_use]
    pub fn of(value: &Value) -> Self {
        Self::of_all(std::iter::once(value))
    }

    /// Combined shape of several values, measured without recursion.
    /// Measuring stops once either limit is passed.
    #[must_use]
    pub fn of_all<'v, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'v Value>,
        I::IntoIter: 'v,
    {
        let mut shape = Self::default();
        let mut stack: Vec<Box<dyn Iterator<Item = &'v Value> + 'v>> =
            vec![Box::new(values.into_iter())];

        while let Some(top) = stack.last_mut() {
            let Some(value) = top.next() else {
                stack.pop();
                continue;
            };
            shape.size = shape.size.saturating_add(1);
            match value {
                Value::Str(s) => shape.size = shape.size.saturating_add(s.len()),
                Value::List(items) => stack.push(Box::new(items.iter())),
                Value::Map(entries) => {
                    let keys: usize = entries.keys().map(String::len).sum();
                    shape.size = shape.size.saturating_add(keys);
                    stack.push(Box::new(entries.values()));
                }
                _ => {}
            }
            shape.depth = shape.depth.max(stack.len() - 1);
            if shape.size > MAX_VALUE_SIZE || shape.depth > MAX_NESTING {
                break;
            }
        }
        shape
    }

    /// Shape of two groups of values taken together.
    #[must_use]
    pub const fn and(self, other: Self) -> Self {
        Self {
            size: self.size.saturating_add(other.size),
            depth: if self.depth > other.depth { self.depth } else { other.depth },
        }
    }

    /// Shape of a container holding contents of this shape.
    #[must_use]
    pub const fn nested(self) -> Self {
        Self {
            size: self.size.saturating_add(1),
            depth: self.depth.saturating_add(1),
        }
    }

    /// # Errors
    /// Limit error when the shape is too deep or too large.
    pub fn check(self) -> Result<Self, ScriptError> {
        if self.depth > MAX_NESTING {
            Err(too_deep())
        } else if self.size > MAX_VALUE_SIZE {
            Err(too_large())
        } else {
            Ok(self)
        }
    }
}

fn unsupported(op: BinOp, left: &Value, right: &Value) -> ScriptError {
    ScriptError::Type(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

fn overflow() -> ScriptError {
    ScriptError::Overflow("integer overflow".to_string())
}

/// Apply a binary arithmetic operator.
///
/// # Errors
/// Type errors for unsupported operand types, division by zero, overflow
/// and size limits.
pub fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, ScriptError> {
    match (op, &left, &right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            if a.len() + b.len() > MAX_SEQUENCE_LEN {
                return Err(too_large());
            }
            Ok(Value::Str(format!("{a}{b}")))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            if a.len() + b.len() > MAX_SEQUENCE_LEN {
                return Err(too_large());
            }
            Shape::of_all(a.iter().chain(b)).nested().check()?;
            let mut items = a.clone();
            items.extend(b.iter().cloned());
            Ok(Value::List(items))
        }
        (BinOp::Mul, Value::Str(s), n @ (Value::Int(_) | Value::Bool(_)))
        | (BinOp::Mul, n @ (Value::Int(_) | Value::Bool(_)), Value::Str(s)) => {
            let count = repeat_count(n, s.len())?;
            Ok(Value::Str(s.repeat(count)))
        }
        (BinOp::Mul, Value::List(items), n @ (Value::Int(_) | Value::Bool(_)))
        | (BinOp::Mul, n @ (Value::Int(_) | Value::Bool(_)), Value::List(items)) => {
            let count = repeat_count(n, items.len())?;
            let unit = Shape::of_all(items);
            Shape {
                size: unit.size.saturating_mul(count),
                depth: unit.depth,
            }
            .nested()
            .check()?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            Ok(Value::List(out))
        }
        _ => numeric(op, &left, &right),
    }
}

fn repeat_count(n: &Value, unit: usize) -> Result<usize, ScriptError> {
    let n = match as_num(n) {
        Some(Num::Int(i)) => i,
        _ => 0,
    };
    let count = usize::try_from(n.max(0)).map_err(|_| too_large())?;
    match unit.checked_mul(count) {
        Some(total) if total <= MAX_SEQUENCE_LEN => Ok(count),
        _ => Err(too_large()),
    }
}

fn numeric(op: BinOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    let (Some(a), Some(b)) = (as_num(left), as_num(right)) else {
        return Err(unsupported(op, left, right));
    };
    match (a, b) {
        (Num::Int(a), Num::Int(b)) => int_op(op, a, b),
        (a, b) => float_op(op, a.to_f64(), b.to_f64()),
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, ScriptError> {
    let result = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(ScriptError::ZeroDivision("division by zero".to_string()));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(ScriptError::ZeroDivision(
                    "integer division or modulo by zero".to_string(),
                ));
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(ScriptError::ZeroDivision(
                    "integer modulo by zero".to_string(),
                ));
            }
            let r = a.wrapping_rem(b);
            if r != 0 && ((r < 0) != (b < 0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if b < 0 {
                return float_op(op, a as f64, b as f64);
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(result))
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<Value, ScriptError> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(ScriptError::ZeroDivision(
                    "float division by zero".to_string(),
                ));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(ScriptError::ZeroDivision(
                    "float floor division by zero".to_string(),
                ));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(ScriptError::ZeroDivision("float modulo".to_string()));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ScriptError::ZeroDivision(
                    "0.0 cannot be raised to a negative power".to_string(),
                ));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(ScriptError::Value("math domain error".to_string()));
            }
            let r = a.powf(b);
            if r.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(ScriptError::Overflow(
                    "Numerical result out of range".to_string(),
                ));
            }
            r
        }
    };
    Ok(Value::Float(result))
}

/// Unary minus.
///
/// # Errors
/// Type error for non-numeric operands, overflow on `-i64::MIN`.
pub fn negate(value: &Value) -> Result<Value, ScriptError> {
    match as_num(value) {
        Some(Num::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        Some(Num::Float(x)) => Ok(Value::Float(-x)),
        None => Err(ScriptError::Type(format!(
            "bad operand type for unary -: '{}'",
            value.type_name()
        ))),
    }
}

/// Unary plus.
///
/// # Errors
/// Type error for non-numeric operands.
pub fn positive(value: &Value) -> Result<Value, ScriptError> {
    match as_num(value) {
        Some(Num::Int(i)) => Ok(Value::Int(i)),
        Some(Num::Float(x)) => Ok(Value::Float(x)),
        None => Err(ScriptError::Type(format!(
            "bad operand type for unary +: '{}'",
            value.type_name()
        ))),
    }
}

/// Structural equality; numbers compare by value across int, float and bool.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_num(left), as_num(right)) {
        return match (a, b) {
            (Num::Int(a), Num::Int(b)) => a == b,
            (a, b) => a.to_f64() == b.to_f64(),
        };
    }
    match (left, right) {
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => left == right,
    }
}

/// Ordering between two values. `Ok(None)` means unordered (NaN).
///
/// # Errors
/// Type error when the types cannot be ordered.
pub fn order(op: CmpOp, left: &Value, right: &Value) -> Result<Option<Ordering>, ScriptError> {
    if let (Some(a), Some(b)) = (as_num(left), as_num(right)) {
        return Ok(match (a, b) {
            (Num::Int(a), Num::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
        });
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                if values_equal(x, y) {
                    continue;
                }
                return order(op, x, y);
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => Err(ScriptError::Type(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Evaluate one comparison.
///
/// # Errors
/// Type errors for unordered types and invalid membership tests.
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ScriptError> {
    Ok(match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::NotEq => !values_equal(left, right),
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Lt => order(op, left, right)? == Some(Ordering::Less),
        CmpOp::Le => matches!(
            order(op, left, right)?,
            Some(Ordering::Less | Ordering::Equal)
        ),
        CmpOp::Gt => order(op, left, right)? == Some(Ordering::Greater),
        CmpOp::Ge => matches!(
            order(op, left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
    })
}

/// Membership test: `item in container`.
///
/// # Errors
/// Type error when the container is not iterable.
pub fn contains(container: &Value, item: &Value) -> Result<bool, ScriptError> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_str())),
            other => Err(ScriptError::Type(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.iter().any(|x| values_equal(x, item))),
        Value::Map(entries) => Ok(item.as_str().is_some_and(|k| entries.contains_key(k))),
        other => Err(ScriptError::Type(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn int_index(value: &Value) -> Option<i64> {
    match as_num(value) {
        Some(Num::Int(i)) => Some(i),
        _ => None,
    }
}

fn normalize(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

fn missing_key(key: &Value) -> ScriptError {
    ScriptError::Key(key.repr())
}

/// `base[index]`.
///
/// # Errors
/// Index, key and type errors.
pub fn index(base: &Value, idx: &Value) -> Result<Value, ScriptError> {
    match base {
        Value::List(items) => {
            let i = int_index(idx).ok_or_else(|| {
                ScriptError::Type(format!(
                    "list indices must be integers or slices, not {}",
                    idx.type_name()
                ))
            })?;
            normalize(i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| ScriptError::Index("list index out of range".to_string()))
        }
        Value::Str(s) => {
            let i = int_index(idx).ok_or_else(|| {
                ScriptError::Type(format!(
                    "string indices must be integers, not '{}'",
                    idx.type_name()
                ))
            })?;
            let count = s.chars().count();
            normalize(i, count)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::Str(c.to_string()))
                .ok_or_else(|| ScriptError::Index("string index out of range".to_string()))
        }
        Value::Map(entries) => idx
            .as_str()
            .and_then(|k| entries.get(k))
            .cloned()
            .ok_or_else(|| missing_key(idx)),
        other => Err(ScriptError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Mutable access to `base[idx]`, for nested assignment.
///
/// # Errors
/// Index, key and type errors.
pub fn index_mut<'a>(base: &'a mut Value, idx: &Value) -> Result<&'a mut Value, ScriptError> {
    match base {
        Value::List(items) => {
            let i = int_index(idx).ok_or_else(|| {
                ScriptError::Type(format!(
                    "list indices must be integers or slices, not {}",
                    idx.type_name()
                ))
            })?;
            let len = items.len();
            normalize(i, len)
                .and_then(move |i| items.get_mut(i))
                .ok_or_else(|| ScriptError::Index("list index out of range".to_string()))
        }
        Value::Map(entries) => match idx.as_str() {
            Some(k) => entries.get_mut(k).ok_or_else(|| missing_key(idx)),
            None => Err(missing_key(idx)),
        },
        other => Err(ScriptError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

fn map_key(key: Value) -> Result<String, ScriptError> {
    match key {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::Type(format!(
            "dict keys must be str, not {}",
            other.type_name()
        ))),
    }
}

/// Convert an evaluated dict-literal key.
///
/// # Errors
/// Type error for non-string keys.
pub fn dict_key(key: Value) -> Result<String, ScriptError> {
    map_key(key)
}

/// `base[idx] = value`.
///
/// # Errors
/// Index and type errors.
pub fn set_index(base: &mut Value, idx: Value, value: Value) -> Result<(), ScriptError> {
    match base {
        Value::List(items) => {
            let i = int_index(&idx).ok_or_else(|| {
                ScriptError::Type(format!(
                    "list indices must be integers or slices, not {}",
                    idx.type_name()
                ))
            })?;
            let slot = normalize(i, items.len()).ok_or_else(|| {
                ScriptError::Index("list assignment index out of range".to_string())
            })?;
            items[slot] = value;
            Ok(())
        }
        Value::Map(entries) => {
            entries.insert(map_key(idx)?, value);
            Ok(())
        }
        other => Err(ScriptError::Type(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

/// `del base[idx]`.
///
/// # Errors
/// Index, key and type errors.
pub fn del_index(base: &mut Value, idx: &Value) -> Result<(), ScriptError> {
    match base {
        Value::List(items) => {
            let i = int_index(idx).ok_or_else(|| {
                ScriptError::Type(format!(
                    "list indices must be integers or slices, not {}",
                    idx.type_name()
                ))
            })?;
            let slot = normalize(i, items.len()).ok_or_else(|| {
                ScriptError::Index("list assignment index out of range".to_string())
            })?;
            items.remove(slot);
            Ok(())
        }
        Value::Map(entries) => idx
            .as_str()
            .and_then(|k| entries.remove(k))
            .map(|_| ())
            .ok_or_else(|| missing_key(idx)),
        other => Err(ScriptError::Type(format!(
            "'{}' object does not support item deletion",
            other.type_name()
        ))),
    }
}

fn slice_bound(bound: Option<&Value>, len: usize, default: usize) -> Result<usize, ScriptError> {
    let Some(bound) = bound.filter(|b| !matches!(b, Value::Null)) else {
        return Ok(default);
    };
    let i = int_index(bound).ok_or_else(|| {
        ScriptError::Type(
            "slice indices must be integers or None or have an __index__ method".to_string(),
        )
    })?;
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let clamped = if i < 0 { (i + len_i).max(0) } else { i.min(len_i) };
    Ok(usize::try_from(clamped).unwrap_or(0))
}

/// `base[start:stop]`.
///
/// # Errors
/// Type errors for unsliceable values and non-integer bounds.
pub fn slice(base: &Value, start: Option<&Value>, stop: Option<&Value>) -> Result<Value, ScriptError> {
    match base {
        Value::List(items) => {
            let len = items.len();
            let (lo, hi) = (slice_bound(start, len, 0)?, slice_bound(stop, len, len)?);
            Ok(Value::List(if lo < hi {
                items[lo..hi].to_vec()
            } else {
                Vec::new()
            }))
        }
        Value::Str(s) => {
            let len = s.chars().count();
            let (lo, hi) = (slice_bound(start, len, 0)?, slice_bound(stop, len, len)?);
            Ok(Value::Str(if lo < hi {
                s.chars().skip(lo).take(hi - lo).collect()
            } else {
                String::new()
            }))
        }
        other => Err(ScriptError::Type(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Items produced by iterating a value.
///
/// # Errors
/// Type error for non-iterable values.
pub fn iterate(value: &Value) -> Result<Vec<Value>, ScriptError> {
    match value {
        Value::List(items) => Ok(items.clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
        Value::Map(entries) => Ok(entries.keys().map(|k| Value::Str(k.clone())).collect()),
        other => Err(ScriptError::Type(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(i: i64) -> Value {
        Value::Int(i)
    }

    #[test]
    fn test_int_arithmetic() {
        assert_eq!(binary(BinOp::Add, int(5), int(2)).unwrap(), int(7));
        assert_eq!(binary(BinOp::Div, int(7), int(2)).unwrap(), Value::Float(3.5));
        assert_eq!(binary(BinOp::FloorDiv, int(-7), int(2)).unwrap(), int(-4));
        assert_eq!(binary(BinOp::Mod, int(-7), int(2)).unwrap(), int(1));
        assert_eq!(binary(BinOp::Mod, int(7), int(-2)).unwrap(), int(-1));
        assert_eq!(binary(BinOp::Pow, int(2), int(10)).unwrap(), int(1024));
        assert_eq!(binary(BinOp::Pow, int(2), int(-1)).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_mixed_and_bool_arithmetic() {
        assert_eq!(
            binary(BinOp::Add, int(1), Value::Float(0.5)).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(binary(BinOp::Add, Value::Bool(true), int(1)).unwrap(), int(2));
        assert_eq!(
            binary(BinOp::FloorDiv, Value::Float(7.5), int(2)).unwrap(),
            Value::Float(3.0)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(
            binary(BinOp::Div, int(1), int(0)).unwrap_err().to_string(),
            "division by zero"
        );
        assert!(matches!(
            binary(BinOp::Mod, Value::Float(1.0), Value::Float(0.0)),
            Err(ScriptError::ZeroDivision(_))
        ));
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert!(matches!(
            binary(BinOp::Mul, int(i64::MAX), int(2)),
            Err(ScriptError::Overflow(_))
        ));
        assert!(matches!(negate(&int(i64::MIN)), Err(ScriptError::Overflow(_))));
    }

    #[test]
    fn test_sequence_operators() {
        assert_eq!(
            binary(BinOp::Add, "ab".into(), "cd".into()).unwrap(),
            Value::from("abcd")
        );
        assert_eq!(
            binary(BinOp::Mul, int(3), "ab".into()).unwrap(),
            Value::from("ababab")
        );
        assert_eq!(
            binary(BinOp::Mul, Value::List(vec![int(0)]), int(3)).unwrap(),
            Value::List(vec![int(0), int(0), int(0)])
        );
        assert_eq!(
            binary(BinOp::Mul, "ab".into(), int(-1)).unwrap(),
            Value::from("")
        );
        assert!(matches!(
            binary(BinOp::Mul, "ab".into(), int(i64::MAX)),
            Err(ScriptError::Limit(_))
        ));
    }

    #[test]
    fn test_repetition_counts_nested_elements() {
        let row = binary(BinOp::Mul, Value::List(vec![int(0)]), int(100_000)).unwrap();
        let grid = binary(BinOp::Mul, Value::List(vec![row.clone()]), int(100_000));
        assert_eq!(grid.unwrap_err().to_string(), "result is too large");

        let small = binary(BinOp::Mul, Value::List(vec![row]), int(3)).unwrap();
        assert_eq!(Shape::of(&small), Shape { size: 300_004, depth: 2 });
    }

    #[test]
    fn test_concatenation_counts_nested_elements() {
        let text = Value::from("x".repeat(MAX_VALUE_SIZE / 2));
        let pair = Value::List(vec![text]);
        let result = binary(BinOp::Add, pair.clone(), pair);
        assert_eq!(result.unwrap_err().to_string(), "result is too large");
    }

    #[test]
    fn test_shape_depth() {
        assert_eq!(Shape::of(&int(1)).depth, 0);
        assert_eq!(Shape::of(&Value::List(vec![])).depth, 1);

        let mut deep = Value::List(vec![]);
        for _ in 0..MAX_NESTING {
            deep = Value::List(vec![deep]);
        }
        assert_eq!(
            Shape::of(&deep).check().unwrap_err().to_string(),
            "maximum recursion depth exceeded"
        );
    }

    #[test]
    fn test_unsupported_operands() {
        let err = binary(BinOp::Add, int(1), "a".into()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported operand type(s) for +: 'int' and 'str'"
        );
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CmpOp::Eq, &int(1), &Value::Float(1.0)).unwrap());
        assert!(compare(CmpOp::Lt, &"a".into(), &"b".into()).unwrap());
        assert!(
            compare(
                CmpOp::Lt,
                &Value::List(vec![int(1), int(2)]),
                &Value::List(vec![int(1), int(3)])
            )
            .unwrap()
        );
        assert!(!compare(CmpOp::Lt, &Value::Float(f64::NAN), &int(1)).unwrap());
        let err = compare(CmpOp::Lt, &"a".into(), &int(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'<' not supported between instances of 'str' and 'int'"
        );
    }

    #[test]
    fn test_membership() {
        assert!(compare(CmpOp::In, &"ell".into(), &"hello".into()).unwrap());
        assert!(compare(CmpOp::In, &int(2), &Value::List(vec![int(1), int(2)])).unwrap());
        assert!(compare(CmpOp::NotIn, &int(3), &Value::List(vec![int(1)])).unwrap());
        assert!(contains(&int(1), &int(1)).is_err());
    }

    #[test]
    fn test_indexing() {
        let list = Value::List(vec![int(10), int(20), int(30)]);
        assert_eq!(index(&list, &int(-1)).unwrap(), int(30));
        assert_eq!(
            index(&list, &int(3)).unwrap_err().to_string(),
            "list index out of range"
        );
        assert_eq!(index(&"héllo".into(), &int(1)).unwrap(), Value::from("é"));

        let map = Value::Map([("k".to_string(), int(1))].into_iter().collect());
        assert_eq!(index(&map, &"k".into()).unwrap(), int(1));
        assert_eq!(index(&map, &"z".into()).unwrap_err().to_string(), "'z'");
        assert!(index(&int(1), &int(0)).is_err());
    }

    #[test]
    fn test_slicing() {
        let list = Value::List(vec![int(1), int(2), int(3), int(4)]);
        assert_eq!(
            slice(&list, Some(&int(1)), Some(&int(-1))).unwrap(),
            Value::List(vec![int(2), int(3)])
        );
        assert_eq!(
            slice(&list, Some(&int(10)), None).unwrap(),
            Value::List(vec![])
        );
        assert_eq!(
            slice(&"hello".into(), None, Some(&int(2))).unwrap(),
            Value::from("he")
        );
    }

    #[test]
    fn test_set_and_delete_index() {
        let mut list = Value::List(vec![int(1), int(2)]);
        set_index(&mut list, int(-1), int(5)).unwrap();
        assert_eq!(list, Value::List(vec![int(1), int(5)]));
        del_index(&mut list, &int(0)).unwrap();
        assert_eq!(list, Value::List(vec![int(5)]));
        assert!(set_index(&mut list, int(4), int(0)).is_err());

        let mut s = Value::from("abc");
        assert!(set_index(&mut s, int(0), "x".into()).is_err());
    }
}
