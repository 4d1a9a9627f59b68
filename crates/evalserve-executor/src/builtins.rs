//! Builtin functions available to scripts.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]

use std::cmp::Ordering;

use evalserve_core::{Opaque, OutputCapture, ScriptError, Value};

use crate::{
    ops::{self, MAX_SEQUENCE_LEN},
    parser::{BinOp, CmpOp},
};

const NAMES: &[&str] = &[
    "abs", "bool", "float", "int", "len", "list", "max", "min", "print", "range", "repr", "round",
    "sorted", "str", "sum", "type",
];

/// Resolve a builtin by name.
#[must_use]
pub fn lookup(name: &str) -> Option<Value> {
    NAMES
        .contains(&name)
        .then(|| Value::Opaque(Opaque::builtin(name)))
}

type Kwargs = Vec<(String, Value)>;

/// Call a builtin with evaluated arguments.
///
/// # Errors
/// Returns whatever the builtin raises, plus arity and keyword errors.
pub fn call(
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
    capture: &mut OutputCapture,
) -> Result<Value, ScriptError> {
    match name {
        "print" => print(args, kwargs, capture),
        "sorted" => sorted(args, kwargs),
        "sum" => sum(args, kwargs),
        _ => {
            no_kwargs(name, &kwargs)?;
            call_positional(name, args)
        }
    }
}

fn call_positional(name: &str, mut args: Vec<Value>) -> Result<Value, ScriptError> {
    match name {
        "abs" => {
            arity(name, &args, 1, 1)?;
            abs(&args[0])
        }
        "bool" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Bool(args.first().is_some_and(ops::truthy)))
        }
        "float" => {
            arity(name, &args, 0, 1)?;
            args.first().map_or(Ok(Value::Float(0.0)), to_float)
        }
        "int" => {
            arity(name, &args, 0, 1)?;
            args.first().map_or(Ok(Value::Int(0)), to_int)
        }
        "len" => {
            arity(name, &args, 1, 1)?;
            len(&args[0])
        }
        "list" => {
            arity(name, &args, 0, 1)?;
            args.first()
                .map_or(Ok(Vec::new()), ops::iterate)
                .map(Value::List)
        }
        "max" => extreme(name, args, Ordering::Greater),
        "min" => extreme(name, args, Ordering::Less),
        "range" => range(&args),
        "repr" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Str(args[0].repr()))
        }
        "round" => {
            arity(name, &args, 1, 2)?;
            let ndigits = if args.len() == 2 { args.pop() } else { None };
            round(&args[0], ndigits.as_ref())
        }
        "str" => {
            arity(name, &args, 0, 1)?;
            Ok(Value::Str(args.first().map(ToString::to_string).unwrap_or_default()))
        }
        "type" => {
            arity(name, &args, 1, 1)?;
            Ok(Value::Opaque(Opaque::class(args[0].type_name())))
        }
        other => Err(ScriptError::Name(other.to_string())),
    }
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ScriptError> {
    let given = args.len();
    if (min..=max).contains(&given) {
        return Ok(());
    }
    let plural = |n: usize| if n == 1 { "" } else { "s" };
    Err(ScriptError::Type(if min == max {
        format!(
            "{name}() takes exactly {min} argument{} ({given} given)",
            plural(min)
        )
    } else if given < min {
        format!(
            "{name}() expected at least {min} argument{}, got {given}",
            plural(min)
        )
    } else {
        format!(
            "{name}() expected at most {max} argument{}, got {given}",
            plural(max)
        )
    }))
}

fn no_kwargs(name: &str, kwargs: &Kwargs) -> Result<(), ScriptError> {
    match kwargs.first() {
        None => Ok(()),
        Some(_) => Err(ScriptError::Type(format!(
            "{name}() takes no keyword arguments"
        ))),
    }
}

fn unexpected_kwarg(name: &str, key: &str) -> ScriptError {
    ScriptError::Type(format!(
        "{name}() got an unexpected keyword argument '{key}'"
    ))
}

fn separator(name: &str, key: &str, value: Value, default: &str) -> Result<String, ScriptError> {
    match value {
        Value::Null => Ok(default.to_string()),
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::Type(format!(
            "{name}() argument '{key}' must be str or None, not {}",
            other.type_name()
        ))),
    }
}

fn print(args: Vec<Value>, kwargs: Kwargs, capture: &mut OutputCapture) -> Result<Value, ScriptError> {
    let mut sep = " ".to_string();
    let mut end = "\n".to_string();
    for (key, value) in kwargs {
        match key.as_str() {
            "sep" => sep = separator("print", &key, value, " ")?,
            "end" => end = separator("print", &key, value, "\n")?,
            _ => return Err(unexpected_kwarg("print", &key)),
        }
    }

    let text = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(&sep);
    capture.print(&text);
    capture.print(&end);
    Ok(Value::Null)
}

fn abs(value: &Value) -> Result<Value, ScriptError> {
    match value {
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| ScriptError::Overflow("integer overflow".to_string())),
        Value::Float(x) => Ok(Value::Float(x.abs())),
        other => Err(ScriptError::Type(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn len(value: &Value) -> Result<Value, ScriptError> {
    let n = match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => {
            return Err(ScriptError::Type(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    i64::try_from(n)
        .map(Value::Int)
        .map_err(|_| ScriptError::Overflow("length too large".to_string()))
}

fn to_int(value: &Value) -> Result<Value, ScriptError> {
    match value {
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(x) => float_to_int(*x),
        Value::Str(s) => {
            let digits = s.trim().replace('_', "");
            digits.parse::<i64>().map(Value::Int).map_err(|_| {
                ScriptError::Value(format!(
                    "invalid literal for int() with base 10: {}",
                    value.repr()
                ))
            })
        }
        other => Err(ScriptError::Type(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float_to_int(x: f64) -> Result<Value, ScriptError> {
    if x.is_nan() {
        return Err(ScriptError::Value(
            "cannot convert float NaN to integer".to_string(),
        ));
    }
    if x.is_infinite() {
        return Err(ScriptError::Overflow(
            "cannot convert float infinity to integer".to_string(),
        ));
    }
    let t = x.trunc();
    // i64::MAX as f64 rounds up to 2^63, which is out of range.
    if t >= -(2f64.powi(63)) && t < 2f64.powi(63) {
        Ok(Value::Int(t as i64))
    } else {
        Err(ScriptError::Overflow("integer overflow".to_string()))
    }
}

fn to_float(value: &Value) -> Result<Value, ScriptError> {
    match value {
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(x) => Ok(Value::Float(*x)),
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            ScriptError::Value(format!(
                "could not convert string to float: {}",
                value.repr()
            ))
        }),
        other => Err(ScriptError::Type(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn extreme(name: &str, args: Vec<Value>, keep: Ordering) -> Result<Value, ScriptError> {
    if args.is_empty() {
        return Err(ScriptError::Type(format!(
            "{name} expected at least 1 argument, got 0"
        )));
    }
    let candidates = if args.len() == 1 {
        ops::iterate(&args[0])?
    } else {
        args
    };

    let op = if keep == Ordering::Less {
        CmpOp::Lt
    } else {
        CmpOp::Gt
    };
    let mut iter = candidates.into_iter();
    let mut best = iter
        .next()
        .ok_or_else(|| ScriptError::Value(format!("{name}() arg is an empty sequence")))?;
    for item in iter {
        if ops::order(op, &item, &best)? == Some(keep) {
            best = item;
        }
    }
    Ok(best)
}

fn sum(args: Vec<Value>, kwargs: Kwargs) -> Result<Value, ScriptError> {
    let mut args = args.into_iter();
    let iterable = args.next();
    let mut start = args.next();
    if args.next().is_some() {
        return Err(ScriptError::Type(
            "sum() takes at most 2 arguments".to_string(),
        ));
    }
    for (key, value) in kwargs {
        match key.as_str() {
            "start" if start.is_none() => start = Some(value),
            _ => return Err(unexpected_kwarg("sum", &key)),
        }
    }
    let Some(iterable) = iterable else {
        return Err(ScriptError::Type(
            "sum() takes at least 1 positional argument (0 given)".to_string(),
        ));
    };

    let start = start.unwrap_or(Value::Int(0));
    if start.is_str() {
        return Err(ScriptError::Type(
            "sum() can't sum strings [use ''.join(seq) instead]".to_string(),
        ));
    }
    ops::iterate(&iterable)?
        .into_iter()
        .try_fold(start, |acc, item| ops::binary(BinOp::Add, acc, item))
}

fn round(value: &Value, ndigits: Option<&Value>) -> Result<Value, ScriptError> {
    let digits = match ndigits {
        None | Some(Value::Null) => None,
        Some(Value::Int(d)) => Some(*d),
        Some(Value::Bool(b)) => Some(i64::from(*b)),
        Some(other) => {
            return Err(ScriptError::Type(format!(
                "'{}' object cannot be interpreted as an integer",
                other.type_name()
            )));
        }
    };

    match (value, digits) {
        (Value::Bool(b), _) => Ok(Value::Int(i64::from(*b))),
        (Value::Int(i), None) => Ok(Value::Int(*i)),
        (Value::Int(i), Some(d)) if d >= 0 => Ok(Value::Int(*i)),
        (Value::Int(i), Some(d)) => {
            let Some(scale) = u32::try_from(-d).ok().and_then(|e| 10i64.checked_pow(e)) else {
                return Ok(Value::Int(0));
            };
            let rounded = (*i as f64 / scale as f64).round_ties_even() * scale as f64;
            float_to_int(rounded)
        }
        (Value::Float(x), None) => float_to_int(x.round_ties_even()),
        (Value::Float(x), Some(d)) => {
            if !x.is_finite() {
                return Ok(Value::Float(*x));
            }
            let d = i32::try_from(d.clamp(-308, 308)).unwrap_or(0);
            let scale = 10f64.powi(d);
            let scaled = x * scale;
            if !scaled.is_finite() {
                return Ok(Value::Float(*x));
            }
            Ok(Value::Float(scaled.round_ties_even() / scale))
        }
        (other, _) => Err(ScriptError::Type(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn range_arg(value: &Value) -> Result<i64, ScriptError> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(ScriptError::Type(format!(
            "'{}' object cannot be interpreted as an integer",
            other.type_name()
        ))),
    }
}

fn range(args: &[Value]) -> Result<Value, ScriptError> {
    arity("range", args, 1, 3)?;
    let bounds = args.iter().map(range_arg).collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => unreachable!("arity checked"),
    };
    if step == 0 {
        return Err(ScriptError::Value(
            "range() arg 3 must not be zero".to_string(),
        ));
    }

    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let step_abs = i128::from(step).abs();
    let count = if span <= 0 {
        0
    } else {
        (span + step_abs - 1) / step_abs
    };
    if count > MAX_SEQUENCE_LEN as i128 {
        return Err(ops::too_large());
    }

    let mut items = Vec::new();
    let mut current = i128::from(start);
    for _ in 0..count {
        items.push(Value::Int(current as i64));
        current += i128::from(step);
    }
    Ok(Value::List(items))
}

fn sorted(args: Vec<Value>, kwargs: Kwargs) -> Result<Value, ScriptError> {
    arity("sorted", &args, 1, 1)?;
    let mut reverse = false;
    for (key, value) in kwargs {
        match key.as_str() {
            "reverse" => reverse = ops::truthy(&value),
            _ => return Err(unexpected_kwarg("sorted", &key)),
        }
    }

    let mut items = ops::iterate(&args[0])?;
    let mut failure = None;
    items.sort_by(|a, b| {
        let ordering = match ops::order(CmpOp::Lt, a, b) {
            Ok(ordering) => ordering.unwrap_or(Ordering::Equal),
            Err(e) => {
                failure.get_or_insert(e);
                Ordering::Equal
            }
        };
        if reverse { ordering.reverse() } else { ordering }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(Value::List(items)),
    }
}
