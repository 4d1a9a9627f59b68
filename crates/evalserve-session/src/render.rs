//! Text rendering of values in replies.

use evalserve_core::Value;

/// `str()`-style text.
#[must_use]
pub fn display(value: &Value) -> String {
    value.to_string()
}

/// Like [`display`], but strings are quoted and escaped.
#[must_use]
pub fn repr(value: &Value) -> String {
    value.repr()
}

/// Collapse multi-line text onto one line: `"]\n"` becomes `"];"`, then
/// every other newline becomes `","`.
#[must_use]
pub fn flatten(text: &str) -> String {
    text.replace("]\n", "];").replace('\n', ",")
}

/// Body of a `/eval` reply: strings raw, everything else flattened.
#[must_use]
pub fn result_text(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => flatten(&display(other)),
    }
}

/// Body of a `/get` reply: strings in double quotes, everything else
/// flattened.
#[must_use]
pub fn get_text(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("\"{s}\""),
        other => flatten(&display(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten() {
        assert_eq!(flatten("[1 2]\n [3 4]]"), "[1 2]; [3 4]]");
        assert_eq!(flatten("a\nb\n"), "a,b,");
        assert_eq!(flatten("x]\n\ny"), "x];,y");
        assert_eq!(flatten("plain"), "plain");
    }

    #[test]
    fn test_result_text() {
        assert_eq!(result_text(&Value::Int(7)), "7");
        assert_eq!(result_text(&Value::Float(7.0)), "7.0");
        assert_eq!(result_text(&Value::Null), "None");
        assert_eq!(result_text(&"a\nb".into()), "a\nb");
        assert_eq!(
            result_text(&Value::from(vec![Value::Int(1), "a".into()])),
            "[1, 'a']"
        );
    }

    #[test]
    fn test_get_text() {
        assert_eq!(get_text(&"hi".into()), "\"hi\"");
        assert_eq!(get_text(&Value::Bool(true)), "True");
    }

    #[test]
    fn test_repr_quotes_strings() {
        assert_eq!(repr(&"it's".into()), "\"it's\"");
        assert_eq!(repr(&Value::Int(5)), "5");
        assert_eq!(display(&"it's".into()), "it's");
    }
}
