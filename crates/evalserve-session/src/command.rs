//! Command-line parsing.

/// One parsed command line.
///
/// The verb is the text before the first space; the argument is everything
/// after it, possibly empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Eval(&'a str),
    Exec(&'a str),
    Get(&'a str),
    /// `name=expression`
    Set(&'a str),
    /// `name jsonText`
    SetJson(&'a str),
    GetJson(&'a str),
    Exit,
    Close,
    /// Unknown verb; holds the whole line.
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Parse a line as received from the client.
    ///
    /// Returns `None` for an empty or whitespace-only line, which ends the
    /// connection.
    #[must_use]
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (verb, arg) = line.split_once(' ').unwrap_or((line, ""));

        Some(match verb {
            "/eval" => Self::Eval(arg),
            "/exec" => Self::Exec(arg),
            "/get" => Self::Get(arg),
            "/set" => Self::Set(arg),
            "/set_json" => Self::SetJson(arg),
            "/get_json" => Self::GetJson(arg),
            "/exit" => Self::Exit,
            "/close" => Self::Close,
            _ => Self::Unknown(line),
        })
    }

    /// Verb name for logging.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Eval(_) => "/eval",
            Self::Exec(_) => "/exec",
            Self::Get(_) => "/get",
            Self::Set(_) => "/set",
            Self::SetJson(_) => "/set_json",
            Self::GetJson(_) => "/get_json",
            Self::Exit => "/exit",
            Self::Close => "/close",
            Self::Unknown(_) => "unknown",
        }
    }
}
