//! Tokenizer for the script language.

use std::fmt;

use evalserve_core::ScriptError;

/// Words with a fixed meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    True,
    False,
    None,
    And,
    Or,
    Not,
    In,
    If,
    Else,
    Del,
    Pass,
}

/// Words reserved by the host language but not supported here. They are
/// rejected up front so users get a clear message instead of a name error.
const UNSUPPORTED: &[&str] = &[
    "import", "from", "def", "class", "lambda", "for", "while", "return", "yield", "with", "try",
    "except", "finally", "raise", "global", "nonlocal", "async", "await", "assert", "is", "elif",
    "break", "continue",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Kw(Keyword),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Newline,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Int(i) => return write!(f, "{i}"),
            Self::Float(x) => return write!(f, "{x}"),
            Self::Str(_) => "string literal",
            Self::Ident(name) => return write!(f, "'{name}'"),
            Self::Kw(kw) => return write!(f, "'{}'", keyword_text(*kw)),
            Self::Plus => "'+'",
            Self::Minus => "'-'",
            Self::Star => "'*'",
            Self::DoubleStar => "'**'",
            Self::Slash => "'/'",
            Self::DoubleSlash => "'//'",
            Self::Percent => "'%'",
            Self::Assign => "'='",
            Self::PlusAssign => "'+='",
            Self::MinusAssign => "'-='",
            Self::StarAssign => "'*='",
            Self::SlashAssign => "'/='",
            Self::EqEq => "'=='",
            Self::NotEq => "'!='",
            Self::Lt => "'<'",
            Self::Le => "'<='",
            Self::Gt => "'>'",
            Self::Ge => "'>='",
            Self::LParen => "'('",
            Self::RParen => "')'",
            Self::LBracket => "'['",
            Self::RBracket => "']'",
            Self::LBrace => "'{'",
            Self::RBrace => "'}'",
            Self::Comma => "','",
            Self::Colon => "':'",
            Self::Semicolon => "';'",
            Self::Newline => "end of line",
            Self::Eof => "end of input",
        };
        f.write_str(text)
    }
}

const fn keyword_text(kw: Keyword) -> &'static str {
    match kw {
        Keyword::True => "True",
        Keyword::False => "False",
        Keyword::None => "None",
        Keyword::And => "and",
        Keyword::Or => "or",
        Keyword::Not => "not",
        Keyword::In => "in",
        Keyword::If => "if",
        Keyword::Else => "else",
        Keyword::Del => "del",
        Keyword::Pass => "pass",
    }
}

fn keyword(word: &str) -> Option<Keyword> {
    Some(match word {
        "True" => Keyword::True,
        "False" => Keyword::False,
        "None" => Keyword::None,
        "and" => Keyword::And,
        "or" => Keyword::Or,
        "not" => Keyword::Not,
        "in" => Keyword::In,
        "if" => Keyword::If,
        "else" => Keyword::Else,
        "del" => Keyword::Del,
        "pass" => Keyword::Pass,
        _ => return None,
    })
}

struct Lexer {
    input: Vec<char>,
    pos: usize,
    // Newlines inside brackets do not end a statement.
    depth: usize,
}

/// Split source text into tokens. The result always ends with [`Token::Eof`].
///
/// # Errors
/// Returns a syntax error for unterminated strings, bad numbers and
/// unsupported characters or keywords.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ScriptError> {
    Lexer {
        input: source.chars().collect(),
        pos: 0,
        depth: 0,
    }
    .run()
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ScriptError> {
        let mut out = Vec::new();

        while let Some(ch) = self.peek() {
            match ch {
                ' ' | '\t' | '\r' => {
                    self.pos += 1;
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.pos += 2;
                }
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.pos += 1;
                    }
                }
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        out.push(Token::Newline);
                    }
                }
                '0'..='9' => out.push(self.number()?),
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    out.push(self.number()?);
                }
                '\'' | '"' => out.push(self.string()?),
                c if c.is_alphabetic() || c == '_' => out.push(self.word()?),
                _ => out.push(self.operator()?),
            }
        }

        out.push(Token::Eof);
        Ok(out)
    }

    fn number(&mut self) -> Result<Token, ScriptError> {
        let start = self.pos;
        let mut is_float = false;

        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
        if self.peek() == Some('.') {
            is_float = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text: String = self.input[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();

        if self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(ScriptError::Syntax("invalid decimal literal".to_string()));
        }

        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ScriptError::Syntax("invalid decimal literal".to_string()))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| ScriptError::Overflow("integer literal is too large".to_string()))
        }
    }

    fn string(&mut self) -> Result<Token, ScriptError> {
        let quote = self.bump().unwrap_or('\'');
        let mut out = String::new();

        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(ScriptError::Syntax(
                        "unterminated string literal".to_string(),
                    ));
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some('\n') => {}
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => {
                        return Err(ScriptError::Syntax(
                            "unterminated string literal".to_string(),
                        ));
                    }
                },
                Some(c) => out.push(c),
            }
        }

        Ok(Token::Str(out))
    }

    fn word(&mut self) -> Result<Token, ScriptError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let word: String = self.input[start..self.pos].iter().collect();

        if UNSUPPORTED.contains(&word.as_str()) {
            return Err(ScriptError::Syntax(format!(
                "'{word}' is not supported by this server"
            )));
        }
        Ok(keyword(&word).map_or(Token::Ident(word), Token::Kw))
    }

    fn operator(&mut self) -> Result<Token, ScriptError> {
        let Some(ch) = self.bump() else {
            return Ok(Token::Eof);
        };

        let token = match ch {
            '+' if self.eat('=') => Token::PlusAssign,
            '+' => Token::Plus,
            '-' if self.eat('=') => Token::MinusAssign,
            '-' => Token::Minus,
            '*' if self.eat('*') => Token::DoubleStar,
            '*' if self.eat('=') => Token::StarAssign,
            '*' => Token::Star,
            '/' if self.eat('/') => Token::DoubleSlash,
            '/' if self.eat('=') => Token::SlashAssign,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '=' if self.eat('=') => Token::EqEq,
            '=' => Token::Assign,
            '!' if self.eat('=') => Token::NotEq,
            '<' if self.eat('=') => Token::Le,
            '<' => Token::Lt,
            '>' if self.eat('=') => Token::Ge,
            '>' => Token::Gt,
            '(' | '[' | '{' => {
                self.depth += 1;
                match ch {
                    '(' => Token::LParen,
                    '[' => Token::LBracket,
                    _ => Token::LBrace,
                }
            }
            ')' | ']' | '}' => {
                self.depth = self.depth.saturating_sub(1);
                match ch {
                    ')' => Token::RParen,
                    ']' => Token::RBracket,
                    _ => Token::RBrace,
                }
            }
            ',' => Token::Comma,
            ':' => Token::Colon,
            ';' => Token::Semicolon,
            other => {
                return Err(ScriptError::Syntax(format!(
                    "invalid character '{other}'"
                )));
            }
        };
        Ok(token)
    }
}
