//! Recursive-descent parser producing the script AST.

use evalserve_core::{ScriptError, Value};

use crate::lexer::{Keyword, Token, tokenize};

/// Nesting limit for expressions, so hostile input cannot exhaust the stack.
const MAX_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "** or pow()",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CmpOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    /// Left-associative operator chain, kept flat so long sums stay shallow.
    Binary(Box<Expr>, Vec<(BinOp, Expr)>),
    /// `a < b <= c`: every pair must hold.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    IfElse {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Index(Box<Expr>, Box<Expr>),
    Slice {
        base: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
    },
}

/// Left-hand side of an assignment or `del`.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    /// `base[index]`, where `base` is itself a name or index chain.
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    /// `a = b = value`
    Assign(Vec<Target>, Expr),
    AugAssign(Target, BinOp, Expr),
    Del(Vec<Target>),
    Pass,
}

/// Parse a single expression.
///
/// # Errors
/// Returns a syntax error if the text is not exactly one expression.
pub fn parse_expression(source: &str) -> Result<Expr, ScriptError> {
    let mut parser = Parser::new(tokenize(source)?);
    parser.skip_newlines();
    let expr = parser.expression()?;
    parser.skip_newlines();
    parser.expect_end()?;
    Ok(expr)
}

/// Parse a sequence of statements separated by newlines or `;`.
///
/// # Errors
/// Returns a syntax error on the first malformed statement.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    let mut parser = Parser::new(tokenize(source)?);
    let mut stmts = Vec::new();

    loop {
        while matches!(parser.peek(), Token::Newline | Token::Semicolon) {
            parser.advance();
        }
        if parser.peek() == &Token::Eof {
            break;
        }
        stmts.push(parser.statement()?);
        match parser.peek() {
            Token::Newline | Token::Semicolon | Token::Eof => {}
            other => return Err(unexpected(other)),
        }
    }

    Ok(stmts)
}

fn unexpected(token: &Token) -> ScriptError {
    ScriptError::Syntax(format!("invalid syntax: unexpected {token}"))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    const fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ScriptError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(ScriptError::Syntax(format!(
                "invalid syntax: expected {expected}, found {}",
                self.peek()
            )))
        }
    }

    fn expect_end(&self) -> Result<(), ScriptError> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    fn skip_newlines(&mut self) {
        while self.eat(&Token::Newline) {}
    }

    fn enter(&mut self) -> Result<(), ScriptError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ScriptError::Limit(
                "expression is nested too deeply".to_string(),
            ));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        if self.eat(&Token::Kw(Keyword::Pass)) {
            return Ok(Stmt::Pass);
        }
        if self.eat(&Token::Kw(Keyword::Del)) {
            let mut targets = vec![into_target(self.expression()?)?];
            while self.eat(&Token::Comma) {
                targets.push(into_target(self.expression()?)?);
            }
            return Ok(Stmt::Del(targets));
        }

        let first = self.expression()?;

        let aug = match self.peek() {
            Token::PlusAssign => Some(BinOp::Add),
            Token::MinusAssign => Some(BinOp::Sub),
            Token::StarAssign => Some(BinOp::Mul),
            Token::SlashAssign => Some(BinOp::Div),
            _ => None,
        };
        if let Some(op) = aug {
            self.advance();
            let value = self.expression()?;
            return Ok(Stmt::AugAssign(into_target(first)?, op, value));
        }

        if self.peek() != &Token::Assign {
            return Ok(Stmt::Expr(first));
        }

        let mut targets = vec![into_target(first)?];
        let mut value;
        loop {
            self.expect(&Token::Assign)?;
            value = self.expression()?;
            if self.peek() == &Token::Assign {
                targets.push(into_target(value)?);
            } else {
                break;
            }
        }
        Ok(Stmt::Assign(targets, value))
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.enter()?;
        let result = self.ternary();
        self.leave();
        result
    }

    fn ternary(&mut self) -> Result<Expr, ScriptError> {
        let then = self.or_expr()?;
        if !self.eat(&Token::Kw(Keyword::If)) {
            return Ok(then);
        }
        let cond = self.or_expr()?;
        self.expect(&Token::Kw(Keyword::Else))?;
        let otherwise = self.expression()?;
        Ok(Expr::IfElse {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut operands = vec![self.and_expr()?];
        while self.eat(&Token::Kw(Keyword::Or)) {
            operands.push(self.and_expr()?);
        }
        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::Or(operands)
        })
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut operands = vec![self.not_expr()?];
        while self.eat(&Token::Kw(Keyword::And)) {
            operands.push(self.not_expr()?);
        }
        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::And(operands)
        })
    }

    fn not_expr(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::Kw(Keyword::Not)) {
            self.enter()?;
            let operand = self.not_expr();
            self.leave();
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let left = self.sum()?;
        let mut rest = Vec::new();

        loop {
            let op = match (self.peek(), self.peek_at(1)) {
                (Token::EqEq, _) => CmpOp::Eq,
                (Token::NotEq, _) => CmpOp::NotEq,
                (Token::Lt, _) => CmpOp::Lt,
                (Token::Le, _) => CmpOp::Le,
                (Token::Gt, _) => CmpOp::Gt,
                (Token::Ge, _) => CmpOp::Ge,
                (Token::Kw(Keyword::In), _) => CmpOp::In,
                (Token::Kw(Keyword::Not), Token::Kw(Keyword::In)) => CmpOp::NotIn,
                _ => break,
            };
            if op == CmpOp::NotIn {
                self.advance();
            }
            self.advance();
            rest.push((op, self.sum()?));
        }

        if rest.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare(Box::new(left), rest))
        }
    }

    fn sum(&mut self) -> Result<Expr, ScriptError> {
        let first = self.term()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(chain(first, rest)),
            };
            self.advance();
            rest.push((op, self.term()?));
        }
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let first = self.factor()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::DoubleSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Mod,
                _ => return Ok(chain(first, rest)),
            };
            self.advance();
            rest.push((op, self.factor()?));
        }
    }

    fn factor(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        self.enter()?;
        let operand = self.factor();
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.postfix()?;
        if !self.eat(&Token::DoubleStar) {
            return Ok(base);
        }
        self.enter()?;
        // Right-associative and binds tighter than unary minus on the left.
        let exponent = self.factor();
        self.leave();
        Ok(Expr::Binary(Box::new(base), vec![(BinOp::Pow, exponent?)]))
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.atom()?;
        // Each call or subscript nests the tree one level deeper.
        let mut links = 0;
        let result = loop {
            if !matches!(self.peek(), Token::LParen | Token::LBracket) {
                break Ok(expr);
            }
            if let Err(e) = self.enter() {
                break Err(e);
            }
            links += 1;
            let next = if self.eat(&Token::LParen) {
                self.call_args().map(|(args, kwargs)| Expr::Call {
                    callee: Box::new(expr),
                    args,
                    kwargs,
                })
            } else {
                self.advance();
                self.subscript(expr)
            };
            match next {
                Ok(e) => expr = e,
                Err(e) => break Err(e),
            }
        };
        for _ in 0..links {
            self.leave();
        }
        result
    }

    fn call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ScriptError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();

        while self.peek() != &Token::RParen {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Token::Ident(name), Token::Assign) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.advance();
                self.advance();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(ScriptError::Syntax(format!(
                        "keyword argument repeated: {name}"
                    )));
                }
                kwargs.push((name, self.expression()?));
            } else if kwargs.is_empty() {
                args.push(self.expression()?);
            } else {
                return Err(ScriptError::Syntax(
                    "positional argument follows keyword argument".to_string(),
                ));
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok((args, kwargs))
    }

    fn subscript(&mut self, base: Expr) -> Result<Expr, ScriptError> {
        let start = if self.peek() == &Token::Colon {
            None
        } else {
            Some(Box::new(self.expression()?))
        };

        if !self.eat(&Token::Colon) {
            self.expect(&Token::RBracket)?;
            let index = start.ok_or_else(|| unexpected(&Token::RBracket))?;
            return Ok(Expr::Index(Box::new(base), index));
        }

        let stop = if self.peek() == &Token::RBracket {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        self.expect(&Token::RBracket)?;
        Ok(Expr::Slice {
            base: Box::new(base),
            start,
            stop,
        })
    }

    fn atom(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(mut s) => {
                // Adjacent literals concatenate.
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.advance();
                }
                Ok(Expr::Literal(Value::Str(s)))
            }
            Token::Kw(Keyword::True) => Ok(Expr::Literal(Value::Bool(true))),
            Token::Kw(Keyword::False) => Ok(Expr::Literal(Value::Bool(false))),
            Token::Kw(Keyword::None) => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) => Ok(Expr::Name(name)),
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while self.peek() != &Token::RBracket {
                    items.push(self.expression()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket)?;
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                while self.peek() != &Token::RBrace {
                    let key = self.expression()?;
                    self.expect(&Token::Colon)?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBrace)?;
                Ok(Expr::Dict(entries))
            }
            other => Err(unexpected(&other)),
        }
    }
}

fn chain(first: Expr, rest: Vec<(BinOp, Expr)>) -> Expr {
    if rest.is_empty() {
        first
    } else {
        Expr::Binary(Box::new(first), rest)
    }
}

fn into_target(expr: Expr) -> Result<Target, ScriptError> {
    match expr {
        Expr::Name(name) => Ok(Target::Name(name)),
        Expr::Index(base, index) if is_assignable_base(&base) => Ok(Target::Index(base, index)),
        Expr::Call { .. } => Err(ScriptError::Syntax(
            "cannot assign to function call".to_string(),
        )),
        Expr::Literal(_) => Err(ScriptError::Syntax("cannot assign to literal".to_string())),
        _ => Err(ScriptError::Syntax("cannot assign to expression".to_string())),
    }
}

fn is_assignable_base(expr: &Expr) -> bool {
    match expr {
        Expr::Name(_) => true,
        Expr::Index(base, _) => is_assignable_base(base),
        _ => false,
    }
}
