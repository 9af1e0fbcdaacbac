//! Expression lexer, AST, parser, and evaluator.
//!
//! Expressions appear in `/emit`, `/expr`, `/return`, `/if`, `/while` and in
//! `$[...]` substitutions.  They are parsed once, when the unit is compiled,
//! and evaluated each time the statement runs.
//!
//! Operator precedence (lowest → highest):
//!   comma  →  assign  →  ternary  →  or  →  and  →  relational  →
//!   additive  →  multiplicative  →  unary  →  primary

use std::cmp::Ordering;

use regex::Regex;

use super::value::Value;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// What the evaluator needs from the running interpreter.
pub trait EvalContext {
    /// Look up a variable through the scope chain.
    fn get_var(&self, name: &str) -> Option<Value>;

    /// Assign a variable in the current scope.
    fn set_var(&mut self, name: &str, value: Value);

    /// Positional arguments of the running unit.
    fn params(&self) -> &[Value];

    /// Invoke a built-in function.
    fn call_fn(&mut self, name: &str, args: Vec<Value>) -> Result<Value, String>;
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,

    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    GlobMatch,     // =~
    RegexMatch,    // =/
    NotGlobMatch,  // !~
    NotRegexMatch, // !/

    And,
    Or,

    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,

    Question,
    Colon,
    Comma,
    LParen,
    RParen,
    Unknown(char),
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer {
    src: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Lexer { src: src.chars().collect(), pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, s: &mut String, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek().filter(|c| pred(*c)) {
            s.push(c);
            self.pos += 1;
        }
    }

    fn read_number(&mut self, first: char) -> Result<Token, String> {
        let mut s = String::from(first);
        if first == '0' && matches!(self.peek(), Some('x' | 'X')) {
            self.pos += 1;
            let mut hex = String::new();
            self.take_while(&mut hex, |c| c.is_ascii_hexdigit());
            return i64::from_str_radix(&hex, 16)
                .map(Token::Int)
                .map_err(|_| format!("bad hex literal 0x{hex}"));
        }
        self.take_while(&mut s, |c| c.is_ascii_digit());
        let mut is_float = false;
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            s.push('.');
            self.pos += 1;
            self.take_while(&mut s, |c| c.is_ascii_digit());
        }
        if is_float {
            s.parse().map(Token::Float).map_err(|_| format!("bad number {s}"))
        } else {
            s.parse().map(Token::Int).map_err(|_| format!("integer {s} out of range"))
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token, String> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None => return Err("unterminated string literal".into()),
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(c) => s.push(c),
                    None => return Err("unterminated string literal".into()),
                },
                Some(c) if c == quote => return Ok(Token::Str(s)),
                Some(c) => s.push(c),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, String> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        let Some(ch) = self.advance() else {
            return Ok(Token::Eof);
        };
        let tok = match ch {
            '0'..='9' => return self.read_number(ch),
            '"' | '\'' => return self.read_string(ch),
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::from(c);
                self.take_while(&mut s, |c| c.is_alphanumeric() || c == '_');
                Token::Ident(s)
            }
            '+' if self.eat('=') => Token::PlusAssign,
            '+' => Token::Plus,
            '-' if self.eat('=') => Token::MinusAssign,
            '-' => Token::Minus,
            '*' if self.eat('=') => Token::StarAssign,
            '*' => Token::Star,
            '/' if self.eat('=') => Token::SlashAssign,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '!' if self.eat('=') => Token::Ne,
            '!' if self.eat('~') => Token::NotGlobMatch,
            '!' if self.eat('/') => Token::NotRegexMatch,
            '!' => Token::Bang,
            '&' if self.eat('&') => Token::And,
            '|' if self.eat('|') => Token::Or,
            '<' if self.eat('=') => Token::Le,
            '<' => Token::Lt,
            '>' if self.eat('=') => Token::Ge,
            '>' => Token::Gt,
            '=' if self.eat('=') => Token::Eq,
            '=' if self.eat('~') => Token::GlobMatch,
            '=' if self.eat('/') => Token::RegexMatch,
            '=' => Token::Assign,
            '?' => Token::Question,
            ':' => Token::Colon,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c => Token::Unknown(c),
        };
        Ok(tok)
    }

    fn tokenize(mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();
        loop {
            let t = self.next_token()?;
            let done = t == Token::Eof;
            tokens.push(t);
            if done {
                return Ok(tokens);
            }
        }
    }
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    GlobMatch,
    RegexMatch,
    NotGlobMatch,
    NotRegexMatch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// A compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign(String, AssignOp, Box<Expr>),
    Call(String, Vec<Expr>),
    Comma(Vec<Expr>),
}

impl Expr {
    /// The comma-separated items of this expression, in order.
    pub fn items(&self) -> &[Expr] {
        match self {
            Expr::Comma(items) => items,
            single => std::slice::from_ref(single),
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Deepest expression tree the parser will build.
pub const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Nesting of the production being parsed; see [`MAX_DEPTH`].
    depth: usize,
}

impl Parser {
    /// Go one level deeper, failing past [`MAX_DEPTH`].  Callers restore
    /// `depth` when the production is done.
    fn descend(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("expression nested too deeply".into());
        }
        Ok(())
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.peek().clone();
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_comma(&mut self) -> Result<Expr, String> {
        let first = self.parse_assign()?;
        if self.peek() != &Token::Comma {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(&Token::Comma) {
            exprs.push(self.parse_assign()?);
        }
        Ok(Expr::Comma(exprs))
    }

    fn parse_assign(&mut self) -> Result<Expr, String> {
        if let Token::Ident(name) = self.peek().clone() {
            let op = match self.tokens.get(self.pos + 1) {
                Some(Token::Assign) => Some(AssignOp::Set),
                Some(Token::PlusAssign) => Some(AssignOp::Add),
                Some(Token::MinusAssign) => Some(AssignOp::Sub),
                Some(Token::StarAssign) => Some(AssignOp::Mul),
                Some(Token::SlashAssign) => Some(AssignOp::Div),
                _ => None,
            };
            if let Some(op) = op {
                self.pos += 2;
                self.descend()?;
                let rhs = self.parse_assign()?;
                self.depth -= 1;
                return Ok(Expr::Assign(name, op, Box::new(rhs)));
            }
        }
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, String> {
        let cond = self.parse_or()?;
        if !self.eat(&Token::Question) {
            return Ok(cond);
        }
        let then = self.parse_or()?;
        if !self.eat(&Token::Colon) {
            return Err("expected ':' in ternary".into());
        }
        self.descend()?;
        let else_ = self.parse_ternary()?;
        self.depth -= 1;
        Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(else_)))
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let base = self.depth;
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            self.descend()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let base = self.depth;
        let mut lhs = self.parse_relational()?;
        while self.eat(&Token::And) {
            self.descend()?;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let base = self.depth;
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                Token::GlobMatch => BinOp::GlobMatch,
                Token::RegexMatch => BinOp::RegexMatch,
                Token::NotGlobMatch => BinOp::NotGlobMatch,
                Token::NotRegexMatch => BinOp::NotRegexMatch,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let base = self.depth;
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let base = self.depth;
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Bang => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        self.pos += 1;
        self.descend()?;
        let inner = self.parse_unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(inner)))
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Token::Ident(name) => {
                if !self.eat(&Token::LParen) {
                    return Ok(Expr::Var(name));
                }
                self.descend()?;
                let mut args = Vec::new();
                if self.peek() != &Token::RParen {
                    args.push(self.parse_assign()?);
                    while self.eat(&Token::Comma) {
                        args.push(self.parse_assign()?);
                    }
                }
                if !self.eat(&Token::RParen) {
                    return Err(format!("expected ')' after arguments to {name}"));
                }
                self.depth -= 1;
                Ok(Expr::Call(name, args))
            }
            Token::LParen => {
                self.descend()?;
                let inner = self.parse_comma()?;
                if !self.eat(&Token::RParen) {
                    return Err("expected ')'".into());
                }
                self.depth -= 1;
                Ok(inner)
            }
            Token::Unknown(c) => Err(format!("unexpected character {c:?}")),
            Token::Eof => Err("unexpected end of expression".into()),
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

/// Parse an expression; trailing input is an error.
pub fn parse_expr(src: &str) -> Result<Expr, String> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser { tokens, pos: 0, depth: 0 };
    let expr = parser.parse_comma()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(format!("unexpected {other:?} after expression")),
    }
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

fn truth(b: bool) -> Value {
    Value::Int(if b { 1 } else { 0 })
}

/// Evaluate a compiled expression against the given context.
pub fn eval_expr(expr: &Expr, ctx: &mut dyn EvalContext) -> Result<Value, String> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Var(name) => Ok(ctx.get_var(name).unwrap_or_default()),

        Expr::Unary(op, inner) => {
            let v = eval_expr(inner, ctx)?;
            Ok(match op {
                UnaryOp::Neg => v.arith_neg(),
                UnaryOp::Not => truth(!v.as_bool()),
            })
        }

        Expr::Binary(BinOp::And, lhs, rhs) => {
            Ok(truth(eval_expr(lhs, ctx)?.as_bool() && eval_expr(rhs, ctx)?.as_bool()))
        }
        Expr::Binary(BinOp::Or, lhs, rhs) => {
            Ok(truth(eval_expr(lhs, ctx)?.as_bool() || eval_expr(rhs, ctx)?.as_bool()))
        }
        Expr::Binary(op, lhs, rhs) => {
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            eval_binop(*op, &l, &r)
        }

        Expr::Ternary(cond, then, else_) => {
            if eval_expr(cond, ctx)?.as_bool() {
                eval_expr(then, ctx)
            } else {
                eval_expr(else_, ctx)
            }
        }

        Expr::Assign(name, op, rhs) => {
            let rval = eval_expr(rhs, ctx)?;
            let cur = || ctx.get_var(name).unwrap_or(Value::Int(0));
            let new_val = match op {
                AssignOp::Set => rval,
                AssignOp::Add => cur().arith_add(&rval),
                AssignOp::Sub => cur().arith_sub(&rval),
                AssignOp::Mul => cur().arith_mul(&rval),
                AssignOp::Div => cur().arith_div(&rval)?,
            };
            ctx.set_var(name, new_val.clone());
            Ok(new_val)
        }

        Expr::Call(name, arg_exprs) => {
            let mut args = Vec::with_capacity(arg_exprs.len());
            for ae in arg_exprs {
                args.push(eval_expr(ae, ctx)?);
            }
            ctx.call_fn(name, args)
        }

        Expr::Comma(exprs) => {
            let mut last = Value::default();
            for e in exprs {
                last = eval_expr(e, ctx)?;
            }
            Ok(last)
        }
    }
}

fn eval_binop(op: BinOp, l: &Value, r: &Value) -> Result<Value, String> {
    let ord = || l.cmp_value(r);
    Ok(match op {
        BinOp::Add => l.arith_add(r),
        BinOp::Sub => l.arith_sub(r),
        BinOp::Mul => l.arith_mul(r),
        BinOp::Div => l.arith_div(r)?,
        BinOp::Rem => l.arith_rem(r)?,
        BinOp::Eq => truth(ord() == Ordering::Equal),
        BinOp::Ne => truth(ord() != Ordering::Equal),
        BinOp::Lt => truth(ord() == Ordering::Less),
        BinOp::Le => truth(ord() != Ordering::Greater),
        BinOp::Gt => truth(ord() == Ordering::Greater),
        BinOp::Ge => truth(ord() != Ordering::Less),
        BinOp::GlobMatch => truth(glob_match(&r.as_str(), &l.as_str())),
        BinOp::NotGlobMatch => truth(!glob_match(&r.as_str(), &l.as_str())),
        BinOp::RegexMatch => truth(regex_match(&r.as_str(), &l.as_str())?),
        BinOp::NotRegexMatch => truth(!regex_match(&r.as_str(), &l.as_str())?),
        BinOp::And => truth(l.as_bool() && r.as_bool()),
        BinOp::Or => truth(l.as_bool() || r.as_bool()),
    })
}

// ── Matching ──────────────────────────────────────────────────────────────────

/// `*` and `?` wildcards, anchored at both ends.
///
/// Only the most recent `*` is ever retried.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    // (pattern index after the last `*`, text index it is matched up to)
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                pi += 1;
                star = Some((pi, ti));
            }
            Some(&c) if c == '?' || c == t[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                Some((sp, st)) => {
                    pi = sp;
                    ti = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

pub fn regex_match(pattern: &str, text: &str) -> Result<bool, String> {
    Regex::new(pattern)
        .map(|re| re.is_match(text))
        .map_err(|e| format!("bad regex {pattern:?}: {e}"))
}
