//! Statement AST and script-level parser.
//!
//! A block script is a sequence of lines.  Each non-empty, non-comment line
//! is either a command (`/keyword args`) or a bare line, which emits its
//! substituted text.  Lines ending in `\` are joined with the next one, and
//! several statements may share a line when separated by `%;`.
//!
//! Parsing is strict: unknown commands, unbalanced blocks and malformed
//! substitutions are all rejected with the line they start on, so a unit
//! that compiles can only fail at run time.

use super::expr::{parse_expr, Expr};
use super::template::Template;
use crate::error::CompileError;

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// A bare line or `/echo text`: emits the substituted text.
    Emit(Template),
    /// `/emit e1, e2, …`: emits each value in order.
    EmitExprs(Vec<Expr>),
    /// `/set name=value` (current scope) or `/global name=value` (root scope).
    Set { name: String, value: Template, global: bool },
    /// `/unset name`
    Unset { name: String },
    /// `/param a b …`: binds positional arguments to names.
    Param { names: Vec<String> },
    /// `/expr expression`: evaluated for its side effects.
    Expr(Expr),
    /// `/if (c) … [/elseif (c) …] [/else …] /endif`
    If { branches: Vec<(Expr, Vec<Stmt>)>, else_block: Vec<Stmt> },
    /// `/while (c) … /done`
    While { cond: Expr, body: Vec<Stmt> },
    /// `/for var start end … /done`: inclusive integer range.
    For { var: String, start: Template, end: Template, body: Vec<Stmt> },
    /// `/break`
    Break,
    /// `/return [expr]`
    Return(Option<Expr>),
    /// `/error text`: non-terminating error.
    Error(Template),
    /// `/throw text`: terminating error.
    Throw(Template),
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Parse a script into statements.
pub fn parse_script(src: &str) -> Result<Vec<Stmt>, CompileError> {
    let stmts: Vec<(usize, String)> = join_continuations(src)
        .into_iter()
        .flat_map(|(line, text)| {
            split_by_separator(&text)
                .into_iter()
                .map(move |s| (line, s.trim().to_owned()))
        })
        .filter(|(_, s)| !s.is_empty())
        .collect();

    let mut parser = StmtParser { stmts, pos: 0, depth: 0 };
    let (block, stop) = parser.parse_block(&[])?;
    debug_assert!(stop.is_none());
    Ok(block)
}

/// Join lines ending in `\` into logical lines, keeping the number of the
/// first physical line of each.  Comment lines are dropped without breaking
/// a continuation.
fn join_continuations(src: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut current: Option<(usize, String)> = None;
    for (i, line) in src.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(';') || trimmed.starts_with('#') {
            continue;
        }
        let (start, buf) = current.get_or_insert_with(|| (i + 1, String::new()));
        match line.strip_suffix('\\') {
            Some(stripped) => buf.push_str(stripped),
            None => {
                buf.push_str(line);
                lines.push((*start, std::mem::take(buf)));
                current = None;
            }
        }
    }
    if let Some(pending) = current {
        lines.push(pending);
    }
    lines
}

/// Split a logical line on `%;`, except inside quotes or `$[...]`.
fn split_by_separator(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_str = false;
    let mut depth = 0usize;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_str = !in_str,
            '\\' if in_str => {
                current.push(ch);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                continue;
            }
            '[' if !in_str => depth += 1,
            ']' if !in_str => depth = depth.saturating_sub(1),
            '%' if !in_str && depth == 0 && chars.peek() == Some(&';') => {
                chars.next();
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    parts.push(current);
    parts
}

/// Where a nested block ended.
struct Stop {
    name: &'static str,
    line: usize,
    args: String,
}

/// Deepest `/if`, `/while` and `/for` nesting accepted.
pub const MAX_NESTING: usize = 128;

struct StmtParser {
    stmts: Vec<(usize, String)>,
    pos: usize,
    depth: usize,
}

impl StmtParser {
    /// Parse the body of a block opened on `line` one level deeper.
    fn nested<T>(
        &mut self,
        line: usize,
        parse: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        if self.depth >= MAX_NESTING {
            return Err(CompileError::new(line, "blocks nested too deeply"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Parse statements until one of `stops` (consumed and returned) or EOF.
    fn parse_block(&mut self, stops: &[&'static str]) -> Result<(Vec<Stmt>, Option<Stop>), CompileError> {
        let mut block = Vec::new();
        while let Some((line, text)) = self.stmts.get(self.pos).cloned() {
            self.pos += 1;
            if let Some((name, args)) = split_cmd(&text) {
                if let Some(&stop) = stops.iter().find(|s| **s == name) {
                    return Ok((block, Some(Stop { name: stop, line, args: args.to_owned() })));
                }
                if matches!(name, "else" | "elseif" | "endif" | "done") {
                    return Err(CompileError::new(line, format!("/{name} without matching opener")));
                }
            }
            block.push(self.parse_one(line, &text)?);
        }
        Ok((block, None))
    }

    fn parse_one(&mut self, line: usize, text: &str) -> Result<Stmt, CompileError> {
        let err = |msg: String| CompileError::new(line, msg);
        let template = |s: &str| Template::compile(s).map_err(err);
        let expr = |s: &str, what: &str| -> Result<Expr, CompileError> {
            if s.trim().is_empty() {
                return Err(err(format!("/{what} needs an expression")));
            }
            parse_expr(s).map_err(|e| err(format!("/{what}: {e}")))
        };

        let Some((name, rest)) = split_cmd(text) else {
            return Ok(Stmt::Emit(template(text)?));
        };

        match name {
            "echo" => Ok(Stmt::Emit(template(rest)?)),
            "emit" => Ok(Stmt::EmitExprs(expr(rest, name)?.items().to_vec())),
            "set" | "global" => {
                let (var, value) = split_assignment(rest);
                check_ident(var).map_err(|e| err(format!("/{name}: {e}")))?;
                Ok(Stmt::Set { name: var.to_owned(), value: template(value)?, global: name == "global" })
            }
            "unset" => {
                check_ident(rest).map_err(|e| err(format!("/unset: {e}")))?;
                Ok(Stmt::Unset { name: rest.to_owned() })
            }
            "param" => {
                let names: Vec<String> = rest.split_whitespace().map(str::to_owned).collect();
                if names.is_empty() {
                    return Err(err("/param needs at least one name".into()));
                }
                for n in &names {
                    check_ident(n).map_err(|e| err(format!("/param: {e}")))?;
                }
                Ok(Stmt::Param { names })
            }
            "expr" => Ok(Stmt::Expr(expr(rest, name)?)),
            "if" => self.nested(line, |p| p.parse_if(line, rest)),
            "while" => {
                let cond = expr(rest, name)?;
                let body = self.nested(line, |p| p.parse_loop_body(line, name))?;
                Ok(Stmt::While { cond, body })
            }
            "for" => {
                let words: Vec<&str> = rest.split_whitespace().collect();
                let [var, start, end] = words[..] else {
                    return Err(err("usage: /for var start end".into()));
                };
                check_ident(var).map_err(|e| err(format!("/for: {e}")))?;
                let (start, end) = (template(start)?, template(end)?);
                let body = self.nested(line, |p| p.parse_loop_body(line, name))?;
                Ok(Stmt::For { var: var.to_owned(), start, end, body })
            }
            "break" if rest.is_empty() => Ok(Stmt::Break),
            "break" => Err(err("/break takes no arguments".into())),
            "return" if rest.is_empty() => Ok(Stmt::Return(None)),
            "return" => Ok(Stmt::Return(Some(expr(rest, name)?))),
            "error" => Ok(Stmt::Error(template(rest)?)),
            "throw" => Ok(Stmt::Throw(template(rest)?)),
            other => Err(err(format!("unknown command /{other}"))),
        }
    }

    fn parse_if(&mut self, line: usize, cond_src: &str) -> Result<Stmt, CompileError> {
        let mut branches = Vec::new();
        let mut cond_line = line;
        let mut cond_src = cond_src.to_owned();
        loop {
            if cond_src.trim().is_empty() {
                return Err(CompileError::new(cond_line, "/if needs an expression"));
            }
            let cond = parse_expr(&cond_src).map_err(|e| CompileError::new(cond_line, format!("/if: {e}")))?;
            let (block, stop) = self.parse_block(&["elseif", "else", "endif"])?;
            branches.push((cond, block));
            match stop {
                Some(Stop { name: "elseif", line, args }) => {
                    cond_line = line;
                    cond_src = args;
                }
                Some(Stop { name: "else", .. }) => {
                    let (else_block, stop) = self.parse_block(&["endif"])?;
                    if stop.is_none() {
                        return Err(CompileError::new(line, "/if without /endif"));
                    }
                    return Ok(Stmt::If { branches, else_block });
                }
                Some(_) => return Ok(Stmt::If { branches, else_block: Vec::new() }),
                None => return Err(CompileError::new(line, "/if without /endif")),
            }
        }
    }

    fn parse_loop_body(&mut self, line: usize, name: &str) -> Result<Vec<Stmt>, CompileError> {
        match self.parse_block(&["done"])? {
            (body, Some(_)) => Ok(body),
            (_, None) => Err(CompileError::new(line, format!("/{name} without /done"))),
        }
    }
}

// ── Small utilities ───────────────────────────────────────────────────────────

/// Split `/cmd rest` into `("cmd", "rest")`; `None` for bare lines.
fn split_cmd(line: &str) -> Option<(&str, &str)> {
    let line = line.strip_prefix('/')?;
    Some(match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], line[i..].trim()),
        None => (line, ""),
    })
}

/// `name=value` or `name value`.
fn split_assignment(s: &str) -> (&str, &str) {
    let eq = s.find('=');
    let ws = s.find(char::is_whitespace);
    match (eq, ws) {
        (Some(e), Some(w)) if w < e && !s[w..e].trim().is_empty() => (&s[..w], s[w..].trim_start()),
        (Some(e), _) => (s[..e].trim_end(), &s[e + 1..]),
        (None, Some(w)) => (&s[..w], s[w..].trim_start()),
        (None, None) => (s, ""),
    }
}

fn check_ident(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    match chars.next() {
        None => Err("missing variable name".into()),
        Some(c) if (c.is_alphabetic() || c == '_') && chars.all(|c| c.is_alphanumeric() || c == '_') => Ok(()),
        Some(_) => Err(format!("invalid variable name {name:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Stmt> {
        parse_script(src).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    fn parse_err(src: &str) -> CompileError {
        parse_script(src).expect_err("expected a compile error")
    }

    #[test]
    fn empty_and_blank_scripts() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n").is_empty());
        assert!(parse("  \n; comment\n# another").is_empty());
    }

    #[test]
    fn bare_lines_emit() {
        let stmts = parse("hello\n/echo world");
        assert_eq!(stmts.len(), 2);
        assert!(matches!(stmts[0], Stmt::Emit(_)));
        assert!(matches!(stmts[1], Stmt::Emit(_)));
    }

    #[test]
    fn separator_splits_statements() {
        let stmts = parse("/set x=1 %; /emit x, x + 1");
        assert_eq!(stmts.len(), 2);
        match &stmts[1] {
            Stmt::EmitExprs(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn separator_inside_expression_is_kept() {
        assert_eq!(parse("/echo $[\"a%;b\"]").len(), 1);
    }

    #[test]
    fn continuation_lines_join() {
        let stmts = parse("/set x=\\\nabc");
        match &stmts[0] {
            Stmt::Set { name, global, .. } => {
                assert_eq!(name, "x");
                assert!(!global);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn set_forms() {
        for src in ["/set foo=bar", "/set foo bar", "/set foo = bar", "/global foo=bar"] {
            match &parse(src)[0] {
                Stmt::Set { name, .. } => assert_eq!(name, "foo", "{src}"),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(matches!(parse("/global g=1")[0], Stmt::Set { global: true, .. }));
    }

    #[test]
    fn block_nesting_is_bounded() {
        let nest = |n: usize| format!("{}x\n{}", "/while (0)\n".repeat(n), "/done\n".repeat(n));
        assert_eq!(parse(&nest(MAX_NESTING)).len(), 1);

        let err = parse_err(&format!("{}{}", "/if (1)\n".repeat(100_000), "/endif\n".repeat(100_000)));
        assert_eq!(err.line, MAX_NESTING + 1);
        assert_eq!(err.message, "blocks nested too deeply");
        assert_eq!(parse_err(&nest(MAX_NESTING + 1)).message, "blocks nested too deeply");
    }

    #[test]
    fn nested_blocks() {
        let src = "/if (1)\n/while (0)\n/break\n/done\n/elseif (2)\nb\n/else\nc\n/endif";
        match &parse(src)[0] {
            Stmt::If { branches, else_block } => {
                assert_eq!(branches.len(), 2);
                assert!(matches!(branches[0].1[0], Stmt::While { .. }));
                assert_eq!(else_block.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn for_loop() {
        match &parse("/for i 1 %n\n/emit i\n/done")[0] {
            Stmt::For { var, body, .. } => {
                assert_eq!(var, "i");
                assert_eq!(body.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn param_and_return() {
        assert_eq!(parse("/param a b")[0], Stmt::Param { names: vec!["a".into(), "b".into()] });
        assert_eq!(parse("/return")[0], Stmt::Return(None));
        assert!(matches!(parse("/return 1 + 1")[0], Stmt::Return(Some(_))));
    }

    #[test]
    fn unbalanced_blocks_report_opening_line() {
        assert_eq!(parse_err("a\n/if (1)\nb").line, 2);
        assert_eq!(parse_err("/while (1)\n/echo x").message, "/while without /done");
        assert_eq!(parse_err("/if (1)\n/else\nx").message, "/if without /endif");
    }

    #[test]
    fn stray_terminators_are_rejected() {
        let e = parse_err("x\n\n/endif");
        assert_eq!(e.line, 3);
        assert_eq!(e.message, "/endif without matching opener");
        assert!(parse_script("/done").is_err());
        assert!(parse_script("/else").is_err());
    }

    #[test]
    fn malformed_commands() {
        assert!(parse_err("/frobnicate").message.contains("unknown command /frobnicate"));
        assert!(parse_script("/emit").is_err());
        assert!(parse_script("/emit 1 +").is_err());
        assert!(parse_script("/if").is_err());
        assert!(parse_script("/set =x").is_err());
        assert!(parse_script("/set 9x=1").is_err());
        assert!(parse_script("/param").is_err());
        assert!(parse_script("/for i 1\n/done").is_err());
        assert!(parse_script("/break now").is_err());
        assert!(parse_script("/echo $[1 +").is_err());
    }

    #[test]
    fn line_numbers_skip_comments_and_continuations() {
        let e = parse_err("; c\n/echo a\\\nb\n/bogus");
        assert_eq!(e.line, 4);
    }
}
