//! Text substitution, compiled ahead of time.
//!
//! Text arguments (`/echo`, `/set`, bare lines, …) are split into a
//! [`Template`] when the unit is compiled, so malformed substitutions are
//! reported as compile errors rather than at run time.
//!
//! | Sequence           | Meaning                                            |
//! |--------------------|----------------------------------------------------|
//! | `%name`            | Variable `name` (identifier characters only)       |
//! | `%{name}`          | Same, braced form                                  |
//! | `%{name-default}`  | Variable `name`, or `default` if unset or empty    |
//! | `%1`, `%2`, …      | Positional argument (1-based)                      |
//! | `%*`               | All positional arguments joined with spaces        |
//! | `%#`               | Number of positional arguments                     |
//! | `$[expr]`          | Evaluate `expr` and substitute the result          |
//! | `%%`, `$$`         | Literal `%`, `$`                                   |

use std::iter::Peekable;
use std::str::Chars;

use super::expr::{eval_expr, parse_expr, EvalContext, Expr};

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Lit(String),
    Var { name: String, default: Option<String> },
    Param(usize),
    AllParams,
    ParamCount,
    Expr(Expr),
}

/// A compiled piece of substitutable text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    pub fn compile(src: &str) -> Result<Template, String> {
        let mut parts = Vec::new();
        let mut lit = String::new();
        let mut chars = src.chars().peekable();

        let push = |parts: &mut Vec<Part>, lit: &mut String, part: Part| {
            if !lit.is_empty() {
                parts.push(Part::Lit(std::mem::take(lit)));
            }
            parts.push(part);
        };

        while let Some(ch) = chars.next() {
            match (ch, chars.peek().copied()) {
                ('%', Some('%')) | ('$', Some('$')) => {
                    chars.next();
                    lit.push(ch);
                }
                ('%', Some('{')) => {
                    chars.next();
                    let inner = read_until(&mut chars, '{', '}')
                        .ok_or_else(|| "unclosed '%{'".to_owned())?;
                    let (name, default) = match inner.split_once('-') {
                        Some((n, d)) => (n.to_owned(), Some(d.to_owned())),
                        None => (inner, None),
                    };
                    if name.is_empty() {
                        return Err("empty variable name in '%{}'".into());
                    }
                    push(&mut parts, &mut lit, Part::Var { name, default });
                }
                ('%', Some('*')) => {
                    chars.next();
                    push(&mut parts, &mut lit, Part::AllParams);
                }
                ('%', Some('#')) => {
                    chars.next();
                    push(&mut parts, &mut lit, Part::ParamCount);
                }
                ('%', Some(c)) if c.is_ascii_digit() && c != '0' => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        digits.push(d);
                        chars.next();
                    }
                    let n = digits
                        .parse()
                        .map_err(|_| format!("argument index %{digits} out of range"))?;
                    push(&mut parts, &mut lit, Part::Param(n));
                }
                ('%', Some(c)) if is_ident_start(c) => {
                    let mut name = String::new();
                    while let Some(c) = chars.peek().copied().filter(|c| is_ident_continue(*c)) {
                        name.push(c);
                        chars.next();
                    }
                    push(&mut parts, &mut lit, Part::Var { name, default: None });
                }
                ('$', Some('[')) => {
                    chars.next();
                    let src = read_until(&mut chars, '[', ']')
                        .ok_or_else(|| "unclosed '$['".to_owned())?;
                    let expr = parse_expr(&src).map_err(|e| format!("in $[{src}]: {e}"))?;
                    push(&mut parts, &mut lit, Part::Expr(expr));
                }
                _ => lit.push(ch),
            }
        }
        if !lit.is_empty() {
            parts.push(Part::Lit(lit));
        }
        Ok(Template { parts })
    }

    /// A template made of plain text only.
    pub fn literal(text: impl Into<String>) -> Template {
        let text = text.into();
        if text.is_empty() {
            return Template::default();
        }
        Template { parts: vec![Part::Lit(text)] }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn expand(&self, ctx: &mut dyn EvalContext) -> Result<String, String> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Lit(s) => out.push_str(s),
                Part::Var { name, default } => {
                    let value = ctx.get_var(name).map(|v| v.as_str()).unwrap_or_default();
                    match default {
                        Some(d) if value.is_empty() => out.push_str(d),
                        _ => out.push_str(&value),
                    }
                }
                Part::Param(n) => {
                    if let Some(v) = ctx.params().get(n - 1) {
                        out.push_str(&v.as_str());
                    }
                }
                Part::AllParams => {
                    let all: Vec<String> = ctx.params().iter().map(|v| v.as_str()).collect();
                    out.push_str(&all.join(" "));
                }
                Part::ParamCount => out.push_str(&ctx.params().len().to_string()),
                Part::Expr(expr) => out.push_str(&eval_expr(expr, ctx)?.as_str()),
            }
        }
        Ok(out)
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Read up to the `close` matching an already consumed `open`, honouring
/// nesting.  Returns `None` if input ends first.
fn read_until(chars: &mut Peekable<Chars>, open: char, close: char) -> Option<String> {
    let mut out = String::new();
    let mut depth = 0usize;
    for c in chars.by_ref() {
        if c == close {
            if depth == 0 {
                return Some(out);
            }
            depth -= 1;
        } else if c == open {
            depth += 1;
        }
        out.push(c);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Value;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TestCtx {
        vars: HashMap<String, Value>,
        params: Vec<Value>,
    }

    impl EvalContext for TestCtx {
        fn get_var(&self, name: &str) -> Option<Value> {
            self.vars.get(name).cloned()
        }
        fn set_var(&mut self, name: &str, value: Value) {
            self.vars.insert(name.into(), value);
        }
        fn params(&self) -> &[Value] {
            &self.params
        }
        fn call_fn(&mut self, name: &str, _args: Vec<Value>) -> Result<Value, String> {
            Err(format!("no function {name}"))
        }
    }

    fn exp(src: &str, ctx: &mut TestCtx) -> String {
        Template::compile(src).unwrap().expand(ctx).unwrap()
    }

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(exp("hello world", &mut TestCtx::default()), "hello world");
        assert_eq!(exp("", &mut TestCtx::default()), "");
        assert!(Template::compile("").unwrap().is_empty());
    }

    #[test]
    fn variables() {
        let mut ctx = TestCtx::default();
        ctx.vars.insert("foo".into(), "bar".into());
        assert_eq!(exp("[%foo]", &mut ctx), "[bar]");
        assert_eq!(exp("%{foo}baz", &mut ctx), "barbaz");
        assert_eq!(exp("%missing|", &mut ctx), "|");
    }

    #[test]
    fn defaults_apply_when_unset_or_empty() {
        let mut ctx = TestCtx::default();
        ctx.vars.insert("empty".into(), "".into());
        assert_eq!(exp("%{nope-dflt}", &mut ctx), "dflt");
        assert_eq!(exp("%{empty-dflt}", &mut ctx), "dflt");
        ctx.vars.insert("set".into(), Value::Int(3));
        assert_eq!(exp("%{set-dflt}", &mut ctx), "3");
    }

    #[test]
    fn positional_arguments() {
        let mut ctx = TestCtx {
            params: vec!["a".into(), Value::Int(2), "c".into()],
            ..Default::default()
        };
        assert_eq!(exp("%1-%2-%3-%4", &mut ctx), "a-2-c-");
        assert_eq!(exp("%*", &mut ctx), "a 2 c");
        assert_eq!(exp("n=%#", &mut ctx), "n=3");
    }

    #[test]
    fn expressions() {
        let mut ctx = TestCtx::default();
        ctx.vars.insert("x".into(), Value::Int(6));
        assert_eq!(exp("$[x * 7]", &mut ctx), "42");
        assert_eq!(exp("$[(1 + 2) * 2]!", &mut ctx), "6!");
    }

    #[test]
    fn escapes_and_stray_sigils() {
        let mut ctx = TestCtx::default();
        assert_eq!(exp("100%% $$5", &mut ctx), "100% $5");
        assert_eq!(exp("50% off, %0, $x", &mut ctx), "50% off, %0, $x");
    }

    #[test]
    fn malformed_templates_fail_to_compile() {
        assert!(Template::compile("%{open").is_err());
        assert!(Template::compile("%{}").is_err());
        assert!(Template::compile("$[1 +").is_err());
        assert!(Template::compile("$[1 +]").is_err());
    }

    #[test]
    fn expression_errors_surface_at_expand() {
        let t = Template::compile("$[1 / 0]").unwrap();
        assert!(t.expand(&mut TestCtx::default()).is_err());
    }
}
