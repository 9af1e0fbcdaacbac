//! Built-in functions callable from expressions.
//!
//! Each function receives already-evaluated arguments.  Functions that need
//! the running interpreter (`arg`, `argc`, `defined`) are handled by
//! [`Interpreter`](super::Interpreter) before falling through to here.

use regex::Regex;

use super::value::Value;
use crate::policy::ErrorAction;

/// Largest string a built-in may build.
pub const MAX_RESULT_BYTES: usize = 16 << 20;

/// Dispatch a built-in function call.
///
/// Returns `None` if `name` is not a built-in.
pub fn call_builtin(name: &str, args: Vec<Value>) -> Option<Result<Value, String>> {
    fn inner(name: &str, args: Vec<Value>) -> Result<Option<Value>, String> {
        Ok(Some(match name {
            // ── Strings ──────────────────────────────────────────────────────
            "strlen" => Value::Int(get_str(&args, 0, name)?.chars().count() as i64),
            "strcat" => Value::Str(args.iter().map(Value::as_str).collect()),
            "substr" => {
                let s = get_str(&args, 0, name)?;
                let pos = get_int(&args, 1, name)?.max(0) as usize;
                let chars: Vec<char> = s.chars().collect();
                let start = pos.min(chars.len());
                let end = match args.get(2) {
                    Some(len) => (start + len.as_int().max(0) as usize).min(chars.len()),
                    None => chars.len(),
                };
                Value::Str(chars[start..end].iter().collect())
            }
            "strstr" => {
                let haystack = get_str(&args, 0, name)?;
                let needle = get_str(&args, 1, name)?;
                Value::Int(match haystack.find(&needle) {
                    Some(i) => haystack[..i].chars().count() as i64,
                    None => -1,
                })
            }
            "toupper" => Value::Str(get_str(&args, 0, name)?.to_uppercase()),
            "tolower" => Value::Str(get_str(&args, 0, name)?.to_lowercase()),
            "strrep" => {
                let s = get_str(&args, 0, name)?;
                let n = usize::try_from(get_int(&args, 1, name)?.max(0)).unwrap_or(usize::MAX);
                match s.len().checked_mul(n) {
                    Some(bytes) if bytes <= MAX_RESULT_BYTES => Value::Str(s.repeat(n)),
                    _ => return Err(format!("{name}: result too large")),
                }
            }
            "replace" => {
                let haystack = get_str(&args, 0, name)?;
                let needle = get_str(&args, 1, name)?;
                let repl = get_str(&args, 2, name)?;
                Value::Str(haystack.replace(&needle, &repl))
            }
            "regmatch" => {
                // regmatch(pattern, text) → first match, or "" when none
                let pattern = get_str(&args, 0, name)?;
                let text = get_str(&args, 1, name)?;
                let re = Regex::new(&pattern).map_err(|e| format!("{name}: bad regex: {e}"))?;
                Value::Str(re.find(&text).map(|m| m.as_str().to_owned()).unwrap_or_default())
            }

            // ── Math ─────────────────────────────────────────────────────────
            "abs" => match args.into_iter().next() {
                Some(Value::Float(x)) => Value::Float(x.abs()),
                Some(v) => Value::Int(v.as_int().wrapping_abs()),
                None => return Err(format!("{name}: too few args")),
            },
            "min" | "max" => {
                let mut it = args.into_iter();
                let mut best = it.next().ok_or_else(|| format!("{name}: too few args"))?;
                for v in it {
                    let ord = v.cmp_value(&best);
                    let better = if name == "min" { ord.is_lt() } else { ord.is_gt() };
                    if better {
                        best = v;
                    }
                }
                best
            }

            // ── Types ────────────────────────────────────────────────────────
            "whatis" => Value::Str(
                args.first()
                    .ok_or_else(|| format!("{name}: too few args"))?
                    .type_name()
                    .to_owned(),
            ),
            "action" => {
                let s = get_str(&args, 0, name)?;
                let action: ErrorAction = s.parse().map_err(|e| format!("{name}: {e}"))?;
                Value::Action(action)
            }

            _ => return Ok(None),
        }))
    }
    inner(name, args).transpose()
}

fn get_str(args: &[Value], idx: usize, name: &str) -> Result<String, String> {
    args.get(idx)
        .map(Value::as_str)
        .ok_or_else(|| format!("{name}: missing argument {}", idx + 1))
}

fn get_int(args: &[Value], idx: usize, name: &str) -> Result<i64, String> {
    args.get(idx)
        .map(Value::as_int)
        .ok_or_else(|| format!("{name}: missing argument {}", idx + 1))
}
