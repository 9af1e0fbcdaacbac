//! Runtime value type for block scripts.
//!
//! Scripts are dynamically typed.  Text is the common currency; the
//! interpreter coerces freely to integers and floats when arithmetic needs
//! them.  Error actions are carried as a first-class variant so a host can
//! store a typed preference without going through text.

use std::cmp::Ordering;
use std::fmt;

use crate::policy::ErrorAction;

/// A runtime value, also the payload of every output event.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Action(ErrorAction),
}

impl Default for Value {
    fn default() -> Self {
        Value::Str(String::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::Action(a) => f.write_str(a.name()),
        }
    }
}

impl Value {
    /// Parse text the way `/set` stores it: integers and floats become
    /// numbers, anything else stays text.
    pub fn from_text(s: &str) -> Value {
        let t = s.trim();
        if let Ok(n) = t.parse::<i64>() {
            Value::Int(n)
        } else if t.contains('.') && t.parse::<f64>().is_ok() {
            Value::Float(t.parse().unwrap_or(0.0))
        } else {
            Value::Str(s.to_owned())
        }
    }

    /// `0`, `""` and `"0"` are falsy.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::Action(_) => true,
        }
    }

    /// Coerce to `i64` (0 when the text is not a number).
    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(n) => *n,
            Value::Float(x) => *x as i64,
            Value::Str(s) => s.trim().parse().unwrap_or(0),
            Value::Action(_) => 0,
        }
    }

    pub fn as_float(&self) -> f64 {
        match self {
            Value::Int(n) => *n as f64,
            Value::Float(x) => *x,
            Value::Str(s) => s.trim().parse().unwrap_or(0.0),
            Value::Action(_) => 0.0,
        }
    }

    pub fn as_str(&self) -> String {
        self.to_string()
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "real",
            Value::Str(_) => "string",
            Value::Action(_) => "action",
        }
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    /// Common numeric view of two operands: `(a, b, is_float)`.
    fn numeric_promote(a: &Value, b: &Value) -> (f64, f64, bool) {
        let looks_float = |v: &Value| match v {
            Value::Float(_) => true,
            Value::Str(s) => s.contains('.'),
            _ => false,
        };
        (a.as_float(), b.as_float(), looks_float(a) || looks_float(b))
    }

    fn make_numeric(f: f64, is_float: bool) -> Value {
        if is_float {
            Value::Float(f)
        } else {
            Value::Int(f as i64)
        }
    }

    pub fn arith_add(&self, rhs: &Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            return Value::Int(a.wrapping_add(*b));
        }
        let (a, b, is_float) = Self::numeric_promote(self, rhs);
        Self::make_numeric(a + b, is_float)
    }

    pub fn arith_sub(&self, rhs: &Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            return Value::Int(a.wrapping_sub(*b));
        }
        let (a, b, is_float) = Self::numeric_promote(self, rhs);
        Self::make_numeric(a - b, is_float)
    }

    pub fn arith_mul(&self, rhs: &Value) -> Value {
        if let (Value::Int(a), Value::Int(b)) = (self, rhs) {
            return Value::Int(a.wrapping_mul(*b));
        }
        let (a, b, is_float) = Self::numeric_promote(self, rhs);
        Self::make_numeric(a * b, is_float)
    }

    pub fn arith_div(&self, rhs: &Value) -> Result<Value, String> {
        let (a, b, is_float) = Self::numeric_promote(self, rhs);
        if b == 0.0 {
            return Err("division by zero".into());
        }
        Ok(Self::make_numeric(a / b, is_float))
    }

    pub fn arith_rem(&self, rhs: &Value) -> Result<Value, String> {
        let (a, b, is_float) = Self::numeric_promote(self, rhs);
        if b == 0.0 {
            return Err("modulo by zero".into());
        }
        Ok(Self::make_numeric(a % b, is_float))
    }

    pub fn arith_neg(&self) -> Value {
        match Value::from_text(&self.as_str()) {
            Value::Int(n) => Value::Int(n.wrapping_neg()),
            Value::Float(x) => Value::Float(-x),
            _ => Value::Int(0),
        }
    }

    /// Numeric comparison when both sides are numbers, text comparison
    /// otherwise.
    pub fn cmp_value(&self, rhs: &Value) -> Ordering {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_float().partial_cmp(&rhs.as_float()).unwrap_or(Ordering::Equal)
            }
            _ => {
                let (a, b) = (self.as_str(), rhs.as_str());
                match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
                    (Ok(af), Ok(bf)) => af.partial_cmp(&bf).unwrap_or(Ordering::Equal),
                    _ => a.cmp(&b),
                }
            }
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(if b { 1 } else { 0 })
    }
}

impl From<ErrorAction> for Value {
    fn from(a: ErrorAction) -> Self {
        Value::Action(a)
    }
}
