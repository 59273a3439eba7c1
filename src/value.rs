use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar held by a register or produced by operand resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Repr", into = "Repr")]
pub enum Value {
    Number(f64),
    Text(String),
    /// Result of reading an address that holds nothing.
    Empty,
}

/// JSON has no NaN or infinities, so non-finite numbers travel as their
/// display strings.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(f64),
    Text(String),
    Empty(()),
}

impl From<Repr> for Value {
    fn from(repr: Repr) -> Self {
        match repr {
            Repr::Number(n) => Value::Number(n),
            Repr::Text(s) => Value::parse(&s),
            Repr::Empty(()) => Value::Empty,
        }
    }
}

impl From<Value> for Repr {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(n) if n.is_finite() => Repr::Number(n),
            Value::Number(n) => Repr::Text(format_number(n)),
            Value::Text(s) => Repr::Text(s),
            Value::Empty => Repr::Empty(()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl Value {
    /// The sentinel produced by division by zero and by arithmetic on
    /// non-numeric operands.
    pub const NAN: Value = Value::Number(f64::NAN);

    /// Coerce raw text: numeric when it looks like a number, the text itself
    /// otherwise. `NaN` reads back as the sentinel it displays as.
    pub fn parse(text: &str) -> Value {
        match coerce_number(text) {
            Some(n) => Value::Number(n),
            None if text.trim() == "NaN" => Value::NAN,
            None => Value::Text(text.to_string()),
        }
    }

    /// The value as it reads back once written out as text, which is how
    /// registers and memory cells hold it. `Empty` becomes `0`.
    pub fn reread(&self) -> Value {
        match self {
            Value::Number(_) => self.clone(),
            v => Value::parse(&v.to_string()),
        }
    }

    /// Numeric view used by the ALU. Anything that isn't a number is NaN.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Text(s) => coerce_number(s).unwrap_or(f64::NAN),
            Value::Empty => f64::NAN,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    /// Like `Display`, but spells out `null` for an empty result so trace
    /// lines don't end up with a blank where an operand should be.
    pub fn describe(&self) -> String {
        match self {
            Value::Empty => "null".to_string(),
            v => v.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
            Value::Empty => Ok(()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::parse(s)
    }
}

/// Loose numeric coercion: blank is zero, decimal/exponent forms parse, as do
/// `0x`/`0o`/`0b` integers and `Infinity`.
pub fn coerce_number(text: &str) -> Option<f64> {
    let t = text.trim();
    if t.is_empty() {
        return Some(0.0);
    }

    match t {
        "Infinity" | "+Infinity" => return Some(f64::INFINITY),
        "-Infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }

    let radix = match t.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&t[2..], radix).ok().map(|n| n as f64);
    }

    // rust accepts "inf", "nan" and friends; those are not numbers here
    if !t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }

    t.parse::<f64>().ok()
}

/// Shortest round-trip form; magnitudes from 1e21 up or below 1e-6 switch to
/// exponent notation with a signed exponent (`1e+21`, `1.5e-7`).
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let exp = format!("{:e}", n);
        match exp.split_once('e') {
            Some((mantissa, power)) if !power.starts_with('-') => {
                format!("{}e+{}", mantissa, power)
            }
            _ => exp,
        }
    } else {
        n.to_string()
    }
}
