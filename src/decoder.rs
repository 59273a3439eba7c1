use log::debug;
use std::fmt;

/// A decoded instruction: mnemonic plus raw operand tokens. Rebuilt from the
/// cell text on every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: String,
    pub operands: Vec<String>,
}

impl Instruction {
    pub fn operand(&self, index: usize) -> Option<&str> {
        self.operands.get(index).map(String::as_str)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.op)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.join(", "))?;
        }
        Ok(())
    }
}

/// Split on whitespace and commas, drop empty fragments and upper-case the
/// mnemonic. Arity is not checked here.
pub fn decode(text: &str) -> Instruction {
    let mut tokens = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty());

    let op = tokens.next().map(str::to_uppercase).unwrap_or_default();
    let operands = tokens.map(String::from).collect();

    let inst = Instruction { op, operands };
    debug!("decoded {:?} -> {}", text, inst);
    inst
}
