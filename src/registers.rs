use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::value::Value;

/// The three general-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Register {
    R1,
    R2,
    R3,
}

impl Register {
    pub const ALL: [Register; 3] = [Register::R1, Register::R2, Register::R3];

    /// Match a token against the register pattern, ignoring case.
    pub fn parse(token: &str) -> Option<Register> {
        match token.trim().to_ascii_uppercase().as_str() {
            "R1" => Some(Register::R1),
            "R2" => Some(Register::R2),
            "R3" => Some(Register::R3),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Register::R1 => 0,
            Register::R2 => 1,
            Register::R3 => 2,
        }
    }
}

impl FromStr for Register {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Register::parse(s).ok_or_else(|| format!("not a register: {}", s))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.index() + 1)
    }
}

/// Register file: the general-purpose registers plus the ones a fetch makes
/// visible (IR, MAR, MDR) and the accumulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registers {
    general: [Value; 3],
    pub ir: String,
    pub mar: Option<u32>,
    pub mdr: String,
    pub acc: Option<Value>,
}

impl Registers {
    pub fn get(&self, reg: Register) -> &Value {
        &self.general[reg.index()]
    }

    pub fn set(&mut self, reg: Register, value: Value) {
        self.general[reg.index()] = value;
    }

    /// Zero the general registers and blank the rest.
    pub fn reset(&mut self) {
        *self = Registers::default();
    }
}
