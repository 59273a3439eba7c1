use log::trace;

use crate::executor::Fault;
use crate::memory::{Address, MemoryModel};
use crate::registers::{Register, Registers};
use crate::value::{Value, coerce_number};

/// Marker for an immediate literal, as in `#5`.
pub const IMMEDIATE_PREFIX: char = '#';

/// Turn an operand token into a value. Checked in order: register name,
/// `#` immediate, bare address (an absent address gives `Value::Empty`),
/// plain number, and finally the token itself as text.
///
/// Registers read the same way memory does, so an empty register counts as 0.
///
/// Only a missing token fails; anything else resolves to something.
pub fn resolve<M: MemoryModel>(
    token: Option<&str>,
    regs: &Registers,
    mem: &M,
) -> Result<Value, Fault> {
    let token = token.map(str::trim).ok_or(Fault::MissingOperand)?;

    let value = if let Some(reg) = Register::parse(token) {
        regs.get(reg).reread()
    } else if let Some(lit) = token.strip_prefix(IMMEDIATE_PREFIX) {
        Value::parse(lit)
    } else if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        token
            .parse::<Address>()
            .ok()
            .and_then(|addr| mem.resolve_address(addr))
            .map(Value::parse)
            .unwrap_or(Value::Empty)
    } else if let Some(n) = coerce_number(token).filter(|_| !token.is_empty()) {
        Value::Number(n)
    } else {
        Value::Text(token.to_string())
    };

    trace!("resolved {:?} -> {:?}", token, value);
    Ok(value)
}
