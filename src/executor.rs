use log::trace;
use thiserror::Error;

use crate::decoder::Instruction;
use crate::memory::{Address, MemoryModel};
use crate::registers::{Register, Registers};
use crate::resolver::resolve;
use crate::value::{Value, coerce_number};

/// Architectural faults. None of them stop a run: the sequencer reports them
/// and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),
    #[error("Invalid destination {0}")]
    InvalidDestination(String),
    #[error("Missing operand")]
    MissingOperand,
    #[error("LOAD failed: address {0} not found")]
    AddressNotFound(String),
    #[error("STORE failed: invalid source {src} or address {addr}")]
    InvalidStore { src: String, addr: String },
    #[error("Division by zero")]
    DivisionByZero,
}

/// What an executed instruction did.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    /// One-line account for the trace.
    pub details: String,
    /// The ALU's view of the operation.
    pub alu: String,
    /// A fault that was absorbed rather than refused, i.e. division by zero.
    pub warning: Option<Fault>,
}

impl Effect {
    fn new(details: String, alu: String) -> Self {
        Self { details, alu, warning: None }
    }
}

fn destination(token: &str) -> Result<Register, Fault> {
    Register::parse(token).ok_or_else(|| Fault::InvalidDestination(token.to_uppercase()))
}

fn parse_address(token: &str) -> Option<Address> {
    let n = coerce_number(token)?;
    if n.fract() == 0.0 && n >= 0.0 && n <= Address::MAX as f64 {
        Some(n as Address)
    } else {
        None
    }
}

/// Carry out one decoded instruction against the registers and memory.
///
/// On `Err` nothing has been modified.
pub fn execute<M: MemoryModel>(
    inst: &Instruction,
    regs: &mut Registers,
    mem: &mut M,
) -> Result<Effect, Fault> {
    trace!("execute {}", inst);

    match inst.op.as_str() {
        "MOV" => {
            // MOV dest, src
            let dest = inst.operand(0).ok_or(Fault::MissingOperand)?;
            let val = resolve(inst.operand(1), regs, mem)?;
            let reg = destination(dest)?;

            let effect = Effect::new(
                format!("Moved {} to {}", val, reg),
                format!("Move {} into {}", val, reg),
            );
            regs.set(reg, val);
            Ok(effect)
        }
        "ADD" | "SUB" | "MUL" | "DIV" => {
            // OP dest, a, b
            let dest = inst.operand(0).ok_or(Fault::MissingOperand)?;
            let a_tok = inst.operand(1).ok_or(Fault::MissingOperand)?;
            let b_tok = inst.operand(2).ok_or(Fault::MissingOperand)?;
            let a = resolve(Some(a_tok), regs, mem)?;
            let b = resolve(Some(b_tok), regs, mem)?;
            let reg = destination(dest)?;

            let (x, y) = (a.as_number(), b.as_number());
            let mut warning = None;
            let (res, sym) = match inst.op.as_str() {
                "ADD" => (x + y, '+'),
                "SUB" => (x - y, '-'),
                "MUL" => (x * y, '×'),
                _ => {
                    if y == 0.0 {
                        warning = Some(Fault::DivisionByZero);
                        (f64::NAN, '÷')
                    } else {
                        (x / y, '÷')
                    }
                }
            };
            let res = Value::Number(res);

            let effect = Effect {
                details: format!("{} {} {} = {}", a.describe(), sym, b.describe(), res),
                alu: format!(
                    "{}({}) {} {}({}) = {} → {}",
                    a_tok,
                    a.describe(),
                    sym,
                    b_tok,
                    b.describe(),
                    res,
                    reg
                ),
                warning,
            };
            regs.acc = Some(res.clone());
            regs.set(reg, res);
            Ok(effect)
        }
        "LOAD" => {
            // LOAD dest, addr
            let dest = inst.operand(0).ok_or(Fault::MissingOperand)?;
            let addr_tok = inst.operand(1).ok_or(Fault::MissingOperand)?;
            let (addr, text) = parse_address(addr_tok)
                .and_then(|addr| mem.resolve_address(addr).map(|t| (addr, t)))
                .ok_or_else(|| Fault::AddressNotFound(addr_tok.to_string()))?;
            let reg = destination(dest)?;

            let val = Value::parse(text);
            let effect = Effect::new(
                format!("Loaded memory[{:04}] -> {}", addr, reg),
                format!("Load address[{:04}]({}) → {}", addr, val, reg),
            );
            regs.acc = Some(val.clone());
            regs.set(reg, val);
            Ok(effect)
        }
        "STORE" => {
            // STORE src, addr
            let src_tok = inst.operand(0).ok_or(Fault::MissingOperand)?;
            let addr_tok = inst.operand(1).ok_or(Fault::MissingOperand)?;
            let (src, addr) = Register::parse(src_tok)
                .zip(parse_address(addr_tok))
                .ok_or_else(|| Fault::InvalidStore {
                    src: src_tok.to_uppercase(),
                    addr: addr_tok.to_string(),
                })?;

            let val = regs.get(src).to_string();
            mem.store(addr, &val);
            Ok(Effect::new(
                format!("Stored {}({}) -> memory[{:04}]", src, val, addr),
                format!("Store {}({}) → address[{:04}]", src, val, addr),
            ))
        }
        _ => Err(Fault::UnknownInstruction(inst.to_string())),
    }
}
