use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::Architecture;
use crate::memory::{Address, CellKind, MemoryModel, SplitMemory, UnifiedMemory};
use crate::registers::{Register, Registers};
use crate::value::Value;
use crate::Result;

/// Host-side changes to machine state. The sequencer only applies these
/// between phases.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Write a cell; with no kind the tag is inferred from the address.
    SetCell {
        addr: Address,
        text: String,
        kind: Option<CellKind>,
    },
    DeleteCell {
        addr: Address,
        space: Option<CellKind>,
    },
    LoadProgram(String),
    SetData(String),
    ResetMemory,
    SetRegister(Register, Value),
}

/// Everything the interpreter mutates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine<M> {
    pub registers: Registers,
    pub pc: Address,
    pub memory: M,
    /// Instructions started since the session began; numbers the trace.
    #[serde(default)]
    pub instructions_started: u64,
}

impl<M: MemoryModel> Machine<M> {
    pub fn new(memory: M) -> Self {
        Self {
            registers: Registers::default(),
            pc: memory.entry_address(),
            memory,
            instructions_started: 0,
        }
    }

    /// What a stop does: PC back to the entry address, registers cleared,
    /// memory untouched.
    pub fn reset(&mut self) {
        self.registers.reset();
        self.pc = self.memory.entry_address();
    }

    /// Apply a host edit, returning a message worth reporting if there is one.
    pub fn apply(&mut self, edit: Edit) -> Option<String> {
        match edit {
            Edit::SetCell { addr, text, kind } => {
                let kind = kind.unwrap_or_else(|| self.memory.infer_kind(addr));
                self.memory.set(addr, text.trim(), kind);
                None
            }
            Edit::DeleteCell { addr, space } => {
                let space = space.unwrap_or_else(|| self.memory.infer_kind(addr));
                self.memory.delete(space, addr);
                None
            }
            Edit::LoadProgram(text) => {
                let placed = self.memory.load_program(&text);
                if placed.is_empty() {
                    None
                } else {
                    Some(format!(
                        "Loaded {} instruction(s) to memory at {:04}..={:04}.",
                        placed.len(),
                        placed.iter().min().copied().unwrap_or_default(),
                        placed.iter().max().copied().unwrap_or_default(),
                    ))
                }
            }
            Edit::SetData(value) => self
                .memory
                .set_data(&value)
                .map(|addr| format!("Direct memory set -> memory[{:04}] = {}", addr, value.trim())),
            Edit::ResetMemory => {
                self.memory.reset_defaults();
                Some("Memory reset to default entries.".to_string())
            }
            Edit::SetRegister(reg, value) => {
                self.registers.set(reg, value);
                None
            }
        }
    }
}

/// A saved machine, tagged with the memory layout it was taken from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "architecture", content = "machine", rename_all = "lowercase")]
pub enum Snapshot {
    Unified(Machine<UnifiedMemory>),
    Split(Machine<SplitMemory>),
}

impl From<Machine<UnifiedMemory>> for Snapshot {
    fn from(machine: Machine<UnifiedMemory>) -> Self {
        Snapshot::Unified(machine)
    }
}

impl From<Machine<SplitMemory>> for Snapshot {
    fn from(machine: Machine<SplitMemory>) -> Self {
        Snapshot::Split(machine)
    }
}

impl Snapshot {
    pub fn architecture(&self) -> Architecture {
        match self {
            Snapshot::Unified(_) => Architecture::Unified,
            Snapshot::Split(_) => Architecture::Split,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }
}
