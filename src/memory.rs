//! Addressable storage behind the interpreter.
//!
//! [`UnifiedMemory`] keeps instructions and data in one address space, told
//! apart only by a kind tag. [`SplitMemory`] keeps two disjoint spaces; an
//! address in one says nothing about the other. The interpreter only talks to
//! [`MemoryModel`], so the two layouts share every line of execution logic.

use clap::ValueEnum;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Address = u32;

/// First address of the data range.
pub const DATA_BASE: Address = 1000;

/// Program written into instruction memory by a reset.
pub const SEED_PROGRAM: [&str; 7] = [
    "MOV R1, #5",
    "MOV R2, #10",
    "ADD R3, R1, R2",
    "SUB R1, R3, R2",
    "MUL R2, R1, R3",
    "DIV R3, R2, R1",
    "STORE R3, 1000",
];

/// Values written from `DATA_BASE` upward by a reset.
pub const SEED_DATA: [&str; 4] = ["25", "50", "75", "100"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Instruction,
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub text: String,
    pub kind: CellKind,
}

impl Cell {
    pub fn new(text: &str, kind: CellKind) -> Self {
        Self { text: text.to_string(), kind }
    }

    /// Anything with a letter in it is taken to be an instruction.
    pub fn looks_like_instruction(&self) -> bool {
        self.text.chars().any(|c| c.is_ascii_alphabetic())
    }
}

/// Where `load_program` puts new lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Each line goes to the next free instruction address.
    Append,
    /// Instruction memory is cleared and refilled from the entry address.
    Overwrite,
}

pub trait MemoryModel {
    /// Where the program counter starts and where stop sends it back.
    fn entry_address(&self) -> Address;

    /// Look up a cell. `space` picks the address space; a unified memory has
    /// only one and ignores it.
    fn get(&self, space: CellKind, addr: Address) -> Option<&Cell>;

    fn set(&mut self, addr: Address, text: &str, kind: CellKind);

    fn delete(&mut self, space: CellKind, addr: Address) -> Option<Cell>;

    /// Cells of a space in ascending address order.
    fn cells(&self, space: CellKind) -> Box<dyn Iterator<Item = (Address, &Cell)> + '_>;

    fn next_free_data_address(&self) -> Address;

    fn next_free_instruction_address(&self) -> Address;

    fn clear(&mut self);

    fn clear_instructions(&mut self);

    fn load_policy(&self) -> LoadPolicy;

    fn set_load_policy(&mut self, policy: LoadPolicy);

    /// Tag used when a host edit doesn't name one.
    fn infer_kind(&self, addr: Address) -> CellKind {
        if addr >= DATA_BASE {
            CellKind::Data
        } else {
            CellKind::Instruction
        }
    }

    fn fetch_instruction(&self, pc: Address) -> Option<&str> {
        self.get(CellKind::Instruction, pc).map(|c| c.text.as_str())
    }

    /// Data read used by LOAD and address operands.
    fn resolve_address(&self, addr: Address) -> Option<&str> {
        self.get(CellKind::Data, addr).map(|c| c.text.as_str())
    }

    fn store(&mut self, addr: Address, text: &str) {
        trace!("store {:?} -> [{:04}]", text, addr);
        self.set(addr, text, CellKind::Data);
    }

    /// First address at or after `start` that holds something instruction-like.
    /// Numeric leftovers in gaps are skipped.
    fn next_instruction_from(&self, start: Address) -> Option<Address> {
        self.cells(CellKind::Instruction)
            .find(|(addr, cell)| *addr >= start && cell.looks_like_instruction())
            .map(|(addr, _)| addr)
    }

    /// Place newline-separated instructions according to the load policy and
    /// return the addresses used.
    fn load_program(&mut self, text: &str) -> Vec<Address> {
        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let mut placed = Vec::with_capacity(lines.len());
        match self.load_policy() {
            LoadPolicy::Overwrite => {
                self.clear_instructions();
                for (addr, line) in (self.entry_address()..=Address::MAX).zip(lines) {
                    self.set(addr, line, CellKind::Instruction);
                    placed.push(addr);
                }
            }
            LoadPolicy::Append => {
                for line in lines {
                    let addr = self.next_free_instruction_address();
                    self.set(addr, line, CellKind::Instruction);
                    placed.push(addr);
                }
            }
        }
        placed
    }

    /// Put a value at the lowest free data address. Blank input is ignored.
    fn set_data(&mut self, value: &str) -> Option<Address> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        let addr = self.next_free_data_address();
        self.set(addr, value, CellKind::Data);
        Some(addr)
    }

    /// Wipe everything and write the seed program and data.
    fn reset_defaults(&mut self) {
        self.clear();
        let entry = self.entry_address();
        for (addr, line) in (entry..).zip(SEED_PROGRAM) {
            self.set(addr, line, CellKind::Instruction);
        }
        for (addr, value) in (DATA_BASE..).zip(SEED_DATA) {
            self.set(addr, value, CellKind::Data);
        }
    }
}

fn first_gap<V>(map: &BTreeMap<Address, V>, from: Address) -> Address {
    let mut addr = from;
    for &used in map.range(from..).map(|(a, _)| a) {
        if used != addr {
            break;
        }
        addr += 1;
    }
    addr
}

/// One address space for both instructions and data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedMemory {
    cells: BTreeMap<Address, Cell>,
    load_policy: LoadPolicy,
}

impl Default for UnifiedMemory {
    fn default() -> Self {
        Self {
            cells: BTreeMap::new(),
            load_policy: LoadPolicy::Append,
        }
    }
}

impl UnifiedMemory {
    pub const ENTRY: Address = 1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded() -> Self {
        let mut mem = Self::new();
        mem.reset_defaults();
        mem
    }
}

impl MemoryModel for UnifiedMemory {
    fn entry_address(&self) -> Address {
        Self::ENTRY
    }

    fn get(&self, _space: CellKind, addr: Address) -> Option<&Cell> {
        self.cells.get(&addr)
    }

    fn set(&mut self, addr: Address, text: &str, kind: CellKind) {
        self.cells.insert(addr, Cell::new(text, kind));
    }

    fn delete(&mut self, _space: CellKind, addr: Address) -> Option<Cell> {
        self.cells.remove(&addr)
    }

    fn cells(&self, _space: CellKind) -> Box<dyn Iterator<Item = (Address, &Cell)> + '_> {
        Box::new(self.cells.iter().map(|(a, c)| (*a, c)))
    }

    fn next_free_data_address(&self) -> Address {
        first_gap(&self.cells, DATA_BASE)
    }

    /// First gap below the data range; past that, the first gap above it.
    fn next_free_instruction_address(&self) -> Address {
        let addr = first_gap(&self.cells, Self::ENTRY);
        if addr < DATA_BASE {
            addr
        } else {
            first_gap(&self.cells, DATA_BASE)
        }
    }

    fn clear(&mut self) {
        self.cells.clear();
    }

    fn clear_instructions(&mut self) {
        self.cells.retain(|_, c| c.kind != CellKind::Instruction);
    }

    fn load_policy(&self) -> LoadPolicy {
        self.load_policy
    }

    fn set_load_policy(&mut self, policy: LoadPolicy) {
        self.load_policy = policy;
    }
}

/// Separate instruction and data spaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitMemory {
    instructions: BTreeMap<Address, Cell>,
    data: BTreeMap<Address, Cell>,
    load_policy: LoadPolicy,
}

impl Default for SplitMemory {
    fn default() -> Self {
        Self {
            instructions: BTreeMap::new(),
            data: BTreeMap::new(),
            load_policy: LoadPolicy::Overwrite,
        }
    }
}

impl SplitMemory {
    pub const ENTRY: Address = 0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded() -> Self {
        let mut mem = Self::new();
        mem.reset_defaults();
        mem
    }

    fn space(&self, kind: CellKind) -> &BTreeMap<Address, Cell> {
        match kind {
            CellKind::Instruction => &self.instructions,
            CellKind::Data => &self.data,
        }
    }

    fn space_mut(&mut self, kind: CellKind) -> &mut BTreeMap<Address, Cell> {
        match kind {
            CellKind::Instruction => &mut self.instructions,
            CellKind::Data => &mut self.data,
        }
    }
}

impl MemoryModel for SplitMemory {
    fn entry_address(&self) -> Address {
        Self::ENTRY
    }

    fn get(&self, space: CellKind, addr: Address) -> Option<&Cell> {
        self.space(space).get(&addr)
    }

    fn set(&mut self, addr: Address, text: &str, kind: CellKind) {
        self.space_mut(kind).insert(addr, Cell::new(text, kind));
    }

    fn delete(&mut self, space: CellKind, addr: Address) -> Option<Cell> {
        self.space_mut(space).remove(&addr)
    }

    fn cells(&self, space: CellKind) -> Box<dyn Iterator<Item = (Address, &Cell)> + '_> {
        Box::new(self.space(space).iter().map(|(a, c)| (*a, c)))
    }

    fn next_free_data_address(&self) -> Address {
        first_gap(&self.data, DATA_BASE)
    }

    fn next_free_instruction_address(&self) -> Address {
        first_gap(&self.instructions, Self::ENTRY)
    }

    fn clear(&mut self) {
        self.instructions.clear();
        self.data.clear();
    }

    fn clear_instructions(&mut self) {
        self.instructions.clear();
    }

    fn load_policy(&self) -> LoadPolicy {
        self.load_policy
    }

    fn set_load_policy(&mut self, policy: LoadPolicy) {
        self.load_policy = policy;
    }
}
