/*!
 * Instruction-cycle interpreter for a toy CPU, runnable against a unified
 * (von Neumann) or split instruction/data (modified Harvard) memory.
 *
 * License: MIT
 */

use thiserror::Error;

pub mod clock;
pub mod config;
pub mod decoder;
pub mod executor;
pub mod machine;
pub mod memory;
pub mod registers;
pub mod resolver;
pub mod sequencer;
pub mod trace;
pub mod value;

pub use clock::{Clock, InstantClock, SystemClock};
pub use config::{Architecture, MachineConfig, PhaseTimings};
pub use decoder::{Instruction, decode};
pub use executor::{Effect, Fault, execute};
pub use machine::{Edit, Machine, Snapshot};
pub use memory::{Address, Cell, CellKind, LoadPolicy, MemoryModel, SplitMemory, UnifiedMemory};
pub use registers::{Register, Registers};
pub use resolver::resolve;
pub use sequencer::{Controller, Phase, Request, RunOutcome, RunState, Sequencer, Tick};
pub use trace::{JsonSink, LogSink, TraceEvent, TraceSink};
pub use value::Value;

pub type Result<T> = std::result::Result<T, Error>;

/// Host-side failures. Nothing the interpreter does while executing a program
/// ends up here; see [`Fault`] for those.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
}
