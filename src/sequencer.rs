//! Drives the fetch → decode → execute → writeback cycle.
//!
//! The [`Sequencer`] owns the machine. Hosts steer it through a [`Controller`],
//! which flips the shared run state and queues edits; both are only looked at
//! on phase boundaries, so a phase that has started always finishes against
//! the state it started with.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use crate::clock::Clock;
use crate::config::PhaseTimings;
use crate::decoder::{Instruction, decode};
use crate::executor::execute;
use crate::machine::{Edit, Machine};
use crate::memory::{Address, MemoryModel};
use crate::trace::{TraceEvent, TraceSink};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Fetch,
    Decode,
    Execute,
    Writeback,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Fetch, Phase::Decode, Phase::Execute, Phase::Writeback];

    fn next(self) -> Option<Phase> {
        match self {
            Phase::Fetch => Some(Phase::Decode),
            Phase::Decode => Some(Phase::Execute),
            Phase::Execute => Some(Phase::Writeback),
            Phase::Writeback => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Phase::Fetch => "FETCH",
            Phase::Decode => "DECODE",
            Phase::Execute => "EXECUTE",
            Phase::Writeback => "WRITEBACK",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Stopped = 3,
}

impl RunState {
    fn from_u8(n: u8) -> RunState {
        match n {
            1 => RunState::Running,
            2 => RunState::Paused,
            3 => RunState::Stopped,
            _ => RunState::Idle,
        }
    }
}

/// Messages from a [`Controller`] to the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Nothing to do beyond waking a sequencer blocked in [`Sequencer::wait`].
    Wake,
    /// Abandon the current cycle and reset PC and registers.
    Stop,
    Edit(Edit),
}

/// Host handle on a running sequencer. Cheap to clone and safe to use from
/// another thread.
#[derive(Debug, Clone)]
pub struct Controller {
    state: Arc<AtomicU8>,
    tx: Sender<Request>,
}

impl Controller {
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Start, resume or restart. Returns false if already running.
    pub fn play(&self) -> bool {
        let prev = self.state.swap(RunState::Running as u8, Ordering::SeqCst);
        let changed = prev != RunState::Running as u8;
        if changed {
            self.send(Request::Wake);
        }
        changed
    }

    /// Returns false unless the run was actually running.
    pub fn pause(&self) -> bool {
        self.state
            .compare_exchange(
                RunState::Running as u8,
                RunState::Paused as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// The play/pause button: pause when running, play otherwise. Returns the
    /// new state.
    pub fn toggle(&self) -> RunState {
        let prev = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                Some(if s == RunState::Running as u8 {
                    RunState::Paused as u8
                } else {
                    RunState::Running as u8
                })
            })
            .unwrap_or(RunState::Idle as u8);

        if prev == RunState::Running as u8 {
            RunState::Paused
        } else {
            self.send(Request::Wake);
            RunState::Running
        }
    }

    pub fn stop(&self) {
        self.state.store(RunState::Stopped as u8, Ordering::SeqCst);
        self.send(Request::Stop);
    }

    pub fn edit(&self, edit: Edit) -> bool {
        self.send(Request::Edit(edit))
    }

    /// False once the sequencer is gone.
    pub fn send(&self, request: Request) -> bool {
        self.tx.send(request).is_ok()
    }
}

/// Result of a single [`Sequencer::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A phase ran and wants this long before the next one.
    Phase(Phase, Duration),
    /// Nothing left to execute from the current PC.
    Finished,
}

/// Why [`Sequencer::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Paused,
    Stopped,
    Finished,
    Idle,
}

#[derive(Debug)]
struct Cycle {
    number: u64,
    address: Address,
    text: String,
    next: Phase,
    decoded: Option<Instruction>,
}

pub struct Sequencer<M, S> {
    machine: Machine<M>,
    timings: PhaseTimings,
    sink: S,
    state: Arc<AtomicU8>,
    rx: Receiver<Request>,
    cycle: Option<Cycle>,
    /// Set when writeback ran off the top of the address space; nothing
    /// follows until a stop rewinds PC.
    past_end: bool,
}

impl<M: MemoryModel, S: TraceSink> Sequencer<M, S> {
    pub fn new(machine: Machine<M>, timings: PhaseTimings, sink: S) -> (Self, Controller) {
        let (tx, rx) = mpsc::channel();
        let state = Arc::new(AtomicU8::new(RunState::Idle as u8));
        let controller = Controller { state: state.clone(), tx };
        let sequencer = Self {
            machine,
            timings,
            sink,
            state,
            rx,
            cycle: None,
            past_end: false,
        };
        (sequencer, controller)
    }

    pub fn machine(&self) -> &Machine<M> {
        &self.machine
    }

    pub fn into_machine(self) -> Machine<M> {
        self.machine
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The phase the in-flight cycle will run next, if a cycle is in flight.
    pub fn pending_phase(&self) -> Option<Phase> {
        self.cycle.as_ref().map(|c| c.next)
    }

    fn notice(&mut self, message: impl Into<String>) {
        self.sink.emit(&TraceEvent::notice(message));
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::Wake => {}
            Request::Stop => {
                if let Some(cycle) = self.cycle.take() {
                    debug!("abandoning cycle #{} at {:?}", cycle.number, cycle.next);
                }
                self.machine.reset();
                self.past_end = false;
                self.notice("Execution stopped and registers reset (memory preserved).");
            }
            Request::Edit(edit) => {
                if let Some(message) = self.machine.apply(edit) {
                    self.notice(message);
                }
            }
        }
    }

    /// Apply whatever the host has queued, without blocking.
    pub fn apply_pending(&mut self) {
        while let Ok(request) = self.rx.try_recv() {
            self.handle(request);
        }
    }

    /// Block for the next host request and apply it. False once every
    /// controller has been dropped.
    pub fn wait(&mut self) -> bool {
        match self.rx.recv() {
            Ok(request) => {
                self.handle(request);
                true
            }
            Err(_) => false,
        }
    }

    fn begin_cycle(&mut self) -> Option<Cycle> {
        if self.past_end {
            return None;
        }
        let address = self.machine.memory.next_instruction_from(self.machine.pc)?;
        let text = self.machine.memory.fetch_instruction(address)?.to_string();
        self.machine.instructions_started += 1;
        Some(Cycle {
            number: self.machine.instructions_started,
            address,
            text,
            next: Phase::Fetch,
            decoded: None,
        })
    }

    /// Run exactly one phase, starting a new cycle first if none is in flight.
    /// Ignores the run state; [`Sequencer::run`] is what honours it.
    pub fn step(&mut self) -> Tick {
        let mut cycle = match self.cycle.take() {
            Some(cycle) => cycle,
            None => match self.begin_cycle() {
                Some(cycle) => cycle,
                None => return Tick::Finished,
            },
        };

        let phase = cycle.next;
        let content = match phase {
            Phase::Fetch => {
                let regs = &mut self.machine.registers;
                self.machine.pc = cycle.address;
                regs.mar = Some(cycle.address);
                regs.ir = cycle.text.clone();
                regs.mdr = cycle.text.clone();
                cycle.text.clone()
            }
            Phase::Decode => {
                let inst = decode(&cycle.text);
                let content = format!("Decoded: {}", inst);
                cycle.decoded = Some(inst);
                content
            }
            Phase::Execute => {
                let inst = cycle.decoded.take().unwrap_or_else(|| decode(&cycle.text));
                let machine = &mut self.machine;
                match execute(&inst, &mut machine.registers, &mut machine.memory) {
                    Ok(effect) => {
                        debug!("ALU: {}", effect.alu);
                        if let Some(fault) = &effect.warning {
                            warn!("[{:04}] {}: {}", cycle.address, fault, cycle.text);
                        }
                        effect.details
                    }
                    Err(fault) => {
                        warn!("[{:04}] {}: {}", cycle.address, fault, cycle.text);
                        fault.to_string()
                    }
                }
            }
            Phase::Writeback => match cycle.address.checked_add(1) {
                Some(pc) => {
                    self.machine.pc = pc;
                    format!("PC -> {:04}", pc)
                }
                None => {
                    self.past_end = true;
                    "PC -> end of memory".to_string()
                }
            },
        };

        let duration = self.timings.duration(phase);
        self.sink.emit(&TraceEvent::Phase {
            instruction: cycle.number,
            phase,
            address: cycle.address,
            content,
            duration_ms: duration.as_millis() as u64,
        });

        if let Some(next) = phase.next() {
            cycle.next = next;
            self.cycle = Some(cycle);
        }
        Tick::Phase(phase, duration)
    }

    /// Run phases while the state says so, pausing on `clock` after each.
    ///
    /// The state and queued edits are checked before every phase. A pause lets
    /// the in-flight cycle finish; a stop drops it. Running out of instructions
    /// moves the state to `Stopped` but leaves PC where it is.
    pub fn run<C: Clock + ?Sized>(&mut self, clock: &C) -> RunOutcome {
        self.apply_pending();
        if self.state() == RunState::Running {
            self.notice("Execution started.");
        }

        loop {
            self.apply_pending();
            match self.state() {
                RunState::Running => {}
                RunState::Paused if self.cycle.is_some() => {}
                RunState::Paused => {
                    self.notice("Execution paused.");
                    return RunOutcome::Paused;
                }
                RunState::Stopped => {
                    self.cycle = None;
                    return RunOutcome::Stopped;
                }
                RunState::Idle => return RunOutcome::Idle,
            }

            match self.step() {
                Tick::Phase(_, duration) => clock.sleep(duration),
                Tick::Finished => {
                    self.state.store(RunState::Stopped as u8, Ordering::SeqCst);
                    self.notice("No more instructions to execute.");
                    return RunOutcome::Finished;
                }
            }
        }
    }
}
