use std::cell::{Cell, RefCell};
use std::time::Duration;

use super::{Controller, Phase, RunOutcome, RunState, Sequencer, Tick};
use crate::clock::{Clock, InstantClock};
use crate::config::Architecture;
use crate::machine::{Edit, Machine};
use crate::memory::{CellKind, MemoryModel, SplitMemory, UnifiedMemory};
use crate::registers::Register;
use crate::trace::TraceEvent;
use crate::value::Value;

type Recorded<M> = Sequencer<M, Vec<TraceEvent>>;

fn sequencer<M: MemoryModel>(memory: M, arch: Architecture) -> (Recorded<M>, Controller) {
    Sequencer::new(Machine::new(memory), arch.default_timings(), Vec::new())
}

fn contents(events: &[TraceEvent], want: Phase) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            TraceEvent::Phase { phase, content, .. } if *phase == want => Some(content.clone()),
            _ => None,
        })
        .collect()
}

fn phases(events: &[TraceEvent]) -> Vec<(u64, Phase)> {
    events
        .iter()
        .filter_map(|e| match e {
            TraceEvent::Phase { instruction, phase, .. } => Some((*instruction, *phase)),
            _ => None,
        })
        .collect()
}

fn register<M: MemoryModel>(seq: &Recorded<M>, reg: Register) -> Value {
    seq.machine().registers.get(reg).clone()
}

/// Remembers every requested delay instead of sleeping.
#[derive(Default)]
struct RecordingClock {
    slept: RefCell<Vec<Duration>>,
}

impl Clock for RecordingClock {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

/// Runs `action` against the controller during the nth sleep, the way a host
/// would react while a phase is suspended.
struct InterruptingClock<F: Fn(&Controller)> {
    controller: Controller,
    at: usize,
    count: Cell<usize>,
    action: F,
}

impl<F: Fn(&Controller)> InterruptingClock<F> {
    fn new(controller: &Controller, at: usize, action: F) -> Self {
        Self {
            controller: controller.clone(),
            at,
            count: Cell::new(0),
            action,
        }
    }
}

impl<F: Fn(&Controller)> Clock for InterruptingClock<F> {
    fn sleep(&self, _duration: Duration) {
        self.count.set(self.count.get() + 1);
        if self.count.get() == self.at {
            (self.action)(&self.controller);
        }
    }
}

const SEED_EXECUTION: [&str; 7] = [
    "Moved 5 to R1",
    "Moved 10 to R2",
    "5 + 10 = 15",
    "15 - 10 = 5",
    "5 × 15 = 75",
    "75 ÷ 5 = 15",
    "Stored R3(15) -> memory[1000]",
];

#[test]
fn test_seed_program_unified() {
    let (mut seq, ctl) = sequencer(UnifiedMemory::seeded(), Architecture::Unified);
    assert!(ctl.play());
    assert_eq!(RunOutcome::Finished, seq.run(&InstantClock));

    assert_eq!(Value::Number(5.0), register(&seq, Register::R1));
    assert_eq!(Value::Number(75.0), register(&seq, Register::R2));
    assert_eq!(Value::Number(15.0), register(&seq, Register::R3));
    assert_eq!(Some("15"), seq.machine().memory.resolve_address(1000));
    assert_eq!(SEED_EXECUTION.to_vec(), contents(seq.sink(), Phase::Execute));

    // the scan ran dry: stopped, but PC stays past the last instruction
    assert_eq!(RunState::Stopped, ctl.state());
    assert_eq!(8, seq.machine().pc);
    assert_eq!(
        Some(&TraceEvent::notice("No more instructions to execute.")),
        seq.sink().last()
    );
}

#[test]
fn test_seed_program_split() {
    let (mut seq, ctl) = sequencer(SplitMemory::seeded(), Architecture::Split);
    ctl.play();
    assert_eq!(RunOutcome::Finished, seq.run(&InstantClock));

    assert_eq!(Value::Number(5.0), register(&seq, Register::R1));
    assert_eq!(Value::Number(75.0), register(&seq, Register::R2));
    assert_eq!(Value::Number(15.0), register(&seq, Register::R3));
    assert_eq!(SEED_EXECUTION.to_vec(), contents(seq.sink(), Phase::Execute));

    let mem = &seq.machine().memory;
    assert_eq!(Some("15"), mem.resolve_address(1000));
    assert_eq!(None, mem.fetch_instruction(1000));
    assert_eq!(7, seq.machine().pc);
}

#[test]
fn test_phase_order_and_timing() {
    let timings = Architecture::Split.default_timings();
    let (mut seq, ctl) = sequencer(SplitMemory::seeded(), Architecture::Split);
    let clock = RecordingClock::default();
    ctl.play();
    seq.run(&clock);

    let seen = phases(seq.sink());
    assert_eq!(7 * 4, seen.len());
    for (i, chunk) in seen.chunks(4).enumerate() {
        let expected: Vec<(u64, Phase)> = Phase::ALL.iter().map(|p| (i as u64 + 1, *p)).collect();
        assert_eq!(expected, chunk);
    }

    let slept = clock.slept.borrow();
    assert_eq!(28, slept.len());
    for (d, phase) in slept.iter().zip(Phase::ALL.iter().cycle()) {
        assert_eq!(timings.duration(*phase), *d);
    }

    let first: Vec<&TraceEvent> = seq.sink().iter().skip(1).take(4).collect();
    assert_eq!(
        &TraceEvent::Phase {
            instruction: 1,
            phase: Phase::Fetch,
            address: 0,
            content: "MOV R1, #5".into(),
            duration_ms: 600,
        },
        first[0]
    );
    assert_eq!(
        vec!["Decoded: MOV R1, #5".to_string()],
        contents(&seq.sink()[..4], Phase::Decode)
    );
}

#[test]
fn test_fetch_registers() {
    let (mut seq, _ctl) = sequencer(UnifiedMemory::seeded(), Architecture::Unified);
    assert_eq!(Tick::Phase(Phase::Fetch, Duration::from_millis(900)), seq.step());
    let regs = &seq.machine().registers;
    assert_eq!(Some(1), regs.mar);
    assert_eq!("MOV R1, #5", regs.ir);
    assert_eq!("MOV R1, #5", regs.mdr);
    assert_eq!(Some(Phase::Decode), seq.pending_phase());

    seq.step();
    seq.step();
    assert_eq!(Value::Number(5.0), register(&seq, Register::R1));
    assert_eq!(1, seq.machine().pc);
    seq.step();
    assert_eq!(2, seq.machine().pc);
    assert_eq!(None, seq.pending_phase());
}

#[test]
fn test_sparse_memory_skips_data() {
    let mut mem = UnifiedMemory::new();
    mem.set(1, "MOV R1, #2", CellKind::Instruction);
    mem.set(3, "123", CellKind::Data);
    mem.set(5, "MUL R1, R1, 3", CellKind::Instruction);
    let (mut seq, ctl) = sequencer(mem, Architecture::Unified);
    ctl.play();
    seq.run(&InstantClock);

    // address 3 is read as data by the MUL, never fetched
    assert_eq!(Value::Number(246.0), register(&seq, Register::R1));
    let fetched: Vec<u32> = seq
        .sink()
        .iter()
        .filter_map(|e| match e {
            TraceEvent::Phase { phase: Phase::Fetch, address, .. } => Some(*address),
            _ => None,
        })
        .collect();
    assert_eq!(vec![1, 5], fetched);
    assert_eq!(6, seq.machine().pc);
}

#[test]
fn test_stop_mid_cycle() {
    let (mut seq, ctl) = sequencer(UnifiedMemory::seeded(), Architecture::Unified);
    // third sleep is the one after the first Execute
    let clock = InterruptingClock::new(&ctl, 3, |c| c.stop());
    ctl.play();
    assert_eq!(RunOutcome::Stopped, seq.run(&clock));

    assert_eq!(
        vec![(1, Phase::Fetch), (1, Phase::Decode), (1, Phase::Execute)],
        phases(seq.sink())
    );
    assert_eq!(
        Some(&TraceEvent::notice(
            "Execution stopped and registers reset (memory preserved)."
        )),
        seq.sink().last()
    );
    assert_eq!(1, seq.machine().pc);
    assert_eq!(Value::Number(0.0), register(&seq, Register::R1));
    assert!(seq.machine().registers.ir.is_empty());
    assert_eq!(None, seq.pending_phase());
    assert_eq!(Some("25"), seq.machine().memory.resolve_address(1000));
    assert_eq!(RunState::Stopped, seq.state());
}

#[test]
fn test_stop_keeps_stored_data() {
    let (mut seq, ctl) = sequencer(SplitMemory::seeded(), Architecture::Split);
    // sleeps 25..28 belong to the STORE; stop right after its Execute
    let clock = InterruptingClock::new(&ctl, 27, |c| c.stop());
    ctl.play();
    assert_eq!(RunOutcome::Stopped, seq.run(&clock));
    assert_eq!(Some("15"), seq.machine().memory.resolve_address(1000));
    assert_eq!(0, seq.machine().pc);
    assert_eq!(Value::Number(0.0), register(&seq, Register::R3));
}

#[test]
fn test_pause_finishes_cycle() {
    let (mut seq, ctl) = sequencer(UnifiedMemory::seeded(), Architecture::Unified);
    let clock = InterruptingClock::new(&ctl, 2, |c| {
        c.pause();
    });
    ctl.play();
    assert_eq!(RunOutcome::Paused, seq.run(&clock));

    assert_eq!(
        vec![
            (1, Phase::Fetch),
            (1, Phase::Decode),
            (1, Phase::Execute),
            (1, Phase::Writeback)
        ],
        phases(seq.sink())
    );
    assert_eq!(2, seq.machine().pc);
    assert_eq!(Value::Number(5.0), register(&seq, Register::R1));
    assert_eq!(Some(&TraceEvent::notice("Execution paused.")), seq.sink().last());

    // resume picks up where it left off
    assert!(ctl.play());
    assert_eq!(RunOutcome::Finished, seq.run(&clock));
    assert_eq!(Value::Number(15.0), register(&seq, Register::R3));
    assert_eq!(SEED_EXECUTION.to_vec(), contents(seq.sink(), Phase::Execute));
}

#[test]
fn test_edit_during_cycle_does_not_touch_fetched_text() {
    let (mut seq, ctl) = sequencer(UnifiedMemory::seeded(), Architecture::Unified);
    let clock = InterruptingClock::new(&ctl, 1, |c| {
        c.edit(Edit::SetCell { addr: 1, text: "MOV R1, #99".into(), kind: None });
        c.edit(Edit::SetCell { addr: 1000, text: "0".into(), kind: None });
    });
    ctl.play();
    seq.run(&clock);

    let executed = contents(seq.sink(), Phase::Execute);
    assert_eq!("Moved 5 to R1", executed[0]);
    assert_eq!(Some("MOV R1, #99"), seq.machine().memory.fetch_instruction(1));
    assert_eq!(Some("15"), seq.machine().memory.resolve_address(1000));
}

#[test]
fn test_edit_applies_before_execute() {
    let mut mem = SplitMemory::new();
    mem.set(0, "LOAD R1, 1000", CellKind::Instruction);
    mem.set(1000, "1", CellKind::Data);
    let (mut seq, ctl) = sequencer(mem, Architecture::Split);
    // change the data while the decode phase is suspended
    let clock = InterruptingClock::new(&ctl, 2, |c| {
        c.edit(Edit::SetCell { addr: 1000, text: "2".into(), kind: Some(CellKind::Data) });
    });
    ctl.play();
    seq.run(&clock);
    assert_eq!(Value::Number(2.0), register(&seq, Register::R1));
}

#[test]
fn test_faults_do_not_halt() {
    let mut mem = UnifiedMemory::new();
    mem.load_program(
        "FOO R1\nMOV R9, #1\nLOAD R1, 2000\nSTORE #1, 1000\nADD R1, #1\nDIV R3, #1, #0\nMOV R2, #3",
    );
    let (mut seq, ctl) = sequencer(mem, Architecture::Unified);
    ctl.play();
    assert_eq!(RunOutcome::Finished, seq.run(&InstantClock));

    assert_eq!(
        vec![
            "Unknown instruction: FOO R1",
            "Invalid destination R9",
            "LOAD failed: address 2000 not found",
            "STORE failed: invalid source #1 or address 1000",
            "Missing operand",
            "1 ÷ 0 = NaN",
            "Moved 3 to R2",
        ],
        contents(seq.sink(), Phase::Execute)
    );
    assert_eq!(Value::Number(0.0), register(&seq, Register::R1));
    assert!(register(&seq, Register::R3).is_nan());
    assert_eq!(Value::Number(3.0), register(&seq, Register::R2));
    assert_eq!(None, seq.machine().memory.resolve_address(1000));
}

#[test]
fn test_split_spaces_do_not_leak() {
    let mut mem = SplitMemory::new();
    mem.load_program("LOAD R1, 2\nADD R2, 2, #1\nSTORE R2, 1");
    mem.set(2, "500", CellKind::Data);
    let (mut seq, ctl) = sequencer(mem, Architecture::Split);
    ctl.play();
    seq.run(&InstantClock);

    assert_eq!(Value::Number(500.0), register(&seq, Register::R1));
    assert_eq!(Value::Number(501.0), register(&seq, Register::R2));
    let mem = &seq.machine().memory;
    assert_eq!(Some("501"), mem.resolve_address(1));
    assert_eq!(Some("ADD R2, 2, #1"), mem.fetch_instruction(1));
    assert_eq!(Some("STORE R2, 1"), mem.fetch_instruction(2));
}

#[test]
fn test_restart_after_stop() {
    let (mut seq, ctl) = sequencer(UnifiedMemory::seeded(), Architecture::Unified);
    ctl.play();
    assert_eq!(RunOutcome::Finished, seq.run(&InstantClock));

    // playing again from the end finds nothing
    ctl.play();
    assert_eq!(RunOutcome::Finished, seq.run(&InstantClock));
    assert_eq!(7, seq.machine().instructions_started);

    ctl.stop();
    assert!(seq.wait());
    assert_eq!(1, seq.machine().pc);

    ctl.play();
    assert_eq!(RunOutcome::Finished, seq.run(&InstantClock));
    assert_eq!(14, seq.machine().instructions_started);
    assert_eq!(Value::Number(15.0), register(&seq, Register::R3));
}

#[test]
fn test_last_address_ends_the_run() {
    let mut mem = UnifiedMemory::new();
    mem.set(u32::MAX, "MOV R1, #1", CellKind::Instruction);
    let (mut seq, ctl) = sequencer(mem, Architecture::Unified);
    ctl.play();
    assert_eq!(RunOutcome::Finished, seq.run(&InstantClock));
    assert_eq!(RunState::Stopped, seq.state());
    assert_eq!(1, seq.machine().instructions_started);
    assert_eq!(
        vec!["PC -> end of memory".to_string()],
        contents(seq.sink(), Phase::Writeback)
    );
    assert_eq!(Tick::Finished, seq.step());

    // a stop rewinds PC and the instruction can run again
    ctl.stop();
    assert!(seq.wait());
    ctl.play();
    assert_eq!(RunOutcome::Finished, seq.run(&InstantClock));
    assert_eq!(2, seq.machine().instructions_started);
}

#[test]
fn test_controller_transitions() {
    let (mut seq, ctl) = sequencer(UnifiedMemory::seeded(), Architecture::Unified);
    assert_eq!(RunState::Idle, ctl.state());
    assert_eq!(RunOutcome::Idle, seq.run(&InstantClock));

    assert!(!ctl.pause());
    assert_eq!(RunState::Running, ctl.toggle());
    assert!(!ctl.play());
    assert_eq!(RunState::Paused, ctl.toggle());
    assert!(!ctl.pause());
    assert_eq!(RunState::Paused, seq.state());
    assert_eq!(RunOutcome::Paused, seq.run(&InstantClock));
    assert!(seq.machine().registers.ir.is_empty());

    ctl.stop();
    assert_eq!(RunState::Stopped, ctl.state());
    assert!(ctl.play());
}

#[test]
fn test_wait_ends_without_controllers() {
    let (mut seq, ctl) = sequencer(UnifiedMemory::seeded(), Architecture::Unified);
    ctl.edit(Edit::SetData("5".into()));
    drop(ctl);
    assert!(seq.wait());
    assert_eq!(Some("5"), seq.machine().memory.resolve_address(1004));
    assert!(!seq.wait());
}
