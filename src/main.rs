/*!
 * Run the toy CPU from the command line: seed memory, play the program
 * through its fetch/decode/execute/writeback phases and print where it ended
 * up. With --interactive, stdin drives the play/pause/stop controls while the
 * program runs.
 *
 * License: MIT
 */

use clap::Parser;
use env_logger::Env;
use log::{debug, info};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;

use cycle_sim::clock::SPEEDS;
use cycle_sim::{
    Architecture, CellKind, Clock, Controller, Edit, Error, InstantClock, JsonSink, LoadPolicy,
    LogSink, Machine, MachineConfig, MemoryModel, Register, Result, Sequencer, Snapshot,
    SplitMemory, SystemClock, TraceSink, UnifiedMemory, Value,
};

#[derive(Parser, Debug)]
#[command(version, about = "Step a toy CPU through its instruction cycle")]
struct Args {
    /// Memory layout; defaults to the config file's, then unified
    #[arg(long, value_enum)]
    arch: Option<Architecture>,

    /// JSON machine config (architecture, timings, load_policy)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    load_policy: Option<LoadPolicy>,

    /// Newline-delimited instructions to load
    #[arg(long)]
    program: Option<PathBuf>,

    /// Value to place at the next free data address; repeatable
    #[arg(long)]
    data: Vec<String>,

    /// Start with empty memory instead of the seed program and data
    #[arg(long)]
    empty: bool,

    /// Skip the phase delays
    #[arg(long)]
    instant: bool,

    /// Phase delay divisor, 2.0 runs twice as fast
    #[arg(long, default_value_t = 1.0, value_parser = parse_speed)]
    speed: f64,

    /// Write trace events to stdout as JSON lines instead of logging them
    #[arg(long)]
    json_trace: bool,

    /// Restore a snapshot written by --export
    #[arg(long)]
    state: Option<PathBuf>,

    /// Save the final machine state as JSON
    #[arg(long)]
    export: Option<PathBuf>,

    /// Read control commands from stdin while running
    #[arg(long)]
    interactive: bool,
}

fn parse_speed(s: &str) -> std::result::Result<f64, String> {
    let speed: f64 = s.parse().map_err(|e| format!("{}", e))?;
    if SPEEDS.contains(&speed) {
        Ok(speed)
    } else {
        Err(format!("must be within {}..={}", SPEEDS.start(), SPEEDS.end()))
    }
}

const HELP: &str = "commands: p (play/pause), play, pause, stop, load LINE[;LINE..], \
                    data VALUE, set ADDR TEXT, del ADDR, reg R VALUE, reset, quit";

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "> {}", record.args()))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MachineConfig::from_file(path)?,
        None => MachineConfig::default(),
    };
    if let Some(arch) = args.arch {
        config.architecture = arch;
    }
    if let Some(policy) = args.load_policy {
        config.load_policy = Some(policy);
    }

    let snapshot = match &args.state {
        Some(path) => Some(Snapshot::load(path)?),
        None => None,
    };
    if let Some(snapshot) = &snapshot {
        if args.arch.is_some_and(|arch| arch != snapshot.architecture()) {
            return Err(Error::Config(format!(
                "snapshot is {:?}, not {:?}",
                snapshot.architecture(),
                config.architecture
            )));
        }
        config.architecture = snapshot.architecture();
    }

    match snapshot {
        Some(Snapshot::Unified(machine)) => launch(machine, &config, &args),
        Some(Snapshot::Split(machine)) => launch(machine, &config, &args),
        None => match config.architecture {
            Architecture::Unified => launch(fresh(UnifiedMemory::new(), &args), &config, &args),
            Architecture::Split => launch(fresh(SplitMemory::new(), &args), &config, &args),
        },
    }
}

fn fresh<M: MemoryModel>(mut memory: M, args: &Args) -> Machine<M> {
    if !args.empty {
        memory.reset_defaults();
    }
    Machine::new(memory)
}

fn launch<M>(mut machine: Machine<M>, config: &MachineConfig, args: &Args) -> Result<()>
where
    M: MemoryModel,
    Snapshot: From<Machine<M>>,
{
    // a restored snapshot keeps its own policy unless one is asked for
    if config.load_policy.is_some() || args.state.is_none() {
        machine.memory.set_load_policy(config.load_policy());
    }

    if let Some(path) = &args.program {
        let text = fs::read_to_string(path)?;
        if let Some(message) = machine.apply(Edit::LoadProgram(text)) {
            info!("{}", message);
        }
    }
    for value in &args.data {
        if let Some(message) = machine.apply(Edit::SetData(value.clone())) {
            info!("{}", message);
        }
    }

    let machine = if args.json_trace {
        drive(machine, config, args, JsonSink::new(io::stdout()))?
    } else {
        drive(machine, config, args, LogSink)?
    };

    if !args.json_trace {
        dump_state(&machine);
    }

    if let Some(path) = &args.export {
        Snapshot::from(machine).save(path)?;
        info!("state saved to {}", path.display());
    }
    Ok(())
}

fn drive<M: MemoryModel, S: TraceSink>(
    machine: Machine<M>,
    config: &MachineConfig,
    args: &Args,
    sink: S,
) -> Result<Machine<M>> {
    let clock: Box<dyn Clock> = if args.instant {
        Box::new(InstantClock)
    } else {
        Box::new(SystemClock::with_speed(args.speed)?)
    };

    let (mut sequencer, controller) = Sequencer::new(machine, config.timings(), sink);

    if args.interactive {
        eprintln!("{}", HELP);
        let input = controller.clone();
        thread::spawn(move || read_commands(input));
    }

    controller.play();
    // only the stdin thread may keep the session alive from here on
    drop(controller);

    loop {
        let outcome = sequencer.run(clock.as_ref());
        debug!("run ended: {:?}", outcome);
        if !args.interactive || !sequencer.wait() {
            break;
        }
    }

    Ok(sequencer.into_machine())
}

fn read_commands(ctl: Controller) {
    for line in io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let sent = match cmd {
            "" => true,
            "p" | "toggle" => {
                ctl.toggle();
                true
            }
            "play" => {
                ctl.play();
                true
            }
            "pause" => {
                ctl.pause();
                true
            }
            "stop" => {
                ctl.stop();
                true
            }
            "load" => ctl.edit(Edit::LoadProgram(rest.replace(';', "\n"))),
            "data" => ctl.edit(Edit::SetData(rest.to_string())),
            "set" => match rest.split_once(char::is_whitespace) {
                Some((addr, text)) => match addr.parse() {
                    Ok(addr) => ctl.edit(Edit::SetCell {
                        addr,
                        text: text.to_string(),
                        kind: None,
                    }),
                    Err(_) => {
                        eprintln!("bad address: {}", addr);
                        true
                    }
                },
                None => {
                    eprintln!("usage: set ADDR TEXT");
                    true
                }
            },
            "del" => match rest.parse() {
                Ok(addr) => ctl.edit(Edit::DeleteCell { addr, space: None }),
                Err(_) => {
                    eprintln!("bad address: {}", rest);
                    true
                }
            },
            "reg" => match rest.split_once(char::is_whitespace) {
                Some((reg, value)) => match Register::parse(reg) {
                    Some(reg) => ctl.edit(Edit::SetRegister(reg, Value::parse(value.trim()))),
                    None => {
                        eprintln!("not a register: {}", reg);
                        true
                    }
                },
                None => {
                    eprintln!("usage: reg R VALUE");
                    true
                }
            },
            "reset" => ctl.edit(Edit::ResetMemory),
            "quit" | "q" => {
                ctl.stop();
                break;
            }
            "help" | "?" => {
                eprintln!("{}", HELP);
                true
            }
            other => {
                eprintln!("unknown command: {}", other);
                true
            }
        };

        if !sent {
            break;
        }
    }
}

fn dump_state<M: MemoryModel>(machine: &Machine<M>) {
    let regs = &machine.registers;
    println!("PC  = {:04}", machine.pc);
    for reg in Register::ALL {
        println!("{}  = {}", reg, regs.get(reg));
    }
    println!("ACC = {}", regs.acc.as_ref().map(Value::to_string).unwrap_or_default());
    println!("IR  = {}", regs.ir);

    for space in [CellKind::Instruction, CellKind::Data] {
        for (addr, cell) in machine.memory.cells(space).filter(|(_, c)| c.kind == space) {
            println!("[{:04}] {:<11} {}", addr, format!("{:?}", cell.kind), cell.text);
        }
    }
    println!("{} instruction(s) executed", machine.instructions_started);
}
