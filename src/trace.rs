use log::info;
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::memory::Address;
use crate::sequencer::Phase;

/// What the interpreter reports to whoever is watching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TraceEvent {
    /// One per phase of every cycle.
    Phase {
        /// 1-based count of instructions started this session.
        instruction: u64,
        phase: Phase,
        address: Address,
        content: String,
        duration_ms: u64,
    },
    /// Run-level messages: started, paused, memory reset and so on.
    Notice { message: String },
}

impl TraceEvent {
    pub fn notice(message: impl Into<String>) -> Self {
        TraceEvent::Notice { message: message.into() }
    }
}

pub trait TraceSink {
    fn emit(&mut self, event: &TraceEvent);
}

/// Keeps every event, mostly for tests.
impl TraceSink for Vec<TraceEvent> {
    fn emit(&mut self, event: &TraceEvent) {
        self.push(event.clone());
    }
}

/// Sends events to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn emit(&mut self, event: &TraceEvent) {
        match event {
            TraceEvent::Phase {
                instruction,
                phase,
                address,
                content,
                duration_ms,
            } => {
                info!(
                    "#{:<3} {:<9} [{:04}] {} ({}ms)",
                    instruction, phase, address, content, duration_ms
                );
            }
            TraceEvent::Notice { message } => info!("{}", message),
        }
    }
}

/// One JSON object per line.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> TraceSink for JsonSink<W> {
    fn emit(&mut self, event: &TraceEvent) {
        let written = serde_json::to_writer(&mut self.out, event)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(self.out));
        if let Err(e) = written {
            log::error!("failed to write trace event: {}", e);
        }
    }
}
