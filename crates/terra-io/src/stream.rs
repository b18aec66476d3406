//! Streaming output protocol.
//!
//! The solver's progress is published as a sequence of newline-delimited
//! JSON messages, each a tagged record with kinds `log`, `step_point`,
//! `phase_result`, and `final`. The transport is the consumer's concern;
//! this module only produces the sequence. Write errors are swallowed by
//! the writer by contract (the stream is one-way and lossy and must never
//! block or fail the solver).

use serde::{Deserialize, Serialize};
use std::io::Write;
use terra_model::{PhaseResult, StepPoint};

/// One message of the output stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    /// Free-form progress text
    Log {
        /// Message text
        message: String,
    },
    /// A converged continuation step
    StepPoint {
        /// Index of the phase in execution order
        phase_index: usize,
        /// Step index within the phase
        step_index: usize,
        /// Load factor (Mstage or sum-Msf) at the step
        load_factor: f64,
        /// Maximum nodal displacement magnitude
        max_displacement: f64,
    },
    /// Full snapshot of a finished phase
    PhaseResult {
        /// Index of the phase in execution order
        phase_index: usize,
        /// The phase snapshot
        result: PhaseResult,
    },
    /// End of the run
    Final {
        /// Whether every phase succeeded
        all_successful: bool,
    },
}

impl Message {
    /// Build a step-point message
    pub fn step_point(phase_index: usize, point: &StepPoint) -> Self {
        Message::StepPoint {
            phase_index,
            step_index: point.step,
            load_factor: point.load_factor,
            max_displacement: point.max_displacement,
        }
    }
}

/// Writer emitting one JSON message per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    /// Count of messages that failed to serialize or write
    dropped: usize,
}

impl<W: Write> NdjsonWriter<W> {
    /// Wrap an output stream
    pub fn new(writer: W) -> Self {
        Self { writer, dropped: 0 }
    }

    /// Emit one message. Errors are counted, not propagated: the stream
    /// must never block or abort the solve.
    pub fn emit(&mut self, message: &Message) {
        let Ok(line) = serde_json::to_string(message) else {
            self.dropped += 1;
            return;
        };
        if writeln!(self.writer, "{line}").is_err() {
            self.dropped += 1;
        }
    }

    /// Number of messages lost to serialization or write failures
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Flush and recover the underlying writer
    pub fn into_inner(mut self) -> W {
        let _ = self.writer.flush();
        self.writer
    }
}

/// Parse a stream back into messages, skipping blank lines. Intended for
/// consumers and tests; unknown or malformed lines are errors because an
/// observer receiving garbage must treat it as a bug.
pub fn parse_stream(text: &str) -> Result<Vec<Message>, serde_json::Error> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect()
}
