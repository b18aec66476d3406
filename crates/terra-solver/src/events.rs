//! Observer interface for solver progress.
//!
//! The driver pushes events through this trait between steps and phases.
//! The channel is one-way and lossy by contract: implementations must not
//! block the solver, and a sink that drops events only degrades external
//! progress display, never the solve. Events arrive in monotonic step
//! order within a phase and depth-first phase order across the run.

use terra_model::{PhaseResult, StepPoint};

/// Receiver of solver progress events
pub trait EventSink {
    /// Free-form progress message
    fn on_log(&mut self, _message: &str) {}

    /// A converged continuation step
    fn on_step_point(&mut self, _phase_index: usize, _point: StepPoint) {}

    /// A finished phase (converged or not)
    fn on_phase_result(&mut self, _phase_index: usize, _result: &PhaseResult) {}

    /// End of the run with cumulative status
    fn on_final(&mut self, _all_successful: bool) {}
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Sink that records events for inspection in tests
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub logs: Vec<String>,
    pub step_points: Vec<(usize, StepPoint)>,
    pub phase_results: Vec<(usize, PhaseResult)>,
    pub finals: Vec<bool>,
}

impl EventSink for RecordingSink {
    fn on_log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn on_step_point(&mut self, phase_index: usize, point: StepPoint) {
        self.step_points.push((phase_index, point));
    }

    fn on_phase_result(&mut self, phase_index: usize, result: &PhaseResult) {
        self.phase_results.push((phase_index, result.clone()));
    }

    fn on_final(&mut self, all_successful: bool) {
        self.finals.push(all_successful);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_order() {
        let mut sink = RecordingSink::default();
        sink.on_log("start");
        sink.on_step_point(
            0,
            StepPoint {
                step: 1,
                load_factor: 0.1,
                max_displacement: 0.01,
            },
        );
        sink.on_final(true);
        assert_eq!(sink.logs, vec!["start"]);
        assert_eq!(sink.step_points.len(), 1);
        assert_eq!(sink.finals, vec![true]);
    }
}
