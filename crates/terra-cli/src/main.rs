//! Command-line driver for the terra engine.
//!
//! Loads a project file, runs the phase tree, and streams NDJSON progress
//! messages to stdout. Exit codes: 0 when every phase succeeded, 1 when
//! some phase failed but the run completed, 2 on a fatal error.

use std::io::{Stdout, Write};
use std::path::Path;
use std::process::ExitCode;

use chrono::Local;
use terra_io::{Message, NdjsonWriter, Project};
use terra_model::{PhaseResult, StepPoint};
use terra_solver::{CancelToken, EventSink, PhaseDriver};

fn usage() {
    eprintln!("usage:");
    eprintln!("  terra solve <project.json>");
    eprintln!("  terra validate <project.json>");
    eprintln!("  terra --help");
    eprintln!("  terra --version");
    eprintln!();
    eprintln!("examples:");
    eprintln!("  terra solve slope.json > results.ndjson");
    eprintln!("  terra validate slope.json");
}

/// Event sink forwarding solver progress to stdout as NDJSON
struct StdoutSink {
    writer: NdjsonWriter<Stdout>,
}

impl StdoutSink {
    fn new() -> Self {
        Self {
            writer: NdjsonWriter::new(std::io::stdout()),
        }
    }
}

impl EventSink for StdoutSink {
    fn on_log(&mut self, message: &str) {
        self.writer.emit(&Message::Log {
            message: message.to_string(),
        });
    }

    fn on_step_point(&mut self, phase_index: usize, point: StepPoint) {
        self.writer.emit(&Message::step_point(phase_index, &point));
    }

    fn on_phase_result(&mut self, phase_index: usize, result: &PhaseResult) {
        self.writer.emit(&Message::PhaseResult {
            phase_index,
            result: result.clone(),
        });
    }

    fn on_final(&mut self, all_successful: bool) {
        self.writer.emit(&Message::Final { all_successful });
        let _ = std::io::stdout().flush();
    }
}

fn log_line(message: &str) {
    eprintln!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
}

fn cmd_validate(path: &Path) -> ExitCode {
    match Project::load(path) {
        Ok(project) => {
            let stats = project.mesh.statistics();
            log_line(&format!(
                "project '{}' valid: {} nodes, {} elements, {} phases, {} materials",
                project.name,
                stats.num_nodes,
                stats.num_elements,
                project.phases.len(),
                project.materials.len(),
            ));
            ExitCode::from(0)
        }
        Err(e) => {
            log_line(&format!("validation failed: {e}"));
            ExitCode::from(2)
        }
    }
}

fn cmd_solve(path: &Path) -> ExitCode {
    let project = match Project::load(path) {
        Ok(p) => p,
        Err(e) => {
            log_line(&format!("failed to load project: {e}"));
            return ExitCode::from(2);
        }
    };

    let driver = match PhaseDriver::new(
        &project.mesh,
        &project.materials,
        &project.loads,
        &project.water_levels,
        &project.phases,
        project.settings,
    ) {
        Ok(d) => d,
        Err(e) => {
            log_line(&format!("fatal: {e}"));
            return ExitCode::from(2);
        }
    };

    let mut sink = StdoutSink::new();
    let cancel = CancelToken::new();
    match driver.run(&mut sink, &cancel) {
        Ok(outcome) => {
            if outcome.all_successful {
                log_line("all phases converged");
                ExitCode::from(0)
            } else {
                let failed = outcome.results.iter().filter(|r| !r.success).count();
                log_line(&format!("{failed} phase(s) failed; run completed"));
                ExitCode::from(1)
            }
        }
        Err(e) => {
            log_line(&format!("fatal: {e}"));
            ExitCode::from(2)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("solve") => match args.get(2) {
            Some(path) => cmd_solve(Path::new(path)),
            None => {
                usage();
                ExitCode::from(2)
            }
        },
        Some("validate") => match args.get(2) {
            Some(path) => cmd_validate(Path::new(path)),
            None => {
                usage();
                ExitCode::from(2)
            }
        },
        Some("--version") => {
            println!("terra {}", env!("CARGO_PKG_VERSION"));
            ExitCode::from(0)
        }
        Some("--help") | None => {
            usage();
            ExitCode::from(if args.len() > 1 { 0 } else { 2 })
        }
        Some(other) => {
            eprintln!("unknown command: {other}");
            usage();
            ExitCode::from(2)
        }
    }
}
