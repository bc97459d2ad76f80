//! Runs a compiled [`Program`] to completion (spec.md §4.H). Each
//! `simulate` item resolves its own year range and trial count, then spawns
//! one [`Engine`] per trial — each with its own seeded RNG, never a shared
//! generator — and steps it year by year until done:
//!
//! ```text
//! while not engine.isDone():
//!     for stanzaName in simulation.stanzaNames:
//!         stanza.executable(engine)
//!     engine.incrementYear()
//! ```
//!
//! Trials within a simulation run concurrently on a scoped thread pool since
//! they share no mutable state. A trial that fails partway through still
//! contributes the rows it already snapshotted for completed years — trials
//! are independent, so one trial's failure never discards another trial's
//! rows, and a failed trial's own earlier years are not discarded either
//! (spec.md §5, §7: "earlier completed years remain in the result").
//! `run_protocol` is the textual entry point spec.md §6 describes for
//! embedding.

use std::hash::{Hash, Hasher};

use crate::compiler::{compile, CompiledSimulation, Program};
use crate::engine::Engine;
use crate::error::RuntimeError;
use crate::results::{to_csv, SimulationResultRow};

/// The outcome of one `simulate` item: every row successfully snapshotted
/// across all its trials, plus the first error encountered (if any). Rows
/// and `error` are not mutually exclusive — a trial that fails mid-run still
/// contributes the rows from its completed years.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub name: String,
    pub rows: Vec<SimulationResultRow>,
    pub error: Option<RuntimeError>,
}

fn seed_for(simulation_name: &str, trial_number: u32) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    simulation_name.hash(&mut hasher);
    trial_number.hash(&mut hasher);
    hasher.finish()
}

/// Runs one trial to completion or to its first error, returning whatever
/// rows were snapshotted for already-completed years either way.
fn run_trial(
    program: &Program,
    sim: &CompiledSimulation,
    start_year: i32,
    end_year: i32,
    trial_number: u32,
) -> (Vec<SimulationResultRow>, Option<RuntimeError>) {
    let seed = seed_for(&sim.name, trial_number);
    let mut engine = Engine::new(start_year, end_year, seed);
    let mut error = None;
    while !engine.is_done() {
        let year = engine.current_year();
        let mut failure = None;
        for stanza_name in &sim.stanza_names {
            let Some(stanza) = program.stanzas.get(stanza_name) else {
                failure = Some(crate::error::EngineError::UnknownStanza(stanza_name.clone()));
                break;
            };
            if let Err(source) = stanza.run(&mut engine) {
                failure = Some(source);
                break;
            }
        }
        if let Some(source) = failure {
            error = Some(RuntimeError {
                simulation: sim.name.clone(),
                year,
                application: engine.current_application().to_string(),
                substance: engine.current_substance().to_string(),
                source,
            });
            break;
        }
        engine.increment_year();
    }
    let rows = engine
        .take_results()
        .into_iter()
        .map(|row| SimulationResultRow::from_engine_row(row, &sim.name, trial_number))
        .collect();
    (rows, error)
}

fn run_simulation(program: &Program, sim: &CompiledSimulation) -> SimulationResult {
    let mut scratch = Engine::new(0, 0, 0);
    let (start_year, end_year, trials) = match sim.resolve(&mut scratch) {
        Ok(bounds) => bounds,
        Err(source) => {
            return SimulationResult {
                name: sim.name.clone(),
                rows: Vec::new(),
                error: Some(RuntimeError {
                    simulation: sim.name.clone(),
                    year: 0,
                    application: String::new(),
                    substance: String::new(),
                    source,
                }),
            }
        }
    };
    tracing::info!(simulation = %sim.name, start_year, end_year, trials, "starting simulation");

    let per_trial: Vec<(Vec<SimulationResultRow>, Option<RuntimeError>)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (1..=trials)
            .map(|trial_number| scope.spawn(move || run_trial(program, sim, start_year, end_year, trial_number)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("trial thread panicked"))
            .collect()
    });

    let mut rows = Vec::new();
    let mut error = None;
    for (trial_rows, trial_error) in per_trial {
        rows.extend(trial_rows);
        if error.is_none() {
            error = trial_error;
        }
    }
    SimulationResult {
        name: sim.name.clone(),
        rows,
        error,
    }
}

impl Program {
    /// Runs every `simulate` item, one [`SimulationResult`] each, in source
    /// order (spec.md §6 "external interfaces").
    pub fn run(&self) -> Vec<SimulationResult> {
        self.simulations.iter().map(|sim| run_simulation(self, sim)).collect()
    }
}

/// The textual protocol spec.md §6 describes for one-shot execution: compile
/// `source`, run it, and render either `OK` plus a CSV body or an error
/// line. All-or-nothing: if any simulation reports an error, that error is
/// surfaced and no partial CSV is emitted — callers that want partial,
/// per-trial rows should use [`Program::run`] directly.
pub fn run_protocol(source: &str) -> String {
    let program = match compile(source) {
        Ok(program) => program,
        Err(errors) => {
            let message = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            tracing::warn!(errors = %message, "compilation failed");
            return format!("Compilation Error: {}\n\n", message);
        }
    };
    let results = program.run();
    if let Some(error) = results.iter().find_map(|r| r.error.clone()) {
        tracing::error!(%error, "execution failed");
        return format!("Execution Error: {}\n\n", error);
    }
    let rows: Vec<SimulationResultRow> = results.into_iter().flat_map(|r| r.rows).collect();
    let csv = to_csv(&rows).unwrap_or_default();
    format!("OK\n\n{}", csv)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASELINE: &str = r#"
        default {
            define application "ac" {
                uses substance "hfc-134a" {
                    set manufacture to 100 kg
                    equals 1 tCO2e / kg
                }
            }
        }
        simulations {
            simulate "BAU" from years 2025 to 2026
        }
    "#;

    #[test]
    fn run_protocol_reports_ok_with_a_csv_body() {
        let output = run_protocol(BASELINE);
        assert!(output.starts_with("OK\n\n"));
        assert!(output.contains("application,substance,year"));
        assert!(output.contains("ac,hfc-134a,2025"));
        assert!(output.contains("ac,hfc-134a,2026"));
    }

    #[test]
    fn run_protocol_reports_compilation_errors() {
        let output = run_protocol("default { define application }");
        assert!(output.starts_with("Compilation Error:"));
    }

    #[test]
    fn two_trials_each_produce_their_own_rows() {
        let source = r#"
            default {
                define application "ac" {
                    uses substance "hfc-134a" {
                        set manufacture to sample uniformly from 10 kg to 20 kg
                    }
                }
            }
            simulations {
                simulate "BAU" from years 2025 to 2025 trials 2
            }
        "#;
        let program = compile(source).unwrap();
        let results = program.run();
        assert_eq!(results.len(), 1);
        assert!(results[0].error.is_none());
        let rows = &results[0].rows;
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0].trial_number, rows[1].trial_number);
    }

    #[test]
    fn a_failing_trial_still_returns_its_completed_years() {
        // The `if` branch reading `undeclaredVar` (never `define`d) is only
        // taken once manufacture has been zeroed for 2026, so 2025 completes
        // and is snapshotted before the trial fails.
        let source = r#"
            default {
                define application "ac" {
                    uses substance "r" {
                        equals 1 tCO2e / kg
                        set manufacture to 10 kg during year 2025
                        set manufacture to 0 kg during year 2026
                        set import to if get manufacture == 0 kg then undeclaredVar else 0 endif during all years
                    }
                }
            }
            simulations {
                simulate "s" from years 2025 to 2026
            }
        "#;
        let program = compile(source).unwrap();
        let results = program.run();
        assert_eq!(results.len(), 1);
        assert!(results[0].error.is_some());
        assert_eq!(results[0].rows.len(), 1);
        assert_eq!(results[0].rows[0].year, 2025);
    }
}
