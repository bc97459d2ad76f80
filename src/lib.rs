//! QubecTalk: a small domain-specific language for modeling the production,
//! consumption, recovery, and retirement of controlled substances (e.g.
//! HFC refrigerants) across applications and policy scenarios, with
//! Monte Carlo trials over stochastic inputs.
//!
//! Source text flows through four stages:
//! [`lexer`] -> [`parser`] (producing an [`ast::ProgramAst`]) -> [`compiler`]
//! (lowering to closures bound to [`engine::Engine`]) -> [`driver`] (stepping
//! each trial year by year and collecting [`results::SimulationResultRow`]s).
//! [`state`] and [`convert`] carry the unit-conversion logic both the engine
//! and the result serializer read through.

pub mod ast;
pub mod compiler;
pub mod convert;
pub mod driver;
pub mod engine;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod quantity;
pub mod results;
pub mod state;
pub mod types;
pub mod units;

pub use compiler::{compile, CompiledSimulation, CompiledStanza, Program};
pub use driver::{run_protocol, SimulationResult};
pub use error::{CompileError, EngineError, RuntimeError};
pub use results::SimulationResultRow;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_is_a_null_program() {
        let program = compile("").unwrap();
        assert!(program.stanzas.is_empty());
        assert!(program.simulations.is_empty());
    }

    #[test]
    fn public_api_runs_a_minimal_program_end_to_end() {
        let source = r#"
            default {
                define application "ac" {
                    uses substance "hfc-134a" {
                        set manufacture to 10 kg
                    }
                }
            }
            simulations {
                simulate "BAU" from years 2025 to 2025
            }
        "#;
        let program = compile(source).unwrap();
        let results = program.run();
        assert_eq!(results.len(), 1);
        assert!(results[0].error.is_none());
        assert_eq!(results[0].rows.len(), 1);
        assert_eq!(results[0].rows[0].manufacture, 10.0);
    }
}
