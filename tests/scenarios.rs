//! End-to-end scenarios (spec.md §8 "TESTABLE PROPERTIES") exercised through
//! the public API only: compile a literal program, run it, check the rows.

use qubectalk::{compile, run_protocol};

fn rows_for(source: &str) -> Vec<qubectalk::SimulationResultRow> {
    let program = compile(source).expect("program should compile");
    let results = program.run();
    for result in &results {
        assert!(result.error.is_none(), "simulation `{}` failed: {:?}", result.name, result.error);
    }
    results.into_iter().flat_map(|r| r.rows).collect()
}

#[test]
fn baseline_only() {
    let rows = rows_for(
        r#"
        default {
            define application "ac" {
                uses substance "r" {
                    equals 1 tCO2e / kg
                    set manufacture to 10 kg during all years
                }
            }
        }
        simulations {
            simulate "s" from years 2025 to 2026
        }
        "#,
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].year, 2025);
    assert_eq!(rows[0].manufacture, 10.0);
    assert_eq!(rows[0].import, 0.0);
    assert_eq!(rows[0].domestic_consumption, 10.0);
    assert_eq!(rows[1].year, 2026);
    assert_eq!(rows[1].manufacture, 10.0);
    assert_eq!(rows[1].domestic_consumption, 10.0);
}

#[test]
fn change_delta() {
    let rows = rows_for(
        r#"
        default {
            define application "ac" {
                uses substance "r" {
                    equals 1 tCO2e / kg
                    set manufacture to 10 kg during year 2025
                    change manufacture by 50 % during year 2026
                }
            }
        }
        simulations {
            simulate "s" from years 2025 to 2026
        }
        "#,
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].manufacture, 10.0);
    assert_eq!(rows[1].manufacture, 15.0);
    assert_eq!(rows[1].domestic_consumption, 15.0);
}

#[test]
fn recharge_and_retire() {
    let rows = rows_for(
        r#"
        default {
            define application "ac" {
                uses substance "r" {
                    equals 1 tCO2e / kg
                    set initial charge to 2 kg / unit for sales
                    set equipment to 100 units during year 2025
                    recharge 10 % with 2 kg / unit during all years
                    retire 5 % during all years
                }
            }
        }
        simulations {
            simulate "s" from years 2025 to 2025
        }
        "#,
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].recharge_emissions, 20.0);
    assert_eq!(rows[0].eol_emissions, 10.0);
    assert_eq!(rows[0].population, 95.0);
}

#[test]
fn recycle_displacement() {
    let rows = rows_for(
        r#"
        default {
            define application "ac" {
                uses substance "r" {
                    equals 1 tCO2e / kg
                    set manufacture to 10 kg during all years
                    recover 5 kg with 100 % reuse displacing 100 % manufacture during all years
                }
            }
        }
        simulations {
            simulate "s" from years 2025 to 2025
        }
        "#,
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].manufacture, 5.0);
    assert_eq!(rows[0].recycle, 5.0);
    assert_eq!(rows[0].recycle_consumption, 5.0);
}

#[test]
fn two_policy_overlay() {
    let source = r#"
        default {
            define application "ac" {
                uses substance "r" {
                    equals 1 tCO2e / kg
                    set manufacture to 10 kg during all years
                }
            }
        }
        policy "p1" {
            modify application "ac" {
                modify substance "r" {
                    change manufacture by -20 % during all years
                }
            }
        }
        simulations {
            simulate "with" using "p1" from years 2025 to 2025
        }
    "#;
    let rows = rows_for(source);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].manufacture, 8.0);
}

#[test]
fn stochastic_trial_with_zero_variance_is_deterministic() {
    let rows = rows_for(
        r#"
        default {
            define application "ac" {
                uses substance "r" {
                    set manufacture to sample normally from mean of 100 kg std of 0 kg during all years
                }
            }
        }
        simulations {
            simulate "s" from years 2025 to 2025 trials 5
        }
        "#,
    );
    assert_eq!(rows.len(), 5);
    for row in &rows {
        assert_eq!(row.manufacture, 100.0);
    }
}

#[test]
fn run_protocol_surfaces_the_baseline_csv() {
    let output = run_protocol(
        r#"
        default {
            define application "ac" {
                uses substance "r" {
                    equals 1 tCO2e / kg
                    set manufacture to 10 kg during all years
                }
            }
        }
        simulations {
            simulate "s" from years 2025 to 2025
        }
        "#,
    );
    assert!(output.starts_with("OK\n\n"));
    assert!(output.contains("ac,r,2025,s,1,10,kg"));
}
