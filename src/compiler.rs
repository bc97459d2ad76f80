//! Lowers a parsed [`crate::ast::ProgramAst`] into closures bound to
//! [`Engine`] (spec.md §4.G). Expression nodes become
//! `Fn(&mut Engine) -> Result<Quantity, EngineError>`; statements become
//! `Fn(&mut Engine) -> Result<(), EngineError>`. Stanzas compile to a name
//! plus one such statement closure that walks every application/substance in
//! source order; `simulations` compiles each item into a [`CompiledSimulation`]
//! whose `start`/`end`/`trials` are themselves resolved by running their
//! compiled expression closures once against a scratch engine.

use std::collections::HashMap;

use crate::ast::{self, Expr, ProgramAst, Statement, YearClause};
use crate::engine::{Displacement as EngineDisplacement, DisplacementTarget as EngineDisplacementTarget, Engine};
use crate::error::{CompileError, EngineError};
use crate::quantity::Quantity;
use crate::types::YearMatcher;
use crate::units::Unit;

type ExprFn = Box<dyn Fn(&mut Engine) -> Result<Quantity, EngineError> + Send + Sync>;
type YearClauseFn = Box<dyn Fn(&mut Engine) -> Result<YearMatcher, EngineError> + Send + Sync>;
type StatementFn = Box<dyn Fn(&mut Engine) -> Result<(), EngineError> + Send + Sync>;

/// One `default { ... }` or `policy "name" { ... }` block, compiled to a
/// single closure that re-runs every statement in every substance it names.
pub struct CompiledStanza {
    pub name: String,
    executable: StatementFn,
}

impl CompiledStanza {
    pub fn run(&self, engine: &mut Engine) -> Result<(), EngineError> {
        (self.executable)(engine)
    }
}

/// One `simulate "name" ...` item, with `start`/`end`/`trials` left as
/// closures until the driver resolves them against a scratch engine
/// (spec.md §4.G: "evaluated once at program startup").
pub struct CompiledSimulation {
    pub name: String,
    pub stanza_names: Vec<String>,
    start_year: ExprFn,
    end_year: ExprFn,
    trials: ExprFn,
}

impl CompiledSimulation {
    pub fn resolve(&self, engine: &mut Engine) -> Result<(i32, i32, u32), EngineError> {
        let start = (self.start_year)(engine)?.value.round() as i32;
        let end = (self.end_year)(engine)?.value.round() as i32;
        let trials = (self.trials)(engine)?.value.round().max(1.0) as u32;
        Ok((start, end, trials))
    }
}

/// The fully compiled program: every named stanza plus every simulation item
/// ready to run. Building one of these never touches an [`Engine`].
#[derive(Default)]
pub struct Program {
    pub stanzas: HashMap<String, CompiledStanza>,
    pub simulations: Vec<CompiledSimulation>,
}

/// Parses and compiles `source` in one step. Whitespace-only source parses to
/// an empty [`ProgramAst`], which compiles here to a [`Program`] with no
/// stanzas and no simulations and no errors.
pub fn compile(source: &str) -> Result<Program, Vec<CompileError>> {
    let ast = crate::parser::parse(source)?;
    compile_program(&ast)
}

pub fn compile_program(ast: &ProgramAst) -> Result<Program, Vec<CompileError>> {
    let mut errors = Vec::new();
    let mut stanzas = HashMap::new();

    if let Some(default) = &ast.default {
        stanzas.insert(
            "default".to_string(),
            compile_stanza("default", &default.applications, &mut errors),
        );
    }
    for policy in &ast.policies {
        stanzas.insert(
            policy.name.clone(),
            compile_stanza(&policy.name, &policy.applications, &mut errors),
        );
    }
    let simulations = match &ast.simulations {
        Some(sims) => compile_simulations(sims, &mut errors),
        None => Vec::new(),
    };

    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(Program { stanzas, simulations })
}

fn compile_stanza(name: &str, applications: &[ast::ApplicationDef], errors: &mut Vec<CompileError>) -> CompiledStanza {
    let stanza_name = name.to_string();
    let compiled_apps: Vec<(String, Vec<(String, Vec<StatementFn>)>)> = applications
        .iter()
        .map(|app| {
            let substances = app
                .substances
                .iter()
                .map(|s| (s.name.clone(), compile_substance(s, errors)))
                .collect();
            (app.name.clone(), substances)
        })
        .collect();

    let executable: StatementFn = Box::new(move |engine| {
        for (app_name, substances) in &compiled_apps {
            for (substance_name, statements) in substances {
                engine.set_scope(&stanza_name, app_name, substance_name);
                for statement in statements {
                    statement(engine)?;
                }
            }
        }
        Ok(())
    });

    CompiledStanza {
        name: name.to_string(),
        executable,
    }
}

fn compile_substance(def: &ast::SubstanceDef, errors: &mut Vec<CompileError>) -> Vec<StatementFn> {
    def.statements
        .iter()
        .filter_map(|stmt| match compile_statement(stmt) {
            Ok(f) => Some(f),
            Err(e) => {
                errors.push(e);
                None
            }
        })
        .collect()
}

fn compile_simulations(sims: &ast::Simulations, errors: &mut Vec<CompileError>) -> Vec<CompiledSimulation> {
    sims.items
        .iter()
        .filter_map(|item| match compile_simulation_item(item) {
            Ok(sim) => Some(sim),
            Err(e) => {
                errors.push(e);
                None
            }
        })
        .collect()
}

fn compile_simulation_item(item: &ast::SimulationItem) -> Result<CompiledSimulation, CompileError> {
    Ok(CompiledSimulation {
        name: item.name.clone(),
        stanza_names: item.stanzas.clone(),
        start_year: compile_expr(&item.start_year)?,
        end_year: compile_expr(&item.end_year)?,
        trials: compile_expr(&item.trials)?,
    })
}

fn parse_unit_or_error(raw: &str) -> Result<Unit, CompileError> {
    Unit::parse(raw).ok_or_else(|| CompileError::new(0, 0, format!("unknown unit `{}`", raw)))
}

// ---- statements ----

fn compile_statement(stmt: &Statement) -> Result<StatementFn, CompileError> {
    Ok(match stmt {
        Statement::DefineVar(name, expr) => {
            let name = name.clone();
            let f = compile_expr(expr)?;
            Box::new(move |engine| {
                let value = f(engine)?;
                engine.set_variable(&name, value);
                Ok(())
            })
        }
        Statement::SetStream { target, value, years } => {
            let target = *target;
            let f = compile_expr(value)?;
            let fy = compile_year_clause(years)?;
            Box::new(move |engine| {
                let matcher = fy(engine)?;
                let v = f(engine)?;
                engine.set_stream(target, v, matcher)
            })
        }
        Statement::ChangeStream { target, delta, years } => {
            let target = *target;
            let f = compile_expr(delta)?;
            let fy = compile_year_clause(years)?;
            Box::new(move |engine| {
                let matcher = fy(engine)?;
                let v = f(engine)?;
                engine.change_stream(target, v, matcher)
            })
        }
        Statement::CapStream { target, limit, years } => {
            let target = *target;
            let f = compile_expr(limit)?;
            let fy = compile_year_clause(years)?;
            Box::new(move |engine| {
                let matcher = fy(engine)?;
                let v = f(engine)?;
                engine.cap_stream(target, v, matcher)
            })
        }
        Statement::FloorStream { target, limit, years } => {
            let target = *target;
            let f = compile_expr(limit)?;
            let fy = compile_year_clause(years)?;
            Box::new(move |engine| {
                let matcher = fy(engine)?;
                let v = f(engine)?;
                engine.floor_stream(target, v, matcher)
            })
        }
        Statement::InitialCharge { stream, value, years } => {
            let stream = *stream;
            let f = compile_expr(value)?;
            let fy = compile_year_clause(years)?;
            Box::new(move |engine| {
                let matcher = fy(engine)?;
                let v = f(engine)?;
                engine.set_initial_charge(stream, v, matcher)
            })
        }
        Statement::Recharge {
            population_pct,
            volume_per_unit,
            years,
        } => {
            let fp = compile_expr(population_pct)?;
            let fv = compile_expr(volume_per_unit)?;
            let fy = compile_year_clause(years)?;
            Box::new(move |engine| {
                let matcher = fy(engine)?;
                let pct = fp(engine)?;
                let rate = fv(engine)?;
                engine.recharge(pct, rate, matcher)
            })
        }
        Statement::Retire { pct_per_year, years } => {
            let fp = compile_expr(pct_per_year)?;
            let fy = compile_year_clause(years)?;
            Box::new(move |engine| {
                let matcher = fy(engine)?;
                let pct = fp(engine)?;
                engine.retire(pct, matcher)
            })
        }
        Statement::Recycle {
            volume,
            yield_pct,
            displacement,
            years,
        } => {
            let fv = compile_expr(volume)?;
            let fyield = compile_expr(yield_pct)?;
            let fy = compile_year_clause(years)?;
            let displacement = match displacement {
                Some(d) => {
                    let fp = compile_expr(&d.percent)?;
                    let target = match d.target {
                        ast::DisplacementTarget::Manufacture => EngineDisplacementTarget::Manufacture,
                        ast::DisplacementTarget::Import => EngineDisplacementTarget::Import,
                    };
                    Some((fp, target))
                }
                None => None,
            };
            Box::new(move |engine| {
                let matcher = fy(engine)?;
                let volume_q = fv(engine)?;
                let yield_q = fyield(engine)?;
                let displacement_resolved = match &displacement {
                    Some((fp, target)) => {
                        let pct_q = fp(engine)?;
                        Some(EngineDisplacement {
                            target: *target,
                            percent: pct_q.value / 100.0,
                        })
                    }
                    None => None,
                };
                engine.recycle(volume_q, yield_q, displacement_resolved, matcher)
            })
        }
        Statement::Replace {
            volume,
            stream,
            destination_substance,
            years,
        } => {
            let stream = *stream;
            let destination = destination_substance.clone();
            let fv = compile_expr(volume)?;
            let fy = compile_year_clause(years)?;
            Box::new(move |engine| {
                let matcher = fy(engine)?;
                let v = fv(engine)?;
                engine.replace(v, stream, destination.clone(), matcher)
            })
        }
        Statement::Emit { value, years } => {
            let f = compile_expr(value)?;
            let fy = compile_year_clause(years)?;
            Box::new(move |engine| {
                let matcher = fy(engine)?;
                let v = f(engine)?;
                engine.emit(v, matcher)
            })
        }
        Statement::Equals(expr) => {
            let f = compile_expr(expr)?;
            Box::new(move |engine| {
                let v = f(engine)?;
                engine.set_ghg_intensity(v)
            })
        }
        Statement::UsesEnergy(expr) => {
            let f = compile_expr(expr)?;
            Box::new(move |engine| {
                let v = f(engine)?;
                engine.set_energy_intensity(v)
            })
        }
    })
}

fn compile_year_clause(clause: &YearClause) -> Result<YearClauseFn, CompileError> {
    Ok(match clause {
        YearClause::All => Box::new(|_engine| Ok(YearMatcher::all())),
        YearClause::OnStart => Box::new(|engine| Ok(YearMatcher::single(engine.start_year()))),
        YearClause::SingleYear(expr) => {
            let f = compile_expr(expr)?;
            Box::new(move |engine| Ok(YearMatcher::single(f(engine)?.value.round() as i32)))
        }
        YearClause::Range(lo, hi) => {
            let flo = compile_expr(lo)?;
            let fhi = compile_expr(hi)?;
            Box::new(move |engine| {
                let lo = flo(engine)?.value.round() as i32;
                let hi = fhi(engine)?.value.round() as i32;
                Ok(YearMatcher::range(lo, hi))
            })
        }
        // `max` end is implicitly the simulation's own end year: the driver
        // never steps a trial's engine past it, so leaving it open is
        // equivalent and doesn't require threading the simulation bound
        // through every statement closure.
        YearClause::WithMin(lo) => {
            let flo = compile_expr(lo)?;
            Box::new(move |engine| Ok(YearMatcher::with_min(flo(engine)?.value.round() as i32)))
        }
        YearClause::WithMax(hi) => {
            let fhi = compile_expr(hi)?;
            Box::new(move |engine| Ok(YearMatcher::with_max(fhi(engine)?.value.round() as i32)))
        }
    })
}

// ---- expressions ----

fn compile_expr(expr: &Expr) -> Result<ExprFn, CompileError> {
    Ok(match expr {
        Expr::Number(v) => {
            let v = *v;
            Box::new(move |_engine| Ok(Quantity::new(v, Unit::empty())))
        }
        Expr::String(s) => {
            return Err(CompileError::new(
                0,
                0,
                format!("string literal `{}` cannot be used as a numeric expression", s),
            ))
        }
        Expr::Identifier(name) => {
            let name = name.clone();
            Box::new(move |engine| engine.get_variable(&name))
        }
        Expr::UnitValue(inner, unit) => {
            let f = compile_expr(inner)?;
            let unit = parse_unit_or_error(unit)?;
            Box::new(move |engine| {
                let q = f(engine)?;
                Ok(Quantity::new(q.value, unit))
            })
        }
        Expr::Arith(op, a, b) => {
            let op = *op;
            let fa = compile_expr(a)?;
            let fb = compile_expr(b)?;
            Box::new(move |engine| {
                let qa = fa(engine)?;
                let qb = fb(engine)?;
                apply_arith(op, qa, qb, engine)
            })
        }
        Expr::Compare(op, a, b) => {
            let op = *op;
            let fa = compile_expr(a)?;
            let fb = compile_expr(b)?;
            Box::new(move |engine| {
                let qa = fa(engine)?;
                let qb = fb(engine)?;
                apply_compare(op, qa, qb, engine)
            })
        }
        Expr::Conditional(cond, then_branch, else_branch) => {
            let fc = compile_expr(cond)?;
            let ft = compile_expr(then_branch)?;
            let fe = else_branch.as_deref().map(compile_expr).transpose()?;
            Box::new(move |engine| {
                let c = fc(engine)?;
                if c.value != 0.0 {
                    ft(engine)
                } else {
                    match &fe {
                        Some(f) => f(engine),
                        None => Ok(Quantity::zero(Unit::empty())),
                    }
                }
            })
        }
        Expr::GetStream {
            target,
            rescope,
            conversion,
        } => {
            let target = *target;
            let rescope_app = rescope.as_ref().and_then(|r| r.application.clone());
            let rescope_subs = rescope.as_ref().and_then(|r| r.substance.clone());
            let conversion = conversion.as_deref().map(parse_unit_or_error).transpose()?;
            Box::new(move |engine| engine.get_stream(target, rescope_app.as_deref(), rescope_subs.as_deref(), conversion))
        }
        Expr::LimitMin(value, lo) => {
            let fv = compile_expr(value)?;
            let flo = compile_expr(lo)?;
            Box::new(move |engine| {
                let qv = fv(engine)?;
                let qlo = flo(engine)?;
                let qlo_c = crate::convert::convert(qlo, qv.unit, engine)?;
                Ok(Quantity::new(qv.value.max(qlo_c.value), qv.unit))
            })
        }
        Expr::LimitMax(value, hi) => {
            let fv = compile_expr(value)?;
            let fhi = compile_expr(hi)?;
            Box::new(move |engine| {
                let qv = fv(engine)?;
                let qhi = fhi(engine)?;
                let qhi_c = crate::convert::convert(qhi, qv.unit, engine)?;
                Ok(Quantity::new(qv.value.min(qhi_c.value), qv.unit))
            })
        }
        Expr::LimitBound(value, lo, hi) => {
            let fv = compile_expr(value)?;
            let flo = compile_expr(lo)?;
            let fhi = compile_expr(hi)?;
            Box::new(move |engine| {
                let qv = fv(engine)?;
                let qlo = flo(engine)?;
                let qhi = fhi(engine)?;
                let qlo_c = crate::convert::convert(qlo, qv.unit, engine)?;
                let qhi_c = crate::convert::convert(qhi, qv.unit, engine)?;
                Ok(Quantity::new(qv.value.max(qlo_c.value).min(qhi_c.value), qv.unit))
            })
        }
        Expr::SampleNormal { mean, std } => {
            let fm = compile_expr(mean)?;
            let fs = compile_expr(std)?;
            Box::new(move |engine| {
                let qm = fm(engine)?;
                let qs = fs(engine)?;
                let qs_c = crate::convert::convert(qs, qm.unit, engine)?;
                let sampled = engine.sample_normal(qm.value, qs_c.value);
                Ok(Quantity::new(sampled, qm.unit))
            })
        }
        Expr::SampleUniform { low, high } => {
            let fl = compile_expr(low)?;
            let fh = compile_expr(high)?;
            Box::new(move |engine| {
                let ql = fl(engine)?;
                let qh = fh(engine)?;
                let qh_c = crate::convert::convert(qh, ql.unit, engine)?;
                let sampled = engine.sample_uniform(ql.value, qh_c.value);
                Ok(Quantity::new(sampled, ql.unit))
            })
        }
    })
}

/// Converts the right operand into the left operand's unit, then operates on
/// the values (spec.md §4.A "Arithmetic on two Quantities"). Division keeps
/// the empty unit when both sides already match, otherwise tags the result
/// with a `lhs / rhs` ratio built from the pre-conversion units.
fn apply_arith(op: ast::ArithOp, lhs: Quantity, rhs: Quantity, engine: &Engine) -> Result<Quantity, EngineError> {
    use ast::ArithOp::*;
    match op {
        Add => {
            let rhs_c = crate::convert::convert(rhs, lhs.unit, engine)?;
            Ok(Quantity::new(lhs.value + rhs_c.value, lhs.unit))
        }
        Sub => {
            let rhs_c = crate::convert::convert(rhs, lhs.unit, engine)?;
            Ok(Quantity::new(lhs.value - rhs_c.value, lhs.unit))
        }
        Mul => {
            let rhs_c = crate::convert::convert(rhs, lhs.unit, engine)?;
            Ok(Quantity::new(lhs.value * rhs_c.value, lhs.unit))
        }
        Div => {
            if rhs.value == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            if lhs.unit == rhs.unit {
                return Ok(Quantity::new(lhs.value / rhs.value, Unit::empty()));
            }
            let rhs_c = crate::convert::convert(rhs, lhs.unit, engine)?;
            if rhs_c.value == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            let unit = Unit::ratio(lhs.unit.numerator, rhs.unit.numerator);
            Ok(Quantity::new(lhs.value / rhs_c.value, unit))
        }
        Pow => Ok(Quantity::new(lhs.value.powf(rhs.value), lhs.unit)),
    }
}

fn apply_compare(op: ast::CompareOp, lhs: Quantity, rhs: Quantity, engine: &Engine) -> Result<Quantity, EngineError> {
    use ast::CompareOp::*;
    let rhs_c = crate::convert::convert(rhs, lhs.unit, engine)?;
    let result = match op {
        Eq => lhs.value == rhs_c.value,
        Neq => lhs.value != rhs_c.value,
        Lt => lhs.value < rhs_c.value,
        Lte => lhs.value <= rhs_c.value,
        Gt => lhs.value > rhs_c.value,
        Gte => lhs.value >= rhs_c.value,
    };
    Ok(Quantity::new(if result { 1.0 } else { 0.0 }, Unit::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_compiles_to_a_program_with_no_stanzas() {
        let program = compile("   \n\t  ").unwrap();
        assert!(program.stanzas.is_empty());
        assert!(program.simulations.is_empty());
    }

    #[test]
    fn default_stanza_sets_a_stream() {
        let program = compile(
            r#"
            default {
                define application "ac" {
                    uses substance "hfc-134a" {
                        set manufacture to 10 kg
                    }
                }
            }
            "#,
        )
        .unwrap();
        let stanza = program.stanzas.get("default").unwrap();
        let mut engine = Engine::new(2025, 2025, 0);
        stanza.run(&mut engine).unwrap();
        let value = engine.raw_stream(&("ac".to_string(), "hfc-134a".to_string()), crate::types::StreamId::Manufacture);
        assert_eq!(value, 10.0);
    }

    #[test]
    fn simulation_item_resolves_its_year_range() {
        let program = compile(
            r#"
            simulations {
                simulate "BAU" from years 2025 to 2030
            }
            "#,
        )
        .unwrap();
        let sim = &program.simulations[0];
        let mut engine = Engine::new(0, 0, 0);
        let (start, end, trials) = sim.resolve(&mut engine).unwrap();
        assert_eq!((start, end, trials), (2025, 2030, 1));
    }

    #[test]
    fn arithmetic_converts_rhs_into_lhs_unit() {
        let program = compile(
            r#"
            default {
                define application "ac" {
                    uses substance "hfc-134a" {
                        set manufacture to 1 mt + 500 kg
                    }
                }
            }
            "#,
        )
        .unwrap();
        let mut engine = Engine::new(2025, 2025, 0);
        program.stanzas["default"].run(&mut engine).unwrap();
        let value = engine.raw_stream(&("ac".to_string(), "hfc-134a".to_string()), crate::types::StreamId::Manufacture);
        assert_eq!(value, 1500.0);
    }
}
