//! Per-trial stream/state core (spec.md §4.F). One `Engine` is created per
//! simulation trial and discarded at its end; no state crosses trials.

mod streams;
mod variables;

use std::collections::{BTreeSet, HashMap};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::error::EngineError;
use crate::quantity::Quantity;
use crate::state::StateGetter;
use crate::types::{ScopeKind, StreamId};

pub use streams::{Displacement, DisplacementTarget};

pub(crate) type ScopeId = (String, String);

pub struct Engine {
    current_year: i32,
    start_year: i32,
    end_year: i32,
    current_stanza: String,
    current_app: String,
    current_substance: String,

    scopes: BTreeSet<ScopeId>,
    streams: HashMap<(ScopeId, StreamId), f64>,
    retired_this_year: HashMap<ScopeId, f64>,

    initial_charge_kg: HashMap<(ScopeId, StreamId), f64>,
    ghg_intensity_per_kg: HashMap<ScopeId, f64>,
    energy_intensity_per_kg: HashMap<ScopeId, f64>,

    variables: HashMap<(ScopeKind, String), HashMap<String, Quantity>>,

    rng: StdRng,

    pub(crate) results: Vec<crate::results::EngineResultRow>,
}

impl Engine {
    /// One `Engine`, with its own seeded RNG, is built per trial
    /// (spec.md §4.H) — no generator is ever shared across trials.
    pub fn new(start_year: i32, end_year: i32, seed: u64) -> Engine {
        Engine {
            current_year: start_year,
            start_year,
            end_year,
            current_stanza: String::new(),
            current_app: String::new(),
            current_substance: String::new(),
            scopes: BTreeSet::new(),
            streams: HashMap::new(),
            retired_this_year: HashMap::new(),
            initial_charge_kg: HashMap::new(),
            ghg_intensity_per_kg: HashMap::new(),
            energy_intensity_per_kg: HashMap::new(),
            variables: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
            results: Vec::new(),
        }
    }

    pub(crate) fn sample_normal(&mut self, mean: f64, std: f64) -> f64 {
        match Normal::new(mean, std.abs()) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => mean,
        }
    }

    pub(crate) fn sample_uniform(&mut self, low: f64, high: f64) -> f64 {
        let (lo, hi) = if low <= high { (low, high) } else { (high, low) };
        if lo == hi {
            return lo;
        }
        Uniform::new(lo, hi).sample(&mut self.rng)
    }

    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    pub fn start_year(&self) -> i32 {
        self.start_year
    }

    pub fn end_year(&self) -> i32 {
        self.end_year
    }

    pub fn current_application(&self) -> &str {
        &self.current_app
    }

    pub fn current_substance(&self) -> &str {
        &self.current_substance
    }

    fn scope_id(&self) -> ScopeId {
        (self.current_app.clone(), self.current_substance.clone())
    }

    fn register_scope(&mut self, scope: ScopeId) {
        self.scopes.insert(scope);
    }

    /// Binds the current `(stanza, application, substance)` triple for the
    /// duration of the caller's statements; the compiler invokes this once
    /// per `substance { ... }` block before running its statement closures.
    pub fn set_scope(&mut self, stanza: &str, application: &str, substance: &str) {
        self.current_stanza = stanza.to_string();
        self.current_app = application.to_string();
        self.current_substance = substance.to_string();
        self.register_scope(self.scope_id());
    }

    /// Runs `f` with the current scope temporarily switched to
    /// `(application, substance)`, restoring the prior scope on every exit
    /// path including `f` returning an error (spec.md §9 "Rescoping").
    pub fn with_rescope<T>(
        &mut self,
        application: Option<&str>,
        substance: Option<&str>,
        f: impl FnOnce(&mut Engine) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let prior_app = self.current_app.clone();
        let prior_substance = self.current_substance.clone();
        if let Some(app) = application {
            self.current_app = app.to_string();
        }
        if let Some(subs) = substance {
            self.current_substance = subs.to_string();
        }
        self.register_scope(self.scope_id());
        let result = f(self);
        self.current_app = prior_app;
        self.current_substance = prior_substance;
        result
    }

    pub fn is_done(&self) -> bool {
        self.current_year > self.end_year
    }

    /// Advances to the next year (spec.md §4.F "Year transition").
    pub fn increment_year(&mut self) {
        self.snapshot_year();
        for scope in self.scopes.clone() {
            let prior = *self.streams.get(&(scope.clone(), StreamId::Equipment)).unwrap_or(&0.0);
            self.streams.insert((scope.clone(), StreamId::PriorEquipment), prior);
            for stream in [
                StreamId::NewEquipment,
                StreamId::RechargeEmissions,
                StreamId::EolEmissions,
                StreamId::Consumption,
                StreamId::Energy,
            ] {
                self.streams.insert((scope.clone(), stream), 0.0);
            }
            self.retired_this_year.insert(scope, 0.0);
        }
        self.current_year += 1;
    }

    fn snapshot_year(&mut self) {
        for scope in self.scopes.clone() {
            let row = crate::results::build_row(self, &scope.0, &scope.1, self.current_year);
            self.results.push(row);
        }
    }

    pub fn take_results(&mut self) -> Vec<crate::results::EngineResultRow> {
        std::mem::take(&mut self.results)
    }

    // ---- raw stream access, shared by streams.rs and results.rs ----

    pub(crate) fn raw_stream(&self, scope: &ScopeId, stream: StreamId) -> f64 {
        *self.streams.get(&(scope.clone(), stream)).unwrap_or(&0.0)
    }

    fn set_raw_stream(&mut self, scope: &ScopeId, stream: StreamId, value: f64) {
        self.streams.insert((scope.clone(), stream), value);
    }

    pub(crate) fn ghg_intensity_for(&self, scope: &ScopeId) -> f64 {
        *self.ghg_intensity_per_kg.get(scope).unwrap_or(&0.0)
    }

    pub(crate) fn energy_intensity_for(&self, scope: &ScopeId) -> f64 {
        *self.energy_intensity_per_kg.get(scope).unwrap_or(&0.0)
    }

    /// `set initial charge to ... for <stream>` keys by stream, but every
    /// literal program declares it `for sales`; volume/population
    /// conversions always read that entry.
    pub(crate) fn initial_charge_for(&self, scope: &ScopeId) -> f64 {
        *self
            .initial_charge_kg
            .get(&(scope.clone(), StreamId::Sales))
            .unwrap_or(&0.0)
    }

    pub(crate) fn set_initial_charge_raw(&mut self, scope: &ScopeId, stream: StreamId, kg_per_unit: f64) {
        self.initial_charge_kg.insert((scope.clone(), stream), kg_per_unit);
    }
}

/// The converter (`crate::convert`) reads the *current* scope's totals
/// through this, so rescoping or overriding naturally feeds conversion math.
impl StateGetter for Engine {
    fn get_volume(&self) -> f64 {
        let scope = self.scope_id();
        self.raw_stream(&scope, StreamId::Manufacture) + self.raw_stream(&scope, StreamId::Import)
    }

    fn get_population(&self) -> f64 {
        let scope = self.scope_id();
        self.raw_stream(&scope, StreamId::Equipment)
    }

    fn get_ghg_consumption(&self) -> f64 {
        let scope = self.scope_id();
        self.raw_stream(&scope, StreamId::Consumption)
    }

    fn get_energy_consumption(&self) -> f64 {
        let scope = self.scope_id();
        self.raw_stream(&scope, StreamId::Energy)
    }

    fn get_substance_consumption(&self) -> f64 {
        let scope = self.scope_id();
        self.ghg_intensity_for(&scope)
    }

    fn get_energy_intensity(&self) -> f64 {
        let scope = self.scope_id();
        self.energy_intensity_for(&scope)
    }

    fn get_amortized_unit_volume(&self) -> f64 {
        let scope = self.scope_id();
        self.initial_charge_for(&scope)
    }

    fn get_amortized_unit_consumption(&self) -> f64 {
        let population = self.get_population();
        if population == 0.0 {
            return 0.0;
        }
        self.get_ghg_consumption() / population
    }

    fn get_years_elapsed(&self) -> f64 {
        1.0
    }

    fn get_population_change(&self) -> f64 {
        let scope = self.scope_id();
        let new_equipment = self.raw_stream(&scope, StreamId::NewEquipment);
        let retired = *self.retired_this_year.get(&scope).unwrap_or(&0.0);
        new_equipment - retired
    }
}

/// Converts `value` into `stream`'s base unit under the current scope.
pub(crate) fn to_base_unit(engine: &Engine, value: Quantity, stream: StreamId) -> Result<f64, EngineError> {
    crate::convert::convert(value, stream.base_unit(), engine).map(|q| q.value)
}
