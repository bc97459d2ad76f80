//! Stream-mutating operators (spec.md §4.F): `set`, `change`, `cap`,
//! `floor`, `setInitialCharge`, `recharge`, `retire`, `recycle`, `replace`,
//! `emit`, and `getStream`.

use super::Engine;
use crate::error::EngineError;
use crate::quantity::Quantity;
use crate::types::{StreamId, YearMatcher};
use crate::units::{Unit, UnitAtom};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplacementTarget {
    Manufacture,
    Import,
}

#[derive(Debug, Clone, Copy)]
pub struct Displacement {
    pub target: DisplacementTarget,
    pub percent: f64,
}

/// Extracts a plain fraction from a `%` quantity (e.g. `10 %` -> `0.1`).
fn percent_fraction(quantity: Quantity) -> Result<f64, EngineError> {
    if quantity.unit.denominator.is_some() || quantity.unit.numerator != UnitAtom::Percent {
        return Err(EngineError::UnitMismatch {
            from: quantity.unit.to_string(),
            to: "%".to_string(),
        });
    }
    Ok(quantity.value / 100.0)
}

/// A literal rate like `2 kg / unit`, canonicalized to kg-per-unit without
/// touching engine state: these are declared coefficients, not stocks that
/// need the state-aware converter.
fn kg_per_unit(quantity: Quantity) -> Result<f64, EngineError> {
    match (quantity.unit.numerator, quantity.unit.denominator) {
        (UnitAtom::Kg, Some(UnitAtom::Unit)) | (UnitAtom::Kg, Some(UnitAtom::Units)) => {
            Ok(quantity.value)
        }
        (UnitAtom::Mt, Some(UnitAtom::Unit)) | (UnitAtom::Mt, Some(UnitAtom::Units)) => {
            Ok(quantity.value * 1000.0)
        }
        _ => Err(EngineError::UnitMismatch {
            from: quantity.unit.to_string(),
            to: "kg / unit".to_string(),
        }),
    }
}

/// A literal rate like `1 tCO2e / kg` or `2 kwh / mt`, canonicalized to
/// "per kg" of the declared numerator.
fn per_kg(quantity: Quantity, expected_numerator: UnitAtom) -> Result<f64, EngineError> {
    match (quantity.unit.numerator, quantity.unit.denominator) {
        (n, Some(UnitAtom::Kg)) if n == expected_numerator => Ok(quantity.value),
        (n, Some(UnitAtom::Mt)) if n == expected_numerator => Ok(quantity.value / 1000.0),
        _ => Err(EngineError::UnitMismatch {
            from: quantity.unit.to_string(),
            to: format!("{} / kg", expected_numerator.as_str()),
        }),
    }
}

impl Engine {
    pub fn set_stream(&mut self, target: StreamId, value: Quantity, matcher: YearMatcher) -> Result<(), EngineError> {
        if !matcher.matches(self.current_year) {
            return Ok(());
        }
        let scope = self.scope_id();
        let base_value = super::to_base_unit(self, value, target)?;
        self.set_raw_stream(&scope, target, base_value);
        Ok(())
    }

    /// A `%` delta is relative to the stream's own current value, not to
    /// any general "total" (spec.md §4.F).
    pub fn change_stream(&mut self, target: StreamId, delta: Quantity, matcher: YearMatcher) -> Result<(), EngineError> {
        if !matcher.matches(self.current_year) {
            return Ok(());
        }
        let scope = self.scope_id();
        let current = self.raw_stream(&scope, target);
        let delta_value = if delta.unit == Unit::simple(UnitAtom::Percent) {
            current * (delta.value / 100.0)
        } else {
            super::to_base_unit(self, delta, target)?
        };
        self.set_raw_stream(&scope, target, current + delta_value);
        Ok(())
    }

    pub fn cap_stream(&mut self, target: StreamId, limit: Quantity, matcher: YearMatcher) -> Result<(), EngineError> {
        if !matcher.matches(self.current_year) {
            return Ok(());
        }
        let scope = self.scope_id();
        let current = self.raw_stream(&scope, target);
        let limit_value = super::to_base_unit(self, limit, target)?;
        self.set_raw_stream(&scope, target, current.min(limit_value));
        Ok(())
    }

    pub fn floor_stream(&mut self, target: StreamId, limit: Quantity, matcher: YearMatcher) -> Result<(), EngineError> {
        if !matcher.matches(self.current_year) {
            return Ok(());
        }
        let scope = self.scope_id();
        let current = self.raw_stream(&scope, target);
        let limit_value = super::to_base_unit(self, limit, target)?;
        self.set_raw_stream(&scope, target, current.max(limit_value));
        Ok(())
    }

    pub fn set_initial_charge(&mut self, stream: StreamId, value: Quantity, matcher: YearMatcher) -> Result<(), EngineError> {
        if !matcher.matches(self.current_year) {
            return Ok(());
        }
        let scope = self.scope_id();
        let kg_per_unit = kg_per_unit(value)?;
        self.set_initial_charge_raw(&scope, stream, kg_per_unit);
        Ok(())
    }

    pub fn set_ghg_intensity(&mut self, value: Quantity) -> Result<(), EngineError> {
        let scope = self.scope_id();
        let rate = per_kg(value, UnitAtom::TCo2e)?;
        self.ghg_intensity_per_kg.insert(scope, rate);
        Ok(())
    }

    pub fn set_energy_intensity(&mut self, value: Quantity) -> Result<(), EngineError> {
        let scope = self.scope_id();
        let rate = per_kg(value, UnitAtom::Kwh)?;
        self.energy_intensity_per_kg.insert(scope, rate);
        Ok(())
    }

    /// Proportional manufacture/import split at the current ratio; 100% to
    /// manufacture when both are zero (spec.md §4.F "Sales split rule").
    fn sales_split_fraction(&self, scope: &super::ScopeId) -> (f64, f64) {
        let manufacture = self.raw_stream(scope, StreamId::Manufacture);
        let import = self.raw_stream(scope, StreamId::Import);
        let total = manufacture + import;
        if total == 0.0 {
            (1.0, 0.0)
        } else {
            (manufacture / total, import / total)
        }
    }

    fn add_to_sales(&mut self, scope: &super::ScopeId, volume_kg: f64) {
        let (manufacture_share, import_share) = self.sales_split_fraction(scope);
        let manufacture = self.raw_stream(scope, StreamId::Manufacture);
        let import = self.raw_stream(scope, StreamId::Import);
        self.set_raw_stream(scope, StreamId::Manufacture, manufacture + volume_kg * manufacture_share);
        self.set_raw_stream(scope, StreamId::Import, import + volume_kg * import_share);
    }

    pub fn recharge(&mut self, population_pct: Quantity, volume_per_unit: Quantity, matcher: YearMatcher) -> Result<(), EngineError> {
        if !matcher.matches(self.current_year) {
            return Ok(());
        }
        let scope = self.scope_id();
        let fraction = percent_fraction(population_pct)?;
        let rate_kg_per_unit = kg_per_unit(volume_per_unit)?;
        let equipment = self.raw_stream(&scope, StreamId::Equipment);
        let recharge_volume_kg = equipment * fraction * rate_kg_per_unit;
        self.add_to_sales(&scope, recharge_volume_kg);
        let emissions = recharge_volume_kg * self.ghg_intensity_for(&scope);
        let current = self.raw_stream(&scope, StreamId::RechargeEmissions);
        self.set_raw_stream(&scope, StreamId::RechargeEmissions, current + emissions);
        Ok(())
    }

    pub fn retire(&mut self, pct_per_year: Quantity, matcher: YearMatcher) -> Result<(), EngineError> {
        if !matcher.matches(self.current_year) {
            return Ok(());
        }
        let scope = self.scope_id();
        let fraction = percent_fraction(pct_per_year)?;
        let equipment = self.raw_stream(&scope, StreamId::Equipment);
        let retired_units = equipment * fraction;
        self.set_raw_stream(&scope, StreamId::Equipment, equipment - retired_units);
        let retired_volume_kg = retired_units * self.initial_charge_for(&scope);
        let emissions = retired_volume_kg * self.ghg_intensity_for(&scope);
        let current = self.raw_stream(&scope, StreamId::EolEmissions);
        self.set_raw_stream(&scope, StreamId::EolEmissions, current + emissions);
        let retired_so_far = *self.retired_this_year.get(&scope).unwrap_or(&0.0);
        self.retired_this_year.insert(scope, retired_so_far + retired_units);
        Ok(())
    }

    pub fn recycle(
        &mut self,
        volume: Quantity,
        yield_pct: Quantity,
        displacement: Option<Displacement>,
        matcher: YearMatcher,
    ) -> Result<(), EngineError> {
        if !matcher.matches(self.current_year) {
            return Ok(());
        }
        let scope = self.scope_id();
        let volume_kg = super::to_base_unit(self, volume, StreamId::Recycle)?;
        let yield_fraction = percent_fraction(yield_pct)?;
        let recycled_kg = volume_kg * yield_fraction;
        let current_recycle = self.raw_stream(&scope, StreamId::Recycle);
        self.set_raw_stream(&scope, StreamId::Recycle, current_recycle + recycled_kg);

        if let Some(displacement) = displacement {
            let displaced_kg = recycled_kg * displacement.percent;
            let target_stream = match displacement.target {
                DisplacementTarget::Manufacture => StreamId::Manufacture,
                DisplacementTarget::Import => StreamId::Import,
            };
            let current = self.raw_stream(&scope, target_stream);
            let remaining = current - displaced_kg;
            if remaining < 0.0 {
                tracing::warn!(
                    application = %scope.0,
                    substance = %scope.1,
                    stream = target_stream.name(),
                    shortfall = -remaining,
                    "recycle displacement exceeds stream value, clamping at zero"
                );
            }
            self.set_raw_stream(&scope, target_stream, remaining.max(0.0));
        }
        Ok(())
    }

    pub fn replace(
        &mut self,
        volume: Quantity,
        stream: StreamId,
        destination_substance: String,
        matcher: YearMatcher,
    ) -> Result<(), EngineError> {
        if !matcher.matches(self.current_year) {
            return Ok(());
        }
        let source_scope = self.scope_id();
        let volume_value = super::to_base_unit(self, volume, stream)?;
        let current = self.raw_stream(&source_scope, stream);
        self.set_raw_stream(&source_scope, stream, (current - volume_value).max(0.0));

        let dest_scope = (source_scope.0.clone(), destination_substance);
        self.register_scope(dest_scope.clone());
        let dest_current = self.raw_stream(&dest_scope, stream);
        self.set_raw_stream(&dest_scope, stream, dest_current + volume_value);
        Ok(())
    }

    pub fn emit(&mut self, value: Quantity, matcher: YearMatcher) -> Result<(), EngineError> {
        if !matcher.matches(self.current_year) {
            return Ok(());
        }
        let scope = self.scope_id();
        let value_tco2e = super::to_base_unit(self, value, StreamId::Consumption)?;
        let current = self.raw_stream(&scope, StreamId::Consumption);
        self.set_raw_stream(&scope, StreamId::Consumption, current + value_tco2e);
        Ok(())
    }

    /// Reads `target` in its base unit, or `conversion` if given, optionally
    /// rescoped to a different `(application, substance)` for the duration
    /// of the read.
    pub fn get_stream(
        &mut self,
        target: StreamId,
        rescope_application: Option<&str>,
        rescope_substance: Option<&str>,
        conversion: Option<Unit>,
    ) -> Result<Quantity, EngineError> {
        self.with_rescope(rescope_application, rescope_substance, |engine| {
            let scope = engine.scope_id();
            let raw = if target == StreamId::Sales {
                engine.raw_stream(&scope, StreamId::Manufacture) + engine.raw_stream(&scope, StreamId::Import)
            } else {
                engine.raw_stream(&scope, target)
            };
            let quantity = Quantity::new(raw, target.base_unit());
            match conversion {
                Some(unit) => crate::convert::convert(quantity, unit, engine),
                None => Ok(quantity),
            }
        })
    }
}
