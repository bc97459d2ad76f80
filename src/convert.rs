//! Context-sensitive unit conversion (spec.md §4.D) — the semantic heart of
//! the language. Every arithmetic operation and every `getStream ... as ...`
//! clause that crosses units funnels through [`convert`].
//!
//! Conversion never touches `Engine` directly; it reads through a
//! [`StateGetter`] so the same code serves live engine state and the
//! overriding wrapper the result serializer uses for offset accounting.

use crate::error::EngineError;
use crate::quantity::Quantity;
use crate::state::StateGetter;
use crate::units::{Unit, UnitAtom};

/// Converts `quantity` into `to`, per spec.md §4.D's five-step recipe.
pub fn convert(quantity: Quantity, to: Unit, state: &dyn StateGetter) -> Result<Quantity, EngineError> {
    let value = convert_value(quantity.value, quantity.unit, to, state)?;
    Ok(Quantity::new(value, to))
}

fn convert_value(value: f64, from: Unit, to: Unit, state: &dyn StateGetter) -> Result<f64, EngineError> {
    // Step 1: identity.
    if from == to {
        return Ok(value);
    }
    // Step 2: zero short-circuits regardless of what state would be needed.
    if value == 0.0 {
        return Ok(0.0);
    }
    // Step 3: identical denominators — only the numerator moves.
    if from.denominator == to.denominator {
        return convert_atom(value, from.numerator, to.numerator, state);
    }
    // Step 4: normalize away the source denominator, convert the numerator,
    // then reintroduce the destination denominator.
    let absolute = match from.denominator {
        Some(denominator) => {
            let total = total_for(denominator, state);
            match total {
                Some(t) => value * t,
                None => {
                    return Err(EngineError::UnitMismatch {
                        from: from.to_string(),
                        to: to.to_string(),
                    })
                }
            }
        }
        None => value,
    };
    let converted_numerator = convert_atom(absolute, from.numerator, to.numerator, state)?;
    match to.denominator {
        None => Ok(converted_numerator),
        Some(denominator) => match total_for(denominator, state) {
            Some(t) if t != 0.0 => Ok(converted_numerator / t),
            _ => {
                // Step 5: zero-denominator rescue via a known scalar between
                // the two denominators, else give up.
                match from
                    .denominator
                    .and_then(|fd| known_scalar(fd, denominator))
                {
                    Some(scalar) => Ok(converted_numerator / scalar),
                    None => Err(EngineError::NonRecoverableNaN {
                        from: from.to_string(),
                        to: to.to_string(),
                    }),
                }
            }
        },
    }
}

/// The current state total denominated in `atom`'s own unit, used to move a
/// ratio value in or out of "per `atom`" form.
fn total_for(atom: UnitAtom, state: &dyn StateGetter) -> Option<f64> {
    match atom {
        UnitAtom::Kg => Some(state.get_volume()),
        UnitAtom::Mt => Some(state.get_volume() / 1000.0),
        UnitAtom::Unit | UnitAtom::Units => Some(state.get_population()),
        UnitAtom::TCo2e => Some(state.get_ghg_consumption()),
        UnitAtom::Kwh => Some(state.get_energy_consumption()),
        UnitAtom::Year | UnitAtom::Years => Some(state.get_years_elapsed()),
        UnitAtom::Percent | UnitAtom::Empty => None,
    }
}

/// A pure scalar relating two denominators with no state lookup needed
/// (spec.md §4.D step 5): `kg<->mt` is 1000, `unit<->units` and
/// `year<->years` are identity.
fn known_scalar(a: UnitAtom, b: UnitAtom) -> Option<f64> {
    use UnitAtom::*;
    match (a, b) {
        (Kg, Mt) => Some(1000.0),
        (Mt, Kg) => Some(1.0 / 1000.0),
        (Unit, Units) | (Units, Unit) => Some(1.0),
        (Year, Years) | (Years, Year) => Some(1.0),
        _ if a == b => Some(1.0),
        _ => None,
    }
}

/// Converts a bare numerator value between two atoms, looking up whatever
/// engine total the pair requires (spec.md §4.D "Numerator conversions").
fn convert_atom(value: f64, from: UnitAtom, to: UnitAtom, state: &dyn StateGetter) -> Result<f64, EngineError> {
    use UnitAtom::*;
    if from == to {
        return Ok(value);
    }
    let mismatch = || EngineError::UnitMismatch {
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    };

    match (from, to) {
        (Kg, Mt) => Ok(value / 1000.0),
        (Mt, Kg) => Ok(value * 1000.0),
        (Unit, Units) | (Units, Unit) => Ok(value),
        (Year, Years) | (Years, Year) => Ok(value),

        (Percent, other) => {
            let total = total_for(other, state).ok_or_else(mismatch)?;
            Ok(value / 100.0 * total)
        }
        (other, Percent) => {
            let total = total_for(other, state).ok_or_else(mismatch)?;
            if total == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            Ok(value / total * 100.0)
        }

        (Unit, Kg) | (Units, Kg) => Ok(value * state.get_amortized_unit_volume()),
        (Kg, Unit) | (Kg, Units) => {
            let per_unit = state.get_amortized_unit_volume();
            if per_unit == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            Ok(value / per_unit)
        }
        (Unit, Mt) | (Units, Mt) => Ok(value * state.get_amortized_unit_volume() / 1000.0),
        (Mt, Unit) | (Mt, Units) => {
            let per_unit_mt = state.get_amortized_unit_volume() / 1000.0;
            if per_unit_mt == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            Ok(value / per_unit_mt)
        }

        (Kg, TCo2e) => Ok(value * state.get_substance_consumption()),
        (TCo2e, Kg) => {
            let per_kg = state.get_substance_consumption();
            if per_kg == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            Ok(value / per_kg)
        }
        (Mt, TCo2e) => Ok(value * 1000.0 * state.get_substance_consumption()),
        (TCo2e, Mt) => {
            let per_kg = state.get_substance_consumption();
            if per_kg == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            Ok(value / (per_kg * 1000.0))
        }

        (Kg, Kwh) => Ok(value * state.get_energy_intensity()),
        (Kwh, Kg) => {
            let per_kg = state.get_energy_intensity();
            if per_kg == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            Ok(value / per_kg)
        }
        (Mt, Kwh) => Ok(value * 1000.0 * state.get_energy_intensity()),
        (Kwh, Mt) => {
            let per_kg = state.get_energy_intensity();
            if per_kg == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            Ok(value / (per_kg * 1000.0))
        }

        (Unit, TCo2e) | (Units, TCo2e) => Ok(value * state.get_amortized_unit_consumption()),
        (TCo2e, Unit) | (TCo2e, Units) => {
            let per_unit = state.get_amortized_unit_consumption();
            if per_unit == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            Ok(value / per_unit)
        }

        (Year, other) | (Years, other) => {
            let years = state.get_years_elapsed();
            let total = total_for(other, state).ok_or_else(mismatch)?;
            if years == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            Ok(value * (total / years))
        }
        (other, Year) | (other, Years) => {
            let years = state.get_years_elapsed();
            let total = total_for(other, state).ok_or_else(mismatch)?;
            if total == 0.0 {
                return Err(EngineError::DivisionByZero);
            }
            Ok(value * years / total)
        }

        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scenario {
        volume: f64,
        population: f64,
        ghg_consumption: f64,
        energy_consumption: f64,
        substance_consumption: f64,
        energy_intensity: f64,
        amortized_unit_volume: f64,
        amortized_unit_consumption: f64,
        years_elapsed: f64,
        population_change: f64,
    }

    impl StateGetter for Scenario {
        fn get_volume(&self) -> f64 {
            self.volume
        }
        fn get_population(&self) -> f64 {
            self.population
        }
        fn get_ghg_consumption(&self) -> f64 {
            self.ghg_consumption
        }
        fn get_energy_consumption(&self) -> f64 {
            self.energy_consumption
        }
        fn get_substance_consumption(&self) -> f64 {
            self.substance_consumption
        }
        fn get_energy_intensity(&self) -> f64 {
            self.energy_intensity
        }
        fn get_amortized_unit_volume(&self) -> f64 {
            self.amortized_unit_volume
        }
        fn get_amortized_unit_consumption(&self) -> f64 {
            self.amortized_unit_consumption
        }
        fn get_years_elapsed(&self) -> f64 {
            self.years_elapsed
        }
        fn get_population_change(&self) -> f64 {
            self.population_change
        }
    }

    fn scenario() -> Scenario {
        Scenario {
            volume: 10.0,
            population: 5.0,
            ghg_consumption: 10.0,
            energy_consumption: 4.0,
            substance_consumption: 1.0,
            energy_intensity: 0.4,
            amortized_unit_volume: 2.0,
            amortized_unit_consumption: 2.0,
            years_elapsed: 1.0,
            population_change: 0.0,
        }
    }

    #[test]
    fn identity_conversion_is_a_no_op() {
        let state = scenario();
        let q = Quantity::new(42.0, Unit::simple(UnitAtom::Kg));
        let out = convert(q, Unit::simple(UnitAtom::Kg), &state).unwrap();
        assert_eq!(out.value, 42.0);
    }

    #[test]
    fn zero_converts_to_anything_without_state() {
        let state = scenario();
        let q = Quantity::zero(Unit::simple(UnitAtom::Kg));
        let out = convert(q, Unit::simple(UnitAtom::TCo2e), &state).unwrap();
        assert_eq!(out.value, 0.0);
    }

    #[test]
    fn kg_to_mt_is_exactly_a_thousand() {
        let state = scenario();
        let q = Quantity::new(2000.0, Unit::simple(UnitAtom::Kg));
        let out = convert(q, Unit::simple(UnitAtom::Mt), &state).unwrap();
        assert_eq!(out.value, 2.0);
    }

    #[test]
    fn kg_to_tco2e_uses_substance_consumption() {
        let mut state = scenario();
        state.substance_consumption = 1.5;
        let q = Quantity::new(10.0, Unit::simple(UnitAtom::Kg));
        let out = convert(q, Unit::simple(UnitAtom::TCo2e), &state).unwrap();
        assert_eq!(out.value, 15.0);
    }

    #[test]
    fn units_round_trip_through_kg_via_amortized_charge() {
        let state = scenario();
        let q = Quantity::new(3.0, Unit::simple(UnitAtom::Units));
        let kg = convert(q, Unit::simple(UnitAtom::Kg), &state).unwrap();
        assert_eq!(kg.value, 6.0);
        let back = convert(kg, Unit::simple(UnitAtom::Units), &state).unwrap();
        assert!((back.value - 3.0).abs() < 1e-9);
    }

    #[test]
    fn percent_of_volume_round_trips() {
        let state = scenario();
        let q = Quantity::new(50.0, Unit::simple(UnitAtom::Percent));
        let kg = convert(q, Unit::simple(UnitAtom::Kg), &state).unwrap();
        assert_eq!(kg.value, 5.0);
    }

    #[test]
    fn zero_denominator_total_without_known_scalar_is_nonrecoverable() {
        let mut state = scenario();
        state.energy_consumption = 0.0;
        let q = Quantity::new(5.0, Unit::ratio(UnitAtom::Kg, UnitAtom::TCo2e));
        let err = convert(q, Unit::ratio(UnitAtom::Kg, UnitAtom::Kwh), &state).unwrap_err();
        assert!(matches!(err, EngineError::NonRecoverableNaN { .. }));
    }
}
