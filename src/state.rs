//! Pure-read state access for the unit converter (spec.md §4.E). The
//! converter never touches engine internals directly; it only ever sees a
//! `&dyn StateGetter`, which keeps conversion math testable without a live
//! `Engine` and lets the result serializer substitute one field at a time.

/// Everything the unit converter (`crate::convert`) needs to know about
/// "the current totals" for the scope it is converting within.
pub trait StateGetter {
    /// Current volume of the scope, in kg.
    fn get_volume(&self) -> f64;
    /// Current equipment population, in units.
    fn get_population(&self) -> f64;
    /// Current GHG consumption, in tCO2e.
    fn get_ghg_consumption(&self) -> f64;
    /// Current energy consumption, in kwh.
    fn get_energy_consumption(&self) -> f64;
    /// tCO2e per kg (or mt) of substance, i.e. the declared `equals` intensity.
    fn get_substance_consumption(&self) -> f64;
    /// kwh per kg (or mt) of substance, i.e. the declared `uses` intensity.
    fn get_energy_intensity(&self) -> f64;
    /// kg (or mt) loaded into one equipment unit (`initialCharge`).
    fn get_amortized_unit_volume(&self) -> f64;
    /// tCO2e attributable to one equipment unit: `ghgConsumption / population`.
    fn get_amortized_unit_consumption(&self) -> f64;
    /// Years elapsed since the scope's simulation started stepping; the
    /// engine always reports 1 year per step.
    fn get_years_elapsed(&self) -> f64;
    /// Net change in population this year, used for `%`-of-population conversions.
    fn get_population_change(&self) -> f64;
}

/// Per-field override of a [`StateGetter`], scoped to a single conversion
/// call (spec.md §4.E). Never persisted on the engine.
pub struct OverridingStateGetter<'a> {
    inner: &'a dyn StateGetter,
    volume: Option<f64>,
    population: Option<f64>,
    ghg_consumption: Option<f64>,
    energy_consumption: Option<f64>,
    substance_consumption: Option<f64>,
    energy_intensity: Option<f64>,
    amortized_unit_volume: Option<f64>,
    amortized_unit_consumption: Option<f64>,
    years_elapsed: Option<f64>,
    population_change: Option<f64>,
}

impl<'a> OverridingStateGetter<'a> {
    pub fn new(inner: &'a dyn StateGetter) -> Self {
        OverridingStateGetter {
            inner,
            volume: None,
            population: None,
            ghg_consumption: None,
            energy_consumption: None,
            substance_consumption: None,
            energy_intensity: None,
            amortized_unit_volume: None,
            amortized_unit_consumption: None,
            years_elapsed: None,
            population_change: None,
        }
    }

    pub fn with_volume(mut self, value: f64) -> Self {
        self.volume = Some(value);
        self
    }

    pub fn with_population(mut self, value: f64) -> Self {
        self.population = Some(value);
        self
    }

    pub fn with_ghg_consumption(mut self, value: f64) -> Self {
        self.ghg_consumption = Some(value);
        self
    }

    pub fn with_energy_consumption(mut self, value: f64) -> Self {
        self.energy_consumption = Some(value);
        self
    }

    pub fn with_substance_consumption(mut self, value: f64) -> Self {
        self.substance_consumption = Some(value);
        self
    }

    pub fn with_energy_intensity(mut self, value: f64) -> Self {
        self.energy_intensity = Some(value);
        self
    }

    pub fn with_amortized_unit_volume(mut self, value: f64) -> Self {
        self.amortized_unit_volume = Some(value);
        self
    }

    pub fn with_amortized_unit_consumption(mut self, value: f64) -> Self {
        self.amortized_unit_consumption = Some(value);
        self
    }

    pub fn with_years_elapsed(mut self, value: f64) -> Self {
        self.years_elapsed = Some(value);
        self
    }

    pub fn with_population_change(mut self, value: f64) -> Self {
        self.population_change = Some(value);
        self
    }
}

impl<'a> StateGetter for OverridingStateGetter<'a> {
    fn get_volume(&self) -> f64 {
        self.volume.unwrap_or_else(|| self.inner.get_volume())
    }

    fn get_population(&self) -> f64 {
        self.population.unwrap_or_else(|| self.inner.get_population())
    }

    fn get_ghg_consumption(&self) -> f64 {
        self.ghg_consumption
            .unwrap_or_else(|| self.inner.get_ghg_consumption())
    }

    fn get_energy_consumption(&self) -> f64 {
        self.energy_consumption
            .unwrap_or_else(|| self.inner.get_energy_consumption())
    }

    fn get_substance_consumption(&self) -> f64 {
        self.substance_consumption
            .unwrap_or_else(|| self.inner.get_substance_consumption())
    }

    fn get_energy_intensity(&self) -> f64 {
        self.energy_intensity
            .unwrap_or_else(|| self.inner.get_energy_intensity())
    }

    fn get_amortized_unit_volume(&self) -> f64 {
        self.amortized_unit_volume
            .unwrap_or_else(|| self.inner.get_amortized_unit_volume())
    }

    fn get_amortized_unit_consumption(&self) -> f64 {
        self.amortized_unit_consumption
            .unwrap_or_else(|| self.inner.get_amortized_unit_consumption())
    }

    fn get_years_elapsed(&self) -> f64 {
        self.years_elapsed
            .unwrap_or_else(|| self.inner.get_years_elapsed())
    }

    fn get_population_change(&self) -> f64 {
        self.population_change
            .unwrap_or_else(|| self.inner.get_population_change())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl StateGetter for Fixed {
        fn get_volume(&self) -> f64 {
            10.0
        }
        fn get_population(&self) -> f64 {
            5.0
        }
        fn get_ghg_consumption(&self) -> f64 {
            1.0
        }
        fn get_energy_consumption(&self) -> f64 {
            2.0
        }
        fn get_substance_consumption(&self) -> f64 {
            0.5
        }
        fn get_energy_intensity(&self) -> f64 {
            3.0
        }
        fn get_amortized_unit_volume(&self) -> f64 {
            2.0
        }
        fn get_amortized_unit_consumption(&self) -> f64 {
            0.2
        }
        fn get_years_elapsed(&self) -> f64 {
            1.0
        }
        fn get_population_change(&self) -> f64 {
            0.0
        }
    }

    #[test]
    fn delegates_when_no_override_present() {
        let wrapper = OverridingStateGetter::new(&Fixed);
        assert_eq!(wrapper.get_volume(), 10.0);
        assert_eq!(wrapper.get_population(), 5.0);
    }

    #[test]
    fn override_wins_over_delegate() {
        let wrapper = OverridingStateGetter::new(&Fixed).with_volume(99.0);
        assert_eq!(wrapper.get_volume(), 99.0);
        assert_eq!(wrapper.get_population(), 5.0);
    }
}
