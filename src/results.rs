//! Snapshots engine state into output rows (spec.md §4.I) and encodes them
//! as CSV (spec.md §6 "Output rows"). `domesticConsumption`,
//! `importConsumption`, and `recycleConsumption` are never read back off a
//! stored stream — they are derived at snapshot time by running the offset
//! volume through an [`OverridingStateGetter`] pinned to that volume, so the
//! same ghg-intensity conversion logic used everywhere else produces them.

use serde::Serialize;

use crate::engine::Engine;
use crate::quantity::Quantity;
use crate::state::OverridingStateGetter;
use crate::types::StreamId;
use crate::units::{Unit, UnitAtom};

/// One `(application, substance, year)` snapshot, before the driver attaches
/// which simulation/trial it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResultRow {
    pub application: String,
    pub substance: String,
    pub year: i32,
    pub manufacture_kg: f64,
    pub import_kg: f64,
    pub recycle_kg: f64,
    pub domestic_consumption_tco2e: f64,
    pub import_consumption_tco2e: f64,
    pub recycle_consumption_tco2e: f64,
    pub recharge_emissions_tco2e: f64,
    pub eol_emissions_tco2e: f64,
    pub population_units: f64,
    pub population_new_units: f64,
    pub energy_consumption_kwh: f64,
}

pub(crate) fn build_row(engine: &Engine, application: &str, substance: &str, year: i32) -> EngineResultRow {
    let scope = (application.to_string(), substance.to_string());
    let manufacture_kg = engine.raw_stream(&scope, StreamId::Manufacture);
    let import_kg = engine.raw_stream(&scope, StreamId::Import);
    let recycle_kg = engine.raw_stream(&scope, StreamId::Recycle);
    let ghg_intensity = engine.ghg_intensity_for(&scope);
    let energy_intensity = engine.energy_intensity_for(&scope);

    let total = manufacture_kg + import_kg;
    let (manufacture_share, import_share) = if total == 0.0 {
        (1.0, 0.0)
    } else {
        (manufacture_kg / total, import_kg / total)
    };
    let manufacture_offset_kg = (manufacture_kg - recycle_kg * manufacture_share).max(0.0);
    let import_offset_kg = (import_kg - recycle_kg * import_share).max(0.0);

    let domestic_consumption_tco2e = consumption_for(engine, manufacture_offset_kg, ghg_intensity);
    let import_consumption_tco2e = consumption_for(engine, import_offset_kg, ghg_intensity);
    let recycle_consumption_tco2e = consumption_for(engine, recycle_kg, ghg_intensity);

    let recharge_emissions_raw = engine.raw_stream(&scope, StreamId::RechargeEmissions);
    let recharge_emissions_tco2e = (recharge_emissions_raw - recycle_consumption_tco2e).max(0.0);
    let eol_emissions_tco2e = engine.raw_stream(&scope, StreamId::EolEmissions);
    let population_units = engine.raw_stream(&scope, StreamId::Equipment);
    let population_new_units = engine.raw_stream(&scope, StreamId::NewEquipment);
    let energy_consumption_kwh = (manufacture_offset_kg + import_offset_kg) * energy_intensity;

    EngineResultRow {
        application: application.to_string(),
        substance: substance.to_string(),
        year,
        manufacture_kg,
        import_kg,
        recycle_kg,
        domestic_consumption_tco2e,
        import_consumption_tco2e,
        recycle_consumption_tco2e,
        recharge_emissions_tco2e,
        eol_emissions_tco2e,
        population_units,
        population_new_units,
        energy_consumption_kwh,
    }
}

/// Converts `volume_kg` to tCO2e by pinning `volume` on an
/// [`OverridingStateGetter`] rather than trusting whatever volume the engine
/// happens to be holding right now — the offset volume (e.g. manufacture
/// minus its recycle share) never equals the live `sales` stream
/// (spec.md §4.I).
fn consumption_for(engine: &Engine, volume_kg: f64, ghg_intensity_per_kg: f64) -> f64 {
    if volume_kg == 0.0 {
        return 0.0;
    }
    let overriding = OverridingStateGetter::new(engine)
        .with_volume(volume_kg)
        .with_substance_consumption(ghg_intensity_per_kg);
    let quantity = Quantity::new(volume_kg, Unit::simple(UnitAtom::Kg));
    crate::convert::convert(quantity, Unit::simple(UnitAtom::TCo2e), &overriding)
        .map(|q| q.value)
        .unwrap_or(0.0)
}

/// An [`EngineResultRow`] attributed to a simulation and trial, in the exact
/// column order spec.md §6 names.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResultRow {
    pub application: String,
    pub substance: String,
    pub year: i32,
    #[serde(rename = "scenarioName")]
    pub scenario_name: String,
    #[serde(rename = "trialNumber")]
    pub trial_number: u32,
    pub manufacture: f64,
    #[serde(rename = "manufactureUnits")]
    pub manufacture_units: &'static str,
    pub import: f64,
    #[serde(rename = "importUnits")]
    pub import_units: &'static str,
    pub recycle: f64,
    #[serde(rename = "recycleUnits")]
    pub recycle_units: &'static str,
    #[serde(rename = "domesticConsumption")]
    pub domestic_consumption: f64,
    #[serde(rename = "domesticConsumptionUnits")]
    pub domestic_consumption_units: &'static str,
    #[serde(rename = "importConsumption")]
    pub import_consumption: f64,
    #[serde(rename = "importConsumptionUnits")]
    pub import_consumption_units: &'static str,
    #[serde(rename = "recycleConsumption")]
    pub recycle_consumption: f64,
    #[serde(rename = "recycleConsumptionUnits")]
    pub recycle_consumption_units: &'static str,
    pub population: f64,
    #[serde(rename = "populationUnits")]
    pub population_units: &'static str,
    #[serde(rename = "populationNew")]
    pub population_new: f64,
    #[serde(rename = "populationNewUnits")]
    pub population_new_units: &'static str,
    #[serde(rename = "rechargeEmissions")]
    pub recharge_emissions: f64,
    #[serde(rename = "rechargeEmissionsUnits")]
    pub recharge_emissions_units: &'static str,
    #[serde(rename = "eolEmissions")]
    pub eol_emissions: f64,
    #[serde(rename = "eolEmissionsUnits")]
    pub eol_emissions_units: &'static str,
    #[serde(rename = "energyConsumption")]
    pub energy_consumption: f64,
    #[serde(rename = "energyConsumptionUnits")]
    pub energy_consumption_units: &'static str,
}

impl SimulationResultRow {
    pub fn from_engine_row(row: EngineResultRow, scenario_name: &str, trial_number: u32) -> SimulationResultRow {
        SimulationResultRow {
            application: row.application,
            substance: row.substance,
            year: row.year,
            scenario_name: scenario_name.to_string(),
            trial_number,
            manufacture: row.manufacture_kg,
            manufacture_units: "kg",
            import: row.import_kg,
            import_units: "kg",
            recycle: row.recycle_kg,
            recycle_units: "kg",
            domestic_consumption: row.domestic_consumption_tco2e,
            domestic_consumption_units: "tCO2e",
            import_consumption: row.import_consumption_tco2e,
            import_consumption_units: "tCO2e",
            recycle_consumption: row.recycle_consumption_tco2e,
            recycle_consumption_units: "tCO2e",
            population: row.population_units,
            population_units: "units",
            population_new: row.population_new_units,
            population_new_units: "units",
            recharge_emissions: row.recharge_emissions_tco2e,
            recharge_emissions_units: "tCO2e",
            eol_emissions: row.eol_emissions_tco2e,
            eol_emissions_units: "tCO2e",
            energy_consumption: row.energy_consumption_kwh,
            energy_consumption_units: "kwh",
        }
    }
}

/// Encodes rows as CSV with a header row, per spec.md §6.
pub fn to_csv(rows: &[SimulationResultRow]) -> Result<String, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes).expect("csv writer only emits UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> SimulationResultRow {
        SimulationResultRow::from_engine_row(
            EngineResultRow {
                application: "ac".to_string(),
                substance: "r".to_string(),
                year: 2025,
                manufacture_kg: 10.0,
                import_kg: 0.0,
                recycle_kg: 0.0,
                domestic_consumption_tco2e: 10.0,
                import_consumption_tco2e: 0.0,
                recycle_consumption_tco2e: 0.0,
                recharge_emissions_tco2e: 0.0,
                eol_emissions_tco2e: 0.0,
                population_units: 0.0,
                population_new_units: 0.0,
                energy_consumption_kwh: 0.0,
            },
            "s",
            1,
        )
    }

    #[test]
    fn csv_header_matches_declared_column_order() {
        let csv = to_csv(&[sample_row()]).unwrap();
        let header = csv.lines().next().unwrap();
        assert_eq!(
            header,
            "application,substance,year,scenarioName,trialNumber,manufacture,manufactureUnits,import,importUnits,recycle,recycleUnits,domesticConsumption,domesticConsumptionUnits,importConsumption,importConsumptionUnits,recycleConsumption,recycleConsumptionUnits,population,populationUnits,populationNew,populationNewUnits,rechargeEmissions,rechargeEmissionsUnits,eolEmissions,eolEmissionsUnits,energyConsumption,energyConsumptionUnits"
        );
    }

    #[test]
    fn row_values_round_trip() {
        let csv = to_csv(&[sample_row()]).unwrap();
        let data_line = csv.lines().nth(1).unwrap();
        assert!(data_line.starts_with("ac,r,2025,s,1,10,kg,0,kg,0,kg,10,tCO2e"));
    }
}
