//! The fixed, closed set of stream identifiers a scope can hold, and their
//! declared base units (spec.md §6: "Stream base units").

use crate::units::{Unit, UnitAtom};
#[cfg(test)]
use strum_macros::EnumIter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(EnumIter))]
pub enum StreamId {
    Manufacture,
    Import,
    /// Virtual: always `Manufacture + Import`, never stored directly (spec.md §3 invariant 2).
    Sales,
    Recycle,
    Consumption,
    RechargeEmissions,
    EolEmissions,
    Equipment,
    PriorEquipment,
    NewEquipment,
    Energy,
}

impl StreamId {
    pub fn from_keyword(raw: &str) -> Option<StreamId> {
        Some(match raw {
            "manufacture" => StreamId::Manufacture,
            "import" => StreamId::Import,
            "sales" => StreamId::Sales,
            "recycle" => StreamId::Recycle,
            "consumption" => StreamId::Consumption,
            "rechargeEmissions" => StreamId::RechargeEmissions,
            "eolEmissions" => StreamId::EolEmissions,
            "equipment" => StreamId::Equipment,
            "priorEquipment" => StreamId::PriorEquipment,
            "newEquipment" => StreamId::NewEquipment,
            "energy" => StreamId::Energy,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            StreamId::Manufacture => "manufacture",
            StreamId::Import => "import",
            StreamId::Sales => "sales",
            StreamId::Recycle => "recycle",
            StreamId::Consumption => "consumption",
            StreamId::RechargeEmissions => "rechargeEmissions",
            StreamId::EolEmissions => "eolEmissions",
            StreamId::Equipment => "equipment",
            StreamId::PriorEquipment => "priorEquipment",
            StreamId::NewEquipment => "newEquipment",
            StreamId::Energy => "energy",
        }
    }

    /// The unit a value is normalized to before it is stored (spec.md §3 invariant 1).
    pub fn base_unit(&self) -> Unit {
        let atom = match self {
            StreamId::Manufacture
            | StreamId::Import
            | StreamId::Sales
            | StreamId::Recycle => UnitAtom::Kg,
            StreamId::Consumption | StreamId::RechargeEmissions | StreamId::EolEmissions => {
                UnitAtom::TCo2e
            }
            StreamId::Equipment | StreamId::PriorEquipment | StreamId::NewEquipment => {
                UnitAtom::Units
            }
            StreamId::Energy => UnitAtom::Kwh,
        };
        Unit::simple(atom)
    }

    /// Whether the engine resets this stream to zero at each year boundary
    /// (spec.md §4.F "Year transition", step 3).
    pub fn resets_each_year(&self) -> bool {
        matches!(
            self,
            StreamId::NewEquipment
                | StreamId::RechargeEmissions
                | StreamId::EolEmissions
                | StreamId::Consumption
                | StreamId::Energy
        )
    }

    /// Whether the stream is stored directly, as opposed to derived on read
    /// (only `Sales` is derived).
    pub fn is_stored(&self) -> bool {
        !matches!(self, StreamId::Sales)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_stream_round_trips_through_its_keyword() {
        for id in StreamId::iter() {
            assert_eq!(StreamId::from_keyword(id.name()), Some(id));
        }
    }

    #[test]
    fn sales_is_the_only_unstored_stream() {
        assert!(!StreamId::Sales.is_stored());
        assert!(StreamId::Manufacture.is_stored());
    }
}
