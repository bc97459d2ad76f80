//! Unit atoms and the numerator/denominator ratio shape described in
//! spec.md's design notes: unit strings are parsed once into a small struct
//! instead of being compared as raw text everywhere, while `Display` still
//! reproduces the exact `"A / B"` text external surfaces expect.

use std::fmt;

/// A single unit atom, the closed vocabulary spec.md §3 names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitAtom {
    Kg,
    Mt,
    Unit,
    Units,
    TCo2e,
    Kwh,
    Year,
    Years,
    Percent,
    /// The empty unit, used for dimensionless ratios like `manufacture / sales`.
    Empty,
}

impl UnitAtom {
    pub fn parse(raw: &str) -> Option<UnitAtom> {
        Some(match raw.trim() {
            "kg" => UnitAtom::Kg,
            "mt" => UnitAtom::Mt,
            "unit" => UnitAtom::Unit,
            "units" => UnitAtom::Units,
            "tCO2e" => UnitAtom::TCo2e,
            "kwh" => UnitAtom::Kwh,
            "year" => UnitAtom::Year,
            "years" => UnitAtom::Years,
            "%" | "percent" => UnitAtom::Percent,
            "" => UnitAtom::Empty,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitAtom::Kg => "kg",
            UnitAtom::Mt => "mt",
            UnitAtom::Unit => "unit",
            UnitAtom::Units => "units",
            UnitAtom::TCo2e => "tCO2e",
            UnitAtom::Kwh => "kwh",
            UnitAtom::Year => "year",
            UnitAtom::Years => "years",
            UnitAtom::Percent => "%",
            UnitAtom::Empty => "",
        }
    }

    pub fn is_volume(&self) -> bool {
        matches!(self, UnitAtom::Kg | UnitAtom::Mt)
    }

    pub fn is_population(&self) -> bool {
        matches!(self, UnitAtom::Unit | UnitAtom::Units)
    }

    pub fn is_years(&self) -> bool {
        matches!(self, UnitAtom::Year | UnitAtom::Years)
    }
}

impl fmt::Display for UnitAtom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A numerator, optionally over a denominator: `kg` or `tCO2e / kg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Unit {
    pub numerator: UnitAtom,
    pub denominator: Option<UnitAtom>,
}

impl Unit {
    pub fn simple(atom: UnitAtom) -> Unit {
        Unit {
            numerator: atom,
            denominator: None,
        }
    }

    pub fn ratio(numerator: UnitAtom, denominator: UnitAtom) -> Unit {
        Unit {
            numerator,
            denominator: Some(denominator),
        }
    }

    pub fn empty() -> Unit {
        Unit::simple(UnitAtom::Empty)
    }

    /// Parses `"kg"`, `"tCO2e / kg"`, `""`, etc. Returns `None` on an
    /// unrecognized atom on either side.
    pub fn parse(raw: &str) -> Option<Unit> {
        if let Some((num, den)) = raw.split_once('/') {
            Some(Unit::ratio(UnitAtom::parse(num)?, UnitAtom::parse(den)?))
        } else {
            Some(Unit::simple(UnitAtom::parse(raw)?))
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.denominator {
            Some(den) => write!(f, "{} / {}", self.numerator, den),
            None => write!(f, "{}", self.numerator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_units() {
        assert_eq!(Unit::parse("kg"), Some(Unit::simple(UnitAtom::Kg)));
        assert_eq!(Unit::parse(""), Some(Unit::simple(UnitAtom::Empty)));
    }

    #[test]
    fn parses_ratio_units() {
        let unit = Unit::parse("tCO2e / kg").unwrap();
        assert_eq!(unit.numerator, UnitAtom::TCo2e);
        assert_eq!(unit.denominator, Some(UnitAtom::Kg));
    }

    #[test]
    fn display_round_trips_ratio() {
        let unit = Unit::ratio(UnitAtom::TCo2e, UnitAtom::Kg);
        assert_eq!(unit.to_string(), "tCO2e / kg");
    }

    #[test]
    fn rejects_unknown_atoms() {
        assert_eq!(Unit::parse("furlongs"), None);
    }
}
