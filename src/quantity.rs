//! A scalar value paired with a [`Unit`]. Immutable; every operation that
//! needs to reconcile two different units goes through [`crate::convert`].

use crate::units::Unit;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    pub fn new(value: f64, unit: Unit) -> Quantity {
        Quantity { value, unit }
    }

    pub fn zero(unit: Unit) -> Quantity {
        Quantity { value: 0.0, unit }
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0.0
    }

    pub fn same_unit(&self, other: &Quantity) -> bool {
        self.unit == other.unit
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitAtom;

    #[test]
    fn zero_is_zero_valued() {
        let q = Quantity::zero(Unit::simple(UnitAtom::Kg));
        assert!(q.is_zero());
    }

    #[test]
    fn same_unit_compares_unit_only() {
        let a = Quantity::new(1.0, Unit::simple(UnitAtom::Kg));
        let b = Quantity::new(2.0, Unit::simple(UnitAtom::Kg));
        assert!(a.same_unit(&b));
    }
}
