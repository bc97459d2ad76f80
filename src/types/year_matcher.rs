//! Interval predicate gating whether a statement applies in the current
//! simulation year (spec.md §3 "YearMatcher").

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct YearMatcher {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl YearMatcher {
    pub fn all() -> YearMatcher {
        YearMatcher {
            min: None,
            max: None,
        }
    }

    pub fn single(year: i32) -> YearMatcher {
        YearMatcher {
            min: Some(year),
            max: Some(year),
        }
    }

    pub fn range(lo: i32, hi: i32) -> YearMatcher {
        YearMatcher {
            min: Some(lo),
            max: Some(hi),
        }
    }

    pub fn with_min(lo: i32) -> YearMatcher {
        YearMatcher {
            min: Some(lo),
            max: None,
        }
    }

    pub fn with_max(hi: i32) -> YearMatcher {
        YearMatcher {
            min: None,
            max: Some(hi),
        }
    }

    pub fn matches(&self, year: i32) -> bool {
        self.min.map_or(true, |lo| year >= lo) && self.max.map_or(true, |hi| year <= hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_matcher_matches_every_year() {
        let m = YearMatcher::all();
        assert!(m.matches(1900));
        assert!(m.matches(3000));
    }

    #[test]
    fn single_year_matches_only_itself() {
        let m = YearMatcher::single(2025);
        assert!(m.matches(2025));
        assert!(!m.matches(2024));
        assert!(!m.matches(2026));
    }

    #[test]
    fn range_is_inclusive_on_both_ends() {
        let m = YearMatcher::range(2025, 2027);
        assert!(m.matches(2025));
        assert!(m.matches(2026));
        assert!(m.matches(2027));
        assert!(!m.matches(2028));
    }
}
