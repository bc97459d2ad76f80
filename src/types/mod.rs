pub mod scope;
pub mod stream;
pub mod year_matcher;

pub use scope::{ScopeKind, ScopeTriple};
pub use stream::StreamId;
pub use year_matcher::YearMatcher;
