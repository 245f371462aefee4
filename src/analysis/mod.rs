//! Scope filtering and indicator aggregation.
//!
//! Everything in here is a pure function of its inputs: the same rows,
//! entity and filters always produce the same indicators.

pub mod aggregator;
pub mod comparison;
pub mod scope;

pub use aggregator::{compute_indicators, IndicatorKind, IndicatorSet};
pub use comparison::{compare_with_ancestors, ComparisonEntry};
pub use scope::{select_for_entity, UserFilters};
