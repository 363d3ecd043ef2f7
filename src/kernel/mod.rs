//! Headless search/replace core.

pub mod search;
pub mod services;

pub use search::{ReplaceAllReport, ReplacePhase, ResultIndex, SearchSession, SearchSummary};
