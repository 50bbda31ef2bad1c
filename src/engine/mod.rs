//! Plan, confirm, and converge
//!
//! 1. Planning - a dry run of the engine over the run list
//! 2. Diffing - attribute and content diffs for everything that would change
//! 3. Executing - the real run, with console progress

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ApplyOptions, Outcome, execute};
pub use planner::Plan;
