//! Frame conventions, angle math, and the shared data model.

pub mod math;
pub mod types;
