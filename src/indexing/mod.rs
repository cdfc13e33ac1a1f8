//! Per-project indexing.

pub mod project_index;

pub use project_index::{BuildState, BuildStats, ProjectIndex};
