//! Shot planning: descriptor construction, quality heuristic and seek strategy selection

pub mod crf;
pub mod seek;
pub mod shots;

pub use crf::{compute_params, CrfHeuristic, HeuristicConfig};
pub use seek::{SeekConfig, SeekPlanner};
pub use shots::{ShotPlanConfig, ShotPlanner};

#[cfg(test)]
mod tests;
