//! Quality evaluation and report output

pub mod evaluator;
pub mod report;

pub use evaluator::{score_shots, QualityEvaluator};
pub use report::{render_plan, render_quality, render_run, write_json, PlanReport, PlannedShot};
