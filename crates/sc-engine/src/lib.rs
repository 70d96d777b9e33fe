//! # sc-engine
//!
//! Simulation side of the SMPI calibrator: platform generation, benchmark
//! execution, the loss function, and the adapter that exposes all of it to
//! the search loop as an objective.

pub mod adapter;
pub mod config;
pub mod loss;
pub mod platform;
pub mod report;
pub mod run;
pub mod runner;

#[cfg(test)]
mod testutil;

pub use adapter::{EvaluationRecord, SimulationAdapter};
pub use config::{CommandSpec, SamplingMode, SimulatorConfig};
pub use loss::{Aggregation, Distance, LossFunction};
pub use platform::{build_platform, describe_platform, PlatformDescription, PlatformHandle};
pub use report::CalibrationReport;
pub use run::{run_calibration, CalibrationConfig};
pub use runner::{parse_measurements, run_scenario, SamplingRule};
