//! End-to-end calibration driven by a JSON run configuration.

use sc_data::{GroundTruthStore, ParameterFile, ScenarioSelection, ALL_PARENTS};
use sc_optimizer::{Algorithm, Calibrator, StrategyOptions};
use sc_types::{config_error, Objective, ScResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::adapter::SimulationAdapter;
use crate::config::SimulatorConfig;
use crate::loss::LossFunction;
use crate::report::CalibrationReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Ground-truth CSV.
    pub ground_truth: PathBuf,
    /// Benchmark family to calibrate against, or `all`.
    pub benchmark_parent: String,
    pub scenarios: ScenarioSelection,
    /// Declarative parameter file.
    pub parameters: PathBuf,
    pub simulator: SimulatorConfig,
    pub algorithm: String,
    pub time_limit_secs: u64,
    pub workers: usize,
    pub loss: LossFunction,
    pub strategy: StrategyOptions,
    /// Where the result artifact is written.
    pub output: PathBuf,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            ground_truth: PathBuf::from("ground_truth.csv"),
            benchmark_parent: ALL_PARENTS.to_string(),
            scenarios: ScenarioSelection::default(),
            parameters: PathBuf::from("parameters.json"),
            simulator: SimulatorConfig::default(),
            algorithm: Algorithm::Random.to_string(),
            time_limit_secs: 3600,
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            loss: LossFunction::default(),
            strategy: StrategyOptions::default(),
            output: PathBuf::from("calibration.json"),
        }
    }
}

impl CalibrationConfig {
    pub fn load(path: &Path) -> ScResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {}", path.display(), e))?;
        let config: Self = serde_json::from_str(&text)?;
        info!("Loaded run configuration from {}", path.display());
        Ok(config)
    }

    /// Checks that need no data and no simulation.
    pub fn validate(&self) -> ScResult<Algorithm> {
        let algorithm: Algorithm = self.algorithm.parse()?;
        if self.workers == 0 {
            return Err(config_error!("workers must be at least 1"));
        }
        self.simulator.validate()?;
        Ok(algorithm)
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }
}

/// Load everything, calibrate, and write the report.
///
/// Anything wrong with the configuration, the data or the parameter file is
/// returned as an error before the first simulation. A run that fails
/// midway still writes its report.
pub fn run_calibration(config: &CalibrationConfig) -> ScResult<CalibrationReport> {
    let algorithm = config.validate()?;

    let mut store = GroundTruthStore::load(&config.ground_truth)?;
    store.filter_by_parent(&config.benchmark_parent);
    let ground_truth = store.ground_truth(&config.scenarios)?;
    let parameters = ParameterFile::load(&config.parameters)?;

    let adapter = Arc::new(
        SimulationAdapter::new(config.simulator.clone(), ground_truth)?.with_loss(config.loss),
    );
    let objective: Arc<dyn Objective> = adapter.clone();
    let mut calibrator =
        Calibrator::new(algorithm.as_str(), objective).with_options(config.strategy.clone());
    calibrator.add_params(&parameters.parameters)?;
    let centre = vec![0.5; calibrator.space().dimensions()];
    adapter.check_candidate(&calibrator.space().candidate(&centre))?;

    let outcome = calibrator.compute_calibration(config.time_limit(), config.workers)?;

    let report = CalibrationReport::new(&outcome, &adapter, serde_json::to_value(config)?);
    report.write(&config.output)?;
    Ok(report)
}
