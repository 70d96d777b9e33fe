//! The objective the calibrator minimizes: build a platform for a candidate,
//! simulate every scenario on it, and score the result against ground truth.

use parking_lot::Mutex;
use sc_types::{
    CalibrationError, Candidate, GroundTruthSet, Objective, ScResult, Scenario, SimulationResult,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SimulatorConfig;
use crate::loss::LossFunction;
use crate::platform::{self, PlatformHandle};
use crate::runner::{self, SamplingRule};

/// One finished evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub candidate: Candidate,
    pub loss: f64,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone)]
struct BestRecord {
    loss: f64,
    result: SimulationResult,
    candidate: Candidate,
}

pub struct SimulationAdapter {
    config: SimulatorConfig,
    ground_truth: GroundTruthSet,
    real: Vec<Vec<f64>>,
    loss: LossFunction,
    best: Mutex<Option<BestRecord>>,
    history: Mutex<Vec<EvaluationRecord>>,
}

impl SimulationAdapter {
    pub fn new(config: SimulatorConfig, ground_truth: GroundTruthSet) -> ScResult<Self> {
        config.validate()?;
        if ground_truth.is_empty() {
            return Err(sc_types::config_error!("no ground-truth scenarios selected"));
        }
        let real = ground_truth.comparison_points();
        info!(
            "Simulation adapter ready: {} scenarios, {} comparison points",
            ground_truth.len(),
            real.len()
        );
        Ok(Self {
            config,
            ground_truth,
            real,
            loss: LossFunction::default(),
            best: Mutex::new(None),
            history: Mutex::new(Vec::new()),
        })
    }

    pub fn with_loss(mut self, loss: LossFunction) -> Self {
        self.loss = loss;
        self
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn ground_truth(&self) -> &GroundTruthSet {
        &self.ground_truth
    }

    /// Fails when a parameter of `candidate` has no place in the platform
    /// templates.
    pub fn check_candidate(&self, candidate: &Candidate) -> ScResult<()> {
        platform::describe_platform(&self.config, candidate).map(|_| ())
    }

    pub fn build_platform(&self, candidate: &Candidate) -> ScResult<PlatformHandle> {
        platform::build_platform(&self.config, candidate)
    }

    pub fn run_scenario(
        &self,
        platform: &PlatformHandle,
        scenario: &Scenario,
        iteration_budget: u32,
    ) -> ScResult<Vec<f64>> {
        runner::run_scenario(&self.config, platform, scenario, iteration_budget)
    }

    pub fn need_more_samples(&self, count: u32, iteration_cap: u32, relative_stderr: f64) -> bool {
        SamplingRule::new(self.config.threshold).need_more_samples(count, iteration_cap, relative_stderr)
    }

    /// Simulate every configured scenario on a fresh platform.
    pub fn simulate(&self, candidate: &Candidate) -> ScResult<SimulationResult> {
        let platform = self.build_platform(candidate)?;
        let mut result = SimulationResult::default();

        for scenario in self.ground_truth.scenarios() {
            let values = self.run_scenario(&platform, scenario, self.config.iteration_cap)?;
            self.remove_scenario_logs(&platform);
            if values.len() != scenario.byte_sizes.len() {
                return Err(CalibrationError::ShapeMismatch {
                    simulated: values.len(),
                    real: scenario.byte_sizes.len(),
                }
                .into());
            }
            debug!("{}: {:?}", scenario, values);
            result.per_scenario.push(values);
        }
        Ok(result)
    }

    /// Simulate and score one candidate, recording it in the history.
    pub fn evaluate(&self, candidate: &Candidate) -> ScResult<f64> {
        let start = Instant::now();
        let result = self.simulate(candidate)?;
        let loss = self.loss.score(&result.flatten(), &self.real)?;
        let elapsed_seconds = start.elapsed().as_secs_f64();
        info!("Loss {:.6} for {} ({:.1}s)", loss, candidate, elapsed_seconds);

        {
            let mut best = self.best.lock();
            let improves = match best.as_ref() {
                None => !loss.is_nan(),
                Some(current) => loss < current.loss,
            };
            if improves {
                *best = Some(BestRecord {
                    loss,
                    result,
                    candidate: candidate.clone(),
                });
            }
        }
        self.history.lock().push(EvaluationRecord {
            candidate: candidate.clone(),
            loss,
            elapsed_seconds,
        });
        Ok(loss)
    }

    /// Cleanup failures are logged and otherwise ignored.
    fn remove_scenario_logs(&self, platform: &PlatformHandle) {
        let entries = match fs::read_dir(platform.work_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list {}: {}", platform.work_dir().display(), e);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if self.config.is_scenario_log(&name.to_string_lossy()) {
                if let Err(e) = fs::remove_file(entry.path()) {
                    warn!("Failed to remove {}: {}", entry.path().display(), e);
                }
            }
        }
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best.lock().as_ref().map(|b| b.loss)
    }

    pub fn best_result(&self) -> Option<SimulationResult> {
        self.best.lock().as_ref().map(|b| b.result.clone())
    }

    pub fn best_candidate(&self) -> Option<Candidate> {
        self.best.lock().as_ref().map(|b| b.candidate.clone())
    }

    pub fn history(&self) -> Vec<EvaluationRecord> {
        self.history.lock().clone()
    }

    pub fn evaluations(&self) -> usize {
        self.history.lock().len()
    }
}

impl Objective for SimulationAdapter {
    fn evaluate(&self, candidate: &Candidate) -> ScResult<f64> {
        SimulationAdapter::evaluate(self, candidate)
    }
}
