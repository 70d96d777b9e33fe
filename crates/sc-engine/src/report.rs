//! Calibration result artifact.

use chrono::{DateTime, Utc};
use sc_optimizer::{CalibrationOutcome, RunFailure, RunId, RunState};
use sc_types::{ScResult, SimulationResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::adapter::SimulationAdapter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub algorithm: String,
    pub state: RunState,
    /// The run configuration, as loaded.
    pub config: serde_json::Value,
    /// Parameter name to rendered value of the best candidate.
    pub calibration: BTreeMap<String, String>,
    pub loss: Option<f64>,
    pub best_result: Option<SimulationResult>,
    pub evaluations: usize,
    pub elapsed_seconds: f64,
    pub error: Option<RunFailure>,
}

impl CalibrationReport {
    pub fn new(
        outcome: &CalibrationOutcome,
        adapter: &SimulationAdapter,
        config: serde_json::Value,
    ) -> Self {
        Self {
            run_id: outcome.id,
            created_at: Utc::now(),
            algorithm: outcome.algorithm.to_string(),
            state: outcome.state(),
            config,
            calibration: outcome
                .best_candidate()
                .map(|c| c.to_rendered_map())
                .unwrap_or_default(),
            loss: outcome.best_loss(),
            best_result: adapter.best_result(),
            evaluations: outcome.evaluations(),
            elapsed_seconds: outcome.elapsed_seconds().unwrap_or(0.0),
            error: outcome.failure().cloned(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state != RunState::Failed
    }

    pub fn write(&self, path: &Path) -> ScResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Wrote calibration report to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> ScResult<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ground_truth, os_candidate, Fixture};
    use sc_optimizer::Algorithm;
    use serde_json::json;

    #[test]
    fn failed_run_report_keeps_best_and_error() {
        let fixture = Fixture::new();
        let adapter = SimulationAdapter::new(fixture.config(), ground_truth()).unwrap();

        let mut outcome = CalibrationOutcome::new(Algorithm::Grid);
        outcome.mark_searching();
        let n = outcome.open_trial(os_candidate(2.0));
        outcome.complete_trial(n, 0.25);
        outcome.finish(
            RunState::Failed,
            Some(RunFailure {
                kind: "BenchmarkFailedError".into(),
                message: "wrapper exited with 1".into(),
            }),
        );

        let report = CalibrationReport::new(&outcome, &adapter, json!({"workers": 2}));
        assert!(!report.is_success());
        assert_eq!(report.algorithm, "grid");
        assert_eq!(report.loss, Some(0.25));
        assert_eq!(report.calibration.get("smpi/os").map(String::as_str), Some("2"));
        assert_eq!(report.error.as_ref().unwrap().kind, "BenchmarkFailedError");
        assert_eq!(report.evaluations, 1);

        let path = fixture.root().join("out").join("result.json");
        report.write(&path).unwrap();
        let loaded = CalibrationReport::load(&path).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.state, RunState::Failed);
        assert_eq!(loaded.config["workers"], json!(2));
    }
}
