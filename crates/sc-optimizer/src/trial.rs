//! Trial tracking and calibration run bookkeeping.

use chrono::{DateTime, Utc};
use sc_types::{Candidate, ScError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::search::Algorithm;

/// Unique calibration run identifier.
pub type RunId = Uuid;

/// Lifecycle state for a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Configured,
    Searching,
    /// The strategy ran out of proposals.
    Converged,
    TimedOut,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged | Self::TimedOut | Self::Failed)
    }
}

/// Why a run ended in [`RunState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// Stable error kind, e.g. `PlatformBuildError`.
    pub kind: String,
    pub message: String,
}

impl From<&ScError> for RunFailure {
    fn from(err: &ScError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A single evaluation of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub number: usize,
    pub candidate: Candidate,
    pub status: TrialStatus,
    pub loss: Option<f64>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Trial {
    pub fn new(number: usize, candidate: Candidate) -> Self {
        Self {
            id: Uuid::new_v4(),
            number,
            candidate,
            status: TrialStatus::Running,
            loss: None,
            submitted_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_completed(&mut self, loss: f64) {
        self.status = TrialStatus::Completed;
        self.finished_at = Some(Utc::now());
        self.loss = Some(loss);
    }

    pub fn mark_failed(&mut self, error: &ScError) {
        self.status = if matches!(
            error,
            ScError::Calibration(sc_types::CalibrationError::Cancelled)
        ) {
            TrialStatus::Cancelled
        } else {
            TrialStatus::Failed
        };
        self.finished_at = Some(Utc::now());
        self.error = Some(error.to_string());
    }
}

/// The best trial seen so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestTrial {
    pub number: usize,
    pub loss: f64,
    pub candidate: Candidate,
}

/// Everything a calibration run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    pub id: RunId,
    pub algorithm: Algorithm,
    pub state: RunState,
    pub trials: Vec<Trial>,
    pub best: Option<BestTrial>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub failure: Option<RunFailure>,
}

impl CalibrationOutcome {
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            id: Uuid::new_v4(),
            algorithm,
            state: RunState::Configured,
            trials: Vec::new(),
            best: None,
            started_at: None,
            finished_at: None,
            failure: None,
        }
    }

    pub fn mark_searching(&mut self) {
        self.state = RunState::Searching;
        self.started_at = Some(Utc::now());
    }

    /// Record a submitted candidate and return its trial number.
    pub fn open_trial(&mut self, candidate: Candidate) -> usize {
        let number = self.trials.len();
        self.trials.push(Trial::new(number, candidate));
        number
    }

    pub fn complete_trial(&mut self, number: usize, loss: f64) {
        let Some(trial) = self.trials.get_mut(number) else {
            return;
        };
        trial.mark_completed(loss);
        let candidate = trial.candidate.clone();
        self.update_best(number, loss, candidate);
    }

    pub fn fail_trial(&mut self, number: usize, error: &ScError) {
        if let Some(trial) = self.trials.get_mut(number) {
            trial.mark_failed(error);
        }
    }

    /// Replace the best trial if `loss` is strictly lower. NaN never wins.
    pub fn update_best(&mut self, number: usize, loss: f64, candidate: Candidate) {
        if loss.is_nan() {
            return;
        }
        let improves = match &self.best {
            None => true,
            Some(best) => loss < best.loss,
        };
        if improves {
            self.best = Some(BestTrial {
                number,
                loss,
                candidate,
            });
        }
    }

    pub fn finish(&mut self, state: RunState, failure: Option<RunFailure>) {
        self.state = state;
        self.failure = failure;
        self.finished_at = Some(Utc::now());
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.loss)
    }

    pub fn best_candidate(&self) -> Option<&Candidate> {
        self.best.as_ref().map(|b| &b.candidate)
    }

    /// Number of evaluations that produced a loss.
    pub fn evaluations(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.status == TrialStatus::Completed)
            .count()
    }

    pub fn elapsed_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at.unwrap_or_else(Utc::now);
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_types::{CalibrationError, CandidateEntry, Destination, ParameterValue, SimulationError};

    fn candidate(x: f64) -> Candidate {
        Candidate::new(vec![CandidateEntry {
            name: "x".into(),
            destination: Destination::Node,
            value: ParameterValue::Float(x),
            rendered: x.to_string(),
        }])
    }

    #[test]
    fn run_lifecycle() {
        let mut run = CalibrationOutcome::new(Algorithm::Random);
        assert_eq!(run.state(), RunState::Configured);
        assert!(run.started_at.is_none());

        run.mark_searching();
        assert_eq!(run.state(), RunState::Searching);
        assert!(run.started_at.is_some());

        run.finish(RunState::Converged, None);
        assert!(run.state().is_terminal());
        assert!(run.finished_at.is_some());
        assert!(run.elapsed_seconds().unwrap() >= 0.0);
    }

    #[test]
    fn best_trial_tracks_minimum() {
        let mut run = CalibrationOutcome::new(Algorithm::Grid);
        for (i, loss) in [0.8, 0.3, 0.5, f64::NAN].into_iter().enumerate() {
            let n = run.open_trial(candidate(i as f64));
            run.complete_trial(n, loss);
        }
        assert_eq!(run.best_loss(), Some(0.3));
        assert_eq!(run.best.as_ref().unwrap().number, 1);
        assert_eq!(run.best_candidate().unwrap().rendered("x"), Some("1"));
        assert_eq!(run.evaluations(), 4);
    }

    #[test]
    fn failed_and_cancelled_trials() {
        let mut run = CalibrationOutcome::new(Algorithm::Grid);
        let a = run.open_trial(candidate(0.0));
        let b = run.open_trial(candidate(1.0));
        run.fail_trial(
            a,
            &SimulationError::PlatformBuild {
                exit_code: Some(1),
                stderr: "boom".into(),
            }
            .into(),
        );
        run.fail_trial(b, &CalibrationError::Cancelled.into());

        assert_eq!(run.trials[a].status, TrialStatus::Failed);
        assert!(run.trials[a].error.as_deref().unwrap().contains("boom"));
        assert_eq!(run.trials[b].status, TrialStatus::Cancelled);
        assert_eq!(run.evaluations(), 0);
        assert!(run.best_loss().is_none());
    }

    #[test]
    fn failure_carries_kind() {
        let err: ScError = CalibrationError::ShapeMismatch {
            simulated: 2,
            real: 3,
        }
        .into();
        let failure = RunFailure::from(&err);
        assert_eq!(failure.kind, "ShapeMismatchError");
        assert!(!failure.message.is_empty());
    }
}
