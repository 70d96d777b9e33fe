//! The shared search loop.

use crossbeam_channel::Select;
use sc_types::{config_error, CalibrationError, Objective, ParameterDef, ParameterSpec, ScError, ScResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::coordinator::{Coordinator, EvaluationHandle};
use crate::search::{Algorithm, SearchStrategy, StrategyOptions};
use crate::space::{Point, SearchSpace};
use crate::trial::{CalibrationOutcome, RunFailure, RunState};

struct InFlight {
    handle: EvaluationHandle,
    point: Point,
    trial: usize,
}

/// Searches a parameter space for the candidate with the lowest loss.
pub struct Calibrator {
    algorithm: String,
    objective: Arc<dyn Objective>,
    space: SearchSpace,
    options: StrategyOptions,
}

impl Calibrator {
    pub fn new(algorithm: impl Into<String>, objective: Arc<dyn Objective>) -> Self {
        Self {
            algorithm: algorithm.into(),
            objective,
            space: SearchSpace::new(),
            options: StrategyOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StrategyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn add_param(&mut self, name: &str, spec: ParameterSpec) -> ScResult<()> {
        self.space.add(name, &spec)
    }

    pub fn add_params<'a>(&mut self, defs: impl IntoIterator<Item = &'a ParameterDef>) -> ScResult<()> {
        for def in defs {
            self.space.add(&def.name, &def.spec)?;
        }
        Ok(())
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn options(&self) -> &StrategyOptions {
        &self.options
    }

    /// Run the search until the strategy is exhausted, the deadline passes,
    /// or an evaluation fails.
    ///
    /// Configuration problems are returned as errors before anything is
    /// evaluated. Evaluation failures end the run in [`RunState::Failed`]
    /// and are reported through the outcome, alongside the best candidate
    /// found until then.
    pub fn compute_calibration(
        &self,
        time_limit: Duration,
        worker_count: usize,
    ) -> ScResult<CalibrationOutcome> {
        let algorithm: Algorithm = self.algorithm.parse()?;
        if self.space.is_empty() {
            return Err(config_error!("no parameters registered"));
        }
        if worker_count == 0 {
            return Err(config_error!("worker count must be at least 1"));
        }

        let mut outcome = CalibrationOutcome::new(algorithm);
        outcome.mark_searching();
        info!(
            "Starting {} calibration of {} parameters with {} workers for {:?}",
            algorithm,
            self.space.dimensions(),
            worker_count,
            time_limit
        );

        if time_limit.is_zero() {
            outcome.finish(RunState::TimedOut, None);
            return Ok(outcome);
        }

        let strategy = algorithm.build(&self.space, &self.options);
        let coordinator = Coordinator::new(worker_count)?;
        // A budget too large to represent as an instant has no deadline.
        let deadline = Instant::now().checked_add(time_limit);

        let state = self.search(strategy, &coordinator, deadline, &mut outcome);
        coordinator.shutdown();

        let (state, failure) = match state {
            Ok(state) => (state, None),
            Err(err) => (RunState::Failed, Some(RunFailure::from(&err))),
        };
        outcome.finish(state, failure);

        match outcome.best_loss() {
            Some(loss) => info!(
                "Calibration {:?} after {} evaluations, best loss {:.6}",
                outcome.state(),
                outcome.evaluations(),
                loss
            ),
            None => info!(
                "Calibration {:?} after {} evaluations without a loss",
                outcome.state(),
                outcome.evaluations()
            ),
        }
        Ok(outcome)
    }

    /// Dispatch, wait on any in-flight evaluation, report, repeat.
    /// Returns the terminal state, or the first fatal evaluation error.
    fn search(
        &self,
        mut strategy: Box<dyn SearchStrategy>,
        coordinator: &Coordinator,
        deadline: Option<Instant>,
        outcome: &mut CalibrationOutcome,
    ) -> Result<RunState, ScError> {
        let workers = coordinator.size();
        let mut in_flight: Vec<InFlight> = Vec::with_capacity(workers);
        let mut failure: Option<ScError> = None;
        let mut exhausted = false;

        loop {
            let dispatching = failure.is_none()
                && !exhausted
                && deadline.map_or(true, |deadline| Instant::now() < deadline);

            if dispatching && in_flight.len() < workers {
                let points = if strategy.is_exhausted() {
                    Vec::new()
                } else {
                    strategy.suggest(workers - in_flight.len())
                };
                if points.is_empty() && in_flight.is_empty() {
                    debug!("{} has nothing left to propose", strategy.name());
                    exhausted = true;
                }
                for point in points {
                    let candidate = self.space.candidate(&point);
                    let trial = outcome.open_trial(candidate.clone());
                    match coordinator.submit(Arc::clone(&self.objective), candidate) {
                        Ok(handle) => in_flight.push(InFlight {
                            handle,
                            point,
                            trial,
                        }),
                        Err(err) => {
                            outcome.fail_trial(trial, &err);
                            failure = Some(err);
                            break;
                        }
                    }
                }
            }

            if in_flight.is_empty() {
                if dispatching && failure.is_none() && !exhausted {
                    continue;
                }
                break;
            }

            let Some((index, result)) = wait_any(&in_flight, deadline.filter(|_| dispatching))
            else {
                continue;
            };
            let done = in_flight.swap_remove(index);

            match result {
                Ok(loss) => {
                    let previous = outcome.best_loss();
                    outcome.complete_trial(done.trial, loss);
                    strategy.report(&done.point, loss);
                    if outcome.best_loss() != previous {
                        info!("New best loss {:.6} at trial {}", loss, done.trial);
                    } else {
                        debug!("trial {} loss {:.6}", done.trial, loss);
                    }
                }
                Err(err) => {
                    outcome.fail_trial(done.trial, &err);
                    if !matches!(err, ScError::Calibration(CalibrationError::Cancelled))
                        && failure.is_none()
                    {
                        error!("Evaluation of trial {} failed: {}", done.trial, err);
                        failure = Some(err);
                    }
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None if exhausted => Ok(RunState::Converged),
            None => Ok(RunState::TimedOut),
        }
    }
}

/// Block until one in-flight evaluation completes, or `deadline` passes.
fn wait_any(in_flight: &[InFlight], deadline: Option<Instant>) -> Option<(usize, ScResult<f64>)> {
    let mut select = Select::new();
    for job in in_flight {
        select.recv(job.handle.receiver());
    }
    let operation = match deadline {
        Some(deadline) => select.select_deadline(deadline).ok()?,
        None => select.select(),
    };
    let index = operation.index();
    let result = operation
        .recv(in_flight[index].handle.receiver())
        .unwrap_or_else(|_| Err(sc_types::internal_error!("evaluation worker went away")));
    Some((index, result))
}
