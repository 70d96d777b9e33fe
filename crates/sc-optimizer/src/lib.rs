//! # sc-optimizer
//!
//! Parameter search for simulator calibration.
//!
//! Provides the search space, the search strategies (grid, random, gradient
//! descent, Bayesian optimization), trial tracking, the evaluation worker
//! pool, and the calibrator that ties them together under a deadline.

mod calibrator;
mod coordinator;
mod search;
mod space;
mod trial;

pub use calibrator::Calibrator;
pub use coordinator::{Coordinator, EvaluationHandle};
pub use search::{
    Algorithm, BayesianOptimization, GradientDescent, GridSearch, RandomSearch, SearchStrategy,
    StrategyOptions,
};
pub use space::{Point, SearchSpace};
pub use trial::{BestTrial, CalibrationOutcome, RunFailure, RunId, RunState, Trial, TrialStatus};
