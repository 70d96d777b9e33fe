//! Search strategies.
//!
//! Every strategy proposes unit points and learns from the losses reported
//! back for them; the calibrator turns points into candidates through the
//! [`SearchSpace`].

use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sc_types::{CalibrationError, ScError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::space::{Point, SearchSpace};

/// Common trait for all search strategies.
pub trait SearchStrategy: Send {
    /// Propose up to `count` points. May return fewer, or none while the
    /// strategy waits for reports.
    fn suggest(&mut self, count: usize) -> Vec<Point>;

    /// Report the loss observed for a previously suggested point.
    fn report(&mut self, _point: &[f64], _loss: f64) {}

    /// True once the strategy has nothing left to propose.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// The search algorithms a calibrator can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    Grid,
    Random,
    GradientDescent,
    BayesianOptimization,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Random => "random",
            Self::GradientDescent => "gradient-descent",
            Self::BayesianOptimization => "bayesian-optimization",
        }
    }

    /// Instantiate the strategy over `space`.
    pub fn build(&self, space: &SearchSpace, options: &StrategyOptions) -> Box<dyn SearchStrategy> {
        match self {
            Self::Grid => Box::new(GridSearch::new(space, options.grid_steps)),
            Self::Random => Box::new(RandomSearch::new(space.dimensions(), options.seed)),
            Self::GradientDescent => Box::new(
                GradientDescent::new(
                    space.dimensions(),
                    options.step,
                    options.learning_rate,
                    options.seed,
                )
                .with_adaptive_rate(options.adaptive_rate),
            ),
            Self::BayesianOptimization => Box::new(BayesianOptimization::new(
                space.dimensions(),
                options.exploration_weight,
                options.seed,
            )),
        }
    }
}

impl FromStr for Algorithm {
    type Err = ScError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grid" => Ok(Self::Grid),
            "random" => Ok(Self::Random),
            "gradient-descent" | "gradient_descent" | "gradient" => Ok(Self::GradientDescent),
            "bayesian-optimization" | "bayesian_optimization" | "bayesian" => {
                Ok(Self::BayesianOptimization)
            }
            _ => Err(CalibrationError::UnknownAlgorithm {
                name: s.to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning knobs shared by the strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyOptions {
    /// Number of points per continuous axis for grid search.
    pub grid_steps: usize,
    /// Finite-difference step in unit coordinates (gradient descent).
    pub step: f64,
    /// Distance moved per iteration in unit coordinates (gradient descent).
    pub learning_rate: f64,
    /// Halve the learning rate on a stalled iteration instead of restarting
    /// right away (gradient descent).
    pub adaptive_rate: bool,
    /// Probability of a purely random proposal (Bayesian optimization).
    pub exploration_weight: f64,
    /// Seed for reproducible runs; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            grid_steps: 5,
            step: 0.01,
            learning_rate: 0.1,
            adaptive_rate: false,
            exploration_weight: 0.1,
            seed: None,
        }
    }
}

fn make_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn random_point(rng: &mut ChaCha8Rng, dims: usize) -> Point {
    (0..dims).map(|_| rng.gen::<f64>()).collect()
}

// ---- Grid search ----

/// Exhaustive grid enumeration, generated lazily.
#[derive(Debug, Clone)]
pub struct GridSearch {
    axes: Vec<Vec<f64>>,
    total: usize,
    cursor: usize,
}

impl GridSearch {
    pub fn new(space: &SearchSpace, steps: usize) -> Self {
        let axes = space.grid_axes(steps);
        let total = space.grid_size(steps).unwrap_or(usize::MAX);
        Self {
            axes,
            total,
            cursor: 0,
        }
    }

    /// Mixed-radix decoding; the last axis varies fastest.
    fn point_at(&self, mut index: usize) -> Point {
        let mut point = vec![0.0; self.axes.len()];
        for (d, axis) in self.axes.iter().enumerate().rev() {
            point[d] = axis[index % axis.len()];
            index /= axis.len();
        }
        point
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

impl SearchStrategy for GridSearch {
    fn suggest(&mut self, count: usize) -> Vec<Point> {
        let end = self.cursor.saturating_add(count).min(self.total);
        let batch = (self.cursor..end).map(|i| self.point_at(i)).collect();
        self.cursor = end;
        batch
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.total
    }

    fn name(&self) -> &str {
        "grid"
    }
}

// ---- Random search ----

/// Independent uniform sampling of the unit hypercube.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    dims: usize,
    rng: ChaCha8Rng,
}

impl RandomSearch {
    pub fn new(dims: usize, seed: Option<u64>) -> Self {
        Self {
            dims,
            rng: make_rng(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<Point> {
        (0..count)
            .map(|_| random_point(&mut self.rng, self.dims))
            .collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Gradient descent ----

/// Forward-difference gradient descent with random restarts.
///
/// Each iteration evaluates the base point and one probe per dimension as a
/// single batch, then moves `learning_rate` along the normalized negative
/// gradient. When the base loss fails to improve the descent restarts from a
/// random point. With an adaptive rate it first halves the rate instead, and
/// restarts once the rate falls below `step`.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    dims: usize,
    step: f64,
    learning_rate: f64,
    adaptive_rate: bool,
    rate: f64,
    rng: ChaCha8Rng,
    base: Option<Point>,
    last_base_loss: Option<f64>,
    batch: Vec<(Point, f64, Option<f64>)>,
    issued: usize,
}

impl GradientDescent {
    pub fn new(dims: usize, step: f64, learning_rate: f64, seed: Option<u64>) -> Self {
        let step = if step > 0.0 { step.min(0.5) } else { 0.01 };
        let learning_rate = if learning_rate > 0.0 { learning_rate } else { 0.1 };
        Self {
            dims,
            step,
            learning_rate,
            adaptive_rate: false,
            rate: learning_rate,
            rng: make_rng(seed),
            base: None,
            last_base_loss: None,
            batch: Vec::new(),
            issued: 0,
        }
    }

    pub fn with_adaptive_rate(mut self, adaptive: bool) -> Self {
        self.adaptive_rate = adaptive;
        self
    }

    /// Base point followed by one probe per dimension. Probes step backwards
    /// at the upper bound; the signed step is kept alongside.
    fn start_iteration(&mut self) {
        let base = match self.base.clone() {
            Some(base) => base,
            None => {
                self.last_base_loss = None;
                self.rate = self.learning_rate;
                random_point(&mut self.rng, self.dims)
            }
        };
        let mut batch = vec![(base.clone(), 0.0, None)];
        for d in 0..self.dims {
            let mut probe = base.clone();
            let h = if base[d] + self.step <= 1.0 {
                self.step
            } else {
                -self.step
            };
            probe[d] += h;
            batch.push((probe, h, None));
        }
        self.base = Some(base);
        self.batch = batch;
        self.issued = 0;
    }

    fn finish_iteration(&mut self) {
        let losses: Vec<f64> = self
            .batch
            .iter()
            .map(|(_, _, loss)| loss.unwrap_or(f64::INFINITY))
            .collect();
        let base_loss = losses[0];
        let Some(base) = self.base.clone() else {
            return;
        };

        if !base_loss.is_finite() {
            self.base = None;
            return;
        }
        let stalled = self
            .last_base_loss
            .map_or(false, |previous| base_loss >= previous);
        if stalled && self.adaptive_rate {
            self.rate /= 2.0;
        }
        self.last_base_loss = Some(self.last_base_loss.map_or(base_loss, |p| p.min(base_loss)));

        let gradient: Vec<f64> = self.batch[1..]
            .iter()
            .zip(&losses[1..])
            .map(|((_, h, _), loss)| {
                if loss.is_finite() {
                    (loss - base_loss) / h
                } else {
                    0.0
                }
            })
            .collect();
        let norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();

        let give_up = if self.adaptive_rate {
            self.rate < self.step
        } else {
            stalled
        };
        if norm <= f64::EPSILON || give_up {
            debug!("gradient descent restarting (norm={:.3e}, rate={:.3e})", norm, self.rate);
            self.base = None;
            return;
        }

        let next = base
            .iter()
            .zip(&gradient)
            .map(|(x, g)| (x - self.rate * g / norm).clamp(0.0, 1.0))
            .collect();
        self.base = Some(next);
    }
}

impl SearchStrategy for GradientDescent {
    fn suggest(&mut self, count: usize) -> Vec<Point> {
        if self.batch.is_empty() {
            self.start_iteration();
        }
        let end = (self.issued + count).min(self.batch.len());
        let points = self.batch[self.issued..end]
            .iter()
            .map(|(p, _, _)| p.clone())
            .collect();
        self.issued = end;
        points
    }

    fn report(&mut self, point: &[f64], loss: f64) {
        if let Some(slot) = self
            .batch
            .iter_mut()
            .find(|(p, _, l)| l.is_none() && p.as_slice() == point)
        {
            slot.2 = Some(if loss.is_nan() { f64::INFINITY } else { loss });
        }
        if !self.batch.is_empty() && self.batch.iter().all(|(_, _, l)| l.is_some()) {
            self.finish_iteration();
            self.batch.clear();
        }
    }

    fn name(&self) -> &str {
        "gradient-descent"
    }
}

// ---- Bayesian optimization ----

/// Bayesian optimization over a Gaussian-process surrogate.
///
/// Starts with a random design, then proposes the points of a random pool
/// with the highest expected improvement. With probability
/// `exploration_weight` a proposal is purely random instead.
#[derive(Debug, Clone)]
pub struct BayesianOptimization {
    dims: usize,
    rng: ChaCha8Rng,
    observations: Vec<(Point, f64)>,
    exploration_weight: f64,
    initial_samples: usize,
    pool_size: usize,
    window: usize,
    length_scale: f64,
}

impl BayesianOptimization {
    pub fn new(dims: usize, exploration_weight: f64, seed: Option<u64>) -> Self {
        Self {
            dims,
            rng: make_rng(seed),
            observations: Vec::new(),
            exploration_weight: exploration_weight.clamp(0.0, 1.0),
            initial_samples: (2 * dims).max(5),
            pool_size: 256,
            window: 200,
            length_scale: 0.25,
        }
    }

    pub fn observations(&self) -> &[(Point, f64)] {
        &self.observations
    }

    /// Fit the surrogate on the best `window` observations.
    fn surrogate(&self) -> Option<GaussianProcess> {
        let mut finite: Vec<&(Point, f64)> = self
            .observations
            .iter()
            .filter(|(_, y)| y.is_finite())
            .collect();
        if finite.len() < 2 {
            return None;
        }
        finite.sort_by(|a, b| a.1.total_cmp(&b.1));
        finite.truncate(self.window);
        let points: Vec<Point> = finite.iter().map(|(p, _)| p.clone()).collect();
        let values: Vec<f64> = finite.iter().map(|(_, y)| *y).collect();
        GaussianProcess::fit(points, &values, self.length_scale, 1e-6)
    }
}

impl SearchStrategy for BayesianOptimization {
    fn suggest(&mut self, count: usize) -> Vec<Point> {
        let mut proposals: Vec<Point> = Vec::with_capacity(count);
        let model = if self.observations.len() >= self.initial_samples {
            self.surrogate()
        } else {
            None
        };

        let mut ranked: Vec<(f64, Point)> = Vec::new();
        if let Some(gp) = &model {
            ranked = (0..self.pool_size)
                .map(|_| {
                    let p = random_point(&mut self.rng, self.dims);
                    (gp.expected_improvement(&p), p)
                })
                .collect();
            ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        }
        let mut ranked = ranked.into_iter();

        for _ in 0..count {
            let explore = self.rng.gen::<f64>() < self.exploration_weight;
            let point = match (&model, explore) {
                (Some(_), false) => ranked
                    .next()
                    .map(|(_, p)| p)
                    .unwrap_or_else(|| random_point(&mut self.rng, self.dims)),
                _ => random_point(&mut self.rng, self.dims),
            };
            proposals.push(point);
        }
        proposals
    }

    fn report(&mut self, point: &[f64], loss: f64) {
        self.observations.push((point.to_vec(), loss));
    }

    fn name(&self) -> &str {
        "bayesian-optimization"
    }
}

/// Zero-mean GP with an RBF kernel on standardized targets.
struct GaussianProcess {
    points: Vec<Point>,
    chol_l: DMatrix<f64>,
    alpha: DVector<f64>,
    best: f64,
    length_scale: f64,
}

impl GaussianProcess {
    fn fit(points: Vec<Point>, values: &[f64], length_scale: f64, noise: f64) -> Option<Self> {
        let n = points.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let var = values.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n as f64;
        let std = if var > 0.0 { var.sqrt() } else { 1.0 };
        let y = DVector::from_iterator(n, values.iter().map(|v| (v - mean) / std));

        let k = DMatrix::from_fn(n, n, |i, j| {
            rbf(&points[i], &points[j], length_scale) + if i == j { noise } else { 0.0 }
        });
        let chol = k.cholesky()?;
        let alpha = chol.solve(&y);
        let best = y.iter().copied().fold(f64::INFINITY, f64::min);
        Some(Self {
            points,
            chol_l: chol.l(),
            alpha,
            best,
            length_scale,
        })
    }

    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_iterator(
            self.points.len(),
            self.points.iter().map(|p| rbf(p, x, self.length_scale)),
        );
        let mean = k_star.dot(&self.alpha);
        let var = match self.chol_l.solve_lower_triangular(&k_star) {
            Some(v) => (1.0 - v.dot(&v)).max(0.0),
            None => 1.0,
        };
        (mean, var.sqrt())
    }

    /// Expected improvement below the best standardized observation.
    fn expected_improvement(&self, x: &[f64]) -> f64 {
        let (mean, sigma) = self.predict(x);
        let improvement = self.best - mean - 0.01;
        if sigma <= 1e-12 {
            return improvement.max(0.0);
        }
        let z = improvement / sigma;
        improvement * normal_cdf(z) + sigma * normal_pdf(z)
    }
}

fn rbf(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-d2 / (2.0 * length_scale * length_scale)).exp()
}

fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}
