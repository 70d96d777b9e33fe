//! Discrepancy between simulated and measured performance.

use sc_types::{CalibrationError, ScResult};
use serde::{Deserialize, Serialize};

/// How per-point losses are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Mean,
    Max,
}

/// How deviations inside one point are accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    /// Sum of absolute deviations.
    #[default]
    Absolute,
    /// Square root of the summed squared deviations, applied to numerator
    /// and denominator separately.
    Euclidean,
}

/// Explained-variance style loss.
///
/// For each comparison point, the deviation of the simulated value from every
/// replicate is divided by the spread of the replicates around their mean, so
/// a simulation that is as close to the measurements as the measurements are
/// to each other scores about 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LossFunction {
    pub aggregation: Aggregation,
    pub distance: Distance,
}

impl LossFunction {
    pub fn new(aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            distance: Distance::Absolute,
        }
    }

    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    /// Score `simulated[i]` against the replicate values `real[i]`.
    pub fn score(&self, simulated: &[f64], real: &[Vec<f64>]) -> ScResult<f64> {
        if simulated.len() != real.len() {
            return Err(CalibrationError::ShapeMismatch {
                simulated: simulated.len(),
                real: real.len(),
            }
            .into());
        }
        if simulated.is_empty() {
            return Ok(0.0);
        }

        let losses = simulated
            .iter()
            .zip(real)
            .map(|(&s, replicates)| self.point_loss(s, replicates));

        Ok(match self.aggregation {
            Aggregation::Mean => losses.sum::<f64>() / simulated.len() as f64,
            Aggregation::Max => losses.fold(f64::NEG_INFINITY, f64::max),
        })
    }

    fn point_loss(&self, simulated: f64, replicates: &[f64]) -> f64 {
        if replicates.is_empty() {
            return 0.0;
        }
        let mean = replicates.iter().sum::<f64>() / replicates.len() as f64;
        let (numerator, denominator) = match self.distance {
            Distance::Absolute => (
                replicates.iter().map(|r| (simulated - r).abs()).sum::<f64>(),
                replicates.iter().map(|r| (r - mean).abs()).sum::<f64>(),
            ),
            Distance::Euclidean => (
                replicates
                    .iter()
                    .map(|r| (simulated - r).powi(2))
                    .sum::<f64>()
                    .sqrt(),
                replicates
                    .iter()
                    .map(|r| (r - mean).powi(2))
                    .sum::<f64>()
                    .sqrt(),
            ),
        };
        let denominator = if denominator == 0.0 { 1.0 } else { denominator };
        numerator / denominator
    }
}
