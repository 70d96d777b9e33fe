//! Comparison scenarios, their ground truth and simulated results.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{CalibrationError, DataError, ScResult};

/// Identifies a benchmark configuration in the ground-truth dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScenarioKey {
    pub benchmark: String,
    pub node_count: u32,
    pub processes: u32,
}

impl fmt::Display for ScenarioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[nodes={}, procs={}]",
            self.benchmark, self.node_count, self.processes
        )
    }
}

/// One empirical/simulated comparison unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub key: ScenarioKey,
    /// Message sizes in ascending order.
    pub byte_sizes: Vec<u64>,
}

impl Scenario {
    pub fn new(key: ScenarioKey, byte_sizes: Vec<u64>) -> Self {
        Self { key, byte_sizes }
    }

    pub fn benchmark(&self) -> &str {
        &self.key.benchmark
    }

    /// Byte sizes joined by commas, as passed to the benchmark wrapper.
    pub fn byte_sizes_csv(&self) -> String {
        self.byte_sizes
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} x{} sizes", self.key, self.byte_sizes.len())
    }
}

/// Empirical replicates for one scenario, aligned by byte size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthPoint {
    replicates: Vec<Vec<f64>>,
}

impl GroundTruthPoint {
    /// Every replicate must hold exactly `width` values.
    pub fn new(width: usize, replicates: Vec<Vec<f64>>) -> ScResult<Self> {
        if replicates.is_empty() {
            return Err(DataError::InvalidFormat {
                message: "ground truth point has no replicates".into(),
            }
            .into());
        }
        if let Some(bad) = replicates.iter().find(|r| r.len() != width) {
            return Err(DataError::InvalidFormat {
                message: format!(
                    "replicate has {} values, expected {}",
                    bad.len(),
                    width
                ),
            }
            .into());
        }
        Ok(Self { replicates })
    }

    pub fn replicates(&self) -> &[Vec<f64>] {
        &self.replicates
    }

    pub fn width(&self) -> usize {
        self.replicates[0].len()
    }

    /// Values of every replicate at byte-size index `i`.
    pub fn column(&self, i: usize) -> Vec<f64> {
        self.replicates.iter().map(|r| r[i]).collect()
    }
}

/// The scenarios a calibration scores against, with their ground truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthSet {
    entries: Vec<(Scenario, GroundTruthPoint)>,
}

impl GroundTruthSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scenario: Scenario, point: GroundTruthPoint) -> ScResult<()> {
        if point.width() != scenario.byte_sizes.len() {
            return Err(CalibrationError::ShapeMismatch {
                simulated: scenario.byte_sizes.len(),
                real: point.width(),
            }
            .into());
        }
        self.entries.push((scenario, point));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.entries.iter().map(|(s, _)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Scenario, GroundTruthPoint)> {
        self.entries.iter()
    }

    /// Replicate values per comparison point, scenarios then byte sizes.
    pub fn comparison_points(&self) -> Vec<Vec<f64>> {
        self.entries
            .iter()
            .flat_map(|(_, point)| (0..point.width()).map(move |i| point.column(i)))
            .collect()
    }
}

/// Simulated values for every scenario of a ground-truth set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub per_scenario: Vec<Vec<f64>>,
}

impl SimulationResult {
    /// Simulated values per comparison point, scenarios then byte sizes.
    pub fn flatten(&self) -> Vec<f64> {
        self.per_scenario.iter().flatten().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(benchmark: &str) -> ScenarioKey {
        ScenarioKey {
            benchmark: benchmark.into(),
            node_count: 2,
            processes: 2,
        }
    }

    #[test]
    fn point_rejects_ragged_replicates() {
        assert!(GroundTruthPoint::new(2, vec![vec![1.0, 2.0], vec![1.0]]).is_err());
        assert!(GroundTruthPoint::new(2, vec![]).is_err());
    }

    #[test]
    fn point_columns() {
        let point = GroundTruthPoint::new(2, vec![vec![1.0, 10.0], vec![3.0, 30.0]]).unwrap();
        assert_eq!(point.column(1), vec![10.0, 30.0]);
    }

    #[test]
    fn set_flattens_by_scenario_then_size() {
        let mut set = GroundTruthSet::new();
        set.push(
            Scenario::new(key("PingPong"), vec![0, 8]),
            GroundTruthPoint::new(2, vec![vec![1.0, 2.0], vec![1.5, 2.5]]).unwrap(),
        )
        .unwrap();
        set.push(
            Scenario::new(key("PingPing"), vec![4]),
            GroundTruthPoint::new(1, vec![vec![7.0]]).unwrap(),
        )
        .unwrap();

        assert_eq!(
            set.comparison_points(),
            vec![vec![1.0, 1.5], vec![2.0, 2.5], vec![7.0]]
        );

        let result = SimulationResult {
            per_scenario: vec![vec![1.0, 2.0], vec![7.0]],
        };
        assert_eq!(result.flatten().len(), set.comparison_points().len());
    }

    #[test]
    fn set_rejects_width_mismatch() {
        let mut set = GroundTruthSet::new();
        let err = set
            .push(
                Scenario::new(key("PingPong"), vec![0, 8, 16]),
                GroundTruthPoint::new(2, vec![vec![1.0, 2.0]]).unwrap(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "ShapeMismatchError");
    }

    #[test]
    fn byte_sizes_csv() {
        let scenario = Scenario::new(key("Birandom"), vec![0, 1, 1024]);
        assert_eq!(scenario.byte_sizes_csv(), "0,1,1024");
    }
}
