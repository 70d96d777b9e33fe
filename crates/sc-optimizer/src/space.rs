//! The calibrated parameter space.

use sc_types::{Candidate, CalibrationError, ParameterSpec, ResolvedParameter, ScResult};

/// A search point: one unit coordinate in [0, 1] per registered parameter.
pub type Point = Vec<f64>;

/// Ordered, named, bounded parameters.
///
/// Strategies work on unit points; the space decodes them into rendered
/// candidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSpace {
    parameters: Vec<ResolvedParameter>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter. Names must be unique.
    pub fn add(&mut self, name: &str, spec: &ParameterSpec) -> ScResult<()> {
        if self.parameters.iter().any(|p| p.name == name) {
            return Err(CalibrationError::DuplicateParameter {
                name: name.to_string(),
            }
            .into());
        }
        self.parameters.push(spec.resolve(name)?);
        Ok(())
    }

    pub fn parameters(&self) -> &[ResolvedParameter] {
        &self.parameters
    }

    pub fn dimensions(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Render a unit point into a candidate.
    pub fn candidate(&self, point: &[f64]) -> Candidate {
        Candidate::new(
            self.parameters
                .iter()
                .zip(point.iter().copied().chain(std::iter::repeat(0.0)))
                .map(|(param, t)| param.entry(t))
                .collect(),
        )
    }

    /// Per-axis unit coordinates enumerated by a grid search.
    pub fn grid_axes(&self, steps: usize) -> Vec<Vec<f64>> {
        self.parameters
            .iter()
            .map(|p| p.domain.grid_coordinates(steps))
            .collect()
    }

    /// Total number of grid points, `None` on overflow.
    pub fn grid_size(&self, steps: usize) -> Option<usize> {
        self.grid_axes(steps)
            .iter()
            .try_fold(1usize, |total, axis| total.checked_mul(axis.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> SearchSpace {
        let mut space = SearchSpace::new();
        space
            .add("bandwidth", &ParameterSpec::linear(10.0, 20.0).with_format("%.1fGBps"))
            .unwrap();
        space
            .add("levels", &ParameterSpec::discrete(vec![2.0, 3.0, 4.0]))
            .unwrap();
        space
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut space = sample_space();
        let err = space
            .add("bandwidth", &ParameterSpec::linear(0.0, 1.0))
            .unwrap_err();
        assert_eq!(err.kind(), "DuplicateParameterError");
        assert_eq!(space.dimensions(), 2);
    }

    #[test]
    fn candidate_decodes_every_axis() {
        let space = sample_space();
        let candidate = space.candidate(&[0.5, 0.99]);
        assert_eq!(candidate.rendered("bandwidth"), Some("15.0GBps"));
        assert_eq!(candidate.rendered("levels"), Some("4"));
    }

    #[test]
    fn grid_size_counts_axes() {
        let space = sample_space();
        assert_eq!(space.grid_size(5), Some(15));
        assert_eq!(space.grid_axes(5)[1].len(), 3);
    }
}
