use crate::errors::ScResult;
use crate::parameter::Candidate;

/// Something that turns a candidate into a scalar loss (lower is better).
///
/// Implementations are shared across worker threads and may be called
/// concurrently with different candidates.
pub trait Objective: Send + Sync {
    fn evaluate(&self, candidate: &Candidate) -> ScResult<f64>;
}

impl<F> Objective for F
where
    F: Fn(&Candidate) -> ScResult<f64> + Send + Sync,
{
    fn evaluate(&self, candidate: &Candidate) -> ScResult<f64> {
        self(candidate)
    }
}
