pub mod ground_truth;
pub mod params;

pub use ground_truth::*;
pub use params::*;
