pub mod errors;
pub mod objective;
pub mod parameter;
pub mod scenario;

pub use errors::*;
pub use objective::*;
pub use parameter::*;
pub use scenario::*;
