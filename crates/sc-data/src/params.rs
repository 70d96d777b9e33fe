//! Declarative parameter files.
//!
//! ```json
//! {
//!   "parameters": [
//!     {"name": "pcie_bw", "domain": {"linear": {"low": 10, "high": 200}}, "format": "%.2fGbps"},
//!     {"name": "smpi/os", "domain": {"exponential": {"low": 1e-7, "high": 1e-4}}},
//!     {"name": "sharing_policy", "domain": {"categorical": {"values": ["SHARED", "FATPIPE"]}}}
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use sc_types::{CalibrationError, DataError, ParameterDef, ScResult};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterFile {
    pub parameters: Vec<ParameterDef>,
}

impl ParameterFile {
    pub fn load<P: AsRef<Path>>(path: P) -> ScResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DataError::SourceNotFound(path.display().to_string()).into());
        }
        let text = std::fs::read_to_string(path)?;
        let file = Self::parse(&text)?;
        info!(
            "Loaded {} parameter definitions from {}",
            file.parameters.len(),
            path.display()
        );
        Ok(file)
    }

    /// Parse and validate a parameter document.
    pub fn parse(text: &str) -> ScResult<Self> {
        let file: Self = serde_json::from_str(text)?;
        file.validate()?;
        Ok(file)
    }

    /// Every spec must resolve and every name must be unique.
    pub fn validate(&self) -> ScResult<()> {
        let mut seen = HashSet::new();
        for def in &self.parameters {
            def.spec.resolve(&def.name)?;
            if !seen.insert(def.name.as_str()) {
                return Err(CalibrationError::DuplicateParameter {
                    name: def.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}
