use thiserror::Error;

/// Main error type for the calibrator
#[derive(Error, Debug)]
pub enum ScError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScError {
    /// Stable taxonomy name of the error, suitable for reports and exit
    /// diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Data(e) => e.kind(),
            Self::Simulation(e) => e.kind(),
            Self::Calibration(e) => e.kind(),
            Self::Config(_) => "ConfigError",
            Self::Io(_) => "IoError",
            Self::Serialization(_) => "SerializationError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Whether the error was raised while validating configuration, i.e.
    /// before any simulation time was spent.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Data(_)
                | Self::Calibration(CalibrationError::UnknownAlgorithm { .. })
                | Self::Calibration(CalibrationError::DuplicateParameter { .. })
                | Self::Calibration(CalibrationError::UnknownParameter { .. })
                | Self::Calibration(CalibrationError::InvalidDomain { .. })
        )
    }
}

/// Ground-truth ingestion errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data source not found: {0}")]
    SourceNotFound(String),

    #[error("Missing required column: {column}")]
    MissingColumn { column: String },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Data parsing error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("No ground truth for scenario {scenario}")]
    EmptyScenario { scenario: String },
}

impl DataError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceNotFound(_) | Self::LoadingFailed { .. } => "DataSourceError",
            _ => "DataFormatError",
        }
    }
}

/// Errors raised while building a platform or running the simulator
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Platform build failed with exit code {exit_code:?}:\n{stderr}")]
    PlatformBuild {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Platform file does not exist: {path}")]
    PlatformMissing { path: String },

    #[error("Benchmark {benchmark} failed with exit code {exit_code:?}:\n{stderr}")]
    BenchmarkFailed {
        benchmark: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to launch {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Invalid platform description: {message}")]
    InvalidDescription { message: String },
}

impl SimulationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlatformBuild { .. } => "PlatformBuildError",
            Self::PlatformMissing { .. } => "PlatformMissingError",
            Self::BenchmarkFailed { .. } => "BenchmarkFailedError",
            Self::Spawn { .. } => "SpawnError",
            Self::InvalidDescription { .. } => "PlatformDescriptionError",
        }
    }
}

/// Errors raised by the search loop and its configuration
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Unknown calibration algorithm: {name}")]
    UnknownAlgorithm { name: String },

    #[error("Parameter already registered: {name}")]
    DuplicateParameter { name: String },

    #[error("Parameter has no field in the platform templates: {name}")]
    UnknownParameter { name: String },

    #[error("Invalid domain for parameter {name}: {message}")]
    InvalidDomain { name: String, message: String },

    #[error("Shape mismatch: simulated has {simulated} points, real has {real}")]
    ShapeMismatch { simulated: usize, real: usize },

    #[error("Worker panicked: {message}")]
    WorkerPanicked { message: String },

    #[error("Evaluation cancelled before it started")]
    Cancelled,
}

impl CalibrationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownAlgorithm { .. } => "UnknownAlgorithmError",
            Self::DuplicateParameter { .. } => "DuplicateParameterError",
            Self::UnknownParameter { .. } => "UnknownParameterError",
            Self::InvalidDomain { .. } => "InvalidDomainError",
            Self::ShapeMismatch { .. } => "ShapeMismatchError",
            Self::WorkerPanicked { .. } => "WorkerPanicError",
            Self::Cancelled => "CancelledError",
        }
    }
}

/// Result type alias for calibrator operations
pub type ScResult<T> = Result<T, ScError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::ScError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::ScError::Config(format!($($arg)*))
    };
}
