//! Parameter model: domains, rendering rules, destinations and candidates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{CalibrationError, ScResult};

/// Keys of the node-hardware description understood by the platform builder.
pub const NODE_SCHEMA_KEYS: &[&str] = &[
    "cpu_core_count",
    "cpu_speed",
    "gpu_speed",
    "pcie_bw",
    "pcie_lat",
    "xbus_bw",
    "xbus_lat",
    "cpu_gpu_nvlink_bw",
    "cpu_gpu_nvlink_lat",
    "gpu_gpu_nvlink_bw",
    "gpu_gpu_nvlink_lat",
    "nvme_read_bw",
    "nvme_write_bw",
    "limiter_bw",
];

/// Describes the values a parameter may take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterDomain {
    /// Continuous uniform range [low, high].
    Linear { low: f64, high: f64 },
    /// Log-scaled range [low, high], both bounds strictly positive.
    Exponential { low: f64, high: f64 },
    /// Finite ordered set of numbers.
    Discrete { values: Vec<f64> },
    /// Finite set of literal values, rendered verbatim.
    Categorical { values: Vec<String> },
}

impl ParameterDomain {
    fn validate(&self, name: &str) -> ScResult<()> {
        let invalid = |message: String| CalibrationError::InvalidDomain {
            name: name.to_string(),
            message,
        };
        match self {
            Self::Linear { low, high } => {
                if !low.is_finite() || !high.is_finite() || low > high {
                    return Err(invalid(format!("bad linear range [{low}, {high}]")).into());
                }
            }
            Self::Exponential { low, high } => {
                if !(*low > 0.0) || !high.is_finite() || low > high {
                    return Err(invalid(format!("bad exponential range [{low}, {high}]")).into());
                }
            }
            Self::Discrete { values } => {
                if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
                    return Err(invalid("discrete set must hold finite values".into()).into());
                }
            }
            Self::Categorical { values } => {
                if values.is_empty() {
                    return Err(invalid("categorical set is empty".into()).into());
                }
            }
        }
        Ok(())
    }

    /// Number of distinct values for set domains, `None` for ranges.
    pub fn cardinality(&self) -> Option<usize> {
        match self {
            Self::Discrete { values } => Some(values.len()),
            Self::Categorical { values } => Some(values.len()),
            _ => None,
        }
    }

    /// Map a unit coordinate `t` in [0, 1] onto the domain.
    pub fn decode(&self, t: f64) -> ParameterValue {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        match self {
            Self::Linear { low, high } => ParameterValue::Float(low + t * (high - low)),
            Self::Exponential { low, high } => {
                let (log_low, log_high) = (low.ln(), high.ln());
                ParameterValue::Float((log_low + t * (log_high - log_low)).exp())
            }
            Self::Discrete { values } => ParameterValue::Float(values[bucket(t, values.len())]),
            Self::Categorical { values } => {
                ParameterValue::Text(values[bucket(t, values.len())].clone())
            }
        }
    }

    /// Unit coordinates enumerated along this axis by a grid search.
    ///
    /// Set domains yield the centre of every bucket; ranges yield `steps`
    /// evenly spaced points including both bounds.
    pub fn grid_coordinates(&self, steps: usize) -> Vec<f64> {
        match self.cardinality() {
            Some(n) => (0..n).map(|i| (i as f64 + 0.5) / n as f64).collect(),
            None => {
                let steps = steps.max(2);
                (0..steps).map(|i| i as f64 / (steps - 1) as f64).collect()
            }
        }
    }
}

fn bucket(t: f64, n: usize) -> usize {
    ((t * n as f64).floor() as usize).min(n - 1)
}

/// Where a parameter's rendered value is written when building a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Passed to the simulator runtime as `--cfg=<name>:<value>`.
    SimulatorFlag,
    /// Overrides a field of the node-hardware description.
    Node,
    /// Overrides a field of the network-topology description.
    Topology,
}

impl Destination {
    /// Destination implied by a parameter name.
    pub fn infer(name: &str) -> Self {
        if name.contains('/') {
            Self::SimulatorFlag
        } else if NODE_SCHEMA_KEYS.contains(&name) {
            Self::Node
        } else {
            Self::Topology
        }
    }
}

/// printf-style rendering rule such as `"%.2fGbps"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFormat {
    prefix: String,
    suffix: String,
    precision: Option<usize>,
    conversion: Conversion,
    uppercase: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Fixed,
    Exponent,
    Integer,
    General,
    Plain,
}

impl ValueFormat {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut spec: Option<(Option<usize>, Conversion, bool)> = None;
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            let out = if spec.is_some() { &mut suffix } else { &mut prefix };
            if c != '%' {
                out.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                out.push('%');
                continue;
            }
            if spec.is_some() {
                return Err(format!("more than one conversion in {pattern:?}"));
            }
            let mut precision = None;
            if chars.peek() == Some(&'.') {
                chars.next();
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                precision = Some(digits.parse().unwrap_or(0));
            }
            let (conversion, uppercase) = match chars.next() {
                Some(c @ ('f' | 'F')) => (Conversion::Fixed, c == 'F'),
                Some(c @ ('e' | 'E')) => (Conversion::Exponent, c == 'E'),
                Some('d' | 'i') => (Conversion::Integer, false),
                Some(c @ ('g' | 'G')) => (Conversion::General, c == 'G'),
                Some('s') => (Conversion::Plain, false),
                other => return Err(format!("unsupported conversion {other:?} in {pattern:?}")),
            };
            spec = Some((precision, conversion, uppercase));
        }

        let (precision, conversion, uppercase) =
            spec.ok_or_else(|| format!("no conversion in format {pattern:?}"))?;
        Ok(Self {
            prefix,
            suffix,
            precision,
            conversion,
            uppercase,
        })
    }

    pub fn render(&self, value: &ParameterValue) -> String {
        let body = match value {
            ParameterValue::Text(text) => text.clone(),
            ParameterValue::Int(v) => self.render_number(*v as f64),
            ParameterValue::Float(v) => self.render_number(*v),
        };
        format!("{}{}{}", self.prefix, body, self.suffix)
    }

    fn render_number(&self, v: f64) -> String {
        let precision = self.precision.unwrap_or(6);
        let text = match self.conversion {
            Conversion::Fixed => format!("{:.*}", precision, v),
            Conversion::Exponent => exponent_notation(v, precision),
            Conversion::Integer => format!("{}", v.round() as i64),
            Conversion::General => general_notation(v, precision),
            Conversion::Plain => format!("{v}"),
        };
        if self.uppercase {
            text.to_ascii_uppercase()
        } else {
            text
        }
    }
}

/// `%e`: signed exponent of at least two digits, as printf writes it.
fn exponent_notation(v: f64, precision: usize) -> String {
    let text = format!("{:.*e}", precision, v);
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
        }
        None => text,
    }
}

/// `%g`: `precision` significant digits, fixed or exponent notation
/// depending on the exponent, trailing zeros removed.
fn general_notation(v: f64, precision: usize) -> String {
    if !v.is_finite() {
        return format!("{v}");
    }
    let significant = precision.max(1);
    let exp = format!("{:.*e}", significant - 1, v)
        .split_once('e')
        .and_then(|(_, exp)| exp.parse::<i32>().ok())
        .unwrap_or(0);

    if exp < -4 || exp >= significant as i32 {
        let text = exponent_notation(v, significant - 1);
        match text.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{}", trim_fraction(mantissa), exp),
            None => text,
        }
    } else {
        let decimals = (significant as i32 - 1 - exp) as usize;
        trim_fraction(&format!("{:.*}", decimals, v)).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// A concrete parameter value produced by decoding a search point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Int(i64),
    Text(String),
}

impl ParameterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Declarative description of one calibrated parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub domain: ParameterDomain,
    /// Rendering rule applied to numeric values (e.g. `"%.2fGbps"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Explicit destination; inferred from the name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
}

impl ParameterSpec {
    pub fn new(domain: ParameterDomain) -> Self {
        Self {
            domain,
            format: None,
            destination: None,
        }
    }

    pub fn linear(low: f64, high: f64) -> Self {
        Self::new(ParameterDomain::Linear { low, high })
    }

    pub fn exponential(low: f64, high: f64) -> Self {
        Self::new(ParameterDomain::Exponential { low, high })
    }

    pub fn discrete(values: Vec<f64>) -> Self {
        Self::new(ParameterDomain::Discrete { values })
    }

    pub fn categorical<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        Self::new(ParameterDomain::Categorical {
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    /// Validate the spec and resolve its rendering rule and destination.
    pub fn resolve(&self, name: &str) -> ScResult<ResolvedParameter> {
        if name.trim().is_empty() {
            return Err(CalibrationError::InvalidDomain {
                name: name.to_string(),
                message: "parameter name is empty".into(),
            }
            .into());
        }
        self.domain.validate(name)?;
        let format = self
            .format
            .as_deref()
            .map(ValueFormat::parse)
            .transpose()
            .map_err(|message| CalibrationError::InvalidDomain {
                name: name.to_string(),
                message,
            })?;
        Ok(ResolvedParameter {
            name: name.to_string(),
            domain: self.domain.clone(),
            format,
            destination: self.destination.unwrap_or_else(|| Destination::infer(name)),
        })
    }
}

/// A named parameter spec as it appears in a parameter file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    #[serde(flatten)]
    pub spec: ParameterSpec,
}

/// A registered parameter whose format and destination were resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameter {
    pub name: String,
    pub domain: ParameterDomain,
    pub format: Option<ValueFormat>,
    pub destination: Destination,
}

impl ResolvedParameter {
    pub fn render(&self, value: &ParameterValue) -> String {
        match &self.format {
            Some(format) => format.render(value),
            None => value.to_string(),
        }
    }

    /// Decode a unit coordinate into a rendered candidate entry.
    pub fn entry(&self, t: f64) -> CandidateEntry {
        let value = self.domain.decode(t);
        CandidateEntry {
            name: self.name.clone(),
            destination: self.destination,
            rendered: self.render(&value),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntry {
    pub name: String,
    pub destination: Destination,
    pub value: ParameterValue,
    /// Value as consumed by the simulator, units applied.
    pub rendered: String,
}

/// One fully rendered parameter vector proposed for evaluation.
///
/// Fields are private: a candidate never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    entries: Vec<CandidateEntry>,
}

impl Candidate {
    pub fn new(entries: Vec<CandidateEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CandidateEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&CandidateEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn rendered(&self, name: &str) -> Option<&str> {
        self.get(name).map(|e| e.rendered.as_str())
    }

    /// Rendered values keyed by parameter name.
    pub fn to_rendered_map(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), e.rendered.clone()))
            .collect()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", entry.name, entry.rendered)?;
        }
        write!(f, "}}")
    }
}
