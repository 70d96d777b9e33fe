//! Benchmark execution against a compiled platform.

use sc_types::{CalibrationError, Scenario, ScResult, SimulationError};
use std::process::Command;
use tracing::{debug, warn};

use crate::config::{SamplingMode, SimulatorConfig};
use crate::platform::{absolutize, PlatformHandle};

/// Runs below this count never stop early.
const MIN_SAMPLES: u32 = 10;

/// Stopping rule for repeated benchmark measurements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingRule {
    /// Negative disables early stopping.
    pub threshold: f64,
}

impl SamplingRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn need_more_samples(&self, count: u32, iteration_cap: u32, relative_stderr: f64) -> bool {
        count < iteration_cap
            && (count < MIN_SAMPLES
                || self.threshold < 0.0
                || count < 2
                || relative_stderr >= self.threshold)
    }
}

/// Standard error of the mean relative to the mean.
fn relative_stderr(samples: &[f64]) -> f64 {
    let n = samples.len() as f64;
    if samples.len() < 2 {
        return f64::INFINITY;
    }
    let mean = samples.iter().sum::<f64>() / n;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stderr = (var / n).sqrt();
    if mean == 0.0 {
        if stderr == 0.0 {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        stderr / mean.abs()
    }
}

/// Whitespace-separated floats; anything else is skipped.
pub fn parse_measurements(stdout: &str) -> Vec<f64> {
    stdout
        .split_whitespace()
        .filter_map(|token| match token.parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring non-numeric benchmark output token '{}'", token);
                None
            }
        })
        .collect()
}

fn run_once(
    config: &SimulatorConfig,
    platform: &PlatformHandle,
    scenario: &Scenario,
    iterations: u32,
) -> ScResult<Vec<f64>> {
    let program = absolutize(&config.benchmark_runner.program);
    let mut command = Command::new(&program);
    command
        .args(&config.benchmark_runner.args)
        .arg(platform.artifact())
        .arg(absolutize(&config.hostfile))
        .arg(absolutize(&config.benchmark_executable))
        .arg(scenario.benchmark())
        .arg(config.threshold.to_string())
        .arg(iterations.to_string())
        .arg(scenario.byte_sizes_csv())
        .args(&config.extra_runtime_flags)
        .args(platform.simulator_flags())
        .arg(format!("--cfg=smpi/host-speed:{}", config.host_speed))
        .current_dir(platform.work_dir());

    let output = command.output().map_err(|e| SimulationError::Spawn {
        program: program.display().to_string(),
        message: e.to_string(),
    })?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(SimulationError::BenchmarkFailed {
            benchmark: scenario.benchmark().to_string(),
            exit_code: output.status.code(),
            stderr: stderr.into_owned(),
        }
        .into());
    }
    if !stderr.trim().is_empty() {
        debug!("{} stderr: {}", scenario.benchmark(), stderr.trim());
    }

    Ok(parse_measurements(&String::from_utf8_lossy(&output.stdout)))
}

/// Simulate one scenario, one value per byte size.
pub fn run_scenario(
    config: &SimulatorConfig,
    platform: &PlatformHandle,
    scenario: &Scenario,
    iteration_budget: u32,
) -> ScResult<Vec<f64>> {
    if !platform.artifact().exists() {
        return Err(SimulationError::PlatformMissing {
            path: platform.artifact().display().to_string(),
        }
        .into());
    }

    match config.sampling_mode {
        SamplingMode::Delegated => run_once(config, platform, scenario, iteration_budget),
        SamplingMode::Adaptive => {
            let rule = SamplingRule::new(config.threshold);
            let width = scenario.byte_sizes.len();
            let mut samples: Vec<Vec<f64>> = vec![Vec::new(); width];
            let mut count = 0;
            let mut worst = f64::INFINITY;

            while rule.need_more_samples(count, iteration_budget, worst) {
                let values = run_once(config, platform, scenario, 1)?;
                if values.len() != width {
                    return Err(CalibrationError::ShapeMismatch {
                        simulated: values.len(),
                        real: width,
                    }
                    .into());
                }
                for (column, value) in samples.iter_mut().zip(values) {
                    column.push(value);
                }
                count += 1;
                worst = samples
                    .iter()
                    .map(|column| relative_stderr(column))
                    .fold(0.0, f64::max);
            }
            debug!(
                "{} sampled {} times, worst relative stderr {:.4}",
                scenario.benchmark(),
                count,
                worst
            );

            Ok(samples
                .iter()
                .map(|column| column.iter().sum::<f64>() / column.len().max(1) as f64)
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::build_platform;
    use crate::testutil::{scenario, sh, write_script, Fixture};
    use sc_types::{Candidate, CandidateEntry, Destination, ParameterValue};
    use std::fs;

    #[test]
    fn sampling_rule() {
        let rule = SamplingRule::new(0.05);
        assert!(!rule.need_more_samples(100, 100, 1.0));
        assert!(!rule.need_more_samples(3, 3, 1.0));
        assert!(rule.need_more_samples(1, 100, 0.0));
        assert!(rule.need_more_samples(9, 100, 0.0));
        assert!(!rule.need_more_samples(10, 100, 0.01));
        assert!(rule.need_more_samples(10, 100, 0.05));
        assert!(SamplingRule::new(-1.0).need_more_samples(50, 100, 0.0));
    }

    #[test]
    fn relative_stderr_edge_cases() {
        assert_eq!(relative_stderr(&[1.0]), f64::INFINITY);
        assert_eq!(relative_stderr(&[0.0, 0.0]), 0.0);
        assert_eq!(relative_stderr(&[2.0, 2.0, 2.0]), 0.0);
        // mean 2, sample std 1, stderr 1/sqrt(3)
        let expected = (1.0f64 / 3.0).sqrt() / 2.0;
        assert!((relative_stderr(&[1.0, 2.0, 3.0]) - expected).abs() < 1e-12);
    }

    #[test]
    fn non_numeric_tokens_are_dropped() {
        assert_eq!(
            parse_measurements("  1.5 nan? 2e3\n-4 Mbytes "),
            vec![1.5, 2000.0, -4.0]
        );
        assert!(parse_measurements("").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn passes_the_documented_arguments() {
        let fixture = Fixture::new();
        let config = fixture.config();
        let candidate = Candidate::new(vec![CandidateEntry {
            name: "smpi/os".into(),
            destination: Destination::SimulatorFlag,
            value: ParameterValue::Float(2.5),
            rendered: "2.5".into(),
        }]);
        let platform = build_platform(&config, &candidate).unwrap();

        let values = run_scenario(&config, &platform, &scenario("PingPong", &[0, 8, 64]), 100).unwrap();
        assert_eq!(values, vec![2.5, 2.5, 2.5]);

        let args = fs::read_to_string(platform.work_dir().join("last_args.txt")).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(args[0], platform.artifact().display().to_string());
        assert_eq!(args[3], "PingPong");
        assert_eq!(args[4], "0.05");
        assert_eq!(args[5], "100");
        assert_eq!(args[6], "0,8,64");
        assert_eq!(args[7], "--log=root.threshold:error");
        assert_eq!(args[8], "--cfg=smpi/os:2.5");
        assert_eq!(args[9], "--cfg=smpi/host-speed:5.2e9f");
        assert_eq!(args.len(), 10);
    }

    #[cfg(unix)]
    #[test]
    fn missing_artifact_is_reported() {
        let fixture = Fixture::new();
        let lazy = write_script(fixture.root(), "lazy_builder.sh", "exit 0\n");
        let config = fixture.config().with_platform_builder(sh(&lazy));
        let platform = build_platform(&config, &Candidate::new(Vec::new())).unwrap();

        let err = run_scenario(&config, &platform, &scenario("PingPong", &[0]), 100).unwrap_err();
        assert_eq!(err.kind(), "PlatformMissingError");
    }

    #[cfg(unix)]
    #[test]
    fn wrapper_failure_is_fatal() {
        let fixture = Fixture::new();
        let broken = write_script(fixture.root(), "broken.sh", "echo 'MPI_Abort' >&2\nexit 1\n");
        let config = fixture.config().with_benchmark_runner(sh(&broken));
        let platform = build_platform(&config, &Candidate::new(Vec::new())).unwrap();

        let err = run_scenario(&config, &platform, &scenario("Birandom", &[0]), 100).unwrap_err();
        assert_eq!(err.kind(), "BenchmarkFailedError");
        assert!(err.to_string().contains("MPI_Abort"));
    }

    #[cfg(unix)]
    #[test]
    fn adaptive_sampling_stops_at_minimum_when_stable() {
        let fixture = Fixture::new();
        let counting = write_script(
            fixture.root(),
            "counting.sh",
            "n=$(cat count 2>/dev/null || echo 0)\nn=$((n+1))\necho $n > count\necho 4.0 8.0\n",
        );
        let config = fixture
            .config()
            .with_benchmark_runner(sh(&counting))
            .with_sampling_mode(SamplingMode::Adaptive);
        let platform = build_platform(&config, &Candidate::new(Vec::new())).unwrap();

        let values = run_scenario(&config, &platform, &scenario("PingPing", &[1, 2]), 100).unwrap();
        assert_eq!(values, vec![4.0, 8.0]);
        let count = fs::read_to_string(platform.work_dir().join("count")).unwrap();
        assert_eq!(count.trim(), "10");
    }

    #[cfg(unix)]
    #[test]
    fn adaptive_sampling_respects_the_cap() {
        let fixture = Fixture::new();
        let noisy = write_script(
            fixture.root(),
            "noisy.sh",
            "n=$(cat count 2>/dev/null || echo 0)\nn=$((n+1))\necho $n > count\necho $n\n",
        );
        let config = fixture
            .config()
            .with_benchmark_runner(sh(&noisy))
            .with_sampling_mode(SamplingMode::Adaptive);
        let platform = build_platform(&config, &Candidate::new(Vec::new())).unwrap();

        let values = run_scenario(&config, &platform, &scenario("PingPing", &[1]), 12).unwrap();
        assert_eq!(values, vec![6.5]);
        let count = fs::read_to_string(platform.work_dir().join("count")).unwrap();
        assert_eq!(count.trim(), "12");
    }
}
