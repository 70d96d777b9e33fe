//! Simulator configuration.

use sc_types::{config_error, ScResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An external program together with its leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<S: Into<String>>(mut self, args: impl IntoIterator<Item = S>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Who decides how many times a benchmark is repeated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// The wrapper receives threshold and iteration cap and repeats on its own.
    #[default]
    Delegated,
    /// The adapter repeats single runs until the measurements are stable.
    Adaptive,
}

/// Everything the adapter needs to build platforms and run benchmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Directory copied into every work directory before the build.
    pub platform_template_dir: PathBuf,
    /// Node description template, JSON.
    pub node_template: PathBuf,
    /// Topology description template, JSON.
    pub topology_template: PathBuf,
    /// Invoked as `program args... node.json topology.json`.
    pub platform_builder: CommandSpec,
    /// Name of the generated platform; the builder writes `<name>.so`.
    pub platform_name: String,
    /// Benchmark wrapper; the scenario arguments follow `args`.
    pub benchmark_runner: CommandSpec,
    pub benchmark_executable: PathBuf,
    pub hostfile: PathBuf,
    /// Relative standard error below which sampling stops.
    pub threshold: f64,
    pub iteration_cap: u32,
    pub host_speed: String,
    pub extra_runtime_flags: Vec<String>,
    /// Parent of the per-evaluation work directories.
    pub work_root: PathBuf,
    pub keep_work_dirs: bool,
    /// Glob-like `prefix*suffix` pattern of logs deleted after each run.
    pub scenario_log_pattern: String,
    pub sampling_mode: SamplingMode,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        let work_root = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("smpi-calibrator");

        Self {
            platform_template_dir: PathBuf::from("platform"),
            node_template: PathBuf::from("platform/node.json"),
            topology_template: PathBuf::from("platform/topology.json"),
            platform_builder: CommandSpec::new("platform/build.sh"),
            platform_name: "summit_temp".to_string(),
            benchmark_runner: CommandSpec::new("wrapper_parallel"),
            benchmark_executable: PathBuf::from("IMB-P2P"),
            hostfile: PathBuf::from("hostfile"),
            threshold: 0.05,
            iteration_cap: 100,
            host_speed: "5.2e9f".to_string(),
            extra_runtime_flags: vec!["--log=root.threshold:error".to_string()],
            work_root,
            keep_work_dirs: false,
            scenario_log_pattern: "p2p_*.log".to_string(),
            sampling_mode: SamplingMode::Delegated,
        }
    }
}

impl SimulatorConfig {
    pub fn with_platform_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.platform_template_dir = dir.into();
        self
    }

    pub fn with_templates(mut self, node: impl Into<PathBuf>, topology: impl Into<PathBuf>) -> Self {
        self.node_template = node.into();
        self.topology_template = topology.into();
        self
    }

    pub fn with_platform_builder(mut self, builder: CommandSpec) -> Self {
        self.platform_builder = builder;
        self
    }

    pub fn with_platform_name(mut self, name: impl Into<String>) -> Self {
        self.platform_name = name.into();
        self
    }

    pub fn with_benchmark_runner(mut self, runner: CommandSpec) -> Self {
        self.benchmark_runner = runner;
        self
    }

    pub fn with_benchmark_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.benchmark_executable = executable.into();
        self
    }

    pub fn with_hostfile(mut self, hostfile: impl Into<PathBuf>) -> Self {
        self.hostfile = hostfile.into();
        self
    }

    pub fn with_sampling(mut self, threshold: f64, iteration_cap: u32) -> Self {
        self.threshold = threshold;
        self.iteration_cap = iteration_cap;
        self
    }

    pub fn with_sampling_mode(mut self, mode: SamplingMode) -> Self {
        self.sampling_mode = mode;
        self
    }

    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = root.into();
        self
    }

    pub fn with_keep_work_dirs(mut self, keep: bool) -> Self {
        self.keep_work_dirs = keep;
        self
    }

    pub fn with_extra_runtime_flags<S: Into<String>>(mut self, flags: impl IntoIterator<Item = S>) -> Self {
        self.extra_runtime_flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Check the settings that can be checked without running anything.
    pub fn validate(&self) -> ScResult<()> {
        if self.platform_name.is_empty() || self.platform_name.contains('/') {
            return Err(config_error!(
                "invalid platform name '{}'",
                self.platform_name
            ));
        }
        if self.iteration_cap == 0 {
            return Err(config_error!("iteration cap must be at least 1"));
        }
        if self.host_speed.trim().is_empty() {
            return Err(config_error!("host speed must not be empty"));
        }
        for (what, path) in [
            ("node template", &self.node_template),
            ("topology template", &self.topology_template),
        ] {
            if !path.is_file() {
                return Err(config_error!("{} not found: {}", what, path.display()));
            }
        }
        if !self.platform_template_dir.is_dir() {
            return Err(config_error!(
                "platform template directory not found: {}",
                self.platform_template_dir.display()
            ));
        }
        Ok(())
    }

    /// Whether `file_name` matches the scenario log pattern.
    pub fn is_scenario_log(&self, file_name: &str) -> bool {
        matches_pattern(&self.scenario_log_pattern, file_name)
    }

    pub fn artifact_path(&self, work_dir: &Path) -> PathBuf {
        work_dir.join(format!("{}.so", self.platform_name))
    }
}

/// `prefix*suffix` matching; a pattern without `*` must match exactly.
fn matches_pattern(pattern: &str, name: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
        None => pattern == name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SimulatorConfig::default();
        assert_eq!(config.platform_name, "summit_temp");
        assert_eq!(config.threshold, 0.05);
        assert_eq!(config.iteration_cap, 100);
        assert_eq!(config.host_speed, "5.2e9f");
        assert_eq!(config.sampling_mode, SamplingMode::Delegated);
        assert_eq!(
            config.artifact_path(Path::new("/work")),
            PathBuf::from("/work/summit_temp.so")
        );
    }

    #[test]
    fn log_pattern_matching() {
        let config = SimulatorConfig::default();
        assert!(config.is_scenario_log("p2p_0.log"));
        assert!(config.is_scenario_log("p2p_.log"));
        assert!(!config.is_scenario_log("p2p.log"));
        assert!(!config.is_scenario_log("node.json"));
        assert!(matches_pattern("exact.txt", "exact.txt"));
        assert!(!matches_pattern("exact.txt", "exact.txt.bak"));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: SimulatorConfig =
            serde_json::from_str(r#"{"platform_name": "cluster", "sampling_mode": "adaptive"}"#)
                .unwrap();
        assert_eq!(config.platform_name, "cluster");
        assert_eq!(config.sampling_mode, SamplingMode::Adaptive);
        assert_eq!(config.iteration_cap, 100);
    }

    #[test]
    fn validation_catches_missing_templates() {
        let dir = tempfile::tempdir().unwrap();
        let config = SimulatorConfig::default()
            .with_platform_template_dir(dir.path())
            .with_templates(dir.path().join("node.json"), dir.path().join("topology.json"));
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "ConfigError");

        std::fs::write(dir.path().join("node.json"), "{}").unwrap();
        std::fs::write(dir.path().join("topology.json"), "{}").unwrap();
        config.validate().unwrap();

        let err = config.with_platform_name("a/b").validate().unwrap_err();
        assert!(err.to_string().contains("a/b"));
    }
}
