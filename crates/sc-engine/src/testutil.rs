//! Stand-ins for the platform builder and the benchmark wrapper.

use sc_types::{
    Candidate, CandidateEntry, Destination, GroundTruthPoint, GroundTruthSet, ParameterValue,
    Scenario, ScenarioKey,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::{CommandSpec, SimulatorConfig};

/// Echoes the `smpi/os` flag value (default 1.0) once per byte size and
/// leaves a scenario log behind.
pub(crate) const WRAPPER: &str = r#"[ -f "$1" ] || { echo "no platform at $1" >&2; exit 9; }
printf '%s\n' "$@" > last_args.txt
value=1.0
for arg in "$@"; do
  case "$arg" in
    --cfg=smpi/os:*) value="${arg#--cfg=smpi/os:}" ;;
  esac
done
out=""
for b in $(echo "$7" | tr ',' ' '); do
  out="$out $value"
done
touch p2p_0.log p2p_1.log
echo "$out"
"#;

const BUILDER: &str = "[ -f \"$1\" ] && [ -f \"$2\" ] || exit 7\ntouch summit_temp.so\n";

pub(crate) struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let platform = dir.path().join("platform");
        fs::create_dir_all(&platform).unwrap();
        write_script(&platform, "build.sh", BUILDER);
        fs::write(
            platform.join("node.json"),
            r#"{"cpu_core_count": 42, "cpu_speed": 1.0, "pcie_bw": "16GBps"}"#,
        )
        .unwrap();
        fs::write(
            platform.join("topology.json"),
            r#"{"name": "summit", "bandwidth": "25GBps", "latency": "0us",
                "Fat-Tree_parameters": {"levels": 2, "up_links": "18,18"}}"#,
        )
        .unwrap();
        write_script(dir.path(), "wrapper.sh", WRAPPER);
        fs::write(dir.path().join("hostfile"), "node0\nnode1\n").unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> SimulatorConfig {
        let root = self.root();
        let platform = root.join("platform");
        SimulatorConfig::default()
            .with_platform_template_dir(&platform)
            .with_templates(platform.join("node.json"), platform.join("topology.json"))
            .with_platform_builder(sh(&platform.join("build.sh")))
            .with_benchmark_runner(sh(&root.join("wrapper.sh")))
            .with_benchmark_executable(root.join("IMB-P2P"))
            .with_hostfile(root.join("hostfile"))
            .with_work_root(root.join("work"))
    }
}

pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    path
}

/// Run scripts through the shell so they never need the executable bit.
pub(crate) fn sh(script: &Path) -> CommandSpec {
    CommandSpec::new("/bin/sh").with_args([script.display().to_string()])
}

pub(crate) fn scenario(benchmark: &str, bytes: &[u64]) -> Scenario {
    Scenario::new(
        ScenarioKey {
            benchmark: benchmark.to_string(),
            node_count: 2,
            processes: 2,
        },
        bytes.to_vec(),
    )
}

/// Two scenarios, every replicate at 2.0.
pub(crate) fn ground_truth() -> GroundTruthSet {
    let mut set = GroundTruthSet::new();
    set.push(
        scenario("PingPong", &[0, 8]),
        GroundTruthPoint::new(2, vec![vec![2.0, 2.0], vec![2.0, 2.0]]).unwrap(),
    )
    .unwrap();
    set.push(
        scenario("PingPing", &[4]),
        GroundTruthPoint::new(1, vec![vec![2.0]]).unwrap(),
    )
    .unwrap();
    set
}

pub(crate) fn os_candidate(value: f64) -> Candidate {
    Candidate::new(vec![CandidateEntry {
        name: "smpi/os".into(),
        destination: Destination::SimulatorFlag,
        value: ParameterValue::Float(value),
        rendered: value.to_string(),
    }])
}
