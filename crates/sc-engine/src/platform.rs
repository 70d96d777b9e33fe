//! Platform generation: candidate values merged into the node and topology
//! descriptions, then compiled by the external builder.

use sc_types::{
    config_error, CalibrationError, Candidate, Destination, ScError, ScResult, SimulationError,
};
use serde_json::{Number, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::SimulatorConfig;

const NODE_FILE: &str = "node.json";
const TOPOLOGY_FILE: &str = "topology.json";

#[derive(Debug)]
enum WorkDir {
    Temporary(TempDir),
    Kept(PathBuf),
}

/// A compiled platform living in its own work directory.
///
/// The directory is removed when the handle is dropped unless the
/// configuration asked to keep work directories.
#[derive(Debug)]
pub struct PlatformHandle {
    work_dir: WorkDir,
    artifact: PathBuf,
    simulator_flags: Vec<String>,
}

impl PlatformHandle {
    pub fn work_dir(&self) -> &Path {
        match &self.work_dir {
            WorkDir::Temporary(dir) => dir.path(),
            WorkDir::Kept(path) => path,
        }
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// `--cfg=key:value` flags for the simulator-flag parameters.
    pub fn simulator_flags(&self) -> &[String] {
        &self.simulator_flags
    }
}

/// Documents derived from a candidate, before anything touches the disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformDescription {
    pub node: Value,
    pub topology: Value,
    pub simulator_flags: Vec<String>,
}

impl PlatformDescription {
    /// Merge the candidate into the templates.
    pub fn from_templates(
        node_template: &Value,
        topology_template: &Value,
        platform_name: &str,
        candidate: &Candidate,
    ) -> ScResult<Self> {
        let mut node = node_template.clone();
        let mut topology = topology_template.clone();
        let mut simulator_flags = Vec::new();

        for entry in candidate.entries() {
            match entry.destination {
                Destination::SimulatorFlag => {
                    simulator_flags.push(format!("--cfg={}:{}", entry.name, entry.rendered));
                }
                Destination::Node => {
                    let slot = node
                        .as_object_mut()
                        .and_then(|fields| fields.get_mut(&entry.name))
                        .ok_or_else(|| unknown_parameter(&entry.name))?;
                    *slot = typed_like(slot, &entry.rendered);
                }
                Destination::Topology => {
                    let slot = lookup_dotted(&mut topology, &entry.name)
                        .ok_or_else(|| unknown_parameter(&entry.name))?;
                    *slot = typed_like(slot, &entry.rendered);
                }
            }
        }

        match topology.as_object_mut() {
            Some(fields) => {
                fields.insert("name".to_string(), Value::String(platform_name.to_string()));
            }
            None => {
                return Err(SimulationError::InvalidDescription {
                    message: "topology template is not a JSON object".to_string(),
                }
                .into())
            }
        }

        Ok(Self {
            node,
            topology,
            simulator_flags,
        })
    }
}

fn unknown_parameter(name: &str) -> ScError {
    CalibrationError::UnknownParameter {
        name: name.to_string(),
    }
    .into()
}

/// Follow `a.b.c` through nested objects. Every segment must already exist.
fn lookup_dotted<'v>(root: &'v mut Value, key: &str) -> Option<&'v mut Value> {
    if let Some(fields) = root.as_object() {
        if fields.contains_key(key) {
            return root.get_mut(key);
        }
    }
    key.split('.')
        .try_fold(root, |value, segment| value.as_object_mut()?.get_mut(segment))
}

/// Keep numeric template fields numeric when the rendered value parses.
fn typed_like(template: &Value, rendered: &str) -> Value {
    match template {
        Value::Number(n) if n.is_i64() || n.is_u64() => rendered
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| rendered.parse::<f64>().map(float_value))
            .unwrap_or_else(|_| Value::String(rendered.to_string())),
        Value::Number(_) => rendered
            .parse::<f64>()
            .map(float_value)
            .unwrap_or_else(|_| Value::String(rendered.to_string())),
        _ => Value::String(rendered.to_string()),
    }
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v).map_or(Value::Null, Value::Number)
}

pub(crate) fn load_json(path: &Path) -> ScResult<Value> {
    let text = fs::read_to_string(path)
        .map_err(|e| config_error!("cannot read {}: {}", path.display(), e))?;
    Ok(serde_json::from_str(&text)?)
}

/// Relative paths that exist are made absolute, since external programs run
/// inside the work directory. Bare command names are left for `PATH` lookup.
pub(crate) fn absolutize(path: &Path) -> PathBuf {
    if path.is_relative() && path.exists() {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> ScResult<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Merge `candidate` into the configured templates without building.
pub fn describe_platform(
    config: &SimulatorConfig,
    candidate: &Candidate,
) -> ScResult<PlatformDescription> {
    PlatformDescription::from_templates(
        &load_json(&config.node_template)?,
        &load_json(&config.topology_template)?,
        &config.platform_name,
        candidate,
    )
}

/// Build a platform for `candidate` in a fresh work directory.
pub fn build_platform(config: &SimulatorConfig, candidate: &Candidate) -> ScResult<PlatformHandle> {
    let description = describe_platform(config, candidate)?;

    fs::create_dir_all(&config.work_root)?;
    let temp = tempfile::Builder::new()
        .prefix("smpi-")
        .tempdir_in(&config.work_root)?;
    let work_dir = if config.keep_work_dirs {
        WorkDir::Kept(temp.keep())
    } else {
        WorkDir::Temporary(temp)
    };
    let handle_dir = match &work_dir {
        WorkDir::Temporary(dir) => dir.path().to_path_buf(),
        WorkDir::Kept(path) => path.clone(),
    };
    debug!("Building platform in {}", handle_dir.display());

    let template_name = config
        .platform_template_dir
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("platform"));
    copy_dir_recursive(&config.platform_template_dir, &handle_dir.join(template_name))?;

    let node_path = handle_dir.join(NODE_FILE);
    let topology_path = handle_dir.join(TOPOLOGY_FILE);
    fs::write(&node_path, serde_json::to_string_pretty(&description.node)?)?;
    fs::write(&topology_path, serde_json::to_string_pretty(&description.topology)?)?;

    let program = absolutize(&config.platform_builder.program);
    let output = Command::new(&program)
        .args(&config.platform_builder.args)
        .arg(&node_path)
        .arg(&topology_path)
        .current_dir(&handle_dir)
        .output()
        .map_err(|e| SimulationError::Spawn {
            program: program.display().to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        warn!(
            "Platform builder failed with {:?}: {}",
            output.status.code(),
            stderr.trim()
        );
        return Err(SimulationError::PlatformBuild {
            exit_code: output.status.code(),
            stderr,
        }
        .into());
    }

    info!("Built platform {} for {}", config.platform_name, candidate);
    Ok(PlatformHandle {
        artifact: config.artifact_path(&handle_dir),
        work_dir,
        simulator_flags: description.simulator_flags,
    })
}
