//! Node configuration – reads/writes `~/.odomfuse/config.toml`.

use odomfuse_middleware::rosbridge::{
    DEFAULT_CORRECTION_TOPIC, DEFAULT_OUTPUT_TOPIC, DEFAULT_RAW_TOPIC,
};
use odomfuse_perception::DEFAULT_SINGULARITY_EPSILON;
use odomfuse_runtime::FrameConfig;
use odomfuse_types::FuseError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket port of the rosbridge endpoint.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    /// Per-topic event bus capacity.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    #[serde(default = "default_raw_topic")]
    pub raw_topic: String,

    #[serde(default = "default_correction_topic")]
    pub correction_topic: String,

    #[serde(default = "default_output_topic")]
    pub output_topic: String,

    /// Frame the fused pose is expressed in.
    #[serde(default = "default_parent_frame")]
    pub parent_frame: String,

    /// Frame the fused pose describes.
    #[serde(default = "default_child_frame")]
    pub child_frame: String,

    /// Threshold on `|cos(rx)|` for the singular-orientation fallback.
    #[serde(default = "default_singularity_epsilon")]
    pub singularity_epsilon: f64,
}

fn default_ws_port() -> u16 {
    9090
}
fn default_bus_capacity() -> usize {
    256
}
fn default_raw_topic() -> String {
    DEFAULT_RAW_TOPIC.to_string()
}
fn default_correction_topic() -> String {
    DEFAULT_CORRECTION_TOPIC.to_string()
}
fn default_output_topic() -> String {
    DEFAULT_OUTPUT_TOPIC.to_string()
}
fn default_parent_frame() -> String {
    "camera_init".to_string()
}
fn default_child_frame() -> String {
    "camera".to_string()
}
fn default_singularity_epsilon() -> f64 {
    DEFAULT_SINGULARITY_EPSILON
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_port: default_ws_port(),
            bus_capacity: default_bus_capacity(),
            raw_topic: default_raw_topic(),
            correction_topic: default_correction_topic(),
            output_topic: default_output_topic(),
            parent_frame: default_parent_frame(),
            child_frame: default_child_frame(),
            singularity_epsilon: default_singularity_epsilon(),
        }
    }
}

impl Config {
    pub fn frames(&self) -> FrameConfig {
        FrameConfig {
            parent_frame: self.parent_frame.clone(),
            child_frame: self.child_frame.clone(),
        }
    }
}

/// Return the path to `~/.odomfuse/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".odomfuse").join("config.toml")
}

/// Load the effective configuration: file values (or defaults when the file
/// is absent) with `ODOMFUSE_*` overrides applied.
pub fn load_effective() -> Result<Config, FuseError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the file at `path`.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, FuseError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        FuseError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| FuseError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `ODOMFUSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ODOMFUSE_WS_PORT` | `ws_port` |
/// | `ODOMFUSE_BUS_CAPACITY` | `bus_capacity` |
/// | `ODOMFUSE_RAW_TOPIC` | `raw_topic` |
/// | `ODOMFUSE_CORRECTION_TOPIC` | `correction_topic` |
/// | `ODOMFUSE_OUTPUT_TOPIC` | `output_topic` |
/// | `ODOMFUSE_PARENT_FRAME` | `parent_frame` |
/// | `ODOMFUSE_CHILD_FRAME` | `child_frame` |
/// | `ODOMFUSE_SINGULARITY_EPSILON` | `singularity_epsilon` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(port) = lookup("ODOMFUSE_WS_PORT").and_then(|v| v.parse().ok()) {
        cfg.ws_port = port;
    }
    if let Some(capacity) = lookup("ODOMFUSE_BUS_CAPACITY")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|c| *c > 0)
    {
        cfg.bus_capacity = capacity;
    }
    if let Some(eps) = lookup("ODOMFUSE_SINGULARITY_EPSILON")
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|e| e.is_finite() && *e >= 0.0)
    {
        cfg.singularity_epsilon = eps;
    }
    let strings = [
        ("ODOMFUSE_RAW_TOPIC", &mut cfg.raw_topic),
        ("ODOMFUSE_CORRECTION_TOPIC", &mut cfg.correction_topic),
        ("ODOMFUSE_OUTPUT_TOPIC", &mut cfg.output_topic),
        ("ODOMFUSE_PARENT_FRAME", &mut cfg.parent_frame),
        ("ODOMFUSE_CHILD_FRAME", &mut cfg.child_frame),
    ];
    for (key, field) in strings {
        if let Some(v) = lookup(key).filter(|v| !v.trim().is_empty()) {
            *field = v;
        }
    }
}

/// Save `cfg` to `~/.odomfuse/config.toml`.
pub fn save(cfg: &Config) -> Result<PathBuf, FuseError> {
    let path = config_path();
    save_to(cfg, &path)?;
    Ok(path)
}

/// Write `cfg` to `path`, owner-only on Unix.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), FuseError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| FuseError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                FuseError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| FuseError::Config(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| {
                FuseError::Config(format!("failed to write config at {}: {e}", path.display()))
            })?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| {
        FuseError::Config(format!("failed to write config at {}: {e}", path.display()))
    })?;
    Ok(())
}
