//! Deployment configuration – reads/writes `~/.rover/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted deployment settings stored in `~/.rover/config.toml`.
///
/// Every field has a default, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP port for the cockpit.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Stream resolution.
    #[serde(default = "default_camera_width")]
    pub camera_width: u32,
    #[serde(default = "default_camera_height")]
    pub camera_height: u32,

    /// Frame rate of the simulated camera.
    #[serde(default = "default_camera_fps")]
    pub camera_fps: u32,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_sensor_poll_ms")]
    pub sensor_poll_ms: u64,

    /// Full-scale raw ADC value of the gas sensor.
    #[serde(default = "default_sensor_raw_max")]
    pub sensor_raw_max: i64,

    /// Serial device of the gas sensor (e.g. `/dev/serial0`).  Without it
    /// the simulated sensor is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_port: Option<String>,

    #[serde(default = "default_serial_baud")]
    pub serial_baud: u32,
}

fn default_http_port() -> u16 {
    5000
}
fn default_camera_width() -> u32 {
    640
}
fn default_camera_height() -> u32 {
    480
}
fn default_camera_fps() -> u32 {
    15
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_sensor_poll_ms() -> u64 {
    200
}
fn default_sensor_raw_max() -> i64 {
    4095
}
fn default_serial_baud() -> u32 {
    9600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            camera_width: default_camera_width(),
            camera_height: default_camera_height(),
            camera_fps: default_camera_fps(),
            jpeg_quality: default_jpeg_quality(),
            sensor_poll_ms: default_sensor_poll_ms(),
            sensor_raw_max: default_sensor_raw_max(),
            serial_port: None,
            serial_baud: default_serial_baud(),
        }
    }
}

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Load the config from disk with `ROVER_*` overrides applied.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Defaults with `ROVER_*` overrides applied, for when no usable file exists.
pub fn defaults() -> Config {
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg);
    cfg
}

/// Load the config from a specific path, without environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_HTTP_PORT` | `http_port` |
/// | `ROVER_SERIAL_PORT` | `serial_port` |
/// | `ROVER_SENSOR_POLL_MS` | `sensor_poll_ms` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("ROVER_HTTP_PORT")
        && let Ok(port) = v.trim().parse::<u16>()
    {
        cfg.http_port = port;
    }
    if let Some(v) = lookup("ROVER_SERIAL_PORT") {
        let v = v.trim();
        cfg.serial_port = (!v.is_empty()).then(|| v.to_string());
    }
    if let Some(v) = lookup("ROVER_SENSOR_POLL_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.sensor_poll_ms = ms;
    }
}

/// Save the config to disk, creating `~/.rover/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
