use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::dmi::DMI_BASE;
use crate::errors::FanControlError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/gpd-fan/config.json";
pub const DEFAULT_PORT_DEVICE: &str = "/dev/port";

/// Runtime settings, optionally loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Character device giving byte access to I/O ports.
    pub port_device: PathBuf,
    /// sysfs directory holding the DMI identification strings.
    pub dmi_dir: PathBuf,
    /// Log file; defaults to `gpd-fan.log` next to the executable.
    pub log_file: Option<PathBuf>,
    pub monitor_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port_device: PathBuf::from(DEFAULT_PORT_DEVICE),
            dmi_dir: PathBuf::from(DMI_BASE),
            log_file: None,
            monitor_interval_secs: 1,
        }
    }
}

impl Config {
    /// Load the config file at `path`, or the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self, FanControlError> {
        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound && !explicit => {
                return Ok(Self::default())
            }
            Err(error) => {
                return Err(FanControlError::Config(format!(
                    "cannot read {}: {}",
                    path.display(),
                    error
                )))
            }
        };

        Self::parse(&content)
            .map_err(|error| FanControlError::Config(format!("{}: {}", path.display(), error)))
    }

    fn parse(content: &str) -> Result<Self, String> {
        let config: Config = serde_json::from_str(content).map_err(|error| error.to_string())?;
        if config.monitor_interval_secs == 0 {
            return Err("monitor_interval_secs must be at least 1".into());
        }
        Ok(config)
    }

    pub fn log_path(&self) -> PathBuf {
        match &self.log_file {
            Some(path) => path.clone(),
            None => std::env::current_exe()
                .unwrap_or_default()
                .parent()
                .unwrap_or(Path::new("."))
                .join("gpd-fan.log"),
        }
    }
}
