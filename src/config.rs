// SPDX-License-Identifier: GPL-3.0-only
//! Service configuration
//!
//! Loaded once at startup from `config.toml` in the user or system config
//! directory and passed down explicitly. Every field has a default, so an
//! absent file or a partial file is fine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consumers::DEFAULT_INTEREST_MARKER;
use crate::error::{Error, Result};
use crate::keyboard::Keymap;

pub const CONFIG_DIR: &str = "acpi-brightness-keys";
pub const CONFIG_FILE: &str = "config.toml";

/// Where acpid publishes its event stream
pub const DEFAULT_ACPID_SOCKET: &str = "/var/run/acpid.socket";

/// Name of the virtual keyboard
pub const DEFAULT_DEVICE_NAME: &str = "ACPI Brightness Keys";

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Log every notification, not just the first brightness key
    pub debug: bool,
    /// Boolean property a component publishes to receive key notices
    pub interest_marker: String,
    pub acpid_socket: PathBuf,
    pub device_name: String,
    pub keys: Keymap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            interest_marker: DEFAULT_INTEREST_MARKER.to_string(),
            acpid_socket: PathBuf::from(DEFAULT_ACPID_SOCKET),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            keys: Keymap::default(),
        }
    }
}

impl Config {
    /// Default location, `$XDG_CONFIG_HOME/acpi-brightness-keys/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml(&text)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load from `path` if given, else from the default location
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    fn validate(&self) -> Result<()> {
        if self.interest_marker.is_empty() {
            return Err(Error::Config("interest_marker must not be empty".to_string()));
        }
        if self.keys.up == self.keys.down {
            return Err(Error::Config(format!(
                "keys.up and keys.down are both {}",
                self.keys.up
            )));
        }
        Ok(())
    }
}
