//! Runtime settings for the store and the file server
//!
//! ```toml
//! local = false
//! render_folders = true
//! mod_time_override = 1579282495
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serve on-disk sources instead of embedded data (development)
    pub local: bool,

    /// Render a listing for directories without `index.html`; otherwise 403
    pub render_folders: bool,

    /// Replace every entry's modification time when loading a manifest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_time_override: Option<i64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local: false,
            render_folders: true,
            mod_time_override: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Read settings from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
