//! Configuration loading (§6 "Configuration", §10.4).
//!
//! Scoped to the three runtime-required settings the spec names; everything
//! else (quota recompute period, idle timeout, retry cadence, ...) is a
//! compile-time constant in [`crate::protocol::constants`].

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Overlay core configuration, loaded from a TOML file with environment
/// overrides (§10.4, mirroring the teacher's `Config::load` layering).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Global target outbound byte-per-minute allocation (§4.5).
    pub total_quota_in: u64,
    /// Global target outbound byte-per-minute allocation (§4.5).
    pub total_quota_out: u64,
    /// Filesystem path to the PKCS#1 PEM long-term private key (§6).
    pub hostkey: PathBuf,
}

impl Config {
    /// Load from `path`, then apply `OVERLAYCORE_*` environment overrides,
    /// then validate. Missing required fields are a fatal startup error
    /// (§7 kind 5).
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.override_from_env();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {path:?}: {e}")))?;
        toml::from_str(&contents).map_err(|e| Error::Config(format!("failed to parse config: {e}")))
    }

    fn override_from_env(&mut self) {
        if let Ok(val) = env::var("OVERLAYCORE_TOTAL_QUOTA_IN") {
            if let Ok(parsed) = val.parse() {
                self.total_quota_in = parsed;
            }
        }
        if let Ok(val) = env::var("OVERLAYCORE_TOTAL_QUOTA_OUT") {
            if let Ok(parsed) = val.parse() {
                self.total_quota_out = parsed;
            }
        }
        if let Ok(val) = env::var("OVERLAYCORE_HOSTKEY") {
            self.hostkey = PathBuf::from(val);
        }
    }

    /// Absence of any required setting is fatal (§6, §7 kind 5).
    fn validate(&self) -> Result<()> {
        if self.total_quota_in == 0 {
            return Err(Error::Config("total_quota_in must be non-zero".into()));
        }
        if self.total_quota_out == 0 {
            return Err(Error::Config("total_quota_out must be non-zero".into()));
        }
        if self.hostkey.as_os_str().is_empty() {
            return Err(Error::Config("hostkey path is required".into()));
        }
        Ok(())
    }
}
