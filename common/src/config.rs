//! The `ConfigEngine` locates an OS-appropriate configuration directory and loads any
//! `Versioned` struct from an HCL file found there (or from a caller-supplied path).
//!
//! `CaptureConfig` is the SDK's own configuration: the tunables of the capture pipeline
//! plus the installation identity, which is generated once and persisted back into the same
//! file rather than regenerated on every load.
//!

use std::fmt::Debug;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::{fs, io};

use directories::BaseDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::identity::InstallationId;
use crate::{makepath, Versioned};

/// Config filename looked for in the base directory.
const CONFIG: &str = "config.hcl";

/// Directory tag under the platform's config root.
const TAG: &str = "tracekit";

/// Current `CaptureConfig` schema version. Bumping this is a breaking change; the engine
/// does not attempt to migrate configuration files, only measurement stores (see
/// `tracekit-store`'s migrator).
pub const CAPTURE_CONFIG_VERSION: usize = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file found and no default could be located")]
    NoDefaultLocation,
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing HCL: {0}")]
    Parse(#[from] hcl::Error),
    #[error("config version {found} is incompatible, expected {expected}")]
    IncompatibleVersion { found: usize, expected: usize },
}

/// Generic loader for any `Versioned` configuration struct.
///
#[derive(Debug)]
pub struct ConfigEngine<T: Debug + DeserializeOwned + Versioned> {
    basedir: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> ConfigEngine<T>
where
    T: Debug + DeserializeOwned + Versioned,
{
    #[tracing::instrument]
    fn new(tag: &str) -> Self {
        let basedir = match BaseDirs::new() {
            Some(base) => {
                let base = base.config_local_dir().to_string_lossy().to_string();
                debug!("base = {base}");
                makepath!(base, tag)
            }
            None => {
                let homedir = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
                makepath!(homedir, ".config", tag)
            }
        };
        ConfigEngine {
            basedir,
            _marker: PhantomData,
        }
    }

    /// Returns the path of the default config directory, creating it if absent.
    #[tracing::instrument]
    pub fn config_path(&self) -> PathBuf {
        self.basedir.clone()
    }

    /// Returns the path of the default config file.
    #[tracing::instrument]
    pub fn default_file(&self) -> PathBuf {
        let cfg = self.config_path().join(CONFIG);
        debug!("default = {cfg:?}");
        cfg
    }

    #[tracing::instrument]
    pub fn load(fname: Option<&str>) -> Result<T, ConfigError> {
        trace!("loading config");

        let cfg = ConfigEngine::<T>::new(TAG);
        let fname = match fname {
            Some(fname) => PathBuf::from(fname),
            None => cfg.default_file(),
        };

        let data = fs::read_to_string(&fname).map_err(|source| ConfigError::Read {
            path: fname.clone(),
            source,
        })?;
        let data: T = hcl::from_str(&data)?;
        debug!("struct data = {data:?}");
        Ok(data)
    }
}

/// Tunables recognised by the capture pipeline (§6), plus the installation identity.
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Config schema version, must equal [`CAPTURE_CONFIG_VERSION`].
    pub version: usize,
    /// Accelerometer sampling rate in Hz, range `[1, 200]`.
    #[serde(default = "default_accelerometer_hz")]
    pub accelerometer_hz: u32,
    /// How often the sampling pipeline flushes ring buffers to disk, in milliseconds.
    #[serde(default = "default_flush_interval_millis")]
    pub flush_interval_millis: u64,
    /// Base URL of the remote collector. Required only if uploading.
    #[serde(default)]
    pub collector_base_url: Option<String>,
    /// Whether uploads are allowed over a metered (cellular) connection.
    #[serde(default)]
    pub sync_on_cellular: bool,
    /// Horizontal-accuracy rejection threshold, in metres.
    #[serde(default = "default_location_accuracy_metres")]
    pub location_accuracy_metres: f64,
    /// Maximum age, in seconds, a fix's event time may lag its arrival time.
    #[serde(default = "default_location_max_lag_seconds")]
    pub location_max_lag_seconds: u64,
    /// Installation identity; generated once, never regenerated.
    #[serde(default)]
    pub installation_id: Option<InstallationId>,
}

fn default_accelerometer_hz() -> u32 {
    100
}

fn default_flush_interval_millis() -> u64 {
    1000
}

fn default_location_accuracy_metres() -> f64 {
    20.0
}

fn default_location_max_lag_seconds() -> u64 {
    10
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            version: CAPTURE_CONFIG_VERSION,
            accelerometer_hz: default_accelerometer_hz(),
            flush_interval_millis: default_flush_interval_millis(),
            collector_base_url: None,
            sync_on_cellular: false,
            location_accuracy_metres: default_location_accuracy_metres(),
            location_max_lag_seconds: default_location_max_lag_seconds(),
            installation_id: None,
        }
    }
}

impl Versioned for CaptureConfig {
    fn version(&self) -> usize {
        self.version
    }
}

impl CaptureConfig {
    /// Load the capture configuration from `fname` (or the default location), filling in
    /// the installation identity if this is the first load on this install, and
    /// persisting it back so subsequent loads see the same value.
    #[tracing::instrument]
    pub fn load_or_init(fname: Option<&str>) -> Result<Self, ConfigError> {
        let mut cfg = match ConfigEngine::<CaptureConfig>::load(fname) {
            Ok(cfg) => cfg,
            Err(ConfigError::Read { .. }) => CaptureConfig::default(),
            Err(e) => return Err(e),
        };

        if cfg.version != CAPTURE_CONFIG_VERSION {
            return Err(ConfigError::IncompatibleVersion {
                found: cfg.version,
                expected: CAPTURE_CONFIG_VERSION,
            });
        }

        if cfg.installation_id.is_none() {
            cfg.installation_id = Some(InstallationId::generate());
            cfg.save(fname)?;
        }

        Ok(cfg)
    }

    /// Accelerometer sample rate clamped to the documented `[1, 200]` range.
    pub fn accelerometer_hz_clamped(&self) -> u32 {
        self.accelerometer_hz.clamp(1, 200)
    }

    fn save(&self, fname: Option<&str>) -> Result<(), ConfigError> {
        let engine = ConfigEngine::<CaptureConfig>::new(TAG);
        let path = match fname {
            Some(fname) => PathBuf::from(fname),
            None => engine.default_file(),
        };
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let body = hcl::to_string(self)?;
        fs::write(&path, body).map_err(|source| ConfigError::Write { path, source })
    }
}
