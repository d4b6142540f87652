//! Kernel configuration.
//!
//! `KernelConfig` describes the home directory layout, watcher timing,
//! startup file ordering, and the module-load policy for deployments.
//! It loads from `keel.toml` (default feature `toml-config`) or
//! `keel.json` in the configuration directory; a missing file yields the
//! defaults.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::deployment::order::ExtensionOrder;
use crate::kernel::constants;
use crate::loader::arena::LoadPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported config format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Kernel home directory; supplied by the caller, not the file.
    #[serde(skip)]
    pub home: PathBuf,

    /// Overrides for the derived directory layout
    pub lib_dir: Option<PathBuf>,
    pub system_dir: Option<PathBuf>,
    pub deploy_dir: Option<PathBuf>,

    /// Whether the deploy directory is watched for hot deployment
    pub watch: bool,
    pub watch_interval_ms: u64,
    pub watch_floor_ms: u64,

    /// Startup file ordering: extensions listed earlier deploy first
    pub extension_priorities: Vec<String>,

    /// Module-load policy for deployment loader nodes
    /// (`parent-first` or `parent-last`)
    pub load_policy: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            home: PathBuf::from("."),
            lib_dir: None,
            system_dir: None,
            deploy_dir: None,
            watch: true,
            watch_interval_ms: constants::DEFAULT_WATCH_INTERVAL_MS,
            watch_floor_ms: constants::DEFAULT_WATCH_FLOOR_MS,
            extension_priorities: vec![
                "unit".to_string(),
                "so".to_string(),
                "dylib".to_string(),
                "dll".to_string(),
            ],
            load_policy: "parent-first".to_string(),
        }
    }
}

impl KernelConfig {
    /// Defaults rooted at `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    /// Load a configuration file; the format follows the extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            #[cfg(feature = "toml-config")]
            Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Some("json") => serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Find and load `<home>/config/keel.{toml,json}`; absent files yield
    /// the defaults rooted at `home`.
    pub fn discover(home: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let home = home.into();
        let config_dir = home.join(constants::CONFIG_DIR_NAME);
        let mut config = None;
        for extension in ["toml", "json"] {
            let candidate = config_dir.join(format!("{}.{extension}", constants::CONFIG_FILE_STEM));
            if candidate.is_file() {
                config = Some(Self::load(&candidate)?);
                log::info!("Loaded configuration from {}", candidate.display());
                break;
            }
        }
        let mut config = config.unwrap_or_default();
        config.home = home;
        Ok(config)
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.lib_dir
            .clone()
            .unwrap_or_else(|| self.home.join(constants::LIB_DIR_NAME))
    }

    pub fn system_dir(&self) -> PathBuf {
        self.system_dir
            .clone()
            .unwrap_or_else(|| self.home.join(constants::SYSTEM_DIR_NAME))
    }

    pub fn deploy_dir(&self) -> PathBuf {
        self.deploy_dir
            .clone()
            .unwrap_or_else(|| self.home.join(constants::DEPLOY_DIR_NAME))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn watch_floor(&self) -> Duration {
        Duration::from_millis(self.watch_floor_ms)
    }

    pub fn extension_order(&self) -> ExtensionOrder {
        ExtensionOrder::new(self.extension_priorities.clone())
    }

    /// The configured load policy; an unknown value falls back to
    /// parent-first with a warning.
    pub fn policy(&self) -> LoadPolicy {
        LoadPolicy::parse(&self.load_policy).unwrap_or_else(|| {
            log::warn!(
                "Unknown load_policy '{}'; falling back to parent-first",
                self.load_policy
            );
            LoadPolicy::ParentFirst
        })
    }
}
