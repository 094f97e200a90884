//! Layered configuration for the shelf server.
//!
//! Sources are merged lowest to highest:
//! 1. built-in defaults ([`Config::default`]),
//! 2. an optional TOML, YAML or JSON file (chosen by extension; TOML otherwise),
//! 3. `SHELF_`-prefixed environment variables, with `__` separating nested
//!    keys (`SHELF_THUMBNAILS__MAX_CONVERSIONS=8`),
//! 4. whatever the caller merges on top of [`Config::figment`], typically
//!    command-line flags.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use shelf_thumbnail::DEFAULT_MAX_CONVERSIONS;
use shelf_thumbnail::convert::{DEFAULT_ARGS, DEFAULT_PROGRAM};
use std::ffi::OsStr;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Prefix of environment variables read into the config.
pub const ENV_PREFIX: &str = "SHELF_";
/// File name looked up in the platform config directory.
pub const CONFIG_FILE: &str = "shelf.toml";
pub const DEFAULT_PORT: u16 = 9595;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory tree served to clients. Thumbnails live inside it.
    pub root: PathBuf,
    /// Address the HTTP server binds to.
    pub listen: SocketAddr,
    pub thumbnails: ThumbnailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            thumbnails: ThumbnailConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    /// Upper bound on converter processes running at once, server-wide.
    pub max_conversions: usize,
    /// Converter executable, looked up on `PATH` unless it is a path.
    pub converter: String,
    /// Arguments placed before `<N>x<N> <source> <destination>`.
    pub converter_args: Vec<String>,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_conversions: DEFAULT_MAX_CONVERSIONS,
            converter: DEFAULT_PROGRAM.to_string(),
            converter_args: DEFAULT_ARGS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl Config {
    /// The merged (but not yet extracted) sources.
    ///
    /// `file` is used as given; see [`Config::load`] for the defaulting and
    /// existence rules.
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            figment = match path.extension().and_then(OsStr::to_str) {
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => figment.merge(Toml::file(path)),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Extract and validate a config from any figment.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from defaults, a config file and the environment.
    ///
    /// An explicit `file` must exist. Without one, [`default_path`] is used
    /// when it exists and skipped silently when it doesn't.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_figment(&Self::figment(Self::resolve_file(file)?.as_deref()))
    }

    /// Pick the config file to read, if any.
    pub fn resolve_file(file: Option<&Path>) -> Result<Option<PathBuf>> {
        match file {
            Some(path) if path.is_file() => Ok(Some(path.to_path_buf())),
            Some(path) => exn::bail!(ErrorKind::MissingFile(path.to_path_buf())),
            None => Ok(default_path().filter(|path| path.is_file()).inspect(|path| {
                tracing::debug!(path = %path.display(), "Using default config file");
            })),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.thumbnails.max_conversions == 0 {
            exn::bail!(ErrorKind::Invalid("thumbnails.max_conversions must be at least 1".to_string()));
        }
        if self.thumbnails.converter.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("thumbnails.converter must not be empty".to_string()));
        }
        if self.root.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("root must not be empty".to_string()));
        }
        Ok(())
    }
}

/// `shelf.toml` in the platform's config directory, when there is one.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "shelf").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
