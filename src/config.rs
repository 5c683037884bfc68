//! User configuration
//!
//! Stored as TOML in `<config dir>/foamdeck/config.toml`. Every field is
//! optional; a missing file means defaults.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use foamdeck_history::HISTORY_FILE;

const APP_DIR: &str = "foamdeck";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Case directory used when a command is not given one
    pub base_dir: Option<PathBuf>,

    /// OpenFOAM installation name under `install_root`, e.g. `openfoam12`
    pub openfoam_version: Option<String>,

    pub install_root: PathBuf,

    /// MPI ranks for `run`; 1 runs the solver serially
    pub mpi_ranks: u32,

    pub history_file: Option<PathBuf>,

    /// `numberOfSubdomains` written before decomposing
    pub decompose_cores: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: None,
            openfoam_version: None,
            install_root: PathBuf::from("/opt"),
            mpi_ranks: 6,
            history_file: None,
            decompose_cores: 2,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading config {}", path.display()));
            }
        };

        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("serializing config")?;
        fs::write(path, content).with_context(|| format!("writing config {}", path.display()))
    }

    /// History file, defaulting to the user data directory
    pub fn history_path(&self) -> PathBuf {
        if let Some(path) = &self.history_file {
            return path.clone();
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_default()
            .join(HISTORY_FILE)
    }

    /// Case directory from the command line, else the configured one
    pub fn case_dir(&self, explicit: Option<PathBuf>) -> Result<PathBuf> {
        explicit
            .or_else(|| self.base_dir.clone())
            .context("no case directory given and none configured (see `foamdeck config set-case`)")
    }
}
