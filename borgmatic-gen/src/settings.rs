//! Settings of the generator itself.
//!
//! Loaded from a TOML file with environment variable overrides. Every key
//! has a default matching the stock borgmatic compose stack, so running
//! without a settings file works out of the box.

use crate::utils::{GenError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix of the environment variables that override settings.
pub const ENV_PREFIX: &str = "BORGMATIC_GEN_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paths: PathsConfig,
    pub container: ContainerConfig,
    pub compose: ComposeConfig,
    pub defaults: PromptDefaults,
    pub retention: RetentionConfig,
    pub log: LogConfig,
}

/// Host-side locations. Relative entries resolve against `work_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the compose project
    pub work_dir: PathBuf,

    /// Where job configurations are written
    pub config_dir: PathBuf,

    /// Shared compose override document
    pub override_file: PathBuf,

    /// Private SSH key used to reach the backup server
    pub ssh_key: PathBuf,
}

/// Paths as seen from inside the borgmatic containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    pub config_dir: PathBuf,
    pub ssh_key: PathBuf,
    pub data_root: PathBuf,
    pub scripts_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Service that runs the backups and needs the data mounts
    pub backup_service: String,

    /// Service that reads every job config through `config_env_var`
    pub exporter_service: String,

    /// Colon-separated list of job config paths
    pub config_env_var: String,
}

/// Defaults offered by the interactive setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptDefaults {
    pub backup_host: String,
    pub port: u16,
    pub user: String,
    pub apps: String,
}

/// Retention used by jobs that are not append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub keep_daily: u32,
    pub keep_weekly: u32,
    pub keep_monthly: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/project"),
            config_dir: PathBuf::from("config/borgmatic.d"),
            override_file: PathBuf::from("docker-compose.override.yml"),
            ssh_key: PathBuf::from("ssh-keys/id_borgmatic"),
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/borgmatic.d"),
            ssh_key: PathBuf::from("/root/.ssh/id_borgmatic"),
            data_root: PathBuf::from("/data"),
            scripts_dir: PathBuf::from("/data/useful-scripts"),
        }
    }
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            backup_service: "borgmatic".to_string(),
            exporter_service: "borgmatic-exporter".to_string(),
            config_env_var: "BORGMATIC_CONFIG".to_string(),
        }
    }
}

impl Default for PromptDefaults {
    fn default() -> Self {
        Self {
            backup_host: "u339567.your-storagebox.de".to_string(),
            port: 23,
            user: "u339567-sub1".to_string(),
            apps: "app-rollvolet-crm app-server-monitor".to_string(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_daily: 7,
            keep_weekly: 4,
            keep_monthly: 6,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| GenError::Settings(format!("{}: {}", path.display(), e)))
    }

    /// Load from `path` (or defaults), then apply `.env` and process env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply `BORGMATIC_GEN_*` overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());

        if let Some(work_dir) = var("WORK_DIR") {
            self.paths.work_dir = PathBuf::from(work_dir);
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log.level = level;
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.paths.work_dir.join(path)
        }
    }

    /// Directory receiving `{job}.yml` files
    pub fn config_dir(&self) -> PathBuf {
        self.resolve(&self.paths.config_dir)
    }

    /// Host path of a job's configuration file
    pub fn job_config_path(&self, job_name: &str) -> PathBuf {
        self.config_dir().join(format!("{job_name}.yml"))
    }

    /// Path of a job's configuration file inside the containers
    pub fn container_config_path(&self, job_name: &str) -> String {
        self.container
            .config_dir
            .join(format!("{job_name}.yml"))
            .display()
            .to_string()
    }

    pub fn override_path(&self) -> PathBuf {
        self.resolve(&self.paths.override_file)
    }

    pub fn ssh_key_path(&self) -> PathBuf {
        self.resolve(&self.paths.ssh_key)
    }

    /// Render `path` relative to the work dir (`./config/...`) when it lives there.
    pub fn display_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.paths.work_dir) {
            Ok(rel) => format!("./{}", rel.display()),
            Err(_) => path.display().to_string(),
        }
    }
}
