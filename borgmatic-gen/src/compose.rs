//! Compose override merging.
//!
//! Jobs share one `docker-compose.override.yml`. Each run adds its mounts to
//! the backup service and its config path to the exporter's colon-separated
//! environment variable. Entries contributed by other jobs, and any keys this
//! tool does not know about, are left as they are.

use crate::job::MountSpec;
use crate::settings::Settings;
use crate::utils::fs::{existing_mode, write_atomic, PUBLIC_FILE_MODE};
use crate::utils::{GenError, Result};
use fs2::FileExt;
use serde_yaml::{Mapping, Sequence, Value};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// In-memory override document. Key order of the source is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideDocument {
    root: Mapping,
}

impl OverrideDocument {
    /// Load from `path`. A missing or empty file is an empty document;
    /// anything that does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("{} does not exist yet, starting empty", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_yaml::from_str(text).map_err(|source| GenError::Yaml {
            path: origin.to_string(),
            source,
        })?;

        match value {
            Value::Null => Ok(Self::default()),
            Value::Mapping(root) => Ok(Self { root }),
            _ => Err(GenError::MalformedOverride(format!(
                "{origin}: top level is not a mapping"
            ))),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.root).map_err(|source| GenError::Yaml {
            path: "<override>".to_string(),
            source,
        })
    }

    fn service_mut(&mut self, service: &str) -> Result<&mut Mapping> {
        let services = child_mapping(&mut self.root, "services", "services")?;
        child_mapping(services, service, &format!("services.{service}"))
    }

    fn service(&self, service: &str) -> Option<&Mapping> {
        self.root
            .get("services")
            .and_then(Value::as_mapping)
            .and_then(|services| services.get(service))
            .and_then(Value::as_mapping)
    }

    /// Append each mount not already present. Returns how many were added.
    pub fn add_volumes(&mut self, service: &str, mounts: &[String]) -> Result<usize> {
        let path = format!("services.{service}.volumes");
        let volumes = child_sequence(self.service_mut(service)?, "volumes", &path)?;

        let mut added = 0;
        for mount in mounts {
            let present = volumes.iter().any(|v| v.as_str() == Some(mount.as_str()));
            if !present {
                volumes.push(Value::String(mount.clone()));
                added += 1;
            }
        }
        Ok(added)
    }

    /// Short-syntax volume entries of `service`
    pub fn volumes(&self, service: &str) -> Vec<String> {
        self.service(service)
            .and_then(|s| s.get("volumes"))
            .and_then(Value::as_sequence)
            .map(|seq| seq.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    /// Add `entry` to the colon-separated list in `service`'s `var`.
    ///
    /// Works with both the mapping and the `VAR=value` list form of
    /// `environment`. Returns whether the entry was new.
    pub fn add_to_path_list(&mut self, service: &str, var: &str, entry: &str) -> Result<bool> {
        let service_map = self.service_mut(service)?;
        if service_map.get("environment").map_or(true, Value::is_null) {
            service_map.insert(
                Value::String("environment".to_string()),
                Value::Mapping(Mapping::new()),
            );
        }

        let key_path = format!("services.{service}.environment");
        match service_map.get_mut("environment") {
            Some(Value::Mapping(env)) => {
                let current = match env.get(var) {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(_) => {
                        return Err(GenError::MalformedOverride(format!(
                            "{key_path}.{var} is not a string"
                        )))
                    }
                };
                let (joined, added) = merge_path_list(&current, entry);
                env.insert(Value::String(var.to_string()), Value::String(joined));
                Ok(added)
            }
            Some(Value::Sequence(env)) => {
                let prefix = format!("{var}=");
                let existing = env
                    .iter_mut()
                    .find(|item| item.as_str().is_some_and(|s| s.starts_with(&prefix)));
                match existing {
                    Some(item) => {
                        let current = item
                            .as_str()
                            .and_then(|s| s.strip_prefix(&prefix))
                            .unwrap_or_default()
                            .to_string();
                        let (joined, added) = merge_path_list(&current, entry);
                        *item = Value::String(format!("{prefix}{joined}"));
                        Ok(added)
                    }
                    None => {
                        env.push(Value::String(format!("{prefix}{entry}")));
                        Ok(true)
                    }
                }
            }
            _ => Err(GenError::MalformedOverride(format!(
                "{key_path} is neither a mapping nor a list"
            ))),
        }
    }

    /// Current value of `service`'s environment variable `var`
    pub fn env_value(&self, service: &str, var: &str) -> Option<String> {
        match self.service(service)?.get("environment")? {
            Value::Mapping(env) => env.get(var).and_then(Value::as_str).map(String::from),
            Value::Sequence(env) => {
                let prefix = format!("{var}=");
                env.iter()
                    .filter_map(Value::as_str)
                    .find_map(|s| s.strip_prefix(&prefix).map(String::from))
            }
            _ => None,
        }
    }
}

fn child_mapping<'a>(parent: &'a mut Mapping, key: &str, key_path: &str) -> Result<&'a mut Mapping> {
    if parent.get(key).map_or(true, Value::is_null) {
        parent.insert(Value::String(key.to_string()), Value::Mapping(Mapping::new()));
    }
    match parent.get_mut(key) {
        Some(Value::Mapping(m)) => Ok(m),
        _ => Err(GenError::MalformedOverride(format!("{key_path} is not a mapping"))),
    }
}

fn child_sequence<'a>(parent: &'a mut Mapping, key: &str, key_path: &str) -> Result<&'a mut Sequence> {
    if parent.get(key).map_or(true, Value::is_null) {
        parent.insert(Value::String(key.to_string()), Value::Sequence(Sequence::new()));
    }
    match parent.get_mut(key) {
        Some(Value::Sequence(s)) => Ok(s),
        _ => Err(GenError::MalformedOverride(format!("{key_path} is not a list"))),
    }
}

/// Append `entry` to a colon-separated list unless present.
///
/// Empty segments are dropped; existing order is kept.
pub fn merge_path_list(existing: &str, entry: &str) -> (String, bool) {
    let mut entries: Vec<&str> = existing
        .split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let added = !entries.contains(&entry);
    if added {
        entries.push(entry);
    }
    (entries.join(":"), added)
}

/// Exclusive advisory lock guarding the override read-modify-write
pub struct OverrideLock {
    file: File,
    path: PathBuf,
}

impl OverrideLock {
    /// Block until the lock next to `override_path` is held
    pub fn acquire(override_path: &Path) -> Result<Self> {
        let mut name = override_path.as_os_str().to_owned();
        name.push(".lock");
        let path = PathBuf::from(name);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive().map_err(|source| GenError::Lock {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Acquired {}", path.display());
        Ok(Self { file, path })
    }
}

impl Drop for OverrideLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!("Released {}", self.path.display());
    }
}

/// What a merge changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub added_volumes: usize,
    pub config_registered: bool,
}

/// Override merge applied in memory and not yet written.
///
/// Holds the lock until committed or dropped, so the file cannot change
/// between validation and write. Dropping it leaves the file untouched.
pub struct PendingMerge {
    _lock: OverrideLock,
    path: PathBuf,
    document: OverrideDocument,
    report: MergeReport,
}

impl PendingMerge {
    pub fn report(&self) -> MergeReport {
        self.report
    }

    /// Persist the merged document, keeping the file's mode if it had one.
    pub fn commit(self) -> Result<MergeReport> {
        let mode = existing_mode(&self.path).unwrap_or(PUBLIC_FILE_MODE);
        write_atomic(&self.path, &self.document.to_yaml()?, mode)?;

        let MergeReport {
            added_volumes,
            config_registered,
        } = self.report;
        debug!(added_volumes, config_registered, "Override merged");
        Ok(self.report)
    }
}

/// Lock, load and merge `job_name`'s mounts and config path without writing.
///
/// An unparsable or wrongly shaped override fails here, before any other
/// file of the job is written.
pub fn prepare_merge(
    settings: &Settings,
    job_name: &str,
    mounts: &[MountSpec],
) -> Result<PendingMerge> {
    let path = settings.override_path();
    let compose = &settings.compose;
    info!("Updating {}", settings.display_path(&path));

    let lock = OverrideLock::acquire(&path)?;
    let mut document = OverrideDocument::load(&path)?;

    info!("- Update mounted volumes of {} service", compose.backup_service);
    let mounts: Vec<String> = mounts.iter().map(ToString::to_string).collect();
    let added_volumes = document.add_volumes(&compose.backup_service, &mounts)?;

    info!(
        "- Update {} env var of {} service",
        compose.config_env_var, compose.exporter_service
    );
    let config_registered = document.add_to_path_list(
        &compose.exporter_service,
        &compose.config_env_var,
        &settings.container_config_path(job_name),
    )?;

    Ok(PendingMerge {
        _lock: lock,
        path,
        document,
        report: MergeReport {
            added_volumes,
            config_registered,
        },
    })
}

/// Merge `job_name`'s mounts and config path into the shared override file.
pub fn merge_job(settings: &Settings, job_name: &str, mounts: &[MountSpec]) -> Result<MergeReport> {
    prepare_merge(settings, job_name, mounts)?.commit()
}
