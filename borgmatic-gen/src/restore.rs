//! Restore configuration generator.
//!
//! A restore points a read-only borgmatic config at one existing repository.
//! It is an ad hoc job: the shared compose override is not touched.

use crate::passphrase::Passphrase;
use crate::settings::Settings;
use crate::utils::fs::{write_atomic, SECRET_FILE_MODE};
use crate::utils::{GenError, Result};
use regex::Regex;
use std::path::PathBuf;
use tracing::{info, warn};

const REPOSITORY_STEM_PATTERN: &str = r"/\./([^/]+)\.borg/?$";

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    /// Full repository URL, e.g. `ssh://u1@host:23/./srv1-app-demo.borg`
    pub repository_path: String,
    pub passphrase: Passphrase,
    /// Hostname of the server that made the backups, when known
    pub server_hostname: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestoreOutcome {
    pub job_name: String,
    pub config_path: PathBuf,
    pub uses_ssh_key: bool,
}

/// Repository stem between `/./` and `.borg`
pub fn repository_stem(repository_path: &str) -> Result<String> {
    let re = Regex::new(REPOSITORY_STEM_PATTERN)
        .map_err(|e| GenError::validation(e.to_string()))?;
    re.captures(repository_path.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            GenError::validation(format!(
                "Repository path '{repository_path}' must end in /./<name>.borg"
            ))
        })
}

/// Job name of a repository: its stem without the `{server_hostname}-` prefix.
///
/// Without a known hostname everything up to the first `-` is treated as
/// the hostname.
pub fn job_name(repository_path: &str, server_hostname: Option<&str>) -> Result<String> {
    let stem = repository_stem(repository_path)?;

    let name = match server_hostname {
        Some(host) => stem.strip_prefix(&format!("{host}-")).ok_or_else(|| {
            GenError::validation(format!(
                "Repository '{stem}' was not created by server '{host}'"
            ))
        })?,
        None => stem.split_once('-').map_or(stem.as_str(), |(_, rest)| rest),
    };

    if name.is_empty() {
        return Err(GenError::validation(format!(
            "Cannot derive a job name from repository '{stem}'"
        )));
    }
    crate::job::validate_job_name(name)?;
    Ok(name.to_string())
}

/// Render the restore configuration
pub fn render(
    repository_path: &str,
    job_name: &str,
    passphrase: &Passphrase,
    ssh_key: Option<&str>,
) -> String {
    let mut document = format!(
        "match_archives: sh:*\n\
         \n\
         repositories:\n    - path: \"{repository_path}\"\n      label: {job_name}\n\
         \n\
         encryption_passphrase: \"{}\"\n",
        passphrase.expose()
    );
    if let Some(key) = ssh_key {
        document.push_str(&format!("ssh_command: ssh -i {key}\n"));
    }
    document
}

/// Write the restore configuration for `request` into the config directory.
pub fn write_restore_config(
    settings: &Settings,
    request: &RestoreRequest,
    overwrite: bool,
) -> Result<RestoreOutcome> {
    if request.repository_path.contains(['"', '\\', '\n']) {
        return Err(GenError::validation(
            "Repository path must not contain quotes, backslashes or line breaks",
        ));
    }

    let job_name = job_name(&request.repository_path, request.server_hostname.as_deref())?;
    let key_path = settings.ssh_key_path();
    let uses_ssh_key = key_path.exists();
    if !uses_ssh_key {
        warn!("No SSH key found in {}", settings.display_path(&key_path));
    }

    let container_key = settings.container.ssh_key.display().to_string();
    let content = render(
        request.repository_path.trim(),
        &job_name,
        &request.passphrase,
        uses_ssh_key.then_some(container_key.as_str()),
    );

    let config_path = settings.job_config_path(&job_name);
    if config_path.exists() && !overwrite {
        return Err(GenError::validation(format!(
            "{} already exists; pass --force to overwrite it",
            settings.display_path(&config_path)
        )));
    }

    std::fs::create_dir_all(settings.config_dir())?;
    info!("Creating Borgmatic config file at {}", settings.display_path(&config_path));
    write_atomic(&config_path, &content, SECRET_FILE_MODE)?;

    Ok(RestoreOutcome {
        job_name,
        config_path,
        uses_ssh_key,
    })
}
