//! Job configuration synthesis.
//!
//! Renders a [`JobDescriptor`] into borgmatic YAML. The layout is fixed
//! text so that identical input always produces byte-identical output.

use crate::job::{JobDescriptor, RetentionPolicy};
use crate::settings::Settings;
use crate::utils::fs::{write_atomic, SECRET_FILE_MODE};
use crate::utils::{GenError, Result};
use std::path::PathBuf;
use tracing::info;

/// Render the borgmatic configuration for `job`
pub fn render(job: &JobDescriptor, settings: &Settings) -> String {
    let mut sections = vec![
        format!("archive_name_format: '{}'", job.archive_name_format()),
        format!(
            "repositories:\n    - path: \"{}\"\n      label: {}",
            job.repository_url(),
            job.job_name
        ),
        format!(
            "encryption_passphrase: \"{}\"\nssh_command: ssh -i {}",
            job.passphrase.expose(),
            settings.container.ssh_key.display()
        ),
        list_section("source_directories", &job.source_paths),
    ];

    if !job.before_hooks.is_empty() {
        sections.push(list_section("before_backup", &job.before_hooks));
    }
    if !job.after_hooks.is_empty() {
        sections.push(list_section("after_backup", &job.after_hooks));
    }

    match job.retention {
        RetentionPolicy::AppendOnly => {
            sections.push(list_section("skip_actions", &["compact", "prune"]));
        }
        RetentionPolicy::Full => {
            let r = &settings.retention;
            sections.push(format!(
                "keep_daily: {}\nkeep_weekly: {}\nkeep_monthly: {}",
                r.keep_daily, r.keep_weekly, r.keep_monthly
            ));
        }
    }

    let mut document = sections.join("\n\n");
    document.push('\n');
    document
}

fn list_section<S: AsRef<str>>(key: &str, items: &[S]) -> String {
    let mut section = format!("{key}:");
    for item in items {
        section.push_str("\n    - ");
        section.push_str(item.as_ref());
    }
    section
}

/// Write `job`'s configuration to `{config_dir}/{job_name}.yml` with mode 0600.
///
/// An existing file for the same job is only replaced when `overwrite` is set.
pub fn write_job_config(job: &JobDescriptor, settings: &Settings, overwrite: bool) -> Result<PathBuf> {
    let path = settings.job_config_path(&job.job_name);
    if path.exists() && !overwrite {
        return Err(GenError::validation(format!(
            "{} already exists; pass --force to overwrite it",
            settings.display_path(&path)
        )));
    }

    std::fs::create_dir_all(settings.config_dir())?;
    info!("Creating Borgmatic config file at {}", settings.display_path(&path));
    write_atomic(&path, &render(job, settings), SECRET_FILE_MODE)?;
    Ok(path)
}
