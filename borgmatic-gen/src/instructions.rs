//! Next-step instructions printed after a successful run.

use crate::job::RetentionPolicy;
use crate::settings::Settings;

const RULE: &str =
    "####################################################################################################";

/// Steps to initialise and use a freshly configured backup job
pub fn backup_next_steps(job_name: &str, retention: RetentionPolicy, settings: &Settings) -> String {
    let service = &settings.compose.backup_service;
    let append_only = match retention {
        RetentionPolicy::AppendOnly => " --append-only",
        RetentionPolicy::Full => "",
    };

    format!(
        "\nYour app is almost ready to backup!\n\
         Execute the following steps to finish the setup:\n\
         > drc up -d\n\
         > drc exec {service} borgmatic init --repository {job_name} --encryption repokey{append_only}\n\
         > drc exec {service} borgmatic key export --repository {job_name}\n\
         \n{RULE}\n\
         \x20 !!! Make sure to keep the exported key somewhere safe together with the generated passphrase !!!\n\
         {RULE}\n\
         \nYou can configure the frequency of automatic backups via the 'BACKUP_CRON' env var on the {service} service.\n\
         To create a new backup manually:\n\
         > drc exec {service} borgmatic create --repository {job_name} --stats"
    )
}

/// Checklist shown at the end of the interactive setup
pub fn setup_summary(job_names: &[String], settings: &Settings) -> String {
    let compose = &settings.compose;
    let key = settings.display_path(&settings.ssh_key_path());
    let jobs = job_names.join(", ");

    format!(
        "\nConfigurations for {jobs} were written and {override_file} was updated.\n\
         You might want to:\n\
         \x20 - Review the configuration files\n\
         \x20 - Check that the SSH key is mounted at {container_key} (generated keys live in {key})\n\
         \x20 - Check the {var} variable lists all borgmatic configuration files:\n\
         \x20     `docker compose config | grep {var}`\n\
         \x20 - Verify the cron patterns for {backup} and {exporter}:\n\
         \x20     `docker compose config | grep CRON`\n\
         \n\
         If everything is OK, start the containers and initialize each repository:\n\
         \x20 `docker compose up -d`\n\
         \x20 `docker compose exec {backup} borgmatic init -e repokey --append-only`\n\
         \n\
         As a precaution you might want to export the encryption keys:\n\
         \x20 `docker compose exec {backup} borgmatic key export`",
        override_file = settings.display_path(&settings.override_path()),
        container_key = settings.container.ssh_key.display(),
        var = compose.config_env_var,
        backup = compose.backup_service,
        exporter = compose.exporter_service,
    )
}

/// Warning shown when a restore has to fall back to password authentication
pub fn missing_key_warning(settings: &Settings) -> String {
    let key = settings.display_path(&settings.ssh_key_path());
    format!(
        "\nNo SSH key found in {key}.\n\
         Restore will be configured to use password authentication which may be cumbersome since you'll have to enter the password multiple times.\n\
         If you want to authenticate with an SSH key, provide one in {key} and rerun the script.\n"
    )
}

/// Steps to start restoring from `job_name`'s repository
pub fn restore_next_steps(job_name: &str) -> String {
    format!(
        "\nYour app is almost ready to restore!\n\
         Execute the following steps to finish the setup:\n\
         > drc up -d (or 'drc restart borgmatic-restore' if your stack is already running)\n\
         \n\
         List the available backups:\n\
         > drc exec borgmatic-restore borgmatic list --repository {job_name}"
    )
}
