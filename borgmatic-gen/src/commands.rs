//! Command implementations shared by the binary and the integration tests.
//!
//! Operator-facing text goes to the supplied writer; progress goes to
//! tracing.

use crate::compose::{self, OverrideDocument};
use crate::instructions;
use crate::job::{JobDescriptor, JobKind, JobRequest, RemoteConnection, RetentionPolicy};
use crate::passphrase::Passphrase;
use crate::restore::{self, RestoreRequest};
use crate::settings::Settings;
use crate::setup::{self, Prompter};
use crate::ssh;
use crate::synth;
use crate::utils::fs::list_job_configs;
use crate::utils::{GenError, Result};
use std::io::{BufRead, Write};
use tracing::info;

/// A positional argument of a batch command
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub example: &'static str,
}

pub const BACKUP_ARGS: [ArgSpec; 4] = [
    ArgSpec { name: "type (one of 'app' or 'http-log')", example: "app" },
    ArgSpec {
        name: "backup-server-ssh-connection",
        example: "u339567-sub1@u339567.your-storagebox.de:23",
    },
    ArgSpec { name: "server-hostname", example: "abb-croco" },
    ArgSpec { name: "job-name", example: "app-mandatendatabank" },
];

pub const RESTORE_ARGS: [ArgSpec; 2] = [
    ArgSpec {
        name: "repository-path: complete SSH connection string to the backup repository",
        example: "ssh://u1234-sub1@u1234.your-storagebox.de:23/./abb-croco-app-mandatendatabank.borg",
    },
    ArgSpec { name: "passphrase: secret passphrase of the backup repository", example: "s3cr3t" },
];

/// Unwrap positional arguments, or fail with a usage message naming every
/// missing one.
pub fn check_positionals<const N: usize>(
    specs: &[ArgSpec; N],
    values: [Option<String>; N],
) -> Result<[String; N]> {
    let given = values.iter().filter(|v| v.is_some()).count();
    if given < N {
        let expected = N;
        let mut message = format!("Script expects {expected} args, only {given} were passed.");
        for (spec, value) in specs.iter().zip(&values) {
            if value.is_none() {
                message.push_str(&format!("\n- {} (e.g. {})", spec.name, spec.example));
            }
        }
        return Err(GenError::Usage(message));
    }

    Ok(values.map(Option::unwrap_or_default))
}

/// Inputs of the batch backup generator
#[derive(Debug, Clone)]
pub struct BackupArgs {
    pub kind: JobKind,
    pub remote: RemoteConnection,
    pub local_hostname: String,
    pub job_name: String,
    pub passphrase: Option<String>,
    pub retention: RetentionPolicy,
    pub force: bool,
}

/// Generate one job config and register it in the compose override.
pub fn run_backup<W: Write>(settings: &Settings, args: BackupArgs, out: &mut W) -> Result<()> {
    writeln!(out, "\nGenerating config to backup {}", args.job_name)?;

    let generated = args.passphrase.is_none();
    let passphrase = Passphrase::resolve(args.passphrase.as_deref())?;
    let job = JobDescriptor::from_request(
        JobRequest {
            job_name: args.job_name,
            local_hostname: args.local_hostname,
            remote: args.remote,
            passphrase,
            features: args.kind.features().to_vec(),
            retention: args.retention,
        },
        &settings.container,
    )?;

    install_job(settings, &job, args.force, generated, out)?;
    writeln!(
        out,
        "{}",
        instructions::backup_next_steps(&job.job_name, job.retention, settings)
    )?;
    Ok(())
}

fn install_job<W: Write>(
    settings: &Settings,
    job: &JobDescriptor,
    overwrite: bool,
    show_passphrase: bool,
    out: &mut W,
) -> Result<()> {
    let pending = compose::prepare_merge(settings, &job.job_name, &job.mounts)?;
    let path = synth::write_job_config(job, settings, overwrite)?;
    let report = pending.commit()?;
    if show_passphrase {
        writeln!(out, "{}", job.passphrase.banner(&job.job_name))?;
    }

    info!(
        job = %job.job_name,
        config = %settings.display_path(&path),
        added_volumes = report.added_volumes,
        "Job configured"
    );
    Ok(())
}

/// Inputs of the restore generator
#[derive(Debug, Clone)]
pub struct RestoreArgs {
    pub repository_path: String,
    pub passphrase: String,
    pub server_hostname: Option<String>,
    pub force: bool,
}

pub fn run_restore<W: Write>(settings: &Settings, args: RestoreArgs, out: &mut W) -> Result<()> {
    let request = RestoreRequest {
        repository_path: args.repository_path,
        passphrase: Passphrase::from_operator(&args.passphrase)?,
        server_hostname: args.server_hostname,
    };

    let outcome = restore::write_restore_config(settings, &request, args.force)?;
    writeln!(out, "\nGenerating config to restore {}", outcome.job_name)?;
    if !outcome.uses_ssh_key {
        writeln!(out, "{}", instructions::missing_key_warning(settings))?;
    }
    writeln!(out, "{}", instructions::restore_next_steps(&outcome.job_name))?;
    Ok(())
}

/// Interactive multi-job setup
pub fn run_setup<R: BufRead, W: Write>(
    settings: &Settings,
    prompter: &mut Prompter<R, W>,
    default_hostname: &str,
) -> Result<()> {
    let answers = setup::gather(prompter, settings, default_hostname, |name| {
        settings.job_config_path(name).exists()
    })?;

    if answers.authorize_key {
        let public_key = ssh::ensure_keypair(&settings.ssh_key_path())?;
        ssh::authorize_key(&answers.remote, &public_key)?;
    }

    if answers.apps.is_empty() {
        writeln!(prompter.output(), "\nNothing to configure.")?;
        return Ok(());
    }

    let mut configured = Vec::new();
    for app in answers.apps {
        writeln!(prompter.output(), "\nGenerating passphrase for {}...", app.name)?;
        let job = JobDescriptor::from_request(
            JobRequest {
                job_name: app.name,
                local_hostname: answers.local_hostname.clone(),
                remote: answers.remote.clone(),
                passphrase: Passphrase::generate(),
                features: app.features,
                retention: RetentionPolicy::AppendOnly,
            },
            &settings.container,
        )?;

        // Existing configs were confirmed for overwrite while asking
        install_job(settings, &job, true, true, prompter.output())?;
        configured.push(job.job_name);
    }

    writeln!(
        prompter.output(),
        "{}",
        instructions::setup_summary(&configured, settings)
    )?;
    Ok(())
}

/// List job configs and whether the exporter knows about them.
pub fn run_list<W: Write>(settings: &Settings, out: &mut W) -> Result<()> {
    let jobs = list_job_configs(&settings.config_dir())?;
    if jobs.is_empty() {
        writeln!(out, "No job configurations in {}", settings.display_path(&settings.config_dir()))?;
        return Ok(());
    }

    let document = OverrideDocument::load(&settings.override_path())?;
    let compose = &settings.compose;
    let registered = document
        .env_value(&compose.exporter_service, &compose.config_env_var)
        .unwrap_or_default();
    let registered: Vec<&str> = registered.split(':').collect();

    for job in jobs {
        let container_path = settings.container_config_path(&job);
        let note = if registered.contains(&container_path.as_str()) {
            ""
        } else {
            " (not in exporter config)"
        };
        writeln!(out, "{job}{note}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.paths.work_dir = dir.path().to_path_buf();
        settings
    }

    fn backup_args(job: &str) -> BackupArgs {
        BackupArgs {
            kind: JobKind::App,
            remote: RemoteConnection::parse("user@host:23", 23).unwrap(),
            local_hostname: "srv1".to_string(),
            job_name: job.to_string(),
            passphrase: None,
            retention: RetentionPolicy::AppendOnly,
            force: false,
        }
    }

    fn some(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    #[test]
    fn test_check_positionals_returns_values() {
        let values = check_positionals(&RESTORE_ARGS, [some("ssh://u@h:23/./a-b.borg"), some("pw")])
            .unwrap();
        assert_eq!(values, ["ssh://u@h:23/./a-b.borg".to_string(), "pw".to_string()]);
    }

    #[test]
    fn test_check_positionals_lists_missing() {
        let err = check_positionals(&BACKUP_ARGS, [some("app"), some("u@h"), None, None]).unwrap_err();
        let GenError::Usage(message) = err else {
            panic!("expected a usage error");
        };
        assert!(message.starts_with("Script expects 4 args, only 2 were passed."));
        assert!(message.contains("- server-hostname (e.g. abb-croco)"));
        assert!(message.contains("- job-name (e.g. app-mandatendatabank)"));
        assert!(!message.contains("- backup-server-ssh-connection"));
    }

    #[test]
    fn test_backup_writes_config_and_override() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let settings = settings_in(&temp_dir);
        let mut out = Vec::new();

        run_backup(&settings, backup_args("app-demo"), &mut out).unwrap();

        let config = std::fs::read_to_string(settings.job_config_path("app-demo"))?;
        assert!(config.contains("archive_name_format: 'srv1-app-demo-{now}'"));
        assert!(config.contains("ssh://user@host:23/./srv1-app-demo.borg"));
        assert!(config.contains("label=com.docker.compose.project=app-demo"));

        let doc = OverrideDocument::load(&settings.override_path()).unwrap();
        assert!(doc
            .volumes("borgmatic")
            .contains(&"/data/app-demo:/data/app-demo:ro".to_string()));

        // The generated passphrase is shown exactly once
        let shown = String::from_utf8(out).unwrap();
        let secret = config
            .lines()
            .find_map(|l| l.strip_prefix("encryption_passphrase: \""))
            .and_then(|l| l.strip_suffix('"'))
            .unwrap();
        assert_eq!(shown.matches(secret).count(), 1);
        Ok(())
    }

    #[test]
    fn test_supplied_passphrase_is_not_echoed() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let settings = settings_in(&temp_dir);
        let mut args = backup_args("app-demo");
        args.passphrase = Some("operator-secret".to_string());
        let mut out = Vec::new();

        run_backup(&settings, args, &mut out).unwrap();
        assert!(!String::from_utf8(out).unwrap().contains("operator-secret"));
        Ok(())
    }

    #[test]
    fn test_unparsable_override_leaves_no_job_config() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let settings = settings_in(&temp_dir);
        std::fs::write(settings.override_path(), "services: {borgmatic: [\n")?;
        let mut out = Vec::new();

        assert!(run_backup(&settings, backup_args("app-demo"), &mut out).is_err());
        assert!(!settings.job_config_path("app-demo").exists());
        assert!(!String::from_utf8(out).unwrap().contains("Passphrase for"));

        // Once the override is repaired the same command succeeds without --force
        std::fs::remove_file(settings.override_path())?;
        run_backup(&settings, backup_args("app-demo"), &mut Vec::new()).unwrap();
        assert!(settings.job_config_path("app-demo").exists());
        Ok(())
    }

    #[test]
    fn test_second_job_keeps_first_jobs_entries() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let settings = settings_in(&temp_dir);

        run_backup(&settings, backup_args("alpha"), &mut Vec::new()).unwrap();
        let before = OverrideDocument::load(&settings.override_path()).unwrap();
        run_backup(&settings, backup_args("beta"), &mut Vec::new()).unwrap();
        let after = OverrideDocument::load(&settings.override_path()).unwrap();

        let after_volumes = after.volumes("borgmatic");
        for volume in before.volumes("borgmatic") {
            assert!(after_volumes.contains(&volume));
        }
        assert_eq!(
            after.env_value("borgmatic-exporter", "BORGMATIC_CONFIG").as_deref(),
            Some("/etc/borgmatic.d/alpha.yml:/etc/borgmatic.d/beta.yml")
        );
        Ok(())
    }

    #[test]
    fn test_list_reports_registration() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let settings = settings_in(&temp_dir);
        run_backup(&settings, backup_args("alpha"), &mut Vec::new()).unwrap();
        std::fs::write(settings.job_config_path("manual"), b"")?;

        let mut out = Vec::new();
        run_list(&settings, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "alpha\nmanual (not in exporter config)\n"
        );
        Ok(())
    }

    #[test]
    fn test_setup_configures_each_app() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let settings = settings_in(&temp_dir);
        let input = ["", "", "", "srv1", "n", "app-a app-b", "", "", "", "", "n", "", "", ""]
            .join("\n")
            + "\n";
        let mut prompter = Prompter::new(Cursor::new(input.into_bytes()), Vec::new());

        run_setup(&settings, &mut prompter, "detected").unwrap();

        let a = std::fs::read_to_string(settings.job_config_path("app-a"))?;
        let b = std::fs::read_to_string(settings.job_config_path("app-b"))?;
        assert!(a.contains("before_backup:"));
        assert!(!b.contains("before_backup:"));
        assert!(a.contains("ssh://u339567-sub1@u339567.your-storagebox.de:23/./srv1-app-a.borg"));

        let doc = OverrideDocument::load(&settings.override_path()).unwrap();
        assert_eq!(
            doc.env_value("borgmatic-exporter", "BORGMATIC_CONFIG").as_deref(),
            Some("/etc/borgmatic.d/app-a.yml:/etc/borgmatic.d/app-b.yml")
        );

        let shown = String::from_utf8(prompter.into_output()).unwrap();
        assert!(shown.contains("Passphrase for app-a"));
        assert!(shown.contains("Passphrase for app-b"));
        Ok(())
    }
}
