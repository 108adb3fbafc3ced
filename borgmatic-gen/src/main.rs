//! borgmatic-gen - Main entry point
//!
//! Generates borgmatic job configurations and patches the compose override.

use anyhow::Result;
use borgmatic_gen::commands::{self, BackupArgs, RestoreArgs, BACKUP_ARGS, RESTORE_ARGS};
use borgmatic_gen::job::{JobKind, RemoteConnection, RetentionPolicy};
use borgmatic_gen::setup::Prompter;
use borgmatic_gen::{utils, GenError, Settings};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the generator's settings file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Compose project directory (overrides settings)
    #[arg(short, long, value_name = "DIR", global = true)]
    work_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the configuration of one backup job
    Backup {
        /// Job type: app or http-log
        #[arg(value_name = "TYPE")]
        kind: Option<String>,

        /// Backup server connection, user@host[:port]
        #[arg(value_name = "REMOTE-SSH-CONNECTION-STRING")]
        connection: Option<String>,

        /// Hostname of the server being backed up
        #[arg(value_name = "SERVER-HOSTNAME")]
        server_hostname: Option<String>,

        /// Name of the job; also the config file stem
        #[arg(value_name = "JOB-NAME")]
        job_name: Option<String>,

        /// Use this passphrase instead of generating one
        #[arg(long)]
        passphrase: Option<String>,

        /// Retention policy: append-only or full
        #[arg(long, default_value = "append-only")]
        retention: RetentionPolicy,

        /// Overwrite an existing configuration for the same job
        #[arg(long)]
        force: bool,
    },

    /// Generate a configuration to restore from an existing repository
    Restore {
        /// Full repository URL ending in /./<name>.borg
        #[arg(value_name = "REPOSITORY-PATH")]
        repository_path: Option<String>,

        /// Passphrase of the repository
        #[arg(value_name = "PASSPHRASE")]
        passphrase: Option<String>,

        /// Hostname of the server that created the repository
        #[arg(long)]
        server_hostname: Option<String>,

        /// Overwrite an existing configuration for the same job
        #[arg(long)]
        force: bool,
    },

    /// Interactively configure one or more jobs
    Setup,

    /// List configured jobs
    List,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<GenError>() {
                Some(GenError::Usage(message)) => eprintln!("\n{message}"),
                _ => eprintln!("Error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(work_dir) = args.work_dir {
        settings.paths.work_dir = work_dir;
    }

    let log_level = args.log_level.as_deref().unwrap_or(&settings.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!(
        "Starting borgmatic-gen v{} (work dir: {})",
        env!("CARGO_PKG_VERSION"),
        settings.paths.work_dir.display()
    );

    let stdout = std::io::stdout();
    match args.command {
        Command::Backup {
            kind,
            connection,
            server_hostname,
            job_name,
            passphrase,
            retention,
            force,
        } => {
            let [kind, connection, server_hostname, job_name] = commands::check_positionals(
                &BACKUP_ARGS,
                [kind, connection, server_hostname, job_name],
            )?;

            let backup = BackupArgs {
                kind: kind.parse::<JobKind>()?,
                remote: RemoteConnection::parse(&connection, settings.defaults.port)?,
                local_hostname: server_hostname,
                job_name,
                passphrase,
                retention,
                force,
            };
            commands::run_backup(&settings, backup, &mut stdout.lock())?;
        }
        Command::Restore {
            repository_path,
            passphrase,
            server_hostname,
            force,
        } => {
            let [repository_path, passphrase] =
                commands::check_positionals(&RESTORE_ARGS, [repository_path, passphrase])?;

            let restore = RestoreArgs {
                repository_path,
                passphrase,
                server_hostname,
                force,
            };
            commands::run_restore(&settings, restore, &mut stdout.lock())?;
        }
        Command::Setup => {
            let default_hostname = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "localhost".to_string());
            let stdin = std::io::stdin();
            let mut prompter = Prompter::new(stdin.lock(), stdout.lock());
            commands::run_setup(&settings, &mut prompter, &default_hostname)?;
        }
        Command::List => {
            commands::run_list(&settings, &mut stdout.lock())?;
        }
    }

    Ok(())
}
