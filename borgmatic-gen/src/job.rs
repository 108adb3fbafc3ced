//! Job model: one backup configuration unit.
//!
//! [`JobRequest`] is the fully-populated input gathered from arguments or
//! prompts; [`JobDescriptor::from_request`] turns it into the immutable
//! description the writers consume.

use crate::features::{self, Feature};
use crate::passphrase::Passphrase;
use crate::settings::ContainerConfig;
use crate::utils::{GenError, Result};
use std::fmt;
use std::str::FromStr;

/// Validate an SSH port. Accepts 1..=65534.
pub fn parse_port(input: &str) -> Result<u16> {
    let trimmed = input.trim();
    let invalid = || GenError::validation(format!("Not a valid port: {trimmed}"));
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let port: u32 = trimmed.parse().map_err(|_| invalid())?;

    if port == 0 || port >= 65535 {
        return Err(GenError::validation(format!(
            "Not a valid port: {trimmed} (expected 1-65534)"
        )));
    }
    Ok(port as u16)
}

/// Part of an SSH endpoint: non-empty, no separators, quotes or whitespace.
fn is_endpoint_part(s: &str) -> bool {
    !s.is_empty()
        && !s.chars().any(|c| {
            c.is_whitespace() || c.is_control() || matches!(c, '/' | '@' | ':' | '"' | '\'' | '\\')
        })
}

/// Validate the login name on the backup server.
pub fn validate_remote_user(user: &str) -> Result<()> {
    if !is_endpoint_part(user) {
        return Err(GenError::validation(format!(
            "Not a valid backup server user: '{user}'"
        )));
    }
    Ok(())
}

/// Validate the backup server's hostname or IP address.
pub fn validate_remote_host(host: &str) -> Result<()> {
    if !is_endpoint_part(host) {
        return Err(GenError::validation(format!(
            "Not a valid backup server host: '{host}'"
        )));
    }
    Ok(())
}

/// SSH endpoint of the backup server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConnection {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl RemoteConnection {
    /// Parse `[ssh://]user@host[:port]`, using `default_port` when none is given.
    pub fn parse(input: &str, default_port: u16) -> Result<Self> {
        let raw = input.trim();
        let rest = raw.strip_prefix("ssh://").unwrap_or(raw);

        let (user, endpoint) = rest.split_once('@').ok_or_else(|| {
            GenError::validation(format!("Connection string '{raw}' must look like user@host:port"))
        })?;

        let (host, port) = match endpoint.rsplit_once(':') {
            Some((host, "")) => (host, default_port),
            Some((host, port)) => (host, parse_port(port)?),
            None => (endpoint, default_port),
        };

        if validate_remote_user(user).is_err() || validate_remote_host(host).is_err() {
            return Err(GenError::validation(format!(
                "Connection string '{raw}' must look like user@host:port"
            )));
        }

        Ok(Self {
            user: user.to_string(),
            host: host.to_string(),
            port,
        })
    }

    /// `ssh://` URL of the repository holding `{local_hostname}-{job_name}`
    pub fn repository_url(&self, local_hostname: &str, job_name: &str) -> String {
        format!(
            "ssh://{}@{}:{}/./{}-{}.borg",
            self.user, self.host, self.port, local_hostname, job_name
        )
    }
}

impl fmt::Display for RemoteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// Kind of job the batch generator knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// semantic.works application stack
    App,
    /// HTTP log archive
    HttpLog,
}

impl JobKind {
    pub fn features(self) -> &'static [Feature] {
        match self {
            JobKind::App => &[
                Feature::Stack,
                Feature::Triplestore,
                Feature::Authorization,
                Feature::Search,
                Feature::FileService,
            ],
            JobKind::HttpLog => &[Feature::HttpLogs],
        }
    }
}

impl FromStr for JobKind {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "app" => Ok(JobKind::App),
            "http-log" => Ok(JobKind::HttpLog),
            _ => Err(GenError::validation(
                "Argument 'type' must be one of 'app' or 'http-log'",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Repository only grows; prune and compact are skipped
    #[default]
    AppendOnly,
    /// Regular keep_* retention
    Full,
}

impl FromStr for RetentionPolicy {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "append-only" => Ok(RetentionPolicy::AppendOnly),
            "full" => Ok(RetentionPolicy::Full),
            _ => Err(GenError::validation(
                "retention must be one of 'append-only' or 'full'",
            )),
        }
    }
}

/// Mount spec `host_path:container_path[:mode]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountSpec {
    pub host: String,
    pub container: String,
    pub mode: Option<String>,
}

impl MountSpec {
    /// Same path on both sides, read-only
    pub fn read_only(path: &str) -> Self {
        Self {
            host: path.to_string(),
            container: path.to_string(),
            mode: Some("ro".to_string()),
        }
    }

    /// Same path on both sides, writable
    pub fn read_write(path: &str) -> Self {
        Self {
            host: path.to_string(),
            container: path.to_string(),
            mode: None,
        }
    }
}

impl fmt::Display for MountSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)?;
        if let Some(mode) = &self.mode {
            write!(f, ":{mode}")?;
        }
        Ok(())
    }
}

impl FromStr for MountSpec {
    type Err = GenError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let (host, container, mode) = match parts.as_slice() {
            [host, container] => (*host, *container, None),
            [host, container, mode] => (*host, *container, Some(mode.to_string())),
            _ => return Err(GenError::validation(format!("Invalid mount spec: {s}"))),
        };
        if host.is_empty() || container.is_empty() {
            return Err(GenError::validation(format!("Invalid mount spec: {s}")));
        }
        Ok(Self {
            host: host.to_string(),
            container: container.to_string(),
            mode,
        })
    }
}

/// Letters, digits, `-`, `_` and `.`, not starting with a dot
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Validate a job name. It becomes a file stem and part of the repository name.
pub fn validate_job_name(name: &str) -> Result<()> {
    if !is_plain_name(name) {
        return Err(GenError::validation(format!(
            "Invalid job name '{name}': use letters, digits, '-', '_' or '.'"
        )));
    }
    Ok(())
}

/// Validate the hostname of the server being backed up. It is part of the
/// repository name and the archive name format.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    if !is_plain_name(hostname) {
        return Err(GenError::validation(format!(
            "Invalid server hostname '{hostname}': use letters, digits, '-', '_' or '.'"
        )));
    }
    Ok(())
}

/// Everything needed to synthesize one job
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_name: String,
    pub local_hostname: String,
    pub remote: RemoteConnection,
    pub passphrase: Passphrase,
    pub features: Vec<Feature>,
    pub retention: RetentionPolicy,
}

#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub job_name: String,
    pub local_hostname: String,
    pub remote: RemoteConnection,
    pub passphrase: Passphrase,
    pub source_paths: Vec<String>,
    pub before_hooks: Vec<String>,
    pub after_hooks: Vec<String>,
    pub mounts: Vec<MountSpec>,
    pub retention: RetentionPolicy,
}

impl JobDescriptor {
    pub fn from_request(request: JobRequest, container: &ContainerConfig) -> Result<Self> {
        validate_job_name(&request.job_name)?;
        let local_hostname = request.local_hostname.trim().to_string();
        validate_hostname(&local_hostname)?;
        if request.features.is_empty() {
            return Err(GenError::validation(format!(
                "job '{}' selects nothing to back up",
                request.job_name
            )));
        }

        let contribution = features::expand(&request.features, &request.job_name, container);

        Ok(Self {
            job_name: request.job_name,
            local_hostname,
            remote: request.remote,
            passphrase: request.passphrase,
            source_paths: contribution.source_paths,
            before_hooks: contribution.before_hooks,
            after_hooks: contribution.after_hooks,
            mounts: contribution.mounts,
            retention: request.retention,
        })
    }

    pub fn repository_url(&self) -> String {
        self.remote.repository_url(&self.local_hostname, &self.job_name)
    }

    pub fn archive_name_format(&self) -> String {
        format!("{}-{}-{{now}}", self.local_hostname, self.job_name)
    }
}
