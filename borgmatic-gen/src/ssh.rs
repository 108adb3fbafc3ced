//! SSH key handling for the backup server.
//!
//! Key generation and transfer are delegated to `ssh-keygen` and `sftp`.
//! A failing tool aborts the run; nothing is retried.

use crate::job::RemoteConnection;
use crate::utils::{GenError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Options restricting our key to an append-only `borg serve`
pub const RESTRICT_OPTIONS: &str =
    r#"command="borg serve --umask=077 --info --append-only",restrict"#;

/// Path of the public half of `key_path`
pub fn public_key_path(key_path: &Path) -> PathBuf {
    let mut name = key_path.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

/// Return the public key at `key_path`, generating the pair first if needed.
pub fn ensure_keypair(key_path: &Path) -> Result<String> {
    if key_path.exists() {
        info!("Found existing key at {}, using it", key_path.display());
    } else {
        if let Some(parent) = key_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Generating new key at {}", key_path.display());
        let path = key_path.to_string_lossy().into_owned();
        run_tool(
            Command::new("ssh-keygen").args(["-q", "-t", "ed25519", "-N", "", "-f", path.as_str()]),
            None,
        )?;
    }

    let public_key = std::fs::read_to_string(public_key_path(key_path))?;
    let public_key = public_key.trim().to_string();
    validate_public_key(&public_key)?;
    Ok(public_key)
}

/// Refuse anything that is not a single-line OpenSSH public key.
pub fn validate_public_key(public_key: &str) -> Result<()> {
    let mut parts = public_key.split_whitespace();
    let well_formed = matches!(
        (parts.next(), parts.next()),
        (Some(kind), Some(_)) if kind.starts_with("ssh-") || kind.starts_with("ecdsa-")
    );
    if !well_formed || public_key.contains(['\n', '\r']) {
        return Err(GenError::validation("Not an OpenSSH public key"));
    }
    Ok(())
}

/// `authorized_keys` content with the restricted entry for `public_key`
/// appended, or `None` when the key is already authorized.
pub fn append_authorization(existing: &str, public_key: &str) -> Option<String> {
    if existing.lines().any(|line| line.contains(public_key)) {
        return None;
    }

    let mut updated = existing.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&format!("{RESTRICT_OPTIONS} {public_key}\n"));
    Some(updated)
}

/// Install `public_key` on the backup server, restricted to append-only borg.
///
/// Returns `false` when the key was already present.
pub fn authorize_key(remote: &RemoteConnection, public_key: &str) -> Result<bool> {
    validate_public_key(public_key)?;
    let scratch = tempfile::tempdir()?;
    let local = scratch.path().join("authorized_keys");
    let local_str = local.to_string_lossy().into_owned();

    info!("Fetching authorized_keys from {}", remote);
    sftp(remote, &format!("-mkdir .ssh\n-get .ssh/authorized_keys {local_str}\nbye\n"))?;

    let existing = match std::fs::read_to_string(&local) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let Some(updated) = append_authorization(&existing, public_key) else {
        info!("Key is already authorized on {}", remote.host);
        return Ok(false);
    };

    std::fs::write(&local, updated)?;
    info!("Uploading authorized_keys to {}", remote);
    sftp(
        remote,
        &format!("put {local_str} .ssh/authorized_keys\nchmod 600 .ssh/authorized_keys\nbye\n"),
    )?;
    Ok(true)
}

fn sftp(remote: &RemoteConnection, script: &str) -> Result<String> {
    let port = remote.port.to_string();
    let target = format!("{}@{}", remote.user, remote.host);
    run_tool(
        Command::new("sftp").args([
            "-P",
            port.as_str(),
            "-o",
            "StrictHostKeyChecking=accept-new",
            target.as_str(),
        ]),
        Some(script),
    )
}

/// Run an external tool, feeding `input` on stdin. Non-zero exit is an error.
fn run_tool(command: &mut Command, input: Option<&str>) -> Result<String> {
    let tool = command.get_program().to_string_lossy().to_string();
    debug!(tool = %tool, "Running external tool");

    let spawn = command
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = spawn.map_err(|e| GenError::ExternalTool {
        tool: tool.clone(),
        message: e.to_string(),
    })?;

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin.write_all(input.as_bytes())?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(GenError::ExternalTool {
            tool,
            message: if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            },
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
