//! File helpers shared by the config writers.
//!
//! Files are written to a temp file next to the target and renamed into
//! place, so an interrupted run leaves either the old or the new content.

use super::errors::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Owner read/write only; job configs embed the repository passphrase.
pub const SECRET_FILE_MODE: u32 = 0o600;

/// Default mode for files without secrets.
pub const PUBLIC_FILE_MODE: u32 = 0o644;

/// Atomically replace `path` with `content` and set its Unix mode.
pub fn write_atomic(path: &Path, content: &str, mode: u32) -> Result<()> {
    let dir = parent_dir(path);
    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    set_mode(tmp.path(), mode)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Current Unix mode of `path`, if it exists.
pub fn existing_mode(path: &Path) -> Option<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o777)
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        None
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Stems of the `*.yml` / `*.yaml` files directly inside `dir`, sorted.
///
/// A missing directory yields an empty list.
pub fn list_job_configs(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut stems = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if !is_yaml {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }

    stems.sort();
    Ok(stems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_file() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("job.yml");

        write_atomic(&path, "a: 1\n", PUBLIC_FILE_MODE).unwrap();
        assert_eq!(fs::read_to_string(&path)?, "a: 1\n");

        write_atomic(&path, "a: 2\n", PUBLIC_FILE_MODE).unwrap();
        assert_eq!(fs::read_to_string(&path)?, "a: 2\n");

        // No stray temp files left next to the target
        assert_eq!(fs::read_dir(temp_dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_write_atomic_sets_mode() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("secret.yml");

        write_atomic(&path, "encryption_passphrase: x\n", SECRET_FILE_MODE).unwrap();
        assert_eq!(existing_mode(&path), Some(0o600));
        Ok(())
    }

    #[test]
    fn test_list_job_configs() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("beta.yml"), b"")?;
        fs::write(temp_dir.path().join("alpha.yaml"), b"")?;
        fs::write(temp_dir.path().join("notes.txt"), b"")?;
        fs::create_dir(temp_dir.path().join("nested.yml"))?;

        let stems = list_job_configs(temp_dir.path()).unwrap();
        assert_eq!(stems, vec!["alpha".to_string(), "beta".to_string()]);
        Ok(())
    }

    #[test]
    fn test_list_job_configs_missing_dir() {
        let stems = list_job_configs(Path::new("/nonexistent/borgmatic.d")).unwrap();
        assert!(stems.is_empty());
    }
}
