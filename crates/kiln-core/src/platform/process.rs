//! Process-level helpers: identity, clock, naming, and PID files.
//!
//! None of this takes part in the wire protocol. Daemon-side tooling such
//! as the stub daemon uses it to manage its own lifetime.

use crate::error::FsError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// PID of the calling process.
pub fn current_pid() -> u32 {
    nix::unistd::getpid().as_raw() as u32
}

/// Wall-clock time in milliseconds since the Unix epoch.
pub fn current_time_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Host name of the machine.
pub fn host_name() -> io::Result<String> {
    let name = nix::unistd::gethostname().map_err(io::Error::from)?;
    Ok(name.to_string_lossy().into_owned())
}

/// Set the name shown for this process in `ps` and `top`.
///
/// The kernel truncates the name to 15 bytes.
#[cfg(target_os = "linux")]
pub fn set_process_name(name: &str) -> io::Result<()> {
    let name = std::ffi::CString::new(name)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    nix::sys::prctl::set_name(&name).map_err(io::Error::from)
}

#[cfg(not(target_os = "linux"))]
pub fn set_process_name(_name: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process renaming is only supported on Linux",
    ))
}

/// Current name of this process.
#[cfg(target_os = "linux")]
pub fn process_name() -> io::Result<String> {
    let name = nix::sys::prctl::get_name().map_err(io::Error::from)?;
    Ok(name.to_string_lossy().into_owned())
}

#[cfg(not(target_os = "linux"))]
pub fn process_name() -> io::Result<String> {
    std::env::args()
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no argv[0]"))
}

/// Exclusive PID file, removed when dropped.
///
/// The file stays locked for the lifetime of the guard, so a second
/// process trying to take the same path fails instead of overwriting it.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    /// Lock `path`, then write the current PID into it with `mode`
    /// permission bits.
    pub fn create(path: impl Into<PathBuf>, mode: u32) -> Result<Self, FsError> {
        use std::os::unix::fs::OpenOptionsExt;

        let path = path.into();
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(mode)
            .open(&path)
            .map_err(|e| FsError::io_with_path(e, &path))?;

        file.try_lock_exclusive()
            .map_err(|e| FsError::io_with_path(e, &path))?;

        file.set_len(0)
            .and_then(|()| write!(file, "{}", current_pid()))
            .and_then(|()| file.flush())
            .map_err(|e| FsError::io_with_path(e, &path))?;

        debug!("Wrote PID file {}", path.display());
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID recorded in the file at `path`, if it holds one.
    pub fn read(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path).ok()?.trim().parse().ok()
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove PID file {}: {}", self.path.display(), e);
            }
        }
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_current_pid_matches_std() {
        assert_eq!(current_pid(), std::process::id());
    }

    #[test]
    fn test_current_time_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(current_time_ms() > 1_577_836_800_000);
    }

    #[test]
    fn test_host_name_not_empty() {
        assert!(!host_name().unwrap().is_empty());
    }

    #[test]
    fn test_pid_file_lifecycle() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kilnd.pid");

        let guard = PidFile::create(&path, 0o644).unwrap();
        assert_eq!(PidFile::read(&path), Some(std::process::id()));
        assert_eq!(guard.path(), path);

        // A second guard on the same path must not take over.
        assert!(PidFile::create(&path, 0o644).is_err());

        drop(guard);
        assert!(!path.exists());
        assert_eq!(PidFile::read(&path), None);
    }
}
