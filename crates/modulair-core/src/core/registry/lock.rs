use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use fs4::FileExt;
use modulair_domain::Scope;

use crate::errors::EnvError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive advisory lock on a registry's `.lock` sibling. Released when
/// dropped, or by the kernel if the process dies while holding it.
#[derive(Debug)]
pub(crate) struct RegistryLock {
    _file: File,
}

impl RegistryLock {
    pub(crate) fn acquire(
        lock_path: &Path,
        document: &Path,
        scope: &Scope,
        timeout: Duration,
    ) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|err| unavailable(scope, parent, &err))?;
        }
        let file = open_lock_file(lock_path).map_err(|err| {
            if err.kind() == ErrorKind::PermissionDenied {
                unavailable(scope, lock_path, &err)
            } else {
                anyhow::Error::new(err).context(format!("failed to open {}", lock_path.display()))
            }
        })?;
        if matches!(scope, Scope::Group(_)) {
            share_with_group(&file, lock_path);
        }

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!(lock = %lock_path.display(), waited_ms = started.elapsed().as_millis(), "registry lock acquired");
                    return Ok(Self { _file: file });
                }
                Err(err) if is_contended(&err) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(EnvError::RegistryLocked {
                            path: document.to_path_buf(),
                            waited,
                        }
                        .into());
                    }
                    thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("failed to lock {}", lock_path.display()))
                }
            }
        }
    }
}

/// Group members may only have read access to a lock file another member
/// created; a shared flock works on a read-only descriptor.
fn open_lock_file(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o664);
    }
    match options.open(path) {
        Err(err) if err.kind() == ErrorKind::PermissionDenied && path.exists() => {
            OpenOptions::new().read(true).open(path)
        }
        other => other,
    }
}

/// Lets other group members open the lock read-write, whatever the
/// creator's umask. Only the owner may chmod, so failures are left alone.
#[cfg(unix)]
fn share_with_group(file: &File, path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(meta) = file.metadata() else { return };
    let mode = meta.permissions().mode() & 0o777;
    if mode & 0o660 == 0o660 {
        return;
    }
    if let Err(err) = file.set_permissions(fs::Permissions::from_mode(mode | 0o660)) {
        tracing::debug!(lock = %path.display(), error = %err, "left lock file permissions unchanged");
    }
}

#[cfg(not(unix))]
fn share_with_group(_file: &File, _path: &Path) {}

fn is_contended(err: &io::Error) -> bool {
    if err.kind() == ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32 | 33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

fn unavailable(scope: &Scope, path: &Path, err: &io::Error) -> anyhow::Error {
    EnvError::ScopeUnavailable {
        scope: scope.to_string(),
        reason: format!("{}: {err}", path.display()),
    }
    .into()
}
