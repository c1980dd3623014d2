//! Filesystem helpers the session needs beyond plain reads and writes.

use std::fs::{self, File, Metadata};
use std::io;
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use tempfile::{NamedTempFile, PersistError};
use tracing::debug;

/// Publish a fully written temporary file at `dest`.
///
/// A rename is tried first. When it fails (typically across filesystems)
/// the content is copied over `dest` and the temporary file is removed.
pub fn persist(temp: NamedTempFile, dest: &Path) -> io::Result<()> {
    match temp.persist(dest) {
        Ok(_) => {
            debug!(dest = %dest.display(), "renamed temp file into place");
            Ok(())
        }
        Err(PersistError { error, file }) => {
            debug!(dest = %dest.display(), %error, "rename failed, copying temp file");
            fs::copy(file.path(), dest)?;
            file.close()
        }
    }
}

/// Set the modification time of a regular file, in seconds since the epoch.
pub fn set_modified(path: &Path, secs: i64) -> io::Result<()> {
    let when = if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    };
    File::options().write(true).open(path)?.set_modified(when)
}

/// Modification time of `meta` in whole seconds since the epoch.
pub fn modified_secs(meta: &Metadata) -> io::Result<i64> {
    let modified = meta.modified()?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    })
}

pub fn is_read_only(meta: &Metadata) -> bool {
    meta.permissions().readonly()
}

#[cfg(unix)]
/// Set POSIX permission bits on Unix.
pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
/// No-op outside Unix: POSIX permission bits do not apply.
pub fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
