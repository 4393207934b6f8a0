//! All-or-nothing file replacement.
//!
//! Contents are written to a temporary file in the target's directory and
//! renamed over the target only on commit. Dropping an uncommitted
//! [`PendingWrite`] deletes the temporary file, so a failure never leaves a
//! partial file at the final path.

use crate::error::{ReleaseError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// A fully written temporary file waiting to replace its target.
#[derive(Debug)]
pub struct PendingWrite {
    target: Utf8PathBuf,
    temp: NamedTempFile,
}

impl PendingWrite {
    /// Write `contents` next to `target` without touching `target` itself.
    ///
    /// When `target` already exists its permissions are carried over so a
    /// rewrite does not change the file mode.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Io`] if the temporary file cannot be created
    /// or written.
    pub fn prepare(target: &Utf8Path, contents: &[u8]) -> Result<Self> {
        let dir = parent_dir(target);
        let mut temp = NamedTempFile::new_in(dir).map_err(ReleaseError::io("create", dir))?;
        temp.write_all(contents)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(ReleaseError::io("write", target))?;
        apply_permissions(target, temp.as_file())?;
        Ok(Self {
            target: target.to_owned(),
            temp,
        })
    }

    /// Return the path this write will replace.
    #[must_use]
    pub fn target(&self) -> &Utf8Path {
        &self.target
    }

    /// Rename the temporary file over the target.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Io`] if the rename fails; the target is left
    /// as it was.
    pub fn commit(self) -> Result<()> {
        let Self { target, temp } = self;
        temp.persist(&target)
            .map(|_| ())
            .map_err(|e| ReleaseError::Io {
                action: "replace",
                path: target,
                source: e.error,
            })
    }
}

/// Replace `target` with `contents` atomically.
///
/// # Errors
///
/// Returns [`ReleaseError::Io`] if the temporary file cannot be written or
/// renamed.
pub fn write_file(target: &Utf8Path, contents: &[u8]) -> Result<()> {
    PendingWrite::prepare(target, contents)?.commit()
}

/// Prepare every write first, then commit them in order.
///
/// Serialisation and write failures surface before any target changes.
///
/// # Errors
///
/// Returns the first preparation or rename failure.
pub fn write_all<'a, I>(writes: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a Utf8Path, Vec<u8>)>,
{
    let pending = writes
        .into_iter()
        .map(|(target, contents)| PendingWrite::prepare(target, &contents))
        .collect::<Result<Vec<_>>>()?;
    pending.into_iter().try_for_each(PendingWrite::commit)
}

fn parent_dir(target: &Utf8Path) -> &Utf8Path {
    match target.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

fn apply_permissions(target: &Utf8Path, file: &fs::File) -> Result<()> {
    let permissions = match fs::metadata(target) {
        Ok(meta) => meta.permissions(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => default_permissions(file)?,
        Err(e) => return Err(ReleaseError::io("inspect", target)(e)),
    };
    file.set_permissions(permissions)
        .map_err(ReleaseError::io("chmod", target))
}

#[cfg(unix)]
#[expect(
    clippy::unnecessary_wraps,
    reason = "signature mirrors the non-Unix variant which reads metadata"
)]
fn default_permissions(_file: &fs::File) -> Result<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;

    Ok(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions(file: &fs::File) -> Result<fs::Permissions> {
    file.metadata()
        .map(|meta| meta.permissions())
        .map_err(|e| ReleaseError::Io {
            action: "inspect",
            path: Utf8PathBuf::from("<temporary file>"),
            source: e,
        })
}
