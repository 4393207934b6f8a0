//! Archive encoder backends and runtime probing.
//!
//! Two real encoders exist: the in-process [`ZipEncoder`] with a
//! configurable deflate level, and [`ShellZipEncoder`], which drives the
//! platform `zip` utility. When neither is wanted or available the build
//! degrades to [`ManualInstructions`] rather than failing.

use crate::error::{ReleaseError, Result};
use crate::exec::{CommandExecutor, command_succeeds};
use crate::stager::StagingArea;
use camino::Utf8Path;
use serde::Deserialize;
use std::fs;
use std::io::{self, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Name reported by [`ZipEncoder`].
pub const ZIP_BACKEND: &str = "zip";

/// Name reported by [`ShellZipEncoder`].
pub const SHELL_BACKEND: &str = "shell zip";

/// Operator choice of archive backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Use the best backend available.
    #[default]
    Auto,
    /// Always use the in-process encoder.
    Rich,
    /// Use the platform `zip` utility, falling back to manual instructions.
    Shell,
    /// Never write an archive; print instructions instead.
    Manual,
}

/// Capability that writes the staged payload into an archive file.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveEncoder {
    /// Short backend name used in reports and errors.
    fn name(&self) -> &'static str;

    /// Write every staged file, in payload order, into a new archive at
    /// `destination`.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Packaging`] if encoding fails or
    /// [`ReleaseError::Io`] if a staged file cannot be read.
    fn encode(&self, area: &StagingArea, destination: &Utf8Path) -> Result<()>;
}

/// Write the staged files into a deflate-compressed zip stream.
///
/// Entry timestamps are pinned to the zip epoch so identical payloads yield
/// identical archives.
///
/// # Errors
///
/// Returns [`ReleaseError::Packaging`] for encoder failures or
/// [`ReleaseError::Io`] if a staged file cannot be read.
pub fn write_zip<W: Write + Seek>(area: &StagingArea, writer: W, level: u8) -> Result<W> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(i64::from(level)))
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);

    let mut archive = ZipWriter::new(writer);
    for (name, path) in area.entries() {
        log::trace!("adding {name} to archive");
        archive
            .start_file(name, options)
            .map_err(|e| ReleaseError::packaging(ZIP_BACKEND, e))?;
        let mut file = fs::File::open(&path).map_err(ReleaseError::io("read", &path))?;
        io::copy(&mut file, &mut archive).map_err(ReleaseError::io("read", &path))?;
    }
    archive
        .finish()
        .map_err(|e| ReleaseError::packaging(ZIP_BACKEND, e))
}

/// In-process zip encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipEncoder {
    level: u8,
}

impl ZipEncoder {
    /// Create an encoder using deflate `level` (0-9).
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self { level }
    }
}

impl ArchiveEncoder for ZipEncoder {
    fn name(&self) -> &'static str {
        ZIP_BACKEND
    }

    fn encode(&self, area: &StagingArea, destination: &Utf8Path) -> Result<()> {
        let created = fs::File::create(destination).map_err(ReleaseError::io("create", destination))?;
        let written = write_zip(area, created, self.level)?;
        written
            .sync_all()
            .map_err(ReleaseError::io("write", destination))
    }
}

/// Encoder that runs the platform `zip` utility inside the staging area.
pub struct ShellZipEncoder<'a> {
    executor: &'a dyn CommandExecutor,
    level: u8,
}

impl<'a> ShellZipEncoder<'a> {
    /// Create an encoder that spawns `zip` through `executor`.
    #[must_use]
    pub const fn new(executor: &'a dyn CommandExecutor, level: u8) -> Self {
        Self { executor, level }
    }
}

impl std::fmt::Debug for ShellZipEncoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellZipEncoder")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl ArchiveEncoder for ShellZipEncoder<'_> {
    fn name(&self) -> &'static str {
        SHELL_BACKEND
    }

    fn encode(&self, area: &StagingArea, destination: &Utf8Path) -> Result<()> {
        let level = format!("-{}", self.level);
        let mut args = vec!["-q", "-X", level.as_str(), destination.as_str()];
        args.extend(area.staged().iter().map(String::as_str));

        let output = self.executor.run_in(area.path(), "zip", &args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReleaseError::packaging(
                SHELL_BACKEND,
                format!("zip exited with {}: {}", output.status, stderr.trim()),
            ));
        }
        if !destination.is_file() {
            return Err(ReleaseError::packaging(
                SHELL_BACKEND,
                format!("zip reported success but wrote nothing to {destination}"),
            ));
        }
        Ok(())
    }
}

/// Fallback that tells the operator how to build the archive by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualInstructions {
    level: u8,
}

impl ManualInstructions {
    /// Create instructions that use deflate `level`.
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self { level }
    }

    /// Render the command to run from `root` to produce `destination`
    /// from the payload files `files`.
    #[must_use]
    pub fn render(&self, root: &Utf8Path, destination: &Utf8Path, files: &[String]) -> String {
        let target = destination.strip_prefix(root).unwrap_or(destination);
        let mut text = format!(
            "No archive backend is available. From {root}, run:\n  zip -X -{} {target}",
            self.level
        );
        for name in files {
            text.push(' ');
            text.push_str(name);
        }
        text
    }
}

/// The archive backend chosen for a build.
pub enum ArchiveBackend<'a> {
    /// Write the archive with this encoder.
    Encoder(Box<dyn ArchiveEncoder + 'a>),
    /// Only describe how to write it.
    Manual(ManualInstructions),
}

impl ArchiveBackend<'_> {
    /// Short backend name for reports.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Encoder(encoder) => encoder.name(),
            Self::Manual(_) => "manual",
        }
    }
}

impl std::fmt::Debug for ArchiveBackend<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ArchiveBackend").field(&self.name()).finish()
    }
}

/// Choose an archive backend for `preference`.
///
/// The in-process encoder is always compiled in, so `Auto` and `Rich`
/// resolve to it. `Shell` probes `zip -v` and degrades to manual
/// instructions when the utility is missing. Probing never fails.
#[must_use]
pub fn probe_archive_backend<'a>(
    executor: &'a dyn CommandExecutor,
    preference: BackendPreference,
    level: u8,
) -> ArchiveBackend<'a> {
    match preference {
        BackendPreference::Auto | BackendPreference::Rich => {
            ArchiveBackend::Encoder(Box::new(ZipEncoder::new(level)))
        }
        BackendPreference::Shell => {
            if command_succeeds(executor, "zip", &["-v"]) {
                ArchiveBackend::Encoder(Box::new(ShellZipEncoder::new(executor, level)))
            } else {
                log::warn!("zip utility not available; falling back to manual instructions");
                ArchiveBackend::Manual(ManualInstructions::new(level))
            }
        }
        BackendPreference::Manual => ArchiveBackend::Manual(ManualInstructions::new(level)),
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
