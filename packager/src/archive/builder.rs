//! Versioned archive builds.
//!
//! The archive is encoded into a private temporary directory beside the
//! releases directory and renamed into place only once the encoder has
//! finished, so a failed build never leaves a partial file at the
//! version-stamped path.

use super::backend::ArchiveBackend;
use crate::bump::VersionCoordinator;
use crate::config::ReleaseConfig;
use crate::digest::{Sha256Digest, compute_sha256};
use crate::error::{ReleaseError, Result};
use crate::stager::{PayloadStager, StagingArea};
use crate::version::SemanticVersion;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// What an archive build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// An archive was written.
    Written {
        /// Final archive path.
        path: Utf8PathBuf,
        /// Archive size in bytes.
        size: u64,
        /// SHA-256 of the archive.
        sha256: Sha256Digest,
        /// Backend that encoded it.
        backend: &'static str,
    },
    /// No backend was available; the operator must run the instructions.
    Manual {
        /// Path the operator should produce.
        destination: Utf8PathBuf,
        /// Instructions to print.
        instructions: String,
    },
}

/// Summary of an archive build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Version stamped into the archive filename.
    pub version: SemanticVersion,
    /// What was produced.
    pub outcome: ArchiveOutcome,
    /// Payload files absent from the source tree.
    pub skipped: Vec<String>,
}

/// Produces the plain versioned archive.
#[derive(Debug)]
pub struct ArchiveBuilder<'a> {
    config: &'a ReleaseConfig,
    backend: ArchiveBackend<'a>,
}

impl<'a> ArchiveBuilder<'a> {
    /// Create a builder that encodes with `backend`.
    #[must_use]
    pub const fn new(config: &'a ReleaseConfig, backend: ArchiveBackend<'a>) -> Self {
        Self { config, backend }
    }

    /// Stage the payload and encode it at the version-stamped path.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the manifest version cannot be read,
    /// [`ReleaseError::Io`] for staging or placement failures, or
    /// [`ReleaseError::Packaging`] if the encoder fails. The staging area is
    /// removed and no file is left at the archive path on error.
    pub fn build(&self) -> Result<ArchiveReport> {
        let version = VersionCoordinator::new(self.config).current_version()?;
        let destination = self.config.archive_path(&version);
        let stager = PayloadStager::new(self.config.staging_path());

        stager.with_staged(self.config.root(), self.config.payload_files(), |area| {
            let outcome = match &self.backend {
                ArchiveBackend::Encoder(encoder) => {
                    self.encode_into_place(encoder.as_ref(), area, &destination)?
                }
                ArchiveBackend::Manual(manual) => ArchiveOutcome::Manual {
                    instructions: manual.render(
                        self.config.root(),
                        &destination,
                        area.staged(),
                    ),
                    destination: destination.clone(),
                },
            };
            Ok(ArchiveReport {
                version,
                outcome,
                skipped: area.skipped().to_vec(),
            })
        })
    }

    fn encode_into_place(
        &self,
        encoder: &dyn super::ArchiveEncoder,
        area: &StagingArea,
        destination: &Utf8Path,
    ) -> Result<ArchiveOutcome> {
        let releases = self.config.releases_dir();
        fs::create_dir_all(&releases).map_err(ReleaseError::io("create", &releases))?;

        let scratch = tempfile::Builder::new()
            .prefix(".archive-")
            .tempdir_in(&releases)
            .map_err(ReleaseError::io("create", &releases))?;
        let scratch_dir = Utf8PathBuf::try_from(scratch.path().to_path_buf())
            .map_err(|e| ReleaseError::io("create", &releases)(std::io::Error::other(e)))?;
        let file_name = destination.file_name().unwrap_or("archive.zip");
        let partial = scratch_dir.join(file_name);

        log::debug!("encoding {} with {}", destination, encoder.name());
        encoder.encode(area, &partial)?;
        fs::rename(&partial, destination).map_err(ReleaseError::io("rename", &partial))?;

        let size = fs::metadata(destination)
            .map_err(ReleaseError::io("inspect", destination))?
            .len();
        let sha256 = compute_sha256(destination)?;
        Ok(ArchiveOutcome::Written {
            path: destination.to_path_buf(),
            size,
            sha256,
            backend: encoder.name(),
        })
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
