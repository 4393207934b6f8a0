//! Signed package builds.
//!
//! Orchestrates key acquisition, payload staging, and signing, then places
//! the package at its stable path. The filename never changes between
//! releases because clients fetch it from a fixed "latest" URL.

use super::signer::PackageSigner;
use crate::atomic;
use crate::config::ReleaseConfig;
use crate::digest::Sha256Digest;
use crate::error::{ReleaseError, Result};
use crate::identity::ExtensionIdentity;
use crate::keys::{AcquiredKey, KeyManager};
use crate::stager::PayloadStager;
use camino::Utf8PathBuf;
use std::fs;

/// Summary of a package build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    /// Where the package was written.
    pub path: Utf8PathBuf,
    /// Identity clients will assign to the package.
    pub identity: ExtensionIdentity,
    /// Package size in bytes.
    pub size: u64,
    /// SHA-256 of the package.
    pub sha256: Sha256Digest,
    /// Payload files absent from the source tree.
    pub skipped: Vec<String>,
    /// True when the signing key was generated for this build.
    pub key_created: bool,
}

/// Produces the signed installable package.
pub struct SignedPackageBuilder<'a> {
    config: &'a ReleaseConfig,
    signer: &'a dyn PackageSigner,
}

impl std::fmt::Debug for SignedPackageBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedPackageBuilder")
            .field("config", &self.config)
            .field("signer", &self.signer.name())
            .finish()
    }
}

impl<'a> SignedPackageBuilder<'a> {
    /// Create a builder that signs with `signer`.
    #[must_use]
    pub const fn new(config: &'a ReleaseConfig, signer: &'a dyn PackageSigner) -> Self {
        Self { config, signer }
    }

    /// Load the persisted signing key, creating it on first use.
    ///
    /// Callers that report to an operator should acquire the key first so a
    /// newly created key is announced even if the build then fails.
    ///
    /// # Errors
    ///
    /// See [`KeyManager::acquire_key`].
    pub fn acquire_key(&self) -> Result<AcquiredKey> {
        KeyManager::new(self.config.signing_key_path()).acquire_key()
    }

    /// Acquire the key and build the package.
    ///
    /// # Errors
    ///
    /// See [`SignedPackageBuilder::acquire_key`] and
    /// [`SignedPackageBuilder::build_with_key`].
    pub fn build(&self) -> Result<PackageReport> {
        let acquired = self.acquire_key()?;
        self.build_with_key(&acquired)
    }

    /// Stage the payload, sign it with `acquired`, and write the package.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Crypto`] if the key cannot be encoded or the
    /// signature fails, [`ReleaseError::Packaging`] if the signer fails, or
    /// [`ReleaseError::Io`] for staging or write failures. The staging area
    /// is removed and the package path is left untouched on error.
    pub fn build_with_key(&self, acquired: &AcquiredKey) -> Result<PackageReport> {
        let identity = acquired.key.identity()?;
        let destination = self.config.package_path();
        let stager = PayloadStager::new(self.config.staging_path());

        stager.with_staged(self.config.root(), self.config.payload_files(), |area| {
            let bytes = self.signer.sign_package(area, &acquired.key)?;

            let releases = self.config.releases_dir();
            fs::create_dir_all(&releases).map_err(ReleaseError::io("create", &releases))?;
            atomic::write_file(&destination, &bytes)?;
            log::debug!("wrote {} byte package to {destination}", bytes.len());

            Ok(PackageReport {
                path: destination,
                identity,
                size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
                sha256: Sha256Digest::of(&bytes),
                skipped: area.skipped().to_vec(),
                key_created: acquired.created,
            })
        })
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
