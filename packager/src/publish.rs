//! Update descriptor publishing.
//!
//! Refreshes only the version-dependent fields of the update descriptor:
//! `version`, `released_at`, and any URL carrying a `/v<x.y.z>` segment.
//! Changelog prose and every other field pass through untouched; keeping
//! them current is the operator's job before publishing.

use crate::atomic;
use crate::config::ReleaseConfig;
use crate::descriptor::{Descriptor, DescriptorKind, VERSION_FIELD};
use crate::error::Result;
use crate::version::SemanticVersion;
use camino::Utf8PathBuf;
use chrono::{DateTime, SecondsFormat, Utc};

/// Field holding the RFC 3339 release timestamp.
pub const RELEASED_AT_FIELD: &str = "released_at";

/// Summary of a publish run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// The update descriptor that was rewritten.
    pub path: Utf8PathBuf,
    /// The version now advertised.
    pub version: SemanticVersion,
    /// The release timestamp now advertised.
    pub released_at: String,
    /// URL fields whose version segment changed.
    pub rewritten_urls: Vec<String>,
}

/// Apply `version` and `now` to the version-dependent fields of `descriptor`.
///
/// Returns the names of URL fields that changed.
pub fn refresh_release_fields(
    descriptor: &mut Descriptor,
    version: &SemanticVersion,
    now: DateTime<Utc>,
) -> Vec<String> {
    descriptor.set_version(version);
    descriptor.set_string(RELEASED_AT_FIELD, format_timestamp(now));
    descriptor.rewrite_versioned_urls(version, &[VERSION_FIELD, RELEASED_AT_FIELD])
}

/// Render a timestamp the way the update descriptor stores it.
#[must_use]
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Rewrites the update descriptor after a successful build.
#[derive(Debug)]
pub struct UpdateDescriptorPublisher<'a> {
    config: &'a ReleaseConfig,
}

impl<'a> UpdateDescriptorPublisher<'a> {
    /// Create a publisher for the repository described by `config`.
    #[must_use]
    pub const fn new(config: &'a ReleaseConfig) -> Self {
        Self { config }
    }

    /// Point the update descriptor at the manifest's current version.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the manifest or update descriptor is
    /// missing or malformed, or an I/O error if the rewrite fails. On error
    /// the descriptor on disk is unchanged.
    pub fn publish(&self, now: DateTime<Utc>) -> Result<PublishReport> {
        let manifest = Descriptor::load(DescriptorKind::PrimaryManifest, &self.config.manifest_path())?;
        let version = manifest.version()?;

        let path = self.config.update_descriptor_path();
        let mut descriptor = Descriptor::load(DescriptorKind::UpdateDescriptor, &path)?;
        let rewritten_urls = refresh_release_fields(&mut descriptor, &version, now);
        atomic::write_file(&path, descriptor.render()?.as_bytes())?;

        log::debug!("published {version} to {path}");
        Ok(PublishReport {
            path,
            version,
            released_at: format_timestamp(now),
            rewritten_urls,
        })
    }
}
