//! Version coordination across descriptors.
//!
//! Reads the current version from the extension manifest, computes the next
//! one, and writes it into every descriptor that tracks it. All documents are
//! rendered and written to temporary files before any target is replaced.

use crate::atomic;
use crate::config::ReleaseConfig;
use crate::descriptor::{Descriptor, DescriptorKind};
use crate::error::Result;
use crate::publish::refresh_release_fields;
use crate::version::{BumpKind, SemanticVersion};
use chrono::{DateTime, Utc};
use log::warn;

/// Outcome of a version bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpReport {
    /// Version found in the manifest before the bump.
    pub previous: SemanticVersion,
    /// Version written by the bump.
    pub current: SemanticVersion,
    /// Descriptors that now carry `current`.
    pub updated: Vec<DescriptorKind>,
    /// Descriptors skipped because they are absent or carry no version.
    pub skipped: Vec<DescriptorKind>,
}

/// Keeps the version identical across all descriptors.
#[derive(Debug)]
pub struct VersionCoordinator<'a> {
    config: &'a ReleaseConfig,
}

impl<'a> VersionCoordinator<'a> {
    /// Create a coordinator for the repository described by `config`.
    #[must_use]
    pub const fn new(config: &'a ReleaseConfig) -> Self {
        Self { config }
    }

    /// Read the version recorded in the extension manifest.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the manifest is unreadable or its
    /// version does not parse.
    pub fn current_version(&self) -> Result<SemanticVersion> {
        self.load_manifest()?.version()
    }

    /// Bump the version and propagate it.
    ///
    /// The update descriptor additionally receives `now` as its release
    /// timestamp and has its versioned URLs rewritten.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unreadable or malformed
    /// descriptor, or an I/O error if writing fails. No descriptor is
    /// modified unless every one of them could be rendered and staged.
    pub fn bump(&self, kind: BumpKind, now: DateTime<Utc>) -> Result<BumpReport> {
        let mut manifest = self.load_manifest()?;
        let previous = manifest.version()?;
        let current = previous.bump(kind)?;
        manifest.set_version(&current);

        let mut documents = vec![manifest];
        let mut skipped = Vec::new();

        let auxiliary = [
            (
                DescriptorKind::PackageMetadata,
                self.config.package_metadata_path(),
            ),
            (
                DescriptorKind::UpdateDescriptor,
                self.config.update_descriptor_path(),
            ),
        ];
        for (descriptor_kind, path) in auxiliary {
            match Descriptor::load_optional(descriptor_kind, &path)? {
                Some(mut doc) if doc.has_version() => {
                    if descriptor_kind == DescriptorKind::UpdateDescriptor {
                        refresh_release_fields(&mut doc, &current, now);
                    } else {
                        doc.set_version(&current);
                    }
                    documents.push(doc);
                }
                Some(_) => {
                    warn!("{descriptor_kind} at {path} has no version field; skipping");
                    skipped.push(descriptor_kind);
                }
                None => {
                    warn!("{descriptor_kind} not found at {path}; skipping");
                    skipped.push(descriptor_kind);
                }
            }
        }

        let rendered = documents
            .iter()
            .map(|doc| doc.render().map(|text| (doc.path(), text.into_bytes())))
            .collect::<Result<Vec<_>>>()?;
        atomic::write_all(rendered)?;

        Ok(BumpReport {
            previous,
            current,
            updated: documents.iter().map(Descriptor::kind).collect(),
            skipped,
        })
    }

    fn load_manifest(&self) -> Result<Descriptor> {
        Descriptor::load(DescriptorKind::PrimaryManifest, &self.config.manifest_path())
    }
}
