//! Release stage orchestration.
//!
//! Sequences the release steps and refuses them out of order. Progress is
//! persisted in a small JSON marker so the order holds across separate
//! invocations:
//!
//! ```text
//! Unversioned -> Bumped -> Built { packaged, archived } -> Published
//! ```
//!
//! `bump` is always allowed. Builds require a marker for the manifest's
//! current version; publishing requires at least one built artifact. A
//! forced pipeline records the violation and proceeds.

use crate::archive::{ArchiveBuilder, ArchiveOutcome, ArchiveReport};
use crate::atomic;
use crate::bump::{BumpReport, VersionCoordinator};
use crate::config::ReleaseConfig;
use crate::error::{ReleaseError, Result};
use crate::keys::AcquiredKey;
use crate::package::{PackageReport, SignedPackageBuilder};
use crate::publish::{PublishReport, UpdateDescriptorPublisher};
use crate::version::{BumpKind, SemanticVersion};
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::fs;

/// Where a release currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineStage {
    /// No bump has been recorded.
    #[default]
    Unversioned,
    /// The version was bumped; nothing built yet.
    Bumped,
    /// At least one artifact was built for the version.
    Built {
        /// The signed package was built.
        packaged: bool,
        /// The archive was built.
        archived: bool,
    },
    /// The update descriptor advertises the version.
    Published,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unversioned => f.write_str("unversioned"),
            Self::Bumped => f.write_str("bumped"),
            Self::Built { packaged, archived } => {
                let built: Vec<&str> = [(*packaged, "package"), (*archived, "archive")]
                    .into_iter()
                    .filter_map(|(done, name)| done.then_some(name))
                    .collect();
                write!(f, "built ({})", built.join(", "))
            }
            Self::Published => f.write_str("published"),
        }
    }
}

/// Persisted pipeline progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageMarker {
    /// Version the stage refers to; absent while unversioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<SemanticVersion>,
    /// The stage reached.
    #[serde(flatten)]
    pub stage: PipelineStage,
}

/// Artifacts tracked by the stage machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    /// The signed package.
    Package,
    /// The versioned archive.
    Archive,
}

/// Snapshot reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    /// Version in the extension manifest.
    pub manifest_version: SemanticVersion,
    /// Persisted progress.
    pub marker: StageMarker,
    /// Whether the signed package exists on disk.
    pub package_present: bool,
    /// Whether the archive for the manifest version exists on disk.
    pub archive_present: bool,
}

/// Sequences release steps against the persisted marker.
#[derive(Debug)]
pub struct ReleasePipeline<'a> {
    config: &'a ReleaseConfig,
    force: bool,
    overrides: RefCell<Vec<String>>,
}

impl<'a> ReleasePipeline<'a> {
    /// Create a pipeline; `force` bypasses ordering checks for this run.
    #[must_use]
    pub const fn new(config: &'a ReleaseConfig, force: bool) -> Self {
        Self {
            config,
            force,
            overrides: RefCell::new(Vec::new()),
        }
    }

    /// Drain the ordering checks `--force` bypassed so far.
    ///
    /// Each entry names the step and the check it skipped. Entries are
    /// recorded before the step runs, so they survive a failed step.
    #[must_use]
    pub fn take_overrides(&self) -> Vec<String> {
        self.overrides.take()
    }

    /// Bump the version and reset the marker to `Bumped`.
    ///
    /// # Errors
    ///
    /// See [`VersionCoordinator::bump`]; also fails if the marker cannot be
    /// written.
    pub fn bump(&self, kind: BumpKind, now: DateTime<Utc>) -> Result<BumpReport> {
        let report = VersionCoordinator::new(self.config).bump(kind, now)?;
        self.save(&StageMarker {
            version: Some(report.current),
            stage: PipelineStage::Bumped,
        })?;
        Ok(report)
    }

    /// Build the signed package.
    ///
    /// `on_key` runs once the key is acquired and before anything is built,
    /// so a newly created key is announced even if the build fails.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::OutOfOrder`] if the version was not bumped
    /// first, or any error from [`SignedPackageBuilder`].
    pub fn build_package<F>(
        &self,
        builder: &SignedPackageBuilder<'_>,
        on_key: F,
    ) -> Result<PackageReport>
    where
        F: FnOnce(&AcquiredKey),
    {
        let version = self.check_buildable("build-package")?;
        let acquired = builder.acquire_key()?;
        on_key(&acquired);
        let report = builder.build_with_key(&acquired)?;
        self.record_built(version, Artifact::Package)?;
        Ok(report)
    }

    /// Build the versioned archive.
    ///
    /// A manual outcome writes nothing and so records nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::OutOfOrder`] if the version was not bumped
    /// first, or any error from [`ArchiveBuilder`].
    pub fn build_archive(&self, builder: &ArchiveBuilder<'_>) -> Result<ArchiveReport> {
        let version = self.check_buildable("build-archive")?;
        let report = builder.build()?;
        if matches!(report.outcome, ArchiveOutcome::Written { .. }) {
            self.record_built(version, Artifact::Archive)?;
        }
        Ok(report)
    }

    /// Rewrite the update descriptor for the built version.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::OutOfOrder`] if nothing was built for the
    /// manifest version, or any error from [`UpdateDescriptorPublisher`].
    pub fn publish(&self, now: DateTime<Utc>) -> Result<PublishReport> {
        let manifest_version = self.manifest_version()?;
        let marker = self.load()?;
        let built = matches!(
            marker.stage,
            PipelineStage::Built { packaged, archived } if packaged || archived
        );
        if !built {
            self.refuse("publish", format!("nothing has been built (stage: {})", marker.stage))?;
        } else if marker.version != Some(manifest_version) {
            self.refuse("publish", mismatch(marker.version, manifest_version))?;
        }

        let report = UpdateDescriptorPublisher::new(self.config).publish(now)?;
        self.save(&StageMarker {
            version: Some(report.version),
            stage: PipelineStage::Published,
        })?;
        Ok(report)
    }

    /// Report the manifest version, the marker, and artifact presence.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the manifest or marker is malformed.
    pub fn status(&self) -> Result<PipelineStatus> {
        let manifest_version = self.manifest_version()?;
        Ok(PipelineStatus {
            manifest_version,
            marker: self.load()?,
            package_present: self.config.package_path().is_file(),
            archive_present: self.config.archive_path(&manifest_version).is_file(),
        })
    }

    /// Load the marker; a missing file means unversioned.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidConfig`] if the marker is malformed or
    /// [`ReleaseError::Io`] if it cannot be read.
    pub fn load(&self) -> Result<StageMarker> {
        let path = self.config.stage_marker_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StageMarker::default());
            }
            Err(e) => return Err(ReleaseError::io("read", &path)(e)),
        };
        serde_json::from_str(&text).map_err(|e| ReleaseError::InvalidConfig {
            path,
            reason: format!("malformed stage marker: {e}"),
        })
    }

    fn save(&self, marker: &StageMarker) -> Result<()> {
        let path = self.config.stage_marker_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ReleaseError::io("create", parent))?;
        }
        let mut text = serde_json::to_string_pretty(marker).map_err(|e| {
            ReleaseError::InvalidConfig {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        text.push('\n');
        log::debug!("stage marker now {}", marker.stage);
        atomic::write_file(&path, text.as_bytes())
    }

    fn manifest_version(&self) -> Result<SemanticVersion> {
        VersionCoordinator::new(self.config).current_version()
    }

    fn check_buildable(&self, step: &'static str) -> Result<SemanticVersion> {
        let manifest_version = self.manifest_version()?;
        let marker = self.load()?;
        match marker.stage {
            PipelineStage::Bumped | PipelineStage::Built { .. }
                if marker.version == Some(manifest_version) => {}
            PipelineStage::Bumped | PipelineStage::Built { .. } => {
                self.refuse(step, mismatch(marker.version, manifest_version))?;
            }
            PipelineStage::Unversioned | PipelineStage::Published => {
                self.refuse(
                    step,
                    format!("run bump first (stage: {})", marker.stage),
                )?;
            }
        }
        Ok(manifest_version)
    }

    fn record_built(&self, version: SemanticVersion, artifact: Artifact) -> Result<()> {
        let marker = self.load()?;
        let (mut packaged, mut archived) = match marker.stage {
            PipelineStage::Built { packaged, archived } if marker.version == Some(version) => {
                (packaged, archived)
            }
            _ => (false, false),
        };
        match artifact {
            Artifact::Package => packaged = true,
            Artifact::Archive => archived = true,
        }
        self.save(&StageMarker {
            version: Some(version),
            stage: PipelineStage::Built { packaged, archived },
        })
    }

    fn refuse(&self, step: &'static str, reason: String) -> Result<()> {
        if self.force {
            let notice = format!("{step}: proceeding out of order because of --force: {reason}");
            warn!("{notice}");
            self.overrides.borrow_mut().push(notice);
            Ok(())
        } else {
            Err(ReleaseError::OutOfOrder { step, reason })
        }
    }
}

fn mismatch(marked: Option<SemanticVersion>, manifest: SemanticVersion) -> String {
    match marked {
        Some(version) => {
            format!("stage marker refers to {version} but the manifest is at {manifest}")
        }
        None => format!("no stage recorded for manifest version {manifest}"),
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
