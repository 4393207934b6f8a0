//! Operator-facing text for the release CLI.
//!
//! Everything here only formats; the binary decides where the text goes and
//! which lines `--quiet` suppresses.

use crate::archive::{ArchiveOutcome, ArchiveReport};
use crate::bump::BumpReport;
use crate::identity::ExtensionIdentity;
use crate::package::PackageReport;
use crate::pipeline::PipelineStatus;
use crate::publish::PublishReport;
use camino::Utf8Path;
use std::io::Write;

/// Warning shown whenever a signing key has just been generated.
#[must_use]
pub fn key_created_warning(path: &Utf8Path) -> String {
    format!(
        concat!(
            "WARNING: generated a new signing key at {}\n",
            "  This file is sensitive. Keep it private and back it up.\n",
            "  Every future update must be signed with this exact key; if it is\n",
            "  lost or replaced, installed clients will not accept new versions."
        ),
        path
    )
}

/// The extension identity, with a reminder that nothing propagates it.
#[must_use]
pub fn identity_notice(identity: &ExtensionIdentity) -> String {
    format!(
        concat!(
            "Extension ID: {}\n",
            "  Copy this ID into any allowlist or policy configuration that must\n",
            "  trust the extension; it is not written anywhere automatically."
        ),
        identity
    )
}

/// Warning listing payload files that were not found.
///
/// Returns `None` when nothing was skipped.
#[must_use]
pub fn skipped_notice(skipped: &[String]) -> Option<String> {
    if skipped.is_empty() {
        return None;
    }
    Some(format!(
        "Skipped missing payload file(s): {}",
        skipped.join(", ")
    ))
}

/// Summary of a version bump.
#[must_use]
pub fn bump_summary(report: &BumpReport) -> String {
    let updated: Vec<String> = report.updated.iter().map(ToString::to_string).collect();
    let mut text = format!(
        "Bumped version {} -> {} in {}",
        report.previous,
        report.current,
        updated.join(", ")
    );
    if !report.skipped.is_empty() {
        let skipped: Vec<String> = report.skipped.iter().map(ToString::to_string).collect();
        text.push_str(&format!("\n  Skipped: {}", skipped.join(", ")));
    }
    text
}

/// Summary of a package build, excluding the identity line.
#[must_use]
pub fn package_summary(report: &PackageReport) -> String {
    format!(
        "Signed package written to {} ({} bytes)\n  SHA-256: {}",
        report.path, report.size, report.sha256
    )
}

/// Summary of an archive build.
#[must_use]
pub fn archive_summary(report: &ArchiveReport) -> String {
    match &report.outcome {
        ArchiveOutcome::Written {
            path,
            size,
            sha256,
            backend,
        } => format!(
            "Archive for {} written to {path} ({size} bytes, {backend})\n  SHA-256: {sha256}",
            report.version
        ),
        ArchiveOutcome::Manual { instructions, .. } => instructions.clone(),
    }
}

/// Summary of a publish run, with the changelog reminder.
#[must_use]
pub fn publish_summary(report: &PublishReport) -> String {
    let mut text = format!(
        "Update descriptor {} now advertises {} (released {})",
        report.path, report.version, report.released_at
    );
    if !report.rewritten_urls.is_empty() {
        text.push_str(&format!(
            "\n  Rewrote URL field(s): {}",
            report.rewritten_urls.join(", ")
        ));
    }
    text.push_str("\n  Review the changelog entries by hand before uploading.");
    text
}

/// Text for the `status` command.
#[must_use]
pub fn status_text(status: &PipelineStatus) -> String {
    let marked = status
        .marker
        .version
        .map_or_else(|| "none".to_owned(), |v| v.to_string());
    format!(
        concat!(
            "Manifest version: {}\n",
            "Stage: {} (recorded for {})\n",
            "Signed package: {}\n",
            "Archive for {}: {}"
        ),
        status.manifest_version,
        status.marker.stage,
        marked,
        presence(status.package_present),
        status.manifest_version,
        presence(status.archive_present),
    )
}

const fn presence(present: bool) -> &'static str {
    if present { "present" } else { "missing" }
}

/// Write a line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}
