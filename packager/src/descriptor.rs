//! Version-carrying descriptor documents.
//!
//! The manifest, package metadata, and update descriptor are JSON objects
//! that each hold a `version` field. Only version-dependent fields are ever
//! rewritten; every other field round-trips untouched and in its original
//! order.

use crate::error::{ReleaseError, Result};
use crate::version::SemanticVersion;
use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;

/// Name of the field every descriptor shares.
pub const VERSION_FIELD: &str = "version";

/// Matches `/v<major>.<minor>.<patch>` with ASCII digits only.
///
/// The character after the match is checked separately so adjacent segments
/// such as `/v1.2.3/v1.2.3` are both found.
static VERSIONED_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    #[expect(
        clippy::expect_used,
        reason = "the pattern is a compile-time constant covered by tests"
    )]
    Regex::new(r"/v([0-9]+\.[0-9]+\.[0-9]+)").expect("versioned segment pattern is valid")
});

/// The three descriptor roles the pipeline keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// The extension manifest; source of truth for the version.
    PrimaryManifest,
    /// Auxiliary package metadata.
    PackageMetadata,
    /// The update descriptor polled by installed clients.
    UpdateDescriptor,
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PrimaryManifest => "extension manifest",
            Self::PackageMetadata => "package metadata",
            Self::UpdateDescriptor => "update descriptor",
        })
    }
}

/// A descriptor loaded from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    kind: DescriptorKind,
    path: Utf8PathBuf,
    fields: Map<String, Value>,
}

impl Descriptor {
    /// Parse a descriptor from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidDescriptor`] if the text is not a JSON
    /// object.
    pub fn parse(kind: DescriptorKind, path: &Utf8Path, contents: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(contents).map_err(|e| ReleaseError::InvalidDescriptor {
                path: path.to_owned(),
                reason: e.to_string(),
            })?;
        let Value::Object(fields) = value else {
            return Err(ReleaseError::InvalidDescriptor {
                path: path.to_owned(),
                reason: "top-level value must be an object".to_owned(),
            });
        };
        Ok(Self {
            kind,
            path: path.to_owned(),
            fields,
        })
    }

    /// Load a descriptor that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::DescriptorUnreadable`] if the file cannot be
    /// read, or [`ReleaseError::InvalidDescriptor`] if it is not a JSON object.
    pub fn load(kind: DescriptorKind, path: &Utf8Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ReleaseError::DescriptorUnreadable {
                path: path.to_owned(),
                reason: e.to_string(),
            })?;
        Self::parse(kind, path, &contents)
    }

    /// Load a descriptor that may be absent.
    ///
    /// # Errors
    ///
    /// As [`Descriptor::load`], except that a missing file yields `Ok(None)`.
    pub fn load_optional(kind: DescriptorKind, path: &Utf8Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(kind, path, &contents).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReleaseError::DescriptorUnreadable {
                path: path.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    /// Return the descriptor's role.
    #[must_use]
    pub const fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Return the file the descriptor was loaded from.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// True when the document carries a `version` field.
    #[must_use]
    pub fn has_version(&self) -> bool {
        self.fields.contains_key(VERSION_FIELD)
    }

    /// Parse the `version` field.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidDescriptor`] if the field is missing or
    /// not a string, or [`ReleaseError::InvalidVersion`] if it does not parse.
    pub fn version(&self) -> Result<SemanticVersion> {
        let raw = self
            .get_str(VERSION_FIELD)
            .ok_or_else(|| ReleaseError::InvalidDescriptor {
                path: self.path.clone(),
                reason: format!("missing string field \"{VERSION_FIELD}\""),
            })?;
        raw.parse()
    }

    /// Overwrite the `version` field.
    pub fn set_version(&mut self, version: &SemanticVersion) {
        self.set_string(VERSION_FIELD, version.to_string());
    }

    /// Return a top-level string field.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Set a top-level string field, keeping its position if it already exists.
    pub fn set_string(&mut self, key: &str, value: String) {
        if let Some(slot) = self.fields.get_mut(key) {
            *slot = Value::String(value);
        } else {
            self.fields.insert(key.to_owned(), Value::String(value));
        }
    }

    /// Rewrite the version segment of every top-level URL field.
    ///
    /// Fields listed in `skip` and fields whose value does not contain a
    /// versioned segment are left byte-identical. Returns the names of the
    /// fields that changed.
    pub fn rewrite_versioned_urls(
        &mut self,
        version: &SemanticVersion,
        skip: &[&str],
    ) -> Vec<String> {
        let mut changed = Vec::new();
        for (key, value) in &mut self.fields {
            if skip.contains(&key.as_str()) {
                continue;
            }
            let Value::String(text) = value else {
                continue;
            };
            if let Some(rewritten) = rewrite_versioned_url(text, version) {
                if rewritten != *text {
                    changed.push(key.clone());
                }
                *text = rewritten;
            }
        }
        changed
    }

    /// Render the document as two-space pretty JSON with a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidDescriptor`] if serialisation fails.
    pub fn render(&self) -> Result<String> {
        let mut text =
            serde_json::to_string_pretty(&self.fields).map_err(|e| {
                ReleaseError::InvalidDescriptor {
                    path: self.path.clone(),
                    reason: e.to_string(),
                }
            })?;
        text.push('\n');
        Ok(text)
    }
}

/// Substitute `version` into every versioned segment of `url`.
///
/// Returns `None` when the URL has no `/v<x.y.z>/` segment and no trailing
/// `/v<x.y.z>`. Only the version digits change.
///
/// # Examples
///
/// ```
/// use extension_release::descriptor::rewrite_versioned_url;
/// use extension_release::version::SemanticVersion;
///
/// let next = SemanticVersion::new(1, 2, 4);
/// assert_eq!(
///     rewrite_versioned_url("https://example.com/releases/v1.2.3/extension.crx", &next).as_deref(),
///     Some("https://example.com/releases/v1.2.4/extension.crx"),
/// );
/// assert_eq!(rewrite_versioned_url("https://example.com/latest", &next), None);
/// ```
#[must_use]
pub fn rewrite_versioned_url(url: &str, version: &SemanticVersion) -> Option<String> {
    let replacement = version.to_string();
    let mut rewritten = String::with_capacity(url.len());
    let mut copied = 0;
    for caps in VERSIONED_SEGMENT.captures_iter(url) {
        let Some(digits) = caps.get(1) else {
            continue;
        };
        let ends_segment = url
            .get(digits.end()..)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
        if !ends_segment {
            continue;
        }
        rewritten.push_str(url.get(copied..digits.start())?);
        rewritten.push_str(&replacement);
        copied = digits.end();
    }
    if copied == 0 {
        return None;
    }
    rewritten.push_str(url.get(copied..)?);
    Some(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    const UPDATE_JSON: &str = r#"{
  "version": "1.2.3",
  "released_at": "2026-01-01T00:00:00Z",
  "download_url": "https://example.com/releases/download/v1.2.3/extension.crx",
  "release_notes_url": "https://example.com/releases/tag/v1.2.3",
  "homepage": "https://example.com/v1.2.3x/about",
  "changelog": [
    "Fix selector for v1.2.3 pages"
  ]
}
"#;

    #[fixture]
    fn update() -> Descriptor {
        Descriptor::parse(
            DescriptorKind::UpdateDescriptor,
            Utf8Path::new("updates.json"),
            UPDATE_JSON,
        )
        .expect("valid descriptor")
    }

    #[rstest]
    #[case::middle_segment(
        "https://example.com/download/v1.2.3/extension.crx",
        Some("https://example.com/download/v9.8.7/extension.crx")
    )]
    #[case::trailing_segment(
        "https://example.com/releases/tag/v1.2.3",
        Some("https://example.com/releases/tag/v9.8.7")
    )]
    #[case::no_segment("https://example.com/latest/extension.crx", None)]
    #[case::suffix_in_segment("https://example.com/v1.2.3-beta/x", None)]
    #[case::missing_slash("https://example.com/tag-v1.2.3", None)]
    #[case::adjacent_segments(
        "https://example.com/v1.2.3/v1.2.3",
        Some("https://example.com/v9.8.7/v9.8.7")
    )]
    #[case::suffixed_then_plain(
        "https://example.com/v1.2.3x/v1.2.3",
        Some("https://example.com/v1.2.3x/v9.8.7")
    )]
    #[case::non_ascii_digits("https://example.com/v\u{661}.\u{662}.\u{663}/x", None)]
    fn rewrite_versioned_url_cases(#[case] url: &str, #[case] expected: Option<&str>) {
        let next = SemanticVersion::new(9, 8, 7);
        assert_eq!(rewrite_versioned_url(url, &next).as_deref(), expected);
    }

    #[test]
    fn rewrite_changes_only_version_characters() {
        let url = "https://cdn.example.com/ext/v10.0.1/pkg/v10.0.1";
        let rewritten =
            rewrite_versioned_url(url, &SemanticVersion::new(10, 0, 2)).expect("matches");
        assert_eq!(rewritten, "https://cdn.example.com/ext/v10.0.2/pkg/v10.0.2");
    }

    #[rstest]
    fn rewrite_versioned_urls_reports_changed_fields(mut update: Descriptor) {
        let changed = update.rewrite_versioned_urls(&SemanticVersion::new(1, 2, 4), &[VERSION_FIELD]);
        assert_eq!(changed, ["download_url", "release_notes_url"]);
        assert_eq!(
            update.get_str("homepage"),
            Some("https://example.com/v1.2.3x/about")
        );
    }

    #[rstest]
    fn non_matching_fields_round_trip(mut update: Descriptor) {
        let before = update.clone();
        update.rewrite_versioned_urls(&SemanticVersion::new(1, 2, 4), &[VERSION_FIELD]);
        assert_eq!(update.fields.get("changelog"), before.fields.get("changelog"));
        assert_eq!(update.get_str("released_at"), before.get_str("released_at"));
    }

    #[rstest]
    fn render_preserves_field_order(mut update: Descriptor) {
        update.set_version(&SemanticVersion::new(1, 2, 4));
        let rendered = update.render().expect("render");
        let keys: Vec<&str> = rendered
            .lines()
            .filter_map(|line| line.trim_start().strip_prefix('"'))
            .filter_map(|rest| rest.split('"').next())
            .filter(|k| !k.starts_with("Fix"))
            .collect();
        assert_eq!(
            keys,
            [
                "version",
                "released_at",
                "download_url",
                "release_notes_url",
                "homepage",
                "changelog"
            ]
        );
        assert!(rendered.ends_with("}\n"));
    }

    #[rstest]
    fn unchanged_document_renders_identically(update: Descriptor) {
        assert_eq!(update.render().expect("render"), UPDATE_JSON);
    }

    #[rstest]
    #[case::array("[1, 2, 3]")]
    #[case::garbage("{ not json")]
    fn parse_rejects_non_objects(#[case] contents: &str) {
        let err = Descriptor::parse(
            DescriptorKind::PackageMetadata,
            Utf8Path::new("package.json"),
            contents,
        )
        .expect_err("should reject");
        assert!(matches!(err, ReleaseError::InvalidDescriptor { .. }));
    }

    #[test]
    fn version_requires_string_field() {
        let doc = Descriptor::parse(
            DescriptorKind::PrimaryManifest,
            Utf8Path::new("manifest.json"),
            r#"{"version": 3}"#,
        )
        .expect("object");
        assert!(matches!(
            doc.version(),
            Err(ReleaseError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn load_optional_returns_none_for_missing_file() {
        let loaded = Descriptor::load_optional(
            DescriptorKind::PackageMetadata,
            Utf8Path::new("/definitely/missing/package.json"),
        )
        .expect("missing is not an error");
        assert!(loaded.is_none());
    }
}
