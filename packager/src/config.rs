//! Release configuration.
//!
//! Every path the pipeline touches is fixed relative to the repository root.
//! [`ReleaseConfig`] carries that root together with the relative layout so
//! components never derive paths from the running executable. An optional
//! `release.toml` at the root can override individual entries.

use crate::archive::BackendPreference;
use crate::error::{ReleaseError, Result};
use crate::version::SemanticVersion;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Name of the optional configuration file at the repository root.
pub const CONFIG_FILE_NAME: &str = "release.toml";

/// Highest deflate level accepted by the archive backends.
pub const MAX_COMPRESSION_LEVEL: u8 = 9;

/// Payload files copied into every build, in archive order.
pub const DEFAULT_PAYLOAD_FILES: &[&str] = &[
    "manifest.json",
    "background.js",
    "content.js",
    "popup.html",
    "popup.js",
    "popup.css",
    "options.html",
    "options.js",
    "icons/icon16.png",
    "icons/icon48.png",
    "icons/icon128.png",
];

/// Relative layout of a release repository.
///
/// Field names double as the keys accepted in `release.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReleaseLayout {
    /// The extension manifest; source of truth for the version.
    pub manifest: Utf8PathBuf,
    /// Auxiliary package metadata carrying a mirrored version.
    pub package_metadata: Utf8PathBuf,
    /// The update descriptor polled by self-hosted clients.
    pub update_descriptor: Utf8PathBuf,
    /// Persisted PEM private key (PKCS#1, or PKCS#8 when supplied).
    pub signing_key: Utf8PathBuf,
    /// Ephemeral staging directory.
    pub staging_dir: Utf8PathBuf,
    /// Pipeline stage marker file.
    pub stage_marker: Utf8PathBuf,
    /// Directory receiving release artifacts.
    pub releases_dir: Utf8PathBuf,
    /// Stable filename of the signed package.
    pub package_name: String,
    /// Prefix of the versioned archive filename.
    pub archive_prefix: String,
    /// Files copied from the repository root into the staging area.
    pub payload_files: Vec<String>,
    /// Deflate level for archive backends (0-9).
    pub compression_level: u8,
    /// Preferred archive backend.
    pub archive_backend: BackendPreference,
}

impl Default for ReleaseLayout {
    fn default() -> Self {
        Self {
            manifest: Utf8PathBuf::from("manifest.json"),
            package_metadata: Utf8PathBuf::from("package.json"),
            update_descriptor: Utf8PathBuf::from("updates.json"),
            signing_key: Utf8PathBuf::from("keys/extension.pem"),
            staging_dir: Utf8PathBuf::from("build/staging"),
            stage_marker: Utf8PathBuf::from("build/release-stage.json"),
            releases_dir: Utf8PathBuf::from("releases"),
            package_name: "extension.crx".to_owned(),
            archive_prefix: "extension".to_owned(),
            payload_files: DEFAULT_PAYLOAD_FILES.iter().map(|&f| f.to_owned()).collect(),
            compression_level: MAX_COMPRESSION_LEVEL,
            archive_backend: BackendPreference::default(),
        }
    }
}

/// Repository root plus layout, handed to every component at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseConfig {
    root: Utf8PathBuf,
    layout: ReleaseLayout,
}

impl ReleaseConfig {
    /// Build a configuration from an explicit root and layout.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidConfig`] if the layout contains absolute
    /// or parent-relative paths, an empty filename, or an out-of-range
    /// compression level.
    pub fn new(root: impl Into<Utf8PathBuf>, layout: ReleaseLayout) -> Result<Self> {
        let config = Self {
            root: root.into(),
            layout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Configuration with the default layout under `root`.
    #[must_use]
    pub fn with_defaults(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            layout: ReleaseLayout::default(),
        }
    }

    /// Load the configuration for the repository at `root`.
    ///
    /// The root is canonicalised so that backends running external commands
    /// from inside the staging area still resolve artifact paths correctly.
    /// A missing `release.toml` yields the default layout.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::InvalidConfig`] if the root cannot be resolved
    /// or `release.toml` is malformed.
    pub fn load(root: &Utf8Path) -> Result<Self> {
        let canonical = root
            .canonicalize_utf8()
            .map_err(|e| ReleaseError::InvalidConfig {
                path: root.to_owned(),
                reason: format!("cannot resolve repository root: {e}"),
            })?;

        let config_path = canonical.join(CONFIG_FILE_NAME);
        let layout = match std::fs::read_to_string(&config_path) {
            Ok(contents) => parse_layout(&config_path, &contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no {CONFIG_FILE_NAME} at {canonical}; using default layout");
                ReleaseLayout::default()
            }
            Err(e) => {
                return Err(ReleaseError::InvalidConfig {
                    path: config_path,
                    reason: e.to_string(),
                });
            }
        };

        Self::new(canonical, layout)
    }

    /// Return the repository root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Return the relative layout.
    #[must_use]
    pub const fn layout(&self) -> &ReleaseLayout {
        &self.layout
    }

    /// Absolute path of the extension manifest.
    #[must_use]
    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.manifest)
    }

    /// Absolute path of the package metadata descriptor.
    #[must_use]
    pub fn package_metadata_path(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.package_metadata)
    }

    /// Absolute path of the update descriptor.
    #[must_use]
    pub fn update_descriptor_path(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.update_descriptor)
    }

    /// Absolute path of the persisted signing key.
    #[must_use]
    pub fn signing_key_path(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.signing_key)
    }

    /// Absolute path of the staging directory.
    #[must_use]
    pub fn staging_path(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.staging_dir)
    }

    /// Absolute path of the stage marker.
    #[must_use]
    pub fn stage_marker_path(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.stage_marker)
    }

    /// Absolute path of the releases directory.
    #[must_use]
    pub fn releases_dir(&self) -> Utf8PathBuf {
        self.root.join(&self.layout.releases_dir)
    }

    /// Absolute path of the signed package; independent of the version.
    #[must_use]
    pub fn package_path(&self) -> Utf8PathBuf {
        self.releases_dir().join(&self.layout.package_name)
    }

    /// Absolute path of the archive for `version`.
    #[must_use]
    pub fn archive_path(&self, version: &SemanticVersion) -> Utf8PathBuf {
        self.releases_dir()
            .join(format!("{}-v{version}.zip", self.layout.archive_prefix))
    }

    /// Payload filenames, relative to the repository root.
    #[must_use]
    pub fn payload_files(&self) -> &[String] {
        &self.layout.payload_files
    }

    /// Deflate level for archive backends.
    #[must_use]
    pub const fn compression_level(&self) -> u8 {
        self.layout.compression_level
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| ReleaseError::InvalidConfig {
            path: self.root.join(CONFIG_FILE_NAME),
            reason,
        };

        if self.layout.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(invalid(format!(
                "compression_level {} exceeds {MAX_COMPRESSION_LEVEL}",
                self.layout.compression_level
            )));
        }

        let paths = [
            ("manifest", self.layout.manifest.as_path()),
            ("package_metadata", self.layout.package_metadata.as_path()),
            ("update_descriptor", self.layout.update_descriptor.as_path()),
            ("signing_key", self.layout.signing_key.as_path()),
            ("staging_dir", self.layout.staging_dir.as_path()),
            ("stage_marker", self.layout.stage_marker.as_path()),
            ("releases_dir", self.layout.releases_dir.as_path()),
        ];
        for (key, path) in paths {
            if !is_contained_relative(path) {
                return Err(invalid(format!("{key} must be a relative path inside the repository")));
            }
        }

        for name in [&self.layout.package_name, &self.layout.archive_prefix] {
            if name.is_empty() || name.contains(['/', '\\']) {
                return Err(invalid(format!("\"{name}\" is not a plain filename")));
            }
        }

        if let Some(bad) = self
            .layout
            .payload_files
            .iter()
            .find(|f| !is_contained_relative(Utf8Path::new(f.as_str())))
        {
            return Err(invalid(format!("payload file \"{bad}\" must be a relative path")));
        }

        Ok(())
    }
}

/// Parse the contents of `release.toml`.
fn parse_layout(path: &Utf8Path, contents: &str) -> Result<ReleaseLayout> {
    toml::from_str(contents).map_err(|e| ReleaseError::InvalidConfig {
        path: path.to_owned(),
        reason: e.to_string(),
    })
}

/// True when `path` is non-empty, relative, and never climbs out of its base.
fn is_contained_relative(path: &Utf8Path) -> bool {
    !path.as_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Utf8Component::Normal(_) | Utf8Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn utf8_root(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("temp dir path not UTF-8")
    }

    #[test]
    fn defaults_resolve_under_root() {
        let config = ReleaseConfig::with_defaults("/repo");
        assert_eq!(config.manifest_path(), Utf8PathBuf::from("/repo/manifest.json"));
        assert_eq!(
            config.package_path(),
            Utf8PathBuf::from("/repo/releases/extension.crx")
        );
        assert_eq!(config.staging_path(), Utf8PathBuf::from("/repo/build/staging"));
    }

    #[test]
    fn archive_path_embeds_version() {
        let config = ReleaseConfig::with_defaults("/repo");
        let path = config.archive_path(&SemanticVersion::new(1, 2, 4));
        assert_eq!(path, Utf8PathBuf::from("/repo/releases/extension-v1.2.4.zip"));
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let config = ReleaseConfig::load(&utf8_root(&dir)).expect("load");
        assert_eq!(config.layout(), &ReleaseLayout::default());
    }

    #[test]
    fn load_applies_overrides() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "archive_prefix = \"scraper\"\ncompression_level = 6\npayload_files = [\"manifest.json\", \"content.js\"]\nsigning_key = \"secrets/extension.pem\"\n",
        )
        .expect("write config");

        let config = ReleaseConfig::load(&utf8_root(&dir)).expect("load");
        assert_eq!(
            config.signing_key_path(),
            config.root().join("secrets/extension.pem")
        );
        assert_eq!(config.layout().archive_prefix, "scraper");
        assert_eq!(config.compression_level(), 6);
        assert_eq!(config.payload_files(), ["manifest.json", "content.js"]);
        assert_eq!(config.layout().package_name, "extension.crx");
    }

    #[rstest]
    #[case::unknown_key("colour = \"blue\"\n")]
    #[case::bad_level("compression_level = 12\n")]
    #[case::absolute_key("signing_key = \"/etc/key.pem\"\n")]
    #[case::escaping_payload("payload_files = [\"../secret.txt\"]\n")]
    #[case::nested_package_name("package_name = \"out/extension.crx\"\n")]
    #[case::not_toml("this is = = not toml")]
    fn load_rejects_invalid_files(#[case] contents: &str) {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), contents).expect("write config");

        let err = ReleaseConfig::load(&utf8_root(&dir)).expect_err("should reject");
        assert!(matches!(err, ReleaseError::InvalidConfig { .. }), "got {err:?}");
    }

    #[test]
    fn load_rejects_missing_root() {
        let err = ReleaseConfig::load(Utf8Path::new("/definitely/not/a/repo"))
            .expect_err("missing root");
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
