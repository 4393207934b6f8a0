//! Payload staging.
//!
//! Copies the payload files into an isolated directory for one build. The
//! directory is recreated from scratch on every run and removed again once
//! the build finishes, whichever way it finishes: [`StagingArea`] removes it
//! on drop if [`StagingArea::release`] was never reached.

use crate::error::{ReleaseError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use std::fs;

/// Prepares fresh staging areas at a fixed location.
#[derive(Debug, Clone)]
pub struct PayloadStager {
    staging_dir: Utf8PathBuf,
}

impl PayloadStager {
    /// Create a stager that stages into `staging_dir`.
    #[must_use]
    pub fn new(staging_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
        }
    }

    /// Return the staging directory.
    #[must_use]
    pub fn staging_path(&self) -> &Utf8Path {
        &self.staging_dir
    }

    /// Copy every file of `files` that exists under `source_dir` into a
    /// freshly created staging directory.
    ///
    /// Any leftover staging directory from an earlier run is removed first.
    /// Missing files are logged and recorded in [`StagingArea::skipped`].
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Io`] if the stale directory cannot be removed
    /// or a copy fails. The partially populated directory is removed before
    /// the error is returned.
    pub fn stage(&self, source_dir: &Utf8Path, files: &[String]) -> Result<StagingArea> {
        self.remove_stale()?;
        fs::create_dir_all(&self.staging_dir)
            .map_err(ReleaseError::io("create", &self.staging_dir))?;

        // From here on the area owns the directory, so an early return
        // cleans it up.
        let mut area = StagingArea {
            path: self.staging_dir.clone(),
            staged: Vec::with_capacity(files.len()),
            skipped: Vec::new(),
            released: false,
        };

        for name in files {
            let source = source_dir.join(name);
            if !source.is_file() {
                warn!("payload file {name} not found at {source}; skipping");
                area.skipped.push(name.clone());
                continue;
            }
            let destination = area.path.join(name);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(ReleaseError::io("create", parent))?;
            }
            fs::copy(&source, &destination).map_err(ReleaseError::io("copy", &source))?;
            area.staged.push(name.clone());
        }

        debug!(
            "staged {} file(s) into {} ({} skipped)",
            area.staged.len(),
            area.path,
            area.skipped.len()
        );
        Ok(area)
    }

    /// Stage `files`, run `build` against the staging area, then release it.
    ///
    /// The staging directory is removed whether `build` succeeds or fails.
    ///
    /// # Errors
    ///
    /// Returns the first error among staging, `build`, and release. When
    /// `build` fails and release also fails, the release failure is logged
    /// and the build error is returned.
    pub fn with_staged<T, F>(&self, source_dir: &Utf8Path, files: &[String], build: F) -> Result<T>
    where
        F: FnOnce(&StagingArea) -> Result<T>,
    {
        let area = self.stage(source_dir, files)?;
        let outcome = build(&area);
        let released = area.release();
        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(build_err), Ok(())) => Err(build_err),
            (Err(build_err), Err(release_err)) => {
                warn!("staging cleanup also failed: {release_err}");
                Err(build_err)
            }
        }
    }

    fn remove_stale(&self) -> Result<()> {
        match fs::remove_dir_all(&self.staging_dir) {
            Ok(()) => {
                debug!("removed stale staging directory {}", self.staging_dir);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReleaseError::io("remove", &self.staging_dir)(e)),
        }
    }
}

/// A populated staging directory.
#[derive(Debug)]
pub struct StagingArea {
    path: Utf8PathBuf,
    staged: Vec<String>,
    skipped: Vec<String>,
    released: bool,
}

impl StagingArea {
    /// Return the staging directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Payload names that were copied, in payload order.
    #[must_use]
    pub fn staged(&self) -> &[String] {
        &self.staged
    }

    /// Payload names that were absent from the source tree.
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Staged files as `(archive name, path inside the staging area)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Utf8PathBuf)> + '_ {
        self.staged
            .iter()
            .map(|name| (name.as_str(), self.path.join(name)))
    }

    /// Remove the staging directory.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Io`] if the directory cannot be removed.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReleaseError::io("remove", &self.path)(e)),
        }
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove staging directory {}: {e}", self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Workspace {
        _dir: TempDir,
        source: Utf8PathBuf,
        stager: PayloadStager,
    }

    #[fixture]
    fn workspace() -> Workspace {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");
        let source = root.join("src");
        fs::create_dir_all(source.join("icons")).expect("mkdir");
        fs::write(source.join("manifest.json"), "{}").expect("write");
        fs::write(source.join("popup.js"), "console.log(1);").expect("write");
        fs::write(source.join("icons/icon16.png"), [0x89, b'P', b'N', b'G']).expect("write");
        Workspace {
            _dir: dir,
            source,
            stager: PayloadStager::new(root.join("build/staging")),
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|&s| s.to_owned()).collect()
    }

    #[rstest]
    fn stage_copies_present_files_and_skips_missing(workspace: Workspace) {
        let files = names(&["manifest.json", "content.js", "popup.js", "icons/icon16.png"]);
        let area = workspace
            .stager
            .stage(&workspace.source, &files)
            .expect("stage");

        assert_eq!(area.staged(), ["manifest.json", "popup.js", "icons/icon16.png"]);
        assert_eq!(area.skipped(), ["content.js"]);
        assert_eq!(
            fs::read(area.path().join("icons/icon16.png")).expect("read"),
            [0x89, b'P', b'N', b'G']
        );
        area.release().expect("release");
        assert!(!workspace.stager.staging_path().exists());
    }

    #[rstest]
    fn stage_removes_stale_leftovers(workspace: Workspace) {
        let stale = workspace.stager.staging_path().join("old.js");
        fs::create_dir_all(workspace.stager.staging_path()).expect("mkdir");
        fs::write(&stale, "stale").expect("write");

        let area = workspace
            .stager
            .stage(&workspace.source, &names(&["manifest.json"]))
            .expect("stage");
        assert!(!stale.exists());
        assert!(area.path().join("manifest.json").is_file());
    }

    #[rstest]
    fn entries_follow_payload_order(workspace: Workspace) {
        let area = workspace
            .stager
            .stage(&workspace.source, &names(&["popup.js", "manifest.json"]))
            .expect("stage");
        let order: Vec<&str> = area.entries().map(|(name, _)| name).collect();
        assert_eq!(order, ["popup.js", "manifest.json"]);
    }

    #[rstest]
    fn with_staged_releases_after_success(workspace: Workspace) {
        let count = workspace
            .stager
            .with_staged(&workspace.source, &names(&["manifest.json"]), |area| {
                assert!(area.path().is_dir());
                Ok(area.staged().len())
            })
            .expect("build");
        assert_eq!(count, 1);
        assert!(!workspace.stager.staging_path().exists());
    }

    #[rstest]
    fn with_staged_releases_after_injected_failure(workspace: Workspace) {
        let err = workspace
            .stager
            .with_staged(&workspace.source, &names(&["manifest.json"]), |_| {
                Err::<(), _>(ReleaseError::packaging("test", "injected failure"))
            })
            .expect_err("build fails");
        assert_eq!(err.kind(), ErrorKind::Packaging);
        assert!(!workspace.stager.staging_path().exists());
    }

    #[rstest]
    fn dropping_unreleased_area_removes_directory(workspace: Workspace) {
        let area = workspace
            .stager
            .stage(&workspace.source, &names(&["manifest.json"]))
            .expect("stage");
        assert!(workspace.stager.staging_path().is_dir());
        drop(area);
        assert!(!workspace.stager.staging_path().exists());
    }

    #[cfg(unix)]
    #[rstest]
    fn unwritable_build_directory_is_an_io_error(workspace: Workspace) {
        use std::os::unix::fs::PermissionsExt;

        // Root bypasses directory permissions.
        if unsafe { libc::geteuid() } == 0 {
            return;
        }

        let build_dir = workspace.stager.staging_path().parent().expect("parent").to_owned();
        fs::create_dir_all(&build_dir).expect("mkdir");
        fs::set_permissions(&build_dir, fs::Permissions::from_mode(0o555)).expect("chmod");

        let result = workspace
            .stager
            .stage(&workspace.source, &names(&["manifest.json"]));
        fs::set_permissions(&build_dir, fs::Permissions::from_mode(0o755)).expect("chmod");

        let err = result.expect_err("read-only parent");
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[rstest]
    fn empty_source_stages_nothing(workspace: Workspace) {
        let area = workspace
            .stager
            .stage(&workspace.source, &names(&["background.js"]))
            .expect("stage");
        assert!(area.staged().is_empty());
        assert_eq!(area.skipped(), ["background.js"]);
    }
}
