//! Unit tests for release stage orchestration.

use super::*;
use crate::archive::{ArchiveBackend, ManualInstructions, ZipEncoder};
use crate::error::ErrorKind;
use crate::package::Crx3Signer;
use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use std::cell::Cell;
use tempfile::TempDir;

const FIXTURE_PEM: &str = include_str!("../tests/fixtures/signing-key.pem");

struct Repo {
    _dir: TempDir,
    config: ReleaseConfig,
}

impl Repo {
    fn pipeline(&self) -> ReleasePipeline<'_> {
        ReleasePipeline::new(&self.config, false)
    }

    fn forced(&self) -> ReleasePipeline<'_> {
        ReleasePipeline::new(&self.config, true)
    }

    fn archive(&self) -> Result<ArchiveReport> {
        let builder = ArchiveBuilder::new(
            &self.config,
            ArchiveBackend::Encoder(Box::new(ZipEncoder::new(6))),
        );
        self.pipeline().build_archive(&builder)
    }

    fn package(&self) -> Result<PackageReport> {
        let signer = Crx3Signer::new(6);
        let builder = SignedPackageBuilder::new(&self.config, &signer);
        self.pipeline().build_package(&builder, |_| {})
    }

    fn stage(&self) -> PipelineStage {
        self.pipeline().load().expect("marker").stage
    }
}

#[fixture]
fn repo() -> Repo {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");
    fs::write(root.join("manifest.json"), "{\n  \"version\": \"1.2.3\"\n}\n").expect("write");
    fs::write(
        root.join("updates.json"),
        "{\n  \"version\": \"1.2.3\",\n  \"download_url\": \"https://example.com/v1.2.3/extension.crx\"\n}\n",
    )
    .expect("write");
    fs::write(root.join("background.js"), "void 0;").expect("write");
    fs::create_dir_all(root.join("keys")).expect("mkdir");
    fs::write(root.join("keys/extension.pem"), FIXTURE_PEM).expect("write key");
    Repo {
        _dir: dir,
        config: ReleaseConfig::with_defaults(root),
    }
}

#[rstest]
fn fresh_repository_is_unversioned(repo: Repo) {
    let status = repo.pipeline().status().expect("status");
    assert_eq!(status.marker, StageMarker::default());
    assert_eq!(status.manifest_version, SemanticVersion::new(1, 2, 3));
    assert!(!status.package_present);
    assert!(!status.archive_present);
}

#[rstest]
fn build_before_bump_is_refused(repo: Repo) {
    let err = repo.archive().expect_err("out of order");
    assert_eq!(err.kind(), ErrorKind::Pipeline);
    assert!(err.to_string().contains("--force"));
    assert!(!repo.config.releases_dir().exists());
    assert_eq!(repo.stage(), PipelineStage::Unversioned);
}

#[rstest]
fn force_bypasses_ordering(repo: Repo) {
    let builder = ArchiveBuilder::new(
        &repo.config,
        ArchiveBackend::Encoder(Box::new(ZipEncoder::new(6))),
    );
    let pipeline = repo.forced();
    pipeline.build_archive(&builder).expect("forced build");
    assert_eq!(
        repo.stage(),
        PipelineStage::Built {
            packaged: false,
            archived: true
        }
    );

    let overrides = pipeline.take_overrides();
    assert_eq!(overrides.len(), 1, "{overrides:?}");
    let notice = overrides.first().expect("one override");
    assert!(notice.starts_with("build-archive: proceeding out of order"), "{notice}");
    assert!(pipeline.take_overrides().is_empty());
}

#[rstest]
fn in_order_steps_record_no_overrides(repo: Repo) {
    let pipeline = repo.forced();
    pipeline
        .bump(BumpKind::Patch, Utc::now())
        .expect("bump");
    let builder = ArchiveBuilder::new(
        &repo.config,
        ArchiveBackend::Encoder(Box::new(ZipEncoder::new(6))),
    );
    pipeline.build_archive(&builder).expect("build");
    assert!(pipeline.take_overrides().is_empty());
}

#[rstest]
fn bump_records_version(repo: Repo) {
    repo.pipeline()
        .bump(BumpKind::Patch, Utc::now())
        .expect("bump");
    let marker = repo.pipeline().load().expect("marker");
    assert_eq!(marker.version, Some(SemanticVersion::new(1, 2, 4)));
    assert_eq!(marker.stage, PipelineStage::Bumped);

    let text = fs::read_to_string(repo.config.stage_marker_path()).expect("read");
    assert!(text.contains("\"stage\": \"bumped\""));
    assert!(text.contains("\"version\": \"1.2.4\""));
}

#[rstest]
fn builds_accumulate_artifacts(repo: Repo) {
    repo.pipeline()
        .bump(BumpKind::Minor, Utc::now())
        .expect("bump");
    repo.archive().expect("archive");
    assert_eq!(
        repo.stage(),
        PipelineStage::Built {
            packaged: false,
            archived: true
        }
    );

    let key_seen = Cell::new(None);
    let signer = Crx3Signer::new(6);
    let builder = SignedPackageBuilder::new(&repo.config, &signer);
    repo.pipeline()
        .build_package(&builder, |acquired| key_seen.set(Some(acquired.created)))
        .expect("package");

    assert_eq!(key_seen.get(), Some(false));
    assert_eq!(
        repo.stage(),
        PipelineStage::Built {
            packaged: true,
            archived: true
        }
    );
}

#[rstest]
fn publish_requires_a_build(repo: Repo) {
    repo.pipeline()
        .bump(BumpKind::Patch, Utc::now())
        .expect("bump");
    let err = repo.pipeline().publish(Utc::now()).expect_err("nothing built");
    assert_eq!(err.kind(), ErrorKind::Pipeline);
    let updates = fs::read_to_string(repo.config.update_descriptor_path()).expect("read");
    assert!(updates.contains("https://example.com/v1.2.4/extension.crx"));
}

#[rstest]
fn full_release_reaches_published(repo: Repo) {
    repo.pipeline()
        .bump(BumpKind::Major, Utc::now())
        .expect("bump");
    repo.package().expect("package");
    let report = repo.pipeline().publish(Utc::now()).expect("publish");

    assert_eq!(report.version, SemanticVersion::new(2, 0, 0));
    assert_eq!(repo.stage(), PipelineStage::Published);
    let err = repo.archive().expect_err("already published");
    assert_eq!(err.kind(), ErrorKind::Pipeline);
}

#[rstest]
fn manual_archive_does_not_advance(repo: Repo) {
    repo.pipeline()
        .bump(BumpKind::Patch, Utc::now())
        .expect("bump");
    let builder = ArchiveBuilder::new(
        &repo.config,
        ArchiveBackend::Manual(ManualInstructions::new(9)),
    );
    repo.pipeline().build_archive(&builder).expect("manual");
    assert_eq!(repo.stage(), PipelineStage::Bumped);
}

#[rstest]
fn manifest_edited_after_bump_is_refused(repo: Repo) {
    repo.pipeline()
        .bump(BumpKind::Patch, Utc::now())
        .expect("bump");
    fs::write(repo.config.manifest_path(), "{\n  \"version\": \"9.9.9\"\n}\n").expect("write");

    let err = repo.archive().expect_err("version mismatch");
    assert!(err.to_string().contains("1.2.4"));
    assert!(err.to_string().contains("9.9.9"));
}

#[rstest]
#[case::not_json("stage = bumped")]
#[case::unknown_stage("{\"stage\": \"shipped\"}")]
#[case::bad_version("{\"stage\": \"bumped\", \"version\": \"one\"}")]
fn malformed_marker_is_config_error(repo: Repo, #[case] contents: &str) {
    fs::create_dir_all(repo.config.stage_marker_path().parent().expect("parent")).expect("mkdir");
    fs::write(repo.config.stage_marker_path(), contents).expect("write");
    let err = repo.pipeline().status().expect_err("malformed");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn stage_display_lists_built_artifacts() {
    let stage = PipelineStage::Built {
        packaged: true,
        archived: true,
    };
    assert_eq!(stage.to_string(), "built (package, archive)");
    assert_eq!(PipelineStage::Bumped.to_string(), "bumped");
}
