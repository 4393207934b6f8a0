//! Tests for archive encoder backends and probing.

use super::*;
use crate::error::ErrorKind;
use crate::exec::SystemCommandExecutor;
use crate::stager::PayloadStager;
use crate::test_utils::{ExpectedCall, StubExecutor, failure_output, success_output};
use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use std::io::Read;
use tempfile::TempDir;

struct Staged {
    _dir: TempDir,
    root: Utf8PathBuf,
    area: StagingArea,
}

#[fixture]
fn staged() -> Staged {
    let dir = TempDir::new().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");
    fs::create_dir_all(root.join("icons")).expect("mkdir");
    fs::write(root.join("manifest.json"), "{\"version\": \"1.2.4\"}").expect("write");
    fs::write(root.join("content.js"), "scrape();").expect("write");
    fs::write(root.join("icons/icon16.png"), [1_u8, 2, 3]).expect("write");
    let files: Vec<String> = ["manifest.json", "content.js", "icons/icon16.png"]
        .iter()
        .map(|&s| s.to_owned())
        .collect();
    let area = PayloadStager::new(root.join("build/staging"))
        .stage(&root, &files)
        .expect("stage");
    Staged {
        _dir: dir,
        root,
        area,
    }
}

fn read_entries(path: &Utf8Path) -> Vec<(String, Vec<u8>)> {
    let file = fs::File::open(path).expect("open archive");
    let mut archive = zip::ZipArchive::new(file).expect("valid zip");
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).expect("entry");
            let mut data = Vec::new();
            entry.read_to_end(&mut data).expect("read entry");
            (entry.name().to_owned(), data)
        })
        .collect()
}

#[rstest]
fn zip_encoder_writes_payload_in_order(staged: Staged) {
    let destination = staged.root.join("out.zip");
    ZipEncoder::new(9)
        .encode(&staged.area, &destination)
        .expect("encode");

    let entries = read_entries(&destination);
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["manifest.json", "content.js", "icons/icon16.png"]);
    assert_eq!(
        entries.get(1).map(|(_, data)| data.as_slice()),
        Some(b"scrape();".as_slice())
    );
}

#[rstest]
fn zip_output_is_reproducible(staged: Staged) {
    let first = write_zip(&staged.area, std::io::Cursor::new(Vec::new()), 6)
        .expect("first")
        .into_inner();
    let second = write_zip(&staged.area, std::io::Cursor::new(Vec::new()), 6)
        .expect("second")
        .into_inner();
    assert_eq!(first, second);
}

#[rstest]
fn shell_encoder_runs_zip_inside_staging_area(staged: Staged) {
    let executor = StubExecutor::new(vec![ExpectedCall::new(
        "zip",
        &["-q", "-X", "-7"],
        Ok(success_output()),
    )]);
    let destination = staged.root.join("out.zip");
    // The stub does not write anything, so the encoder must notice.
    let err = ShellZipEncoder::new(&executor, 7)
        .encode(&staged.area, &destination)
        .expect_err("no output written");
    assert_eq!(err.kind(), ErrorKind::Packaging);

    let calls = executor.calls();
    let call = calls.first().expect("one call");
    assert_eq!(call.dir.as_deref(), Some(staged.area.path()));
    assert_eq!(
        call.args,
        [
            "-q",
            "-X",
            "-7",
            destination.as_str(),
            "manifest.json",
            "content.js",
            "icons/icon16.png"
        ]
    );
    executor.assert_finished();
}

#[rstest]
fn shell_encoder_reports_nonzero_exit(staged: Staged) {
    let executor = StubExecutor::new(vec![ExpectedCall::new(
        "zip",
        &[],
        Ok(failure_output("zip I/O error: disk full")),
    )]);
    let err = ShellZipEncoder::new(&executor, 9)
        .encode(&staged.area, &staged.root.join("out.zip"))
        .expect_err("zip failed");
    assert!(err.to_string().contains("disk full"));
}

#[rstest]
fn shell_encoder_with_real_zip(staged: Staged) {
    let executor = SystemCommandExecutor;
    if !command_succeeds(&executor, "zip", &["-v"]) {
        return;
    }
    let destination = staged.root.join("shell.zip");
    ShellZipEncoder::new(&executor, 9)
        .encode(&staged.area, &destination)
        .expect("encode");
    let names: Vec<String> = read_entries(&destination)
        .into_iter()
        .map(|(n, _)| n)
        .collect();
    assert!(names.contains(&"icons/icon16.png".to_owned()));
}

#[rstest]
#[case::auto(BackendPreference::Auto, "zip")]
#[case::rich(BackendPreference::Rich, "zip")]
#[case::manual(BackendPreference::Manual, "manual")]
fn probing_without_shell_needs_no_commands(
    #[case] preference: BackendPreference,
    #[case] expected: &str,
) {
    let executor = StubExecutor::new(vec![]);
    let backend = probe_archive_backend(&executor, preference, 9);
    assert_eq!(backend.name(), expected);
    assert!(executor.calls().is_empty());
}

#[rstest]
#[case::available(Ok(success_output()), "shell zip")]
#[case::broken(Ok(failure_output("")), "manual")]
#[case::missing(
    Err(ReleaseError::io("run", Utf8Path::new("zip"))(std::io::Error::from(
        std::io::ErrorKind::NotFound
    ))),
    "manual"
)]
fn shell_preference_probes_zip(#[case] probe: Result<std::process::Output>, #[case] expected: &str) {
    let executor = StubExecutor::new(vec![ExpectedCall::new("zip", &["-v"], probe)]);
    let backend = probe_archive_backend(&executor, BackendPreference::Shell, 9);
    assert_eq!(backend.name(), expected);
    executor.assert_finished();
}

#[test]
fn manual_instructions_name_destination_relative_to_root() {
    let text = ManualInstructions::new(9).render(
        Utf8Path::new("/repo"),
        Utf8Path::new("/repo/releases/extension-v1.2.4.zip"),
        &["manifest.json".to_owned(), "popup.js".to_owned()],
    );
    assert!(text.contains("From /repo, run:"));
    assert!(text.ends_with("zip -X -9 releases/extension-v1.2.4.zip manifest.json popup.js"));
}

#[rstest]
#[case("\"rich\"", BackendPreference::Rich)]
#[case("\"shell\"", BackendPreference::Shell)]
#[case("\"manual\"", BackendPreference::Manual)]
#[case("\"auto\"", BackendPreference::Auto)]
fn preference_deserialises_lowercase(#[case] raw: &str, #[case] expected: BackendPreference) {
    let parsed: BackendPreference = serde_json::from_str(raw).expect("parse");
    assert_eq!(parsed, expected);
}
