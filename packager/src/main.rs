//! Extension release CLI entrypoint.
//!
//! Each subcommand runs one release step against the repository root.
//! Results and warnings go to stderr; any failure exits with status 1.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use clap::Parser;
use extension_release::archive::{ArchiveBuilder, ArchiveOutcome, probe_archive_backend};
use extension_release::cli::{Cli, Command};
use extension_release::config::ReleaseConfig;
use extension_release::error::{ReleaseError, Result};
use extension_release::exec::SystemCommandExecutor;
use extension_release::keys::KeyManager;
use extension_release::output::{
    archive_summary, bump_summary, identity_notice, key_created_warning, package_summary,
    publish_summary, skipped_notice, status_text, write_stderr_line,
};
use extension_release::package::{Crx3Signer, SignedPackageBuilder};
use extension_release::pipeline::ReleasePipeline;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(cli.command.name(), run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<()> {
    let root = resolve_root(cli.root.as_deref())?;
    let config = ReleaseConfig::load(&root)?;

    match &cli.command {
        Command::Bump { kind } => {
            let report = ReleasePipeline::new(&config, false).bump(*kind, Utc::now())?;
            if !cli.quiet {
                write_stderr_line(stderr, bump_summary(&report));
            }
        }
        Command::BuildPackage(args) => {
            let signer = Crx3Signer::new(config.compression_level());
            let builder = SignedPackageBuilder::new(&config, &signer);
            let key_path = config.signing_key_path();
            let pipeline = ReleasePipeline::new(&config, args.force);
            let result = pipeline.build_package(&builder, |acquired| {
                if acquired.created {
                    write_stderr_line(stderr, key_created_warning(&key_path));
                }
            });
            report_overrides(stderr, &pipeline);
            let report = result?;
            report_skipped(stderr, &report.skipped);
            write_stderr_line(stderr, identity_notice(&report.identity));
            if !cli.quiet {
                write_stderr_line(stderr, package_summary(&report));
            }
        }
        Command::BuildArchive { force, backend } => {
            let executor = SystemCommandExecutor;
            let preference = backend.unwrap_or(config.layout().archive_backend);
            let chosen = probe_archive_backend(&executor, preference, config.compression_level());
            if !cli.quiet {
                write_stderr_line(stderr, format!("Using {} archive backend", chosen.name()));
            }
            let builder = ArchiveBuilder::new(&config, chosen);
            let pipeline = ReleasePipeline::new(&config, force.force);
            let result = pipeline.build_archive(&builder);
            report_overrides(stderr, &pipeline);
            let report = result?;
            report_skipped(stderr, &report.skipped);
            // Manual instructions are the only way forward, so quiet never hides them.
            if !cli.quiet || matches!(report.outcome, ArchiveOutcome::Manual { .. }) {
                write_stderr_line(stderr, archive_summary(&report));
            }
        }
        Command::Publish(args) => {
            let pipeline = ReleasePipeline::new(&config, args.force);
            let result = pipeline.publish(Utc::now());
            report_overrides(stderr, &pipeline);
            let report = result?;
            if !cli.quiet {
                write_stderr_line(stderr, publish_summary(&report));
            }
        }
        Command::Identity => {
            let key = KeyManager::new(config.signing_key_path()).load_existing()?;
            write_stderr_line(stderr, identity_notice(&key.identity()?));
        }
        Command::Status => {
            let status = ReleasePipeline::new(&config, false).status()?;
            write_stderr_line(stderr, status_text(&status));
        }
    }
    Ok(())
}

/// Resolves the repository root from `--root` or the working directory.
fn resolve_root(explicit: Option<&Utf8Path>) -> Result<Utf8PathBuf> {
    if let Some(root) = explicit {
        return Ok(root.to_owned());
    }
    let cwd = std::env::current_dir().map_err(ReleaseError::io("inspect", Utf8Path::new(".")))?;
    Utf8PathBuf::try_from(cwd).map_err(|e| ReleaseError::InvalidConfig {
        path: Utf8PathBuf::from("."),
        reason: format!("current directory is not valid UTF-8: {e}"),
    })
}

fn report_skipped(stderr: &mut dyn Write, skipped: &[String]) {
    if let Some(notice) = skipped_notice(skipped) {
        write_stderr_line(stderr, notice);
    }
}

/// Echo bypassed ordering checks; the binary installs no logger.
fn report_overrides(stderr: &mut dyn Write, pipeline: &ReleasePipeline<'_>) {
    for notice in pipeline.take_overrides() {
        write_stderr_line(stderr, format!("warning: {notice}"));
    }
}

fn exit_code_for_run_result(step: &str, result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {step}: {err}"));
            1
        }
    }
}
