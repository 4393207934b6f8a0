//! CLI argument definitions for the release tool.
//!
//! Kept apart from the entrypoint so the binary only orchestrates.

use crate::archive::BackendPreference;
use crate::version::BumpKind;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Version, sign, archive, and publish a browser extension release.
#[derive(Parser, Debug)]
#[command(name = "extension-release")]
#[command(version, about)]
#[command(after_help = concat!(
    "TYPICAL RELEASE:\n",
    "    $ extension-release bump patch\n",
    "    $ extension-release build-package\n",
    "    $ extension-release build-archive\n",
    "    $ extension-release publish\n\n",
    "Steps refuse to run out of order unless --force is given.",
))]
pub struct Cli {
    /// Repository root [default: current directory].
    #[arg(long, value_name = "DIR", global = true)]
    pub root: Option<Utf8PathBuf>,

    /// Suppress progress output (warnings, identity, and errors still shown).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Step to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bump the version in every descriptor.
    Bump {
        /// Which component to increment.
        #[arg(value_enum)]
        kind: BumpKind,
    },

    /// Build the signed package at its stable path.
    BuildPackage(ForceArgs),

    /// Build the versioned archive.
    BuildArchive {
        /// Ordering override.
        #[command(flatten)]
        force: ForceArgs,

        /// Archive backend [default: from release.toml, else auto].
        #[arg(long, value_enum)]
        backend: Option<BackendPreference>,
    },

    /// Point the update descriptor at the built version.
    Publish(ForceArgs),

    /// Print the extension ID derived from the existing signing key.
    Identity,

    /// Print the pipeline stage and artifact presence.
    Status,
}

impl Command {
    /// Name used when reporting a failure.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bump { .. } => "bump",
            Self::BuildPackage(_) => "build-package",
            Self::BuildArchive { .. } => "build-archive",
            Self::Publish(_) => "publish",
            Self::Identity => "identity",
            Self::Status => "status",
        }
    }
}

/// Shared ordering override.
#[derive(Args, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceArgs {
    /// Run even if the pipeline stage says this step is out of order.
    #[arg(long)]
    pub force: bool,
}
