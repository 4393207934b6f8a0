//! Plain versioned archive of the extension payload.
//!
//! # Sub-modules
//!
//! - [`backend`] - Encoder capability, the rich and shell backends, and
//!   runtime probing.
//! - [`builder`] - Staging, encoding, and atomic placement of the archive.

pub mod backend;
pub mod builder;

pub use backend::{
    ArchiveBackend, ArchiveEncoder, BackendPreference, ManualInstructions, ShellZipEncoder,
    ZipEncoder, probe_archive_backend, write_zip,
};
pub use builder::{ArchiveBuilder, ArchiveOutcome, ArchiveReport};
