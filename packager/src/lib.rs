//! Browser extension release library.
//!
//! This crate keeps an extension's version synchronised across its
//! descriptor files, maintains the persistent signing key that fixes the
//! extension's identity, and produces the signed package, the versioned
//! archive, and the update descriptor that self-hosted clients poll. It is
//! used by the `extension-release` binary and can be driven
//! programmatically.
//!
//! # Modules
//!
//! - [`archive`] - Versioned archive builds with probed encoder backends
//! - [`atomic`] - All-or-nothing file replacement
//! - [`bump`] - Version coordination across descriptors
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Repository layout and `release.toml` loading
//! - [`descriptor`] - JSON descriptor documents and URL version rewriting
//! - [`digest`] - SHA-256 digests of release artifacts
//! - [`error`] - Error taxonomy and result alias
//! - [`exec`] - External command execution
//! - [`identity`] - Extension identity derived from the public key
//! - [`keys`] - Signing key lifecycle
//! - [`output`] - Operator-facing text
//! - [`package`] - Signed CRX3 package builds
//! - [`pipeline`] - Release stage machine
//! - [`publish`] - Update descriptor publishing
//! - [`stager`] - Payload staging with guaranteed cleanup
//! - [`version`] - Semantic versions and bump rules

pub mod archive;
pub mod atomic;
pub mod bump;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod exec;
pub mod identity;
pub mod keys;
pub mod output;
pub mod package;
pub mod pipeline;
pub mod publish;
pub mod stager;
pub mod version;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
