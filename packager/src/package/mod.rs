//! Signed installable package.
//!
//! # Sub-modules
//!
//! - [`builder`] - Key acquisition, staging, signing, and atomic placement.
//! - [`crx`] - CRX3 container encoding and verification.
//! - [`signer`] - Signing capability and the native CRX3 signer.

pub mod builder;
pub mod crx;
pub mod signer;

pub use builder::{PackageReport, SignedPackageBuilder};
pub use crx::CrxPackage;
pub use signer::{Crx3Signer, PackageSigner};
