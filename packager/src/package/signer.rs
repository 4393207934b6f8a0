//! Package signing capability.

use super::crx;
use crate::archive::write_zip;
use crate::error::Result;
use crate::identity::crx_id;
use crate::keys::SigningKey;
use crate::stager::StagingArea;
use std::io::Cursor;

/// Capability that turns a staging area into signed package bytes.
#[cfg_attr(test, mockall::automock)]
pub trait PackageSigner {
    /// Short backend name used in reports and errors.
    fn name(&self) -> &'static str;

    /// Encode and sign the staged payload with `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ReleaseError::Packaging`] if encoding fails or
    /// [`crate::error::ReleaseError::Crypto`] if signing fails.
    fn sign_package(&self, area: &StagingArea, key: &SigningKey) -> Result<Vec<u8>>;
}

/// Native CRX3 signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crx3Signer {
    level: u8,
}

impl Crx3Signer {
    /// Create a signer whose embedded zip uses deflate `level`.
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self { level }
    }
}

impl PackageSigner for Crx3Signer {
    fn name(&self) -> &'static str {
        "crx3"
    }

    fn sign_package(&self, area: &StagingArea, key: &SigningKey) -> Result<Vec<u8>> {
        let archive = write_zip(area, Cursor::new(Vec::new()), self.level)?.into_inner();
        let public_key = key.public_key_der()?;
        let shd = crx::signed_header_data(&crx_id(&public_key));
        let signature = key.sign_sha256(&crx::signing_message(&shd, &archive)?)?;
        log::debug!(
            "signed {} byte payload from {} file(s)",
            archive.len(),
            area.staged().len()
        );
        let package = crx::assemble(&public_key, &signature, &shd, &archive)?;
        let identity = crx::CrxPackage::parse(&package)?.verify()?;
        log::debug!("assembled package verifies as {identity}");
        Ok(package)
    }
}
