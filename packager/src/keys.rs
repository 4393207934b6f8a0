//! Signing key lifecycle.
//!
//! The private key persisted at the configured path is the single source of
//! truth for the extension's identity. Once it exists it is loaded verbatim
//! on every build and never replaced: losing or regenerating it orphans every
//! installed client, because their extension ID is derived from its public
//! half. A key is generated only when no file exists, and the caller must
//! then surface [`AcquiredKey::created`] to the operator.

use crate::error::{ReleaseError, Result};
use crate::identity::ExtensionIdentity;
use camino::{Utf8Path, Utf8PathBuf};
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs1v15;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rsa::rand_core::CryptoRngCore;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::fs;
use std::io::Write;

/// Modulus size of generated keys.
pub const KEY_BITS: usize = 2048;

/// An RSA private key together with its persisted PEM text.
#[derive(Clone)]
pub struct SigningKey {
    private: RsaPrivateKey,
    pem: String,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Decode a PKCS#1 PEM private key, keeping the exact text.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Crypto`] if the text is not a PKCS#1 RSA key.
    pub fn from_pkcs1_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| ReleaseError::crypto("decode signing key", e))?;
        Ok(Self {
            private,
            pem: pem.to_owned(),
        })
    }

    /// Decode a PEM private key in PKCS#1 or PKCS#8 form, keeping the exact
    /// text.
    ///
    /// Keys exported by the browser's own packer are PKCS#8.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Crypto`] if the text is neither form.
    pub fn from_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem).or_else(|pkcs1_err| {
            RsaPrivateKey::from_pkcs8_pem(pem).map_err(|pkcs8_err| {
                ReleaseError::crypto(
                    "decode signing key",
                    format!("not PKCS#1 ({pkcs1_err}) or PKCS#8 ({pkcs8_err})"),
                )
            })
        })?;
        Ok(Self {
            private,
            pem: pem.to_owned(),
        })
    }

    /// Generate a fresh key of [`KEY_BITS`] bits.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Crypto`] if generation or PEM encoding fails.
    pub fn generate<R: CryptoRngCore + ?Sized>(rng: &mut R) -> Result<Self> {
        let private = RsaPrivateKey::new(rng, KEY_BITS)
            .map_err(|e| ReleaseError::crypto("generate signing key", e))?;
        let pem = private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| ReleaseError::crypto("encode signing key", e))?;
        Ok(Self {
            private,
            pem: pem.as_str().to_owned(),
        })
    }

    /// The PEM text exactly as persisted.
    #[must_use]
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// DER-encoded `SubjectPublicKeyInfo` of the public half.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Crypto`] if encoding fails.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        self.private
            .to_public_key()
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| ReleaseError::crypto("encode public key", e))
    }

    /// The extension identity this key produces.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Crypto`] if the public key cannot be encoded.
    pub fn identity(&self) -> Result<ExtensionIdentity> {
        Ok(ExtensionIdentity::from_public_key_der(&self.public_key_der()?))
    }

    /// RSASSA-PKCS1-v1_5 signature over the SHA-256 of `message`.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Crypto`] if signing fails.
    pub fn sign_sha256(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signer = pkcs1v15::SigningKey::<Sha256>::new(self.private.clone());
        signer
            .try_sign(message)
            .map(|signature| signature.to_vec())
            .map_err(|e| ReleaseError::crypto("sign package", e))
    }
}

/// A key returned by [`KeyManager::acquire_key`].
#[derive(Debug, Clone)]
pub struct AcquiredKey {
    /// The signing key.
    pub key: SigningKey,
    /// True when the key was generated by this call.
    pub created: bool,
}

/// Loads or creates the persisted signing key.
#[derive(Debug, Clone)]
pub struct KeyManager {
    path: Utf8PathBuf,
}

impl KeyManager {
    /// Manage the key stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Return the key file location.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Load the persisted key, generating and persisting one if none exists.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::UnusableKey`] if a key file exists but cannot
    /// be decoded (it is left in place), [`ReleaseError::Crypto`] if
    /// generation fails, or [`ReleaseError::Io`] if reading or persisting
    /// fails.
    pub fn acquire_key(&self) -> Result<AcquiredKey> {
        self.acquire_key_with(&mut OsRng)
    }

    /// As [`KeyManager::acquire_key`] with an explicit random source.
    ///
    /// # Errors
    ///
    /// See [`KeyManager::acquire_key`].
    pub fn acquire_key_with<R: CryptoRngCore + ?Sized>(&self, rng: &mut R) -> Result<AcquiredKey> {
        if self.key_exists()? {
            log::debug!("loading signing key from {}", self.path);
            return Ok(AcquiredKey {
                key: self.load_existing()?,
                created: false,
            });
        }

        log::debug!("no signing key at {}; generating {KEY_BITS}-bit RSA key", self.path);
        let key = SigningKey::generate(rng)?;
        self.persist_new(&key)?;
        Ok(AcquiredKey { key, created: true })
    }

    /// Load the persisted key without ever creating one.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Io`] if the file is missing or unreadable, or
    /// [`ReleaseError::UnusableKey`] if it cannot be decoded.
    pub fn load_existing(&self) -> Result<SigningKey> {
        let pem = fs::read_to_string(&self.path).map_err(ReleaseError::io("read", &self.path))?;
        SigningKey::from_pem(&pem).map_err(|e| ReleaseError::UnusableKey {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    fn key_exists(&self) -> Result<bool> {
        self.path
            .try_exists()
            .map_err(ReleaseError::io("inspect", &self.path))
    }

    /// Write a new key, refusing to replace any file that appeared meanwhile.
    fn persist_new(&self, key: &SigningKey) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(ReleaseError::io("create", parent))?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&self.path)
            .map_err(ReleaseError::io("create", &self.path))?;
        let written = file
            .write_all(key.pem().as_bytes())
            .and_then(|()| file.sync_all());
        if let Err(e) = written {
            // Nothing was ever signed with this key, so the truncated file can go.
            if let Err(cleanup) = fs::remove_file(&self.path) {
                log::warn!("could not remove partial key {}: {cleanup}", self.path);
            }
            return Err(ReleaseError::io("write", &self.path)(e));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
