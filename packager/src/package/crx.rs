//! CRX3 container encoding.
//!
//! A CRX3 file is the magic `Cr24`, a little-endian format version, a
//! little-endian header length, a protobuf `CrxFileHeader`, and then the zip
//! payload. The header carries the public key, an RSA signature, and the
//! signed header data naming the CRX ID.

use crate::error::{ReleaseError, Result};
use crate::identity::{CRX_ID_LEN, ExtensionIdentity, crx_id};
use prost::Message;
use rsa::RsaPublicKey;
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use sha2::Sha256;

/// File magic.
pub const CRX_MAGIC: &[u8; 4] = b"Cr24";

/// Container format version.
pub const CRX_FORMAT_VERSION: u32 = 3;

/// Prefix of every signed message.
const SIGNATURE_CONTEXT: &[u8] = b"CRX3 SignedData\x00";

/// Backend name used in packaging errors.
const CRX_BACKEND: &str = "crx3";

/// Magic, format version, and header length.
const PREAMBLE_LEN: usize = 12;

/// Wire form of the header preceding the zip payload.
///
/// Only the RSA proof list and the signed header data are modelled; ECDSA
/// proofs in foreign packages are skipped as unknown fields.
#[derive(Clone, PartialEq, Message)]
struct CrxFileHeader {
    #[prost(message, repeated, tag = "2")]
    sha256_with_rsa: Vec<AsymmetricKeyProof>,
    #[prost(bytes = "vec", tag = "10000")]
    signed_header_data: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
struct AsymmetricKeyProof {
    #[prost(bytes = "vec", tag = "1")]
    public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    signature: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
struct SignedData {
    #[prost(bytes = "vec", tag = "1")]
    crx_id: Vec<u8>,
}

fn length_u32(len: usize, what: &str) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| ReleaseError::packaging(CRX_BACKEND, format!("{what} exceeds 4 GiB")))
}

/// Serialised `SignedData` naming `id`.
#[must_use]
pub fn signed_header_data(id: &[u8; CRX_ID_LEN]) -> Vec<u8> {
    SignedData { crx_id: id.to_vec() }.encode_to_vec()
}

/// The byte string covered by the package signature.
///
/// # Errors
///
/// Returns [`ReleaseError::Packaging`] if the signed header data is too
/// large for its length prefix.
#[expect(
    clippy::little_endian_bytes,
    reason = "CRX3 length prefixes are little-endian"
)]
pub fn signing_message(signed_header_data: &[u8], archive: &[u8]) -> Result<Vec<u8>> {
    let shd_len = length_u32(signed_header_data.len(), "signed header data")?;
    let mut message =
        Vec::with_capacity(SIGNATURE_CONTEXT.len() + 4 + signed_header_data.len() + archive.len());
    message.extend_from_slice(SIGNATURE_CONTEXT);
    message.extend_from_slice(&shd_len.to_le_bytes());
    message.extend_from_slice(signed_header_data);
    message.extend_from_slice(archive);
    Ok(message)
}

/// Assemble a complete CRX3 file.
///
/// # Errors
///
/// Returns [`ReleaseError::Packaging`] if the header is too large.
#[expect(
    clippy::little_endian_bytes,
    reason = "CRX3 length prefixes are little-endian"
)]
pub fn assemble(
    public_key_der: &[u8],
    signature: &[u8],
    signed_header_data: &[u8],
    archive: &[u8],
) -> Result<Vec<u8>> {
    let header = CrxFileHeader {
        sha256_with_rsa: vec![AsymmetricKeyProof {
            public_key: public_key_der.to_vec(),
            signature: signature.to_vec(),
        }],
        signed_header_data: signed_header_data.to_vec(),
    }
    .encode_to_vec();
    let header_len = length_u32(header.len(), "package header")?;

    let mut out = Vec::with_capacity(PREAMBLE_LEN + header.len() + archive.len());
    out.extend_from_slice(CRX_MAGIC);
    out.extend_from_slice(&CRX_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(archive);
    Ok(out)
}

/// A parsed CRX3 file.
///
/// Header fields are decoded copies; the archive borrows from the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrxPackage<'a> {
    /// DER-encoded public key from the first RSA proof.
    pub public_key: Vec<u8>,
    /// Signature from the first RSA proof.
    pub signature: Vec<u8>,
    /// Serialised `SignedData` exactly as signed.
    pub signed_header_data: Vec<u8>,
    /// CRX ID named by the signed header data.
    pub crx_id: Vec<u8>,
    /// The embedded zip archive.
    pub archive: &'a [u8],
}

impl<'a> CrxPackage<'a> {
    /// Parse a CRX3 file.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Packaging`] if the bytes are not a well-formed
    /// CRX3 file carrying an RSA proof and signed header data.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let (magic, after_magic) = split(bytes, CRX_MAGIC.len())?;
        if magic != CRX_MAGIC.as_slice() {
            return Err(malformed("missing Cr24 magic"));
        }
        let (version, after_version) = read_u32_le(after_magic)?;
        if version != CRX_FORMAT_VERSION {
            return Err(malformed(format!("unsupported format version {version}")));
        }
        let (raw_header_len, after_preamble) = read_u32_le(after_version)?;
        let header_len = usize::try_from(raw_header_len)
            .map_err(|_| malformed("header length does not fit in memory"))?;
        let (header_bytes, archive) = split(after_preamble, header_len)?;

        let header = CrxFileHeader::decode(header_bytes).map_err(malformed)?;
        let proof = header
            .sha256_with_rsa
            .into_iter()
            .next()
            .ok_or_else(|| malformed("no RSA proof"))?;
        if header.signed_header_data.is_empty() {
            return Err(malformed("no signed header data"));
        }
        let signed = SignedData::decode(header.signed_header_data.as_slice()).map_err(malformed)?;
        if signed.crx_id.is_empty() {
            return Err(malformed("signed header data names no CRX ID"));
        }
        if proof.public_key.is_empty() {
            return Err(malformed("proof has no public key"));
        }
        if proof.signature.is_empty() {
            return Err(malformed("proof has no signature"));
        }

        Ok(Self {
            public_key: proof.public_key,
            signature: proof.signature,
            signed_header_data: header.signed_header_data,
            crx_id: signed.crx_id,
            archive,
        })
    }

    /// Check the signature and the CRX ID against the embedded public key.
    ///
    /// Returns the identity the browser will assign to the package.
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Crypto`] if the key cannot be decoded or the
    /// signature does not verify, or [`ReleaseError::Packaging`] if the CRX
    /// ID does not match the key.
    pub fn verify(&self) -> Result<ExtensionIdentity> {
        if crx_id(&self.public_key).as_slice() != self.crx_id.as_slice() {
            return Err(malformed("CRX ID does not match the public key"));
        }
        let key = RsaPublicKey::from_public_key_der(&self.public_key)
            .map_err(|e| ReleaseError::crypto("decode package public key", e))?;
        let signature = pkcs1v15::Signature::try_from(self.signature.as_slice())
            .map_err(|e| ReleaseError::crypto("decode package signature", e))?;
        let message = signing_message(&self.signed_header_data, self.archive)?;
        pkcs1v15::VerifyingKey::<Sha256>::new(key)
            .verify(&message, &signature)
            .map_err(|e| ReleaseError::crypto("verify package signature", e))?;
        Ok(ExtensionIdentity::from_public_key_der(&self.public_key))
    }
}

fn malformed(reason: impl std::fmt::Display) -> ReleaseError {
    ReleaseError::packaging(CRX_BACKEND, format!("malformed package: {reason}"))
}

fn split(bytes: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    bytes
        .split_at_checked(len)
        .ok_or_else(|| malformed("truncated"))
}

#[expect(
    clippy::little_endian_bytes,
    reason = "CRX3 length prefixes are little-endian"
)]
fn read_u32_le(bytes: &[u8]) -> Result<(u32, &[u8])> {
    let (head, rest) = split(bytes, 4)?;
    let raw: [u8; 4] = head.try_into().map_err(|_| malformed("truncated"))?;
    Ok((u32::from_le_bytes(raw), rest))
}

#[cfg(test)]
#[path = "crx_tests.rs"]
mod tests;
