//! Extension identity derived from the signing public key.
//!
//! The browser computes an installed extension's ID by hashing the DER
//! encoded `SubjectPublicKeyInfo` with SHA-256, keeping the leading 16 bytes,
//! and spelling each nibble with the letters `a` to `p`. The same 16 bytes
//! are embedded in the signed package header as its CRX ID.

use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hash bytes that make up the identity.
pub const CRX_ID_LEN: usize = 16;

/// Length of the rendered identity string.
pub const IDENTITY_LEN: usize = CRX_ID_LEN * 2;

/// First symbol of the 16-letter identity alphabet (`a`..=`p`).
const ALPHABET_START: u8 = b'a';

/// A 32-character extension identifier.
///
/// # Examples
///
/// ```
/// use extension_release::identity::ExtensionIdentity;
///
/// let id = ExtensionIdentity::from_public_key_der(b"not really a key");
/// assert_eq!(id.as_str().len(), 32);
/// assert!(id.as_str().bytes().all(|b| (b'a'..=b'p').contains(&b)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionIdentity(String);

/// Error returned when parsing a malformed identity string.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid extension identity \"{0}\": expected 32 letters a-p")]
pub struct InvalidIdentity(String);

impl ExtensionIdentity {
    /// Derive the identity from a DER-encoded public key.
    #[must_use]
    pub fn from_public_key_der(der: &[u8]) -> Self {
        let rendered = crx_id(der)
            .iter()
            .flat_map(|byte| [byte >> 4, byte & 0x0f])
            .map(|nibble| char::from(ALPHABET_START + nibble))
            .collect();
        Self(rendered)
    }

    /// Return the identity string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Leading 16 bytes of the SHA-256 of `der`.
#[must_use]
pub fn crx_id(der: &[u8]) -> [u8; CRX_ID_LEN] {
    let digest = Sha256::digest(der);
    let mut id = [0_u8; CRX_ID_LEN];
    for (slot, byte) in id.iter_mut().zip(digest.iter()) {
        *slot = *byte;
    }
    id
}

#[cfg(any(test, feature = "test-support"))]
impl TryFrom<&str> for ExtensionIdentity {
    type Error = InvalidIdentity;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let valid = value.len() == IDENTITY_LEN
            && value.bytes().all(|b| (ALPHABET_START..ALPHABET_START + 16).contains(&b));
        if valid {
            Ok(Self(value.to_owned()))
        } else {
            Err(InvalidIdentity(value.to_owned()))
        }
    }
}

impl AsRef<str> for ExtensionIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn identity_is_deterministic() {
        let der = b"public key bytes";
        assert_eq!(
            ExtensionIdentity::from_public_key_der(der),
            ExtensionIdentity::from_public_key_der(der)
        );
    }

    #[test]
    fn identity_spells_hash_nibbles() {
        // SHA-256("") begins e3 b0 c4 42 98 fc 1c 14 9a fb f4 c8 99 6f b9 24.
        let id = ExtensionIdentity::from_public_key_der(b"");
        assert_eq!(id.as_str(), "odlameecjipmbmbejkplpemijjgpljce");
    }

    #[test]
    fn crx_id_matches_identity_prefix() {
        let der = b"another key";
        let id = crx_id(der);
        let rendered = ExtensionIdentity::from_public_key_der(der);
        let first = id.first().copied().expect("non-empty");
        let expected_first = char::from(b'a' + (first >> 4));
        assert_eq!(rendered.as_str().chars().next(), Some(expected_first));
    }

    #[rstest]
    #[case::valid("odlameecjipmbmbejkplpemijjgpljce", true)]
    #[case::short("odlameecjipmbmbe", false)]
    #[case::out_of_alphabet("zdlameecjipmbmbejkplpemijjgpljce", false)]
    #[case::uppercase("ODLAMEECJIPMBMBEJKPLPEMIJJGPLJCE", false)]
    fn try_from_validates_shape(#[case] raw: &str, #[case] ok: bool) {
        assert_eq!(ExtensionIdentity::try_from(raw).is_ok(), ok);
    }
}
