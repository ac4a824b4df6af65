use std::fmt;

use crate::errors::Result;
use crate::types::KeyId;

/// Represents a v4 key fingerprint: the SHA1 hash over the serialized public key.
#[derive(Clone, Copy, Eq, PartialEq, Hash, derive_more::Debug)]
#[debug("Fingerprint({})", hex::encode(_0))]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    pub fn from_slice(input: &[u8]) -> Result<Self> {
        ensure_eq!(input.len(), 20, "invalid fingerprint length");
        let mut fp = [0u8; 20];
        fp.copy_from_slice(input);
        Ok(Fingerprint(fp))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }

    /// The key id is the low 64 bits of the fingerprint.
    pub fn key_id(&self) -> KeyId {
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.0[12..]);
        KeyId::from(id)
    }
}

impl From<[u8; 20]> for Fingerprint {
    fn from(value: [u8; 20]) -> Self {
        Fingerprint(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}
