use std::fmt;

use crate::errors::Result;

/// Represents a Key ID.
///
/// For v4 keys this is the low 64 bits of the fingerprint.
#[derive(Clone, Copy, Eq, PartialEq, Hash, derive_more::Debug)]
#[debug("KeyId({})", hex::encode(_0))]
pub struct KeyId([u8; 8]);

impl AsRef<[u8]> for KeyId {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

impl From<[u8; 8]> for KeyId {
    fn from(value: [u8; 8]) -> Self {
        KeyId(value)
    }
}

impl KeyId {
    /// The "wildcard" id used for anonymous recipients.
    pub const WILDCARD: KeyId = KeyId([0u8; 8]);

    pub fn from_slice(input: &[u8]) -> Result<KeyId> {
        ensure_eq!(input.len(), 8, "invalid input length");
        let mut r = [0u8; 8];
        r.copy_from_slice(input);

        Ok(KeyId(r))
    }

    pub fn is_wildcard(&self) -> bool {
        self == &Self::WILDCARD
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id() {
        let id = KeyId::from_slice(&[0x32, 0xeb, 0x5b, 0xde, 0x40, 0x1a, 0xf5, 0xcd]).unwrap();
        assert_eq!(id.to_string(), "32EB5BDE401AF5CD");
        assert_eq!(format!("{id:?}"), "KeyId(32eb5bde401af5cd)");
        assert!(!id.is_wildcard());
        assert!(KeyId::from([0u8; 8]).is_wildcard());
        assert!(KeyId::from_slice(&[1, 2, 3]).is_err());
    }
}
