use num_enum::{FromPrimitive, IntoPrimitive};

/// Represents the packet length.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PacketLength {
    Fixed(usize),
    Indeterminate,
    /// Partial body length, always a power of two.
    Partial(u32),
}

/// Packet tag as defined in RFC 9580, Section 5 "Packet Types"
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Tag {
    /// Public-Key Encrypted Session Key Packet
    PublicKeyEncryptedSessionKey = 1,
    /// Signature Packet
    Signature = 2,
    /// Symmetric-Key Encrypted Session Key Packet
    SymKeyEncryptedSessionKey = 3,
    /// One-Pass Signature Packet
    OnePassSignature = 4,
    /// Secret-Key Packet
    SecretKey = 5,
    /// Public-Key Packet
    PublicKey = 6,
    /// Secret-Subkey Packet
    SecretSubkey = 7,
    /// Compressed Data Packet
    CompressedData = 8,
    /// Symmetrically Encrypted Data Packet
    SymEncryptedData = 9,
    /// Marker Packet
    Marker = 10,
    /// Literal Data Packet
    LiteralData = 11,
    /// Trust Packet
    Trust = 12,
    /// User ID Packet
    UserId = 13,
    /// Public-Subkey Packet
    PublicSubkey = 14,
    /// User Attribute Packet
    UserAttribute = 17,
    /// Sym. Encrypted and Integrity Protected Data Packet
    SymEncryptedProtectedData = 18,
    /// Modification Detection Code Packet
    ModDetectionCode = 19,
    /// Padding Packet
    Padding = 21,

    #[num_enum(catch_all)]
    Other(u8),
}

impl Tag {
    /// Packet types that are skipped when found in a key or message, instead of failing.
    pub fn is_ignorable(self) -> bool {
        matches!(
            self,
            Tag::Marker | Tag::Trust | Tag::Padding | Tag::Other(60..=63)
        )
    }

    /// Encodes the tag into a new style packet header octet.
    pub fn encode(self) -> u8 {
        0b1100_0000 | u8::from(self)
    }
}

/// The version of the packet format.
///
/// There are two packet formats
/// (see <https://www.rfc-editor.org/rfc/rfc9580.html#name-packet-headers>):
///
/// 1) the (current) OpenPGP packet format specified by this document and its
///    predecessors RFC 4880 and RFC 2440 and
///
/// 2) the Legacy packet format as used by implementations predating any IETF specification of OpenPGP.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum PacketHeaderVersion {
    /// Old Packet Format ("Legacy packet format")
    Old,
    /// New Packet Format ("OpenPGP packet format")
    #[default]
    New,
}

/// Key and signature packet versions.
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum KeyVersion {
    V2 = 2,
    V3 = 3,
    V4 = 4,
    V5 = 5,
    V6 = 6,

    #[num_enum(catch_all)]
    Other(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_encode() {
        assert_eq!(Tag::PublicKey.encode(), 0xC6);
        assert_eq!(Tag::SymEncryptedProtectedData.encode(), 0xD2);
        assert_eq!(Tag::from(18u8), Tag::SymEncryptedProtectedData);
        assert_eq!(Tag::from(61u8), Tag::Other(61));
        assert!(Tag::Marker.is_ignorable());
        assert!(!Tag::LiteralData.is_ignorable());
    }

    #[test]
    fn test_key_version() {
        assert_eq!(KeyVersion::from(4u8), KeyVersion::V4);
        assert_eq!(KeyVersion::from(9u8), KeyVersion::Other(9));
        assert_eq!(u8::from(KeyVersion::V4), 4);
    }
}
