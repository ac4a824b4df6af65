use num_enum::{FromPrimitive, IntoPrimitive};

/// Available public key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-public-key-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PublicKeyAlgorithm {
    /// RSA (Encrypt and Sign)
    RSA = 1,
    /// DEPRECATED: RSA (Encrypt-Only)
    RSAEncrypt = 2,
    /// DEPRECATED: RSA (Sign-Only)
    RSASign = 3,
    /// Elgamal (Encrypt-Only)
    ElgamalEncrypt = 16,
    /// DSA (Digital Signature Algorithm)
    DSA = 17,
    /// Elliptic Curve: RFC 6637
    ECDH = 18,
    /// ECDSA: RFC 6637
    ECDSA = 19,
    /// DEPRECATED: Elgamal (Encrypt and Sign)
    Elgamal = 20,
    /// Reserved for Diffie-Hellman (X9.42, as defined for IETF-S/MIME)
    DiffieHellman = 21,
    /// EdDSA legacy format
    EdDSALegacy = 22,
    X25519 = 25,
    X448 = 26,
    Ed25519 = 27,
    Ed448 = 28,

    #[num_enum(catch_all)]
    Unknown(u8),
}

impl PublicKeyAlgorithm {
    /// Is this one of the RSA variants?
    pub fn is_rsa(self) -> bool {
        matches!(
            self,
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt | PublicKeyAlgorithm::RSASign
        )
    }

    pub fn can_sign(self) -> bool {
        matches!(self, PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSASign)
    }

    pub fn can_encrypt(self) -> bool {
        matches!(
            self,
            PublicKeyAlgorithm::RSA | PublicKeyAlgorithm::RSAEncrypt
        )
    }
}
