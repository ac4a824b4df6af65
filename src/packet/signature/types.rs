use std::io::Read;

use chrono::{DateTime, Utc};
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::crypto::hash::{HashAlgorithm, WriteHasher};
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::packet::signature::SignatureConfig;
use crate::packet::{PacketHeader, PacketTrait, SubpacketData};
use crate::ser::Serialize;
use crate::types::{CompressionAlgorithm, Fingerprint, KeyId, Mpi, Tag, VerifyingKey};

/// Signature Packet
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-signature-packet-type-id-2>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct Signature {
    pub(super) packet_header: PacketHeader,

    pub config: SignatureConfig,
    #[debug("{}", hex::encode(signed_hash_value))]
    pub signed_hash_value: [u8; 2],
    pub signature: Vec<Mpi>,
}

impl Signature {
    pub fn from_config(
        config: SignatureConfig,
        signed_hash_value: [u8; 2],
        signature: Vec<Mpi>,
    ) -> Result<Self> {
        let mut sig = Signature {
            packet_header: PacketHeader::new_fixed(Tag::Signature, 0),
            config,
            signed_hash_value,
            signature,
        };
        sig.packet_header = PacketHeader::new_fixed(Tag::Signature, sig.write_len());

        Ok(sig)
    }

    /// Returns what kind of signature this is.
    pub fn typ(&self) -> SignatureType {
        self.config.typ()
    }

    /// The used `HashAlgorithm`.
    pub fn hash_alg(&self) -> HashAlgorithm {
        self.config.hash_alg
    }

    /// True when `key` is named by an issuer or issuer fingerprint subpacket of `sig`,
    /// or when `sig` names no issuer at all.
    fn match_identity(sig: &Signature, key: &impl VerifyingKey) -> bool {
        let key_ids = sig.issuer();
        let fingerprints = sig.issuer_fingerprint();
        if key_ids.is_empty() && fingerprints.is_empty() {
            return true;
        }

        let (key_id, fingerprint) = (key.key_id(), key.fingerprint());
        key_ids.into_iter().any(|id| id == &key_id)
            || fingerprints.into_iter().any(|fp| fp == &fingerprint)
    }

    /// Verify this signature over `data`.
    pub fn verify<R>(&self, key: &impl VerifyingKey, data: R) -> Result<()>
    where
        R: Read,
    {
        ensure!(
            Self::match_identity(self, key),
            "verify: No matching issuer or issuer_fingerprint for Key ID: {:?}",
            &key.key_id(),
        );

        let mut hasher = self.config.hash_alg.new_hasher()?;

        self.config.hash_data_to_sign(&mut *hasher, data)?;
        let len = self.config.hash_signature_data(&mut *hasher)?;
        hasher.update(&self.config.trailer(len)?);

        let hash = &hasher.finalize()[..];
        ensure_eq!(
            &self.signed_hash_value,
            &hash[0..2],
            "signature: invalid signed hash value"
        );

        key.verify(self.config.hash_alg, hash, &self.signature)
    }

    /// Verifies a certification signature made by `key` over itself and `id`.
    pub fn verify_certification(
        &self,
        key: &impl VerifyingKey,
        tag: Tag,
        id: &impl Serialize,
    ) -> Result<()> {
        let key_id = key.key_id();
        debug!("verifying certification {:?} {:#?}", key_id, self);

        ensure!(
            Self::match_identity(self, key),
            "verify_certification: No matching issuer or issuer_fingerprint for Key ID: {:?}",
            key_id,
        );
        ensure!(
            self.config.is_certification(),
            "{:?} is not a certification",
            self.typ()
        );

        let mut hasher = self.config.hash_alg.new_hasher()?;
        self.config
            .hash_certification_data(&mut *hasher, key, tag, id)?;

        let len = self.config.hash_signature_data(&mut *hasher)?;
        hasher.update(&self.config.trailer(len)?);

        let hash = &hasher.finalize()[..];
        ensure_eq!(
            &self.signed_hash_value,
            &hash[0..2],
            "certification: invalid signed hash value"
        );

        key.verify(self.config.hash_alg, hash, &self.signature)
    }

    /// Verifies a signature made directly on `key`.
    pub fn verify_key(&self, key: &impl VerifyingKey) -> Result<()> {
        ensure!(
            Self::match_identity(self, key),
            "verify_key: No matching issuer or issuer_fingerprint for Key ID: {:?}",
            &key.key_id(),
        );

        let mut hasher = self.config.hash_alg.new_hasher()?;
        key.serialize_for_hashing(&mut WriteHasher(&mut *hasher))?;

        let len = self.config.hash_signature_data(&mut *hasher)?;
        hasher.update(&self.config.trailer(len)?);

        let hash = &hasher.finalize()[..];
        ensure_eq!(
            &self.signed_hash_value,
            &hash[0..2],
            "key signature: invalid signed hash value"
        );

        key.verify(self.config.hash_alg, hash, &self.signature)
    }

    /// Returns if the signature is a certification or not.
    pub fn is_certification(&self) -> bool {
        self.config.is_certification()
    }

    pub fn created(&self) -> Option<&DateTime<Utc>> {
        self.config.created()
    }

    pub fn issuer(&self) -> Vec<&KeyId> {
        self.config.issuer()
    }

    pub fn issuer_fingerprint(&self) -> Vec<&Fingerprint> {
        self.config
            .subpackets()
            .filter_map(|p| match &p.data {
                SubpacketData::IssuerFingerprint(fp) => Some(fp),
                _ => None,
            })
            .collect()
    }

    pub fn key_expiration_time(&self) -> Option<u32> {
        self.config.hashed_subpackets.iter().find_map(|p| match &p.data {
            SubpacketData::KeyExpirationTime(d) => Some(*d),
            _ => None,
        })
    }

    pub fn preferred_symmetric_algs(&self) -> &[SymmetricKeyAlgorithm] {
        self.config
            .hashed_subpackets
            .iter()
            .find_map(|p| match &p.data {
                SubpacketData::PreferredSymmetricAlgorithms(d) => Some(&d[..]),
                _ => None,
            })
            .unwrap_or(&[][..])
    }

    pub fn preferred_hash_algs(&self) -> &[HashAlgorithm] {
        self.config
            .hashed_subpackets
            .iter()
            .find_map(|p| match &p.data {
                SubpacketData::PreferredHashAlgorithms(d) => Some(&d[..]),
                _ => None,
            })
            .unwrap_or(&[][..])
    }

    pub fn preferred_compression_algs(&self) -> &[CompressionAlgorithm] {
        self.config
            .hashed_subpackets
            .iter()
            .find_map(|p| match &p.data {
                SubpacketData::PreferredCompressionAlgorithms(d) => Some(&d[..]),
                _ => None,
            })
            .unwrap_or(&[][..])
    }

    pub fn key_flags(&self) -> KeyFlags {
        self.config
            .hashed_subpackets
            .iter()
            .find_map(|p| match &p.data {
                SubpacketData::KeyFlags(d) => Some(KeyFlags::from(&d[..])),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn is_primary(&self) -> bool {
        self.config.hashed_subpackets.iter().any(|p| {
            matches!(p.data, SubpacketData::IsPrimary(true))
        })
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SignatureVersion {
    /// Deprecated
    V2 = 2,
    V3 = 3,
    V4 = 4,

    #[num_enum(catch_all)]
    Other(u8),
}

impl Default for SignatureVersion {
    fn default() -> Self {
        Self::V4
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SignatureType {
    /// Signature of a binary document.
    Binary = 0x00,
    /// Signature of a canonical text document, calculated over the text
    /// with its line endings converted to `<CR><LF>`.
    Text = 0x01,
    /// Standalone signature.
    Standalone = 0x02,
    /// Generic certification of a User ID and Public-Key packet.
    CertGeneric = 0x10,
    /// Persona certification of a User ID and Public-Key packet.
    CertPersona = 0x11,
    /// Casual certification of a User ID and Public-Key packet.
    CertCasual = 0x12,
    /// Positive certification of a User ID and Public-Key packet.
    ///
    /// Used for self-signatures on generated keys.
    CertPositive = 0x13,
    /// Subkey Binding Signature
    SubkeyBinding = 0x18,
    /// Primary Key Binding Signature
    KeyBinding = 0x19,
    /// Signature directly on a key
    Key = 0x1F,
    /// Key revocation signature
    KeyRevocation = 0x20,
    /// Subkey revocation signature
    SubkeyRevocation = 0x28,
    /// Certification revocation signature
    CertRevocation = 0x30,
    /// Timestamp signature.
    Timestamp = 0x40,
    /// Third-Party Confirmation signature.
    ThirdParty = 0x50,

    #[num_enum(catch_all)]
    Other(u8),
}

/// The first octet of the key flags subpacket.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
pub struct KeyFlags(u8);

impl KeyFlags {
    const CERTIFY: u8 = 0x01;
    const SIGN: u8 = 0x02;
    const ENCRYPT_COMMS: u8 = 0x04;
    const ENCRYPT_STORAGE: u8 = 0x08;

    pub fn certify(&self) -> bool {
        self.0 & Self::CERTIFY != 0
    }

    pub fn sign(&self) -> bool {
        self.0 & Self::SIGN != 0
    }

    pub fn encrypt_comms(&self) -> bool {
        self.0 & Self::ENCRYPT_COMMS != 0
    }

    pub fn encrypt_storage(&self) -> bool {
        self.0 & Self::ENCRYPT_STORAGE != 0
    }

    pub fn set_certify(&mut self, val: bool) {
        self.set(Self::CERTIFY, val);
    }

    pub fn set_sign(&mut self, val: bool) {
        self.set(Self::SIGN, val);
    }

    pub fn set_encrypt_comms(&mut self, val: bool) {
        self.set(Self::ENCRYPT_COMMS, val);
    }

    pub fn set_encrypt_storage(&mut self, val: bool) {
        self.set(Self::ENCRYPT_STORAGE, val);
    }

    fn set(&mut self, bit: u8, val: bool) {
        if val {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

impl<'a> From<&'a [u8]> for KeyFlags {
    fn from(other: &'a [u8]) -> Self {
        if other.is_empty() {
            Default::default()
        } else {
            KeyFlags(other[0])
        }
    }
}

impl From<KeyFlags> for bytes::Bytes {
    fn from(flags: KeyFlags) -> Self {
        bytes::Bytes::copy_from_slice(&[flags.0])
    }
}

impl PacketTrait for Signature {
    fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyflags() {
        let flags: KeyFlags = Default::default();
        assert_eq!(bytes::Bytes::from(flags), vec![0x00]);

        let mut flags = KeyFlags::default();
        flags.set_certify(true);
        assert!(flags.certify());
        assert_eq!(bytes::Bytes::from(flags), vec![0x01]);

        let mut flags = KeyFlags::default();
        flags.set_sign(true);
        flags.set_encrypt_comms(true);
        flags.set_encrypt_storage(true);
        assert_eq!(bytes::Bytes::from(flags), vec![0x0E]);

        flags.set_sign(false);
        assert!(!flags.sign());
        assert_eq!(KeyFlags::from(&[0x0Cu8][..]), flags);
    }

    #[test]
    fn test_signature_type() {
        assert_eq!(SignatureType::from(0x13), SignatureType::CertPositive);
        assert_eq!(u8::from(SignatureType::Text), 1);
        assert_eq!(SignatureType::from(0x99), SignatureType::Other(0x99));
    }
}
