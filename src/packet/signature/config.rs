use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, Utc};
use digest::DynDigest;
use log::debug;

use crate::crypto::hash::{HashAlgorithm, WriteHasher};
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::Result;
use crate::packet::{Signature, SignatureType, SignatureVersion, Subpacket, SubpacketData};
use crate::ser::{time_to_u32, Serialize};
use crate::types::{KeyDetails, KeyId, Password, SigningKey, Tag};
use crate::util::normalize_line_endings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureConfig {
    pub typ: SignatureType,
    pub pub_alg: PublicKeyAlgorithm,
    pub hash_alg: HashAlgorithm,

    pub unhashed_subpackets: Vec<Subpacket>,
    pub hashed_subpackets: Vec<Subpacket>,

    pub version_specific: SignatureVersionSpecific,
}

/// Fields that only exist in some signature versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureVersionSpecific {
    V2 {
        created: DateTime<Utc>,
        issuer: KeyId,
    },
    V3 {
        created: DateTime<Utc>,
        issuer: KeyId,
    },
    V4,
}

impl SignatureConfig {
    /// Constructor for a v4 SignatureConfig.
    pub fn v4(typ: SignatureType, pub_alg: PublicKeyAlgorithm, hash_alg: HashAlgorithm) -> Self {
        SignatureConfig {
            typ,
            pub_alg,
            hash_alg,
            hashed_subpackets: Vec::new(),
            unhashed_subpackets: Vec::new(),
            version_specific: SignatureVersionSpecific::V4,
        }
    }

    /// A v4 config for `key`, carrying the creation time and issuer fingerprint in the
    /// hashed area and the issuer key id in the unhashed area.
    pub fn from_key(typ: SignatureType, key: &impl KeyDetails, hash_alg: HashAlgorithm) -> Result<Self> {
        let mut config = Self::v4(typ, key.algorithm(), hash_alg);
        config.hashed_subpackets = vec![
            Subpacket::regular(SubpacketData::created_now())?,
            Subpacket::regular(SubpacketData::IssuerFingerprint(key.fingerprint()))?,
        ];
        config.unhashed_subpackets = vec![Subpacket::regular(SubpacketData::Issuer(key.key_id()))?];

        Ok(config)
    }

    pub fn version(&self) -> SignatureVersion {
        match self.version_specific {
            SignatureVersionSpecific::V2 { .. } => SignatureVersion::V2,
            SignatureVersionSpecific::V3 { .. } => SignatureVersion::V3,
            SignatureVersionSpecific::V4 => SignatureVersion::V4,
        }
    }

    /// Sign the given data.
    pub fn sign<R>(self, key: &impl SigningKey, key_pw: &Password, data: R) -> Result<Signature>
    where
        R: Read,
    {
        let mut hasher = self.hash_alg.new_hasher()?;

        self.hash_data_to_sign(&mut *hasher, data)?;
        let len = self.hash_signature_data(&mut *hasher)?;
        hasher.update(&self.trailer(len)?);

        let hash = &hasher.finalize()[..];

        let signed_hash_value = [hash[0], hash[1]];
        let signature = key.sign(key_pw, self.hash_alg, hash)?;

        Signature::from_config(self, signed_hash_value, signature)
    }

    /// Create a certification signature over `key` and the user id `id`.
    pub fn sign_certification(
        self,
        key: &impl SigningKey,
        key_pw: &Password,
        tag: Tag,
        id: &impl Serialize,
    ) -> Result<Signature> {
        ensure!(
            self.is_certification(),
            "can not sign non certification as certification"
        );
        debug!("signing certification {:?}", self.typ);

        let mut hasher = self.hash_alg.new_hasher()?;
        self.hash_certification_data(&mut *hasher, key, tag, id)?;

        let len = self.hash_signature_data(&mut *hasher)?;
        hasher.update(&self.trailer(len)?);

        let hash = &hasher.finalize()[..];

        let signed_hash_value = [hash[0], hash[1]];
        let signature = key.sign(key_pw, self.hash_alg, hash)?;

        Signature::from_config(self, signed_hash_value, signature)
    }

    /// Returns what kind of signature this is.
    pub fn typ(&self) -> SignatureType {
        self.typ
    }

    /// Hashes the key and the id it is bound to, with the v4 id prefix.
    pub(crate) fn hash_certification_data(
        &self,
        hasher: &mut dyn DynDigest,
        key: &impl KeyDetails,
        tag: Tag,
        id: &impl Serialize,
    ) -> Result<()> {
        key.serialize_for_hashing(&mut WriteHasher(&mut *hasher))?;

        let packet_buf = id.to_bytes()?;

        match self.version_specific {
            SignatureVersionSpecific::V2 { .. } | SignatureVersionSpecific::V3 { .. } => {
                // Nothing to do
            }
            SignatureVersionSpecific::V4 => {
                let prefix = match tag {
                    Tag::UserId => 0xB4,
                    Tag::UserAttribute => 0xD1,
                    _ => bail!("invalid tag for certification validation: {:?}", tag),
                };

                let mut prefix_buf = [prefix, 0u8, 0u8, 0u8, 0u8];
                BigEndian::write_u32(&mut prefix_buf[1..], u32::try_from(packet_buf.len())?);

                // prefixes
                hasher.update(&prefix_buf);
            }
        }

        // the packet content
        hasher.update(&packet_buf);

        Ok(())
    }

    /// Calculate the serialized version of this packet, but only the part relevant for hashing.
    pub fn hash_signature_data(&self, hasher: &mut dyn DynDigest) -> Result<usize> {
        match &self.version_specific {
            SignatureVersionSpecific::V2 { created, .. }
            | SignatureVersionSpecific::V3 { created, .. } => {
                let mut buf = [0u8; 5];
                buf[0] = self.typ.into();
                BigEndian::write_u32(&mut buf[1..], time_to_u32(created));

                hasher.update(&buf);

                // no trailer
                Ok(0)
            }
            SignatureVersionSpecific::V4 => {
                let mut res = vec![
                    // version
                    self.version().into(),
                    // type
                    self.typ.into(),
                    // public algorithm
                    self.pub_alg.into(),
                    // hash algorithm
                    self.hash_alg.into(),
                    // will be filled with the length
                    0u8,
                    0u8,
                ];

                // hashed subpackets
                let mut hashed_subpackets = Vec::new();
                for packet in &self.hashed_subpackets {
                    packet.to_writer(&mut hashed_subpackets)?;
                }

                BigEndian::write_u16(&mut res[4..6], u16::try_from(hashed_subpackets.len())?);
                res.extend(hashed_subpackets);

                hasher.update(&res);

                Ok(res.len())
            }
        }
    }

    /// Hashes the signed document. Text signatures hash the data with `CR LF` line endings.
    pub fn hash_data_to_sign<R>(&self, hasher: &mut dyn DynDigest, mut data: R) -> Result<usize>
    where
        R: Read,
    {
        match self.typ {
            SignatureType::Text => {
                let mut raw = Vec::new();
                data.read_to_end(&mut raw)?;
                let normalized = normalize_line_endings(&raw);
                hasher.update(&normalized);
                Ok(normalized.len())
            }
            SignatureType::Binary => {
                let len = io::copy(&mut data, &mut WriteHasher(&mut *hasher))?;
                Ok(usize::try_from(len)?)
            }
            _ => unimplemented_err!("hashing data for {:?}", self.typ),
        }
    }

    pub fn trailer(&self, len: usize) -> Result<Vec<u8>> {
        match self.version_specific {
            SignatureVersionSpecific::V2 { .. } | SignatureVersionSpecific::V3 { .. } => {
                // Nothing to do
                Ok(Vec::new())
            }
            SignatureVersionSpecific::V4 => {
                let mut trailer = vec![0x04, 0xFF, 0, 0, 0, 0];
                BigEndian::write_u32(&mut trailer[2..], u32::try_from(len)?);
                Ok(trailer)
            }
        }
    }

    /// Returns an iterator over all subpackets of this signature.
    pub fn subpackets(&self) -> impl Iterator<Item = &Subpacket> {
        self.hashed_subpackets
            .iter()
            .chain(self.unhashed_subpackets.iter())
    }

    /// Returns if the signature is a certification or not.
    pub fn is_certification(&self) -> bool {
        matches!(
            self.typ,
            SignatureType::CertGeneric
                | SignatureType::CertPersona
                | SignatureType::CertCasual
                | SignatureType::CertPositive
                | SignatureType::CertRevocation
        )
    }

    /// The creation time. For v4 signatures only the hashed area is trusted.
    pub fn created(&self) -> Option<&DateTime<Utc>> {
        match &self.version_specific {
            SignatureVersionSpecific::V2 { created, .. }
            | SignatureVersionSpecific::V3 { created, .. } => Some(created),
            SignatureVersionSpecific::V4 => {
                self.hashed_subpackets.iter().find_map(|p| match &p.data {
                    SubpacketData::SignatureCreationTime(d) => Some(d),
                    _ => None,
                })
            }
        }
    }

    pub fn issuer(&self) -> Vec<&KeyId> {
        match &self.version_specific {
            SignatureVersionSpecific::V2 { issuer, .. }
            | SignatureVersionSpecific::V3 { issuer, .. } => vec![issuer],
            SignatureVersionSpecific::V4 => self
                .subpackets()
                .filter_map(|p| match &p.data {
                    SubpacketData::Issuer(id) => Some(id),
                    _ => None,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v4_trailer() {
        let config = SignatureConfig::v4(
            SignatureType::Binary,
            PublicKeyAlgorithm::RSA,
            HashAlgorithm::Sha256,
        );
        assert_eq!(config.trailer(6).unwrap(), vec![0x04, 0xFF, 0, 0, 0, 6]);
    }

    #[test]
    fn test_hash_signature_data_v4() {
        let config = SignatureConfig::v4(
            SignatureType::Text,
            PublicKeyAlgorithm::RSA,
            HashAlgorithm::Sha256,
        );
        let mut hasher = HashAlgorithm::Sha256.new_hasher().unwrap();
        let len = config.hash_signature_data(&mut *hasher).unwrap();
        assert_eq!(len, 6);

        let expected = HashAlgorithm::Sha256.digest(&[4, 1, 1, 8, 0, 0]).unwrap();
        assert_eq!(&hasher.finalize()[..], &expected[..]);
    }

    #[test]
    fn test_text_is_normalized() {
        let config = SignatureConfig::v4(
            SignatureType::Text,
            PublicKeyAlgorithm::RSA,
            HashAlgorithm::Sha1,
        );
        let mut a = HashAlgorithm::Sha1.new_hasher().unwrap();
        let mut b = HashAlgorithm::Sha1.new_hasher().unwrap();
        config.hash_data_to_sign(&mut *a, &b"a\nb"[..]).unwrap();
        config.hash_data_to_sign(&mut *b, &b"a\r\nb"[..]).unwrap();
        assert_eq!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_v3_has_no_trailer() {
        let mut config = SignatureConfig::v4(
            SignatureType::Binary,
            PublicKeyAlgorithm::RSA,
            HashAlgorithm::Sha1,
        );
        config.version_specific = SignatureVersionSpecific::V3 {
            created: DateTime::from_timestamp(1, 0).unwrap(),
            issuer: KeyId::WILDCARD,
        };
        assert_eq!(config.version(), SignatureVersion::V3);
        assert!(config.trailer(5).unwrap().is_empty());
        assert!(config.created().is_some());
        assert_eq!(config.issuer(), vec![&KeyId::WILDCARD]);
    }
}
