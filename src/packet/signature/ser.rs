use std::io;

use byteorder::{BigEndian, WriteBytesExt};

use crate::errors::Result;
use crate::packet::signature::SignatureVersionSpecific;
use crate::packet::Signature;
use crate::ser::{time_to_u32, Serialize};

impl Serialize for Signature {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.config.version().into())?;

        match &self.config.version_specific {
            SignatureVersionSpecific::V2 { created, issuer }
            | SignatureVersionSpecific::V3 { created, issuer } => {
                writer.write_u8(
                    // always 5
                    0x05,
                )?;
                writer.write_u8(self.config.typ.into())?;
                writer.write_u32::<BigEndian>(time_to_u32(created))?;
                writer.write_all(issuer.as_ref())?;
                writer.write_u8(self.config.pub_alg.into())?;
                writer.write_u8(self.config.hash_alg.into())?;
            }
            SignatureVersionSpecific::V4 => {
                writer.write_u8(self.config.typ.into())?;
                writer.write_u8(self.config.pub_alg.into())?;
                writer.write_u8(self.config.hash_alg.into())?;

                // hashed subpackets
                let hashed_len = self.config.hashed_subpackets.write_len();
                writer.write_u16::<BigEndian>(u16::try_from(hashed_len)?)?;
                self.config.hashed_subpackets.to_writer(writer)?;

                // unhashed subpackets
                let unhashed_len = self.config.unhashed_subpackets.write_len();
                writer.write_u16::<BigEndian>(u16::try_from(unhashed_len)?)?;
                self.config.unhashed_subpackets.to_writer(writer)?;
            }
        }

        // signed hash value
        writer.write_all(&self.signed_hash_value)?;

        // the actual signature
        self.signature.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        let mut sum = 1;
        match &self.config.version_specific {
            SignatureVersionSpecific::V2 { .. } | SignatureVersionSpecific::V3 { .. } => {
                sum += 1 + 1 + 4 + 8 + 1 + 1;
            }
            SignatureVersionSpecific::V4 => {
                sum += 1 + 1 + 1;
                sum += 2 + self.config.hashed_subpackets.write_len();
                sum += 2 + self.config.unhashed_subpackets.write_len();
            }
        }
        sum += 2;
        sum += self.signature.write_len();

        sum
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::hash::HashAlgorithm;
    use crate::crypto::rsa;
    use crate::packet::{PacketTrait, SecretKey, SignatureConfig, SignatureType, UserId};
    use crate::types::{KeyDetails, KeyId, Password, Tag};

    fn key() -> SecretKey {
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let key = rsa::generate_key(&mut rng, 1024).unwrap();
        let created = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        SecretKey::from_rsa(&mut rng, key, created, &Password::empty(), 96).unwrap()
    }

    #[test]
    fn test_sign_roundtrip_verify() {
        let _ = pretty_env_logger::try_init();
        let key = key();
        let data = b"hello world\n";

        for hash in HashAlgorithm::SUPPORTED {
            let config = SignatureConfig::from_key(SignatureType::Binary, &key, hash).unwrap();
            let sig = config.sign(&key, &Password::empty(), &data[..]).unwrap();

            let body = sig.to_bytes().unwrap();
            assert_eq!(body.len(), sig.write_len());
            let parsed = Signature::try_from_buf(*sig.packet_header(), &body[..]).unwrap();
            assert_eq!(parsed, sig);

            parsed.verify(&key.public_key(), &data[..]).unwrap();
            assert!(parsed.verify(&key.public_key(), &b"hello world"[..]).is_err());
            assert_eq!(parsed.issuer(), vec![&key.key_id()]);
            assert_eq!(parsed.issuer_fingerprint(), vec![&key.fingerprint()]);
            assert!(parsed.created().is_some());
        }
    }

    #[test]
    fn test_text_signature() {
        let key = key();
        let config = SignatureConfig::from_key(SignatureType::Text, &key, HashAlgorithm::Sha256).unwrap();
        let sig = config
            .sign(&key, &Password::empty(), &b"line one\nline two\n"[..])
            .unwrap();

        sig.verify(&key, &b"line one\r\nline two\r\n"[..]).unwrap();
    }

    #[test]
    fn test_certification() {
        let key = key();
        let id = UserId::from_str("alice <alice@example.org>");

        let config =
            SignatureConfig::from_key(SignatureType::CertPositive, &key, HashAlgorithm::Sha256)
                .unwrap();
        let sig = config
            .sign_certification(&key, &Password::empty(), Tag::UserId, &id)
            .unwrap();

        sig.verify_certification(&key.public_key(), Tag::UserId, &id)
            .unwrap();

        let other = UserId::from_str("mallory <mallory@example.org>");
        assert!(sig
            .verify_certification(&key.public_key(), Tag::UserId, &other)
            .is_err());
    }

    #[test]
    fn test_v3_roundtrip() {
        let key = key();
        let mut config =
            SignatureConfig::from_key(SignatureType::Binary, &key, HashAlgorithm::Sha1).unwrap();
        config.hashed_subpackets.clear();
        config.unhashed_subpackets.clear();
        config.version_specific = SignatureVersionSpecific::V3 {
            created: DateTime::from_timestamp(1_600_000_000, 0).unwrap(),
            issuer: key.key_id(),
        };

        let sig = config.sign(&key, &Password::empty(), &b"v3"[..]).unwrap();
        let body = sig.to_bytes().unwrap();
        assert_eq!(body[1], 5);

        let parsed = Signature::try_from_buf(*sig.packet_header(), &body[..]).unwrap();
        assert_eq!(parsed.issuer(), vec![&key.key_id()]);
        parsed.verify(&key, &b"v3"[..]).unwrap();
    }

    #[test]
    fn test_wrong_issuer() {
        let key = key();
        let mut config =
            SignatureConfig::from_key(SignatureType::Binary, &key, HashAlgorithm::Sha256).unwrap();
        config.hashed_subpackets.truncate(1);
        config.unhashed_subpackets = vec![crate::packet::Subpacket::regular(
            crate::packet::SubpacketData::Issuer(KeyId::from([1u8; 8])),
        )
        .unwrap()];

        let sig = config.sign(&key, &Password::empty(), &b"data"[..]).unwrap();
        assert!(sig.verify(&key, &b"data"[..]).is_err());
    }
}
