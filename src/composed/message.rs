use std::io;
use std::iter::Peekable;

use bytes::Bytes;
use log::{debug, warn};
use rand::{CryptoRng, Rng};

use crate::armor::{self, BlockType};
use crate::composed::{next_packet, ArmorOptions, Deserializable};
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::packet::{
    CompressedData, LiteralData, OnePassSignature, Packet, PacketTrait,
    PublicKeyEncryptedSessionKey, Signature, SignatureConfig, SignatureType,
    SymEncryptedProtectedData,
};
use crate::ser::Serialize;
use crate::types::{
    CompressionAlgorithm, DecryptionKey, EncryptionKey, KeyId, Password, SigningKey, Tag,
    VerifyingKey,
};

/// An [OpenPGP message](https://www.rfc-editor.org/rfc/rfc9580.html#name-openpgp-messages)
///
/// Encrypted messages carry one session key packet per recipient, followed by the
/// integrity protected data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Literal(LiteralData),
    Compressed(CompressedData),
    Signed {
        /// nested message
        message: Option<Box<Message>>,
        /// for signature packets that contain a one pass message
        one_pass_signature: Option<OnePassSignature>,
        // actual signature
        signature: Signature,
    },
    Encrypted {
        esk: Vec<PublicKeyEncryptedSessionKey>,
        edata: SymEncryptedProtectedData,
    },
}

/// The outcome of checking a message for a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// A signature was present.
    pub signed: bool,
    /// The signature validated against the supplied key.
    pub verified: bool,
    /// The issuer recorded in the signature, if any.
    pub signer_key_id: Option<KeyId>,
}

impl VerificationResult {
    pub fn unsigned() -> Self {
        VerificationResult {
            signed: false,
            verified: false,
            signer_key_id: None,
        }
    }
}

impl Message {
    /// A binary literal data message.
    pub fn new_literal_bytes(file_name: &str, data: &[u8]) -> Result<Self> {
        let packet = LiteralData::from_bytes(file_name.as_bytes(), Bytes::copy_from_slice(data))?;
        Ok(Message::Literal(packet))
    }

    /// Compresses the message.
    pub fn compress(&self, alg: CompressionAlgorithm) -> Result<Self> {
        let data = self.to_bytes()?;

        Ok(Message::Compressed(CompressedData::compress(alg, &data)?))
    }

    /// Decompresses the message, if it is compressed. Nested compression is unpacked too.
    pub fn decompress(self) -> Result<Self> {
        match self {
            Message::Compressed(data) => {
                let raw = data.decompress_to_vec()?;
                Message::from_bytes(raw)?.decompress()
            }
            _ => Ok(self),
        }
    }

    /// Signs the literal content of this message, wrapping it in a one pass signed message.
    pub fn sign(
        self,
        key: &impl SigningKey,
        key_pw: &Password,
        hash_algorithm: HashAlgorithm,
    ) -> Result<Self> {
        let literal = self
            .get_literal()
            .ok_or_else(|| format_err!("only literal data can be signed"))?;
        let typ = if literal.is_binary() {
            SignatureType::Binary
        } else {
            SignatureType::Text
        };

        let config = SignatureConfig::from_key(typ, key, hash_algorithm)?;
        let signature = config.sign(key, key_pw, literal.data())?;
        let one_pass_signature = OnePassSignature::for_signature(&signature)?;
        debug!("signed message with {:?}", signature.issuer());

        Ok(Message::Signed {
            message: Some(Box::new(self)),
            one_pass_signature: Some(one_pass_signature),
            signature,
        })
    }

    /// Encrypts the message to the given keys, with a fresh session key for `alg`.
    ///
    /// Session key packets are written in the order of `pkeys`.
    pub fn encrypt_to_keys<R: CryptoRng + Rng>(
        &self,
        mut rng: R,
        alg: SymmetricKeyAlgorithm,
        pkeys: &[&impl EncryptionKey],
    ) -> Result<Self> {
        ensure!(!pkeys.is_empty(), "no recipients given");
        ensure!(alg.is_supported(), "{:?} can not be used for encryption", alg);

        let session_key = alg.new_session_key(&mut rng);

        let esk = pkeys
            .iter()
            .map(|pkey| {
                PublicKeyEncryptedSessionKey::from_session_key(&mut rng, &session_key, alg, pkey)
            })
            .collect::<Result<Vec<_>>>()?;

        let data = self.to_bytes()?;
        let edata = SymEncryptedProtectedData::encrypt_with_rng(&mut rng, alg, &session_key, &data)?;
        debug!("encrypted message to {} recipients", esk.len());

        Ok(Message::Encrypted { esk, edata })
    }

    /// Decrypts the message with `key`, returning the inner message.
    ///
    /// The first session key packet addressed to `key`, or to the wildcard id, is used.
    pub fn decrypt(&self, key: &impl DecryptionKey, key_pw: &Password) -> Result<Self> {
        let Message::Encrypted { esk, edata } = self else {
            bail!("message is not encrypted");
        };

        let key_id = key.key_id();
        let mut last_err = None;
        for packet in esk.iter().filter(|esk| esk.matches(&key_id)) {
            debug!("trying session key packet for {:?}", packet.id());
            match packet.decrypt(key, key_pw) {
                Ok((alg, session_key)) => {
                    let data = edata.decrypt(alg, &session_key)?;
                    return Message::from_bytes(data.to_vec());
                }
                // a wrong passphrase will not get better with another packet
                Err(Error::Passphrase) => return Err(Error::Passphrase),
                Err(err) if packet.id().is_wildcard() => last_err = Some(err),
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or(Error::KeyMismatch { key_id }))
    }

    /// Returns the underlying literal data, if any. Compressed data has to be decompressed first.
    pub fn get_literal(&self) -> Option<&LiteralData> {
        match self {
            Message::Literal(literal) => Some(literal),
            Message::Signed { message, .. } => message.as_ref().and_then(|m| m.get_literal()),
            _ => None,
        }
    }

    /// Returns the content of the literal data, decompressing if needed.
    pub fn get_content(&self) -> Result<Option<Vec<u8>>> {
        match self {
            Message::Compressed(_) => self.clone().decompress()?.get_content(),
            Message::Signed {
                message: Some(message),
                ..
            } => message.get_content(),
            _ => Ok(self.get_literal().map(|l| l.data().to_vec())),
        }
    }

    /// The outermost signature, if the message is signed.
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Message::Signed { signature, .. } => Some(signature),
            _ => None,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Message::Signed { .. })
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Message::Encrypted { .. })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Message::Literal(_))
    }

    /// Verifies the outermost signature against the signed literal content.
    pub fn verify(&self, key: &impl VerifyingKey) -> Result<()> {
        match self {
            Message::Signed {
                message, signature, ..
            } => {
                let literal = message
                    .as_ref()
                    .and_then(|m| m.get_literal())
                    .ok_or_else(|| format_err!("signed message has no literal data"))?;
                signature.verify(key, literal.data())
            }
            Message::Compressed(_) => self.clone().decompress()?.verify(key),
            Message::Literal(_) => Err(Error::NotSigned),
            Message::Encrypted { .. } => bail!("message must be decrypted before verifying"),
        }
    }

    /// Checks the message for a signature by `key`, without failing on a bad signature.
    ///
    /// The signature of an encrypted message is out of reach, so it counts as
    /// verified when one of its session keys is addressed to `key`.
    pub fn verification(&self, key: &impl VerifyingKey) -> Result<VerificationResult> {
        if let Message::Encrypted { esk, .. } = self {
            let key_id = key.key_id();
            let verified = esk.iter().any(|packet| packet.id() == &key_id);
            return Ok(VerificationResult {
                signed: true,
                verified,
                signer_key_id: verified.then_some(key_id),
            });
        }

        let message = self.clone().decompress()?;
        let Some(signature) = message.signature() else {
            return Ok(VerificationResult::unsigned());
        };

        let signer_key_id = signature
            .issuer()
            .first()
            .map(|id| **id)
            .or_else(|| signature.issuer_fingerprint().first().map(|fp| fp.key_id()));

        let verified = match message.verify(key) {
            Ok(()) => true,
            Err(err) => {
                debug!("signature did not verify: {:?}", err);
                false
            }
        };

        Ok(VerificationResult {
            signed: true,
            verified,
            signer_key_id,
        })
    }

    pub fn to_armored_writer(
        &self,
        writer: &mut impl io::Write,
        opts: ArmorOptions<'_>,
    ) -> Result<()> {
        armor::write(
            self,
            BlockType::Message,
            writer,
            opts.headers,
            opts.include_checksum,
        )
    }

    pub fn to_armored_bytes(&self, opts: ArmorOptions<'_>) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_armored_writer(&mut buf, opts)?;

        Ok(buf)
    }

    pub fn to_armored_string(&self, opts: ArmorOptions<'_>) -> Result<String> {
        let res = String::from_utf8(self.to_armored_bytes(opts)?).map_err(|e| e.utf8_error())?;
        Ok(res)
    }

    /// Reads a single message from the packet stream.
    fn from_packet_stream<I: Iterator<Item = Result<Packet>>>(
        packets: &mut Peekable<I>,
    ) -> Result<Self> {
        loop {
            match next_packet(packets)? {
                Packet::LiteralData(literal) => return Ok(Message::Literal(literal)),
                Packet::CompressedData(data) => return Ok(Message::Compressed(data)),
                Packet::OnePassSignature(one_pass_signature) => {
                    let message = Message::from_packet_stream(packets)?;
                    let signature = match next_packet(packets)? {
                        Packet::Signature(sig) => sig,
                        packet => bail!(
                            "expected signature after one pass signed data, found {:?}",
                            packet.tag()
                        ),
                    };
                    return Ok(Message::Signed {
                        message: Some(Box::new(message)),
                        one_pass_signature: Some(one_pass_signature),
                        signature,
                    });
                }
                Packet::Signature(signature) => {
                    let message = Message::from_packet_stream(packets)?;
                    return Ok(Message::Signed {
                        message: Some(Box::new(message)),
                        one_pass_signature: None,
                        signature,
                    });
                }
                Packet::PublicKeyEncryptedSessionKey(first) => {
                    let mut esk = vec![first];
                    loop {
                        match next_packet(packets)? {
                            Packet::PublicKeyEncryptedSessionKey(p) => esk.push(p),
                            Packet::SymEncryptedProtectedData(edata) => {
                                return Ok(Message::Encrypted { esk, edata });
                            }
                            Packet::Other(other)
                                if other.tag() == Tag::SymKeyEncryptedSessionKey
                                    || other.tag().is_ignorable() =>
                            {
                                warn!("ignoring {:?} packet in encrypted message", other.tag());
                            }
                            packet => bail!(
                                "expected encrypted data after session keys, found {:?}",
                                packet.tag()
                            ),
                        }
                    }
                }
                Packet::SymEncryptedProtectedData(_) => {
                    bail!("encrypted data without session key packets")
                }
                Packet::Other(other) if other.tag().is_ignorable() => {
                    warn!("ignoring {:?} packet in message", other.tag());
                }
                Packet::Other(other) if other.tag() == Tag::SymEncryptedData => {
                    unsupported_err!("encrypted data without integrity protection")
                }
                packet => bail!("unexpected packet {:?} in message", packet.tag()),
            }
        }
    }
}

impl Deserializable for Message {
    fn from_packets<I: Iterator<Item = Result<Packet>>>(mut packets: Peekable<I>) -> Result<Self> {
        let message = Message::from_packet_stream(&mut packets)?;

        for packet in packets {
            match packet? {
                Packet::Other(other) if other.tag().is_ignorable() => {
                    warn!("ignoring trailing {:?} packet", other.tag());
                }
                packet => bail!("unexpected trailing packet {:?} after message", packet.tag()),
            }
        }

        Ok(message)
    }

    fn matches_block_type(typ: BlockType) -> bool {
        matches!(
            typ,
            BlockType::Message | BlockType::MultiPartMessage(_, _) | BlockType::File
        )
    }
}

impl Serialize for Message {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Message::Literal(l) => l.to_writer_with_header(writer),
            Message::Compressed(c) => c.to_writer_with_header(writer),
            Message::Signed {
                message,
                one_pass_signature,
                signature,
            } => {
                if let Some(ops) = one_pass_signature {
                    ops.to_writer_with_header(writer)?;
                } else {
                    signature.to_writer_with_header(writer)?;
                }
                if let Some(message) = message {
                    message.to_writer(writer)?;
                }
                if one_pass_signature.is_some() {
                    signature.to_writer_with_header(writer)?;
                }

                Ok(())
            }
            Message::Encrypted { esk, edata } => {
                for e in esk {
                    e.to_writer_with_header(writer)?;
                }
                edata.to_writer_with_header(writer)
            }
        }
    }

    fn write_len(&self) -> usize {
        match self {
            Message::Literal(l) => l.write_len_with_header(),
            Message::Compressed(c) => c.write_len_with_header(),
            Message::Signed {
                message,
                one_pass_signature,
                signature,
            } => {
                let mut sum = signature.write_len_with_header();
                if let Some(ops) = one_pass_signature {
                    sum += ops.write_len_with_header();
                }
                if let Some(message) = message {
                    sum += message.write_len();
                }
                sum
            }
            Message::Encrypted { esk, edata } => {
                esk.iter().map(|e| e.write_len_with_header()).sum::<usize>()
                    + edata.write_len_with_header()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::{SecretKeyParamsBuilder, SignedPublicKey, SignedSecretKey};
    use crate::types::KeyDetails;

    fn key(seed: u64, passphrase: &str) -> SignedSecretKey {
        let _ = pretty_env_logger::try_init();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        SecretKeyParamsBuilder::default()
            .key_bits(1024)
            .primary_user_id(format!("key {seed}"))
            .passphrase(passphrase.to_string())
            .s2k_count(96)
            .created_at(DateTime::from_timestamp(1_600_000_000, 0).unwrap())
            .build()
            .unwrap()
            .generate(&mut rng)
            .unwrap()
    }

    #[test]
    fn test_literal_roundtrip() {
        let msg = Message::new_literal_bytes("hello.txt", b"hello world").unwrap();
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(bytes.len(), msg.write_len());

        let parsed = Message::from_bytes(bytes).unwrap();
        assert_eq!(parsed, msg);
        assert_eq!(parsed.get_content().unwrap().unwrap(), b"hello world");
        assert_eq!(parsed.get_literal().unwrap().file_name(), b"hello.txt");
    }

    #[test]
    fn test_compressed_roundtrip() {
        let msg = Message::new_literal_bytes("", &[b'a'; 4096]).unwrap();
        for alg in [
            CompressionAlgorithm::Uncompressed,
            CompressionAlgorithm::ZIP,
            CompressionAlgorithm::ZLIB,
        ] {
            let compressed = msg.compress(alg).unwrap();
            let armored = compressed.to_armored_string(ArmorOptions::default()).unwrap();
            let (parsed, _) = Message::from_string(&armored).unwrap();

            assert_eq!(parsed.get_content().unwrap().unwrap(), vec![b'a'; 4096]);
            assert_eq!(parsed.decompress().unwrap(), msg);
        }
    }

    #[test]
    fn test_sign_verify() {
        let signer = key(1, "");
        let other = key(2, "");

        let msg = Message::new_literal_bytes("", b"signed content").unwrap();
        let signed = msg
            .sign(&signer, &Password::empty(), HashAlgorithm::Sha256)
            .unwrap();

        let parsed = Message::from_bytes(signed.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, signed);
        parsed.verify(&signer.public_key()).unwrap();
        assert!(parsed.verify(&other.public_key()).is_err());

        let result = parsed.verification(&signer.public_key()).unwrap();
        assert_eq!(
            result,
            VerificationResult {
                signed: true,
                verified: true,
                signer_key_id: Some(signer.key_id()),
            }
        );

        let result = parsed.verification(&other.public_key()).unwrap();
        assert!(result.signed);
        assert!(!result.verified);
    }

    #[test]
    fn test_unsigned_verification() {
        let signer = key(1, "");
        let msg = Message::new_literal_bytes("", b"not signed").unwrap();

        assert!(matches!(
            msg.verify(&signer).unwrap_err(),
            Error::NotSigned
        ));
        assert_eq!(
            msg.verification(&signer).unwrap(),
            VerificationResult::unsigned()
        );
    }

    #[test]
    fn test_encrypt_decrypt() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let alice = key(1, "alice");
        let bob = key(2, "bob");
        let eve = key(3, "eve");

        let msg = Message::new_literal_bytes("", b"for alice and bob").unwrap();
        let encrypted = msg
            .encrypt_to_keys(
                &mut rng,
                SymmetricKeyAlgorithm::AES256,
                &[&alice.public_key(), &bob.public_key()],
            )
            .unwrap();

        let parsed = Message::from_bytes(encrypted.to_bytes().unwrap()).unwrap();
        let Message::Encrypted { esk, .. } = &parsed else {
            panic!("expected encrypted message");
        };
        assert_eq!(esk[0].id(), &alice.key_id());
        assert_eq!(esk[1].id(), &bob.key_id());

        for (key, pw) in [(&alice, "alice"), (&bob, "bob")] {
            let decrypted = parsed.decrypt(key, &pw.into()).unwrap();
            assert_eq!(decrypted, msg);
        }

        assert!(matches!(
            parsed.decrypt(&alice, &"wrong".into()).unwrap_err(),
            Error::Passphrase
        ));
        assert!(matches!(
            parsed.decrypt(&eve, &"eve".into()).unwrap_err(),
            Error::KeyMismatch { .. }
        ));
    }

    #[test]
    fn test_encrypted_verification() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let alice = key(1, "");
        let eve = key(3, "");

        let msg = Message::new_literal_bytes("", b"sealed").unwrap();
        let encrypted = msg
            .encrypt_to_keys(&mut rng, SymmetricKeyAlgorithm::AES128, &[&alice.public_key()])
            .unwrap();

        assert_eq!(
            encrypted.verification(&alice.public_key()).unwrap(),
            VerificationResult {
                signed: true,
                verified: true,
                signer_key_id: Some(alice.key_id()),
            }
        );
        let result = encrypted.verification(&eve.public_key()).unwrap();
        assert!(!result.verified);
        assert_eq!(result.signer_key_id, None);

        // the strict check still needs the plaintext
        assert!(encrypted.verify(&alice.public_key()).is_err());
    }

    #[test]
    fn test_no_recipients() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let msg = Message::new_literal_bytes("", b"x").unwrap();
        let keys: [&SignedPublicKey; 0] = [];
        assert!(msg
            .encrypt_to_keys(&mut rng, SymmetricKeyAlgorithm::AES128, &keys)
            .is_err());
    }

    #[test]
    fn test_trailing_packets() {
        let msg = Message::new_literal_bytes("", b"one").unwrap();
        let mut bytes = msg.to_bytes().unwrap();
        bytes.extend(msg.to_bytes().unwrap());

        assert!(Message::from_bytes(bytes).is_err());
    }
}
