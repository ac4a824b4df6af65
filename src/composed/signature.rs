use std::io::{self, Read};
use std::iter::Peekable;

use log::warn;

use crate::armor::{self, BlockType};
use crate::composed::{next_packet, ArmorOptions, Deserializable};
use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;
use crate::packet::{Packet, PacketTrait, Signature, SignatureConfig, SignatureType};
use crate::ser::Serialize;
use crate::types::{Password, SigningKey, VerifyingKey};

/// An OpenPGP data signature that occurs outside an OpenPGP Message,
/// as a detached signature:
///
/// <https://www.rfc-editor.org/rfc/rfc9580.html#detached-signatures>.
///
/// All [DetachedSignature]s are either of type [SignatureType::Binary] or [SignatureType::Text].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    pub signature: Signature,
}

impl DetachedSignature {
    pub fn new(signature: Signature) -> Self {
        DetachedSignature { signature }
    }

    /// Create a detached data signature over `data`, with [SignatureType::Binary].
    pub fn sign_binary_data<R: Read>(
        key: &impl SigningKey,
        key_pw: &Password,
        hash_algorithm: HashAlgorithm,
        data: R,
    ) -> Result<DetachedSignature> {
        Self::sign_data(SignatureType::Binary, key, key_pw, hash_algorithm, data)
    }

    /// Create a detached data signature over `data`, with [SignatureType::Text].
    ///
    /// Text signatures are stable against changes of line endings.
    pub fn sign_text_data<R: Read>(
        key: &impl SigningKey,
        key_pw: &Password,
        hash_algorithm: HashAlgorithm,
        data: R,
    ) -> Result<DetachedSignature> {
        Self::sign_data(SignatureType::Text, key, key_pw, hash_algorithm, data)
    }

    fn sign_data<R: Read>(
        typ: SignatureType,
        key: &impl SigningKey,
        key_pw: &Password,
        hash_algorithm: HashAlgorithm,
        data: R,
    ) -> Result<DetachedSignature> {
        let config = SignatureConfig::from_key(typ, key, hash_algorithm)?;
        let sig = config.sign(key, key_pw, data)?;

        Ok(DetachedSignature::new(sig))
    }

    pub fn to_armored_writer(
        &self,
        writer: &mut impl io::Write,
        opts: ArmorOptions<'_>,
    ) -> Result<()> {
        armor::write(
            self,
            BlockType::Signature,
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

    /// Verify this signature.
    pub fn verify(&self, key: &impl VerifyingKey, content: &[u8]) -> Result<()> {
        self.signature.verify(key, content)
    }
}

impl Serialize for DetachedSignature {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.signature.to_writer_with_header(writer)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.signature.write_len_with_header()
    }
}

impl Deserializable for DetachedSignature {
    /// Parse a signature.
    fn from_packets<I: Iterator<Item = Result<Packet>>>(mut packets: Peekable<I>) -> Result<Self> {
        let signature = loop {
            match next_packet(&mut packets)? {
                Packet::Signature(sig) => break sig,
                Packet::Other(other) if other.tag().is_ignorable() => {
                    warn!("ignoring {:?} packet before signature", other.tag());
                }
                packet => bail!("expected a signature, found {:?}", packet.tag()),
            }
        };
        ensure!(
            matches!(signature.typ(), SignatureType::Binary | SignatureType::Text),
            "{:?} is not a data signature",
            signature.typ()
        );

        let rest = packets.count();
        if rest > 0 {
            warn!("ignoring {} packets after the signature", rest);
        }

        Ok(DetachedSignature::new(signature))
    }

    fn matches_block_type(typ: BlockType) -> bool {
        matches!(typ, BlockType::Signature | BlockType::File)
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::composed::{SecretKeyParamsBuilder, SignedSecretKey};

    fn key(seed: u64) -> SignedSecretKey {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        SecretKeyParamsBuilder::default()
            .key_bits(1024)
            .primary_user_id("detached")
            .s2k_count(96)
            .created_at(DateTime::from_timestamp(1_600_000_000, 0).unwrap())
            .build()
            .unwrap()
            .generate(&mut rng)
            .unwrap()
    }

    #[test]
    fn test_detached_roundtrip() {
        let _ = pretty_env_logger::try_init();
        let signer = key(11);
        let other = key(12);
        let content = b"some file content\n";

        let sig = DetachedSignature::sign_binary_data(
            &signer,
            &Password::empty(),
            HashAlgorithm::Sha512,
            &content[..],
        )
        .unwrap();

        let armored = sig.to_armored_string(ArmorOptions::default()).unwrap();
        assert!(armored.starts_with("-----BEGIN PGP SIGNATURE-----"));

        let (parsed, _) = DetachedSignature::from_slice(armored.as_bytes()).unwrap();
        assert_eq!(parsed, sig);
        parsed.verify(&signer.public_key(), content).unwrap();
        assert!(parsed.verify(&signer.public_key(), b"other content").is_err());
        assert!(parsed.verify(&other.public_key(), content).is_err());

        let (parsed, _) = DetachedSignature::from_slice(&sig.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, sig);
    }

    #[test]
    fn test_text_detached() {
        let signer = key(11);
        let sig = DetachedSignature::sign_text_data(
            &signer,
            &Password::empty(),
            HashAlgorithm::Sha256,
            &b"a\nb\n"[..],
        )
        .unwrap();

        sig.verify(&signer, b"a\r\nb\r\n").unwrap();
    }

    #[test]
    fn test_wrong_block_type() {
        let signer = key(11);
        let block = signer.public_key_block().unwrap();
        assert!(DetachedSignature::from_string(&block).is_err());
    }
}
