use std::io;

use byteorder::WriteBytesExt;
use bytes::{Buf, Bytes};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::packet::{PacketHeader, PacketTrait};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::Tag;

/// Symmetrically Encrypted Integrity Protected Data Packet
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-symmetrically-encrypted-and>
///
/// Only version 1, CFB with a modification detection code, is supported.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct SymEncryptedProtectedData {
    packet_header: PacketHeader,
    #[debug("{}", hex::encode(data))]
    data: Bytes,
}

impl SymEncryptedProtectedData {
    /// Parses a `SymEncryptedProtectedData` packet from the given buffer.
    pub fn try_from_buf<B: Buf>(packet_header: PacketHeader, mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != 1 {
            unsupported_err!("SEIPD version {}", version);
        }
        let data = i.rest();

        Ok(SymEncryptedProtectedData { packet_header, data })
    }

    /// Encrypts the data using the given symmetric key.
    pub fn encrypt_with_rng<R: CryptoRng + Rng>(
        rng: R,
        alg: SymmetricKeyAlgorithm,
        key: &[u8],
        plaintext: &[u8],
    ) -> Result<Self> {
        let data: Bytes = alg.encrypt_protected(rng, key, plaintext)?.into();
        let packet_header = PacketHeader::new_fixed(Tag::SymEncryptedProtectedData, 1 + data.len());

        Ok(SymEncryptedProtectedData { packet_header, data })
    }

    /// Decrypts the content, checking the quick check octets and the modification detection code.
    pub fn decrypt(&self, alg: SymmetricKeyAlgorithm, key: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        alg.decrypt_protected(key, &self.data)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Serialize for SymEncryptedProtectedData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(1)?;
        writer.write_all(&self.data)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + self.data.len()
    }
}

impl PacketTrait for SymEncryptedProtectedData {
    fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::errors::Error;

    #[test]
    fn test_encrypt_decrypt() {
        let mut rng = ChaCha8Rng::seed_from_u64(41);
        let alg = SymmetricKeyAlgorithm::AES256;
        let key = alg.new_session_key(&mut rng);

        let packet =
            SymEncryptedProtectedData::encrypt_with_rng(&mut rng, alg, &key, b"secret message").unwrap();
        let body = packet.to_bytes().unwrap();
        assert_eq!(body[0], 1);

        let parsed = SymEncryptedProtectedData::try_from_buf(*packet.packet_header(), &body[..]).unwrap();
        assert_eq!(&parsed.decrypt(alg, &key).unwrap()[..], b"secret message");
    }

    #[test]
    fn test_tampered() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let alg = SymmetricKeyAlgorithm::AES128;
        let key = alg.new_session_key(&mut rng);

        let packet =
            SymEncryptedProtectedData::encrypt_with_rng(&mut rng, alg, &key, b"secret message").unwrap();
        let mut body = packet.to_bytes().unwrap();
        let last = body.len() - 5;
        body[last] ^= 0x01;

        let parsed = SymEncryptedProtectedData::try_from_buf(*packet.packet_header(), &body[..]).unwrap();
        let err = parsed.decrypt(alg, &key).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }
}
