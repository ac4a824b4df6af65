use std::io;

use byteorder::WriteBytesExt;
use bytes::{Buf, Bytes};
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::checksum;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::packet::{PacketHeader, PacketTrait};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{DecryptionKey, EncryptionKey, KeyId, Mpi, Password, Tag};

/// Public Key Encrypted Session Key Packet (PKESK)
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-public-key-encrypted-sessio>
///
/// Only version 3 is supported, which pairs with version 1 integrity protected data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyEncryptedSessionKey {
    packet_header: PacketHeader,
    id: KeyId,
    pk_algo: PublicKeyAlgorithm,
    values: PkeskBytes,
}

/// The algorithm specific encrypted session key.
#[derive(derive_more::Debug, Clone, PartialEq, Eq)]
pub enum PkeskBytes {
    Rsa { mpi: Mpi },
    Other(#[debug("{}", hex::encode(_0))] Bytes),
}

impl PublicKeyEncryptedSessionKey {
    /// Encrypts the given session key to the passed in public key.
    pub fn from_session_key<R: CryptoRng + Rng>(
        rng: R,
        session_key: &[u8],
        alg: SymmetricKeyAlgorithm,
        pkey: &impl EncryptionKey,
    ) -> Result<Self> {
        ensure_eq!(session_key.len(), alg.key_size(), "session key size for {:?}", alg);

        let data = prepare_session_key_for_encryption(alg, session_key);
        let mpi = pkey.encrypt(rng, &data)?;
        debug!("wrapped session key for {:?}", pkey.key_id());

        let mut pkesk = PublicKeyEncryptedSessionKey {
            packet_header: PacketHeader::new_fixed(Tag::PublicKeyEncryptedSessionKey, 0),
            id: pkey.key_id(),
            pk_algo: pkey.algorithm(),
            values: PkeskBytes::Rsa { mpi },
        };
        pkesk.packet_header =
            PacketHeader::new_fixed(Tag::PublicKeyEncryptedSessionKey, pkesk.write_len());

        Ok(pkesk)
    }

    /// Parses a `PublicKeyEncryptedSessionKey` packet from the given buffer.
    pub fn try_from_buf<B: Buf>(packet_header: PacketHeader, mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != 3 {
            unsupported_err!("PKESK version {}", version);
        }

        let id = KeyId::from(i.read_array::<8>()?);
        let pk_algo = PublicKeyAlgorithm::from(i.read_u8()?);

        let values = if pk_algo.is_rsa() {
            let mpi = Mpi::from_buf(&mut i)?;
            PkeskBytes::Rsa { mpi }
        } else {
            PkeskBytes::Other(i.rest())
        };

        Ok(PublicKeyEncryptedSessionKey {
            packet_header,
            id,
            pk_algo,
            values,
        })
    }

    /// The key id of the recipient, all zeros for anonymous recipients.
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.pk_algo
    }

    /// Is this session key addressed to `key_id`, directly or as a wildcard?
    pub fn matches(&self, key_id: &KeyId) -> bool {
        self.id.is_wildcard() || &self.id == key_id
    }

    /// Recovers the session key, checking its checksum and size.
    pub fn decrypt(
        &self,
        key: &impl DecryptionKey,
        key_pw: &Password,
    ) -> Result<(SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>)> {
        let PkeskBytes::Rsa { mpi } = &self.values else {
            unsupported_err!("session keys encrypted with {:?}", self.pk_algo);
        };

        let decrypted = key.decrypt(key_pw, mpi)?;
        split_session_key(&decrypted)
    }
}

/// Prepare the session key data for encryption: `alg || key || checksum`.
fn prepare_session_key_for_encryption(alg: SymmetricKeyAlgorithm, sk: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut data = Zeroizing::new(Vec::with_capacity(1 + sk.len() + 2));

    data.push(u8::from(alg));
    data.extend_from_slice(sk);
    data.extend_from_slice(&checksum::calculate_simple(sk).to_be_bytes());

    data
}

/// Splits decrypted session key data into algorithm and key, validating the checksum.
fn split_session_key(decrypted: &[u8]) -> Result<(SymmetricKeyAlgorithm, Zeroizing<Vec<u8>>)> {
    ensure!(decrypted.len() > 3, "decrypted session key is too short");

    let alg = SymmetricKeyAlgorithm::from(decrypted[0]);
    let (key, cs) = decrypted[1..].split_at(decrypted.len() - 3);
    checksum::simple([cs[0], cs[1]], key)?;

    ensure!(alg.is_supported(), "unsupported session key algorithm {:?}", alg);
    ensure_eq!(key.len(), alg.key_size(), "session key size for {:?}", alg);

    Ok((alg, Zeroizing::new(key.to_vec())))
}

impl Serialize for PkeskBytes {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PkeskBytes::Rsa { mpi } => mpi.to_writer(writer),
            PkeskBytes::Other(data) => {
                writer.write_all(data)?;
                Ok(())
            }
        }
    }

    fn write_len(&self) -> usize {
        match self {
            PkeskBytes::Rsa { mpi } => mpi.write_len(),
            PkeskBytes::Other(data) => data.len(),
        }
    }
}

impl Serialize for PublicKeyEncryptedSessionKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(3)?;
        writer.write_all(self.id.as_ref())?;
        writer.write_u8(self.pk_algo.into())?;
        self.values.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 8 + 1 + self.values.write_len()
    }
}

impl PacketTrait for PublicKeyEncryptedSessionKey {
    fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::rsa;
    use crate::errors::Error;
    use crate::packet::SecretKey;
    use crate::types::KeyDetails;

    #[test]
    fn test_wrap_unwrap() {
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        let key = rsa::generate_key(&mut rng, 1024).unwrap();
        let created = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let key = SecretKey::from_rsa(&mut rng, key, created, &"pw".into(), 96).unwrap();

        let alg = SymmetricKeyAlgorithm::AES256;
        let session_key = alg.new_session_key(&mut rng);
        let pkesk =
            PublicKeyEncryptedSessionKey::from_session_key(&mut rng, &session_key, alg, &key.public_key())
                .unwrap();
        assert_eq!(pkesk.id(), &key.key_id());
        assert!(pkesk.matches(&key.key_id()));
        assert!(!pkesk.matches(&KeyId::from([1u8; 8])));

        let body = pkesk.to_bytes().unwrap();
        let parsed = PublicKeyEncryptedSessionKey::try_from_buf(*pkesk.packet_header(), &body[..])
            .unwrap();
        assert_eq!(parsed, pkesk);

        let (dec_alg, dec_key) = parsed.decrypt(&key, &"pw".into()).unwrap();
        assert_eq!(dec_alg, alg);
        assert_eq!(dec_key, session_key);

        let err = parsed.decrypt(&key, &"nope".into()).unwrap_err();
        assert!(matches!(err, Error::Passphrase));
    }

    #[test]
    fn test_session_key_checksum() {
        let sk = [7u8; 16];
        let data = prepare_session_key_for_encryption(SymmetricKeyAlgorithm::AES128, &sk);
        let (alg, key) = split_session_key(&data).unwrap();
        assert_eq!(alg, SymmetricKeyAlgorithm::AES128);
        assert_eq!(&key[..], &sk[..]);

        let mut broken = data.to_vec();
        broken[3] ^= 1;
        assert!(split_session_key(&broken).is_err());
    }

    #[test]
    fn test_wildcard() {
        let raw = [3u8, 0, 0, 0, 0, 0, 0, 0, 0, 16, 1, 2];
        let header = PacketHeader::new_fixed(Tag::PublicKeyEncryptedSessionKey, raw.len());
        let pkesk = PublicKeyEncryptedSessionKey::try_from_buf(header, &raw[..]).unwrap();
        assert!(pkesk.matches(&KeyId::from([9u8; 8])));
        assert_eq!(pkesk.algorithm(), PublicKeyAlgorithm::ElgamalEncrypt);
        assert_eq!(pkesk.to_bytes().unwrap(), raw.to_vec());
    }
}
