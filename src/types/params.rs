use std::io;

use bytes::{Buf, Bytes};
use log::debug;
use rand::{CryptoRng, Rng};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::crypto::checksum;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::rsa::{crt_coefficient, private_key_from_parts, MAX_KEY_SIZE};
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{Mpi, StringToKey};

/// Secret key material is encrypted, protected by a SHA1 hash.
const S2K_USAGE_SHA1: u8 = 254;
/// Secret key material is encrypted, protected by a two octet checksum.
const S2K_USAGE_CHECKSUM: u8 = 255;
const SHA1_LEN: usize = 20;

/// Public key material.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum PublicParams {
    RSA(RsaPublicKey),
    /// Material of an algorithm we can parse around, but not use.
    Unknown {
        alg: PublicKeyAlgorithm,
        data: Bytes,
    },
}

impl PublicParams {
    /// Parses the public parameters of a key packet.
    ///
    /// For unknown algorithms the rest of the buffer is consumed.
    pub fn try_from_buf<B: Buf>(alg: PublicKeyAlgorithm, mut i: B) -> Result<Self> {
        if alg.is_rsa() {
            let n = Mpi::from_buf(&mut i)?;
            let e = Mpi::from_buf(&mut i)?;
            let key = RsaPublicKey::new_with_max_size((&n).into(), (&e).into(), MAX_KEY_SIZE)?;

            return Ok(PublicParams::RSA(key));
        }

        debug!("keeping opaque public params for {:?}", alg);
        Ok(PublicParams::Unknown {
            alg,
            data: i.rest(),
        })
    }

    pub fn as_rsa(&self) -> Result<&RsaPublicKey> {
        match self {
            PublicParams::RSA(key) => Ok(key),
            PublicParams::Unknown { alg, .. } => unsupported_err!("public key algorithm {:?}", alg),
        }
    }
}

impl Serialize for PublicParams {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            PublicParams::RSA(key) => {
                Mpi::from(key.n()).to_writer(writer)?;
                Mpi::from(key.e()).to_writer(writer)?;
            }
            PublicParams::Unknown { data, .. } => {
                writer.write_all(data)?;
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            PublicParams::RSA(key) => {
                Mpi::from(key.n()).write_len() + Mpi::from(key.e()).write_len()
            }
            PublicParams::Unknown { data, .. } => data.len(),
        }
    }
}

/// Decrypted secret key material. The inner key zeroizes itself on drop.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
#[debug("PlainSecretParams(..)")]
pub struct PlainSecretParams(RsaPrivateKey);

impl From<RsaPrivateKey> for PlainSecretParams {
    fn from(key: RsaPrivateKey) -> Self {
        PlainSecretParams(key)
    }
}

impl PlainSecretParams {
    /// Parses the raw `d, p, q, u` MPIs, without the checksum.
    pub fn try_from_buf<B: Buf>(mut i: B, public_params: &PublicParams) -> Result<Self> {
        let public = public_params.as_rsa()?;

        let d = Mpi::from_buf(&mut i)?;
        let p = Mpi::from_buf(&mut i)?;
        let q = Mpi::from_buf(&mut i)?;
        // u is recomputed on write
        let _u = Mpi::from_buf(&mut i)?;

        let key = private_key_from_parts(public, &d, &p, &q)?;
        Ok(PlainSecretParams(key))
    }

    pub fn as_rsa(&self) -> &RsaPrivateKey {
        &self.0
    }

    pub fn public_params(&self) -> PublicParams {
        PublicParams::RSA(self.0.to_public_key())
    }

    fn to_writer_raw<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let key = &self.0;
        let u = crt_coefficient(key)?;

        Mpi::from(key.d()).to_writer(writer)?;
        Mpi::from(&key.primes()[0]).to_writer(writer)?;
        Mpi::from(&key.primes()[1]).to_writer(writer)?;
        Mpi::from(u).to_writer(writer)?;

        Ok(())
    }

    fn to_raw(&self) -> Result<Zeroizing<Vec<u8>>> {
        let mut raw = Zeroizing::new(Vec::new());
        self.to_writer_raw(&mut *raw)?;
        Ok(raw)
    }

    /// Encrypts the material under a key derived from `passphrase`, using S2K usage 254.
    pub fn encrypt<R: CryptoRng + Rng>(
        &self,
        mut rng: R,
        passphrase: &[u8],
        alg: SymmetricKeyAlgorithm,
        s2k: StringToKey,
    ) -> Result<EncryptedSecretParams> {
        let key = s2k.derive_key(passphrase, alg.key_size())?;

        let mut iv = vec![0u8; alg.block_size()];
        rng.fill_bytes(&mut iv);

        let mut data = self.to_raw()?;
        let hash = checksum::calculate_sha1(&data);
        data.extend_from_slice(&hash);

        alg.encrypt_with_iv_regular(&key, &iv, &mut data)?;

        Ok(EncryptedSecretParams {
            data: Bytes::from(data.to_vec()),
            iv: iv.into(),
            encryption_algorithm: alg,
            string_to_key: s2k,
            s2k_usage: S2K_USAGE_SHA1,
        })
    }
}

/// Secret key material encrypted under a passphrase.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct EncryptedSecretParams {
    /// The encrypted data, including the trailing hash or checksum.
    #[debug("{}", hex::encode(data))]
    data: Bytes,
    #[debug("{}", hex::encode(iv))]
    iv: Bytes,
    encryption_algorithm: SymmetricKeyAlgorithm,
    string_to_key: StringToKey,
    /// 254, 255, or a symmetric algorithm id for the legacy format.
    s2k_usage: u8,
}

impl EncryptedSecretParams {
    pub fn encryption_algorithm(&self) -> SymmetricKeyAlgorithm {
        self.encryption_algorithm
    }

    pub fn string_to_key(&self) -> &StringToKey {
        &self.string_to_key
    }

    /// Decrypts the material. Any failure after decryption means the passphrase was wrong.
    pub fn unlock(&self, passphrase: &[u8], public_params: &PublicParams) -> Result<PlainSecretParams> {
        let key = self
            .string_to_key
            .derive_key(passphrase, self.encryption_algorithm.key_size())?;

        let mut plaintext = Zeroizing::new(self.data.to_vec());
        self.encryption_algorithm
            .decrypt_with_iv_regular(&key, &self.iv, &mut plaintext)?;

        let raw = if self.s2k_usage == S2K_USAGE_SHA1 {
            if plaintext.len() < SHA1_LEN {
                return Err(Error::Passphrase);
            }
            let (raw, expected) = plaintext.split_at(plaintext.len() - SHA1_LEN);
            if checksum::calculate_sha1(raw) != expected {
                return Err(Error::Passphrase);
            }
            raw
        } else {
            if plaintext.len() < 2 {
                return Err(Error::Passphrase);
            }
            let (raw, expected) = plaintext.split_at(plaintext.len() - 2);
            if checksum::simple([expected[0], expected[1]], raw).is_err() {
                return Err(Error::Passphrase);
            }
            raw
        };

        PlainSecretParams::try_from_buf(raw, public_params).map_err(|err| {
            debug!("decrypted secret key failed to parse: {}", err);
            Error::Passphrase
        })
    }
}

/// Secret key material, as stored in a secret key packet.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum SecretParams {
    Plain(PlainSecretParams),
    Encrypted(EncryptedSecretParams),
}

impl SecretParams {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, SecretParams::Encrypted(_))
    }

    pub fn try_from_buf<B: Buf>(mut i: B, public_params: &PublicParams) -> Result<Self> {
        let s2k_usage = i.read_u8()?;

        match s2k_usage {
            0 => {
                let data = i.rest();
                ensure!(data.len() >= 2, "missing secret key checksum");
                let (raw, cs) = data.split_at(data.len() - 2);
                checksum::simple([cs[0], cs[1]], raw)?;

                let params = PlainSecretParams::try_from_buf(raw, public_params)?;
                Ok(SecretParams::Plain(params))
            }
            S2K_USAGE_SHA1 | S2K_USAGE_CHECKSUM => {
                let alg = SymmetricKeyAlgorithm::from(i.read_u8()?);
                ensure!(alg.is_supported(), "secret key encrypted with {:?}", alg);
                let s2k = StringToKey::try_from_buf(&mut i)?;
                let iv = i.read_take(alg.block_size())?;

                Ok(SecretParams::Encrypted(EncryptedSecretParams {
                    data: i.rest(),
                    iv,
                    encryption_algorithm: alg,
                    string_to_key: s2k,
                    s2k_usage,
                }))
            }
            _ => {
                // legacy format: the usage octet is the cipher, the key is the MD5 of the passphrase
                let alg = SymmetricKeyAlgorithm::from(s2k_usage);
                ensure!(alg.is_supported(), "secret key encrypted with {:?}", alg);
                let iv = i.read_take(alg.block_size())?;

                Ok(SecretParams::Encrypted(EncryptedSecretParams {
                    data: i.rest(),
                    iv,
                    encryption_algorithm: alg,
                    string_to_key: StringToKey::Simple {
                        hash_alg: HashAlgorithm::Md5,
                    },
                    s2k_usage,
                }))
            }
        }
    }
}

impl Serialize for SecretParams {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            SecretParams::Plain(params) => {
                let raw = params.to_raw()?;
                writer.write_all(&[0])?;
                writer.write_all(&raw)?;
                writer.write_all(&checksum::calculate_simple(&raw).to_be_bytes())?;
            }
            SecretParams::Encrypted(params) => {
                writer.write_all(&[params.s2k_usage])?;
                if matches!(params.s2k_usage, S2K_USAGE_SHA1 | S2K_USAGE_CHECKSUM) {
                    writer.write_all(&[params.encryption_algorithm.into()])?;
                    params.string_to_key.to_writer(writer)?;
                }
                writer.write_all(&params.iv)?;
                writer.write_all(&params.data)?;
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            SecretParams::Plain(params) => {
                let key = params.as_rsa();
                let u = crt_coefficient(key).map(|u| Mpi::from(u).write_len()).unwrap_or(0);
                1 + Mpi::from(key.d()).write_len()
                    + Mpi::from(&key.primes()[0]).write_len()
                    + Mpi::from(&key.primes()[1]).write_len()
                    + u
                    + 2
            }
            SecretParams::Encrypted(params) => {
                let mut sum = 1;
                if matches!(params.s2k_usage, S2K_USAGE_SHA1 | S2K_USAGE_CHECKSUM) {
                    sum += 1 + params.string_to_key.write_len();
                }
                sum + params.iv.len() + params.data.len()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::crypto::rsa::generate_key;

    fn key() -> PlainSecretParams {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        PlainSecretParams::from(generate_key(&mut rng, 1024).unwrap())
    }

    #[test]
    fn test_plain_roundtrip() {
        let plain = key();
        let public = plain.public_params();
        let params = SecretParams::Plain(plain);

        let bytes = params.to_bytes().unwrap();
        assert_eq!(bytes.len(), params.write_len());
        assert_eq!(bytes[0], 0);

        let parsed = SecretParams::try_from_buf(&bytes[..], &public).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_unlock() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let plain = key();
        let public = plain.public_params();

        let s2k = StringToKey::new_iterated(&mut rng, HashAlgorithm::Sha256, 96);
        let enc = plain
            .encrypt(&mut rng, b"correct horse", SymmetricKeyAlgorithm::AES256, s2k)
            .unwrap();

        let params = SecretParams::Encrypted(enc.clone());
        let bytes = params.to_bytes().unwrap();
        assert_eq!(bytes.len(), params.write_len());
        assert_eq!(bytes[0], S2K_USAGE_SHA1);

        let parsed = SecretParams::try_from_buf(&bytes[..], &public).unwrap();
        assert_eq!(parsed, params);

        let unlocked = enc.unlock(b"correct horse", &public).unwrap();
        assert_eq!(unlocked, plain);

        let err = enc.unlock(b"wrong horse", &public).unwrap_err();
        assert!(matches!(err, Error::Passphrase), "{err:?}");
    }

    #[test]
    fn test_bad_checksum() {
        let plain = key();
        let public = plain.public_params();
        let mut bytes = SecretParams::Plain(plain).to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        assert!(SecretParams::try_from_buf(&bytes[..], &public).is_err());
    }
}
