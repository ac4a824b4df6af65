use std::io;

use bytes::Buf;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::Result;
use crate::parsing::BufParsing;
use crate::ser::Serialize;

const EXPBIAS: u32 = 6;

/// The coded iteration count used when none is configured. Decodes to 16777216 octets.
pub const DEFAULT_ITER_SALTED_COUNT: u8 = 224;

/// String-To-Key methods are used to convert a given password string into a key.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-string-to-key-s2k-specifier>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub enum StringToKey {
    /// Hashes the passphrase directly. Only used by legacy secret key encryption.
    Simple { hash_alg: HashAlgorithm },
    Salted {
        hash_alg: HashAlgorithm,
        #[debug("{}", hex::encode(salt))]
        salt: [u8; 8],
    },
    IteratedAndSalted {
        hash_alg: HashAlgorithm,
        #[debug("{}", hex::encode(salt))]
        salt: [u8; 8],
        /// Coded count, see [`StringToKey::decode_count`].
        count: u8,
    },
}

impl StringToKey {
    /// Creates an iterated and salted S2K with a fresh random salt.
    pub fn new_iterated<R: CryptoRng + Rng>(mut rng: R, hash_alg: HashAlgorithm, count: u8) -> Self {
        let mut salt = [0u8; 8];
        rng.fill_bytes(&mut salt);

        StringToKey::IteratedAndSalted {
            hash_alg,
            salt,
            count,
        }
    }

    /// Converts a coded count into the number of octets to hash.
    ///
    /// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-iterated-and-salted-s2k>
    pub fn decode_count(c: u8) -> usize {
        ((16u32 + u32::from(c & 15)) << (u32::from(c >> 4) + EXPBIAS)) as usize
    }

    pub fn hash_alg(&self) -> HashAlgorithm {
        match self {
            StringToKey::Simple { hash_alg }
            | StringToKey::Salted { hash_alg, .. }
            | StringToKey::IteratedAndSalted { hash_alg, .. } => *hash_alg,
        }
    }

    fn typ(&self) -> u8 {
        match self {
            StringToKey::Simple { .. } => 0,
            StringToKey::Salted { .. } => 1,
            StringToKey::IteratedAndSalted { .. } => 3,
        }
    }

    pub fn try_from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let typ = i.read_u8()?;
        let hash_alg = HashAlgorithm::from(i.read_u8()?);

        match typ {
            0 => Ok(StringToKey::Simple { hash_alg }),
            1 => {
                let salt = i.read_array::<8>()?;
                Ok(StringToKey::Salted { hash_alg, salt })
            }
            3 => {
                let salt = i.read_array::<8>()?;
                let count = i.read_u8()?;
                Ok(StringToKey::IteratedAndSalted {
                    hash_alg,
                    salt,
                    count,
                })
            }
            _ => unsupported_err!("string to key type {}", typ),
        }
    }

    /// Derives a key of `key_size` bytes from the passphrase.
    ///
    /// When the hash output is shorter than the key, additional hash contexts are
    /// run, each preloaded with one more zero octet than the previous one.
    pub fn derive_key(&self, passphrase: &[u8], key_size: usize) -> Result<Zeroizing<Vec<u8>>> {
        let hash_alg = self.hash_alg();
        let Some(digest_size) = hash_alg.digest_size() else {
            unsupported_err!("s2k with hash {}", hash_alg);
        };

        let mut key = Zeroizing::new(vec![0u8; key_size]);

        for (round, chunk) in key.chunks_mut(digest_size).enumerate() {
            let mut hasher = hash_alg.new_hasher()?;
            hasher.update(&vec![0u8; round]);

            match self {
                StringToKey::Simple { .. } => {
                    hasher.update(passphrase);
                }
                StringToKey::Salted { salt, .. } => {
                    hasher.update(salt);
                    hasher.update(passphrase);
                }
                StringToKey::IteratedAndSalted { salt, count, .. } => {
                    let mut data = Zeroizing::new(Vec::with_capacity(salt.len() + passphrase.len()));
                    data.extend_from_slice(salt);
                    data.extend_from_slice(passphrase);

                    // the whole salt and passphrase are hashed at least once
                    let count = Self::decode_count(*count).max(data.len());
                    let full = count / data.len();
                    let tail = count % data.len();

                    for _ in 0..full {
                        hasher.update(&data);
                    }
                    if tail != 0 {
                        hasher.update(&data[..tail]);
                    }
                }
            }

            let digest = Zeroizing::new(hasher.finalize().to_vec());
            let l = chunk.len();
            chunk.copy_from_slice(&digest[..l]);
        }

        Ok(key)
    }
}

impl Serialize for StringToKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.typ(), self.hash_alg().into()])?;

        match self {
            StringToKey::Simple { .. } => {}
            StringToKey::Salted { salt, .. } => {
                writer.write_all(salt)?;
            }
            StringToKey::IteratedAndSalted { salt, count, .. } => {
                writer.write_all(salt)?;
                writer.write_all(&[*count])?;
            }
        }

        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            StringToKey::Simple { .. } => 2,
            StringToKey::Salted { .. } => 10,
            StringToKey::IteratedAndSalted { .. } => 11,
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_decode_count() {
        assert_eq!(StringToKey::decode_count(0), 1024);
        assert_eq!(StringToKey::decode_count(96), 65536);
        assert_eq!(StringToKey::decode_count(DEFAULT_ITER_SALTED_COUNT), 16_777_216);
        assert_eq!(StringToKey::decode_count(255), 65_011_712);
    }

    #[test]
    fn test_simple_sha1() {
        // with a single context this is just SHA1 of the passphrase
        let s2k = StringToKey::Simple {
            hash_alg: HashAlgorithm::Sha1,
        };
        let key = s2k.derive_key(b"abc", 16).unwrap();
        assert_eq!(&key[..], &hex!("a9993e364706816aba3e25717850c26c")[..]);
    }

    #[test]
    fn test_multiple_contexts() {
        let s2k = StringToKey::Simple {
            hash_alg: HashAlgorithm::Sha1,
        };
        let key = s2k.derive_key(b"abc", 32).unwrap();

        let mut second = vec![0u8];
        second.extend_from_slice(b"abc");
        let second = HashAlgorithm::Sha1.digest(&second).unwrap();

        assert_eq!(&key[..20], &hex!("a9993e364706816aba3e25717850c26c9cd0d89d")[..]);
        assert_eq!(&key[20..], &second[..12]);
    }

    #[test]
    fn test_iterated_is_deterministic() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let s2k = StringToKey::new_iterated(&mut rng, HashAlgorithm::Sha256, 96);

        let a = s2k.derive_key(b"hunter2", 32).unwrap();
        let b = s2k.derive_key(b"hunter2", 32).unwrap();
        let c = s2k.derive_key(b"hunter3", 32).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        // empty passphrases still hash the salt
        let empty = s2k.derive_key(b"", 32).unwrap();
        assert_eq!(empty.len(), 32);
    }

    #[test]
    fn test_parse_write() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let s2k = StringToKey::new_iterated(&mut rng, HashAlgorithm::Sha256, DEFAULT_ITER_SALTED_COUNT);
        let bytes = s2k.to_bytes().unwrap();
        assert_eq!(bytes.len(), s2k.write_len());
        assert_eq!(&bytes[..2], &[3, 8]);

        let parsed = StringToKey::try_from_buf(&bytes[..]).unwrap();
        assert_eq!(parsed, s2k);
    }

    #[test]
    fn test_unknown_type() {
        assert!(StringToKey::try_from_buf(&[101u8, 8][..]).is_err());
    }
}
