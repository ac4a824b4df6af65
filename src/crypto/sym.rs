use std::str::FromStr;

use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use camellia::{Camellia128, Camellia192, Camellia256};
use cast5::Cast5;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use cfb_mode::{Decryptor, Encryptor};
use des::TdesEde3;
use idea::Idea;
use log::debug;
use num_enum::{FromPrimitive, IntoPrimitive};
use rand::{CryptoRng, Rng};
use sha1::{Digest, Sha1};
use twofish::Twofish;
use zeroize::Zeroizing;

use crate::errors::{Error, Result};

/// Length of the modification detection code: tag, length and a SHA1 hash.
const MDC_LEN: usize = 22;

/// Available symmetric key algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-symmetric-key-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum SymmetricKeyAlgorithm {
    /// Plaintext or unencrypted data
    Plaintext = 0,
    /// IDEA
    IDEA = 1,
    /// Triple-DES
    TripleDES = 2,
    /// CAST5
    CAST5 = 3,
    /// Blowfish
    Blowfish = 4,
    // 5 & 6 are reserved for DES/SK
    /// AES with 128-bit key
    AES128 = 7,
    /// AES with 192-bit key
    AES192 = 8,
    /// AES with 256-bit key
    AES256 = 9,
    /// Twofish with 256-bit key
    Twofish = 10,
    /// [Camellia](https://tools.ietf.org/html/rfc5581#section-3) with 128-bit key
    Camellia128 = 11,
    /// [Camellia](https://tools.ietf.org/html/rfc5581#section-3) with 192-bit key
    Camellia192 = 12,
    /// [Camellia](https://tools.ietf.org/html/rfc5581#section-3) with 256-bit key
    Camellia256 = 13,

    #[num_enum(catch_all)]
    Other(u8),
}

#[allow(clippy::derivable_impls)]
impl Default for SymmetricKeyAlgorithm {
    fn default() -> Self {
        Self::AES256
    }
}

impl zeroize::DefaultIsZeroes for SymmetricKeyAlgorithm {}

impl FromStr for SymmetricKeyAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idea" => Ok(Self::IDEA),
            "3des" | "tripledes" => Ok(Self::TripleDES),
            "cast5" => Ok(Self::CAST5),
            "blowfish" => Ok(Self::Blowfish),
            "aes128" => Ok(Self::AES128),
            "aes192" => Ok(Self::AES192),
            "aes256" => Ok(Self::AES256),
            "twofish" => Ok(Self::Twofish),
            "camellia128" => Ok(Self::Camellia128),
            "camellia192" => Ok(Self::Camellia192),
            "camellia256" => Ok(Self::Camellia256),
            _ => bail!("unknown symmetric algorithm {}", s),
        }
    }
}

macro_rules! cfb_dispatch {
    ($alg:expr, $mode:ident, $key:expr, $iv:expr, $data:expr, $op:ident) => {
        match $alg {
            SymmetricKeyAlgorithm::Plaintext => {
                bail!("'Plaintext' is not a legal cipher for encrypted data")
            }
            SymmetricKeyAlgorithm::IDEA => $mode::<Idea>::new_from_slices($key, $iv)?.$op($data),
            SymmetricKeyAlgorithm::TripleDES => {
                $mode::<TdesEde3>::new_from_slices($key, $iv)?.$op($data)
            }
            SymmetricKeyAlgorithm::CAST5 => $mode::<Cast5>::new_from_slices($key, $iv)?.$op($data),
            SymmetricKeyAlgorithm::Blowfish => {
                $mode::<Blowfish>::new_from_slices($key, $iv)?.$op($data)
            }
            SymmetricKeyAlgorithm::AES128 => $mode::<Aes128>::new_from_slices($key, $iv)?.$op($data),
            SymmetricKeyAlgorithm::AES192 => $mode::<Aes192>::new_from_slices($key, $iv)?.$op($data),
            SymmetricKeyAlgorithm::AES256 => $mode::<Aes256>::new_from_slices($key, $iv)?.$op($data),
            SymmetricKeyAlgorithm::Twofish => {
                $mode::<Twofish>::new_from_slices($key, $iv)?.$op($data)
            }
            SymmetricKeyAlgorithm::Camellia128 => {
                $mode::<Camellia128>::new_from_slices($key, $iv)?.$op($data)
            }
            SymmetricKeyAlgorithm::Camellia192 => {
                $mode::<Camellia192>::new_from_slices($key, $iv)?.$op($data)
            }
            SymmetricKeyAlgorithm::Camellia256 => {
                $mode::<Camellia256>::new_from_slices($key, $iv)?.$op($data)
            }
            SymmetricKeyAlgorithm::Other(id) => {
                unimplemented_err!("SymmetricKeyAlgorithm {} is unsupported", id)
            }
        }
    };
}

impl SymmetricKeyAlgorithm {
    /// The size of a single block in bytes.
    /// Based on <https://github.com/gpg/libgcrypt/blob/master/cipher>
    pub fn block_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::Plaintext => 0,
            SymmetricKeyAlgorithm::IDEA => 8,
            SymmetricKeyAlgorithm::TripleDES => 8,
            SymmetricKeyAlgorithm::CAST5 => 8,
            SymmetricKeyAlgorithm::Blowfish => 8,
            SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 16,
            SymmetricKeyAlgorithm::AES256 => 16,
            SymmetricKeyAlgorithm::Twofish => 16,
            SymmetricKeyAlgorithm::Camellia128 => 16,
            SymmetricKeyAlgorithm::Camellia192 => 16,
            SymmetricKeyAlgorithm::Camellia256 => 16,
            SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// The size of the key in bytes.
    pub const fn key_size(self) -> usize {
        match self {
            SymmetricKeyAlgorithm::Plaintext => 0,
            SymmetricKeyAlgorithm::IDEA => 16,
            SymmetricKeyAlgorithm::TripleDES => 24,
            SymmetricKeyAlgorithm::CAST5 => 16,
            SymmetricKeyAlgorithm::Blowfish => 16,
            SymmetricKeyAlgorithm::AES128 => 16,
            SymmetricKeyAlgorithm::AES192 => 24,
            SymmetricKeyAlgorithm::AES256 => 32,
            SymmetricKeyAlgorithm::Twofish => 32,
            SymmetricKeyAlgorithm::Camellia128 => 16,
            SymmetricKeyAlgorithm::Camellia192 => 24,
            SymmetricKeyAlgorithm::Camellia256 => 32,
            SymmetricKeyAlgorithm::Other(_) => 0,
        }
    }

    /// Can this algorithm be used to encrypt data?
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            SymmetricKeyAlgorithm::Plaintext | SymmetricKeyAlgorithm::Other(_)
        )
    }

    /// Encrypt the data using CFB mode, without padding. Overwrites the input.
    /// This is regular CFB, not OpenPGP CFB with resynchronization.
    pub fn encrypt_with_iv_regular(self, key: &[u8], iv: &[u8], plaintext: &mut [u8]) -> Result<()> {
        cfb_dispatch!(self, Encryptor, key, iv, plaintext, encrypt);
        Ok(())
    }

    /// Decrypt the data using CFB mode, without padding. Overwrites the input.
    pub fn decrypt_with_iv_regular(
        self,
        key: &[u8],
        iv: &[u8],
        ciphertext: &mut [u8],
    ) -> Result<()> {
        cfb_dispatch!(self, Decryptor, key, iv, ciphertext, decrypt);
        Ok(())
    }

    /// Encrypt `plaintext` for a symmetrically encrypted integrity protected data packet.
    ///
    /// The plaintext is prefixed with one block of random data, followed by the last
    /// two octets of that block repeated, and suffixed with a modification detection code.
    /// The IV is all zeroes.
    pub fn encrypt_protected<R: CryptoRng + Rng>(
        self,
        mut rng: R,
        key: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        debug!("protected encrypt {} bytes with {:?}", plaintext.len(), self);
        ensure!(self.is_supported(), "cannot encrypt with {:?}", self);

        let bs = self.block_size();
        let prefix_len = bs + 2;
        let plaintext_len = plaintext.len();

        let mut ciphertext = vec![0u8; prefix_len + plaintext_len + MDC_LEN];

        // prefix
        rng.fill_bytes(&mut ciphertext[..bs]);

        // add quick check
        ciphertext[bs] = ciphertext[bs - 2];
        ciphertext[bs + 1] = ciphertext[bs - 1];

        // plaintext
        ciphertext[prefix_len..(prefix_len + plaintext_len)].copy_from_slice(plaintext);
        // mdc header
        ciphertext[prefix_len + plaintext_len] = 0xD3;
        ciphertext[prefix_len + plaintext_len + 1] = 0x14;
        // mdc body
        let checksum = Sha1::digest(&ciphertext[..(prefix_len + plaintext_len + 2)]);
        ciphertext[(prefix_len + plaintext_len + 2)..].copy_from_slice(&checksum);

        let iv = vec![0u8; bs];
        self.encrypt_with_iv_regular(key, &iv, &mut ciphertext)?;

        Ok(ciphertext)
    }

    /// Decrypt the body of a symmetrically encrypted integrity protected data packet.
    ///
    /// Checks the quick check octets and the modification detection code, and returns
    /// the plaintext without prefix and MDC.
    pub fn decrypt_protected(self, key: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        debug!("protected decrypt {} bytes with {:?}", ciphertext.len(), self);
        ensure!(self.is_supported(), "cannot decrypt with {:?}", self);

        let bs = self.block_size();
        let prefix_len = bs + 2;
        if ciphertext.len() < prefix_len + MDC_LEN {
            return Err(Error::Integrity {
                message: "encrypted data is too short".into(),
            });
        }

        let mut data = Zeroizing::new(ciphertext.to_vec());
        let iv = vec![0u8; bs];
        self.decrypt_with_iv_regular(key, &iv, &mut data)?;

        if data[bs - 2] != data[bs] || data[bs - 1] != data[bs + 1] {
            return Err(Error::Integrity {
                message: "quick check mismatch".into(),
            });
        }

        let mdc_start = data.len() - MDC_LEN;
        if data[mdc_start] != 0xD3 || data[mdc_start + 1] != 0x14 {
            return Err(Error::Integrity {
                message: "missing modification detection code".into(),
            });
        }

        let expected = Sha1::digest(&data[..mdc_start + 2]);
        if expected[..] != data[mdc_start + 2..] {
            return Err(Error::Integrity {
                message: "modification detection code mismatch".into(),
            });
        }

        Ok(Zeroizing::new(data[prefix_len..mdc_start].to_vec()))
    }

    /// Generate a new session key.
    pub fn new_session_key<R: Rng + CryptoRng>(self, mut rng: R) -> Zeroizing<Vec<u8>> {
        let mut session_key = Zeroizing::new(vec![0u8; self.key_size()]);
        rng.fill_bytes(&mut session_key);
        session_key
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    const ALGS: [SymmetricKeyAlgorithm; 11] = [
        SymmetricKeyAlgorithm::IDEA,
        SymmetricKeyAlgorithm::TripleDES,
        SymmetricKeyAlgorithm::CAST5,
        SymmetricKeyAlgorithm::Blowfish,
        SymmetricKeyAlgorithm::AES128,
        SymmetricKeyAlgorithm::AES192,
        SymmetricKeyAlgorithm::AES256,
        SymmetricKeyAlgorithm::Twofish,
        SymmetricKeyAlgorithm::Camellia128,
        SymmetricKeyAlgorithm::Camellia192,
        SymmetricKeyAlgorithm::Camellia256,
    ];

    #[test]
    fn test_protected_roundtrip() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let data = b"The quick brown fox jumps over the lazy dog";

        for alg in ALGS {
            let key = alg.new_session_key(&mut rng);
            let ciphertext = alg.encrypt_protected(&mut rng, &key, data).unwrap();
            assert_eq!(
                ciphertext.len(),
                alg.block_size() + 2 + data.len() + MDC_LEN
            );

            let plaintext = alg.decrypt_protected(&key, &ciphertext).unwrap();
            assert_eq!(&plaintext[..], &data[..], "{alg:?}");
        }
    }

    #[test]
    fn test_protected_detects_tampering() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let alg = SymmetricKeyAlgorithm::AES256;
        let key = alg.new_session_key(&mut rng);
        let mut ciphertext = alg
            .encrypt_protected(&mut rng, &key, b"hello world")
            .unwrap();

        // flip a bit in the encrypted plaintext
        let idx = alg.block_size() + 4;
        ciphertext[idx] ^= 0x01;

        let err = alg.decrypt_protected(&key, &ciphertext).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }), "{err:?}");
    }

    #[test]
    fn test_protected_wrong_key() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let alg = SymmetricKeyAlgorithm::AES128;
        let key = alg.new_session_key(&mut rng);
        let other = alg.new_session_key(&mut rng);
        let ciphertext = alg.encrypt_protected(&mut rng, &key, b"secret").unwrap();

        let err = alg.decrypt_protected(&other, &ciphertext).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }

    #[test]
    fn test_truncated() {
        let alg = SymmetricKeyAlgorithm::AES128;
        let err = alg.decrypt_protected(&[0u8; 16], &[0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::Integrity { .. }));
    }
}
