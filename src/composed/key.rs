//! Key generation.
//!
//! A generated key is a single RSA primary key that signs and encrypts, certified over one
//! user id with a positive self-certification carrying key flags and algorithm preferences.

use chrono::SubsecRound;
use derive_builder::Builder;
use log::debug;
use rand::{CryptoRng, Rng};

use crate::composed::{SignedKeyDetails, SignedSecretKey, SignedUser};
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::rsa;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::packet::{self, KeyFlags, SignatureConfig, SignatureType, Subpacket, SubpacketData, UserId};
use crate::types::{CompressionAlgorithm, Password, Tag, DEFAULT_ITER_SALTED_COUNT};

#[derive(Debug, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SecretKeyParams {
    /// Size of the RSA modulus.
    #[builder(default = "2048")]
    key_bits: usize,

    // -- Keyflags
    #[builder(default = "true")]
    can_sign: bool,
    #[builder(default = "true")]
    can_certify: bool,
    #[builder(default = "true")]
    can_encrypt: bool,

    // -- Preferences
    /// List of symmetric algorithms that indicate which algorithms the key holder prefers to use.
    #[builder(default = "vec![SymmetricKeyAlgorithm::AES256, SymmetricKeyAlgorithm::AES128]")]
    preferred_symmetric_algorithms: Vec<SymmetricKeyAlgorithm>,
    /// List of hash algorithms that indicate which algorithms the key holder prefers to use.
    #[builder(default = "vec![HashAlgorithm::Sha256, HashAlgorithm::Sha512]")]
    preferred_hash_algorithms: Vec<HashAlgorithm>,
    /// List of compression algorithms that indicate which algorithms the key holder prefers to use.
    #[builder(default = "vec![CompressionAlgorithm::ZLIB, CompressionAlgorithm::ZIP]")]
    preferred_compression_algorithms: Vec<CompressionAlgorithm>,
    /// Hash used for the self-certification.
    #[builder(default = "HashAlgorithm::Sha256")]
    certification_hash: HashAlgorithm,

    #[builder(setter(into))]
    primary_user_id: String,

    /// Passphrase protecting the secret material, empty for an unprotected key.
    #[builder(default)]
    passphrase: String,
    /// Coded iteration count of the passphrase S2K.
    #[builder(default = "DEFAULT_ITER_SALTED_COUNT")]
    s2k_count: u8,
    #[builder(default = "chrono::Utc::now().trunc_subsecs(0)")]
    created_at: chrono::DateTime<chrono::Utc>,
}

impl SecretKeyParamsBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(bits) = self.key_bits {
            if bits < rsa::MIN_KEY_BITS {
                return Err(format!(
                    "Keys with less than {} bits are not supported",
                    rsa::MIN_KEY_BITS
                ));
            }
        }
        if let Some(algs) = &self.preferred_symmetric_algorithms {
            if let Some(alg) = algs.iter().find(|alg| !alg.is_supported()) {
                return Err(format!("{alg:?} can not be used for encryption"));
            }
        }

        Ok(())
    }
}

impl SecretKeyParams {
    pub fn generate<R: Rng + CryptoRng>(self, mut rng: R) -> Result<SignedSecretKey> {
        let key = rsa::generate_key(&mut rng, self.key_bits)?;
        let passphrase = Password::from(self.passphrase.as_str());

        let primary_key = packet::SecretKey::from_rsa(
            &mut rng,
            key,
            self.created_at,
            &passphrase,
            self.s2k_count,
        )?;
        debug!("generated primary key {:?}", primary_key);

        let mut keyflags = KeyFlags::default();
        keyflags.set_certify(self.can_certify);
        keyflags.set_encrypt_comms(self.can_encrypt);
        keyflags.set_encrypt_storage(self.can_encrypt);
        keyflags.set_sign(self.can_sign);

        let mut config = SignatureConfig::from_key(
            SignatureType::CertPositive,
            &primary_key,
            self.certification_hash,
        )?;
        config.hashed_subpackets.extend([
            Subpacket::regular(SubpacketData::KeyFlags(keyflags.into()))?,
            Subpacket::regular(SubpacketData::PreferredSymmetricAlgorithms(
                self.preferred_symmetric_algorithms,
            ))?,
            Subpacket::regular(SubpacketData::PreferredHashAlgorithms(
                self.preferred_hash_algorithms,
            ))?,
            Subpacket::regular(SubpacketData::PreferredCompressionAlgorithms(
                self.preferred_compression_algorithms,
            ))?,
            Subpacket::regular(SubpacketData::IsPrimary(true))?,
        ]);

        let id = UserId::from_str(&self.primary_user_id);
        let certification =
            config.sign_certification(&primary_key, &passphrase, Tag::UserId, &id)?;

        let user = SignedUser::new(id, vec![certification]);

        Ok(SignedSecretKey::new(
            primary_key,
            SignedKeyDetails::new(Vec::new(), vec![user]),
        ))
    }
}
