//! # Engine
//!
//! The message engine composes keys, packets and armor into the public operations:
//! key generation, encryption, signing, decryption and verification.
//!
//! The engine holds nothing but its [`EngineConfig`], so a single value can be shared
//! between threads. All operations work on complete in-memory buffers, the `*_file`
//! variants read their input from and write their output to the file system.
//!
//! ```no_run
//! use pgp_engine::{Engine, EngineConfigBuilder, HashAlgorithm};
//!
//! # fn main() -> pgp_engine::errors::Result<()> {
//! let engine = Engine::new(
//!     EngineConfigBuilder::default()
//!         .hash_algorithm(HashAlgorithm::Sha512)
//!         .build()?,
//! );
//!
//! let alice = engine.generate_key("Alice <alice@example.org>", &"secret".into())?;
//! let ciphertext = engine.encrypt_and_sign(
//!     b"The quick brown fox jumps over the lazy dog",
//!     &[&alice.public_key()],
//!     &alice,
//!     &"secret".into(),
//! )?;
//! let plaintext =
//!     engine.decrypt_and_verify(&ciphertext, &alice.public_key(), &alice, &"secret".into())?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use derive_builder::Builder;
use log::debug;
use rand::{thread_rng, CryptoRng, Rng};

use crate::composed::{
    ArmorOptions, Deserializable, DetachedSignature, Message, SecretKeyParamsBuilder,
    SignedPublicKey, SignedSecretKey, VerificationResult,
};
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::rsa::MIN_KEY_BITS;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::{Error, Result};
use crate::ser::Serialize;
use crate::types::{CompressionAlgorithm, KeyDetails, Password, DEFAULT_ITER_SALTED_COUNT};

/// A generated key pair: the secret key, its public half and the certified identity.
pub type KeyPair = SignedSecretKey;

/// Immutable configuration of an [`Engine`].
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(build_fn(validate = "Self::validate", error = "Error"))]
pub struct EngineConfig {
    /// Hash used for new signatures.
    #[builder(default = "HashAlgorithm::Sha256")]
    pub hash_algorithm: HashAlgorithm,
    /// Cipher used for new messages.
    #[builder(default = "SymmetricKeyAlgorithm::AES256")]
    pub symmetric_algorithm: SymmetricKeyAlgorithm,
    /// Compression applied to the inner packets of new messages.
    #[builder(default)]
    pub compression: CompressionAlgorithm,
    /// Emit ASCII armor instead of binary packets.
    #[builder(default = "true")]
    pub armor: bool,
    /// RSA modulus size for generated keys.
    #[builder(default = "2048")]
    pub key_bits: usize,
    /// Coded S2K iteration count protecting generated secret keys.
    #[builder(default = "DEFAULT_ITER_SALTED_COUNT")]
    pub s2k_count: u8,
    /// File name recorded in literal data packets.
    #[builder(default, setter(into))]
    pub file_name: String,
}

impl EngineConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if let Some(bits) = self.key_bits {
            if bits < MIN_KEY_BITS {
                return Err(format!(
                    "RSA keys need at least {MIN_KEY_BITS} bits, got {bits}"
                ));
            }
        }
        if let Some(alg) = self.symmetric_algorithm {
            if !alg.is_supported() {
                return Err(format!("{alg:?} can not be used for encryption"));
            }
        }
        if let Some(hash) = self.hash_algorithm {
            if !HashAlgorithm::SUPPORTED.contains(&hash) {
                return Err(format!("{hash} can not be used for signing"));
            }
        }
        if let Some(
            alg @ (CompressionAlgorithm::BZip2 | CompressionAlgorithm::Other(_)),
        ) = self.compression
        {
            return Err(format!("compression with {alg:?} is not supported"));
        }
        if let Some(name) = &self.file_name {
            if name.len() > 255 {
                return Err("file name is too long".into());
            }
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            hash_algorithm: HashAlgorithm::Sha256,
            symmetric_algorithm: SymmetricKeyAlgorithm::AES256,
            compression: CompressionAlgorithm::Uncompressed,
            armor: true,
            key_bits: 2048,
            s2k_count: DEFAULT_ITER_SALTED_COUNT,
            file_name: String::new(),
        }
    }
}

/// OpenPGP message engine.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generates a new key pair for `identity`, protected by `passphrase`.
    ///
    /// An empty passphrase leaves the secret material unprotected.
    pub fn generate_key(&self, identity: &str, passphrase: &Password) -> Result<KeyPair> {
        self.generate_key_with_rng(thread_rng(), identity, passphrase)
    }

    pub fn generate_key_with_rng<R: CryptoRng + Rng>(
        &self,
        rng: R,
        identity: &str,
        passphrase: &Password,
    ) -> Result<KeyPair> {
        let passphrase = String::from_utf8(passphrase.read().to_vec())
            .map_err(|e| e.utf8_error())?;

        let params = SecretKeyParamsBuilder::default()
            .key_bits(self.config.key_bits)
            .primary_user_id(identity)
            .passphrase(passphrase)
            .s2k_count(self.config.s2k_count)
            .preferred_hash_algorithms(vec![self.config.hash_algorithm])
            .preferred_symmetric_algorithms(vec![self.config.symmetric_algorithm])
            .build()
            .map_err(|err| Error::KeyGeneration {
                message: err.to_string(),
            })?;

        let key = params.generate(rng)?;
        debug!("generated key {:?} for {}", key.key_id(), identity);

        Ok(key)
    }

    /// Encrypts `plaintext` to every recipient.
    pub fn encrypt(&self, plaintext: &[u8], recipients: &[&SignedPublicKey]) -> Result<Vec<u8>> {
        self.encrypt_with_rng(thread_rng(), plaintext, recipients)
    }

    pub fn encrypt_with_rng<R: CryptoRng + Rng>(
        &self,
        rng: R,
        plaintext: &[u8],
        recipients: &[&SignedPublicKey],
    ) -> Result<Vec<u8>> {
        let msg = self.compress(self.literal(plaintext)?)?;
        let msg = msg.encrypt_to_keys(rng, self.config.symmetric_algorithm, recipients)?;

        self.write_message(&msg)
    }

    /// Produces a one pass signed message over `content`.
    pub fn sign(
        &self,
        content: &[u8],
        signer: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<Vec<u8>> {
        let msg = self
            .literal(content)?
            .sign(signer, passphrase, self.config.hash_algorithm)?;
        let msg = self.compress(msg)?;

        self.write_message(&msg)
    }

    /// Produces a detached signature over `content`.
    pub fn sign_detached(
        &self,
        content: &[u8],
        signer: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<Vec<u8>> {
        let sig = DetachedSignature::sign_binary_data(
            signer,
            passphrase,
            self.config.hash_algorithm,
            content,
        )?;

        if self.config.armor {
            sig.to_armored_bytes(ArmorOptions::default())
        } else {
            sig.to_bytes()
        }
    }

    /// Signs `plaintext` and encrypts the signed message to every recipient.
    pub fn encrypt_and_sign(
        &self,
        plaintext: &[u8],
        recipients: &[&SignedPublicKey],
        signer: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<Vec<u8>> {
        self.encrypt_and_sign_with_rng(thread_rng(), plaintext, recipients, signer, passphrase)
    }

    pub fn encrypt_and_sign_with_rng<R: CryptoRng + Rng>(
        &self,
        rng: R,
        plaintext: &[u8],
        recipients: &[&SignedPublicKey],
        signer: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<Vec<u8>> {
        let msg = self
            .literal(plaintext)?
            .sign(signer, passphrase, self.config.hash_algorithm)?;
        let msg = self.compress(msg)?;
        let msg = msg.encrypt_to_keys(rng, self.config.symmetric_algorithm, recipients)?;

        self.write_message(&msg)
    }

    /// Decrypts `ciphertext`, ignoring any signature.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        key: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<Vec<u8>> {
        let msg = self.decrypt_message(ciphertext, key, passphrase)?;
        content(&msg)
    }

    /// Decrypts `ciphertext` and returns the decompressed inner message.
    pub fn decrypt_message(
        &self,
        ciphertext: &[u8],
        key: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<Message> {
        let (msg, _) = Message::from_slice(ciphertext)?;
        ensure!(msg.is_encrypted(), "message is not encrypted");

        let inner = msg.decrypt(key, passphrase)?.decompress()?;
        debug!("decrypted message with {:?}", key.key_id());

        Ok(inner)
    }

    /// Decrypts `ciphertext` and requires a valid signature by `signer`.
    pub fn decrypt_and_verify(
        &self,
        ciphertext: &[u8],
        signer: &SignedPublicKey,
        key: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<Vec<u8>> {
        let msg = self.decrypt_message(ciphertext, key, passphrase)?;
        if !msg.is_signed() {
            return Err(Error::NotSigned);
        }

        msg.verify(signer).map_err(|err| {
            debug!("verification failed: {:?}", err);
            Error::VerificationFailed {
                key_id: signer.key_id(),
            }
        })?;

        content(&msg)
    }

    /// Checks a signed message.
    ///
    /// Returns `false` for unsigned messages and signatures that do not validate.
    /// An encrypted message verifies when it is addressed to `signer`.
    pub fn verify(&self, content: &[u8], signer: &SignedPublicKey) -> Result<bool> {
        Ok(self.verification(content, signer)?.verified)
    }

    /// Like [`Engine::verify`], also reporting whether a signature was present and its issuer.
    pub fn verification(
        &self,
        content: &[u8],
        signer: &SignedPublicKey,
    ) -> Result<VerificationResult> {
        let (msg, _) = Message::from_slice(content)?;
        msg.verification(signer)
    }

    /// Checks `content` against a detached signature.
    pub fn verify_detached(
        &self,
        content: &[u8],
        signature: &[u8],
        signer: &SignedPublicKey,
    ) -> Result<bool> {
        let (sig, _) = DetachedSignature::from_slice(signature)?;

        match sig.verify(signer, content) {
            Ok(()) => Ok(true),
            Err(err) => {
                debug!("detached signature did not verify: {:?}", err);
                Ok(false)
            }
        }
    }

    pub fn encrypt_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        recipients: &[&SignedPublicKey],
    ) -> Result<()> {
        let plaintext = std::fs::read(input)?;
        let ciphertext = self.encrypt(&plaintext, recipients)?;
        std::fs::write(output, ciphertext)?;

        Ok(())
    }

    pub fn sign_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        signer: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<()> {
        let content = std::fs::read(input)?;
        let signed = self.sign(&content, signer, passphrase)?;
        std::fs::write(output, signed)?;

        Ok(())
    }

    pub fn sign_detached_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        signer: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<()> {
        let content = std::fs::read(input)?;
        let signature = self.sign_detached(&content, signer, passphrase)?;
        std::fs::write(output, signature)?;

        Ok(())
    }

    pub fn encrypt_and_sign_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        recipients: &[&SignedPublicKey],
        signer: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<()> {
        let plaintext = std::fs::read(input)?;
        let ciphertext = self.encrypt_and_sign(&plaintext, recipients, signer, passphrase)?;
        std::fs::write(output, ciphertext)?;

        Ok(())
    }

    pub fn decrypt_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        key: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<()> {
        let ciphertext = std::fs::read(input)?;
        let plaintext = self.decrypt(&ciphertext, key, passphrase)?;
        std::fs::write(output, plaintext)?;

        Ok(())
    }

    pub fn decrypt_and_verify_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        signer: &SignedPublicKey,
        key: &SignedSecretKey,
        passphrase: &Password,
    ) -> Result<()> {
        let ciphertext = std::fs::read(input)?;
        let plaintext = self.decrypt_and_verify(&ciphertext, signer, key, passphrase)?;
        std::fs::write(output, plaintext)?;

        Ok(())
    }

    pub fn verify_file(&self, input: impl AsRef<Path>, signer: &SignedPublicKey) -> Result<bool> {
        let content = std::fs::read(input)?;
        self.verify(&content, signer)
    }

    pub fn verify_detached_file(
        &self,
        input: impl AsRef<Path>,
        signature: impl AsRef<Path>,
        signer: &SignedPublicKey,
    ) -> Result<bool> {
        let content = std::fs::read(input)?;
        let signature = std::fs::read(signature)?;
        self.verify_detached(&content, &signature, signer)
    }

    fn literal(&self, content: &[u8]) -> Result<Message> {
        Message::new_literal_bytes(&self.config.file_name, content)
    }

    fn compress(&self, msg: Message) -> Result<Message> {
        match self.config.compression {
            CompressionAlgorithm::Uncompressed => Ok(msg),
            alg => msg.compress(alg),
        }
    }

    fn write_message(&self, msg: &Message) -> Result<Vec<u8>> {
        if self.config.armor {
            msg.to_armored_bytes(ArmorOptions::default())
        } else {
            msg.to_bytes()
        }
    }
}

/// The literal content of a decrypted message.
fn content(msg: &Message) -> Result<Vec<u8>> {
    msg.get_content()?
        .ok_or_else(|| format_err!("message contains no literal data"))
}
