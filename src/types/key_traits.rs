use std::io;

use chrono::{DateTime, Utc};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::Result;
use crate::types::{Fingerprint, KeyId, KeyVersion, Mpi, Password, PublicParams};

/// Metadata of a key packet
pub trait KeyDetails: std::fmt::Debug {
    /// Returns the [`KeyVersion`] of this key.
    fn version(&self) -> KeyVersion;

    /// Returns the [`KeyId`] for this key.
    fn key_id(&self) -> KeyId;

    /// Returns the [`Fingerprint`] for this key.
    fn fingerprint(&self) -> Fingerprint;

    /// Returns the algorithm for this key.
    fn algorithm(&self) -> PublicKeyAlgorithm;

    fn created_at(&self) -> &DateTime<Utc>;

    /// Returns the parameters for the public portion of this key.
    fn public_params(&self) -> &PublicParams;

    /// Writes the public key the way it is hashed for fingerprints and signatures:
    /// `0x99`, a two octet length, and the public key packet body.
    fn serialize_for_hashing<W: io::Write>(&self, writer: &mut W) -> Result<()>;
}

/// Keys that can verify signatures.
pub trait VerifyingKey: KeyDetails {
    /// Verify a signed message.
    /// `hashed` is the digest of the signed data, calculated with `hash`.
    fn verify(&self, hash: HashAlgorithm, hashed: &[u8], sig: &[Mpi]) -> Result<()>;
}

/// Keys that can sign data.
///
/// Contains private data.
pub trait SigningKey: KeyDetails {
    /// Create a raw cryptographic signature over the digest `data`.
    fn sign(&self, key_pw: &Password, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<Mpi>>;
}

/// Keys that can encrypt plain data (i.e. a session key) into data for a PKESK.
pub trait EncryptionKey: KeyDetails {
    fn encrypt<R: CryptoRng + Rng>(&self, rng: R, plain: &[u8]) -> Result<Mpi>;
}

/// Keys that can decrypt the session key data of a PKESK.
pub trait DecryptionKey: KeyDetails {
    fn decrypt(&self, key_pw: &Password, value: &Mpi) -> Result<Zeroizing<Vec<u8>>>;
}

impl<T: KeyDetails> KeyDetails for &T {
    fn version(&self) -> KeyVersion {
        (*self).version()
    }

    fn key_id(&self) -> KeyId {
        (*self).key_id()
    }

    fn fingerprint(&self) -> Fingerprint {
        (*self).fingerprint()
    }

    fn algorithm(&self) -> PublicKeyAlgorithm {
        (*self).algorithm()
    }

    fn created_at(&self) -> &DateTime<Utc> {
        (*self).created_at()
    }

    fn public_params(&self) -> &PublicParams {
        (*self).public_params()
    }

    fn serialize_for_hashing<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        (*self).serialize_for_hashing(writer)
    }
}

impl<T: VerifyingKey> VerifyingKey for &T {
    fn verify(&self, hash: HashAlgorithm, hashed: &[u8], sig: &[Mpi]) -> Result<()> {
        (*self).verify(hash, hashed, sig)
    }
}

impl<T: SigningKey> SigningKey for &T {
    fn sign(&self, key_pw: &Password, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<Mpi>> {
        (*self).sign(key_pw, hash, data)
    }
}

impl<T: EncryptionKey> EncryptionKey for &T {
    fn encrypt<R: CryptoRng + Rng>(&self, rng: R, plain: &[u8]) -> Result<Mpi> {
        (*self).encrypt(rng, plain)
    }
}

impl<T: DecryptionKey> DecryptionKey for &T {
    fn decrypt(&self, key_pw: &Password, value: &Mpi) -> Result<Zeroizing<Vec<u8>>> {
        (*self).decrypt(key_pw, value)
    }
}
