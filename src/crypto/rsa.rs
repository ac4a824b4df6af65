use log::debug;
use num_bigint::ModInverse;
use num_bigint::BigUint;
use rand::{CryptoRng, Rng};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::crypto::hash::HashAlgorithm;
use crate::errors::{Error, Result};
use crate::types::Mpi;

/// Largest modulus we accept from foreign keys.
pub(crate) const MAX_KEY_SIZE: usize = 16384;

/// Smallest modulus we generate.
pub const MIN_KEY_BITS: usize = 1024;

/// Generate an RSA key, with the primes ordered `p < q`.
pub fn generate_key<R: Rng + CryptoRng>(mut rng: R, bit_size: usize) -> Result<RsaPrivateKey> {
    if bit_size < MIN_KEY_BITS {
        return Err(Error::KeyGeneration {
            message: format!("RSA keys need at least {MIN_KEY_BITS} bits, got {bit_size}"),
        });
    }
    debug!("generating {} bit RSA key", bit_size);

    let key = RsaPrivateKey::new(&mut rng, bit_size).map_err(|err| Error::KeyGeneration {
        message: err.to_string(),
    })?;

    let primes = key.primes();
    if primes.len() != 2 || primes[0] < primes[1] {
        return Ok(key);
    }

    let (n, e, d) = (key.n().clone(), key.e().clone(), key.d().clone());
    let primes = vec![primes[1].clone(), primes[0].clone()];
    RsaPrivateKey::from_components(n, e, d, primes).map_err(|err| Error::KeyGeneration {
        message: err.to_string(),
    })
}

/// Build a private key from its OpenPGP components.
pub(crate) fn private_key_from_parts(
    public: &RsaPublicKey,
    d: &Mpi,
    p: &Mpi,
    q: &Mpi,
) -> Result<RsaPrivateKey> {
    let key = RsaPrivateKey::from_components(
        public.n().clone(),
        public.e().clone(),
        d.into(),
        vec![p.into(), q.into()],
    )?;
    key.validate()?;

    Ok(key)
}

/// The OpenPGP CRT coefficient `u = p^-1 mod q`.
pub(crate) fn crt_coefficient(key: &RsaPrivateKey) -> Result<BigUint> {
    let [p, q] = key.primes() else {
        unsupported_err!("RSA keys with {} primes", key.primes().len());
    };

    p.clone()
        .mod_inverse(q)
        .and_then(|u| u.to_biguint())
        .ok_or_else(|| format_err!("invalid prime"))
}

/// RSA encryption using PKCS1v15 padding.
pub fn encrypt<R: CryptoRng + Rng>(
    mut rng: R,
    key: &RsaPublicKey,
    plaintext: &[u8],
) -> Result<Mpi> {
    debug!("RSA encrypt");
    let data = key.encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)?;

    Ok(Mpi::from_slice(&data))
}

/// RSA decryption using PKCS1v15 padding.
pub fn decrypt(key: &RsaPrivateKey, mpi: &Mpi) -> Result<Zeroizing<Vec<u8>>> {
    // leading zeros were stripped on the wire
    let ciphertext = mpi.to_padded(key.size())?;
    let m = key.decrypt(Pkcs1v15Encrypt, &ciphertext)?;

    Ok(Zeroizing::new(m))
}

/// Sign using RSA, with PKCS1v15 padding.
pub fn sign(key: &RsaPrivateKey, hash: HashAlgorithm, digest: &[u8]) -> Result<Mpi> {
    let sig = key.sign(hash.pkcs1v15_scheme()?, digest)?;

    Ok(Mpi::from_slice(&sig))
}

/// Verify a RSA, PKCS1v15 padded signature.
pub fn verify(key: &RsaPublicKey, hash: HashAlgorithm, hashed: &[u8], sig: &Mpi) -> Result<()> {
    let sig = sig.to_padded(key.size())?;
    key.verify(hash.pkcs1v15_scheme()?, hashed, &sig)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn test_generate_orders_primes() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let key = generate_key(&mut rng, 1024).unwrap();
        let primes = key.primes();
        assert!(primes[0] < primes[1]);

        let u = crt_coefficient(&key).unwrap();
        assert_eq!((&primes[0] * &u) % &primes[1], BigUint::from(1u32));
    }

    #[test]
    fn test_too_small() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let err = generate_key(&mut rng, 512).unwrap_err();
        assert!(matches!(err, Error::KeyGeneration { .. }));
    }

    #[test]
    fn test_encrypt_sign() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let key = generate_key(&mut rng, 1024).unwrap();
        let public = key.to_public_key();

        let ct = encrypt(&mut rng, &public, b"session key").unwrap();
        assert_eq!(&decrypt(&key, &ct).unwrap()[..], b"session key");

        let digest = HashAlgorithm::Sha256.digest(b"hello").unwrap();
        let sig = sign(&key, HashAlgorithm::Sha256, &digest).unwrap();
        verify(&public, HashAlgorithm::Sha256, &digest, &sig).unwrap();

        let other = HashAlgorithm::Sha256.digest(b"hellO").unwrap();
        assert!(verify(&public, HashAlgorithm::Sha256, &other, &sig).is_err());
    }
}
