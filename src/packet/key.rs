use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::Buf;
use chrono::{DateTime, SubsecRound, Utc};
use log::debug;
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::crypto::checksum;
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::crypto::rsa;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::packet::{PacketHeader, PacketTrait};
use crate::parsing::BufParsing;
use crate::ser::{time_to_u32, Serialize};
use crate::types::{
    DecryptionKey, EncryptionKey, Fingerprint, KeyDetails, KeyId, KeyVersion, Mpi, Password,
    PlainSecretParams, PublicParams, SecretParams, SigningKey, StringToKey, Tag, VerifyingKey,
};

/// Public-Key Packet
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-public-key-packet-formats>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublicKey {
    packet_header: PacketHeader,
    version: KeyVersion,
    algorithm: PublicKeyAlgorithm,
    created_at: DateTime<Utc>,
    public_params: PublicParams,
}

impl PublicKey {
    /// Create a new v4 `PublicKey` packet from underlying parameters.
    pub fn new(
        algorithm: PublicKeyAlgorithm,
        created_at: DateTime<Utc>,
        public_params: PublicParams,
    ) -> Self {
        let mut key = PublicKey {
            packet_header: PacketHeader::new_fixed(Tag::PublicKey, 0),
            version: KeyVersion::V4,
            algorithm,
            created_at: created_at.trunc_subsecs(0),
            public_params,
        };
        key.packet_header = PacketHeader::new_fixed(Tag::PublicKey, key.write_len());
        key
    }

    /// Parses a `PublicKey` packet from the given buffer.
    pub fn try_from_buf<B: Buf>(packet_header: PacketHeader, mut i: B) -> Result<Self> {
        let (version, algorithm, created_at) = parse_key_fields(&mut i)?;
        let public_params = PublicParams::try_from_buf(algorithm, &mut i)?;

        Ok(PublicKey {
            packet_header,
            version,
            algorithm,
            created_at,
            public_params,
        })
    }
}

/// Reads the fields in front of the key material, only v4 keys are supported.
fn parse_key_fields<B: Buf>(i: &mut B) -> Result<(KeyVersion, PublicKeyAlgorithm, DateTime<Utc>)> {
    let version = KeyVersion::from(i.read_u8()?);
    if version != KeyVersion::V4 {
        unsupported_err!("key version {:?}", version);
    }

    let created_at = i.read_be_u32()?;
    let created_at = DateTime::from_timestamp(i64::from(created_at), 0)
        .ok_or_else(|| format_err!("invalid key creation time"))?;
    let algorithm = PublicKeyAlgorithm::from(i.read_u8()?);

    Ok((version, algorithm, created_at))
}

impl Serialize for PublicKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.version.into())?;
        writer.write_u32::<BigEndian>(time_to_u32(&self.created_at))?;
        writer.write_u8(self.algorithm.into())?;
        self.public_params.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 4 + 1 + self.public_params.write_len()
    }
}

impl PacketTrait for PublicKey {
    fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }
}

impl KeyDetails for PublicKey {
    fn version(&self) -> KeyVersion {
        self.version
    }

    fn key_id(&self) -> KeyId {
        self.fingerprint().key_id()
    }

    fn fingerprint(&self) -> Fingerprint {
        let mut buf = Vec::with_capacity(3 + self.write_len());
        // writing into a vec does not fail
        let _ = self.serialize_for_hashing(&mut buf);

        Fingerprint::from(checksum::calculate_sha1(&buf))
    }

    fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    fn public_params(&self) -> &PublicParams {
        &self.public_params
    }

    fn serialize_for_hashing<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        let len = u16::try_from(self.write_len())?;
        writer.write_u8(0x99)?;
        writer.write_u16::<BigEndian>(len)?;
        self.to_writer(writer)
    }
}

impl VerifyingKey for PublicKey {
    fn verify(&self, hash: HashAlgorithm, hashed: &[u8], sig: &[Mpi]) -> Result<()> {
        ensure!(self.algorithm.can_sign(), "{:?} can not sign", self.algorithm);
        let [sig] = sig else {
            bail!("RSA signatures have exactly one MPI, found {}", sig.len());
        };

        rsa::verify(self.public_params.as_rsa()?, hash, hashed, sig)
    }
}

impl EncryptionKey for PublicKey {
    fn encrypt<R: CryptoRng + Rng>(&self, rng: R, plain: &[u8]) -> Result<Mpi> {
        ensure!(
            self.algorithm.can_encrypt(),
            "{:?} can not encrypt",
            self.algorithm
        );

        rsa::encrypt(rng, self.public_params.as_rsa()?, plain)
    }
}

/// Secret-Key Packet
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-secret-key-packet-formats>
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SecretKey {
    packet_header: PacketHeader,
    details: PublicKey,
    secret_params: SecretParams,
}

impl SecretKey {
    pub fn new(details: PublicKey, secret_params: SecretParams) -> Self {
        let mut key = SecretKey {
            packet_header: PacketHeader::new_fixed(Tag::SecretKey, 0),
            details,
            secret_params,
        };
        key.packet_header = PacketHeader::new_fixed(Tag::SecretKey, key.write_len());
        key
    }

    /// Creates a v4 RSA secret key packet, encrypting the material unless the passphrase is empty.
    pub fn from_rsa<R: CryptoRng + Rng>(
        mut rng: R,
        key: ::rsa::RsaPrivateKey,
        created_at: DateTime<Utc>,
        passphrase: &Password,
        s2k_count: u8,
    ) -> Result<Self> {
        let plain = PlainSecretParams::from(key);
        let details = PublicKey::new(PublicKeyAlgorithm::RSA, created_at, plain.public_params());

        let pw = passphrase.read();
        let secret_params = if pw.is_empty() {
            debug!("storing unprotected secret key");
            SecretParams::Plain(plain)
        } else {
            let s2k = StringToKey::new_iterated(&mut rng, HashAlgorithm::Sha256, s2k_count);
            SecretParams::Encrypted(plain.encrypt(
                &mut rng,
                &pw,
                SymmetricKeyAlgorithm::AES256,
                s2k,
            )?)
        };

        Ok(SecretKey::new(details, secret_params))
    }

    /// Parses a `SecretKey` packet from the given buffer.
    pub fn try_from_buf<B: Buf>(packet_header: PacketHeader, mut i: B) -> Result<Self> {
        let (version, algorithm, created_at) = parse_key_fields(&mut i)?;
        if !algorithm.is_rsa() {
            unsupported_err!("secret keys of type {:?}", algorithm);
        }

        let public_params = PublicParams::try_from_buf(algorithm, &mut i)?;
        let secret_params = SecretParams::try_from_buf(&mut i, &public_params)?;

        let mut details = PublicKey {
            packet_header,
            version,
            algorithm,
            created_at,
            public_params,
        };
        details.packet_header = PacketHeader::new_fixed(Tag::PublicKey, details.write_len());

        Ok(SecretKey {
            packet_header,
            details,
            secret_params,
        })
    }

    /// Returns the public half of this key, as a public key packet.
    pub fn public_key(&self) -> PublicKey {
        self.details.clone()
    }

    pub fn secret_params(&self) -> &SecretParams {
        &self.secret_params
    }

    /// Unlocks the secret material and runs `work` on it.
    ///
    /// Decrypted material only lives for the duration of the call and is zeroized on return.
    pub fn unlock<G, T>(&self, pw: &Password, work: G) -> Result<T>
    where
        G: FnOnce(&PlainSecretParams) -> Result<T>,
    {
        match &self.secret_params {
            SecretParams::Plain(params) => work(params),
            SecretParams::Encrypted(params) => {
                let pw = pw.read();
                let plain = params.unlock(&pw, &self.details.public_params)?;
                work(&plain)
            }
        }
    }
}

impl Serialize for SecretKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.details.to_writer(writer)?;
        self.secret_params.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        self.details.write_len() + self.secret_params.write_len()
    }
}

impl PacketTrait for SecretKey {
    fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }
}

impl KeyDetails for SecretKey {
    fn version(&self) -> KeyVersion {
        self.details.version()
    }

    fn key_id(&self) -> KeyId {
        self.details.key_id()
    }

    fn fingerprint(&self) -> Fingerprint {
        self.details.fingerprint()
    }

    fn algorithm(&self) -> PublicKeyAlgorithm {
        self.details.algorithm()
    }

    fn created_at(&self) -> &DateTime<Utc> {
        self.details.created_at()
    }

    fn public_params(&self) -> &PublicParams {
        self.details.public_params()
    }

    fn serialize_for_hashing<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.details.serialize_for_hashing(writer)
    }
}

impl VerifyingKey for SecretKey {
    fn verify(&self, hash: HashAlgorithm, hashed: &[u8], sig: &[Mpi]) -> Result<()> {
        self.details.verify(hash, hashed, sig)
    }
}

impl SigningKey for SecretKey {
    fn sign(&self, key_pw: &Password, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<Mpi>> {
        ensure!(
            self.algorithm().can_sign(),
            "{:?} can not sign",
            self.algorithm()
        );

        self.unlock(key_pw, |params| {
            let sig = rsa::sign(params.as_rsa(), hash, data)?;
            Ok(vec![sig])
        })
    }
}

impl DecryptionKey for SecretKey {
    fn decrypt(&self, key_pw: &Password, value: &Mpi) -> Result<Zeroizing<Vec<u8>>> {
        self.unlock(key_pw, |params| rsa::decrypt(params.as_rsa(), value))
    }
}
