//! Signed Secret and Public Key
//!
//! A transferable key is a primary key, direct key signatures and a list of user ids with
//! their certifications. Secret keys sign and decrypt, public keys verify and encrypt.
//!
//! Key blocks from other implementations may carry subkeys, user attributes, trust and
//! marker packets. Those are skipped with a warning, only the primary key is used.

use std::io;
use std::iter::Peekable;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

use crate::armor::{self, BlockType};
use crate::composed::{next_packet, ArmorOptions, Deserializable};
use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::Result;
use crate::packet::{self, Packet, PacketTrait, Signature, SignatureType, UserId};
use crate::ser::Serialize;
use crate::types::{
    DecryptionKey, EncryptionKey, Fingerprint, KeyDetails, KeyId, KeyVersion, Mpi, Password,
    PublicParams, SigningKey, Tag, VerifyingKey,
};

/// A user id and the certifications made over it.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SignedUser {
    pub id: UserId,
    pub signatures: Vec<Signature>,
}

impl SignedUser {
    pub fn new(id: UserId, signatures: Vec<Signature>) -> Self {
        let signatures = signatures
            .into_iter()
            .filter(|sig| {
                if !sig.is_certification() {
                    warn!(
                        "ignoring unexpected signature {:?} after User ID packet",
                        sig.typ()
                    );
                    false
                } else {
                    true
                }
            })
            .collect();

        SignedUser { id, signatures }
    }

    /// Is this user id flagged as the primary one by any of its certifications?
    pub fn is_primary(&self) -> bool {
        self.signatures.iter().any(Signature::is_primary)
    }

    /// Verifies the certifications issued by `key`. Third party certifications are skipped.
    ///
    /// Fails if there is no self-certification at all.
    pub fn verify(&self, key: &impl VerifyingKey) -> Result<()> {
        debug!("verify signed user {:?}", self.id);

        let key_id = key.key_id();
        let fingerprint = key.fingerprint();
        let mut verified = 0;

        for signature in &self.signatures {
            let issuers = signature.issuer();
            let fps = signature.issuer_fingerprint();
            let is_self = (issuers.is_empty() && fps.is_empty())
                || issuers.contains(&&key_id)
                || fps.contains(&&fingerprint);
            if !is_self {
                debug!("skipping third party certification by {:?}", issuers);
                continue;
            }

            signature.verify_certification(key, Tag::UserId, &self.id)?;
            verified += 1;
        }

        ensure!(verified > 0, "no self-certification for {:?}", self.id);

        Ok(())
    }
}

impl Serialize for SignedUser {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.id.to_writer_with_header(writer)?;
        for sig in &self.signatures {
            sig.to_writer_with_header(writer)?;
        }

        Ok(())
    }

    fn write_len(&self) -> usize {
        self.id.write_len_with_header()
            + self
                .signatures
                .iter()
                .map(|s| s.write_len_with_header())
                .sum::<usize>()
    }
}

/// Shared details between secret and public keys.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SignedKeyDetails {
    pub direct_signatures: Vec<Signature>,
    pub users: Vec<SignedUser>,
}

impl SignedKeyDetails {
    pub fn new(direct_signatures: Vec<Signature>, mut users: Vec<SignedUser>) -> Self {
        users.retain(|user| {
            if user.signatures.is_empty() {
                warn!("ignoring unsigned {:?}", user.id);
                false
            } else {
                true
            }
        });

        SignedKeyDetails {
            direct_signatures,
            users,
        }
    }

    /// The primary user, or the first one if none is flagged as primary.
    pub fn primary_user(&self) -> Option<&SignedUser> {
        self.users
            .iter()
            .find(|u| u.is_primary())
            .or_else(|| self.users.first())
    }

    /// Seconds after creation at which the key expires, if the self-signatures say so.
    pub fn key_expiration_time(&self) -> Option<u32> {
        self.users
            .iter()
            .flat_map(|user| &user.signatures)
            .filter_map(|sig| sig.key_expiration_time())
            .max()
    }

    /// Verifies all self-signatures against `key`.
    pub fn verify(&self, key: &impl VerifyingKey) -> Result<()> {
        ensure!(!self.users.is_empty(), "key has no user ids");

        for user in &self.users {
            user.verify(key)?;
        }

        for sig in &self.direct_signatures {
            match sig.typ() {
                SignatureType::Key => sig.verify_key(key)?,
                typ => debug!("not verifying direct signature {:?}", typ),
            }
        }

        Ok(())
    }

    /// Reads direct signatures and users, up to the next primary key.
    fn from_packets<I: Iterator<Item = Result<Packet>>>(packets: &mut Peekable<I>) -> Result<Self> {
        let mut direct_signatures = Vec::new();
        let mut users: Vec<(UserId, Vec<Signature>)> = Vec::new();
        // set while reading packets that belong to a skipped component
        let mut skipping = false;

        loop {
            if matches!(
                packets.peek(),
                None | Some(Ok(Packet::PublicKey(_))) | Some(Ok(Packet::SecretKey(_)))
            ) {
                break;
            }

            match next_packet(packets)? {
                Packet::Signature(sig) => {
                    if skipping {
                        debug!("skipping {:?} signature of ignored component", sig.typ());
                    } else if let Some((_, sigs)) = users.last_mut() {
                        sigs.push(sig);
                    } else {
                        direct_signatures.push(sig);
                    }
                }
                Packet::UserId(id) => {
                    skipping = false;
                    users.push((id, Vec::new()));
                }
                Packet::Other(other) => match other.tag() {
                    Tag::PublicSubkey | Tag::SecretSubkey | Tag::UserAttribute => {
                        warn!("ignoring {:?} packet and its signatures", other.tag());
                        skipping = true;
                    }
                    Tag::PublicKey | Tag::SecretKey => {
                        warn!("ignoring unsupported key following the primary key");
                        break;
                    }
                    tag => warn!("ignoring {:?} packet in key", tag),
                },
                packet => bail!("unexpected packet {:?} in key", packet.tag()),
            }
        }

        let users = users
            .into_iter()
            .map(|(id, sigs)| SignedUser::new(id, sigs))
            .collect();

        Ok(SignedKeyDetails::new(direct_signatures, users))
    }
}

impl Serialize for SignedKeyDetails {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        for sig in &self.direct_signatures {
            sig.to_writer_with_header(writer)?;
        }
        self.users.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        self.direct_signatures
            .iter()
            .map(|s| s.write_len_with_header())
            .sum::<usize>()
            + self.users.write_len()
    }
}

/// Reads the primary key packet, skipping leading marker and trust packets.
fn read_primary<I: Iterator<Item = Result<Packet>>>(packets: &mut Peekable<I>) -> Result<Packet> {
    loop {
        let packet = next_packet(packets)?;
        match &packet {
            Packet::Other(other) if other.tag().is_ignorable() => {
                warn!("skipping {:?} packet before primary key", other.tag());
            }
            Packet::Other(other) if matches!(other.tag(), Tag::PublicKey | Tag::SecretKey) => {
                unsupported_err!("primary key packet: {:?}", other.tag());
            }
            _ => return Ok(packet),
        }
    }
}

/// Warns about anything left after a key.
fn drain_rest<I: Iterator<Item = Result<Packet>>>(packets: Peekable<I>) {
    let rest = packets.count();
    if rest > 0 {
        warn!("ignoring {} packets after the first key", rest);
    }
}

/// Represents a Public PGP key, which is signed and either received or ready to be transferred.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SignedPublicKey {
    pub primary_key: packet::PublicKey,
    pub details: SignedKeyDetails,
}

impl SignedPublicKey {
    pub fn new(primary_key: packet::PublicKey, details: SignedKeyDetails) -> Self {
        SignedPublicKey {
            primary_key,
            details,
        }
    }

    /// The user id of the primary user.
    pub fn primary_user_id(&self) -> Option<&UserId> {
        self.details.primary_user().map(|u| &u.id)
    }

    /// Verifies the self-signatures that bind the user ids to the primary key.
    pub fn verify_bindings(&self) -> Result<()> {
        debug!("verifying bindings of {:?}", self.key_id());
        self.details.verify(&self.primary_key)
    }

    /// Is the key expired at `now`?
    pub fn is_expired(&self, now: &DateTime<Utc>) -> bool {
        match self.details.key_expiration_time() {
            Some(0) | None => false,
            Some(secs) => {
                *self.created_at() + chrono::Duration::seconds(i64::from(secs)) < *now
            }
        }
    }

    pub fn to_armored_writer(
        &self,
        writer: &mut impl io::Write,
        opts: ArmorOptions<'_>,
    ) -> Result<()> {
        armor::write(
            self,
            BlockType::PublicKey,
            writer,
            opts.headers,
            opts.include_checksum,
        )
    }

    pub fn to_armored_bytes(&self, opts: ArmorOptions<'_>) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_armored_writer(&mut buf, opts)?;

        Ok(buf)
    }

    pub fn to_armored_string(&self, opts: ArmorOptions<'_>) -> Result<String> {
        let res = String::from_utf8(self.to_armored_bytes(opts)?).map_err(|e| e.utf8_error())?;
        Ok(res)
    }
}

impl Deserializable for SignedPublicKey {
    fn from_packets<I: Iterator<Item = Result<Packet>>>(mut packets: Peekable<I>) -> Result<Self> {
        let primary_key = match read_primary(&mut packets)? {
            Packet::PublicKey(key) => key,
            // the public half of a secret key block
            Packet::SecretKey(key) => key.public_key(),
            packet => bail!("expected a primary key, found {:?}", packet.tag()),
        };
        let details = SignedKeyDetails::from_packets(&mut packets)?;
        drain_rest(packets);

        Ok(SignedPublicKey::new(primary_key, details))
    }

    fn matches_block_type(typ: BlockType) -> bool {
        matches!(
            typ,
            BlockType::PublicKey | BlockType::PrivateKey | BlockType::File
        )
    }
}

impl Serialize for SignedPublicKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.primary_key.to_writer_with_header(writer)?;
        self.details.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        self.primary_key.write_len_with_header() + self.details.write_len()
    }
}

impl KeyDetails for SignedPublicKey {
    fn version(&self) -> KeyVersion {
        self.primary_key.version()
    }

    fn key_id(&self) -> KeyId {
        self.primary_key.key_id()
    }

    fn fingerprint(&self) -> Fingerprint {
        self.primary_key.fingerprint()
    }

    fn algorithm(&self) -> PublicKeyAlgorithm {
        self.primary_key.algorithm()
    }

    fn created_at(&self) -> &DateTime<Utc> {
        self.primary_key.created_at()
    }

    fn public_params(&self) -> &PublicParams {
        self.primary_key.public_params()
    }

    fn serialize_for_hashing<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.primary_key.serialize_for_hashing(writer)
    }
}

impl VerifyingKey for SignedPublicKey {
    fn verify(&self, hash: HashAlgorithm, hashed: &[u8], sig: &[Mpi]) -> Result<()> {
        self.primary_key.verify(hash, hashed, sig)
    }
}

impl EncryptionKey for SignedPublicKey {
    fn encrypt<R: CryptoRng + Rng>(&self, rng: R, plain: &[u8]) -> Result<Mpi> {
        self.primary_key.encrypt(rng, plain)
    }
}

/// Represents a secret signed PGP key.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SignedSecretKey {
    pub primary_key: packet::SecretKey,
    pub details: SignedKeyDetails,
}

impl SignedSecretKey {
    pub fn new(primary_key: packet::SecretKey, details: SignedKeyDetails) -> Self {
        SignedSecretKey {
            primary_key,
            details,
        }
    }

    /// The user id of the primary user.
    pub fn primary_user_id(&self) -> Option<&UserId> {
        self.details.primary_user().map(|u| &u.id)
    }

    /// The identity string of the primary user, empty if the key has no user ids.
    pub fn identity(&self) -> String {
        self.primary_user_id()
            .map(|id| String::from_utf8_lossy(id.id()).into_owned())
            .unwrap_or_default()
    }

    /// The transferable public key of this secret key.
    pub fn public_key(&self) -> SignedPublicKey {
        SignedPublicKey::new(self.primary_key.public_key(), self.details.clone())
    }

    /// Verifies the self-signatures that bind the user ids to the primary key.
    pub fn verify_bindings(&self) -> Result<()> {
        debug!("verifying bindings of {:?}", self.key_id());
        self.details.verify(&self.primary_key)
    }

    /// The armored `PGP PUBLIC KEY BLOCK` of this key.
    pub fn public_key_block(&self) -> Result<String> {
        self.public_key().to_armored_string(ArmorOptions::default())
    }

    /// The armored `PGP PRIVATE KEY BLOCK` of this key.
    pub fn secret_key_block(&self) -> Result<Zeroizing<String>> {
        self.to_armored_string(ArmorOptions::default())
            .map(Zeroizing::new)
    }

    pub fn to_armored_writer(
        &self,
        writer: &mut impl io::Write,
        opts: ArmorOptions<'_>,
    ) -> Result<()> {
        armor::write(
            self,
            BlockType::PrivateKey,
            writer,
            opts.headers,
            opts.include_checksum,
        )
    }

    pub fn to_armored_bytes(&self, opts: ArmorOptions<'_>) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_armored_writer(&mut buf, opts)?;

        Ok(buf)
    }

    pub fn to_armored_string(&self, opts: ArmorOptions<'_>) -> Result<String> {
        let res = String::from_utf8(self.to_armored_bytes(opts)?).map_err(|e| e.utf8_error())?;
        Ok(res)
    }
}

impl Deserializable for SignedSecretKey {
    fn from_packets<I: Iterator<Item = Result<Packet>>>(mut packets: Peekable<I>) -> Result<Self> {
        let primary_key = match read_primary(&mut packets)? {
            Packet::SecretKey(key) => key,
            packet => bail!("expected a secret key, found {:?}", packet.tag()),
        };
        let details = SignedKeyDetails::from_packets(&mut packets)?;
        drain_rest(packets);

        Ok(SignedSecretKey::new(primary_key, details))
    }

    fn matches_block_type(typ: BlockType) -> bool {
        matches!(typ, BlockType::PrivateKey | BlockType::File)
    }
}

impl Serialize for SignedSecretKey {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.primary_key.to_writer_with_header(writer)?;
        self.details.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        self.primary_key.write_len_with_header() + self.details.write_len()
    }
}

impl KeyDetails for SignedSecretKey {
    fn version(&self) -> KeyVersion {
        self.primary_key.version()
    }

    fn key_id(&self) -> KeyId {
        self.primary_key.key_id()
    }

    fn fingerprint(&self) -> Fingerprint {
        self.primary_key.fingerprint()
    }

    fn algorithm(&self) -> PublicKeyAlgorithm {
        self.primary_key.algorithm()
    }

    fn created_at(&self) -> &DateTime<Utc> {
        self.primary_key.created_at()
    }

    fn public_params(&self) -> &PublicParams {
        self.primary_key.public_params()
    }

    fn serialize_for_hashing<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.primary_key.serialize_for_hashing(writer)
    }
}

impl VerifyingKey for SignedSecretKey {
    fn verify(&self, hash: HashAlgorithm, hashed: &[u8], sig: &[Mpi]) -> Result<()> {
        self.primary_key.verify(hash, hashed, sig)
    }
}

impl SigningKey for SignedSecretKey {
    fn sign(&self, key_pw: &Password, hash: HashAlgorithm, data: &[u8]) -> Result<Vec<Mpi>> {
        self.primary_key.sign(key_pw, hash, data)
    }
}

impl DecryptionKey for SignedSecretKey {
    fn decrypt(&self, key_pw: &Password, value: &Mpi) -> Result<Zeroizing<Vec<u8>>> {
        self.primary_key.decrypt(key_pw, value)
    }
}
