use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use chrono::{DateTime, SubsecRound, Utc};
use log::warn;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::sym::SymmetricKeyAlgorithm;
use crate::errors::Result;
use crate::parsing::BufParsing;
use crate::ser::{time_to_u32, Serialize};
use crate::types::{CompressionAlgorithm, Fingerprint, KeyId};

/// Available signature subpacket types
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SubpacketType {
    SignatureCreationTime,
    SignatureExpirationTime,
    KeyExpirationTime,
    PreferredSymmetricAlgorithms,
    Issuer,
    PreferredHashAlgorithms,
    PreferredCompressionAlgorithms,
    PrimaryUserId,
    KeyFlags,
    Features,
    IssuerFingerprint,
    Other(u8),
}

impl SubpacketType {
    pub fn as_u8(&self, is_critical: bool) -> u8 {
        let raw: u8 = match self {
            SubpacketType::SignatureCreationTime => 2,
            SubpacketType::SignatureExpirationTime => 3,
            SubpacketType::KeyExpirationTime => 9,
            SubpacketType::PreferredSymmetricAlgorithms => 11,
            SubpacketType::Issuer => 16,
            SubpacketType::PreferredHashAlgorithms => 21,
            SubpacketType::PreferredCompressionAlgorithms => 22,
            SubpacketType::PrimaryUserId => 25,
            SubpacketType::KeyFlags => 27,
            SubpacketType::Features => 30,
            SubpacketType::IssuerFingerprint => 33,
            SubpacketType::Other(n) => *n,
        };

        if is_critical {
            // set critical bit
            raw | 0b1000_0000
        } else {
            raw
        }
    }

    #[inline]
    pub fn from_u8(n: u8) -> (Self, bool) {
        let is_critical = (n >> 7) == 1;
        // remove critical bit
        let n = n & 0b0111_1111;

        let m = match n {
            2 => SubpacketType::SignatureCreationTime,
            3 => SubpacketType::SignatureExpirationTime,
            9 => SubpacketType::KeyExpirationTime,
            11 => SubpacketType::PreferredSymmetricAlgorithms,
            16 => SubpacketType::Issuer,
            21 => SubpacketType::PreferredHashAlgorithms,
            22 => SubpacketType::PreferredCompressionAlgorithms,
            25 => SubpacketType::PrimaryUserId,
            27 => SubpacketType::KeyFlags,
            30 => SubpacketType::Features,
            33 => SubpacketType::IssuerFingerprint,
            _ => SubpacketType::Other(n),
        };

        (m, is_critical)
    }
}

/// Encoded length of a subpacket, covering the type octet and the body.
///
/// The original encoding is kept, so parsed signatures hash exactly as they were signed.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SubpacketLength {
    One(u8),
    Two(u16),
    Five(u32),
}

impl SubpacketLength {
    /// Shortest encoding for `len`.
    pub fn encode(len: usize) -> Result<Self> {
        if len < 192 {
            Ok(SubpacketLength::One(len as u8))
        } else if len < 8384 {
            Ok(SubpacketLength::Two(len as u16))
        } else {
            Ok(SubpacketLength::Five(u32::try_from(len)?))
        }
    }

    pub fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let olen = i.read_u8()?;
        let len = match olen {
            0..=191 => SubpacketLength::One(olen),
            192..=223 => {
                let a = i.read_u8()?;
                let l = ((u16::from(olen) - 192) << 8) + 192 + u16::from(a);
                SubpacketLength::Two(l)
            }
            255 => SubpacketLength::Five(i.read_be_u32()?),
            _ => bail!("invalid subpacket length octet {}", olen),
        };
        Ok(len)
    }

    pub fn len(&self) -> usize {
        match self {
            SubpacketLength::One(l) => usize::from(*l),
            SubpacketLength::Two(l) => usize::from(*l),
            SubpacketLength::Five(l) => *l as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for SubpacketLength {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            SubpacketLength::One(l) => writer.write_u8(*l)?,
            SubpacketLength::Two(l) => {
                let l = l - 192;
                writer.write_u8(((l >> 8) + 192) as u8)?;
                writer.write_u8((l & 0xFF) as u8)?;
            }
            SubpacketLength::Five(l) => {
                writer.write_u8(255)?;
                writer.write_u32::<BigEndian>(*l)?;
            }
        }
        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            SubpacketLength::One(_) => 1,
            SubpacketLength::Two(_) => 2,
            SubpacketLength::Five(_) => 5,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Subpacket {
    pub is_critical: bool,
    pub data: SubpacketData,
    len: SubpacketLength,
}

impl Subpacket {
    /// Construct a new regular subpacket.
    pub fn regular(data: SubpacketData) -> Result<Self> {
        let len = SubpacketLength::encode(1 + data.write_len())?;
        Ok(Subpacket {
            is_critical: false,
            data,
            len,
        })
    }

    /// Construct a new critical subpacket.
    pub fn critical(data: SubpacketData) -> Result<Self> {
        let len = SubpacketLength::encode(1 + data.write_len())?;
        Ok(Subpacket {
            is_critical: true,
            data,
            len,
        })
    }

    pub fn typ(&self) -> SubpacketType {
        self.data.typ()
    }

    /// Parses a single subpacket, including its length.
    pub fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let len = SubpacketLength::from_buf(&mut i)?;
        ensure!(!len.is_empty(), "empty subpacket");

        let mut body = i.read_take(len.len())?;
        let (typ, is_critical) = SubpacketType::from_u8(body.read_u8()?);
        let data = SubpacketData::from_body(typ, body)?;

        Ok(Subpacket {
            is_critical,
            data,
            len,
        })
    }

    /// Parses a full subpacket area.
    pub fn from_area(mut i: Bytes) -> Result<Vec<Self>> {
        let mut packets = Vec::new();
        while i.has_remaining() {
            packets.push(Subpacket::from_buf(&mut i)?);
        }
        Ok(packets)
    }
}

impl Serialize for Subpacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.len.to_writer(writer)?;
        writer.write_u8(self.typ().as_u8(self.is_critical))?;
        self.data.to_writer(writer)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        self.len.write_len() + 1 + self.data.write_len()
    }
}

#[derive(derive_more::Debug, PartialEq, Eq, Clone)]
pub enum SubpacketData {
    /// The time the signature was made.
    SignatureCreationTime(DateTime<Utc>),
    /// Seconds after creation at which the signature expires.
    SignatureExpirationTime(u32),
    /// Seconds after key creation at which the key expires.
    KeyExpirationTime(u32),
    /// The OpenPGP Key ID of the key issuing the signature.
    Issuer(KeyId),
    PreferredSymmetricAlgorithms(Vec<SymmetricKeyAlgorithm>),
    PreferredHashAlgorithms(Vec<HashAlgorithm>),
    PreferredCompressionAlgorithms(Vec<CompressionAlgorithm>),
    IsPrimary(bool),
    KeyFlags(#[debug("{}", hex::encode(_0))] Bytes),
    Features(#[debug("{}", hex::encode(_0))] Bytes),
    /// The v4 fingerprint of the issuing key.
    IssuerFingerprint(Fingerprint),
    Other(u8, #[debug("{}", hex::encode(_1))] Bytes),
}

impl SubpacketData {
    pub fn typ(&self) -> SubpacketType {
        match self {
            SubpacketData::SignatureCreationTime(_) => SubpacketType::SignatureCreationTime,
            SubpacketData::SignatureExpirationTime(_) => SubpacketType::SignatureExpirationTime,
            SubpacketData::KeyExpirationTime(_) => SubpacketType::KeyExpirationTime,
            SubpacketData::Issuer(_) => SubpacketType::Issuer,
            SubpacketData::PreferredSymmetricAlgorithms(_) => {
                SubpacketType::PreferredSymmetricAlgorithms
            }
            SubpacketData::PreferredHashAlgorithms(_) => SubpacketType::PreferredHashAlgorithms,
            SubpacketData::PreferredCompressionAlgorithms(_) => {
                SubpacketType::PreferredCompressionAlgorithms
            }
            SubpacketData::IsPrimary(_) => SubpacketType::PrimaryUserId,
            SubpacketData::KeyFlags(_) => SubpacketType::KeyFlags,
            SubpacketData::Features(_) => SubpacketType::Features,
            SubpacketData::IssuerFingerprint(_) => SubpacketType::IssuerFingerprint,
            SubpacketData::Other(n, _) => SubpacketType::Other(*n),
        }
    }

    /// Creation time subpacket for the current time, in whole seconds.
    pub fn created_now() -> Self {
        SubpacketData::SignatureCreationTime(Utc::now().trunc_subsecs(0))
    }

    fn from_body(typ: SubpacketType, body: Bytes) -> Result<Self> {
        let raw = body.clone();
        match Self::parse_known(typ, body) {
            Ok(data) => Ok(data),
            Err(err) => {
                warn!("keeping malformed subpacket {:?} as raw data: {}", typ, err);
                Ok(SubpacketData::Other(typ.as_u8(false), raw))
            }
        }
    }

    fn parse_known(typ: SubpacketType, mut body: Bytes) -> Result<Self> {
        let data = match typ {
            SubpacketType::SignatureCreationTime => {
                let ts = body.read_be_u32()?;
                let created = DateTime::from_timestamp(i64::from(ts), 0)
                    .ok_or_else(|| format_err!("invalid creation time"))?;
                SubpacketData::SignatureCreationTime(created)
            }
            SubpacketType::SignatureExpirationTime => {
                SubpacketData::SignatureExpirationTime(body.read_be_u32()?)
            }
            SubpacketType::KeyExpirationTime => {
                SubpacketData::KeyExpirationTime(body.read_be_u32()?)
            }
            SubpacketType::Issuer => SubpacketData::Issuer(KeyId::from(body.read_array::<8>()?)),
            SubpacketType::PreferredSymmetricAlgorithms => {
                SubpacketData::PreferredSymmetricAlgorithms(
                    body.rest().iter().map(|v| SymmetricKeyAlgorithm::from(*v)).collect(),
                )
            }
            SubpacketType::PreferredHashAlgorithms => SubpacketData::PreferredHashAlgorithms(
                body.rest().iter().map(|v| HashAlgorithm::from(*v)).collect(),
            ),
            SubpacketType::PreferredCompressionAlgorithms => {
                SubpacketData::PreferredCompressionAlgorithms(
                    body.rest().iter().map(|v| CompressionAlgorithm::from(*v)).collect(),
                )
            }
            SubpacketType::PrimaryUserId => SubpacketData::IsPrimary(body.read_u8()? == 1),
            SubpacketType::KeyFlags => SubpacketData::KeyFlags(body.rest()),
            SubpacketType::Features => SubpacketData::Features(body.rest()),
            SubpacketType::IssuerFingerprint => {
                let version = body.read_u8()?;
                ensure_eq!(version, 4, "issuer fingerprint version");
                SubpacketData::IssuerFingerprint(Fingerprint::from(body.read_array::<20>()?))
            }
            SubpacketType::Other(n) => SubpacketData::Other(n, body.rest()),
        };
        ensure!(!body.has_remaining(), "trailing data in subpacket {:?}", typ);

        Ok(data)
    }
}

impl Serialize for SubpacketData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            SubpacketData::SignatureCreationTime(t) => {
                writer.write_u32::<BigEndian>(time_to_u32(t))?;
            }
            SubpacketData::SignatureExpirationTime(d) | SubpacketData::KeyExpirationTime(d) => {
                writer.write_u32::<BigEndian>(*d)?;
            }
            SubpacketData::Issuer(id) => {
                writer.write_all(id.as_ref())?;
            }
            SubpacketData::PreferredSymmetricAlgorithms(algs) => {
                for alg in algs {
                    writer.write_u8((*alg).into())?;
                }
            }
            SubpacketData::PreferredHashAlgorithms(algs) => {
                for alg in algs {
                    writer.write_u8((*alg).into())?;
                }
            }
            SubpacketData::PreferredCompressionAlgorithms(algs) => {
                for alg in algs {
                    writer.write_u8((*alg).into())?;
                }
            }
            SubpacketData::IsPrimary(is_primary) => {
                writer.write_u8(u8::from(*is_primary))?;
            }
            SubpacketData::KeyFlags(flags) => writer.write_all(flags)?,
            SubpacketData::Features(features) => writer.write_all(features)?,
            SubpacketData::IssuerFingerprint(fp) => {
                writer.write_u8(4)?;
                writer.write_all(fp.as_bytes())?;
            }
            SubpacketData::Other(_, body) => writer.write_all(body)?,
        }

        Ok(())
    }

    fn write_len(&self) -> usize {
        match self {
            SubpacketData::SignatureCreationTime(_)
            | SubpacketData::SignatureExpirationTime(_)
            | SubpacketData::KeyExpirationTime(_) => 4,
            SubpacketData::Issuer(_) => 8,
            SubpacketData::PreferredSymmetricAlgorithms(algs) => algs.len(),
            SubpacketData::PreferredHashAlgorithms(algs) => algs.len(),
            SubpacketData::PreferredCompressionAlgorithms(algs) => algs.len(),
            SubpacketData::IsPrimary(_) => 1,
            SubpacketData::KeyFlags(b) | SubpacketData::Features(b) => b.len(),
            SubpacketData::IssuerFingerprint(_) => 1 + 20,
            SubpacketData::Other(_, body) => body.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_critical() {
        let (typ, critical) = SubpacketType::from_u8(0x82);
        assert_eq!(typ, SubpacketType::SignatureCreationTime);
        assert!(critical);
        assert_eq!(typ.as_u8(true), 0x82);
        assert_eq!(typ.as_u8(false), 0x02);
    }

    #[test]
    fn test_issuer_roundtrip() {
        let raw = hex!("09 10 1b 7b 8a 3c 37 18 3d 2f");
        let packets = Subpacket::from_area(Bytes::copy_from_slice(&raw)).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(
            packets[0].data,
            SubpacketData::Issuer(KeyId::from(hex!("1b7b8a3c37183d2f")))
        );
        assert_eq!(packets[0].to_bytes().unwrap(), raw.to_vec());
    }

    #[test]
    fn test_non_minimal_length_is_preserved() {
        // creation time, with a five octet length
        let raw = hex!("ff 00 00 00 05 02 65 53 f1 00");
        let packets = Subpacket::from_area(Bytes::copy_from_slice(&raw)).unwrap();
        assert!(matches!(
            packets[0].data,
            SubpacketData::SignatureCreationTime(_)
        ));
        assert_eq!(packets[0].to_bytes().unwrap(), raw.to_vec());
    }

    #[test]
    fn test_malformed_known_subpacket() {
        // issuer with only 4 octets
        let raw = hex!("05 10 01 02 03 04");
        let packets = Subpacket::from_area(Bytes::copy_from_slice(&raw)).unwrap();
        assert_eq!(
            packets[0].data,
            SubpacketData::Other(16, Bytes::from_static(&[1, 2, 3, 4]))
        );
        assert_eq!(packets[0].to_bytes().unwrap(), raw.to_vec());
    }

    #[test]
    fn test_empty_subpacket() {
        assert!(Subpacket::from_area(Bytes::from_static(&[0])).is_err());
    }

    proptest! {
        #[test]
        fn subpacket_length_roundtrip(len in 0usize..100_000) {
            let l = SubpacketLength::encode(len).unwrap();
            let buf = l.to_bytes().unwrap();
            prop_assert_eq!(buf.len(), l.write_len());
            let parsed = SubpacketLength::from_buf(&buf[..]).unwrap();
            prop_assert_eq!(parsed.len(), len);
        }
    }
}
