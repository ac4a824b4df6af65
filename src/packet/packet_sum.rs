use std::io;

use bytes::Bytes;
use log::warn;

use crate::errors::{Error, Result};
use crate::packet::{
    CompressedData, LiteralData, OnePassSignature, PacketHeader, PublicKey,
    PublicKeyEncryptedSessionKey, SecretKey, Signature, SymEncryptedProtectedData, UserId,
};
use crate::ser::Serialize;
use crate::types::{PacketHeaderVersion, PacketLength, Tag};
use crate::util::impl_try_from_into;

/// Represents a Packet. A packet is the record structure used to encode a chunk of data in OpenPGP.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-packet-syntax>
#[derive(Debug, PartialEq, Eq, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum Packet {
    CompressedData(CompressedData),
    PublicKey(PublicKey),
    SecretKey(SecretKey),
    LiteralData(LiteralData),
    OnePassSignature(OnePassSignature),
    PublicKeyEncryptedSessionKey(PublicKeyEncryptedSessionKey),
    Signature(Signature),
    SymEncryptedProtectedData(SymEncryptedProtectedData),
    UserId(UserId),
    /// Any packet this crate does not interpret, kept as its raw body.
    Other(OtherPacket),
}

impl_try_from_into!(
    Packet,
    CompressedData => CompressedData,
    PublicKey => PublicKey,
    SecretKey => SecretKey,
    LiteralData => LiteralData,
    OnePassSignature => OnePassSignature,
    PublicKeyEncryptedSessionKey => PublicKeyEncryptedSessionKey,
    Signature => Signature,
    SymEncryptedProtectedData => SymEncryptedProtectedData,
    UserId => UserId,
    Other => OtherPacket
);

impl Packet {
    /// Parses the body of a packet, according to the tag in `header`.
    ///
    /// Packets with unknown tags, and packets using versions or algorithms that are not
    /// supported, are kept as [`Packet::Other`].
    pub fn from_parts(header: PacketHeader, body: Bytes) -> Result<Self> {
        let raw = body.clone();
        let res = match header.tag() {
            Tag::CompressedData => CompressedData::try_from_buf(header, body).map(Into::into),
            Tag::PublicKey => PublicKey::try_from_buf(header, body).map(Into::into),
            Tag::SecretKey => SecretKey::try_from_buf(header, body).map(Into::into),
            Tag::LiteralData => LiteralData::try_from_buf(header, body).map(Into::into),
            Tag::OnePassSignature => OnePassSignature::try_from_buf(header, body).map(Into::into),
            Tag::PublicKeyEncryptedSessionKey => {
                PublicKeyEncryptedSessionKey::try_from_buf(header, body).map(Into::into)
            }
            Tag::Signature => Signature::try_from_buf(header, body).map(Into::into),
            Tag::SymEncryptedProtectedData => {
                SymEncryptedProtectedData::try_from_buf(header, body).map(Into::into)
            }
            Tag::UserId => UserId::try_from_buf(header, body).map(Into::into),
            _ => Ok(Packet::Other(OtherPacket {
                packet_header: header,
                body,
            })),
        };

        match res {
            Err(Error::Unsupported { message }) => {
                warn!("keeping unsupported {:?} packet as raw data: {}", header.tag(), message);
                Ok(Packet::Other(OtherPacket {
                    packet_header: header,
                    body: raw,
                }))
            }
            res => res,
        }
    }
}

/// The raw body of a packet that is not interpreted.
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct OtherPacket {
    packet_header: PacketHeader,
    #[debug("{}", hex::encode(body))]
    body: Bytes,
}

impl OtherPacket {
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl Serialize for OtherPacket {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.body)?;
        Ok(())
    }

    fn write_len(&self) -> usize {
        self.body.len()
    }
}

impl PacketTrait for OtherPacket {
    fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }
}

impl Serialize for Packet {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Self::CompressedData(p) => p.to_writer_with_header(writer),
            Self::PublicKey(p) => p.to_writer_with_header(writer),
            Self::SecretKey(p) => p.to_writer_with_header(writer),
            Self::LiteralData(p) => p.to_writer_with_header(writer),
            Self::OnePassSignature(p) => p.to_writer_with_header(writer),
            Self::PublicKeyEncryptedSessionKey(p) => p.to_writer_with_header(writer),
            Self::Signature(p) => p.to_writer_with_header(writer),
            Self::SymEncryptedProtectedData(p) => p.to_writer_with_header(writer),
            Self::UserId(p) => p.to_writer_with_header(writer),
            Self::Other(p) => p.to_writer_with_header(writer),
        }
    }

    fn write_len(&self) -> usize {
        match self {
            Self::CompressedData(p) => p.write_len_with_header(),
            Self::PublicKey(p) => p.write_len_with_header(),
            Self::SecretKey(p) => p.write_len_with_header(),
            Self::LiteralData(p) => p.write_len_with_header(),
            Self::OnePassSignature(p) => p.write_len_with_header(),
            Self::PublicKeyEncryptedSessionKey(p) => p.write_len_with_header(),
            Self::Signature(p) => p.write_len_with_header(),
            Self::SymEncryptedProtectedData(p) => p.write_len_with_header(),
            Self::UserId(p) => p.write_len_with_header(),
            Self::Other(p) => p.write_len_with_header(),
        }
    }
}

pub trait PacketTrait: Serialize {
    fn packet_header(&self) -> &PacketHeader;

    fn packet_header_version(&self) -> PacketHeaderVersion {
        self.packet_header().version()
    }

    fn tag(&self) -> Tag {
        self.packet_header().tag()
    }

    /// The header used when writing: the original header format, with the length
    /// of the body as it is serialized now.
    fn write_header(&self) -> Result<PacketHeader> {
        let original_header = self.packet_header();
        let write_len = self.write_len();

        let header = match original_header.packet_length() {
            PacketLength::Fixed(len) => {
                if len != write_len {
                    warn!(
                        "packet header mismatch between reading and writing: original: {:?}, length: {}",
                        original_header, write_len
                    );
                }
                PacketHeader::from_parts(
                    original_header.version(),
                    original_header.tag(),
                    PacketLength::Fixed(write_len),
                )?
            }
            // bodies read in chunks are written out with a fixed length
            PacketLength::Indeterminate | PacketLength::Partial(_) => {
                PacketHeader::new_fixed(original_header.tag(), write_len)
            }
        };

        Ok(header)
    }

    /// Write this packet including the packet header.
    fn to_writer_with_header<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.write_header()?.to_writer(writer)?;
        self.to_writer(writer)?;

        Ok(())
    }

    /// Length in bytes used when calling `to_writer_with_header`.
    fn write_len_with_header(&self) -> usize {
        let header_len = self
            .write_header()
            .map(|h| h.write_len())
            .unwrap_or_else(|_| self.packet_header().write_len());
        header_len + self.write_len()
    }
}

impl PacketTrait for Packet {
    fn packet_header(&self) -> &PacketHeader {
        match self {
            Self::CompressedData(p) => p.packet_header(),
            Self::PublicKey(p) => p.packet_header(),
            Self::SecretKey(p) => p.packet_header(),
            Self::LiteralData(p) => p.packet_header(),
            Self::OnePassSignature(p) => p.packet_header(),
            Self::PublicKeyEncryptedSessionKey(p) => p.packet_header(),
            Self::Signature(p) => p.packet_header(),
            Self::SymEncryptedProtectedData(p) => p.packet_header(),
            Self::UserId(p) => p.packet_header(),
            Self::Other(p) => p.packet_header(),
        }
    }

    fn write_header(&self) -> Result<PacketHeader> {
        // the enum itself serializes with headers, see `to_writer`
        Ok(*self.packet_header())
    }

    fn to_writer_with_header<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        self.to_writer(writer)
    }

    fn write_len_with_header(&self) -> usize {
        self.write_len()
    }
}

impl<'a, T: 'a + PacketTrait> PacketTrait for &'a T {
    fn packet_header(&self) -> &PacketHeader {
        (*self).packet_header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_tag_is_kept() {
        let header = PacketHeader::new_fixed(Tag::Marker, 3);
        let packet = Packet::from_parts(header, Bytes::from_static(b"PGP")).unwrap();
        let Packet::Other(ref other) = packet else {
            panic!("unexpected packet {:?}", packet);
        };
        assert_eq!(other.body(), b"PGP");
        assert_eq!(packet.to_bytes().unwrap(), vec![0xCA, 0x03, b'P', b'G', b'P']);
    }

    #[test]
    fn test_unsupported_version_is_kept() {
        // v5 one pass signature
        let header = PacketHeader::new_fixed(Tag::OnePassSignature, 4);
        let packet = Packet::from_parts(header, Bytes::from_static(&[5, 0, 8, 1])).unwrap();
        assert_eq!(packet.tag(), Tag::OnePassSignature);
        assert!(matches!(packet, Packet::Other(_)));
    }

    #[test]
    fn test_try_from() {
        let id = UserId::from_str("me");
        let packet: Packet = id.clone().into();
        let back: UserId = packet.clone().try_into().unwrap();
        assert_eq!(back, id);
        assert!(LiteralData::try_from(packet).is_err());
    }
}
