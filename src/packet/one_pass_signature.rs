use std::io;

use byteorder::WriteBytesExt;
use bytes::Buf;

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::Result;
use crate::packet::{PacketHeader, PacketTrait, Signature, SignatureType};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{KeyId, Tag};

/// One-Pass Signature Packet
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-one-pass-signature-packet-t>
///
/// Only version 3 is supported.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct OnePassSignature {
    packet_header: PacketHeader,
    pub typ: SignatureType,
    pub hash_algorithm: HashAlgorithm,
    pub pub_algorithm: PublicKeyAlgorithm,
    pub key_id: KeyId,
    /// Set when no further one pass signature follows.
    pub last: u8,
}

impl OnePassSignature {
    /// Creates a new v3 one pass signature packet.
    pub fn v3(
        typ: SignatureType,
        hash_algorithm: HashAlgorithm,
        pub_algorithm: PublicKeyAlgorithm,
        key_id: KeyId,
    ) -> Self {
        OnePassSignature {
            packet_header: PacketHeader::new_fixed(Tag::OnePassSignature, 13),
            typ,
            hash_algorithm,
            pub_algorithm,
            key_id,
            last: 1,
        }
    }

    /// The one pass signature announcing `sig`.
    pub fn for_signature(sig: &Signature) -> Result<Self> {
        let key_id = sig
            .issuer()
            .first()
            .copied()
            .copied()
            .ok_or_else(|| format_err!("signature has no issuer"))?;

        Ok(Self::v3(
            sig.typ(),
            sig.hash_alg(),
            sig.config.pub_alg,
            key_id,
        ))
    }

    /// Parses a `OnePassSignature` packet from the given buffer.
    pub fn try_from_buf<B: Buf>(packet_header: PacketHeader, mut i: B) -> Result<Self> {
        let version = i.read_u8()?;
        if version != 3 {
            unsupported_err!("one pass signature version {}", version);
        }

        let typ = SignatureType::from(i.read_u8()?);
        let hash_algorithm = HashAlgorithm::from(i.read_u8()?);
        let pub_algorithm = PublicKeyAlgorithm::from(i.read_u8()?);
        let key_id = KeyId::from(i.read_array::<8>()?);
        let last = i.read_u8()?;

        Ok(OnePassSignature {
            packet_header,
            typ,
            hash_algorithm,
            pub_algorithm,
            key_id,
            last,
        })
    }
}

impl Serialize for OnePassSignature {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(3)?;
        writer.write_u8(self.typ.into())?;
        writer.write_u8(self.hash_algorithm.into())?;
        writer.write_u8(self.pub_algorithm.into())?;
        writer.write_all(self.key_id.as_ref())?;
        writer.write_u8(self.last)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 1 + 1 + 1 + 8 + 1
    }
}

impl PacketTrait for OnePassSignature {
    fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_parse_write() {
        let raw = hex!("03 00 08 01 1b 7b 8a 3c 37 18 3d 2f 01");
        let header = PacketHeader::new_fixed(Tag::OnePassSignature, raw.len());
        let ops = OnePassSignature::try_from_buf(header, &raw[..]).unwrap();

        assert_eq!(ops.typ, SignatureType::Binary);
        assert_eq!(ops.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(ops.pub_algorithm, PublicKeyAlgorithm::RSA);
        assert_eq!(ops.key_id, KeyId::from(hex!("1b7b8a3c37183d2f")));
        assert_eq!(ops.last, 1);
        assert_eq!(ops.to_bytes().unwrap(), raw.to_vec());
        assert_eq!(ops, OnePassSignature::v3(
            SignatureType::Binary,
            HashAlgorithm::Sha256,
            PublicKeyAlgorithm::RSA,
            KeyId::from(hex!("1b7b8a3c37183d2f")),
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let raw = hex!("06 00 08 01");
        let header = PacketHeader::new_fixed(Tag::OnePassSignature, raw.len());
        assert!(OnePassSignature::try_from_buf(header, &raw[..]).is_err());
    }
}
