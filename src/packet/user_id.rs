use std::{io, str};

use bytes::{Buf, Bytes};

use crate::errors::Result;
use crate::packet::{PacketHeader, PacketTrait};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::Tag;

/// User ID Packet
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-user-id-packet-type-id-13>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct UserId {
    packet_header: PacketHeader,
    #[debug("{}", String::from_utf8_lossy(id))]
    id: Bytes,
}

impl UserId {
    /// Parses a `UserId` packet from the given buffer.
    pub fn try_from_buf<B: Buf>(packet_header: PacketHeader, mut i: B) -> Result<Self> {
        let id = i.rest();
        Ok(UserId { packet_header, id })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(input: &str) -> Self {
        let id = Bytes::copy_from_slice(input.as_bytes());
        UserId {
            packet_header: PacketHeader::new_fixed(Tag::UserId, id.len()),
            id,
        }
    }

    /// The raw id, usually but not necessarily utf-8.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// The id as utf-8, if it is valid.
    pub fn as_str(&self) -> Result<&str> {
        Ok(str::from_utf8(&self.id)?)
    }
}

impl Serialize for UserId {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.id)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        self.id.len()
    }
}

impl PacketTrait for UserId {
    fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id() {
        let id = UserId::from_str("email1@email.com <email1@email.com>");
        assert_eq!(id.as_str().unwrap(), "email1@email.com <email1@email.com>");

        let body = id.to_bytes().unwrap();
        let parsed = UserId::try_from_buf(*id.packet_header(), &body[..]).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_non_utf8() {
        let header = PacketHeader::new_fixed(Tag::UserId, 2);
        let id = UserId::try_from_buf(header, &[0xFFu8, 0xFE][..]).unwrap();
        assert!(id.as_str().is_err());
        assert_eq!(id.id(), &[0xFF, 0xFE]);
    }
}
