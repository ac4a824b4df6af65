use bytes::{Buf, Bytes, BytesMut};
use log::debug;

use crate::errors::Result;
use crate::packet::{read_new_length, Packet, PacketHeader};
use crate::parsing::BufParsing;
use crate::types::PacketLength;

/// Minimum size of the first chunk of a partial body.
const MIN_PARTIAL_START: u32 = 512;

/// Parses a sequence of packets from an in-memory buffer.
///
/// After the first error the parser is exhausted.
#[derive(Debug)]
pub struct PacketParser {
    inner: Bytes,
}

impl PacketParser {
    pub fn new(inner: Bytes) -> Self {
        PacketParser { inner }
    }

    fn next_packet(&mut self) -> Result<Packet> {
        let header = PacketHeader::from_buf(&mut self.inner)?;
        debug!("found header {:?}", header);

        let body = match header.packet_length() {
            PacketLength::Fixed(len) => self.inner.read_take(len)?,
            PacketLength::Indeterminate => self.inner.rest(),
            PacketLength::Partial(len) => {
                if len < MIN_PARTIAL_START {
                    debug!("first partial chunk is only {} bytes", len);
                }
                read_partial_body(&mut self.inner, len)?
            }
        };

        Packet::from_parts(header, body)
    }
}

impl Iterator for PacketParser {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.inner.has_remaining() {
            return None;
        }

        match self.next_packet() {
            Ok(packet) => Some(Ok(packet)),
            Err(err) => {
                self.inner.clear();
                Some(Err(err))
            }
        }
    }
}

/// Collects a body split into partial chunks, up to and including the final fixed length chunk.
fn read_partial_body(i: &mut Bytes, first: u32) -> Result<Bytes> {
    let mut body = BytesMut::new();
    let mut len = first as usize;

    loop {
        body.extend_from_slice(&i.read_take(len)?);

        match read_new_length(&mut *i)? {
            PacketLength::Partial(l) => len = l as usize,
            PacketLength::Fixed(l) => {
                body.extend_from_slice(&i.read_take(l)?);
                break;
            }
            PacketLength::Indeterminate => bail!("invalid length in partial body"),
        }
    }

    Ok(body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{LiteralData, PacketTrait, UserId};
    use crate::ser::Serialize;
    use crate::types::Tag;

    #[test]
    fn test_many() {
        let mut buf = Vec::new();
        UserId::from_str("one").to_writer_with_header(&mut buf).unwrap();
        UserId::from_str("two").to_writer_with_header(&mut buf).unwrap();

        let packets: Vec<_> = PacketParser::new(buf.into())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[1], Packet::from(UserId::from_str("two")));
    }

    #[test]
    fn test_partial_body() {
        let data = vec![b'x'; 1000];
        // literal data: mode, name length, created
        let mut body = vec![b'b', 0, 0, 0, 0, 0];
        body.extend_from_slice(&data);

        // 512 byte chunk, then a fixed remainder
        let mut raw = vec![Tag::LiteralData.encode(), 0xE9];
        raw.extend_from_slice(&body[..512]);
        let rest = &body[512..];
        raw.push(192 + ((rest.len() - 192) >> 8) as u8);
        raw.push(((rest.len() - 192) & 0xFF) as u8);
        raw.extend_from_slice(rest);

        let packets: Vec<_> = PacketParser::new(raw.into())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(packets.len(), 1);

        let lit: LiteralData = packets[0].clone().try_into().unwrap();
        assert_eq!(lit.data(), &data[..]);

        // written back with a fixed length
        let written = packets[0].to_bytes().unwrap();
        assert_eq!(written.len(), packets[0].write_len());
        assert_eq!(written[0], 0xCB);
    }

    #[test]
    fn test_old_indeterminate() {
        // old style user id, indeterminate length
        let raw = vec![0b1000_0011 | (13 << 2), b'h', b'i'];
        let packets: Vec<_> = PacketParser::new(raw.into())
            .collect::<Result<_>>()
            .unwrap();
        let id: UserId = packets[0].clone().try_into().unwrap();
        assert_eq!(id.id(), b"hi");
    }

    #[test]
    fn test_truncated() {
        let raw = vec![Tag::UserId.encode(), 10, b'a'];
        let mut parser = PacketParser::new(raw.into());
        assert!(parser.next().unwrap().is_err());
        assert!(parser.next().is_none());
    }
}
