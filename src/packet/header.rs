use byteorder::{BigEndian, WriteBytesExt};
use bytes::Buf;
use log::debug;

use crate::errors::Result;
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{PacketHeaderVersion, PacketLength, Tag};

/// Maximum size of partial packet length.
const MAX_PARTIAL_LEN: u32 = 2u32.pow(30);

/// Represents a packet header.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-packet-headers>
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    version: PacketHeaderVersion,
    tag: Tag,
    length: PacketLength,
}

impl PacketHeader {
    /// Parse a single packet header from the given buffer.
    pub fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let header = i.read_u8()?;

        match header & 0b1100_0000 {
            0b1100_0000 => {
                // new starts with 0b11
                let tag = Tag::from(header & 0b0011_1111);
                let length = read_new_length(&mut i)?;

                Ok(PacketHeader {
                    version: PacketHeaderVersion::New,
                    tag,
                    length,
                })
            }
            0b1000_0000 => {
                // old starts with 0b10
                let tag = Tag::from((header >> 2) & 0b1111);
                let length = match header & 0b11 {
                    // One-Octet Lengths
                    0 => PacketLength::Fixed(i.read_u8()?.into()),
                    // Two-Octet Lengths
                    1 => PacketLength::Fixed(i.read_be_u16()?.into()),
                    // Four-Octet Lengths
                    2 => PacketLength::Fixed(i.read_be_u32()?.try_into()?),
                    _ => PacketLength::Indeterminate,
                };

                Ok(PacketHeader {
                    version: PacketHeaderVersion::Old,
                    tag,
                    length,
                })
            }
            _ => {
                bail!("unknown packet header version {:b}", header);
            }
        }
    }

    pub fn from_parts(version: PacketHeaderVersion, tag: Tag, length: PacketLength) -> Result<Self> {
        match version {
            PacketHeaderVersion::Old => {
                ensure!(
                    u8::from(tag) < 16,
                    "tag is not compatible with old packet headers: {:?}",
                    tag
                );
                ensure!(
                    !matches!(length, PacketLength::Partial(_)),
                    "partial lengths are only supported in new style headers"
                );
            }
            PacketHeaderVersion::New => {
                ensure!(
                    !matches!(length, PacketLength::Indeterminate),
                    "indeterminate packet length is only supported in old style headers"
                );
                if let PacketLength::Partial(l) = length {
                    ensure!(l.count_ones() == 1, "partial length must be a power of two");
                    ensure!(
                        l <= MAX_PARTIAL_LEN,
                        "partial length must be less or equal than {}",
                        MAX_PARTIAL_LEN
                    );
                }
            }
        }

        Ok(PacketHeader {
            version,
            tag,
            length,
        })
    }

    /// Creates a `New` style packet header.
    pub fn new_fixed(tag: Tag, length: usize) -> Self {
        PacketHeader {
            version: PacketHeaderVersion::New,
            tag,
            length: PacketLength::Fixed(length),
        }
    }

    /// Returns the packet header version.
    pub const fn version(&self) -> PacketHeaderVersion {
        self.version
    }

    /// Returns the packet length.
    pub fn packet_length(&self) -> PacketLength {
        self.length
    }

    /// Returns the packet tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }
}

/// Reads a new style length, as used in packet headers and for partial body chunks.
pub(crate) fn read_new_length<B: Buf>(mut i: B) -> Result<PacketLength> {
    let olen = i.read_u8()?;
    let length = match olen {
        // One-Octet Lengths
        0..=191 => PacketLength::Fixed(olen.into()),
        // Two-Octet Lengths
        192..=223 => {
            let a = i.read_u8()?;
            let l = ((olen as usize - 192) << 8) + 192 + a as usize;
            PacketLength::Fixed(l)
        }
        // Partial Body Lengths
        224..=254 => PacketLength::Partial(1 << (olen as usize & 0x1F)),
        // Five-Octet Lengths
        255 => {
            let len = i.read_be_u32()?;
            PacketLength::Fixed(len.try_into()?)
        }
    };
    Ok(length)
}

/// Writes a new style fixed length.
fn write_new_length<W: std::io::Write>(writer: &mut W, len: usize) -> Result<()> {
    if len < 192 {
        writer.write_u8(len as u8)?;
    } else if len < 8384 {
        writer.write_u8((((len - 192) >> 8) + 192) as u8)?;
        writer.write_u8(((len - 192) & 0xFF) as u8)?;
    } else {
        writer.write_u8(255)?;
        writer.write_u32::<BigEndian>(u32::try_from(len)?)?;
    }
    Ok(())
}

fn new_length_len(len: usize) -> usize {
    if len < 192 {
        1
    } else if len < 8384 {
        2
    } else {
        5
    }
}

fn old_fixed_type(len: usize) -> u8 {
    if len < 256 {
        0
    } else if len < 65536 {
        1
    } else {
        2
    }
}

impl Serialize for PacketHeader {
    fn to_writer<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        debug!("writing packet header {:?}", self);

        match (self.version, self.length) {
            (PacketHeaderVersion::New, PacketLength::Fixed(len)) => {
                writer.write_u8(self.tag.encode())?;
                write_new_length(writer, len)?;
            }
            (PacketHeaderVersion::New, PacketLength::Partial(len)) => {
                writer.write_u8(self.tag.encode())?;
                // y & 0x1F
                let n = len.trailing_zeros();
                writer.write_u8((224 + n) as u8)?;
            }
            (PacketHeaderVersion::New, PacketLength::Indeterminate) => {
                bail!("invalid state: indeterminate lengths for new style packet header");
            }
            (PacketHeaderVersion::Old, PacketLength::Fixed(len)) => {
                let typ = old_fixed_type(len);
                writer.write_u8(0b1000_0000 | (u8::from(self.tag) << 2) | typ)?;
                match typ {
                    0 => writer.write_u8(len as u8)?,
                    1 => writer.write_u16::<BigEndian>(len as u16)?,
                    _ => writer.write_u32::<BigEndian>(u32::try_from(len)?)?,
                }
            }
            (PacketHeaderVersion::Old, PacketLength::Indeterminate) => {
                writer.write_u8(0b1000_0011 | (u8::from(self.tag) << 2))?;
            }
            (PacketHeaderVersion::Old, PacketLength::Partial(_)) => {
                bail!("invalid state: partial lengths for old style packet header");
            }
        }

        Ok(())
    }

    fn write_len(&self) -> usize {
        match (self.version, self.length) {
            (PacketHeaderVersion::New, PacketLength::Fixed(len)) => 1 + new_length_len(len),
            (PacketHeaderVersion::New, _) => 2,
            (PacketHeaderVersion::Old, PacketLength::Fixed(len)) => match old_fixed_type(len) {
                0 => 2,
                1 => 3,
                _ => 5,
            },
            (PacketHeaderVersion::Old, _) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_packet_length() {
        // # off=5053201 ctb=d1 tag=17 hlen=6 plen=4973 new-ctb
        // :attribute packet: [jpeg image of size 4951]
        let packet_header_raw = hex::decode(b"d1ff0000136d").unwrap();
        let header = PacketHeader::from_buf(&mut &packet_header_raw[..]).unwrap();

        assert_eq!(header.version(), PacketHeaderVersion::New);
        assert_eq!(header.tag(), Tag::UserAttribute);
        assert_eq!(header.packet_length(), PacketLength::Fixed(4973));
    }

    #[test]
    fn test_old_header() {
        // old style public key packet, two octet length
        let raw = [0x99, 0x01, 0x0d];
        let header = PacketHeader::from_buf(&mut &raw[..]).unwrap();
        assert_eq!(header.version(), PacketHeaderVersion::Old);
        assert_eq!(header.tag(), Tag::PublicKey);
        assert_eq!(header.packet_length(), PacketLength::Fixed(269));

        assert_eq!(header.to_bytes().unwrap(), raw.to_vec());
    }

    #[test]
    fn test_partial() {
        let raw = [0xCB, 0xE9];
        let header = PacketHeader::from_buf(&mut &raw[..]).unwrap();
        assert_eq!(header.tag(), Tag::LiteralData);
        assert_eq!(header.packet_length(), PacketLength::Partial(512));
    }

    #[test]
    fn test_from_parts_rejects() {
        assert!(PacketHeader::from_parts(
            PacketHeaderVersion::Old,
            Tag::SymEncryptedProtectedData,
            PacketLength::Fixed(1)
        )
        .is_err());
        assert!(PacketHeader::from_parts(
            PacketHeaderVersion::New,
            Tag::LiteralData,
            PacketLength::Partial(3)
        )
        .is_err());
    }

    #[test]
    fn test_new_length_boundaries() {
        // one, two and five octet encodings
        for (len, expected) in [
            (0, 2),
            (191, 2),
            (192, 3),
            (8383, 3),
            (8384, 6),
            (100_000, 6),
        ] {
            let header = PacketHeader::from_parts(
                PacketHeaderVersion::New,
                Tag::LiteralData,
                PacketLength::Fixed(len),
            )
            .unwrap();

            let mut buf = Vec::new();
            header.to_writer(&mut buf).unwrap();
            assert_eq!(buf.len(), expected, "length {len}");
            assert_eq!(header.write_len(), expected);
            assert_eq!(PacketHeader::from_buf(&mut &buf[..]).unwrap(), header);
        }
    }

    fn header_gen() -> impl Strategy<Value = PacketHeader> {
        prop_oneof![
            (1u8..16, 0usize..100_000).prop_map(|(tag, len)| PacketHeader::from_parts(
                PacketHeaderVersion::Old,
                Tag::from(tag),
                PacketLength::Fixed(len)
            )
            .unwrap()),
            (1u8..64, 0usize..100_000).prop_map(|(tag, len)| PacketHeader::from_parts(
                PacketHeaderVersion::New,
                Tag::from(tag),
                PacketLength::Fixed(len)
            )
            .unwrap()),
            (1u8..64, 0u32..31).prop_map(|(tag, pow)| PacketHeader::from_parts(
                PacketHeaderVersion::New,
                Tag::from(tag),
                PacketLength::Partial(1 << pow)
            )
            .unwrap()),
        ]
    }

    proptest! {
        #[test]
        fn write_len(header in header_gen()) {
            let mut buf = Vec::new();
            header.to_writer(&mut buf).unwrap();
            prop_assert_eq!(buf.len(), header.write_len());
        }

        #[test]
        fn packet_roundtrip(header in header_gen()) {
            let mut buf = Vec::new();
            header.to_writer(&mut buf).unwrap();
            let new_header = PacketHeader::from_buf(&mut &buf[..]).unwrap();
            prop_assert_eq!(header, new_header);
        }
    }
}
