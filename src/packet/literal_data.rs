use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use chrono::{DateTime, SubsecRound, Utc};
use num_enum::{FromPrimitive, IntoPrimitive};

use crate::errors::Result;
use crate::packet::{PacketHeader, PacketTrait};
use crate::parsing::BufParsing;
use crate::ser::{time_to_u32, Serialize};
use crate::types::Tag;

/// Literal Data Packet
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-literal-data-packet-type-id>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct LiteralData {
    packet_header: PacketHeader,
    mode: DataMode,
    /// The filename, may contain non utf-8 bytes
    #[debug("{}", String::from_utf8_lossy(file_name))]
    file_name: Bytes,
    created: DateTime<Utc>,
    #[debug("{}", hex::encode(data))]
    data: Bytes,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DataMode {
    Binary = b'b',
    Text = b't',
    Utf8 = b'u',
    Mime = b'm',

    #[num_enum(catch_all)]
    Other(u8),
}

impl LiteralData {
    /// Creates a literal data packet from the given binary data.
    pub fn from_bytes(file_name: &[u8], data: Bytes) -> Result<Self> {
        ensure!(file_name.len() <= 255, "file name is too long");

        let mut packet = LiteralData {
            packet_header: PacketHeader::new_fixed(Tag::LiteralData, 0),
            mode: DataMode::Binary,
            file_name: Bytes::copy_from_slice(file_name),
            created: Utc::now().trunc_subsecs(0),
            data,
        };
        packet.packet_header = PacketHeader::new_fixed(Tag::LiteralData, packet.write_len());

        Ok(packet)
    }

    /// Parses a `LiteralData` packet from the given buffer.
    pub fn try_from_buf<B: Buf>(packet_header: PacketHeader, mut i: B) -> Result<Self> {
        let mode = DataMode::from(i.read_u8()?);
        let name_len = i.read_u8()?;
        let file_name = i.read_take(name_len.into())?;
        let created = i.read_be_u32()?;
        let created = DateTime::from_timestamp(i64::from(created), 0)
            .ok_or_else(|| format_err!("invalid created field"))?;
        let data = i.rest();

        Ok(LiteralData {
            packet_header,
            mode,
            file_name,
            created,
            data,
        })
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.mode, DataMode::Binary)
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn file_name(&self) -> &[u8] {
        &self.file_name
    }

    pub fn created(&self) -> &DateTime<Utc> {
        &self.created
    }

    /// Returns the raw content.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the packet and returns the content.
    pub fn into_data(self) -> Bytes {
        self.data
    }
}

impl Serialize for LiteralData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.mode.into())?;
        writer.write_u8(u8::try_from(self.file_name.len())?)?;
        writer.write_all(&self.file_name)?;
        writer.write_u32::<BigEndian>(time_to_u32(&self.created))?;
        writer.write_all(&self.data)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + 1 + self.file_name.len() + 4 + self.data.len()
    }
}

impl PacketTrait for LiteralData {
    fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }
}
