use std::iter::Peekable;
use std::path::Path;

use bytes::Bytes;
use log::debug;

use crate::armor::{self, BlockType, Headers};
use crate::errors::{Error, Result};
use crate::packet::{Packet, PacketParser};

/// Values that can be read from a packet sequence, armored or binary.
pub trait Deserializable: Sized {
    /// Builds the value from the complete packet sequence.
    fn from_packets<I: Iterator<Item = Result<Packet>>>(packets: Peekable<I>) -> Result<Self>;

    /// Is `typ` the armor block this value is transported in?
    fn matches_block_type(typ: BlockType) -> bool;

    /// Parse from binary packets.
    fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        let packets = PacketParser::new(bytes.into()).peekable();
        Self::from_packets(packets)
    }

    /// Parse from a single armored block.
    fn from_armor_single(input: &[u8]) -> Result<(Self, Headers)> {
        let dearmored = armor::decode(input)?;
        if !Self::matches_block_type(dearmored.typ) {
            bail!("unexpected block type: {}", dearmored.typ);
        }

        let value = Self::from_bytes(dearmored.data)?;
        Ok((value, dearmored.headers))
    }

    /// Parse from an armored string.
    fn from_string(input: &str) -> Result<(Self, Headers)> {
        Self::from_armor_single(input.as_bytes())
    }

    /// Parse from either armored or binary input, detecting which one it is.
    ///
    /// Armor headers are returned for armored input.
    fn from_slice(input: &[u8]) -> Result<(Self, Option<Headers>)> {
        if armor::is_armored(input) {
            debug!("detected armored input");
            let (value, headers) = Self::from_armor_single(input)?;
            Ok((value, Some(headers)))
        } else {
            debug!("detected binary input");
            Ok((Self::from_bytes(input.to_vec())?, None))
        }
    }

    /// Read and parse the file at `path`, armored or binary.
    fn from_file<P: AsRef<Path>>(path: P) -> Result<(Self, Option<Headers>)> {
        let input = std::fs::read(path)?;
        Self::from_slice(&input)
    }
}

/// Options for ASCII armoring.
#[derive(Debug, Clone)]
pub struct ArmorOptions<'a> {
    /// Armor headers
    pub headers: Option<&'a Headers>,
    /// Should a checksum be included? Default to `true`.
    pub include_checksum: bool,
}

impl Default for ArmorOptions<'_> {
    fn default() -> Self {
        Self {
            headers: None,
            include_checksum: true,
        }
    }
}

impl<'a> From<Option<&'a Headers>> for ArmorOptions<'a> {
    fn from(headers: Option<&'a Headers>) -> Self {
        Self {
            headers,
            include_checksum: true,
        }
    }
}

/// Pulls the next packet, failing if the stream ended.
pub(crate) fn next_packet<I: Iterator<Item = Result<Packet>>>(
    packets: &mut Peekable<I>,
) -> Result<Packet> {
    packets.next().ok_or(Error::NoMatchingPacket)?
}
