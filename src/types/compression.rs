use std::str::FromStr;

use num_enum::{FromPrimitive, IntoPrimitive};

use crate::errors::Error;

/// Available compression algorithms.
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-compression-algorithms>
#[derive(Debug, PartialEq, Eq, Copy, Clone, FromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum CompressionAlgorithm {
    Uncompressed = 0,
    /// Raw deflate, RFC 1951.
    ZIP = 1,
    /// Deflate with zlib framing, RFC 1950.
    ZLIB = 2,
    BZip2 = 3,

    #[num_enum(catch_all)]
    Other(u8),
}

#[allow(clippy::derivable_impls)]
impl Default for CompressionAlgorithm {
    fn default() -> Self {
        Self::Uncompressed
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uncompressed" | "none" => Ok(Self::Uncompressed),
            "zip" => Ok(Self::ZIP),
            "zlib" => Ok(Self::ZLIB),
            "bzip2" => Ok(Self::BZip2),
            _ => bail!("unknown compression algorithm {}", s),
        }
    }
}
