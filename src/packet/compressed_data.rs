use std::io::{self, Read};

use bytes::{Buf, Bytes};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::Compression;
use log::debug;

use crate::errors::Result;
use crate::packet::{PacketHeader, PacketTrait};
use crate::parsing::BufParsing;
use crate::ser::Serialize;
use crate::types::{CompressionAlgorithm, Tag};

/// Compressed Data Packet
/// <https://www.rfc-editor.org/rfc/rfc9580.html#name-compressed-data-packet-typ>
#[derive(Clone, PartialEq, Eq, derive_more::Debug)]
pub struct CompressedData {
    packet_header: PacketHeader,
    compression_algorithm: CompressionAlgorithm,
    #[debug("{}", hex::encode(compressed_data))]
    compressed_data: Bytes,
}

pub enum Decompressor<R> {
    Uncompressed(R),
    Zip(DeflateDecoder<R>),
    Zlib(ZlibDecoder<R>),
}

impl<R: Read> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decompressor::Uncompressed(r) => r.read(buf),
            Decompressor::Zip(r) => r.read(buf),
            Decompressor::Zlib(r) => r.read(buf),
        }
    }
}

impl CompressedData {
    /// Compresses `data`, which must be a serialized packet sequence.
    pub fn compress(alg: CompressionAlgorithm, data: &[u8]) -> Result<Self> {
        debug!("compressing {} bytes with {:?}", data.len(), alg);

        let compressed_data = match alg {
            CompressionAlgorithm::Uncompressed => data.to_vec(),
            CompressionAlgorithm::ZIP => {
                let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
                io::Write::write_all(&mut enc, data)?;
                enc.finish()?
            }
            CompressionAlgorithm::ZLIB => {
                let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
                io::Write::write_all(&mut enc, data)?;
                enc.finish()?
            }
            CompressionAlgorithm::BZip2 | CompressionAlgorithm::Other(_) => {
                unsupported_err!("compression algorithm {:?}", alg)
            }
        };

        let len = 1 + compressed_data.len();
        Ok(CompressedData {
            packet_header: PacketHeader::new_fixed(Tag::CompressedData, len),
            compression_algorithm: alg,
            compressed_data: compressed_data.into(),
        })
    }

    /// Parses a `CompressedData` packet from the given buffer.
    pub fn try_from_buf<B: Buf>(packet_header: PacketHeader, mut i: B) -> Result<Self> {
        let alg = CompressionAlgorithm::from(i.read_u8()?);

        Ok(CompressedData {
            packet_header,
            compression_algorithm: alg,
            compressed_data: i.rest(),
        })
    }

    pub fn compression_algorithm(&self) -> CompressionAlgorithm {
        self.compression_algorithm
    }

    pub fn decompress(&self) -> Result<Decompressor<&[u8]>> {
        match self.compression_algorithm {
            CompressionAlgorithm::Uncompressed => {
                Ok(Decompressor::Uncompressed(&self.compressed_data[..]))
            }
            CompressionAlgorithm::ZIP => Ok(Decompressor::Zip(DeflateDecoder::new(
                &self.compressed_data[..],
            ))),
            CompressionAlgorithm::ZLIB => Ok(Decompressor::Zlib(ZlibDecoder::new(
                &self.compressed_data[..],
            ))),
            CompressionAlgorithm::BZip2 | CompressionAlgorithm::Other(_) => {
                unsupported_err!("compression algorithm {:?}", self.compression_algorithm)
            }
        }
    }

    /// Decompresses the full body into memory.
    pub fn decompress_to_vec(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.decompress()?.read_to_end(&mut out)?;
        Ok(out)
    }
}

impl Serialize for CompressedData {
    fn to_writer<W: io::Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&[self.compression_algorithm.into()])?;
        writer.write_all(&self.compressed_data)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        1 + self.compressed_data.len()
    }
}

impl PacketTrait for CompressedData {
    fn packet_header(&self) -> &PacketHeader {
        &self.packet_header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let data = b"The quick brown fox jumps over the lazy dog. ".repeat(20);

        for alg in [
            CompressionAlgorithm::Uncompressed,
            CompressionAlgorithm::ZIP,
            CompressionAlgorithm::ZLIB,
        ] {
            let packet = CompressedData::compress(alg, &data).unwrap();
            if alg != CompressionAlgorithm::Uncompressed {
                assert!(packet.write_len() < data.len(), "{alg:?}");
            }

            let body = packet.to_bytes().unwrap();
            let parsed = CompressedData::try_from_buf(*packet.packet_header(), &body[..]).unwrap();
            assert_eq!(parsed.compression_algorithm(), alg);
            assert_eq!(parsed.decompress_to_vec().unwrap(), data);
        }
    }

    #[test]
    fn test_bzip2_unsupported() {
        assert!(CompressedData::compress(CompressionAlgorithm::BZip2, b"abc").is_err());
    }
}
