use bytes::Buf;
use chrono::{DateTime, Utc};

use crate::crypto::hash::HashAlgorithm;
use crate::crypto::public_key::PublicKeyAlgorithm;
use crate::errors::Result;
use crate::packet::signature::{SignatureConfig, SignatureVersionSpecific};
use crate::packet::{PacketHeader, Signature, SignatureType, SignatureVersion, Subpacket};
use crate::parsing::BufParsing;
use crate::types::{KeyId, Mpi};

impl Signature {
    /// Parses a `Signature` packet from the given buffer.
    pub fn try_from_buf<B: Buf>(packet_header: PacketHeader, mut i: B) -> Result<Self> {
        let version = SignatureVersion::from(i.read_u8()?);

        let config = match version {
            SignatureVersion::V2 | SignatureVersion::V3 => v3_config(version, &mut i)?,
            SignatureVersion::V4 => v4_config(&mut i)?,
            SignatureVersion::Other(v) => unsupported_err!("signature version {}", v),
        };

        let signed_hash_value = i.read_array::<2>()?;
        let signature = mpis(config.pub_alg, &mut i)?;

        Ok(Signature {
            packet_header,
            config,
            signed_hash_value,
            signature,
        })
    }
}

/// Convert an epoch timestamp to a `DateTime`
fn dt_from_timestamp(ts: u32) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(i64::from(ts), 0)
        .ok_or_else(|| format_err!("invalid timestamp {}", ts))
}

/// Parse a v2 or v3 signature body, after the version octet.
fn v3_config<B: Buf>(version: SignatureVersion, i: &mut B) -> Result<SignatureConfig> {
    // length of the hashed material, always 5
    let hashed_len = i.read_u8()?;
    ensure_eq!(hashed_len, 5, "invalid v3 hashed material length");

    let typ = SignatureType::from(i.read_u8()?);
    let created = dt_from_timestamp(i.read_be_u32()?)?;
    let issuer = KeyId::from(i.read_array::<8>()?);
    let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
    let hash_alg = HashAlgorithm::from(i.read_u8()?);

    let version_specific = match version {
        SignatureVersion::V2 => SignatureVersionSpecific::V2 { created, issuer },
        _ => SignatureVersionSpecific::V3 { created, issuer },
    };

    Ok(SignatureConfig {
        typ,
        pub_alg,
        hash_alg,
        hashed_subpackets: Vec::new(),
        unhashed_subpackets: Vec::new(),
        version_specific,
    })
}

/// Parse a v4 signature body, after the version octet.
fn v4_config<B: Buf>(i: &mut B) -> Result<SignatureConfig> {
    let typ = SignatureType::from(i.read_u8()?);
    let pub_alg = PublicKeyAlgorithm::from(i.read_u8()?);
    let hash_alg = HashAlgorithm::from(i.read_u8()?);

    let hashed_len = i.read_be_u16()?;
    let hashed_area = i.read_take(hashed_len.into())?;
    let hashed_subpackets = Subpacket::from_area(hashed_area)?;

    let unhashed_len = i.read_be_u16()?;
    let unhashed_area = i.read_take(unhashed_len.into())?;
    let unhashed_subpackets = Subpacket::from_area(unhashed_area)?;

    Ok(SignatureConfig {
        typ,
        pub_alg,
        hash_alg,
        hashed_subpackets,
        unhashed_subpackets,
        version_specific: SignatureVersionSpecific::V4,
    })
}

/// Reads the algorithm specific signature values.
fn mpis<B: Buf>(alg: PublicKeyAlgorithm, i: &mut B) -> Result<Vec<Mpi>> {
    if alg.is_rsa() {
        let mpi = Mpi::from_buf(&mut *i)?;
        ensure!(!i.has_remaining(), "trailing data after RSA signature");
        return Ok(vec![mpi]);
    }

    // kept for serialization only, these can not be verified
    let mut values = Vec::new();
    while i.has_remaining() {
        values.push(Mpi::from_buf(&mut *i)?);
    }
    Ok(values)
}
