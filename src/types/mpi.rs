use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use bytes::{Buf, Bytes};
use num_bigint::BigUint;

use crate::errors::{Error, Result};
use crate::parsing::BufParsing;
use crate::ser::Serialize;

/// Number of bits we accept when reading or writing MPIs.
/// The value is the same as gnupgs.
const MAX_EXTERN_MPI_BITS: u16 = 16384;

/// Represents an owned MPI value.
/// The inner value is ready to be serialized, without the need to strip leading zeros.
///
/// Ref: <https://www.rfc-editor.org/rfc/rfc9580.html#name-multiprecision-integers>
#[derive(Default, Clone, PartialEq, Eq, derive_more::Debug)]
pub struct Mpi(#[debug("{}", hex::encode(_0))] Bytes);

impl Mpi {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses the given buffer as an MPI.
    ///
    /// The buffer is expected to be length-prefixed.
    pub fn from_buf<B: Buf>(mut i: B) -> Result<Self> {
        let len_bits = i.read_be_u16()?;

        if len_bits > MAX_EXTERN_MPI_BITS {
            return Err(Error::InvalidInput);
        }

        let len_bytes = (len_bits + 7) >> 3;

        let n = i.read_take(usize::from(len_bytes))?;
        let n_stripped = strip_leading_zeros(&n);
        let n_stripped = n.slice_ref(n_stripped);

        Ok(Mpi(n_stripped))
    }

    /// Represent the data in `raw` as an Mpi.
    /// Note that `raw` is not expected to be length-prefixed!
    ///
    /// Strips leading zeros.
    pub fn from_slice(raw: &[u8]) -> Self {
        Self(strip_leading_zeros(raw).to_vec().into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Left pads the value with zeros to `size` bytes.
    pub(crate) fn to_padded(&self, size: usize) -> Result<Vec<u8>> {
        ensure!(self.0.len() <= size, "mpi is longer than {} bytes", size);

        let mut out = vec![0u8; size];
        out[size - self.0.len()..].copy_from_slice(&self.0);
        Ok(out)
    }
}

/// Returns the bit length of a given slice.
#[inline]
fn bit_size(val: &[u8]) -> usize {
    if val.is_empty() {
        0
    } else {
        (val.len() * 8) - val[0].leading_zeros() as usize
    }
}

#[inline]
fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    bytes
        .iter()
        .position(|b| b != &0)
        .map_or(&[], |offset| &bytes[offset..])
}

impl AsRef<[u8]> for Mpi {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Serialize for Mpi {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        let bytes = &self.0;
        let size = bit_size(bytes);
        w.write_u16::<BigEndian>(size as u16)?;
        w.write_all(bytes)?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        2 + self.0.len()
    }
}

impl From<BigUint> for Mpi {
    fn from(other: BigUint) -> Self {
        Mpi::from_slice(&other.to_bytes_be())
    }
}

impl From<&BigUint> for Mpi {
    fn from(other: &BigUint) -> Self {
        Mpi::from_slice(&other.to_bytes_be())
    }
}

impl From<&Mpi> for BigUint {
    fn from(other: &Mpi) -> Self {
        BigUint::from_bytes_be(other.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_mpi() {
        // Decode the number `511` (`0x1FF` in hex).
        assert_eq!(
            Mpi::from_buf(&mut &[0x00, 0x09, 0x01, 0xFF][..]).unwrap(),
            Mpi::from_slice(&[0x01, 0xFF][..])
        );

        // leading zeros in the encoding are dropped
        assert_eq!(
            Mpi::from_buf(&mut &[0x00, 0x10, 0x00, 0x7F][..]).unwrap(),
            Mpi::from_slice(&[0x7F][..])
        );
    }

    #[test]
    fn test_mpi_too_large() {
        let err = Mpi::from_buf(&mut &[0xFF, 0xFF, 0x01][..]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput));
    }

    #[test]
    fn test_mpi_truncated() {
        assert!(Mpi::from_buf(&mut &[0x00, 0x20, 0x01][..]).is_err());
    }

    #[test]
    fn test_padded() {
        let m = Mpi::from_slice(&[0x00, 0x01, 0x02]);
        assert_eq!(m.to_padded(4).unwrap(), vec![0, 0, 1, 2]);
        assert!(m.to_padded(1).is_err());
    }

    #[test]
    fn test_strip_leading_zeros_with_all_zeros() {
        let buf = [0u8, 0u8, 0u8];
        let stripped: &[u8] = strip_leading_zeros(&buf[..]);
        assert!(stripped.is_empty());
    }

    proptest! {
        #[test]
        fn mpi_write_len(v in proptest::collection::vec(any::<u8>(), 1..500)) {
            let m = Mpi::from_slice(&v);
            let mut buf = Vec::new();
            m.to_writer(&mut buf)?;

            prop_assert_eq!(m.write_len(), buf.len());
        }

        #[test]
        fn mpi_bigint_agrees(v in proptest::collection::vec(any::<u8>(), 1..64)) {
            let m = Mpi::from_slice(&v);
            let n: BigUint = (&m).into();
            prop_assert_eq!(Mpi::from(n), m);
        }
    }
}
