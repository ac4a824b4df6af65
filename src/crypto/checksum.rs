use sha1::{Digest, Sha1};

use crate::errors::Result;

/// Two octet checksum: sum of all octets mod 65536.
#[inline]
pub fn calculate_simple(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, v| acc.wrapping_add(u16::from(*v)))
}

/// Validates a two octet checksum, as used for session keys and
/// unprotected secret key material.
#[inline]
pub fn simple(actual: [u8; 2], data: &[u8]) -> Result<()> {
    let checksum = u16::from_be_bytes(actual);
    let expected_checksum = calculate_simple(data);

    ensure_eq!(checksum, expected_checksum, "invalid simple checksum");

    Ok(())
}

/// SHA1 checksum, first 20 octets.
#[inline]
pub fn calculate_sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_checksum_wraps() {
        let data = vec![0xFFu8; 300];
        let sum = calculate_simple(&data);
        assert_eq!(u32::from(sum), (0xFFu32 * 300) & 0xFFFF);
        simple(sum.to_be_bytes(), &data).unwrap();
        assert!(simple([0, 0], &data).is_err());
    }
}
