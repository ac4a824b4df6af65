use std::hash::Hasher;
use std::str::FromStr;

use base64::engine::{general_purpose, Engine as _};
use crc24::Crc24Hasher;
use log::{debug, warn};

use crate::armor::{BlockType, Headers};
use crate::errors::{Error, Result};

const BEGIN: &str = "-----BEGIN ";
const END: &str = "-----END ";
const DASHES: &str = "-----";

/// A fully decoded armor block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dearmored {
    pub typ: BlockType,
    pub headers: Headers,
    pub data: Vec<u8>,
    /// The checksum found in the armor, if any.
    pub checksum: Option<u32>,
}

/// Returns true if `input`, ignoring leading whitespace, starts with an armor header line.
///
/// Binary packets always start with an octet that has the high bit set, so they can never
/// be mistaken for armor.
pub fn is_armored(input: &[u8]) -> bool {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());

    input[start..].starts_with(BEGIN.as_bytes())
}

/// Decodes the first armor block found in `input`.
///
/// Text before the header line is ignored, as is anything after the footer line.
pub fn decode(input: &[u8]) -> Result<Dearmored> {
    let input = std::str::from_utf8(input)?;
    let mut lines = input.lines().map(|l| l.trim_end());

    // header line
    let typ = loop {
        let Some(line) = lines.next() else {
            return Err(Error::InvalidArmorWrappers);
        };
        if let Some(rest) = line.strip_prefix(BEGIN) {
            let name = rest
                .strip_suffix(DASHES)
                .ok_or(Error::InvalidArmorWrappers)?;
            break BlockType::from_str(name)?;
        }
    };
    debug!("dearmoring {}", typ);

    // armor headers, terminated by an empty line
    let mut headers = Headers::new();
    let mut body = String::new();
    for line in lines.by_ref() {
        if line.is_empty() {
            break;
        }
        match line.split_once(": ") {
            Some((key, value)) => {
                headers
                    .entry(key.to_string())
                    .or_default()
                    .push(value.to_string());
            }
            None => {
                // some writers omit the blank line when there are no headers
                warn!("armor header without separator, treating as body");
                body.push_str(line);
                break;
            }
        }
    }

    // body, checksum and footer
    let mut checksum = None;
    let mut footer = None;
    for line in lines {
        if let Some(rest) = line.strip_prefix(END) {
            footer = Some(rest);
            break;
        }
        if checksum.is_some() {
            // nothing but the footer may follow the checksum
            return Err(Error::InvalidArmorWrappers);
        }
        if let Some(crc) = line.strip_prefix('=').filter(|c| c.len() == 4) {
            checksum = Some(read_checksum(crc)?);
            continue;
        }
        body.push_str(line.trim());
    }

    let name = footer
        .and_then(|f| f.strip_suffix(DASHES))
        .ok_or(Error::InvalidArmorWrappers)?;
    if BlockType::from_str(name)? != typ {
        return Err(Error::InvalidArmorWrappers);
    }

    let data = general_purpose::STANDARD.decode(body.as_bytes())?;

    if let Some(expected) = checksum {
        let mut hasher = Crc24Hasher::new();
        hasher.write(&data);
        let actual = hasher.finish() as u32;
        if actual != expected {
            return Err(Error::InvalidChecksum);
        }
    }

    Ok(Dearmored {
        typ,
        headers,
        data,
        checksum,
    })
}

fn read_checksum(crc: &str) -> Result<u32> {
    let raw = general_purpose::STANDARD.decode(crc)?;
    if raw.len() != 3 {
        return Err(Error::InvalidChecksum);
    }

    Ok(u32::from(raw[0]) << 16 | u32::from(raw[1]) << 8 | u32::from(raw[2]))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::armor::write;
    use crate::ser::Serialize;

    struct Raw(Vec<u8>);

    impl Serialize for Raw {
        fn to_writer<W: std::io::Write>(&self, w: &mut W) -> Result<()> {
            w.write_all(&self.0)?;
            Ok(())
        }

        fn write_len(&self) -> usize {
            self.0.len()
        }
    }

    #[test]
    fn test_roundtrip() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut headers = Headers::new();
        headers.insert("Version".into(), vec!["1".into()]);

        let mut armored = Vec::new();
        write(&Raw(data.clone()), BlockType::PublicKey, &mut armored, Some(&headers), true)
            .unwrap();
        assert!(is_armored(&armored));

        let decoded = decode(&armored).unwrap();
        assert_eq!(decoded.typ, BlockType::PublicKey);
        assert_eq!(decoded.headers, headers);
        assert_eq!(decoded.data, data);
        assert!(decoded.checksum.is_some());
    }

    #[test]
    fn test_no_checksum_crlf() {
        let input = "garbage before\r\n-----BEGIN PGP MESSAGE-----\r\n\r\naGVs\r\nbG8=\r\n-----END PGP MESSAGE-----\r\ntrailing";
        let decoded = decode(input.as_bytes()).unwrap();
        assert_eq!(decoded.typ, BlockType::Message);
        assert_eq!(decoded.data, b"hello");
        assert_eq!(decoded.checksum, None);
    }

    #[test]
    fn test_bad_checksum() {
        let mut armored = Vec::new();
        write(&Raw(b"hello".to_vec()), BlockType::Message, &mut armored, None, true).unwrap();
        let text = String::from_utf8(armored).unwrap();
        let broken = text.replace("aGVsbG8=", "aGVtbG8=");

        let err = decode(broken.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::InvalidChecksum), "{err:?}");
    }

    #[test]
    fn test_bad_wrappers() {
        let mismatched = "-----BEGIN PGP MESSAGE-----\n\naGVsbG8=\n-----END PGP SIGNATURE-----\n";
        assert!(matches!(
            decode(mismatched.as_bytes()).unwrap_err(),
            Error::InvalidArmorWrappers
        ));

        let missing_footer = "-----BEGIN PGP MESSAGE-----\n\naGVsbG8=\n";
        assert!(matches!(
            decode(missing_footer.as_bytes()).unwrap_err(),
            Error::InvalidArmorWrappers
        ));

        assert!(matches!(
            decode(b"no armor here").unwrap_err(),
            Error::InvalidArmorWrappers
        ));
    }

    #[test]
    fn test_is_armored() {
        assert!(is_armored(b"\n  -----BEGIN PGP SIGNATURE-----\n"));
        assert!(!is_armored(&[0xC6, 0x01, 0x00]));
        assert!(!is_armored(b""));
    }
}
