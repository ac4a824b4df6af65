//! # Armor module
//!
//! ASCII armor, <https://www.rfc-editor.org/rfc/rfc9580.html#name-forming-ascii-armor>.

mod reader;
mod writer;

use std::{collections::BTreeMap, fmt, io, str::FromStr};

use crate::errors::{Error, Result};
use crate::ser::Serialize;

pub use self::reader::{decode, is_armored, Dearmored};
pub use self::writer::write;

/// Armor block types.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum BlockType {
    /// PGP public key
    PublicKey,
    /// PGP private key
    PrivateKey,
    Message,
    MultiPartMessage(usize, usize),
    Signature,
    // gnupgp extension
    File,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::PublicKey => f.write_str("PGP PUBLIC KEY BLOCK"),
            BlockType::PrivateKey => f.write_str("PGP PRIVATE KEY BLOCK"),
            BlockType::MultiPartMessage(x, y) => write!(f, "PGP MESSAGE, PART {x}/{y}"),
            BlockType::Message => f.write_str("PGP MESSAGE"),
            BlockType::Signature => f.write_str("PGP SIGNATURE"),
            BlockType::File => f.write_str("PGP ARMORED FILE"),
        }
    }
}

impl FromStr for BlockType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let typ = match s {
            "PGP PUBLIC KEY BLOCK" => BlockType::PublicKey,
            "PGP PRIVATE KEY BLOCK" => BlockType::PrivateKey,
            "PGP MESSAGE" => BlockType::Message,
            "PGP SIGNATURE" => BlockType::Signature,
            "PGP ARMORED FILE" => BlockType::File,
            _ => {
                let Some(part) = s.strip_prefix("PGP MESSAGE, PART ") else {
                    return Err(Error::InvalidArmorWrappers);
                };
                let (x, y) = part.split_once('/').unwrap_or((part, "0"));
                let x = x.parse().map_err(|_| Error::InvalidArmorWrappers)?;
                let y = y.parse().map_err(|_| Error::InvalidArmorWrappers)?;
                BlockType::MultiPartMessage(x, y)
            }
        };

        Ok(typ)
    }
}

impl Serialize for BlockType {
    fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
        write!(w, "{self}")?;

        Ok(())
    }

    fn write_len(&self) -> usize {
        // allocates, but this is tiny, should be fine
        let x = self.to_string();
        x.len()
    }
}

/// Armor Headers.
pub type Headers = BTreeMap<String, Vec<String>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_type() {
        for typ in [
            BlockType::PublicKey,
            BlockType::PrivateKey,
            BlockType::Message,
            BlockType::MultiPartMessage(1, 2),
            BlockType::Signature,
            BlockType::File,
        ] {
            assert_eq!(typ.to_string().parse::<BlockType>().unwrap(), typ);
        }
        assert_eq!(
            "PGP MESSAGE, PART 3".parse::<BlockType>().unwrap(),
            BlockType::MultiPartMessage(3, 0)
        );
        assert!("PGP NOTHING".parse::<BlockType>().is_err());
    }
}
