use std::hash::Hasher;
use std::io::Write;

use base64::engine::{general_purpose, Engine as _};
use crc24::Crc24Hasher;

use crate::armor::{BlockType, Headers};
use crate::errors::Result;
use crate::ser::Serialize;

/// Characters of base64 per armored line.
const LINE_LEN: usize = 64;

pub fn write(
    source: &impl Serialize,
    typ: BlockType,
    writer: &mut impl Write,
    headers: Option<&Headers>,
    include_checksum: bool,
) -> Result<()> {
    // write armor header
    writer.write_all(&b"-----BEGIN "[..])?;
    typ.to_writer(writer)?;
    writer.write_all(&b"-----\n"[..])?;

    // write armor headers
    if let Some(headers) = headers {
        for (key, values) in headers.iter() {
            for value in values {
                writer.write_all(key.as_bytes())?;
                writer.write_all(&b": "[..])?;
                writer.write_all(value.as_bytes())?;
                writer.write_all(&b"\n"[..])?;
            }
        }
    }

    writer.write_all(&b"\n"[..])?;

    // write body
    let body = source.to_bytes()?;
    let encoded = general_purpose::STANDARD.encode(&body);
    for line in encoded.as_bytes().chunks(LINE_LEN) {
        writer.write_all(line)?;
        writer.write_all(&b"\n"[..])?;
    }

    // write crc
    if include_checksum {
        let mut crc_hasher = Crc24Hasher::new();
        crc_hasher.write(&body);
        let crc = crc_hasher.finish() as u32;
        let crc_buf = [
            // (crc >> 24) as u8,
            (crc >> 16) as u8,
            (crc >> 8) as u8,
            crc as u8,
        ];
        let crc_enc = general_purpose::STANDARD.encode(crc_buf);

        writer.write_all(b"=")?;
        writer.write_all(crc_enc.as_bytes())?;
        writer.write_all(&b"\n"[..])?;
    }

    // write footer
    writer.write_all(&b"-----END "[..])?;
    typ.to_writer(writer)?;
    writer.write_all(&b"-----\n"[..])?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    use super::*;

    struct TestSource {
        content: Vec<u8>,
    }

    impl Serialize for TestSource {
        fn to_writer<W: io::Write>(&self, w: &mut W) -> Result<()> {
            w.write_all(&self.content)?;
            Ok(())
        }

        fn write_len(&self) -> usize {
            self.content.len()
        }
    }

    #[test]
    fn writes_no_doubleline() {
        let rng = &mut ChaCha8Rng::seed_from_u64(0);

        for i in 2..1024 {
            let content: Vec<u8> = (0..i).map(|_| rng.gen()).collect();
            let source = TestSource { content };

            let mut dest = Vec::new();
            write(&source, BlockType::Message, &mut dest, None, true).unwrap();

            let dest_str = std::str::from_utf8(&dest).unwrap();
            let lines = dest_str.lines().collect::<Vec<_>>();

            assert_eq!(lines[0], "-----BEGIN PGP MESSAGE-----");
            assert!(
                !lines[lines.len() - 3].is_empty(),
                "last line must not be empty"
            );
            assert!(lines.iter().all(|l| l.len() <= LINE_LEN));
            assert_eq!(
                lines[lines.len() - 2].len(),
                5,
                "invalid checksum line: '{}'",
                lines[lines.len() - 2]
            );
            assert_eq!(lines[lines.len() - 1], "-----END PGP MESSAGE-----");
        }
    }

    #[test]
    fn writes_headers() {
        let source = TestSource {
            content: b"hello".to_vec(),
        };
        let mut headers = Headers::new();
        headers.insert("Comment".into(), vec!["one".into(), "two".into()]);

        let mut dest = Vec::new();
        write(&source, BlockType::Signature, &mut dest, Some(&headers), false).unwrap();

        assert_eq!(
            std::str::from_utf8(&dest).unwrap(),
            "-----BEGIN PGP SIGNATURE-----\nComment: one\nComment: two\n\naGVsbG8=\n-----END PGP SIGNATURE-----\n"
        );
    }
}
