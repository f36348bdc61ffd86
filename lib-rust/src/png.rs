//! Splits a byte stream of back-to-back PNG files (ffmpeg's `image2pipe`
//! output) into one buffer per image.

use crate::error::{Error, Result};
use std::io::{self, Read};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

/// PNG caps chunk lengths at 2^31 - 1.
const MAX_CHUNK_LEN: u32 = 0x7fff_ffff;

/// Reads whole PNG records from a pipe, one at a time.
///
/// A record is the 8-byte signature followed by length-prefixed chunks
/// (`length`, `type`, `data`, `crc`) up to and including `IEND`.
pub struct PngRecordReader<R: Read> {
    reader: R,
    records: u64,
}

impl<R: Read> PngRecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, records: 0 }
    }

    /// Records returned so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// The next complete PNG, or `None` at end of stream.
    ///
    /// A short or empty read where a signature should start is end of
    /// stream. A wrong signature, or a stream that ends inside a record, is
    /// an error.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut signature = [0u8; 8];
        let read = read_full(&mut self.reader, &mut signature)?;
        if read < signature.len() {
            return Ok(None);
        }
        if signature != PNG_SIGNATURE {
            return Err(format!(
                "invalid PNG signature {:02x?} at record {}",
                signature, self.records
            )
            .into());
        }

        let mut data = signature.to_vec();
        loop {
            let mut header = [0u8; 8];
            self.read_exact(&mut header)?;
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
            if len > MAX_CHUNK_LEN {
                return Err(format!("PNG chunk length {} out of range", len).into());
            }
            data.extend_from_slice(&header);

            // chunk data + 4-byte crc, grown as bytes arrive so a bogus
            // length can't allocate ahead of the stream
            let want = u64::from(len) + 4;
            let read = (&mut self.reader).take(want).read_to_end(&mut data)?;
            if (read as u64) < want {
                return Err(format!(
                    "truncated PNG record {}: chunk {} wants {} bytes, got {}",
                    self.records,
                    String::from_utf8_lossy(&header[4..8]),
                    want,
                    read
                )
                .into());
            }

            if &header[4..8] == b"IEND" {
                break;
            }
        }

        self.records += 1;
        Ok(Some(data))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| {
            Error::from(e).context(format!("truncated PNG record {}", self.records))
        })
    }
}

/// Like `read_exact`, but reports how much was read instead of failing at EOF.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb(color));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    /// Delivers at most `chunk` bytes per read, like a pipe.
    struct Trickle<R> {
        inner: R,
        chunk: usize,
    }

    impl<R: Read> Read for Trickle<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.inner.read(&mut buf[..n])
        }
    }

    #[test]
    fn splits_concatenated_images() -> Result<()> {
        let first = encode_png(4, 2, [255, 0, 0]);
        let second = encode_png(3, 3, [0, 0, 255]);
        let stream = [first.clone(), second.clone()].concat();

        let mut reader = PngRecordReader::new(Trickle {
            inner: Cursor::new(stream),
            chunk: 3,
        });
        assert_eq!(reader.next_record()?, Some(first));
        assert_eq!(reader.next_record()?, Some(second.clone()));
        assert_eq!(reader.next_record()?, None);
        assert_eq!(reader.records(), 2);

        let decoded = image::load_from_memory(&second)?.to_rgb8();
        assert_eq!(decoded.dimensions(), (3, 3));
        Ok(())
    }

    #[test]
    fn empty_stream_is_end_of_stream() -> Result<()> {
        let mut reader = PngRecordReader::new(Cursor::new(Vec::new()));
        assert_eq!(reader.next_record()?, None);
        Ok(())
    }

    #[test]
    fn short_read_at_record_start_is_end_of_stream() -> Result<()> {
        let mut stream = encode_png(1, 1, [0, 0, 0]);
        stream.extend_from_slice(&PNG_SIGNATURE[..3]);
        let mut reader = PngRecordReader::new(Cursor::new(stream));
        assert!(reader.next_record()?.is_some());
        assert_eq!(reader.next_record()?, None);
        Ok(())
    }

    #[test]
    fn wrong_signature_is_an_error() {
        let mut reader = PngRecordReader::new(Cursor::new(b"GIF89a\0\0rest".to_vec()));
        assert!(reader.next_record().is_err());
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut stream = encode_png(2, 2, [9, 9, 9]);
        stream.truncate(stream.len() - 6);
        let mut reader = PngRecordReader::new(Cursor::new(stream));
        assert!(reader.next_record().is_err());
    }

    #[test]
    fn huge_chunk_length_in_short_stream_is_an_error() {
        let mut stream = PNG_SIGNATURE.to_vec();
        stream.extend_from_slice(&0x7fff_0000u32.to_be_bytes());
        stream.extend_from_slice(b"IDAT");
        stream.extend_from_slice(&[0u8; 16]);
        let mut reader = PngRecordReader::new(Cursor::new(stream));
        let err = reader.next_record().unwrap_err();
        assert!(err.to_string().contains("truncated"), "{}", err);
    }

    #[test]
    fn chunk_length_beyond_png_limit_is_rejected() {
        let mut stream = PNG_SIGNATURE.to_vec();
        stream.extend_from_slice(&u32::MAX.to_be_bytes());
        stream.extend_from_slice(b"IDAT");
        let mut reader = PngRecordReader::new(Cursor::new(stream));
        assert!(reader.next_record().is_err());
    }
}
