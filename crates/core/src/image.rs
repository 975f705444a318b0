//! PNG image codec: raw pixel buffers to complete PNG streams and back.
//!
//! Encoding filters every scanline, compresses the result as one zlib
//! stream, and assembles `signature | IHDR | IDAT | IEND`. Decoding walks
//! the chunk sequence, concatenates every IDAT payload into a single zlib
//! stream (never inflating them independently), and reverses the filters.

use std::io;
use std::path::Path;

use crate::chunk::{self, ChunkWalker};
use crate::{checksum, deflate, filter, inflate};
use crate::{Error, PNG_SIGNATURE};

pub const COLOR_GRAYSCALE: u8 = 0;
pub const COLOR_RGB: u8 = 2;
pub const COLOR_INDEXED: u8 = 3;
pub const COLOR_GRAY_ALPHA: u8 = 4;
pub const COLOR_RGBA: u8 = 6;

/// Compression level used for image data.
const IDAT_LEVEL: u32 = 8;

/// A decoded image: tightly packed rows, no stride padding. 16-bit samples
/// stay as the two raw big-endian bytes; interpretation is the caller's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub bit_depth: u8,
}

/// The 13-byte IHDR payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ihdr {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub compression: u8,
    pub filter: u8,
    pub interlace: u8,
}

impl Ihdr {
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() != 13 {
            return Err(Error::Malformed);
        }
        Ok(Ihdr {
            width: chunk::u32_be(data, 0),
            height: chunk::u32_be(data, 4),
            bit_depth: data[8],
            color_type: data[9],
            compression: data[10],
            filter: data[11],
            interlace: data[12],
        })
    }

    pub fn to_bytes(&self) -> [u8; 13] {
        let mut out = [0u8; 13];
        out[..4].copy_from_slice(&self.width.to_be_bytes());
        out[4..8].copy_from_slice(&self.height.to_be_bytes());
        out[8] = self.bit_depth;
        out[9] = self.color_type;
        out[10] = self.compression;
        out[11] = self.filter;
        out[12] = self.interlace;
        out
    }

    /// Samples per pixel for this color type.
    pub fn channels(&self) -> Result<u8, Error> {
        match self.color_type {
            COLOR_GRAYSCALE => Ok(1),
            COLOR_GRAY_ALPHA => Ok(2),
            COLOR_RGB => Ok(3),
            COLOR_RGBA => Ok(4),
            _ => Err(Error::UnsupportedFormat),
        }
    }
}

fn color_type_for(channels: u8) -> Result<u8, Error> {
    match channels {
        1 => Ok(COLOR_GRAYSCALE),
        2 => Ok(COLOR_GRAY_ALPHA),
        3 => Ok(COLOR_RGB),
        4 => Ok(COLOR_RGBA),
        _ => Err(Error::UnsupportedFormat),
    }
}

/// Encode a pixel buffer as a complete PNG stream.
///
/// `pixels` must hold exactly `width * height * channels * bit_depth / 8`
/// bytes, row-major with no padding.
pub fn encode_image(
    pixels: &[u8],
    width: u32,
    height: u32,
    channels: u8,
    bit_depth: u8,
) -> Result<Vec<u8>, Error> {
    if width == 0 || height == 0 || !matches!(bit_depth, 8 | 16) {
        return Err(Error::UnsupportedFormat);
    }
    let color_type = color_type_for(channels)?;
    let bpp = channels as usize * (bit_depth as usize / 8);
    let row_bytes = (width as usize)
        .checked_mul(bpp)
        .ok_or(Error::CapacityExceeded)?;
    let expected = row_bytes
        .checked_mul(height as usize)
        .ok_or(Error::CapacityExceeded)?;
    if pixels.len() != expected {
        return Err(Error::UnsupportedFormat);
    }

    let ihdr = Ihdr {
        width,
        height,
        bit_depth,
        color_type,
        compression: 0,
        filter: 0,
        interlace: 0,
    };
    let filtered = filter::apply_filters(pixels, row_bytes, height as usize, bpp);
    let idat = deflate::deflate_zlib(&filtered, IDAT_LEVEL);

    let mut out = Vec::with_capacity(idat.len() + 128);
    out.extend_from_slice(&PNG_SIGNATURE);
    chunk::write_chunk(&mut out, chunk::IHDR, &ihdr.to_bytes());
    chunk::write_chunk(&mut out, chunk::IDAT, &idat);
    chunk::write_chunk(&mut out, chunk::IEND, &[]);
    Ok(out)
}

/// Decode a PNG stream into raw pixels.
///
/// Rejects indexed color, bit depths other than 8/16, and interlaced
/// streams. Critical chunks must pass their CRC; ancillary chunks with a bad
/// CRC are ignored with a warning.
pub fn decode_image(buffer: &[u8]) -> Result<Image, Error> {
    let mut walker = ChunkWalker::new(buffer)?;
    let first = walker.next()?.ok_or(Error::Malformed)?;
    if first.fourcc != chunk::IHDR {
        return Err(Error::Malformed);
    }
    if checksum::chunk_crc(&first.fourcc, first.data) != first.crc {
        return Err(Error::ChecksumMismatch);
    }
    let ihdr = Ihdr::parse(first.data)?;
    let channels = ihdr.channels()?;
    if !matches!(ihdr.bit_depth, 8 | 16)
        || ihdr.compression != 0
        || ihdr.filter != 0
        || ihdr.interlace != 0
        || ihdr.width == 0
        || ihdr.height == 0
    {
        return Err(Error::UnsupportedFormat);
    }

    let bpp = channels as usize * (ihdr.bit_depth as usize / 8);
    let row_bytes = (ihdr.width as usize)
        .checked_mul(bpp)
        .ok_or(Error::CapacityExceeded)?;
    let filtered_len = (row_bytes + 1)
        .checked_mul(ihdr.height as usize)
        .ok_or(Error::CapacityExceeded)?;

    let mut idat = Vec::new();
    while let Some(raw) = walker.next()? {
        let crc_ok = checksum::chunk_crc(&raw.fourcc, raw.data) == raw.crc;
        match raw.fourcc {
            chunk::IDAT => {
                if !crc_ok {
                    return Err(Error::ChecksumMismatch);
                }
                idat.extend_from_slice(raw.data);
            }
            chunk::PLTE | chunk::IEND => {
                if !crc_ok {
                    return Err(Error::ChecksumMismatch);
                }
            }
            fourcc => {
                if !crc_ok {
                    log::warn!(
                        "ignoring {} chunk with bad crc",
                        String::from_utf8_lossy(&fourcc)
                    );
                }
            }
        }
    }
    if idat.is_empty() {
        return Err(Error::Malformed);
    }

    let filtered = inflate::inflate_zlib(&idat, filtered_len)?;
    if filtered.len() != filtered_len {
        return Err(Error::Malformed);
    }
    let pixels = filter::remove_filters(&filtered, row_bytes, ihdr.height as usize, bpp)?;
    Ok(Image {
        pixels,
        width: ihdr.width,
        height: ihdr.height,
        channels,
        bit_depth: ihdr.bit_depth,
    })
}

/// Load and decode a PNG file.
pub fn load_image<P: AsRef<Path>>(path: P) -> io::Result<Image> {
    let buffer = std::fs::read(path)?;
    decode_image(&buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Encode raw pixels and write the PNG file.
pub fn save_image<P: AsRef<Path>>(
    path: P,
    pixels: &[u8],
    width: u32,
    height: u32,
    channels: u8,
    bit_depth: u8,
) -> io::Result<()> {
    let buffer = encode_image(pixels, width, height, channels, bit_depth)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    std::fs::write(path, buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::Chunk;
    use crate::{ancillary, chunk};

    fn pseudo_random(len: usize, mut seed: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            out.push(seed as u8);
        }
        out
    }

    #[test]
    fn test_roundtrip_all_formats() {
        for &channels in &[1u8, 2, 3, 4] {
            for &bit_depth in &[8u8, 16] {
                let width = 11u32;
                let height = 7u32;
                let len = width as usize
                    * height as usize
                    * channels as usize
                    * (bit_depth as usize / 8);
                let pixels = pseudo_random(len, channels as u32 * 31 + bit_depth as u32);
                let stream = encode_image(&pixels, width, height, channels, bit_depth).unwrap();
                assert!(chunk::verify_all(&stream).unwrap());
                let image = decode_image(&stream).unwrap();
                assert_eq!(image.pixels, pixels, "ch {channels} depth {bit_depth}");
                assert_eq!(image.width, width);
                assert_eq!(image.height, height);
                assert_eq!(image.channels, channels);
                assert_eq!(image.bit_depth, bit_depth);
            }
        }
    }

    #[test]
    fn test_encode_is_deterministic() {
        let pixels = pseudo_random(64 * 64 * 3, 5);
        let a = encode_image(&pixels, 64, 64, 3, 8).unwrap();
        let b = encode_image(&pixels, 64, 64, 3, 8).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_validates_arguments() {
        let pixels = [0u8; 12];
        assert_eq!(encode_image(&pixels, 0, 2, 3, 8), Err(Error::UnsupportedFormat));
        assert_eq!(encode_image(&pixels, 2, 0, 3, 8), Err(Error::UnsupportedFormat));
        assert_eq!(encode_image(&pixels, 2, 2, 5, 8), Err(Error::UnsupportedFormat));
        assert_eq!(encode_image(&pixels, 2, 2, 3, 4), Err(Error::UnsupportedFormat));
        // wrong buffer size for the declared dimensions
        assert_eq!(encode_image(&pixels, 3, 3, 3, 8), Err(Error::UnsupportedFormat));
    }

    #[test]
    fn test_2x2_rgba_scanline_layout() {
        // four identical magenta pixels
        let pixels: Vec<u8> = (0..4).flat_map(|_| [0xFF, 0x00, 0xFF, 0xFF]).collect();
        let stream = encode_image(&pixels, 2, 2, 4, 8).unwrap();

        let idat = chunk::read_first(&stream, chunk::IDAT).unwrap().unwrap();
        let filtered = crate::inflate::inflate_zlib(&idat.data, 64).unwrap();
        // 2 rows of (1 filter byte + 8 pixel bytes)
        assert_eq!(filtered.len(), 18);
        // row 0 prefers sub, row 1 zeroes out under up
        assert_eq!(filtered[0], crate::filter::FILTER_SUB);
        assert_eq!(filtered[9], crate::filter::FILTER_UP);
        assert!(filtered[10..18].iter().all(|&b| b == 0));

        let image = decode_image(&stream).unwrap();
        assert_eq!(image.pixels, pixels);
    }

    #[test]
    fn test_1x1_gray_framing() {
        let stream = encode_image(&[0x7F], 1, 1, 1, 8).unwrap();
        assert_eq!(&stream[..8], &PNG_SIGNATURE);
        // IHDR length and fourcc follow the signature
        assert_eq!(&stream[8..12], &13u32.to_be_bytes());
        assert_eq!(&stream[12..16], b"IHDR");
        // stream ends with the conventional IEND trailer
        let tail = &stream[stream.len() - 12..];
        assert_eq!(
            tail,
            &[0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82]
        );
    }

    #[test]
    fn test_idat_stream_is_valid_zlib_of_expected_size() {
        let width = 9u32;
        let height = 5u32;
        let pixels = pseudo_random(width as usize * height as usize * 3, 77);
        let stream = encode_image(&pixels, width, height, 3, 8).unwrap();
        let idat = chunk::read_first(&stream, chunk::IDAT).unwrap().unwrap();
        let inflated = crate::inflate::inflate_zlib(&idat.data, 1 << 16).unwrap();
        assert_eq!(inflated.len(), height as usize * (1 + width as usize * 3));
    }

    #[test]
    fn test_decode_multi_idat_as_one_stream() {
        let pixels = pseudo_random(16 * 16 * 4, 13);
        let stream = encode_image(&pixels, 16, 16, 4, 8).unwrap();
        let split = chunk::split_idat(&stream, 16).unwrap();
        assert!(chunk::count(&split).unwrap() > chunk::count(&stream).unwrap());
        let image = decode_image(&split).unwrap();
        assert_eq!(image.pixels, pixels);
        // recombining restores the original stream byte-for-byte
        assert_eq!(chunk::combine_idat(&split).unwrap(), stream);
    }

    #[test]
    fn test_decode_rejects_corrupted_idat() {
        let pixels = pseudo_random(8 * 8 * 3, 21);
        let mut stream = encode_image(&pixels, 8, 8, 3, 8).unwrap();
        let pos = stream.windows(4).position(|w| w == b"IDAT").unwrap();
        stream[pos + 4] ^= 0xFF;
        assert!(!chunk::verify_all(&stream).unwrap());
        assert_eq!(decode_image(&stream), Err(Error::ChecksumMismatch));
    }

    #[test]
    fn test_decode_rejects_unsupported_headers() {
        let pixels = [0x10u8; 4];
        let stream = encode_image(&pixels, 2, 2, 1, 8).unwrap();

        // patch one IHDR byte and refresh the chunk CRC
        let patch = |offset: usize, value: u8| {
            let mut bad = stream.clone();
            bad[16 + offset] = value;
            let crc = checksum::chunk_crc(b"IHDR", &bad[16..29]);
            bad[29..33].copy_from_slice(&crc.to_be_bytes());
            bad
        };
        // color type 3 (indexed) is out of scope
        assert_eq!(decode_image(&patch(9, COLOR_INDEXED)), Err(Error::UnsupportedFormat));
        // bit depth 4, interlaced, and nonzero compression all fail
        assert_eq!(decode_image(&patch(8, 4)), Err(Error::UnsupportedFormat));
        assert_eq!(decode_image(&patch(12, 1)), Err(Error::UnsupportedFormat));
        assert_eq!(decode_image(&patch(10, 1)), Err(Error::UnsupportedFormat));
    }

    #[test]
    fn test_decode_with_inserted_text_chunk() {
        let pixels = pseudo_random(4 * 4 * 3, 55);
        let stream = encode_image(&pixels, 4, 4, 3, 8).unwrap();
        let annotated = chunk::insert_after_ihdr(
            &stream,
            &ancillary::text("Description", "hello").unwrap(),
        )
        .unwrap();
        assert_eq!(chunk::count(&annotated).unwrap(), chunk::count(&stream).unwrap() + 1);
        assert!(chunk::verify_all(&annotated).unwrap());
        let all = chunk::read_all(&annotated).unwrap();
        assert_eq!(all[1].fourcc, *b"tEXt");
        assert_eq!(decode_image(&annotated).unwrap().pixels, pixels);
    }

    #[test]
    fn test_decode_requires_idat() {
        let pixels = [1u8, 2, 3, 4];
        let stream = encode_image(&pixels, 2, 2, 1, 8).unwrap();
        let gutted = chunk::remove_first(&stream, chunk::IDAT).unwrap();
        assert_eq!(decode_image(&gutted), Err(Error::Malformed));
    }

    #[test]
    fn test_decode_ignores_bad_ancillary_crc() {
        let pixels = pseudo_random(4 * 4 * 3, 91);
        let stream = encode_image(&pixels, 4, 4, 3, 8).unwrap();
        let mut annotated =
            chunk::insert_after_ihdr(&stream, &Chunk::new(*b"tIME", vec![0x07, 0xE5, 1, 2, 3, 4, 5]))
                .unwrap();
        let pos = annotated.windows(4).position(|w| w == b"tIME").unwrap();
        annotated[pos + 4] ^= 0xFF;
        assert!(!chunk::verify_all(&annotated).unwrap());
        // the image itself still decodes
        assert_eq!(decode_image(&annotated).unwrap().pixels, pixels);
    }

    #[test]
    fn test_ihdr_parse_roundtrip() {
        let ihdr = Ihdr {
            width: 640,
            height: 480,
            bit_depth: 16,
            color_type: COLOR_RGBA,
            compression: 0,
            filter: 0,
            interlace: 0,
        };
        let parsed = Ihdr::parse(&ihdr.to_bytes()).unwrap();
        assert_eq!(parsed, ihdr);
        assert_eq!(parsed.channels().unwrap(), 4);
        assert!(Ihdr::parse(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_file_wrappers() {
        let dir = std::env::temp_dir().join("pngsmith-core-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("roundtrip.png");
        let pixels = pseudo_random(6 * 3 * 4, 17);
        save_image(&path, &pixels, 6, 3, 4, 8).unwrap();
        let image = load_image(&path).unwrap();
        assert_eq!(image.pixels, pixels);
        assert_eq!((image.width, image.height), (6, 3));
        std::fs::remove_file(&path).unwrap();
    }
}
