//! # pngsmith-core
//!
//! Self-contained PNG codec: reads, writes, and surgically edits PNG byte
//! streams without an external image or compression library. The DEFLATE
//! encoder and decoder, the scanline filters, and both checksums are built
//! in; file I/O stays outside the core (thin path wrappers compose the
//! codec with `std::fs`).
//!
//! Indexed color (type 3), interlacing, and bit depths other than 8/16 are
//! out of scope, as is APNG.
//!
//! ## Architecture
//!
//! - [`image`] — pixel buffers to PNG streams and back (encode, decode, file wrappers)
//! - [`chunk`] — chunk engine: count/read/remove/insert/split/combine/verify
//! - [`ancillary`] — builders for tEXt, zTXt, gAMA, sRGB, tIME, pHYs, cHRM
//! - [`filter`] — the five scanline filters and the selection heuristic
//! - [`deflate`] / [`inflate`] — DEFLATE encoder and decoder
//! - [`checksum`] — CRC-32 and Adler-32
//!
//! Every entry point is pure over its arguments and keeps no state between
//! calls, so independent buffers can be processed in parallel freely.

pub mod ancillary;
pub mod checksum;
pub mod chunk;
pub mod deflate;
pub mod filter;
pub mod image;
pub mod inflate;

pub use chunk::Chunk;
pub use image::{decode_image, encode_image, load_image, save_image, Image};

/// Signature bytes opening every PNG stream.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Maximum number of chunks [`chunk::read_all`] will return.
pub const MAX_CHUNKS_COUNT: usize = 64;

/// Upper bound on the size of a stream produced by a chunk edit.
pub const MAX_OUTPUT_SIZE: usize = 32 * 1024 * 1024;

/// Errors surfaced by the codec and the chunk engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Buffer does not start with the PNG signature.
    InvalidSignature,
    /// A chunk header or payload runs past the end of the buffer.
    TruncatedStream,
    /// Color type, bit depth, channel count, or interlace mode outside the
    /// supported set.
    UnsupportedFormat,
    /// More than [`MAX_CHUNKS_COUNT`] chunks in one stream.
    ChunkCountOverflow,
    /// A stored CRC-32 or zlib Adler-32 does not match the data.
    ChecksumMismatch,
    /// Structurally invalid stream or argument.
    Malformed,
    /// Output would exceed the caller-supplied capacity or
    /// [`MAX_OUTPUT_SIZE`].
    CapacityExceeded,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Error::InvalidSignature => "not a PNG stream (bad signature)",
            Error::TruncatedStream => "chunk runs past the end of the stream",
            Error::UnsupportedFormat => "unsupported color type, bit depth, or interlacing",
            Error::ChunkCountOverflow => "too many chunks in stream",
            Error::ChecksumMismatch => "checksum mismatch",
            Error::Malformed => "malformed stream",
            Error::CapacityExceeded => "output exceeds capacity",
        })
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_edit_chain() {
        // encode, annotate, split, recombine, strip, decode
        let pixels: Vec<u8> = (0..32 * 32 * 3).map(|i| (i * 13 % 251) as u8).collect();
        let stream = encode_image(&pixels, 32, 32, 3, 8).unwrap();
        assert!(chunk::verify_all(&stream).unwrap());

        let annotated = chunk::insert_after_ihdr(
            &stream,
            &ancillary::text("Software", "pngsmith-core").unwrap(),
        )
        .unwrap();
        let split = chunk::split_idat(&annotated, 64).unwrap();
        assert!(chunk::verify_all(&split).unwrap());
        assert_eq!(decode_image(&split).unwrap().pixels, pixels);

        let recombined = chunk::combine_idat(&split).unwrap();
        assert_eq!(recombined, annotated);

        let stripped = chunk::remove_ancillary(&recombined).unwrap();
        assert_eq!(stripped, stream);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::ChecksumMismatch.to_string(), "checksum mismatch");
        assert_eq!(
            Error::InvalidSignature.to_string(),
            "not a PNG stream (bad signature)"
        );
    }
}
