//! Builders for ancillary PNG chunks: tEXt, zTXt, gAMA, sRGB, tIME, pHYs,
//! and cHRM.
//!
//! Builders validate their arguments and lay out the payload; the returned
//! chunk carries a zero CRC, which the chunk engine fills in when the chunk
//! is spliced into a stream.

use crate::chunk::Chunk;
use crate::deflate;
use crate::Error;

/// Longest keyword a text chunk may carry.
const KEYWORD_MAX: usize = 80;

fn check_keyword(keyword: &str) -> Result<(), Error> {
    if keyword.is_empty()
        || keyword.len() > KEYWORD_MAX
        || !keyword.is_ascii()
        || keyword.bytes().any(|b| b == 0)
    {
        return Err(Error::Malformed);
    }
    Ok(())
}

/// tEXt: keyword, NUL separator, uncompressed text (no NUL allowed).
pub fn text(keyword: &str, text: &str) -> Result<Chunk, Error> {
    check_keyword(keyword)?;
    if text.bytes().any(|b| b == 0) {
        return Err(Error::Malformed);
    }
    let mut data = Vec::with_capacity(keyword.len() + 1 + text.len());
    data.extend_from_slice(keyword.as_bytes());
    data.push(0);
    data.extend_from_slice(text.as_bytes());
    Ok(Chunk::new(*b"tEXt", data))
}

/// zTXt: keyword, NUL separator, explicit compression method 0, and the
/// text as a zlib stream.
pub fn compressed_text(keyword: &str, text: &str) -> Result<Chunk, Error> {
    check_keyword(keyword)?;
    let packed = deflate::deflate_zlib(text.as_bytes(), deflate::LEVEL_DEFAULT);
    let mut data = Vec::with_capacity(keyword.len() + 2 + packed.len());
    data.extend_from_slice(keyword.as_bytes());
    data.push(0);
    data.push(0); // compression method: deflate
    data.extend_from_slice(&packed);
    Ok(Chunk::new(*b"zTXt", data))
}

/// gAMA: gamma stored as round(gamma * 100000), big-endian.
pub fn gamma(gamma: f32) -> Chunk {
    let scaled = (gamma * 100_000.0).round() as u32;
    Chunk::new(*b"gAMA", scaled.to_be_bytes().to_vec())
}

/// sRGB: rendering intent, clamped to the four defined values.
pub fn srgb(intent: u8) -> Chunk {
    Chunk::new(*b"sRGB", vec![intent.min(3)])
}

/// tIME: last-modification timestamp. Seconds run to 60 for leap seconds.
pub fn time(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Result<Chunk, Error> {
    if !(1..=12).contains(&month)
        || !(1..=31).contains(&day)
        || hour > 23
        || minute > 59
        || second > 60
    {
        return Err(Error::Malformed);
    }
    let mut data = Vec::with_capacity(7);
    data.extend_from_slice(&year.to_be_bytes());
    data.extend_from_slice(&[month, day, hour, minute, second]);
    Ok(Chunk::new(*b"tIME", data))
}

/// pHYs: physical pixel dimensions; the unit is meters or unknown.
pub fn physical_size(ppu_x: u32, ppu_y: u32, meters: bool) -> Chunk {
    let mut data = Vec::with_capacity(9);
    data.extend_from_slice(&ppu_x.to_be_bytes());
    data.extend_from_slice(&ppu_y.to_be_bytes());
    data.push(meters as u8);
    Chunk::new(*b"pHYs", data)
}

/// cHRM: primary chromaticities, each coordinate stored as coord * 100000.
#[allow(clippy::too_many_arguments)]
pub fn chroma(
    white_x: f32,
    white_y: f32,
    red_x: f32,
    red_y: f32,
    green_x: f32,
    green_y: f32,
    blue_x: f32,
    blue_y: f32,
) -> Chunk {
    let mut data = Vec::with_capacity(32);
    for coord in [white_x, white_y, red_x, red_y, green_x, green_y, blue_x, blue_y] {
        data.extend_from_slice(&((coord * 100_000.0).round() as u32).to_be_bytes());
    }
    Chunk::new(*b"cHRM", data)
}
