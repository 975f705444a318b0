//! PNG scanline filters: forward prediction for the encoder, reversal for
//! the decoder, and the per-row filter selection heuristic.
//!
//! Every scanline is transformed by one of five byte predictors and prefixed
//! with the filter id. The encoder picks, per row, the filter whose output
//! has the smallest sum of absolute values when each byte is reinterpreted
//! as signed.

use crate::Error;

pub const FILTER_NONE: u8 = 0;
pub const FILTER_SUB: u8 = 1;
pub const FILTER_UP: u8 = 2;
pub const FILTER_AVERAGE: u8 = 3;
pub const FILTER_PAETH: u8 = 4;

/// Paeth predictor: whichever of left/above/upper-left is closest to a+b-c.
///
/// All intermediates stay in i32; nothing is truncated to 8 bits before the
/// comparisons.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn filter_row(kind: u8, row: &[u8], prev: &[u8], bpp: usize, out: &mut [u8]) {
    for i in 0..row.len() {
        let x = row[i];
        let a = if i >= bpp { row[i - bpp] } else { 0 };
        let b = prev[i];
        let c = if i >= bpp { prev[i - bpp] } else { 0 };
        out[i] = match kind {
            FILTER_NONE => x,
            FILTER_SUB => x.wrapping_sub(a),
            FILTER_UP => x.wrapping_sub(b),
            // arithmetic shift of the sum, not an average of signed values
            FILTER_AVERAGE => x.wrapping_sub(((a as u32 + b as u32) >> 1) as u8),
            _ => x.wrapping_sub(paeth(a, b, c)),
        };
    }
}

/// Filter every scanline, prefixing each with its chosen filter id.
///
/// `data` holds `height` rows of `row_bytes` tightly packed bytes; `bpp` is
/// the pixel byte stride. The result holds `height * (row_bytes + 1)` bytes
/// and feeds straight into the deflate encoder.
pub fn apply_filters(data: &[u8], row_bytes: usize, height: usize, bpp: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(height * (row_bytes + 1));
    let zero = vec![0u8; row_bytes];
    let mut scratch = vec![0u8; row_bytes];
    let mut best = vec![0u8; row_bytes];
    for y in 0..height {
        let row = &data[y * row_bytes..(y + 1) * row_bytes];
        let prev = if y == 0 {
            &zero[..]
        } else {
            &data[(y - 1) * row_bytes..y * row_bytes]
        };
        let mut best_kind = FILTER_NONE;
        let mut best_sum = u64::MAX;
        for kind in FILTER_NONE..=FILTER_PAETH {
            filter_row(kind, row, prev, bpp, &mut scratch);
            let sum: u64 = scratch.iter().map(|&b| (b as i8 as i64).unsigned_abs()).sum();
            if sum < best_sum {
                best_sum = sum;
                best_kind = kind;
                best.copy_from_slice(&scratch);
            }
        }
        out.push(best_kind);
        out.extend_from_slice(&best);
    }
    out
}

/// Reverse the per-scanline filters, dropping the filter id bytes.
///
/// `data` must hold `height * (row_bytes + 1)` bytes as produced by
/// [`apply_filters`] (after inflation); an unknown filter id or a size
/// mismatch is [`Error::Malformed`].
pub fn remove_filters(
    data: &[u8],
    row_bytes: usize,
    height: usize,
    bpp: usize,
) -> Result<Vec<u8>, Error> {
    if data.len() != height * (row_bytes + 1) {
        return Err(Error::Malformed);
    }
    let mut out = vec![0u8; height * row_bytes];
    for y in 0..height {
        let kind = data[y * (row_bytes + 1)];
        if kind > FILTER_PAETH {
            return Err(Error::Malformed);
        }
        let src = &data[y * (row_bytes + 1) + 1..(y + 1) * (row_bytes + 1)];
        let (done, rest) = out.split_at_mut(y * row_bytes);
        let cur = &mut rest[..row_bytes];
        let prev = if y == 0 {
            &[][..]
        } else {
            &done[(y - 1) * row_bytes..]
        };
        for i in 0..row_bytes {
            let a = if i >= bpp { cur[i - bpp] } else { 0 };
            let b = if y == 0 { 0 } else { prev[i] };
            let c = if y == 0 || i < bpp { 0 } else { prev[i - bpp] };
            cur[i] = match kind {
                FILTER_NONE => src[i],
                FILTER_SUB => src[i].wrapping_add(a),
                FILTER_UP => src[i].wrapping_add(b),
                FILTER_AVERAGE => src[i].wrapping_add(((a as u32 + b as u32) >> 1) as u8),
                _ => src[i].wrapping_add(paeth(a, b, c)),
            };
        }
    }
    Ok(out)
}
