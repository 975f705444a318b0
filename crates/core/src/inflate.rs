//! DEFLATE decoder (RFC 1951) with zlib unwrapping (RFC 1950).
//!
//! The bit reader keeps a 64-bit little-endian buffer refilled eight bytes
//! at a time. Huffman codes resolve through one flat table per alphabet:
//! 10 primary bits for literal/length, 8 for distance, 7 for the precode;
//! codes longer than the primary width land in sub-tables appended to the
//! same array. Match copies use 16- and 8-byte chunked fast paths when the
//! output has room and fall back to byte-at-a-time otherwise.

use crate::checksum;
use crate::Error;

const LITLEN_TABLE_BITS: u32 = 10;
const DIST_TABLE_BITS: u32 = 8;
const PRECODE_TABLE_BITS: u32 = 7;

/// Entry bit 4 marks a sub-table pointer; direct hits keep the code length
/// in bits 0..=3 and the symbol in the upper half.
const SUBTABLE_FLAG: u32 = 0x10;

const LEN_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115,
    131, 163, 195, 227, 258,
];
const LEN_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12,
    13, 13,
];
const PRECODE_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Inflate a raw deflate stream into at most `max_out` bytes.
pub fn inflate(data: &[u8], max_out: usize) -> Result<Vec<u8>, Error> {
    let mut reader = BitReader::new(data);
    let out = inflate_blocks(&mut reader, max_out)?;
    if reader.overran() {
        return Err(Error::Malformed);
    }
    Ok(out)
}

/// Inflate a zlib stream: 2-byte header, deflate data, big-endian Adler-32
/// trailer. The trailer is verified against the inflated output.
pub fn inflate_zlib(data: &[u8], max_out: usize) -> Result<Vec<u8>, Error> {
    if data.len() < 6 {
        return Err(Error::Malformed);
    }
    let mut reader = BitReader::new(&data[2..]);
    let out = inflate_blocks(&mut reader, max_out)?;
    if reader.overran() {
        return Err(Error::Malformed);
    }
    reader.align_to_byte();
    if reader.bytes_left() < 4 {
        return Err(Error::Malformed);
    }
    let mut trailer = [0u8; 4];
    for byte in trailer.iter_mut() {
        if reader.bitcnt < 8 {
            reader.refill();
        }
        *byte = reader.peek(8) as u8;
        reader.consume(8);
    }
    if u32::from_be_bytes(trailer) != checksum::adler32(&out) {
        return Err(Error::ChecksumMismatch);
    }
    Ok(out)
}

// ─── Bit stream ─────────────────────────────────────────────────────────────

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bitbuf: u64,
    bitcnt: u32,
    /// zero bytes fabricated past the end of the input
    fabricated: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0, bitbuf: 0, bitcnt: 0, fabricated: 0 }
    }

    /// Top up the bit buffer to at least 56 valid bits.
    #[inline]
    fn refill(&mut self) {
        if self.pos + 8 <= self.data.len() {
            let word = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().unwrap());
            self.bitbuf |= word << self.bitcnt;
            self.pos += ((63 - self.bitcnt) >> 3) as usize;
            self.bitcnt |= 56;
        } else {
            while self.bitcnt < 56 {
                let byte = if self.pos < self.data.len() {
                    self.pos += 1;
                    self.data[self.pos - 1]
                } else {
                    self.fabricated += 1;
                    0
                };
                self.bitbuf |= (byte as u64) << self.bitcnt;
                self.bitcnt += 8;
            }
        }
    }

    #[inline]
    fn peek(&self, count: u32) -> u32 {
        (self.bitbuf & ((1u64 << count) - 1)) as u32
    }

    #[inline]
    fn consume(&mut self, count: u32) {
        self.bitbuf >>= count;
        self.bitcnt -= count;
    }

    fn read_bits(&mut self, count: u32) -> u32 {
        if self.bitcnt < count {
            self.refill();
        }
        let value = self.peek(count);
        self.consume(count);
        value
    }

    fn align_to_byte(&mut self) {
        let partial = self.bitcnt & 7;
        self.consume(partial);
    }

    /// Real input bytes not yet consumed, buffered bits included.
    fn bytes_left(&self) -> usize {
        let buffered = (self.bitcnt / 8) as usize;
        self.data.len() - self.pos + buffered.saturating_sub(self.fabricated as usize)
    }

    /// True once fabricated padding has actually been consumed.
    fn overran(&self) -> bool {
        (self.fabricated as u64) * 8 > self.bitcnt as u64
    }
}

// ─── Huffman tables ─────────────────────────────────────────────────────────

struct HuffTable {
    entries: Vec<u32>,
    bits: u32,
}

/// Build the flat decode table for a code-length set.
///
/// Primary entries cover `table_bits` bits; longer codes point into
/// sub-tables appended behind the primary table. An all-zero length set
/// yields a table whose every lookup fails (legal for an unused distance
/// alphabet); an over-subscribed set is rejected.
fn build_table(lengths: &[u8], table_bits: u32) -> Result<HuffTable, Error> {
    let size = 1usize << table_bits;
    let mut count = [0u32; 16];
    for &l in lengths {
        count[l as usize] += 1;
    }
    let mut entries = vec![0u32; size];
    if count[0] as usize == lengths.len() {
        return Ok(HuffTable { entries, bits: table_bits });
    }

    let mut left = 1i64;
    for c in count.iter().skip(1) {
        left <<= 1;
        left -= *c as i64;
        if left < 0 {
            return Err(Error::Malformed);
        }
    }

    let mut next_code = [0u32; 16];
    let mut code = 0u32;
    for l in 1..16 {
        code = (code + count[l - 1]) << 1;
        next_code[l] = code;
    }
    let max_len = (1..16).rev().find(|&l| count[l] > 0).unwrap() as u32;
    let sub_bits = max_len.saturating_sub(table_bits);

    for len in 1..=15u32 {
        if count[len as usize] == 0 {
            continue;
        }
        for (sym, &l) in lengths.iter().enumerate() {
            if l as u32 != len {
                continue;
            }
            let assigned = next_code[len as usize];
            next_code[len as usize] += 1;
            let rev = reverse_bits(assigned, len) as usize;
            let entry = ((sym as u32) << 16) | len;
            if len <= table_bits {
                let step = 1usize << len;
                let mut idx = rev;
                while idx < size {
                    entries[idx] = entry;
                    idx += step;
                }
            } else {
                let prefix = rev & (size - 1);
                if entries[prefix] & SUBTABLE_FLAG == 0 {
                    let offset = entries.len();
                    entries[prefix] = ((offset as u32) << 16) | SUBTABLE_FLAG | sub_bits;
                    entries.resize(offset + (1usize << sub_bits), 0);
                }
                let offset = (entries[prefix] >> 16) as usize;
                let step = 1usize << (len - table_bits);
                let mut idx = rev >> table_bits;
                while idx < (1usize << sub_bits) {
                    entries[offset + idx] = entry;
                    idx += step;
                }
            }
        }
    }
    Ok(HuffTable { entries, bits: table_bits })
}

fn reverse_bits(code: u32, len: u32) -> u32 {
    let mut c = code;
    let mut out = 0u32;
    for _ in 0..len {
        out = (out << 1) | (c & 1);
        c >>= 1;
    }
    out
}

/// Decode one symbol. The caller must have refilled the bit buffer.
#[inline]
fn decode_symbol(reader: &mut BitReader, table: &HuffTable) -> Result<u32, Error> {
    let mut entry = table.entries[reader.peek(table.bits) as usize];
    if entry & SUBTABLE_FLAG != 0 {
        let sub_bits = entry & 0xF;
        let idx = reader.peek(table.bits + sub_bits) >> table.bits;
        entry = table.entries[(entry >> 16) as usize + idx as usize];
    }
    let len = entry & 0xF;
    if len == 0 {
        return Err(Error::Malformed);
    }
    reader.consume(len);
    Ok(entry >> 16)
}

// ─── Block decoding ─────────────────────────────────────────────────────────

fn inflate_blocks(reader: &mut BitReader, max_out: usize) -> Result<Vec<u8>, Error> {
    let mut out = vec![0u8; max_out];
    let mut out_pos = 0usize;
    loop {
        reader.refill();
        let is_final = reader.peek(1) != 0;
        reader.consume(1);
        let btype = reader.peek(2);
        reader.consume(2);
        match btype {
            0 => stored_block(reader, &mut out, &mut out_pos)?,
            1 => {
                let (lit, dist) = fixed_tables()?;
                decode_block(reader, &lit, &dist, &mut out, &mut out_pos)?;
            }
            2 => {
                let (lit, dist) = read_dynamic_header(reader)?;
                decode_block(reader, &lit, &dist, &mut out, &mut out_pos)?;
            }
            _ => return Err(Error::Malformed),
        }
        if is_final {
            break;
        }
    }
    out.truncate(out_pos);
    Ok(out)
}

fn stored_block(reader: &mut BitReader, out: &mut [u8], out_pos: &mut usize) -> Result<(), Error> {
    reader.align_to_byte();
    let len = reader.read_bits(16) as usize;
    let nlen = reader.read_bits(16) as usize;
    if len == 0 || nlen != (!len & 0xFFFF) {
        return Err(Error::Malformed);
    }
    if len > reader.bytes_left() {
        return Err(Error::Malformed);
    }
    if *out_pos + len > out.len() {
        return Err(Error::CapacityExceeded);
    }
    // drain whatever sits in the bit buffer, then copy straight from input
    let mut remaining = len;
    while remaining > 0 && reader.bitcnt > 0 {
        out[*out_pos] = reader.peek(8) as u8;
        reader.consume(8);
        *out_pos += 1;
        remaining -= 1;
    }
    out[*out_pos..*out_pos + remaining]
        .copy_from_slice(&reader.data[reader.pos..reader.pos + remaining]);
    reader.pos += remaining;
    *out_pos += remaining;
    Ok(())
}

fn fixed_tables() -> Result<(HuffTable, HuffTable), Error> {
    let mut lit = [0u8; 288];
    for (sym, l) in lit.iter_mut().enumerate() {
        *l = match sym {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    let dist = [5u8; 32];
    Ok((
        build_table(&lit, LITLEN_TABLE_BITS)?,
        build_table(&dist, DIST_TABLE_BITS)?,
    ))
}

fn read_dynamic_header(reader: &mut BitReader) -> Result<(HuffTable, HuffTable), Error> {
    reader.refill();
    let hlit = reader.peek(5) as usize + 257;
    reader.consume(5);
    let hdist = reader.peek(5) as usize + 1;
    reader.consume(5);
    let hclen = reader.peek(4) as usize + 4;
    reader.consume(4);
    if hlit > 286 || hdist > 30 {
        return Err(Error::Malformed);
    }

    let mut pre_lengths = [0u8; 19];
    for k in 0..hclen {
        pre_lengths[PRECODE_ORDER[k]] = reader.read_bits(3) as u8;
    }
    let pre = build_table(&pre_lengths, PRECODE_TABLE_BITS)?;

    let total = hlit + hdist;
    let mut lengths = [0u8; 286 + 30];
    let mut i = 0;
    while i < total {
        reader.refill();
        let sym = decode_symbol(reader, &pre)?;
        match sym {
            0..=15 => {
                lengths[i] = sym as u8;
                i += 1;
            }
            16 => {
                if i == 0 {
                    return Err(Error::Malformed);
                }
                let run = 3 + reader.read_bits(2) as usize;
                if i + run > total {
                    return Err(Error::Malformed);
                }
                let value = lengths[i - 1];
                for _ in 0..run {
                    lengths[i] = value;
                    i += 1;
                }
            }
            17 => {
                let run = 3 + reader.read_bits(3) as usize;
                if i + run > total {
                    return Err(Error::Malformed);
                }
                i += run;
            }
            18 => {
                let run = 11 + reader.read_bits(7) as usize;
                if i + run > total {
                    return Err(Error::Malformed);
                }
                i += run;
            }
            _ => return Err(Error::Malformed),
        }
    }
    if lengths[256] == 0 {
        return Err(Error::Malformed); // no end-of-block code
    }
    Ok((
        build_table(&lengths[..hlit], LITLEN_TABLE_BITS)?,
        build_table(&lengths[hlit..total], DIST_TABLE_BITS)?,
    ))
}

fn decode_block(
    reader: &mut BitReader,
    lit: &HuffTable,
    dist: &HuffTable,
    out: &mut [u8],
    out_pos: &mut usize,
) -> Result<(), Error> {
    loop {
        reader.refill();
        let sym = decode_symbol(reader, lit)?;
        if sym < 256 {
            if *out_pos >= out.len() {
                return Err(Error::CapacityExceeded);
            }
            out[*out_pos] = sym as u8;
            *out_pos += 1;
        } else if sym == 256 {
            return Ok(());
        } else {
            if sym > 285 {
                return Err(Error::Malformed);
            }
            let li = (sym - 257) as usize;
            let len = LEN_BASE[li] as usize + reader.read_bits(LEN_EXTRA[li] as u32) as usize;
            let dsym = decode_symbol(reader, dist)? as usize;
            if dsym >= 30 {
                return Err(Error::Malformed);
            }
            let d = DIST_BASE[dsym] as usize + reader.read_bits(DIST_EXTRA[dsym] as u32) as usize;
            if d > *out_pos {
                return Err(Error::Malformed);
            }
            if *out_pos + len > out.len() {
                return Err(Error::CapacityExceeded);
            }
            copy_match(out, *out_pos, d, len);
            *out_pos += len;
        }
    }
}

/// Copy `len` bytes from `pos - dist` to `pos`, overlap-aware.
fn copy_match(out: &mut [u8], pos: usize, dist: usize, len: usize) {
    let src = pos - dist;
    if dist == 1 {
        // run of one byte: broadcast fill
        let byte = out[src];
        out[pos..pos + len].fill(byte);
    } else if dist >= 16 && pos + ((len + 15) & !15) <= out.len() {
        let mut k = 0;
        while k < len {
            out.copy_within(src + k..src + k + 16, pos + k);
            k += 16;
        }
    } else if dist >= 8 && pos + ((len + 7) & !7) <= out.len() {
        let mut k = 0;
        while k < len {
            out.copy_within(src + k..src + k + 8, pos + k);
            k += 8;
        }
    } else {
        for k in 0..len {
            out[pos + k] = out[src + k];
        }
    }
}
