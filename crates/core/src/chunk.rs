//! PNG chunk engine: walk, count, read, edit, and verify the chunk sequence
//! of a PNG byte stream.
//!
//! Every operation is pure over its input buffer and returns owned results;
//! edit operations produce a new stream and never mutate their input. Chunks
//! the operation does not touch keep their relative order and their stored
//! bytes, CRC included.

use crate::checksum;
use crate::{Error, MAX_CHUNKS_COUNT, MAX_OUTPUT_SIZE, PNG_SIGNATURE};

pub const IHDR: [u8; 4] = *b"IHDR";
pub const PLTE: [u8; 4] = *b"PLTE";
pub const IDAT: [u8; 4] = *b"IDAT";
pub const IEND: [u8; 4] = *b"IEND";
pub const TRNS: [u8; 4] = *b"tRNS";

/// A single chunk held in memory. `length` mirrors the wire field; `data` is
/// owned by the chunk value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub length: u32,
    pub fourcc: [u8; 4],
    pub data: Vec<u8>,
    pub crc: u32,
}

impl Chunk {
    /// Build a chunk over owned data. The CRC stays zero until the chunk is
    /// written into a stream, which computes it over type and data.
    pub fn new(fourcc: [u8; 4], data: Vec<u8>) -> Self {
        Chunk { length: data.len() as u32, fourcc, data, crc: 0 }
    }

    /// Critical chunks carry an uppercase first FOURCC byte.
    pub fn is_critical(&self) -> bool {
        self.fourcc[0] & 0x20 == 0
    }

    /// Public (registered) chunks carry an uppercase second byte.
    pub fn is_public(&self) -> bool {
        self.fourcc[1] & 0x20 == 0
    }

    /// Safe-to-copy chunks carry a lowercase fourth byte: editors may carry
    /// them across edits they do not understand.
    pub fn is_safe_to_copy(&self) -> bool {
        self.fourcc[3] & 0x20 != 0
    }
}

/// Borrowed view of one chunk inside a raw stream.
pub(crate) struct RawChunk<'a> {
    pub(crate) fourcc: [u8; 4],
    pub(crate) data: &'a [u8],
    pub(crate) crc: u32,
}

/// Sequential reader over the chunks of a signed PNG buffer. Stops after
/// IEND; a clean end of buffer before IEND also ends the walk.
pub(crate) struct ChunkWalker<'a> {
    buffer: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> ChunkWalker<'a> {
    pub(crate) fn new(buffer: &'a [u8]) -> Result<Self, Error> {
        check_signature(buffer)?;
        Ok(ChunkWalker { buffer, pos: PNG_SIGNATURE.len(), done: false })
    }

    pub(crate) fn next(&mut self) -> Result<Option<RawChunk<'a>>, Error> {
        if self.done || self.pos == self.buffer.len() {
            return Ok(None);
        }
        if self.pos + 8 > self.buffer.len() {
            return Err(Error::TruncatedStream);
        }
        let length = u32_be(self.buffer, self.pos);
        if length > 0x7FFF_FFFF {
            return Err(Error::Malformed);
        }
        let length = length as usize;
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&self.buffer[self.pos + 4..self.pos + 8]);
        let data_start = self.pos + 8;
        if data_start + length + 4 > self.buffer.len() {
            return Err(Error::TruncatedStream);
        }
        let data = &self.buffer[data_start..data_start + length];
        let crc = u32_be(self.buffer, data_start + length);
        self.pos = data_start + length + 4;
        if fourcc == IEND {
            self.done = true;
        }
        Ok(Some(RawChunk { fourcc, data, crc }))
    }
}

pub(crate) fn check_signature(buffer: &[u8]) -> Result<(), Error> {
    if buffer.len() < PNG_SIGNATURE.len() || buffer[..8] != PNG_SIGNATURE {
        return Err(Error::InvalidSignature);
    }
    Ok(())
}

/// Count chunks up to and including IEND.
pub fn count(buffer: &[u8]) -> Result<usize, Error> {
    let mut walker = ChunkWalker::new(buffer)?;
    let mut n = 0;
    while walker.next()?.is_some() {
        n += 1;
    }
    Ok(n)
}

/// Read the first chunk with the given FOURCC, copying its data out.
pub fn read_first(buffer: &[u8], fourcc: [u8; 4]) -> Result<Option<Chunk>, Error> {
    let mut walker = ChunkWalker::new(buffer)?;
    while let Some(raw) = walker.next()? {
        if raw.fourcc == fourcc {
            return Ok(Some(Chunk {
                length: raw.data.len() as u32,
                fourcc: raw.fourcc,
                data: raw.data.to_vec(),
                crc: raw.crc,
            }));
        }
    }
    Ok(None)
}

/// Read every chunk including IEND. More than [`MAX_CHUNKS_COUNT`] chunks is
/// an error.
pub fn read_all(buffer: &[u8]) -> Result<Vec<Chunk>, Error> {
    let mut walker = ChunkWalker::new(buffer)?;
    let mut chunks = Vec::new();
    while let Some(raw) = walker.next()? {
        if chunks.len() == MAX_CHUNKS_COUNT {
            return Err(Error::ChunkCountOverflow);
        }
        chunks.push(Chunk {
            length: raw.data.len() as u32,
            fourcc: raw.fourcc,
            data: raw.data.to_vec(),
            crc: raw.crc,
        });
    }
    Ok(chunks)
}

/// Copy the stream with the first chunk of the given FOURCC omitted. A
/// stream without a match comes back unchanged in content.
pub fn remove_first(buffer: &[u8], fourcc: [u8; 4]) -> Result<Vec<u8>, Error> {
    let mut walker = ChunkWalker::new(buffer)?;
    let mut out = Vec::with_capacity(buffer.len());
    out.extend_from_slice(&PNG_SIGNATURE);
    let mut removed = false;
    while let Some(raw) = walker.next()? {
        if !removed && raw.fourcc == fourcc {
            removed = true;
            continue;
        }
        write_stored_chunk(&mut out, &raw);
    }
    Ok(out)
}

/// Strip the stream down to IHDR, PLTE, IDAT, and IEND. tRNS survives only
/// when a palette is present (indexed transparency belongs to the palette).
pub fn remove_ancillary(buffer: &[u8]) -> Result<Vec<u8>, Error> {
    let has_palette = contains(buffer, PLTE)?;
    let mut walker = ChunkWalker::new(buffer)?;
    let mut out = Vec::with_capacity(buffer.len());
    out.extend_from_slice(&PNG_SIGNATURE);
    while let Some(raw) = walker.next()? {
        let keep = matches!(raw.fourcc, IHDR | PLTE | IDAT | IEND)
            || (raw.fourcc == TRNS && has_palette);
        if keep {
            write_stored_chunk(&mut out, &raw);
        } else {
            log::debug!("dropping ancillary {} chunk", fourcc_str(&raw.fourcc));
        }
    }
    Ok(out)
}

/// Splice `chunk` immediately after IHDR, computing its CRC over type and
/// data. A stream without an IHDR chunk is malformed.
pub fn insert_after_ihdr(buffer: &[u8], chunk: &Chunk) -> Result<Vec<u8>, Error> {
    let mut walker = ChunkWalker::new(buffer)?;
    let mut out = Vec::with_capacity(buffer.len() + chunk.data.len() + 12);
    out.extend_from_slice(&PNG_SIGNATURE);
    let mut inserted = false;
    while let Some(raw) = walker.next()? {
        write_stored_chunk(&mut out, &raw);
        if !inserted && raw.fourcc == IHDR {
            write_chunk(&mut out, chunk.fourcc, &chunk.data);
            inserted = true;
        }
    }
    if !inserted {
        return Err(Error::Malformed);
    }
    if out.len() > MAX_OUTPUT_SIZE {
        return Err(Error::CapacityExceeded);
    }
    Ok(out)
}

/// Concatenate every IDAT payload into one chunk with a single recomputed
/// CRC, placed where the first IDAT was. Other chunks keep their order.
pub fn combine_idat(buffer: &[u8]) -> Result<Vec<u8>, Error> {
    let mut walker = ChunkWalker::new(buffer)?;
    let mut payload = Vec::new();
    while let Some(raw) = walker.next()? {
        if raw.fourcc == IDAT {
            payload.extend_from_slice(raw.data);
        }
    }

    let mut walker = ChunkWalker::new(buffer)?;
    let mut out = Vec::with_capacity(buffer.len());
    out.extend_from_slice(&PNG_SIGNATURE);
    let mut written = false;
    while let Some(raw) = walker.next()? {
        if raw.fourcc == IDAT {
            if !written {
                write_chunk(&mut out, IDAT, &payload);
                written = true;
            }
            continue;
        }
        write_stored_chunk(&mut out, &raw);
    }
    if out.len() > MAX_OUTPUT_SIZE {
        return Err(Error::CapacityExceeded);
    }
    Ok(out)
}

/// Split every IDAT payload larger than `piece_size` into consecutive IDAT
/// chunks of exactly `piece_size` bytes plus a trailing remainder, each with
/// its own CRC.
pub fn split_idat(buffer: &[u8], piece_size: usize) -> Result<Vec<u8>, Error> {
    if piece_size == 0 {
        return Err(Error::Malformed);
    }
    let mut walker = ChunkWalker::new(buffer)?;
    let mut out = Vec::with_capacity(buffer.len());
    out.extend_from_slice(&PNG_SIGNATURE);
    while let Some(raw) = walker.next()? {
        if raw.fourcc == IDAT && raw.data.len() > piece_size {
            for piece in raw.data.chunks(piece_size) {
                write_chunk(&mut out, IDAT, piece);
            }
        } else {
            write_stored_chunk(&mut out, &raw);
        }
    }
    if out.len() > MAX_OUTPUT_SIZE {
        return Err(Error::CapacityExceeded);
    }
    Ok(out)
}

/// Recompute every chunk's CRC and compare it with the stored value.
/// Structural failures (bad signature, truncation) are errors; the CRC
/// verdict is the payload.
pub fn verify_all(buffer: &[u8]) -> Result<bool, Error> {
    let mut walker = ChunkWalker::new(buffer)?;
    while let Some(raw) = walker.next()? {
        if checksum::chunk_crc(&raw.fourcc, raw.data) != raw.crc {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Render a per-chunk report: index, FOURCC, payload length, CRC state.
pub fn describe(buffer: &[u8]) -> Result<String, Error> {
    use std::fmt::Write;

    let mut walker = ChunkWalker::new(buffer)?;
    let mut report = String::new();
    let mut index = 0;
    while let Some(raw) = walker.next()? {
        let ok = checksum::chunk_crc(&raw.fourcc, raw.data) == raw.crc;
        let critical = raw.fourcc[0] & 0x20 == 0;
        let _ = writeln!(
            report,
            "{:3}: {} ({})  length {:8}  crc {:08X} [{}]",
            index,
            fourcc_str(&raw.fourcc),
            if critical { "critical" } else { "ancillary" },
            raw.data.len(),
            raw.crc,
            if ok { "ok" } else { "BAD" },
        );
        index += 1;
    }
    Ok(report)
}

/// Append a chunk with a freshly computed CRC.
pub(crate) fn write_chunk(out: &mut Vec<u8>, fourcc: [u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&fourcc);
    out.extend_from_slice(data);
    out.extend_from_slice(&checksum::chunk_crc(&fourcc, data).to_be_bytes());
}

/// Append a chunk byte-for-byte, keeping its stored CRC.
fn write_stored_chunk(out: &mut Vec<u8>, raw: &RawChunk) {
    out.extend_from_slice(&(raw.data.len() as u32).to_be_bytes());
    out.extend_from_slice(&raw.fourcc);
    out.extend_from_slice(raw.data);
    out.extend_from_slice(&raw.crc.to_be_bytes());
}

fn contains(buffer: &[u8], fourcc: [u8; 4]) -> Result<bool, Error> {
    let mut walker = ChunkWalker::new(buffer)?;
    while let Some(raw) = walker.next()? {
        if raw.fourcc == fourcc {
            return Ok(true);
        }
    }
    Ok(false)
}

fn fourcc_str(fourcc: &[u8; 4]) -> String {
    String::from_utf8_lossy(fourcc).into_owned()
}

pub(crate) fn u32_be(data: &[u8], pos: usize) -> u32 {
    u32::from_be_bytes(data[pos..pos + 4].try_into().unwrap())
}
