// Resumable PNG decoder for 256x256 map tiles
//
// Decodes straight into an RGB565 tile buffer. Each step() reads at
// most 4 KiB from storage and pushes it through the chunk parser and a
// streaming zlib inflater (miniz_oxide, 32 KiB wrapping window), so a
// decode can be spread over as many scheduler quanta as it needs and
// picked up exactly where it stopped.
//
// Colour types: 0 grey (1/2/4/8), 2 RGB, 3 palette (1/2/4/8),
// 4 grey+alpha, 6 RGBA, 8-bit channels. Interlaced files are rejected.
// Alpha is blended against white. CRCs are not checked.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use miniz_oxide::inflate::TINFLStatus;
use miniz_oxide::inflate::core::{DecompressorOxide, decompress, inflate_flags};

use crate::drivers::storage::Storage;
use crate::error::{Error, Result};

pub const TILE_PX: usize = 256;
pub const READ_CHUNK: usize = 4096;

const PNG_SIG: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

const CHUNK_IHDR: [u8; 4] = *b"IHDR";
const CHUNK_PLTE: [u8; 4] = *b"PLTE";
const CHUNK_IDAT: [u8; 4] = *b"IDAT";
const CHUNK_IEND: [u8; 4] = *b"IEND";

const COLOR_GREY: u8 = 0;
const COLOR_RGB: u8 = 2;
const COLOR_PALETTE: u8 = 3;
const COLOR_GREY_ALPHA: u8 = 4;
const COLOR_RGBA: u8 = 6;

const FILTER_NONE: u8 = 0;
const FILTER_SUB: u8 = 1;
const FILTER_UP: u8 = 2;
const FILTER_AVERAGE: u8 = 3;
const FILTER_PAETH: u8 = 4;

// must be a power of two >= 32768 for wrapping-mode inflate
const DICT_SIZE: usize = 32_768;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Pending,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Signature,
    ChunkHeader,
    Ihdr(usize),
    Plte(usize),
    Idat(usize),
    // chunk data or CRC being skipped
    Skip(usize),
    Done,
}

#[derive(Debug, Clone, Copy, Default)]
struct Header {
    bit_depth: u8,
    color_type: u8,
}

impl Header {
    // filter stride; 1 for sub-byte depths
    fn bytes_per_pixel(&self) -> usize {
        match (self.color_type, self.bit_depth) {
            (_, d) if d < 8 => 1,
            (COLOR_RGB, _) => 3,
            (COLOR_GREY_ALPHA, _) => 2,
            (COLOR_RGBA, _) => 4,
            _ => 1,
        }
    }

    fn scanline_bytes(&self) -> usize {
        let channels = match self.color_type {
            COLOR_RGB => 3,
            COLOR_GREY_ALPHA => 2,
            COLOR_RGBA => 4,
            _ => 1,
        };
        (TILE_PX * channels * self.bit_depth as usize).div_ceil(8)
    }
}

pub struct PngDecoder {
    path: String,
    file_pos: u32,
    eof: bool,
    input: Vec<u8>,
    stage: Stage,
    header: Option<Header>,
    palette: [u16; 256],

    inflater: Box<DecompressorOxide>,
    dict: Vec<u8>,
    dict_pos: usize,

    // filter byte + one scanline
    row: Vec<u8>,
    row_pos: usize,
    prev: Vec<u8>,
    y: usize,
}

impl PngDecoder {
    pub fn new(path: &str) -> Self {
        Self {
            path: String::from(path),
            file_pos: 0,
            eof: false,
            input: Vec::new(),
            stage: Stage::Signature,
            header: None,
            palette: [0; 256],
            inflater: Box::default(),
            dict: Vec::new(),
            dict_pos: 0,
            row: Vec::new(),
            row_pos: 0,
            prev: Vec::new(),
            y: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    // one read plus whatever decoding it enables; out is TILE_PX^2 RGB565
    pub fn step<S: Storage>(&mut self, storage: &mut S, out: &mut [u16]) -> Result<Progress> {
        if self.stage == Stage::Done {
            return Ok(Progress::Done);
        }
        if out.len() < TILE_PX * TILE_PX {
            return Err(Error::Io);
        }

        if !self.eof {
            let mut chunk = [0u8; READ_CHUNK];
            let n = storage.read(&self.path, self.file_pos, &mut chunk)?;
            if n == 0 {
                self.eof = true;
            }
            self.file_pos += n as u32;
            self.input.extend_from_slice(&chunk[..n]);
        }

        let input = core::mem::take(&mut self.input);
        let result = self.process(&input, out);
        let used = *result.as_ref().unwrap_or(&0);
        self.input = input;
        self.input.drain(..used);
        result?;

        if self.stage == Stage::Done {
            return Ok(Progress::Done);
        }
        if self.eof {
            // nothing more will arrive
            return Err(Error::Parse);
        }
        Ok(Progress::Pending)
    }

    // consumes what it can from data; returns bytes used
    fn process(&mut self, data: &[u8], out: &mut [u16]) -> Result<usize> {
        let mut pos = 0;
        loop {
            let avail = data.len() - pos;
            match self.stage {
                Stage::Signature => {
                    if avail < 8 {
                        break;
                    }
                    if data[pos..pos + 8] != PNG_SIG {
                        return Err(Error::Parse);
                    }
                    pos += 8;
                    self.stage = Stage::ChunkHeader;
                }
                Stage::ChunkHeader => {
                    if avail < 8 {
                        break;
                    }
                    let len = be_u32(data, pos) as usize;
                    let kind: [u8; 4] = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];
                    pos += 8;
                    self.stage = match kind {
                        CHUNK_IHDR => Stage::Ihdr(len),
                        CHUNK_PLTE => Stage::Plte(len),
                        CHUNK_IDAT if self.header.is_some() => Stage::Idat(len),
                        CHUNK_IDAT => return Err(Error::Parse),
                        // image data ended early
                        CHUNK_IEND => return Err(Error::Parse),
                        _ => Stage::Skip(len + 4),
                    };
                }
                Stage::Ihdr(len) => {
                    if len < 13 {
                        return Err(Error::Parse);
                    }
                    if avail < len + 4 {
                        break;
                    }
                    self.start_image(&data[pos..pos + 13])?;
                    pos += len + 4;
                    self.stage = Stage::ChunkHeader;
                }
                Stage::Plte(len) => {
                    if len > 768 || len % 3 != 0 {
                        return Err(Error::Parse);
                    }
                    if avail < len + 4 {
                        break;
                    }
                    for (i, rgb) in data[pos..pos + len].chunks_exact(3).enumerate() {
                        self.palette[i] = rgb565(rgb[0], rgb[1], rgb[2]);
                    }
                    pos += len + 4;
                    self.stage = Stage::ChunkHeader;
                }
                Stage::Skip(left) => {
                    let n = left.min(avail);
                    pos += n;
                    if n == left {
                        self.stage = Stage::ChunkHeader;
                    } else {
                        self.stage = Stage::Skip(left - n);
                        break;
                    }
                }
                Stage::Idat(0) => self.stage = Stage::Skip(4),
                Stage::Idat(left) => {
                    let take = left.min(avail);
                    if take == 0 {
                        break;
                    }
                    let used = self.inflate(&data[pos..pos + take], out)?;
                    pos += used;
                    self.stage = Stage::Idat(left - used);
                    if self.y == TILE_PX {
                        self.stage = Stage::Done;
                    } else if used < take {
                        break;
                    }
                }
                Stage::Done => break,
            }
        }
        Ok(pos)
    }

    fn start_image(&mut self, ihdr: &[u8]) -> Result<()> {
        let width = be_u32(ihdr, 0) as usize;
        let height = be_u32(ihdr, 4) as usize;
        let header = Header {
            bit_depth: ihdr[8],
            color_type: ihdr[9],
        };
        if width != TILE_PX || height != TILE_PX || ihdr[12] != 0 {
            return Err(Error::Parse);
        }
        match (header.color_type, header.bit_depth) {
            (COLOR_GREY | COLOR_PALETTE, 1 | 2 | 4 | 8) => {}
            (COLOR_RGB | COLOR_GREY_ALPHA | COLOR_RGBA, 8) => {}
            _ => return Err(Error::Parse),
        }
        let line = header.scanline_bytes();
        self.row = vec![0u8; line + 1];
        self.prev = vec![0u8; line];
        self.dict = vec![0u8; DICT_SIZE];
        self.header = Some(header);
        Ok(())
    }

    fn inflate(&mut self, data: &[u8], out: &mut [u16]) -> Result<usize> {
        let flags = inflate_flags::TINFL_FLAG_PARSE_ZLIB_HEADER | inflate_flags::TINFL_FLAG_HAS_MORE_INPUT;
        let mut used = 0;
        while self.y < TILE_PX {
            let write_pos = self.dict_pos & (DICT_SIZE - 1);
            let (status, consumed, produced) =
                decompress(&mut self.inflater, &data[used..], &mut self.dict, write_pos, flags);
            used += consumed;
            for i in 0..produced {
                let b = self.dict[(write_pos + i) & (DICT_SIZE - 1)];
                self.push_byte(b, out);
                if self.y == TILE_PX {
                    break;
                }
            }
            self.dict_pos += produced;

            match status {
                TINFLStatus::Done | TINFLStatus::NeedsMoreInput => break,
                TINFLStatus::HasMoreOutput => {
                    if consumed == 0 && produced == 0 {
                        return Err(Error::Parse);
                    }
                }
                _ => return Err(Error::Parse),
            }
        }
        Ok(used)
    }

    fn push_byte(&mut self, b: u8, out: &mut [u16]) {
        self.row[self.row_pos] = b;
        self.row_pos += 1;
        if self.row_pos < self.row.len() {
            return;
        }
        self.row_pos = 0;
        let Some(hdr) = self.header else {
            return;
        };
        let filter = self.row[0];
        unfilter_row(filter, &mut self.row[1..], &self.prev, hdr.bytes_per_pixel());
        let line = &self.row[1..];
        let dst = &mut out[self.y * TILE_PX..(self.y + 1) * TILE_PX];
        for (x, px) in dst.iter_mut().enumerate() {
            *px = pixel(line, x, &hdr, &self.palette);
        }
        self.prev.copy_from_slice(line);
        self.y += 1;
    }
}

#[inline]
fn be_u32(d: &[u8], o: usize) -> u32 {
    u32::from_be_bytes([d[o], d[o + 1], d[o + 2], d[o + 3]])
}

#[inline]
pub const fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

fn unfilter_row(filter: u8, row: &mut [u8], prev: &[u8], bpp: usize) {
    let len = row.len();
    match filter {
        FILTER_NONE => {}
        FILTER_SUB => {
            for i in bpp..len {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        FILTER_UP => {
            for i in 0..len {
                row[i] = row[i].wrapping_add(prev[i]);
            }
        }
        FILTER_AVERAGE => {
            for i in 0..len {
                let a = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                row[i] = row[i].wrapping_add(((a + prev[i] as u16) / 2) as u8);
            }
        }
        FILTER_PAETH => {
            for i in 0..len {
                let a = if i >= bpp { row[i - bpp] } else { 0 };
                let c = if i >= bpp { prev[i - bpp] } else { 0 };
                row[i] = row[i].wrapping_add(paeth(a, prev[i], c));
            }
        }
        _ => {}
    }
}

#[inline]
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let (a, b, c) = (a as i16, b as i16, c as i16);
    let p = a + b - c;
    let pa = (p - a).unsigned_abs();
    let pb = (p - b).unsigned_abs();
    let pc = (p - c).unsigned_abs();
    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

fn pixel(line: &[u8], x: usize, hdr: &Header, pal: &[u16; 256]) -> u16 {
    match (hdr.color_type, hdr.bit_depth) {
        (COLOR_GREY, 8) => grey565(line[x]),
        (COLOR_GREY, bd) => {
            let max = (1u16 << bd) - 1;
            grey565((sub_byte(line, x, bd) as u16 * 255 / max) as u8)
        }
        (COLOR_PALETTE, 8) => pal[line[x] as usize],
        (COLOR_PALETTE, bd) => pal[sub_byte(line, x, bd) as usize],
        (COLOR_RGB, _) => rgb565(line[x * 3], line[x * 3 + 1], line[x * 3 + 2]),
        (COLOR_GREY_ALPHA, _) => grey565(over_white(line[x * 2], line[x * 2 + 1])),
        (COLOR_RGBA, _) => {
            let a = line[x * 4 + 3];
            rgb565(
                over_white(line[x * 4], a),
                over_white(line[x * 4 + 1], a),
                over_white(line[x * 4 + 2], a),
            )
        }
        _ => 0,
    }
}

#[inline]
fn grey565(g: u8) -> u16 {
    rgb565(g, g, g)
}

#[inline]
fn over_white(v: u8, alpha: u8) -> u8 {
    let (v, a) = (v as u16, alpha as u16);
    ((v * a + 255 * (255 - a)) / 255) as u8
}

// 1/2/4-bit sample, MSB first
#[inline]
fn sub_byte(line: &[u8], x: usize, bit_depth: u8) -> u8 {
    let bits = bit_depth as usize;
    let per_byte = 8 / bits;
    let shift = (per_byte - 1 - x % per_byte) * bits;
    (line[x / per_byte] >> shift) & ((1u8 << bits) - 1)
}
