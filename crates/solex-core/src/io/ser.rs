use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;

use crate::error::{Result, SolexError};
use crate::frame::{ColorMode, Geometry};

pub const SER_HEADER_SIZE: usize = 178;
const SER_MAGIC: &[u8; 14] = b"LUCAM-RECORDER";

/// Duration of one SER timestamp tick (100 ns), in ticks per second.
const TICKS_PER_SECOND: f64 = 10_000_000.0;

/// SER file header (178 bytes).
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    pub little_endian: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    /// Local start time, 100 ns ticks.
    pub date_time: u64,
    /// UTC start time, 100 ns ticks.
    pub date_time_utc: u64,
}

impl SerHeader {
    pub fn color_mode(&self) -> ColorMode {
        match self.color_id {
            0 => ColorMode::Mono,
            8 => ColorMode::BayerRGGB,
            9 => ColorMode::BayerGRBG,
            10 => ColorMode::BayerGBRG,
            11 => ColorMode::BayerBGGR,
            100 => ColorMode::RGB,
            101 => ColorMode::BGR,
            _ => ColorMode::Mono,
        }
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            width: self.width as usize,
            height: self.height as usize,
            pixel_depth: self.pixel_depth,
            color_mode: self.color_mode(),
            little_endian: self.little_endian,
        }
    }

    /// Total bytes per frame.
    pub fn frame_byte_size(&self) -> usize {
        self.geometry().frame_byte_size()
    }
}

/// Memory-mapped SER reader with an exclusive position cursor.
///
/// The reader is sequential: there is at most one active reader per file,
/// and concurrent consumers must copy `current_frame_bytes` into their own
/// buffer before the cursor advances.
pub struct SerReader {
    mmap: Mmap,
    header: SerHeader,
    position: usize,
}

impl SerReader {
    /// Open a SER file and parse its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < SER_HEADER_SIZE {
            return Err(SolexError::InvalidSer(
                "File too small for SER header".into(),
            ));
        }

        if &mmap[0..14] != SER_MAGIC {
            return Err(SolexError::InvalidSer(
                "Missing LUCAM-RECORDER magic".into(),
            ));
        }

        let header = parse_header(&mmap[..SER_HEADER_SIZE])?;

        let expected_data_size =
            SER_HEADER_SIZE + header.frame_byte_size() * header.frame_count as usize;
        if mmap.len() < expected_data_size {
            return Err(SolexError::InvalidSer(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected_data_size,
                mmap.len()
            )));
        }

        Ok(Self {
            mmap,
            header,
            position: 0,
        })
    }

    pub fn header(&self) -> &SerHeader {
        &self.header
    }

    pub fn geometry(&self) -> Geometry {
        self.header.geometry()
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    /// Index of the frame the cursor currently points at.
    pub fn current_frame(&self) -> usize {
        self.position
    }

    /// Move the cursor to an absolute frame index.
    pub fn seek(&mut self, index: usize) -> Result<()> {
        if index >= self.frame_count() {
            return Err(SolexError::FrameIndexOutOfRange {
                index,
                total: self.frame_count(),
            });
        }
        self.position = index;
        Ok(())
    }

    /// Advance the cursor by one frame. Advancing to one past the last
    /// frame leaves the reader exhausted; advancing further is an error.
    pub fn next_frame(&mut self) -> Result<()> {
        if self.position >= self.frame_count() {
            return Err(SolexError::FrameIndexOutOfRange {
                index: self.position + 1,
                total: self.frame_count(),
            });
        }
        self.position += 1;
        Ok(())
    }

    /// Raw bytes of the frame under the cursor (zero-copy from the map).
    pub fn current_frame_bytes(&self) -> Result<&[u8]> {
        self.frame_raw(self.position)
    }

    fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let count = self.frame_count();
        if index >= count {
            return Err(SolexError::FrameIndexOutOfRange {
                index,
                total: count,
            });
        }
        let offset = SER_HEADER_SIZE + index * self.header.frame_byte_size();
        let end = offset + self.header.frame_byte_size();
        Ok(&self.mmap[offset..end])
    }

    /// Per-frame timestamp from the optional trailer, 100 ns ticks.
    pub fn frame_timestamp(&self, index: usize) -> Option<u64> {
        let trailer_offset =
            SER_HEADER_SIZE + self.header.frame_byte_size() * self.frame_count();
        let ts_offset = trailer_offset + index * 8;
        if index < self.frame_count() && ts_offset + 8 <= self.mmap.len() {
            let bytes = &self.mmap[ts_offset..ts_offset + 8];
            Some(u64::from_le_bytes(bytes.try_into().ok()?))
        } else {
            None
        }
    }

    /// Estimate the capture frame rate from the timestamp trailer.
    ///
    /// Uses the median inter-frame delta so a few dropped frames do not
    /// skew the estimate. `None` without a trailer or with fewer than two
    /// frames.
    pub fn estimate_fps(&self) -> Option<f64> {
        let count = self.frame_count();
        if count < 2 {
            return None;
        }
        let mut deltas: Vec<u64> = (1..count)
            .filter_map(|i| {
                let prev = self.frame_timestamp(i - 1)?;
                let curr = self.frame_timestamp(i)?;
                curr.checked_sub(prev)
            })
            .filter(|&d| d > 0)
            .collect();
        if deltas.len() < count / 2 {
            return None;
        }
        deltas.sort_unstable();
        let median = deltas[deltas.len() / 2] as f64;
        Some(TICKS_PER_SECOND / median)
    }
}

fn parse_header(buf: &[u8]) -> Result<SerHeader> {
    let mut cursor = std::io::Cursor::new(&buf[14..]); // skip magic

    let _lu_id = cursor.read_i32::<LittleEndian>()?;
    let color_id = cursor.read_i32::<LittleEndian>()?;
    let le_flag = cursor.read_i32::<LittleEndian>()?;
    let width = cursor.read_i32::<LittleEndian>()? as u32;
    let height = cursor.read_i32::<LittleEndian>()? as u32;
    let pixel_depth = cursor.read_i32::<LittleEndian>()? as u32;
    let frame_count = cursor.read_i32::<LittleEndian>()? as u32;

    let observer = read_fixed_string(&buf[42..82]);
    let instrument = read_fixed_string(&buf[82..122]);
    let telescope = read_fixed_string(&buf[122..162]);

    let mut cursor = std::io::Cursor::new(&buf[162..]);
    let date_time = cursor.read_u64::<LittleEndian>()?;
    let date_time_utc = cursor.read_u64::<LittleEndian>()?;

    if width == 0 || height == 0 {
        return Err(SolexError::InvalidDimensions { width, height });
    }

    if !(1..=16).contains(&pixel_depth) {
        return Err(SolexError::InvalidSer(format!(
            "Unsupported pixel depth {pixel_depth}"
        )));
    }

    // SER spec: LittleEndian field = 0 means big-endian pixel data,
    // but most writers (including FireCapture) use 0 for little-endian.
    // Follow Siril's convention: treat 0 as little-endian.
    let little_endian = le_flag != 1;

    Ok(SerHeader {
        color_id,
        little_endian,
        width,
        height,
        pixel_depth,
        frame_count,
        observer,
        instrument,
        telescope,
        date_time,
        date_time_utc,
    })
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}
