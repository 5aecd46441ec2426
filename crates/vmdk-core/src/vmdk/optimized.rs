//! StreamOptimized VMDK writer.
//!
//! Produces a version-3, marker-framed, DEFLATE-compressed VMDK from any
//! already-open [`crate::vmdk::stream::SparseStream`] — the companion
//! operation to the rest of this module that *reads* existing VMDKs: this
//! one *writes* a streamOptimized copy of whatever content a composed
//! sparse stream exposes.

use std::collections::BTreeMap;
use std::io::{Read, Seek, Write};

use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::vmdk::stream::SparseStream;

/// VMDK magic number ("KDMV" as little-endian u32).
pub const VMDK_MAGIC: u32 = 0x564D444B;

/// Size of a sector in bytes.
pub const SECTOR_SIZE: u64 = 512;

/// Default grain size in sectors (128 sectors = 64KB).
pub const DEFAULT_GRAIN_SIZE: u64 = 128;

/// Number of grain table entries per grain table.
pub const GT_ENTRIES_PER_GT: u32 = 512;

/// Flags for streamOptimized VMDK.
/// - Bit 0: Valid new line detection
/// - Bit 16: Compressed grains
/// - Bit 17: Markers
const STREAM_OPTIMIZED_FLAGS: u32 = 0x30001 | (1 << 16) | (1 << 17);

/// Grain directory offset value indicating GD is at end of file.
const GD_AT_END: u64 = 0xFFFFFFFFFFFFFFFF;

/// Compression algorithm: DEFLATE.
const COMPRESS_ALGORITHM_DEFLATE: u16 = 1;

/// Marker types used in streamOptimized VMDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MarkerType {
    /// No marker / End of stream marker.
    EndOfStream = 0,
    /// Grain table marker.
    GrainTable = 1,
    /// Grain directory marker.
    GrainDirectory = 2,
    /// Footer marker.
    Footer = 3,
}

/// A marker structure used in streamOptimized VMDK.
///
/// Markers are 512-byte structures that precede metadata regions.
#[derive(Debug, Clone)]
pub struct Marker {
    /// Number of sectors that follow this marker (for GD/GT).
    pub num_sectors: u64,
    /// Size in bytes (for compressed grains).
    pub size: u32,
    /// Marker type.
    pub marker_type: MarkerType,
}

impl Marker {
    /// Creates a new marker.
    pub fn new(marker_type: MarkerType, num_sectors: u64) -> Self {
        Self {
            num_sectors,
            size: 0,
            marker_type,
        }
    }

    /// Serializes the marker to 512 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; SECTOR_SIZE as usize];
        buf[0..8].copy_from_slice(&self.num_sectors.to_le_bytes());
        buf[8..12].copy_from_slice(&self.size.to_le_bytes());
        buf[12..16].copy_from_slice(&(self.marker_type as u32).to_le_bytes());
        buf
    }
}

/// Grain marker that precedes compressed grain data.
///
/// This is a 12-byte structure embedded before each compressed grain.
#[derive(Debug, Clone)]
pub struct GrainMarker {
    /// Logical block address of the grain (in sectors).
    pub lba: u64,
    /// Size of the compressed grain data in bytes.
    pub size: u32,
}

impl GrainMarker {
    /// Creates a new grain marker.
    pub fn new(lba: u64, size: u32) -> Self {
        Self { lba, size }
    }

    /// Serializes the grain marker to 12 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; 12];
        buf[0..8].copy_from_slice(&self.lba.to_le_bytes());
        buf[8..12].copy_from_slice(&self.size.to_le_bytes());
        buf
    }
}

/// Sparse extent header for streamOptimized VMDK files.
///
/// This is the 512-byte structure at the start of the file, written once up
/// front and again (with the real `gd_offset`) as the trailing footer.
#[derive(Debug, Clone)]
pub struct SparseExtentHeader {
    pub magic: u32,
    pub version: u32,
    pub flags: u32,
    pub capacity: u64,
    pub grain_size: u64,
    pub descriptor_offset: u64,
    pub descriptor_size: u64,
    pub num_gtes_per_gt: u32,
    pub rgd_offset: u64,
    pub gd_offset: u64,
    pub overhead: u64,
    pub unclean_shutdown: u8,
    pub newline_chars: [u8; 4],
    pub compress_algorithm: u16,
}

impl SparseExtentHeader {
    /// Creates a new sparse extent header for the given capacity.
    pub fn new(capacity_bytes: u64) -> Self {
        let capacity_sectors = capacity_bytes / SECTOR_SIZE;

        Self {
            magic: VMDK_MAGIC,
            version: 3,
            flags: STREAM_OPTIMIZED_FLAGS,
            capacity: capacity_sectors,
            grain_size: DEFAULT_GRAIN_SIZE,
            descriptor_offset: 0,
            descriptor_size: 0,
            num_gtes_per_gt: GT_ENTRIES_PER_GT,
            rgd_offset: 0,
            gd_offset: GD_AT_END,
            overhead: 0,
            unclean_shutdown: 0,
            newline_chars: [b'\n', b' ', b'\r', b'\n'],
            compress_algorithm: COMPRESS_ALGORITHM_DEFLATE,
        }
    }

    /// Serializes the header to exactly 512 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; SECTOR_SIZE as usize];

        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.flags.to_le_bytes());
        buf[12..20].copy_from_slice(&self.capacity.to_le_bytes());
        buf[20..28].copy_from_slice(&self.grain_size.to_le_bytes());
        buf[28..36].copy_from_slice(&self.descriptor_offset.to_le_bytes());
        buf[36..44].copy_from_slice(&self.descriptor_size.to_le_bytes());
        buf[44..48].copy_from_slice(&self.num_gtes_per_gt.to_le_bytes());
        buf[48..56].copy_from_slice(&self.rgd_offset.to_le_bytes());
        buf[56..64].copy_from_slice(&self.gd_offset.to_le_bytes());
        buf[64..72].copy_from_slice(&self.overhead.to_le_bytes());
        buf[72] = self.unclean_shutdown;
        buf[73] = self.newline_chars[0];
        buf[74] = self.newline_chars[1];
        buf[75] = self.newline_chars[2];
        buf[76] = self.newline_chars[3];
        buf[77..79].copy_from_slice(&self.compress_algorithm.to_le_bytes());

        buf
    }

    /// Creates a footer header with the actual GD offset.
    pub fn as_footer(&self, gd_offset_sectors: u64) -> Self {
        let mut footer = self.clone();
        footer.gd_offset = gd_offset_sectors;
        footer
    }
}

/// Compresses grain data using DEFLATE.
pub fn compress_grain(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| Error::vmdk(format!("failed to compress grain: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::vmdk(format!("failed to finish compression: {}", e)))
}

/// A writer for creating streamOptimized VMDK files.
///
/// Grains are written in any order via [`Self::write_grain`]; [`Self::finish`]
/// lays down the grain tables, grain directory, footer, and end-of-stream
/// marker once every grain has been seen.
pub struct StreamVmdkWriter<W: Write + Seek> {
    writer: W,
    header: SparseExtentHeader,
    current_pos: u64,
    grain_offsets: BTreeMap<u64, u64>,
    grain_size_bytes: u64,
}

impl<W: Write + Seek> StreamVmdkWriter<W> {
    /// Creates a new writer and writes the provisional header.
    pub fn new(mut writer: W, capacity_bytes: u64) -> Result<Self> {
        let header = SparseExtentHeader::new(capacity_bytes);

        let header_bytes = header.to_bytes();
        writer
            .write_all(&header_bytes)
            .map_err(|e| Error::vmdk(format!("failed to write VMDK header: {}", e)))?;

        let grain_size_bytes = header.grain_size * SECTOR_SIZE;

        Ok(Self {
            writer,
            header,
            current_pos: SECTOR_SIZE,
            grain_offsets: BTreeMap::new(),
            grain_size_bytes,
        })
    }

    /// Writes a compressed, non-zero grain at the given LBA (in sectors).
    pub fn write_grain(&mut self, lba: u64, compressed_data: &[u8]) -> Result<()> {
        let grain_index = lba / self.header.grain_size;

        let marker = GrainMarker::new(lba, compressed_data.len() as u32);
        self.writer
            .write_all(&marker.to_bytes())
            .map_err(|e| Error::vmdk(format!("failed to write grain marker: {}", e)))?;

        let grain_sector = self.current_pos / SECTOR_SIZE;
        self.grain_offsets.insert(grain_index, grain_sector);

        self.writer
            .write_all(compressed_data)
            .map_err(|e| Error::vmdk(format!("failed to write grain data: {}", e)))?;

        self.current_pos += 12 + compressed_data.len() as u64;

        let remainder = self.current_pos % SECTOR_SIZE;
        if remainder != 0 {
            let padding = SECTOR_SIZE - remainder;
            self.writer
                .write_all(&vec![0u8; padding as usize])
                .map_err(|e| Error::vmdk(format!("failed to write padding: {}", e)))?;
            self.current_pos += padding;
        }

        Ok(())
    }

    /// Writes grain tables, grain directory, footer, and EOS marker.
    pub fn finish(mut self) -> Result<W> {
        let total_grains =
            (self.header.capacity + self.header.grain_size - 1) / self.header.grain_size;
        let num_gts = (total_grains + GT_ENTRIES_PER_GT as u64 - 1) / GT_ENTRIES_PER_GT as u64;

        let mut gt_offsets: Vec<u64> = Vec::with_capacity(num_gts as usize);

        for gt_index in 0..num_gts {
            let gt_start_grain = gt_index * GT_ENTRIES_PER_GT as u64;

            let mut gt_entries = vec![0u32; GT_ENTRIES_PER_GT as usize];
            for (i, entry) in gt_entries.iter_mut().enumerate() {
                let grain_index = gt_start_grain + i as u64;
                if let Some(&offset) = self.grain_offsets.get(&grain_index) {
                    *entry = offset as u32;
                }
            }

            let has_entries = gt_entries.iter().any(|&e| e != 0);
            if !has_entries {
                gt_offsets.push(0);
                continue;
            }

            let gt_size_sectors =
                (GT_ENTRIES_PER_GT * 4 + SECTOR_SIZE as u32 - 1) / SECTOR_SIZE as u32;
            let gt_marker = Marker::new(MarkerType::GrainTable, gt_size_sectors as u64);
            self.writer
                .write_all(&gt_marker.to_bytes())
                .map_err(|e| Error::vmdk(format!("failed to write GT marker: {}", e)))?;

            let gt_offset = (self.current_pos + SECTOR_SIZE) / SECTOR_SIZE;
            gt_offsets.push(gt_offset);
            self.current_pos += SECTOR_SIZE;

            let mut gt_bytes = Vec::with_capacity(GT_ENTRIES_PER_GT as usize * 4);
            for entry in &gt_entries {
                gt_bytes.extend_from_slice(&entry.to_le_bytes());
            }
            while gt_bytes.len() % SECTOR_SIZE as usize != 0 {
                gt_bytes.push(0);
            }

            self.writer
                .write_all(&gt_bytes)
                .map_err(|e| Error::vmdk(format!("failed to write grain table: {}", e)))?;
            self.current_pos += gt_bytes.len() as u64;
        }

        let gd_size_sectors = (num_gts * 4 + SECTOR_SIZE - 1) / SECTOR_SIZE;
        let gd_marker = Marker::new(MarkerType::GrainDirectory, gd_size_sectors);
        self.writer
            .write_all(&gd_marker.to_bytes())
            .map_err(|e| Error::vmdk(format!("failed to write GD marker: {}", e)))?;

        let gd_offset = (self.current_pos + SECTOR_SIZE) / SECTOR_SIZE;
        self.current_pos += SECTOR_SIZE;

        let mut gd_bytes = Vec::with_capacity(num_gts as usize * 4);
        for &gt_offset in &gt_offsets {
            gd_bytes.extend_from_slice(&(gt_offset as u32).to_le_bytes());
        }
        while gd_bytes.len() % SECTOR_SIZE as usize != 0 {
            gd_bytes.push(0);
        }

        self.writer
            .write_all(&gd_bytes)
            .map_err(|e| Error::vmdk(format!("failed to write grain directory: {}", e)))?;
        self.current_pos += gd_bytes.len() as u64;

        let footer_marker = Marker::new(MarkerType::Footer, 1);
        self.writer
            .write_all(&footer_marker.to_bytes())
            .map_err(|e| Error::vmdk(format!("failed to write footer marker: {}", e)))?;
        self.current_pos += SECTOR_SIZE;

        let footer = self.header.as_footer(gd_offset);
        self.writer
            .write_all(&footer.to_bytes())
            .map_err(|e| Error::vmdk(format!("failed to write footer: {}", e)))?;
        self.current_pos += SECTOR_SIZE;

        let eos_marker = Marker::new(MarkerType::EndOfStream, 0);
        self.writer
            .write_all(&eos_marker.to_bytes())
            .map_err(|e| Error::vmdk(format!("failed to write EOS marker: {}", e)))?;

        self.writer
            .flush()
            .map_err(|e| Error::vmdk(format!("failed to flush VMDK: {}", e)))?;

        Ok(self.writer)
    }

    /// Returns the grain size in bytes.
    pub fn grain_size_bytes(&self) -> u64 {
        self.grain_size_bytes
    }

    /// Returns the total capacity in bytes.
    pub fn capacity_bytes(&self) -> u64 {
        self.header.capacity * SECTOR_SIZE
    }
}

/// Reads `content` sequentially in grain-sized chunks and writes a
/// compressed streamOptimized copy to `out`.
///
/// All-zero chunks are left unallocated rather than compressed and written —
/// the one behavioral addition over the original, buffer-at-a-time writer,
/// needed because `content` here may be a large flat or zero-backed stream
/// rather than a caller-curated set of non-zero grains.
pub fn convert_to_stream_optimized<R, W>(
    content: &mut R,
    capacity_bytes: u64,
    out: W,
    compression_level: u32,
) -> Result<W>
where
    R: Read + ?Sized,
    W: Write + Seek,
{
    let mut writer = StreamVmdkWriter::new(out, capacity_bytes)?;
    let grain_bytes = writer.grain_size_bytes();

    let mut buf = vec![0u8; grain_bytes as usize];
    let mut lba = 0u64;

    loop {
        let n = read_fill(content, &mut buf)?;
        if n == 0 {
            break;
        }
        if buf[..n].iter().any(|&b| b != 0) {
            let compressed = compress_grain(&buf[..n], compression_level)?;
            writer.write_grain(lba, &compressed)?;
        }
        lba += grain_bytes / SECTOR_SIZE;
        if n < buf.len() {
            break;
        }
    }

    writer.finish()
}

fn read_fill<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Convenience wrapper accepting any [`SparseStream`] directly.
pub fn convert_sparse_stream_to_stream_optimized<W: Write + Seek>(
    content: &mut dyn SparseStream,
    out: W,
    compression_level: u32,
) -> Result<W> {
    let capacity_bytes = content.len();
    content.seek(std::io::SeekFrom::Start(0))?;
    convert_to_stream_optimized(content, capacity_bytes, out, compression_level)
}
