//! Fixed binary headers for hosted-sparse and server-sparse (VMFS) extents.

use crate::error::{Error, Result};
use crate::vmdk::sector::{self, read_u32, read_u64, write_u32, write_u64, SECTOR};

/// VMDK magic number, "KDMV" read as a little-endian `u32`.
pub const HOSTED_MAGIC: u32 = 0x564d444b;

/// Valid-newline-detection-test flag.
pub const FLAG_VALID_NEWLINE: u32 = 1 << 0;
/// Redundant grain directory/table present.
pub const FLAG_REDUNDANT_GRAIN_TABLE: u32 = 1 << 1;
/// Grains are DEFLATE-compressed (streamOptimized).
pub const FLAG_COMPRESSED: u32 = 1 << 16;
/// Grain/GT/GD/footer markers are present (streamOptimized).
pub const FLAG_MARKERS: u32 = 1 << 17;

/// Fixed number of grain table entries per grain table.
pub const GTES_PER_GT: u32 = 512;

/// The 64-byte header at offset 0 of a hosted-sparse extent (monolithicSparse,
/// twoGbMaxExtentSparse, streamOptimized).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedSparseExtentHeader {
    pub version: u32,
    pub flags: u32,
    /// Virtual disk capacity, in sectors.
    pub capacity: u64,
    /// Grain size, in sectors.
    pub grain_size: u64,
    /// Sector at which the embedded descriptor starts (0 = not embedded).
    pub descriptor_offset: u64,
    /// Length of the embedded descriptor, in sectors.
    pub descriptor_size: u64,
    pub num_gte_per_gt: u32,
    /// Sector at which the redundant grain directory starts.
    pub rgd_offset: u64,
    /// Sector at which the primary grain directory starts.
    pub gd_offset: u64,
    /// Sector at which grain data begins.
    pub overhead: u64,
}

impl HostedSparseExtentHeader {
    /// Parses a header from the first 512 bytes of an extent file.
    ///
    /// Fails with [`Error::NotAVmdk`] if the magic does not match, and with
    /// [`Error::Corrupt`] if `data` is too short to contain a full header.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 512 {
            return Err(Error::corrupt("hosted sparse header shorter than 512 bytes"));
        }

        let magic = read_u32(data, 0);
        if magic != HOSTED_MAGIC {
            return Err(Error::NotAVmdk);
        }

        Ok(Self {
            version: read_u32(data, 4),
            flags: read_u32(data, 8),
            capacity: read_u64(data, 12),
            grain_size: read_u64(data, 20),
            descriptor_offset: read_u64(data, 28),
            descriptor_size: read_u64(data, 36),
            num_gte_per_gt: read_u32(data, 44),
            rgd_offset: read_u64(data, 48),
            gd_offset: read_u64(data, 56),
            overhead: read_u64(data, 64),
        })
    }

    /// Serializes the header to exactly 512 bytes, zero-padded.
    pub fn to_bytes(&self) -> [u8; 512] {
        let mut buf = [0u8; 512];
        write_u32(&mut buf, 0, HOSTED_MAGIC);
        write_u32(&mut buf, 4, self.version);
        write_u32(&mut buf, 8, self.flags);
        write_u64(&mut buf, 12, self.capacity);
        write_u64(&mut buf, 20, self.grain_size);
        write_u64(&mut buf, 28, self.descriptor_offset);
        write_u64(&mut buf, 36, self.descriptor_size);
        write_u32(&mut buf, 44, self.num_gte_per_gt);
        write_u64(&mut buf, 48, self.rgd_offset);
        write_u64(&mut buf, 56, self.gd_offset);
        write_u64(&mut buf, 64, self.overhead);
        buf
    }

    pub fn is_redundant_grain_table(&self) -> bool {
        self.flags & FLAG_REDUNDANT_GRAIN_TABLE != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    pub fn has_markers(&self) -> bool {
        self.flags & FLAG_MARKERS != 0
    }

    /// Number of grain directory entries implied by `capacity`/`grain_size`.
    pub fn num_gd_entries(&self) -> u64 {
        let grains_total = sector::ceil(self.capacity, self.grain_size.max(1));
        sector::ceil(grains_total, self.num_gte_per_gt.max(1) as u64)
    }
}

/// The header occupying the first four sectors (2048 bytes) of a server
/// sparse (VMFS) extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSparseExtentHeader {
    /// Virtual disk capacity, in sectors.
    pub capacity: u64,
    /// Grain size, in sectors (always 1 for server sparse).
    pub grain_size: u64,
    /// Sector at which the grain directory starts.
    pub gd_offset: u64,
    /// Number of grain directory entries.
    pub num_gd_entries: u64,
    /// First sector free for grain allocation.
    pub free_sector: u64,
}

impl ServerSparseExtentHeader {
    /// Builds a new header for `capacity_bytes` worth of virtual disk.
    pub fn new(capacity_bytes: u64) -> Self {
        let capacity = sector::ceil(capacity_bytes, SECTOR);
        let gd_offset = 4;
        let num_gd_entries = sector::ceil(capacity_bytes, 2 * sector::ONE_MIB);
        let free_sector = gd_offset + sector::ceil(num_gd_entries * 4, SECTOR);

        Self {
            capacity,
            grain_size: 1,
            gd_offset,
            num_gd_entries,
            free_sector,
        }
    }

    /// Serializes the header into the first 2048 bytes (4 sectors) of the file.
    pub fn to_bytes(&self) -> [u8; 2048] {
        let mut buf = [0u8; 2048];
        write_u64(&mut buf, 0, self.capacity);
        write_u64(&mut buf, 8, self.grain_size);
        write_u64(&mut buf, 16, self.gd_offset);
        write_u64(&mut buf, 24, self.num_gd_entries);
        write_u64(&mut buf, 32, self.free_sector);
        buf
    }

    /// Parses a header from the first 2048 bytes of a server sparse extent.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2048 {
            return Err(Error::corrupt("server sparse header shorter than 2048 bytes"));
        }
        Ok(Self {
            capacity: read_u64(data, 0),
            grain_size: read_u64(data, 8),
            gd_offset: read_u64(data, 16),
            num_gd_entries: read_u64(data, 24),
            free_sector: read_u64(data, 32),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hosted_header() -> HostedSparseExtentHeader {
        HostedSparseExtentHeader {
            version: 1,
            flags: FLAG_VALID_NEWLINE | FLAG_REDUNDANT_GRAIN_TABLE,
            capacity: 204800,
            grain_size: 128,
            descriptor_offset: 1,
            descriptor_size: 20,
            num_gte_per_gt: GTES_PER_GT,
            rgd_offset: 21,
            gd_offset: 1050,
            overhead: 1280,
        }
    }

    #[test]
    fn test_hosted_header_roundtrip() {
        let header = sample_hosted_header();
        let bytes = header.to_bytes();
        let parsed = HostedSparseExtentHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_hosted_header_magic_bytes() {
        let header = sample_hosted_header();
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..4], b"KDMV");
    }

    #[test]
    fn test_hosted_header_bad_magic() {
        let bytes = [0u8; 512];
        let err = HostedSparseExtentHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::NotAVmdk));
    }

    #[test]
    fn test_hosted_header_too_short() {
        let bytes = [0u8; 32];
        let err = HostedSparseExtentHeader::parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_hosted_header_flags() {
        let header = sample_hosted_header();
        assert!(header.is_redundant_grain_table());
        assert!(!header.is_compressed());
        assert!(!header.has_markers());
    }

    #[test]
    fn test_hosted_header_serialize_length() {
        let header = sample_hosted_header();
        assert_eq!(header.to_bytes().len(), 512);
    }

    #[test]
    fn test_hosted_header_num_gd_entries() {
        let header = sample_hosted_header();
        // 204800 sectors / 128 grain_size = 1600 grains; / 512 per GT = ceil -> 4
        assert_eq!(header.num_gd_entries(), 4);
    }

    #[test]
    fn test_server_sparse_header_new() {
        let header = ServerSparseExtentHeader::new(100 * sector::ONE_MIB);
        assert_eq!(header.grain_size, 1);
        assert_eq!(header.gd_offset, 4);
        assert_eq!(header.num_gd_entries, 50);
        assert!(header.free_sector > header.gd_offset);
    }

    #[test]
    fn test_server_sparse_header_roundtrip() {
        let header = ServerSparseExtentHeader::new(512 * sector::ONE_MIB);
        let mut bytes = vec![0u8; 2048];
        bytes[..2048].copy_from_slice(&header.to_bytes());
        let parsed = ServerSparseExtentHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
    }
}
