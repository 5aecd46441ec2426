//! Sparse stream composition: the adapters that turn one or more on-disk
//! extents into a single logical, randomly-addressable byte stream.
//!
//! A [`SparseStream`] is anything that can be read and seeked as a flat
//! virtual disk. Hosted-sparse and server-sparse extents are backed by a
//! grain table that maps most of that address space to nothing; reads that
//! land on an unallocated grain fall through to an optional parent stream
//! (for differencing disks) or return zeroes.

use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Result as IoResult, Seek, SeekFrom};
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::vmdk::header::{HostedSparseExtentHeader, ServerSparseExtentHeader};
use crate::vmdk::reader::VmdkReader;
use crate::vmdk::sector::{read_u32, SECTOR};

/// A flat, randomly-addressable view of a virtual disk extent.
///
/// Implementors must also implement [`Read`] and [`Seek`] against the
/// extent's own coordinate space: position 0 is the first byte of the
/// extent's logical content, not the first byte of the backing file.
pub trait SparseStream: Read + Seek {
    /// The logical length of this stream in bytes.
    fn len(&self) -> u64;

    /// Whether this stream covers zero bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for dyn SparseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn SparseStream")
            .field("len", &self.len())
            .finish()
    }
}

type Shared = Rc<RefCell<Box<dyn SparseStream>>>;

/// How a stream relates to an optional parent stream backing its
/// unallocated grains.
///
/// This replaces a boolean "owns parent" flag: every sibling extent stream
/// in a multi-extent differencing disk needs read access to the same
/// parent, and none of them individually owns it. `Owned` lets every
/// sibling hold a cheap clone of the same `Rc`; the parent is dropped
/// automatically once the last clone anywhere (including the caller's own,
/// if any) is gone, rather than requiring manual "give ownership to the
/// last extent" bookkeeping.
pub enum ParentHandle {
    /// A parent stream exists and is shared by reference count.
    Owned(Shared),
    /// No parent stream exists; unallocated grains read as zero.
    Borrowed,
}

impl ParentHandle {
    /// Wraps `stream` as a freshly owned parent.
    pub fn new(stream: Box<dyn SparseStream>) -> Self {
        ParentHandle::Owned(Rc::new(RefCell::new(stream)))
    }

    /// No parent stream: reads of unallocated grains return zero.
    pub fn none() -> Self {
        ParentHandle::Borrowed
    }

    /// Produces another handle sharing the same underlying parent, if any.
    pub fn share(&self) -> ParentHandle {
        match self {
            ParentHandle::Owned(rc) => ParentHandle::Owned(Rc::clone(rc)),
            ParentHandle::Borrowed => ParentHandle::Borrowed,
        }
    }

    /// Reads `buf.len()` bytes starting at `offset` from the parent, or
    /// fills `buf` with zeroes if there is no parent.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match self {
            ParentHandle::Owned(rc) => {
                let mut stream = rc.borrow_mut();
                stream.seek(SeekFrom::Start(offset))?;
                read_exact_or_zero(&mut **stream, buf)
            }
            ParentHandle::Borrowed => {
                buf.fill(0);
                Ok(())
            }
        }
    }
}

/// Reads into `buf`, zero-filling any tail past the stream's actual length
/// (a parent disk may be shorter than the child addressing into it).
fn read_exact_or_zero<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    if filled < buf.len() {
        buf[filled..].fill(0);
    }
    Ok(())
}

fn seek_within(pos: &mut u64, len: u64, from: SeekFrom) -> IoResult<u64> {
    let new_pos = match from {
        SeekFrom::Start(offset) => offset as i128,
        SeekFrom::End(offset) => len as i128 + offset as i128,
        SeekFrom::Current(offset) => *pos as i128 + offset as i128,
    };
    if new_pos < 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "seek to a negative position",
        ));
    }
    *pos = new_pos as u64;
    Ok(*pos)
}

fn to_io_error(e: Error) -> std::io::Error {
    match e {
        Error::Io { source, .. } => source,
        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
    }
}

/// A stream that reads as all zeroes for its entire length.
///
/// Used as the substitute content stream for a differencing disk whose
/// parent location could not be resolved, and as the base case at the
/// bottom of every parent chain.
pub struct ZeroExtentStream {
    len: u64,
    pos: u64,
}

impl ZeroExtentStream {
    pub fn new(len: u64) -> Self {
        Self { len, pos: 0 }
    }
}

impl Read for ZeroExtentStream {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        let n = (buf.len() as u64).min(remaining) as usize;
        buf[..n].fill(0);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ZeroExtentStream {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        seek_within(&mut self.pos, self.len, pos)
    }
}

impl SparseStream for ZeroExtentStream {
    fn len(&self) -> u64 {
        self.len
    }
}

/// A stream backed directly by a flat file (or VMFS extent): extent offset
/// 0 is byte `base_offset` of the file.
///
/// Reads are served from a memory map via [`VmdkReader`] rather than
/// `seek`+`read` on the file descriptor, so sequential bulk copies (the
/// common case for flat extents) let the OS page cache do the work instead
/// of round-tripping through user-space buffers.
pub struct FlatExtentStream {
    reader: VmdkReader,
    base_offset: u64,
    len: u64,
    pos: u64,
}

impl FlatExtentStream {
    pub fn new(file: File, base_offset: u64, len: u64) -> Result<Self> {
        Ok(Self {
            reader: VmdkReader::from_file(file)?,
            base_offset,
            len,
            pos: 0,
        })
    }
}

impl Read for FlatExtentStream {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        let to_read = (buf.len() as u64).min(remaining) as usize;
        if to_read == 0 {
            return Ok(0);
        }
        let start = (self.base_offset + self.pos) as usize;
        let data = self.reader.data();
        let end = (start + to_read).min(data.len());
        let n = end.saturating_sub(start);
        buf[..n].copy_from_slice(&data[start..end]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for FlatExtentStream {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        seek_within(&mut self.pos, self.len, pos)
    }
}

impl SparseStream for FlatExtentStream {
    fn len(&self) -> u64 {
        self.len
    }
}

/// A stream backed by a hosted-sparse extent (monolithicSparse,
/// twoGbMaxExtentSparse, or streamOptimized once fully materialized):
/// grains are looked up through a flattened grain table, and reads that
/// land on an unallocated grain fall through to `parent`.
///
/// Generic over the backing store `B` so the same adapter serves both a
/// plain extent `File` and an already-open in-memory stream (see
/// [`crate::vmdk::disk::DiskImageFile::open_stream`]).
pub struct HostedSparseExtentStream<B: Read + Seek> {
    file: B,
    header: HostedSparseExtentHeader,
    grain_table: Vec<u32>,
    parent: ParentHandle,
    extent_start: u64,
    pos: u64,
}

impl<B: Read + Seek> HostedSparseExtentStream<B> {
    /// Opens a hosted-sparse extent, loading its (non-redundant) grain
    /// directory and grain tables into a single flattened `Vec`.
    ///
    /// `extent_start` is this extent's first byte within the logical disk;
    /// unallocated-grain reads are forwarded to `parent` at
    /// `extent_start + pos`, not just `pos`, so a differencing disk's
    /// non-first extent reads the matching region of its parent rather than
    /// the parent's own first bytes.
    pub fn open(
        mut file: B,
        header: HostedSparseExtentHeader,
        parent: ParentHandle,
        extent_start: u64,
    ) -> Result<Self> {
        let num_gd_entries = header.num_gd_entries() as usize;
        let mut gd = vec![0u8; num_gd_entries * 4];
        file.seek(SeekFrom::Start(header.gd_offset * SECTOR))?;
        file.read_exact(&mut gd)?;

        let gt_entries = header.num_gte_per_gt as usize;
        let mut grain_table = Vec::with_capacity(num_gd_entries * gt_entries);

        for i in 0..num_gd_entries {
            let gt_sector = read_u32(&gd, i * 4) as u64;
            let mut gt_bytes = vec![0u8; gt_entries * 4];
            if gt_sector != 0 {
                file.seek(SeekFrom::Start(gt_sector * SECTOR))?;
                file.read_exact(&mut gt_bytes)?;
            }
            for j in 0..gt_entries {
                grain_table.push(read_u32(&gt_bytes, j * 4));
            }
        }

        Ok(Self {
            file,
            header,
            grain_table,
            parent,
            extent_start,
            pos: 0,
        })
    }

    fn grain_size_bytes(&self) -> u64 {
        self.header.grain_size * SECTOR
    }
}

impl<B: Read + Seek> Read for HostedSparseExtentStream<B> {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let total_len = self.len();
        let remaining = total_len.saturating_sub(self.pos);
        let to_read = (buf.len() as u64).min(remaining) as usize;
        if to_read == 0 {
            return Ok(0);
        }

        let grain_bytes = self.grain_size_bytes();
        let grain_index = (self.pos / grain_bytes) as usize;
        let offset_in_grain = self.pos % grain_bytes;
        let chunk = ((grain_bytes - offset_in_grain) as usize).min(to_read);

        let grain_sector = *self
            .grain_table
            .get(grain_index)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "grain index out of range"))?;

        if grain_sector == 0 {
            self.parent
                .read_at(self.extent_start + self.pos, &mut buf[..chunk])
                .map_err(to_io_error)?;
        } else {
            self.file
                .seek(SeekFrom::Start(grain_sector as u64 * SECTOR + offset_in_grain))?;
            read_exact_or_zero(&mut self.file, &mut buf[..chunk]).map_err(to_io_error)?;
        }

        self.pos += chunk as u64;
        Ok(chunk)
    }
}

impl<B: Read + Seek> Seek for HostedSparseExtentStream<B> {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        let len = self.len();
        seek_within(&mut self.pos, len, pos)
    }
}

impl<B: Read + Seek> SparseStream for HostedSparseExtentStream<B> {
    fn len(&self) -> u64 {
        self.header.capacity * SECTOR
    }
}

/// A stream backed by a server-sparse (VMFS) extent: a single-level global
/// directory maps fixed 2MiB regions, each internally addressed in
/// 1-sector grains.
pub struct ServerSparseExtentStream {
    file: File,
    header: ServerSparseExtentHeader,
    global_directory: Vec<u32>,
    parent: ParentHandle,
    extent_start: u64,
    pos: u64,
}

const SERVER_SPARSE_REGION_BYTES: u64 = 2 * 1024 * 1024;

impl ServerSparseExtentStream {
    /// `extent_start` is this extent's first byte within the logical disk;
    /// see [`HostedSparseExtentStream::open`] for why unallocated-region
    /// reads need it when forwarding to `parent`.
    pub fn open(
        mut file: File,
        header: ServerSparseExtentHeader,
        parent: ParentHandle,
        extent_start: u64,
    ) -> Result<Self> {
        let num_entries = header.num_gd_entries as usize;
        let mut gd = vec![0u8; num_entries * 4];
        file.seek(SeekFrom::Start(header.gd_offset * SECTOR))?;
        file.read_exact(&mut gd)?;

        let global_directory = (0..num_entries).map(|i| read_u32(&gd, i * 4)).collect();

        Ok(Self {
            file,
            header,
            global_directory,
            parent,
            extent_start,
            pos: 0,
        })
    }
}

impl Read for ServerSparseExtentStream {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        let total_len = self.len();
        let remaining = total_len.saturating_sub(self.pos);
        let to_read = (buf.len() as u64).min(remaining) as usize;
        if to_read == 0 {
            return Ok(0);
        }

        let region_index = (self.pos / SERVER_SPARSE_REGION_BYTES) as usize;
        let offset_in_region = self.pos % SERVER_SPARSE_REGION_BYTES;
        let chunk = ((SERVER_SPARSE_REGION_BYTES - offset_in_region) as usize).min(to_read);

        let region_sector = *self.global_directory.get(region_index).ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "region index out of range")
        })?;

        if region_sector == 0 {
            self.parent
                .read_at(self.extent_start + self.pos, &mut buf[..chunk])
                .map_err(to_io_error)?;
        } else {
            self.file
                .seek(SeekFrom::Start(region_sector as u64 * SECTOR + offset_in_region))?;
            read_exact_or_zero(&mut self.file, &mut buf[..chunk]).map_err(to_io_error)?;
        }

        self.pos += chunk as u64;
        Ok(chunk)
    }
}

impl Seek for ServerSparseExtentStream {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        let len = self.len();
        seek_within(&mut self.pos, len, pos)
    }
}

impl SparseStream for ServerSparseExtentStream {
    fn len(&self) -> u64 {
        self.header.capacity * SECTOR
    }
}

/// Stitches a sequence of extent streams, end to end, into one logical
/// stream (the composition used for `twoGbMaxExtent*` disks).
pub struct ConcatStream {
    parts: Vec<Box<dyn SparseStream>>,
    offsets: Vec<u64>,
    len: u64,
    pos: u64,
}

impl ConcatStream {
    pub fn new(parts: Vec<Box<dyn SparseStream>>) -> Self {
        let mut offsets = Vec::with_capacity(parts.len());
        let mut running = 0u64;
        for part in &parts {
            offsets.push(running);
            running += part.len();
        }
        Self {
            parts,
            offsets,
            len: running,
            pos: 0,
        }
    }

    fn locate(&self, pos: u64) -> Option<(usize, u64)> {
        for (i, &start) in self.offsets.iter().enumerate() {
            let end = start + self.parts[i].len();
            if pos < end {
                return Some((i, pos - start));
            }
        }
        None
    }
}

impl Read for ConcatStream {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let (index, offset) = match self.locate(self.pos) {
            Some(v) => v,
            None => return Ok(0),
        };
        let part = &mut self.parts[index];
        part.seek(SeekFrom::Start(offset))?;
        let part_remaining = part.len() - offset;
        let to_read = (buf.len() as u64).min(part_remaining) as usize;
        let n = part.read(&mut buf[..to_read])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for ConcatStream {
    fn seek(&mut self, pos: SeekFrom) -> IoResult<u64> {
        seek_within(&mut self.pos, self.len, pos)
    }
}

impl SparseStream for ConcatStream {
    fn len(&self) -> u64 {
        self.len
    }
}
