//! VMDK file reader with memory-mapped I/O.
//!
//! This module provides efficient reading of VMDK files using memory mapping,
//! with support for chunked iteration suitable for parallel processing.

use crate::error::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// A memory-mapped VMDK file reader.
///
/// This reader uses memory mapping for efficient access to VMDK file contents,
/// allowing the operating system to manage caching and paging automatically.
///
/// # Example
///
/// ```no_run
/// use vmdk_core::vmdk::reader::VmdkReader;
/// use std::path::Path;
///
/// let reader = VmdkReader::open(Path::new("disk.vmdk")).unwrap();
/// println!("File size: {} bytes", reader.size());
///
/// // Iterate over 256KB chunks
/// for chunk_result in reader.chunks(256 * 1024) {
///     let chunk = chunk_result.unwrap();
///     // Process chunk...
/// }
/// ```
pub struct VmdkReader {
    /// The memory-mapped file data.
    mmap: Arc<MappedData>,
    /// The size of the file in bytes.
    size: u64,
}

/// Backing store for [`VmdkReader`].
///
/// `memmap2` rejects zero-length mappings, so an empty file is represented
/// without ever calling into it rather than relying on that call to succeed.
enum MappedData {
    Mapped(Mmap),
    Empty,
}

impl std::ops::Deref for MappedData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            MappedData::Mapped(mmap) => mmap,
            MappedData::Empty => &[],
        }
    }
}

impl VmdkReader {
    /// Opens a VMDK file and creates a memory-mapped reader.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the VMDK file to open.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `VmdkReader` on success, or an error if the
    /// file cannot be opened or memory-mapped.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be opened (permissions, etc.)
    /// - Memory mapping fails
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(e, path))?;
        Self::from_file(file)
    }

    /// Wraps an already-open file, mapping it for chunked reads without
    /// reopening it by path.
    ///
    /// Used to give extent streams opened through a [`crate::vmdk::locator::FileLocator`]
    /// mmap-backed bulk reads without a second `open()` of the same file.
    pub fn from_file(file: File) -> Result<Self> {
        let size = file.metadata().map_err(|e| Error::io_simple(e))?.len();

        if size == 0 {
            return Ok(Self {
                mmap: Arc::new(MappedData::Empty),
                size: 0,
            });
        }

        // Safety: the file outlives the Mmap for as long as this reader
        // does, and mmap-ing a file another writer mutates concurrently is
        // this function's caller's responsibility, same as `open`'s.
        let mmap = unsafe { Mmap::map(&file).map_err(|e| Error::io_simple(e))? };

        Ok(Self {
            mmap: Arc::new(MappedData::Mapped(mmap)),
            size,
        })
    }

    /// Returns the size of the VMDK file in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Returns a reference to the raw memory-mapped data.
    ///
    /// This provides direct access to the file contents for cases where
    /// chunk iteration is not needed.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    /// Creates an iterator that yields chunks of the file data.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - The size of each chunk in bytes. The last chunk
    ///   may be smaller if the file size is not evenly divisible.
    ///
    /// # Returns
    ///
    /// A `ChunkIterator` that yields `Result<Vec<u8>>` for each chunk.
    pub fn chunks(&self, chunk_size: usize) -> ChunkIterator {
        ChunkIterator::new(Arc::clone(&self.mmap), self.size, chunk_size)
    }

    /// Creates an iterator that yields indexed chunks of the file data.
    ///
    /// Similar to `chunks()`, but each item includes the chunk index and
    /// a flag indicating whether it's the last chunk.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - The size of each chunk in bytes.
    ///
    /// # Returns
    ///
    /// An `IndexedChunkIterator` that yields `Result<IndexedChunk>` for each chunk.
    pub fn indexed_chunks(&self, chunk_size: usize) -> IndexedChunkIterator {
        IndexedChunkIterator::new(Arc::clone(&self.mmap), self.size, chunk_size)
    }
}

/// An iterator over chunks of a memory-mapped file.
///
/// Each iteration yields a `Result<Vec<u8>>` containing the chunk data.
/// The last chunk may be smaller than `chunk_size` if the file size is
/// not evenly divisible by the chunk size.
pub struct ChunkIterator {
    mmap: Arc<MappedData>,
    file_size: u64,
    chunk_size: usize,
    current_offset: u64,
}

impl ChunkIterator {
    fn new(mmap: Arc<MappedData>, file_size: u64, chunk_size: usize) -> Self {
        Self {
            mmap,
            file_size,
            chunk_size,
            current_offset: 0,
        }
    }

    /// Returns the total number of chunks that will be yielded.
    ///
    /// This is calculated based on the file size and chunk size, accounting
    /// for a potentially smaller final chunk.
    pub fn count_chunks(&self) -> usize {
        if self.file_size == 0 {
            return 0;
        }
        let full_chunks = self.file_size / self.chunk_size as u64;
        let remainder = self.file_size % self.chunk_size as u64;
        (full_chunks + if remainder > 0 { 1 } else { 0 }) as usize
    }
}

impl Iterator for ChunkIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_offset >= self.file_size {
            return None;
        }

        let remaining = self.file_size - self.current_offset;
        let chunk_len = std::cmp::min(remaining, self.chunk_size as u64) as usize;

        let start = self.current_offset as usize;
        let end = start + chunk_len;

        // Copy the chunk data
        let chunk_data = self.mmap[start..end].to_vec();

        self.current_offset += chunk_len as u64;

        Some(Ok(chunk_data))
    }
}

/// A chunk with its index and metadata.
///
/// This struct is returned by `IndexedChunkIterator` and includes:
/// - The chunk's sequential index (0-based)
/// - The chunk data
/// - A flag indicating if this is the last chunk
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// The zero-based index of this chunk in the sequence.
    pub index: u64,
    /// The chunk data.
    pub data: Vec<u8>,
    /// True if this is the last chunk in the file.
    pub is_last: bool,
}

/// An iterator over indexed chunks of a memory-mapped file.
///
/// Similar to `ChunkIterator`, but each item includes the chunk index
/// and a flag indicating whether it's the last chunk. This is useful
/// for parallel processing scenarios where chunk ordering matters.
pub struct IndexedChunkIterator {
    mmap: Arc<MappedData>,
    file_size: u64,
    chunk_size: usize,
    current_offset: u64,
    current_index: u64,
    total_chunks: u64,
}

impl IndexedChunkIterator {
    fn new(mmap: Arc<MappedData>, file_size: u64, chunk_size: usize) -> Self {
        let total_chunks = if file_size == 0 {
            0
        } else {
            let full_chunks = file_size / chunk_size as u64;
            let remainder = file_size % chunk_size as u64;
            full_chunks + if remainder > 0 { 1 } else { 0 }
        };

        Self {
            mmap,
            file_size,
            chunk_size,
            current_offset: 0,
            current_index: 0,
            total_chunks,
        }
    }

    /// Returns the total number of chunks that will be yielded.
    pub fn count_chunks(&self) -> usize {
        self.total_chunks as usize
    }
}

impl Iterator for IndexedChunkIterator {
    type Item = Result<IndexedChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_offset >= self.file_size {
            return None;
        }

        let remaining = self.file_size - self.current_offset;
        let chunk_len = std::cmp::min(remaining, self.chunk_size as u64) as usize;

        let start = self.current_offset as usize;
        let end = start + chunk_len;

        // Copy the chunk data
        let chunk_data = self.mmap[start..end].to_vec();

        let index = self.current_index;
        let is_last = self.current_index == self.total_chunks - 1;

        self.current_offset += chunk_len as u64;
        self.current_index += 1;

        Some(Ok(IndexedChunk {
            index,
            data: chunk_data,
            is_last,
        }))
    }
}
