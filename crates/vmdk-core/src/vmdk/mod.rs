//! VMDK disk handling.
//!
//! This module provides functionality for parsing VMDK descriptors and
//! headers, laying out and opening sparse and flat extents, and composing
//! them into a single logical stream over a disk's content, plus the
//! stream-optimized writer used to package that content into a
//! compressed, portable VMDK.

pub mod descriptor;
pub mod disk;
pub mod header;
pub mod initializer;
pub mod layout;
pub mod locator;
pub mod naming;
pub mod opener;
pub mod optimized;
pub mod probe;
pub mod reader;
pub mod sector;
pub mod stream;

pub use descriptor::{parse_descriptor, CreateType, ExtentDescriptor, ExtentType, VmdkDescriptor};
pub use disk::{DiskImageFile, Ownership};
pub use optimized::{convert_sparse_stream_to_stream_optimized, convert_to_stream_optimized};
pub use reader::{ChunkIterator, IndexedChunk, IndexedChunkIterator, VmdkReader};
pub use stream::{ParentHandle, SparseStream};
