//! VMDK Core Library
//!
//! This crate implements the VMDK virtual disk image format: descriptor
//! parsing, sparse extent layout, and the stream adapters that expose a
//! disk's logical content as a single seekable, readable byte stream
//! regardless of how many extents or which sparse encoding back it.
//!
//! # Modules
//!
//! - `error` - Error types and Result alias
//! - `vmdk` - VMDK disk handling: descriptors, headers, extent streams,
//!   initialization, and stream-optimized conversion

pub mod error;
pub mod vmdk;

pub use error::{Error, Result};
