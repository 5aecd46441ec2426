//! Opens a single extent file as a [`SparseStream`], dispatching on its
//! declared extent type.

use std::fs::OpenOptions;

use crate::error::{Error, Result};
use crate::vmdk::descriptor::{Access, ExtentDescriptor, ExtentType};
use crate::vmdk::header::{HostedSparseExtentHeader, ServerSparseExtentHeader};
use crate::vmdk::locator::{FileLocator, Share};
use crate::vmdk::sector::SECTOR;
use crate::vmdk::stream::{
    FlatExtentStream, HostedSparseExtentStream, ParentHandle, ServerSparseExtentStream,
    SparseStream, ZeroExtentStream,
};

/// Opens `extent` via `locator`, wrapping it as the appropriate
/// [`SparseStream`] and consuming `parent` according to the extent type's
/// need for differencing support.
///
/// `disk_writable` is the access mode the owning disk was opened with; the
/// file is only opened read-write when both it and the extent's own
/// declared access allow writes. `extent_start` is this extent's first byte
/// within the logical disk, threaded into sparse streams so unallocated-grain
/// reads fall through to the matching region of `parent`, not `parent`'s own
/// start.
pub fn open_extent(
    locator: &FileLocator,
    extent: &ExtentDescriptor,
    disk_writable: bool,
    parent: ParentHandle,
    extent_start: u64,
) -> Result<Box<dyn SparseStream>> {
    let writable = disk_writable && extent.access == Access::ReadWrite;
    let share = if writable { Share::Exclusive } else { Share::Read };

    match extent.extent_type {
        ExtentType::Flat | ExtentType::Vmfs => {
            let file = locator.open(&extent.filename, writable, share)?;
            let len = extent.size_sectors * SECTOR;
            Ok(Box::new(FlatExtentStream::new(file, 0, len)?))
        }
        ExtentType::Zero => Ok(Box::new(ZeroExtentStream::new(extent.size_sectors * SECTOR))),
        ExtentType::Sparse => {
            let mut file = locator.open(&extent.filename, writable, share)?;
            let header = read_hosted_header(&mut file)?;
            Ok(Box::new(HostedSparseExtentStream::open(
                file,
                header,
                parent,
                extent_start,
            )?))
        }
        ExtentType::VmfsSparse => {
            let mut file = locator.open(&extent.filename, writable, share)?;
            let header = read_server_sparse_header(&mut file)?;
            Ok(Box::new(ServerSparseExtentStream::open(
                file,
                header,
                parent,
                extent_start,
            )?))
        }
        other => Err(Error::unsupported_extent_type(format!("{:?}", other))),
    }
}

fn read_hosted_header(file: &mut std::fs::File) -> Result<HostedSparseExtentHeader> {
    use std::io::{Read, Seek, SeekFrom};
    let mut buf = [0u8; 512];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut buf)?;
    HostedSparseExtentHeader::parse(&buf)
}

fn read_server_sparse_header(file: &mut std::fs::File) -> Result<ServerSparseExtentHeader> {
    use std::io::{Read, Seek, SeekFrom};
    let mut buf = [0u8; 2048];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut buf)?;
    ServerSparseExtentHeader::parse(&buf)
}

/// Creates a file for a brand-new extent, matching the share/permission
/// conventions `open_extent` uses for existing ones.
pub fn create_extent_file(locator: &FileLocator, filename: &str) -> Result<std::fs::File> {
    let path = locator.path_for(filename);
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .map_err(|e| Error::io(e, path))
}
