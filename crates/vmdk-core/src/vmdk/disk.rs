//! The public, path-oriented entry point: open an existing VMDK or
//! initialize a new one, and obtain a single composed [`SparseStream`] over
//! its logical content.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::error::{Error, Result};
use crate::vmdk::descriptor::{
    parse_descriptor, Access, CreateType, ExtentDescriptor, ExtentType, VmdkDescriptor, NO_PARENT,
};
use crate::vmdk::header::{HostedSparseExtentHeader, HOSTED_MAGIC};
use crate::vmdk::initializer;
use crate::vmdk::locator::{FileLocator, Share};
use crate::vmdk::naming;
use crate::vmdk::opener::{self, open_extent};
use crate::vmdk::probe;
use crate::vmdk::sector::{self, read_u32, SECTOR};
use crate::vmdk::stream::{
    ConcatStream, HostedSparseExtentStream, ParentHandle, SparseStream, ZeroExtentStream,
};

/// A boxable `Read + Seek` source backing an in-memory `open_stream` disk.
trait SeekableRead: Read + Seek {}
impl<T: Read + Seek> SeekableRead for T {}

/// Largest extent the `twoGbMaxExtent*` create-types will generate: just
/// under 2 GiB, matching the source's historical VMFS block-count limit.
const TWO_GB_MAX_EXTENT: u64 = 2 * sector::ONE_GIB - sector::ONE_MIB;

/// Whether a disposed parent handle should actually be dropped, or whether
/// the caller retains ownership and merely lent it for this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Dispose,
    Borrow,
}

/// An opened or newly initialized VMDK image.
pub struct DiskImageFile {
    descriptor: VmdkDescriptor,
    locator: FileLocator,
    writable: bool,
    monolithic_stream: std::cell::RefCell<Option<Box<dyn SeekableRead>>>,
}

impl std::fmt::Debug for DiskImageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageFile")
            .field("descriptor", &self.descriptor)
            .field("locator", &self.locator)
            .field("writable", &self.writable)
            .finish_non_exhaustive()
    }
}

impl DiskImageFile {
    /// Opens the VMDK at `path`, probing it (possibly rewriting its
    /// `content_id` if `access` is `ReadWrite`) and rooting extent
    /// resolution at `path`'s parent directory.
    pub fn open(path: &Path, access: Access) -> Result<Self> {
        let root = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let writable = access == Access::ReadWrite;

        let mut file = open_top_level_file(path, writable)?;
        let probed = probe::probe(&mut file)?;
        let descriptor = if writable {
            probe::rewrite_with_fresh_content_id(&mut file, &probed)?
        } else {
            probed.descriptor.clone()
        };

        Ok(Self {
            descriptor,
            locator: FileLocator::new(root),
            writable,
            monolithic_stream: std::cell::RefCell::new(None),
        })
    }

    /// Probes a single in-memory (or otherwise already-open) stream that is
    /// known to be a complete `MonolithicSparse` image, keeping it as the
    /// content source for [`Self::open_content`] without touching the
    /// filesystem again.
    pub fn open_stream<S: Read + Seek + 'static>(mut stream: S) -> Result<Self> {
        let descriptor = probe_in_memory(&mut stream)?;

        if descriptor.create_type != CreateType::MonolithicSparse
            || descriptor.extents.len() != 1
            || descriptor.extents[0].extent_type != ExtentType::Sparse
            || descriptor.needs_parent()
        {
            return Err(Error::invalid_argument(
                "open_stream requires a single-extent MonolithicSparse image with no parent",
            ));
        }

        Ok(Self {
            descriptor,
            locator: FileLocator::new(PathBuf::from(".")),
            writable: false,
            monolithic_stream: std::cell::RefCell::new(Some(Box::new(stream))),
        })
    }

    /// Creates a brand-new VMDK at `path` with the given capacity and
    /// create-type, writing extent file(s) and the descriptor.
    pub fn initialize(path: &Path, capacity_bytes: u64, create_type: CreateType) -> Result<Self> {
        let root = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let locator = FileLocator::new(root);
        let base_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::invalid_argument("path has no file name"))?;

        let extent_type = create_type.extent_type()?;
        let mut rng = rand::thread_rng();

        let extents = match create_type {
            CreateType::MonolithicSparse => {
                let descriptor_length = 10 * sector::ONE_KIB;
                let filename = base_name.to_string();
                let mut file = opener::create_extent_file(&locator, &filename)?;
                initializer::initialize(&mut file, extent_type, capacity_bytes, descriptor_length)?;
                vec![ExtentDescriptor {
                    access: Access::ReadWrite,
                    size_sectors: sector::ceil(capacity_bytes, SECTOR),
                    extent_type,
                    filename,
                    offset: 0,
                }]
            }
            CreateType::MonolithicFlat | CreateType::Vmfs => {
                let filename = naming::adorn(base_name, "flat")?;
                let mut file = opener::create_extent_file(&locator, &filename)?;
                initializer::initialize(&mut file, extent_type, capacity_bytes, 0)?;
                vec![ExtentDescriptor {
                    access: Access::ReadWrite,
                    size_sectors: sector::ceil(capacity_bytes, SECTOR),
                    extent_type,
                    filename,
                    offset: 0,
                }]
            }
            CreateType::VmfsSparse => {
                let filename = naming::adorn(base_name, "sparse")?;
                let mut file = opener::create_extent_file(&locator, &filename)?;
                initializer::initialize(&mut file, extent_type, capacity_bytes, 0)?;
                vec![ExtentDescriptor {
                    access: Access::ReadWrite,
                    size_sectors: sector::ceil(capacity_bytes, SECTOR),
                    extent_type,
                    filename,
                    offset: 0,
                }]
            }
            CreateType::TwoGbMaxExtentFlat | CreateType::TwoGbMaxExtentSparse => {
                let mut extents = Vec::new();
                let mut remaining = capacity_bytes;
                let mut index = 1u32;
                while remaining > 0 {
                    let this_size = remaining.min(TWO_GB_MAX_EXTENT);
                    let adornment = if create_type == CreateType::TwoGbMaxExtentFlat {
                        naming::flat_extent_adornment(index)
                    } else {
                        naming::sparse_extent_adornment(index)
                    };
                    let filename = naming::adorn(base_name, &adornment)?;
                    let mut file = opener::create_extent_file(&locator, &filename)?;
                    initializer::initialize(&mut file, extent_type, this_size, 0)?;
                    extents.push(ExtentDescriptor {
                        access: Access::ReadWrite,
                        size_sectors: sector::ceil(this_size, SECTOR),
                        extent_type,
                        filename,
                        offset: 0,
                    });
                    remaining -= this_size;
                    index += 1;
                }
                extents
            }
            other => return Err(Error::unsupported_create_type(other.as_str())),
        };

        let total_bytes: u64 = extents.iter().map(|e| e.size_sectors * SECTOR).sum();
        let geometry = naming::default_geometry(total_bytes);

        let descriptor = VmdkDescriptor {
            version: 1,
            content_id: rng.gen::<u32>(),
            parent_content_id: NO_PARENT,
            create_type,
            extents,
            geometry,
            hw_version: "19".to_string(),
            adapter_type: "lsilogic".to_string(),
            parent_file_name_hint: None,
            unique_id: Some(format!("{:08x}", rng.gen::<u32>())),
        };

        write_descriptor(&locator, path, &descriptor, create_type, capacity_bytes)?;

        Ok(Self {
            descriptor,
            locator,
            writable: true,
            monolithic_stream: std::cell::RefCell::new(None),
        })
    }

    /// The disk's logical capacity in bytes (sum of extent sizes).
    pub fn capacity(&self) -> u64 {
        self.descriptor.disk_size_bytes()
    }

    /// True if this disk's create-type addresses its content sparsely.
    pub fn is_sparse(&self) -> bool {
        self.descriptor.create_type.is_sparse()
    }

    /// True if this disk is a differencing disk with a declared parent.
    pub fn needs_parent(&self) -> bool {
        self.descriptor.needs_parent()
    }

    /// The parent VMDK's filename hint, if this disk declares one.
    pub fn parent_location(&self) -> Option<&str> {
        self.descriptor.parent_file_name_hint.as_deref()
    }

    /// The descriptor backing this disk.
    pub fn descriptor(&self) -> &VmdkDescriptor {
        &self.descriptor
    }

    /// Builds a single logical [`SparseStream`] over this disk's content.
    ///
    /// If the disk has no parent, `parent` is discarded (respecting
    /// `ownership`) and substituted with a zero-stream of [`Self::capacity`]
    /// bytes, so unallocated grains in a non-differencing disk always read
    /// as zero.
    pub fn open_content(
        &self,
        parent: Option<Box<dyn SparseStream>>,
        ownership: Ownership,
    ) -> Result<Box<dyn SparseStream>> {
        let parent_handle = if self.descriptor.needs_parent() {
            match parent {
                Some(stream) => ParentHandle::new(stream),
                None => ParentHandle::none(),
            }
        } else {
            let _ = ownership;
            drop(parent);
            ParentHandle::new(Box::new(ZeroExtentStream::new(self.capacity())))
        };

        if let Some(mut monolithic) = self.monolithic_stream.borrow_mut().take() {
            monolithic.seek(SeekFrom::Start(0))?;
            let mut head = [0u8; 512];
            monolithic.read_exact(&mut head)?;
            let header = HostedSparseExtentHeader::parse(&head)?;
            return Ok(Box::new(HostedSparseExtentStream::open(
                monolithic,
                header,
                parent_handle,
                0,
            )?));
        }

        if self.descriptor.extents.len() == 1 {
            let extent = &self.descriptor.extents[0];
            return open_extent(&self.locator, extent, self.writable, parent_handle, 0);
        }

        let mut streams: Vec<Box<dyn SparseStream>> = Vec::with_capacity(self.descriptor.extents.len());
        let mut extent_start = 0u64;
        for extent in &self.descriptor.extents {
            // Every extent shares the same parent by reference count, not
            // just the last one — an unallocated grain in any extent of a
            // differencing disk must fall through to the parent, not just
            // the disk's trailing extent.
            let handle = parent_handle.share();
            streams.push(open_extent(&self.locator, extent, self.writable, handle, extent_start)?);
            extent_start += extent.size_sectors * SECTOR;
        }

        Ok(Box::new(ConcatStream::new(streams)))
    }
}

fn open_top_level_file(path: &Path, writable: bool) -> Result<File> {
    use std::fs::OpenOptions;
    if writable {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::io(e, path))
    } else {
        File::open(path).map_err(|e| Error::io(e, path))
    }
}

fn probe_in_memory<S: Read + Seek>(stream: &mut S) -> Result<VmdkDescriptor> {
    let mut header_buf = [0u8; 512];
    stream.seek(SeekFrom::Start(0))?;
    let n = read_fill(stream, &mut header_buf)?;

    if n == 512 && read_u32(&header_buf, 0) == HOSTED_MAGIC {
        let header = HostedSparseExtentHeader::parse(&header_buf)?;
        if header.descriptor_offset == 0 {
            return Err(Error::corrupt("stream has no embedded descriptor"));
        }
        let start = header.descriptor_offset * SECTOR;
        let len = header.descriptor_size * SECTOR;
        let mut buf = vec![0u8; len as usize];
        stream.seek(SeekFrom::Start(start))?;
        stream.read_exact(&mut buf)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let text = String::from_utf8_lossy(&buf[..end]).into_owned();
        parse_descriptor(&text)
    } else {
        Err(Error::NotAVmdk)
    }
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

fn write_descriptor(
    locator: &FileLocator,
    path: &Path,
    descriptor: &VmdkDescriptor,
    create_type: CreateType,
    _capacity_bytes: u64,
) -> Result<()> {
    if create_type == CreateType::MonolithicSparse {
        let extent = &descriptor.extents[0];
        let mut file = locator.open(&extent.filename, true, Share::Exclusive)?;
        // Descriptor start sector is recomputed from the same layout formula
        // used at initialize time, keyed only by capacity and the reserved
        // descriptor length (10 KiB), so it is reproducible here without
        // threading the ExtentLayout through the descriptor itself.
        let layout = crate::vmdk::layout::plan(extent.size_sectors * SECTOR, 10 * sector::ONE_KIB);
        file.seek(SeekFrom::Start(layout.descriptor_start_sector * SECTOR))?;
        let text = descriptor.to_text();
        let mut bytes = text.into_bytes();
        bytes.resize((layout.descriptor_length_sectors * SECTOR) as usize, 0);
        file.write_all(&bytes)?;
        return Ok(());
    }

    let base_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::invalid_argument("path has no file name"))?;
    let mut file = opener::create_extent_file(&FileLocator::new(
        path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
    ), base_name)?;
    file.write_all(descriptor.to_text().as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_monolithic_sparse_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.vmdk");
        let disk =
            DiskImageFile::initialize(&path, 4 * sector::ONE_MIB, CreateType::MonolithicSparse)
                .unwrap();
        assert!(disk.is_sparse());
        assert!(!disk.needs_parent());
        assert_eq!(disk.capacity(), 4 * sector::ONE_MIB);

        let reopened = DiskImageFile::open(&path, Access::Read).unwrap();
        assert_eq!(reopened.capacity(), 4 * sector::ONE_MIB);
        assert!(reopened.is_sparse());

        let mut content = reopened.open_content(None, Ownership::Dispose).unwrap();
        let mut buf = vec![0u8; 512];
        content.read_exact(&mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_initialize_vmfs_single_extent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.vmdk");
        DiskImageFile::initialize(&path, 2 * sector::ONE_MIB, CreateType::Vmfs).unwrap();
        assert!(dir.path().join("c-flat.vmdk").is_file());

        let reopened = DiskImageFile::open(&path, Access::Read).unwrap();
        assert!(!reopened.is_sparse());
        assert_eq!(reopened.capacity(), 2 * sector::ONE_MIB);
    }

    #[test]
    fn test_initialize_two_gb_max_extent_flat_multi_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.vmdk");
        let capacity = 3 * sector::ONE_GIB;
        DiskImageFile::initialize(&path, capacity, CreateType::TwoGbMaxExtentFlat).unwrap();

        assert!(dir.path().join("b-000001.vmdk").is_file());
        assert!(dir.path().join("b-000002.vmdk").is_file());

        let reopened = DiskImageFile::open(&path, Access::Read).unwrap();
        assert_eq!(reopened.descriptor().extents.len(), 2);
        assert_eq!(reopened.capacity(), capacity);
    }

    #[test]
    fn test_open_read_only_does_not_change_content_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.vmdk");
        let disk =
            DiskImageFile::initialize(&path, 2 * sector::ONE_MIB, CreateType::MonolithicSparse)
                .unwrap();
        let before = disk.descriptor().content_id;

        let reopened = DiskImageFile::open(&path, Access::Read).unwrap();
        assert_eq!(reopened.descriptor().content_id, before);
    }

    #[test]
    fn test_open_writable_rotates_content_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e.vmdk");
        let disk =
            DiskImageFile::initialize(&path, 2 * sector::ONE_MIB, CreateType::MonolithicSparse)
                .unwrap();
        let before = disk.descriptor().content_id;

        let reopened = DiskImageFile::open(&path, Access::ReadWrite).unwrap();
        assert_ne!(reopened.descriptor().content_id, before);
    }

    #[test]
    fn test_unsupported_create_type_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.vmdk");
        let err =
            DiskImageFile::initialize(&path, 1024, CreateType::StreamOptimized).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCreateType { .. }));
    }

    /// A two-extent sparse differencing disk must give every extent access
    /// to the parent (not just the last), and each extent's unallocated
    /// reads must land on the matching disk-relative region of the parent,
    /// not the parent's own first bytes.
    #[test]
    fn test_multi_extent_differencing_disk_falls_through_to_parent_per_extent() {
        use crate::vmdk::descriptor::{ExtentDescriptor, Geometry, VmdkDescriptor};

        let dir = tempfile::tempdir().unwrap();
        let locator = FileLocator::new(dir.path());

        let extent_bytes = 4 * sector::ONE_MIB;
        for name in ["child-s000001.vmdk", "child-s000002.vmdk"] {
            let mut file = opener::create_extent_file(&locator, name).unwrap();
            initializer::initialize(&mut file, ExtentType::Sparse, extent_bytes, 0).unwrap();
        }

        let descriptor = VmdkDescriptor {
            version: 1,
            content_id: 0xaaaa_aaaa,
            parent_content_id: 0xbbbb_bbbb,
            create_type: CreateType::TwoGbMaxExtentSparse,
            extents: vec![
                ExtentDescriptor {
                    access: Access::ReadWrite,
                    size_sectors: extent_bytes / SECTOR,
                    extent_type: ExtentType::Sparse,
                    filename: "child-s000001.vmdk".to_string(),
                    offset: 0,
                },
                ExtentDescriptor {
                    access: Access::ReadWrite,
                    size_sectors: extent_bytes / SECTOR,
                    extent_type: ExtentType::Sparse,
                    filename: "child-s000002.vmdk".to_string(),
                    offset: 0,
                },
            ],
            geometry: Geometry {
                cylinders: 0,
                heads: 0,
                sectors: 0,
            },
            hw_version: "19".to_string(),
            adapter_type: "lsilogic".to_string(),
            parent_file_name_hint: Some("base.vmdk".to_string()),
            unique_id: None,
        };
        assert!(descriptor.needs_parent());

        let child_path = dir.path().join("child.vmdk");
        std::fs::write(&child_path, descriptor.to_text()).unwrap();

        let disk = DiskImageFile::open(&child_path, Access::Read).unwrap();
        assert_eq!(disk.descriptor().extents.len(), 2);

        // Parent has a distinct byte pattern per half, so a read that lands
        // on the wrong half is detectable.
        let total = 2 * extent_bytes;
        let mut parent_bytes = vec![0x11u8; extent_bytes as usize];
        parent_bytes.extend(std::iter::repeat(0x22u8).take(extent_bytes as usize));
        let parent_path = dir.path().join("parent.bin");
        std::fs::write(&parent_path, &parent_bytes).unwrap();
        let parent_file = std::fs::File::open(&parent_path).unwrap();
        let parent_stream: Box<dyn SparseStream> =
            Box::new(crate::vmdk::stream::FlatExtentStream::new(parent_file, 0, total).unwrap());

        let mut content = disk
            .open_content(Some(parent_stream), Ownership::Dispose)
            .unwrap();

        let mut first_half = vec![0u8; 512];
        content.read_exact(&mut first_half).unwrap();
        assert!(first_half.iter().all(|&b| b == 0x11));

        content.seek(SeekFrom::Start(extent_bytes)).unwrap();
        let mut second_half = vec![0u8; 512];
        content.read_exact(&mut second_half).unwrap();
        assert!(second_half.iter().all(|&b| b == 0x22));
    }
}
