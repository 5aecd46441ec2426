//! Lays out a freshly created extent file on disk: sets its length for flat
//! extents, or writes header/grain-directory/grain-table structure for
//! sparse ones.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::vmdk::descriptor::ExtentType;
use crate::vmdk::header::{
    HostedSparseExtentHeader, ServerSparseExtentHeader, FLAG_REDUNDANT_GRAIN_TABLE,
    FLAG_VALID_NEWLINE,
};
use crate::vmdk::layout::{self, ExtentLayout};
use crate::vmdk::sector::{self, write_u32, SECTOR};

/// Where the descriptor should be written after initialization, or `None`
/// when the extent carries no embedded descriptor (flat/VMFS extents, whose
/// descriptor is always a separate bare file).
#[derive(Debug, Clone, Copy)]
pub struct InitializedExtent {
    pub descriptor_start_sector: u64,
    pub layout: Option<ExtentLayout>,
}

/// Initializes `file` as an extent of `extent_type` covering `size_bytes`,
/// reserving `descriptor_length_bytes` for an embedded descriptor (0 if the
/// descriptor will live in a separate file).
pub fn initialize(
    file: &mut File,
    extent_type: ExtentType,
    size_bytes: u64,
    descriptor_length_bytes: u64,
) -> Result<InitializedExtent> {
    match extent_type {
        ExtentType::Flat | ExtentType::Vmfs => {
            file.set_len(size_bytes)?;
            Ok(InitializedExtent {
                descriptor_start_sector: 0,
                layout: None,
            })
        }
        ExtentType::Sparse => initialize_hosted_sparse(file, size_bytes, descriptor_length_bytes),
        ExtentType::VmfsSparse => initialize_server_sparse(file, size_bytes),
        other => Err(Error::unsupported_extent_type(format!("{:?}", other))),
    }
}

fn initialize_hosted_sparse(
    file: &mut File,
    size_bytes: u64,
    descriptor_length_bytes: u64,
) -> Result<InitializedExtent> {
    let plan = layout::plan(size_bytes, descriptor_length_bytes);

    let header = HostedSparseExtentHeader {
        version: 1,
        flags: FLAG_VALID_NEWLINE | FLAG_REDUNDANT_GRAIN_TABLE,
        capacity: plan.capacity_sectors,
        grain_size: plan.grain_size_sectors,
        descriptor_offset: plan.descriptor_start_sector,
        descriptor_size: plan.descriptor_length_sectors,
        num_gte_per_gt: 512,
        rgd_offset: plan.rgd_start_sector,
        gd_offset: plan.gd_start_sector,
        overhead: plan.data_start_sector,
    };

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header.to_bytes())?;

    if plan.descriptor_length_sectors > 0 {
        file.seek(SeekFrom::Start(plan.descriptor_start_sector * SECTOR))?;
        file.write_all(&vec![0u8; (plan.descriptor_length_sectors * SECTOR) as usize])?;
    }

    let gt_entry_block_bytes = sector::round_up(header.num_gte_per_gt as u64 * 4, SECTOR);
    let gt_stride_sectors = gt_entry_block_bytes / SECTOR;

    write_directory(
        file,
        plan.rgd_start_sector,
        plan.redundant_gt_start_sector,
        plan.num_grain_tables,
        gt_stride_sectors,
    )?;
    write_directory(
        file,
        plan.gd_start_sector,
        plan.gt_start_sector,
        plan.num_grain_tables,
        gt_stride_sectors,
    )?;

    let zero_gt = vec![0u8; gt_entry_block_bytes as usize];
    for slot in 0..plan.num_grain_tables {
        file.seek(SeekFrom::Start(
            (plan.redundant_gt_start_sector + slot * gt_stride_sectors) * SECTOR,
        ))?;
        file.write_all(&zero_gt)?;
        file.seek(SeekFrom::Start(
            (plan.gt_start_sector + slot * gt_stride_sectors) * SECTOR,
        ))?;
        file.write_all(&zero_gt)?;
    }

    file.set_len(plan.data_start_sector * SECTOR)?;

    Ok(InitializedExtent {
        descriptor_start_sector: plan.descriptor_start_sector,
        layout: Some(plan),
    })
}

/// Writes a grain directory at `dir_start_sector`: `num_grain_tables` 32-bit
/// LE sector offsets of successive grain tables starting at
/// `gt_region_start_sector`, stride `gt_stride_sectors`.
fn write_directory(
    file: &mut File,
    dir_start_sector: u64,
    gt_region_start_sector: u64,
    num_grain_tables: u64,
    gt_stride_sectors: u64,
) -> Result<()> {
    let mut buf = vec![0u8; sector::round_up(num_grain_tables * 4, SECTOR) as usize];
    for i in 0..num_grain_tables {
        let gt_sector = gt_region_start_sector + i * gt_stride_sectors;
        write_u32(&mut buf, (i * 4) as usize, gt_sector as u32);
    }
    file.seek(SeekFrom::Start(dir_start_sector * SECTOR))?;
    file.write_all(&buf)?;
    Ok(())
}

fn initialize_server_sparse(file: &mut File, size_bytes: u64) -> Result<InitializedExtent> {
    let header = ServerSparseExtentHeader::new(size_bytes);
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header.to_bytes())?;

    let gd_bytes = sector::round_up(header.num_gd_entries * 4, SECTOR);
    file.seek(SeekFrom::Start(header.gd_offset * SECTOR))?;
    file.write_all(&vec![0u8; gd_bytes as usize])?;
    file.set_len(header.free_sector * SECTOR)?;

    Ok(InitializedExtent {
        descriptor_start_sector: 0,
        layout: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vmdk::header::HOSTED_MAGIC;
    use std::io::Read;

    #[test]
    fn test_initialize_flat_sets_length() {
        let mut file = tempfile::tempfile().unwrap();
        let result = initialize(&mut file, ExtentType::Flat, 10 * sector::ONE_MIB, 0).unwrap();
        assert_eq!(result.descriptor_start_sector, 0);
        assert_eq!(file.metadata().unwrap().len(), 10 * sector::ONE_MIB);
    }

    #[test]
    fn test_initialize_sparse_writes_magic_and_length() {
        let mut file = tempfile::tempfile().unwrap();
        let result =
            initialize(&mut file, ExtentType::Sparse, 64 * sector::ONE_MIB, 10 * sector::ONE_KIB)
                .unwrap();
        let plan = result.layout.unwrap();

        let mut magic = [0u8; 4];
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_exact(&mut magic).unwrap();
        assert_eq!(u32::from_le_bytes(magic), HOSTED_MAGIC);

        assert_eq!(file.metadata().unwrap().len(), plan.data_start_sector * SECTOR);
        assert_eq!(result.descriptor_start_sector, plan.descriptor_start_sector);
    }

    #[test]
    fn test_initialize_sparse_grain_tables_are_zeroed() {
        let mut file = tempfile::tempfile().unwrap();
        let result =
            initialize(&mut file, ExtentType::Sparse, 64 * sector::ONE_MIB, 0).unwrap();
        let plan = result.layout.unwrap();

        let mut buf = vec![0u8; SECTOR as usize];
        file.seek(SeekFrom::Start(plan.gt_start_sector * SECTOR))
            .unwrap();
        file.read_exact(&mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_initialize_vmfs_sparse_writes_header() {
        let mut file = tempfile::tempfile().unwrap();
        initialize(&mut file, ExtentType::VmfsSparse, 100 * sector::ONE_MIB, 0).unwrap();
        let mut buf = vec![0u8; 2048];
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_exact(&mut buf).unwrap();
        let header = ServerSparseExtentHeader::parse(&buf).unwrap();
        assert_eq!(header.grain_size, 1);
    }

    #[test]
    fn test_initialize_unsupported_extent_type() {
        let mut file = tempfile::tempfile().unwrap();
        let err = initialize(&mut file, ExtentType::Zero, 1024, 0).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExtentType { .. }));
    }
}
