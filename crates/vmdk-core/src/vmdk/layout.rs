//! Computes on-disk layout (grain size, grain table/directory placement,
//! data start) for a new hosted-sparse extent.

use crate::vmdk::sector::{self, SECTOR};

/// Fixed number of grain tables targeted by the layout planner.
const TARGET_TABLES: u64 = 256;
/// Fixed number of grain table entries per grain table.
const GTE_PER_GT: u64 = 512;

/// A fully computed hosted-sparse extent layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentLayout {
    pub grain_size_sectors: u64,
    pub num_grain_tables: u64,
    pub descriptor_start_sector: u64,
    pub descriptor_length_sectors: u64,
    pub rgd_start_sector: u64,
    pub redundant_gt_start_sector: u64,
    pub gd_start_sector: u64,
    pub gt_start_sector: u64,
    pub data_start_sector: u64,
    pub capacity_sectors: u64,
}

/// Plans the layout of a new hosted-sparse extent covering `size_bytes` of
/// virtual disk, with an optional embedded descriptor of
/// `descriptor_length_bytes` (0 when the descriptor is a separate file).
pub fn plan(size_bytes: u64, descriptor_length_bytes: u64) -> ExtentLayout {
    let grain_size_sectors = (size_bytes / (TARGET_TABLES * GTE_PER_GT * SECTOR)).max(8);
    let grain_bytes = grain_size_sectors * GTE_PER_GT * SECTOR;
    let num_grain_tables = sector::ceil(size_bytes, grain_bytes);

    let descriptor_length_sectors = sector::round_up(descriptor_length_bytes, SECTOR) / SECTOR;
    let descriptor_start_sector = if descriptor_length_sectors == 0 { 0 } else { 1 };

    let rgd_start_sector = descriptor_start_sector.max(1) + descriptor_length_sectors;

    let rgd_length_bytes = num_grain_tables * 4;
    let redundant_gt_start_sector = rgd_start_sector + sector::ceil(rgd_length_bytes, SECTOR);

    let gt_entry_block_bytes = sector::round_up(GTE_PER_GT * 4, SECTOR);
    let redundant_gt_length_bytes = num_grain_tables * gt_entry_block_bytes;
    let gd_start_sector =
        redundant_gt_start_sector + sector::ceil(redundant_gt_length_bytes, SECTOR);

    let gd_length_bytes = num_grain_tables * 4;
    let gt_start_sector = gd_start_sector + sector::ceil(gd_length_bytes, SECTOR);

    let gt_length_bytes = num_grain_tables * gt_entry_block_bytes;
    let data_start_sector = sector::round_up(
        gt_start_sector + sector::ceil(gt_length_bytes, SECTOR),
        grain_size_sectors,
    );

    let capacity_sectors = sector::round_up(size_bytes, grain_size_sectors * SECTOR) / SECTOR;

    ExtentLayout {
        grain_size_sectors,
        num_grain_tables,
        descriptor_start_sector,
        descriptor_length_sectors,
        rgd_start_sector,
        redundant_gt_start_sector,
        gd_start_sector,
        gt_start_sector,
        data_start_sector,
        capacity_sectors,
    }
}
