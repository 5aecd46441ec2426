//! Filename adornment and CHS geometry defaulting.

use crate::error::{Error, Result};
use crate::vmdk::descriptor::Geometry;
use crate::vmdk::sector::{ONE_GIB, SECTOR};

/// Appends `-<adornment>.vmdk` before the `.vmdk` suffix of `name`.
///
/// `name` must end with `.vmdk` (case-insensitive). Returns
/// `Error::InvalidArgument` otherwise.
pub fn adorn(name: &str, adornment: &str) -> Result<String> {
    if name.len() < 5 || !name[name.len() - 5..].eq_ignore_ascii_case(".vmdk") {
        return Err(Error::invalid_argument(format!(
            "filename does not end in .vmdk: {}",
            name
        )));
    }
    let base = &name[..name.len() - 5];
    Ok(format!("{}-{}.vmdk", base, adornment))
}

/// Adornment for the Nth (1-based) flat extent of a multi-extent disk.
pub fn flat_extent_adornment(index: u32) -> String {
    format!("{:06x}", index)
}

/// Adornment for the Nth (1-based) sparse extent of a multi-extent disk.
pub fn sparse_extent_adornment(index: u32) -> String {
    format!("s{:03x}", index)
}

/// Derives a CHS geometry for `capacity_bytes` using the standard VMDK
/// heuristic table.
pub fn default_geometry(capacity_bytes: u64) -> Geometry {
    let (heads, sectors) = if capacity_bytes < ONE_GIB {
        (64, 32)
    } else if capacity_bytes < 2 * ONE_GIB {
        (128, 32)
    } else {
        (255, 63)
    };

    let cylinders = capacity_bytes / (heads as u64 * sectors as u64 * SECTOR);

    Geometry {
        cylinders,
        heads,
        sectors,
    }
}
