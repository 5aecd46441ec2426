//! VMDK descriptor parsing, serialization, and the typed records that make
//! up the rest of the `vmdk` module.
//!
//! A descriptor is a textual manifest describing disk geometry, extent
//! layout, and parent linkage. It may live as a standalone `.vmdk` file or be
//! embedded inside a hosted-sparse extent (see [`crate::vmdk::probe`]).

use crate::error::{Error, Result};

/// Sentinel `parent_content_id` meaning "this disk has no parent".
pub const NO_PARENT: u32 = 0xffff_ffff;

/// Access mode of an extent or of an open disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    ReadWrite,
}

impl Access {
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RW" => Ok(Access::ReadWrite),
            "RDONLY" | "NOACCESS" => Ok(Access::Read),
            _ => Err(Error::vmdk(format!("unknown extent access mode: {}", s))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Access::ReadWrite => "RW",
            Access::Read => "RDONLY",
        }
    }
}

/// The type of a VMDK extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentType {
    /// Flat extent - raw disk data in a separate file.
    Flat,
    /// Sparse extent - uses grain tables for allocation.
    Sparse,
    /// Zero extent - represents zeroed data without storage.
    Zero,
    /// VMFS extent - VMware VMFS filesystem.
    Vmfs,
    /// VMFS sparse extent.
    VmfsSparse,
    /// VMFS raw device mapping.
    VmfsRdm,
    /// VMFS raw extent.
    VmfsRaw,
}

impl ExtentType {
    /// Parse an extent type from a string.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "FLAT" => Ok(ExtentType::Flat),
            "SPARSE" => Ok(ExtentType::Sparse),
            "ZERO" => Ok(ExtentType::Zero),
            "VMFS" => Ok(ExtentType::Vmfs),
            "VMFSSPARSE" => Ok(ExtentType::VmfsSparse),
            "VMFSRDM" => Ok(ExtentType::VmfsRdm),
            "VMFSRAW" => Ok(ExtentType::VmfsRaw),
            _ => Err(Error::vmdk(format!("unknown extent type: {}", s))),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ExtentType::Flat => "FLAT",
            ExtentType::Sparse => "SPARSE",
            ExtentType::Zero => "ZERO",
            ExtentType::Vmfs => "VMFS",
            ExtentType::VmfsSparse => "VMFSSPARSE",
            ExtentType::VmfsRdm => "VMFSRDM",
            ExtentType::VmfsRaw => "VMFSRAW",
        }
    }
}

/// The `createType` of a whole VMDK image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateType {
    MonolithicSparse,
    MonolithicFlat,
    TwoGbMaxExtentSparse,
    TwoGbMaxExtentFlat,
    FullDevice,
    PartitionedDevice,
    StreamOptimized,
    Vmfs,
    VmfsSparse,
    VmfsRaw,
    VmfsRawDeviceMap,
    VmfsPassthroughRawDeviceMap,
}

impl CreateType {
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "monolithicSparse" => Ok(CreateType::MonolithicSparse),
            "monolithicFlat" => Ok(CreateType::MonolithicFlat),
            "twoGbMaxExtentSparse" => Ok(CreateType::TwoGbMaxExtentSparse),
            "twoGbMaxExtentFlat" => Ok(CreateType::TwoGbMaxExtentFlat),
            "fullDevice" => Ok(CreateType::FullDevice),
            "partitionedDevice" => Ok(CreateType::PartitionedDevice),
            "streamOptimized" => Ok(CreateType::StreamOptimized),
            "vmfs" => Ok(CreateType::Vmfs),
            "vmfsSparse" => Ok(CreateType::VmfsSparse),
            "vmfsRaw" => Ok(CreateType::VmfsRaw),
            "vmfsRawDeviceMap" => Ok(CreateType::VmfsRawDeviceMap),
            "vmfsPassthroughRawDeviceMap" => Ok(CreateType::VmfsPassthroughRawDeviceMap),
            other => Err(Error::invalid_argument(format!(
                "unknown create type: {}",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CreateType::MonolithicSparse => "monolithicSparse",
            CreateType::MonolithicFlat => "monolithicFlat",
            CreateType::TwoGbMaxExtentSparse => "twoGbMaxExtentSparse",
            CreateType::TwoGbMaxExtentFlat => "twoGbMaxExtentFlat",
            CreateType::FullDevice => "fullDevice",
            CreateType::PartitionedDevice => "partitionedDevice",
            CreateType::StreamOptimized => "streamOptimized",
            CreateType::Vmfs => "vmfs",
            CreateType::VmfsSparse => "vmfsSparse",
            CreateType::VmfsRaw => "vmfsRaw",
            CreateType::VmfsRawDeviceMap => "vmfsRawDeviceMap",
            CreateType::VmfsPassthroughRawDeviceMap => "vmfsPassthroughRawDeviceMap",
        }
    }

    /// Maps a create-type to the extent type used for its data extents.
    pub fn extent_type(self) -> Result<ExtentType> {
        match self {
            CreateType::FullDevice
            | CreateType::MonolithicFlat
            | CreateType::PartitionedDevice
            | CreateType::TwoGbMaxExtentFlat => Ok(ExtentType::Flat),
            CreateType::MonolithicSparse
            | CreateType::StreamOptimized
            | CreateType::TwoGbMaxExtentSparse => Ok(ExtentType::Sparse),
            CreateType::Vmfs => Ok(ExtentType::Vmfs),
            CreateType::VmfsPassthroughRawDeviceMap => Ok(ExtentType::VmfsRdm),
            CreateType::VmfsRaw | CreateType::VmfsRawDeviceMap => Ok(ExtentType::VmfsRaw),
            CreateType::VmfsSparse => Ok(ExtentType::VmfsSparse),
        }
    }

    /// True for the create-types whose logical content is sparse-addressed.
    pub fn is_sparse(self) -> bool {
        matches!(
            self,
            CreateType::MonolithicSparse | CreateType::TwoGbMaxExtentSparse | CreateType::VmfsSparse
        )
    }
}

/// Disk geometry as recorded in `ddb.geometry.*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub cylinders: u64,
    pub heads: u32,
    pub sectors: u32,
}

/// A VMDK extent entry describing a portion of the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtentDescriptor {
    /// Access mode (RW or RDONLY).
    pub access: Access,
    /// Size of this extent in 512-byte sectors.
    pub size_sectors: u64,
    /// Type of the extent.
    pub extent_type: ExtentType,
    /// Filename of the extent file.
    pub filename: String,
    /// Offset within the extent file (in sectors).
    pub offset: u64,
}

/// Parsed VMDK descriptor containing disk metadata.
#[derive(Debug, Clone)]
pub struct VmdkDescriptor {
    /// Descriptor format version.
    pub version: u32,
    /// Content ID for change tracking.
    pub content_id: u32,
    /// Parent content ID for delta disks ([`NO_PARENT`] if none).
    pub parent_content_id: u32,
    /// The type of VMDK (e.g., monolithicFlat, twoGbMaxExtentSparse).
    pub create_type: CreateType,
    /// List of extent entries, in on-disk order.
    pub extents: Vec<ExtentDescriptor>,
    /// Disk geometry.
    pub geometry: Geometry,
    /// Virtual hardware version.
    pub hw_version: String,
    /// Disk adapter type (e.g., "lsilogic", "ide", "buslogic").
    pub adapter_type: String,
    /// Filename hint for the parent disk, when differencing.
    pub parent_file_name_hint: Option<String>,
    /// Disk unique identifier (`ddb.uuid.image`), when present.
    pub unique_id: Option<String>,
}

impl VmdkDescriptor {
    /// Calculate the total disk size in bytes.
    pub fn disk_size_bytes(&self) -> u64 {
        self.disk_size_sectors() * 512
    }

    /// Calculate the total disk size in sectors.
    pub fn disk_size_sectors(&self) -> u64 {
        self.extents.iter().map(|e| e.size_sectors).sum()
    }

    /// True iff `parent_content_id` names a real parent.
    pub fn needs_parent(&self) -> bool {
        self.parent_content_id != NO_PARENT
    }

    /// Serializes the descriptor back to its textual form.
    ///
    /// The output always uses the canonical field order and quoting used by
    /// `initialize`; re-parsing it recovers the same `VmdkDescriptor` modulo
    /// any comments or unknown keys present in a hand-written original.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("# Disk DescriptorFile\n");
        out.push_str("version=1\n");
        out.push_str(&format!("CID={:x}\n", self.content_id));
        out.push_str(&format!("parentCID={:x}\n", self.parent_content_id));
        out.push_str(&format!("createType=\"{}\"\n", self.create_type.as_str()));
        if let Some(hint) = &self.parent_file_name_hint {
            out.push_str(&format!("parentFileNameHint=\"{}\"\n", hint));
        }
        out.push('\n');
        out.push_str("# Extent description\n");
        for extent in &self.extents {
            out.push_str(&format!(
                "{} {} {} \"{}\" {}\n",
                extent.access.as_str(),
                extent.size_sectors,
                extent.extent_type.as_str(),
                extent.filename,
                extent.offset
            ));
        }
        out.push('\n');
        out.push_str("# The Disk Data Base\n");
        out.push_str("#DDB\n");
        out.push_str(&format!("ddb.virtualHWVersion = \"{}\"\n", self.hw_version));
        if let Some(uuid) = &self.unique_id {
            out.push_str(&format!("ddb.uuid.image = \"{}\"\n", uuid));
        }
        out.push_str(&format!(
            "ddb.geometry.cylinders = \"{}\"\n",
            self.geometry.cylinders
        ));
        out.push_str(&format!("ddb.geometry.heads = \"{}\"\n", self.geometry.heads));
        out.push_str(&format!(
            "ddb.geometry.sectors = \"{}\"\n",
            self.geometry.sectors
        ));
        out.push_str(&format!("ddb.adapterType = \"{}\"\n", self.adapter_type));
        out
    }
}

/// Parse a VMDK descriptor from its text content.
///
/// # Arguments
///
/// * `content` - The text content of the VMDK descriptor file.
///
/// # Returns
///
/// A `VmdkDescriptor` containing the parsed metadata.
///
/// # Errors
///
/// Returns an error if the descriptor format is invalid or required fields are missing.
pub fn parse_descriptor(content: &str) -> Result<VmdkDescriptor> {
    let mut version = 1;
    let mut content_id = 0u32;
    let mut parent_content_id = NO_PARENT;
    let mut create_type = None;
    let mut extents = Vec::new();
    let mut cylinders = 0u64;
    let mut heads = 0u32;
    let mut sectors = 0u32;
    let mut hw_version = String::new();
    let mut adapter_type = String::new();
    let mut parent_file_name_hint = None;
    let mut unique_id = None;

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Check for extent line (starts with access mode)
        if line.starts_with("RW ") || line.starts_with("RDONLY ") || line.starts_with("NOACCESS ") {
            let extent = parse_extent_line(line)?;
            extents.push(extent);
            continue;
        }

        // Parse key=value or key = value pairs
        if let Some((key, value)) = parse_key_value(line) {
            match key.as_str() {
                "version" => {
                    version = value
                        .parse()
                        .map_err(|_| Error::vmdk(format!("invalid version: {}", value)))?;
                }
                "CID" => {
                    content_id = u32::from_str_radix(&value, 16)
                        .map_err(|_| Error::vmdk(format!("invalid CID: {}", value)))?;
                }
                "parentCID" => {
                    parent_content_id = u32::from_str_radix(&value, 16)
                        .map_err(|_| Error::vmdk(format!("invalid parentCID: {}", value)))?;
                }
                "createType" => {
                    create_type = Some(CreateType::from_str(&value)?);
                }
                "parentFileNameHint" => {
                    parent_file_name_hint = Some(value);
                }
                "ddb.virtualHWVersion" => {
                    hw_version = value;
                }
                "ddb.uuid.image" => {
                    unique_id = Some(value);
                }
                "ddb.geometry.cylinders" => {
                    cylinders = value
                        .parse()
                        .map_err(|_| Error::vmdk(format!("invalid cylinders: {}", value)))?;
                }
                "ddb.geometry.heads" => {
                    heads = value
                        .parse()
                        .map_err(|_| Error::vmdk(format!("invalid heads: {}", value)))?;
                }
                "ddb.geometry.sectors" => {
                    sectors = value
                        .parse()
                        .map_err(|_| Error::vmdk(format!("invalid sectors: {}", value)))?;
                }
                "ddb.adapterType" => {
                    adapter_type = value;
                }
                _ => {
                    // Ignore unknown keys
                }
            }
        }
    }

    let create_type = create_type.ok_or_else(|| Error::vmdk("missing createType"))?;

    Ok(VmdkDescriptor {
        version,
        content_id,
        parent_content_id,
        create_type,
        extents,
        geometry: Geometry {
            cylinders,
            heads,
            sectors,
        },
        hw_version,
        adapter_type,
        parent_file_name_hint,
        unique_id,
    })
}

/// Parse a key=value or key = value line.
///
/// Returns None if the line doesn't contain an equals sign.
fn parse_key_value(line: &str) -> Option<(String, String)> {
    let eq_pos = line.find('=')?;
    let key = line[..eq_pos].trim().to_string();
    let mut value = line[eq_pos + 1..].trim().to_string();

    // Remove surrounding quotes if present
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        value = value[1..value.len() - 1].to_string();
    }

    Some((key, value))
}

/// Parse an extent line like: "RW 838860800 FLAT "TestVM-flat.vmdk" 0"
fn parse_extent_line(line: &str) -> Result<ExtentDescriptor> {
    // Extent format: ACCESS SIZE TYPE "FILENAME" OFFSET
    // The filename is quoted, so we need to handle that specially

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(Error::vmdk(format!("invalid extent line: {}", line)));
    }

    let access = Access::from_str(parts[0])?;
    let size_sectors: u64 = parts[1]
        .parse()
        .map_err(|_| Error::vmdk(format!("invalid extent size: {}", parts[1])))?;
    let extent_type = ExtentType::from_str(parts[2])?;

    // Find the quoted filename - it could span multiple "parts" if filename has spaces
    let rest_of_line = line
        .split_whitespace()
        .skip(3)
        .collect::<Vec<&str>>()
        .join(" ");

    let (filename, offset_str) = parse_quoted_filename_and_offset(&rest_of_line)?;

    let offset: u64 = if offset_str.is_empty() {
        0
    } else {
        offset_str
            .parse()
            .map_err(|_| Error::vmdk(format!("invalid extent offset: {}", offset_str)))?
    };

    Ok(ExtentDescriptor {
        access,
        size_sectors,
        extent_type,
        filename,
        offset,
    })
}

/// Parse a quoted filename followed by an offset from a string like: "filename.vmdk" 0
fn parse_quoted_filename_and_offset(s: &str) -> Result<(String, String)> {
    let s = s.trim();

    if !s.starts_with('"') {
        return Err(Error::vmdk(format!("expected quoted filename, got: {}", s)));
    }

    // Find the closing quote
    let end_quote = s[1..]
        .find('"')
        .ok_or_else(|| Error::vmdk(format!("unclosed quote in: {}", s)))?
        + 1;

    let filename = s[1..end_quote].to_string();
    let offset_str = s[end_quote + 1..].trim().to_string();

    Ok((filename, offset_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_type_from_str() {
        assert_eq!(ExtentType::from_str("FLAT").unwrap(), ExtentType::Flat);
        assert_eq!(ExtentType::from_str("flat").unwrap(), ExtentType::Flat);
        assert_eq!(ExtentType::from_str("SPARSE").unwrap(), ExtentType::Sparse);
        assert_eq!(ExtentType::from_str("ZERO").unwrap(), ExtentType::Zero);
        assert_eq!(ExtentType::from_str("VMFS").unwrap(), ExtentType::Vmfs);
        assert_eq!(
            ExtentType::from_str("VMFSSPARSE").unwrap(),
            ExtentType::VmfsSparse
        );
        assert_eq!(
            ExtentType::from_str("VMFSRDM").unwrap(),
            ExtentType::VmfsRdm
        );
        assert_eq!(
            ExtentType::from_str("VMFSRAW").unwrap(),
            ExtentType::VmfsRaw
        );
    }

    #[test]
    fn test_extent_type_unknown() {
        assert!(ExtentType::from_str("UNKNOWN").is_err());
    }

    #[test]
    fn test_parse_key_value_no_spaces() {
        let (key, value) = parse_key_value("version=1").unwrap();
        assert_eq!(key, "version");
        assert_eq!(value, "1");
    }

    #[test]
    fn test_parse_key_value_with_spaces() {
        let (key, value) = parse_key_value("ddb.geometry.cylinders = \"52216\"").unwrap();
        assert_eq!(key, "ddb.geometry.cylinders");
        assert_eq!(value, "52216");
    }

    #[test]
    fn test_parse_key_value_quoted() {
        let (key, value) = parse_key_value("createType=\"monolithicFlat\"").unwrap();
        assert_eq!(key, "createType");
        assert_eq!(value, "monolithicFlat");
    }

    #[test]
    fn test_parse_extent_line() {
        let extent = parse_extent_line("RW 838860800 FLAT \"TestVM-flat.vmdk\" 0").unwrap();
        assert_eq!(extent.access, Access::ReadWrite);
        assert_eq!(extent.size_sectors, 838860800);
        assert_eq!(extent.extent_type, ExtentType::Flat);
        assert_eq!(extent.filename, "TestVM-flat.vmdk");
        assert_eq!(extent.offset, 0);
    }

    #[test]
    fn test_parse_extent_line_sparse() {
        let extent = parse_extent_line("RW 12345 SPARSE \"disk.vmdk\" 128").unwrap();
        assert_eq!(extent.access, Access::ReadWrite);
        assert_eq!(extent.size_sectors, 12345);
        assert_eq!(extent.extent_type, ExtentType::Sparse);
        assert_eq!(extent.filename, "disk.vmdk");
        assert_eq!(extent.offset, 128);
    }

    #[test]
    fn test_parse_quoted_filename_and_offset() {
        let (filename, offset) = parse_quoted_filename_and_offset("\"disk.vmdk\" 0").unwrap();
        assert_eq!(filename, "disk.vmdk");
        assert_eq!(offset, "0");
    }

    #[test]
    fn test_parse_quoted_filename_with_spaces() {
        let (filename, offset) =
            parse_quoted_filename_and_offset("\"my disk file.vmdk\" 128").unwrap();
        assert_eq!(filename, "my disk file.vmdk");
        assert_eq!(offset, "128");
    }

    #[test]
    fn test_disk_size_calculations() {
        let descriptor = VmdkDescriptor {
            version: 1,
            content_id: 0,
            parent_content_id: NO_PARENT,
            create_type: CreateType::MonolithicFlat,
            extents: vec![
                ExtentDescriptor {
                    access: Access::ReadWrite,
                    size_sectors: 1000,
                    extent_type: ExtentType::Flat,
                    filename: "a.vmdk".to_string(),
                    offset: 0,
                },
                ExtentDescriptor {
                    access: Access::ReadWrite,
                    size_sectors: 2000,
                    extent_type: ExtentType::Flat,
                    filename: "b.vmdk".to_string(),
                    offset: 0,
                },
            ],
            geometry: Geometry {
                cylinders: 0,
                heads: 0,
                sectors: 0,
            },
            hw_version: String::new(),
            adapter_type: String::new(),
            parent_file_name_hint: None,
            unique_id: None,
        };

        assert_eq!(descriptor.disk_size_sectors(), 3000);
        assert_eq!(descriptor.disk_size_bytes(), 3000 * 512);
        assert!(!descriptor.needs_parent());
    }

    const MONOLITHIC_FLAT_DESCRIPTOR: &str = r#"
# Disk DescriptorFile
version=1
CID=fffffffe
parentCID=ffffffff
createType="monolithicFlat"

# Extent description
RW 838860800 FLAT "TestVM-flat.vmdk" 0

# The Disk Data Base
ddb.virtualHWVersion = "21"
ddb.geometry.cylinders = "52216"
ddb.geometry.heads = "16"
ddb.geometry.sectors = "63"
ddb.adapterType = "lsilogic"
"#;

    #[test]
    fn test_full_descriptor_parse() {
        let descriptor = parse_descriptor(MONOLITHIC_FLAT_DESCRIPTOR).unwrap();
        assert_eq!(descriptor.create_type, CreateType::MonolithicFlat);
        assert_eq!(descriptor.content_id, 0xfffffffe);
        assert_eq!(descriptor.parent_content_id, NO_PARENT);
        assert!(!descriptor.needs_parent());
        assert_eq!(descriptor.extents.len(), 1);
        assert_eq!(descriptor.geometry.cylinders, 52216);
        assert_eq!(descriptor.geometry.heads, 16);
        assert_eq!(descriptor.geometry.sectors, 63);
        assert_eq!(descriptor.adapter_type, "lsilogic");
        assert_eq!(descriptor.hw_version, "21");
        assert_eq!(descriptor.disk_size_sectors(), 838860800);
        assert_eq!(descriptor.disk_size_bytes(), 838860800_u64 * 512);
    }

    #[test]
    fn test_descriptor_roundtrip_through_text() {
        let descriptor = parse_descriptor(MONOLITHIC_FLAT_DESCRIPTOR).unwrap();
        let text = descriptor.to_text();
        let reparsed = parse_descriptor(&text).unwrap();
        assert_eq!(reparsed.create_type, descriptor.create_type);
        assert_eq!(reparsed.content_id, descriptor.content_id);
        assert_eq!(reparsed.extents, descriptor.extents);
        assert_eq!(reparsed.geometry.cylinders, 52216);
        assert_eq!(reparsed.geometry.heads, 16);
        assert_eq!(reparsed.geometry.sectors, 63);
    }

    #[test]
    fn test_needs_parent() {
        let mut descriptor = parse_descriptor(MONOLITHIC_FLAT_DESCRIPTOR).unwrap();
        assert!(!descriptor.needs_parent());
        descriptor.parent_content_id = 0x1234;
        assert!(descriptor.needs_parent());
    }

    #[test]
    fn test_create_type_roundtrip() {
        for ct in [
            CreateType::MonolithicSparse,
            CreateType::MonolithicFlat,
            CreateType::TwoGbMaxExtentSparse,
            CreateType::TwoGbMaxExtentFlat,
            CreateType::FullDevice,
            CreateType::PartitionedDevice,
            CreateType::StreamOptimized,
            CreateType::Vmfs,
            CreateType::VmfsSparse,
            CreateType::VmfsRaw,
            CreateType::VmfsRawDeviceMap,
            CreateType::VmfsPassthroughRawDeviceMap,
        ] {
            assert_eq!(CreateType::from_str(ct.as_str()).unwrap(), ct);
        }
    }

    #[test]
    fn test_create_type_unknown() {
        assert!(CreateType::from_str("bogus").is_err());
    }

    #[test]
    fn test_create_type_extent_type_map() {
        assert_eq!(
            CreateType::MonolithicFlat.extent_type().unwrap(),
            ExtentType::Flat
        );
        assert_eq!(
            CreateType::MonolithicSparse.extent_type().unwrap(),
            ExtentType::Sparse
        );
        assert_eq!(
            CreateType::StreamOptimized.extent_type().unwrap(),
            ExtentType::Sparse
        );
        assert_eq!(CreateType::Vmfs.extent_type().unwrap(), ExtentType::Vmfs);
        assert_eq!(
            CreateType::VmfsPassthroughRawDeviceMap
                .extent_type()
                .unwrap(),
            ExtentType::VmfsRdm
        );
        assert_eq!(
            CreateType::VmfsRawDeviceMap.extent_type().unwrap(),
            ExtentType::VmfsRaw
        );
        assert_eq!(
            CreateType::VmfsSparse.extent_type().unwrap(),
            ExtentType::VmfsSparse
        );
    }

    #[test]
    fn test_create_type_is_sparse() {
        assert!(CreateType::MonolithicSparse.is_sparse());
        assert!(CreateType::TwoGbMaxExtentSparse.is_sparse());
        assert!(CreateType::VmfsSparse.is_sparse());
        assert!(!CreateType::MonolithicFlat.is_sparse());
        assert!(!CreateType::Vmfs.is_sparse());
    }
}
