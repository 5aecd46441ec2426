//! Detects whether a file holds a bare textual descriptor or one embedded
//! inside a hosted-sparse extent header, and rewrites the descriptor with a
//! fresh content id on writable open.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use rand::Rng;

use crate::error::{Error, Result};
use crate::vmdk::descriptor::{parse_descriptor, VmdkDescriptor};
use crate::vmdk::header::{HostedSparseExtentHeader, HOSTED_MAGIC};
use crate::vmdk::sector::{read_u32, SECTOR};

/// Where the descriptor text lives within the probed file.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorWindow {
    pub embedded: bool,
    pub start: u64,
    pub len: u64,
}

/// The result of probing a file for its descriptor.
#[derive(Debug, Clone)]
pub struct Probe {
    pub descriptor: VmdkDescriptor,
    pub window: DescriptorWindow,
    pub hosted_header: Option<HostedSparseExtentHeader>,
}

/// Reads the leading bytes of `file` and locates its descriptor.
///
/// A hosted-sparse magic at offset 0 means the descriptor is embedded at
/// `descriptor_offset..descriptor_offset+descriptor_size` (in sectors);
/// otherwise the whole file is treated as a bare textual descriptor.
pub fn probe(file: &mut File) -> Result<Probe> {
    let len = file.metadata()?.len();
    let head_len = (SECTOR as usize).min(len as usize);
    let mut head = vec![0u8; head_len];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut head)?;

    if head_len == SECTOR as usize && read_u32(&head, 0) == HOSTED_MAGIC {
        let header = HostedSparseExtentHeader::parse(&head)?;
        if header.descriptor_offset == 0 {
            return Err(Error::corrupt(
                "hosted sparse extent has no embedded descriptor",
            ));
        }
        let start = header.descriptor_offset * SECTOR;
        let window_len = header.descriptor_size * SECTOR;
        if start.checked_add(window_len).map_or(true, |end| end > len) {
            return Err(Error::corrupt(
                "embedded descriptor window exceeds file length",
            ));
        }

        let mut buf = vec![0u8; window_len as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut buf)?;
        let text = text_from_padded_bytes(&buf);
        let descriptor = parse_descriptor(&text)?;

        Ok(Probe {
            descriptor,
            window: DescriptorWindow {
                embedded: true,
                start,
                len: window_len,
            },
            hosted_header: Some(header),
        })
    } else {
        let mut buf = vec![0u8; len as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        let text = text_from_padded_bytes(&buf);
        let descriptor = parse_descriptor(&text)?;

        Ok(Probe {
            descriptor,
            window: DescriptorWindow {
                embedded: false,
                start: 0,
                len,
            },
            hosted_header: None,
        })
    }
}

fn text_from_padded_bytes(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Rewrites `probe`'s descriptor with a freshly randomized `content_id`.
///
/// Serializes to a buffer first so a formatting failure never reaches the
/// file; for an embedded descriptor the window is zero-padded and rewritten
/// in place, for a bare descriptor the file is rewritten and truncated (or
/// left to grow) to the new length.
pub fn rewrite_with_fresh_content_id(file: &mut File, probe: &Probe) -> Result<VmdkDescriptor> {
    let mut descriptor = probe.descriptor.clone();
    descriptor.content_id = rand::thread_rng().gen::<u32>();

    let text = descriptor.to_text();
    let bytes = text.into_bytes();

    if probe.window.embedded {
        if bytes.len() as u64 > probe.window.len {
            return Err(Error::corrupt(
                "rewritten descriptor does not fit its embedded window",
            ));
        }
        let mut padded = vec![0u8; probe.window.len as usize];
        padded[..bytes.len()].copy_from_slice(&bytes);
        file.seek(SeekFrom::Start(probe.window.start))?;
        file.write_all(&padded)?;
    } else {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        file.set_len(bytes.len() as u64)?;
    }

    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const BARE_DESCRIPTOR: &str = r#"# Disk DescriptorFile
version=1
CID=aaaaaaaa
parentCID=ffffffff
createType="monolithicFlat"

# Extent description
RW 2048 FLAT "disk-flat.vmdk" 0

# The Disk Data Base
#DDB
ddb.virtualHWVersion = "21"
ddb.geometry.cylinders = "2"
ddb.geometry.heads = "16"
ddb.geometry.sectors = "63"
ddb.adapterType = "lsilogic"
"#;

    #[test]
    fn test_probe_bare_descriptor() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(BARE_DESCRIPTOR.as_bytes()).unwrap();
        let probed = probe(&mut file).unwrap();
        assert!(!probed.window.embedded);
        assert_eq!(probed.descriptor.content_id, 0xaaaaaaaa);
    }

    #[test]
    fn test_rewrite_bare_descriptor_changes_content_id() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(BARE_DESCRIPTOR.as_bytes()).unwrap();
        let probed = probe(&mut file).unwrap();
        let rewritten = rewrite_with_fresh_content_id(&mut file, &probed).unwrap();
        assert_ne!(rewritten.content_id, probed.descriptor.content_id);

        let reprobed = probe(&mut file).unwrap();
        assert_eq!(reprobed.descriptor.content_id, rewritten.content_id);
    }

    #[test]
    fn test_probe_embedded_descriptor() {
        let mut header = HostedSparseExtentHeader {
            version: 1,
            flags: 1,
            capacity: 2048,
            grain_size: 8,
            descriptor_offset: 1,
            descriptor_size: 2,
            num_gte_per_gt: 512,
            rgd_offset: 0,
            gd_offset: 0,
            overhead: 10,
        };
        let descriptor_text = BARE_DESCRIPTOR;
        let window_bytes = (header.descriptor_size * SECTOR) as usize;
        assert!(descriptor_text.len() <= window_bytes);
        header.gd_offset = 3;

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&header.to_bytes()).unwrap();
        let mut padded = vec![0u8; window_bytes];
        padded[..descriptor_text.len()].copy_from_slice(descriptor_text.as_bytes());
        file.seek(SeekFrom::Start(header.descriptor_offset * SECTOR))
            .unwrap();
        file.write_all(&padded).unwrap();
        file.set_len((header.descriptor_offset + header.descriptor_size) * SECTOR)
            .unwrap();

        let probed = probe(&mut file).unwrap();
        assert!(probed.window.embedded);
        assert_eq!(probed.descriptor.content_id, 0xaaaaaaaa);
    }

    #[test]
    fn test_rewrite_embedded_descriptor_zero_pads_window() {
        let header = HostedSparseExtentHeader {
            version: 1,
            flags: 1,
            capacity: 2048,
            grain_size: 8,
            descriptor_offset: 1,
            descriptor_size: 2,
            num_gte_per_gt: 512,
            rgd_offset: 0,
            gd_offset: 3,
            overhead: 10,
        };
        let window_bytes = (header.descriptor_size * SECTOR) as usize;

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&header.to_bytes()).unwrap();
        let mut padded = vec![0u8; window_bytes];
        padded[..BARE_DESCRIPTOR.len()].copy_from_slice(BARE_DESCRIPTOR.as_bytes());
        file.seek(SeekFrom::Start(header.descriptor_offset * SECTOR))
            .unwrap();
        file.write_all(&padded).unwrap();
        file.set_len((header.descriptor_offset + header.descriptor_size) * SECTOR)
            .unwrap();

        let probed = probe(&mut file).unwrap();
        rewrite_with_fresh_content_id(&mut file, &probed).unwrap();

        let total_len = file.metadata().unwrap().len();
        assert_eq!(
            total_len,
            (header.descriptor_offset + header.descriptor_size) * SECTOR
        );
    }
}
