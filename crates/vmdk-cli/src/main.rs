//! vmdk-cli - Inspect, create, and convert VMDK virtual disk images.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use vmdk_core::vmdk::descriptor::{Access, CreateType};
use vmdk_core::vmdk::disk::{DiskImageFile, Ownership};
use vmdk_core::vmdk::optimized::convert_sparse_stream_to_stream_optimized;

/// Inspect, create, and convert VMDK virtual disk images.
#[derive(Parser)]
#[command(name = "vmdk")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new VMDK image.
    Initialize {
        /// Path of the descriptor file to create.
        path: PathBuf,

        /// Virtual disk capacity in bytes.
        size: u64,

        /// Create-type, e.g. monolithicSparse, monolithicFlat, vmfs,
        /// vmfsSparse, twoGbMaxExtentFlat, twoGbMaxExtentSparse.
        create_type: String,
    },

    /// Display descriptor and capacity information about a VMDK image.
    Info {
        /// Path to the VMDK descriptor file.
        path: PathBuf,
    },

    /// Convert a VMDK image's content into a compressed streamOptimized copy.
    ConvertStreamOptimized {
        /// Path to the source VMDK descriptor file.
        path: PathBuf,

        /// Path of the streamOptimized VMDK to write.
        output: PathBuf,

        /// DEFLATE compression level, 0 (none) through 9 (best).
        #[arg(short, long, default_value_t = 6)]
        level: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Initialize {
            path,
            size,
            create_type,
        } => initialize(&path, size, &create_type)?,
        Commands::Info { path } => info(&path)?,
        Commands::ConvertStreamOptimized {
            path,
            output,
            level,
        } => convert_stream_optimized(&path, &output, level)?,
    }

    Ok(())
}

fn initialize(path: &std::path::Path, size: u64, create_type: &str) -> Result<()> {
    let create_type = CreateType::from_str(create_type)
        .with_context(|| format!("unrecognized create-type '{}'", create_type))?;
    let disk = DiskImageFile::initialize(path, size, create_type)
        .with_context(|| format!("failed to initialize '{}'", path.display()))?;
    println!(
        "created {} ({} bytes, {})",
        path.display(),
        disk.capacity(),
        create_type.as_str()
    );
    Ok(())
}

fn info(path: &std::path::Path) -> Result<()> {
    let disk = DiskImageFile::open(path, Access::Read)
        .with_context(|| format!("failed to open '{}'", path.display()))?;
    let descriptor = disk.descriptor();

    println!("path:          {}", path.display());
    println!("create type:   {}", descriptor.create_type.as_str());
    println!("capacity:      {} bytes", disk.capacity());
    println!("sparse:        {}", disk.is_sparse());
    println!("needs parent:  {}", disk.needs_parent());
    if let Some(parent) = disk.parent_location() {
        println!("parent:        {}", parent);
    }
    println!(
        "geometry:      {}/{}/{} (C/H/S)",
        descriptor.geometry.cylinders, descriptor.geometry.heads, descriptor.geometry.sectors
    );
    println!("adapter type:  {}", descriptor.adapter_type);
    println!("hw version:    {}", descriptor.hw_version);
    println!("content id:    {:08x}", descriptor.content_id);
    println!("extents:");
    for extent in &descriptor.extents {
        println!(
            "  {:?} {} sectors {} (offset {})",
            extent.extent_type, extent.size_sectors, extent.filename, extent.offset
        );
    }
    Ok(())
}

fn convert_stream_optimized(
    path: &std::path::Path,
    output: &std::path::Path,
    level: u32,
) -> Result<()> {
    let disk = DiskImageFile::open(path, Access::Read)
        .with_context(|| format!("failed to open '{}'", path.display()))?;
    let mut content = disk
        .open_content(None, Ownership::Dispose)
        .with_context(|| format!("failed to open content of '{}'", path.display()))?;

    let out = BufWriter::new(
        File::create(output).with_context(|| format!("failed to create '{}'", output.display()))?,
    );
    convert_sparse_stream_to_stream_optimized(&mut *content, out, level)
        .context("streamOptimized conversion failed")?;

    println!(
        "wrote streamOptimized image to {} ({} bytes source)",
        output.display(),
        disk.capacity()
    );
    Ok(())
}
