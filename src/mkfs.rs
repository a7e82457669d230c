use crate::minivsfs::{builder, BLOCK_SIZE, INODES_PER_BLOCK};
use anyhow::Context;
use byte_unit::Byte;
use log::info;
use std::{
    fs::{File, OpenOptions},
    io::BufWriter,
    path::Path,
};

pub const MIN_SIZE_KIB: u32 = 180;
pub const MAX_SIZE_KIB: u32 = 4096;
pub const MIN_INODES: u32 = 128;
pub const MAX_INODES: u32 = 512;

pub fn make<P>(path: P, size_kib: u32, inodes: u32) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let total_blocks = total_blocks(size_kib, inodes)?;

    // nothing touches the destination until the image is fully built
    let image = builder::build_image(total_blocks, inodes as u64)?;
    let size = image.layout().image_size();

    let file = create_file(path)?;
    image
        .write_to(BufWriter::new(file))
        .with_context(|| format!("Error writing image {}", path.display()))?;

    info!("wrote {} blocks to {}", total_blocks, path.display());
    println!(
        "Successfully created image: {} ({})",
        path.display(),
        Byte::from_bytes(size as _).get_appropriate_unit(true)
    );

    Ok(())
}

/// Checks the human-facing bounds and converts KiB to blocks.
fn total_blocks(size_kib: u32, inodes: u32) -> anyhow::Result<u64> {
    if !(MIN_SIZE_KIB..=MAX_SIZE_KIB).contains(&size_kib) {
        bail!(
            "--size-kib must be between {} and {}",
            MIN_SIZE_KIB,
            MAX_SIZE_KIB
        );
    }
    if size_kib % 4 != 0 {
        bail!("--size-kib must be a multiple of 4");
    }
    if !(MIN_INODES..=MAX_INODES).contains(&inodes) {
        bail!("--inodes must be between {} and {}", MIN_INODES, MAX_INODES);
    }

    let total_blocks = size_kib as u64 * 1024 / BLOCK_SIZE as u64;
    let max_inodes = total_blocks * INODES_PER_BLOCK as u64;
    if inodes as u64 > max_inodes {
        bail!("Too many inodes for the given size (max {})", max_inodes);
    }

    Ok(total_blocks)
}

fn create_file<P: AsRef<Path>>(name: P) -> anyhow::Result<File> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(name.as_ref())
        .with_context(|| format!("Cannot create image file {}", name.as_ref().display()))?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minivsfs::image::open_image;

    #[test]
    fn bounds() {
        assert!(total_blocks(176, 128).is_err());
        assert!(total_blocks(4100, 128).is_err());
        assert!(total_blocks(182, 128).is_err());
        assert!(total_blocks(1024, 127).is_err());
        assert!(total_blocks(1024, 513).is_err());
        assert_eq!(total_blocks(180, 128).unwrap(), 45);
        assert_eq!(total_blocks(4096, 512).unwrap(), 1024);
    }

    #[test]
    fn make_image() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fs.img");

        make(&path, 1024, 256)?;

        let bytes = std::fs::read(&path)?;
        assert_eq!(bytes.len(), 1024 * 1024);

        let image = open_image(&bytes)?;
        assert_eq!(image.sb.total_blocks, 256);
        assert_eq!(image.sb.inode_count, 256);
        assert_eq!(image.root_entries()?.len(), 2);
        Ok(())
    }

    #[test]
    fn overwrites_existing_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fs.img");
        std::fs::write(&path, vec![0xEE; 8 * 1024 * 1024])?;

        make(&path, 180, 128)?;
        assert_eq!(std::fs::metadata(&path)?.len(), 180 * 1024);
        Ok(())
    }

    #[test]
    fn invalid_options_leave_no_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("fs.img");

        assert!(make(&path, 100, 128).is_err());
        assert!(!path.exists());
        Ok(())
    }
}
