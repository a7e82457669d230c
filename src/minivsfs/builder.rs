use super::{
    error::Result,
    image::Image,
    layout,
    types::{DirEntry, Inode, Superblock},
    DIRENT_SIZE, ROOT_INODE, TYPE_DIR,
};
use log::debug;

/// Builds a fresh image holding only the root directory with `.` and `..`.
///
/// `total_blocks` and `inode_count` are expected to be range checked by
/// the caller; only layout feasibility is checked here.
pub fn build_image(total_blocks: u64, inode_count: u64) -> Result<Image> {
    let layout = layout::compute_layout(total_blocks, inode_count)?;
    debug!("layout: {:?}", layout);

    let mut sb = Superblock::new(&layout);
    sb.finalize()?;
    let now = sb.mtime_epoch;

    let mut image = Image::empty(sb);
    image.inode_bitmap.set(0);
    image.data_bitmap.set(0);

    let root_block = layout.data_region_start as u32;
    let mut root = Inode::new_dir(root_block, 2 * DIRENT_SIZE as u64, now);
    image.put_inode(ROOT_INODE, &mut root)?;

    let mut dot = DirEntry::new(ROOT_INODE, TYPE_DIR, ".")?;
    let mut dotdot = DirEntry::new(ROOT_INODE, TYPE_DIR, "..")?;
    image.put_dir_entry(root_block, 0, &mut dot)?;
    image.put_dir_entry(root_block, 1, &mut dotdot)?;

    debug!("root directory at block {}", root_block);
    Ok(image)
}
