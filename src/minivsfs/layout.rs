use super::{
    error::{Error, Result},
    util, BITS_PER_BLOCK, BLOCK_SIZE, INODES_PER_BLOCK,
};

/// Block 0 superblock, block 1 inode bitmap, block 2 data bitmap,
/// then the inode table, then the data region up to the end of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub total_blocks: u64,
    pub inode_count: u64,
    pub inode_bitmap_start: u64,
    pub data_bitmap_start: u64,
    pub inode_table_start: u64,
    pub inode_table_blocks: u64,
    pub data_region_start: u64,
    pub data_region_blocks: u64,
}

impl Layout {
    pub fn image_size(&self) -> u64 {
        self.total_blocks * BLOCK_SIZE as u64
    }

    pub fn in_data_region(&self, block: u64) -> bool {
        block >= self.data_region_start && block < self.data_region_start + self.data_region_blocks
    }
}

pub fn compute_layout(total_blocks: u64, inode_count: u64) -> Result<Layout> {
    if inode_count == 0 || inode_count > BITS_PER_BLOCK as u64 {
        return Err(Error::Layout(format!(
            "inode count {} must be between 1 and {}",
            inode_count, BITS_PER_BLOCK
        )));
    }

    let inode_table_blocks = util::div_ceil(inode_count, INODES_PER_BLOCK as u64);
    let data_region_start = 3 + inode_table_blocks;
    if total_blocks <= data_region_start {
        return Err(Error::Layout(format!(
            "{} blocks leave no room for a data region (metadata needs {})",
            total_blocks, data_region_start
        )));
    }

    let data_region_blocks = total_blocks - data_region_start;
    if data_region_blocks > BITS_PER_BLOCK as u64 {
        return Err(Error::Layout(format!(
            "{} data blocks exceed the {} a single bitmap block can track",
            data_region_blocks, BITS_PER_BLOCK
        )));
    }

    Ok(Layout {
        total_blocks,
        inode_count,
        inode_bitmap_start: 1,
        data_bitmap_start: 2,
        inode_table_start: 3,
        inode_table_blocks,
        data_region_start,
        data_region_blocks,
    })
}
