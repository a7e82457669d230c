use super::{
    bitmap::Bitmap,
    error::{Error, Result},
    layout::{self, Layout},
    types::{DirEntry, Inode, Superblock},
    BITS_PER_BLOCK, BLOCK_SIZE, DIRENTS_PER_BLOCK, DIRENT_SIZE, INODE_SIZE, ROOT_INODE,
};
use log::debug;
use std::io::Write;

/// Whole image held in memory. Every region owns its own buffer and the
/// image is always written back in full, in layout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub sb: Superblock,
    pub inode_bitmap: Bitmap,
    pub data_bitmap: Bitmap,
    pub(super) inode_table: Vec<u8>,
    pub(super) data_region: Vec<u8>,
}

/// Parses and validates an image. Only the superblock is verified eagerly;
/// inodes and directory entries are verified when they are read.
pub fn open_image(bytes: &[u8]) -> Result<Image> {
    let sb = Superblock::from_block(bytes)?;

    let expected = layout::compute_layout(sb.total_blocks, sb.inode_count)
        .map_err(|e| Error::InvalidImage(format!("superblock geometry: {}", e)))?;
    if sb.layout() != expected || sb.inode_bitmap_blocks != 1 || sb.data_bitmap_blocks != 1 {
        return Err(Error::InvalidImage(
            "superblock regions disagree with computed layout".into(),
        ));
    }
    if sb.root_inode != ROOT_INODE as u64 {
        return Err(Error::InvalidImage(format!(
            "root inode is {}, expected {}",
            sb.root_inode, ROOT_INODE
        )));
    }
    if bytes.len() as u64 != expected.image_size() {
        return Err(Error::InvalidImage(format!(
            "image is {} bytes, superblock describes {}",
            bytes.len(),
            expected.image_size()
        )));
    }

    let inode_bitmap = Bitmap::from_block(region(bytes, expected.inode_bitmap_start, 1));
    let data_bitmap = Bitmap::from_block(region(bytes, expected.data_bitmap_start, 1));
    check_bitmap("inode", &inode_bitmap, expected.inode_count)?;
    check_bitmap("data", &data_bitmap, expected.data_region_blocks)?;

    debug!(
        "opened image: {} blocks, {} inodes, data region {}+{}",
        sb.total_blocks, sb.inode_count, sb.data_region_start, sb.data_region_blocks
    );

    Ok(Image {
        inode_bitmap,
        data_bitmap,
        inode_table: region(bytes, expected.inode_table_start, expected.inode_table_blocks)
            .to_vec(),
        data_region: region(bytes, expected.data_region_start, expected.data_region_blocks)
            .to_vec(),
        sb,
    })
}

/// Bit 0 belongs to the root and bits past `limit` are always zero.
fn check_bitmap(which: &str, bitmap: &Bitmap, limit: u64) -> Result<()> {
    if !bitmap.is_set(0) {
        return Err(Error::InvalidImage(format!(
            "{} bitmap does not mark the root as allocated",
            which
        )));
    }
    let limit = limit as usize;
    if bitmap.count_set(BITS_PER_BLOCK) != bitmap.count_set(limit) {
        return Err(Error::InvalidImage(format!(
            "{} bitmap has bits set past {}",
            which, limit
        )));
    }

    Ok(())
}

fn region(bytes: &[u8], start: u64, blocks: u64) -> &[u8] {
    let start = start as usize * BLOCK_SIZE;
    &bytes[start..start + blocks as usize * BLOCK_SIZE]
}

impl Image {
    pub(super) fn empty(sb: Superblock) -> Self {
        let layout = sb.layout();
        Self {
            inode_bitmap: Bitmap::default(),
            data_bitmap: Bitmap::default(),
            inode_table: vec![0u8; layout.inode_table_blocks as usize * BLOCK_SIZE],
            data_region: vec![0u8; layout.data_region_blocks as usize * BLOCK_SIZE],
            sb,
        }
    }

    pub fn layout(&self) -> Layout {
        self.sb.layout()
    }

    fn inode_range(&self, ino: u32) -> Result<std::ops::Range<usize>> {
        if ino == 0 || ino as u64 > self.sb.inode_count {
            return Err(Error::InvalidImage(format!("inode {} out of range", ino)));
        }

        let start = (ino as usize - 1) * INODE_SIZE;
        Ok(start..start + INODE_SIZE)
    }

    pub fn is_inode_allocated(&self, ino: u32) -> bool {
        ino != 0 && self.inode_bitmap.is_set(ino as usize - 1)
    }

    /// Reads and verifies an inode.
    pub fn inode(&self, ino: u32) -> Result<Inode> {
        let range = self.inode_range(ino)?;
        Inode::from_bytes(&self.inode_table[range])
            .map_err(|_| Error::InvalidImage(format!("inode {} checksum mismatch", ino)))
    }

    /// Finalizes the inode checksum and stores it in the table.
    pub fn put_inode(&mut self, ino: u32, inode: &mut Inode) -> Result<()> {
        let range = self.inode_range(ino)?;
        inode.finalize()?;
        self.inode_table[range].copy_from_slice(&inode.encode()?);
        Ok(())
    }

    fn block_range(&self, block: u32) -> Result<std::ops::Range<usize>> {
        let layout = self.layout();
        if !layout.in_data_region(block as u64) {
            return Err(Error::InvalidImage(format!(
                "block {} outside the data region",
                block
            )));
        }

        let start = (block as u64 - layout.data_region_start) as usize * BLOCK_SIZE;
        Ok(start..start + BLOCK_SIZE)
    }

    /// A data-region block addressed by its absolute block number.
    pub fn block(&self, block: u32) -> Result<&[u8]> {
        let range = self.block_range(block)?;
        Ok(&self.data_region[range])
    }

    pub fn block_mut(&mut self, block: u32) -> Result<&mut [u8]> {
        let range = self.block_range(block)?;
        Ok(&mut self.data_region[range])
    }

    pub fn dir_entry(&self, block: u32, slot: usize) -> Result<DirEntry> {
        let raw = &self.block(block)?[slot * DIRENT_SIZE..(slot + 1) * DIRENT_SIZE];
        DirEntry::from_bytes(raw).map_err(|_| {
            Error::InvalidImage(format!(
                "directory entry {} of block {} checksum mismatch",
                slot, block
            ))
        })
    }

    pub fn put_dir_entry(&mut self, block: u32, slot: usize, entry: &mut DirEntry) -> Result<()> {
        entry.finalize()?;
        let raw = entry.encode()?;
        self.block_mut(block)?[slot * DIRENT_SIZE..(slot + 1) * DIRENT_SIZE].copy_from_slice(&raw);
        Ok(())
    }

    /// Verified root inode; it must be a directory whose first block lies
    /// in the data region.
    pub fn root(&self) -> Result<Inode> {
        let root = self.inode(ROOT_INODE)?;
        if !root.is_dir() {
            return Err(Error::InvalidImage(format!(
                "root inode has mode {:#o}, not a directory",
                root.mode
            )));
        }
        if !self.layout().in_data_region(root.direct[0] as u64) {
            return Err(Error::InvalidImage(format!(
                "root directory block {} outside the data region",
                root.direct[0]
            )));
        }

        Ok(root)
    }

    /// Occupied slots of the root directory block, with their slot index.
    pub fn root_entries(&self) -> Result<Vec<(usize, DirEntry)>> {
        let block = self.root()?.direct[0];
        let mut entries = Vec::new();
        for slot in 0..DIRENTS_PER_BLOCK {
            let entry = self.dir_entry(block, slot)?;
            if !entry.is_free() {
                entries.push((slot, entry));
            }
        }

        Ok(entries)
    }

    pub fn lookup(&self, name: &str) -> Result<DirEntry> {
        self.root_entries()?
            .into_iter()
            .map(|(_, entry)| entry)
            .find(|entry| entry.name() == name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// File content, cut at `size_bytes`.
    pub fn read_file(&self, ino: u32) -> Result<Vec<u8>> {
        if !self.is_inode_allocated(ino) {
            return Err(Error::InvalidImage(format!("inode {} is not allocated", ino)));
        }

        let inode = self.inode(ino)?;
        if !inode.is_file() {
            return Err(Error::InvalidImage(format!(
                "inode {} is not a regular file",
                ino
            )));
        }
        if !inode.size_consistent() {
            return Err(Error::InvalidImage(format!(
                "inode {} size {} disagrees with its block pointers",
                ino, inode.size_bytes
            )));
        }

        let mut content = Vec::with_capacity(inode.size_bytes as usize);
        for block in inode.blocks() {
            content.extend_from_slice(self.block(block)?);
        }
        content.truncate(inode.size_bytes as usize);
        Ok(content)
    }

    pub fn free_inodes(&self) -> u64 {
        let count = self.sb.inode_count as usize;
        (count - self.inode_bitmap.count_set(count)) as u64
    }

    pub fn free_blocks(&self) -> u64 {
        let count = self.sb.data_region_blocks as usize;
        (count - self.data_bitmap.count_set(count)) as u64
    }

    /// Writes every region in layout order. A failure part way through
    /// leaves whatever was already written; there is no atomic replace.
    pub fn write_to<W>(&self, mut w: W) -> Result<()>
    where
        W: Write,
    {
        w.write_all(&self.sb.to_block()?)?;
        w.write_all(self.inode_bitmap.as_bytes())?;
        w.write_all(self.data_bitmap.as_bytes())?;
        w.write_all(&self.inode_table)?;
        w.write_all(&self.data_region)?;
        Ok(w.flush()?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.layout().image_size() as usize);
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}
