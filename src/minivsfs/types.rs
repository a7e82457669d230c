use super::{
    error::{Error, Result},
    layout::Layout,
    util, BLOCK_SIZE, DIRECT_MAX, DIRENT_SIZE, INODE_SIZE, MAX_NAME_LEN, MINIVSFS_MAGIC,
    MODE_DIR, MODE_FILE, NAME_LEN, PROJ_ID, ROOT_INODE, SUPERBLOCK_SIZE, VERSION,
};
use serde::{Deserialize, Serialize};

const SB_CHECKSUM_OFFSET: usize = SUPERBLOCK_SIZE - 4;
const INODE_CHECKSUM_OFFSET: usize = INODE_SIZE - 8;
const DIRENT_CHECKSUM_OFFSET: usize = DIRENT_SIZE - 1;

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub total_blocks: u64,
    pub inode_count: u64,
    pub inode_bitmap_start: u64,
    pub inode_bitmap_blocks: u64,
    pub data_bitmap_start: u64,
    pub data_bitmap_blocks: u64,
    pub inode_table_start: u64,
    pub inode_table_blocks: u64,
    pub data_region_start: u64,
    pub data_region_blocks: u64,
    pub root_inode: u64,
    pub mtime_epoch: u64,
    pub flags: u32,
    // crc32 over the first BLOCK_SIZE - 4 bytes of block 0, this field zeroed
    pub checksum: u32,
}

impl Superblock {
    pub fn new(layout: &Layout) -> Self {
        Self {
            magic: MINIVSFS_MAGIC,
            version: VERSION,
            block_size: BLOCK_SIZE as u32,
            total_blocks: layout.total_blocks,
            inode_count: layout.inode_count,
            inode_bitmap_start: layout.inode_bitmap_start,
            inode_bitmap_blocks: 1,
            data_bitmap_start: layout.data_bitmap_start,
            data_bitmap_blocks: 1,
            inode_table_start: layout.inode_table_start,
            inode_table_blocks: layout.inode_table_blocks,
            data_region_start: layout.data_region_start,
            data_region_blocks: layout.data_region_blocks,
            root_inode: ROOT_INODE as u64,
            mtime_epoch: util::now(),
            flags: 0,
            checksum: 0,
        }
    }

    /// Region boundaries as recorded on disk.
    pub fn layout(&self) -> Layout {
        Layout {
            total_blocks: self.total_blocks,
            inode_count: self.inode_count,
            inode_bitmap_start: self.inode_bitmap_start,
            data_bitmap_start: self.data_bitmap_start,
            inode_table_start: self.inode_table_start,
            inode_table_blocks: self.inode_table_blocks,
            data_region_start: self.data_region_start,
            data_region_blocks: self.data_region_blocks,
        }
    }

    /// Serializes into a full zero-padded block, checksum field as stored.
    pub fn to_block(&self) -> Result<Vec<u8>> {
        let mut block = vec![0u8; BLOCK_SIZE];
        bincode::serialize_into(&mut block[..SUPERBLOCK_SIZE], self)?;
        Ok(block)
    }

    /// Must be called again after any field changes, timestamps included.
    pub fn finalize(&mut self) -> Result<()> {
        self.checksum = 0;
        let block = self.to_block()?;
        self.checksum = util::crc32(&block[..BLOCK_SIZE - 4]);
        Ok(())
    }

    pub fn verify_block(block: &[u8]) -> bool {
        if block.len() < BLOCK_SIZE {
            return false;
        }

        let mut stored = [0u8; 4];
        stored.copy_from_slice(&block[SB_CHECKSUM_OFFSET..SUPERBLOCK_SIZE]);

        let mut scratch = block[..BLOCK_SIZE - 4].to_vec();
        scratch[SB_CHECKSUM_OFFSET..SUPERBLOCK_SIZE].fill(0);
        u32::from_le_bytes(stored) == util::crc32(&scratch)
    }

    /// Parses block 0. Magic and block size are checked before anything
    /// else in the record is trusted.
    pub fn from_block(block: &[u8]) -> Result<Self> {
        if block.len() < BLOCK_SIZE {
            return Err(Error::InvalidImage(format!(
                "image is {} bytes, shorter than one block",
                block.len()
            )));
        }

        let sb: Self = bincode::deserialize(&block[..SUPERBLOCK_SIZE])?;
        if sb.magic != MINIVSFS_MAGIC {
            return Err(Error::InvalidImage(format!(
                "bad magic number {:#010x}",
                sb.magic
            )));
        }
        if sb.block_size as usize != BLOCK_SIZE {
            return Err(Error::InvalidImage(format!(
                "unsupported block size {}",
                sb.block_size
            )));
        }
        if !Self::verify_block(block) {
            return Err(Error::InvalidImage(
                "superblock checksum verification failed".into(),
            ));
        }

        Ok(sb)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Inode {
    pub mode: u16,
    pub links: u16,
    pub uid: u32,
    pub gid: u32,
    pub size_bytes: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub direct: [u32; DIRECT_MAX],
    pub reserved_0: u32,
    pub reserved_1: u32,
    pub reserved_2: u32,
    pub proj_id: u32,
    pub uid16_gid16: u32,
    pub xattr_ptr: u64,
    // low half: crc32 of bytes [0, 120), high half always zero
    pub checksum: u64,
}

impl Inode {
    fn with_mode(mode: u16, links: u16, size_bytes: u64, now: u64) -> Self {
        Self {
            mode,
            links,
            size_bytes,
            atime: now,
            mtime: now,
            ctime: now,
            proj_id: PROJ_ID,
            ..Self::default()
        }
    }

    pub fn new_dir(first_block: u32, size_bytes: u64, now: u64) -> Self {
        let mut inode = Self::with_mode(MODE_DIR, 2, size_bytes, now);
        inode.direct[0] = first_block;
        inode
    }

    pub fn new_file(blocks: &[u32], size_bytes: u64, now: u64) -> Self {
        let mut inode = Self::with_mode(MODE_FILE, 1, size_bytes, now);
        inode.direct[..blocks.len()].copy_from_slice(blocks);
        inode
    }

    pub fn is_dir(&self) -> bool {
        self.mode == MODE_DIR
    }

    pub fn is_file(&self) -> bool {
        self.mode == MODE_FILE
    }

    /// Block numbers of the used direct slots, in file order.
    pub fn blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.direct.iter().copied().filter(|&b| b != 0)
    }

    /// Used slots must be a prefix of `direct` and cover `size_bytes`
    /// exactly, last block possibly partial.
    pub fn size_consistent(&self) -> bool {
        let used = self.direct.iter().take_while(|&&b| b != 0).count();
        self.direct[used..].iter().all(|&b| b == 0)
            && used as u64 == util::div_ceil(self.size_bytes, BLOCK_SIZE as u64)
    }

    pub fn encode(&self) -> Result<[u8; INODE_SIZE]> {
        let mut raw = [0u8; INODE_SIZE];
        bincode::serialize_into(&mut raw[..], self)?;
        Ok(raw)
    }

    pub fn finalize(&mut self) -> Result<()> {
        self.checksum = 0;
        let raw = self.encode()?;
        self.checksum = util::crc32(&raw[..INODE_CHECKSUM_OFFSET]) as u64;
        Ok(())
    }

    pub fn verify(raw: &[u8]) -> bool {
        if raw.len() < INODE_SIZE {
            return false;
        }

        let mut stored = [0u8; 8];
        stored.copy_from_slice(&raw[INODE_CHECKSUM_OFFSET..INODE_SIZE]);
        u64::from_le_bytes(stored) == util::crc32(&raw[..INODE_CHECKSUM_OFFSET]) as u64
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if !Self::verify(raw) {
            return Err(Error::InvalidImage(
                "inode checksum verification failed".into(),
            ));
        }

        Ok(bincode::deserialize(&raw[..INODE_SIZE])?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode_no: u32,
    pub kind: u8,
    #[serde(with = "util::name_field")]
    pub name: [u8; NAME_LEN],
    // xor of bytes [0, 63)
    pub checksum: u8,
}

impl DirEntry {
    pub fn new(inode_no: u32, kind: u8, name: &str) -> Result<Self> {
        validate_name(name)?;

        let mut field = [0u8; NAME_LEN];
        field[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self {
            inode_no,
            kind,
            name: field,
            checksum: 0,
        })
    }

    pub fn is_free(&self) -> bool {
        self.inode_no == 0
    }

    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn encode(&self) -> Result<[u8; DIRENT_SIZE]> {
        let mut raw = [0u8; DIRENT_SIZE];
        bincode::serialize_into(&mut raw[..], self)?;
        Ok(raw)
    }

    pub fn finalize(&mut self) -> Result<()> {
        let raw = self.encode()?;
        self.checksum = util::xor8(&raw[..DIRENT_CHECKSUM_OFFSET]);
        Ok(())
    }

    pub fn verify(raw: &[u8]) -> bool {
        raw.len() >= DIRENT_SIZE
            && raw[DIRENT_CHECKSUM_OFFSET] == util::xor8(&raw[..DIRENT_CHECKSUM_OFFSET])
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if !Self::verify(raw) {
            return Err(Error::InvalidImage(
                "directory entry checksum verification failed".into(),
            ));
        }

        Ok(bincode::deserialize(&raw[..DIRENT_SIZE])?)
    }
}

/// Names are stored in a 58-byte NUL-terminated field.
pub fn validate_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.len() > MAX_NAME_LEN {
        "name longer than 57 bytes"
    } else if name.contains('/') || name.contains('\0') {
        "name contains '/' or NUL"
    } else {
        return Ok(());
    };

    Err(Error::InvalidName {
        name: name.to_string(),
        reason,
    })
}
