pub mod adder;
pub mod bitmap;
pub mod builder;
pub mod error;
pub mod image;
pub mod layout;
pub mod types;
pub mod util;

const MINIVSFS_MAGIC: u32 = 0x4D56_5346; // "MVSF"
const VERSION: u32 = 1;
const PROJ_ID: u32 = 7;

pub const BLOCK_SIZE: usize = 4096;
pub const INODE_SIZE: usize = 128;
pub const DIRENT_SIZE: usize = 64;
pub const SUPERBLOCK_SIZE: usize = 116;
pub const ROOT_INODE: u32 = 1;
pub const DIRECT_MAX: usize = 12;
pub const NAME_LEN: usize = 58;
pub const MAX_NAME_LEN: usize = NAME_LEN - 1;

pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;
pub const BITS_PER_BLOCK: usize = BLOCK_SIZE * 8;

pub const MODE_FILE: u16 = 0o100000;
pub const MODE_DIR: u16 = 0o040000;

pub const TYPE_FILE: u8 = 1;
pub const TYPE_DIR: u8 = 2;
