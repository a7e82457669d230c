use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure is terminal for the operation that raised it. Nothing is
/// retried and no partially mutated image is handed back.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested size and inode count do not leave room for a usable layout.
    #[error("infeasible layout: {0}")]
    Layout(String),

    /// Bad magic, wrong geometry or a checksum mismatch on any record.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("no free inodes available")]
    NoFreeInodes,

    #[error("not enough free data blocks (need {needed})")]
    InsufficientSpace { needed: u64 },

    #[error("file too large (needs {blocks} blocks, max {max})")]
    FileTooLarge { blocks: u64, max: usize },

    /// The root directory only ever owns one block of entries.
    #[error("no free directory entries in root directory")]
    DirectoryFull,

    #[error("invalid file name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("{0:?} already exists in the root directory")]
    NameExists(String),

    #[error("{0:?} not found in the root directory")]
    NotFound(String),

    #[error("record encoding failed: {0}")]
    Codec(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
