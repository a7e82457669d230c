use super::{
    error::{Error, Result},
    image::{open_image, Image},
    types::{validate_name, DirEntry, Inode},
    util, BLOCK_SIZE, DIRECT_MAX, DIRENTS_PER_BLOCK, DIRENT_SIZE, ROOT_INODE, TYPE_FILE,
};
use log::debug;

/// Opens `bytes`, inserts `content` under `name` in the root directory and
/// returns the mutated image with the new inode number.
pub fn add_file(bytes: &[u8], name: &str, content: &[u8]) -> Result<(Image, u32)> {
    let mut image = open_image(bytes)?;
    let ino = image.add_file(name, content)?;
    Ok((image, ino))
}

impl Image {
    /// Inserts one regular file into the root directory.
    ///
    /// All work happens on a scratch copy that replaces `self` only once
    /// every step has succeeded, so `self` is untouched on error.
    pub fn add_file(&mut self, name: &str, content: &[u8]) -> Result<u32> {
        validate_name(name)?;
        if name == "." || name == ".." {
            return Err(Error::InvalidName {
                name: name.to_string(),
                reason: "reserved for directory links",
            });
        }

        let size = content.len() as u64;
        let blocks_needed = util::div_ceil(size, BLOCK_SIZE as u64);
        if blocks_needed > DIRECT_MAX as u64 {
            return Err(Error::FileTooLarge {
                blocks: blocks_needed,
                max: DIRECT_MAX,
            });
        }

        let mut next = self.clone();
        let layout = next.layout();

        let inode_bit = next
            .inode_bitmap
            .find_free(layout.inode_count as usize)
            .ok_or(Error::NoFreeInodes)?;
        let ino = inode_bit as u32 + 1;

        let mut blocks = Vec::with_capacity(blocks_needed as usize);
        for _ in 0..blocks_needed {
            let bit = next
                .data_bitmap
                .find_free(layout.data_region_blocks as usize)
                .ok_or(Error::InsufficientSpace {
                    needed: blocks_needed,
                })?;
            next.data_bitmap.set(bit);
            blocks.push((layout.data_region_start + bit as u64) as u32);
        }
        next.inode_bitmap.set(inode_bit);
        debug!("allocated inode {} and blocks {:?}", ino, blocks);

        let now = util::now();
        let mut inode = Inode::new_file(&blocks, size, now);
        next.put_inode(ino, &mut inode)?;

        let mut root = next.root()?;
        let dir_block = root.direct[0];
        let slot = next.free_dir_slot(dir_block, name)?;
        debug!("using slot {} of directory block {}", slot, dir_block);

        let mut entry = DirEntry::new(ino, TYPE_FILE, name)?;
        next.put_dir_entry(dir_block, slot, &mut entry)?;

        root.links += 1;
        root.size_bytes += DIRENT_SIZE as u64;
        root.mtime = now;
        next.put_inode(ROOT_INODE, &mut root)?;

        next.sb.mtime_epoch = now;
        next.sb.finalize()?;

        for (&block, chunk) in blocks.iter().zip(content.chunks(BLOCK_SIZE)) {
            let dst = next.block_mut(block)?;
            dst.fill(0);
            dst[..chunk.len()].copy_from_slice(chunk);
        }

        *self = next;
        Ok(ino)
    }

    /// First free slot past `.` and `..`. Every occupied slot is verified on
    /// the way and checked for a clashing name.
    fn free_dir_slot(&self, dir_block: u32, name: &str) -> Result<usize> {
        let mut free = None;
        for slot in 2..DIRENTS_PER_BLOCK {
            let entry = self.dir_entry(dir_block, slot)?;
            if entry.is_free() {
                free = free.or(Some(slot));
            } else if entry.name() == name {
                return Err(Error::NameExists(name.to_string()));
            }
        }

        free.ok_or(Error::DirectoryFull)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::minivsfs::{builder::build_image, MODE_FILE};

    fn fresh() -> anyhow::Result<Vec<u8>> {
        Ok(build_image(256, 256)?.to_bytes()?)
    }

    #[test]
    fn greeting() -> anyhow::Result<()> {
        let bytes = fresh()?;
        let content = b"hello, tiny world!\n!";
        assert_eq!(content.len(), 20);

        let (image, ino) = add_file(&bytes, "greeting.txt", content)?;
        assert_eq!(ino, 2);

        let inode = image.inode(ino)?;
        assert_eq!(inode.mode, MODE_FILE);
        assert_eq!(inode.links, 1);
        assert_eq!(inode.size_bytes, 20);
        assert_eq!(inode.direct[0], 12);
        assert!(inode.direct[1..].iter().all(|&b| b == 0));
        assert!(image.data_bitmap.is_set(1));
        assert!(image.inode_bitmap.is_set(1));

        let root = image.root()?;
        assert_eq!(root.links, 3);
        assert_eq!(root.size_bytes, 192);

        let entry = image.lookup("greeting.txt")?;
        assert_eq!(entry.inode_no, 2);
        assert_eq!(entry.kind, TYPE_FILE);
        assert_eq!(image.read_file(ino)?, content.to_vec());

        let block = image.block(12)?;
        assert!(block[20..].iter().all(|&b| b == 0));

        let out = image.to_bytes()?;
        let reopened = open_image(&out)?;
        assert_eq!(reopened, image);
        assert_eq!(reopened.to_bytes()?, out);
        Ok(())
    }

    #[test]
    fn direct_pointer_capacity() -> anyhow::Result<()> {
        let bytes = fresh()?;
        let content = vec![0xA5u8; DIRECT_MAX * BLOCK_SIZE];

        let (image, ino) = add_file(&bytes, "max.bin", &content)?;
        let inode = image.inode(ino)?;
        assert_eq!(inode.blocks().collect::<Vec<u32>>(), (12..24u32).collect::<Vec<u32>>());
        assert_eq!(image.read_file(ino)?, content);

        let too_big = vec![0u8; DIRECT_MAX * BLOCK_SIZE + 1];
        match add_file(&bytes, "big.bin", &too_big) {
            Err(Error::FileTooLarge { blocks, max }) => {
                assert_eq!(blocks, 13);
                assert_eq!(max, 12);
            }
            other => panic!("unexpected {:?}", other.map(|(_, ino)| ino)),
        }
        Ok(())
    }

    #[test]
    fn directory_exhaustion() -> anyhow::Result<()> {
        let mut image = open_image(&fresh()?)?;
        // slots 0 and 1 hold . and .., leaving 62 for files
        for i in 0..62 {
            let ino = image.add_file(&format!("file-{}", i), b"x")?;
            assert_eq!(ino, i + 2);
        }

        assert_eq!(image.root()?.size_bytes, 64 * 64);
        assert_eq!(image.root()?.links, 64);
        assert!(matches!(
            image.add_file("one-too-many", b"x"),
            Err(Error::DirectoryFull)
        ));

        let reopened = open_image(&image.to_bytes()?)?;
        assert_eq!(reopened.root_entries()?.len(), 64);
        Ok(())
    }

    #[test]
    fn no_free_inodes() -> anyhow::Result<()> {
        let mut image = build_image(256, 32)?;
        for i in 0..31 {
            image.add_file(&format!("f{}", i), b"data")?;
        }
        assert!(matches!(
            image.add_file("last", b"data"),
            Err(Error::NoFreeInodes)
        ));
        Ok(())
    }

    #[test]
    fn insufficient_space_leaves_image_untouched() -> anyhow::Result<()> {
        // four data blocks, one already used by the root directory
        let mut image = build_image(8, 32)?;
        assert_eq!(image.free_blocks(), 3);

        let before = image.clone();
        match image.add_file("big", &vec![1u8; 4 * BLOCK_SIZE]) {
            Err(Error::InsufficientSpace { needed }) => assert_eq!(needed, 4),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(image, before);

        image.add_file("fits", &vec![1u8; 3 * BLOCK_SIZE])?;
        assert_eq!(image.free_blocks(), 0);
        assert!(matches!(
            image.add_file("more", b"x"),
            Err(Error::InsufficientSpace { .. })
        ));
        Ok(())
    }

    #[test]
    fn empty_file_uses_no_blocks() -> anyhow::Result<()> {
        let mut image = build_image(256, 256)?;
        let ino = image.add_file("empty", b"")?;

        let inode = image.inode(ino)?;
        assert_eq!(inode.size_bytes, 0);
        assert_eq!(inode.blocks().count(), 0);
        assert_eq!(image.free_blocks(), 244);
        assert!(image.read_file(ino)?.is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_name_rejected() -> anyhow::Result<()> {
        let mut image = build_image(256, 256)?;
        image.add_file("a.txt", b"1")?;

        let before = image.clone();
        assert!(matches!(
            image.add_file("a.txt", b"2"),
            Err(Error::NameExists(_))
        ));
        assert_eq!(image, before);
        Ok(())
    }

    #[test]
    fn dot_names_rejected() -> anyhow::Result<()> {
        let mut image = build_image(256, 256)?;
        let before = image.clone();
        for name in [".", ".."].iter() {
            assert!(matches!(
                image.add_file(name, b"1"),
                Err(Error::InvalidName { .. })
            ));
        }
        assert_eq!(image, before);
        assert_eq!(image.root_entries()?.len(), 2);
        assert_eq!(image.lookup("..")?.inode_no, ROOT_INODE);
        Ok(())
    }

    #[test]
    fn bad_names_rejected() -> anyhow::Result<()> {
        let mut image = build_image(256, 256)?;
        let long = "n".repeat(58);
        for name in ["", "a/b", long.as_str()].iter() {
            assert!(matches!(
                image.add_file(name, b"1"),
                Err(Error::InvalidName { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn first_fit_across_files() -> anyhow::Result<()> {
        let mut image = build_image(256, 256)?;
        let a = image.add_file("a", &vec![1u8; BLOCK_SIZE + 1])?;
        let b = image.add_file("b", b"b")?;

        assert_eq!(image.inode(a)?.blocks().collect::<Vec<u32>>(), vec![12u32, 13]);
        assert_eq!(image.inode(b)?.direct[0], 14);

        let names: Vec<_> = image
            .root_entries()?
            .into_iter()
            .map(|(slot, e)| (slot, e.name()))
            .collect();
        assert_eq!(
            names,
            vec![
                (0, ".".to_string()),
                (1, "..".to_string()),
                (2, "a".to_string()),
                (3, "b".to_string())
            ]
        );
        Ok(())
    }

    #[test]
    fn corrupt_directory_entry_blocks_insert() -> anyhow::Result<()> {
        let mut bytes = fresh()?;
        // first byte of slot 5 in the root directory block
        bytes[11 * BLOCK_SIZE + 5 * DIRENT_SIZE] = 0x07;
        assert!(matches!(
            add_file(&bytes, "x", b"x"),
            Err(Error::InvalidImage(_))
        ));
        Ok(())
    }

    #[test]
    fn superblock_refreshed() -> anyhow::Result<()> {
        let (image, _) = add_file(&fresh()?, "t", b"t")?;
        assert!(crate::minivsfs::types::Superblock::verify_block(
            &image.sb.to_block()?
        ));
        assert_eq!(image.sb.mtime_epoch, image.root()?.mtime);
        Ok(())
    }
}
