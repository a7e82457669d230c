use crate::minivsfs::{
    image::{open_image, Image},
    types::DirEntry,
    TYPE_DIR, TYPE_FILE,
};
use anyhow::Context;
use byte_unit::Byte;
use log::warn;
use std::{fs, path::Path};

pub fn list<P>(image_path: P) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let path = image_path.as_ref();
    let bytes =
        fs::read(path).with_context(|| format!("Cannot open image {}", path.display()))?;
    let image = open_image(&bytes)?;

    for line in render(&image)? {
        println!("{}", line);
    }

    Ok(())
}

fn render(image: &Image) -> anyhow::Result<Vec<String>> {
    let sb = &image.sb;
    let mut lines = vec![format!(
        "{}: {} blocks ({} free), {} inodes ({} free)",
        Byte::from_bytes(image.layout().image_size() as _).get_appropriate_unit(true),
        sb.data_region_blocks,
        image.free_blocks(),
        sb.inode_count,
        image.free_inodes()
    )];

    for (slot, entry) in image.root_entries()? {
        lines.push(format!(
            "{:>2} {:>4} {} {:>8} {}",
            slot,
            entry.inode_no,
            kind(&entry),
            size(image, &entry),
            entry.name()
        ));
    }

    Ok(lines)
}

fn kind(entry: &DirEntry) -> char {
    match entry.kind {
        TYPE_FILE => '-',
        TYPE_DIR => 'd',
        _ => '?',
    }
}

fn size(image: &Image, entry: &DirEntry) -> String {
    match image.inode(entry.inode_no) {
        Ok(inode) => inode.size_bytes.to_string(),
        Err(err) => {
            warn!("{}: {}", entry.name(), err);
            "?".to_string()
        }
    }
}
