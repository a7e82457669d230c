use crate::minivsfs::{image::open_image, TYPE_FILE};
use anyhow::Context;
use std::{
    fs,
    io::{self, Write},
    path::Path,
};

pub fn cat<P>(image_path: P, name: &str) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let path = image_path.as_ref();
    let bytes =
        fs::read(path).with_context(|| format!("Cannot open image {}", path.display()))?;

    let content = read(&bytes, name)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(&content)?;
    Ok(out.flush()?)
}

fn read(bytes: &[u8], name: &str) -> anyhow::Result<Vec<u8>> {
    let image = open_image(bytes)?;
    let entry = image.lookup(name)?;
    if entry.kind != TYPE_FILE {
        bail!("{} is not a regular file", name);
    }

    Ok(image.read_file(entry.inode_no)?)
}
