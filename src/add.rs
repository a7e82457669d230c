use crate::minivsfs::{adder, MAX_NAME_LEN};
use anyhow::Context;
use log::info;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
};

/// Reads `input`, adds `file` under its base name and writes the result to
/// `output`. The output is opened only after the new image is complete, so
/// any earlier failure leaves it as it was. A failure during the final write
/// can leave it truncated.
pub fn add<P>(input: P, output: P, file: P) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let (input, output, file) = (input.as_ref(), output.as_ref(), file.as_ref());
    let name = file_name(file)?;

    let content =
        fs::read(file).with_context(|| format!("Cannot open file {}", file.display()))?;
    if content.is_empty() {
        bail!("File is empty");
    }

    let bytes = fs::read(input)
        .with_context(|| format!("Cannot open input image {}", input.display()))?;
    let (image, ino) = adder::add_file(&bytes, &name, &content)?;
    info!(
        "{} bytes stored in inode {}, {} blocks left",
        content.len(),
        ino,
        image.free_blocks()
    );

    let out = File::create(output)
        .with_context(|| format!("Cannot create output image {}", output.display()))?;
    image
        .write_to(BufWriter::new(out))
        .with_context(|| format!("Cannot write output image {}", output.display()))?;

    println!(
        "Successfully added file '{}' to {} as {}",
        file.display(),
        output.display(),
        name
    );
    println!("Assigned inode: {}", ino);

    Ok(())
}

/// Base name of the host path, as stored in the directory entry.
fn file_name(path: &Path) -> anyhow::Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid file name {}", path.display()))?;

    if name.len() > MAX_NAME_LEN {
        bail!("Filename too long (max {} characters)", MAX_NAME_LEN);
    }

    Ok(name.to_string())
}
