#[macro_use]
extern crate anyhow;
extern crate bincode;
extern crate bitvec;
extern crate byte_unit;
extern crate clap;
extern crate crc32fast;
extern crate serde;

mod add;
mod cat;
mod ls;
mod minivsfs;
mod mkfs;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let matches = Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log every step of the operation"),
        )
        .subcommand(
            Command::new("mkfs")
                .about("Create a new file system image holding an empty root directory")
                .arg(path_arg("image", "Location of the new file system image"))
                .arg(
                    Arg::new("size-kib")
                        .long("size-kib")
                        .takes_value(true)
                        .required(true)
                        .value_parser(value_parser!(u32))
                        .help("Total image size in KiB, a multiple of 4 between 180 and 4096"),
                )
                .arg(
                    Arg::new("inodes")
                        .long("inodes")
                        .takes_value(true)
                        .required(true)
                        .value_parser(value_parser!(u32))
                        .help("Number of inodes, between 128 and 512"),
                ),
        )
        .subcommand(
            Command::new("add")
                .about("Add a file to the root directory of an image")
                .arg(path_arg("input", "Image to read"))
                .arg(path_arg(
                    "output",
                    "Where to write the updated image, may be the same as --input",
                ))
                .arg(path_arg("file", "Host file to copy into the image")),
        )
        .subcommand(
            Command::new("ls")
                .about("List the root directory of an image")
                .arg(path_arg("image", "Image to inspect")),
        )
        .subcommand(
            Command::new("cat")
                .about("Write the content of a file stored in an image to stdout")
                .arg(path_arg("image", "Image to read"))
                .arg(
                    Arg::new("name")
                        .long("name")
                        .takes_value(true)
                        .required(true)
                        .value_parser(value_parser!(String))
                        .help("Name of the file in the root directory"),
                ),
        )
        .get_matches();

    env_logger::Builder::new()
        .filter_level(if *matches.get_one::<bool>("verbose").unwrap_or(&false) {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .format_timestamp(None)
        .format_target(false)
        .init();

    match matches.subcommand() {
        Some(("mkfs", m)) => mkfs::make(
            value::<PathBuf>(m, "image")?,
            *value::<u32>(m, "size-kib")?,
            *value::<u32>(m, "inodes")?,
        ),
        Some(("add", m)) => add::add(
            value::<PathBuf>(m, "input")?,
            value::<PathBuf>(m, "output")?,
            value::<PathBuf>(m, "file")?,
        ),
        Some(("ls", m)) => ls::list(value::<PathBuf>(m, "image")?),
        Some(("cat", m)) => cat::cat(value::<PathBuf>(m, "image")?, value::<String>(m, "name")?),
        _ => Ok(()),
    }
}

fn path_arg(name: &'static str, help: &'static str) -> Arg<'static> {
    Arg::new(name)
        .long(name)
        .takes_value(true)
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help(help)
}

fn value<'a, T>(matches: &'a ArgMatches, name: &str) -> anyhow::Result<&'a T>
where
    T: std::any::Any + Clone + Send + Sync + 'static,
{
    matches
        .get_one::<T>(name)
        .ok_or_else(|| anyhow!("--{} is required", name))
}
