use classweave::settings::{ComputeMode, Settings};
use classweave::*;

use clap::{crate_version, Arg, ArgAction, Command};
use std::fs;
use std::path::PathBuf;

fn cli() -> Command {
    Command::new("JVM class file re-encoder")
        .version(crate_version!())
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Decode a class file and encode it again, recomputing maximums and frames")
        .arg(
            Arg::new("input")
                .long("input")
                .value_name("FILE")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Class file to read"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .value_name("FILE")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Where to write the re-encoded class"),
        )
        .arg(
            Arg::new("compute")
                .long("compute")
                .value_name("MODE")
                .default_value("frames")
                .value_parser(ComputeMode::NAMES)
                .help("What to recompute instead of copying from the input"),
        )
        .arg(
            Arg::new("class-path")
                .long("class-path")
                .value_name("DIR")
                .action(ArgAction::Append)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory of class files consulted for the class hierarchy (repeatable)"),
        )
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = cli().get_matches();

    let mut settings = Settings::default();
    let mode = matches.get_one::<String>("compute").unwrap();
    settings.compute = mode.parse::<ComputeMode>()?.flags();
    if let Some(directories) = matches.get_many::<PathBuf>("class-path") {
        for directory in directories {
            settings.add_class_path(directory.clone())?;
        }
    }

    let hierarchy = settings.class_hierarchy();
    let input = matches.get_one::<PathBuf>("input").unwrap();
    let output = matches.get_one::<PathBuf>("output").unwrap();

    log::info!("Reading '{}'", input.display());
    let bytes = fs::read(input)?;
    let encoded = settings.reencode(&hierarchy, &bytes)?;
    log::info!("Writing '{}' ({} bytes)", output.display(), encoded.len());
    fs::write(output, encoded)?;

    Ok(())
}
