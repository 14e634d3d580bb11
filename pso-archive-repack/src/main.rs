// Copyright (c) 2025 The pso-archive developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Command line front end for inspecting and repacking pipeline state
//! archives.

use std::{error::Error, fs, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use log::error;

use pso_archive::{
    archive::{ArchiveRepacker, FileSource},
    DeviceObjectArchive, DeviceType, ResourceKind,
};

#[derive(Parser)]
#[command(version, about = "Inspect and repack pipeline state archives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the contents of an archive.
    Info {
        /// Archive to inspect.
        archive: PathBuf,
    },
    /// Strip one or more backends' data blocks from an archive.
    Remove {
        /// Archive to repack.
        archive: PathBuf,
        /// Backends to remove (gl, d3d11, d3d12, vk, metal-macos, metal-ios).
        #[arg(short, long, required = true)]
        device: Vec<DeviceType>,
        /// Output file; defaults to rewriting the input in place.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Transplant backends' data blocks from another archive with identical
    /// content.
    Append {
        /// Archive to repack.
        archive: PathBuf,
        /// Archive to take the data blocks from.
        source: PathBuf,
        /// Backends to transplant.
        #[arg(short, long, required = true)]
        device: Vec<DeviceType>,
        /// Output file; defaults to rewriting the input in place.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Command::Info { archive } => info(&archive),
        Command::Remove {
            archive,
            device,
            output,
        } => {
            let source = FileSource::open(&archive)?;
            let mut repacker = ArchiveRepacker::new(&source)?;

            for device in device {
                repacker.remove_device_data(device)?;
            }

            write_output(&repacker, output.as_ref().unwrap_or(&archive))
        }
        Command::Append {
            archive,
            source,
            device,
            output,
        } => {
            let destination_file = FileSource::open(&archive)?;
            let mut repacker = ArchiveRepacker::new(&destination_file)?;

            let source_file = FileSource::open(&source)?;
            let donor = ArchiveRepacker::new(&source_file)?;

            for device in device {
                repacker.append_device_data(&donor, device)?;
            }

            write_output(&repacker, output.as_ref().unwrap_or(&archive))
        }
    }
}

fn write_output(repacker: &ArchiveRepacker, path: &PathBuf) -> Result<(), Box<dyn Error>> {
    fs::write(path, repacker.serialize()?)?;
    println!("wrote {}", path.display());

    Ok(())
}

fn info(path: &PathBuf) -> Result<(), Box<dyn Error>> {
    let source = FileSource::open(path)?;
    let repacker = ArchiveRepacker::new(&source)?;
    let archive = DeviceObjectArchive::new(std::sync::Arc::new(FileSource::open(path)?))?;

    let debug_info = archive.debug_info();
    println!("archive:     {}", path.display());
    println!("api version: {:#x}", debug_info.api_version);
    if !debug_info.git_hash.is_empty() {
        println!("git hash:    {}", debug_info.git_hash);
    }

    let devices: Vec<String> = repacker
        .present_devices()
        .map(|device| device.to_string())
        .collect();
    println!(
        "device blocks: {}",
        if devices.is_empty() {
            "none".to_owned()
        } else {
            devices.join(", ")
        }
    );

    for kind in ResourceKind::ALL {
        if archive.resource_count(kind) == 0 {
            continue;
        }

        println!("{}s:", kind);
        for name in archive.resource_names(kind) {
            println!("  {}", name);
        }
    }

    Ok(())
}
