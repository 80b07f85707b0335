// Licensed under the Apache-2.0 license

//! Assembles ECC images from bootloader, SMC and recovery loader components.

mod files;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ecc_builder::{
    EccArgs, EccGenerator, EccHeader, HackType, LogSink, PatchTable, SpareType, Status,
};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::PathBuf;
use std::rc::Rc;
use zerocopy::FromBytes;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Print debug output
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble an ECC image
    Build {
        #[arg(long, value_enum)]
        hack: HackArg,

        #[arg(long, value_enum, default_value_t = SpareArg::None)]
        spare: SpareArg,

        /// Controller firmware; plain images are encrypted before placement
        #[arg(long)]
        smc: Option<PathBuf>,

        /// Keyvault placed at 0x4000 instead of the SMC
        #[arg(long)]
        keyvault: Option<PathBuf>,

        /// First bootloader stage (CB for RGH1)
        #[arg(long)]
        cb_a: Option<PathBuf>,

        /// Second bootloader stage
        #[arg(long)]
        cb_b: Option<PathBuf>,

        /// CD stage placed after the last CB; defaults to cd.bin from the blob directory
        #[arg(long)]
        cd: Option<PathBuf>,

        /// Recovery loader; defaults to xell.bin from the blob directory
        #[arg(long)]
        xell: Option<PathBuf>,

        /// Directory holding built in blobs (xell.bin, cbmfg.bin, cd.bin)
        #[arg(long)]
        blob_dir: Option<PathBuf>,

        /// TOML patch table used instead of the built in one
        #[arg(long)]
        patches: Option<PathBuf>,

        /// Leave the bootloader stages unencrypted
        #[arg(long, default_value_t = false)]
        no_encrypt: bool,

        #[arg(short, long)]
        output: PathBuf,
    },
    /// Encrypt or decrypt a controller firmware image
    Smc {
        #[arg(long, default_value_t = false)]
        decrypt: bool,

        input: PathBuf,

        output: PathBuf,
    },
    /// Print the built in patch table as TOML
    Patches {
        /// Only print the patches for this build
        #[arg(long, value_parser = clap_num::maybe_hex::<u16>)]
        build: Option<u16>,
    },
    /// Print the header of an ECC image
    Info { image: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum HackArg {
    Rgh1,
    Rgh2,
    Rgx,
}

impl From<HackArg> for HackType {
    fn from(arg: HackArg) -> Self {
        match arg {
            HackArg::Rgh1 => HackType::Rgh1,
            HackArg::Rgh2 => HackType::Rgh2,
            HackArg::Rgx => HackType::Rgx,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SpareArg {
    None,
    SmallBlock,
    SmallBlock2,
    BigBlock,
}

impl From<SpareArg> for SpareType {
    fn from(arg: SpareArg) -> Self {
        match arg {
            SpareArg::None => SpareType::None,
            SpareArg::SmallBlock => SpareType::SmallBlock,
            SpareArg::SmallBlock2 => SpareType::SmallBlock2,
            SpareArg::BigBlock => SpareType::BigBlock,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    SimpleLogger::new().with_level(level).init()?;

    match cli.command {
        Commands::Build {
            hack,
            spare,
            smc,
            keyvault,
            cb_a,
            cb_b,
            cd,
            xell,
            blob_dir,
            patches,
            no_encrypt,
            output,
        } => {
            let table = files::load_patch_table(patches.as_deref());
            let blobs = files::load_blob_dir(blob_dir.as_deref())?;

            let mut args = EccArgs::new(hack.into(), spare.into());
            args.smc = files::load_optional(smc.as_deref())?;
            args.keyvault = files::load_optional(keyvault.as_deref())?;
            args.bootloader_a = files::load_optional(cb_a.as_deref())?;
            args.bootloader_b = files::load_optional(cb_b.as_deref())?;
            args.cd = files::load_optional(cd.as_deref())?;
            args.recovery_loader = files::load_optional(xell.as_deref())?;
            args.encrypt_bootloaders = !no_encrypt;

            let status = Status::new().with_sink(Rc::new(LogSink));
            let image = EccGenerator::new(&table, &blobs, status)
                .generate(args)
                .context("Failed to generate ECC image")?;
            std::fs::write(&output, &image.data)
                .with_context(|| format!("Unable to write {}", output.display()))?;
            info!(
                "Wrote 0x{:X} bytes ({:?} spare) to {}",
                image.data.len(),
                image.spare_type,
                output.display()
            );
        }
        Commands::Smc {
            decrypt,
            input,
            output,
        } => {
            files::transform_smc_file(&input, &output, decrypt)?;
        }
        Commands::Patches { build } => {
            let mut table = PatchTable::default();
            if let Some(build) = build {
                let entries = table
                    .get(build)
                    .ok_or_else(|| anyhow!("No patches registered for build {}", build))?
                    .to_vec();
                table = PatchTable::empty();
                table.insert(build, entries);
            }
            print!("{}", table.to_toml_string()?);
        }
        Commands::Info { image } => {
            let data = files::load_file(&image)?;
            let (header, _) = EccHeader::read_from_prefix(&data)
                .map_err(|_| anyhow!("Image too small to contain the header."))?;
            if !header.verify() {
                bail!("Invalid header: incorrect magic number");
            }
            println!("Description:    {}", header.description());
            println!("Base size:      0x{:X}", header.size.get());
            println!("Entry:          0x{:X}", header.entry.get());
            println!("SMC offset:     0x{:X}", header.smc_offset.get());
            println!("SMC size:       0x{:X}", header.smc_size.get());
            println!(
                "Keyvault:       0x{:X} @ 0x{:X}",
                header.keyvault_size.get(),
                header.keyvault_offset.get()
            );
        }
    }

    Ok(())
}
