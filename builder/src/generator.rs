// Licensed under the Apache-2.0 license

//! Resolves the components of an ECC image and assembles them.

use std::fmt;

use ecc_image::{BlobId, BlobStore, BOOTLOADER_OFFSET, RECOVERY_LOADER_OFFSET, SMC_OFFSET};
use log::debug;

use crate::crypto::{
    bootloader_build, derive_and_encrypt_bootloader, smc_encrypt, smc_is_encrypted,
};
use crate::error::{ImageError, ImageResult};
use crate::image::ImageBuilder;
use crate::patch::{apply_patch, PatchState, PatchTable};
use crate::status::Status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HackType {
    Rgh1,
    Rgh2,
    Rgx,
}

impl HackType {
    fn has_second_stage(&self) -> bool {
        !matches!(self, HackType::Rgh1)
    }
}

impl fmt::Display for HackType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            HackType::Rgh1 => "RGH1",
            HackType::Rgh2 => "RGH2",
            HackType::Rgx => "RGX",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpareType {
    None,
    SmallBlock,
    SmallBlock2,
    BigBlock,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NandPart {
    Smc,
    BootloaderA,
    BootloaderB,
}

/// Read access to a source NAND dump.
pub trait NandSource {
    fn get_part(&self, part: NandPart) -> ImageResult<Vec<u8>>;
    fn detect_spare_layout(&self) -> ImageResult<SpareType>;
}

pub struct EccArgs<'a> {
    pub hack_type: HackType,
    pub spare_type: SpareType,
    pub source: Option<&'a dyn NandSource>,
    pub smc: Option<Vec<u8>>,
    pub keyvault: Option<Vec<u8>>,
    pub bootloader_a: Option<Vec<u8>>,
    pub bootloader_b: Option<Vec<u8>>,
    pub cd: Option<Vec<u8>>,
    pub recovery_loader: Option<Vec<u8>>,
    pub encrypt_bootloaders: bool,
}

impl<'a> EccArgs<'a> {
    pub fn new(hack_type: HackType, spare_type: SpareType) -> Self {
        Self {
            hack_type,
            spare_type,
            source: None,
            smc: None,
            keyvault: None,
            bootloader_a: None,
            bootloader_b: None,
            cd: None,
            recovery_loader: None,
            encrypt_bootloaders: true,
        }
    }
}

/// The slot at 0x4000 holds one of these.
enum LowRegion {
    Smc(Vec<u8>),
    Keyvault(Vec<u8>),
}

struct Components {
    spare_type: SpareType,
    low: LowRegion,
    bootloader_a: Vec<u8>,
    bootloader_b: Option<Vec<u8>>,
    cd: Vec<u8>,
    recovery_loader: Vec<u8>,
}

#[derive(Debug)]
pub struct EccImage {
    pub data: Vec<u8>,
    pub spare_type: SpareType,
}

pub struct EccGenerator<'a> {
    patches: &'a PatchTable,
    blobs: &'a BlobStore,
    status: Status,
}

impl<'a> EccGenerator<'a> {
    pub fn new(patches: &'a PatchTable, blobs: &'a BlobStore, status: Status) -> Self {
        Self {
            patches,
            blobs,
            status,
        }
    }

    fn from_source(
        &self,
        source: Option<&dyn NandSource>,
        part: NandPart,
        missing: &'static str,
    ) -> ImageResult<Vec<u8>> {
        match source {
            Some(source) => source.get_part(part),
            None => Err(ImageError::InvalidArgument(missing)),
        }
    }

    fn resolve(&self, args: EccArgs) -> ImageResult<Components> {
        self.status.update("Checking Settings...");
        let source = args.source;
        if source.is_none()
            && (args.spare_type == SpareType::Auto || args.hack_type == HackType::Rgh2)
        {
            return Err(ImageError::InvalidArgument(
                "Automatic spare detection and RGH2 need a source NAND",
            ));
        }

        let spare_type = match (args.spare_type, source) {
            (SpareType::Auto, Some(source)) => {
                self.status.update("Checking Spare Type...");
                source.detect_spare_layout()?
            }
            (other, _) => other,
        };

        let low = match args.keyvault {
            Some(keyvault) => LowRegion::Keyvault(keyvault),
            None => {
                self.status.update("Grabbing SMC Data...");
                LowRegion::Smc(match args.smc {
                    Some(smc) => smc,
                    None => self.from_source(
                        source,
                        NandPart::Smc,
                        "Supply either a source NAND or SMC data",
                    )?,
                })
            }
        };

        let bootloader_a = if args.hack_type == HackType::Rgx {
            self.status.update("Using Built in MFG CB_A");
            self.blobs.get(BlobId::ManufacturingBootloader)?.to_vec()
        } else {
            self.status.update(if args.hack_type == HackType::Rgh1 {
                "Grabbing CB Data..."
            } else {
                "Grabbing CB_A Data..."
            });
            match args.bootloader_a {
                Some(data) => data,
                None => self.from_source(
                    source,
                    NandPart::BootloaderA,
                    "Supply either a source NAND or CB_A data",
                )?,
            }
        };

        let bootloader_b = if args.hack_type.has_second_stage() {
            self.status.update("Grabbing CB_B Data...");
            Some(match args.bootloader_b {
                Some(data) => data,
                None => self.from_source(
                    source,
                    NandPart::BootloaderB,
                    "Supply either a source NAND or CB_B data",
                )?,
            })
        } else {
            None
        };

        self.status.update("Grabbing CD Data...");
        let cd = match args.cd {
            Some(data) => data,
            None => {
                self.status.update("Using Built in CD");
                self.blobs.get(BlobId::Cd)?.to_vec()
            }
        };

        self.status.update("Grabbing XeLL Data...");
        let recovery_loader = match args.recovery_loader {
            Some(data) => data,
            None => {
                self.status.update("Using Built in XeLL");
                self.blobs.get(BlobId::RecoveryLoader)?.to_vec()
            }
        };

        Ok(Components {
            spare_type,
            low,
            bootloader_a,
            bootloader_b,
            cd,
            recovery_loader,
        })
    }

    fn patch_stage(&self, stage: &mut [u8]) -> ImageResult<u16> {
        let build = bootloader_build(stage)?;
        let entries = match self.patches.get(build) {
            Some(entries) => entries,
            None => {
                self.status.update(&ImageError::NoPatches(build).to_string());
                return Ok(build);
            }
        };
        for (i, entry) in entries.iter().enumerate() {
            self.status.update(&format!(
                "Applying Patch #{} of {} @ Offset: 0x{:X}",
                i + 1,
                entries.len(),
                entry.offset()
            ));
            if entry.state(stage)? != PatchState::Plain {
                log::warn!(
                    "Bytes at 0x{:X} do not match the expected plain word 0x{:08X}",
                    entry.offset(),
                    entry.plain()
                );
            }
            apply_patch(stage, entry)?;
        }
        debug!("Applied {} patches for build {}", entries.len(), build);
        Ok(build)
    }

    /// Builds a complete image from `args`.
    pub fn generate(&self, args: EccArgs) -> ImageResult<EccImage> {
        let hack_type = args.hack_type;
        let encrypt = args.encrypt_bootloaders;
        let mut parts = self.resolve(args)?;

        let low_len = match &parts.low {
            LowRegion::Smc(data) | LowRegion::Keyvault(data) => data.len(),
        };
        if SMC_OFFSET + low_len > BOOTLOADER_OFFSET {
            return Err(ImageError::InvalidArgument(
                "SMC or keyvault overruns the bootloader region",
            ));
        }
        let boot_chain_len = parts.bootloader_a.len()
            + parts.bootloader_b.as_ref().map_or(0, Vec::len)
            + parts.cd.len();
        if BOOTLOADER_OFFSET + boot_chain_len > RECOVERY_LOADER_OFFSET {
            return Err(ImageError::InvalidArgument(
                "Bootloaders overrun the recovery loader region",
            ));
        }

        if let LowRegion::Smc(smc) = &mut parts.low {
            if smc_is_encrypted(smc) {
                debug!("SMC is already encrypted");
            } else {
                self.status.update("Encrypting SMC...");
                smc_encrypt(smc)?;
            }
        }

        let build = match parts.bootloader_b.as_mut() {
            Some(stage) => self.patch_stage(stage)?,
            None => self.patch_stage(&mut parts.bootloader_a)?,
        };

        if encrypt {
            self.status.update("Encrypting bootloaders...");
            let key = derive_and_encrypt_bootloader(&mut parts.bootloader_a, None, true, None)?;
            if let Some(stage) = parts.bootloader_b.as_mut() {
                derive_and_encrypt_bootloader(stage, None, false, Some(&key[..]))?;
            }
        }

        let base_size = u32::try_from(BOOTLOADER_OFFSET + boot_chain_len)
            .map_err(|_| ImageError::InvalidArgument("Bootloaders are too large"))?;
        let (smc_offset, smc_size) = match &parts.low {
            LowRegion::Smc(smc) => (
                SMC_OFFSET as u32,
                u32::try_from(smc.len())
                    .map_err(|_| ImageError::InvalidArgument("SMC is too large"))?,
            ),
            LowRegion::Keyvault(_) => (0, 0),
        };

        let mut builder = ImageBuilder::new(self.status.clone());
        builder.add_header(
            base_size,
            smc_offset,
            smc_size,
            &build.to_string(),
            &hack_type.to_string(),
        );
        match &parts.low {
            LowRegion::Smc(smc) => builder.add_controller_firmware(smc)?,
            LowRegion::Keyvault(keyvault) => builder.add_keyvault(keyvault)?,
        }
        match &parts.bootloader_b {
            Some(stage_b) => {
                builder.add_bootloader_stage(&parts.bootloader_a, "CB_A")?;
                builder.add_bootloader_stage(stage_b, "CB_B")?;
            }
            None => builder.add_bootloader_stage(&parts.bootloader_a, "CB")?,
        }
        builder.add_bootloader_stage(&parts.cd, "CD")?;
        builder.add_recovery_loader(&parts.recovery_loader)?;

        self.status.update("ECC image complete");
        Ok(EccImage {
            data: builder.into_bytes(),
            spare_type: parts.spare_type,
        })
    }
}
