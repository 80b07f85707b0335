// Licensed under the Apache-2.0 license

use ecc_image::{
    EccHeader, BOOTLOADER_OFFSET, KEYVAULT_OFFSET, RECOVERY_LOADER_OFFSET, SMC_OFFSET,
};
use zerocopy::IntoBytes;

use crate::error::{ImageError, ImageResult};
use crate::status::Status;

/// Accumulates an ECC image. The buffer only ever grows.
#[derive(Default)]
pub struct ImageBuilder {
    data: Vec<u8>,
    status: Status,
}

impl ImageBuilder {
    pub fn new(status: Status) -> Self {
        Self {
            data: Vec::new(),
            status,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Appends the 512-byte header at the current position.
    pub fn add_header(
        &mut self,
        base_size: u32,
        smc_offset: u32,
        smc_size: u32,
        cb_version: &str,
        hack: &str,
    ) {
        let description = format!(
            "eccgen v{} ECC Image, CB={} {}",
            env!("CARGO_PKG_VERSION"),
            cb_version,
            hack
        );
        let header = EccHeader::new(base_size, smc_offset, smc_size, &description);
        self.status.update(&format!(
            "Adding Header Offset: 0x{:X} Size: 0x{:X}",
            self.data.len(),
            ecc_image::HEADER_SIZE
        ));
        self.data.extend_from_slice(header.as_bytes());
    }

    /// Appends zeros until the image is exactly `pos` bytes long.
    pub fn pad_to(&mut self, pos: usize) -> ImageResult<()> {
        if self.data.len() > pos {
            return Err(ImageError::OutOfRange {
                offset: pos,
                len: 0,
                size: self.data.len(),
            });
        }
        self.data.resize(pos, 0);
        Ok(())
    }

    fn add_component(&mut self, offset: usize, label: &str, data: &[u8]) -> ImageResult<()> {
        if self.data.len() < offset {
            self.status.update(&format!(
                "Padding to {} Offset: 0x{:X} Size: 0x{:X}",
                label,
                self.data.len(),
                offset - self.data.len()
            ));
            self.pad_to(offset)?;
        }
        self.status.update(&format!(
            "Adding {} Offset: 0x{:X} Size: 0x{:X}",
            label,
            self.data.len(),
            data.len()
        ));
        self.data.extend_from_slice(data);
        Ok(())
    }

    pub fn add_controller_firmware(&mut self, data: &[u8]) -> ImageResult<()> {
        self.add_component(SMC_OFFSET, "SMC", data)
    }

    pub fn add_bootloader_stage(&mut self, data: &[u8], label: &str) -> ImageResult<()> {
        self.add_component(BOOTLOADER_OFFSET, label, data)
    }

    pub fn add_keyvault(&mut self, data: &[u8]) -> ImageResult<()> {
        self.add_component(KEYVAULT_OFFSET, "Keyvault", data)
    }

    pub fn add_recovery_loader(&mut self, data: &[u8]) -> ImageResult<()> {
        self.add_component(RECOVERY_LOADER_OFFSET, "XeLL", data)
    }
}
