// Licensed under the Apache-2.0 license

//! Fixed layout of an ECC image and the header record written at its start.

mod blob;
mod bytes;

pub use blob::{BlobError, BlobId, BlobStore};
pub use bytes::{swap16, swap32};

use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Offset of the controller firmware region.
pub const SMC_OFFSET: usize = 0x4000;
/// Offset of the keyvault region. Shares its slot with the controller firmware.
pub const KEYVAULT_OFFSET: usize = 0x4000;
/// Offset of the first bootloader stage.
pub const BOOTLOADER_OFFSET: usize = 0x8000;
/// Offset of the recovery loader.
pub const RECOVERY_LOADER_OFFSET: usize = 0xC0000;

pub const HEADER_SIZE: usize = 0x200;
pub const HEADER_MAGIC: u16 = 0xFF4F;
pub const HEADER_BUILD: u16 = 0x0760;
pub const DESCRIPTION_LEN: usize = 0x40;

const KEYVAULT_SIZE: u32 = 0x4000;
const PATCH_SLOTS: u16 = 2;
const KEYVAULT_VERSION: u16 = 0x0712;

#[repr(C)]
#[derive(Debug, Clone, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct EccHeader {
    pub magic: U16<BigEndian>,
    pub build: U16<BigEndian>,
    pub qfe: U16<BigEndian>,
    pub flags: U16<BigEndian>,
    pub entry: U32<BigEndian>,
    pub size: U32<BigEndian>,
    pub copyright: [u8; DESCRIPTION_LEN],
    reserved0: [u8; 0x10],
    pub keyvault_size: U32<BigEndian>,
    pub sysupdate_addr: U32<BigEndian>,
    pub patch_slots: U16<BigEndian>,
    pub keyvault_version: U16<BigEndian>,
    pub keyvault_offset: U32<BigEndian>,
    pub patch_slot_size: U32<BigEndian>,
    pub smc_config_offset: U32<BigEndian>,
    pub smc_size: U32<BigEndian>,
    pub smc_offset: U32<BigEndian>,
    reserved1: [u8; 0x180],
}

const _: () = assert!(core::mem::size_of::<EccHeader>() == HEADER_SIZE);

impl EccHeader {
    /// Creates a header for an image whose boot chain ends at `base_size`.
    ///
    /// `description` is stored as ASCII and silently truncated to 64 bytes.
    pub fn new(base_size: u32, smc_offset: u32, smc_size: u32, description: &str) -> Self {
        let mut copyright = [0u8; DESCRIPTION_LEN];
        let text: Vec<u8> = description
            .chars()
            .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
            .take(DESCRIPTION_LEN)
            .collect();
        copyright[..text.len()].copy_from_slice(&text);

        Self {
            magic: HEADER_MAGIC.into(),
            build: HEADER_BUILD.into(),
            qfe: U16::ZERO,
            flags: U16::ZERO,
            entry: (BOOTLOADER_OFFSET as u32).into(),
            size: base_size.into(),
            copyright,
            reserved0: [0; 0x10],
            keyvault_size: KEYVAULT_SIZE.into(),
            sysupdate_addr: base_size.into(),
            patch_slots: PATCH_SLOTS.into(),
            keyvault_version: KEYVAULT_VERSION.into(),
            keyvault_offset: (KEYVAULT_OFFSET as u32).into(),
            patch_slot_size: U32::ZERO,
            smc_config_offset: U32::ZERO,
            smc_size: smc_size.into(),
            smc_offset: smc_offset.into(),
            reserved1: [0; 0x180],
        }
    }

    pub fn verify(&self) -> bool {
        self.magic.get() == HEADER_MAGIC && self.build.get() == HEADER_BUILD
    }

    /// Returns the description text up to the first NUL byte.
    pub fn description(&self) -> String {
        let end = self
            .copyright
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DESCRIPTION_LEN);
        String::from_utf8_lossy(&self.copyright[..end]).into_owned()
    }
}
