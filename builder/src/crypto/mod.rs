// Licensed under the Apache-2.0 license

//! Cryptographic transforms applied to image components.

mod bootloader;
mod rc4;
mod smc;

pub use bootloader::{
    bootloader_build, bootloader_type, derive_and_encrypt_bootloader, BOOTLOADER_DEFAULT_KEY,
};
pub use rc4::Rc4;
pub use smc::{smc_decrypt, smc_encrypt, smc_is_encrypted};

use crate::error::{window, ImageResult};

/// Applies RC4 to `data` in place. Applying it twice with the same key is a no-op.
pub fn rc4(data: &mut [u8], key: &[u8]) -> ImageResult<()> {
    Rc4::new(key)?.apply(data)
}

/// Returns whether every byte of `data[offset..offset + length]` is zero.
pub fn is_zero_filled(data: &[u8], offset: usize, length: usize) -> ImageResult<bool> {
    Ok(window(data, offset, length)?.iter().all(|&b| b == 0))
}
