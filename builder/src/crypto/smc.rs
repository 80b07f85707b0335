// Licensed under the Apache-2.0 license

use crate::error::{ImageError, ImageResult};

const SMC_KEY: [u8; 4] = [0x42, 0x75, 0x4E, 0x79];
const TRAILER_LEN: usize = 4;

/// Rolls the key register forward with the plaintext byte at position `i`.
fn feed(key: &mut [u8; 4], i: usize, plain: u8) {
    let t = u16::from(plain) * 0xFB;
    let [low, high] = t.to_le_bytes();
    key[(i + 1) & 3] = key[(i + 1) & 3].wrapping_add(low);
    key[(i + 2) & 3] = key[(i + 2) & 3].wrapping_add(high);
}

fn check_len(data: &[u8]) -> ImageResult<()> {
    if data.len() < TRAILER_LEN {
        return Err(ImageError::InvalidArgument(
            "Controller firmware must hold at least its 4 byte trailer",
        ));
    }
    Ok(())
}

/// Decrypts controller firmware in place and checks its all-zero trailer.
pub fn smc_decrypt(data: &mut [u8]) -> ImageResult<()> {
    check_len(data)?;
    let mut key = SMC_KEY;
    for (i, b) in data.iter_mut().enumerate() {
        let plain = *b ^ key[i & 3];
        *b = plain;
        feed(&mut key, i, plain);
    }

    if data[data.len() - TRAILER_LEN..].iter().any(|&b| b != 0) {
        return Err(ImageError::DecryptionFailed);
    }
    Ok(())
}

/// Encrypts controller firmware in place.
///
/// The result is decrypted again as a self-check; a plaintext without the
/// zero trailer fails with `EncryptionFailed`.
pub fn smc_encrypt(data: &mut [u8]) -> ImageResult<()> {
    check_len(data)?;
    let mut key = SMC_KEY;
    for (i, b) in data.iter_mut().enumerate() {
        let plain = *b;
        *b = plain ^ key[i & 3];
        feed(&mut key, i, plain);
    }

    match smc_decrypt(&mut data.to_vec()) {
        Err(ImageError::DecryptionFailed) => Err(ImageError::EncryptionFailed),
        other => other,
    }
}

/// Whether `data` decrypts to a controller firmware image with a valid trailer.
pub fn smc_is_encrypted(data: &[u8]) -> bool {
    smc_decrypt(&mut data.to_vec()).is_ok()
}
