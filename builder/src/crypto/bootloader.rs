// Licensed under the Apache-2.0 license

use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::rc4;
use crate::error::{window, ImageError, ImageResult};

type HmacSha1 = Hmac<Sha1>;

/// HMAC key used when the caller does not supply one.
pub const BOOTLOADER_DEFAULT_KEY: [u8; 16] = [
    0xDD, 0x88, 0xAD, 0x0C, 0x9E, 0xD6, 0x69, 0xE7, 0xB5, 0x67, 0x94, 0xFB, 0x68, 0x56, 0x3E, 0xFA,
];

const BUILD_OFFSET: usize = 0x2;
const TYPE_OFFSET: usize = 0x6;
const SALT_OFFSET: usize = 0x10;
const PAYLOAD_OFFSET: usize = 0x20;
const KEY_LEN: usize = 0x10;

const TYPE_CONTENT_KEYED: u16 = 0x800;
const TYPE_ZERO_KEYED: u16 = 0x801;

/// Build number stored in a bootloader stage header.
pub fn bootloader_build(data: &[u8]) -> ImageResult<u16> {
    read_be16(data, BUILD_OFFSET)
}

/// Encryption type tag stored in a bootloader stage header.
pub fn bootloader_type(data: &[u8]) -> ImageResult<u16> {
    read_be16(data, TYPE_OFFSET)
}

fn read_be16(data: &[u8], offset: usize) -> ImageResult<u16> {
    let bytes = window(data, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn hmac_sha1(key: &[u8], message: &[u8]) -> ImageResult<[u8; KEY_LEN]> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|_| ImageError::InvalidArgument("Invalid HMAC key length"))?;
    mac.update(message);
    let digest = mac.finalize().into_bytes();

    let mut derived = [0u8; KEY_LEN];
    derived.copy_from_slice(&digest[..KEY_LEN]);
    Ok(derived)
}

/// Derives the RC4 key for a bootloader stage and encrypts its payload in place.
///
/// The salt field at `[0x10, 0x20)` is cleared first so the derived key never
/// depends on it. In default mode the key is `HMAC-SHA1(key, salt)`; otherwise
/// the stage type at offset 6 selects the message, `salt || content key`, keyed
/// with `secondary_key`. Type `0x801` forces an all-zero content key.
///
/// Everything from offset 0x20 onwards is encrypted. The derived key is returned
/// so callers can chain it into the next stage.
pub fn derive_and_encrypt_bootloader(
    data: &mut [u8],
    key: Option<&[u8]>,
    use_default: bool,
    secondary_key: Option<&[u8]>,
) -> ImageResult<[u8; KEY_LEN]> {
    if data.len() <= PAYLOAD_OFFSET {
        return Err(ImageError::InvalidArgument(
            "Bootloader must be larger than its 0x20 byte header",
        ));
    }
    let key = key
        .filter(|k| !k.is_empty())
        .unwrap_or(&BOOTLOADER_DEFAULT_KEY);

    let stage_type = bootloader_type(data)?;
    let (hmac_key, content_key) = if use_default {
        (key, None)
    } else {
        let secondary_key = secondary_key.filter(|k| !k.is_empty()).ok_or(
            ImageError::InvalidArgument("A secondary key is required when not using default encryption"),
        )?;
        let content_key: [u8; KEY_LEN] = match stage_type {
            TYPE_CONTENT_KEYED => key
                .try_into()
                .map_err(|_| ImageError::InvalidArgument("Content key must be 16 bytes"))?,
            TYPE_ZERO_KEYED => [0u8; KEY_LEN],
            other => {
                return Err(ImageError::UnsupportedOperation(format!(
                    "Bootloader encryption type 0x{other:X} is not supported"
                )))
            }
        };
        (secondary_key, Some(content_key))
    };

    data[SALT_OFFSET..PAYLOAD_OFFSET].fill(0);
    let mut message = [0u8; 2 * KEY_LEN];
    message[..KEY_LEN].copy_from_slice(&data[SALT_OFFSET..PAYLOAD_OFFSET]);
    let derived = match content_key {
        Some(content_key) => {
            message[KEY_LEN..].copy_from_slice(&content_key);
            hmac_sha1(hmac_key, &message)?
        }
        None => hmac_sha1(hmac_key, &message[..KEY_LEN])?,
    };

    rc4(&mut data[PAYLOAD_OFFSET..], &derived)?;
    Ok(derived)
}
