// Licensed under the Apache-2.0 license

use ecc_image::BlobError;
use thiserror::Error;

pub type ImageResult<T> = Result<T, ImageError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("Range 0x{offset:X}+0x{len:X} is outside a buffer of 0x{size:X} bytes")]
    OutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No patches registered for build {0}")]
    NoPatches(u16),
    #[error("Invalid patch table: {0}")]
    PatchTable(String),
}

impl From<BlobError> for ImageError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(name) => ImageError::NotFound(name),
        }
    }
}

/// Returns the `len` bytes starting at `offset`, or `OutOfRange`.
pub(crate) fn window(data: &[u8], offset: usize, len: usize) -> ImageResult<&[u8]> {
    let end = check_window(data.len(), offset, len)?;
    Ok(&data[offset..end])
}

pub(crate) fn window_mut(data: &mut [u8], offset: usize, len: usize) -> ImageResult<&mut [u8]> {
    let end = check_window(data.len(), offset, len)?;
    Ok(&mut data[offset..end])
}

fn check_window(size: usize, offset: usize, len: usize) -> ImageResult<usize> {
    offset
        .checked_add(len)
        .filter(|&end| end <= size)
        .ok_or(ImageError::OutOfRange { offset, len, size })
}
