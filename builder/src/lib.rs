// Licensed under the Apache-2.0 license

pub mod crypto;
mod error;
mod generator;
mod image;
pub mod patch;
mod status;

pub use ecc_image::{swap16, swap32, BlobId, BlobStore, EccHeader};
pub use error::{ImageError, ImageResult};
pub use generator::{EccArgs, EccGenerator, EccImage, HackType, NandPart, NandSource, SpareType};
pub use image::ImageBuilder;
pub use patch::{apply_build_patches, apply_patch, PatchEntry, PatchState, PatchTable};
pub use status::{LogSink, Status, StatusSink};

/// Looks up a built-in blob by name.
pub fn get_named_blob<'a>(blobs: &'a BlobStore, name: &str) -> ImageResult<&'a [u8]> {
    Ok(blobs.get_named(name)?)
}
