// Licensed under the Apache-2.0 license

use anyhow::{anyhow, Context, Result};
use ecc_builder::crypto::{smc_decrypt, smc_encrypt};
use ecc_builder::{BlobId, BlobStore, PatchTable};
use log::{debug, warn};
use std::path::Path;

pub(crate) fn load_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Cannot read file '{}'", path.display()))
}

pub(crate) fn load_optional(path: Option<&Path>) -> Result<Option<Vec<u8>>> {
    path.map(load_file).transpose()
}

fn blob_file_name(id: BlobId) -> String {
    format!("{}.bin", id.name().to_lowercase())
}

/// Loads every built-in blob present in `dir` (`xell.bin`, `cbmfg.bin`, `cd.bin`).
pub(crate) fn load_blob_dir(dir: Option<&Path>) -> Result<BlobStore> {
    let mut blobs = BlobStore::new();
    let Some(dir) = dir else {
        return Ok(blobs);
    };
    if !dir.is_dir() {
        return Err(anyhow!("Blob directory '{}' does not exist", dir.display()));
    }
    for id in BlobId::ALL {
        let path = dir.join(blob_file_name(id));
        if path.exists() {
            debug!("Loading built in {} from {}", id, path.display());
            blobs.insert(id, load_file(&path)?);
        }
    }
    Ok(blobs)
}

/// Reads a patch table, falling back to the built-in one when the file is unusable.
pub(crate) fn load_patch_table(path: Option<&Path>) -> PatchTable {
    let Some(path) = path else {
        return PatchTable::default();
    };
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| PatchTable::from_toml_str(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(table) => table,
        Err(e) => {
            warn!("Patch file parsing failed ({}), using built in patches instead", e);
            PatchTable::default()
        }
    }
}

/// Encrypts or decrypts the controller firmware in `input` and writes it to `output`.
pub(crate) fn transform_smc_file(input: &Path, output: &Path, decrypt: bool) -> Result<()> {
    let mut data = load_file(input)?;
    if decrypt {
        smc_decrypt(&mut data)
            .with_context(|| format!("Unable to decrypt {}", input.display()))?;
    } else {
        smc_encrypt(&mut data)
            .with_context(|| format!("Unable to encrypt {}", input.display()))?;
    }
    std::fs::write(output, &data).with_context(|| format!("Unable to write {}", output.display()))
}
