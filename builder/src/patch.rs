// Licensed under the Apache-2.0 license

//! Build-specific byte patches for bootloader stages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{window, window_mut, ImageError, ImageResult};

const WORD_LEN: usize = 4;

/// A 4-byte replacement at a fixed offset of a bootloader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchEntry {
    offset: usize,
    plain: [u8; WORD_LEN],
    patched: [u8; WORD_LEN],
}

/// What the bytes under a patch entry currently look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    Plain,
    Patched,
    Unknown,
}

impl PatchEntry {
    /// Both words are given as they appear in the big-endian bootloader code.
    pub const fn new(offset: usize, plain: u32, patched: u32) -> Self {
        Self {
            offset,
            plain: plain.to_be_bytes(),
            patched: patched.to_be_bytes(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn plain(&self) -> u32 {
        u32::from_be_bytes(self.plain)
    }

    pub fn patched(&self) -> u32 {
        u32::from_be_bytes(self.patched)
    }

    pub fn state(&self, data: &[u8]) -> ImageResult<PatchState> {
        let current = window(data, self.offset, WORD_LEN)?;
        Ok(if current == self.plain {
            PatchState::Plain
        } else if current == self.patched {
            PatchState::Patched
        } else {
            PatchState::Unknown
        })
    }

    /// Rewrites each byte as `plain ^ current ^ patched`.
    ///
    /// This yields `patched` only when the current bytes equal `plain`; the
    /// bytes are not checked beforehand.
    pub fn apply(&self, data: &mut [u8]) -> ImageResult<()> {
        let current = window_mut(data, self.offset, WORD_LEN)?;
        for (i, b) in current.iter_mut().enumerate() {
            *b ^= self.plain[i] ^ self.patched[i];
        }
        Ok(())
    }
}

pub fn apply_patch(data: &mut [u8], entry: &PatchEntry) -> ImageResult<()> {
    entry.apply(data)
}

/// Applies every patch registered for `build`, in order.
///
/// Stops at the first failing entry; earlier entries stay applied.
/// Returns the number of entries applied.
pub fn apply_build_patches(data: &mut [u8], build: u16, table: &PatchTable) -> ImageResult<usize> {
    let entries = table.get(build).ok_or(ImageError::NoPatches(build))?;
    for entry in entries {
        entry.apply(data)?;
    }
    Ok(entries.len())
}

/// Patch lists keyed by bootloader build number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTable {
    builds: BTreeMap<u16, Vec<PatchEntry>>,
}

#[derive(Serialize, Deserialize)]
struct PatchFile {
    #[serde(default, rename = "build")]
    builds: Vec<BuildRecord>,
}

#[derive(Serialize, Deserialize)]
struct BuildRecord {
    number: u16,
    #[serde(default)]
    patches: Vec<PatchRecord>,
}

#[derive(Serialize, Deserialize)]
struct PatchRecord {
    offset: u32,
    plain: u32,
    patched: u32,
}

impl Default for PatchTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert(
            4577,
            vec![
                PatchEntry::new(0x53C0, 0x7BEB0620, 0x48000168),
                PatchEntry::new(0x55B8, 0x409A0010, 0x60000000),
                PatchEntry::new(0x5D54, 0x480018C5, 0x60000000),
                PatchEntry::new(0x5DB0, 0x480000A1, 0x60000000),
            ],
        );
        table.insert(
            5772,
            vec![
                PatchEntry::new(0x04F0, 0x48006239, 0x60000000),
                PatchEntry::new(0x6860, 0x7BEB0620, 0x48000168),
                PatchEntry::new(0x6A58, 0x409A0010, 0x60000000),
                PatchEntry::new(0x7168, 0x480018E1, 0x60000000),
                PatchEntry::new(0x71B8, 0x419A0014, 0x48000014),
            ],
        );
        table.insert(
            6752,
            vec![
                PatchEntry::new(0x68A8, 0x7BEB0620, 0x48000168),
                PatchEntry::new(0x6AA0, 0x409A0010, 0x60000000),
                PatchEntry::new(0x71B0, 0x480018D9, 0x60000000),
                PatchEntry::new(0x7200, 0x419A0014, 0x48000014),
            ],
        );
        table.insert(
            9188,
            vec![
                PatchEntry::new(0x4D10, 0x7BEB0620, 0x48000168),
                PatchEntry::new(0x4F08, 0x409A0010, 0x60000000),
                PatchEntry::new(0x5618, 0x480018E1, 0x60000000),
                PatchEntry::new(0x5678, 0x480000B9, 0x60000000),
            ],
        );
        table.insert(
            13121,
            vec![
                PatchEntry::new(0x5048, 0x7BEB0620, 0x48000168),
                PatchEntry::new(0x58AC, 0x480001C5, 0x60000000),
                PatchEntry::new(0x5958, 0x480018E1, 0x60000000),
                PatchEntry::new(0x59B8, 0x480000B9, 0x60000000),
            ],
        );
        table
    }
}

impl PatchTable {
    pub fn empty() -> Self {
        Self {
            builds: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, build: u16, entries: Vec<PatchEntry>) -> Option<Vec<PatchEntry>> {
        self.builds.insert(build, entries)
    }

    pub fn get(&self, build: u16) -> Option<&[PatchEntry]> {
        self.builds.get(&build).map(Vec::as_slice)
    }

    pub fn builds(&self) -> impl Iterator<Item = u16> + '_ {
        self.builds.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.builds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }

    /// Parses a patch table from its TOML form.
    pub fn from_toml_str(text: &str) -> ImageResult<Self> {
        let file: PatchFile =
            toml::from_str(text).map_err(|e| ImageError::PatchTable(e.to_string()))?;

        let mut table = Self::empty();
        for record in file.builds {
            let entries = record
                .patches
                .iter()
                .map(|p| PatchEntry::new(p.offset as usize, p.plain, p.patched))
                .collect();
            if table.insert(record.number, entries).is_some() {
                return Err(ImageError::PatchTable(format!(
                    "build {} is listed more than once",
                    record.number
                )));
            }
        }
        Ok(table)
    }

    pub fn to_toml_string(&self) -> ImageResult<String> {
        let file = PatchFile {
            builds: self
                .builds
                .iter()
                .map(|(&number, entries)| BuildRecord {
                    number,
                    patches: entries
                        .iter()
                        .map(|e| PatchRecord {
                            offset: e.offset as u32,
                            plain: e.plain(),
                            patched: e.patched(),
                        })
                        .collect(),
                })
                .collect(),
        };
        toml::to_string(&file).map_err(|e| ImageError::PatchTable(e.to_string()))
    }
}
