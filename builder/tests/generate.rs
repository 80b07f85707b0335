// Licensed under the Apache-2.0 license

use std::cell::RefCell;
use std::rc::Rc;

use ecc_builder::crypto::{derive_and_encrypt_bootloader, rc4, smc_decrypt, smc_encrypt};
use ecc_builder::{
    apply_build_patches, BlobId, BlobStore, EccArgs, EccGenerator, EccHeader, HackType,
    ImageError, ImageResult, LogSink, NandPart, NandSource, PatchEntry, PatchTable, SpareType,
    Status,
};
use log::LevelFilter;
use simple_logger::SimpleLogger;
use zerocopy::FromBytes;

const XELL: &[u8] = b"XeLL recovery loader image";
const CD_LEN: usize = 0x400;
const CBMFG_BUILD: u16 = 5772;

struct FakeNand {
    smc: Vec<u8>,
    cb_a: Vec<u8>,
    cb_b: Vec<u8>,
}

impl NandSource for FakeNand {
    fn get_part(&self, part: NandPart) -> ImageResult<Vec<u8>> {
        Ok(match part {
            NandPart::Smc => self.smc.clone(),
            NandPart::BootloaderA => self.cb_a.clone(),
            NandPart::BootloaderB => self.cb_b.clone(),
        })
    }

    fn detect_spare_layout(&self) -> ImageResult<SpareType> {
        Ok(SpareType::BigBlock)
    }
}

/// A bootloader stage carrying the plain words of its build's patch set.
fn stage(build: u16, stage_type: u16, len: usize, table: &PatchTable) -> Vec<u8> {
    let mut data: Vec<u8> = (0..len).map(|i| (i * 13 + build as usize) as u8).collect();
    data[0..2].copy_from_slice(b"CB");
    data[2..4].copy_from_slice(&build.to_be_bytes());
    data[6..8].copy_from_slice(&stage_type.to_be_bytes());
    for entry in table.get(build).unwrap_or(&[]) {
        data[entry.offset()..entry.offset() + 4].copy_from_slice(&entry.plain().to_be_bytes());
    }
    data
}

fn smc_plain() -> Vec<u8> {
    let mut data: Vec<u8> = (0..0x3000).map(|i| (i * 5) as u8).collect();
    let len = data.len();
    data[len - 4..].fill(0);
    data
}

fn cd() -> Vec<u8> {
    (0..CD_LEN).map(|i| (i * 3 + 1) as u8).collect()
}

fn blobs() -> BlobStore {
    let table = PatchTable::default();
    BlobStore::new()
        .with_blob(BlobId::RecoveryLoader, XELL.to_vec())
        .with_blob(BlobId::Cd, cd())
        .with_blob(
            BlobId::ManufacturingBootloader,
            stage(CBMFG_BUILD, 0x800, 0x7800, &table),
        )
}

fn recording_status() -> (Status, Rc<RefCell<Vec<String>>>) {
    let messages = Rc::new(RefCell::new(Vec::new()));
    let sink = messages.clone();
    let status = Status::new()
        .with_sink(Rc::new(LogSink))
        .with_sink(Rc::new(move |m: &str| sink.borrow_mut().push(m.to_string())));
    (status, messages)
}

fn header(data: &[u8]) -> EccHeader {
    let (header, _) = EccHeader::read_from_prefix(data).expect("Failed to parse header");
    assert!(header.verify());
    header
}

#[test]
fn test_rgh2_from_nand() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Debug).init();
    let table = PatchTable::default();
    let blobs = blobs();

    let smc_plain = smc_plain();
    let mut smc = smc_plain.clone();
    smc_encrypt(&mut smc).unwrap();
    let nand = FakeNand {
        smc: smc.clone(),
        cb_a: stage(1234, 0x800, 0x2000, &table),
        cb_b: stage(9188, 0x800, 0x6000, &table),
    };

    let (status, messages) = recording_status();
    let generator = EccGenerator::new(&table, &blobs, status);
    let mut args = EccArgs::new(HackType::Rgh2, SpareType::Auto);
    args.source = Some(&nand as &dyn NandSource);
    let image = generator.generate(args).expect("Failed to generate image");

    assert_eq!(image.spare_type, SpareType::BigBlock);
    let data = &image.data;
    assert_eq!(data.len(), 0xC0000 + XELL.len());

    let header = header(data);
    assert_eq!(header.size.get(), (0x8000 + 0x2000 + 0x6000 + CD_LEN) as u32);
    assert_eq!(header.smc_offset.get(), 0x4000);
    assert_eq!(header.smc_size.get(), 0x3000);
    assert!(header.description().contains("CB=9188 RGH2"));

    // Already encrypted SMC data is kept as is.
    assert_eq!(&data[0x4000..0x7000], &smc[..]);
    let mut decrypted = data[0x4000..0x7000].to_vec();
    smc_decrypt(&mut decrypted).unwrap();
    assert_eq!(decrypted, smc_plain);

    // CB_A is encrypted with the default key, CB_B is chained to it.
    let mut cb_a = nand.cb_a.clone();
    let key_a = derive_and_encrypt_bootloader(&mut cb_a, None, true, None).unwrap();
    assert_eq!(&data[0x8000..0xA000], &cb_a[..]);

    let mut cb_b = data[0xA000..0x10000].to_vec();
    let mut expected_b = nand.cb_b.clone();
    apply_build_patches(&mut expected_b, 9188, &table).unwrap();
    let key_b =
        derive_and_encrypt_bootloader(&mut expected_b.clone(), None, false, Some(&key_a[..]))
            .unwrap();
    rc4(&mut cb_b[0x20..], &key_b).unwrap();
    assert_eq!(&cb_b[0x20..], &expected_b[0x20..]);
    for entry in table.get(9188).unwrap() {
        let at = entry.offset();
        assert_eq!(cb_b[at..at + 4], entry.patched().to_be_bytes());
    }

    // The CD stage follows CB_B unmodified.
    assert_eq!(&data[0x10000..0x10000 + CD_LEN], &cd()[..]);
    assert!(data[0x10000 + CD_LEN..0xC0000].iter().all(|&b| b == 0));
    assert_eq!(&data[0xC0000..], XELL);

    let messages = messages.borrow();
    assert!(messages.iter().any(|m| m == "Checking Spare Type..."));
    assert!(messages.iter().any(|m| m == "Grabbing CD Data..."));
    assert!(messages.iter().any(|m| m == "Using Built in CD"));
    assert!(messages.iter().any(|m| m == "Adding CD Offset: 0x10000 Size: 0x400"));
    assert!(messages
        .iter()
        .any(|m| m == "Applying Patch #1 of 4 @ Offset: 0x4D10"));
    assert!(messages.iter().any(|m| m == "Adding CB_B Offset: 0xA000 Size: 0x6000"));
    assert_eq!(messages.last().map(String::as_str), Some("ECC image complete"));
}

#[test]
fn test_rgh1_explicit_components() {
    let table = PatchTable::default();
    let blobs = blobs();
    let cb = stage(1234, 0x800, 0x1000, &table);
    let smc = smc_plain();

    let (status, messages) = recording_status();
    let generator = EccGenerator::new(&table, &blobs, status);
    let mut args = EccArgs::new(HackType::Rgh1, SpareType::SmallBlock);
    args.smc = Some(smc.clone());
    args.bootloader_a = Some(cb.clone());
    args.bootloader_b = Some(vec![0xFF; 0x100]);
    args.cd = Some(b"custom cd".to_vec());
    args.recovery_loader = Some(b"custom xell".to_vec());
    args.encrypt_bootloaders = false;
    let image = generator.generate(args).expect("Failed to generate image");

    let data = &image.data;
    assert_eq!(image.spare_type, SpareType::SmallBlock);
    assert_eq!(header(data).size.get(), 0x9009);

    // Plain SMC input is encrypted on the way in.
    let mut decrypted = data[0x4000..0x7000].to_vec();
    smc_decrypt(&mut decrypted).unwrap();
    assert_eq!(decrypted, smc);

    // Unregistered builds pass through untouched; CB_B is ignored for RGH1.
    assert_eq!(&data[0x8000..0x9000], &cb[..]);
    assert_eq!(&data[0x9000..0x9009], b"custom cd");
    assert!(data[0x9009..0xC0000].iter().all(|&b| b == 0));
    assert_eq!(&data[0xC0000..], b"custom xell");
    let messages = messages.borrow();
    assert!(messages
        .iter()
        .any(|m| m == "No patches registered for build 1234"));
    assert!(messages.iter().any(|m| m == "Grabbing CD Data..."));
    assert!(!messages.iter().any(|m| m == "Using Built in CD"));
}

#[test]
fn test_rgx_keyvault_layout() {
    let table = PatchTable::default();
    let blobs = blobs();
    let keyvault = vec![0x4Bu8; 0x4000];

    let generator = EccGenerator::new(&table, &blobs, Status::new());
    let mut args = EccArgs::new(HackType::Rgx, SpareType::None);
    args.keyvault = Some(keyvault.clone());
    args.bootloader_a = Some(vec![0xEE; 0x100]);
    args.bootloader_b = Some(stage(9188, 0x801, 0x6000, &table));
    let image = generator.generate(args).expect("Failed to generate image");

    let data = &image.data;
    let header = header(data);
    assert_eq!(header.smc_offset.get(), 0);
    assert_eq!(header.smc_size.get(), 0);
    assert_eq!(header.size.get(), (0x8000 + 0x7800 + 0x6000 + CD_LEN) as u32);
    assert_eq!(&data[0x4000..0x8000], &keyvault[..]);

    // The built-in manufacturing CB_A replaces the supplied one.
    let mut cbmfg = blobs
        .get(BlobId::ManufacturingBootloader)
        .unwrap()
        .to_vec();
    derive_and_encrypt_bootloader(&mut cbmfg, None, true, None).unwrap();
    assert_eq!(&data[0x8000..0xF800], &cbmfg[..]);
    assert_eq!(&data[0x15800..0x15800 + CD_LEN], &cd()[..]);
    assert_eq!(&data[0xC0000..], XELL);
}

#[test]
fn test_generate_errors() {
    let table = PatchTable::default();
    let blobs = blobs();
    let generator = EccGenerator::new(&table, &blobs, Status::new());

    let args = EccArgs::new(HackType::Rgh1, SpareType::Auto);
    assert!(matches!(
        generator.generate(args),
        Err(ImageError::InvalidArgument(_))
    ));

    let mut args = EccArgs::new(HackType::Rgh1, SpareType::None);
    args.bootloader_a = Some(stage(1234, 0x800, 0x100, &table));
    assert!(matches!(
        generator.generate(args),
        Err(ImageError::InvalidArgument(_))
    ));

    // RGH2 needs a source NAND even when every component is supplied.
    let mut args = EccArgs::new(HackType::Rgh2, SpareType::None);
    args.smc = Some(smc_plain());
    args.bootloader_a = Some(stage(1234, 0x800, 0x100, &table));
    args.bootloader_b = Some(stage(9188, 0x800, 0x6000, &table));
    assert!(matches!(
        generator.generate(args),
        Err(ImageError::InvalidArgument(_))
    ));

    // SMC plaintext without its zero trailer cannot be encrypted.
    let mut args = EccArgs::new(HackType::Rgh1, SpareType::None);
    args.smc = Some(vec![0x01; 0x100]);
    args.bootloader_a = Some(stage(1234, 0x800, 0x100, &table));
    assert_eq!(generator.generate(args).unwrap_err(), ImageError::EncryptionFailed);

    // Components that overrun the next fixed offset are rejected.
    let mut args = EccArgs::new(HackType::Rgh1, SpareType::None);
    args.keyvault = Some(vec![0; 0x4001]);
    args.bootloader_a = Some(stage(1234, 0x800, 0x100, &table));
    assert!(matches!(
        generator.generate(args),
        Err(ImageError::InvalidArgument(_))
    ));

    let mut args = EccArgs::new(HackType::Rgh1, SpareType::None);
    args.keyvault = Some(vec![0; 0x10]);
    args.bootloader_a = Some(stage(1234, 0x800, 0xB8001, &table));
    assert!(matches!(
        generator.generate(args),
        Err(ImageError::InvalidArgument(_))
    ));

    // The CD stage counts towards the boot chain.
    let mut args = EccArgs::new(HackType::Rgh1, SpareType::None);
    args.keyvault = Some(vec![0; 0x10]);
    args.bootloader_a = Some(stage(1234, 0x800, 0xB8000 - CD_LEN, &table));
    args.cd = Some(vec![0; CD_LEN + 1]);
    assert!(matches!(
        generator.generate(args),
        Err(ImageError::InvalidArgument(_))
    ));

    let empty = BlobStore::new();
    let generator = EccGenerator::new(&table, &empty, Status::new());
    let mut args = EccArgs::new(HackType::Rgx, SpareType::None);
    args.keyvault = Some(vec![0; 0x10]);
    args.bootloader_b = Some(stage(9188, 0x801, 0x6000, &table));
    assert_eq!(
        generator.generate(args).unwrap_err(),
        ImageError::NotFound("CBMFG".to_string())
    );

    let mut args = EccArgs::new(HackType::Rgh1, SpareType::None);
    args.keyvault = Some(vec![0; 0x10]);
    args.bootloader_a = Some(stage(1234, 0x800, 0x100, &table));
    assert_eq!(
        generator.generate(args).unwrap_err(),
        ImageError::NotFound("CD".to_string())
    );

    let cd_only = BlobStore::new().with_blob(BlobId::Cd, cd());
    let generator = EccGenerator::new(&table, &cd_only, Status::new());
    let mut args = EccArgs::new(HackType::Rgh1, SpareType::None);
    args.keyvault = Some(vec![0; 0x10]);
    args.bootloader_a = Some(stage(1234, 0x800, 0x100, &table));
    assert_eq!(
        generator.generate(args).unwrap_err(),
        ImageError::NotFound("XELL".to_string())
    );
}

#[test]
fn test_patching_stops_at_failing_entry() {
    let mut table = PatchTable::empty();
    table.insert(
        77,
        vec![
            PatchEntry::new(0x40, 0x11111111, 0x22222222),
            PatchEntry::new(0x10000, 0x33333333, 0x44444444),
            PatchEntry::new(0x80, 0x55555555, 0x66666666),
        ],
    );
    let blobs = blobs();
    let (status, messages) = recording_status();
    let generator = EccGenerator::new(&table, &blobs, status);

    let mut args = EccArgs::new(HackType::Rgh1, SpareType::None);
    args.smc = Some(smc_plain());
    let mut cb = stage(77, 0x800, 0x100, &PatchTable::empty());
    cb[0x40..0x44].copy_from_slice(&0x11111111u32.to_be_bytes());
    args.bootloader_a = Some(cb);
    assert_eq!(
        generator.generate(args).unwrap_err(),
        ImageError::OutOfRange {
            offset: 0x10000,
            len: 4,
            size: 0x100
        }
    );

    let messages = messages.borrow();
    assert_eq!(
        messages.last().map(String::as_str),
        Some("Applying Patch #2 of 3 @ Offset: 0x10000")
    );
    assert!(messages
        .iter()
        .any(|m| m == "Applying Patch #1 of 3 @ Offset: 0x40"));
    assert!(!messages.iter().any(|m| m.starts_with("Applying Patch #3")));
}
