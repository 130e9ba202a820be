//! Interpreter registry: format dispatch, structural detection, refresh and resilience

use rand::{Rng, SeedableRng};
use spooltag_rs::core::interpreter::{
    BambuFormatInterpreter, CrealityFormatInterpreter, OpenTagInterpreter,
};
use spooltag_rs::{
    DecryptedScanData, EmptyCatalog, InterpreterConfig, InterpreterFactory, MaterialMapping,
    ProductEntry, SharedCatalog, StaticCatalog, TagFormat,
};
use std::sync::Arc;

fn creality_scan(record: &str, format: TagFormat) -> DecryptedScanData {
    let mut raw = [0u8; 48];
    raw[..record.len()].copy_from_slice(record.as_bytes());

    let mut builder = DecryptedScanData::builder("1D2E3F40")
        .mifare_classic_1k()
        .tag_format(format);
    for (i, chunk) in raw.chunks(16).enumerate() {
        builder = builder.block(4 + i as u8, chunk.try_into().unwrap());
    }
    builder.build()
}

fn opentag_scan(format: TagFormat) -> DecryptedScanData {
    let mut buf = vec![0u8; 0x80];
    buf[0x10..0x12].copy_from_slice(b"OT");
    buf[0x12..0x14].copy_from_slice(&1u16.to_be_bytes());
    buf[0x14..0x14 + 9].copy_from_slice(b"Prusament");
    buf[0x24..0x28].copy_from_slice(b"PETG");
    buf[0x2E..0x2E + 12].copy_from_slice(b"Jet Black XL");
    buf[0x4E..0x51].copy_from_slice(&[0x10, 0x10, 0x10]);
    buf[0x51..0x53].copy_from_slice(&1750u16.to_be_bytes());
    buf[0x53..0x55].copy_from_slice(&1000u16.to_be_bytes());
    buf[0x55] = 48;
    buf[0x56] = 17;
    buf[0x57..0x59].copy_from_slice(&1270u16.to_be_bytes());
    buf[0x75..0x77].copy_from_slice(&320u16.to_be_bytes());

    let mut builder = DecryptedScanData::builder("04B00B1E").tag_format(format);
    for (i, chunk) in buf.chunks(16).enumerate() {
        builder = builder.block(i as u8, chunk.try_into().unwrap());
    }
    builder.build()
}

fn bambu_ids() -> [u8; 16] {
    let mut b = [0u8; 16];
    b[..8].copy_from_slice(b"A00-K000");
    b[8..].copy_from_slice(b"GFA00000");
    b
}

#[test]
fn test_creality_through_factory() {
    let factory = InterpreterFactory::with_defaults();
    let info = factory
        .interpret(&creality_scan(
            "AB124 24C15 1B3D 03001 #1A1A1A 000456",
            TagFormat::Creality,
        ))
        .unwrap();

    assert_eq!(info.tag_format, TagFormat::Creality);
    assert_eq!(info.filament_type, "PETG");
    assert_eq!(info.production_date, "2024-12-15");
    assert_eq!(info.color_name, "Black");
    assert_eq!(info.extension_or("supplier_id", ""), "1B3D");
}

#[test]
fn test_untagged_creality_detected_structurally() {
    let factory = InterpreterFactory::with_defaults();
    let data = creality_scan("AB124 24115 1B3D 01001 #FFFFFF 000456", TagFormat::Unknown);

    // a 1K Classic dump without Bambu ids in block 1 falls through to Creality
    let info = factory.interpret(&data).unwrap();
    assert_eq!(info.tag_format, TagFormat::Creality);
    assert_eq!(info.color_name, "White");

    let mut detached = data.clone();
    detached.technology = "MifareUltralight".to_string();
    let info = factory.interpret(&detached).unwrap();
    assert_eq!(info.tag_format, TagFormat::Creality);
}

#[test]
fn test_untagged_1k_needs_bambu_ids() {
    let config = InterpreterConfig::default();
    let bambu = BambuFormatInterpreter::new(Arc::new(EmptyCatalog), &config);

    let mut only_variant = [0u8; 16];
    only_variant[..8].copy_from_slice(b"A00-K000");
    let creality = creality_scan("AB124 24115 1B3D 01001 #FFFFFF 000456", TagFormat::Unknown);

    for data in [
        creality,
        DecryptedScanData::builder("04A1B2C3")
            .mifare_classic_1k()
            .block(1, &only_variant)
            .build(),
        DecryptedScanData::builder("04A1B2C3")
            .mifare_classic_1k()
            .block(2, &bambu_ids())
            .build(),
    ] {
        assert!(!bambu.can_interpret(&data));
    }
}

#[test]
fn test_opentag_through_factory() {
    let factory = InterpreterFactory::with_defaults();

    for format in [TagFormat::OpenTag, TagFormat::Unknown] {
        let info = factory.interpret(&opentag_scan(format)).unwrap();
        assert_eq!(info.tag_format, TagFormat::OpenTag);
        assert_eq!(info.manufacturer, "Prusament");
        assert_eq!(info.filament_type, "PETG");
        assert_eq!(info.color_hex, "#101010");
        assert_eq!(info.filament_length_mm, 320_000);
        assert_eq!(info.temperatures.max_hotend, 240);
        assert_eq!(info.temperatures.bed_temp, 85);
        assert_eq!(info.extension("density_g_cm3"), Some("1.270"));
        assert_eq!(info.tray_uid, "PRUS-PETG-JETB");
    }
}

#[test]
fn test_explicit_format_excludes_other_interpreters() {
    let config = InterpreterConfig::default();
    let bambu = BambuFormatInterpreter::new(Arc::new(EmptyCatalog), &config);
    let creality = CrealityFormatInterpreter::new(Arc::new(EmptyCatalog));
    let opentag = OpenTagInterpreter::new();

    for format in [TagFormat::Creality, TagFormat::OpenTag] {
        let data = DecryptedScanData::builder("04A1B2C3")
            .mifare_classic_1k()
            .tag_format(format)
            .block(1, &bambu_ids())
            .build();
        assert!(!bambu.can_interpret(&data));
    }

    let tagged_bambu = DecryptedScanData::builder("04A1B2C3")
        .tag_format(TagFormat::BambuLab)
        .block(1, &bambu_ids())
        .build();
    assert!(bambu.can_interpret(&tagged_bambu));
    assert!(!creality.can_interpret(&tagged_bambu));
    assert!(!opentag.can_interpret(&tagged_bambu));

    let untagged = DecryptedScanData::builder("04A1B2C3")
        .mifare_classic_1k()
        .block(1, &bambu_ids())
        .build();
    assert!(bambu.can_interpret(&untagged));
}

#[test]
fn test_refresh_mappings_updates_past_scans() {
    let shared = Arc::new(SharedCatalog::new(StaticCatalog::new()));
    let factory = InterpreterFactory::new(shared.clone(), InterpreterConfig::default());

    let mut kind = [0u8; 16];
    kind[..3].copy_from_slice(b"PLA");
    let history = vec![DecryptedScanData::builder("04A1B2C3")
        .tag_format(TagFormat::BambuLab)
        .block(1, &bambu_ids())
        .block(2, &kind)
        .build()];

    let before: Vec<_> = history.iter().filter_map(|d| factory.interpret(d)).collect();
    assert_eq!(before[0].color_name, "Unknown Color (#4CAF50)");

    shared.replace(
        StaticCatalog::new()
            .with_mapping(MaterialMapping {
                code: "GFA00000:A00-K000".to_string(),
                material: "PLA Basic".to_string(),
                color: "Black".to_string(),
                hex: "#000000".to_string(),
                sku: Some("10101".to_string()),
            })
            .with_product(ProductEntry {
                vendor: "Creality".to_string(),
                sku: "CR-PLA-W".to_string(),
                name: "Hyper PLA White".to_string(),
                material_type: "PLA".to_string(),
                color_name: "Snow White".to_string(),
                color_hex: "#FFFFFF".to_string(),
                url: None,
            }),
    );
    factory.refresh_mappings();

    let after: Vec<_> = history.iter().filter_map(|d| factory.interpret(d)).collect();
    assert_eq!(after[0].color_name, "Black");
    assert_eq!(after[0].filament_type, "PLA Basic");
    assert_eq!(after[0].sku.as_deref(), Some("10101"));

    // Creality reads the catalog source directly
    let info = factory
        .interpret(&creality_scan(
            "AB124 24115 1B3D 01001 #ffffff 000456",
            TagFormat::Creality,
        ))
        .unwrap();
    assert_eq!(info.color_name, "Snow White");
}

#[test]
fn test_introspection() {
    let factory = InterpreterFactory::default();
    assert_eq!(factory.supported_formats().len(), 3);
    assert!(!factory.supported_formats().contains(&TagFormat::Unknown));
    assert_eq!(
        factory.supported_interpreter_names()[0],
        "BambuFormatInterpreter"
    );
}

#[test]
fn test_random_block_maps_never_panic() {
    let factory = InterpreterFactory::with_defaults();
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED);
    let formats = [
        TagFormat::BambuLab,
        TagFormat::Creality,
        TagFormat::OpenTag,
        TagFormat::Unknown,
    ];

    for round in 0..500 {
        let mut builder = DecryptedScanData::builder(format!("{:08X}", round))
            .mifare_classic_1k()
            .tag_format(formats[round % formats.len()]);

        for _ in 0..rng.gen_range(1..20) {
            let index = rng.gen_range(0..64u8);
            let mut block = [0u8; 16];
            rng.fill(&mut block);
            if rng.gen_bool(0.3) {
                block[..2].copy_from_slice(b"OT");
            }
            builder = builder.block(index, &block);
        }

        if let Some(info) = factory.interpret(&builder.build()) {
            assert!(info.color_hex.is_empty() || info.color_hex.starts_with('#'));
        }
    }
}

#[test]
fn test_json_dump_round_trip() {
    let data = opentag_scan(TagFormat::OpenTag);
    let json = serde_json::to_string_pretty(&data).unwrap();
    let restored: DecryptedScanData = serde_json::from_str(&json).unwrap();

    let factory = InterpreterFactory::with_defaults();
    assert_eq!(factory.interpret(&restored), factory.interpret(&data));
}
