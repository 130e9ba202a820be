#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use spooltag_rs::{DecryptedScanData, InterpreterFactory, TagFormat};

#[derive(Debug, Arbitrary)]
struct FuzzScan {
    format: u8,
    classic_1k: bool,
    blocks: Vec<(u8, [u8; 16])>,
    raw_hex: Vec<(u8, String)>,
}

fuzz_target!(|scan: FuzzScan| {
    let format = match scan.format % 4 {
        0 => TagFormat::BambuLab,
        1 => TagFormat::Creality,
        2 => TagFormat::OpenTag,
        _ => TagFormat::Unknown,
    };

    let mut builder = DecryptedScanData::builder("FUZZ0001").tag_format(format);
    if scan.classic_1k {
        builder = builder.mifare_classic_1k();
    }
    for (index, block) in scan.blocks.iter().take(64) {
        builder = builder.block(*index, block);
    }
    for (index, text) in scan.raw_hex.iter().take(8) {
        builder = builder.block_hex(*index, text.clone());
    }

    // must never panic, whatever the block contents
    let _ = InterpreterFactory::with_defaults().interpret(&builder.build());
});
