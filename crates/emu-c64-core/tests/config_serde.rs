//! Machine configurations survive a trip through JSON.

#![cfg(feature = "serde")]

use emu_c64_core::{
    ChipId, ChipWindow, FlatLayout, MachineConfig, MemoryImage, RamRegion, SidModel, TimingMode,
};

#[test]
fn flat_config_round_trips_through_json() {
    let layout = FlatLayout {
        ram: vec![RamRegion {
            start: 0x0000,
            length: 0xD000,
        }],
        roms: vec![MemoryImage::new(0xFFFA, vec![0, 0, 0, 0x10, 0, 0])],
        windows: vec![ChipWindow {
            chip: ChipId::Vic,
            start: 0xD000,
            length: 0x400,
        }],
        colour_ram: None,
    };
    let mut config = MachineConfig::flat(TimingMode::Ntsc, layout);
    config.sid_model = SidModel::Mos8580;
    config.chip_order.reverse();

    let json = serde_json::to_string(&config).expect("serialize");
    let back: MachineConfig = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, config);
}

#[test]
fn timing_mode_uses_variant_names() {
    assert_eq!(
        serde_json::to_string(&TimingMode::Pal).expect("serialize"),
        "\"Pal\""
    );
}
