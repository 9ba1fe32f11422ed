//! End-to-end runs of small machines built from synthetic memory images.

use emu_c64_core::{
    ChipId, ChipWindow, ConfigError, FlatLayout, Machine, MachineConfig, MemoryImage, RamRegion,
    RomSet, RunState, StopReason, TimingMode,
};
use emu_core::{Observable, Value};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// RAM everywhere below the vectors apart from the chip windows, and a
/// six-byte vector ROM on top.
///
/// The vector ROM holds NMI, reset and IRQ vectors at $FFFA-$FFFF. An
/// eight-byte ROM at $FFFA would run past the 16-bit space, so the power-on
/// scenario uses the six bytes that fit (see `rom_past_top_of_memory_is_rejected`).
fn vector_machine(reset: u16, mut windows: Vec<ChipWindow>) -> Machine {
    windows.sort_by_key(|w| w.start);
    let mut ram = Vec::new();
    let mut next = 0u32;
    for w in &windows {
        if u32::from(w.start) > next {
            ram.push(RamRegion {
                start: next as u16,
                length: u32::from(w.start) - next,
            });
        }
        next = u32::from(w.start) + w.length;
    }
    if next < 0xFFFA {
        ram.push(RamRegion {
            start: next as u16,
            length: 0xFFFA - next,
        });
    }
    let [lo, hi] = reset.to_le_bytes();
    let layout = FlatLayout {
        ram,
        roms: vec![MemoryImage::new(0xFFFA, vec![0x00, 0x00, lo, hi, 0x00, 0x00])],
        windows,
        colour_ram: None,
    };
    Machine::new(MachineConfig::flat(TimingMode::Pal, layout)).expect("valid config")
}

#[test]
fn power_on_scenario_with_vector_rom() {
    init_logging();
    let mut m = vector_machine(0x1000, Vec::new());
    m.step();
    assert_eq!(m.cpu().pc(), 0x1000);
    let start = m.now();
    let frame = TimingMode::Pal.cycles_per_frame();
    while m.now() - start < frame {
        m.step();
    }
    assert_eq!(m.chips().vic.frames(), 1);
}

#[test]
fn reset_vector_is_followed() {
    init_logging();
    let mut m = vector_machine(0x1000, Vec::new());
    assert_eq!(m.state(), RunState::Idle);
    m.step();
    assert_eq!(m.cpu().pc(), 0x1000);
}

#[test]
fn one_pal_frame_of_cycles_completes_one_frame() {
    init_logging();
    let mut m = vector_machine(0x1000, Vec::new());
    m.step();
    let report = m.run_cycles(TimingMode::Pal.cycles_per_frame());
    assert_eq!(report.stop, StopReason::CycleBudget);
    assert!(report.cycles >= 19_656);
    assert_eq!(m.chips().vic.frames(), 1);
}

#[test]
fn run_frame_stops_on_the_frame_boundary() {
    init_logging();
    let mut m = vector_machine(0x1000, Vec::new());
    let report = m.run_frame();
    assert_eq!(report.stop, StopReason::FrameComplete);
    assert!(report.cycles >= 19_656 && report.cycles < 19_656 + 8);
    assert_eq!(m.chips().vic.frames(), 1);
}

#[test]
fn ntsc_frame_is_shorter() {
    init_logging();
    let layout = FlatLayout {
        ram: vec![RamRegion {
            start: 0x0000,
            length: 0x1_0000,
        }],
        ..FlatLayout::default()
    };
    let mut m = Machine::new(MachineConfig::flat(TimingMode::Ntsc, layout)).expect("valid config");
    let report = m.run_frame();
    assert_eq!(report.stop, StopReason::FrameComplete);
    assert!(report.cycles >= TimingMode::Ntsc.cycles_per_frame());
    assert!(report.cycles < TimingMode::Pal.cycles_per_frame());
}

#[test]
fn rom_past_top_of_memory_is_rejected() {
    init_logging();
    let layout = FlatLayout {
        ram: vec![RamRegion {
            start: 0x0000,
            length: 0xFFFA,
        }],
        roms: vec![MemoryImage::new(0xFFFA, vec![0; 8])],
        ..FlatLayout::default()
    };
    let err = Machine::new(MachineConfig::flat(TimingMode::Pal, layout)).err();
    assert_eq!(
        err,
        Some(ConfigError::RegionOutOfRange {
            start: 0xFFFA,
            length: 8,
        })
    );
}

#[test]
fn vic_window_reads_raster_position() {
    init_logging();
    let mut m = vector_machine(
        0x1000,
        vec![ChipWindow {
            chip: ChipId::Vic,
            start: 0xD000,
            length: 0x400,
        }],
    );
    m.run_cycles(63 * 10);
    let line = m.chips().vic.raster_line();
    assert!(line >= 10);
    assert_eq!(m.peek(0xD012), (line & 0xFF) as u8);
    assert_eq!(m.query("vic.raster.line"), Some(Value::U16(line)));
}

fn synthetic_roms(kernal_program: &[u8]) -> RomSet {
    let mut kernal = vec![0xEA; 0x2000];
    kernal[..kernal_program.len()].copy_from_slice(kernal_program);
    // Reset vector -> $E000.
    kernal[0x1FFC] = 0x00;
    kernal[0x1FFD] = 0xE0;
    RomSet {
        kernal,
        basic: vec![0xBB; 0x2000],
        chargen: vec![0xCC; 0x1000],
    }
}

#[test]
fn c64_layout_boots_from_kernal_and_banks_it_out() {
    init_logging();
    let program = [
        0xA9, 0x42, // LDA #$42
        0x8D, 0x00, 0xE1, // STA $E100 (RAM under the kernal)
        0xA9, 0x35, // LDA #$35
        0x85, 0x01, // STA $01: kernal and BASIC out, I/O stays
        0x4C, 0x09, 0xE0, // JMP $E009
    ];
    let mut config = MachineConfig::c64(TimingMode::Pal, synthetic_roms(&program));
    // Same loop in the RAM underneath, so execution carries on after the switch.
    config.images = vec![MemoryImage::new(0xE009, vec![0x4C, 0x09, 0xE0])];
    let mut m = Machine::new(config).expect("valid config");

    assert_eq!(m.peek(0xA000), 0xBB);
    m.step();
    assert_eq!(m.cpu().pc(), 0xE000);
    m.run_cycles(200);

    assert_eq!(m.cpu().pc(), 0xE009);
    assert_eq!(m.memory().ram()[0xE100], 0x42);
    assert_eq!(m.peek(0xE100), 0x42);
    assert_eq!(m.peek(0xE000), 0x00);
    assert_eq!(m.peek(0xA000), 0x00);
    assert_eq!(m.peek(0x0001), 0x35);
    assert_eq!(
        m.memory().resolve(0xD020).map(|mapping| mapping.owner),
        Some(emu_c64_core::Owner::Chip(ChipId::Vic))
    );
}

#[test]
fn bad_rom_size_is_rejected() {
    init_logging();
    let mut roms = synthetic_roms(&[]);
    roms.chargen.truncate(0x800);
    assert_eq!(
        Machine::new(MachineConfig::c64(TimingMode::Pal, roms)).err(),
        Some(ConfigError::RomSize {
            rom: "character",
            expected: 0x1000,
            actual: 0x800,
        })
    );
}

#[test]
fn video_events_are_drained_in_cycle_order() {
    init_logging();
    let mut m = vector_machine(0x1000, Vec::new());
    m.run_cycles(63 * 20);
    let events: Vec<_> = m.drain_video().collect();
    assert!(!events.is_empty());
    assert!(events.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    assert!(events.iter().all(|(cycle, _)| *cycle <= m.now()));
    assert_eq!(m.drain_video().count(), 0);
}
