//! Property tests over random programs and run schedules.

use emu_c64_core::{
    ChipId, ChipWindow, FlatLayout, Machine, MachineConfig, MemoryImage, RamRegion, TimingMode,
};
use proptest::prelude::*;

/// Every chip mapped, RAM elsewhere, `program` at $1000. Reset and
/// BRK both land on $1000, so any byte soup keeps running.
fn config(program: &[u8], chip_order: Vec<ChipId>) -> MachineConfig {
    let window = |chip, start, length| ChipWindow {
        chip,
        start,
        length,
    };
    let layout = FlatLayout {
        ram: vec![
            RamRegion {
                start: 0x0000,
                length: 0xD000,
            },
            RamRegion {
                start: 0xE000,
                length: 0x2000,
            },
        ],
        windows: vec![
            window(ChipId::Vic, 0xD000, 0x400),
            window(ChipId::Sid, 0xD400, 0x400),
            window(ChipId::Cia1, 0xDC00, 0x100),
            window(ChipId::Cia2, 0xDD00, 0x100),
            window(ChipId::Disk, 0xDE00, 0x100),
        ],
        colour_ram: Some(0xD800),
        ..FlatLayout::default()
    };
    let mut config = MachineConfig::flat(TimingMode::Pal, layout);
    config.chip_order = chip_order;
    config.images = vec![
        MemoryImage::new(0x1000, program.to_vec()),
        MemoryImage::new(0xFFFA, vec![0x00, 0x10, 0x00, 0x10, 0x00, 0x10]),
    ];
    config
}

fn machine(program: &[u8], chip_order: Vec<ChipId>) -> Machine {
    Machine::new(config(program, chip_order)).expect("valid config")
}

fn program() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..64)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Same configuration and inputs, same state.
    #[test]
    fn runs_are_deterministic(program in program(), cycles in 1u64..20_000) {
        let mut a = machine(&program, ChipId::ALL.to_vec());
        let mut b = machine(&program, ChipId::ALL.to_vec());
        a.run_cycles(cycles);
        b.run_cycles(cycles);
        prop_assert_eq!(a.now(), b.now());
        prop_assert_eq!(a.save_snapshot(), b.save_snapshot());
    }

    /// The clock is the sum of reported cycles and every chip has been
    /// ticked exactly that far.
    #[test]
    fn cycles_are_conserved(
        program in program(),
        budgets in prop::collection::vec(1u64..3_000, 1..8),
    ) {
        let mut m = machine(&program, ChipId::ALL.to_vec());
        let mut total = 0;
        for budget in budgets {
            let report = m.run_cycles(budget);
            prop_assert!(report.cycles >= budget);
            total += report.cycles;
        }
        prop_assert_eq!(m.now(), total);
        for id in ChipId::ALL {
            prop_assert_eq!(m.chips().get(id).cycles(), total);
        }
    }

    /// The tick order of the chips within a step is not observable.
    #[test]
    fn chip_order_does_not_matter(
        program in program(),
        order in Just(ChipId::ALL.to_vec()).prop_shuffle(),
        cycles in 1u64..20_000,
    ) {
        let mut a = machine(&program, ChipId::ALL.to_vec());
        let mut b = machine(&program, order);
        a.run_cycles(cycles);
        b.run_cycles(cycles);
        prop_assert_eq!(a.save_snapshot(), b.save_snapshot());
    }

    /// Snapshot, restore elsewhere, continue: indistinguishable from never
    /// having stopped.
    #[test]
    fn restore_continues_identically(
        program in program(),
        before in 1u64..10_000,
        after in 1u64..10_000,
    ) {
        let mut a = machine(&program, ChipId::ALL.to_vec());
        a.run_cycles(before);
        let snapshot = a.save_snapshot();
        a.run_cycles(after);

        let mut b = machine(&program, ChipId::ALL.to_vec());
        b.load_snapshot(&snapshot).expect("restore");
        b.run_cycles(after);
        prop_assert_eq!(a.save_snapshot(), b.save_snapshot());
    }
}
