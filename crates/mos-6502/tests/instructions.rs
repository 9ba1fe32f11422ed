//! Instruction behaviour through the public `step` interface.

use emu_core::{Bus, Cpu, InterruptLines, SimpleBus};
use mos_6502::{Mos6502, flags};

/// Load a program at $0200 and point the CPU at it, skipping reset.
fn setup(program: &[u8]) -> (Mos6502, SimpleBus) {
    let mut bus = SimpleBus::new();
    bus.load(0x0200, program);
    bus.load(0xFFFE, &[0x00, 0x03]);
    let mut cpu = Mos6502::new();
    cpu.regs.s = 0xFF;
    cpu.set_pc(0x0200);
    (cpu, bus)
}

fn run(cpu: &mut Mos6502, bus: &mut SimpleBus, instructions: usize) -> u32 {
    (0..instructions).map(|_| cpu.step(bus)).sum()
}

#[test]
fn pha_pla_round_trip() {
    // LDA #$42; LDX #$FF; TXS; PHA; LDA #$00; PLA
    let (mut cpu, mut bus) = setup(&[0xA9, 0x42, 0xA2, 0xFF, 0x9A, 0x48, 0xA9, 0x00, 0x68]);
    run(&mut cpu, &mut bus, 6);

    assert_eq!(cpu.regs.a, 0x42);
    assert_eq!(cpu.regs.s, 0xFF);
    assert_eq!(bus.peek(0x01FF), 0x42);
}

#[test]
fn php_pushes_break_and_plp_drops_it() {
    // LDX #$FF; TXS; SEC; PHP; CLC; PLP
    let (mut cpu, mut bus) = setup(&[0xA2, 0xFF, 0x9A, 0x38, 0x08, 0x18, 0x28]);
    run(&mut cpu, &mut bus, 6);

    assert!(cpu.regs.p.is_set(flags::C));
    assert!(!cpu.regs.p.is_set(flags::B));
    assert_eq!(bus.peek(0x01FF) & (flags::B | flags::U), flags::B | flags::U);
}

#[test]
fn brk_pushes_return_address_past_signature_byte() {
    // LDX #$FF; TXS; CLI; BRK; (signature)
    let (mut cpu, mut bus) = setup(&[0xA2, 0xFF, 0x9A, 0x58, 0x00, 0xEA]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.step(&mut bus), 7);

    assert_eq!(cpu.pc(), 0x0300);
    assert_eq!(cpu.regs.s, 0xFC);
    assert!(cpu.regs.p.is_set(flags::I));
    assert_eq!(bus.peek(0x01FF), 0x02);
    assert_eq!(bus.peek(0x01FE), 0x06);
    let pushed = bus.peek(0x01FD);
    assert_eq!(pushed & (flags::B | flags::U), flags::B | flags::U);
    assert_eq!(pushed & flags::I, 0, "I was clear when BRK ran");
}

#[test]
fn jsr_rts_returns_after_operand() {
    let (mut cpu, mut bus) = setup(&[0x20, 0x20, 0x02, 0xEA]);
    bus.load(0x0220, &[0xAD, 0x00, 0x40, 0x60]); // LDA $4000; RTS
    bus.load(0x4000, &[0x42]);

    assert_eq!(cpu.step(&mut bus), 6);
    assert_eq!(cpu.pc(), 0x0220);
    // Return address pushed is the last byte of the JSR.
    assert_eq!(bus.peek(0x01FF), 0x02);
    assert_eq!(bus.peek(0x01FE), 0x02);

    cpu.step(&mut bus);
    assert_eq!(cpu.regs.a, 0x42);
    assert_eq!(cpu.step(&mut bus), 6);
    assert_eq!(cpu.pc(), 0x0203);
}

#[test]
fn jmp_indirect_wraps_within_page() {
    let (mut cpu, mut bus) = setup(&[0x6C, 0xFF, 0x10]);
    bus.load(0x10FF, &[0x34]);
    bus.load(0x1000, &[0x12]);
    bus.load(0x1100, &[0x99]);

    assert_eq!(cpu.step(&mut bus), 5);
    assert_eq!(cpu.pc(), 0x1234);
}

#[test]
fn rmw_writes_original_value_before_result() {
    // INC $10
    let (mut cpu, mut bus) = setup(&[0xE6, 0x10]);
    bus.load(0x0010, &[0x7F]);

    assert_eq!(cpu.step(&mut bus), 5);
    assert_eq!(bus.writes(), &[(0x0010, 0x7F), (0x0010, 0x80)]);
    assert!(cpu.regs.p.is_set(flags::N));
}

#[test]
fn indexed_store_makes_dummy_read_without_page_cross() {
    // LDX #$01; STA $1000,X
    let (mut cpu, mut bus) = setup(&[0xA2, 0x01, 0x9D, 0x00, 0x10]);
    cpu.step(&mut bus);
    assert_eq!(cpu.step(&mut bus), 5);
    assert_eq!(bus.writes(), &[(0x1001, 0x00)]);
}

#[test]
fn absolute_x_read_adds_cycle_on_page_cross() {
    // LDX #$01; LDA $10FF,X; LDA $1000,X
    let (mut cpu, mut bus) = setup(&[0xA2, 0x01, 0xBD, 0xFF, 0x10, 0xBD, 0x00, 0x10]);
    cpu.step(&mut bus);
    assert_eq!(cpu.step(&mut bus), 5);
    assert_eq!(cpu.step(&mut bus), 4);
}

#[test]
fn branch_cycles_depend_on_taken_and_page() {
    // CLC; BCS +2 (not taken); BCC +2 (taken)
    let (mut cpu, mut bus) = setup(&[0x18, 0xB0, 0x02, 0x90, 0x02]);
    cpu.step(&mut bus);
    assert_eq!(cpu.step(&mut bus), 2);
    assert_eq!(cpu.step(&mut bus), 3);
    assert_eq!(cpu.pc(), 0x0207);

    // BNE -6 from $0202 lands in page $01.
    let (mut cpu, mut bus) = setup(&[0xD0, 0xFA]);
    assert_eq!(cpu.step(&mut bus), 4);
    assert_eq!(cpu.pc(), 0x01FC);
}

#[test]
fn irq_is_taken_when_i_clear() {
    // CLI; NOP; NOP
    let (mut cpu, mut bus) = setup(&[0x58, 0xEA, 0xEA]);
    cpu.regs.p.set(flags::I);
    cpu.set_pc(0x0200);
    cpu.set_interrupt_lines(InterruptLines { irq: true, nmi: false });

    cpu.step(&mut bus); // CLI
    // The poll after CLI still sees I set, so one more instruction runs.
    cpu.step(&mut bus);
    assert_eq!(cpu.pc(), 0x0202);
    assert_eq!(cpu.step(&mut bus), 7);
    assert_eq!(cpu.pc(), 0x0300);
    // Pushed status has B clear.
    let pushed = bus.peek(0x0100 | u16::from(cpu.regs.s.wrapping_add(1)));
    assert_eq!(pushed & flags::B, 0);
}

#[test]
fn irq_masked_by_i_flag() {
    let (mut cpu, mut bus) = setup(&[0xEA, 0xEA]);
    cpu.regs.p.set(flags::I);
    cpu.set_pc(0x0200);
    cpu.set_interrupt_lines(InterruptLines { irq: true, nmi: false });
    assert_eq!(cpu.step(&mut bus), 2);
    assert_eq!(cpu.pc(), 0x0201);
}

#[test]
fn nmi_is_edge_triggered() {
    let (mut cpu, mut bus) = setup(&[0xEA, 0xEA, 0xEA]);
    bus.load(0xFFFA, &[0x00, 0x04]);
    bus.load(0x0400, &[0xEA, 0xEA]);
    let held = InterruptLines { irq: false, nmi: true };

    cpu.set_interrupt_lines(held);
    assert_eq!(cpu.step(&mut bus), 7);
    assert_eq!(cpu.pc(), 0x0400);

    // Holding the line low does not retrigger.
    cpu.set_interrupt_lines(held);
    assert_eq!(cpu.step(&mut bus), 2);
    assert_eq!(cpu.pc(), 0x0401);
}

#[test]
fn nmi_after_brk_interrupts_the_handler() {
    // LDX #$FF; TXS; BRK; (signature)
    let (mut cpu, mut bus) = setup(&[0xA2, 0xFF, 0x9A, 0x00, 0xEA]);
    bus.load(0xFFFA, &[0x00, 0x04]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.pc(), 0x0300);

    cpu.set_interrupt_lines(InterruptLines { irq: false, nmi: true });
    assert_eq!(cpu.step(&mut bus), 7);
    assert_eq!(cpu.pc(), 0x0400);
    // The NMI frame sits on top of the BRK frame and returns into the
    // BRK handler.
    assert_eq!(cpu.regs.s, 0xF9);
    assert_eq!(bus.peek(0x01FC), 0x03);
    assert_eq!(bus.peek(0x01FB), 0x00);
}

#[test]
fn arr_in_decimal_mode_applies_bcd_fixup() {
    // SED; CLC; LDA #$5F; ARR #$FF
    let (mut cpu, mut bus) = setup(&[0xF8, 0x18, 0xA9, 0x5F, 0x6B, 0xFF]);
    run(&mut cpu, &mut bus, 4);
    assert_eq!(cpu.regs.a, 0x85);
    assert!(cpu.regs.p.is_set(flags::C));
    assert!(cpu.regs.p.is_set(flags::V));
    // N follows the rotated value, before the fix-up.
    assert!(!cpu.regs.p.is_set(flags::N));
    assert!(!cpu.regs.p.is_set(flags::Z));
}

#[test]
fn arr_in_binary_mode() {
    // CLD; SEC; LDA #$FF; ARR #$C0
    let (mut cpu, mut bus) = setup(&[0xD8, 0x38, 0xA9, 0xFF, 0x6B, 0xC0]);
    run(&mut cpu, &mut bus, 4);
    assert_eq!(cpu.regs.a, 0xE0);
    assert!(cpu.regs.p.is_set(flags::C));
    assert!(!cpu.regs.p.is_set(flags::V));
    assert!(cpu.regs.p.is_set(flags::N));
}

#[test]
fn lax_loads_a_and_x() {
    let (mut cpu, mut bus) = setup(&[0xA7, 0x10]);
    bus.load(0x0010, &[0x85]);
    assert_eq!(cpu.step(&mut bus), 3);
    assert_eq!((cpu.regs.a, cpu.regs.x), (0x85, 0x85));
    assert!(cpu.regs.p.is_set(flags::N));
}

#[test]
fn sax_stores_a_and_x() {
    // LDA #$F0; LDX #$3C; SAX $10
    let (mut cpu, mut bus) = setup(&[0xA9, 0xF0, 0xA2, 0x3C, 0x87, 0x10]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(bus.peek(0x0010), 0x30);
}

#[test]
fn slo_shifts_memory_and_ors_into_a() {
    // LDA #$01; SLO $10
    let (mut cpu, mut bus) = setup(&[0xA9, 0x01, 0x07, 0x10]);
    bus.load(0x0010, &[0x81]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(bus.peek(0x0010), 0x02);
    assert_eq!(cpu.regs.a, 0x03);
    assert!(cpu.regs.p.is_set(flags::C));
}

#[test]
fn dcp_decrements_and_compares() {
    // LDA #$41; DCP $10
    let (mut cpu, mut bus) = setup(&[0xA9, 0x41, 0xC7, 0x10]);
    bus.load(0x0010, &[0x42]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(bus.peek(0x0010), 0x41);
    assert!(cpu.regs.p.is_set(flags::Z));
    assert!(cpu.regs.p.is_set(flags::C));
}

#[test]
fn isc_increments_and_subtracts() {
    // SEC; LDA #$10; ISC $10
    let (mut cpu, mut bus) = setup(&[0x38, 0xA9, 0x10, 0xE7, 0x10]);
    bus.load(0x0010, &[0x04]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(bus.peek(0x0010), 0x05);
    assert_eq!(cpu.regs.a, 0x0B);
}

#[test]
fn sbx_subtracts_from_a_and_x() {
    // LDA #$FF; LDX #$0F; SBX #$05
    let (mut cpu, mut bus) = setup(&[0xA9, 0xFF, 0xA2, 0x0F, 0xCB, 0x05]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.regs.x, 0x0A);
    assert!(cpu.regs.p.is_set(flags::C));
}

#[test]
fn ane_and_lxa_use_magic_constant() {
    // LDA #$00; LDX #$FF; ANE #$FF
    let (mut cpu, mut bus) = setup(&[0xA9, 0x00, 0xA2, 0xFF, 0x8B, 0xFF]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.regs.a, 0xEE);

    // LDA #$01; LXA #$13
    let (mut cpu, mut bus) = setup(&[0xA9, 0x01, 0xAB, 0x13]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!((cpu.regs.a, cpu.regs.x), (0x03, 0x03));
}

#[test]
fn arr_sets_carry_and_overflow_from_result() {
    // SEC; LDA #$FF; ARR #$C0 -> A = $E0
    let (mut cpu, mut bus) = setup(&[0x38, 0xA9, 0xFF, 0x6B, 0xC0]);
    run(&mut cpu, &mut bus, 3);
    assert_eq!(cpu.regs.a, 0xE0);
    assert!(cpu.regs.p.is_set(flags::C));
    assert!(!cpu.regs.p.is_set(flags::V));
}

#[test]
fn shx_ands_with_high_byte_plus_one() {
    // LDX #$FF; LDY #$01; SHX $1200,Y
    let (mut cpu, mut bus) = setup(&[0xA2, 0xFF, 0xA0, 0x01, 0x9E, 0x00, 0x12]);
    run(&mut cpu, &mut bus, 2);
    assert_eq!(cpu.step(&mut bus), 5);
    assert_eq!(bus.peek(0x1201), 0x13);
}

#[test]
fn sha_page_cross_replaces_high_byte() {
    // LDA #$FF; LDX #$02; LDY #$01; SHA $02FF,Y
    let (mut cpu, mut bus) = setup(&[0xA9, 0xFF, 0xA2, 0x02, 0xA0, 0x01, 0x9F, 0xFF, 0x02]);
    run(&mut cpu, &mut bus, 4);
    // value = $02 & ($02 + 1) = $02, address high byte becomes $02.
    assert_eq!(bus.writes().last(), Some(&(0x0200, 0x02)));
}

#[test]
fn las_ands_memory_with_stack_pointer() {
    // LDX #$F0; TXS; LDY #$00; LAS $1000,Y
    let (mut cpu, mut bus) = setup(&[0xA2, 0xF0, 0x9A, 0xA0, 0x00, 0xBB, 0x00, 0x10]);
    bus.load(0x1000, &[0x3C]);
    run(&mut cpu, &mut bus, 4);
    assert_eq!((cpu.regs.a, cpu.regs.x, cpu.regs.s), (0x30, 0x30, 0x30));
}

#[test]
fn multi_byte_nops_skip_operands() {
    // NOP #$FF; NOP $10; NOP $1234; LDA #$42
    let (mut cpu, mut bus) = setup(&[0x80, 0xFF, 0x04, 0x10, 0x0C, 0x34, 0x12, 0xA9, 0x42]);
    assert_eq!(run(&mut cpu, &mut bus, 3), 2 + 3 + 4);
    assert_eq!(cpu.pc(), 0x0207);
    cpu.step(&mut bus);
    assert_eq!(cpu.regs.a, 0x42);
}

#[test]
fn jam_stops_execution() {
    let (mut cpu, mut bus) = setup(&[0x02, 0xA9, 0x42]);
    cpu.step(&mut bus);
    for _ in 0..10 {
        assert_eq!(cpu.step(&mut bus), 1);
    }
    assert!(cpu.is_jammed());
    assert_eq!(cpu.pc(), 0x0200);
    assert_ne!(cpu.regs.a, 0x42);
}
