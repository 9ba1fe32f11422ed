//! Opcode decoding.
//!
//! All 256 opcodes decode to an instruction and an addressing mode. The
//! regular part of the matrix is decoded from the `aaabbbcc` bit fields;
//! the irregular corners are listed explicitly.

/// Addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    /// `(zp,X)`
    IndirectX,
    /// `(zp),Y`
    IndirectY,
    /// `JMP (abs)`
    Indirect,
    Relative,
}

/// Instruction, documented and undocumented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc,
    Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp,
    Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti,
    Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
    // Undocumented
    Alr, Anc, Ane, Arr, Dcp, Isc, Jam, Las, Lax, Lxa, Rla, Rra, Sax, Sbx,
    Sha, Shx, Shy, Slo, Sre, Tas,
}

impl Instruction {
    /// True for opcodes outside the documented instruction set.
    #[must_use]
    pub fn is_undocumented(self) -> bool {
        use Instruction::*;
        matches!(
            self,
            Alr | Anc | Ane | Arr | Dcp | Isc | Jam | Las | Lax | Lxa | Rla | Rra | Sax | Sbx
                | Sha | Shx | Shy | Slo | Sre | Tas
        )
    }
}

/// Mode column shared by the `cc = 01` and `cc = 11` groups.
const GROUP_MODES: [Mode; 8] = [
    Mode::IndirectX,
    Mode::ZeroPage,
    Mode::Immediate,
    Mode::Absolute,
    Mode::IndirectY,
    Mode::ZeroPageX,
    Mode::AbsoluteY,
    Mode::AbsoluteX,
];

/// Decode an opcode.
#[must_use]
pub fn decode(opcode: u8) -> (Instruction, Mode) {
    use Instruction::*;

    let aaa = usize::from(opcode >> 5);
    let bbb = usize::from((opcode >> 2) & 0x07);

    match opcode & 0x03 {
        0x01 => {
            if opcode == 0x89 {
                return (Nop, Mode::Immediate);
            }
            ([Ora, And, Eor, Adc, Sta, Lda, Cmp, Sbc][aaa], GROUP_MODES[bbb])
        }
        0x03 => {
            if bbb == 2 {
                return ([Anc, Anc, Alr, Arr, Ane, Lxa, Sbx, Sbc][aaa], Mode::Immediate);
            }
            match opcode {
                0x93 => (Sha, Mode::IndirectY),
                0x97 => (Sax, Mode::ZeroPageY),
                0x9B => (Tas, Mode::AbsoluteY),
                0x9F => (Sha, Mode::AbsoluteY),
                0xB7 => (Lax, Mode::ZeroPageY),
                0xBB => (Las, Mode::AbsoluteY),
                0xBF => (Lax, Mode::AbsoluteY),
                _ => ([Slo, Rla, Sre, Rra, Sax, Lax, Dcp, Isc][aaa], GROUP_MODES[bbb]),
            }
        }
        0x02 => decode_group2(opcode, aaa, bbb),
        _ => decode_group0(opcode, aaa, bbb),
    }
}

fn decode_group2(opcode: u8, aaa: usize, bbb: usize) -> (Instruction, Mode) {
    use Instruction::*;

    match bbb {
        0 => match aaa {
            5 => (Ldx, Mode::Immediate),
            4 | 6 | 7 => (Nop, Mode::Immediate),
            _ => (Jam, Mode::Implied),
        },
        4 => (Jam, Mode::Implied),
        2 => match aaa {
            0 => (Asl, Mode::Accumulator),
            1 => (Rol, Mode::Accumulator),
            2 => (Lsr, Mode::Accumulator),
            3 => (Ror, Mode::Accumulator),
            4 => (Txa, Mode::Implied),
            5 => (Tax, Mode::Implied),
            6 => (Dex, Mode::Implied),
            _ => (Nop, Mode::Implied),
        },
        6 => match aaa {
            4 => (Txs, Mode::Implied),
            5 => (Tsx, Mode::Implied),
            _ => (Nop, Mode::Implied),
        },
        _ => {
            if opcode == 0x9E {
                return (Shx, Mode::AbsoluteY);
            }
            // STX and LDX index with Y where the others use X.
            let uses_y = aaa == 4 || aaa == 5;
            let mode = match bbb {
                1 => Mode::ZeroPage,
                3 => Mode::Absolute,
                5 if uses_y => Mode::ZeroPageY,
                5 => Mode::ZeroPageX,
                _ if uses_y => Mode::AbsoluteY,
                _ => Mode::AbsoluteX,
            };
            ([Asl, Rol, Lsr, Ror, Stx, Ldx, Dec, Inc][aaa], mode)
        }
    }
}

fn decode_group0(opcode: u8, aaa: usize, bbb: usize) -> (Instruction, Mode) {
    use Instruction::*;

    match opcode {
        0x00 => (Brk, Mode::Implied),
        0x20 => (Jsr, Mode::Absolute),
        0x40 => (Rti, Mode::Implied),
        0x60 => (Rts, Mode::Implied),
        0x08 => (Php, Mode::Implied),
        0x28 => (Plp, Mode::Implied),
        0x48 => (Pha, Mode::Implied),
        0x68 => (Pla, Mode::Implied),
        0x88 => (Dey, Mode::Implied),
        0xA8 => (Tay, Mode::Implied),
        0xC8 => (Iny, Mode::Implied),
        0xE8 => (Inx, Mode::Implied),
        0x18 => (Clc, Mode::Implied),
        0x38 => (Sec, Mode::Implied),
        0x58 => (Cli, Mode::Implied),
        0x78 => (Sei, Mode::Implied),
        0x98 => (Tya, Mode::Implied),
        0xB8 => (Clv, Mode::Implied),
        0xD8 => (Cld, Mode::Implied),
        0xF8 => (Sed, Mode::Implied),
        0x24 => (Bit, Mode::ZeroPage),
        0x2C => (Bit, Mode::Absolute),
        0x4C => (Jmp, Mode::Absolute),
        0x6C => (Jmp, Mode::Indirect),
        0x84 => (Sty, Mode::ZeroPage),
        0x8C => (Sty, Mode::Absolute),
        0x94 => (Sty, Mode::ZeroPageX),
        0x9C => (Shy, Mode::AbsoluteX),
        0xA0 => (Ldy, Mode::Immediate),
        0xA4 => (Ldy, Mode::ZeroPage),
        0xAC => (Ldy, Mode::Absolute),
        0xB4 => (Ldy, Mode::ZeroPageX),
        0xBC => (Ldy, Mode::AbsoluteX),
        0xC0 => (Cpy, Mode::Immediate),
        0xC4 => (Cpy, Mode::ZeroPage),
        0xCC => (Cpy, Mode::Absolute),
        0xE0 => (Cpx, Mode::Immediate),
        0xE4 => (Cpx, Mode::ZeroPage),
        0xEC => (Cpx, Mode::Absolute),
        _ if bbb == 4 => ([Bpl, Bmi, Bvc, Bvs, Bcc, Bcs, Bne, Beq][aaa], Mode::Relative),
        _ => {
            let mode = match bbb {
                0 => Mode::Immediate,
                1 => Mode::ZeroPage,
                3 => Mode::Absolute,
                5 => Mode::ZeroPageX,
                7 => Mode::AbsoluteX,
                _ => Mode::Implied,
            };
            (Nop, mode)
        }
    }
}
