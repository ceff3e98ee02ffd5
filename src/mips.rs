//! MIPS instruction decoding.
//!
//! Overlay text sections are VR4300 (MIPS III) code stored as big-endian
//! words. This module decodes a 32-bit word into a typed [`Instruction`],
//! re-encodes it bit-exactly, and classifies the instruction forms the
//! normalization passes care about (LUI pairs, absolute jumps, NOPs).
//!
//! Decoding is total: unmapped codes still decode and render a synthetic
//! mnemonic embedding the raw value.

/// MIPS primary opcodes.
pub mod opcode {
    pub const SPECIAL: u8 = 0x00;
    pub const REGIMM: u8 = 0x01;
    pub const J: u8 = 0x02;
    pub const JAL: u8 = 0x03;
    pub const BEQ: u8 = 0x04;
    pub const BNE: u8 = 0x05;
    pub const BLEZ: u8 = 0x06;
    pub const BGTZ: u8 = 0x07;
    pub const ADDI: u8 = 0x08;
    pub const ADDIU: u8 = 0x09;
    pub const SLTI: u8 = 0x0A;
    pub const SLTIU: u8 = 0x0B;
    pub const ANDI: u8 = 0x0C;
    pub const ORI: u8 = 0x0D;
    pub const XORI: u8 = 0x0E;
    pub const LUI: u8 = 0x0F;
    pub const COP0: u8 = 0x10;
    pub const COP1: u8 = 0x11;
    pub const COP2: u8 = 0x12;
    pub const BEQL: u8 = 0x14;
    pub const BNEL: u8 = 0x15;
    pub const BLEZL: u8 = 0x16;
    pub const BGTZL: u8 = 0x17;
    pub const DADDI: u8 = 0x18;
    pub const DADDIU: u8 = 0x19;
    pub const LDL: u8 = 0x1A;
    pub const LDR: u8 = 0x1B;
    pub const LB: u8 = 0x20;
    pub const LH: u8 = 0x21;
    pub const LWL: u8 = 0x22;
    pub const LW: u8 = 0x23;
    pub const LBU: u8 = 0x24;
    pub const LHU: u8 = 0x25;
    pub const LWR: u8 = 0x26;
    pub const LWU: u8 = 0x27;
    pub const SB: u8 = 0x28;
    pub const SH: u8 = 0x29;
    pub const SWL: u8 = 0x2A;
    pub const SW: u8 = 0x2B;
    pub const SDL: u8 = 0x2C;
    pub const SDR: u8 = 0x2D;
    pub const SWR: u8 = 0x2E;
    pub const CACHE: u8 = 0x2F;
    pub const LL: u8 = 0x30;
    pub const LWC1: u8 = 0x31;
    pub const LWC2: u8 = 0x32;
    pub const LLD: u8 = 0x34;
    pub const LDC1: u8 = 0x35;
    pub const LDC2: u8 = 0x36;
    pub const LD: u8 = 0x37;
    pub const SC: u8 = 0x38;
    pub const SWC1: u8 = 0x39;
    pub const SWC2: u8 = 0x3A;
    pub const SCD: u8 = 0x3C;
    pub const SDC1: u8 = 0x3D;
    pub const SDC2: u8 = 0x3E;
    pub const SD: u8 = 0x3F;
}

/// MIPS SPECIAL function codes.
pub mod funct {
    pub const SLL: u8 = 0x00;
    pub const SRL: u8 = 0x02;
    pub const SRA: u8 = 0x03;
    pub const SLLV: u8 = 0x04;
    pub const SRLV: u8 = 0x06;
    pub const SRAV: u8 = 0x07;
    pub const JR: u8 = 0x08;
    pub const JALR: u8 = 0x09;
    pub const SYSCALL: u8 = 0x0C;
    pub const BREAK: u8 = 0x0D;
    pub const SYNC: u8 = 0x0F;
    pub const MFHI: u8 = 0x10;
    pub const MTHI: u8 = 0x11;
    pub const MFLO: u8 = 0x12;
    pub const MTLO: u8 = 0x13;
    pub const DSLLV: u8 = 0x14;
    pub const DSRLV: u8 = 0x16;
    pub const DSRAV: u8 = 0x17;
    pub const MULT: u8 = 0x18;
    pub const MULTU: u8 = 0x19;
    pub const DIV: u8 = 0x1A;
    pub const DIVU: u8 = 0x1B;
    pub const DMULT: u8 = 0x1C;
    pub const DMULTU: u8 = 0x1D;
    pub const DDIV: u8 = 0x1E;
    pub const DDIVU: u8 = 0x1F;
    pub const ADD: u8 = 0x20;
    pub const ADDU: u8 = 0x21;
    pub const SUB: u8 = 0x22;
    pub const SUBU: u8 = 0x23;
    pub const AND: u8 = 0x24;
    pub const OR: u8 = 0x25;
    pub const XOR: u8 = 0x26;
    pub const NOR: u8 = 0x27;
    pub const SLT: u8 = 0x2A;
    pub const SLTU: u8 = 0x2B;
    pub const DADD: u8 = 0x2C;
    pub const DADDU: u8 = 0x2D;
    pub const DSUB: u8 = 0x2E;
    pub const DSUBU: u8 = 0x2F;
    pub const TGE: u8 = 0x30;
    pub const TGEU: u8 = 0x31;
    pub const TLT: u8 = 0x32;
    pub const TLTU: u8 = 0x33;
    pub const TEQ: u8 = 0x34;
    pub const TNE: u8 = 0x36;
    pub const DSLL: u8 = 0x38;
    pub const DSRL: u8 = 0x3A;
    pub const DSRA: u8 = 0x3B;
    pub const DSLL32: u8 = 0x3C;
    pub const DSRL32: u8 = 0x3E;
    pub const DSRA32: u8 = 0x3F;
}

/// MIPS REGIMM rt codes.
pub mod regimm {
    pub const BLTZ: u8 = 0x00;
    pub const BGEZ: u8 = 0x01;
    pub const BLTZL: u8 = 0x02;
    pub const BGEZL: u8 = 0x03;
    pub const TGEI: u8 = 0x08;
    pub const TGEIU: u8 = 0x09;
    pub const TLTI: u8 = 0x0A;
    pub const TLTIU: u8 = 0x0B;
    pub const TEQI: u8 = 0x0C;
    pub const TNEI: u8 = 0x0E;
    pub const BLTZAL: u8 = 0x10;
    pub const BGEZAL: u8 = 0x11;
    pub const BLTZALL: u8 = 0x12;
    pub const BGEZALL: u8 = 0x13;
}

/// Common MIPS patterns.
pub mod patterns {
    pub const NOP: u32 = 0x0000_0000; // sll $0, $0, 0
    pub const JR_RA: u32 = 0x03E0_0008; // jr $ra
}

/// Mnemonic for a primary opcode, if mapped.
fn normal_mnemonic(op: u8) -> Option<&'static str> {
    use self::opcode::*;
    Some(match op {
        J => "j",
        JAL => "jal",
        BEQ => "beq",
        BNE => "bne",
        BLEZ => "blez",
        BGTZ => "bgtz",
        ADDI => "addi",
        ADDIU => "addiu",
        SLTI => "slti",
        SLTIU => "sltiu",
        ANDI => "andi",
        ORI => "ori",
        XORI => "xori",
        LUI => "lui",
        COP0 => "cop0",
        COP1 => "cop1",
        COP2 => "cop2",
        BEQL => "beql",
        BNEL => "bnel",
        BLEZL => "blezl",
        BGTZL => "bgtzl",
        DADDI => "daddi",
        DADDIU => "daddiu",
        LDL => "ldl",
        LDR => "ldr",
        LB => "lb",
        LH => "lh",
        LWL => "lwl",
        LW => "lw",
        LBU => "lbu",
        LHU => "lhu",
        LWR => "lwr",
        LWU => "lwu",
        SB => "sb",
        SH => "sh",
        SWL => "swl",
        SW => "sw",
        SDL => "sdl",
        SDR => "sdr",
        SWR => "swr",
        CACHE => "cache",
        LL => "ll",
        LWC1 => "lwc1",
        LWC2 => "lwc2",
        LLD => "lld",
        LDC1 => "ldc1",
        LDC2 => "ldc2",
        LD => "ld",
        SC => "sc",
        SWC1 => "swc1",
        SWC2 => "swc2",
        SCD => "scd",
        SDC1 => "sdc1",
        SDC2 => "sdc2",
        SD => "sd",
        _ => return None,
    })
}

/// Mnemonic for a SPECIAL function code, if mapped.
fn special_mnemonic(fn_code: u8) -> Option<&'static str> {
    use self::funct::*;
    Some(match fn_code {
        SLL => "sll",
        SRL => "srl",
        SRA => "sra",
        SLLV => "sllv",
        SRLV => "srlv",
        SRAV => "srav",
        JR => "jr",
        JALR => "jalr",
        SYSCALL => "syscall",
        BREAK => "break",
        SYNC => "sync",
        MFHI => "mfhi",
        MTHI => "mthi",
        MFLO => "mflo",
        MTLO => "mtlo",
        DSLLV => "dsllv",
        DSRLV => "dsrlv",
        DSRAV => "dsrav",
        MULT => "mult",
        MULTU => "multu",
        DIV => "div",
        DIVU => "divu",
        DMULT => "dmult",
        DMULTU => "dmultu",
        DDIV => "ddiv",
        DDIVU => "ddivu",
        ADD => "add",
        ADDU => "addu",
        SUB => "sub",
        SUBU => "subu",
        AND => "and",
        OR => "or",
        XOR => "xor",
        NOR => "nor",
        SLT => "slt",
        SLTU => "sltu",
        DADD => "dadd",
        DADDU => "daddu",
        DSUB => "dsub",
        DSUBU => "dsubu",
        TGE => "tge",
        TGEU => "tgeu",
        TLT => "tlt",
        TLTU => "tltu",
        TEQ => "teq",
        TNE => "tne",
        DSLL => "dsll",
        DSRL => "dsrl",
        DSRA => "dsra",
        DSLL32 => "dsll32",
        DSRL32 => "dsrl32",
        DSRA32 => "dsra32",
        _ => return None,
    })
}

/// Mnemonic for a REGIMM rt code, if mapped.
fn regimm_mnemonic(rt: u8) -> Option<&'static str> {
    use self::regimm::*;
    Some(match rt {
        BLTZ => "bltz",
        BGEZ => "bgez",
        BLTZL => "bltzl",
        BGEZL => "bgezl",
        TGEI => "tgei",
        TGEIU => "tgeiu",
        TLTI => "tlti",
        TLTIU => "tltiu",
        TEQI => "teqi",
        TNEI => "tnei",
        BLTZAL => "bltzal",
        BGEZAL => "bgezal",
        BLTZALL => "bltzall",
        BGEZALL => "bgezall",
        _ => return None,
    })
}

/// Which mnemonic table an instruction resolves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrKind {
    /// Primary-opcode instruction.
    Normal,
    /// Opcode 0: mnemonic keyed by the `function` field.
    Special,
    /// Opcode 1: mnemonic keyed by the `rt` field.
    Regimm,
}

/// A decoded MIPS instruction.
///
/// All six bit-fields of the 32-bit encoding are stored; re-encoding the
/// fields always reproduces the original word unless fields were
/// explicitly blanked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Mnemonic table selector.
    pub kind: InstrKind,
    /// Primary opcode, bits [31:26].
    pub opcode: u8,
    /// Source register, bits [25:21].
    pub rs: u8,
    /// Target register, bits [20:16].
    pub rt: u8,
    /// Destination register, bits [15:11].
    pub rd: u8,
    /// Shift amount, bits [10:6].
    pub sa: u8,
    /// Function code, bits [5:0].
    pub function: u8,
}

impl Instruction {
    /// Decode a 32-bit word. Never fails.
    pub fn decode(word: u32) -> Self {
        let op = ((word >> 26) & 0x3F) as u8;
        let kind = match op {
            opcode::SPECIAL => InstrKind::Special,
            opcode::REGIMM => InstrKind::Regimm,
            _ => InstrKind::Normal,
        };
        Self {
            kind,
            opcode: op,
            rs: ((word >> 21) & 0x1F) as u8,
            rt: ((word >> 16) & 0x1F) as u8,
            rd: ((word >> 11) & 0x1F) as u8,
            sa: ((word >> 6) & 0x1F) as u8,
            function: (word & 0x3F) as u8,
        }
    }

    /// Re-encode the stored fields. Exact inverse of [`decode`](Self::decode).
    pub fn encode(&self) -> u32 {
        (u32::from(self.opcode) << 26)
            | (u32::from(self.rs) << 21)
            | (u32::from(self.rt) << 16)
            | (u32::from(self.rd) << 11)
            | (u32::from(self.sa) << 6)
            | u32::from(self.function)
    }

    /// 16-bit immediate field (rd/sa/function bits).
    pub fn immediate(&self) -> u16 {
        (self.encode() & 0xFFFF) as u16
    }

    /// 26-bit jump target index (rs/rt/immediate bits).
    pub fn jump_target(&self) -> u32 {
        self.encode() & 0x03FF_FFFF
    }

    /// Base register of a memory/immediate operand (`rs`).
    pub fn base_register(&self) -> u8 {
        self.rs
    }

    /// Mnemonic, looked up through the table this instruction's kind
    /// selects. Unmapped codes get a synthetic name embedding the raw
    /// value, so rendering never fails.
    pub fn mnemonic(&self) -> String {
        match self.kind {
            InstrKind::Normal => normal_mnemonic(self.opcode)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("op_0x{:02X}", self.opcode)),
            InstrKind::Special => special_mnemonic(self.function)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("special_0x{:02X}", self.function)),
            InstrKind::Regimm => regimm_mnemonic(self.rt)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("regimm_0x{:02X}", self.rt)),
        }
    }

    /// Whether two instructions share a mnemonic class (same table, same
    /// selector), regardless of operand fields.
    pub fn same_mnemonic(&self, other: &Self) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match self.kind {
            InstrKind::Normal => self.opcode == other.opcode,
            InstrKind::Special => self.function == other.function,
            InstrKind::Regimm => self.rt == other.rt,
        }
    }

    /// True for any branch or jump form (conditional branches, likely
    /// branches, REGIMM branches, J/JAL, JR/JALR).
    pub fn is_branch_or_jump(&self) -> bool {
        match self.kind {
            InstrKind::Normal => matches!(
                self.opcode,
                opcode::J
                    | opcode::JAL
                    | opcode::BEQ
                    | opcode::BNE
                    | opcode::BLEZ
                    | opcode::BGTZ
                    | opcode::BEQL
                    | opcode::BNEL
                    | opcode::BLEZL
                    | opcode::BGTZL
            ),
            InstrKind::Special => matches!(self.function, funct::JR | funct::JALR),
            InstrKind::Regimm => matches!(
                self.rt,
                regimm::BLTZ
                    | regimm::BGEZ
                    | regimm::BLTZL
                    | regimm::BGEZL
                    | regimm::BLTZAL
                    | regimm::BGEZAL
                    | regimm::BLTZALL
                    | regimm::BGEZALL
            ),
        }
    }

    /// True for J/JAL: the address is encoded as a 26-bit index.
    pub fn is_jump_absolute(&self) -> bool {
        self.kind == InstrKind::Normal && matches!(self.opcode, opcode::J | opcode::JAL)
    }

    /// True for LUI.
    pub fn is_load_upper(&self) -> bool {
        self.kind == InstrKind::Normal && self.opcode == opcode::LUI
    }

    /// True for the instruction classes that typically consume a
    /// LUI-produced base register to form an address.
    pub fn is_address_forming(&self) -> bool {
        self.kind == InstrKind::Normal
            && matches!(
                self.opcode,
                opcode::ADDIU
                    | opcode::LW
                    | opcode::LWU
                    | opcode::LWC1
                    | opcode::LWC2
                    | opcode::ORI
                    | opcode::LH
                    | opcode::LHU
                    | opcode::LB
                    | opcode::LBU
            )
    }

    /// True for the all-zero NOP encoding.
    pub fn is_nop(&self) -> bool {
        self.encode() == patterns::NOP
    }

    /// True for `jr $ra`, the function epilogue.
    pub fn is_return(&self) -> bool {
        self.encode() == patterns::JR_RA
    }

    /// Reset to the all-zero-operand NOP encoding.
    pub fn blank_out(&mut self) {
        *self = Self::decode(patterns::NOP);
    }

    /// Zero only the 26-bit jump target field, keeping the opcode.
    pub fn clear_jump_target(&mut self) {
        self.rs = 0;
        self.rt = 0;
        self.rd = 0;
        self.sa = 0;
        self.function = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // A representative sample across all three variants plus unmapped codes.
    const SAMPLE: &[u32] = &[
        0x0000_0000, // nop (sll $0, $0, 0)
        0x03E0_0008, // jr $ra
        0x0000_000C, // syscall
        0x3C08_8012, // lui $t0, 0x8012
        0x2509_3456, // addiu $t1, $t0, 0x3456
        0x8D09_0010, // lw $t1, 0x10($t0)
        0x0C00_0400, // jal 0x1000
        0x0800_0400, // j 0x1000
        0x1000_0003, // beq $0, $0, +3
        0x0411_0002, // bgezal $0, +2 (bal)
        0x0062_1821, // addu $v1, $v1, $v0
        0xBC6D_0000, // cache 0x0D, 0($v1)
        0xFFFF_FFFF, // sd $ra, -1($ra) - still decodes
        0x7000_0000, // unmapped primary opcode 0x1C
        0x0000_0001, // unmapped SPECIAL function 0x01
        0x0415_0000, // unmapped REGIMM rt 0x15
    ];

    #[test]
    fn test_round_trip() {
        for &word in SAMPLE {
            let instr = Instruction::decode(word);
            assert_eq!(instr.encode(), word, "word {word:#010X}");
        }
    }

    #[test]
    fn test_kind_selection() {
        assert_eq!(Instruction::decode(0x0000_000C).kind, InstrKind::Special);
        assert_eq!(Instruction::decode(0x0411_0002).kind, InstrKind::Regimm);
        assert_eq!(Instruction::decode(0x3C08_8012).kind, InstrKind::Normal);
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(Instruction::decode(0x3C08_8012).mnemonic(), "lui");
        assert_eq!(Instruction::decode(0x03E0_0008).mnemonic(), "jr");
        assert_eq!(Instruction::decode(0x0411_0002).mnemonic(), "bgezal");
        assert_eq!(Instruction::decode(0x0000_0000).mnemonic(), "sll");
    }

    #[test]
    fn test_synthetic_mnemonics_for_unmapped_codes() {
        assert_eq!(Instruction::decode(0x7000_0000).mnemonic(), "op_0x1C");
        assert_eq!(Instruction::decode(0x0000_0001).mnemonic(), "special_0x01");
        assert_eq!(Instruction::decode(0x0415_0000).mnemonic(), "regimm_0x15");
    }

    #[test]
    fn test_immediate_and_jump_target() {
        let lui = Instruction::decode(0x3C08_8012);
        assert_eq!(lui.immediate(), 0x8012);

        let jal = Instruction::decode(0x0C00_0400);
        assert_eq!(jal.jump_target(), 0x400);
    }

    #[test]
    fn test_predicates() {
        assert!(Instruction::decode(0x3C08_8012).is_load_upper());
        assert!(Instruction::decode(0x2509_3456).is_address_forming());
        assert!(Instruction::decode(0x8D09_0010).is_address_forming());
        assert!(Instruction::decode(0x0C00_0400).is_jump_absolute());
        assert!(Instruction::decode(0x0800_0400).is_jump_absolute());
        assert!(Instruction::decode(0x1000_0003).is_branch_or_jump());
        assert!(Instruction::decode(0x0411_0002).is_branch_or_jump());
        assert!(Instruction::decode(0x03E0_0008).is_branch_or_jump());
        assert!(Instruction::decode(0x0000_0000).is_nop());
        assert!(Instruction::decode(0x03E0_0008).is_return());
        assert!(!Instruction::decode(0x0062_1821).is_branch_or_jump());
    }

    #[test]
    fn test_blank_out_is_nop() {
        let mut instr = Instruction::decode(0x2509_3456);
        instr.blank_out();
        assert!(instr.is_nop());
        assert_eq!(instr.encode(), 0);
    }

    #[test]
    fn test_clear_jump_target_keeps_opcode() {
        let mut jal = Instruction::decode(0x0C12_3456);
        jal.clear_jump_target();
        assert_eq!(jal.encode(), 0x0C00_0000);
        assert_eq!(jal.mnemonic(), "jal");
        assert_eq!(jal.jump_target(), 0);
    }

    #[test]
    fn test_same_mnemonic() {
        let a = Instruction::decode(0x2509_3456); // addiu $t1, $t0, 0x3456
        let b = Instruction::decode(0x2442_0001); // addiu $v0, $v0, 1
        let c = Instruction::decode(0x8D09_0010); // lw
        assert!(a.same_mnemonic(&b));
        assert!(!a.same_mnemonic(&c));

        // Same selector value through different tables is not a match.
        let sll8 = Instruction::decode(0x0000_0200); // sll $0, $0, 8
        let j = Instruction::decode(0x0800_0000);
        assert!(!sll8.same_mnemonic(&j));
    }
}
