// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Static instruction table for the virtual instruction set.
//!
//! Each entry describes one mnemonic: the opcode family carried in the
//! low nibble of the first encoded byte, the ordered operand list, the
//! fixed encoded size, and the packing layout used by the encoder.

/// Opcode family values (low nibble of the first instruction byte).
pub const OP_LC: u8 = 0;
pub const OP_CPY: u8 = 1;
pub const OP_ADD: u8 = 2;
pub const OP_SUB: u8 = 3;
pub const OP_AND: u8 = 4;
pub const OP_OR: u8 = 5;
pub const OP_XOR: u8 = 6;
pub const OP_LD: u8 = 7;
pub const OP_ST: u8 = 8;
pub const OP_BX: u8 = 9;
pub const OP_ADC: u8 = 10;
pub const OP_SBC: u8 = 11;
pub const OP_JS: u8 = 12;
pub const OP_JSS: u8 = 13;
pub const OP_RET: u8 = 14;
pub const OP_SYS: u8 = 15;

/// Condition code for an unconditional branch.
pub const COND_ALWAYS: u8 = 7;
/// Condition slot 0 re-encodes the branch family as bitwise NOT.
pub const COND_NOT: u8 = 0;

/// Operand kinds accepted by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Register,
    Byte,
    Shift,
    Address,
    SysSelector,
    LabelRef,
}

impl ArgKind {
    /// Single-letter prefix used in operand descriptors and messages.
    pub fn letter(self) -> char {
        match self {
            ArgKind::Register => 'R',
            ArgKind::Byte => 'B',
            ArgKind::Shift => 'S',
            ArgKind::Address => 'A',
            ArgKind::SysSelector => 'H',
            ArgKind::LabelRef => 'L',
        }
    }

    /// Inclusive lower and exclusive upper value limit, or `None` for
    /// operands that are not numerically validated (label references).
    pub fn limits(self) -> Option<(i64, i64)> {
        match self {
            ArgKind::Register => Some((0, 16)),
            ArgKind::Byte => Some((-128, 256)),
            ArgKind::Shift => Some((-7, 16)),
            ArgKind::Address => Some((0, 0x10000)),
            ArgKind::SysSelector => Some((0, 16)),
            ArgKind::LabelRef => None,
        }
    }
}

/// One operand slot in an instruction descriptor.
#[derive(Debug, Clone, Copy)]
pub struct Arg {
    pub kind: ArgKind,
    pub name: &'static str,
    pub optional: bool,
}

impl Arg {
    const fn req(kind: ArgKind, name: &'static str) -> Self {
        Self {
            kind,
            name,
            optional: false,
        }
    }

    const fn opt(kind: ArgKind, name: &'static str) -> Self {
        Self {
            kind,
            name,
            optional: true,
        }
    }

    /// Descriptor string, e.g. `Rdest` or `Sshift?`.
    pub fn descriptor(&self) -> String {
        let mut s = format!("{}{}", self.kind.letter(), self.name);
        if self.optional {
            s.push('?');
        }
        s
    }
}

/// Byte-packing layout selected at encode time.
///
/// The opcode-9 overloads (`b`, `not`, and the conditional branches)
/// are distinct table entries with distinct layouts, so no layout is
/// ever reconstructed from the condition nibble during encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// `op | dest << 4`, immediate byte.
    LoadConst,
    /// `op | dest << 4`, `src | shift << 4` with shift defaulting to 0.
    Copy,
    /// `op | dest << 4`, `first | second << 4`.
    ThreeReg,
    /// Like `ThreeReg` but the high register defaults to `low + 1`.
    LoadStore,
    /// `op` (condition 0), `dest | src << 4`.
    TwoReg,
    /// `op | value << 4`.
    OneReg,
    /// `op | cond << 4`, offset byte, `first | second << 4`.
    CondBranch,
    /// `op | 7 << 4`, offset byte.
    Branch,
    /// `op | nparams << 4`, target low byte, target high byte.
    CallAbs,
    /// `op | nparams << 4`, offset byte.
    CallRel,
    /// `op | nparams << 4` with nparams from the enclosing subroutine.
    Return,
}

/// Immutable descriptor for one mnemonic.
#[derive(Debug)]
pub struct InstructionEntry {
    pub mnemonic: &'static str,
    pub opcode: u8,
    pub args: &'static [Arg],
    pub size: u32,
    pub encoding: Encoding,
}

impl InstructionEntry {
    /// Number of operands that must be present.
    pub fn required_args(&self) -> usize {
        self.args.iter().filter(|a| !a.optional).count()
    }
}

pub static INSTRUCTION_TABLE: &[InstructionEntry] = &[
    InstructionEntry {
        mnemonic: "lc",
        opcode: OP_LC,
        args: &[
            Arg::req(ArgKind::Register, "dest"),
            Arg::req(ArgKind::Byte, "value"),
        ],
        size: 2,
        encoding: Encoding::LoadConst,
    },
    InstructionEntry {
        mnemonic: "cpy",
        opcode: OP_CPY,
        args: &[
            Arg::req(ArgKind::Register, "dest"),
            Arg::req(ArgKind::Register, "src"),
            Arg::opt(ArgKind::Shift, "shift"),
        ],
        size: 2,
        encoding: Encoding::Copy,
    },
    InstructionEntry {
        mnemonic: "add",
        opcode: OP_ADD,
        args: &[
            Arg::req(ArgKind::Register, "dest"),
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
        ],
        size: 2,
        encoding: Encoding::ThreeReg,
    },
    InstructionEntry {
        mnemonic: "sub",
        opcode: OP_SUB,
        args: &[
            Arg::req(ArgKind::Register, "dest"),
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
        ],
        size: 2,
        encoding: Encoding::ThreeReg,
    },
    InstructionEntry {
        mnemonic: "and",
        opcode: OP_AND,
        args: &[
            Arg::req(ArgKind::Register, "dest"),
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
        ],
        size: 2,
        encoding: Encoding::ThreeReg,
    },
    InstructionEntry {
        mnemonic: "or",
        opcode: OP_OR,
        args: &[
            Arg::req(ArgKind::Register, "dest"),
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
        ],
        size: 2,
        encoding: Encoding::ThreeReg,
    },
    InstructionEntry {
        mnemonic: "xor",
        opcode: OP_XOR,
        args: &[
            Arg::req(ArgKind::Register, "dest"),
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
        ],
        size: 2,
        encoding: Encoding::ThreeReg,
    },
    InstructionEntry {
        mnemonic: "ld",
        opcode: OP_LD,
        args: &[
            Arg::req(ArgKind::Register, "dest"),
            Arg::req(ArgKind::Register, "low"),
            Arg::opt(ArgKind::Register, "high"),
        ],
        size: 2,
        encoding: Encoding::LoadStore,
    },
    InstructionEntry {
        mnemonic: "st",
        opcode: OP_ST,
        args: &[
            Arg::req(ArgKind::Register, "src"),
            Arg::req(ArgKind::Register, "low"),
            Arg::opt(ArgKind::Register, "high"),
        ],
        size: 2,
        encoding: Encoding::LoadStore,
    },
    InstructionEntry {
        mnemonic: "beq",
        opcode: OP_BX,
        args: &[
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
            Arg::req(ArgKind::LabelRef, "label"),
        ],
        size: 3,
        encoding: Encoding::CondBranch,
    },
    InstructionEntry {
        mnemonic: "bne",
        opcode: OP_BX,
        args: &[
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
            Arg::req(ArgKind::LabelRef, "label"),
        ],
        size: 3,
        encoding: Encoding::CondBranch,
    },
    InstructionEntry {
        mnemonic: "blt",
        opcode: OP_BX,
        args: &[
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
            Arg::req(ArgKind::LabelRef, "label"),
        ],
        size: 3,
        encoding: Encoding::CondBranch,
    },
    InstructionEntry {
        mnemonic: "ble",
        opcode: OP_BX,
        args: &[
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
            Arg::req(ArgKind::LabelRef, "label"),
        ],
        size: 3,
        encoding: Encoding::CondBranch,
    },
    InstructionEntry {
        mnemonic: "bgt",
        opcode: OP_BX,
        args: &[
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
            Arg::req(ArgKind::LabelRef, "label"),
        ],
        size: 3,
        encoding: Encoding::CondBranch,
    },
    InstructionEntry {
        mnemonic: "bge",
        opcode: OP_BX,
        args: &[
            Arg::req(ArgKind::Register, "first"),
            Arg::req(ArgKind::Register, "second"),
            Arg::req(ArgKind::LabelRef, "label"),
        ],
        size: 3,
        encoding: Encoding::CondBranch,
    },
    // Unconditional branch: condition slot 7, no register comparison.
    InstructionEntry {
        mnemonic: "b",
        opcode: OP_BX,
        args: &[Arg::req(ArgKind::LabelRef, "label")],
        size: 2,
        encoding: Encoding::Branch,
    },
    // Bitwise NOT reuses the branch family with condition slot 0.
    InstructionEntry {
        mnemonic: "not",
        opcode: OP_BX,
        args: &[
            Arg::req(ArgKind::Register, "dest"),
            Arg::req(ArgKind::Register, "src"),
        ],
        size: 2,
        encoding: Encoding::TwoReg,
    },
    InstructionEntry {
        mnemonic: "adc",
        opcode: OP_ADC,
        args: &[Arg::req(ArgKind::Register, "dest")],
        size: 1,
        encoding: Encoding::OneReg,
    },
    InstructionEntry {
        mnemonic: "sbc",
        opcode: OP_SBC,
        args: &[Arg::req(ArgKind::Register, "dest")],
        size: 1,
        encoding: Encoding::OneReg,
    },
    InstructionEntry {
        mnemonic: "js",
        opcode: OP_JS,
        args: &[Arg::req(ArgKind::LabelRef, "label")],
        size: 3,
        encoding: Encoding::CallAbs,
    },
    InstructionEntry {
        mnemonic: "jss",
        opcode: OP_JSS,
        args: &[Arg::req(ArgKind::LabelRef, "label")],
        size: 2,
        encoding: Encoding::CallRel,
    },
    InstructionEntry {
        mnemonic: "ret",
        opcode: OP_RET,
        args: &[],
        size: 1,
        encoding: Encoding::Return,
    },
    InstructionEntry {
        mnemonic: "sys",
        opcode: OP_SYS,
        args: &[Arg::req(ArgKind::SysSelector, "value")],
        size: 1,
        encoding: Encoding::OneReg,
    },
];

pub fn lookup_instruction(mnemonic: &str) -> Option<&'static InstructionEntry> {
    INSTRUCTION_TABLE
        .iter()
        .find(|entry| entry.mnemonic.eq_ignore_ascii_case(mnemonic))
}

/// Condition code for a conditional branch mnemonic.
///
/// Bit 0 is set for "negative", bit 1 for "zero", bit 2 for "positive"
/// results of the signed register comparison performed at run time.
pub fn condition_code(mnemonic: &str) -> Option<u8> {
    let code = match mnemonic.to_ascii_lowercase().as_str() {
        "blt" => 0b001,
        "beq" => 0b010,
        "ble" => 0b011,
        "bgt" => 0b100,
        "bne" => 0b101,
        "bge" => 0b110,
        _ => return None,
    };
    Some(code)
}

/// Mnemonic for a decoded condition code.
pub fn condition_mnemonic(code: u8) -> Option<&'static str> {
    let name = match code {
        0b001 => "blt",
        0b010 => "beq",
        0b011 => "ble",
        0b100 => "bgt",
        0b101 => "bne",
        0b110 => "bge",
        COND_ALWAYS => "b",
        _ => return None,
    };
    Some(name)
}
