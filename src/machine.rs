// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Fetch/decode/execute core for the virtual instruction set.
//!
//! The machine owns its program image, a 128-byte stack whose tail
//! serves as the current register window, an 8-entry return-address
//! stack, and a single carry/borrow flag. Arithmetic wraps modulo 256.

use std::fmt;
use std::io::{self, Write};

use crate::image::MemoryImage;
use crate::instructions::{
    condition_mnemonic, COND_ALWAYS, COND_NOT, OP_ADC, OP_ADD, OP_AND, OP_BX, OP_CPY, OP_JS,
    OP_JSS, OP_LC, OP_LD, OP_OR, OP_RET, OP_SBC, OP_ST, OP_SUB, OP_SYS, OP_XOR,
};

pub const STACK_SIZE: usize = 128;
pub const WINDOW_SIZE: usize = 16;
pub const RETURN_STACK_SIZE: usize = 8;

/// System call selectors with fixed meanings. Unrecognized selectors
/// are no-ops.
pub const SYS_HALT: u8 = 0;
pub const SYS_PUTC: u8 = 1;
pub const SYS_DUMP: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Halted,
}

#[derive(Debug)]
pub enum RuntimeError {
    RegisterWindowOutOfRange { pc: u16, index: i32 },
    ReturnStackOverflow { pc: u16 },
    ReturnStackUnderflow { pc: u16 },
    Io(io::Error),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisterWindowOutOfRange { pc, index } => {
                write!(
                    f,
                    "register window index {index} out of range at pc=0x{pc:04x}"
                )
            }
            Self::ReturnStackOverflow { pc } => {
                write!(f, "return stack overflow at pc=0x{pc:04x}")
            }
            Self::ReturnStackUnderflow { pc } => {
                write!(f, "return stack underflow at pc=0x{pc:04x}")
            }
            Self::Io(err) => write!(f, "i/o error: {err}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<io::Error> for RuntimeError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Lc { dest: u8, value: u8 },
    Cpy { dest: u8, src: u8, shift: u8 },
    Add { dest: u8, first: u8, second: u8 },
    Sub { dest: u8, first: u8, second: u8 },
    And { dest: u8, first: u8, second: u8 },
    Or { dest: u8, first: u8, second: u8 },
    Xor { dest: u8, first: u8, second: u8 },
    Ld { dest: u8, low: u8, high: u8 },
    St { src: u8, low: u8, high: u8 },
    Not { dest: u8, src: u8 },
    Branch { offset: i8 },
    CondBranch { cond: u8, offset: i8, first: u8, second: u8 },
    Adc { dest: u8 },
    Sbc { dest: u8 },
    Js { params: u8, target: u16 },
    Jss { params: u8, offset: i8 },
    Ret { params: u8 },
    Sys { selector: u8 },
}

impl Op {
    /// Decode the instruction at `pc`.
    pub fn decode(image: &MemoryImage, pc: u16) -> Op {
        let opcode = image.load(pc);
        let hi = opcode >> 4;
        let operand = image.load(pc.wrapping_add(1));
        match opcode & 0x0f {
            OP_LC => Op::Lc {
                dest: hi,
                value: operand,
            },
            OP_CPY => Op::Cpy {
                dest: hi,
                src: operand & 0x0f,
                shift: operand >> 4,
            },
            OP_ADD => Op::Add {
                dest: hi,
                first: operand & 0x0f,
                second: operand >> 4,
            },
            OP_SUB => Op::Sub {
                dest: hi,
                first: operand & 0x0f,
                second: operand >> 4,
            },
            OP_AND => Op::And {
                dest: hi,
                first: operand & 0x0f,
                second: operand >> 4,
            },
            OP_OR => Op::Or {
                dest: hi,
                first: operand & 0x0f,
                second: operand >> 4,
            },
            OP_XOR => Op::Xor {
                dest: hi,
                first: operand & 0x0f,
                second: operand >> 4,
            },
            OP_LD => Op::Ld {
                dest: hi,
                low: operand & 0x0f,
                high: operand >> 4,
            },
            OP_ST => Op::St {
                src: hi,
                low: operand & 0x0f,
                high: operand >> 4,
            },
            OP_BX => match hi {
                COND_NOT => Op::Not {
                    dest: operand & 0x0f,
                    src: operand >> 4,
                },
                COND_ALWAYS => Op::Branch {
                    offset: operand as i8,
                },
                cond => {
                    let regs = image.load(pc.wrapping_add(2));
                    Op::CondBranch {
                        cond,
                        offset: operand as i8,
                        first: regs & 0x0f,
                        second: regs >> 4,
                    }
                }
            },
            OP_ADC => Op::Adc { dest: hi },
            OP_SBC => Op::Sbc { dest: hi },
            OP_JS => {
                let high = image.load(pc.wrapping_add(2));
                Op::Js {
                    params: hi,
                    target: u16::from(operand) | (u16::from(high) << 8),
                }
            }
            OP_JSS => Op::Jss {
                params: hi,
                offset: operand as i8,
            },
            OP_RET => Op::Ret { params: hi },
            _ => Op::Sys { selector: hi },
        }
    }

    /// Encoded size in bytes.
    pub fn size(&self) -> u16 {
        match self {
            Op::Adc { .. } | Op::Sbc { .. } | Op::Ret { .. } | Op::Sys { .. } => 1,
            Op::CondBranch { .. } | Op::Js { .. } => 3,
            _ => 2,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Op::Lc { dest, value } => write!(f, "lc R{dest}, {value}"),
            Op::Cpy { dest, src, shift } => write!(f, "cpy R{dest}, R{src}, {shift}"),
            Op::Add {
                dest,
                first,
                second,
            } => write!(f, "add R{dest}, R{first}, R{second}"),
            Op::Sub {
                dest,
                first,
                second,
            } => write!(f, "sub R{dest}, R{first}, R{second}"),
            Op::And {
                dest,
                first,
                second,
            } => write!(f, "and R{dest}, R{first}, R{second}"),
            Op::Or {
                dest,
                first,
                second,
            } => write!(f, "or R{dest}, R{first}, R{second}"),
            Op::Xor {
                dest,
                first,
                second,
            } => write!(f, "xor R{dest}, R{first}, R{second}"),
            Op::Ld { dest, low, high } => write!(f, "ld R{dest}, R{low}, R{high}"),
            Op::St { src, low, high } => write!(f, "st R{src}, R{low}, R{high}"),
            Op::Not { dest, src } => write!(f, "not R{dest}, R{src}"),
            Op::Branch { offset } => write!(f, "b {offset:+}"),
            Op::CondBranch {
                cond,
                offset,
                first,
                second,
            } => {
                let name = condition_mnemonic(cond).unwrap_or("b?");
                write!(f, "{name} R{first}, R{second}, {offset:+}")
            }
            Op::Adc { dest } => write!(f, "adc R{dest}"),
            Op::Sbc { dest } => write!(f, "sbc R{dest}"),
            Op::Js { params, target } => write!(f, "js 0x{target:04x}, {params}"),
            Op::Jss { params, offset } => write!(f, "jss {offset:+}, {params}"),
            Op::Ret { params } => write!(f, "ret {params}"),
            Op::Sys { selector } => write!(f, "sys {selector}"),
        }
    }
}

/// Machine state: program counter, register stack, return stack,
/// carry/borrow flag, and run status.
pub struct Machine {
    image: MemoryImage,
    pc: u16,
    stack: [u8; STACK_SIZE],
    sp: i32,
    rstack: [u16; RETURN_STACK_SIZE],
    rsp: i32,
    carry: bool,
    status: Status,
}

impl Machine {
    pub fn new(image: MemoryImage, base: u16) -> Self {
        Self {
            image,
            pc: base,
            stack: [0; STACK_SIZE],
            sp: (STACK_SIZE - WINDOW_SIZE) as i32,
            rstack: [0; RETURN_STACK_SIZE],
            rsp: (RETURN_STACK_SIZE - 1) as i32,
            carry: false,
            status: Status::Running,
        }
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn carry(&self) -> bool {
        self.carry
    }

    pub fn image(&self) -> &MemoryImage {
        &self.image
    }

    pub fn halt(&mut self) {
        self.status = Status::Halted;
    }

    /// Current register window (up to 16 registers), clamped to the
    /// stack bounds.
    pub fn window(&self) -> &[u8] {
        let start = self.sp.clamp(0, STACK_SIZE as i32) as usize;
        let end = (start + WINDOW_SIZE).min(STACK_SIZE);
        &self.stack[start..end]
    }

    /// Everything from the stack pointer to the end of the stack.
    pub fn remaining_stack(&self) -> &[u8] {
        let start = self.sp.clamp(0, STACK_SIZE as i32) as usize;
        &self.stack[start..]
    }

    /// Value of a register in the current window, if in bounds.
    pub fn register(&self, reg: u8) -> Option<u8> {
        let index = self.sp + i32::from(reg);
        if (0..STACK_SIZE as i32).contains(&index) {
            Some(self.stack[index as usize])
        } else {
            None
        }
    }

    /// Decode the instruction at the current program counter.
    pub fn decode_current(&self) -> Op {
        Op::decode(&self.image, self.pc)
    }

    fn window_index(&self, reg: u8) -> Result<usize, RuntimeError> {
        let index = self.sp + i32::from(reg);
        if (0..STACK_SIZE as i32).contains(&index) {
            Ok(index as usize)
        } else {
            Err(RuntimeError::RegisterWindowOutOfRange { pc: self.pc, index })
        }
    }

    fn reg(&self, reg: u8) -> Result<u8, RuntimeError> {
        Ok(self.stack[self.window_index(reg)?])
    }

    fn set_reg(&mut self, reg: u8, value: u8) -> Result<(), RuntimeError> {
        let index = self.window_index(reg)?;
        self.stack[index] = value;
        Ok(())
    }

    fn push_return(&mut self, addr: u16) -> Result<(), RuntimeError> {
        if self.rsp < 0 {
            return Err(RuntimeError::ReturnStackOverflow { pc: self.pc });
        }
        self.rstack[self.rsp as usize] = addr;
        self.rsp -= 1;
        Ok(())
    }

    fn pop_return(&mut self) -> Result<u16, RuntimeError> {
        if self.rsp + 1 >= RETURN_STACK_SIZE as i32 {
            return Err(RuntimeError::ReturnStackUnderflow { pc: self.pc });
        }
        self.rsp += 1;
        Ok(self.rstack[self.rsp as usize])
    }

    fn branch_to(&mut self, offset: i8) {
        self.pc = self.pc.wrapping_add(offset as i16 as u16);
    }

    /// Execute one instruction. `out` receives `sys` output.
    pub fn step(&mut self, out: &mut dyn Write) -> Result<Status, RuntimeError> {
        if self.status == Status::Halted {
            return Ok(Status::Halted);
        }

        let op = self.decode_current();
        match op {
            Op::Lc { dest, value } => {
                self.set_reg(dest, value)?;
                self.pc = self.pc.wrapping_add(2);
            }
            Op::Cpy { dest, src, shift } => {
                let value = u32::from(self.reg(src)?);
                // Nibble values 8..15 encode left shifts of 16 - shift.
                let shifted = if shift >= 8 {
                    value << (16 - u32::from(shift))
                } else {
                    value >> u32::from(shift)
                };
                self.set_reg(dest, (shifted & 0xff) as u8)?;
                self.pc = self.pc.wrapping_add(2);
            }
            Op::Add {
                dest,
                first,
                second,
            } => {
                let sum = u16::from(self.reg(first)?) + u16::from(self.reg(second)?);
                self.set_reg(dest, (sum & 0xff) as u8)?;
                self.carry = sum > 0xff;
                self.pc = self.pc.wrapping_add(2);
            }
            Op::Sub {
                dest,
                first,
                second,
            } => {
                let diff = i16::from(self.reg(first)?) - i16::from(self.reg(second)?);
                self.set_reg(dest, (diff & 0xff) as u8)?;
                self.carry = diff < 0;
                self.pc = self.pc.wrapping_add(2);
            }
            Op::And {
                dest,
                first,
                second,
            } => {
                let value = self.reg(first)? & self.reg(second)?;
                self.set_reg(dest, value)?;
                self.pc = self.pc.wrapping_add(2);
            }
            Op::Or {
                dest,
                first,
                second,
            } => {
                let value = self.reg(first)? | self.reg(second)?;
                self.set_reg(dest, value)?;
                self.pc = self.pc.wrapping_add(2);
            }
            Op::Xor {
                dest,
                first,
                second,
            } => {
                let value = self.reg(first)? ^ self.reg(second)?;
                self.set_reg(dest, value)?;
                self.pc = self.pc.wrapping_add(2);
            }
            Op::Ld { dest, low, high } => {
                let addr = u16::from(self.reg(low)?) | (u16::from(self.reg(high)?) << 8);
                let value = self.image.load(addr);
                self.set_reg(dest, value)?;
                self.pc = self.pc.wrapping_add(2);
            }
            Op::St { src, low, high } => {
                let addr = u16::from(self.reg(low)?) | (u16::from(self.reg(high)?) << 8);
                let value = self.reg(src)?;
                self.image.store(addr, value);
                self.pc = self.pc.wrapping_add(2);
            }
            Op::Not { dest, src } => {
                let value = !self.reg(src)?;
                self.set_reg(dest, value)?;
                self.pc = self.pc.wrapping_add(2);
            }
            Op::Branch { offset } => {
                self.branch_to(offset);
            }
            Op::CondBranch {
                cond,
                offset,
                first,
                second,
            } => {
                let diff = i16::from(self.reg(first)?) - i16::from(self.reg(second)?);
                let flags: u8 = match diff {
                    d if d < 0 => 1,
                    0 => 2,
                    _ => 4,
                };
                if flags & cond != 0 {
                    self.branch_to(offset);
                } else {
                    self.pc = self.pc.wrapping_add(3);
                }
            }
            Op::Adc { dest } => {
                if self.carry {
                    let sum = u16::from(self.reg(dest)?) + 1;
                    self.set_reg(dest, (sum & 0xff) as u8)?;
                    self.carry = sum > 0xff;
                }
                self.pc = self.pc.wrapping_add(1);
            }
            Op::Sbc { dest } => {
                if self.carry {
                    let diff = i16::from(self.reg(dest)?) - 1;
                    self.set_reg(dest, (diff & 0xff) as u8)?;
                    self.carry = diff < 0;
                }
                self.pc = self.pc.wrapping_add(1);
            }
            Op::Js { params, target } => {
                self.push_return(self.pc.wrapping_add(3))?;
                self.sp -= i32::from(params);
                self.pc = target;
            }
            Op::Jss { params, offset } => {
                self.push_return(self.pc.wrapping_add(2))?;
                self.sp -= i32::from(params);
                self.branch_to(offset);
            }
            Op::Ret { params } => {
                self.sp += i32::from(params);
                self.pc = self.pop_return()?;
            }
            Op::Sys { selector } => {
                match selector {
                    SYS_HALT => self.status = Status::Halted,
                    SYS_PUTC => {
                        let byte = self.reg(0)?;
                        out.write_all(&[byte])?;
                    }
                    SYS_DUMP => {
                        writeln!(out, "{:?}", self.remaining_stack())?;
                    }
                    // Extension selectors are no-ops when unrecognized.
                    _ => {}
                }
                self.pc = self.pc.wrapping_add(1);
            }
        }

        Ok(self.status)
    }

    /// Run until the machine halts.
    pub fn run(&mut self, out: &mut dyn Write) -> Result<(), RuntimeError> {
        while self.step(out)? == Status::Running {}
        Ok(())
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("pc", &self.pc)
            .field("sp", &self.sp)
            .field("rsp", &self.rsp)
            .field("carry", &self.carry)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}
