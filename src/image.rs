// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Flat 64 KiB program image for the simulator.
//!
//! The image is built once from assembler output: a zero-filled prefix
//! up to the base address, the code bytes, an implicit halt, and an
//! optional data overlay. `st` instructions mutate it during execution.

use std::fmt;

pub const MEMORY_SIZE: usize = 0x10000;

/// `sys 0`, appended after the loaded code so execution falling off the
/// end halts deterministically.
pub const HALT_BYTE: u8 = 0x0f;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    CodeOutOfRange { base: u16, len: usize },
    OverlayOutOfRange { addr: u16, len: usize },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CodeOutOfRange { base, len } => {
                write!(f, "{len} code bytes at base 0x{base:04x} exceed the 64 KiB image")
            }
            Self::OverlayOutOfRange { addr, len } => {
                write!(f, "{len} data bytes at 0x{addr:04x} exceed the 64 KiB image")
            }
        }
    }
}

impl std::error::Error for ImageError {}

/// Fixed-size memory image. Never resized after construction.
pub struct MemoryImage {
    bytes: Box<[u8; MEMORY_SIZE]>,
}

impl MemoryImage {
    /// Build an image with `code` at `base` followed by an implicit
    /// halt byte; everything else is zero-filled.
    pub fn from_code(base: u16, code: &[u8]) -> Result<Self, ImageError> {
        let start = base as usize;
        let end = start + code.len() + 1;
        if end > MEMORY_SIZE {
            return Err(ImageError::CodeOutOfRange {
                base,
                len: code.len(),
            });
        }
        let mut bytes = Box::new([0u8; MEMORY_SIZE]);
        bytes[start..start + code.len()].copy_from_slice(code);
        bytes[start + code.len()] = HALT_BYTE;
        Ok(Self { bytes })
    }

    /// Write a secondary data blob over the image.
    pub fn overlay(&mut self, addr: u16, data: &[u8]) -> Result<(), ImageError> {
        let start = addr as usize;
        let end = start + data.len();
        if end > MEMORY_SIZE {
            return Err(ImageError::OverlayOutOfRange {
                addr,
                len: data.len(),
            });
        }
        self.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    pub fn load(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    pub fn store(&mut self, addr: u16, value: u8) {
        self.bytes[addr as usize] = value;
    }

    /// Slice of the image starting at `addr`, clamped to the image end.
    pub fn slice(&self, addr: u16, len: usize) -> &[u8] {
        let start = addr as usize;
        let end = (start + len).min(MEMORY_SIZE);
        &self.bytes[start..end]
    }
}

impl fmt::Debug for MemoryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryImage").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_placed_at_base_with_halt_appended() {
        let image = MemoryImage::from_code(0x100, &[0x30, 0x05]).unwrap();
        assert_eq!(image.load(0x00ff), 0);
        assert_eq!(image.load(0x0100), 0x30);
        assert_eq!(image.load(0x0101), 0x05);
        assert_eq!(image.load(0x0102), HALT_BYTE);
        assert_eq!(image.load(0x0103), 0);
    }

    #[test]
    fn code_past_image_end_is_rejected() {
        let err = MemoryImage::from_code(0xffff, &[0x30]).unwrap_err();
        assert!(matches!(err, ImageError::CodeOutOfRange { .. }));
    }

    #[test]
    fn overlay_writes_and_checks_bounds() {
        let mut image = MemoryImage::from_code(0, &[]).unwrap();
        image.overlay(0x2000, &[1, 2, 3]).unwrap();
        assert_eq!(image.slice(0x2000, 3), &[1, 2, 3]);
        let err = image.overlay(0xfffe, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ImageError::OverlayOutOfRange { .. }));
    }

    #[test]
    fn slice_clamps_at_image_end() {
        let image = MemoryImage::from_code(0, &[]).unwrap();
        assert_eq!(image.slice(0xfffe, 16).len(), 2);
    }
}
