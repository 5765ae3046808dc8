// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assembler and simulator for a small virtual instruction set with a
//! windowed register stack.

pub mod assembler;
pub mod debugger;
pub mod error;
pub mod image;
pub mod instructions;
pub mod machine;
pub mod report;
pub mod symbols;
