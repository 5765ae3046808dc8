// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Label table and register aliases built by the resolver pass.

use std::collections::HashMap;

/// A named program address, optionally tagged with a subroutine
/// parameter count. `absolute` marks labels assigned with `=` rather
/// than placed at the current location counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label {
    pub address: u16,
    pub params: u8,
    pub absolute: bool,
}

/// Symbol state shared by both assembler passes.
///
/// Register aliases are a textual convenience only; they are resolved
/// during encoding and never appear in the binary output.
#[derive(Debug, Default)]
pub struct SymbolTable {
    labels: HashMap<String, Label>,
    registers: HashMap<String, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_label(&mut self, name: &str, label: Label) {
        self.labels.insert(name.to_string(), label);
    }

    pub fn label(&self, name: &str) -> Option<Label> {
        self.labels.get(name).copied()
    }

    pub fn define_register_alias(&mut self, name: &str, value: &str) {
        self.registers.insert(name.to_string(), value.to_string());
    }

    /// Substitute a register alias, returning the aliased register text
    /// with any leading `R`/`r` removed.
    pub fn register_alias(&self, name: &str) -> Option<&str> {
        self.registers
            .get(name)
            .map(|value| value.trim_start_matches(['R', 'r']))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_replaced_on_redefinition() {
        let mut symbols = SymbolTable::new();
        symbols.define_label(
            "loop",
            Label {
                address: 2,
                params: 0,
                absolute: false,
            },
        );
        symbols.define_label(
            "loop",
            Label {
                address: 6,
                params: 2,
                absolute: false,
            },
        );
        assert_eq!(
            symbols.label("loop"),
            Some(Label {
                address: 6,
                params: 2,
                absolute: false,
            })
        );
    }

    #[test]
    fn register_alias_strips_register_prefix() {
        let mut symbols = SymbolTable::new();
        symbols.define_register_alias("count", "R5");
        assert_eq!(symbols.register_alias("count"), Some("5"));
        assert_eq!(symbols.register_alias("missing"), None);
    }
}
