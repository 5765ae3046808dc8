// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Interactive debug shell wrapped around the execution loop.
//!
//! The shell decides before each step whether to stop: in single-step
//! mode, in verbose mode, or when the program counter hits a
//! breakpoint. Stopping prints the decoded instruction and register
//! window and blocks on one command from the input stream.

use std::collections::HashSet;
use std::io::{BufRead, Write};

use crate::assembler::parse_int;
use crate::machine::{Machine, RuntimeError, Status};
use crate::report::{paint_ins, paint_int};

/// Debug state layered over a [`Machine`].
pub struct DebugShell {
    breakpoints: HashSet<u16>,
    single: bool,
    extract: Option<(u16, u16)>,
    verbose: bool,
    colour: bool,
}

impl DebugShell {
    pub fn new() -> Self {
        Self {
            breakpoints: HashSet::new(),
            single: false,
            extract: None,
            verbose: false,
            colour: false,
        }
    }

    pub fn with_single_step(mut self, single: bool) -> Self {
        self.single = single;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_colour(mut self, colour: bool) -> Self {
        self.colour = colour;
        self
    }

    /// Configure the memory range dumped by the `x` and `tx` commands.
    pub fn with_extract(mut self, addr: u16, length: u16) -> Self {
        self.extract = Some((addr, length));
        self
    }

    pub fn add_breakpoint(&mut self, addr: u16) {
        self.breakpoints.insert(addr);
    }

    /// Run the machine to halt, stopping at breakpoints and in
    /// single-step mode. Program output and shell output share `out`.
    pub fn run(
        &mut self,
        machine: &mut Machine,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> Result<(), RuntimeError> {
        while machine.status() == Status::Running {
            let pc = machine.pc();
            let at_breakpoint = self.breakpoints.contains(&pc);
            if self.single || self.verbose || at_breakpoint {
                let op = machine.decode_current();
                writeln!(
                    out,
                    "{} {}",
                    paint_int(pc, self.colour),
                    paint_ins(&op.to_string(), self.colour)
                )?;
                if self.single || at_breakpoint {
                    self.print_window(machine, out)?;
                    let command = self.prompt(input, out)?;
                    if !self.dispatch(&command, machine, out)? {
                        break;
                    }
                    if machine.status() == Status::Halted {
                        break;
                    }
                }
            }
            machine.step(out)?;
        }
        Ok(())
    }

    fn print_window(&self, machine: &Machine, out: &mut dyn Write) -> Result<(), RuntimeError> {
        let window = machine.window();
        writeln!(out, "{window:?}")?;
        let hex: Vec<String> = window.iter().map(|b| format!("{b:02x}")).collect();
        writeln!(out, "{}", hex.join(" "))?;
        Ok(())
    }

    fn prompt(
        &self,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> Result<String, RuntimeError> {
        write!(out, ">")?;
        out.flush()?;
        let mut line = String::new();
        input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }

    /// Handle one command. Returns `false` when the shell should stop
    /// running. Unrecognized input steps once.
    fn dispatch(
        &mut self,
        command: &str,
        machine: &mut Machine,
        out: &mut dyn Write,
    ) -> Result<bool, RuntimeError> {
        self.single = true;
        match command {
            "x" => self.dump_hex(machine, out)?,
            "tx" => self.dump_raw(machine, out)?,
            "q" => {
                machine.halt();
                return Ok(false);
            }
            "c" => self.single = false,
            _ if command.starts_with('b') => {
                let text = command[1..].trim();
                let addr = if text.is_empty() {
                    Some(i64::from(machine.pc()))
                } else {
                    parse_int(text).filter(|a| (0..0x10000).contains(a))
                };
                match addr {
                    Some(addr) => self.add_breakpoint(addr as u16),
                    None => writeln!(out, "invalid breakpoint address: {text:?}")?,
                }
            }
            _ => {}
        }
        Ok(true)
    }

    /// Hex dump of the configured extract range, 16 bytes per row.
    pub fn dump_hex(&self, machine: &Machine, out: &mut dyn Write) -> Result<(), RuntimeError> {
        let Some((addr, length)) = self.extract else {
            return Ok(());
        };
        let bytes = machine.image().slice(addr, length as usize);
        for row in bytes.chunks(16) {
            for byte in row {
                write!(out, "{byte:02x} ")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// The configured extract range as raw bytes.
    pub fn dump_raw(&self, machine: &Machine, out: &mut dyn Write) -> Result<(), RuntimeError> {
        let Some((addr, length)) = self.extract else {
            return Ok(());
        };
        out.write_all(machine.image().slice(addr, length as usize))?;
        writeln!(out)?;
        Ok(())
    }
}

impl Default for DebugShell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::MemoryImage;
    use std::io;

    fn machine_with(code: &[u8]) -> Machine {
        let image = MemoryImage::from_code(0, code).unwrap();
        Machine::new(image, 0)
    }

    #[test]
    fn runs_to_halt_without_stops() {
        // lc R0, 5 / sys 0
        let mut machine = machine_with(&[0x00, 5, 0x0f]);
        let mut shell = DebugShell::new();
        let mut out = Vec::new();
        shell
            .run(&mut machine, &mut io::empty(), &mut out)
            .unwrap();
        assert_eq!(machine.status(), Status::Halted);
        assert_eq!(machine.register(0), Some(5));
        assert!(out.is_empty());
    }

    #[test]
    fn breakpoint_stops_and_prints_window() {
        let mut machine = machine_with(&[0x00, 5, 0x10, 6, 0x0f]);
        let mut shell = DebugShell::new();
        shell.add_breakpoint(2);
        // One empty command: step once, then single-step kicks in for
        // the remaining instructions.
        let mut input = io::Cursor::new(b"\n\n\n".to_vec());
        let mut out = Vec::new();
        shell.run(&mut machine, &mut input, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("2 lc R1, 6"));
        assert!(text.contains('>'));
        assert_eq!(machine.status(), Status::Halted);
    }

    #[test]
    fn quit_command_halts_without_stepping() {
        let mut machine = machine_with(&[0x00, 5, 0x0f]);
        let mut shell = DebugShell::new().with_single_step(true);
        let mut input = io::Cursor::new(b"q\n".to_vec());
        let mut out = Vec::new();
        shell.run(&mut machine, &mut input, &mut out).unwrap();
        assert_eq!(machine.status(), Status::Halted);
        // lc never executed.
        assert_eq!(machine.register(0), Some(0));
    }

    #[test]
    fn continue_command_leaves_single_step() {
        let mut machine = machine_with(&[0x00, 5, 0x10, 6, 0x20, 7, 0x0f]);
        let mut shell = DebugShell::new().with_single_step(true);
        let mut input = io::Cursor::new(b"c\n".to_vec());
        let mut out = Vec::new();
        shell.run(&mut machine, &mut input, &mut out).unwrap();
        assert_eq!(machine.status(), Status::Halted);
        assert_eq!(machine.register(2), Some(7));
        // Only the first stop printed a prompt.
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches('>').count(), 1);
    }

    #[test]
    fn breakpoint_command_defaults_to_current_pc() {
        let mut machine = machine_with(&[0x00, 5, 0x0f]);
        let mut shell = DebugShell::new().with_single_step(true);
        let mut input = io::Cursor::new(b"b\nc\n".to_vec());
        let mut out = Vec::new();
        shell.run(&mut machine, &mut input, &mut out).unwrap();
        assert!(shell.breakpoints.contains(&0));
    }

    #[test]
    fn extract_dumps_hex_rows() {
        let machine = machine_with(&[0x00, 5, 0x0f]);
        let shell = DebugShell::new().with_extract(0, 4);
        let mut out = Vec::new();
        shell.dump_hex(&machine, &mut out).unwrap();
        // The implicit halt byte follows the three code bytes.
        assert_eq!(String::from_utf8(out).unwrap(), "00 05 0f 0f \n");
    }

    #[test]
    fn dump_without_extract_range_is_silent() {
        let machine = machine_with(&[0x0f]);
        let shell = DebugShell::new();
        let mut out = Vec::new();
        shell.dump_hex(&machine, &mut out).unwrap();
        shell.dump_raw(&machine, &mut out).unwrap();
        assert!(out.is_empty());
    }
}
