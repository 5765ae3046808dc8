// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for the simulator.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};

use opsim::assembler::parse_int;
use opsim::debugger::DebugShell;
use opsim::image::MemoryImage;
use opsim::machine::Machine;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Simulator for a small virtual instruction set.

Loads a raw bytecode file at the base address, appends an implicit halt,
and runs the fetch/decode/execute loop until the program halts. In
single-step mode, in verbose mode, or at a breakpoint the debug shell
prompts for a command: x (hex dump of the extract range), tx (raw bytes
of the same range), q (halt), c (continue), b[addr] (set a breakpoint);
anything else steps once. On halt the remaining register-window stack is
printed.";

#[derive(Parser, Debug)]
#[command(
    name = "vsim",
    version = VERSION,
    about = "Simulator and debug shell for a small virtual instruction set",
    long_about = LONG_ABOUT
)]
struct Cli {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::SetTrue,
        long_help = "Print every executed instruction with its address."
    )]
    verbose: bool,
    #[arg(
        short = 'c',
        long = "colour",
        action = ArgAction::SetTrue,
        long_help = "Stylize trace output with ANSI colours."
    )]
    colour: bool,
    #[arg(
        short = 'b',
        long = "base-address",
        value_name = "ADDR",
        default_value = "0",
        long_help = "Address the code is loaded at; execution starts here."
    )]
    base_address: String,
    #[arg(
        short = 'd',
        long = "data-address",
        value_name = "ADDR",
        requires = "data_file",
        long_help = "Overlay --data-file onto the image at this address."
    )]
    data_address: Option<String>,
    #[arg(
        long = "data-file",
        value_name = "FILE",
        requires = "data_address",
        long_help = "Binary file overlaid at --data-address after the code is loaded."
    )]
    data_file: Option<PathBuf>,
    #[arg(
        short = 'x',
        long = "extract-address",
        value_name = "ADDR",
        requires = "extract_length",
        long_help = "Start of the memory range dumped by the x/tx debug commands and after halt."
    )]
    extract_address: Option<String>,
    #[arg(
        long = "extract-length",
        value_name = "LEN",
        requires = "extract_address",
        long_help = "Length of the extract range in bytes."
    )]
    extract_length: Option<String>,
    #[arg(
        short = 's',
        long = "single-step",
        action = ArgAction::SetTrue,
        long_help = "Start in single-step mode, prompting before every instruction."
    )]
    single_step: bool,
    #[arg(value_name = "INPUT", help = "Bytecode file")]
    input: PathBuf,
}

fn parse_addr(text: &str, what: &str) -> Result<u16, String> {
    parse_int(text)
        .filter(|v| (0..0x10000).contains(v))
        .map(|v| v as u16)
        .ok_or_else(|| format!("invalid {what}: {text:?}"))
}

fn run(cli: &Cli) -> Result<ExitCode, io::Error> {
    let base = match parse_addr(&cli.base_address, "base address") {
        Ok(addr) => addr,
        Err(msg) => {
            eprintln!("vsim: {msg}");
            return Ok(ExitCode::from(2));
        }
    };

    let code = fs::read(&cli.input)?;
    let mut image = match MemoryImage::from_code(base, &code) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("vsim: {err}");
            return Ok(ExitCode::from(2));
        }
    };

    if let (Some(addr_text), Some(path)) = (&cli.data_address, &cli.data_file) {
        let addr = match parse_addr(addr_text, "data address") {
            Ok(addr) => addr,
            Err(msg) => {
                eprintln!("vsim: {msg}");
                return Ok(ExitCode::from(2));
            }
        };
        let data = fs::read(path)?;
        if let Err(err) = image.overlay(addr, &data) {
            eprintln!("vsim: {err}");
            return Ok(ExitCode::from(2));
        }
    }

    let mut shell = DebugShell::new()
        .with_single_step(cli.single_step)
        .with_verbose(cli.verbose)
        .with_colour(cli.colour);
    if let (Some(addr_text), Some(len_text)) = (&cli.extract_address, &cli.extract_length) {
        let range = parse_addr(addr_text, "extract address").and_then(|addr| {
            parse_addr(len_text, "extract length").map(|len| (addr, len))
        });
        match range {
            Ok((addr, len)) => shell = shell.with_extract(addr, len),
            Err(msg) => {
                eprintln!("vsim: {msg}");
                return Ok(ExitCode::from(2));
            }
        }
    }

    let mut machine = Machine::new(image, base);
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    if let Err(err) = shell.run(&mut machine, &mut input, &mut out) {
        out.flush()?;
        eprintln!("vsim: {err}");
        return Ok(ExitCode::FAILURE);
    }

    writeln!(out, "{:?}", machine.remaining_stack())?;
    if let Err(err) = shell
        .dump_hex(&machine, &mut out)
        .and_then(|()| shell.dump_raw(&machine, &mut out))
    {
        eprintln!("vsim: {err}");
        return Ok(ExitCode::FAILURE);
    }
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("vsim: {err}");
            ExitCode::from(2)
        }
    }
}
