// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Converts bytecode to Ophis assembler statements.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(
    name = "mkophis",
    version = VERSION,
    about = "Convert a raw bytecode file to Ophis .byte directives"
)]
struct Cli {
    #[arg(value_name = "BYTECODE", help = "Bytecode input file")]
    input: PathBuf,
    #[arg(value_name = "OPH", help = "Ophis source output file")]
    output: PathBuf,
}

fn write_opcodes(out: &mut dyn Write, opcodes: &[u8]) -> io::Result<()> {
    for chunk in opcodes.chunks(24) {
        let values: Vec<String> = chunk.iter().map(|b| b.to_string()).collect();
        writeln!(out, ".byte {}", values.join(", "))?;
    }
    Ok(())
}

fn run(cli: &Cli) -> io::Result<()> {
    let opcodes = fs::read(&cli.input)?;
    let file = fs::File::create(&cli.output)?;
    let mut out = BufWriter::new(file);
    write_opcodes(&mut out, &opcodes)?;
    out.flush()
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mkophis: {err}");
            ExitCode::FAILURE
        }
    }
}
