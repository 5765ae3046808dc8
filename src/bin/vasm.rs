// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for the assembler.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use serde_json::json;

use opsim::assembler::{parse_int, Assembler};
use opsim::error::{AsmError, AsmErrorKind, AsmRunError, Diagnostic, Severity};

const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "Assembler for a small virtual instruction set.

Reads one directive or instruction per line; '#' and ';' start comments.
Labels ('name: [nparams]') mark addresses and subroutine entry points;
assignments ('name = value') define register aliases, constants, or
aliased subroutine entries ('name = address, nparams'). The output is a
raw byte stream suitable for the simulator or for mkophis.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "vasm",
    version = VERSION,
    about = "Two-pass assembler for a small virtual instruction set",
    long_about = LONG_ABOUT
)]
struct Cli {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::SetTrue,
        long_help = "Print a listing line for every assembled label and instruction."
    )]
    verbose: bool,
    #[arg(
        short = 'c',
        long = "colour",
        action = ArgAction::SetTrue,
        long_help = "Stylize listing and diagnostic output with ANSI colours."
    )]
    colour: bool,
    #[arg(
        short = 'b',
        long = "base-address",
        value_name = "ADDR",
        default_value = "0",
        long_help = "Address the code is assembled for, decimal or 0x-prefixed hex."
    )]
    base_address: String,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Diagnostic output format. text is default; json emits one object per line."
    )]
    format: OutputFormat,
    #[arg(value_name = "INPUT", help = "Assembly source file")]
    input: PathBuf,
    #[arg(value_name = "OUTPUT", help = "Bytecode output file")]
    output: PathBuf,
}

fn severity_to_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

fn emit_diagnostic(diag: &Diagnostic, err: &AsmRunError, colour: bool, format: OutputFormat) {
    let line = if format == OutputFormat::Json {
        json!({
            "code": diag.code(),
            "severity": severity_to_str(diag.severity()),
            "message": diag.message(),
            "line": diag.line(),
        })
        .to_string()
    } else {
        diag.format_with_context(Some(err.source_lines()), colour)
    };
    eprintln!("{line}");
}

fn run(cli: &Cli) -> Result<ExitCode, io::Error> {
    let Some(base) = parse_int(&cli.base_address).filter(|v| (0..0x10000).contains(v)) else {
        let err = AsmError::new(
            AsmErrorKind::Cli,
            "invalid base address",
            Some(&format!("{:?}", cli.base_address)),
        );
        eprintln!("vasm: {err}");
        return Ok(ExitCode::from(2));
    };

    let source = fs::read_to_string(&cli.input)?;
    let lines: Vec<String> = source.lines().map(str::to_string).collect();

    let mut assembler = Assembler::new(base as u16)
        .with_verbose(cli.verbose)
        .with_colour(cli.colour);

    let mut listing = io::stdout().lock();
    match assembler.assemble(&lines, &mut listing) {
        Ok(bytes) => {
            listing.flush()?;
            fs::write(&cli.output, &bytes)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            for diag in err.diagnostics() {
                emit_diagnostic(diag, &err, cli.colour, cli.format);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            let err = AsmError::new(AsmErrorKind::Io, "i/o error", Some(&err.to_string()));
            eprintln!("vasm: {err}");
            ExitCode::from(2)
        }
    }
}
