// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Two-pass assembler for the virtual instruction set.
//!
//! Pass 0 walks the source once to place every label and record
//! subroutine parameter counts; pass 1 walks it again, resolving label
//! references and packing operands into the output byte stream. Both
//! passes share the per-line classification, so forward and backward
//! label references resolve identically.

use std::io::Write;

use crate::error::{AsmError, AsmErrorKind, AsmRunError, Diagnostic, Severity};
use crate::instructions::{
    condition_code, lookup_instruction, ArgKind, Encoding, InstructionEntry,
};
use crate::report::{paint_ins, paint_int, paint_label};
use crate::symbols::{Label, SymbolTable};

/// Parse an integer: hexadecimal with a `0x`/`0X` prefix, decimal
/// otherwise. Empty text parses as zero.
pub fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return Some(0);
    }
    if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

/// Strip `#`/`;` comments and surrounding whitespace.
fn strip_comments(line: &str) -> &str {
    let mut text = line;
    for marker in ['#', ';'] {
        if let Some(at) = text.find(marker) {
            text = &text[..at];
        }
    }
    text.trim()
}

/// Classification of one source line, shared by both passes.
#[derive(Debug, PartialEq, Eq)]
enum LineKind<'a> {
    Blank,
    /// `name : [nparams]`
    LabelDef { name: &'a str, params: &'a str },
    /// `name = value` (register alias, constant, or aliased subroutine)
    Assignment { name: &'a str, value: &'a str },
    /// mnemonic plus operand tokens
    Instruction {
        mnemonic: &'a str,
        operands: Vec<&'a str>,
    },
}

fn split_pair<'a>(text: &'a str, sep: char) -> Result<(&'a str, &'a str), AsmError> {
    let pieces: Vec<&str> = text.split(sep).collect();
    if pieces.len() != 2 {
        return Err(AsmError::new(
            AsmErrorKind::Syntax,
            "invalid definition",
            None,
        ));
    }
    Ok((pieces[0].trim(), pieces[1].trim()))
}

fn classify(line: &str) -> Result<LineKind<'_>, AsmError> {
    let text = strip_comments(line);
    if text.is_empty() {
        return Ok(LineKind::Blank);
    }

    let colon = text.find(':');
    let equals = text.find('=');
    match (colon, equals) {
        (Some(c), e) if e.map_or(true, |e| c < e) => {
            let (name, params) = split_pair(text, ':')?;
            Ok(LineKind::LabelDef { name, params })
        }
        (_, Some(_)) => {
            let (name, value) = split_pair(text, '=')?;
            Ok(LineKind::Assignment { name, value })
        }
        _ => {
            let mut tokens = text.split_whitespace();
            let mnemonic = match tokens.next() {
                Some(token) => token,
                None => return Ok(LineKind::Blank),
            };
            // Operands may be separated by commas, whitespace, or both.
            let rest = &text[mnemonic.len()..];
            let operands = rest
                .split([',', ' ', '\t'])
                .map(str::trim)
                .filter(|tok| !tok.is_empty())
                .collect();
            Ok(LineKind::Instruction { mnemonic, operands })
        }
    }
}

fn parse_params(text: &str) -> Result<u8, AsmError> {
    let value = parse_int(text).ok_or_else(|| {
        AsmError::new(AsmErrorKind::Syntax, "invalid definition", Some(text))
    })?;
    if !(0..16).contains(&value) {
        return Err(AsmError::new(
            AsmErrorKind::Range,
            "parameter count not a valid nibble",
            Some(text),
        ));
    }
    Ok(value as u8)
}

/// Two-pass assembler with explicit symbol state.
pub struct Assembler {
    base_addr: u16,
    verbose: bool,
    colour: bool,
    symbols: SymbolTable,
}

impl Assembler {
    pub fn new(base_addr: u16) -> Self {
        Self {
            base_addr,
            verbose: false,
            colour: false,
            symbols: SymbolTable::new(),
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_colour(mut self, colour: bool) -> Self {
        self.colour = colour;
        self
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Assemble `lines` into a byte stream. Verbose listing output goes
    /// to `listing`; on any error the run aborts with a diagnostic
    /// naming the 1-based source line.
    pub fn assemble(
        &mut self,
        lines: &[String],
        listing: &mut dyn Write,
    ) -> Result<Vec<u8>, AsmRunError> {
        let fatal = |err: AsmError, line_no: usize| {
            AsmRunError::from_diagnostic(
                Diagnostic::new(line_no as u32, Severity::Error, err),
                lines.to_vec(),
            )
        };

        self.resolve_labels(lines).map_err(|(err, l)| fatal(err, l))?;
        self.encode(lines, listing).map_err(|(err, l)| fatal(err, l))
    }

    /// Pass 0: place labels and record definitions without emitting
    /// bytes.
    fn resolve_labels(&mut self, lines: &[String]) -> Result<(), (AsmError, usize)> {
        let mut addr = u32::from(self.base_addr);
        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;
            let with_line = |err| (err, line_no);
            match classify(line).map_err(with_line)? {
                LineKind::Blank => {}
                LineKind::LabelDef { name, params } => {
                    let params = parse_params(params).map_err(with_line)?;
                    self.symbols.define_label(
                        name,
                        Label {
                            address: addr as u16,
                            params,
                            absolute: false,
                        },
                    );
                }
                LineKind::Assignment { name, value } => {
                    self.define_assignment(name, value).map_err(with_line)?;
                }
                LineKind::Instruction { mnemonic, .. } => {
                    let entry = lookup_instruction(mnemonic).ok_or_else(|| {
                        with_line(AsmError::new(
                            AsmErrorKind::UnknownInstruction,
                            "unknown instruction",
                            Some(&format!("'{mnemonic}'")),
                        ))
                    })?;
                    addr += entry.size;
                }
            }
        }
        Ok(())
    }

    /// Pass 1: resolve references and emit the byte stream.
    fn encode(
        &mut self,
        lines: &[String],
        listing: &mut dyn Write,
    ) -> Result<Vec<u8>, (AsmError, usize)> {
        let mut out = Vec::new();
        let mut addr = u32::from(self.base_addr);
        let mut current_sub: Option<String> = None;

        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;
            let with_line = |err| (err, line_no);
            match classify(line).map_err(with_line)? {
                LineKind::Blank => {}
                LineKind::LabelDef { name, params } => {
                    let params = parse_params(params).map_err(with_line)?;
                    if self.verbose {
                        let painted = paint_label(&format!("{name}:"), self.colour);
                        if params > 0 {
                            let _ = writeln!(listing, "{painted} {params}");
                        } else {
                            let _ = writeln!(listing, "{painted}");
                        }
                    }
                    if params > 0 {
                        current_sub = Some(name.to_string());
                    }
                }
                LineKind::Assignment { name, value } => {
                    self.define_assignment(name, value).map_err(with_line)?;
                }
                LineKind::Instruction { mnemonic, operands } => {
                    let entry = lookup_instruction(mnemonic).ok_or_else(|| {
                        with_line(AsmError::new(
                            AsmErrorKind::UnknownInstruction,
                            "unknown instruction",
                            Some(&format!("'{mnemonic}'")),
                        ))
                    })?;
                    let bytes = self
                        .encode_instruction(
                            entry,
                            mnemonic,
                            &operands,
                            addr as u16,
                            current_sub.as_deref(),
                            listing,
                        )
                        .map_err(with_line)?;
                    debug_assert_eq!(bytes.len() as u32, entry.size);
                    out.extend_from_slice(&bytes);
                    addr += entry.size;
                }
            }
        }
        Ok(out)
    }

    fn define_assignment(&mut self, name: &str, value: &str) -> Result<(), AsmError> {
        if value.contains(',') {
            // Aliased subroutine entry: `name = address, nparams`.
            let (addr_text, params_text) = split_pair(value, ',')?;
            let addr = parse_int(addr_text).ok_or_else(|| {
                AsmError::new(AsmErrorKind::Syntax, "invalid definition", Some(addr_text))
            })?;
            let params = parse_params(params_text)?;
            self.symbols.define_label(
                name,
                Label {
                    address: addr as u16,
                    params,
                    absolute: true,
                },
            );
        } else if value.starts_with(['R', 'r']) {
            self.symbols.define_register_alias(name, value);
        } else {
            let addr = parse_int(value).ok_or_else(|| {
                AsmError::new(AsmErrorKind::Syntax, "invalid definition", Some(value))
            })?;
            self.symbols.define_label(
                name,
                Label {
                    address: addr as u16,
                    params: 0,
                    absolute: true,
                },
            );
        }
        Ok(())
    }

    /// Validate arity, convert operand text to numeric values, and
    /// check each kind's range. Label references are skipped here and
    /// resolved by the instruction-specific packing below.
    fn convert_operands(
        &self,
        entry: &InstructionEntry,
        operands: &[&str],
    ) -> Result<Vec<i64>, AsmError> {
        let required = entry.required_args();
        if operands.len() < required || operands.len() > entry.args.len() {
            return Err(AsmError::new(
                AsmErrorKind::Arity,
                "invalid number of arguments",
                None,
            ));
        }

        let mut values = Vec::new();
        for (text, arg) in operands.iter().zip(entry.args.iter()) {
            if arg.kind == ArgKind::LabelRef {
                continue;
            }

            let text = match arg.kind {
                ArgKind::Register => {
                    // Optional leading R/r, then alias substitution.
                    let stripped = text
                        .strip_prefix(['R', 'r'])
                        .unwrap_or(text);
                    self.symbols
                        .register_alias(stripped)
                        .unwrap_or(stripped)
                        .to_string()
                }
                _ => text.to_string(),
            };

            let Some((lower, upper)) = arg.kind.limits() else {
                continue;
            };
            let parsed = parse_int(&text).filter(|v| (lower..upper).contains(v));
            let mut value = match parsed {
                Some(value) => value,
                None => {
                    return Err(AsmError::new(
                        AsmErrorKind::Range,
                        &format!("argument for {} not a valid value", arg.descriptor()),
                        Some(&format!("{text:?}")),
                    ))
                }
            };
            // Two's-complement normalization for negative values.
            if value < 0 {
                value += upper;
            }
            values.push(value);
        }
        Ok(values)
    }

    fn resolve_label_ref(&self, name: &str) -> Result<Label, AsmError> {
        self.symbols.label(name).ok_or_else(|| {
            AsmError::new(
                AsmErrorKind::UnresolvedLabel,
                "undefined label",
                Some(&format!("'{name}'")),
            )
        })
    }

    fn branch_offset(&self, target: u16, addr: u16, msg: &str) -> Result<i8, AsmError> {
        let offset = i32::from(target) - i32::from(addr);
        i8::try_from(offset)
            .map_err(|_| AsmError::new(AsmErrorKind::BranchRange, msg, None))
    }

    fn encode_instruction(
        &self,
        entry: &InstructionEntry,
        mnemonic: &str,
        operands: &[&str],
        addr: u16,
        current_sub: Option<&str>,
        listing: &mut dyn Write,
    ) -> Result<Vec<u8>, AsmError> {
        let mut values = self.convert_operands(entry, operands)?;
        let op = entry.opcode;
        let mut offset_note = None;

        let bytes = match entry.encoding {
            Encoding::LoadConst => {
                vec![op | (values[0] as u8) << 4, values[1] as u8]
            }
            Encoding::Copy => {
                if values.len() < 3 {
                    values.push(0);
                }
                vec![
                    op | (values[0] as u8) << 4,
                    values[1] as u8 | (values[2] as u8) << 4,
                ]
            }
            Encoding::ThreeReg => {
                vec![
                    op | (values[0] as u8) << 4,
                    values[1] as u8 | (values[2] as u8) << 4,
                ]
            }
            Encoding::LoadStore => {
                if values.len() < 3 {
                    let high = values[1] + 1;
                    if high > 15 {
                        return Err(AsmError::new(
                            AsmErrorKind::RegisterOverflow,
                            "cannot assign implicit high address register",
                            None,
                        ));
                    }
                    values.push(high);
                }
                vec![
                    op | (values[0] as u8) << 4,
                    values[1] as u8 | (values[2] as u8) << 4,
                ]
            }
            Encoding::TwoReg => {
                // Condition slot 0 in the high nibble selects NOT.
                vec![op, values[0] as u8 | (values[1] as u8) << 4]
            }
            Encoding::OneReg => {
                vec![op | (values[0] as u8) << 4]
            }
            Encoding::CondBranch => {
                let cond = condition_code(mnemonic).ok_or_else(|| {
                    AsmError::new(
                        AsmErrorKind::UnknownInstruction,
                        "unknown instruction",
                        Some(&format!("'{mnemonic}'")),
                    )
                })?;
                let label = self.resolve_label_ref(operands[2])?;
                let offset =
                    self.branch_offset(label.address, addr, "branch offset out of range")?;
                offset_note = Some(i64::from(offset));
                vec![
                    op | cond << 4,
                    offset as u8,
                    values[0] as u8 | (values[1] as u8) << 4,
                ]
            }
            Encoding::Branch => {
                let label = self.resolve_label_ref(operands[0])?;
                let offset =
                    self.branch_offset(label.address, addr, "branch offset out of range")?;
                offset_note = Some(i64::from(offset));
                vec![op | 7 << 4, offset as u8]
            }
            Encoding::CallAbs => {
                let label = self.resolve_label_ref(operands[0])?;
                vec![
                    op | label.params << 4,
                    (label.address & 0xff) as u8,
                    (label.address >> 8) as u8,
                ]
            }
            Encoding::CallRel => {
                let label = self.resolve_label_ref(operands[0])?;
                let offset =
                    self.branch_offset(label.address, addr, "short jump out of range")?;
                offset_note = Some(i64::from(offset));
                vec![op | label.params << 4, offset as u8]
            }
            Encoding::Return => {
                let sub = current_sub.ok_or_else(|| {
                    AsmError::new(AsmErrorKind::SubroutineContext, "not in a subroutine", None)
                })?;
                let label = self.resolve_label_ref(sub)?;
                vec![op | label.params << 4]
            }
        };

        if self.verbose {
            let painted_addr = paint_int(addr, self.colour);
            let painted_ins = paint_ins(mnemonic, self.colour);
            match offset_note {
                Some(offset) => {
                    let _ = writeln!(
                        listing,
                        "{painted_addr}: {painted_ins} {operands:?} {values:?} {offset}"
                    );
                }
                None => {
                    let _ = writeln!(
                        listing,
                        "{painted_addr}: {painted_ins} {operands:?} {values:?}"
                    );
                }
            }
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AsmErrorKind;
    use std::io;

    fn assemble(source: &str) -> Result<Vec<u8>, AsmRunError> {
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        Assembler::new(0).assemble(&lines, &mut io::sink())
    }

    fn assemble_at(base: u16, source: &str) -> Result<Vec<u8>, AsmRunError> {
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        Assembler::new(base).assemble(&lines, &mut io::sink())
    }

    fn error_kind(result: Result<Vec<u8>, AsmRunError>) -> AsmErrorKind {
        let err = result.expect_err("expected assembly failure");
        assert_eq!(err.diagnostics().len(), 1);
        err.kind()
    }

    #[test]
    fn encodes_load_const_with_hex_value() {
        assert_eq!(assemble("lc R3, 0x2A").unwrap(), vec![0x30, 42]);
    }

    #[test]
    fn negative_byte_is_two_complement_normalized() {
        assert_eq!(assemble("lc R0, -1").unwrap(), vec![0x00, 255]);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let source = "# header\n\n  lc R1, 5 ; trailing\n";
        assert_eq!(assemble(source).unwrap(), vec![0x10, 5]);
    }

    #[test]
    fn every_encoding_matches_declared_size() {
        let cases = [
            ("lc R0, 1", 2),
            ("cpy R0, R1", 2),
            ("cpy R0, R1, 3", 2),
            ("add R0, R1, R2", 2),
            ("sub R0, R1, R2", 2),
            ("and R0, R1, R2", 2),
            ("or R0, R1, R2", 2),
            ("xor R0, R1, R2", 2),
            ("ld R0, R1", 2),
            ("ld R0, R1, R2", 2),
            ("st R0, R1", 2),
            ("st R0, R1, R2", 2),
            ("here:\nbeq R0, R1, here", 3),
            ("here:\nb here", 2),
            ("not R0, R1", 2),
            ("adc R0", 1),
            ("sbc R0", 1),
            ("fn: 1\njs fn\nret", 3 + 1),
            ("fn: 1\njss fn\nret", 2 + 1),
            ("sys 0", 1),
        ];
        for (source, len) in cases {
            let bytes = assemble(source).unwrap();
            assert_eq!(bytes.len(), len, "{source}");
        }
    }

    #[test]
    fn copy_shift_defaults_to_zero() {
        assert_eq!(assemble("cpy R2, R3").unwrap(), vec![0x21, 0x03]);
        assert_eq!(assemble("cpy R2, R3, -3").unwrap(), vec![0x21, 0xd3]);
    }

    #[test]
    fn load_store_defaults_high_register() {
        assert_eq!(assemble("ld R0, R4").unwrap(), vec![0x07, 0x54]);
        assert_eq!(assemble("st R1, R4, R9").unwrap(), vec![0x18, 0x94]);
    }

    #[test]
    fn implicit_high_register_overflow_is_fatal() {
        let kind = error_kind(assemble("ld R0, R15"));
        assert_eq!(kind, AsmErrorKind::RegisterOverflow);
    }

    #[test]
    fn register_aliases_resolve_through_assignments() {
        let source = "count = R5\ntotal = R0\nlc count, 9\ncpy total, count";
        assert_eq!(
            assemble(source).unwrap(),
            vec![0x50, 9, 0x01, 0x05]
        );
    }

    #[test]
    fn alias_names_starting_with_r_never_resolve() {
        // The register prefix strip happens before alias lookup, so an
        // alias named with a leading R/r loses its first letter and is
        // not found.
        let source = "result = R0\nlc result, 1";
        assert_eq!(error_kind(assemble(source)), AsmErrorKind::Range);
    }

    #[test]
    fn forward_and_backward_references_encode_identically() {
        let fwd = assemble("b done\nlc R0, 1\ndone:\nsys 0").unwrap();
        // Offset is target - branch address: 4 ahead.
        assert_eq!(fwd[..2], [0x79, 4]);
        let back = assemble("top:\nlc R0, 1\nb top").unwrap();
        assert_eq!(back[2..], [0x79, 254]);
    }

    #[test]
    fn branch_offset_boundaries_are_checked() {
        // One sys plus 62 two-byte pads puts fin exactly 127 ahead.
        let pad = "lc R0, 0\n".repeat(62);
        let ok = format!("b fin\nsys 2\n{pad}fin:\nsys 0");
        let bytes = assemble(&ok).unwrap();
        assert_eq!(bytes[..2], [0x79, 127]);

        let pad = "lc R0, 0\n".repeat(63);
        let too_far = format!("b fin\n{pad}fin:\nsys 0");
        assert_eq!(error_kind(assemble(&too_far)), AsmErrorKind::BranchRange);
    }

    #[test]
    fn backward_branch_reaches_minus_128() {
        let pad = "lc R0, 0\n".repeat(64);
        let ok = format!("top:\n{pad}b top");
        let bytes = assemble(&ok).unwrap();
        assert_eq!(bytes[128..], [0x79, 128]);

        let pad = "lc R0, 0\n".repeat(64);
        let too_far = format!("top:\n{pad}lc R0, 0\nb top");
        assert_eq!(error_kind(assemble(&too_far)), AsmErrorKind::BranchRange);
    }

    #[test]
    fn call_encodes_declared_parameter_count() {
        let source = "js fun\nsys 0\nfun: 2\nlc R0, 1\nret";
        let bytes = assemble(source).unwrap();
        assert_eq!(bytes, vec![0x2c, 0x04, 0x00, 0x0f, 0x00, 1, 0x2e]);
    }

    #[test]
    fn short_call_encodes_offset_and_params() {
        // Place the subroutine 100 bytes after the call site.
        let pad = "lc R0, 0\n".repeat(49);
        let source = format!("jss fun\n{pad}fun: 2\nret");
        let bytes = assemble(&source).unwrap();
        assert_eq!(bytes[..2], [0x2d, 100]);
        assert_eq!(bytes[100], 0x2e);
    }

    #[test]
    fn aliased_subroutine_labels_carry_params() {
        let source = "entry = 0x200, 3\njs entry";
        assert_eq!(assemble(source).unwrap(), vec![0x3c, 0x00, 0x02]);
    }

    #[test]
    fn ret_outside_subroutine_is_fatal() {
        assert_eq!(
            error_kind(assemble("lc R0, 1\nret")),
            AsmErrorKind::SubroutineContext
        );
        // A plain label does not open a subroutine body.
        assert_eq!(
            error_kind(assemble("main:\nret")),
            AsmErrorKind::SubroutineContext
        );
    }

    #[test]
    fn unknown_mnemonic_fails_in_first_pass_with_line_number() {
        let err = assemble("lc R0, 1\nfrob R1").unwrap_err();
        assert_eq!(err.kind(), AsmErrorKind::UnknownInstruction);
        assert_eq!(err.diagnostics()[0].line(), 2);
    }

    #[test]
    fn arity_errors_name_the_problem() {
        assert_eq!(error_kind(assemble("add R0, R1")), AsmErrorKind::Arity);
        assert_eq!(
            error_kind(assemble("lc R0, 1, 2")),
            AsmErrorKind::Arity
        );
    }

    #[test]
    fn out_of_range_operands_are_fatal() {
        assert_eq!(error_kind(assemble("lc R16, 0")), AsmErrorKind::Range);
        assert_eq!(error_kind(assemble("lc R0, 256")), AsmErrorKind::Range);
        assert_eq!(error_kind(assemble("lc R0, -129")), AsmErrorKind::Range);
        assert_eq!(
            error_kind(assemble("cpy R0, R1, 20")),
            AsmErrorKind::Range
        );
        assert_eq!(error_kind(assemble("sys 16")), AsmErrorKind::Range);
    }

    #[test]
    fn undefined_label_reference_is_fatal() {
        assert_eq!(
            error_kind(assemble("b nowhere")),
            AsmErrorKind::UnresolvedLabel
        );
    }

    #[test]
    fn malformed_definitions_are_syntax_errors() {
        assert_eq!(error_kind(assemble("a : b : c")), AsmErrorKind::Syntax);
        assert_eq!(error_kind(assemble("a = b = c")), AsmErrorKind::Syntax);
    }

    #[test]
    fn base_address_offsets_label_targets() {
        let source = "main:\njs fun\nsys 0\nfun: 1\nret";
        let bytes = assemble_at(0x400, source).unwrap();
        // fun sits at 0x400 + 3 + 1.
        assert_eq!(bytes[..3], [0x1c, 0x04, 0x04]);
    }

    #[test]
    fn constant_labels_are_absolute() {
        let source = "screen = 0x7800\nentry = 0x100, 2\njs entry";
        let mut asm = Assembler::new(0);
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        asm.assemble(&lines, &mut io::sink()).unwrap();
        let screen = asm.symbols().label("screen").unwrap();
        assert!(screen.absolute);
        assert_eq!(screen.address, 0x7800);
        assert_eq!(screen.params, 0);
    }

    #[test]
    fn verbose_listing_reports_addresses_and_values() {
        let lines: Vec<String> = "main:\nlc R1, 0x10"
            .lines()
            .map(str::to_string)
            .collect();
        let mut listing = Vec::new();
        Assembler::new(0)
            .with_verbose(true)
            .assemble(&lines, &mut listing)
            .unwrap();
        let text = String::from_utf8(listing).unwrap();
        assert!(text.contains("main:"));
        assert!(text.contains("0: lc [\"R1\", \"0x10\"] [1, 16]"));
    }
}
