// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Assemble-then-execute tests covering the full pipeline.

use std::io;

use opsim::assembler::Assembler;
use opsim::image::MemoryImage;
use opsim::machine::{Machine, Status};

fn run_program(source: &str) -> (Machine, Vec<u8>) {
    let lines: Vec<String> = source.lines().map(str::to_string).collect();
    let bytes = Assembler::new(0)
        .assemble(&lines, &mut io::sink())
        .unwrap();
    let image = MemoryImage::from_code(0, &bytes).unwrap();
    let mut machine = Machine::new(image, 0);
    let mut out = Vec::new();
    machine.run(&mut out).unwrap();
    (machine, out)
}

#[test]
fn adds_two_constants() {
    let source = "\
main:
lc R0, 5
lc R1, 3
add R2, R0, R1
sys 0
";
    let (machine, _) = run_program(source);
    assert_eq!(machine.status(), Status::Halted);
    assert_eq!(machine.register(2), Some(8));
}

#[test]
fn load_const_round_trip_advances_pc_by_two() {
    let lines = vec!["lc R3, 0x2A".to_string()];
    let bytes = Assembler::new(0)
        .assemble(&lines, &mut io::sink())
        .unwrap();
    let image = MemoryImage::from_code(0, &bytes).unwrap();
    let mut machine = Machine::new(image, 0);
    machine.step(&mut io::sink()).unwrap();
    assert_eq!(machine.register(3), Some(42));
    assert_eq!(machine.pc(), 2);
}

#[test]
fn carry_propagates_through_adc() {
    let source = "\
lc R1, 255
lc R2, 2
lc R3, 0
add R0, R1, R2
adc R3
sys 0
";
    let (machine, _) = run_program(source);
    assert_eq!(machine.register(0), Some(1));
    assert_eq!(machine.register(3), Some(1));
}

#[test]
fn loop_counts_down_to_zero() {
    let source = "\
lc R0, 5
lc R1, 1
lc R2, 0
loop:
sub R0, R0, R1
bne R0, R2, loop
sys 0
";
    let (machine, _) = run_program(source);
    assert_eq!(machine.register(0), Some(0));
}

#[test]
fn emits_characters_through_sys_one() {
    // The caller leaves the byte in R0 for sys 1.
    let source = "\
lc R0, 72
sys 1
lc R0, 105
sys 1
sys 0
";
    let (_, out) = run_program(source);
    assert_eq!(out, b"Hi");
}

#[test]
fn subroutine_reads_arguments_through_its_window() {
    // double places its argument in the caller's R0, which the callee
    // sees as R2 across the two-slot window shift.
    let source = "\
lc R0, 21
js double
sys 0
double: 2
add R0, R2, R2
cpy R2, R0
ret
";
    let (machine, _) = run_program(source);
    assert_eq!(machine.register(0), Some(42));
}

#[test]
fn data_overlay_is_visible_to_loads() {
    let source = "\
lc R1, 0x00
lc R2, 0x20
ld R0, R1, R2
sys 0
";
    let lines: Vec<String> = source.lines().map(str::to_string).collect();
    let bytes = Assembler::new(0)
        .assemble(&lines, &mut io::sink())
        .unwrap();
    let mut image = MemoryImage::from_code(0, &bytes).unwrap();
    image.overlay(0x2000, &[0x5a]).unwrap();
    let mut machine = Machine::new(image, 0);
    machine.run(&mut io::sink()).unwrap();
    assert_eq!(machine.register(0), Some(0x5a));
}

#[test]
fn program_without_halt_stops_on_implicit_halt_byte() {
    let (machine, _) = run_program("lc R0, 1\nlc R1, 2");
    assert_eq!(machine.status(), Status::Halted);
    assert_eq!(machine.register(0), Some(1));
    assert_eq!(machine.register(1), Some(2));
}

#[test]
fn base_address_offsets_execution_start() {
    let lines: Vec<String> = "main:\nlc R0, 9\nsys 0"
        .lines()
        .map(str::to_string)
        .collect();
    let bytes = Assembler::new(0x400)
        .assemble(&lines, &mut io::sink())
        .unwrap();
    let image = MemoryImage::from_code(0x400, &bytes).unwrap();
    let mut machine = Machine::new(image, 0x400);
    machine.run(&mut io::sink()).unwrap();
    assert_eq!(machine.register(0), Some(9));
}
