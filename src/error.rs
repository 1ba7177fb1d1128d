use std::num::ParseIntError;
use std::ops::Range;

use miette::{miette, Diagnostic, LabeledSpan, Report, Severity};
use thiserror::Error;

/// Everything that can stop a run. All of these are fatal; the machine state
/// is left as it was when the fault was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Diagnostic)]
pub enum ExecError {
    /// Fetched byte does not decode to any instruction.
    #[error("illegal instruction 0x{opcode:02X} at address {addr}")]
    #[diagnostic(
        code(run::illegal),
        help("the program counter may have wandered into data; check that jump targets land on instruction boundaries")
    )]
    IllegalInstruction { opcode: u8, addr: u16 },

    /// ALU-class byte whose selector bits name no implemented operation.
    #[error("unsupported ALU operation 0x{opcode:02X} at address {addr}")]
    #[diagnostic(code(run::unsupported), help("the ALU implements ADD, MULT and CMP"))]
    UnsupportedOperation { opcode: u8, addr: u16 },

    /// A push would move the stack pointer below address 0.
    #[error("stack overflow at address {addr}")]
    #[diagnostic(
        code(run::stack_overflow),
        help("the stack grows down from 0xF4 and has run out of memory")
    )]
    StackOverflow { addr: u16 },

    /// A pop would move the stack pointer past the last memory cell.
    #[error("stack underflow at address {addr}")]
    #[diagnostic(
        code(run::stack_underflow),
        help("more values were popped than were ever pushed")
    )]
    StackUnderflow { addr: u16 },

    #[error("program is {len} bytes but memory holds 256")]
    #[diagnostic(
        code(load::too_large),
        help("the whole program must fit in memory, stack included")
    )]
    ProgramTooLarge { len: usize },

    /// The program counter, or an operand cell of the current instruction,
    /// fell outside memory.
    #[error("address {addr} is outside memory")]
    #[diagnostic(
        code(run::addr),
        help("valid addresses are 0 to 255; running off the end of a program without HLT ends up here")
    )]
    AddressOutOfRange { addr: u16 },
}

// Loader errors

pub fn load_invalid_lit(span: Range<usize>, src: &str, e: ParseIntError) -> Report {
    miette!(
        severity = Severity::Error,
        code = "load::bad_lit",
        help = "a machine code byte is eight binary digits, like 10000010",
        labels = vec![LabeledSpan::at(span, "not a binary byte")],
        "Expected a binary byte literal: {e}",
    )
    .with_source_code(src.to_string())
}
