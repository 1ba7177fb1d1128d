// Instruction set
mod opcode;
pub use opcode::Opcode;

// Running
mod machine;
pub use machine::{Flag, Machine, MEMORY_MAX, STACK_INIT};
mod output;
pub use output::{trace_line, Console, OutputSink};

// Loading
mod loader;
pub use loader::parse_image;

mod error;
pub use error::ExecError;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
