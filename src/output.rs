use std::fmt::Write;

use crate::machine::Machine;

/// Where PRN sends its value. The machine is agnostic to what happens with
/// emitted bytes, so hosts and tests can capture them however they like.
pub trait OutputSink {
    fn emit(&mut self, value: u8);
}

/// Prints each emitted value on its own line, in decimal.
pub struct Console;

impl OutputSink for Console {
    fn emit(&mut self, value: u8) {
        println!("{value}");
    }
}

impl OutputSink for Vec<u8> {
    fn emit(&mut self, value: u8) {
        self.push(value);
    }
}

/// One line of machine state: program counter, the three bytes under it,
/// all registers, and the condition code.
pub fn trace_line(machine: &Machine) -> String {
    let pc = machine.pc();
    let mut line = format!(
        "{:02X} | {:02X} {:02X} {:02X} |",
        pc,
        machine.mem(pc as u8),
        machine.mem((pc + 1) as u8),
        machine.mem((pc + 2) as u8),
    );
    for r in 0..8 {
        let _ = write!(line, " {:02X}", machine.reg(r));
    }
    let _ = write!(line, " | {:03b}", machine.flag() as u8);
    line
}
