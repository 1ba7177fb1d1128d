use std::cmp::Ordering;

use crate::error::ExecError;
use crate::opcode::Opcode;
use crate::output::OutputSink;

/// The LS-8 can address 256 bytes of memory.
pub const MEMORY_MAX: usize = 256;

/// Power-on value of the stack pointer, R7. The stack grows down from here.
pub const STACK_INIT: u8 = 0xF4;

/// Represents complete machine state during a run.
#[derive(Debug)]
pub struct Machine {
    /// System memory. The program sits at address 0, the stack grows down
    /// from `STACK_INIT`.
    mem: [u8; MEMORY_MAX],
    /// 8x 8-bit registers. R7 doubles as the stack pointer.
    reg: [u8; 8],
    /// Program counter. Wider than a byte so the advance past the last cell
    /// is representable and caught at the next fetch.
    pc: u16,
    /// Condition code
    flag: Flag,
    /// Set by HLT. Further steps are no-ops.
    halted: bool,
}

/// Condition code, set as a whole by CMP. Exactly one variant holds at any
/// time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    Equal = 0b001,
    Greater = 0b010,
    Less = 0b100,
    Clear = 0b000,
}

impl Machine {
    pub fn new() -> Machine {
        Machine {
            mem: [0; MEMORY_MAX],
            reg: [0, 0, 0, 0, 0, 0, 0, STACK_INIT],
            pc: 0,
            flag: Flag::Clear,
            halted: false,
        }
    }

    /// Power on with a program image already in place.
    pub fn from_image(image: &[u8]) -> Result<Machine, ExecError> {
        let mut machine = Machine::new();
        machine.load(image)?;
        Ok(machine)
    }

    /// Copy a program image into memory starting at address 0.
    pub fn load(&mut self, image: &[u8]) -> Result<(), ExecError> {
        if image.len() > MEMORY_MAX {
            return Err(ExecError::ProgramTooLarge { len: image.len() });
        }
        self.mem[..image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Run until HLT or a fault. Hosts that need to bound runaway programs
    /// drive [`Machine::step`] themselves instead.
    pub fn run(&mut self, out: &mut impl OutputSink) -> Result<(), ExecError> {
        while !self.halted {
            self.step(out)?;
        }
        Ok(())
    }

    /// One fetch-decode-execute cycle.
    pub fn step(&mut self, out: &mut impl OutputSink) -> Result<(), ExecError> {
        if self.halted {
            return Ok(());
        }

        let at = self.pc;
        if at >= MEMORY_MAX as u16 {
            return Err(ExecError::AddressOutOfRange { addr: at });
        }
        let byte = self.mem[at as usize];
        let opcode = match Opcode::decode(byte) {
            Some(opcode) => opcode,
            None if Opcode::is_alu_class(byte) => {
                return Err(ExecError::UnsupportedOperation { opcode: byte, addr: at });
            }
            None => return Err(ExecError::IllegalInstruction { opcode: byte, addr: at }),
        };
        let width = opcode.width();
        if at + width > MEMORY_MAX as u16 {
            // An operand cell of this instruction is past the last address
            return Err(ExecError::AddressOutOfRange { addr: at + width - 1 });
        }

        match opcode {
            Opcode::Hlt => self.halted = true,
            Opcode::Ldi => self.ldi(),
            Opcode::Prn => self.prn(out),
            Opcode::Add => self.add(),
            Opcode::Mult => {
                // The ALU hands the product back; storing it is the caller's job
                let dst = self.operand(1);
                let product = self.mult(dst, self.operand(2));
                *self.reg_mut(dst) = product;
            }
            Opcode::Cmp => self.cmp(),
            Opcode::Push => self.push()?,
            Opcode::Pop => self.pop()?,
            Opcode::Call => self.call()?,
            Opcode::Ret => self.ret()?,
            Opcode::Jmp => self.jmp(),
            Opcode::Jeq => self.jeq(),
            Opcode::Jne => self.jne(),
        }

        if !opcode.sets_pc() {
            self.pc += width;
        }
        Ok(())
    }

    /// Current program counter.
    #[inline]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    /// Register contents. Register fields are 3 bits wide, so only the low
    /// three bits of `r` are used.
    #[inline]
    pub fn reg(&self, r: u8) -> u8 {
        self.reg[(r & 0b111) as usize]
    }

    /// Memory contents. A byte address always lands inside the 256 cells.
    #[inline]
    pub fn mem(&self, addr: u8) -> u8 {
        self.mem[addr as usize]
    }

    #[inline]
    pub fn flag(&self) -> Flag {
        self.flag
    }

    #[inline]
    pub fn halted(&self) -> bool {
        self.halted
    }

    #[inline]
    fn reg_mut(&mut self, r: u8) -> &mut u8 {
        &mut self.reg[(r & 0b111) as usize]
    }

    /// Operand byte `k` of the current instruction. Callers stay within the
    /// width checked at fetch time.
    #[inline]
    fn operand(&self, k: u16) -> u8 {
        self.mem[(self.pc + k) as usize]
    }

    fn push_byte(&mut self, val: u8) -> Result<(), ExecError> {
        let sp = self.reg[7];
        if sp == 0 {
            return Err(ExecError::StackOverflow { addr: self.pc });
        }
        // Decrement stack, then save onto it
        let sp = sp - 1;
        self.reg[7] = sp;
        self.mem[sp as usize] = val;
        Ok(())
    }

    fn pop_byte(&mut self) -> Result<u8, ExecError> {
        let sp = self.reg[7];
        if sp == u8::MAX {
            return Err(ExecError::StackUnderflow { addr: self.pc });
        }
        let val = self.mem[sp as usize];
        self.reg[7] = sp + 1;
        Ok(val)
    }

    fn ldi(&mut self) {
        let (dst, literal) = (self.operand(1), self.operand(2));
        *self.reg_mut(dst) = literal;
    }

    fn prn(&self, out: &mut impl OutputSink) {
        out.emit(self.reg(self.operand(1)));
    }

    fn push(&mut self) -> Result<(), ExecError> {
        let val = self.reg(self.operand(1));
        self.push_byte(val)
    }

    fn pop(&mut self) -> Result<(), ExecError> {
        let val = self.pop_byte()?;
        let dst = self.operand(1);
        *self.reg_mut(dst) = val;
        Ok(())
    }

    fn call(&mut self) -> Result<(), ExecError> {
        let ret = self.pc + 2;
        if ret >= MEMORY_MAX as u16 {
            // The return address would not fit in a memory cell
            return Err(ExecError::AddressOutOfRange { addr: ret });
        }
        self.push_byte(ret as u8)?;
        self.pc = self.reg(self.operand(1)) as u16;
        Ok(())
    }

    fn ret(&mut self) -> Result<(), ExecError> {
        self.pc = self.pop_byte()? as u16;
        Ok(())
    }

    fn jmp(&mut self) {
        self.pc = self.reg(self.operand(1)) as u16;
    }

    fn jeq(&mut self) {
        if self.flag == Flag::Equal {
            self.jmp();
        } else {
            self.pc += 2;
        }
    }

    fn jne(&mut self) {
        if self.flag != Flag::Equal {
            self.jmp();
        } else {
            self.pc += 2;
        }
    }

    fn add(&mut self) {
        let (a, b) = (self.operand(1), self.operand(2));
        let sum = self.reg(a).wrapping_add(self.reg(b));
        *self.reg_mut(a) = sum;
    }

    /// Wrapping product of two registers. Unlike ADD, the result is handed
    /// back instead of written to a register.
    fn mult(&self, a: u8, b: u8) -> u8 {
        self.reg(a).wrapping_mul(self.reg(b))
    }

    fn cmp(&mut self) {
        let (a, b) = (self.operand(1), self.operand(2));
        self.flag = match self.reg(a).cmp(&self.reg(b)) {
            Ordering::Less => Flag::Less,
            Ordering::Equal => Flag::Equal,
            Ordering::Greater => Flag::Greater,
        };
    }
}

impl Default for Machine {
    fn default() -> Machine {
        Machine::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_program(image: &[u8]) -> (Machine, Vec<u8>) {
        let mut machine = Machine::from_image(image).unwrap();
        let mut out = Vec::new();
        machine.run(&mut out).unwrap();
        (machine, out)
    }

    fn run_expect_err(image: &[u8]) -> (Machine, Vec<u8>, ExecError) {
        let mut machine = Machine::from_image(image).unwrap();
        let mut out = Vec::new();
        let err = machine.run(&mut out).unwrap_err();
        (machine, out, err)
    }

    #[test]
    fn power_on_state() {
        let machine = Machine::new();
        assert_eq!(machine.pc(), 0);
        assert_eq!(machine.flag(), Flag::Clear);
        assert!(!machine.halted());
        for r in 0..7 {
            assert_eq!(machine.reg(r), 0);
        }
        assert_eq!(machine.reg(7), STACK_INIT);
        assert_eq!(machine.mem(0), 0);
        assert_eq!(machine.mem(255), 0);
    }

    #[test]
    fn mult_program_prints_product() {
        #[rustfmt::skip]
        let (machine, out) = run_program(&[
            130, 0, 8, // LDI R0 8
            130, 1, 9, // LDI R1 9
            162, 0, 1, // MULT R0 R1
            71, 0,     // PRN R0
            1,         // HLT
        ]);
        assert_eq!(out, [72]);
        assert!(machine.halted());
        assert_eq!(machine.reg(0), 72);
        assert_eq!(machine.reg(1), 9, "MULT must not clobber its source");
        assert_eq!(machine.pc(), 12);
    }

    #[test]
    fn prints_literals_in_program_order() {
        let (_, out) = run_program(&[130, 0, 1, 71, 0, 130, 0, 2, 71, 0, 1]);
        assert_eq!(out, [1, 2]);
    }

    #[test]
    fn add_wraps_around() {
        #[rustfmt::skip]
        let (machine, out) = run_program(&[
            130, 0, 200, // LDI R0 200
            130, 1, 100, // LDI R1 100
            160, 0, 1,   // ADD R0 R1
            71, 0,       // PRN R0
            1,           // HLT
        ]);
        assert_eq!(out, [44]);
        assert_eq!(machine.reg(1), 100);
    }

    #[test]
    fn mult_wraps_around() {
        let (_, out) = run_program(&[130, 0, 16, 130, 1, 16, 162, 0, 1, 71, 0, 1]);
        assert_eq!(out, [0]);
    }

    #[test]
    fn cmp_sets_exactly_one_flag() {
        let cases = [(5, 5, Flag::Equal), (9, 5, Flag::Greater), (3, 5, Flag::Less)];
        for (a, b, expected) in cases {
            let (machine, _) = run_program(&[130, 0, a, 130, 1, b, 167, 0, 1, 1]);
            assert_eq!(machine.flag(), expected, "CMP {a} {b}");
        }
    }

    #[test]
    fn flags_hold_until_next_cmp() {
        #[rustfmt::skip]
        let image = [
            130, 0, 5, // LDI R0 5
            130, 1, 5, // LDI R1 5
            167, 0, 1, // CMP R0 R1
            130, 2, 9, // LDI R2 9
            167, 0, 3, // CMP R0 R3
            1,         // HLT
        ];
        let mut machine = Machine::from_image(&image).unwrap();
        let mut out = Vec::new();
        for _ in 0..3 {
            machine.step(&mut out).unwrap();
        }
        assert_eq!(machine.flag(), Flag::Equal);
        machine.step(&mut out).unwrap();
        assert_eq!(machine.flag(), Flag::Equal, "LDI must leave the flags alone");
        machine.step(&mut out).unwrap();
        assert_eq!(machine.flag(), Flag::Greater);
    }

    #[test]
    fn push_writes_at_decremented_pointer() {
        let image = [130, 0, 42, 69, 0, 1];
        let mut machine = Machine::from_image(&image).unwrap();
        let mut out = Vec::new();
        machine.step(&mut out).unwrap();
        machine.step(&mut out).unwrap();
        assert_eq!(machine.reg(7), STACK_INIT - 1);
        assert_eq!(machine.mem(STACK_INIT - 1), 42);
    }

    #[test]
    fn push_pop_round_trip() {
        #[rustfmt::skip]
        let (machine, _) = run_program(&[
            130, 0, 42, // LDI R0 42
            69, 0,      // PUSH R0
            130, 0, 0,  // LDI R0 0
            70, 1,      // POP R1
            1,          // HLT
        ]);
        assert_eq!(machine.reg(1), 42);
        assert_eq!(machine.reg(7), STACK_INIT, "stack pointer must be restored");
    }

    #[test]
    fn pop_above_stack_init_is_allowed() {
        let (machine, _) = run_program(&[70, 1, 1]);
        assert_eq!(machine.reg(1), 0);
        assert_eq!(machine.reg(7), STACK_INIT + 1);
    }

    #[test]
    fn call_then_ret_resumes_after_call() {
        #[rustfmt::skip]
        let (machine, out) = run_program(&[
            130, 1, 8,  // LDI R1 8
            80, 1,      // CALL R1
            71, 0,      // PRN R0
            1,          // HLT
            130, 0, 42, // LDI R0 42 (subroutine)
            17,         // RET
        ]);
        assert_eq!(out, [42], "PRN after the CALL must see the subroutine's work");
        assert_eq!(machine.reg(7), STACK_INIT);
        assert!(machine.halted());
        assert_eq!(machine.pc(), 8);
    }

    #[test]
    fn jmp_skips_to_register_target() {
        #[rustfmt::skip]
        let (machine, out) = run_program(&[
            130, 1, 7, // LDI R1 7
            84, 1,     // JMP R1
            71, 0,     // PRN R0 (skipped)
            1,         // HLT
        ]);
        assert!(out.is_empty());
        assert!(machine.halted());
    }

    #[test]
    fn jeq_jne_follow_equal_flag() {
        // Jump target 16 is the HLT; falling through runs the PRN first
        let cases: [(u8, u8, u8, &[u8]); 4] = [
            (85, 5, 5, &[]),
            (85, 5, 6, &[5]),
            (86, 5, 6, &[]),
            (86, 5, 5, &[5]),
        ];
        for (jump, a, b, expected) in cases {
            #[rustfmt::skip]
            let (machine, out) = run_program(&[
                130, 0, a,   // LDI R0 a
                130, 1, b,   // LDI R1 b
                167, 0, 1,   // CMP R0 R1
                130, 2, 16,  // LDI R2 16
                jump, 2,     // JEQ/JNE R2
                71, 0,       // PRN R0
                1,           // HLT
            ]);
            assert_eq!(out, expected, "opcode {jump} with CMP {a} {b}");
            assert!(machine.halted());
        }
    }

    #[test]
    fn hlt_leaves_pc_after_instruction() {
        let mut machine = Machine::from_image(&[1]).unwrap();
        let mut out = Vec::new();
        machine.run(&mut out).unwrap();
        assert!(machine.halted());
        assert_eq!(machine.pc(), 1);

        // Stepping a halted machine does nothing
        machine.step(&mut out).unwrap();
        assert_eq!(machine.pc(), 1);
    }

    #[test]
    fn unknown_opcode_faults() {
        for byte in [0, 2, 18] {
            let (machine, _, err) = run_expect_err(&[byte]);
            assert_eq!(err, ExecError::IllegalInstruction { opcode: byte, addr: 0 });
            assert!(!machine.halted());
        }
    }

    #[test]
    fn unknown_alu_selector_faults() {
        for byte in [161, 255] {
            let (_, _, err) = run_expect_err(&[byte, 0, 1]);
            assert_eq!(err, ExecError::UnsupportedOperation { opcode: byte, addr: 0 });
        }
    }

    #[test]
    fn image_larger_than_memory_rejected() {
        let image = vec![0u8; MEMORY_MAX + 1];
        let err = Machine::from_image(&image).unwrap_err();
        assert_eq!(err, ExecError::ProgramTooLarge { len: MEMORY_MAX + 1 });

        assert!(Machine::from_image(&[0u8; MEMORY_MAX]).is_ok());
    }

    #[test]
    fn running_off_the_end_faults() {
        // PRN R0 repeated across all of memory, no HLT anywhere
        let image = [71, 0].repeat(128);
        let (_, out, err) = run_expect_err(&image);
        assert_eq!(out.len(), 128);
        assert!(out.iter().all(|&v| v == 0));
        assert_eq!(err, ExecError::AddressOutOfRange { addr: 256 });
    }

    #[test]
    fn operands_past_the_end_fault() {
        // A 3-byte LDI starting at the second-to-last cell
        let mut image = vec![0u8; MEMORY_MAX];
        image[..5].copy_from_slice(&[130, 1, 254, 84, 1]);
        image[254] = 130;
        image[255] = 7;
        let (_, _, err) = run_expect_err(&image);
        assert_eq!(err, ExecError::AddressOutOfRange { addr: 256 });
    }

    #[test]
    fn call_at_top_of_memory_faults() {
        // CALL at 254 would have to push return address 256
        let mut image = vec![0u8; MEMORY_MAX];
        image[..5].copy_from_slice(&[130, 1, 254, 84, 1]);
        image[254] = 80;
        image[255] = 0;
        let (machine, _, err) = run_expect_err(&image);
        assert_eq!(err, ExecError::AddressOutOfRange { addr: 256 });
        assert_eq!(machine.reg(7), STACK_INIT, "nothing may be pushed on a fault");
    }

    #[test]
    fn stack_overflow_faults() {
        #[rustfmt::skip]
        let (_, _, err) = run_expect_err(&[
            130, 7, 1, // LDI R7 1
            69, 0,     // PUSH R0
            69, 0,     // PUSH R0
        ]);
        assert_eq!(err, ExecError::StackOverflow { addr: 5 });
    }

    #[test]
    fn stack_underflow_faults() {
        #[rustfmt::skip]
        let (_, _, err) = run_expect_err(&[
            130, 7, 255, // LDI R7 255
            70, 0,       // POP R0
        ]);
        assert_eq!(err, ExecError::StackUnderflow { addr: 3 });
    }

    #[test]
    fn register_fields_use_three_bits() {
        // Register 9 is register 1 with a stray high bit
        let (machine, out) = run_program(&[130, 9, 77, 71, 1, 1]);
        assert_eq!(out, [77]);
        assert_eq!(machine.reg(1), 77);
        assert_eq!(machine.reg(9), 77);
    }
}
