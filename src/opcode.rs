use std::fmt::{self, Display};

/// Instruction opcodes. The byte packs decode information alongside the
/// instruction identity:
///
/// ```text
/// 76 5 4 3210
/// AA B C DDDD
/// ```
///
/// `AA` is the operand count, `B` marks ALU operations, `C` marks
/// instructions that set the program counter themselves, and `DDDD` tells
/// instructions of the same class apart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Hlt = 0b0000_0001,
    Ret = 0b0001_0001,
    Push = 0b0100_0101,
    Pop = 0b0100_0110,
    Prn = 0b0100_0111,
    Call = 0b0101_0000,
    Jmp = 0b0101_0100,
    Jeq = 0b0101_0101,
    Jne = 0b0101_0110,
    Ldi = 0b1000_0010,
    Add = 0b1010_0000,
    Mult = 0b1010_0010,
    Cmp = 0b1010_0111,
}

impl Opcode {
    /// Decode a fetched byte. Bytes outside the instruction set return `None`
    /// and the machine reports them instead of guessing a width.
    pub fn decode(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match byte {
            0b0000_0001 => Hlt,
            0b0001_0001 => Ret,
            0b0100_0101 => Push,
            0b0100_0110 => Pop,
            0b0100_0111 => Prn,
            0b0101_0000 => Call,
            0b0101_0100 => Jmp,
            0b0101_0101 => Jeq,
            0b0101_0110 => Jne,
            0b1000_0010 => Ldi,
            0b1010_0000 => Add,
            0b1010_0010 => Mult,
            0b1010_0111 => Cmp,
            _ => return None,
        })
    }

    /// Total instruction width in bytes, opcode included.
    #[inline]
    pub fn width(self) -> u16 {
        1 + (self as u8 >> 6) as u16
    }

    /// Whether the handler writes the program counter itself. The dispatch
    /// loop must not apply the fixed-width advance on top of that.
    #[inline]
    pub fn sets_pc(self) -> bool {
        self as u8 & 0b0001_0000 != 0
    }

    /// ALU operations carry bit 5 whether or not the selector bits name an
    /// operation the ALU implements.
    #[inline]
    pub fn is_alu_class(byte: u8) -> bool {
        byte & 0b0010_0000 != 0
    }

    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Hlt => "HLT",
            Ret => "RET",
            Push => "PUSH",
            Pop => "POP",
            Prn => "PRN",
            Call => "CALL",
            Jmp => "JMP",
            Jeq => "JEQ",
            Jne => "JNE",
            Ldi => "LDI",
            Add => "ADD",
            Mult => "MULT",
            Cmp => "CMP",
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
