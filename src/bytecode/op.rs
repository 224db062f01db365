use crate::bytecode::code::{ByteCode, CodeError};

// =============================================================================
// OPCODE - one byte per instruction
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // literals
    PushInt = 1,
    PushFloat,

    // stack ops
    Swap,
    Dup,
    Over,
    Rot,
    Drop,

    // bindings
    Get,
    SetInt,
    SetFloat,

    // integer arithmetic
    AddI,
    SubI,
    MulI,
    DivI,

    // float arithmetic
    AddF,
    SubF,
    MulF,
    DivF,

    // control flow
    Return,
    Call,
    Jump,
}

/// Width in bytes of an integer or float operand.
pub const WORD: usize = 8;

impl OpCode {
    const ALL: [OpCode; 21] = [
        OpCode::PushInt,
        OpCode::PushFloat,
        OpCode::Swap,
        OpCode::Dup,
        OpCode::Over,
        OpCode::Rot,
        OpCode::Drop,
        OpCode::Get,
        OpCode::SetInt,
        OpCode::SetFloat,
        OpCode::AddI,
        OpCode::SubI,
        OpCode::MulI,
        OpCode::DivI,
        OpCode::AddF,
        OpCode::SubF,
        OpCode::MulF,
        OpCode::DivF,
        OpCode::Return,
        OpCode::Call,
        OpCode::Jump,
    ];

    pub fn from_byte(byte: u8) -> Option<OpCode> {
        OpCode::ALL.get(usize::from(byte).checked_sub(1)?).copied()
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Size of the operand region that follows the opcode byte.
    pub fn operand_len(self) -> usize {
        match self {
            OpCode::PushInt | OpCode::PushFloat | OpCode::Get | OpCode::Call | OpCode::Jump => {
                WORD
            }
            OpCode::SetInt | OpCode::SetFloat => 2 * WORD,
            _ => 0,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::PushInt => "pushi",
            OpCode::PushFloat => "pushf",
            OpCode::Swap => "swap",
            OpCode::Dup => "dup",
            OpCode::Over => "over",
            OpCode::Rot => "rot",
            OpCode::Drop => "drop",
            OpCode::Get => "get",
            OpCode::SetInt => "seti",
            OpCode::SetFloat => "setf",
            OpCode::AddI => "addi",
            OpCode::SubI => "subi",
            OpCode::MulI => "muli",
            OpCode::DivI => "divi",
            OpCode::AddF => "addf",
            OpCode::SubF => "subf",
            OpCode::MulF => "mulf",
            OpCode::DivF => "divf",
            OpCode::Return => "ret",
            OpCode::Call => "call",
            OpCode::Jump => "jump",
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.mnemonic())
    }
}

// =============================================================================
// SLOT - where a binding lives on the data stack
// =============================================================================

/// Location operand of `get`, `seti` and `setf`.
///
/// On the wire both variants share one signed word: non-negative values are
/// frame-relative, negative values are stack-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// `frame.dp + n + 1`: parameters and bindings made inside a frame.
    FrameRelative(usize),
    /// `dp - n`, with `n >= 1`: counted down from the current top.
    StackRelative(usize),
}

impl Slot {
    pub fn encode(self) -> i64 {
        match self {
            Slot::FrameRelative(n) => n as i64,
            Slot::StackRelative(n) => (n as i64).wrapping_neg(),
        }
    }

    pub fn decode(raw: i64) -> Slot {
        if raw >= 0 {
            Slot::FrameRelative(raw as usize)
        } else {
            Slot::StackRelative(raw.unsigned_abs() as usize)
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::FrameRelative(n) => write!(f, "fp+{}", n),
            Slot::StackRelative(n) => write!(f, "sp-{}", n),
        }
    }
}

// =============================================================================
// INSTR - an opcode together with its decoded operands
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instr {
    PushInt(i64),
    PushFloat(f64),

    Swap,
    Dup,
    Over,
    Rot,
    Drop,

    Get(Slot),
    SetInt(Slot, i64),
    SetFloat(Slot, f64),

    AddI,
    SubI,
    MulI,
    DivI,
    AddF,
    SubF,
    MulF,
    DivF,

    Return,
    /// Invoke the function value sitting below `argc` arguments.
    Call(usize),
    /// Absolute code address.
    Jump(usize),
}

impl Instr {
    pub fn opcode(&self) -> OpCode {
        match self {
            Instr::PushInt(_) => OpCode::PushInt,
            Instr::PushFloat(_) => OpCode::PushFloat,
            Instr::Swap => OpCode::Swap,
            Instr::Dup => OpCode::Dup,
            Instr::Over => OpCode::Over,
            Instr::Rot => OpCode::Rot,
            Instr::Drop => OpCode::Drop,
            Instr::Get(_) => OpCode::Get,
            Instr::SetInt(..) => OpCode::SetInt,
            Instr::SetFloat(..) => OpCode::SetFloat,
            Instr::AddI => OpCode::AddI,
            Instr::SubI => OpCode::SubI,
            Instr::MulI => OpCode::MulI,
            Instr::DivI => OpCode::DivI,
            Instr::AddF => OpCode::AddF,
            Instr::SubF => OpCode::SubF,
            Instr::MulF => OpCode::MulF,
            Instr::DivF => OpCode::DivF,
            Instr::Return => OpCode::Return,
            Instr::Call(_) => OpCode::Call,
            Instr::Jump(_) => OpCode::Jump,
        }
    }

    /// Encoded size: opcode byte plus operands.
    pub fn encoded_len(&self) -> usize {
        1 + self.opcode().operand_len()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode().byte());
        match *self {
            Instr::PushInt(n) => out.extend_from_slice(&n.to_le_bytes()),
            Instr::PushFloat(x) => out.extend_from_slice(&x.to_le_bytes()),
            Instr::Get(slot) => out.extend_from_slice(&slot.encode().to_le_bytes()),
            Instr::SetInt(slot, n) => {
                out.extend_from_slice(&slot.encode().to_le_bytes());
                out.extend_from_slice(&n.to_le_bytes());
            }
            Instr::SetFloat(slot, x) => {
                out.extend_from_slice(&slot.encode().to_le_bytes());
                out.extend_from_slice(&x.to_le_bytes());
            }
            Instr::Call(argc) => out.extend_from_slice(&(argc as i64).to_le_bytes()),
            Instr::Jump(addr) => out.extend_from_slice(&(addr as i64).to_le_bytes()),
            _ => {}
        }
    }

    /// Decodes the instruction at the cursor.
    ///
    /// Returns `CodeError::EndOfData` only when the cursor already sits at the
    /// end; a partial instruction is `Truncated`.
    pub fn decode(code: &mut ByteCode) -> Result<Instr, CodeError> {
        let position = code.position();
        let byte = code.read_byte()?;
        let op = OpCode::from_byte(byte).ok_or(CodeError::UnknownOpcode { byte, position })?;

        let instr = match op {
            OpCode::PushInt => Instr::PushInt(code.read_i64()?),
            OpCode::PushFloat => Instr::PushFloat(code.read_f64()?),
            OpCode::Swap => Instr::Swap,
            OpCode::Dup => Instr::Dup,
            OpCode::Over => Instr::Over,
            OpCode::Rot => Instr::Rot,
            OpCode::Drop => Instr::Drop,
            OpCode::Get => Instr::Get(Slot::decode(code.read_i64()?)),
            OpCode::SetInt => {
                let slot = Slot::decode(code.read_i64()?);
                Instr::SetInt(slot, code.read_i64()?)
            }
            OpCode::SetFloat => {
                let slot = Slot::decode(code.read_i64()?);
                Instr::SetFloat(slot, code.read_f64()?)
            }
            OpCode::AddI => Instr::AddI,
            OpCode::SubI => Instr::SubI,
            OpCode::MulI => Instr::MulI,
            OpCode::DivI => Instr::DivI,
            OpCode::AddF => Instr::AddF,
            OpCode::SubF => Instr::SubF,
            OpCode::MulF => Instr::MulF,
            OpCode::DivF => Instr::DivF,
            OpCode::Return => Instr::Return,
            OpCode::Call => Instr::Call(code.read_count(op, position)?),
            OpCode::Jump => Instr::Jump(code.read_count(op, position)?),
        };

        Ok(instr)
    }
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = self.opcode();
        match self {
            Instr::PushInt(n) => write!(f, "{:<6} {}", op, n),
            Instr::PushFloat(x) => write!(f, "{:<6} {:?}", op, x),
            Instr::Get(slot) => write!(f, "{:<6} {}", op, slot),
            Instr::SetInt(slot, n) => write!(f, "{:<6} {} {}", op, slot, n),
            Instr::SetFloat(slot, x) => write!(f, "{:<6} {} {:?}", op, slot, x),
            Instr::Call(argc) => write!(f, "{:<6} {}", op, argc),
            Instr::Jump(addr) => write!(f, "{:<6} {:04}", op, addr),
            _ => write!(f, "{}", op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_bytes_are_stable() {
        assert_eq!(OpCode::PushInt.byte(), 1);
        assert_eq!(OpCode::Drop.byte(), 7);
        assert_eq!(OpCode::DivF.byte(), 18);
        assert_eq!(OpCode::Return.byte(), 19);
        assert_eq!(OpCode::Call.byte(), 20);
        assert_eq!(OpCode::Jump.byte(), 21);
    }

    #[test]
    fn test_from_byte() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::from_byte(op.byte()), Some(op));
        }
        assert_eq!(OpCode::from_byte(0), None);
        assert_eq!(OpCode::from_byte(22), None);
        assert_eq!(OpCode::from_byte(0xff), None);
    }

    #[test]
    fn test_slot_sign_convention() {
        assert_eq!(Slot::FrameRelative(0).encode(), 0);
        assert_eq!(Slot::FrameRelative(3).encode(), 3);
        assert_eq!(Slot::StackRelative(2).encode(), -2);
        assert_eq!(Slot::decode(5), Slot::FrameRelative(5));
        assert_eq!(Slot::decode(-1), Slot::StackRelative(1));
    }

    #[test]
    fn test_encode_layout() {
        let mut out = Vec::new();
        Instr::PushInt(-2).encode(&mut out);
        assert_eq!(out.len(), 9);
        assert_eq!(out[0], 1);
        assert_eq!(&out[1..], &(-2i64).to_le_bytes());

        let mut out = Vec::new();
        Instr::SetFloat(Slot::StackRelative(1), 0.5).encode(&mut out);
        assert_eq!(out.len(), Instr::SetFloat(Slot::StackRelative(1), 0.5).encoded_len());
        assert_eq!(&out[1..9], &(-1i64).to_le_bytes());
        assert_eq!(&out[9..], &0.5f64.to_le_bytes());
    }

    #[test]
    fn test_decode_sequence() {
        let instrs = [
            Instr::PushFloat(1.25),
            Instr::Get(Slot::FrameRelative(1)),
            Instr::Call(2),
            Instr::Jump(40),
            Instr::Return,
        ];
        let mut bytes = Vec::new();
        for instr in &instrs {
            instr.encode(&mut bytes);
        }

        let mut code = ByteCode::new(bytes);
        for expected in instrs {
            assert_eq!(Instr::decode(&mut code).unwrap(), expected);
        }
        assert_eq!(Instr::decode(&mut code), Err(CodeError::EndOfData));
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let mut code = ByteCode::new(vec![4, 99]);
        assert_eq!(Instr::decode(&mut code).unwrap(), Instr::Dup);
        assert_eq!(
            Instr::decode(&mut code),
            Err(CodeError::UnknownOpcode {
                byte: 99,
                position: 1
            })
        );
    }

    #[test]
    fn test_decode_truncated_operand() {
        let mut code = ByteCode::new(vec![1, 0, 0]);
        assert!(matches!(
            Instr::decode(&mut code),
            Err(CodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_negative_call_count() {
        let mut bytes = vec![OpCode::Call.byte()];
        bytes.extend_from_slice(&(-1i64).to_le_bytes());
        let mut code = ByteCode::new(bytes);
        assert!(matches!(
            Instr::decode(&mut code),
            Err(CodeError::InvalidOperand { value: -1, .. })
        ));
    }
}
