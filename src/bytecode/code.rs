use serde::{Deserialize, Serialize};

use crate::bytecode::op::{OpCode, WORD};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    /// The cursor sits at the end of the buffer. Not a failure for the VM
    /// loop, which halts normally on it.
    #[error("end of bytecode")]
    EndOfData,

    #[error("truncated operand at {position}: needed {needed} bytes, {available} available")]
    Truncated {
        position: usize,
        needed: usize,
        available: usize,
    },

    #[error("address {addr} is outside the bytecode (length {len})")]
    BadAddress { addr: usize, len: usize },

    #[error("unknown opcode {byte:#04x} at {position}")]
    UnknownOpcode { byte: u8, position: usize },

    #[error("invalid operand {value} for '{op}' at {position}")]
    InvalidOperand {
        op: OpCode,
        value: i64,
        position: usize,
    },
}

/// An immutable, cursor-addressed program.
///
/// The compiler produces it once; the VM reads it sequentially and moves the
/// cursor on jumps, calls and returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteCode {
    buf: Vec<u8>,
    #[serde(skip)]
    pos: usize,
}

impl ByteCode {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Moves the cursor. `addr == len()` is allowed and means "finished".
    pub fn set_position(&mut self, addr: usize) -> Result<(), CodeError> {
        if addr > self.buf.len() {
            return Err(CodeError::BadAddress {
                addr,
                len: self.buf.len(),
            });
        }
        self.pos = addr;
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn read_byte(&mut self) -> Result<u8, CodeError> {
        let byte = *self.buf.get(self.pos).ok_or(CodeError::EndOfData)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Fills `out` from the cursor or fails without consuming anything.
    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<(), CodeError> {
        let available = self.buf.len() - self.pos;
        if available < out.len() {
            return Err(CodeError::Truncated {
                position: self.pos,
                needed: out.len(),
                available,
            });
        }
        out.copy_from_slice(&self.buf[self.pos..self.pos + out.len()]);
        self.pos += out.len();
        Ok(())
    }

    pub fn read_i64(&mut self) -> Result<i64, CodeError> {
        let mut word = [0u8; WORD];
        self.read_exact(&mut word)?;
        Ok(i64::from_le_bytes(word))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodeError> {
        let mut word = [0u8; WORD];
        self.read_exact(&mut word)?;
        Ok(f64::from_le_bytes(word))
    }

    /// Reads a non-negative integer operand (argument count or address).
    pub(crate) fn read_count(&mut self, op: OpCode, position: usize) -> Result<usize, CodeError> {
        let value = self.read_i64()?;
        usize::try_from(value).map_err(|_| CodeError::InvalidOperand {
            op,
            value,
            position,
        })
    }
}

impl From<Vec<u8>> for ByteCode {
    fn from(buf: Vec<u8>) -> Self {
        ByteCode::new(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_byte_until_end() {
        let mut code = ByteCode::new(vec![7, 8]);
        assert_eq!(code.read_byte(), Ok(7));
        assert_eq!(code.read_byte(), Ok(8));
        assert_eq!(code.read_byte(), Err(CodeError::EndOfData));
        assert_eq!(code.read_byte(), Err(CodeError::EndOfData));
        assert_eq!(code.position(), 2);
    }

    #[test]
    fn test_read_exact_truncated_keeps_cursor() {
        let mut code = ByteCode::new(vec![1, 2, 3]);
        code.read_byte().unwrap();
        let mut word = [0u8; 8];
        assert_eq!(
            code.read_exact(&mut word),
            Err(CodeError::Truncated {
                position: 1,
                needed: 8,
                available: 2
            })
        );
        assert_eq!(code.position(), 1);
    }

    #[test]
    fn test_read_words_little_endian() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-300i64).to_le_bytes());
        bytes.extend_from_slice(&2.5f64.to_le_bytes());
        let mut code = ByteCode::new(bytes);
        assert_eq!(code.read_i64(), Ok(-300));
        assert_eq!(code.read_f64(), Ok(2.5));
        assert_eq!(code.read_byte(), Err(CodeError::EndOfData));
    }

    #[test]
    fn test_set_position() {
        let mut code = ByteCode::new(vec![10, 20, 30]);
        code.set_position(2).unwrap();
        assert_eq!(code.read_byte(), Ok(30));
        code.set_position(3).unwrap();
        assert_eq!(code.read_byte(), Err(CodeError::EndOfData));
        assert_eq!(
            code.set_position(4),
            Err(CodeError::BadAddress { addr: 4, len: 3 })
        );
        code.rewind();
        assert_eq!(code.read_byte(), Ok(10));
    }
}
