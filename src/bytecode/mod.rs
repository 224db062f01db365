pub mod code;
pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod image;
pub mod op;

pub use code::{ByteCode, CodeError};
pub use op::{Instr, OpCode, Slot};
