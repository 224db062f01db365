//! # popi
//!
//! A small expression language compiled to a compact bytecode and run on a
//! stack VM.
//!
//! ```text
//! source --Lexer/Compiler--> ByteCode --Vm::exec--> data stack
//! ```
//!
//! Programs are `;`/newline separated expressions. Only the value of the last
//! one stays above the bindings made along the way:
//!
//! ```
//! let mut vm = popi::run("x = 7; x + 2; y = 8; x + y").unwrap();
//! assert_eq!(vm.pop(), Some(popi::Value::Integer(15)));
//! ```

pub mod bytecode;
pub mod frontend;
pub mod lang;
pub mod runtime;

pub use bytecode::compile::Compiler;
pub use bytecode::compile_error::{CompileError, SyntaxError};
pub use bytecode::image::{Image, ImageError};
pub use bytecode::{ByteCode, CodeError, Instr, OpCode, Slot};
pub use frontend::lexer::{Lexer, LexerError};
pub use lang::value::Value;
pub use runtime::{RuntimeError, RuntimeErrorKind, Vm, VmConfig, VmState};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Image(#[from] ImageError),
}

pub fn compile(source: &str) -> Result<ByteCode, CompileError> {
    Compiler::new(source).compile()
}

/// Compiles and executes `source` with the default [`VmConfig`], returning
/// the halted VM so the caller can pop results.
pub fn run(source: &str) -> Result<Vm, Error> {
    let mut vm = Vm::new(compile(source)?);
    vm.exec()?;
    Ok(vm)
}
