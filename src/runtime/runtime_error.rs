use crate::bytecode::code::CodeError;
use crate::bytecode::op::{OpCode, Slot};
use crate::lang::value::{TagMismatch, Value};

/// What went wrong, independent of where.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeErrorKind {
    /// Unknown opcode, truncated operand, bad jump target: never produced by
    /// a correct compiler.
    #[error("malformed bytecode: {0}")]
    Decode(#[from] CodeError),

    #[error("'{op}': {mismatch}")]
    TagMismatch {
        op: OpCode,
        #[source]
        mismatch: TagMismatch,
    },

    #[error("'{op}' needs {needed} values, stack has {found}")]
    StackUnderflow {
        op: OpCode,
        needed: usize,
        found: usize,
    },

    #[error("slot {slot} resolves to address {addr}, outside the data stack (dp {dp})")]
    InvalidAddress { slot: Slot, addr: i128, dp: isize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("'{op}': integer overflow")]
    IntegerOverflow { op: OpCode },

    #[error("value {value} is not callable")]
    NotCallable { value: Value },

    #[error("'ret' outside of a function")]
    ReturnOutsideFunction,

    #[error("call depth limit exceeded ({limit})")]
    CallDepthExceeded { limit: usize },

    #[error("execution step limit exceeded ({limit})")]
    StepLimitExceeded { limit: usize },

    #[error("stack size limit exceeded ({limit})")]
    StackLimitExceeded { limit: usize },
}

/// A fatal VM error with the address of the failing instruction and the
/// active call frames, outermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub position: usize,
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error at {:04}: {}", self.position, self.kind)?;

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().rev().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, position: usize) -> Self {
        RuntimeError {
            kind,
            position,
            call_stack: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }
}
