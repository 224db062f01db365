use tracing::{debug, trace};

use crate::bytecode::code::{ByteCode, CodeError};
use crate::bytecode::op::{OpCode, Slot};
use crate::lang::value::Value;
use crate::runtime::runtime_error::{RuntimeError, RuntimeErrorKind};

type Result<T> = std::result::Result<T, RuntimeErrorKind>;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_call_depth: usize,
    pub max_steps: Option<usize>,
    pub max_stack_size: usize,
    pub initial_stack_capacity: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_call_depth: 1000,
            max_steps: None,
            max_stack_size: 1 << 20,
            initial_stack_capacity: 1 << 10,
        }
    }
}

/// One activation record on the call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Name shown in error traces.
    pub ident: String,
    /// Data-stack top index when the frame was entered. Frame-relative slots
    /// count from `dp + 1`.
    pub dp: isize,
    /// Where `ret` resumes.
    pub return_addr: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Running,
    Halted,
    Failed,
}

/// Stack-based bytecode interpreter.
///
/// The VM owns its program for one execution. Execution runs until the
/// cursor reaches the end of the code (normal halt) or an instruction fails
/// (the run is aborted). Either way the VM is finished afterwards; the data
/// stack stays readable through [`Vm::pop`].
pub struct Vm {
    stack: Vec<Value>,
    frames: Vec<StackFrame>,
    code: ByteCode,
    config: VmConfig,
    steps: usize,
    /// Address of the instruction being executed.
    current: usize,
    state: VmState,
}

impl Vm {
    pub fn new(code: ByteCode) -> Self {
        Self::with_config(code, VmConfig::default())
    }

    pub fn with_config(mut code: ByteCode, config: VmConfig) -> Self {
        code.rewind();
        Self {
            stack: Vec::with_capacity(config.initial_stack_capacity),
            frames: vec![StackFrame {
                ident: "top".to_string(),
                dp: -1,
                return_addr: 0,
            }],
            code,
            config,
            steps: 0,
            current: 0,
            state: VmState::Running,
        }
    }

    /// Index of the top of the data stack, `-1` when empty.
    pub fn dp(&self) -> isize {
        self.stack.len() as isize - 1
    }

    /// Index of the active call frame.
    pub fn cp(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Removes the top value; `None` once the stack is empty.
    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    /// Runs the program to completion.
    ///
    /// Does nothing once the VM has halted or failed.
    pub fn exec(&mut self) -> std::result::Result<(), RuntimeError> {
        if self.state != VmState::Running {
            return Ok(());
        }

        match self.run() {
            Ok(()) => {
                self.state = VmState::Halted;
                debug!(steps = self.steps, dp = self.dp(), "halted");
                Ok(())
            }
            Err(kind) => {
                self.state = VmState::Failed;
                let err = self
                    .frames
                    .iter()
                    .fold(RuntimeError::new(kind, self.current), |err, frame| {
                        err.with_context(&frame.ident)
                    });
                debug!(error = %err.kind, position = err.position, "aborted");
                Err(err)
            }
        }
    }

    // Execution

    fn run(&mut self) -> Result<()> {
        loop {
            let start = self.code.position();
            let byte = match self.code.read_byte() {
                Ok(byte) => byte,
                Err(CodeError::EndOfData) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            self.current = start;

            let op = OpCode::from_byte(byte).ok_or(CodeError::UnknownOpcode {
                byte,
                position: start,
            })?;

            self.check_limits()?;
            trace!(addr = start, op = %op, dp = self.dp(), "dispatch");

            self.dispatch(op)?;
        }
    }

    fn check_limits(&mut self) -> Result<()> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeErrorKind::StepLimitExceeded { limit: max });
            }
        }

        Ok(())
    }

    /// Pushes on behalf of an instruction; the stack never holds more than
    /// `max_stack_size` values.
    fn grow(&mut self, value: Value) -> Result<()> {
        if self.stack.len() >= self.config.max_stack_size {
            return Err(RuntimeErrorKind::StackLimitExceeded {
                limit: self.config.max_stack_size,
            });
        }
        self.push(value);
        Ok(())
    }

    fn dispatch(&mut self, op: OpCode) -> Result<()> {
        match op {
            // Literals
            OpCode::PushInt => {
                let n = self.code.read_i64()?;
                self.grow(Value::Integer(n))?;
            }
            OpCode::PushFloat => {
                let x = self.code.read_f64()?;
                self.grow(Value::Float(x))?;
            }

            // Stack operations
            OpCode::Swap => {
                let n = self.require(op, 2)?;
                self.stack.swap(n - 1, n - 2);
            }
            OpCode::Dup => {
                let n = self.require(op, 1)?;
                let top = self.stack[n - 1];
                self.grow(top)?;
            }
            OpCode::Over => {
                let n = self.require(op, 2)?;
                let second = self.stack[n - 2];
                self.grow(second)?;
            }
            OpCode::Rot => {
                // ( a b c -- c a b )
                let n = self.require(op, 3)?;
                self.stack[n - 3..].rotate_right(1);
            }
            OpCode::Drop => {
                self.pop();
            }

            // Bindings
            OpCode::Get => {
                let slot = Slot::decode(self.code.read_i64()?);
                let addr = self.resolve(slot)?;
                let value = self.stack[addr];
                self.grow(value)?;
            }
            OpCode::SetInt => {
                let slot = Slot::decode(self.code.read_i64()?);
                let n = self.code.read_i64()?;
                let addr = self.resolve(slot)?;
                self.stack[addr] = Value::Integer(n);
            }
            OpCode::SetFloat => {
                let slot = Slot::decode(self.code.read_i64()?);
                let x = self.code.read_f64()?;
                let addr = self.resolve(slot)?;
                self.stack[addr] = Value::Float(x);
            }

            // Integer arithmetic
            OpCode::AddI => self.int_op(op, i64::checked_add)?,
            OpCode::SubI => self.int_op(op, i64::checked_sub)?,
            OpCode::MulI => self.int_op(op, i64::checked_mul)?,
            OpCode::DivI => {
                let (_, y) = self.peek_ints(op)?;
                if y == 0 {
                    return Err(RuntimeErrorKind::DivisionByZero);
                }
                self.int_op(op, i64::checked_div)?
            }

            // Float arithmetic
            OpCode::AddF => self.float_op(op, |x, y| x + y)?,
            OpCode::SubF => self.float_op(op, |x, y| x - y)?,
            OpCode::MulF => self.float_op(op, |x, y| x * y)?,
            OpCode::DivF => self.float_op(op, |x, y| x / y)?,

            // Control flow
            OpCode::Call => {
                let argc = self.code.read_count(op, self.current)?;
                self.call(argc)?;
            }
            OpCode::Return => self.ret()?,
            OpCode::Jump => {
                let addr = self.code.read_count(op, self.current)?;
                self.code.set_position(addr)?;
            }
        }

        Ok(())
    }

    /// Opens a frame for the function value below `argc` arguments and
    /// transfers control to it.
    fn call(&mut self, argc: usize) -> Result<()> {
        let depth = self.stack.len();
        if depth < argc + 1 {
            return Err(RuntimeErrorKind::StackUnderflow {
                op: OpCode::Call,
                needed: argc + 1,
                found: depth,
            });
        }

        let callee_index = depth - 1 - argc;
        let callee = self.stack[callee_index];
        let entry = match callee {
            Value::Integer(n) => usize::try_from(n).ok().filter(|addr| *addr < self.code.len()),
            Value::Float(_) => None,
        }
        .ok_or(RuntimeErrorKind::NotCallable { value: callee })?;

        if self.cp() >= self.config.max_call_depth {
            return Err(RuntimeErrorKind::CallDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }

        let frame = StackFrame {
            ident: format!("func@{:04}", entry),
            dp: callee_index as isize,
            return_addr: self.code.position(),
        };
        debug!(frame = %frame.ident, argc, base = frame.dp, "call");

        self.frames.push(frame);
        self.code.set_position(entry)?;
        Ok(())
    }

    /// Closes the active frame, leaving only its result in place of the
    /// callee and its arguments.
    fn ret(&mut self) -> Result<()> {
        if self.frames.len() < 2 {
            return Err(RuntimeErrorKind::ReturnOutsideFunction);
        }

        let result = self.pop().ok_or(RuntimeErrorKind::StackUnderflow {
            op: OpCode::Return,
            needed: 1,
            found: 0,
        })?;

        let Some(frame) = self.frames.pop() else {
            return Err(RuntimeErrorKind::ReturnOutsideFunction);
        };
        debug!(frame = %frame.ident, result = %result, "return");

        self.stack.truncate(frame.dp.max(0) as usize);
        self.push(result);
        self.code.set_position(frame.return_addr)?;
        Ok(())
    }

    /// Maps a slot to an absolute data-stack index.
    ///
    /// Computed in `i128`: any decoded slot plus the frame base fits.
    fn resolve(&self, slot: Slot) -> Result<usize> {
        let dp = self.dp();
        let addr = match slot {
            Slot::FrameRelative(n) => self.frame_base() as i128 + n as i128 + 1,
            Slot::StackRelative(n) => dp as i128 - n as i128,
        };

        if addr < 0 || addr > dp as i128 {
            return Err(RuntimeErrorKind::InvalidAddress { slot, addr, dp });
        }
        Ok(addr as usize)
    }

    fn frame_base(&self) -> isize {
        self.frames.last().map_or(-1, |frame| frame.dp)
    }

    // Stack helpers

    /// Fails unless at least `needed` values are on the stack; returns the
    /// stack length.
    fn require(&self, op: OpCode, needed: usize) -> Result<usize> {
        let found = self.stack.len();
        if found < needed {
            return Err(RuntimeErrorKind::StackUnderflow { op, needed, found });
        }
        Ok(found)
    }

    /// Both integer operands, second operand on top, without popping.
    fn peek_ints(&self, op: OpCode) -> Result<(i64, i64)> {
        let n = self.require(op, 2)?;
        let project = |value: &Value| {
            value
                .as_integer()
                .map_err(|mismatch| RuntimeErrorKind::TagMismatch { op, mismatch })
        };
        Ok((project(&self.stack[n - 2])?, project(&self.stack[n - 1])?))
    }

    fn peek_floats(&self, op: OpCode) -> Result<(f64, f64)> {
        let n = self.require(op, 2)?;
        let project = |value: &Value| {
            value
                .as_float()
                .map_err(|mismatch| RuntimeErrorKind::TagMismatch { op, mismatch })
        };
        Ok((project(&self.stack[n - 2])?, project(&self.stack[n - 1])?))
    }

    fn int_op(&mut self, op: OpCode, f: fn(i64, i64) -> Option<i64>) -> Result<()> {
        let (x, y) = self.peek_ints(op)?;
        let result = f(x, y).ok_or(RuntimeErrorKind::IntegerOverflow { op })?;
        self.stack.truncate(self.stack.len() - 2);
        self.push(Value::Integer(result));
        Ok(())
    }

    fn float_op(&mut self, op: OpCode, f: fn(f64, f64) -> f64) -> Result<()> {
        let (x, y) = self.peek_floats(op)?;
        self.stack.truncate(self.stack.len() - 2);
        self.push(Value::Float(f(x, y)));
        Ok(())
    }
}
