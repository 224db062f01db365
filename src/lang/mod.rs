//! # popi values
//!
//! Run-time data shared by the compiler (literal operands) and the virtual
//! machine (the data stack).

pub mod value;
