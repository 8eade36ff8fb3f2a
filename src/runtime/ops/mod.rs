//! WebAssembly operation implementations
//!
//! Non-control instructions, organised by category. Each op pops its operands from the
//! current frame's operand stack and pushes its result; control flow lives in the
//! executor.

pub mod bitwise;
pub mod comparison;
pub mod conversion;
pub mod memory;
pub mod numeric;
pub mod parametric;
pub mod variable;

pub(crate) use crate::runtime::memory::Memory;
pub(crate) use crate::runtime::stack::StackAllocator;
pub(crate) use crate::runtime::RuntimeError;

/// The operand stack as the ops see it
pub type Stack = dyn StackAllocator;
