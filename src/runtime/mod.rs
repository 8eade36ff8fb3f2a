//! WebAssembly runtime implementation
//!
//! This module provides the execution engine for decoded modules: the frame and label
//! stack allocator, linear memory, the function table, and the instruction interpreter.

pub mod config;
pub mod executor;
pub mod hook;
pub mod imports;
pub mod instance;
pub mod memory;
pub mod ops;
pub mod stack;
pub mod table;
pub mod test_utils;
pub mod value;

pub use config::VmConfig;
pub use hook::{FuelMeter, Hook};
pub use imports::{HostFn, HostFunction};
pub use instance::{Builder, ModuleInstance};
pub use memory::Memory;
pub use stack::{ArrayStackAllocator, FunctionRef, Label, StackAllocator};
pub use table::Table;
pub use value::Value;

use crate::parser::DecodeError;

/// Traps and instantiation failures
///
/// A trap aborts the current `execute()` call. State mutated before the trap (memory,
/// globals) is left as it landed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("unreachable executed")]
    Unreachable,
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Call stack overflow")]
    FrameOverflow,
    #[error("Function index {0} exceeds the 15-bit reference range")]
    FunctionIndexOverflow(u32),
    #[error("Frames must be popped in LIFO order")]
    FrameOrderViolation,
    #[error("Label stack overflow")]
    LabelOverflow,
    #[error("Label stack underflow")]
    LabelUnderflow,
    #[error("integer divide by zero")]
    DivideByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    MathOverflow,
    #[error("out of bounds memory access at {0:#x}")]
    MemoryAccessOverflow(u64),
    #[error("undefined element {0}")]
    UndefinedElement(u32),
    #[error("global {0} is immutable")]
    ImmutableGlobal(u32),
    #[error("indirect call signature mismatch")]
    SignatureMismatch,
    #[error("Local variable index out of bounds: {0}")]
    LocalIndexOutOfBounds(u32),
    #[error("Global variable index out of bounds: {0}")]
    GlobalIndexOutOfBounds(u32),
    #[error("Function index out of bounds: {0}")]
    FunctionIndexOutOfBounds(u32),
    #[error("Unknown export: {0}")]
    UnknownExport(String),
    #[error("Unknown host function: {module}.{name}")]
    UnknownHostFunction { module: String, name: String },
    #[error("Host function registered twice: {0}")]
    DuplicateHostFunction(String),
    #[error("Unsupported import {module}.{name}: only function imports are supported")]
    UnsupportedImport { module: String, name: String },
    #[error("Only one memory is supported, found {0}")]
    MultipleMemories(usize),
    #[error("Invalid memory limits: min {min} pages, max {max} pages")]
    InvalidLimits { min: u32, max: u32 },
    #[error("Memory of {pages} pages exceeds the configured limit of {limit} pages")]
    MemoryLimitExceeded { pages: u32, limit: u32 },
    #[error("Failed to allocate {0} memory pages")]
    MemoryAllocation(u32),
    #[error("Table size exceeded")]
    TableSizeExceeded,
    #[error("Invalid segment offset: {0}")]
    InvalidOffset(i64),
    #[error("Expected {expected} globals, got {actual}")]
    GlobalCountMismatch { expected: usize, actual: usize },
    #[error("Expected {expected} arguments, got {actual}")]
    ArgumentCountMismatch { expected: usize, actual: usize },
    #[error("Function returned no value where one was expected")]
    MissingResult,
    #[error("Instruction budget exhausted")]
    InstructionBudgetExhausted,
    #[error("Invalid {value_type} value: {text}")]
    InvalidValue { value_type: String, text: String },
    #[error("Host error: {0}")]
    Host(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
