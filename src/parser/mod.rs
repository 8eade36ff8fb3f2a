//! WebAssembly binary format decoder
//!
//! Turns raw `.wasm` bytes into a [`module::Module`]. Every instruction sequence found
//! in the global, element, code and data sections is decoded into the module's single
//! [`pool::InstructionPool`], so all spans share one coordinate space.

pub mod instruction;
pub mod module;
pub mod opcode;
pub mod pool;
pub mod reader;

pub use module::Module;
pub use opcode::OpCode;
pub use pool::{InstructionPool, Span};
pub use reader::ByteCursor;

/// Errors raised while decoding a binary module
///
/// A decode error is always fatal: no partially decoded module is handed back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),
    #[error("bad module header: magic {magic:#010x}, version {version}")]
    BadHeader { magic: u32, version: u32 },
    #[error("unknown section id {0}")]
    UnknownSection(u8),
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
    #[error("unexpected {0} outside a structured instruction")]
    UnexpectedDelimiter(&'static str),
    #[error("invalid LEB128 encoding: too many bytes")]
    InvalidLeb128,
    #[error("integer overflow: LEB128 value does not fit in {0} bits")]
    Overflow(u32),
    #[error("operand index {index} out of range, instruction has {count} operands")]
    OperandIndexOverflow { index: u32, count: u32 },
    #[error("instruction index {index} out of range for span of length {len}")]
    SpanIndexOverflow { index: u32, len: u32 },
    #[error("instruction tree nested deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("invalid instruction reference {0}")]
    InvalidInstruction(u32),
    #[error("invalid value type {0:#04x}")]
    InvalidValueType(u8),
    #[error("invalid block type {0:#04x}")]
    InvalidBlockType(u8),
    #[error("invalid function type form {0:#04x}")]
    InvalidTypeForm(u8),
    #[error("invalid limits flag {0:#04x}")]
    InvalidLimitsFlag(u8),
    #[error("invalid import kind {0:#04x}")]
    InvalidImportKind(u8),
    #[error("invalid export kind {0:#04x}")]
    InvalidExportKind(u8),
    #[error("invalid table element type {0:#04x}")]
    InvalidElementType(u8),
    #[error("invalid global mutability flag {0:#04x}")]
    InvalidMutability(u8),
    #[error("expected zero byte after {0}")]
    ExpectedZeroByte(&'static str),
    #[error("invalid UTF-8 in name")]
    InvalidUtf8,
    #[error("section {id} has {remaining} bytes left over")]
    SectionSizeMismatch { id: u8, remaining: usize },
    #[error("function and code section length mismatch: {functions} functions, {bodies} bodies")]
    FunctionCountMismatch { functions: usize, bodies: usize },
}

/// Parse a complete binary module
pub fn parse(bytes: &[u8]) -> Result<Module, DecodeError> {
    Module::decode(&mut ByteCursor::new(bytes))
}
