//! Tree form of decoded instructions
//!
//! The interpreter only ever reads the packed [`InstructionPool`](super::pool::InstructionPool).
//! This owned tree is what the pool materialises for tooling: disassembly, inspection and
//! structural comparison in tests.

use std::fmt;

use super::module::ValueType;
use super::opcode::{Immediate, OpCode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: OpCode,
    pub result_type: Option<ValueType>,
    pub operands: Vec<u64>,
    pub branch0: Option<Vec<Instruction>>,
    pub branch1: Option<Vec<Instruction>>,
}

impl Instruction {
    pub fn new(op: OpCode) -> Instruction {
        Instruction {
            op,
            result_type: None,
            operands: vec![],
            branch0: None,
            branch1: None,
        }
    }

    fn fmt_immediates(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op.immediate() {
            Immediate::Block => {
                if let Some(t) = self.result_type {
                    write!(f, " (result {})", t)?;
                }
            }
            Immediate::MemArg => {
                if let [align, offset] = self.operands.as_slice() {
                    write!(f, " offset={} align={}", offset, 1u64 << (*align).min(63))?;
                }
            }
            Immediate::CallIndirect => {
                if let Some(ty) = self.operands.first() {
                    write!(f, " (type {})", ty)?;
                }
            }
            Immediate::I32 => {
                if let Some(v) = self.operands.first() {
                    write!(f, " {}", *v as u32 as i32)?;
                }
            }
            Immediate::I64 => {
                if let Some(v) = self.operands.first() {
                    write!(f, " {}", *v as i64)?;
                }
            }
            Immediate::F32 => {
                if let Some(v) = self.operands.first() {
                    write!(f, " {:?}", f32::from_bits(*v as u32))?;
                }
            }
            Immediate::F64 => {
                if let Some(v) = self.operands.first() {
                    write!(f, " {:?}", f64::from_bits(*v))?;
                }
            }
            Immediate::Index | Immediate::BrTable => {
                for operand in &self.operands {
                    write!(f, " {}", operand)?;
                }
            }
            Immediate::None | Immediate::MemoryIndex => {}
        }
        Ok(())
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(f, "{}{}", indent, self.op)?;
        self.fmt_immediates(f)?;
        writeln!(f)?;
        if let Some(body) = &self.branch0 {
            for ins in body {
                ins.fmt_indented(f, depth + 1)?;
            }
            if let Some(otherwise) = &self.branch1 {
                writeln!(f, "{}else", indent)?;
                for ins in otherwise {
                    ins.fmt_indented(f, depth + 1)?;
                }
            }
            writeln!(f, "{}end", indent)?;
        }
        Ok(())
    }
}

/// Multi-line disassembly, nested bodies indented two spaces per level
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}
