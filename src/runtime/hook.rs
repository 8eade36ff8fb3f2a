//! Execution hooks
//!
//! Hooks observe the dispatch loop. Every callback may fail, which aborts the running
//! `execute()` with that error.

use std::cell::Cell;
use std::rc::Rc;

use super::RuntimeError;
use crate::parser::opcode::OpCode;

pub trait Hook {
    fn on_instruction(&mut self, _op: OpCode) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn on_host_function(&mut self, _name: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn on_new_frame(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn on_frame_exit(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn on_memory_grow(&mut self, _before: u32, _after: u32) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// Instruction budget
///
/// Charges one unit per executed instruction. The counter is shared so the embedder can
/// top it up or read what is left after a run.
#[derive(Debug, Clone)]
pub struct FuelMeter {
    remaining: Rc<Cell<u64>>,
}

impl FuelMeter {
    pub fn new(fuel: u64) -> Self {
        FuelMeter {
            remaining: Rc::new(Cell::new(fuel)),
        }
    }

    pub fn counter(&self) -> Rc<Cell<u64>> {
        Rc::clone(&self.remaining)
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.get()
    }
}

impl Hook for FuelMeter {
    fn on_instruction(&mut self, _op: OpCode) -> Result<(), RuntimeError> {
        match self.remaining.get() {
            0 => Err(RuntimeError::InstructionBudgetExhausted),
            n => {
                self.remaining.set(n - 1);
                Ok(())
            }
        }
    }
}
