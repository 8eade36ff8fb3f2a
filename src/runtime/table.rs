//! Function table for `call_indirect`
//!
//! Slots hold function indices. Element segments fill the table at instantiation; a
//! segment reaching past the current size grows the table when the limits allow it.

use super::stack::FunctionRef;
use super::RuntimeError;
use crate::parser::module::Limits;

/// Slots must stay addressable by a table [`FunctionRef`]
pub const MAX_TABLE_SIZE: u32 = FunctionRef::MAX_INDEX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    elements: Vec<Option<u32>>,
    limits: Limits,
}

impl Table {
    /// A table of `limits.min` empty slots
    ///
    /// # Errors
    /// `FunctionIndexOverflow` when `limits.min` exceeds [`MAX_TABLE_SIZE`].
    pub fn new(limits: Limits) -> Result<Table, RuntimeError> {
        if limits.min > MAX_TABLE_SIZE {
            return Err(RuntimeError::FunctionIndexOverflow(limits.min));
        }
        let mut elements = Vec::new();
        elements
            .try_reserve_exact(limits.min as usize)
            .map_err(|_| RuntimeError::TableSizeExceeded)?;
        elements.resize(limits.min as usize, None);
        Ok(Table { elements, limits })
    }

    /// Largest size `init` may grow to
    fn max_size(&self) -> u32 {
        self.limits.max.map_or(MAX_TABLE_SIZE, |max| max.min(MAX_TABLE_SIZE))
    }

    pub fn size(&self) -> u32 {
        self.elements.len() as u32
    }

    /// Function index in `slot`, `None` for empty or out of range slots
    #[inline]
    pub fn get(&self, slot: u32) -> Option<u32> {
        self.elements.get(slot as usize).copied().flatten()
    }

    /// Copy `functions` into consecutive slots from `offset`
    pub fn init(&mut self, offset: u32, functions: &[u32]) -> Result<(), RuntimeError> {
        let end = (offset as u64) + functions.len() as u64;
        if end > self.elements.len() as u64 {
            if end > self.max_size() as u64 {
                return Err(RuntimeError::TableSizeExceeded);
            }
            self.elements
                .try_reserve_exact(end as usize - self.elements.len())
                .map_err(|_| RuntimeError::TableSizeExceeded)?;
            self.elements.resize(end as usize, None);
        }
        for (slot, function) in self.elements[offset as usize..end as usize]
            .iter_mut()
            .zip(functions)
        {
            *slot = Some(*function);
        }
        Ok(())
    }
}
