//! Variable access operations for WebAssembly
//!
//! Locals live in the current frame; globals are raw words owned by the instance.

use super::*;
use crate::parser::module::GlobalType;

// ============================================================================
// Locals
// ============================================================================

/// local.get
pub fn local_get(stack: &mut Stack, index: u32) -> Result<(), RuntimeError> {
    let value = stack.get_local(index)?;
    stack.push(value)
}

/// local.set
pub fn local_set(stack: &mut Stack, index: u32) -> Result<(), RuntimeError> {
    let value = stack.pop()?;
    stack.set_local(index, value)
}

/// local.tee
pub fn local_tee(stack: &mut Stack, index: u32) -> Result<(), RuntimeError> {
    let value = stack.peek()?;
    stack.set_local(index, value)
}

// ============================================================================
// Globals
// ============================================================================

/// global.get
pub fn global_get(stack: &mut Stack, globals: &[i64], index: u32) -> Result<(), RuntimeError> {
    let value = *globals
        .get(index as usize)
        .ok_or(RuntimeError::GlobalIndexOutOfBounds(index))?;
    stack.push(value)
}

/// global.set
/// Writing an immutable global traps.
pub fn global_set(
    stack: &mut Stack,
    globals: &mut [i64],
    types: &[GlobalType],
    index: u32,
) -> Result<(), RuntimeError> {
    let global_type = types
        .get(index as usize)
        .ok_or(RuntimeError::GlobalIndexOutOfBounds(index))?;
    if !global_type.mutable {
        return Err(RuntimeError::ImmutableGlobal(index));
    }
    let value = stack.pop()?;
    let slot = globals
        .get_mut(index as usize)
        .ok_or(RuntimeError::GlobalIndexOutOfBounds(index))?;
    *slot = value;
    Ok(())
}
