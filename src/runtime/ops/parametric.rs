//! Parametric operations for WebAssembly

use super::*;

/// drop
pub fn drop(stack: &mut Stack) -> Result<(), RuntimeError> {
    stack.pop()?;
    Ok(())
}

/// select
/// Keeps the first operand when the condition is non-zero, otherwise the second.
pub fn select(stack: &mut Stack) -> Result<(), RuntimeError> {
    let c = stack.pop_i32()?;
    let val2 = stack.pop()?;
    let val1 = stack.pop()?;
    stack.push(if c != 0 { val1 } else { val2 })
}
